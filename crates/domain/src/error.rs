//! Typed results for every engine operation.
//!
//! Each operation has its own error enum so callers can match on the precise
//! rejection reason. `kind()` folds them into the coarse taxonomy the HTTP
//! layer maps onto status codes.

use thiserror::Error;

use crate::models::GroupBuyStatus;
use crate::store::StoreError;

/// Coarse error classification shared by all operation errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed input, rejected before touching state.
    Validation,
    NotFound,
    Forbidden,
    /// Rejected with a specific reason; state unchanged.
    Conflict,
    /// Operation invalid for the current lifecycle status; state unchanged.
    TerminalState,
    /// Safe to retry the whole call.
    Transient,
    Internal,
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::Conflict(_) | StoreError::Transient(_) => ErrorKind::Transient,
            StoreError::Duplicate(_) => ErrorKind::Conflict,
            StoreError::Backend(_) => ErrorKind::Internal,
        }
    }
}

#[derive(Debug, Error)]
pub enum CreateError {
    #[error("Invalid group buy: {0}")]
    Validation(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl CreateError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CreateError::Validation(_) => ErrorKind::Validation,
            CreateError::Store(e) => e.kind(),
        }
    }
}

#[derive(Debug, Error)]
pub enum JoinError {
    #[error("Group buy not found")]
    NotFound,

    #[error("Group buy has been deleted")]
    Deleted,

    #[error("Group buy is not recruiting (status: {0})")]
    NotRecruiting(GroupBuyStatus),

    #[error("Group buy deadline has passed")]
    DeadlinePassed,

    #[error("User has already joined this group buy")]
    AlreadyJoined,

    #[error("Group buy is full")]
    CapacityFull,

    #[error("Host cannot join their own group buy")]
    HostCannotJoin,

    #[error("Insufficient points: balance {balance}, required {required}")]
    InsufficientPoints { balance: i64, required: i64 },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl JoinError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            JoinError::NotFound | JoinError::Deleted => ErrorKind::NotFound,
            JoinError::NotRecruiting(_) | JoinError::DeadlinePassed => ErrorKind::TerminalState,
            JoinError::AlreadyJoined
            | JoinError::CapacityFull
            | JoinError::HostCannotJoin
            | JoinError::InsufficientPoints { .. } => ErrorKind::Conflict,
            JoinError::Store(e) => e.kind(),
        }
    }

    /// Short label for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            JoinError::NotFound => "not_found",
            JoinError::Deleted => "deleted",
            JoinError::NotRecruiting(_) => "not_recruiting",
            JoinError::DeadlinePassed => "deadline_passed",
            JoinError::AlreadyJoined => "already_joined",
            JoinError::CapacityFull => "capacity_full",
            JoinError::HostCannotJoin => "host_cannot_join",
            JoinError::InsufficientPoints { .. } => "insufficient_points",
            JoinError::Store(_) => "store_error",
        }
    }
}

#[derive(Debug, Error)]
pub enum LeaveError {
    #[error("Group buy not found")]
    NotFound,

    #[error("User is not an active participant")]
    NotAParticipant,

    #[error("Group buy is {0}; leaving is closed")]
    TerminalState(GroupBuyStatus),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl LeaveError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LeaveError::NotFound => ErrorKind::NotFound,
            LeaveError::NotAParticipant => ErrorKind::Conflict,
            LeaveError::TerminalState(_) => ErrorKind::TerminalState,
            LeaveError::Store(e) => e.kind(),
        }
    }
}

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("Group buy not found")]
    NotFound,

    #[error("Only the host can complete a group buy")]
    NotHost,

    #[error("Group buy is not confirmed (status: {0})")]
    NotConfirmed(GroupBuyStatus),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl CompletionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CompletionError::NotFound => ErrorKind::NotFound,
            CompletionError::NotHost => ErrorKind::Forbidden,
            CompletionError::NotConfirmed(_) => ErrorKind::TerminalState,
            CompletionError::Store(e) => e.kind(),
        }
    }
}

#[derive(Debug, Error)]
pub enum CancelError {
    #[error("Group buy not found")]
    NotFound,

    #[error("Only the host or an admin can cancel a group buy")]
    Forbidden,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl CancelError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CancelError::NotFound => ErrorKind::NotFound,
            CancelError::Forbidden => ErrorKind::Forbidden,
            CancelError::Store(e) => e.kind(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ReviewError {
    #[error("Invalid review: {0}")]
    Validation(String),

    #[error("Group buy not found")]
    NotFound,

    #[error("Group buy is not completed (status: {0})")]
    NotCompleted(GroupBuyStatus),

    #[error("Only participants of the group buy can review it")]
    NotParticipant,

    #[error("A review for this group buy already exists")]
    DuplicateReview,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ReviewError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ReviewError::Validation(_) => ErrorKind::Validation,
            ReviewError::NotFound => ErrorKind::NotFound,
            ReviewError::NotCompleted(_) => ErrorKind::TerminalState,
            ReviewError::NotParticipant => ErrorKind::Forbidden,
            ReviewError::DuplicateReview => ErrorKind::Conflict,
            ReviewError::Store(e) => e.kind(),
        }
    }
}
