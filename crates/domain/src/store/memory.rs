//! In-memory ledger store.
//!
//! Committed state sits behind a short-lived table lock that is never held
//! across an await. A unit of work records its writes and replays them onto
//! the committed tables at commit, where every constraint is checked again:
//! a group-buy update whose expected version moved fails with
//! [`StoreError::Conflict`], as does an insert that another unit won.
//!
//! Row locks are scoped to one group buy or one user. Units on unrelated
//! rows never wait on each other, and plain reads never wait on a unit.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::pagination::Cursor;
use tokio::sync::{oneshot, Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::{LedgerStore, LedgerTx, StoreError};
use crate::models::{
    point_history::balance_of, Badge, BadgeType, GroupBuy, GroupBuyStatus, Participation,
    PointHistory, ReputationScore, Review, UserActivity, UserProfile,
};

const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// How units of work guard group-buy rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LockMode {
    /// `lock_group_buy` holds the row until the unit ends, like `SELECT ... FOR UPDATE`.
    #[default]
    Pessimistic,
    /// Group-buy rows are read without a lock. Racing writers are caught by
    /// the version check and the loser gets [`StoreError::Conflict`].
    /// User rows stay locked in both modes.
    Optimistic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum RowKey {
    GroupBuy(Uuid),
    User(Uuid),
}

fn lock<T>(mutex: &StdMutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A write recorded by a unit, replayed onto the committed tables at commit.
#[derive(Debug, Clone)]
enum Write {
    InsertGroupBuy(GroupBuy),
    UpdateGroupBuy {
        next: GroupBuy,
        expected_version: i64,
    },
    InsertParticipation(Participation),
    DeactivateParticipation {
        id: Uuid,
        at: DateTime<Utc>,
    },
    TouchProfile(Uuid),
    SetReputation {
        user_id: Uuid,
        score: ReputationScore,
    },
    AppendPoint(PointHistory),
    InsertMarker {
        group_buy_id: Uuid,
        user_id: Uuid,
    },
    InsertBadge(Badge),
    InsertReview(Review),
}

#[derive(Debug, Clone, Default)]
struct Tables {
    group_buys: HashMap<Uuid, GroupBuy>,
    participations: Vec<Participation>,
    points: Vec<PointHistory>,
    profiles: HashMap<Uuid, UserProfile>,
    badges: Vec<Badge>,
    settlements: HashSet<(Uuid, Uuid)>,
    reviews: Vec<Review>,
}

impl Tables {
    fn balance(&self, user_id: Uuid) -> i64 {
        self.points
            .iter()
            .filter(|p| p.user_id == user_id)
            .map(|p| p.amount)
            .sum()
    }

    fn reputation(&self, user_id: Uuid) -> ReputationScore {
        self.profiles
            .get(&user_id)
            .map(|p| p.reputation)
            .unwrap_or_default()
    }

    fn active_participation(&self, group_buy_id: Uuid, user_id: Uuid) -> Option<&Participation> {
        self.participations
            .iter()
            .find(|p| p.group_buy_id == group_buy_id && p.user_id == user_id && p.active)
    }

    fn has_badge(&self, user_id: Uuid, badge_type: BadgeType) -> bool {
        self.badges
            .iter()
            .any(|b| b.user_id == user_id && b.badge_type == badge_type)
    }

    fn find_review(&self, group_buy_id: Uuid, reviewer_id: Uuid) -> Option<&Review> {
        self.reviews
            .iter()
            .find(|r| r.group_buy_id == group_buy_id && r.reviewer_id == reviewer_id)
    }

    fn activity(&self, user_id: Uuid) -> UserActivity {
        let completed = |gb_id: &Uuid| {
            self.group_buys
                .get(gb_id)
                .is_some_and(|gb| gb.status == GroupBuyStatus::Completed)
        };

        UserActivity {
            hosted_completed: self
                .group_buys
                .values()
                .filter(|gb| gb.host_user_id == user_id && gb.status == GroupBuyStatus::Completed)
                .count() as i64,
            participated_completed: self
                .participations
                .iter()
                .filter(|p| p.user_id == user_id && p.active && completed(&p.group_buy_id))
                .count() as i64,
            reviews_written: self
                .reviews
                .iter()
                .filter(|r| r.reviewer_id == user_id)
                .count() as i64,
            reputation: self.reputation(user_id),
        }
    }

    /// Constraints `write` must satisfy against the current state.
    ///
    /// These mirror the Postgres CHECK and UNIQUE constraints plus the
    /// version guard on group-buy updates.
    fn check(&self, write: &Write) -> Result<(), StoreError> {
        match write {
            Write::InsertGroupBuy(gb) if self.group_buys.contains_key(&gb.id) => {
                Err(StoreError::Duplicate(format!("group_buy {}", gb.id)))
            }
            Write::UpdateGroupBuy {
                next,
                expected_version,
            } => {
                let current = self
                    .group_buys
                    .get(&next.id)
                    .ok_or_else(|| StoreError::Backend(format!("group_buy {} missing", next.id)))?;
                if current.version != *expected_version {
                    return Err(StoreError::Conflict(format!("group_buy {}", next.id)));
                }
                if next.current_headcount < 0 || next.current_headcount > next.target_headcount {
                    return Err(StoreError::Backend(format!(
                        "headcount {} outside 0..={}",
                        next.current_headcount, next.target_headcount
                    )));
                }
                Ok(())
            }
            Write::InsertParticipation(p)
                if self.active_participation(p.group_buy_id, p.user_id).is_some() =>
            {
                Err(StoreError::Duplicate(format!(
                    "active participation ({}, {})",
                    p.group_buy_id, p.user_id
                )))
            }
            Write::DeactivateParticipation { id, .. }
                if !self.participations.iter().any(|p| p.id == *id) =>
            {
                Err(StoreError::Backend(format!("participation {} missing", id)))
            }
            Write::InsertMarker {
                group_buy_id,
                user_id,
            } if self.settlements.contains(&(*group_buy_id, *user_id)) => Err(
                StoreError::Duplicate(format!("settlement ({}, {})", group_buy_id, user_id)),
            ),
            Write::InsertBadge(badge) if self.has_badge(badge.user_id, badge.badge_type) => Err(
                StoreError::Duplicate(format!("badge ({}, {})", badge.user_id, badge.badge_type)),
            ),
            Write::InsertReview(review)
                if self
                    .find_review(review.group_buy_id, review.reviewer_id)
                    .is_some() =>
            {
                Err(StoreError::Duplicate(format!(
                    "review ({}, {})",
                    review.group_buy_id, review.reviewer_id
                )))
            }
            _ => Ok(()),
        }
    }

    fn apply(&mut self, write: &Write) {
        match write {
            Write::InsertGroupBuy(gb) | Write::UpdateGroupBuy { next: gb, .. } => {
                self.group_buys.insert(gb.id, gb.clone());
            }
            Write::InsertParticipation(p) => self.participations.push(p.clone()),
            Write::DeactivateParticipation { id, at } => {
                if let Some(row) = self.participations.iter_mut().find(|p| p.id == *id) {
                    row.active = false;
                    row.left_at = Some(*at);
                }
            }
            Write::TouchProfile(user_id) => {
                self.profiles
                    .entry(*user_id)
                    .or_insert_with(|| UserProfile::new(*user_id));
            }
            Write::SetReputation { user_id, score } => {
                self.profiles
                    .entry(*user_id)
                    .or_insert_with(|| UserProfile::new(*user_id))
                    .reputation = *score;
            }
            Write::AppendPoint(entry) => self.points.push(entry.clone()),
            Write::InsertMarker {
                group_buy_id,
                user_id,
            } => {
                self.settlements.insert((*group_buy_id, *user_id));
            }
            Write::InsertBadge(badge) => self.badges.push(badge.clone()),
            Write::InsertReview(review) => self.reviews.push(review.clone()),
        }
    }
}

#[derive(Debug, Default)]
struct Shared {
    tables: StdMutex<Tables>,
    row_locks: StdMutex<HashMap<RowKey, Arc<Mutex<()>>>>,
    failing_commits: AtomicUsize,
    conflicts: AtomicUsize,
    commit_pause: StdMutex<Option<(oneshot::Sender<()>, oneshot::Receiver<()>)>>,
}

impl Shared {
    fn conflict(&self, what: String) -> StoreError {
        self.conflicts.fetch_add(1, Ordering::SeqCst);
        StoreError::Conflict(what)
    }
}

/// A commit stopped by [`InMemoryLedgerStore::pause_next_commit`].
#[derive(Debug)]
pub struct PausedCommit {
    reached: oneshot::Receiver<()>,
    release: oneshot::Sender<()>,
}

impl PausedCommit {
    /// Wait until some unit reaches its commit and stops there.
    pub async fn reached(&mut self) {
        let _ = (&mut self.reached).await;
    }

    /// Let the stopped commit proceed.
    pub fn release(self) {
        let _ = self.release.send(());
    }
}

/// Ledger store backed by process memory.
#[derive(Debug, Clone)]
pub struct InMemoryLedgerStore {
    shared: Arc<Shared>,
    mode: LockMode,
    lock_timeout: Duration,
}

impl Default for InMemoryLedgerStore {
    fn default() -> Self {
        Self::with_mode(LockMode::default())
    }
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mode(mode: LockMode) -> Self {
        Self {
            shared: Arc::default(),
            mode,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    /// Give up on a row lock after `timeout` with a transient error.
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn mode(&self) -> LockMode {
        self.mode
    }

    /// Make the next `count` commits fail with a transient error.
    pub fn fail_next_commits(&self, count: usize) {
        self.shared.failing_commits.store(count, Ordering::SeqCst);
    }

    /// Stop the next unit that commits until the returned handle releases it.
    pub fn pause_next_commit(&self) -> PausedCommit {
        let (reached_tx, reached_rx) = oneshot::channel();
        let (release_tx, release_rx) = oneshot::channel();
        *lock(&self.shared.commit_pause) = Some((reached_tx, release_rx));
        PausedCommit {
            reached: reached_rx,
            release: release_tx,
        }
    }

    /// Version conflicts and lost insert races reported so far.
    pub fn conflicts_detected(&self) -> usize {
        self.shared.conflicts.load(Ordering::SeqCst)
    }

    /// Credit a user directly, outside any engine operation.
    pub async fn grant_points(&self, user_id: Uuid, amount: i64, description: &str) {
        lock(&self.shared.tables)
            .points
            .push(PointHistory::earn(user_id, amount, description, None, Utc::now()));
    }

    fn read<R>(&self, read: impl FnOnce(&Tables) -> R) -> R {
        read(&lock(&self.shared.tables))
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn begin(&self) -> Result<Box<dyn LedgerTx>, StoreError> {
        Ok(Box::new(InMemoryTx {
            shared: self.shared.clone(),
            mode: self.mode,
            lock_timeout: self.lock_timeout,
            held: HashMap::new(),
            writes: Vec::new(),
        }))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn find_group_buy(&self, id: Uuid) -> Result<Option<GroupBuy>, StoreError> {
        Ok(self.read(|t| t.group_buys.get(&id).cloned()))
    }

    async fn list_open_group_buys(
        &self,
        after: Option<Cursor>,
        limit: u32,
    ) -> Result<Vec<GroupBuy>, StoreError> {
        let mut open: Vec<GroupBuy> = self.read(|t| {
            t.group_buys
                .values()
                .filter(|gb| gb.status == GroupBuyStatus::Recruiting && !gb.is_deleted())
                .filter(|gb| match after {
                    Some(c) => (gb.created_at, gb.id) < (c.created_at, c.id),
                    None => true,
                })
                .cloned()
                .collect()
        });
        open.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        open.truncate(limit as usize);
        Ok(open)
    }

    async fn expirable_group_buys(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<Uuid>, StoreError> {
        let mut due: Vec<(DateTime<Utc>, Uuid)> = self.read(|t| {
            t.group_buys
                .values()
                .filter(|gb| gb.status == GroupBuyStatus::Recruiting && gb.deadline <= now)
                .map(|gb| (gb.deadline, gb.id))
                .collect()
        });
        due.sort();
        Ok(due.into_iter().take(limit as usize).map(|(_, id)| id).collect())
    }

    async fn confirmed_before(
        &self,
        cutoff: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<Uuid>, StoreError> {
        let mut due: Vec<(DateTime<Utc>, Uuid)> = self.read(|t| {
            t.group_buys
                .values()
                .filter(|gb| gb.status == GroupBuyStatus::Confirmed && gb.deadline < cutoff)
                .map(|gb| (gb.deadline, gb.id))
                .collect()
        });
        due.sort();
        Ok(due.into_iter().take(limit as usize).map(|(_, id)| id).collect())
    }

    async fn participations(&self, group_buy_id: Uuid) -> Result<Vec<Participation>, StoreError> {
        let mut rows: Vec<Participation> = self.read(|t| {
            t.participations
                .iter()
                .filter(|p| p.group_buy_id == group_buy_id)
                .cloned()
                .collect()
        });
        rows.sort_by_key(|p| p.joined_at);
        Ok(rows)
    }

    async fn point_history(&self, user_id: Uuid) -> Result<Vec<PointHistory>, StoreError> {
        Ok(self.read(|t| {
            t.points
                .iter()
                .filter(|p| p.user_id == user_id)
                .cloned()
                .collect()
        }))
    }

    async fn point_balance(&self, user_id: Uuid) -> Result<i64, StoreError> {
        let history = self.point_history(user_id).await?;
        Ok(balance_of(&history))
    }

    async fn badges(&self, user_id: Uuid) -> Result<Vec<Badge>, StoreError> {
        Ok(self.read(|t| {
            t.badges
                .iter()
                .filter(|b| b.user_id == user_id)
                .cloned()
                .collect()
        }))
    }

    async fn reputation(&self, user_id: Uuid) -> Result<ReputationScore, StoreError> {
        Ok(self.read(|t| t.reputation(user_id)))
    }

    async fn reviews_for(&self, group_buy_id: Uuid) -> Result<Vec<Review>, StoreError> {
        Ok(self.read(|t| {
            t.reviews
                .iter()
                .filter(|r| r.group_buy_id == group_buy_id)
                .cloned()
                .collect()
        }))
    }

    async fn is_settled(&self, group_buy_id: Uuid, user_id: Uuid) -> Result<bool, StoreError> {
        Ok(self.read(|t| t.settlements.contains(&(group_buy_id, user_id))))
    }
}

/// Unit of work: the row locks it holds plus the writes it has recorded.
pub struct InMemoryTx {
    shared: Arc<Shared>,
    mode: LockMode,
    lock_timeout: Duration,
    held: HashMap<RowKey, OwnedMutexGuard<()>>,
    writes: Vec<Write>,
}

impl InMemoryTx {
    async fn lock_row(&mut self, key: RowKey) -> Result<(), StoreError> {
        if self.held.contains_key(&key) {
            return Ok(());
        }
        let row = lock(&self.shared.row_locks).entry(key).or_default().clone();
        let guard = tokio::time::timeout(self.lock_timeout, row.lock_owned())
            .await
            .map_err(|_| StoreError::Transient(format!("lock timeout on {:?}", key)))?;
        self.held.insert(key, guard);
        Ok(())
    }

    /// Committed state with this unit's own writes applied on top.
    fn view<R>(&self, read: impl FnOnce(&Tables) -> R) -> R {
        let committed = lock(&self.shared.tables);
        if self.writes.is_empty() {
            return read(&committed);
        }
        let mut view = committed.clone();
        drop(committed);
        for write in &self.writes {
            view.apply(write);
        }
        read(&view)
    }

    fn record(&mut self, write: Write) -> Result<(), StoreError> {
        match self.view(|t| t.check(&write)) {
            Ok(()) => {
                self.writes.push(write);
                Ok(())
            }
            Err(StoreError::Conflict(what)) => Err(self.shared.conflict(what)),
            Err(err) => Err(err),
        }
    }
}

#[async_trait]
impl LedgerTx for InMemoryTx {
    async fn lock_group_buy(&mut self, id: Uuid) -> Result<Option<GroupBuy>, StoreError> {
        if self.mode == LockMode::Pessimistic {
            self.lock_row(RowKey::GroupBuy(id)).await?;
        }
        Ok(self.view(|t| t.group_buys.get(&id).cloned()))
    }

    async fn insert_group_buy(&mut self, group_buy: &GroupBuy) -> Result<(), StoreError> {
        self.record(Write::InsertGroupBuy(group_buy.clone()))
    }

    async fn update_group_buy(
        &mut self,
        next: &GroupBuy,
        expected_version: i64,
    ) -> Result<(), StoreError> {
        self.record(Write::UpdateGroupBuy {
            next: next.clone(),
            expected_version,
        })
    }

    async fn active_participation(
        &mut self,
        group_buy_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Participation>, StoreError> {
        Ok(self.view(|t| t.active_participation(group_buy_id, user_id).cloned()))
    }

    async fn active_participants(
        &mut self,
        group_buy_id: Uuid,
    ) -> Result<Vec<Participation>, StoreError> {
        Ok(self.view(|t| {
            t.participations
                .iter()
                .filter(|p| p.group_buy_id == group_buy_id && p.active)
                .cloned()
                .collect()
        }))
    }

    async fn insert_participation(
        &mut self,
        participation: &Participation,
    ) -> Result<(), StoreError> {
        self.record(Write::InsertParticipation(participation.clone()))
    }

    async fn deactivate_participation(
        &mut self,
        participation_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.record(Write::DeactivateParticipation {
            id: participation_id,
            at,
        })
    }

    async fn lock_user(&mut self, user_id: Uuid) -> Result<UserProfile, StoreError> {
        self.lock_row(RowKey::User(user_id)).await?;
        if let Some(profile) = self.view(|t| t.profiles.get(&user_id).cloned()) {
            return Ok(profile);
        }
        self.record(Write::TouchProfile(user_id))?;
        Ok(UserProfile::new(user_id))
    }

    async fn set_reputation(
        &mut self,
        user_id: Uuid,
        score: ReputationScore,
    ) -> Result<(), StoreError> {
        self.record(Write::SetReputation { user_id, score })
    }

    async fn point_balance(&mut self, user_id: Uuid) -> Result<i64, StoreError> {
        Ok(self.view(|t| t.balance(user_id)))
    }

    async fn append_point(&mut self, entry: &PointHistory) -> Result<(), StoreError> {
        self.record(Write::AppendPoint(entry.clone()))
    }

    async fn insert_settlement_marker(
        &mut self,
        group_buy_id: Uuid,
        user_id: Uuid,
        _at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        match self.record(Write::InsertMarker {
            group_buy_id,
            user_id,
        }) {
            Ok(()) => Ok(true),
            Err(StoreError::Duplicate(_)) => Ok(false),
            Err(err) => Err(err),
        }
    }

    async fn has_badge(
        &mut self,
        user_id: Uuid,
        badge_type: BadgeType,
    ) -> Result<bool, StoreError> {
        Ok(self.view(|t| t.has_badge(user_id, badge_type)))
    }

    async fn insert_badge(&mut self, badge: &Badge) -> Result<bool, StoreError> {
        match self.record(Write::InsertBadge(badge.clone())) {
            Ok(()) => Ok(true),
            Err(StoreError::Duplicate(_)) => Ok(false),
            Err(err) => Err(err),
        }
    }

    async fn user_activity(&mut self, user_id: Uuid) -> Result<UserActivity, StoreError> {
        Ok(self.view(|t| t.activity(user_id)))
    }

    async fn find_review(
        &mut self,
        group_buy_id: Uuid,
        reviewer_id: Uuid,
    ) -> Result<Option<Review>, StoreError> {
        Ok(self.view(|t| t.find_review(group_buy_id, reviewer_id).cloned()))
    }

    async fn insert_review(&mut self, review: &Review) -> Result<(), StoreError> {
        self.record(Write::InsertReview(review.clone()))
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let InMemoryTx {
            shared,
            held,
            writes,
            ..
        } = *self;

        let pause = lock(&shared.commit_pause).take();
        if let Some((reached, release)) = pause {
            let _ = reached.send(());
            let _ = release.await;
        }

        let inject = shared
            .failing_commits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if inject {
            return Err(StoreError::Transient("injected commit failure".to_string()));
        }

        {
            let mut tables = lock(&shared.tables);
            let mut next = tables.clone();
            for write in &writes {
                match next.check(write) {
                    Ok(()) => next.apply(write),
                    // Another unit committed first.
                    Err(StoreError::Conflict(what)) | Err(StoreError::Duplicate(what)) => {
                        return Err(shared.conflict(what));
                    }
                    Err(err) => return Err(err),
                }
            }
            *tables = next;
        }

        drop(held);
        Ok(())
    }
}
