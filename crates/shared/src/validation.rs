//! Common validation utilities.

use chrono::{DateTime, Duration, Utc};
use validator::ValidationError;

/// Validates that a text field contains something other than whitespace.
pub fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut err = ValidationError::new("blank");
        err.message = Some("Value must not be blank".into());
        Err(err)
    } else {
        Ok(())
    }
}

/// Validates that free text carries no control characters other than newlines and tabs.
pub fn validate_printable(value: &str) -> Result<(), ValidationError> {
    if value
        .chars()
        .any(|c| c.is_control() && c != '\n' && c != '\r' && c != '\t')
    {
        let mut err = ValidationError::new("control_characters");
        err.message = Some("Text must not contain control characters".into());
        Err(err)
    } else {
        Ok(())
    }
}

/// Validates that a deadline lies strictly after `now` and no more than `max_days` ahead.
pub fn validate_deadline(
    deadline: DateTime<Utc>,
    now: DateTime<Utc>,
    max_days: i64,
) -> Result<(), ValidationError> {
    if deadline <= now {
        let mut err = ValidationError::new("deadline_past");
        err.message = Some("Deadline must be in the future".into());
        return Err(err);
    }

    if deadline > now + Duration::days(max_days) {
        let mut err = ValidationError::new("deadline_too_far");
        err.message = Some(format!("Deadline cannot be more than {} days ahead", max_days).into());
        return Err(err);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_not_blank() {
        assert!(validate_not_blank("Bulk coffee beans").is_ok());
        assert!(validate_not_blank("   ").is_err());
        assert!(validate_not_blank("").is_err());
    }

    #[test]
    fn test_validate_not_blank_error_message() {
        let err = validate_not_blank("\t").unwrap_err();
        assert_eq!(err.message.unwrap().to_string(), "Value must not be blank");
    }

    #[test]
    fn test_validate_printable() {
        assert!(validate_printable("Great host!\nWould join again.").is_ok());
        assert!(validate_printable("bell\u{7}").is_err());
    }

    #[test]
    fn test_validate_deadline_future() {
        let now = Utc::now();
        assert!(validate_deadline(now + Duration::hours(1), now, 30).is_ok());
    }

    #[test]
    fn test_validate_deadline_rejects_now_and_past() {
        let now = Utc::now();
        let err = validate_deadline(now, now, 30).unwrap_err();
        assert_eq!(err.code, "deadline_past");
        assert!(validate_deadline(now - Duration::minutes(1), now, 30).is_err());
    }

    #[test]
    fn test_validate_deadline_horizon() {
        let now = Utc::now();
        assert!(validate_deadline(now + Duration::days(30), now, 30).is_ok());
        let err = validate_deadline(now + Duration::days(31), now, 30).unwrap_err();
        assert_eq!(err.code, "deadline_too_far");
    }
}
