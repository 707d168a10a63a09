//! Validation helpers for DTOs.

use time::{
    Date, OffsetDateTime,
    format_description::{BorrowedFormatItem, well_known::Rfc3339},
    macros::format_description,
};
use validator::ValidationError;

use crate::dao::models::ActionStatus;

/// Wire format of action item due dates.
pub const DUE_DATE_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day]");

/// Parse a `YYYY-MM-DD` due date.
pub fn parse_due_date(value: &str) -> Option<Date> {
    Date::parse(value, DUE_DATE_FORMAT).ok()
}

/// Validates that a due date is a calendar date formatted as `YYYY-MM-DD`.
///
/// # Examples
///
/// ```ignore
/// validate_due_date("2024-03-31") // Ok
/// validate_due_date("2024-02-30") // Err - no such day
/// validate_due_date("31/03/2024") // Err - wrong format
/// ```
pub fn validate_due_date(value: &str) -> Result<(), ValidationError> {
    if parse_due_date(value).is_some() {
        return Ok(());
    }
    let mut err = ValidationError::new("due_date_format");
    err.message = Some(format!("invalid due date `{value}`: expected YYYY-MM-DD").into());
    Err(err)
}

/// Validates an action item status name.
pub fn validate_action_status(value: &str) -> Result<(), ValidationError> {
    value.parse::<ActionStatus>().map(|_| ()).map_err(|message| {
        let mut err = ValidationError::new("action_status");
        err.message = Some(message.into());
        err
    })
}

/// Validates an RFC 3339 timestamp.
pub fn validate_rfc3339(value: &str) -> Result<(), ValidationError> {
    if OffsetDateTime::parse(value, &Rfc3339).is_ok() {
        return Ok(());
    }
    let mut err = ValidationError::new("timestamp_format");
    err.message = Some(format!("invalid timestamp `{value}`: expected RFC 3339").into());
    Err(err)
}
