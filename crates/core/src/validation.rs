//! Input validation for new submissions.

use validator::ValidateEmail;

use crate::error::CoreError;

/// Minimum number of training photos per submission.
pub const MIN_PHOTOS: i16 = 10;

/// Maximum number of training photos per submission.
pub const MAX_PHOTOS: i16 = 15;

/// Normalize and validate a submitter identity (email address).
///
/// Returns the trimmed, lowercased address so dedup lookups compare equal
/// regardless of how the client typed it.
pub fn normalize_submitter(raw: &str) -> Result<String, CoreError> {
    let email = raw.trim().to_lowercase();
    if email.is_empty() {
        return Err(CoreError::Validation("email is required".into()));
    }
    if !email.validate_email() {
        return Err(CoreError::Validation(format!(
            "'{}' is not a valid email address",
            raw.trim()
        )));
    }
    Ok(email)
}

/// Validate the number of photos submitted for training.
pub fn validate_photo_count(count: usize) -> Result<i16, CoreError> {
    let in_range = i16::try_from(count)
        .ok()
        .filter(|c| (MIN_PHOTOS..=MAX_PHOTOS).contains(c));
    in_range.ok_or_else(|| {
        CoreError::Validation(format!(
            "photo count must be between {MIN_PHOTOS} and {MAX_PHOTOS}, got {count}"
        ))
    })
}
