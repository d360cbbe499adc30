//! Per-item regeneration quota.
//!
//! Pure predicate over an [`OutputItem`]; the count itself is persisted on
//! the item by the store.

use crate::error::CoreError;
use crate::job::OutputItem;

/// Maximum number of regenerations allowed per output item.
pub const MAX_REGENERATIONS: i32 = 3;

/// Check whether `item` may be regenerated.
///
/// Returns the count to persist after a successful regeneration, or
/// [`CoreError::QuotaExceeded`] once the cap is reached.
pub fn check_regeneration(item: &OutputItem) -> Result<i32, CoreError> {
    if item.regeneration_count >= MAX_REGENERATIONS {
        return Err(CoreError::QuotaExceeded {
            used: item.regeneration_count,
            max: MAX_REGENERATIONS,
        });
    }
    Ok(item.regeneration_count + 1)
}

/// Attempts left after `count` regenerations. Never negative.
pub fn remaining_attempts(count: i32) -> i32 {
    (MAX_REGENERATIONS - count).max(0)
}
