//! Job lifecycle status and its transition rules.
//!
//! The discriminants match the seed order of the `job_statuses` lookup
//! table. Status only moves forward along
//!
//! ```text
//! uploading -> training -> generating_free -> complete_free -> generating_full -> complete
//! ```
//!
//! with `failed` reachable from `uploading`, `training` and both
//! `generating_*` states.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Status ID type matching SMALLINT in the database.
pub type StatusId = i16;

#[repr(i16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Uploading = 1,
    Training = 2,
    GeneratingFree = 3,
    CompleteFree = 4,
    GeneratingFull = 5,
    Complete = 6,
    Failed = 7,
}

/// Every status, in lifecycle order.
pub const ALL_STATUSES: [JobStatus; 7] = [
    JobStatus::Uploading,
    JobStatus::Training,
    JobStatus::GeneratingFree,
    JobStatus::CompleteFree,
    JobStatus::GeneratingFull,
    JobStatus::Complete,
    JobStatus::Failed,
];

impl JobStatus {
    /// Return the database status ID.
    pub fn id(self) -> StatusId {
        self as StatusId
    }

    /// Resolve a database status ID.
    pub fn from_id(id: StatusId) -> Option<Self> {
        ALL_STATUSES.into_iter().find(|s| s.id() == id)
    }

    /// Wire / lookup-table name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Uploading => "uploading",
            Self::Training => "training",
            Self::GeneratingFree => "generating_free",
            Self::CompleteFree => "complete_free",
            Self::GeneratingFull => "generating_full",
            Self::Complete => "complete",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }

    /// Whether the job can still be moved to `failed`.
    pub fn can_fail(self) -> bool {
        matches!(
            self,
            Self::Uploading | Self::Training | Self::GeneratingFree | Self::GeneratingFull
        )
    }

    /// The single forward successor of this status, if any.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Uploading => Some(Self::Training),
            Self::Training => Some(Self::GeneratingFree),
            Self::GeneratingFree => Some(Self::CompleteFree),
            Self::CompleteFree => Some(Self::GeneratingFull),
            Self::GeneratingFull => Some(Self::Complete),
            Self::Complete | Self::Failed => None,
        }
    }

    /// Whether `self -> to` is a legal transition.
    pub fn can_transition_to(self, to: Self) -> bool {
        if to == Self::Failed {
            return self.can_fail();
        }
        self.next() == Some(to)
    }

    /// Statuses from which `to` may be entered.
    ///
    /// This is the predecessor set used for conditional updates: a write
    /// that moves a job into `to` only applies when the stored status is
    /// one of these.
    pub fn predecessors(to: Self) -> Vec<Self> {
        ALL_STATUSES
            .into_iter()
            .filter(|from| from.can_transition_to(to))
            .collect()
    }

    /// Whether this status lies strictly after `other` in the forward chain.
    ///
    /// `failed` is not ordered against the forward chain and always
    /// returns `false` on either side.
    pub fn is_past(self, other: Self) -> bool {
        if self == Self::Failed || other == Self::Failed {
            return false;
        }
        self.id() > other.id()
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_round_trip_through_lookup() {
        for status in ALL_STATUSES {
            assert_eq!(JobStatus::from_id(status.id()), Some(status));
        }
        assert_eq!(JobStatus::from_id(0), None);
        assert_eq!(JobStatus::from_id(8), None);
    }

    #[test]
    fn forward_chain_is_linear() {
        assert!(JobStatus::Uploading.can_transition_to(JobStatus::Training));
        assert!(JobStatus::Training.can_transition_to(JobStatus::GeneratingFree));
        assert!(JobStatus::GeneratingFree.can_transition_to(JobStatus::CompleteFree));
        assert!(JobStatus::CompleteFree.can_transition_to(JobStatus::GeneratingFull));
        assert!(JobStatus::GeneratingFull.can_transition_to(JobStatus::Complete));
    }

    #[test]
    fn no_skipping_or_going_back() {
        assert!(!JobStatus::Uploading.can_transition_to(JobStatus::GeneratingFree));
        assert!(!JobStatus::CompleteFree.can_transition_to(JobStatus::Training));
        assert!(!JobStatus::Complete.can_transition_to(JobStatus::GeneratingFull));
    }

    #[test]
    fn failed_reachable_only_from_active_states() {
        assert_eq!(
            JobStatus::predecessors(JobStatus::Failed),
            vec![
                JobStatus::Uploading,
                JobStatus::Training,
                JobStatus::GeneratingFree,
                JobStatus::GeneratingFull,
            ]
        );
        assert!(!JobStatus::CompleteFree.can_transition_to(JobStatus::Failed));
        assert!(!JobStatus::Failed.can_transition_to(JobStatus::Failed));
    }

    #[test]
    fn predecessors_of_generating_full() {
        assert_eq!(
            JobStatus::predecessors(JobStatus::GeneratingFull),
            vec![JobStatus::CompleteFree]
        );
    }

    #[test]
    fn serializes_as_snake_case() {
        let json = serde_json::to_string(&JobStatus::GeneratingFree).unwrap();
        assert_eq!(json, "\"generating_free\"");
        assert_eq!(JobStatus::CompleteFree.to_string(), "complete_free");
    }

    #[test]
    fn is_past_ignores_failed() {
        assert!(JobStatus::CompleteFree.is_past(JobStatus::Training));
        assert!(!JobStatus::Training.is_past(JobStatus::Training));
        assert!(!JobStatus::Failed.is_past(JobStatus::Training));
    }
}
