//! State store for the lifecycle state machine
//!
//! Two tables track a project's progress through a snapshot cycle: the main
//! table holds one row per project (aggregate status plus the
//! currently-registered AMI), the meta table one row per project+volume
//! (that volume's snapshot progress). Handlers only see the `ProjectStore`
//! and `MetaStore` traits; `dynamodb` implements them against AWS and
//! `memory` backs the test suite.

pub mod dynamodb;
pub mod memory;

pub use dynamodb::{DynamoMetaStore, DynamoProjectStore};
pub use memory::{InMemoryMetaStore, InMemoryProjectStore};

use anyhow::Result;

/// Aggregate lifecycle status of a project.
///
/// `nonexistent → SNAPSHOTTING → IMAGING → READY`, re-entering SNAPSHOTTING
/// on the next shutdown. ERROR is reached when a volume detaches before its
/// snapshot completes; there is no automatic recovery from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectStatus {
    Snapshotting,
    Imaging,
    Ready,
    Error,
}

impl ProjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectStatus::Snapshotting => "SNAPSHOTTING",
            ProjectStatus::Imaging => "IMAGING",
            ProjectStatus::Ready => "READY",
            ProjectStatus::Error => "ERROR",
        }
    }

    /// Parse a stored status value. Unknown values are `None`; callers treat
    /// that as a data-consistency fault rather than coercing.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "SNAPSHOTTING" => Some(ProjectStatus::Snapshotting),
            "IMAGING" => Some(ProjectStatus::Imaging),
            "READY" => Some(ProjectStatus::Ready),
            "ERROR" => Some(ProjectStatus::Error),
            _ => None,
        }
    }
}

impl std::fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot progress of a single volume within a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaState {
    Pending,
    Completed,
}

impl MetaState {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetaState::Pending => "PENDING",
            MetaState::Completed => "COMPLETED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(MetaState::Pending),
            "COMPLETED" => Some(MetaState::Completed),
            _ => None,
        }
    }
}

impl std::fmt::Display for MetaState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-project row in the main table.
///
/// Overwritten wholesale at the start of each cycle (only `username` is
/// preserved across overwrites); `ami`/`status` are updated in place as the
/// cycle progresses. `last_*`, `username` and `cname_domain` are carried for
/// the launch/DNS tooling and never read by the lifecycle itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectRecord {
    pub project: String,
    pub status: ProjectStatus,
    /// Currently-registered AMI for this project, once one exists
    pub ami: Option<String>,
    /// Volumes expected to be snapshotted this cycle
    pub volume_count: u32,
    pub root_device_name: Option<String>,
    pub architecture: Option<String>,
    pub virtualization_type: Option<String>,
    pub last_instance_type: Option<String>,
    pub last_key_pair: Option<String>,
    /// Cached SSH login name; empty when never set
    pub username: String,
    pub cname_domain: Option<String>,
}

/// Per-project-per-volume row in the meta table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaRecord {
    pub project: String,
    pub volume_id: String,
    pub instance_id: String,
    pub device_name: String,
    pub snapshot_id: String,
    pub state: MetaState,
}

/// Main-table operations the handlers depend on.
#[allow(async_fn_in_trait)] // Internal use only, Send + Sync bounds on the trait suffice
pub trait ProjectStore: Send + Sync {
    /// Fetch a project row; `None` when the project does not exist
    async fn get(&self, project: &str) -> Result<Option<ProjectRecord>>;

    /// Overwrite a project row
    async fn put(&self, record: &ProjectRecord) -> Result<()>;

    /// Update only the status attribute
    async fn set_status(&self, project: &str, status: ProjectStatus) -> Result<()>;

    /// Update the registered AMI and status together
    async fn set_image(&self, project: &str, ami_id: &str, status: ProjectStatus) -> Result<()>;

    /// Find the project whose registered AMI equals `ami_id`.
    ///
    /// A linear scan: `ami` is not a key. The table holds one row per
    /// project, so this stays proportionate.
    async fn find_by_image(&self, ami_id: &str) -> Result<Option<ProjectRecord>>;
}

/// Meta-table operations the handlers depend on.
#[allow(async_fn_in_trait)] // Internal use only, Send + Sync bounds on the trait suffice
pub trait MetaStore: Send + Sync {
    /// Write a per-volume row
    async fn put(&self, record: &MetaRecord) -> Result<()>;

    /// Look up rows by snapshot id (secondary index).
    ///
    /// Returns all matches so the caller can enforce the one-row-per-snapshot
    /// invariant instead of picking one arbitrarily.
    async fn find_by_snapshot(&self, snapshot_id: &str) -> Result<Vec<MetaRecord>>;

    /// Find the row tracking `volume_id`, if any (linear scan)
    async fn find_by_volume(&self, volume_id: &str) -> Result<Option<MetaRecord>>;

    /// All rows for a project's current cycle
    async fn list_project(&self, project: &str) -> Result<Vec<MetaRecord>>;

    /// Mark a volume's snapshot as completed
    async fn mark_completed(&self, project: &str, volume_id: &str) -> Result<()>;

    /// Delete one per-volume row
    async fn delete(&self, project: &str, volume_id: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_status_round_trips() {
        for status in [
            ProjectStatus::Snapshotting,
            ProjectStatus::Imaging,
            ProjectStatus::Ready,
            ProjectStatus::Error,
        ] {
            assert_eq!(ProjectStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(ProjectStatus::parse("UNKNOWN"), None);
    }

    #[test]
    fn meta_state_round_trips() {
        for state in [MetaState::Pending, MetaState::Completed] {
            assert_eq!(MetaState::parse(state.as_str()), Some(state));
        }
        assert_eq!(MetaState::parse("unknown"), None);
    }
}
