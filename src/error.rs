//! Typed fatal errors for the lifecycle state machine
//!
//! Expected-absence conditions (no project tag, no matching row) are not
//! errors; handlers log them and return. The variants here are the faults
//! that must propagate: broken uniqueness/consistency invariants and a
//! cleanup that never converged.

use thiserror::Error;

/// Fatal lifecycle faults.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// A volume attached to the shutting-down instance has no attachment
    /// entry for that instance; registering an AMI from it would produce a
    /// wrong device mapping.
    #[error("volume {volume_id} missing attachment for instance {instance_id}")]
    MissingAttachment {
        volume_id: String,
        instance_id: String,
    },

    /// More than one meta row claims the same snapshot id.
    #[error("expected exactly one meta entry for snapshot {snapshot_id}, found {count}")]
    DuplicateSnapshotId { snapshot_id: String, count: usize },

    /// A deregistered AMI was still describable after the polling budget.
    #[error("timed out waiting for AMI {ami_id} to deregister after {attempts} attempts")]
    CleanupTimeout { ami_id: String, attempts: u32 },
}
