//! AMI cleanup: deregister an image and remove its backing snapshots

use crate::aws::Ec2Lifecycle;
use crate::config::LifecycleConfig;
use crate::error::LifecycleError;
use anyhow::Result;
use tracing::{info, warn};

/// Deregister an AMI, best-effort delete its backing snapshots, then poll
/// until the image id stops resolving.
///
/// Individual snapshot deletions that fail are logged and skipped; a leaked
/// snapshot costs money, not correctness. The final poll is load-bearing:
/// the caller is about to register a replacement AMI and must not do so
/// while the old image's disposition is unknown, so exhausting the polling
/// budget is a fatal `CleanupTimeout`.
pub async fn cleanup_image_and_snapshots(
    ami_id: &str,
    ec2: &impl Ec2Lifecycle,
    config: &LifecycleConfig,
) -> Result<()> {
    let Some(image) = ec2.describe_image(ami_id).await? else {
        info!(ami_id = %ami_id, "Ami already gone");
        return Ok(());
    };

    info!(
        ami_id = %ami_id,
        snapshot_ids = ?image.snapshot_ids,
        "Ami backed by snapshots"
    );

    info!(ami_id = %ami_id, "Deregistering ami");
    ec2.deregister_image(ami_id).await?;

    for snapshot_id in &image.snapshot_ids {
        info!(snapshot_id = %snapshot_id, "Deleting snapshot");
        if let Err(err) = ec2.delete_snapshot(snapshot_id).await {
            warn!(snapshot_id = %snapshot_id, error = ?err, "Failed to delete snapshot");
        }
    }

    info!(ami_id = %ami_id, "Waiting for ami to vanish");
    for attempt in 1..=config.cleanup_max_attempts {
        tokio::time::sleep(config.cleanup_wait).await;

        // A not-found describe means the image is gone: success. Any other
        // describe error propagates.
        match ec2.describe_image(ami_id).await? {
            None => {
                info!(ami_id = %ami_id, "Ami no longer exists");
                info!(ami_id = %ami_id, "Cleanup complete");
                return Ok(());
            }
            Some(_) => {
                info!(ami_id = %ami_id, attempt = attempt, "Ami still present");
            }
        }
    }

    Err(LifecycleError::CleanupTimeout {
        ami_id: ami_id.to_string(),
        attempts: config.cleanup_max_attempts,
    }
    .into())
}
