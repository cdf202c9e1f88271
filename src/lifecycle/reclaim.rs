//! Detached-volume handler: reclaim captured volumes, flag lost ones

use crate::aws::Ec2Lifecycle;
use crate::events::VolumeStateEvent;
use crate::store::{MetaState, MetaStore, ProjectStatus, ProjectStore};
use anyhow::Result;
use tracing::{error, info, warn};

/// Handle a volume state-change event.
///
/// A tracked volume that detaches after its snapshot completed is deleted
/// (best-effort; a leaked volume is a cost issue). One that detaches while
/// its snapshot is still pending has escaped capture: the owning project is
/// flagged ERROR and the volume kept, stopping the lifecycle until an
/// operator intervenes.
pub async fn delete_volume(
    event: &VolumeStateEvent,
    ec2: &impl Ec2Lifecycle,
    projects: &impl ProjectStore,
    meta: &impl MetaStore,
) -> Result<()> {
    if event.detail.state.as_deref() != Some("available") {
        return Ok(());
    }

    let Some(volume_id) = event.detail.volume_id.as_deref() else {
        warn!("Missing volume id in event");
        return Ok(());
    };

    let Some(row) = meta.find_by_volume(volume_id).await? else {
        // Not a devbox-managed volume, or the cycle is already closed out.
        info!(volume_id = %volume_id, "Volume not found in meta");
        return Ok(());
    };

    if row.state == MetaState::Completed {
        info!(volume_id = %volume_id, project = %row.project, "Deleting detached volume");
        if let Err(err) = ec2.delete_volume(volume_id).await {
            error!(volume_id = %volume_id, error = ?err, "Error deleting volume");
        }
        return Ok(());
    }

    warn!(
        volume_id = %volume_id,
        project = %row.project,
        "Volume not snapshotted; marking error"
    );
    projects
        .set_status(&row.project, ProjectStatus::Error)
        .await?;
    Ok(())
}
