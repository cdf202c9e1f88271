//! AMI-available handler: close out the cycle and mark the project READY

use crate::events::ImageStateEvent;
use crate::store::{MetaStore, ProjectStatus, ProjectStore};
use anyhow::Result;
use tracing::{info, warn};

/// Handle an AMI state-change event.
///
/// Finds the project whose registered AMI just became available, deletes the
/// cycle's meta rows (best-effort: a stale row is a harmless leftover, not a
/// blocker), and flips the project to READY. Safe to re-deliver: the second
/// pass finds no meta rows and re-sets READY.
pub async fn mark_ready(
    event: &ImageStateEvent,
    projects: &impl ProjectStore,
    meta: &impl MetaStore,
) -> Result<()> {
    if event.detail.state.as_deref() != Some("available") {
        return Ok(());
    }

    let Some(ami_id) = event.detail.image_id.as_deref() else {
        warn!("Missing ami id in event");
        return Ok(());
    };

    let Some(record) = projects.find_by_image(ami_id).await? else {
        warn!(ami_id = %ami_id, "No main entry found for ami");
        return Ok(());
    };

    info!(project = %record.project, ami_id = %ami_id, "Marking project ready");

    for row in meta.list_project(&record.project).await? {
        match meta.delete(&record.project, &row.volume_id).await {
            Ok(()) => {
                info!(project = %record.project, volume_id = %row.volume_id, "Deleted meta row");
            }
            Err(err) => {
                warn!(
                    project = %record.project,
                    volume_id = %row.volume_id,
                    error = ?err,
                    "Failed to delete meta row"
                );
            }
        }
    }

    projects
        .set_status(&record.project, ProjectStatus::Ready)
        .await?;
    Ok(())
}
