//! Snapshot-completion handler: register the replacement AMI once every
//! volume in the cycle is captured

use crate::aws::ec2::{Ec2Lifecycle, MappingSpec, RegisterImageRequest};
use crate::config::{LifecycleConfig, DEFAULT_VOLUME_TYPE};
use crate::error::LifecycleError;
use crate::events::{snapshot_id_from_arn, SnapshotCompletionEvent};
use crate::lifecycle::cleanup::cleanup_image_and_snapshots;
use crate::store::{MetaState, MetaStore, ProjectStatus, ProjectStore};
use crate::tags::TAG_MANAGED_BY;
use anyhow::Result;
use tracing::{info, warn};

/// Handle a snapshot-completion event.
///
/// Marks the volume's meta row COMPLETED, and when that was the last
/// outstanding volume for the project, disposes of the prior AMI (cleaned up
/// when self-managed, left alone otherwise) and registers the replacement,
/// moving the project to IMAGING.
pub async fn create_image(
    event: &SnapshotCompletionEvent,
    ec2: &impl Ec2Lifecycle,
    projects: &impl ProjectStore,
    meta: &impl MetaStore,
    config: &LifecycleConfig,
) -> Result<()> {
    if event.detail.result.as_deref() != Some("succeeded") {
        return Ok(());
    }

    let Some(snapshot_arn) = event.detail.snapshot_id.as_deref() else {
        warn!("No snapshot arn in event");
        return Ok(());
    };
    let snapshot_id = snapshot_id_from_arn(snapshot_arn);

    let rows = meta.find_by_snapshot(snapshot_id).await?;
    if rows.is_empty() {
        // Unrelated snapshot, or the cycle was already cleaned up.
        warn!(snapshot_id = %snapshot_id, "No meta entry found for snapshot");
        return Ok(());
    }
    if rows.len() != 1 {
        return Err(LifecycleError::DuplicateSnapshotId {
            snapshot_id: snapshot_id.to_string(),
            count: rows.len(),
        }
        .into());
    }
    let row = &rows[0];
    info!(
        snapshot_id = %snapshot_id,
        project = %row.project,
        volume_id = %row.volume_id,
        instance_id = %row.instance_id,
        device_name = %row.device_name,
        "Snapshot completed"
    );

    meta.mark_completed(&row.project, &row.volume_id).await?;

    let Some(main) = projects.get(&row.project).await? else {
        warn!(project = %row.project, "No main entry found");
        return Ok(());
    };

    let all = meta.list_project(&row.project).await?;
    let done = all
        .iter()
        .filter(|m| m.state == MetaState::Completed)
        .count();

    info!(
        project = %row.project,
        done = done,
        total = main.volume_count,
        "Snapshot completion progress"
    );
    if (done as u32) < main.volume_count {
        return Ok(());
    }

    let mut mappings = Vec::with_capacity(all.len());
    for item in &all {
        let snapshot = ec2.describe_snapshot(&item.snapshot_id).await?;
        mappings.push(MappingSpec {
            device_name: item.device_name.clone(),
            snapshot_id: item.snapshot_id.clone(),
            volume_size: snapshot.volume_size,
            volume_type: snapshot
                .volume_type
                .unwrap_or_else(|| DEFAULT_VOLUME_TYPE.to_string()),
        });
    }

    let root = match all
        .iter()
        .find(|m| Some(m.device_name.as_str()) == main.root_device_name.as_deref())
    {
        Some(row) => row,
        None => {
            warn!(
                project = %row.project,
                root_device_name = ?main.root_device_name,
                "No meta row matches the root device; falling back to the first volume"
            );
            &all[0]
        }
    };

    if let Some(old_ami) = main.ami.as_deref() {
        match ec2.describe_image(old_ami).await? {
            None => {
                // The recorded AMI vanished underneath us; registering a
                // replacement on top of an unknown disposition needs an
                // operator, not a guess.
                warn!(ami_id = %old_ami, "Old ami not found");
                return Ok(());
            }
            Some(image) => {
                if image.tags.get(TAG_MANAGED_BY) == Some(&config.managed_by_tag) {
                    info!(ami_id = %old_ami, project = %row.project, "Cleaning up old ami");
                    cleanup_image_and_snapshots(old_ami, ec2, config).await?;
                } else {
                    info!(ami_id = %old_ami, project = %row.project, "Old ami not managed by devbox");
                }
            }
        }
    }

    // Two invocations racing on the same last-volume completion can both
    // reach this point and both register; there is no conditional check on
    // Status. Accepted: completions for one project arrive sequentially in
    // practice.
    let new_ami = ec2
        .register_image(RegisterImageRequest {
            name: format!("{}-ami", row.project),
            project: row.project.clone(),
            managed_by: config.managed_by_tag.clone(),
            root_device_name: root.device_name.clone(),
            architecture: main.architecture.clone(),
            virtualization_type: main.virtualization_type.clone(),
            mappings,
        })
        .await?;
    info!(ami_id = %new_ami, project = %row.project, "Registered new ami");

    projects
        .set_image(&row.project, &new_ami, ProjectStatus::Imaging)
        .await?;
    Ok(())
}
