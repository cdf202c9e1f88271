//! Shutdown handler: snapshot every volume attached to the instance

use crate::aws::Ec2Lifecycle;
use crate::error::LifecycleError;
use crate::events::InstanceStateEvent;
use crate::store::{MetaRecord, MetaState, MetaStore, ProjectRecord, ProjectStatus, ProjectStore};
use anyhow::Result;
use tracing::{info, warn};

/// Handle an instance state-change event by starting a snapshot cycle.
///
/// Only `shutting-down` events are acted on. The project row is overwritten
/// with a fresh `SNAPSHOTTING` record (preserving any externally-set
/// `Username`), and one tagged snapshot plus one PENDING meta row is created
/// per attached volume. Re-delivery of the same shutdown re-creates
/// snapshots; wasteful but safe, since later stages key off the fresh
/// snapshot ids.
pub async fn create_snapshots(
    event: &InstanceStateEvent,
    ec2: &impl Ec2Lifecycle,
    projects: &impl ProjectStore,
    meta: &impl MetaStore,
) -> Result<()> {
    if event.detail.state.as_deref() != Some("shutting-down") {
        return Ok(());
    }

    let Some(instance_id) = event.detail.instance_id.as_deref() else {
        warn!("Missing instance id in shutdown event");
        return Ok(());
    };

    let instance = ec2.describe_instance(instance_id).await?;

    let Some(project) = crate::tags::project_tag(&instance.tags).map(str::to_string) else {
        warn!(instance_id = %instance_id, "Instance missing project tag");
        return Ok(());
    };

    info!(instance_id = %instance_id, project = %project, "Creating snapshots");

    if instance.volumes.is_empty() {
        info!(project = %project, "No volumes attached; nothing to snapshot");
        return Ok(());
    }

    // Preserve an externally-set login name across the overwrite. Failing to
    // read the old row costs only that field, so it is not fatal.
    let username = match projects.get(&project).await {
        Ok(existing) => existing.map(|r| r.username).unwrap_or_default(),
        Err(err) => {
            warn!(project = %project, error = ?err, "Failed to retrieve existing username");
            String::new()
        }
    };

    projects
        .put(&ProjectRecord {
            project: project.clone(),
            status: ProjectStatus::Snapshotting,
            ami: instance.image_id.clone(),
            volume_count: instance.volumes.len() as u32,
            root_device_name: instance.root_device_name.clone(),
            architecture: instance.architecture.clone(),
            virtualization_type: instance.virtualization_type.clone(),
            last_instance_type: instance.instance_type.clone(),
            last_key_pair: instance.key_name.clone(),
            username,
            cname_domain: None,
        })
        .await?;

    for volume in &instance.volumes {
        let snapshot_id = ec2.create_snapshot(&project, &volume.volume_id).await?;
        info!(
            snapshot_id = %snapshot_id,
            volume_id = %volume.volume_id,
            project = %project,
            "Creating snapshot"
        );

        // A volume reported as attached to this instance must have a
        // matching attachment record; registering an AMI with a guessed
        // device mapping would corrupt the image.
        let device = volume.device_for(instance_id).ok_or_else(|| {
            LifecycleError::MissingAttachment {
                volume_id: volume.volume_id.clone(),
                instance_id: instance_id.to_string(),
            }
        })?;

        meta.put(&MetaRecord {
            project: project.clone(),
            volume_id: volume.volume_id.clone(),
            instance_id: instance_id.to_string(),
            device_name: device.to_string(),
            snapshot_id,
            state: MetaState::Pending,
        })
        .await?;
    }

    info!(
        project = %project,
        volume_count = instance.volumes.len(),
        "Snapshot creation complete"
    );
    Ok(())
}
