//! EC2 operations for the snapshot/AMI lifecycle
//!
//! `Ec2Lifecycle` is the capability surface the handlers consume; it exists
//! so the state machine can be driven against test doubles without hitting
//! real AWS. `Ec2Client` is the thin SDK-backed implementation.

use crate::aws::error::is_image_not_found;
use crate::aws::AwsContext;
use crate::tags::{image_tag_spec, snapshot_tag_spec, tag_map};
use anyhow::{Context, Result};
use aws_sdk_ec2::types::{
    ArchitectureValues, BlockDeviceMapping, EbsBlockDevice, Filter, Image, Instance, Volume,
    VolumeType,
};
use aws_sdk_ec2::Client;
use std::collections::HashMap;
use tracing::debug;

/// A shutting-down instance, described for snapshotting.
#[derive(Debug, Clone)]
pub struct InstanceDescription {
    pub instance_id: String,
    pub image_id: Option<String>,
    pub root_device_name: Option<String>,
    pub architecture: Option<String>,
    pub virtualization_type: Option<String>,
    pub instance_type: Option<String>,
    pub key_name: Option<String>,
    pub tags: HashMap<String, String>,
    /// EBS volumes attached to this instance
    pub volumes: Vec<AttachedVolume>,
}

/// An EBS volume and its attachment records.
#[derive(Debug, Clone)]
pub struct AttachedVolume {
    pub volume_id: String,
    pub attachments: Vec<Attachment>,
}

/// One volume attachment (which instance, which device).
#[derive(Debug, Clone)]
pub struct Attachment {
    pub instance_id: String,
    pub device: String,
}

impl AttachedVolume {
    /// Device name under which this volume is attached to `instance_id`.
    pub fn device_for(&self, instance_id: &str) -> Option<&str> {
        self.attachments
            .iter()
            .find(|a| a.instance_id == instance_id)
            .map(|a| a.device.as_str())
    }
}

/// Snapshot metadata needed to rebuild a block-device mapping.
///
/// `volume_type` is `None` when the describe response does not report one
/// (the EC2 API never does); registration falls back to the default class.
#[derive(Debug, Clone)]
pub struct SnapshotDescription {
    pub volume_size: Option<i32>,
    pub volume_type: Option<String>,
}

/// A registered AMI: its tags and the snapshots backing it.
#[derive(Debug, Clone)]
pub struct ImageDescription {
    pub image_id: String,
    pub tags: HashMap<String, String>,
    /// Snapshot ids referenced by the image's block-device mappings
    pub snapshot_ids: Vec<String>,
}

/// One block-device mapping for AMI registration.
#[derive(Debug, Clone)]
pub struct MappingSpec {
    pub device_name: String,
    pub snapshot_id: String,
    pub volume_size: Option<i32>,
    pub volume_type: String,
}

/// Parameters for registering a replacement AMI.
#[derive(Debug, Clone)]
pub struct RegisterImageRequest {
    pub name: String,
    pub project: String,
    pub managed_by: String,
    pub root_device_name: String,
    /// Omitted from the call when absent; the platform default applies
    pub architecture: Option<String>,
    /// Omitted from the call when absent; the platform default applies
    pub virtualization_type: Option<String>,
    pub mappings: Vec<MappingSpec>,
}

/// EC2 operations the lifecycle handlers depend on.
///
/// Implemented by `Ec2Client` against real AWS and by in-memory fakes in the
/// test suite.
#[allow(async_fn_in_trait)] // Internal use only, Send + Sync bounds on the trait suffice
pub trait Ec2Lifecycle: Send + Sync {
    /// Describe an instance together with its attached volumes
    async fn describe_instance(&self, instance_id: &str) -> Result<InstanceDescription>;

    /// Create a snapshot of a volume, tagged with project and volume id;
    /// returns the new snapshot id
    async fn create_snapshot(&self, project: &str, volume_id: &str) -> Result<String>;

    /// Describe a snapshot's volume size/type
    async fn describe_snapshot(&self, snapshot_id: &str) -> Result<SnapshotDescription>;

    /// Describe an image; `None` when the id no longer resolves
    async fn describe_image(&self, image_id: &str) -> Result<Option<ImageDescription>>;

    /// Register a new AMI from snapshot-backed block-device mappings;
    /// returns the new image id
    async fn register_image(&self, request: RegisterImageRequest) -> Result<String>;

    /// Deregister an AMI
    async fn deregister_image(&self, image_id: &str) -> Result<()>;

    /// Delete a snapshot
    async fn delete_snapshot(&self, snapshot_id: &str) -> Result<()>;

    /// Delete a detached volume
    async fn delete_volume(&self, volume_id: &str) -> Result<()>;
}

/// EC2 client for lifecycle operations
pub struct Ec2Client {
    client: Client,
}

impl Ec2Client {
    /// Create an EC2 client from a pre-loaded AWS context
    pub fn from_context(ctx: &AwsContext) -> Self {
        Self {
            client: ctx.ec2_client(),
        }
    }
}

impl Ec2Lifecycle for Ec2Client {
    async fn describe_instance(&self, instance_id: &str) -> Result<InstanceDescription> {
        let response = self
            .client
            .describe_instances()
            .instance_ids(instance_id)
            .send()
            .await
            .context("Failed to describe instance")?;

        let instance = response
            .reservations()
            .iter()
            .flat_map(|r| r.instances())
            .next()
            .with_context(|| format!("Instance {instance_id} not found"))?;

        let volumes = self
            .client
            .describe_volumes()
            .filters(
                Filter::builder()
                    .name("attachment.instance-id")
                    .values(instance_id)
                    .build(),
            )
            .send()
            .await
            .context("Failed to describe attached volumes")?;

        Ok(instance_description_from(
            instance,
            volumes.volumes(),
        ))
    }

    async fn create_snapshot(&self, project: &str, volume_id: &str) -> Result<String> {
        let response = self
            .client
            .create_snapshot()
            .volume_id(volume_id)
            .description(format!("{project}-{volume_id}"))
            .tag_specifications(snapshot_tag_spec(project, volume_id))
            .send()
            .await
            .with_context(|| format!("Failed to create snapshot of {volume_id}"))?;

        let snapshot_id = response
            .snapshot_id()
            .context("CreateSnapshot returned no snapshot id")?;

        Ok(snapshot_id.to_string())
    }

    async fn describe_snapshot(&self, snapshot_id: &str) -> Result<SnapshotDescription> {
        let response = self
            .client
            .describe_snapshots()
            .snapshot_ids(snapshot_id)
            .send()
            .await
            .with_context(|| format!("Failed to describe snapshot {snapshot_id}"))?;

        let snapshot = response
            .snapshots()
            .first()
            .with_context(|| format!("Snapshot {snapshot_id} not found"))?;

        Ok(SnapshotDescription {
            volume_size: snapshot.volume_size(),
            // DescribeSnapshots does not report a volume type
            volume_type: None,
        })
    }

    async fn describe_image(&self, image_id: &str) -> Result<Option<ImageDescription>> {
        match self
            .client
            .describe_images()
            .image_ids(image_id)
            .send()
            .await
        {
            Ok(response) => Ok(response.images().first().map(image_description_from)),
            Err(err) if is_image_not_found(&err) => {
                debug!(image_id = %image_id, "Image id does not resolve");
                Ok(None)
            }
            Err(err) => Err(err).context("Failed to describe image"),
        }
    }

    async fn register_image(&self, request: RegisterImageRequest) -> Result<String> {
        let mut call = self
            .client
            .register_image()
            .name(&request.name)
            .root_device_name(&request.root_device_name)
            .tag_specifications(image_tag_spec(&request.project, &request.managed_by));

        if let Some(arch) = &request.architecture {
            call = call.architecture(ArchitectureValues::from(arch.as_str()));
        }
        if let Some(virt) = &request.virtualization_type {
            call = call.virtualization_type(virt);
        }

        for mapping in &request.mappings {
            call = call.block_device_mappings(
                BlockDeviceMapping::builder()
                    .device_name(&mapping.device_name)
                    .ebs(
                        EbsBlockDevice::builder()
                            .snapshot_id(&mapping.snapshot_id)
                            .set_volume_size(mapping.volume_size)
                            .volume_type(VolumeType::from(mapping.volume_type.as_str()))
                            .delete_on_termination(true)
                            .build(),
                    )
                    .build(),
            );
        }

        let response = call.send().await.context("Failed to register image")?;

        let image_id = response
            .image_id()
            .context("RegisterImage returned no image id")?;

        Ok(image_id.to_string())
    }

    async fn deregister_image(&self, image_id: &str) -> Result<()> {
        self.client
            .deregister_image()
            .image_id(image_id)
            .send()
            .await
            .with_context(|| format!("Failed to deregister image {image_id}"))?;
        Ok(())
    }

    async fn delete_snapshot(&self, snapshot_id: &str) -> Result<()> {
        self.client
            .delete_snapshot()
            .snapshot_id(snapshot_id)
            .send()
            .await
            .with_context(|| format!("Failed to delete snapshot {snapshot_id}"))?;
        Ok(())
    }

    async fn delete_volume(&self, volume_id: &str) -> Result<()> {
        self.client
            .delete_volume()
            .volume_id(volume_id)
            .send()
            .await
            .with_context(|| format!("Failed to delete volume {volume_id}"))?;
        Ok(())
    }
}

/// Map an SDK instance plus its attached volumes into an `InstanceDescription`.
fn instance_description_from(instance: &Instance, volumes: &[Volume]) -> InstanceDescription {
    InstanceDescription {
        instance_id: instance.instance_id().unwrap_or_default().to_string(),
        image_id: instance.image_id().map(str::to_string),
        root_device_name: instance.root_device_name().map(str::to_string),
        architecture: instance.architecture().map(|a| a.as_str().to_string()),
        virtualization_type: instance
            .virtualization_type()
            .map(|v| v.as_str().to_string()),
        instance_type: instance.instance_type().map(|t| t.as_str().to_string()),
        key_name: instance.key_name().map(str::to_string),
        tags: tag_map(instance.tags()),
        volumes: volumes
            .iter()
            .map(|v| AttachedVolume {
                volume_id: v.volume_id().unwrap_or_default().to_string(),
                attachments: v
                    .attachments()
                    .iter()
                    .map(|a| Attachment {
                        instance_id: a.instance_id().unwrap_or_default().to_string(),
                        device: a.device().unwrap_or_default().to_string(),
                    })
                    .collect(),
            })
            .collect(),
    }
}

/// Map an SDK image into an `ImageDescription`.
fn image_description_from(image: &Image) -> ImageDescription {
    ImageDescription {
        image_id: image.image_id().unwrap_or_default().to_string(),
        tags: tag_map(image.tags()),
        snapshot_ids: image
            .block_device_mappings()
            .iter()
            .filter_map(|m| m.ebs().and_then(|e| e.snapshot_id()))
            .map(str::to_string)
            .collect(),
    }
}
