//! Shared test doubles for lifecycle integration tests

use anyhow::{bail, Result};
use devbox_lifecycle::aws::ec2::{
    AttachedVolume, Attachment, Ec2Lifecycle, ImageDescription, InstanceDescription,
    RegisterImageRequest, SnapshotDescription,
};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

/// In-memory EC2 capability: scripted instances/snapshots/images plus a log
/// of every mutating call, so tests can assert on exactly which side effects
/// a handler produced.
#[derive(Default)]
pub struct FakeEc2 {
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    instances: HashMap<String, InstanceDescription>,
    snapshots: HashMap<String, SnapshotDescription>,
    images: HashMap<String, ImageDescription>,
    /// Images whose deregistration never takes effect
    stuck_images: HashSet<String>,
    fail_volume_deletes: bool,
    snapshot_seq: u32,
    image_seq: u32,
    created_snapshots: Vec<(String, String, String)>,
    registered_images: Vec<RegisterImageRequest>,
    deregistered_images: Vec<String>,
    deleted_snapshots: Vec<String>,
    deleted_volumes: Vec<String>,
}

impl FakeEc2 {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_instance(&self, instance: InstanceDescription) {
        let mut state = self.state.lock().unwrap();
        state.instances.insert(instance.instance_id.clone(), instance);
    }

    pub fn add_snapshot(&self, snapshot_id: &str, volume_size: i32, volume_type: Option<&str>) {
        self.state.lock().unwrap().snapshots.insert(
            snapshot_id.to_string(),
            SnapshotDescription {
                volume_size: Some(volume_size),
                volume_type: volume_type.map(str::to_string),
            },
        );
    }

    pub fn add_image(&self, image_id: &str, tags: &[(&str, &str)], snapshot_ids: &[&str]) {
        self.state.lock().unwrap().images.insert(
            image_id.to_string(),
            ImageDescription {
                image_id: image_id.to_string(),
                tags: tags
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
                snapshot_ids: snapshot_ids.iter().map(|s| s.to_string()).collect(),
            },
        );
    }

    /// Make an image survive deregistration, as a stuck cleanup would
    pub fn mark_image_stuck(&self, image_id: &str) {
        self.state
            .lock()
            .unwrap()
            .stuck_images
            .insert(image_id.to_string());
    }

    pub fn fail_volume_deletes(&self) {
        self.state.lock().unwrap().fail_volume_deletes = true;
    }

    /// Snapshots created via `create_snapshot`, as (snapshot id, project, volume id)
    pub fn created_snapshots(&self) -> Vec<(String, String, String)> {
        self.state.lock().unwrap().created_snapshots.clone()
    }

    pub fn registered_images(&self) -> Vec<RegisterImageRequest> {
        self.state.lock().unwrap().registered_images.clone()
    }

    pub fn deregistered_images(&self) -> Vec<String> {
        self.state.lock().unwrap().deregistered_images.clone()
    }

    pub fn deleted_snapshots(&self) -> Vec<String> {
        self.state.lock().unwrap().deleted_snapshots.clone()
    }

    pub fn deleted_volumes(&self) -> Vec<String> {
        self.state.lock().unwrap().deleted_volumes.clone()
    }

    pub fn has_image(&self, image_id: &str) -> bool {
        self.state.lock().unwrap().images.contains_key(image_id)
    }
}

impl Ec2Lifecycle for FakeEc2 {
    async fn describe_instance(&self, instance_id: &str) -> Result<InstanceDescription> {
        match self.state.lock().unwrap().instances.get(instance_id) {
            Some(instance) => Ok(instance.clone()),
            None => bail!("Instance {instance_id} not found"),
        }
    }

    async fn create_snapshot(&self, project: &str, volume_id: &str) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        state.snapshot_seq += 1;
        let snapshot_id = format!("snap-{:04}", state.snapshot_seq);
        state.snapshots.insert(
            snapshot_id.clone(),
            SnapshotDescription {
                volume_size: Some(8),
                volume_type: None,
            },
        );
        state.created_snapshots.push((
            snapshot_id.clone(),
            project.to_string(),
            volume_id.to_string(),
        ));
        Ok(snapshot_id)
    }

    async fn describe_snapshot(&self, snapshot_id: &str) -> Result<SnapshotDescription> {
        match self.state.lock().unwrap().snapshots.get(snapshot_id) {
            Some(snapshot) => Ok(snapshot.clone()),
            None => bail!("Snapshot {snapshot_id} not found"),
        }
    }

    async fn describe_image(&self, image_id: &str) -> Result<Option<ImageDescription>> {
        Ok(self.state.lock().unwrap().images.get(image_id).cloned())
    }

    async fn register_image(&self, request: RegisterImageRequest) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        state.image_seq += 1;
        let image_id = format!("ami-new-{:04}", state.image_seq);
        state.images.insert(
            image_id.clone(),
            ImageDescription {
                image_id: image_id.clone(),
                tags: [
                    ("Project".to_string(), request.project.clone()),
                    ("ManagedBy".to_string(), request.managed_by.clone()),
                ]
                .into_iter()
                .collect(),
                snapshot_ids: request
                    .mappings
                    .iter()
                    .map(|m| m.snapshot_id.clone())
                    .collect(),
            },
        );
        state.registered_images.push(request);
        Ok(image_id)
    }

    async fn deregister_image(&self, image_id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if !state.images.contains_key(image_id) {
            bail!("Image {image_id} not found");
        }
        state.deregistered_images.push(image_id.to_string());
        if !state.stuck_images.contains(image_id) {
            state.images.remove(image_id);
        }
        Ok(())
    }

    async fn delete_snapshot(&self, snapshot_id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.snapshots.remove(snapshot_id);
        state.deleted_snapshots.push(snapshot_id.to_string());
        Ok(())
    }

    async fn delete_volume(&self, volume_id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_volume_deletes {
            bail!("Volume {volume_id} is in use");
        }
        state.deleted_volumes.push(volume_id.to_string());
        Ok(())
    }
}

/// Build an instance description with one attachment per `(volume id, device)`.
pub fn make_instance(
    instance_id: &str,
    project: Option<&str>,
    volumes: &[(&str, &str)],
) -> InstanceDescription {
    let mut tags = HashMap::new();
    if let Some(project) = project {
        tags.insert("Project".to_string(), project.to_string());
    }

    InstanceDescription {
        instance_id: instance_id.to_string(),
        image_id: Some("ami-base".to_string()),
        root_device_name: Some("/dev/sda1".to_string()),
        architecture: Some("x86_64".to_string()),
        virtualization_type: Some("hvm".to_string()),
        instance_type: Some("t3.large".to_string()),
        key_name: Some("devbox-key".to_string()),
        tags,
        volumes: volumes
            .iter()
            .map(|(volume_id, device)| AttachedVolume {
                volume_id: volume_id.to_string(),
                attachments: vec![Attachment {
                    instance_id: instance_id.to_string(),
                    device: device.to_string(),
                }],
            })
            .collect(),
    }
}
