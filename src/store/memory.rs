//! In-memory store implementations
//!
//! Back the integration test suite (and local dry runs) with the same
//! semantics as the DynamoDB stores: whole-row overwrites, partial-attribute
//! updates that create the row when missing, and linear scans for the
//! by-value lookups. Iteration order is keyed, so scans are deterministic.

use super::{MetaRecord, MetaState, MetaStore, ProjectRecord, ProjectStatus, ProjectStore};
use anyhow::Result;
use std::collections::BTreeMap;
use std::sync::Mutex;

/// In-memory main table
#[derive(Default)]
pub struct InMemoryProjectStore {
    rows: Mutex<BTreeMap<String, ProjectRecord>>,
}

impl InMemoryProjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all rows, for assertions
    pub fn dump(&self) -> Vec<ProjectRecord> {
        self.rows.lock().unwrap().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ProjectStore for InMemoryProjectStore {
    async fn get(&self, project: &str) -> Result<Option<ProjectRecord>> {
        Ok(self.rows.lock().unwrap().get(project).cloned())
    }

    async fn put(&self, record: &ProjectRecord) -> Result<()> {
        self.rows
            .lock()
            .unwrap()
            .insert(record.project.clone(), record.clone());
        Ok(())
    }

    async fn set_status(&self, project: &str, status: ProjectStatus) -> Result<()> {
        let mut rows = self.rows.lock().unwrap();
        let record = rows
            .entry(project.to_string())
            .or_insert_with(|| blank_project(project, status));
        record.status = status;
        Ok(())
    }

    async fn set_image(&self, project: &str, ami_id: &str, status: ProjectStatus) -> Result<()> {
        let mut rows = self.rows.lock().unwrap();
        let record = rows
            .entry(project.to_string())
            .or_insert_with(|| blank_project(project, status));
        record.ami = Some(ami_id.to_string());
        record.status = status;
        Ok(())
    }

    async fn find_by_image(&self, ami_id: &str) -> Result<Option<ProjectRecord>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .values()
            .find(|r| r.ami.as_deref() == Some(ami_id))
            .cloned())
    }
}

// Partial-attribute updates upsert in DynamoDB; mirror that here.
fn blank_project(project: &str, status: ProjectStatus) -> ProjectRecord {
    ProjectRecord {
        project: project.to_string(),
        status,
        ami: None,
        volume_count: 0,
        root_device_name: None,
        architecture: None,
        virtualization_type: None,
        last_instance_type: None,
        last_key_pair: None,
        username: String::new(),
        cname_domain: None,
    }
}

/// In-memory meta table, keyed by (project, volume id)
#[derive(Default)]
pub struct InMemoryMetaStore {
    rows: Mutex<BTreeMap<(String, String), MetaRecord>>,
}

impl InMemoryMetaStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all rows, for assertions
    pub fn dump(&self) -> Vec<MetaRecord> {
        self.rows.lock().unwrap().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MetaStore for InMemoryMetaStore {
    async fn put(&self, record: &MetaRecord) -> Result<()> {
        self.rows.lock().unwrap().insert(
            (record.project.clone(), record.volume_id.clone()),
            record.clone(),
        );
        Ok(())
    }

    async fn find_by_snapshot(&self, snapshot_id: &str) -> Result<Vec<MetaRecord>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.snapshot_id == snapshot_id)
            .cloned()
            .collect())
    }

    async fn find_by_volume(&self, volume_id: &str) -> Result<Option<MetaRecord>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .values()
            .find(|r| r.volume_id == volume_id)
            .cloned())
    }

    async fn list_project(&self, project: &str) -> Result<Vec<MetaRecord>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.project == project)
            .cloned()
            .collect())
    }

    async fn mark_completed(&self, project: &str, volume_id: &str) -> Result<()> {
        let mut rows = self.rows.lock().unwrap();
        let key = (project.to_string(), volume_id.to_string());
        let record = rows.entry(key).or_insert_with(|| MetaRecord {
            project: project.to_string(),
            volume_id: volume_id.to_string(),
            instance_id: String::new(),
            device_name: String::new(),
            snapshot_id: String::new(),
            state: MetaState::Completed,
        });
        record.state = MetaState::Completed;
        Ok(())
    }

    async fn delete(&self, project: &str, volume_id: &str) -> Result<()> {
        self.rows
            .lock()
            .unwrap()
            .remove(&(project.to_string(), volume_id.to_string()));
        Ok(())
    }
}
