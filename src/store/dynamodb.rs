//! DynamoDB-backed implementations of the state store
//!
//! Main table: hash key `project`. Meta table: hash key `project`, range key
//! `volumeId`, plus the `SnapshotIndex` GSI on `snapshotId`. Attribute names
//! are the wire contract shared with the provisioning tooling and must not
//! change. `Status` and `State` are DynamoDB reserved words, hence the
//! expression attribute names on updates.

use super::{MetaRecord, MetaState, MetaStore, ProjectRecord, ProjectStatus, ProjectStore};
use crate::aws::AwsContext;
use anyhow::{Context, Result};
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client;
use std::collections::HashMap;

/// Name of the meta table's secondary index on `snapshotId`
pub const SNAPSHOT_INDEX: &str = "SnapshotIndex";

type Item = HashMap<String, AttributeValue>;

/// Main (per-project) table client
pub struct DynamoProjectStore {
    client: Client,
    table: String,
}

impl DynamoProjectStore {
    pub fn from_context(ctx: &AwsContext, table: impl Into<String>) -> Self {
        Self {
            client: ctx.dynamodb_client(),
            table: table.into(),
        }
    }
}

impl ProjectStore for DynamoProjectStore {
    async fn get(&self, project: &str) -> Result<Option<ProjectRecord>> {
        let response = self
            .client
            .get_item()
            .table_name(&self.table)
            .key("project", AttributeValue::S(project.to_string()))
            .send()
            .await
            .context("Failed to get project row")?;

        response.item().map(project_from_item).transpose()
    }

    async fn put(&self, record: &ProjectRecord) -> Result<()> {
        self.client
            .put_item()
            .table_name(&self.table)
            .set_item(Some(project_item(record)))
            .send()
            .await
            .context("Failed to put project row")?;
        Ok(())
    }

    async fn set_status(&self, project: &str, status: ProjectStatus) -> Result<()> {
        self.client
            .update_item()
            .table_name(&self.table)
            .key("project", AttributeValue::S(project.to_string()))
            .update_expression("SET #S = :s")
            .expression_attribute_names("#S", "Status")
            .expression_attribute_values(":s", AttributeValue::S(status.as_str().to_string()))
            .send()
            .await
            .context("Failed to update project status")?;
        Ok(())
    }

    async fn set_image(&self, project: &str, ami_id: &str, status: ProjectStatus) -> Result<()> {
        self.client
            .update_item()
            .table_name(&self.table)
            .key("project", AttributeValue::S(project.to_string()))
            .update_expression("SET #A = :a, #S = :s")
            .expression_attribute_names("#A", "AMI")
            .expression_attribute_names("#S", "Status")
            .expression_attribute_values(":a", AttributeValue::S(ami_id.to_string()))
            .expression_attribute_values(":s", AttributeValue::S(status.as_str().to_string()))
            .send()
            .await
            .context("Failed to update project image")?;
        Ok(())
    }

    async fn find_by_image(&self, ami_id: &str) -> Result<Option<ProjectRecord>> {
        // Linear scan: AMI is not a key. One row per project keeps this
        // well under a single page.
        let response = self
            .client
            .scan()
            .table_name(&self.table)
            .filter_expression("#A = :a")
            .expression_attribute_names("#A", "AMI")
            .expression_attribute_values(":a", AttributeValue::S(ami_id.to_string()))
            .send()
            .await
            .context("Failed to scan for project by AMI")?;

        response.items().first().map(project_from_item).transpose()
    }
}

/// Meta (per-volume) table client
pub struct DynamoMetaStore {
    client: Client,
    table: String,
}

impl DynamoMetaStore {
    pub fn from_context(ctx: &AwsContext, table: impl Into<String>) -> Self {
        Self {
            client: ctx.dynamodb_client(),
            table: table.into(),
        }
    }
}

impl MetaStore for DynamoMetaStore {
    async fn put(&self, record: &MetaRecord) -> Result<()> {
        self.client
            .put_item()
            .table_name(&self.table)
            .set_item(Some(meta_item(record)))
            .send()
            .await
            .context("Failed to put meta row")?;
        Ok(())
    }

    async fn find_by_snapshot(&self, snapshot_id: &str) -> Result<Vec<MetaRecord>> {
        let response = self
            .client
            .query()
            .table_name(&self.table)
            .index_name(SNAPSHOT_INDEX)
            .key_condition_expression("snapshotId = :sid")
            .expression_attribute_values(":sid", AttributeValue::S(snapshot_id.to_string()))
            .send()
            .await
            .context("Failed to query meta rows by snapshot id")?;

        response.items().iter().map(meta_from_item).collect()
    }

    async fn find_by_volume(&self, volume_id: &str) -> Result<Option<MetaRecord>> {
        // Linear scan: volumeId alone is not a key.
        let response = self
            .client
            .scan()
            .table_name(&self.table)
            .filter_expression("volumeId = :v")
            .expression_attribute_values(":v", AttributeValue::S(volume_id.to_string()))
            .send()
            .await
            .context("Failed to scan meta rows by volume id")?;

        response.items().first().map(meta_from_item).transpose()
    }

    async fn list_project(&self, project: &str) -> Result<Vec<MetaRecord>> {
        let response = self
            .client
            .query()
            .table_name(&self.table)
            .key_condition_expression("project = :p")
            .expression_attribute_values(":p", AttributeValue::S(project.to_string()))
            .send()
            .await
            .context("Failed to query meta rows for project")?;

        response.items().iter().map(meta_from_item).collect()
    }

    async fn mark_completed(&self, project: &str, volume_id: &str) -> Result<()> {
        self.client
            .update_item()
            .table_name(&self.table)
            .key("project", AttributeValue::S(project.to_string()))
            .key("volumeId", AttributeValue::S(volume_id.to_string()))
            .update_expression("SET #S = :s")
            .expression_attribute_names("#S", "State")
            .expression_attribute_values(
                ":s",
                AttributeValue::S(MetaState::Completed.as_str().to_string()),
            )
            .send()
            .await
            .context("Failed to mark meta row completed")?;
        Ok(())
    }

    async fn delete(&self, project: &str, volume_id: &str) -> Result<()> {
        self.client
            .delete_item()
            .table_name(&self.table)
            .key("project", AttributeValue::S(project.to_string()))
            .key("volumeId", AttributeValue::S(volume_id.to_string()))
            .send()
            .await
            .context("Failed to delete meta row")?;
        Ok(())
    }
}

fn string_attr(item: &Item, name: &str) -> Option<String> {
    item.get(name).and_then(|v| v.as_s().ok()).cloned()
}

fn insert_opt(item: &mut Item, name: &str, value: &Option<String>) {
    if let Some(value) = value {
        item.insert(name.to_string(), AttributeValue::S(value.clone()));
    }
}

/// Marshal a project record into a DynamoDB item.
fn project_item(record: &ProjectRecord) -> Item {
    let mut item = Item::new();
    item.insert(
        "project".to_string(),
        AttributeValue::S(record.project.clone()),
    );
    item.insert(
        "Status".to_string(),
        AttributeValue::S(record.status.as_str().to_string()),
    );
    item.insert(
        "VolumeCount".to_string(),
        AttributeValue::N(record.volume_count.to_string()),
    );
    item.insert(
        "Username".to_string(),
        AttributeValue::S(record.username.clone()),
    );
    insert_opt(&mut item, "AMI", &record.ami);
    insert_opt(&mut item, "RootDeviceName", &record.root_device_name);
    insert_opt(&mut item, "Architecture", &record.architecture);
    insert_opt(&mut item, "VirtualizationType", &record.virtualization_type);
    insert_opt(&mut item, "LastInstanceType", &record.last_instance_type);
    insert_opt(&mut item, "LastKeyPair", &record.last_key_pair);
    insert_opt(&mut item, "CNAMEDomain", &record.cname_domain);
    item
}

/// Unmarshal a project record. An unknown `Status` is a read error, not a
/// default: the state machine has no catch-all state to coerce into.
fn project_from_item(item: &Item) -> Result<ProjectRecord> {
    let project = string_attr(item, "project").context("Project row missing key attribute")?;
    let status_raw = string_attr(item, "Status")
        .with_context(|| format!("Project row for '{project}' missing Status"))?;
    let status = ProjectStatus::parse(&status_raw)
        .with_context(|| format!("Project row for '{project}' has unknown Status '{status_raw}'"))?;
    let volume_count = match item.get("VolumeCount").and_then(|v| v.as_n().ok()) {
        Some(n) => n
            .parse::<u32>()
            .with_context(|| format!("Project row for '{project}' has invalid VolumeCount"))?,
        None => 0,
    };

    Ok(ProjectRecord {
        status,
        volume_count,
        ami: string_attr(item, "AMI"),
        root_device_name: string_attr(item, "RootDeviceName"),
        architecture: string_attr(item, "Architecture"),
        virtualization_type: string_attr(item, "VirtualizationType"),
        last_instance_type: string_attr(item, "LastInstanceType"),
        last_key_pair: string_attr(item, "LastKeyPair"),
        username: string_attr(item, "Username").unwrap_or_default(),
        cname_domain: string_attr(item, "CNAMEDomain"),
        project,
    })
}

/// Marshal a meta record into a DynamoDB item.
fn meta_item(record: &MetaRecord) -> Item {
    let mut item = Item::new();
    item.insert(
        "project".to_string(),
        AttributeValue::S(record.project.clone()),
    );
    item.insert(
        "volumeId".to_string(),
        AttributeValue::S(record.volume_id.clone()),
    );
    item.insert(
        "instanceId".to_string(),
        AttributeValue::S(record.instance_id.clone()),
    );
    item.insert(
        "deviceName".to_string(),
        AttributeValue::S(record.device_name.clone()),
    );
    item.insert(
        "snapshotId".to_string(),
        AttributeValue::S(record.snapshot_id.clone()),
    );
    item.insert(
        "State".to_string(),
        AttributeValue::S(record.state.as_str().to_string()),
    );
    item
}

/// Unmarshal a meta record.
fn meta_from_item(item: &Item) -> Result<MetaRecord> {
    let project = string_attr(item, "project").context("Meta row missing project attribute")?;
    let volume_id = string_attr(item, "volumeId").context("Meta row missing volumeId attribute")?;
    let state_raw = string_attr(item, "State")
        .with_context(|| format!("Meta row for {project}/{volume_id} missing State"))?;
    let state = MetaState::parse(&state_raw).with_context(|| {
        format!("Meta row for {project}/{volume_id} has unknown State '{state_raw}'")
    })?;

    Ok(MetaRecord {
        instance_id: string_attr(item, "instanceId").unwrap_or_default(),
        device_name: string_attr(item, "deviceName").unwrap_or_default(),
        snapshot_id: string_attr(item, "snapshotId").unwrap_or_default(),
        state,
        project,
        volume_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_project() -> ProjectRecord {
        ProjectRecord {
            project: "demo".to_string(),
            status: ProjectStatus::Snapshotting,
            ami: Some("ami-1".to_string()),
            volume_count: 2,
            root_device_name: Some("/dev/sda1".to_string()),
            architecture: Some("x86_64".to_string()),
            virtualization_type: Some("hvm".to_string()),
            last_instance_type: Some("t3.large".to_string()),
            last_key_pair: None,
            username: "ubuntu".to_string(),
            cname_domain: None,
        }
    }

    #[test]
    fn project_record_round_trips() {
        let record = sample_project();
        let item = project_item(&record);
        assert!(!item.contains_key("LastKeyPair"));
        assert!(!item.contains_key("CNAMEDomain"));

        let parsed = project_from_item(&item).unwrap();
        assert_eq!(parsed, record);
    }

    #[test]
    fn project_row_with_unknown_status_is_an_error() {
        let mut item = project_item(&sample_project());
        item.insert(
            "Status".to_string(),
            AttributeValue::S("LIMBO".to_string()),
        );
        let err = project_from_item(&item).unwrap_err();
        assert!(err.to_string().contains("unknown Status"));
    }

    #[test]
    fn project_row_without_volume_count_defaults_to_zero() {
        let mut item = project_item(&sample_project());
        item.remove("VolumeCount");
        let parsed = project_from_item(&item).unwrap();
        assert_eq!(parsed.volume_count, 0);
    }

    #[test]
    fn meta_record_round_trips() {
        let record = MetaRecord {
            project: "demo".to_string(),
            volume_id: "vol-1".to_string(),
            instance_id: "i-1".to_string(),
            device_name: "/dev/sda1".to_string(),
            snapshot_id: "snap-1".to_string(),
            state: MetaState::Pending,
        };
        let parsed = meta_from_item(&meta_item(&record)).unwrap();
        assert_eq!(parsed, record);
    }

    #[test]
    fn meta_row_tolerates_missing_optional_attributes() {
        // Rows written by older tooling may lack instanceId/deviceName.
        let mut item = Item::new();
        item.insert("project".to_string(), AttributeValue::S("demo".into()));
        item.insert("volumeId".to_string(), AttributeValue::S("vol-1".into()));
        item.insert("snapshotId".to_string(), AttributeValue::S("snap-1".into()));
        item.insert("State".to_string(), AttributeValue::S("COMPLETED".into()));

        let parsed = meta_from_item(&item).unwrap();
        assert_eq!(parsed.instance_id, "");
        assert_eq!(parsed.state, MetaState::Completed);
    }
}
