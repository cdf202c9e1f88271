//! AWS resource tag constants and builders
//!
//! Tag keys are the wire contract shared with the rest of the devbox
//! tooling: instances carry `Project`, snapshots get `Project` + `VolumeID`,
//! and registered AMIs get `Project` + `ManagedBy`. The `ManagedBy` value
//! decides whether a prior AMI is eligible for automatic cleanup.

use aws_sdk_ec2::types::{ResourceType, Tag, TagSpecification};
use std::collections::HashMap;

/// Tag key naming the owning project; set externally on instances, stamped
/// by this tool on snapshots and AMIs.
pub const TAG_PROJECT: &str = "Project";

/// Tag key marking an AMI as owned by this tool
pub const TAG_MANAGED_BY: &str = "ManagedBy";

/// Tag key recording the source volume of a snapshot
pub const TAG_VOLUME_ID: &str = "VolumeID";

/// Tag key for the RFC 3339 creation timestamp
pub const TAG_CREATED_AT: &str = "CreatedAt";

/// Format a creation timestamp for tags
pub fn format_created_at(time: chrono::DateTime<chrono::Utc>) -> String {
    time.to_rfc3339()
}

/// Collect EC2 tags into a key → value map
pub fn tag_map(tags: &[Tag]) -> HashMap<String, String> {
    tags.iter()
        .filter_map(|t| match (t.key(), t.value()) {
            (Some(k), Some(v)) => Some((k.to_string(), v.to_string())),
            _ => None,
        })
        .collect()
}

/// Extract the `Project` tag value, treating an empty value as absent
pub fn project_tag(tags: &HashMap<String, String>) -> Option<&str> {
    tags.get(TAG_PROJECT).map(String::as_str).filter(|v| !v.is_empty())
}

/// Tag specification applied to snapshots at creation
pub fn snapshot_tag_spec(project: &str, volume_id: &str) -> TagSpecification {
    TagSpecification::builder()
        .resource_type(ResourceType::Snapshot)
        .tags(Tag::builder().key(TAG_PROJECT).value(project).build())
        .tags(Tag::builder().key(TAG_VOLUME_ID).value(volume_id).build())
        .tags(
            Tag::builder()
                .key(TAG_CREATED_AT)
                .value(format_created_at(chrono::Utc::now()))
                .build(),
        )
        .build()
}

/// Tag specification applied to AMIs at registration
pub fn image_tag_spec(project: &str, managed_by: &str) -> TagSpecification {
    TagSpecification::builder()
        .resource_type(ResourceType::Image)
        .tags(Tag::builder().key(TAG_PROJECT).value(project).build())
        .tags(Tag::builder().key(TAG_MANAGED_BY).value(managed_by).build())
        .tags(
            Tag::builder()
                .key(TAG_CREATED_AT)
                .value(format_created_at(chrono::Utc::now()))
                .build(),
        )
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag(key: &str, value: &str) -> Tag {
        Tag::builder().key(key).value(value).build()
    }

    #[test]
    fn tag_map_skips_incomplete_tags() {
        let tags = vec![
            tag("Project", "demo"),
            Tag::builder().key("Orphan").build(),
            tag("Name", "devbox-demo"),
        ];
        let map = tag_map(&tags);
        assert_eq!(map.len(), 2);
        assert_eq!(map.get("Project").map(String::as_str), Some("demo"));
    }

    #[test]
    fn project_tag_requires_non_empty_value() {
        let mut tags = HashMap::new();
        assert_eq!(project_tag(&tags), None);

        tags.insert(TAG_PROJECT.to_string(), String::new());
        assert_eq!(project_tag(&tags), None);

        tags.insert(TAG_PROJECT.to_string(), "demo".to_string());
        assert_eq!(project_tag(&tags), Some("demo"));
    }

    #[test]
    fn snapshot_spec_carries_project_and_volume() {
        let spec = snapshot_tag_spec("demo", "vol-1");
        assert_eq!(spec.resource_type(), Some(&ResourceType::Snapshot));
        let map = tag_map(spec.tags());
        assert_eq!(map.get(TAG_PROJECT).map(String::as_str), Some("demo"));
        assert_eq!(map.get(TAG_VOLUME_ID).map(String::as_str), Some("vol-1"));
        assert!(map.contains_key(TAG_CREATED_AT));
    }

    #[test]
    fn image_spec_carries_managed_by() {
        let spec = image_tag_spec("demo", "devbox-lifecycle");
        assert_eq!(spec.resource_type(), Some(&ResourceType::Image));
        let map = tag_map(spec.tags());
        assert_eq!(
            map.get(TAG_MANAGED_BY).map(String::as_str),
            Some("devbox-lifecycle")
        );
    }
}
