//! Typed trigger payloads for the lifecycle handlers
//!
//! Each handler is woken by a different EC2 state-change notification, all
//! wrapped in the same `{ "detail": { ... } }` envelope. The field names
//! inside `detail` are dictated by the event source and differ per kind
//! (hyphenated for instance/volume events, snake_case for snapshot events,
//! CamelCase for AMI events). Payloads are parsed at the boundary; fields
//! the source may omit are `Option` and the handlers decide what a missing
//! value means.

use serde::Deserialize;

/// Instance state-change notification; acted on when `state == "shutting-down"`.
#[derive(Debug, Clone, Deserialize)]
pub struct InstanceStateEvent {
    #[serde(default)]
    pub detail: InstanceStateDetail,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InstanceStateDetail {
    #[serde(rename = "instance-id", default)]
    pub instance_id: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
}

/// EBS snapshot completion notification; acted on when `result == "succeeded"`.
///
/// `snapshot_id` is ARN-like; the snapshot id proper is the trailing
/// `/`-delimited segment.
#[derive(Debug, Clone, Deserialize)]
pub struct SnapshotCompletionEvent {
    #[serde(default)]
    pub detail: SnapshotCompletionDetail,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SnapshotCompletionDetail {
    #[serde(default)]
    pub snapshot_id: Option<String>,
    #[serde(default)]
    pub result: Option<String>,
}

/// AMI state-change notification; acted on when `State == "available"`.
#[derive(Debug, Clone, Deserialize)]
pub struct ImageStateEvent {
    #[serde(default)]
    pub detail: ImageStateDetail,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImageStateDetail {
    #[serde(rename = "ImageId", default)]
    pub image_id: Option<String>,
    #[serde(rename = "State", default)]
    pub state: Option<String>,
}

/// EBS volume state-change notification; acted on when `state == "available"`.
#[derive(Debug, Clone, Deserialize)]
pub struct VolumeStateEvent {
    #[serde(default)]
    pub detail: VolumeStateDetail,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VolumeStateDetail {
    #[serde(rename = "volume-id", default)]
    pub volume_id: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
}

/// Extract the snapshot id from an ARN-like reference.
///
/// `arn:aws:ec2:us-east-1::snapshot/snap-0abc` → `snap-0abc`. A bare
/// snapshot id passes through unchanged.
pub fn snapshot_id_from_arn(arn: &str) -> &str {
    arn.rsplit('/').next().unwrap_or(arn)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_instance_shutdown_event() {
        let event: InstanceStateEvent = serde_json::from_str(
            r#"{"detail": {"instance-id": "i-0abc123", "state": "shutting-down"}}"#,
        )
        .unwrap();
        assert_eq!(event.detail.instance_id.as_deref(), Some("i-0abc123"));
        assert_eq!(event.detail.state.as_deref(), Some("shutting-down"));
    }

    #[test]
    fn parse_instance_event_missing_fields() {
        let event: InstanceStateEvent =
            serde_json::from_str(r#"{"detail": {"state": "shutting-down"}}"#).unwrap();
        assert!(event.detail.instance_id.is_none());

        let event: InstanceStateEvent = serde_json::from_str(r#"{}"#).unwrap();
        assert!(event.detail.instance_id.is_none());
        assert!(event.detail.state.is_none());
    }

    #[test]
    fn parse_snapshot_completion_event() {
        let event: SnapshotCompletionEvent = serde_json::from_str(
            r#"{"detail": {"snapshot_id": "arn:aws:ec2:us-east-1::snapshot/snap-1", "result": "succeeded"}}"#,
        )
        .unwrap();
        assert_eq!(
            event.detail.snapshot_id.as_deref(),
            Some("arn:aws:ec2:us-east-1::snapshot/snap-1")
        );
        assert_eq!(event.detail.result.as_deref(), Some("succeeded"));
    }

    #[test]
    fn parse_image_state_event() {
        let event: ImageStateEvent = serde_json::from_str(
            r#"{"detail": {"ImageId": "ami-1", "State": "available"}}"#,
        )
        .unwrap();
        assert_eq!(event.detail.image_id.as_deref(), Some("ami-1"));
        assert_eq!(event.detail.state.as_deref(), Some("available"));
    }

    #[test]
    fn parse_volume_state_event() {
        let event: VolumeStateEvent =
            serde_json::from_str(r#"{"detail": {"volume-id": "vol-1", "state": "available"}}"#)
                .unwrap();
        assert_eq!(event.detail.volume_id.as_deref(), Some("vol-1"));
        assert_eq!(event.detail.state.as_deref(), Some("available"));
    }

    #[test]
    fn snapshot_id_from_arn_takes_trailing_segment() {
        assert_eq!(
            snapshot_id_from_arn("arn:aws:ec2:us-east-1::snapshot/snap-0abc"),
            "snap-0abc"
        );
        assert_eq!(snapshot_id_from_arn("snap-0abc"), "snap-0abc");
    }
}
