//! devbox-lifecycle - snapshot/AMI lifecycle for devbox EC2 instances
//!
//! This crate implements the event-driven state machine that turns a devbox
//! instance shutdown into a launchable AMI: snapshot every attached volume,
//! register a replacement multi-volume AMI once all snapshots complete, mark
//! the project ready when the AMI becomes available, and reclaim detached
//! volumes along the way. State lives in two DynamoDB tables; handlers are
//! woken by EC2 state-change notifications and are safe to re-deliver.

pub mod aws;
pub mod config;
pub mod error;
pub mod events;
pub mod lifecycle;
pub mod store;
pub mod tags;
