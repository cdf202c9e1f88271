//! AWS client construction and EC2 capability wrappers
//!
//! - `AwsContext`: load SDK configuration once, mint service clients
//! - `ec2`: the `Ec2Lifecycle` capability trait and its SDK-backed client
//! - `error`: error-code classification

pub mod ec2;
pub mod error;

pub use ec2::{Ec2Client, Ec2Lifecycle};

use aws_config::{BehaviorVersion, Region, SdkConfig};
use std::sync::Arc;

/// Shared AWS configuration context for creating service clients.
///
/// Holds a loaded SDK config so multiple clients can be created without
/// re-loading credentials. When `region` is `None` the SDK default chain
/// (environment, profile, instance metadata) decides.
#[derive(Clone)]
pub struct AwsContext {
    config: Arc<SdkConfig>,
}

impl AwsContext {
    /// Load AWS configuration, optionally pinning a region.
    pub async fn new(region: Option<String>) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = region {
            loader = loader.region(Region::new(region));
        }
        let config = loader.load().await;

        Self {
            config: Arc::new(config),
        }
    }

    /// Get the underlying SDK config for direct client construction.
    pub fn sdk_config(&self) -> &SdkConfig {
        &self.config
    }

    /// Create an EC2 client from this context.
    pub fn ec2_client(&self) -> aws_sdk_ec2::Client {
        aws_sdk_ec2::Client::new(self.sdk_config())
    }

    /// Create a DynamoDB client from this context.
    pub fn dynamodb_client(&self) -> aws_sdk_dynamodb::Client {
        aws_sdk_dynamodb::Client::new(self.sdk_config())
    }
}

impl std::fmt::Debug for AwsContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsContext")
            .field("region", &self.config.region())
            .finish_non_exhaustive()
    }
}
