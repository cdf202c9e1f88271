//! devbox-lifecycle: event handlers for the devbox snapshot/AMI lifecycle
//!
//! One subcommand per handler, each fed the raw EC2 state-change event JSON
//! (from a file or stdin). Deployed behind the event source, the binary is
//! invoked once per event and exits; all cross-invocation state lives in the
//! two DynamoDB tables.

use anyhow::{Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use devbox_lifecycle::aws::{AwsContext, Ec2Client};
use devbox_lifecycle::config::{LifecycleConfig, DEFAULT_MANAGED_BY_TAG};
use devbox_lifecycle::lifecycle;
use devbox_lifecycle::store::{DynamoMetaStore, DynamoProjectStore};
use serde::de::DeserializeOwned;
use std::io::Read;

#[derive(Parser, Debug)]
#[command(name = "devbox-lifecycle")]
#[command(about = "Snapshot/AMI lifecycle handlers for devbox instances")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Snapshot every volume of a shutting-down instance
    CreateSnapshots(HandlerArgs),

    /// Register a replacement AMI once all snapshots complete
    CreateImage {
        #[command(flatten)]
        handler: HandlerArgs,

        /// ManagedBy tag value identifying AMIs this tool may clean up
        #[arg(long, default_value = DEFAULT_MANAGED_BY_TAG)]
        managed_by_tag: String,
    },

    /// Mark a project ready once its AMI becomes available
    MarkReady(HandlerArgs),

    /// Reclaim a detached volume, or flag the project on a lost one
    DeleteVolume(HandlerArgs),
}

#[derive(ClapArgs, Debug)]
struct HandlerArgs {
    /// Path to the event JSON payload, or "-" for stdin
    #[arg(long, default_value = "-")]
    event_file: String,

    /// AWS region (defaults to the SDK resolution chain)
    #[arg(long)]
    region: Option<String>,

    /// Main (per-project) table name; defaults to $MAIN_TABLE
    #[arg(long)]
    main_table: Option<String>,

    /// Meta (per-volume) table name; defaults to $META_TABLE
    #[arg(long)]
    meta_table: Option<String>,
}

impl HandlerArgs {
    fn read_event<T: DeserializeOwned>(&self) -> Result<T> {
        let raw = if self.event_file == "-" {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read event from stdin")?;
            buf
        } else {
            std::fs::read_to_string(&self.event_file)
                .with_context(|| format!("Failed to read event file {}", self.event_file))?
        };
        serde_json::from_str(&raw).context("Failed to parse event payload")
    }

    fn main_table(&self) -> Result<String> {
        resolve_table(self.main_table.clone(), "MAIN_TABLE")
    }

    fn meta_table(&self) -> Result<String> {
        resolve_table(self.meta_table.clone(), "META_TABLE")
    }
}

fn resolve_table(flag: Option<String>, env_var: &str) -> Result<String> {
    match flag {
        Some(name) => Ok(name),
        None => std::env::var(env_var)
            .with_context(|| format!("No table name given and {env_var} is not set")),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::CreateSnapshots(handler) => {
            let event = handler.read_event()?;
            let ctx = AwsContext::new(handler.region.clone()).await;
            let ec2 = Ec2Client::from_context(&ctx);
            let projects = DynamoProjectStore::from_context(&ctx, handler.main_table()?);
            let meta = DynamoMetaStore::from_context(&ctx, handler.meta_table()?);
            lifecycle::create_snapshots(&event, &ec2, &projects, &meta).await
        }
        Command::CreateImage {
            handler,
            managed_by_tag,
        } => {
            let event = handler.read_event()?;
            let ctx = AwsContext::new(handler.region.clone()).await;
            let ec2 = Ec2Client::from_context(&ctx);
            let projects = DynamoProjectStore::from_context(&ctx, handler.main_table()?);
            let meta = DynamoMetaStore::from_context(&ctx, handler.meta_table()?);
            let config = LifecycleConfig {
                managed_by_tag,
                ..LifecycleConfig::default()
            };
            lifecycle::create_image(&event, &ec2, &projects, &meta, &config).await
        }
        Command::MarkReady(handler) => {
            let event = handler.read_event()?;
            let ctx = AwsContext::new(handler.region.clone()).await;
            let projects = DynamoProjectStore::from_context(&ctx, handler.main_table()?);
            let meta = DynamoMetaStore::from_context(&ctx, handler.meta_table()?);
            lifecycle::mark_ready(&event, &projects, &meta).await
        }
        Command::DeleteVolume(handler) => {
            let event = handler.read_event()?;
            let ctx = AwsContext::new(handler.region.clone()).await;
            let ec2 = Ec2Client::from_context(&ctx);
            let projects = DynamoProjectStore::from_context(&ctx, handler.main_table()?);
            let meta = DynamoMetaStore::from_context(&ctx, handler.meta_table()?);
            lifecycle::delete_volume(&event, &ec2, &projects, &meta).await
        }
    }
}
