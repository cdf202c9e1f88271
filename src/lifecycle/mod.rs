//! Snapshot/AMI lifecycle handlers
//!
//! Four independently triggered handlers move a project through
//! `SNAPSHOTTING → IMAGING → READY` (or `ERROR`):
//!
//! - `snapshot`: instance shutting down → snapshot every attached volume
//! - `image`: snapshot succeeded → once all volumes are done, replace the
//!   project's AMI
//! - `ready`: AMI available → clear per-volume bookkeeping, mark READY
//! - `reclaim`: volume detached → delete it if captured, else flag ERROR
//!
//! Handlers never call each other; they communicate through the state store
//! and through the AWS side effects whose state-change events wake the next
//! handler. Each invocation is a single sequential pass (read, act, write)
//! and is safe to re-deliver.

pub mod cleanup;
pub mod image;
pub mod ready;
pub mod reclaim;
pub mod snapshot;

pub use cleanup::cleanup_image_and_snapshots;
pub use image::create_image;
pub use ready::mark_ready;
pub use reclaim::delete_volume;
pub use snapshot::create_snapshots;
