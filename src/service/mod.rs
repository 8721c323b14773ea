//! Migration orchestration services

mod cache;
mod job;
mod migration;
mod progress;

pub use cache::{JobCache, RunGuard};
pub use job::{JobFailure, JobStage, MigrationError, MigrationJob, MigrationRequest, Result};
pub use migration::{MigrationContext, MigrationService};
pub use progress::{ProgressBroadcaster, ProgressEvent};
