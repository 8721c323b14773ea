//! Transplant - move torrent releases between private trackers
//!
//! Transplant downloads a release from a source site, rewrites the torrent
//! for the destination tracker, normalizes the release title and technical
//! report into standardized parameters, maps them onto the destination's
//! upload form, and submits it.

use anyhow::Result;
use std::sync::Arc;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{info, warn};

mod api;
mod config;
mod media;
mod params;
mod service;
mod site;
mod title;
mod torrent;
mod utils;

use api::AppState;
use config::Settings;
use service::{JobCache, MigrationContext, MigrationService, ProgressBroadcaster};
use site::{builtin_sites, NexusPhpClient, SchemaStore, SiteRegistry};

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "transplant=info,tower_http=info".into());

    if std::env::var("TRANSPLANT_LOG_JSON").is_ok_and(|v| v == "1") {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// Periodically evict finished jobs from the cache.
async fn start_eviction(settings: &Settings, migrations: MigrationService) -> Result<JobScheduler> {
    let sched = JobScheduler::new().await?;
    let cron = settings.migration.eviction_cron.as_str();

    let job = Job::new_async(cron, move |_uuid, _lock| {
        let migrations = migrations.clone();
        Box::pin(async move {
            migrations.sweep().await;
        })
    })?;
    sched.add(job).await?;
    sched.start().await?;

    info!("Job eviction scheduled ({})", cron);
    Ok(sched)
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    info!("Starting Transplant v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let settings = Settings::load()?;
    info!("Configuration loaded from {:?}", settings.config_path());

    // Sites and schemas
    let registry = Arc::new(SiteRegistry::with_credentials(builtin_sites(), &settings.sites));
    for site in registry.list() {
        if !site.has_credentials() {
            warn!("Site {} has no passkey or cookie configured", site.id);
        }
    }
    let schemas = SchemaStore::new(settings.schemas.dir.clone());
    if let Some(dir) = schemas.override_dir() {
        info!("Schema overrides read from {:?}", dir);
    }

    // Migration pipeline
    let client = Arc::new(NexusPhpClient::new(settings.migration.http_timeout())?);
    let migrations = MigrationService::new(MigrationContext {
        registry,
        schemas,
        cache: JobCache::new(settings.migration.retention()),
        progress: ProgressBroadcaster::new(settings.migration.progress_capacity),
        source: client.clone(),
        uploader: client,
        work_dir: settings.migration.work_dir.clone(),
    });
    info!("Torrents are staged in {:?}", settings.migration.work_dir);

    // Held for the lifetime of the server
    let _scheduler = start_eviction(&settings, migrations.clone()).await?;

    // Create application state
    let state = AppState::new(migrations);

    // Build router
    let app = api::create_router(state);

    // Start server
    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
