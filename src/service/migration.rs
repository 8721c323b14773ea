//! Migration orchestrator
//!
//! Drives one job through fetch, metadata extraction, description,
//! mapping and submission. Each stage records its output on the cached job
//! before the next one starts, so status polls only ever see progress.

use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::cache::JobCache;
use super::job::{JobFailure, JobStage, MigrationError, MigrationJob, MigrationRequest, Result};
use super::progress::{ProgressBroadcaster, ProgressEvent};
use crate::media::{self, MediaFormat, StreamInfo};
use crate::params::{self, Auxiliary};
use crate::site::{
    build_release_name, map_params, SchemaStore, SiteConfig, SiteRegistry, TorrentSource,
    UploadOutcome, UploadPayload, Uploader,
};
use crate::title;
use crate::torrent;

/// Everything the pipeline needs, created once at startup.
pub struct MigrationContext {
    pub registry: Arc<SiteRegistry>,
    pub schemas: SchemaStore,
    pub cache: JobCache,
    pub progress: ProgressBroadcaster,
    pub source: Arc<dyn TorrentSource>,
    pub uploader: Arc<dyn Uploader>,
    pub work_dir: PathBuf,
}

#[derive(Clone)]
pub struct MigrationService {
    ctx: Arc<MigrationContext>,
}

impl MigrationService {
    pub fn new(ctx: MigrationContext) -> Self {
        Self { ctx: Arc::new(ctx) }
    }

    pub fn context(&self) -> &MigrationContext {
        &self.ctx
    }

    /// Validate and cache a new job without starting it.
    pub async fn create(&self, request: MigrationRequest) -> Result<Uuid> {
        for site in [&request.source_site, &request.destination_site] {
            if !self.ctx.registry.contains(site) {
                return Err(MigrationError::UnknownSite(site.clone()));
            }
        }

        let job = MigrationJob::new(request);
        let id = job.id;
        info!(
            "Created migration {} ({} -> {}): {}",
            id, job.source, job.destination, job.title
        );
        self.ctx.cache.insert(job).await;
        self.ctx
            .progress
            .publish(ProgressEvent::new(id, JobStage::Created, "queued"));
        Ok(id)
    }

    /// Create a job and run its pipeline in the background.
    pub async fn submit(&self, request: MigrationRequest) -> Result<Uuid> {
        let id = self.create(request).await?;
        let service = self.clone();
        tokio::spawn(async move {
            if let Err(e) = service.run(id).await {
                warn!("Migration {} did not run: {}", id, e);
            }
        });
        Ok(id)
    }

    pub async fn snapshot(&self, id: Uuid) -> Option<MigrationJob> {
        self.ctx.cache.get(id).await
    }

    /// Ask a job to stop. Honoured between stages only; refused once
    /// submission has begun or the job has finished.
    pub async fn cancel(&self, id: Uuid) -> Result<bool> {
        let mut accepted = false;
        let job = self
            .ctx
            .cache
            .update(id, |job| {
                if job.stage.is_cancellable() {
                    job.cancel_requested = true;
                    accepted = true;
                }
            })
            .await
            .ok_or(MigrationError::JobNotFound(id))?;

        if accepted {
            info!("Migration {}: cancellation requested at {}", id, job.stage);
        }
        Ok(accepted)
    }

    /// Evict expired jobs and remove their torrent directories, including
    /// directories of jobs this process no longer knows about.
    pub async fn sweep(&self) -> usize {
        let evicted = self.ctx.cache.evict_expired().await;
        for id in &evicted {
            self.remove_job_dir(*id).await;
        }

        let mut orphans = 0;
        match tokio::fs::read_dir(&self.ctx.work_dir).await {
            Ok(mut entries) => loop {
                let entry = match entries.next_entry().await {
                    Ok(Some(entry)) => entry,
                    Ok(None) => break,
                    Err(e) => {
                        warn!("Failed to scan {}: {}", self.ctx.work_dir.display(), e);
                        break;
                    }
                };
                let Some(id) = entry.file_name().to_str().and_then(|n| Uuid::parse_str(n).ok()) else {
                    continue;
                };
                if !self.ctx.cache.contains(id).await {
                    self.remove_job_dir(id).await;
                    orphans += 1;
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to scan {}: {}", self.ctx.work_dir.display(), e),
        }

        if !evicted.is_empty() || orphans > 0 {
            info!(
                "Evicted {} finished migration(s), removed {} orphaned director(ies)",
                evicted.len(),
                orphans
            );
        }
        evicted.len()
    }

    async fn remove_job_dir(&self, id: Uuid) {
        let dir = self.ctx.work_dir.join(id.to_string());
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove {}: {}", dir.display(), e),
        }
    }

    /// Execute the pipeline for a cached job and return its final stage.
    pub async fn run(&self, id: Uuid) -> Result<JobStage> {
        let _guard = self
            .ctx
            .cache
            .acquire(id)
            .ok_or(MigrationError::AlreadyRunning(id))?;
        let job = self
            .ctx
            .cache
            .get(id)
            .await
            .ok_or(MigrationError::JobNotFound(id))?;
        if job.stage != JobStage::Created {
            return Ok(job.stage);
        }

        match self.execute(id, &job.request).await {
            Ok(outcome) => {
                info!("Migration {} succeeded: {}", id, outcome.message);
                self.finish(id, JobStage::Succeeded, outcome.message.clone(), |job| {
                    job.result = Some(outcome);
                })
                .await;
                Ok(JobStage::Succeeded)
            }
            Err(e) => {
                let stage = self
                    .ctx
                    .cache
                    .get(id)
                    .await
                    .map(|j| j.stage)
                    .unwrap_or(JobStage::Created);
                error!("Migration {} failed during {}: {}", id, stage, e);
                let failure = JobFailure {
                    stage,
                    kind: e.kind().to_string(),
                    message: e.to_string(),
                };
                self.finish(id, JobStage::Failed, failure.message.clone(), |job| {
                    job.failure = Some(failure);
                })
                .await;
                Ok(JobStage::Failed)
            }
        }
    }

    async fn execute(&self, id: Uuid, request: &MigrationRequest) -> Result<UploadOutcome> {
        let registry = &self.ctx.registry;
        let source_site = site(registry, &request.source_site)?;
        let destination = site(registry, &request.destination_site)?;

        // Fetch and rewrite the source torrent
        self.advance(id, JobStage::FetchingSource, &format!("downloading from {}", source_site.name))
            .await?;
        let completed = self.complete_request(id, source_site, request).await;
        let request = &completed;
        let fetched = self
            .ctx
            .source
            .download(source_site, &request.torrent_id)
            .await
            .map_err(|source| MigrationError::Network {
                stage: JobStage::FetchingSource,
                source,
            })?;
        let announce = destination
            .announce_url()
            .map_err(|e| MigrationError::Configuration(e.to_string()))?;
        let rewritten = torrent::rewrite_for_tracker(&fetched.bytes, &announce)?;
        let name = if request.title.trim().is_empty() {
            torrent::torrent_name(&rewritten)?
        } else {
            request.title.clone()
        };
        let torrent_path =
            torrent::write_torrent(&self.ctx.work_dir.join(id.to_string()), &name, &rewritten).await?;
        self.record(id, |job| job.torrent_path = Some(torrent_path.clone())).await;

        // Extract and validate media metadata
        self.advance(id, JobStage::ExtractingMetadata, "parsing title and media info")
            .await?;
        let report = request.intro.mediainfo.as_str();
        let stream = media::analyze(report);
        if !report.trim().is_empty() && stream.format == MediaFormat::Unknown {
            warn!("Migration {}: technical report is neither MediaInfo nor BDInfo", id);
        }
        let parsed = title::parse(&name, stream_for_parse(&stream));
        if !parsed.unrecognized().is_empty() {
            info!("Migration {}: unrecognized title text '{}'", id, parsed.unrecognized());
        }
        let standardized = params::build(
            &parsed,
            &stream,
            &Auxiliary {
                subtitle: &request.subtitle,
                description: &request.intro.body,
                declared: Some(&request.source_params),
            },
        );
        let components = parsed.components.clone();
        let standardized_copy = standardized.clone();
        self.record(id, move |job| {
            job.title_components = components;
            job.standardized_params = Some(standardized_copy);
        })
        .await;

        // Build the destination description
        self.advance(id, JobStage::BuildingDescription, "building description")
            .await?;
        let profile = destination.create_profile();
        let description = profile.build_description(&request.intro);

        // Map parameters onto the destination schema
        self.advance(
            id,
            JobStage::MappingParameters,
            &format!("mapping for {} ({})", destination.name, profile.kind()),
        )
        .await?;
        let schema = self.ctx.schemas.load(&destination.id)?;
        let mapped = map_params(&standardized, &schema, profile.as_ref())?;
        let mapped_copy = mapped.clone();
        self.record(id, move |job| job.mapped_params = Some(mapped_copy)).await;

        // Submit; not revocable from here on
        self.advance(id, JobStage::Submitting, &format!("uploading to {}", destination.name))
            .await?;
        let payload = UploadPayload {
            torrent_path,
            name: build_release_name(&parsed.components),
            subtitle: request.subtitle.clone(),
            imdb_link: request.imdb_link.clone(),
            description,
            mediainfo: request.intro.mediainfo.clone(),
            fields: mapped,
        };
        let outcome = self.ctx.uploader.upload(destination, &payload).await;
        let stored = outcome.clone();
        self.record(id, move |job| job.result = Some(stored)).await;

        if outcome.success {
            Ok(outcome)
        } else {
            Err(MigrationError::UpstreamRejection(outcome.message))
        }
    }

    /// Fill fields the caller left empty from the source listing page.
    /// A listing that cannot be read leaves the request as given.
    async fn complete_request(&self, id: Uuid, site: &SiteConfig, request: &MigrationRequest) -> MigrationRequest {
        let mut request = request.clone();
        if !request.is_incomplete() {
            return request;
        }

        match self.ctx.source.details(site, &request.torrent_id).await {
            Ok(details) => {
                request.fill_from(details);
                let stored = request.clone();
                self.record(id, move |job| {
                    if job.title.trim().is_empty() {
                        job.title = stored.title.clone();
                    }
                    job.request = stored;
                })
                .await;
            }
            Err(e) => warn!("Migration {}: listing details unavailable, using the request as given: {}", id, e),
        }
        request
    }

    /// Move to the next stage unless a cancellation is pending.
    async fn advance(&self, id: Uuid, stage: JobStage, detail: &str) -> Result<()> {
        let mut cancelled_at = None;
        let job = self
            .ctx
            .cache
            .update(id, |job| {
                if job.cancel_requested && job.stage.is_cancellable() {
                    cancelled_at = Some(stage);
                } else {
                    job.advance(stage);
                }
            })
            .await
            .ok_or(MigrationError::JobNotFound(id))?;

        if let Some(stage) = cancelled_at {
            return Err(MigrationError::Cancelled(stage));
        }

        info!("Migration {}: {} ({})", id, job.stage, detail);
        self.ctx
            .progress
            .publish(ProgressEvent::new(id, job.stage, detail));
        Ok(())
    }

    async fn record<F>(&self, id: Uuid, f: F)
    where
        F: FnOnce(&mut MigrationJob),
    {
        if self.ctx.cache.update(id, f).await.is_none() {
            warn!("Migration {} vanished from the cache", id);
        }
    }

    async fn finish<F>(&self, id: Uuid, stage: JobStage, message: String, f: F)
    where
        F: FnOnce(&mut MigrationJob),
    {
        self.record(id, |job| {
            f(job);
            job.advance(stage);
        })
        .await;
        self.ctx
            .progress
            .publish(ProgressEvent::new(id, stage, message));
    }
}

fn site<'a>(registry: &'a SiteRegistry, id: &str) -> Result<&'a SiteConfig> {
    registry
        .get(id)
        .map_err(|_| MigrationError::UnknownSite(id.to_string()))
}

fn stream_for_parse(stream: &StreamInfo) -> Option<&StreamInfo> {
    (stream.format != MediaFormat::Unknown).then_some(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::site::{builtin_sites, SiteCredentials, SiteError, SourceDetails, SourceTorrent};
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::Notify;

    const BDINFO: &str = "DISC INFO:\n\nDisc Title: OLD_MOVIE\nDisc Size: 45,000,000,000 bytes\n\nPLAYLIST REPORT:\n\nName: 00800.MPLS\n";

    fn torrent_fixture() -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(b"d8:announce14:http://old/ann4:infod6:lengthi5e4:name5:a.mkv12:piece lengthi16384e6:pieces20:");
        out.extend_from_slice(&[0xFFu8; 20]);
        out.extend_from_slice(b"ee");
        out
    }

    struct FakeSource {
        fail: bool,
    }

    #[async_trait]
    impl TorrentSource for FakeSource {
        async fn download(&self, _site: &SiteConfig, _torrent_id: &str) -> crate::site::Result<SourceTorrent> {
            if self.fail {
                return Err(SiteError::DownloadFailed("HTTP 502".to_string()));
            }
            Ok(SourceTorrent {
                filename: None,
                bytes: torrent_fixture(),
            })
        }
    }

    struct FakeUploader {
        outcome: UploadOutcome,
        gate: Option<Arc<Notify>>,
        seen: Mutex<Vec<UploadPayload>>,
    }

    impl FakeUploader {
        fn new(outcome: UploadOutcome) -> Self {
            Self {
                outcome,
                gate: None,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Uploader for FakeUploader {
        async fn upload(&self, _site: &SiteConfig, payload: &UploadPayload) -> UploadOutcome {
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            assert!(payload.torrent_path.is_file());
            self.seen.lock().unwrap().push(payload.clone());
            self.outcome.clone()
        }
    }

    fn service(source: FakeSource, uploader: Arc<FakeUploader>) -> MigrationService {
        let credentials: Vec<SiteCredentials> = ["hdsky", "baozi", "luckpt"]
            .iter()
            .map(|id| SiteCredentials {
                id: id.to_string(),
                passkey: Some("pk".to_string()),
                cookie: Some("c=1".to_string()),
                ..Default::default()
            })
            .collect();
        MigrationService::new(MigrationContext {
            registry: Arc::new(SiteRegistry::with_credentials(builtin_sites(), &credentials)),
            schemas: SchemaStore::default(),
            cache: JobCache::new(Duration::from_secs(3600)),
            progress: ProgressBroadcaster::new(64),
            source: Arc::new(source),
            uploader,
            work_dir: std::env::temp_dir().join(format!("transplant-jobs-{}", Uuid::new_v4())),
        })
    }

    fn request() -> MigrationRequest {
        let mut source_params = BTreeMap::new();
        source_params.insert("类型".to_string(), "电影".to_string());
        MigrationRequest {
            source_site: "hdsky".to_string(),
            destination_site: "baozi".to_string(),
            torrent_id: "1234".to_string(),
            title: "Old Movie 1999 1080p Blu-ray DIY AVC DTS-HD MA 5.1-CHD".to_string(),
            subtitle: "老电影 | 国语 | 中英字幕".to_string(),
            imdb_link: "https://www.imdb.com/title/tt0000001/".to_string(),
            intro: crate::site::profiles::DescriptionParts {
                body: "◎产　　地　中国香港\n".to_string(),
                mediainfo: BDINFO.to_string(),
                ..Default::default()
            },
            source_params,
        }
    }

    #[tokio::test]
    async fn test_successful_migration() {
        let uploader = Arc::new(FakeUploader::new(UploadOutcome::success("Uploaded: details.php?id=9")));
        let service = service(FakeSource { fail: false }, uploader.clone());
        let mut events = service.context().progress.subscribe();

        let id = service.create(request()).await.unwrap();
        assert_eq!(service.run(id).await.unwrap(), JobStage::Succeeded);

        let job = service.snapshot(id).await.unwrap();
        assert_eq!(job.stage, JobStage::Succeeded);
        assert_eq!(job.message(), Some("Uploaded: details.php?id=9"));
        assert_eq!(job.result, Some(UploadOutcome::success("Uploaded: details.php?id=9")));

        let mapped = job.mapped_params.unwrap();
        assert_eq!(mapped.get("type").map(String::as_str), Some("401"));
        // Blu-ray with a DIY tag becomes Blu-ray DIY
        assert_eq!(mapped.get("medium_sel[4]").map(String::as_str), Some("13"));
        assert_eq!(mapped.get("processing_sel[4]").map(String::as_str), Some("2"));

        let seen = uploader.seen.lock().unwrap();
        assert_eq!(seen[0].name, "Old Movie 1999 1080p Blu-ray DIY AVC DTS-HD MA 5.1-CHD");

        let mut stages = Vec::new();
        while let Ok(event) = events.try_recv() {
            assert_eq!(event.job_id, id);
            stages.push(event.stage);
        }
        assert_eq!(
            stages,
            vec![
                JobStage::Created,
                JobStage::FetchingSource,
                JobStage::ExtractingMetadata,
                JobStage::BuildingDescription,
                JobStage::MappingParameters,
                JobStage::Submitting,
                JobStage::Succeeded,
            ]
        );
    }

    #[tokio::test]
    async fn test_unknown_site_rejected_before_caching() {
        let service = service(FakeSource { fail: false }, Arc::new(FakeUploader::new(UploadOutcome::success(""))));
        let mut req = request();
        req.destination_site = "nowhere".to_string();

        let err = service.submit(req).await.unwrap_err();
        assert!(matches!(err, MigrationError::UnknownSite(site) if site == "nowhere"));
        assert!(service.context().cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_network_failure_records_stage() {
        let service = service(FakeSource { fail: true }, Arc::new(FakeUploader::new(UploadOutcome::success(""))));
        let id = service.create(request()).await.unwrap();
        assert_eq!(service.run(id).await.unwrap(), JobStage::Failed);

        let failure = service.snapshot(id).await.unwrap().failure.unwrap();
        assert_eq!(failure.stage, JobStage::FetchingSource);
        assert_eq!(failure.kind, "network_failure");
        assert!(failure.message.contains("HTTP 502"));
    }

    #[tokio::test]
    async fn test_unresolved_required_field_fails_mapping() {
        let service = service(FakeSource { fail: false }, Arc::new(FakeUploader::new(UploadOutcome::success(""))));
        let mut req = request();
        req.source_params.clear();
        let id = service.create(req).await.unwrap();
        assert_eq!(service.run(id).await.unwrap(), JobStage::Failed);

        let job = service.snapshot(id).await.unwrap();
        let failure = job.failure.as_ref().unwrap();
        assert_eq!(failure.stage, JobStage::MappingParameters);
        assert_eq!(failure.kind, "schema_lookup_failure");
        assert!(failure.message.contains("'type'"));
        assert!(job.standardized_params.is_some());
        assert!(job.result.is_none());
    }

    #[tokio::test]
    async fn test_upstream_rejection_keeps_result() {
        let uploader = Arc::new(FakeUploader::new(UploadOutcome::failure("标题太短")));
        let service = service(FakeSource { fail: false }, uploader);
        let id = service.create(request()).await.unwrap();
        assert_eq!(service.run(id).await.unwrap(), JobStage::Failed);

        let job = service.snapshot(id).await.unwrap();
        assert_eq!(job.result, Some(UploadOutcome::failure("标题太短")));
        let failure = job.failure.as_ref().unwrap();
        assert_eq!(failure.stage, JobStage::Submitting);
        assert_eq!(failure.kind, "upstream_rejection");
        assert!(job.message().unwrap().contains("标题太短"));
    }

    #[tokio::test]
    async fn test_cancel_before_run() {
        let service = service(FakeSource { fail: false }, Arc::new(FakeUploader::new(UploadOutcome::success(""))));
        let id = service.create(request()).await.unwrap();

        assert!(service.cancel(id).await.unwrap());
        assert_eq!(service.run(id).await.unwrap(), JobStage::Failed);
        let failure = service.snapshot(id).await.unwrap().failure.unwrap();
        assert_eq!(failure.kind, "cancelled");
        assert_eq!(failure.stage, JobStage::Created);

        assert!(!service.cancel(id).await.unwrap());
        assert!(matches!(service.cancel(Uuid::new_v4()).await, Err(MigrationError::JobNotFound(_))));
    }

    #[tokio::test]
    async fn test_second_run_is_refused() {
        let service = service(FakeSource { fail: false }, Arc::new(FakeUploader::new(UploadOutcome::success(""))));
        let id = service.create(request()).await.unwrap();

        let guard = service.context().cache.acquire(id).unwrap();
        assert!(matches!(service.run(id).await, Err(MigrationError::AlreadyRunning(_))));
        drop(guard);
        assert_eq!(service.run(id).await.unwrap(), JobStage::Succeeded);
        // A finished job is not executed again
        assert_eq!(service.run(id).await.unwrap(), JobStage::Succeeded);
    }

    #[tokio::test]
    async fn test_polling_is_monotonic_and_submission_not_cancellable() {
        let gate = Arc::new(Notify::new());
        let uploader = Arc::new(FakeUploader {
            outcome: UploadOutcome::success("ok"),
            gate: Some(gate.clone()),
            seen: Mutex::new(Vec::new()),
        });
        let service = service(FakeSource { fail: false }, uploader);
        let id = service.submit(request()).await.unwrap();

        let mut last = JobStage::Created;
        let reached = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let stage = service.snapshot(id).await.unwrap().stage;
                assert!(stage >= last, "{} observed after {}", stage, last);
                last = stage;
                if stage == JobStage::Submitting || stage.is_terminal() {
                    break stage;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("job never reached submission");
        assert_eq!(reached, JobStage::Submitting);

        assert!(!service.cancel(id).await.unwrap());
        gate.notify_one();

        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let stage = service.snapshot(id).await.unwrap().stage;
                assert!(stage >= last);
                last = stage;
                if stage.is_terminal() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("job never finished");
        assert_eq!(last, JobStage::Succeeded);
    }

    /// Serves the fixture torrent and a listing page worth of details.
    struct ListingSource;

    #[async_trait]
    impl TorrentSource for ListingSource {
        async fn download(&self, _site: &SiteConfig, _torrent_id: &str) -> crate::site::Result<SourceTorrent> {
            Ok(SourceTorrent {
                filename: None,
                bytes: torrent_fixture(),
            })
        }

        async fn details(&self, _site: &SiteConfig, torrent_id: &str) -> crate::site::Result<SourceDetails> {
            assert_eq!(torrent_id, "1234");
            let mut details = SourceDetails {
                title: "Listed Movie 2001 1080p Blu-ray AVC DTS-HD MA 5.1-CHD".to_string(),
                subtitle: "列表电影 | 国语".to_string(),
                ..Default::default()
            };
            details.intro.body = "◎产　　地　中国香港".to_string();
            details.intro.mediainfo = BDINFO.to_string();
            details.source_params.insert("类型".to_string(), "电影".to_string());
            Ok(details)
        }
    }

    #[tokio::test]
    async fn test_listing_fills_empty_request() {
        let uploader = Arc::new(FakeUploader::new(UploadOutcome::success("ok")));
        let base = service(FakeSource { fail: false }, uploader.clone());
        let service = MigrationService::new(MigrationContext {
            registry: base.context().registry.clone(),
            schemas: SchemaStore::default(),
            cache: JobCache::new(Duration::from_secs(3600)),
            progress: ProgressBroadcaster::new(8),
            source: Arc::new(ListingSource),
            uploader: uploader.clone(),
            work_dir: base.context().work_dir.clone(),
        });

        let id = service
            .create(MigrationRequest {
                source_site: "hdsky".to_string(),
                destination_site: "baozi".to_string(),
                torrent_id: "1234".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(service.run(id).await.unwrap(), JobStage::Succeeded);

        let job = service.snapshot(id).await.unwrap();
        assert_eq!(job.title, "Listed Movie 2001 1080p Blu-ray AVC DTS-HD MA 5.1-CHD");
        assert_eq!(job.request.subtitle, "列表电影 | 国语");
        assert_eq!(
            job.mapped_params.unwrap().get("type").map(String::as_str),
            Some("401")
        );

        let seen = uploader.seen.lock().unwrap();
        assert_eq!(seen[0].subtitle, "列表电影 | 国语");
        assert!(seen[0].description.contains("中国香港"));
        assert!(seen[0].torrent_path.ends_with("Listed Movie 2001 1080p Blu-ray AVC DTS-HD MA 5.1-CHD.torrent"));
    }

    #[tokio::test]
    async fn test_sweep_removes_finished_jobs() {
        let uploader = Arc::new(FakeUploader::new(UploadOutcome::success("ok")));
        let base = service(FakeSource { fail: false }, uploader.clone());
        let ctx = base.context();
        let service = MigrationService::new(MigrationContext {
            registry: ctx.registry.clone(),
            schemas: SchemaStore::default(),
            cache: JobCache::new(Duration::ZERO),
            progress: ProgressBroadcaster::new(8),
            source: Arc::new(FakeSource { fail: false }),
            uploader,
            work_dir: ctx.work_dir.clone(),
        });

        let id = service.create(request()).await.unwrap();
        assert_eq!(service.run(id).await.unwrap(), JobStage::Succeeded);
        let job_dir = service.context().work_dir.join(id.to_string());
        assert!(job_dir.is_dir());

        assert_eq!(service.sweep().await, 1);
        assert!(!job_dir.exists());
        assert_eq!(service.sweep().await, 0);
    }

    #[tokio::test]
    async fn test_sweep_after_expired_lookup_removes_files() {
        let uploader = Arc::new(FakeUploader::new(UploadOutcome::success("ok")));
        let base = service(FakeSource { fail: false }, uploader.clone());
        let work_dir = base.context().work_dir.clone();
        let service = MigrationService::new(MigrationContext {
            registry: base.context().registry.clone(),
            schemas: SchemaStore::default(),
            cache: JobCache::new(Duration::ZERO),
            progress: ProgressBroadcaster::new(8),
            source: Arc::new(FakeSource { fail: false }),
            uploader,
            work_dir: work_dir.clone(),
        });

        let id = service.create(request()).await.unwrap();
        assert_eq!(service.run(id).await.unwrap(), JobStage::Succeeded);
        // Expired jobs read as gone before any sweep
        assert!(service.snapshot(id).await.is_none());

        let orphan = work_dir.join(Uuid::new_v4().to_string());
        tokio::fs::create_dir_all(&orphan).await.unwrap();
        let unrelated = work_dir.join("keep-me");
        tokio::fs::create_dir_all(&unrelated).await.unwrap();

        assert_eq!(service.sweep().await, 1);
        assert!(!work_dir.join(id.to_string()).exists());
        assert!(!orphan.exists());
        assert!(unrelated.exists());

        tokio::fs::remove_dir_all(&work_dir).await.unwrap();
    }
}
