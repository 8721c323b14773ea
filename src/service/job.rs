//! Migration job model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use uuid::Uuid;

use crate::params::StandardizedParams;
use crate::site::profiles::DescriptionParts;
use crate::site::{MappedParams, MappingError, SchemaError, SiteError, SourceDetails, UploadOutcome};
use crate::title::TitleComponent;
use crate::torrent::TorrentError;

/// Pipeline stages, in order. A job only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStage {
    Created,
    FetchingSource,
    ExtractingMetadata,
    BuildingDescription,
    MappingParameters,
    Submitting,
    Succeeded,
    Failed,
}

impl JobStage {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStage::Succeeded | JobStage::Failed)
    }

    /// Whether cancellation is still honoured at this stage.
    pub fn is_cancellable(self) -> bool {
        self < JobStage::Submitting
    }
}

impl std::fmt::Display for JobStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            JobStage::Created => "created",
            JobStage::FetchingSource => "fetching_source",
            JobStage::ExtractingMetadata => "extracting_metadata",
            JobStage::BuildingDescription => "building_description",
            JobStage::MappingParameters => "mapping_parameters",
            JobStage::Submitting => "submitting",
            JobStage::Succeeded => "succeeded",
            JobStage::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

/// A request to move one listing from a source site to a destination site.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MigrationRequest {
    pub source_site: String,
    pub destination_site: String,
    /// Torrent id on the source site.
    pub torrent_id: String,
    /// Release title as listed on the source site. Empty falls back to
    /// the torrent's own name.
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub subtitle: String,
    #[serde(default)]
    pub imdb_link: String,
    #[serde(default)]
    pub intro: DescriptionParts,
    /// Parameters shown on the source listing (`类型`, `产地`, `标签`, ...).
    #[serde(default)]
    pub source_params: BTreeMap<String, String>,
}

impl MigrationRequest {
    /// Whether any listing field is left for the source page to supply.
    pub fn is_incomplete(&self) -> bool {
        [&self.title, &self.subtitle, &self.intro.body, &self.intro.mediainfo]
            .iter()
            .any(|field| field.trim().is_empty())
            || self.source_params.is_empty()
    }

    /// Fill empty fields from the source listing. Supplied values win.
    pub fn fill_from(&mut self, details: SourceDetails) {
        fn fill(field: &mut String, value: String) {
            if field.trim().is_empty() {
                *field = value;
            }
        }
        fill(&mut self.title, details.title);
        fill(&mut self.subtitle, details.subtitle);
        fill(&mut self.imdb_link, details.imdb_link);
        fill(&mut self.intro.statement, details.intro.statement);
        fill(&mut self.intro.poster, details.intro.poster);
        fill(&mut self.intro.body, details.intro.body);
        fill(&mut self.intro.mediainfo, details.intro.mediainfo);
        fill(&mut self.intro.screenshots, details.intro.screenshots);
        for (key, value) in details.source_params {
            self.source_params.entry(key).or_insert(value);
        }
    }
}

/// Errors raised by the orchestrator.
#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    #[error("Unknown site: {0}")]
    UnknownSite(String),

    #[error("Could not resolve required field '{field}' (value: '{value}')")]
    SchemaLookupFailure { field: String, value: String },

    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Network failure during {stage}: {source}")]
    Network {
        stage: JobStage,
        #[source]
        source: SiteError,
    },

    #[error("Destination rejected the upload: {0}")]
    UpstreamRejection(String),

    #[error("Site configuration: {0}")]
    Configuration(String),

    #[error("Torrent error: {0}")]
    Torrent(#[from] TorrentError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Job not found: {0}")]
    JobNotFound(Uuid),

    #[error("Job {0} is already running")]
    AlreadyRunning(Uuid),

    #[error("Cancelled before {0}")]
    Cancelled(JobStage),
}

impl MigrationError {
    /// Stable identifier for the error class.
    pub fn kind(&self) -> &'static str {
        match self {
            MigrationError::UnknownSite(_) => "unknown_site",
            MigrationError::SchemaLookupFailure { .. } => "schema_lookup_failure",
            MigrationError::Schema(_) => "schema",
            MigrationError::Network { .. } => "network_failure",
            MigrationError::UpstreamRejection(_) => "upstream_rejection",
            MigrationError::Configuration(_) => "configuration",
            MigrationError::Torrent(_) => "torrent",
            MigrationError::Io(_) => "io",
            MigrationError::JobNotFound(_) => "job_not_found",
            MigrationError::AlreadyRunning(_) => "already_running",
            MigrationError::Cancelled(_) => "cancelled",
        }
    }
}

impl From<MappingError> for MigrationError {
    fn from(err: MappingError) -> Self {
        match err {
            MappingError::Unresolved { field, value } => MigrationError::SchemaLookupFailure {
                field: field.to_string(),
                value,
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, MigrationError>;

/// Why a job failed, tagged with the stage it failed in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFailure {
    pub stage: JobStage,
    pub kind: String,
    pub message: String,
}

/// One migration job as held in the cache.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationJob {
    pub id: Uuid,
    pub stage: JobStage,
    pub source: String,
    pub destination: String,
    pub title: String,
    #[serde(skip)]
    pub request: MigrationRequest,
    pub title_components: Vec<TitleComponent>,
    pub standardized_params: Option<StandardizedParams>,
    pub mapped_params: Option<MappedParams>,
    pub torrent_path: Option<PathBuf>,
    /// Upload outcome, stored as returned by the destination.
    pub result: Option<UploadOutcome>,
    pub failure: Option<JobFailure>,
    pub cancel_requested: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl MigrationJob {
    pub fn new(request: MigrationRequest) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            stage: JobStage::Created,
            source: request.source_site.clone(),
            destination: request.destination_site.clone(),
            title: request.title.clone(),
            request,
            title_components: Vec::new(),
            standardized_params: None,
            mapped_params: None,
            torrent_path: None,
            result: None,
            failure: None,
            cancel_requested: false,
            created_at: now,
            updated_at: now,
            finished_at: None,
        }
    }

    /// Move to a later stage. Returns false, leaving the job untouched, for
    /// a backward move or any move out of a terminal stage.
    pub fn advance(&mut self, stage: JobStage) -> bool {
        if self.stage.is_terminal() || stage <= self.stage {
            return false;
        }
        self.stage = stage;
        self.updated_at = Utc::now();
        if stage.is_terminal() {
            self.finished_at = Some(self.updated_at);
        }
        true
    }

    /// Human-readable message for a terminal job.
    pub fn message(&self) -> Option<&str> {
        match self.stage {
            JobStage::Succeeded => self.result.as_ref().map(|r| r.message.as_str()),
            JobStage::Failed => self.failure.as_ref().map(|f| f.message.as_str()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_from_keeps_supplied_fields() {
        let mut request = MigrationRequest {
            title: "Given Title 2020 1080p WEB-DL-GRP".to_string(),
            ..Default::default()
        };
        request.source_params.insert("类型".to_string(), "纪录片".to_string());
        assert!(request.is_incomplete());

        let mut details = SourceDetails {
            title: "Listed Title".to_string(),
            subtitle: "副标题".to_string(),
            ..Default::default()
        };
        details.intro.body = "简介".to_string();
        details.intro.mediainfo = "General".to_string();
        details.source_params.insert("类型".to_string(), "电影".to_string());
        details.source_params.insert("媒介".to_string(), "WEB-DL".to_string());
        request.fill_from(details);

        assert_eq!(request.title, "Given Title 2020 1080p WEB-DL-GRP");
        assert_eq!(request.subtitle, "副标题");
        assert_eq!(request.intro.body, "简介");
        assert_eq!(request.source_params["类型"], "纪录片");
        assert_eq!(request.source_params["媒介"], "WEB-DL");
        assert!(!request.is_incomplete());
    }

    #[test]
    fn test_stage_order() {
        assert!(JobStage::Created < JobStage::FetchingSource);
        assert!(JobStage::MappingParameters < JobStage::Submitting);
        assert!(JobStage::Submitting < JobStage::Succeeded);
        assert!(JobStage::BuildingDescription.is_cancellable());
        assert!(!JobStage::Submitting.is_cancellable());
        assert_eq!(JobStage::MappingParameters.to_string(), "mapping_parameters");
    }

    #[test]
    fn test_advance_is_forward_only() {
        let mut job = MigrationJob::new(MigrationRequest::default());
        assert!(job.advance(JobStage::FetchingSource));
        assert!(!job.advance(JobStage::FetchingSource));
        assert!(!job.advance(JobStage::Created));
        assert!(job.advance(JobStage::Failed));
        assert!(job.finished_at.is_some());
        assert!(!job.advance(JobStage::Succeeded));
        assert_eq!(job.stage, JobStage::Failed);
    }

    #[test]
    fn test_mapping_error_keeps_field() {
        let err: MigrationError = MappingError::Unresolved {
            field: crate::site::LogicalField::Type,
            value: String::new(),
        }
        .into();
        assert_eq!(err.kind(), "schema_lookup_failure");
        assert!(err.to_string().contains("'type'"));
    }
}
