//! Network seams used by the migration pipeline.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::details::SourceDetails;
use super::mapping::MappedParams;
use super::{Result, SiteConfig, SiteError};

/// A torrent file fetched from the source site.
#[derive(Debug, Clone)]
pub struct SourceTorrent {
    pub filename: Option<String>,
    pub bytes: Vec<u8>,
}

/// Fetches the original torrent file from a source site.
#[async_trait]
pub trait TorrentSource: Send + Sync {
    async fn download(&self, site: &SiteConfig, torrent_id: &str) -> Result<SourceTorrent>;

    /// Read title, description and declared parameters off the listing page.
    async fn details(&self, site: &SiteConfig, _torrent_id: &str) -> Result<SourceDetails> {
        Err(SiteError::InvalidResponse(format!(
            "listing pages of {} cannot be read",
            site.name
        )))
    }
}

/// Everything a destination site needs to accept an upload.
#[derive(Debug, Clone, Default, Serialize)]
pub struct UploadPayload {
    pub torrent_path: PathBuf,
    /// Rebuilt release name.
    pub name: String,
    pub subtitle: String,
    pub imdb_link: String,
    pub description: String,
    pub mediainfo: String,
    pub fields: MappedParams,
}

/// Result of an upload attempt, stored verbatim on the job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadOutcome {
    pub success: bool,
    pub message: String,
}

impl UploadOutcome {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// Submits an upload to a destination site. Implementations never return
/// an error: failures are reported as an unsuccessful outcome.
#[async_trait]
pub trait Uploader: Send + Sync {
    async fn upload(&self, site: &SiteConfig, payload: &UploadPayload) -> UploadOutcome;
}
