//! Destination and source site management
//!
//! Sites are identified by a short id. Each one carries a profile kind that
//! selects its mapping hooks, a declarative field schema, and the
//! credentials needed to talk to it.

pub mod details;
pub mod mapping;
pub mod nexusphp;
pub mod profiles;
pub mod schema;
pub mod transport;

pub use details::SourceDetails;
pub use mapping::{build_release_name, map_params, MappedParams, MappingError};
pub use nexusphp::NexusPhpClient;
pub use profiles::{ProfileKind, SiteProfile};
pub use schema::{LogicalField, SchemaError, SchemaStore, SiteSchema, TagEncoding};
pub use transport::{SourceTorrent, TorrentSource, UploadOutcome, UploadPayload, Uploader};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;
use url::Url;

/// Error type for site operations
#[derive(Debug, thiserror::Error)]
pub enum SiteError {
    #[error("Unknown site: {0}")]
    UnknownSite(String),

    #[error("Missing passkey for {0}")]
    MissingPasskey(String),

    #[error("Missing cookie for {0}")]
    MissingCookie(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

pub type Result<T> = std::result::Result<T, SiteError>;

/// Site configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    pub id: String,
    pub name: String,
    pub base_url: String,
    /// Announce URL template; `{passkey}` is substituted.
    pub tracker_url: String,
    pub profile: ProfileKind,
    pub download_pattern: String,
    pub passkey: Option<String>,
    pub cookie: Option<String>,
}

impl SiteConfig {
    /// Create the mapping profile for this site
    pub fn create_profile(&self) -> Box<dyn SiteProfile> {
        self.profile.create()
    }

    pub fn build_download_url(&self, torrent_id: &str) -> Result<String> {
        let passkey = self
            .passkey
            .as_deref()
            .ok_or_else(|| SiteError::MissingPasskey(self.id.clone()))?;

        let path = self
            .download_pattern
            .replace("{id}", torrent_id)
            .replace("{passkey}", passkey);

        Ok(format!("{}{}", self.base_url.trim_end_matches('/'), path))
    }

    /// Listing page on a NexusPHP site.
    pub fn build_details_url(&self, torrent_id: &str) -> String {
        format!("{}/details.php?id={}&hit=1", self.base_url.trim_end_matches('/'), torrent_id)
    }

    pub fn announce_url(&self) -> Result<String> {
        let passkey = self
            .passkey
            .as_deref()
            .ok_or_else(|| SiteError::MissingPasskey(self.id.clone()))?;
        Ok(self.tracker_url.replace("{passkey}", passkey))
    }

    pub fn has_credentials(&self) -> bool {
        self.passkey.is_some() && self.cookie.is_some()
    }

    /// Scheme, host and port of the base URL, as sent in the `Origin` header.
    pub fn origin(&self) -> Result<String> {
        let parsed = Url::parse(&self.base_url)
            .map_err(|e| SiteError::InvalidResponse(format!("bad base URL {}: {}", self.base_url, e)))?;
        Ok(parsed.origin().ascii_serialization())
    }
}

fn valid_base_url(id: &str, base_url: &str) -> bool {
    match Url::parse(base_url) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => true,
        _ => {
            warn!("Ignoring invalid base URL '{}' for site '{}'", base_url, id);
            false
        }
    }
}

/// Per-site credentials and overrides from the configuration file.
///
/// An entry whose id is not built in registers a new site when it supplies
/// `name`, `base_url` and `tracker_url`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SiteCredentials {
    pub id: String,
    #[serde(default)]
    pub passkey: Option<String>,
    #[serde(default)]
    pub cookie: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub tracker_url: Option<String>,
    #[serde(default)]
    pub profile: Option<ProfileKind>,
}

/// Lookup table from site id to configuration. Unknown ids fail closed.
#[derive(Debug, Clone, Default)]
pub struct SiteRegistry {
    sites: BTreeMap<String, SiteConfig>,
}

impl SiteRegistry {
    pub fn new(sites: Vec<SiteConfig>) -> Self {
        Self {
            sites: sites.into_iter().map(|s| (s.id.clone(), s)).collect(),
        }
    }

    /// Built-in sites with configured credentials applied.
    pub fn with_credentials(sites: Vec<SiteConfig>, entries: &[SiteCredentials]) -> Self {
        let mut registry = Self::new(sites);
        for entry in entries {
            registry.apply(entry);
        }
        registry
    }

    fn apply(&mut self, entry: &SiteCredentials) {
        if let Some(site) = self.sites.get_mut(&entry.id) {
            if entry.passkey.is_some() {
                site.passkey = entry.passkey.clone();
            }
            if entry.cookie.is_some() {
                site.cookie = entry.cookie.clone();
            }
            if let Some(base_url) = entry.base_url.as_ref().filter(|u| valid_base_url(&entry.id, u)) {
                site.base_url = base_url.clone();
            }
            if let Some(tracker_url) = &entry.tracker_url {
                site.tracker_url = tracker_url.clone();
            }
            if let Some(profile) = entry.profile {
                site.profile = profile;
            }
            return;
        }

        match (&entry.name, &entry.base_url, &entry.tracker_url) {
            (Some(name), Some(base_url), Some(tracker_url)) if valid_base_url(&entry.id, base_url) => {
                self.sites.insert(
                    entry.id.clone(),
                    SiteConfig {
                        id: entry.id.clone(),
                        name: name.clone(),
                        base_url: base_url.clone(),
                        tracker_url: tracker_url.clone(),
                        profile: entry.profile.unwrap_or(ProfileKind::Standard),
                        download_pattern: DEFAULT_DOWNLOAD_PATTERN.to_string(),
                        passkey: entry.passkey.clone(),
                        cookie: entry.cookie.clone(),
                    },
                );
            }
            _ => warn!("Ignoring credentials for unknown site '{}'", entry.id),
        }
    }

    pub fn get(&self, id: &str) -> Result<&SiteConfig> {
        self.sites
            .get(id)
            .ok_or_else(|| SiteError::UnknownSite(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sites.contains_key(id)
    }

    pub fn list(&self) -> impl Iterator<Item = &SiteConfig> {
        self.sites.values()
    }
}

const DEFAULT_DOWNLOAD_PATTERN: &str = "/download.php?id={id}&passkey={passkey}";

fn nexusphp_site(id: &str, name: &str, base_url: &str, tracker_url: &str, profile: ProfileKind) -> SiteConfig {
    SiteConfig {
        id: id.to_string(),
        name: name.to_string(),
        base_url: base_url.to_string(),
        tracker_url: tracker_url.to_string(),
        profile,
        download_pattern: DEFAULT_DOWNLOAD_PATTERN.to_string(),
        passkey: None,
        cookie: None,
    }
}

/// Built-in site configurations
pub fn builtin_sites() -> Vec<SiteConfig> {
    vec![
        nexusphp_site(
            "baozi",
            "Baozi",
            "https://p.t-baozi.cc",
            "https://p.t-baozi.cc/announce.php?passkey={passkey}",
            ProfileKind::DiyMedium,
        ),
        nexusphp_site(
            "luckpt",
            "LuckPT",
            "https://pt.luckpt.de",
            "https://tracker.luckpt.de/announce.php?passkey={passkey}",
            ProfileKind::LanguagePriority,
        ),
        nexusphp_site(
            "pterclub",
            "PTer",
            "https://pterclub.com",
            "https://tracker.pterclub.com/announce.php?passkey={passkey}",
            ProfileKind::CheckboxTags,
        ),
        nexusphp_site(
            "zmpt",
            "ZMPT",
            "https://zmpt.cc",
            "https://zmpt.cc/announce.php?passkey={passkey}",
            ProfileKind::InlineMediaInfo,
        ),
        nexusphp_site(
            "hdsky",
            "HDSky",
            "https://hdsky.me",
            "https://tracker.hdsky.me/announce.php?passkey={passkey}",
            ProfileKind::Standard,
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_site_fails_closed() {
        let registry = SiteRegistry::new(builtin_sites());
        assert!(matches!(registry.get("nope"), Err(SiteError::UnknownSite(id)) if id == "nope"));
        assert_eq!(registry.get("baozi").unwrap().profile, ProfileKind::DiyMedium);
    }

    #[test]
    fn test_credentials_applied() {
        let entries = vec![
            SiteCredentials {
                id: "hdsky".to_string(),
                passkey: Some("abc".to_string()),
                cookie: Some("c=1".to_string()),
                ..Default::default()
            },
            SiteCredentials {
                id: "mysite".to_string(),
                name: Some("My Site".to_string()),
                base_url: Some("https://my.site".to_string()),
                tracker_url: Some("https://my.site/announce?pk={passkey}".to_string()),
                passkey: Some("pk".to_string()),
                ..Default::default()
            },
            SiteCredentials {
                id: "ghost".to_string(),
                ..Default::default()
            },
            SiteCredentials {
                id: "broken".to_string(),
                name: Some("Broken".to_string()),
                base_url: Some("not a url".to_string()),
                tracker_url: Some("https://x/announce".to_string()),
                ..Default::default()
            },
        ];
        let registry = SiteRegistry::with_credentials(builtin_sites(), &entries);

        let hdsky = registry.get("hdsky").unwrap();
        assert!(hdsky.has_credentials());
        assert_eq!(
            hdsky.build_download_url("42").unwrap(),
            "https://hdsky.me/download.php?id=42&passkey=abc"
        );
        assert_eq!(hdsky.build_details_url("42"), "https://hdsky.me/details.php?id=42&hit=1");

        let custom = registry.get("mysite").unwrap();
        assert_eq!(custom.profile, ProfileKind::Standard);
        assert_eq!(custom.announce_url().unwrap(), "https://my.site/announce?pk=pk");

        assert!(!registry.contains("ghost"));
        assert!(!registry.contains("broken"));
    }

    #[test]
    fn test_origin() {
        let registry = SiteRegistry::new(builtin_sites());
        assert_eq!(registry.get("pterclub").unwrap().origin().unwrap(), "https://pterclub.com");
    }

    #[test]
    fn test_missing_passkey() {
        let registry = SiteRegistry::new(builtin_sites());
        let zmpt = registry.get("zmpt").unwrap();
        assert!(matches!(zmpt.build_download_url("1"), Err(SiteError::MissingPasskey(_))));
    }
}
