//! Declarative site schemas
//!
//! A schema names the destination form fields for each logical field, the
//! value lookup table per field, and how tags are encoded. Built-in schemas
//! are compiled in; a `<site>.toml` file in the override directory replaces
//! the built-in copy and is re-read on every load.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::params::StandardizedParams;

#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("No schema for site {0}")]
    NotFound(String),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid schema for {site}: {source}")]
    Parse {
        site: String,
        #[source]
        source: toml::de::Error,
    },
}

pub type Result<T> = std::result::Result<T, SchemaError>;

/// Logical fields a schema can map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogicalField {
    Type,
    Medium,
    VideoCodec,
    AudioCodec,
    Resolution,
    Team,
    Source,
}

impl LogicalField {
    pub fn value_of(self, params: &StandardizedParams) -> Option<&str> {
        match self {
            LogicalField::Type => params.category.as_deref(),
            LogicalField::Medium => params.medium.as_deref(),
            LogicalField::VideoCodec => params.video_codec.as_deref(),
            LogicalField::AudioCodec => params.audio_codec.as_deref(),
            LogicalField::Resolution => params.resolution.as_deref(),
            LogicalField::Team => params.release_group.as_deref(),
            LogicalField::Source => params.source.as_deref(),
        }
    }
}

impl std::fmt::Display for LogicalField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LogicalField::Type => "type",
            LogicalField::Medium => "medium",
            LogicalField::VideoCodec => "video_codec",
            LogicalField::AudioCodec => "audio_codec",
            LogicalField::Resolution => "resolution",
            LogicalField::Team => "team",
            LogicalField::Source => "source",
        };
        write!(f, "{}", name)
    }
}

/// One destination form field and its value vocabulary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldSchema {
    /// Form field name, e.g. `medium_sel[4]`.
    pub name: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub values: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldTable {
    #[serde(rename = "type")]
    pub category: Option<FieldSchema>,
    pub medium: Option<FieldSchema>,
    pub video_codec: Option<FieldSchema>,
    pub audio_codec: Option<FieldSchema>,
    pub resolution: Option<FieldSchema>,
    pub team: Option<FieldSchema>,
    pub source: Option<FieldSchema>,
}

impl FieldTable {
    pub fn get(&self, field: LogicalField) -> Option<&FieldSchema> {
        match field {
            LogicalField::Type => self.category.as_ref(),
            LogicalField::Medium => self.medium.as_ref(),
            LogicalField::VideoCodec => self.video_codec.as_ref(),
            LogicalField::AudioCodec => self.audio_codec.as_ref(),
            LogicalField::Resolution => self.resolution.as_ref(),
            LogicalField::Team => self.team.as_ref(),
            LogicalField::Source => self.source.as_ref(),
        }
    }

    /// Declared fields in a fixed order.
    pub fn iter(&self) -> impl Iterator<Item = (LogicalField, &FieldSchema)> {
        [
            LogicalField::Type,
            LogicalField::Medium,
            LogicalField::VideoCodec,
            LogicalField::AudioCodec,
            LogicalField::Resolution,
            LogicalField::Team,
            LogicalField::Source,
        ]
        .into_iter()
        .filter_map(move |field| self.get(field).map(|schema| (field, schema)))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagEncoding {
    /// `tags[4][0]`, `tags[4][1]`, ...
    #[default]
    Array,
    /// One independent form field per tag; lookup values are field names.
    Checkbox,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagSchema {
    #[serde(default)]
    pub encoding: TagEncoding,
    #[serde(default = "default_tag_field")]
    pub field: String,
    #[serde(default = "default_checked_value")]
    pub checked_value: String,
    /// Tags added to every upload for this site.
    #[serde(default)]
    pub implicit: Vec<String>,
    #[serde(default)]
    pub values: BTreeMap<String, String>,
}

fn default_tag_field() -> String {
    "tags[4]".to_string()
}

fn default_checked_value() -> String {
    "yes".to_string()
}

impl Default for TagSchema {
    fn default() -> Self {
        Self {
            encoding: TagEncoding::Array,
            field: default_tag_field(),
            checked_value: default_checked_value(),
            implicit: Vec::new(),
            values: BTreeMap::new(),
        }
    }
}

/// A destination site's upload form vocabulary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SiteSchema {
    pub site: String,
    #[serde(default)]
    pub fields: FieldTable,
    #[serde(default)]
    pub tags: TagSchema,
}

impl SiteSchema {
    pub fn from_toml(site: &str, text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|source| SchemaError::Parse {
            site: site.to_string(),
            source,
        })
    }

    /// Form field name for a logical field, if the site declares it.
    pub fn field_name(&self, field: LogicalField) -> Option<&str> {
        self.fields.get(field).map(|f| f.name.as_str())
    }
}

fn builtin(site: &str) -> Option<&'static str> {
    match site {
        "baozi" => Some(include_str!("../../configs/schemas/baozi.toml")),
        "luckpt" => Some(include_str!("../../configs/schemas/luckpt.toml")),
        "pterclub" => Some(include_str!("../../configs/schemas/pterclub.toml")),
        "zmpt" => Some(include_str!("../../configs/schemas/zmpt.toml")),
        "hdsky" => Some(include_str!("../../configs/schemas/hdsky.toml")),
        _ => None,
    }
}

/// Schema source: override directory first, then the compiled-in copies.
#[derive(Debug, Clone, Default)]
pub struct SchemaStore {
    override_dir: Option<PathBuf>,
}

impl SchemaStore {
    pub fn new(override_dir: Option<PathBuf>) -> Self {
        Self { override_dir }
    }

    pub fn override_dir(&self) -> Option<&Path> {
        self.override_dir.as_deref()
    }

    /// Load the schema for a site. Called once per mapping pass.
    pub fn load(&self, site: &str) -> Result<SiteSchema> {
        if let Some(dir) = &self.override_dir {
            let path = dir.join(format!("{}.toml", site));
            if path.is_file() {
                debug!("Loading schema override {}", path.display());
                let text = std::fs::read_to_string(&path)
                    .map_err(|source| SchemaError::Io { path, source })?;
                return SiteSchema::from_toml(site, &text);
            }
        }

        let text = builtin(site).ok_or_else(|| SchemaError::NotFound(site.to_string()))?;
        SiteSchema::from_toml(site, text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_schemas_parse() {
        let store = SchemaStore::default();
        for site in ["baozi", "luckpt", "pterclub", "zmpt", "hdsky"] {
            let schema = store.load(site).unwrap();
            assert_eq!(schema.site, site);
            assert!(schema.field_name(LogicalField::Medium).is_some());
        }
        assert_eq!(
            store.load("pterclub").unwrap().tags.encoding,
            TagEncoding::Checkbox
        );
    }

    #[test]
    fn test_unknown_schema() {
        let store = SchemaStore::default();
        assert!(matches!(store.load("nowhere"), Err(SchemaError::NotFound(_))));
    }

    #[test]
    fn test_override_directory_is_reread() {
        let dir = std::env::temp_dir().join(format!("transplant-schema-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let store = SchemaStore::new(Some(dir.clone()));

        std::fs::write(
            dir.join("hdsky.toml"),
            "site = \"hdsky\"\n[fields.medium]\nname = \"m\"\nvalues = { \"medium.webdl\" = \"10\" }\n",
        )
        .unwrap();
        let schema = store.load("hdsky").unwrap();
        assert_eq!(schema.field_name(LogicalField::Medium), Some("m"));

        std::fs::write(
            dir.join("hdsky.toml"),
            "site = \"hdsky\"\n[fields.medium]\nname = \"medium\"\n",
        )
        .unwrap();
        let schema = store.load("hdsky").unwrap();
        assert_eq!(schema.field_name(LogicalField::Medium), Some("medium"));

        std::fs::write(dir.join("hdsky.toml"), "site = ").unwrap();
        assert!(matches!(store.load("hdsky"), Err(SchemaError::Parse { .. })));

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
