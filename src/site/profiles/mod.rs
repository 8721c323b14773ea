//! Site mapping profiles
//!
//! A profile customizes three hooks of the mapping base: tag handling,
//! field correction and description assembly. Everything else is shared.

mod checkbox;
mod description;
mod diy;
mod language;

pub use checkbox::CheckboxTags;
pub use description::{assemble_description, DescriptionParts, InlineMediaInfo, MediaWrap};
pub use diy::DiyMedium;
pub use language::LanguagePriority;

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::mapping::{self, MappedParams};
use super::schema::{SiteSchema, TagSchema};

/// Profile selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileKind {
    Standard,
    LanguagePriority,
    DiyMedium,
    CheckboxTags,
    #[serde(rename = "inline_mediainfo")]
    InlineMediaInfo,
}

impl ProfileKind {
    pub fn create(self) -> Box<dyn SiteProfile> {
        match self {
            ProfileKind::Standard => Box::new(Standard),
            ProfileKind::LanguagePriority => Box::new(LanguagePriority::default()),
            ProfileKind::DiyMedium => Box::new(DiyMedium::default()),
            ProfileKind::CheckboxTags => Box::new(CheckboxTags::default()),
            ProfileKind::InlineMediaInfo => Box::new(InlineMediaInfo),
        }
    }
}

impl std::fmt::Display for ProfileKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProfileKind::Standard => write!(f, "standard"),
            ProfileKind::LanguagePriority => write!(f, "language_priority"),
            ProfileKind::DiyMedium => write!(f, "diy_medium"),
            ProfileKind::CheckboxTags => write!(f, "checkbox_tags"),
            ProfileKind::InlineMediaInfo => write!(f, "inline_mediainfo"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Unknown profile: {0}")]
pub struct UnknownProfile(pub String);

impl std::str::FromStr for ProfileKind {
    type Err = UnknownProfile;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "standard" => Ok(ProfileKind::Standard),
            "language_priority" => Ok(ProfileKind::LanguagePriority),
            "diy_medium" => Ok(ProfileKind::DiyMedium),
            "checkbox_tags" => Ok(ProfileKind::CheckboxTags),
            "inline_mediainfo" => Ok(ProfileKind::InlineMediaInfo),
            _ => Err(UnknownProfile(s.to_string())),
        }
    }
}

/// Per-site hooks over the mapping base.
pub trait SiteProfile: Send + Sync {
    fn kind(&self) -> ProfileKind;

    /// Encode the tag set into form fields.
    fn handle_tags(&self, tags: &BTreeSet<String>, schema: &TagSchema) -> MappedParams {
        mapping::encode_tags(tags, schema)
    }

    /// Adjust already mapped fields.
    fn correct_fields(&self, _mapped: &mut MappedParams, _schema: &SiteSchema, _tags: &BTreeSet<String>) {}

    /// Build the description body sent as `descr`.
    fn build_description(&self, parts: &DescriptionParts) -> String {
        assemble_description(parts, MediaWrap::Omit)
    }
}

/// Base behaviour with no overrides.
pub struct Standard;

impl SiteProfile for Standard {
    fn kind(&self) -> ProfileKind {
        ProfileKind::Standard
    }
}
