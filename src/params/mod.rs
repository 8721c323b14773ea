//! Standardized parameter model
//!
//! A site-independent description of a release, assembled from the parsed
//! title, stream metadata and the listing's free text.

pub mod normalize;
pub mod tags;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::media::{self, MediaFormat, StreamInfo};
use crate::title::{ComponentKey, ParsedTitle};

/// Canonical release description. Empty fields had no evidence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StandardizedParams {
    pub title: String,
    pub subtitle: String,
    pub year: Option<String>,
    pub season_episode: Option<String>,
    #[serde(rename = "type")]
    pub category: Option<String>,
    pub medium: Option<String>,
    pub video_codec: Option<String>,
    pub audio_codec: Option<String>,
    pub resolution: Option<String>,
    pub hdr_format: Option<String>,
    pub source_platform: Option<String>,
    pub release_group: Option<String>,
    pub source: Option<String>,
    pub tags: BTreeSet<String>,
}

impl StandardizedParams {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }
}

/// Free-text inputs that sit next to the title on a listing.
#[derive(Debug, Clone, Copy, Default)]
pub struct Auxiliary<'a> {
    pub subtitle: &'a str,
    pub description: &'a str,
    /// Parameters declared by the source listing (`类型`, `产地`, `标签`).
    pub declared: Option<&'a BTreeMap<String, String>>,
}

impl<'a> Auxiliary<'a> {
    fn declared(&self, keys: &[&str]) -> Option<&'a str> {
        let declared = self.declared?;
        keys.iter()
            .find_map(|k| declared.get(*k))
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }
}

/// Build the standardized model from parser output and auxiliary text.
pub fn build(parsed: &ParsedTitle, stream: &StreamInfo, aux: &Auxiliary) -> StandardizedParams {
    let mut tags = tags::subtitle_tags(aux.subtitle);
    tags.extend(tags::title_tags(parsed));
    tags.extend(stream.tags.iter().cloned());
    if let Some(declared) = aux.declared(&["标签", "tags"]) {
        tags.extend(declared_tags(declared));
    }

    let season_episode = non_empty(parsed.value(ComponentKey::SeasonEpisode));

    let category = aux
        .declared(&["类型", "type"])
        .and_then(normalize::category)
        .or(season_episode.as_ref().map(|_| "category.tv_series"))
        .map(str::to_string);

    let medium = normalize::medium(parsed.value(ComponentKey::Medium)).map(|key| {
        let blu_ray = matches!(key, "medium.bluray" | "medium.uhd_bluray");
        if blu_ray && stream.format == MediaFormat::MediaInfo && !tags.contains("tag.DIY") {
            "medium.encode"
        } else {
            key
        }
    });

    let resolution = match parsed.get(ComponentKey::Resolution) {
        Some(raw) => normalize::resolution(raw),
        None => stream
            .height
            .map(media::resolution_from_height)
            .and_then(|r| normalize::resolution(&r)),
    };

    let origin = tags::extract_origin(aux.description)
        .or_else(|| aux.declared(&["产地", "source"]).map(str::to_string));

    StandardizedParams {
        title: parsed.value(ComponentKey::Title).to_string(),
        subtitle: aux.subtitle.trim().to_string(),
        year: non_empty(parsed.value(ComponentKey::Year)),
        season_episode,
        category,
        medium: medium.map(str::to_string),
        video_codec: normalize::video_codec(parsed.value(ComponentKey::VideoCodec)).map(str::to_string),
        audio_codec: normalize::audio_codec(parsed.value(ComponentKey::AudioCodec)).map(str::to_string),
        resolution: resolution.map(str::to_string),
        hdr_format: non_empty(parsed.value(ComponentKey::HdrFormat)),
        source_platform: non_empty(parsed.value(ComponentKey::SourcePlatform)),
        release_group: non_empty(parsed.value(ComponentKey::ReleaseGroup)),
        source: origin.as_deref().and_then(normalize::origin).map(str::to_string),
        tags,
    }
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

fn declared_tags(raw: &str) -> impl Iterator<Item = String> + '_ {
    raw.split([',', '，', '/', ' '])
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(|t| {
            if t.starts_with("tag.") {
                t.to_string()
            } else {
                format!("tag.{}", t)
            }
        })
}
