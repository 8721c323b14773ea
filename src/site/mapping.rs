//! Mapping base
//!
//! Projects standardized parameters onto a site's form schema. Site
//! profiles only adjust the tag, field-correction and description hooks;
//! the control flow here is shared by every site.

use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use super::profiles::SiteProfile;
use super::schema::{LogicalField, SiteSchema, TagEncoding, TagSchema};
use crate::params::StandardizedParams;
use crate::title::{ComponentKey, TitleComponent};

/// Destination form field name to destination value.
pub type MappedParams = BTreeMap<String, String>;

#[derive(Debug, thiserror::Error)]
pub enum MappingError {
    #[error("Required field '{field}' could not be resolved (value: '{value}')")]
    Unresolved { field: LogicalField, value: String },
}

pub type Result<T> = std::result::Result<T, MappingError>;

/// Next, less specific key to try when a lookup misses.
pub fn fallback(key: &str) -> Option<&'static str> {
    match key {
        "audio.truehd_atmos" => Some("audio.truehd"),
        "audio.dtsx" => Some("audio.dts_hd_ma"),
        "audio.dts_hd_ma" => Some("audio.dts"),
        "audio.dts_hd_hr" => Some("audio.dts"),
        "audio.ddp" => Some("audio.ac3"),
        "video.x265" => Some("video.h265"),
        "video.x264" => Some("video.h264"),
        _ => None,
    }
}

/// Resolve a standardized value against a lookup table.
///
/// Tries an exact case-insensitive key, then the value as a whole word
/// inside a longer table key (longest key first), then the fallback chain.
pub fn find_mapping<'a>(table: &'a BTreeMap<String, String>, value: &str) -> Option<&'a str> {
    let value = value.trim();
    if table.is_empty() || value.is_empty() {
        return None;
    }

    let mut keys: Vec<(String, &'a str)> = table
        .iter()
        .map(|(k, v)| (k.to_lowercase(), v.as_str()))
        .collect();
    keys.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));

    let mut current = Some(value.to_string());
    while let Some(key) = current {
        let lower = key.to_lowercase();

        if let Some((_, v)) = keys.iter().find(|(k, _)| *k == lower) {
            return Some(*v);
        }

        if let Some((k, v)) = keys.iter().find(|(k, _)| contains_word(k, &lower)) {
            debug!("Mapped '{}' by containment in '{}'", key, k);
            return Some(*v);
        }

        current = fallback(&key).map(str::to_string);
        if let Some(next) = &current {
            debug!("No mapping for '{}', falling back to '{}'", key, next);
        }
    }
    None
}

fn is_word(c: Option<char>) -> bool {
    c.is_some_and(|c| c.is_alphanumeric() || c == '_')
}

/// `needle` occurs in `haystack` with a word boundary on both ends.
fn contains_word(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }
    let first = needle.chars().next();
    let last = needle.chars().next_back();
    haystack.match_indices(needle).any(|(start, m)| {
        let before = haystack[..start].chars().next_back();
        let after = haystack[start + m.len()..].chars().next();
        is_word(before) != is_word(first) && is_word(last) != is_word(after)
    })
}

/// Base tag encoding: tags plus the schema's implicit tags, resolved,
/// deduplicated and written as an indexed array or as checkbox fields.
pub fn encode_tags(tags: &BTreeSet<String>, schema: &TagSchema) -> MappedParams {
    let mut codes = BTreeSet::new();
    for tag in tags.iter().chain(schema.implicit.iter()) {
        if let Some(code) = find_mapping(&schema.values, tag) {
            codes.insert(code.to_string());
        }
    }

    match schema.encoding {
        TagEncoding::Array => codes
            .into_iter()
            .enumerate()
            .map(|(i, code)| (format!("{}[{}]", schema.field, i), code))
            .collect(),
        TagEncoding::Checkbox => codes
            .into_iter()
            .map(|field| (field, schema.checked_value.clone()))
            .collect(),
    }
}

/// Map standardized parameters onto a site schema.
///
/// Unresolved optional fields are omitted; an unresolved required field
/// fails with the field named.
pub fn map_params(
    params: &StandardizedParams,
    schema: &SiteSchema,
    profile: &dyn SiteProfile,
) -> Result<MappedParams> {
    let mut mapped = MappedParams::new();

    for (field, spec) in schema.fields.iter() {
        let value = field.value_of(params);
        match value.and_then(|v| find_mapping(&spec.values, v)) {
            Some(code) => {
                mapped.insert(spec.name.clone(), code.to_string());
            }
            None if spec.required => {
                return Err(MappingError::Unresolved {
                    field,
                    value: value.unwrap_or_default().to_string(),
                });
            }
            None => debug!("{}: no mapping for {:?}, omitted", field, value),
        }
    }

    mapped.extend(profile.handle_tags(&params.tags, &schema.tags));
    let tags: BTreeSet<String> = params
        .tags
        .iter()
        .chain(schema.tags.implicit.iter())
        .cloned()
        .collect();
    profile.correct_fields(&mut mapped, schema, &tags);

    Ok(mapped)
}

const NAME_ORDER: [ComponentKey; 14] = [
    ComponentKey::Title,
    ComponentKey::SeasonEpisode,
    ComponentKey::Year,
    ComponentKey::CompletionStatus,
    ComponentKey::ReleaseVersion,
    ComponentKey::Resolution,
    ComponentKey::SourcePlatform,
    ComponentKey::Medium,
    ComponentKey::VideoCodec,
    ComponentKey::VideoFormat,
    ComponentKey::HdrFormat,
    ComponentKey::BitDepth,
    ComponentKey::FrameRate,
    ComponentKey::AudioCodec,
];

const SPACE_JOINED_GROUPS: [&str; 2] = ["MNHD-FRDS", "mUHD-FRDS"];

/// Rebuild a clean release name from title components.
pub fn build_release_name(components: &[TitleComponent]) -> String {
    let value = |key: ComponentKey| {
        components
            .iter()
            .find(|c| c.key == key)
            .map(|c| c.value.trim())
            .filter(|v| !v.is_empty())
    };

    let joined = NAME_ORDER
        .iter()
        .filter_map(|key| value(*key))
        .collect::<Vec<_>>()
        .join(" ");
    let main = collapse_spaces(&undot(&joined));

    match value(ComponentKey::ReleaseGroup) {
        Some(group) if !matches!(group.to_lowercase().as_str(), "na" | "n/a" | "nogroup") => {
            if SPACE_JOINED_GROUPS.contains(&group) {
                format!("{} {}", main, group)
            } else {
                format!("{}-{}", main, group)
            }
        }
        _ => main,
    }
}

/// Dots not between two digits become spaces (`5.1` and `H.265` keep theirs
/// only when flanked by digits).
fn undot(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    chars
        .iter()
        .enumerate()
        .map(|(i, &c)| {
            if c != '.' {
                return c;
            }
            let before = i > 0 && chars[i - 1].is_ascii_digit();
            let after = chars.get(i + 1).is_some_and(|n| n.is_ascii_digit());
            if before || after {
                '.'
            } else {
                ' '
            }
        })
        .collect()
}

fn collapse_spaces(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
