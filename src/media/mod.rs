//! MediaInfo / BDInfo analysis
//!
//! Detects which kind of technical report a listing carries and pulls out
//! the facts the rest of the pipeline cares about: HDR flavour, audio
//! tracks, picture height and language markers.

mod audio;

pub use audio::{best_track, channel_layout, codec_tier, standard_code, AudioSummary, AudioTrack};

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::LazyLock;

/// Kind of technical report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaFormat {
    MediaInfo,
    BdInfo,
    #[default]
    Unknown,
}

/// Everything extracted from a MediaInfo or BDInfo report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamInfo {
    pub format: MediaFormat,
    /// Standard HDR tag, empty for SDR.
    pub hdr: String,
    pub audio: Option<AudioSummary>,
    pub height: Option<u32>,
    pub tags: BTreeSet<String>,
}

const MEDIAINFO_MARKERS: [&str; 8] = [
    "General",
    "Video",
    "Audio",
    "Complete name",
    "File size",
    "Duration",
    "Width",
    "Height",
];
const BDINFO_REQUIRED: [&str; 2] = ["DISC INFO", "PLAYLIST REPORT"];
const BDINFO_OPTIONAL: [&str; 12] = [
    "VIDEO:",
    "AUDIO:",
    "SUBTITLES:",
    "FILES:",
    "Disc Label",
    "Disc Size",
    "BDInfo:",
    "Protection:",
    "Codec",
    "Bitrate",
    "Language",
    "Description",
];

pub fn is_mediainfo(text: &str) -> bool {
    MEDIAINFO_MARKERS.iter().filter(|m| text.contains(*m)).count() >= 3
}

pub fn is_bdinfo(text: &str) -> bool {
    let required = BDINFO_REQUIRED.iter().filter(|m| text.contains(*m)).count();
    let optional = BDINFO_OPTIONAL.iter().filter(|m| text.contains(*m)).count();
    required == BDINFO_REQUIRED.len() || (required >= 1 && optional >= 2)
}

/// MediaInfo signature is checked before BDInfo.
pub fn detect_format(text: &str) -> MediaFormat {
    if text.trim().is_empty() {
        MediaFormat::Unknown
    } else if is_mediainfo(text) {
        MediaFormat::MediaInfo
    } else if is_bdinfo(text) {
        MediaFormat::BdInfo
    } else {
        MediaFormat::Unknown
    }
}

/// Analyze a technical report. Unknown formats yield an empty result.
pub fn analyze(text: &str) -> StreamInfo {
    match detect_format(text) {
        MediaFormat::MediaInfo => analyze_mediainfo(text),
        MediaFormat::BdInfo => analyze_bdinfo(text),
        MediaFormat::Unknown => StreamInfo::default(),
    }
}

/// Canonical resolution for a picture height.
pub fn resolution_from_height(height: u32) -> String {
    match height {
        0..=480 => "480p".to_string(),
        481..=576 => "576p".to_string(),
        577..=720 => "720p".to_string(),
        721..=1080 => "1080p".to_string(),
        1081..=1440 => "1440p".to_string(),
        1441..=2160 => "2160p".to_string(),
        h => format!("{}p", h),
    }
}

/// HDR standard tag from MediaInfo video fields.
pub fn mediainfo_hdr_tag(hdr_format: &str, transfer: &str, primaries: &str) -> &'static str {
    let hdr_format = hdr_format.to_uppercase();
    let transfer = transfer.to_uppercase();
    let primaries = primaries.to_uppercase();

    if hdr_format.contains("DOLBY VISION") {
        if hdr_format.contains("HDR10+") {
            return "DoVi HDR10+";
        }
        if hdr_format.contains("HDR10") {
            return "DoVi HDR";
        }
        return "DoVi";
    }
    if hdr_format.contains("HDR10+") || hdr_format.contains("SMPTE ST 2094") {
        return "HDR10+";
    }
    if hdr_format.contains("VIVID") {
        return "HDR Vivid";
    }
    if hdr_format.contains("HDR10") || hdr_format.contains("SMPTE ST 2086") {
        return "HDR";
    }
    if transfer.contains("HLG") || transfer.contains("ARIB STD-B67") {
        return "HLG";
    }
    if primaries.contains("BT.2020") && (transfer.contains("PQ") || transfer.contains("SMPTE ST 2084")) {
        return "HDR";
    }
    ""
}

/// HDR standard tag from BDInfo video lines.
pub fn bdinfo_hdr_tag(video_lines: &[String]) -> &'static str {
    let combined = video_lines.join(" ").to_uppercase();
    let dv = combined.contains("DOLBY VISION");
    let hdr10_plus = combined.contains("HDR10+");
    let hdr10 = combined.contains("HDR10");

    if dv {
        return if hdr10_plus {
            "DoVi HDR10+"
        } else if hdr10 {
            "DoVi HDR"
        } else {
            "DoVi"
        };
    }
    if hdr10_plus {
        "HDR10+"
    } else if hdr10 {
        "HDR"
    } else if combined.contains("HLG") {
        "HLG"
    } else if combined.contains("BT.2020") {
        "HDR"
    } else {
        ""
    }
}

fn hdr_tags(standard: &str) -> Vec<&'static str> {
    let mut tags = Vec::new();
    if standard.contains("DoVi") {
        tags.push("tag.Dolby Vision");
    }
    if standard.contains("HDR10+") {
        tags.push("tag.HDR10+");
    } else if standard.ends_with("HDR") || standard == "HDR" {
        tags.push("tag.HDR10");
    }
    if standard == "HDR Vivid" {
        tags.push("tag.HDRVivid");
    }
    if standard == "HLG" {
        tags.push("tag.HLG");
    }
    tags
}

fn audio_language_tag(text: &str) -> Option<&'static str> {
    let lower = text.to_lowercase();
    if lower.contains("cantonese") || text.contains("粤语") {
        Some("tag.粤语")
    } else if lower.contains("mandarin") || lower.contains("chinese") || text.contains("国语") || text.contains("中文") {
        Some("tag.国语")
    } else if lower.contains("english") {
        Some("tag.英语")
    } else {
        None
    }
}

fn subtitle_language_tag(text: &str) -> Option<&'static str> {
    let lower = text.to_lowercase();
    const CHINESE: [&str; 3] = ["chinese", "chs", "cht"];
    if CHINESE.iter().any(|k| lower.contains(k)) || text.contains('简') || text.contains('繁') || text.contains("中") {
        Some("tag.中字")
    } else if lower.contains("english") {
        Some("tag.英字")
    } else {
        None
    }
}

static SECTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(General|Video|Audio|Text|Menu|Chapters|Image|Other)(?:\s*#\d+)?$").unwrap()
});
static DIGITS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d").unwrap());
static PROGRESSIVE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b(\d{3,4})[pi]\b").unwrap());
static BBCODE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[/?\w+(?:=[^\]]*)?\]").unwrap());

struct Section {
    kind: String,
    fields: Vec<(String, String)>,
}

impl Section {
    fn field(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

fn mediainfo_sections(text: &str) -> Vec<Section> {
    let mut sections = vec![Section {
        kind: "General".to_string(),
        fields: Vec::new(),
    }];
    for line in text.lines() {
        let line = BBCODE_RE.replace_all(line, "");
        let trimmed = line.trim();
        if let Some(caps) = SECTION_RE.captures(trimmed) {
            sections.push(Section {
                kind: caps[1].to_string(),
                fields: Vec::new(),
            });
        } else if let Some((key, value)) = trimmed.split_once(':') {
            if let Some(current) = sections.last_mut() {
                current
                    .fields
                    .push((key.trim().to_lowercase(), value.trim().to_string()));
            }
        }
    }
    sections
}

fn analyze_mediainfo(text: &str) -> StreamInfo {
    let sections = mediainfo_sections(text);
    let mut info = StreamInfo {
        format: MediaFormat::MediaInfo,
        ..Default::default()
    };

    if let Some(video) = sections.iter().find(|s| s.kind == "Video") {
        info.hdr = mediainfo_hdr_tag(
            video.field("hdr format").unwrap_or(""),
            video.field("transfer characteristics").unwrap_or(""),
            video.field("color primaries").unwrap_or(""),
        )
        .to_string();
        info.height = video.field("height").and_then(|h| {
            DIGITS_RE
                .find_iter(h)
                .map(|m| m.as_str())
                .collect::<String>()
                .parse()
                .ok()
        });
    }

    let mut tracks = Vec::new();
    for section in sections.iter().filter(|s| s.kind == "Audio") {
        let Some((codec, atmos)) = standard_code(
            section.field("format").unwrap_or(""),
            section.field("commercial name").unwrap_or(""),
            section.field("codec id").unwrap_or(""),
            section.field("format profile").unwrap_or(""),
        ) else {
            continue;
        };
        let language = section.field("language").map(str::to_string);
        let described = format!(
            "{} {}",
            language.as_deref().unwrap_or(""),
            section.field("title").unwrap_or("")
        );
        if let Some(tag) = audio_language_tag(&described) {
            info.tags.insert(tag.to_string());
        }
        tracks.push(AudioTrack {
            codec: codec.to_string(),
            channels: channel_layout(section.field("channel layout"), section.field("channel(s)")),
            atmos,
            language,
        });
    }
    info.audio = AudioSummary::from_tracks(tracks);

    for section in sections.iter().filter(|s| s.kind == "Text") {
        let described = format!(
            "{} {}",
            section.field("language").unwrap_or(""),
            section.field("title").unwrap_or("")
        );
        if let Some(tag) = subtitle_language_tag(&described) {
            info.tags.insert(tag.to_string());
        }
    }

    for tag in hdr_tags(&info.hdr) {
        info.tags.insert(tag.to_string());
    }
    info
}

#[derive(Clone, Copy, PartialEq)]
enum BdSection {
    Other,
    Video,
    Audio,
    Subtitles,
}

fn analyze_bdinfo(text: &str) -> StreamInfo {
    let mut info = StreamInfo {
        format: MediaFormat::BdInfo,
        ..Default::default()
    };

    let mut section = BdSection::Other;
    let mut video_lines = Vec::new();
    let mut audio_lines = Vec::new();
    let mut subtitle_lines = Vec::new();
    let mut summary_video = Vec::new();
    let mut summary_audio = Vec::new();

    for line in text.lines() {
        let clean = BBCODE_RE.replace_all(line, "").trim().to_string();
        if clean.is_empty() {
            continue;
        }
        let upper = clean.to_uppercase();
        match upper.as_str() {
            "VIDEO:" => {
                section = BdSection::Video;
                continue;
            }
            "AUDIO:" => {
                section = BdSection::Audio;
                continue;
            }
            "SUBTITLES:" => {
                section = BdSection::Subtitles;
                continue;
            }
            "FILES:" | "CHAPTERS:" | "STREAM DIAGNOSTICS:" | "DISC INFO:" | "PLAYLIST REPORT:" => {
                section = BdSection::Other;
                continue;
            }
            _ => {}
        }

        if let Some(rest) = strip_prefix_ci(&clean, "Video:") {
            summary_video.push(rest.to_string());
            continue;
        }
        if let Some(rest) = strip_prefix_ci(&clean, "Audio:") {
            summary_audio.push(rest.to_string());
            continue;
        }
        if let Some(rest) = strip_prefix_ci(&clean, "Subtitle:") {
            subtitle_lines.push(rest.to_string());
            continue;
        }

        if clean.starts_with('-') || upper.starts_with("CODEC") {
            continue;
        }
        match section {
            BdSection::Video if upper.contains("KBPS") || upper.contains("MBPS") => video_lines.push(clean),
            BdSection::Audio => audio_lines.push(clean),
            BdSection::Subtitles => subtitle_lines.push(clean),
            _ => {}
        }
    }

    if video_lines.is_empty() {
        video_lines = summary_video;
    }
    if audio_lines.is_empty() {
        audio_lines = summary_audio;
    }

    info.hdr = bdinfo_hdr_tag(&video_lines).to_string();
    info.height = video_lines
        .iter()
        .find_map(|l| PROGRESSIVE_RE.captures(l))
        .and_then(|c| c[1].parse().ok());

    let mut tracks = Vec::new();
    for line in &audio_lines {
        let Some((codec, atmos)) = standard_code(line, "", "", "") else {
            continue;
        };
        if let Some(tag) = audio_language_tag(line) {
            info.tags.insert(tag.to_string());
        }
        tracks.push(AudioTrack {
            codec: codec.to_string(),
            channels: audio::inline_layout(line).unwrap_or_else(|| "2.0".to_string()),
            atmos,
            language: None,
        });
    }
    info.audio = AudioSummary::from_tracks(tracks);

    for line in &subtitle_lines {
        if let Some(tag) = subtitle_language_tag(line) {
            info.tags.insert(tag.to_string());
        }
    }
    for tag in hdr_tags(&info.hdr) {
        info.tags.insert(tag.to_string());
    }
    info
}

fn strip_prefix_ci<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    let head = line.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix).then(|| line[prefix.len()..].trim())
}
