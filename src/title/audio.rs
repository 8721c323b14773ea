//! Audio phrase normalization and merging with stream metadata.

use regex::Regex;
use std::sync::LazyLock;

use crate::media::{AudioSummary, AudioTrack};

static CODEC_CANON: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r"(?i)DTS-?HD[\s.]*MA", "DTS-HD MA"),
        (r"(?i)DTS-?HD[\s.]*HR", "DTS-HD HR"),
        (r"(?i)DTS-?HD", "DTS-HD"),
        (r"(?i)DTS[\s.:-]?X\b", "DTS:X"),
        (r"(?i)DTS", "DTS"),
        (r"(?i)(?:Dolby[\s.]*)?True-?HD", "TrueHD"),
        (r"(?i)DDP|DD\+", "DDP"),
        (r"(?i)E-?AC-?3", "E-AC-3"),
        (r"(?i)AC-?3", "AC3"),
        (r"(?i)\bDD\b", "DD"),
        (r"(?i)LPCM", "LPCM"),
        (r"(?i)\bPCM", "PCM"),
        (r"(?i)FLAC", "FLAC"),
        (r"(?i)ALAC", "ALAC"),
        (r"(?i)AAC", "AAC"),
        (r"(?i)Opus", "Opus"),
        (r"(?i)Vorbis", "Vorbis"),
        (r"(?i)MP3", "MP3"),
        (r"(?i)MP2", "MP2"),
        (r"(?i)\bAPE\b", "APE"),
        (r"(?i)\bWAV\b", "WAV"),
        (r"(?i)\bDSD\b", "DSD"),
        (r"(?i)AV3A", "AV3A"),
    ]
    .into_iter()
    .map(|(pattern, canonical)| (Regex::new(pattern).unwrap(), canonical))
    .collect()
});

static TRACKS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d{1,2})[\s.]?Audios?\b").unwrap());
static CHANNELS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{1,2})[.。\s](\d)(?:[.。](\d))?\b").unwrap());
static ATMOS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bAtmos\b").unwrap());
static LONE_X_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bX\b").unwrap());

/// An audio description split into its parts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AudioParts {
    pub codec: String,
    pub channels: String,
    pub atmos: bool,
    pub tracks: Option<usize>,
}

impl AudioParts {
    /// Split a raw audio phrase such as `DDP5.1 Atmos` or `DTS-HD.MA.7.1 2Audio`.
    pub fn parse(raw: &str) -> Self {
        let mut rest = raw.replace('。', ".");
        let mut parts = AudioParts::default();

        if let Some(caps) = TRACKS_RE.captures(&rest) {
            parts.tracks = caps[1].parse().ok();
            rest = TRACKS_RE.replace(&rest, " ").into_owned();
        }

        for (pattern, canonical) in CODEC_CANON.iter() {
            if let Some(m) = pattern.find(&rest) {
                parts.codec = canonical.to_string();
                rest.replace_range(m.range(), " ");
                break;
            }
        }

        if ATMOS_RE.is_match(&rest) {
            parts.atmos = true;
            rest = ATMOS_RE.replace_all(&rest, " ").into_owned();
        }

        // "DTS ... X" is DTS:X, not an Atmos marker
        if parts.codec == "DTS" && LONE_X_RE.is_match(&rest) {
            parts.codec = "DTS:X".to_string();
        }

        if let Some(caps) = CHANNELS_RE.captures(&rest) {
            parts.channels = match caps.get(3) {
                Some(height) => format!("{}.{}.{}", &caps[1], &caps[2], height.as_str()),
                None => format!("{}.{}", &caps[1], &caps[2]),
            };
        }

        parts
    }

    /// Render in the canonical order: codec, channels, Atmos, track count.
    pub fn render(&self) -> String {
        let mut out: Vec<String> = Vec::new();
        if !self.codec.is_empty() {
            out.push(self.codec.clone());
        }
        if !self.channels.is_empty() {
            out.push(self.channels.clone());
        }
        if self.atmos {
            out.push("Atmos".to_string());
        }
        if let Some(n) = self.tracks.filter(|n| *n > 1) {
            out.push(format!("{}Audios", n));
        }
        out.join(" ")
    }
}

/// Normalize a raw audio phrase taken from a title.
pub fn normalize_audio(raw: &str) -> String {
    AudioParts::parse(raw).render()
}

fn track_score(parts: &AudioParts, track: &AudioTrack) -> u32 {
    let mut score = 0;
    if !parts.codec.is_empty() && parts.codec.eq_ignore_ascii_case(&track.codec) {
        score += 50;
    }
    if !parts.channels.is_empty() && parts.channels == track.channels {
        score += 30;
    }
    if parts.atmos == track.atmos {
        score += 20;
    }
    score
}

/// Merge the audio value guessed from the title with what the stream
/// metadata reports. Metadata wins where both speak; the title keeps
/// whatever the metadata cannot confirm.
pub fn merge_stream_audio(title_audio: Option<&str>, summary: &AudioSummary) -> Option<String> {
    let title_audio = title_audio.map(str::trim).filter(|s| !s.is_empty());

    let Some(raw) = title_audio else {
        if summary.codec.is_empty() {
            return None;
        }
        let parts = AudioParts {
            codec: summary.codec.clone(),
            channels: summary.channels.clone(),
            atmos: summary.atmos,
            tracks: Some(summary.track_count),
        };
        return Some(parts.render());
    };

    let mut parts = AudioParts::parse(raw);

    let best = summary
        .tracks
        .iter()
        .map(|track| (track_score(&parts, track), track))
        .filter(|(score, _)| *score > 0)
        .max_by_key(|(score, _)| *score);

    if let Some((score, track)) = best {
        let codec_confirmed = score >= 50;
        if (codec_confirmed || parts.channels.is_empty()) && !track.channels.is_empty() {
            parts.channels = track.channels.clone();
        }
        if track.atmos && !parts.atmos {
            parts.atmos = true;
        }
    }

    if summary.track_count > 1 {
        parts.tracks = Some(summary.track_count);
    }

    Some(parts.render())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(codec: &str, channels: &str, atmos: bool) -> AudioTrack {
        AudioTrack {
            codec: codec.to_string(),
            channels: channels.to_string(),
            atmos,
            language: None,
        }
    }

    #[test]
    fn test_normalize_spacing() {
        assert_eq!(normalize_audio("DDP5.1"), "DDP 5.1");
        assert_eq!(normalize_audio("DTS-HD.MA.7.1"), "DTS-HD MA 7.1");
        assert_eq!(normalize_audio("DDP 5 1"), "DDP 5.1");
        assert_eq!(normalize_audio("E-AC-3 5.1"), "E-AC-3 5.1");
    }

    #[test]
    fn test_normalize_order() {
        assert_eq!(normalize_audio("Atmos TrueHD 7.1"), "TrueHD 7.1 Atmos");
        assert_eq!(normalize_audio("TrueHD Atmos 7.1 2Audio"), "TrueHD 7.1 Atmos 2Audios");
        assert_eq!(normalize_audio("DTS X 7.1"), "DTS:X 7.1");
    }

    #[test]
    fn test_merge_fills_missing_parts() {
        let summary = AudioSummary {
            codec: "TrueHD".to_string(),
            channels: "7.1".to_string(),
            atmos: true,
            track_count: 3,
            tracks: vec![track("TrueHD", "7.1", true), track("AC3", "5.1", false)],
        };
        let merged = merge_stream_audio(Some("TrueHD"), &summary);
        assert_eq!(merged.as_deref(), Some("TrueHD 7.1 Atmos 3Audios"));
    }

    #[test]
    fn test_merge_keeps_complete_title_audio() {
        let summary = AudioSummary {
            codec: "DTS-HD MA".to_string(),
            channels: "5.1".to_string(),
            atmos: false,
            track_count: 3,
            tracks: vec![track("DTS-HD MA", "5.1", false)],
        };
        let merged = merge_stream_audio(Some("DTS-HD MA 5.1 3Audios"), &summary);
        assert_eq!(merged.as_deref(), Some("DTS-HD MA 5.1 3Audios"));
    }

    #[test]
    fn test_merge_without_title_audio() {
        let summary = AudioSummary {
            codec: "DDP".to_string(),
            channels: "5.1".to_string(),
            atmos: true,
            track_count: 1,
            tracks: vec![track("DDP", "5.1", true)],
        };
        assert_eq!(merge_stream_audio(None, &summary).as_deref(), Some("DDP 5.1 Atmos"));
        assert_eq!(merge_stream_audio(None, &AudioSummary::default()), None);
    }
}
