//! Audio track extraction and best-track selection.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::sync::LazyLock;

static DIGITS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").unwrap());
static LAYOUT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+\.\d+(?:\.\d+)?)").unwrap());

/// One audio stream as described by MediaInfo or BDInfo.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioTrack {
    pub codec: String,
    pub channels: String,
    pub atmos: bool,
    pub language: Option<String>,
}

/// The preferred track plus the overall track count.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioSummary {
    pub codec: String,
    pub channels: String,
    pub atmos: bool,
    pub track_count: usize,
    pub tracks: Vec<AudioTrack>,
}

impl AudioSummary {
    pub fn from_tracks(tracks: Vec<AudioTrack>) -> Option<Self> {
        let best = best_track(&tracks)?.clone();
        Some(Self {
            codec: best.codec,
            channels: best.channels,
            atmos: best.atmos,
            track_count: tracks.len(),
            tracks,
        })
    }
}

/// Lower is better.
pub fn codec_tier(codec: &str) -> u32 {
    let c = codec.to_uppercase();
    if c.contains("DTS-HD") && c.contains("MA") {
        return 11;
    }
    if c.contains("DTS-HD") && c.contains("HR") {
        return 20;
    }
    match c.as_str() {
        "AV3A" => 0,
        "DTS:X" => 1,
        "TRUEHD" => 10,
        "FLAC" | "LPCM" | "PCM" | "ALAC" | "WAV" | "APE" | "DSD" => 21,
        "DDP" | "E-AC-3" => 30,
        "DTS" => 31,
        "DD" | "AC-3" | "AC3" => 40,
        "OPUS" => 50,
        "AAC" => 51,
        "VORBIS" => 52,
        "MP3" => 60,
        _ => 100,
    }
}

fn channel_sum(channels: &str) -> u32 {
    DIGITS_RE
        .find_iter(channels)
        .filter_map(|m| m.as_str().parse::<u32>().ok())
        .sum()
}

/// Best codec tier first, then most channels, then Atmos/object audio.
pub fn best_track(tracks: &[AudioTrack]) -> Option<&AudioTrack> {
    tracks.iter().min_by_key(|t| {
        let object_audio = t.atmos || t.codec == "DTS:X" || t.codec == "AV3A";
        (codec_tier(&t.codec), Reverse(channel_sum(&t.channels)), !object_audio)
    })
}

/// Map the format fields of a track to a standard codec name and whether it
/// carries Atmos. Returns `None` for non-audio entries.
pub fn standard_code(
    format: &str,
    commercial: &str,
    codec_id: &str,
    profile: &str,
) -> Option<(&'static str, bool)> {
    let f = format.trim().to_uppercase();
    let cid = codec_id.trim().to_uppercase();
    let p = profile.trim().to_uppercase();
    let full = format!("{} {} {} {}", f, commercial.trim().to_uppercase(), cid, p);

    const NOT_AUDIO: [&str; 9] = ["JPEG", "PNG", "COVER", "ASS", "SSA", "S_TEXT", "TIMECODE", "MENU", "PGS"];
    if NOT_AUDIO.iter().any(|k| full.contains(k)) {
        return None;
    }
    const AUDIO_HINTS: [&str; 11] = ["AUDIO", "DTS", "DOLBY", "LPCM", "AAC", "FLAC", "PCM", "OPUS", "MPEG", "AV3A", "VIVID"];
    if full.contains("VIDEO") && !AUDIO_HINTS.iter().any(|k| full.contains(k)) {
        return None;
    }

    let atmos = full.contains("ATMOS");
    let code = if full.contains("AV3A") || full.contains("AUDIO VIVID") {
        "AV3A"
    } else if full.contains("DTS") {
        if full.contains("DTS:X") || full.contains("DTSX") {
            "DTS:X"
        } else if p.contains("MA") || full.contains("MASTER AUDIO") || full.contains("XLL") {
            "DTS-HD MA"
        } else if p.contains("HRA") || full.contains("HIGH RESOLUTION") {
            "DTS-HD HR"
        } else {
            "DTS"
        }
    } else if full.contains("TRUEHD") || f.contains("MLP") || cid.contains("MLPA") {
        return Some(("TrueHD", atmos));
    } else if full.contains("E-AC-3") || full.contains("EC-3") || full.contains("DDP") || full.contains("DIGITAL PLUS") {
        return Some(("DDP", atmos || full.contains("JOC")));
    } else if full.contains("AC-3") || full.contains("AC3") || full.contains("DOLBY DIGITAL") {
        "DD"
    } else if full.contains("LPCM") {
        "LPCM"
    } else if full.contains("PCM") {
        "PCM"
    } else if full.contains("FLAC") {
        "FLAC"
    } else if full.contains("APE") {
        "APE"
    } else if full.contains("WAV") {
        "WAV"
    } else if full.contains("ALAC") {
        "ALAC"
    } else if full.contains("DSD") {
        "DSD"
    } else if full.contains("AAC") || cid.contains("MP4A") {
        "AAC"
    } else if full.contains("OPUS") {
        "Opus"
    } else if full.contains("VORBIS") || full.contains("OGG") {
        "Vorbis"
    } else if full.contains("MPEG AUDIO") || full.contains("MP3") {
        "MP3"
    } else {
        return None;
    };
    Some((code, false))
}

/// Channel layout such as `5.1` from MediaInfo's `Channel layout` or
/// `Channel(s)` lines.
pub fn channel_layout(layout: Option<&str>, count: Option<&str>) -> String {
    if let Some(layout) = layout.map(str::trim).filter(|l| !l.is_empty()) {
        let parts: Vec<String> = layout.split_whitespace().map(str::to_uppercase).collect();
        return if parts.iter().any(|p| p == "LFE") {
            format!("{}.1", parts.len() - 1)
        } else {
            format!("{}.0", parts.len())
        };
    }
    if let Some(n) = count
        .and_then(|c| DIGITS_RE.find(c))
        .and_then(|m| m.as_str().parse::<u32>().ok())
    {
        return match n {
            8 => "7.1".to_string(),
            6 => "5.1".to_string(),
            2 => "2.0".to_string(),
            1 => "1.0".to_string(),
            n => format!("{}.0", n),
        };
    }
    "2.0".to_string()
}

/// Channel layout written inline, as BDInfo does (`... / 7.1 / 48 kHz`).
pub fn inline_layout(text: &str) -> Option<String> {
    LAYOUT_RE.captures(text).map(|c| c[1].to_string())
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
    fn test_standard_code() {
        assert_eq!(standard_code("DTS", "DTS-HD Master Audio", "A_DTS", "MA / Core"), Some(("DTS-HD MA", false)));
        assert_eq!(standard_code("MLP FBA", "Dolby TrueHD with Dolby Atmos", "A_TRUEHD", ""), Some(("TrueHD", true)));
        assert_eq!(standard_code("E-AC-3 JOC", "Dolby Digital Plus with Dolby Atmos", "A_EAC3", ""), Some(("DDP", true)));
        assert_eq!(standard_code("AC-3", "Dolby Digital", "A_AC3", ""), Some(("DD", false)));
        assert_eq!(standard_code("PGS", "", "S_HDMV/PGS", ""), None);
    }

    #[test]
    fn test_channel_layout() {
        assert_eq!(channel_layout(Some("L R C LFE Ls Rs"), None), "5.1");
        assert_eq!(channel_layout(Some("L R C LFE Ls Rs Lb Rb"), None), "7.1");
        assert_eq!(channel_layout(Some("L R"), None), "2.0");
        assert_eq!(channel_layout(None, Some("6 channels")), "5.1");
        assert_eq!(channel_layout(None, None), "2.0");
    }

    #[test]
    fn test_best_track() {
        let tracks = vec![
            track("AC3", "5.1", false),
            track("TrueHD", "7.1", true),
            track("DTS-HD MA", "7.1", false),
        ];
        assert_eq!(best_track(&tracks).unwrap().codec, "TrueHD");

        let tracks = vec![track("AAC", "2.0", false), track("AAC", "5.1", false)];
        assert_eq!(best_track(&tracks).unwrap().channels, "5.1");
    }

    #[test]
    fn test_summary() {
        let summary = AudioSummary::from_tracks(vec![
            track("DD", "2.0", false),
            track("DDP", "5.1", true),
        ])
        .unwrap();
        assert_eq!(summary.codec, "DDP");
        assert!(summary.atmos);
        assert_eq!(summary.track_count, 2);
        assert!(AudioSummary::from_tracks(Vec::new()).is_none());
    }
}
