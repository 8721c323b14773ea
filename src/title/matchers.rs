//! Ordered token matchers for the technical part of a release title.
//!
//! Each entry claims the spans it matches; spans already claimed by an
//! earlier entry are invisible to later ones, so the list order is the
//! disambiguation rule.

use regex::{Regex, RegexBuilder};
use std::sync::LazyLock;

use super::ComponentKey;

/// What a matcher contributes to once it claims a span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Component(ComponentKey),
    /// Appended to the year component (`2019 Extended`).
    CutVersion,
    /// Appended to the medium component (`BluRay REMUX`).
    QualityModifier,
}

/// Declarative matcher definition.
#[derive(Debug, Clone)]
pub struct MatcherSpec {
    pub name: &'static str,
    pub target: Target,
    pub pattern: &'static str,
    pub case_sensitive: bool,
}

/// A compiled matcher.
#[derive(Debug, Clone)]
pub struct Matcher {
    pub spec: MatcherSpec,
    regex: Regex,
}

impl Matcher {
    pub fn compile(spec: MatcherSpec) -> Result<Self, regex::Error> {
        let regex = RegexBuilder::new(spec.pattern)
            .case_insensitive(!spec.case_sensitive)
            .build()?;
        Ok(Self { spec, regex })
    }

    /// Find the first boundary-respecting match at or after `from`.
    pub fn find_at(&self, haystack: &str, from: usize) -> Option<(usize, usize)> {
        let mut pos = from;
        while pos <= haystack.len() {
            let m = self.regex.find_at(haystack, pos)?;
            if m.end() > m.start() && on_token_boundary(haystack, m.start(), m.end()) {
                return Some((m.start(), m.end()));
            }
            // Step one character past the rejected start
            pos = m.start()
                + haystack[m.start()..]
                    .chars()
                    .next()
                    .map(char::len_utf8)
                    .unwrap_or(1);
        }
        None
    }

    /// True when the whole token is exactly one match of this matcher.
    pub fn matches_whole(&self, token: &str) -> bool {
        self.regex
            .find_iter(token)
            .any(|m| m.start() == 0 && m.end() == token.len())
    }
}

/// A match may not be glued to an alphanumeric neighbour on either side.
pub fn on_token_boundary(haystack: &str, start: usize, end: usize) -> bool {
    let before = haystack[..start].chars().next_back();
    let after = haystack[end..].chars().next();
    !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
}

const CHANNELS: &str = r"(?:\d{1,2}[.。]\d(?:[.。]\d)?|\d\s\d)\b";

/// Built-in priority list, highest priority first.
///
/// Audio sits ahead of source platform: the `MA` in `DTS-HD MA` has to be
/// claimed by the codec before the bare platform code gets a chance.
pub fn default_specs() -> Vec<MatcherSpec> {
    vec![
        MatcherSpec {
            name: "completion_status",
            target: Target::Component(ComponentKey::CompletionStatus),
            pattern: r"Complete|Full[\s.]Season",
            case_sensitive: false,
        },
        MatcherSpec {
            name: "release_version",
            target: Target::Component(ComponentKey::ReleaseVersion),
            pattern: r"REPACK\d?|PROPER|RERIP|V[2-9]",
            case_sensitive: false,
        },
        MatcherSpec {
            name: "cut_version",
            target: Target::CutVersion,
            pattern: r"Director'?s[\s.]Cut|Extended(?:[\s.](?:Cut|Edition))?|Theatrical(?:[\s.]Cut)?|Unrated|Uncut|Remastered|Criterion|IMAX(?:[\s.]Enhanced)?|Special[\s.]Edition|Open[\s.]Matte|\d{2,3}th[\s.]Anniversary(?:[\s.]Edition)?|DC",
            case_sensitive: false,
        },
        MatcherSpec {
            name: "medium",
            target: Target::Component(ComponentKey::Medium),
            pattern: r"UHD[\s.-]*Blu-?ray(?:[\s.]DIY)?|Blu-?ray[\s.]DIY|Blu-?ray|UHDTV|UHD|BD-?Rip|WEB-?DL|WEB-?Rip|WEB|HDTV|TV-?Rip|DVD-?Rip|DVD[59]|DVD|HD-?DVD",
            case_sensitive: false,
        },
        MatcherSpec {
            name: "resolution",
            target: Target::Component(ComponentKey::Resolution),
            pattern: r"\d{3,4}[pi]|[48]K",
            case_sensitive: false,
        },
        MatcherSpec {
            name: "video_codec",
            target: Target::Component(ComponentKey::VideoCodec),
            pattern: r"HEVC|AVC|x\.?265|x\.?264|H[\s.]?265|H[\s.]?264|VC-?1|AV1|VP9|AVS[23]|MPEG-?2|XviD|DivX",
            case_sensitive: false,
        },
        MatcherSpec {
            name: "bit_depth",
            target: Target::Component(ComponentKey::BitDepth),
            pattern: r"(?:8|10|12)[\s.-]?bits?",
            case_sensitive: false,
        },
        MatcherSpec {
            name: "hdr_format",
            target: Target::Component(ComponentKey::HdrFormat),
            pattern: r"Dolby[\s.]?Vision|DoVi|HDR10\+|HDR10Plus|HDR[\s.]?Vivid|HDR10|HLG|HDR|SDR|EDR|DV|Vivid",
            case_sensitive: false,
        },
        MatcherSpec {
            name: "video_format",
            target: Target::Component(ComponentKey::VideoFormat),
            pattern: r"3D|H-?SBS|H-?OU",
            case_sensitive: false,
        },
        MatcherSpec {
            name: "frame_rate",
            target: Target::Component(ComponentKey::FrameRate),
            pattern: r"\d{2,3}(?:\.\d{1,3})?[\s.]?FPS",
            case_sensitive: false,
        },
        MatcherSpec {
            name: "audio",
            target: Target::Component(ComponentKey::AudioCodec),
            pattern: AUDIO_PATTERN.as_str(),
            case_sensitive: false,
        },
        MatcherSpec {
            name: "source_platform",
            target: Target::Component(ComponentKey::SourcePlatform),
            pattern: r"Apple[\s.]?TV\+|ATVP|AMZN|Amazon|Netflix|NF|DSNP|Disney\+|HMAX|MAX|MA|HULU|PCOK|PMTP|STAN|CRAV|iTunes|iT|iQIYI|IQ|YOUKU|MUBI|TVBAnywhere|TVB|ViuTV|Viu|MyTVSuper|MyTVS|NowPlayer|NowE|LiTV|LINETV|friDay|Hami|MyVideo|KKTV|Baha|CATCHPLAY|WeTV|TVING|SEEZN|AMC\+|Crunchyroll|CR|B-Global|DMM",
            case_sensitive: true,
        },
        MatcherSpec {
            name: "quality_modifier",
            target: Target::QualityModifier,
            pattern: r"REMUX|MiniBD|HQ|HFR|MAXPLUS",
            case_sensitive: false,
        },
    ]
}

static AUDIO_PATTERN: LazyLock<String> = LazyLock::new(|| {
    let codec = r"(?:DTS-?HD[\s.]*MA|DTS-?HD[\s.]*HR|DTS-?HD|DTS[\s.:-]?X\b|DTS|(?:Dolby[\s.]*)?True-?HD|DDP|DD\+|E-?AC-?3|DD|AC-?3|LPCM|PCM|FLAC|ALAC|AAC|Opus|Vorbis|MP3|MP2|APE|WAV|DSD|AV3A)";
    let atmos = r"(?:Atmos|X)\b";
    let tracks = r"\d{1,2}[\s.]?Audios?\b";
    format!(
        "{codec}(?:[\\s.]*{ch})?(?:[\\s.]*{atmos})?(?:[\\s.]*{ch})?(?:[\\s.]*{tracks})?(?:[\\s.]*Atmos\\b)?\
         |Atmos(?:[\\s.]*True-?HD)?(?:[\\s.]*{ch})?\
         |{tracks}",
        ch = CHANNELS,
    )
});

/// The compiled default list, shared by every parse.
pub static DEFAULT_MATCHERS: LazyLock<Vec<Matcher>> = LazyLock::new(|| {
    default_specs()
        .into_iter()
        .map(|spec| Matcher::compile(spec).unwrap())
        .collect()
});

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher(name: &str) -> &'static Matcher {
        DEFAULT_MATCHERS
            .iter()
            .find(|m| m.spec.name == name)
            .unwrap()
    }

    #[test]
    fn test_audio_before_platform() {
        let names: Vec<_> = DEFAULT_MATCHERS.iter().map(|m| m.spec.name).collect();
        let audio = names.iter().position(|n| *n == "audio").unwrap();
        let platform = names.iter().position(|n| *n == "source_platform").unwrap();
        assert!(audio < platform);
    }

    #[test]
    fn test_boundary_rejects_glued_tokens() {
        let platform = matcher("source_platform");
        assert_eq!(platform.find_at("MAX 2160p", 0), Some((0, 3)));
        assert_eq!(platform.find_at("MAXPLUS", 0), None);
        assert_eq!(platform.find_at("Drama 2160p", 0), None);
    }

    #[test]
    fn test_audio_spans() {
        let audio = matcher("audio");
        let s = "WEB-DL DTS-HD MA 7.1 DV";
        let (start, end) = audio.find_at(s, 0).unwrap();
        assert_eq!(&s[start..end], "DTS-HD MA 7.1");

        let s = "BluRay TrueHD 7.1 Atmos 3Audios x";
        let (start, end) = audio.find_at(s, 0).unwrap();
        assert_eq!(&s[start..end], "TrueHD 7.1 Atmos 3Audios");

        let s = "WEB-DL DDP5.1 DV";
        let (start, end) = audio.find_at(s, 0).unwrap();
        assert_eq!(&s[start..end], "DDP5.1");
    }

    #[test]
    fn test_platform_is_case_sensitive() {
        let platform = matcher("source_platform");
        assert!(platform.find_at("it follows", 0).is_none());
        assert!(platform.find_at("2160p iT WEB-DL", 0).is_some());
    }

    #[test]
    fn test_matches_whole() {
        assert!(matcher("medium").matches_whole("WEB-DL"));
        assert!(!matcher("medium").matches_whole("WEB-DLX"));
    }
}
