//! Tag extraction from subtitles, descriptions and parsed titles.

use crate::title::{ComponentKey, ParsedTitle};
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;

struct TagRule {
    tag: &'static str,
    patterns: Vec<Regex>,
}

fn rule(tag: &'static str, patterns: &[&str]) -> TagRule {
    TagRule {
        tag,
        patterns: patterns.iter().map(|p| Regex::new(p).unwrap()).collect(),
    }
}

static SUBTITLE_RULES: LazyLock<Vec<TagRule>> = LazyLock::new(|| {
    vec![
        rule(
            "中字",
            &[
                r"中[字幕]", r"简[体中繁]", r"繁[体中简]", r"中英", r"简英", r"繁英", r"简繁",
                r"中日", r"简日", r"繁日", r"官译", r"内封.*[简繁]", r"[简繁].*字幕",
                r"双语字幕", r"多国.*字幕", r"软字幕",
            ],
        ),
        rule(
            "粤语",
            &[r"粤[语配]", r"粤音", r"粤.*配音", r"港版", r"港.*配音", r"\b粤\b"],
        ),
        rule(
            "国语",
            &[
                r"国[语配]", r"国.*配音", r"汉语", r"普通话", r"中文配音", r"华语",
                r"台配国语", r"\b陆\b", r"\b国\b",
            ],
        ),
        rule(
            "台配",
            &[
                r"台[配音]", r"台.*配音", r"东森", r"纬来", r"台配国语", r"台配.*国语", r"\b台\b",
            ],
        ),
    ]
});

static SEGMENT_SPLIT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\[\]【】|*/]").unwrap());

static ORIGIN_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"◎\s*产\s*地\s*(.+?)(?:\s|$)",
        r"◎\s*国\s*家\s*(.+?)(?:\s|$)",
        r"◎\s*地\s*区\s*(.+?)(?:\s|$)",
        r"制片国家/地区[:：\s]+(.+?)(?:\s|$)",
        r"制片国家[:：\s]+(.+?)(?:\s|$)",
        r"国\s*家[:：\s]+(.+?)(?:\s|$)",
        r"产\s*地[:：\s]+([^，,\n\r]+)",
    ]
    .iter()
    .map(|p| Regex::new(&format!("(?m){}", p)).unwrap())
    .collect()
});

static ORIGIN_BRACKETS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\[\]【】()（）]").unwrap());
static ORIGIN_SPLIT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[/,，;；&]").unwrap());

/// Language and subtitle tags found in a listing's subtitle line.
pub fn subtitle_tags(subtitle: &str) -> BTreeSet<String> {
    let mut tags = BTreeSet::new();
    if subtitle.trim().is_empty() {
        return tags;
    }
    if subtitle.contains("特效") {
        tags.insert("tag.特效".to_string());
    }

    let segments: Vec<&str> = SEGMENT_SPLIT
        .split(subtitle)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();

    for rule in SUBTITLE_RULES.iter() {
        let hit = segments
            .iter()
            .any(|seg| rule.patterns.iter().any(|p| p.is_match(seg)));
        if hit {
            tags.insert(format!("tag.{}", rule.tag));
        }
    }
    tags
}

/// Country or region of origin declared in a description block.
pub fn extract_origin(description: &str) -> Option<String> {
    let raw = ORIGIN_PATTERNS
        .iter()
        .find_map(|p| p.captures(description).and_then(|c| c.get(1)))
        .map(|m| m.as_str())?;

    let cleaned = ORIGIN_BRACKETS.replace_all(raw, "");
    ORIGIN_SPLIT
        .split(&cleaned)
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

/// Tags implied by the parsed title itself.
pub fn title_tags(parsed: &ParsedTitle) -> BTreeSet<String> {
    let mut tags = BTreeSet::new();

    let medium = parsed.value(ComponentKey::Medium);
    let group = parsed.value(ComponentKey::ReleaseGroup);
    if contains_ci(medium, "diy") || contains_ci(group, "diy") {
        tags.insert("tag.DIY".to_string());
    }
    if contains_ci(group, "vcb-studio") {
        tags.insert("tag.VCB-Studio".to_string());
    }

    if let Some(hdr) = parsed.get(ComponentKey::HdrFormat) {
        let upper = hdr.to_uppercase();
        if upper.contains("DOLBY VISION") || upper.contains("DOVI") || upper.split(' ').any(|w| w == "DV") {
            tags.insert("tag.Dolby Vision".to_string());
        }
        if upper.contains("HDR10+") {
            tags.insert("tag.HDR10+".to_string());
        } else if upper.contains("HDR") {
            tags.insert("tag.HDR10".to_string());
        }
        if upper.contains("VIVID") {
            tags.insert("tag.HDRVivid".to_string());
        }
        if upper.contains("HLG") {
            tags.insert("tag.HLG".to_string());
        }
    }
    tags
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subtitle_tags() {
        let tags = subtitle_tags("流浪地球2 | 国语/粤语 | 简繁英字幕");
        assert!(tags.contains("tag.中字"));
        assert!(tags.contains("tag.国语"));
        assert!(tags.contains("tag.粤语"));
        assert!(!tags.contains("tag.台配"));
    }

    #[test]
    fn test_subtitle_single_char_markers() {
        let tags = subtitle_tags("某剧 [陆/台] 特效字幕");
        assert!(tags.contains("tag.国语"));
        assert!(tags.contains("tag.台配"));
        assert!(tags.contains("tag.特效"));
    }

    #[test]
    fn test_subtitle_empty() {
        assert!(subtitle_tags("  ").is_empty());
    }

    #[test]
    fn test_extract_origin() {
        let desc = "◎译　　名　流浪地球2\n◎产　　地　中国大陆\n◎类　　别　科幻";
        assert_eq!(extract_origin(desc).as_deref(), Some("中国大陆"));

        let douban = "导演: 郭帆\n制片国家/地区: 美国 / 英国\n语言: 英语";
        assert_eq!(extract_origin(douban).as_deref(), Some("美国"));

        assert_eq!(extract_origin("no origin here"), None);
    }

    #[test]
    fn test_title_tags() {
        let parsed = crate::title::parse(
            "Old Movie 1999 1080p Blu-ray DIY AVC DTS-HD MA 5.1-CHD",
            None,
        );
        let tags = title_tags(&parsed);
        assert!(tags.contains("tag.DIY"));

        let parsed = crate::title::parse("Movie 2023 2160p WEB-DL H.265 DV HDR DDP 5.1-GRP", None);
        let tags = title_tags(&parsed);
        assert!(tags.contains("tag.Dolby Vision"));
        assert!(tags.contains("tag.HDR10"));
    }
}
