//! Canonical value tables.
//!
//! Each table is an ordered rule list; the first pattern that matches the
//! raw value decides the canonical key.

use regex::Regex;
use std::sync::LazyLock;

type Rules = LazyLock<Vec<(Regex, &'static str)>>;

fn compile(rules: &[(&str, &'static str)]) -> Vec<(Regex, &'static str)> {
    rules
        .iter()
        .map(|(pattern, key)| (Regex::new(&format!("(?i){}", pattern)).unwrap(), *key))
        .collect()
}

fn first_match(rules: &[(Regex, &'static str)], raw: &str) -> Option<&'static str> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    rules
        .iter()
        .find(|(pattern, _)| pattern.is_match(raw))
        .map(|(_, key)| *key)
}

static MEDIUM: Rules = LazyLock::new(|| {
    compile(&[
        (r"remux", "medium.remux"),
        (r"uhd.*blu-?ray|^uhd$", "medium.uhd_bluray"),
        (r"blu-?ray|minibd", "medium.bluray"),
        (r"bd-?rip|dvd-?rip", "medium.encode"),
        (r"web-?dl|^web$", "medium.webdl"),
        (r"web-?rip", "medium.webrip"),
        (r"hdtv", "medium.hdtv"),
        (r"tv-?rip", "medium.tvrip"),
        (r"hd-?dvd", "medium.hddvd"),
        (r"dvd", "medium.dvd"),
    ])
});

static VIDEO_CODEC: Rules = LazyLock::new(|| {
    compile(&[
        (r"x\.?265", "video.x265"),
        (r"h\.?265|hevc", "video.h265"),
        (r"x\.?264", "video.x264"),
        (r"h\.?264|avc", "video.h264"),
        (r"vc-?1", "video.vc1"),
        (r"av1", "video.av1"),
        (r"vp9", "video.vp9"),
        (r"avs", "video.avs"),
        (r"mpeg-?2", "video.mpeg2"),
        (r"xvid|divx", "video.xvid"),
    ])
});

static AUDIO_CODEC: Rules = LazyLock::new(|| {
    compile(&[
        (r"truehd.*atmos|atmos.*truehd", "audio.truehd_atmos"),
        (r"dts:x", "audio.dtsx"),
        (r"dts-hd ma", "audio.dts_hd_ma"),
        (r"dts-hd hr", "audio.dts_hd_hr"),
        (r"truehd", "audio.truehd"),
        (r"lpcm|\bpcm\b", "audio.lpcm"),
        (r"flac", "audio.flac"),
        (r"ddp|e-ac-3", "audio.ddp"),
        (r"\bdts", "audio.dts"),
        (r"\bdd\b|ac-?3", "audio.ac3"),
        (r"aac", "audio.aac"),
        (r"opus", "audio.opus"),
        (r"alac", "audio.alac"),
        (r"\bape\b", "audio.ape"),
        (r"\bwav\b", "audio.wav"),
        (r"mp3|mp2", "audio.mp3"),
        (r"av3a", "audio.av3a"),
    ])
});

static RESOLUTION: Rules = LazyLock::new(|| {
    compile(&[
        (r"4320p|8k", "resolution.r4320p"),
        (r"2160p|4k", "resolution.r2160p"),
        (r"1440p", "resolution.r1440p"),
        (r"1080i", "resolution.r1080i"),
        (r"1080p", "resolution.r1080p"),
        (r"720p", "resolution.r720p"),
        (r"576[pi]", "resolution.r576p"),
        (r"480[pi]", "resolution.r480p"),
        (r"\d+[pi]", "resolution.other"),
    ])
});

static CATEGORY: Rules = LazyLock::new(|| {
    compile(&[
        (r"纪录|documentary", "category.documentary"),
        (r"动漫|动画|anime|animation", "category.animation"),
        (r"综艺|variety", "category.variety"),
        (r"剧集|电视剧|连续剧|tv|series", "category.tv_series"),
        (r"电影|movie|film", "category.movie"),
        (r"音乐|\bmv\b|music", "category.music"),
        (r"体育|sports?", "category.sports"),
        (r".", "category.other"),
    ])
});

static ORIGIN: Rules = LazyLock::new(|| {
    compile(&[
        (r"香港|hong\s*kong", "source.hongkong"),
        (r"台湾|taiwan", "source.taiwan"),
        (r"大陆|中国|china|mainland", "source.china"),
        (r"日本|japan", "source.japan"),
        (r"韩国|korea", "source.korea"),
        (r"印度|india", "source.india"),
        (r"美国|英国|法国|德国|意大利|西班牙|加拿大|澳大利亚|usa|united states|uk|united kingdom|france|germany|canada", "source.western"),
        (r".", "source.other"),
    ])
});

pub fn medium(raw: &str) -> Option<&'static str> {
    first_match(&MEDIUM, raw)
}

pub fn video_codec(raw: &str) -> Option<&'static str> {
    first_match(&VIDEO_CODEC, raw)
}

pub fn audio_codec(raw: &str) -> Option<&'static str> {
    first_match(&AUDIO_CODEC, raw)
}

pub fn resolution(raw: &str) -> Option<&'static str> {
    first_match(&RESOLUTION, raw)
}

pub fn category(raw: &str) -> Option<&'static str> {
    first_match(&CATEGORY, raw)
}

pub fn origin(raw: &str) -> Option<&'static str> {
    first_match(&ORIGIN, raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_medium() {
        assert_eq!(medium("UHD BluRay REMUX"), Some("medium.remux"));
        assert_eq!(medium("UHD Blu-ray"), Some("medium.uhd_bluray"));
        assert_eq!(medium("Blu-ray"), Some("medium.bluray"));
        assert_eq!(medium("WEB-DL"), Some("medium.webdl"));
        assert_eq!(medium(""), None);
    }

    #[test]
    fn test_audio_priority() {
        assert_eq!(audio_codec("TrueHD 7.1 Atmos"), Some("audio.truehd_atmos"));
        assert_eq!(audio_codec("DTS-HD MA 5.1 3Audios"), Some("audio.dts_hd_ma"));
        assert_eq!(audio_codec("DDP 5.1"), Some("audio.ddp"));
        assert_eq!(audio_codec("DD 2.0"), Some("audio.ac3"));
        assert_eq!(audio_codec("DTS 5.1"), Some("audio.dts"));
    }

    #[test]
    fn test_video_and_resolution() {
        assert_eq!(video_codec("H.265"), Some("video.h265"));
        assert_eq!(video_codec("x265"), Some("video.x265"));
        assert_eq!(resolution("4K"), Some("resolution.r2160p"));
        assert_eq!(resolution("1080i"), Some("resolution.r1080i"));
    }

    #[test]
    fn test_category_and_origin() {
        assert_eq!(category("电影"), Some("category.movie"));
        assert_eq!(category("纪录片"), Some("category.documentary"));
        assert_eq!(category("剧集"), Some("category.tv_series"));
        assert_eq!(origin("中国香港"), Some("source.hongkong"));
        assert_eq!(origin("日本"), Some("source.japan"));
        assert_eq!(origin("中国大陆"), Some("source.china"));
    }
}
