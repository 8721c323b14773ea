//! Release title parsing
//!
//! Turns a free-form release name into an ordered list of labeled
//! components. Parsing never fails: anything no rule claims is kept as an
//! unrecognized span, so every alphanumeric character of the input ends up
//! in exactly one span.

mod audio;
mod matchers;

pub use audio::{merge_stream_audio, normalize_audio, AudioParts};
pub use matchers::{default_specs, Matcher, MatcherSpec, Target, DEFAULT_MATCHERS};

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::LazyLock;

use crate::media::{MediaFormat, StreamInfo};

/// Component labels. The serialized form is the label used on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ComponentKey {
    #[serde(rename = "主标题")]
    Title,
    #[serde(rename = "季集")]
    SeasonEpisode,
    #[serde(rename = "年份")]
    Year,
    #[serde(rename = "剧集状态")]
    CompletionStatus,
    #[serde(rename = "发布版本")]
    ReleaseVersion,
    #[serde(rename = "分辨率")]
    Resolution,
    #[serde(rename = "片源平台")]
    SourcePlatform,
    #[serde(rename = "媒介")]
    Medium,
    #[serde(rename = "视频编码")]
    VideoCodec,
    #[serde(rename = "视频格式")]
    VideoFormat,
    #[serde(rename = "HDR格式")]
    HdrFormat,
    #[serde(rename = "色深")]
    BitDepth,
    #[serde(rename = "帧率")]
    FrameRate,
    #[serde(rename = "音频编码")]
    AudioCodec,
    #[serde(rename = "制作组")]
    ReleaseGroup,
    #[serde(rename = "文件格式")]
    Container,
    #[serde(rename = "无法识别")]
    Unrecognized,
}

impl ComponentKey {
    pub fn label(self) -> &'static str {
        match self {
            ComponentKey::Title => "主标题",
            ComponentKey::SeasonEpisode => "季集",
            ComponentKey::Year => "年份",
            ComponentKey::CompletionStatus => "剧集状态",
            ComponentKey::ReleaseVersion => "发布版本",
            ComponentKey::Resolution => "分辨率",
            ComponentKey::SourcePlatform => "片源平台",
            ComponentKey::Medium => "媒介",
            ComponentKey::VideoCodec => "视频编码",
            ComponentKey::VideoFormat => "视频格式",
            ComponentKey::HdrFormat => "HDR格式",
            ComponentKey::BitDepth => "色深",
            ComponentKey::FrameRate => "帧率",
            ComponentKey::AudioCodec => "音频编码",
            ComponentKey::ReleaseGroup => "制作组",
            ComponentKey::Container => "文件格式",
            ComponentKey::Unrecognized => "无法识别",
        }
    }
}

impl std::fmt::Display for ComponentKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TitleComponent {
    pub key: ComponentKey,
    pub value: String,
}

/// A piece of the input as the parser saw it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Span {
    Recognized { key: ComponentKey, raw: String },
    Unrecognized { raw: String },
}

impl Span {
    pub fn raw(&self) -> &str {
        match self {
            Span::Recognized { raw, .. } | Span::Unrecognized { raw } => raw,
        }
    }
}

/// Parser output: normalized components plus the raw spans they came from.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ParsedTitle {
    pub components: Vec<TitleComponent>,
    pub spans: Vec<Span>,
}

impl ParsedTitle {
    pub fn get(&self, key: ComponentKey) -> Option<&str> {
        self.components
            .iter()
            .find(|c| c.key == key)
            .map(|c| c.value.as_str())
    }

    /// Component value, or an empty string when absent.
    pub fn value(&self, key: ComponentKey) -> &str {
        self.get(key).unwrap_or("")
    }

    pub fn unrecognized(&self) -> &str {
        self.value(ComponentKey::Unrecognized)
    }
}

/// Title parser over an ordered matcher list.
pub struct TitleParser {
    matchers: Vec<Matcher>,
}

impl TitleParser {
    /// Build a parser from a custom priority list.
    pub fn new(specs: Vec<MatcherSpec>) -> Result<Self, regex::Error> {
        let matchers = specs
            .into_iter()
            .map(Matcher::compile)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { matchers })
    }

    pub fn parse(&self, title: &str, stream: Option<&StreamInfo>) -> ParsedTitle {
        parse_with(&self.matchers, title, stream)
    }
}

/// Parse with the built-in priority list.
pub fn parse(title: &str, stream: Option<&StreamInfo>) -> ParsedTitle {
    parse_with(&DEFAULT_MATCHERS, title, stream)
}

static BRACKET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[[^\]]*\]|【[^】]*】").unwrap());
static CJK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[\p{Han}\p{Hiragana}\p{Katakana}\p{Hangul}\x{3000}-\x{303F}\x{FF01}-\x{FF60}]+")
        .unwrap()
});
static CONTAINER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\.(mkv|mp4|m2ts|ts|avi|iso)\s*$").unwrap());
static SPECIAL_GROUP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:^|[\s.@-])((?:mUHD|MNHD)-FRDS|(?:[A-Za-z0-9]+&)?VCB-Studio)\s*$").unwrap()
});
static GROUP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.+?)[-@]([^\s.]+)\s*$").unwrap());
static SEASON_MATCHER: LazyLock<Matcher> = LazyLock::new(|| {
    Matcher::compile(MatcherSpec {
        name: "season_episode",
        target: Target::Component(ComponentKey::SeasonEpisode),
        pattern: r"S\d{1,3}(?:[\s.]?E\d{1,4}(?:-E?\d{1,4})?)?(?:-S\d{1,3})?|EP?\d{1,4}(?:-EP?\d{1,4})?",
        case_sensitive: false,
    })
    .unwrap()
});
static YEAR_MATCHER: LazyLock<Matcher> = LazyLock::new(|| {
    Matcher::compile(MatcherSpec {
        name: "year",
        target: Target::Component(ComponentKey::Year),
        pattern: r"(?:19|20)\d{2}",
        case_sensitive: true,
    })
    .unwrap()
});
static BLURAY_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)Blu-?ray").unwrap());
static SPACES_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\s._]+").unwrap());

const EMPTY_GROUPS: [&str; 3] = ["NA", "N/A", "NOGROUP"];

#[derive(Debug)]
enum ClaimKind {
    Recognized { target: Target, value: String },
    Unrecognized,
}

#[derive(Debug)]
struct Claim {
    start: usize,
    raw: String,
    kind: ClaimKind,
}

/// Working copy of the title. Claimed ranges are overwritten with spaces of
/// the same byte length, so offsets stay valid for every later rule.
struct Workspace {
    work: String,
    claims: Vec<Claim>,
}

impl Workspace {
    fn new(title: &str) -> Self {
        Self {
            work: title.to_string(),
            claims: Vec::new(),
        }
    }

    fn claim(&mut self, start: usize, end: usize, kind: ClaimKind) {
        let raw = self.work[start..end].to_string();
        self.work.replace_range(start..end, &" ".repeat(end - start));
        self.claims.push(Claim { start, raw, kind });
    }

    fn claim_as(&mut self, start: usize, end: usize, target: Target) {
        let value = self.work[start..end].trim().to_string();
        self.claim(start, end, ClaimKind::Recognized { target, value });
    }

    fn claim_all(&mut self, re: &Regex) {
        let found: Vec<_> = re.find_iter(&self.work).map(|m| (m.start(), m.end())).collect();
        for (start, end) in found {
            self.claim(start, end, ClaimKind::Unrecognized);
        }
    }
}

fn is_separator(c: char) -> bool {
    c.is_whitespace()
        || matches!(
            c,
            '.' | '-' | '_' | ',' | '(' | ')' | '[' | ']' | '/' | '|' | '+' | ':' | '&' | '~' | '!' | '?' | '\'' | '"'
        )
}

/// Full-width ASCII (`Ｍ`, `１`, `－`) and the ideographic space folded to
/// their ASCII forms. CJK text is untouched.
fn fold_width(title: &str) -> String {
    title
        .chars()
        .map(|c| match c {
            '\u{3000}' => ' ',
            '\u{FF01}'..='\u{FF5E}' => char::from_u32(c as u32 - 0xFEE0).unwrap_or(c),
            _ => c,
        })
        .collect()
}

fn parse_with(matchers: &[Matcher], title: &str, stream: Option<&StreamInfo>) -> ParsedTitle {
    let mut ws = Workspace::new(&fold_width(title));

    ws.claim_all(&BRACKET_RE);
    ws.claim_all(&CJK_RE);

    if let Some((start, end)) = CONTAINER_RE.find(&ws.work).map(|m| (m.start(), m.end())) {
        let ext = ws.work[start..end].trim().trim_start_matches('.').to_lowercase();
        ws.claim(
            start,
            end,
            ClaimKind::Recognized {
                target: Target::Component(ComponentKey::Container),
                value: ext,
            },
        );
    }

    claim_release_group(&mut ws, matchers);

    if let Some((start, end)) = SEASON_MATCHER.find_at(&ws.work, 0) {
        let value: String = ws.work[start..end]
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '.')
            .collect::<String>()
            .to_uppercase();
        ws.claim(
            start,
            end,
            ClaimKind::Recognized {
                target: Target::Component(ComponentKey::SeasonEpisode),
                value,
            },
        );
    }

    let zone_start = claim_year(&mut ws);

    for matcher in matchers {
        let mut pos = zone_start;
        while let Some((start, end)) = matcher.find_at(&ws.work, pos) {
            ws.claim_as(start, end, matcher.spec.target);
            pos = end;
        }
    }

    claim_title(&mut ws);

    let leftovers = leftover_tokens(&ws.work);
    for (start, end) in leftovers {
        ws.claim(start, end, ClaimKind::Unrecognized);
    }

    assemble(ws, title.len(), stream)
}

fn claim_release_group(ws: &mut Workspace, matchers: &[Matcher]) {
    let special = SPECIAL_GROUP_RE
        .captures(&ws.work)
        .and_then(|c| c.get(1))
        .map(|m| (m.start(), m.end()));
    if let Some((start, end)) = special {
        ws.claim_as(start, end, Target::Component(ComponentKey::ReleaseGroup));
        return;
    }

    let Some((dash, start, end)) = GROUP_RE.captures(&ws.work).and_then(|c| {
        let group = c.get(2)?;
        Some((c.get(1)?.end(), group.start(), group.end()))
    }) else {
        return;
    };

    // "WEB-DL" at the end of a group-less title is not "WEB" by "DL"
    let token_start = ws.work[..dash]
        .rfind(|c: char| c.is_whitespace() || c == '.')
        .map(|i| i + 1)
        .unwrap_or(0);
    let token = &ws.work[token_start..end];
    if matchers.iter().any(|m| m.matches_whole(token)) {
        return;
    }

    let raw = ws.work[start..end].to_string();
    let value = if EMPTY_GROUPS.iter().any(|g| g.eq_ignore_ascii_case(&raw)) {
        String::new()
    } else {
        raw
    };
    ws.claim(
        start,
        end,
        ClaimKind::Recognized {
            target: Target::Component(ComponentKey::ReleaseGroup),
            value,
        },
    );
}

/// Claims the last year-like token that is not the very first word, and
/// returns where the technical zone starts.
fn claim_year(ws: &mut Workspace) -> usize {
    let first_word = ws.work.len() - ws.work.trim_start().len();
    let mut pos = 0;
    let mut last = None;
    while let Some((start, end)) = YEAR_MATCHER.find_at(&ws.work, pos) {
        if start > first_word {
            last = Some((start, end));
        }
        pos = end;
    }

    match last {
        Some((start, end)) => {
            ws.claim_as(start, end, Target::Component(ComponentKey::Year));
            end
        }
        None => 0,
    }
}

fn claim_title(ws: &mut Workspace) {
    let first = ws
        .claims
        .iter()
        .filter(|c| matches!(c.kind, ClaimKind::Recognized { .. }))
        .map(|c| c.start)
        .min()
        .unwrap_or(ws.work.len());

    let zone = &ws.work[..first];
    let lead = zone.len() - zone.trim_start().len();
    let end = zone.trim_end().len();
    if end <= lead {
        return;
    }

    let value = SPACES_RE
        .replace_all(&zone[lead..end], " ")
        .trim_matches(is_separator)
        .to_string();
    if value.is_empty() {
        return;
    }

    ws.claim(
        lead,
        end,
        ClaimKind::Recognized {
            target: Target::Component(ComponentKey::Title),
            value,
        },
    );
}

fn leftover_tokens(work: &str) -> Vec<(usize, usize)> {
    let mut tokens = Vec::new();
    let mut start = None;
    for (i, c) in work.char_indices() {
        if is_separator(c) {
            if let Some(s) = start.take() {
                tokens.push((s, i));
            }
        } else if start.is_none() {
            start = Some(i);
        }
    }
    if let Some(s) = start {
        tokens.push((s, work.len()));
    }
    tokens
}

fn span_key(target: Target) -> ComponentKey {
    match target {
        Target::Component(key) => key,
        Target::CutVersion => ComponentKey::Year,
        Target::QualityModifier => ComponentKey::Medium,
    }
}

fn assemble(mut ws: Workspace, title_len: usize, stream: Option<&StreamInfo>) -> ParsedTitle {
    ws.claims.sort_by_key(|c| c.start);

    let mut by_key: BTreeMap<ComponentKey, Vec<(usize, String)>> = BTreeMap::new();
    let mut cuts: Vec<(usize, String)> = Vec::new();
    let mut modifiers: Vec<(usize, String)> = Vec::new();
    let mut unrecognized: Vec<&str> = Vec::new();
    let mut spans = Vec::with_capacity(ws.claims.len());

    for claim in &ws.claims {
        match &claim.kind {
            ClaimKind::Recognized { target, value } => {
                spans.push(Span::Recognized {
                    key: span_key(*target),
                    raw: claim.raw.clone(),
                });
                let entry = (claim.start, value.clone());
                match target {
                    Target::Component(key) => by_key.entry(*key).or_default().push(entry),
                    Target::CutVersion => cuts.push(entry),
                    Target::QualityModifier => modifiers.push(entry),
                }
            }
            ClaimKind::Unrecognized => {
                spans.push(Span::Unrecognized {
                    raw: claim.raw.clone(),
                });
                unrecognized.push(claim.raw.trim());
            }
        }
    }

    let mut found: Vec<(usize, ComponentKey, String)> = by_key
        .into_iter()
        .filter_map(|(key, values)| {
            let pos = values.first()?.0;
            Some((pos, key, combine(key, &values)))
        })
        .collect();

    merge_suffix(&mut found, ComponentKey::Year, &cuts);
    merge_suffix(&mut found, ComponentKey::Medium, &modifiers);

    if let Some(stream) = stream {
        apply_stream(&mut found, stream, title_len);
    }

    found.sort_by_key(|(pos, key, _)| (*pos, *key));

    let mut components: Vec<TitleComponent> = found
        .into_iter()
        .filter(|(_, _, value)| !value.is_empty())
        .map(|(_, key, value)| TitleComponent { key, value })
        .collect();
    components.push(TitleComponent {
        key: ComponentKey::Unrecognized,
        value: unrecognized.join(" "),
    });

    ParsedTitle { components, spans }
}

fn merge_suffix(
    found: &mut Vec<(usize, ComponentKey, String)>,
    key: ComponentKey,
    extra: &[(usize, String)],
) {
    if extra.is_empty() {
        return;
    }
    let suffix = extra
        .iter()
        .map(|(_, v)| v.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    match found.iter_mut().find(|(_, k, _)| *k == key) {
        Some((_, _, value)) if !value.is_empty() => {
            value.push(' ');
            value.push_str(&suffix);
        }
        Some((_, _, value)) => *value = suffix,
        None => found.push((extra[0].0, key, suffix)),
    }
}

fn set_value(
    found: &mut Vec<(usize, ComponentKey, String)>,
    key: ComponentKey,
    value: String,
    fallback_pos: usize,
) {
    match found.iter_mut().find(|(_, k, _)| *k == key) {
        Some(entry) => entry.2 = value,
        None => found.push((fallback_pos, key, value)),
    }
}

fn apply_stream(found: &mut Vec<(usize, ComponentKey, String)>, stream: &StreamInfo, pos: usize) {
    if !stream.hdr.is_empty() {
        set_value(found, ComponentKey::HdrFormat, stream.hdr.clone(), pos);
    }

    if let Some(summary) = &stream.audio {
        let title_audio = found
            .iter()
            .find(|(_, k, _)| *k == ComponentKey::AudioCodec)
            .map(|(_, _, v)| v.clone());
        if let Some(merged) = merge_stream_audio(title_audio.as_deref(), summary) {
            set_value(found, ComponentKey::AudioCodec, merged, pos);
        }
    }

    let spelling = match stream.format {
        MediaFormat::MediaInfo => "BluRay",
        MediaFormat::BdInfo => "Blu-ray",
        MediaFormat::Unknown => return,
    };
    if let Some((_, _, medium)) = found.iter_mut().find(|(_, k, _)| *k == ComponentKey::Medium) {
        *medium = BLURAY_RE.replace_all(medium, spelling).into_owned();
    }
}

fn combine(key: ComponentKey, values: &[(usize, String)]) -> String {
    let mut out: Vec<String> = Vec::new();
    for (_, raw) in values {
        let value = match key {
            ComponentKey::AudioCodec => normalize_audio(raw),
            ComponentKey::VideoCodec => canonical_video_codec(raw),
            ComponentKey::HdrFormat => canonical_hdr(raw),
            ComponentKey::Medium => canonical_medium(raw),
            ComponentKey::Resolution => canonical_resolution(raw),
            ComponentKey::BitDepth => with_unit(raw, "bit"),
            ComponentKey::FrameRate => with_unit(raw, "fps"),
            _ => SPACES_RE.replace_all(raw, " ").trim().to_string(),
        };
        if !value.is_empty() && !out.contains(&value) {
            out.push(value);
        }
    }

    if key == ComponentKey::Medium && out.len() == 1 && out[0] == "UHD" {
        return "UHD Blu-ray".to_string();
    }
    out.join(" ")
}

fn compact_upper(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace() && *c != '.' && *c != '-')
        .collect::<String>()
        .to_uppercase()
}

fn canonical_video_codec(raw: &str) -> String {
    match compact_upper(raw).as_str() {
        "H265" => "H.265".to_string(),
        "H264" => "H.264".to_string(),
        "X265" => "x265".to_string(),
        "X264" => "x264".to_string(),
        "VC1" => "VC-1".to_string(),
        "MPEG2" => "MPEG-2".to_string(),
        "XVID" => "XviD".to_string(),
        "DIVX" => "DivX".to_string(),
        other => other.to_string(),
    }
}

fn canonical_hdr(raw: &str) -> String {
    match compact_upper(raw).as_str() {
        "DOLBYVISION" => "Dolby Vision".to_string(),
        "DOVI" => "DoVi".to_string(),
        "HDR10+" | "HDR10PLUS" => "HDR10+".to_string(),
        "HDRVIVID" => "HDR Vivid".to_string(),
        "VIVID" => "Vivid".to_string(),
        other => other.to_string(),
    }
}

fn canonical_medium(raw: &str) -> String {
    let key: String = raw
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_lowercase();
    match key.as_str() {
        "webdl" => "WEB-DL".to_string(),
        "webrip" => "WEBRip".to_string(),
        "web" => "WEB".to_string(),
        "hdtv" => "HDTV".to_string(),
        "uhdtv" => "UHDTV".to_string(),
        "uhd" => "UHD".to_string(),
        "bdrip" => "BDRip".to_string(),
        "dvdrip" => "DVDRip".to_string(),
        "tvrip" => "TVRip".to_string(),
        "dvd" | "dvd5" | "dvd9" => key.to_uppercase(),
        "hddvd" => "HD-DVD".to_string(),
        _ => SPACES_RE.replace_all(raw, " ").trim().to_string(),
    }
}

fn canonical_resolution(raw: &str) -> String {
    match raw.to_lowercase().as_str() {
        "4k" => "4K".to_string(),
        "8k" => "8K".to_string(),
        other => other.to_string(),
    }
}

fn with_unit(raw: &str, unit: &str) -> String {
    let number: String = raw
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    format!("{}{}", number, unit)
}
