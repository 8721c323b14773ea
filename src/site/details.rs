//! Listing page extraction
//!
//! Reads a NexusPHP `details.php` page: title, subtitle, the description
//! converted back to BBCode and split into its parts, the technical report
//! and the parameters shown in the info table.

use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::LazyLock;

use super::profiles::DescriptionParts;

static TITLE: LazyLock<Selector> = LazyLock::new(|| Selector::parse("h1#top").unwrap());
static DESCRIPTION: LazyLock<Selector> = LazyLock::new(|| Selector::parse("div#kdescr").unwrap());
static MEDIAINFO: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("div.spoiler-content pre, div.nexus-media-info-raw > pre").unwrap()
});
static CELL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("td").unwrap());
static SPAN: LazyLock<Selector> = LazyLock::new(|| Selector::parse("span").unwrap());
static MESSAGE_CELL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("td.text").unwrap());
static BODY: LazyLock<Selector> = LazyLock::new(|| Selector::parse("body").unwrap());

static SUBTITLE_CREDIT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\s*\|\s*(?:a?by\s+\w+.*|a\s+\w+.*|atu|dtu|pter)\s*$").unwrap()
});
static IMDB_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://www\.imdb\.com/title/tt\d+").unwrap());
static COLOR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"color:\s*([^;]+)").unwrap());
static NESTED_OPEN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\[quote\]\s*\[quote\]").unwrap());
static NESTED_CLOSE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\[/quote\]\s*\[/quote\]").unwrap());
static QUOTE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)\[quote\].*?\[/quote\]").unwrap());
static IMAGE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[img\].*?\[/img\]").unwrap());
static QUOTE_OR_IMAGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\[quote\].*?\[/quote\]|\[img\].*?\[/img\]").unwrap());
static QUOTE_TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\[/?quote\]").unwrap());
static BLANK_LINES_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\r?\n){2,}").unwrap());
static TYPE_PAREN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[(（](.*?)[)）]").unwrap());

/// Quotes carrying these markers are uploader boilerplate and dropped.
const BOILERPLATE: [&str; 3] = ["郑重声明：", "自动发布", "所有资源均是在网上搜集且由用户上传"];

const MESSAGE_LIMIT: usize = 200;

/// What a listing page says about its release.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SourceDetails {
    pub title: String,
    pub subtitle: String,
    pub imdb_link: String,
    pub intro: DescriptionParts,
    /// Info-table values keyed by their label (`类型`, `媒介`, `标签`, ...).
    pub source_params: BTreeMap<String, String>,
}

impl SourceDetails {
    pub fn is_empty(&self) -> bool {
        self.title.is_empty() && self.intro.body.is_empty() && self.intro.mediainfo.is_empty()
    }
}

pub fn parse_details(html: &str) -> SourceDetails {
    let doc = Html::parse_document(html);
    let mut details = SourceDetails {
        title: doc
            .select(&TITLE)
            .next()
            .and_then(|h1| h1.text().map(str::trim).find(|t| !t.is_empty()))
            .map(normalize_title)
            .unwrap_or_default(),
        ..Default::default()
    };

    if let Some(cell) = value_cell(&doc, "副标题") {
        let text = cell.text().collect::<String>();
        details.subtitle = SUBTITLE_CREDIT_RE.replace(text.trim(), "").into_owned();
    }

    let mut quoted_report = String::new();
    if let Some(descr) = doc.select(&DESCRIPTION).next() {
        let text = descr.text().collect::<String>();
        if let Some(m) = IMDB_RE.find(&text) {
            details.imdb_link = m.as_str().to_string();
        }
        quoted_report = split_description(&html_to_bbcode(descr), &mut details.intro);
    }

    let report = doc
        .select(&MEDIAINFO)
        .next()
        .map(|pre| pre.text().collect::<String>())
        .filter(|t| !t.trim().is_empty())
        .unwrap_or(quoted_report);
    details.intro.mediainfo = BLANK_LINES_RE.replace_all(&report, "\n").trim().to_string();

    details.source_params = info_table(&doc);
    details
}

/// Dots become spaces except inside numbers (`5.1`) and codec names (`H.264`).
fn normalize_title(raw: &str) -> String {
    let chars: Vec<char> = raw.chars().collect();
    let mut out = String::with_capacity(raw.len());
    for (i, &c) in chars.iter().enumerate() {
        if c != '.' {
            out.push(c);
            continue;
        }
        let prev = i.checked_sub(1).map(|p| chars[p]);
        let rest: String = chars[i + 1..].iter().take(4).collect();
        let keeps_prev = prev.is_some_and(|p| p.is_ascii_digit() || p == 'H' || p == 'x');
        let single_digit = rest.chars().next().is_some_and(|d| d.is_ascii_digit())
            && !rest.chars().nth(1).is_some_and(|n| n.is_alphanumeric() || n == '_');
        let codec = rest.starts_with("264") || rest.starts_with("265");
        out.push(if keeps_prev && (single_digit || codec) { '.' } else { ' ' });
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// The cell next to a label cell such as `副标题` or `基本信息`.
fn value_cell<'a>(doc: &'a Html, label: &str) -> Option<ElementRef<'a>> {
    let label_cell = doc
        .select(&CELL)
        .find(|td| td.text().collect::<String>().trim() == label)?;
    label_cell
        .next_siblings()
        .filter_map(ElementRef::wrap)
        .find(|el| el.value().name() == "td")
}

fn info_table(doc: &Html) -> BTreeMap<String, String> {
    let mut params = BTreeMap::new();

    if let Some(cell) = value_cell(doc, "基本信息") {
        let strings: Vec<&str> = cell.text().map(str::trim).filter(|s| !s.is_empty()).collect();
        for pair in strings.windows(2) {
            if pair[0].contains([':', '：']) {
                let key = pair[0].replace([':', '：'], "").trim().to_string();
                params.entry(key).or_insert_with(|| pair[1].to_string());
            }
        }
    }

    if let Some(kind) = params.get("类型").cloned() {
        let kind = match TYPE_PAREN_RE.captures(&kind) {
            Some(c) => c[1].to_string(),
            None => kind.rsplit('/').next().unwrap_or_default().trim().to_string(),
        };
        params.insert("类型".to_string(), kind);
    }
    if !params.contains_key("视频编码") {
        if let Some(codec) = params.get("编码").cloned() {
            params.insert("视频编码".to_string(), codec);
        }
    }

    if let Some(cell) = value_cell(doc, "标签") {
        let mut tags: Vec<String> = Vec::new();
        for tag in cell.select(&SPAN).map(|s| s.text().collect::<String>().trim().to_string()) {
            if !tag.is_empty() && !tags.contains(&tag) {
                tags.push(tag);
            }
        }
        if !tags.is_empty() {
            params.insert("标签".to_string(), tags.join(","));
        }
    }

    params
}

/// Convert rendered description HTML back into BBCode.
pub fn html_to_bbcode(el: ElementRef) -> String {
    let mut out = String::new();
    children_to_bbcode(el, &mut out);
    out
}

fn children_to_bbcode(el: ElementRef, out: &mut String) {
    for child in el.children() {
        match child.value() {
            Node::Text(text) => out.push_str(&text.replace('\u{a0}', " ")),
            Node::Element(_) => {
                if let Some(child) = ElementRef::wrap(child) {
                    element_to_bbcode(child, out);
                }
            }
            _ => {}
        }
    }
}

fn element_to_bbcode(el: ElementRef, out: &mut String) {
    let e = el.value();
    match e.name() {
        "br" => out.push('\n'),
        "legend" | "script" | "style" => {}
        "fieldset" => {
            out.push_str("[quote]");
            out.push_str(html_to_bbcode(el).trim());
            out.push_str("[/quote]");
        }
        "b" | "strong" => {
            out.push_str("[b]");
            children_to_bbcode(el, out);
            out.push_str("[/b]");
        }
        "img" => {
            if let Some(src) = e.attr("src") {
                out.push_str(&format!("[img]{}[/img]", src));
            }
        }
        "a" => match e.attr("href") {
            Some(href) => {
                out.push_str(&format!("[url={}]", href));
                children_to_bbcode(el, out);
                out.push_str("[/url]");
            }
            None => children_to_bbcode(el, out),
        },
        "span" => match e.attr("style").and_then(|s| COLOR_RE.captures(s)) {
            Some(c) => {
                out.push_str(&format!("[color={}]", c[1].trim()));
                children_to_bbcode(el, out);
                out.push_str("[/color]");
            }
            None => children_to_bbcode(el, out),
        },
        "font" => match e.attr("size") {
            Some(size) => {
                out.push_str(&format!("[size={}]", size));
                children_to_bbcode(el, out);
                out.push_str("[/size]");
            }
            None => children_to_bbcode(el, out),
        },
        _ => children_to_bbcode(el, out),
    }
}

fn is_report(quote: &str) -> bool {
    (quote.contains("General") && quote.contains("Video") && quote.contains("Audio"))
        || (quote.contains("DISC INFO") && quote.contains("PLAYLIST REPORT"))
        || (quote.contains(".Release.Info") && quote.contains("ENCODER"))
}

/// Release-notes blocks that belong to neither the report nor the body.
fn is_release_notes(quote: &str) -> bool {
    (quote.contains("ENCODER") && quote.contains("RELEASE NAME"))
        || (quote.contains(".Release.Info") && quote.contains(".Media.Info"))
        || (quote.contains("ViDEO CODEC") && quote.contains("AUDiO CODEC"))
        || (quote.contains(".x265.Info") && quote.contains("x265"))
}

/// Split description BBCode into statement, poster, body and screenshots.
/// Returns the first quoted technical report, if any.
fn split_description(bbcode: &str, intro: &mut DescriptionParts) -> String {
    let mut bbcode = bbcode.to_string();
    loop {
        let collapsed = NESTED_OPEN_RE.replace_all(&bbcode, "[quote]");
        let collapsed = NESTED_CLOSE_RE.replace_all(&collapsed, "[/quote]").into_owned();
        if collapsed == bbcode {
            break;
        }
        bbcode = collapsed;
    }

    let images: Vec<&str> = IMAGE_RE.find_iter(&bbcode).map(|m| m.as_str()).collect();
    let poster_at = IMAGE_RE.find(&bbcode).map(|m| m.start());

    let mut statement = Vec::new();
    let mut trailing = Vec::new();
    let mut report = String::new();
    for m in QUOTE_RE.find_iter(&bbcode) {
        let quote = m.as_str();
        let before_poster = poster_at.is_some_and(|p| m.start() < p);
        if is_report(quote) || is_release_notes(quote) {
            if before_poster && report.is_empty() && is_report(quote) {
                report = QUOTE_TAG_RE.replace_all(quote, "").trim().to_string();
            }
            continue;
        }
        if BOILERPLATE.iter().any(|marker| quote.contains(marker)) {
            continue;
        }
        if before_poster {
            statement.push(quote);
        } else {
            trailing.push(quote);
        }
    }

    let mut body = QUOTE_OR_IMAGE_RE
        .replace_all(&bbcode, "")
        .replace('\r', "")
        .trim()
        .to_string();
    if !trailing.is_empty() {
        body = format!("{}\n\n{}", body, trailing.join("\n"));
    }

    intro.statement = BLANK_LINES_RE.replace_all(&statement.join("\n"), "\n\n").trim().to_string();
    intro.poster = images.first().map(|s| s.to_string()).unwrap_or_default();
    intro.body = BLANK_LINES_RE.replace_all(&body, "\n").into_owned();
    intro.screenshots = images.iter().skip(1).copied().collect::<Vec<_>>().join("\n");
    report
}

/// Short, readable text of an HTML page, for error messages.
///
/// Prefers NexusPHP's message cell; falls back to the page body.
pub fn page_message(html: &str) -> String {
    let doc = Html::parse_document(html);
    let text = doc
        .select(&MESSAGE_CELL)
        .map(visible_text)
        .find(|t| !t.is_empty())
        .or_else(|| doc.select(&BODY).next().map(visible_text))
        .unwrap_or_default();

    if text.chars().count() > MESSAGE_LIMIT {
        let cut: String = text.chars().take(MESSAGE_LIMIT).collect();
        format!("{}...", cut)
    } else {
        text
    }
}

fn visible_text(el: ElementRef) -> String {
    fn walk(el: ElementRef, out: &mut Vec<String>) {
        for child in el.children() {
            match child.value() {
                Node::Text(text) => out.push(text.trim().to_string()),
                Node::Element(e) if !matches!(e.name(), "script" | "style") => {
                    if let Some(child) = ElementRef::wrap(child) {
                        walk(child, out);
                    }
                }
                _ => {}
            }
        }
    }
    let mut parts = Vec::new();
    walk(el, &mut parts);
    parts.join(" ").split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<html><body>
<h1 id="top">Old.Movie.1999.1080p.Blu-ray.DTS-HD.MA.5.1.H.264-CHD&nbsp;<b>[免费]</b></h1>
<table>
<tr><td class="rowhead">副标题</td><td class="rowfollow">老电影 | 国语 | 中英字幕 | By CHD</td></tr>
<tr><td class="rowhead">基本信息</td><td class="rowfollow"><b>大小：</b>40 GB&nbsp;<b>类型:</b>&nbsp;电影 (Movie)&nbsp;<b>媒介:</b>&nbsp;Blu-ray&nbsp;<b>编码:</b>&nbsp;H.264</td></tr>
<tr><td class="rowhead">标签</td><td class="rowfollow"><span>国语</span><span>中字</span><span>国语</span></td></tr>
<tr><td class="rowhead">简介</td><td class="rowfollow"><div id="kdescr">
<fieldset><legend>引用</legend><fieldset><legend>引用</legend>转自 CHD，感谢原制作者</fieldset></fieldset>
<fieldset><legend>引用</legend>郑重声明：本站不提供任何影视下载</fieldset>
<img src="https://img.example/poster.jpg"><br>
◎译　　名　老电影<br>◎产　　地　中国香港<br><br><br>
<span style="color: red">IMDb</span> <a href="https://www.imdb.com/title/tt0000001/">https://www.imdb.com/title/tt0000001/</a><br>
<fieldset><legend>引用</legend>DISC INFO:<br>Disc Title: OLD_MOVIE<br>PLAYLIST REPORT:<br>Name: 00800.MPLS</fieldset>
<fieldset><legend>引用</legend>附赠花絮</fieldset>
<img src="https://img.example/s1.png"><img src="https://img.example/s2.png">
</div></td></tr>
</table></body></html>"#;

    #[test]
    fn test_title_and_subtitle() {
        let details = parse_details(PAGE);
        assert_eq!(details.title, "Old Movie 1999 1080p Blu-ray DTS-HD MA 5.1 H.264-CHD");
        assert_eq!(details.subtitle, "老电影 | 国语 | 中英字幕");
        assert_eq!(details.imdb_link, "https://www.imdb.com/title/tt0000001");
    }

    #[test]
    fn test_description_split() {
        let intro = parse_details(PAGE).intro;
        assert_eq!(intro.statement, "[quote]转自 CHD，感谢原制作者[/quote]");
        assert_eq!(intro.poster, "[img]https://img.example/poster.jpg[/img]");
        assert_eq!(
            intro.screenshots,
            "[img]https://img.example/s1.png[/img]\n[img]https://img.example/s2.png[/img]"
        );
        assert!(intro.body.starts_with("◎译　　名　老电影\n◎产　　地　中国香港"), "{}", intro.body);
        assert!(intro.body.contains("[color=red]IMDb[/color]"));
        assert!(intro.body.contains("[url=https://www.imdb.com/title/tt0000001/]"));
        assert!(intro.body.ends_with("[quote]附赠花絮[/quote]"));
        assert!(!intro.body.contains("DISC INFO"));
        assert!(!intro.body.contains("郑重声明"));
    }

    #[test]
    fn test_report_only_from_quote_before_poster() {
        // The BDInfo quote sits after the poster, so it is dropped, not used
        let intro = parse_details(PAGE).intro;
        assert!(intro.mediainfo.is_empty());

        let page = PAGE.replace(
            "<div id=\"kdescr\">",
            "<div id=\"kdescr\"><fieldset><legend>引用</legend>General<br>Video<br>Audio</fieldset>",
        );
        assert_eq!(parse_details(&page).intro.mediainfo, "General\nVideo\nAudio");
    }

    #[test]
    fn test_spoiler_report_preferred() {
        let page = PAGE.replace(
            "</table>",
            "</table><div class=\"spoiler-content\"><pre>General\n\n\nVideo\nAudio</pre></div>",
        );
        assert_eq!(parse_details(&page).intro.mediainfo, "General\nVideo\nAudio");
    }

    #[test]
    fn test_info_table() {
        let params = parse_details(PAGE).source_params;
        assert_eq!(params.get("类型").map(String::as_str), Some("Movie"));
        assert_eq!(params.get("媒介").map(String::as_str), Some("Blu-ray"));
        assert_eq!(params.get("视频编码").map(String::as_str), Some("H.264"));
        assert_eq!(params.get("标签").map(String::as_str), Some("国语,中字"));
    }

    #[test]
    fn test_normalize_title() {
        assert_eq!(normalize_title("The.Movie.2020.2160p.WEB-DL.DDP5.1.x.265"), "The Movie 2020 2160p WEB-DL DDP5.1 x.265");
        assert_eq!(normalize_title("A.B"), "A B");
    }

    #[test]
    fn test_empty_page() {
        let details = parse_details("<html><body><p>nothing</p></body></html>");
        assert!(details.is_empty());
        assert!(details.source_params.is_empty());
    }

    #[test]
    fn test_page_message() {
        let html = "<html><head><script>var x = 1;</script></head><body><h2>上传失败！</h2>\
                    <table><tr><td class=\"text\">标题太短</td></tr></table></body></html>";
        assert_eq!(page_message(html), "标题太短");

        assert_eq!(page_message("<html><body><p>Access <b>denied</b></p></body></html>"), "Access denied");

        let long = format!("<html><body>{}</body></html>", "x".repeat(500));
        let message = page_message(&long);
        assert_eq!(message.chars().count(), MESSAGE_LIMIT + 3);
        assert!(message.ends_with("..."));
    }
}
