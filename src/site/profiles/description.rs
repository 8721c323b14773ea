//! Description assembly.

use serde::{Deserialize, Serialize};

use super::{ProfileKind, SiteProfile};
use crate::media::{self, MediaFormat};

/// Listing description pieces, in output order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DescriptionParts {
    pub statement: String,
    pub poster: String,
    pub body: String,
    /// MediaInfo or BDInfo text, detected by structure.
    pub mediainfo: String,
    /// A separate BDInfo report, if the listing had one.
    pub bdinfo: String,
    pub screenshots: String,
}

/// How the technical block is embedded in the description.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaWrap {
    /// Sent only as `technical_info`.
    Omit,
    Quote,
    /// `[hide=mediainfo]` or `[hide=bdinfo]` by detected format.
    Hide,
}

fn wrap(text: &str, style: MediaWrap) -> Option<String> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    match style {
        MediaWrap::Omit => None,
        MediaWrap::Quote => Some(format!("[quote]{}[/quote]", text)),
        MediaWrap::Hide => {
            let label = match media::detect_format(text) {
                MediaFormat::BdInfo => "bdinfo",
                MediaFormat::MediaInfo | MediaFormat::Unknown => "mediainfo",
            };
            Some(format!("[hide={}]{}[/hide]", label, text))
        }
    }
}

/// statement, poster, body, technical block, screenshots; empty parts skipped.
pub fn assemble_description(parts: &DescriptionParts, style: MediaWrap) -> String {
    let mut out: Vec<String> = Vec::new();
    for piece in [&parts.statement, &parts.poster, &parts.body] {
        if !piece.trim().is_empty() {
            out.push(piece.trim().to_string());
        }
    }

    out.extend(wrap(&parts.mediainfo, style));
    if style == MediaWrap::Hide && !parts.bdinfo.trim().is_empty() {
        out.push(format!("[hide=bdinfo]{}[/hide]", parts.bdinfo.trim()));
    }

    if !parts.screenshots.trim().is_empty() {
        out.push(parts.screenshots.trim().to_string());
    }
    out.join("\n")
}

/// MediaInfo quoted between the body and the screenshots.
pub struct InlineMediaInfo;

impl SiteProfile for InlineMediaInfo {
    fn kind(&self) -> ProfileKind {
        ProfileKind::InlineMediaInfo
    }

    fn build_description(&self, parts: &DescriptionParts) -> String {
        assemble_description(parts, MediaWrap::Quote)
    }
}
