//! Title parsing handler

use axum::Json;
use serde::{Deserialize, Serialize};

use crate::api::AppError;
use crate::media::{self, MediaFormat};
use crate::params::{self, Auxiliary, StandardizedParams};
use crate::title::{self, Span, TitleComponent};

#[derive(Debug, Deserialize)]
pub struct ParseRequest {
    pub title: String,
    #[serde(default)]
    pub mediainfo: Option<String>,
    #[serde(default)]
    pub subtitle: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ParseResponse {
    pub components: Vec<TitleComponent>,
    pub spans: Vec<Span>,
    pub media_format: MediaFormat,
    pub params: StandardizedParams,
}

/// Parse a release title, optionally with its technical report
pub async fn parse_title(Json(req): Json<ParseRequest>) -> Result<Json<ParseResponse>, AppError> {
    if req.title.trim().is_empty() {
        return Err(AppError::bad_request("title must not be empty"));
    }

    let stream = req.mediainfo.as_deref().map(media::analyze).unwrap_or_default();
    let known = stream.format != MediaFormat::Unknown;
    let parsed = title::parse(&req.title, known.then_some(&stream));
    let params = params::build(
        &parsed,
        &stream,
        &Auxiliary {
            subtitle: req.subtitle.as_deref().unwrap_or_default(),
            ..Default::default()
        },
    );

    Ok(Json(ParseResponse {
        components: parsed.components,
        spans: parsed.spans,
        media_format: stream.format,
        params,
    }))
}
