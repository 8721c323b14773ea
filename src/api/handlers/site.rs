//! Site listing handler

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;

use crate::api::{AppError, AppState};
use crate::site::{ProfileKind, SiteConfig, SiteError, SourceDetails};

#[derive(Debug, Serialize)]
pub struct SiteResponse {
    pub id: String,
    pub name: String,
    pub base_url: String,
    pub profile: ProfileKind,
    pub has_passkey: bool,
    pub has_cookie: bool,
}

impl From<&SiteConfig> for SiteResponse {
    fn from(site: &SiteConfig) -> Self {
        Self {
            id: site.id.clone(),
            name: site.name.clone(),
            base_url: site.base_url.clone(),
            profile: site.profile,
            has_passkey: site.passkey.is_some(),
            has_cookie: site.cookie.is_some(),
        }
    }
}

/// List configured sites
pub async fn list(State(state): State<AppState>) -> Json<Vec<SiteResponse>> {
    Json(state.registry.list().map(SiteResponse::from).collect())
}

/// Read a listing from a source site, for review before submitting
pub async fn details(
    State(state): State<AppState>,
    Path((site_id, torrent_id)): Path<(String, String)>,
) -> Result<Json<SourceDetails>, AppError> {
    let site = state
        .registry
        .get(&site_id)
        .map_err(|_| AppError::not_found(format!("Unknown site: {}", site_id)))?;

    state
        .migrations
        .context()
        .source
        .details(site, &torrent_id)
        .await
        .map(Json)
        .map_err(|e| match e {
            SiteError::MissingCookie(_) => AppError::bad_request(e.to_string()),
            _ => AppError::new(StatusCode::BAD_GATEWAY, e.to_string()),
        })
}
