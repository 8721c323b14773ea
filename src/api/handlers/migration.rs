//! Migration handlers

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use serde_json::json;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::api::{AppError, AppState};
use crate::service::{MigrationJob, MigrationRequest, MigrationService, ProgressEvent};

/// Messages pushed over the progress WebSocket
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamMessage {
    Snapshot { job: MigrationJob },
    Progress(ProgressEvent),
    /// The subscriber fell behind and missed events.
    Lagged { skipped: u64 },
}

fn parse_id(id: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(id).map_err(|_| AppError::bad_request(format!("Invalid job id: {}", id)))
}

/// Submit a migration job
pub async fn submit(
    State(state): State<AppState>,
    Json(req): Json<MigrationRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    if req.torrent_id.trim().is_empty() {
        return Err(AppError::bad_request("torrent_id must not be empty"));
    }
    let id = state.migrations.submit(req).await?;
    Ok(Json(json!({ "job_id": id })))
}

/// Current job snapshot
pub async fn get_one(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<MigrationJob>, AppError> {
    let id = parse_id(&id)?;
    state
        .migrations
        .snapshot(id)
        .await
        .map(Json)
        .ok_or_else(|| AppError::not_found(format!("Job not found: {}", id)))
}

/// Request cancellation
pub async fn cancel(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let id = parse_id(&id)?;
    let cancelled = state.migrations.cancel(id).await?;
    Ok(Json(json!({ "job_id": id, "cancelled": cancelled })))
}

/// Progress stream for one job
pub async fn events(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let id = parse_id(&id)?;
    if state.migrations.snapshot(id).await.is_none() {
        return Err(AppError::not_found(format!("Job not found: {}", id)));
    }
    Ok(ws.on_upgrade(move |socket| stream_job(socket, state, id)))
}

/// Events for a single job, starting from a snapshot taken after the
/// subscription so nothing published in between is lost.
pub struct JobFeed {
    id: Uuid,
    rx: broadcast::Receiver<ProgressEvent>,
    done: bool,
}

impl JobFeed {
    pub async fn open(migrations: &MigrationService, id: Uuid) -> Option<(StreamMessage, Self)> {
        let rx = migrations.context().progress.subscribe();
        let job = migrations.snapshot(id).await?;
        let done = job.stage.is_terminal();
        Some((StreamMessage::Snapshot { job }, Self { id, rx, done }))
    }

    /// Next message for this job, or None once the job has finished.
    pub async fn next(&mut self) -> Option<StreamMessage> {
        while !self.done {
            match self.rx.recv().await {
                Ok(event) if event.job_id == self.id => {
                    self.done = event.stage.is_terminal();
                    return Some(StreamMessage::Progress(event));
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Progress subscriber for {} lagged by {} events", self.id, skipped);
                    return Some(StreamMessage::Lagged { skipped });
                }
                Err(RecvError::Closed) => self.done = true,
            }
        }
        None
    }
}

async fn send(socket: &mut WebSocket, msg: &StreamMessage) -> bool {
    match serde_json::to_string(msg) {
        Ok(text) => socket.send(Message::Text(text.into())).await.is_ok(),
        Err(e) => {
            warn!("Failed to serialize stream message: {}", e);
            true
        }
    }
}

async fn stream_job(mut socket: WebSocket, state: AppState, id: Uuid) {
    if let Some((snapshot, mut feed)) = JobFeed::open(&state.migrations, id).await {
        if send(&mut socket, &snapshot).await {
            loop {
                tokio::select! {
                    incoming = socket.recv() => match incoming {
                        Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                        Some(Ok(_)) => {}
                    },
                    msg = feed.next() => match msg {
                        Some(msg) => {
                            if !send(&mut socket, &msg).await {
                                break;
                            }
                        }
                        None => break,
                    },
                }
            }
        }
    }

    debug!("Progress stream for {} closed", id);
    let _ = socket.send(Message::Close(None)).await;
}
