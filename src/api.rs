//! HTTP surface: routes, handlers and the JSON error envelope.

use std::{sync::Arc, time::Duration};

use axum::{
    Json, Router,
    extract::{Path, Query, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, put},
};
use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tokio::task;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::query::ListParams;
use crate::repository::{StoreError, StoreResult, VideoRepository};
use crate::video::{Video, VideoInput, VideoPage};

#[derive(Clone)]
pub struct AppState {
    repo: Arc<dyn VideoRepository>,
}

impl AppState {
    pub fn new(repo: Arc<dyn VideoRepository>) -> Self {
        Self { repo }
    }

    /// Runs a blocking repository call off the async workers.
    async fn with_repo<F, T>(&self, op: F) -> ApiResult<T>
    where
        F: FnOnce(&dyn VideoRepository) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let repo = self.repo.clone();
        task::spawn_blocking(move || op(repo.as_ref()))
            .await
            .map_err(|err| ApiError::internal(format!("task join error: {err}")))?
            .map_err(ApiError::from)
    }
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    fn conflict(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::CONFLICT,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) => Self::not_found("Video not found"),
            StoreError::Conflict(_) => Self::conflict(err.to_string()),
            StoreError::Storage(message) => {
                error!(%message, "storage failure");
                Self::internal(message)
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({
            "error": self.message,
        });
        (self.status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// Routes without middleware; see [`app`] for the served stack.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/videos", get(list_videos).post(create_video))
        .route("/api/videos/{id}", put(update_video).delete(delete_video))
        .with_state(state)
}

/// The router with CORS, request tracing and a per-request deadline.
pub fn app(state: AppState, request_timeout: Duration) -> Router {
    router(state)
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            request_timeout,
        ))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn healthz() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn list_videos(
    State(state): State<AppState>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> ApiResult<Json<VideoPage>> {
    let params = ListParams::from_pairs(pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    let filter = params.resolve(Utc::now());

    let (videos, total) = state.with_repo(move |repo| repo.list(&filter)).await?;
    debug!(total, returned = videos.len(), page = params.page, "listed videos");

    Ok(Json(VideoPage {
        videos,
        total,
        page: params.page,
        per_page: params.per_page,
    }))
}

fn parse_body(payload: Result<Json<VideoInput>, JsonRejection>) -> ApiResult<VideoInput> {
    payload.map(|Json(input)| input).map_err(|rejection| {
        debug!(reason = %rejection.body_text(), "rejected video body");
        ApiError::bad_request("Invalid request body")
    })
}

async fn create_video(
    State(state): State<AppState>,
    payload: Result<Json<VideoInput>, JsonRejection>,
) -> ApiResult<Json<Video>> {
    let input = parse_body(payload)?;
    let video = Video::from_input(Uuid::new_v4().to_string(), input, Utc::now());

    let stored = video.clone();
    state.with_repo(move |repo| repo.create(&stored)).await?;
    info!(id = %video.id, "created video");
    Ok(Json(video))
}

async fn update_video(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<VideoInput>, JsonRejection>,
) -> ApiResult<Json<Video>> {
    let input = parse_body(payload)?;
    let video = state
        .with_repo(move |repo| repo.update(&id, &input))
        .await?;
    info!(id = %video.id, "updated video");
    Ok(Json(video))
}

#[derive(Serialize)]
struct DeleteResponse {
    status: &'static str,
    message: &'static str,
}

async fn delete_video(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<DeleteResponse>> {
    let deleted = id.clone();
    state.with_repo(move |repo| repo.delete(&deleted)).await?;
    info!(%id, "deleted video");
    Ok(Json(DeleteResponse {
        status: "success",
        message: "Video deleted",
    }))
}
