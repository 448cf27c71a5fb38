// src/api.rs
//! JSON caller surface over the [`Orchestrator`].

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::error::{Error, ErrorKind};
use crate::facade::{
    BatchReport, ClassificationReport, ExtractionReport, Orchestrator, ServiceError, ServiceResult,
};
use crate::model::{Item, ScanOutcome, SeveritySummary, Target, TargetId};

type AppState = Arc<Orchestrator>;

pub fn router(orchestrator: Arc<Orchestrator>) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/targets", get(list_targets).post(create_target))
        .route("/targets/{id}", delete(remove_target))
        .route("/targets/{id}/scan", post(scan_target))
        .route("/targets/{id}/extract", post(extract_posts))
        .route("/targets/{id}/classify", post(classify_posts))
        .route("/targets/{id}/pass", post(full_pass))
        .route("/targets/{id}/items", get(list_items))
        .route("/scan", post(scan_batch))
        .route("/aggregate", get(aggregate))
        .route("/aggregate/{id}", get(aggregate_one))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::very_permissive())
        .with_state(orchestrator)
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::Classification => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::Upstream => StatusCode::BAD_GATEWAY,
        ErrorKind::Storage => StatusCode::SERVICE_UNAVAILABLE,
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        (status_for(self.kind), Json(self)).into_response()
    }
}

fn parse_id(raw: &str) -> ServiceResult<TargetId> {
    Ok(raw.parse::<TargetId>()?)
}

fn bad_request(msg: impl Into<String>) -> ServiceError {
    Error::InvalidInput(msg.into()).into()
}

#[derive(Deserialize)]
struct NewTarget {
    address: String,
    name: String,
    #[serde(default)]
    description: String,
}

#[derive(Deserialize, Default)]
struct ScanRequest {
    #[serde(default)]
    ids: Option<Vec<TargetId>>,
}

#[derive(Deserialize, Default)]
struct ExtractParams {
    #[serde(default)]
    rescan: bool,
}

#[derive(Deserialize, Default)]
struct AggregateParams {
    /// Comma-separated target ids; absent means every target.
    #[serde(default)]
    ids: Option<String>,
}

#[derive(Serialize)]
struct Removed {
    target_id: TargetId,
    items_removed: usize,
}

async fn list_targets(State(app): State<AppState>) -> ServiceResult<Json<Vec<Target>>> {
    Ok(Json(app.list_targets().await?))
}

async fn create_target(
    State(app): State<AppState>,
    body: Bytes,
) -> ServiceResult<(StatusCode, Json<Target>)> {
    let req: NewTarget = serde_json::from_slice(&body)
        .map_err(|e| bad_request(format!("malformed target payload: {e}")))?;
    let target = app
        .register_target(&req.address, &req.name, &req.description)
        .await?;
    Ok((StatusCode::CREATED, Json(target)))
}

async fn remove_target(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> ServiceResult<Json<Removed>> {
    let id = parse_id(&id)?;
    let items_removed = app.remove_target(&id).await?;
    Ok(Json(Removed {
        target_id: id,
        items_removed,
    }))
}

async fn scan_target(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> ServiceResult<Json<ScanOutcome>> {
    let id = parse_id(&id)?;
    Ok(Json(app.scan_target(&id).await?))
}

/// Empty body scans every target; `{"ids": [...]}` scans a subset.
async fn scan_batch(State(app): State<AppState>, body: Bytes) -> ServiceResult<Json<BatchReport>> {
    let req: ScanRequest = if body.iter().all(u8::is_ascii_whitespace) {
        ScanRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| bad_request(format!("malformed scan request: {e}")))?
    };
    let report = match req.ids {
        Some(ids) => app.scan_targets(&ids).await?,
        None => app.scan_all().await?,
    };
    Ok(Json(report))
}

async fn extract_posts(
    State(app): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<ExtractParams>,
) -> ServiceResult<Json<ExtractionReport>> {
    let id = parse_id(&id)?;
    Ok(Json(app.extract_posts(&id, params.rescan).await?))
}

async fn classify_posts(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> ServiceResult<Json<ClassificationReport>> {
    let id = parse_id(&id)?;
    Ok(Json(app.classify_posts(&id).await?))
}

async fn full_pass(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> ServiceResult<Json<Vec<Item>>> {
    let id = parse_id(&id)?;
    Ok(Json(app.run_full_pass(&id).await?))
}

async fn list_items(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> ServiceResult<Json<Vec<Item>>> {
    let id = parse_id(&id)?;
    Ok(Json(app.list_posts(&id).await?))
}

async fn aggregate(
    State(app): State<AppState>,
    Query(params): Query<AggregateParams>,
) -> ServiceResult<Json<Vec<SeveritySummary>>> {
    let summaries = match params.ids.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => {
            let ids = raw
                .split(',')
                .map(parse_id)
                .collect::<ServiceResult<Vec<_>>>()?;
            app.aggregate_many(&ids).await?
        }
        None => app.aggregate(None).await?,
    };
    Ok(Json(summaries))
}

async fn aggregate_one(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> ServiceResult<Json<SeveritySummary>> {
    let id = parse_id(&id)?;
    let summary = app
        .aggregate(Some(&id))
        .await?
        .pop()
        .ok_or(Error::TargetNotFound(id))?;
    Ok(Json(summary))
}
