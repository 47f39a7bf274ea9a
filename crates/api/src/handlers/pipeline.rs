//! Pipeline status and trigger endpoints.

use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use nicheradar_connector::HttpCatalogApi;
use nicheradar_core::{RunId, RunStatus};
use nicheradar_pipeline::{Orchestrator, RunOptions};
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
pub struct PipelineStatus {
    #[schema(value_type = Option<uuid::Uuid>)]
    pub run_id: Option<RunId>,
    #[schema(value_type = Option<String>)]
    pub status: Option<RunStatus>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub products_tracked: i64,
    pub opportunities_found: i32,
    pub error_count: i32,
    pub dq_passed: Option<bool>,
    pub shortlist_frozen: bool,
}

/// Latest run summary.
#[utoipa::path(
    get,
    path = "/pipeline/status",
    tag = "pipeline",
    responses((status = 200, body = PipelineStatus))
)]
pub async fn pipeline_status(
    State(state): State<AppState>,
) -> Result<Json<PipelineStatus>, ApiError> {
    let products_tracked = state.catalog.count_active().await?;
    let latest = state.runs.latest_run().await?;

    let status = match latest {
        Some(run) => PipelineStatus {
            run_id: Some(run.run_id),
            status: Some(run.status),
            started_at: Some(run.started_at),
            ended_at: run.ended_at,
            products_tracked,
            opportunities_found: run.opportunities_found,
            error_count: run.asins_failed,
            dq_passed: run.dq_passed,
            shortlist_frozen: run.shortlist_frozen,
        },
        None => PipelineStatus {
            run_id: None,
            status: None,
            started_at: None,
            ended_at: None,
            products_tracked,
            opportunities_found: 0,
            error_count: 0,
            dq_passed: None,
            shortlist_frozen: false,
        },
    };
    Ok(Json(status))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TriggeredRun {
    #[schema(value_type = uuid::Uuid)]
    pub run_id: RunId,
    pub status: &'static str,
}

/// Triggers a new pipeline run in the background and returns its fresh id.
#[utoipa::path(
    post,
    path = "/pipeline/run",
    tag = "pipeline",
    responses(
        (status = 202, body = TriggeredRun),
        (status = 503, description = "Connector is not configured")
    )
)]
pub async fn trigger_run(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<TriggeredRun>), ApiError> {
    let api = Arc::new(HttpCatalogApi::new(&state.config.connector)?);
    let orchestrator = Orchestrator::postgres(
        state.config.clone(),
        api,
        state.db.clone(),
        CancellationToken::new(),
    );

    let run_id = RunId::new();
    info!(run_id = %run_id, "pipeline run triggered via API");
    tokio::spawn(async move {
        let options = RunOptions {
            run_id: Some(run_id),
            ..RunOptions::default()
        };
        if let Err(e) = orchestrator.run(options).await {
            error!(run_id = %run_id, error = %e, "triggered run failed");
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(TriggeredRun {
            run_id,
            status: "started",
        }),
    ))
}
