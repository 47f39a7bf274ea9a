//! Shortlist read endpoints.
//!
//! Serves the currently active shortlist snapshot, falling back to the
//! most recent snapshot of a completed run, and finally to a demo payload.
//! A degraded or failed run's proposed snapshot is never served.

use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::{Query, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::Json;
use chrono::{DateTime, Utc};
use nicheradar_core::{RunId, UrgencyLevel};
use nicheradar_market_data::scoring::OpportunityArtifact;
use nicheradar_market_data::shortlist::ShortlistSnapshot;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(rename_all = "camelCase")]
pub struct ShortlistQuery {
    pub max_items: Option<usize>,
    pub min_score: Option<i32>,
    pub min_value: Option<f64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OpportunityItem {
    pub asin: String,
    pub rank: usize,
    pub final_score: i32,
    pub rank_score: f64,
    pub risk_adjusted_value: f64,
    pub monthly_profit: f64,
    pub window_days: i32,
    #[schema(value_type = String)]
    pub urgency: UrgencyLevel,
    pub action: String,
    pub thesis: String,
    pub price: Option<f64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ShortlistResponse {
    #[schema(value_type = Option<uuid::Uuid>)]
    pub run_id: Option<RunId>,
    pub generated_at: Option<DateTime<Utc>>,
    /// True when no real snapshot exists yet
    pub demo: bool,
    pub total_potential_value: f64,
    pub items: Vec<OpportunityItem>,
}

async fn resolve_snapshot(state: &AppState) -> Result<Option<ShortlistSnapshot>, ApiError> {
    if let Some(active) = state.shortlists.active_snapshot().await? {
        return Ok(Some(active));
    }
    Ok(state.shortlists.latest_completed_snapshot().await?)
}

async fn build_response(
    state: &AppState,
    query: &ShortlistQuery,
) -> Result<ShortlistResponse, ApiError> {
    let Some(snapshot) = resolve_snapshot(state).await? else {
        return Ok(demo_response());
    };

    let artifacts = state
        .artifacts
        .artifacts_by_asin(snapshot.run_id, &snapshot.asins)
        .await?;
    let by_asin: HashMap<&str, &OpportunityArtifact> = artifacts
        .iter()
        .map(|a| (a.asin.as_str(), a))
        .collect();

    let max_items = query.max_items.unwrap_or(usize::MAX);
    let mut items = Vec::new();
    let mut total = 0.0;
    for (position, asin) in snapshot.asins.iter().enumerate() {
        let Some(artifact) = by_asin.get(asin.as_str()) else {
            continue;
        };
        if let Some(min_score) = query.min_score {
            if artifact.final_score < min_score {
                continue;
            }
        }
        if let Some(min_value) = query.min_value {
            if artifact.risk_adjusted_value < min_value {
                continue;
            }
        }
        if items.len() >= max_items {
            break;
        }
        total += artifact.risk_adjusted_value;
        items.push(OpportunityItem {
            asin: asin.to_string(),
            rank: position + 1,
            final_score: artifact.final_score,
            rank_score: artifact.rank_score,
            risk_adjusted_value: artifact.risk_adjusted_value,
            monthly_profit: artifact.monthly_profit,
            window_days: artifact.window_days,
            urgency: artifact.urgency,
            action: artifact.action.clone(),
            thesis: artifact.thesis.clone(),
            price: artifact.price_at,
        });
    }

    Ok(ShortlistResponse {
        run_id: Some(snapshot.run_id),
        generated_at: Some(snapshot.created_at),
        demo: false,
        total_potential_value: total,
        items,
    })
}

/// Stable placeholder served before the first completed run.
fn demo_response() -> ShortlistResponse {
    let items = vec![
        OpportunityItem {
            asin: "B0DEMO0001".to_string(),
            rank: 1,
            final_score: 78,
            rank_score: 21_000.0,
            risk_adjusted_value: 14_000.0,
            monthly_profit: 1_650.0,
            window_days: 28,
            urgency: UrgencyLevel::Urgent,
            action: "prepare_launch".to_string(),
            thesis: "Demo opportunity: under-reviewed niche with recurring stockouts.".to_string(),
            price: Some(24.99),
        },
        OpportunityItem {
            asin: "B0DEMO0002".to_string(),
            rank: 2,
            final_score: 64,
            rank_score: 9_800.0,
            risk_adjusted_value: 8_200.0,
            monthly_profit: 980.0,
            window_days: 55,
            urgency: UrgencyLevel::Active,
            action: "validate_suppliers".to_string(),
            thesis: "Demo opportunity: thin competition with improving rank.".to_string(),
            price: Some(34.50),
        },
    ];
    let total = items.iter().map(|i| i.risk_adjusted_value).sum();
    ShortlistResponse {
        run_id: None,
        generated_at: None,
        demo: true,
        total_potential_value: total,
        items,
    }
}

/// Ranked opportunity list from the active shortlist snapshot.
#[utoipa::path(
    get,
    path = "/shortlist",
    tag = "shortlist",
    params(ShortlistQuery),
    responses((status = 200, body = ShortlistResponse))
)]
pub async fn get_shortlist(
    State(state): State<AppState>,
    Query(query): Query<ShortlistQuery>,
) -> Result<Json<ShortlistResponse>, ApiError> {
    Ok(Json(build_response(&state, &query).await?))
}

/// CSV export with the same filter surface as `/shortlist`.
#[utoipa::path(
    get,
    path = "/shortlist/export",
    tag = "shortlist",
    params(ShortlistQuery),
    responses((status = 200, description = "CSV payload", content_type = "text/csv"))
)]
pub async fn export_shortlist(
    State(state): State<AppState>,
    Query(query): Query<ShortlistQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let response = build_response(&state, &query).await?;

    let mut csv = String::from(
        "asin,rank,final_score,rank_score,risk_adjusted_value,monthly_profit,window_days,urgency,action,thesis\n",
    );
    for item in &response.items {
        csv.push_str(&format!(
            "{},{},{},{:.2},{:.2},{:.2},{},{},{},\"{}\"\n",
            item.asin,
            item.rank,
            item.final_score,
            item.rank_score,
            item.risk_adjusted_value,
            item.monthly_profit,
            item.window_days,
            item.urgency,
            item.action,
            item.thesis.replace('"', "\"\""),
        ));
    }

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"shortlist.csv\"",
            ),
        ],
        csv,
    ))
}
