//! HTTP routes for the allocator service.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::Instrument;

use crate::error::EngineError;
use crate::ingest::{self, MarketSeries};
use crate::state::{self, CommitOutcome, UserState};
use crate::types::{AllocationPlan, PortfolioSnapshot};
use crate::zones::{BannedZone, BannedZoneStore};
use crate::AllocatorState;

// ============================================================================
// Errors
// ============================================================================

/// Error body returned by every handler.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
}

/// Handler error, rendered with the status of the wrapped error.
#[derive(Debug)]
pub struct ApiError(ladder_common::Error);

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        Self(err.into())
    }
}

impl From<ladder_common::Error> for ApiError {
    fn from(err: ladder_common::Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            tracing::error!(error = %self.0, "Request failed");
        } else {
            tracing::warn!(error = %self.0, status = status.as_u16(), "Request rejected");
        }
        let body = ErrorResponse {
            success: false,
            error: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

// ============================================================================
// Request / Response Types
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub service: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PlanResponse {
    pub trace_id: String,
    pub generated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub plan: AllocationPlan,
}

/// Plan from raw market series plus persisted user state.
#[derive(Debug, Deserialize)]
pub struct MarketPlanRequest {
    pub series: HashMap<String, MarketSeries>,
    /// Persisted state, as a JSON string or an object
    #[serde(default)]
    pub state: Option<serde_json::Value>,
    /// Cash used when no state is given
    #[serde(default)]
    pub cash: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MarketPlanResponse {
    #[serde(flatten)]
    pub response: PlanResponse,
    pub snapshot: PortfolioSnapshot,
}

#[derive(Debug, Deserialize)]
pub struct CommitRequest {
    #[serde(default)]
    pub state: UserState,
    pub plan: AllocationPlan,
}

#[derive(Debug, Deserialize)]
pub struct BanRequest {
    pub ticker: String,
    pub price: f64,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ZonesResponse {
    pub ticker: String,
    pub zones: Vec<BannedZone>,
}

// ============================================================================
// Route Handlers
// ============================================================================

/// Health check endpoint
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        service: "ladder-engine".to_string(),
    })
}

/// Generate a plan from a materialised snapshot.
pub async fn create_plan(
    State(state): State<Arc<AllocatorState>>,
    Json(snapshot): Json<PortfolioSnapshot>,
) -> ApiResult<PlanResponse> {
    let trace_id = ladder_common::logging::generate_trace_id();
    let plan = async {
        let zones = state.zones.read().await;
        state.planner.plan(&snapshot, &*zones)
    }
    .instrument(ladder_common::plan_span!(trace_id))
    .await?;

    Ok(Json(PlanResponse {
        trace_id,
        generated_at: Utc::now(),
        plan,
    }))
}

/// Ingest market series and user state, then plan.
pub async fn create_market_plan(
    State(state): State<Arc<AllocatorState>>,
    Json(request): Json<MarketPlanRequest>,
) -> ApiResult<MarketPlanResponse> {
    let trace_id = ladder_common::logging::generate_trace_id();
    let mut zones = state.zones.read().await.clone();

    let span = ladder_common::plan_span!(trace_id, source = "market");
    let (snapshot, plan) = span.in_scope(|| -> Result<_, EngineError> {
        let raw_state = request.state.map(|value| match value {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        });
        let user_state = UserState::parse(raw_state.as_deref())?;
        if let Some(user_state) = &user_state {
            zones.seed(user_state);
        }

        let snapshot = ingest::build_snapshot(
            &request.series,
            &state.planner.config().universe,
            user_state.as_ref(),
            request.cash,
        );
        let plan = state.planner.plan(&snapshot, &zones)?;
        Ok((snapshot, plan))
    })?;

    Ok(Json(MarketPlanResponse {
        response: PlanResponse {
            trace_id,
            generated_at: Utc::now(),
            plan,
        },
        snapshot,
    }))
}

/// Apply a user-confirmed plan to the given state.
pub async fn commit_plan(
    State(state): State<Arc<AllocatorState>>,
    Json(request): Json<CommitRequest>,
) -> ApiResult<CommitOutcome> {
    let epsilon = state.planner.config().price_epsilon;
    Ok(Json(state::commit(&request.state, &request.plan, epsilon)))
}

/// List banned zones for a ticker.
pub async fn list_banned_zones(
    State(state): State<Arc<AllocatorState>>,
    Path(ticker): Path<String>,
) -> Json<ZonesResponse> {
    let zones = state.zones.read().await.zones(&ticker);
    Json(ZonesResponse { ticker, zones })
}

/// Ban a price band for a ticker.
pub async fn ban_price(
    State(state): State<Arc<AllocatorState>>,
    Json(request): Json<BanRequest>,
) -> Result<(StatusCode, Json<BannedZone>), ApiError> {
    if request.ticker.trim().is_empty() {
        return Err(ladder_common::Error::InvalidInput("ticker must not be empty".into()).into());
    }
    if !(request.price.is_finite() && request.price > 0.0) {
        return Err(ladder_common::Error::InvalidInput(format!(
            "price must be positive, got {}",
            request.price
        ))
        .into());
    }

    let zone = state
        .zones
        .write()
        .await
        .ban(&request.ticker, request.price, &request.reason);
    Ok((StatusCode::CREATED, Json(zone)))
}
