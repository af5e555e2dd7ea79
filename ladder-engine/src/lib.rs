//! Ladder Engine - rule-based portfolio allocation.
//!
//! Given a snapshot of held assets, open limit orders, cash, and per-asset
//! technical indicators, the engine classifies each asset into a market
//! phase and emits a deterministic plan: core-position trims or exits, new
//! limit-buy rungs, cancellations of existing rungs, and staged profit-taking
//! exits, while keeping a consistent dry-powder ledger.
//!
//! Planning is a pure synchronous computation. The HTTP service in this
//! crate is a thin surface over [`planner::AllocationPlanner`].

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod ingest;
pub mod phase;
pub mod planner;
pub mod policy;
pub mod regime;
pub mod routes;
pub mod rungs;
pub mod state;
pub mod strategy;
pub mod types;
pub mod zones;

pub use config::AllocatorConfig;
pub use error::EngineError;
pub use planner::{AllocationPlanner, DryPowderLedger};
pub use types::{AllocationPlan, AssetSnapshot, PortfolioSnapshot};
pub use zones::{BannedZoneStore, InMemoryBannedZones};

use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use ladder_common::config::Config;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::limit::RequestBodyLimitLayer;

/// Largest accepted request body.
const MAX_BODY_BYTES: usize = 4 * 1024 * 1024;

/// Shared service state.
///
/// Banned zones are the only mutable state and have a single writer: the
/// ban endpoint.
pub struct AllocatorState {
    pub config: Config,
    pub planner: AllocationPlanner,
    pub zones: Arc<RwLock<InMemoryBannedZones>>,
}

impl AllocatorState {
    pub fn new(config: Config, allocator: AllocatorConfig) -> Self {
        let zones = InMemoryBannedZones::new(allocator.banned_zone_tolerance_pct);
        Self {
            config,
            planner: AllocationPlanner::new(allocator),
            zones: Arc::new(RwLock::new(zones)),
        }
    }
}

/// Build the application router.
pub fn build_router(state: Arc<AllocatorState>) -> Router {
    Router::new()
        .route("/health", get(routes::health))
        .route("/api/v1/plan", post(routes::create_plan))
        .route("/api/v1/plan/market", post(routes::create_market_plan))
        .route("/api/v1/commit", post(routes::commit_plan))
        .route("/api/v1/banned-zones", post(routes::ban_price))
        .route("/api/v1/banned-zones/:ticker", get(routes::list_banned_zones))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .with_state(state)
}

pub struct AllocatorService {
    state: Arc<AllocatorState>,
}

impl AllocatorService {
    pub fn new(config: Config, allocator: AllocatorConfig) -> Self {
        Self {
            state: Arc::new(AllocatorState::new(config, allocator)),
        }
    }

    pub fn router(&self) -> Router {
        build_router(Arc::clone(&self.state))
    }

    pub async fn start(self) -> Result<()> {
        let addr: SocketAddr = self.state.config.bind_address().parse()?;
        let app = self.router();

        tracing::info!(address = %addr, "Starting HTTP server");
        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("Server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
