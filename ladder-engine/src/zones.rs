//! Banned-zone memory.
//!
//! A banned zone is a price band around a rejected fill. Rungs are never
//! proposed inside one. The engine only reads the store; writes happen on
//! explicit user actions.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::state::UserState;

/// Closed price interval excluded from rung placement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BannedZone {
    pub min: f64,
    pub max: f64,
    pub reason: String,
}

impl BannedZone {
    pub fn around(price: f64, tolerance_pct: f64, reason: impl Into<String>) -> Self {
        let tol = tolerance_pct / 100.0;
        Self {
            min: price * (1.0 - tol),
            max: price * (1.0 + tol),
            reason: reason.into(),
        }
    }

    pub fn contains(&self, price: f64) -> bool {
        price >= self.min && price <= self.max
    }
}

/// Store of banned zones per ticker.
pub trait BannedZoneStore {
    fn is_banned(&self, ticker: &str, price: f64) -> bool;

    /// Record a zone around `price` and return it.
    fn ban(&mut self, ticker: &str, price: f64, reason: &str) -> BannedZone;

    fn zones(&self, ticker: &str) -> Vec<BannedZone>;
}

/// In-memory store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBannedZones {
    tolerance_pct: f64,
    zones: HashMap<String, Vec<BannedZone>>,
}

impl InMemoryBannedZones {
    pub fn new(tolerance_pct: f64) -> Self {
        Self {
            tolerance_pct,
            zones: HashMap::new(),
        }
    }

    /// Seed from persisted rejections and blacklist entries.
    pub fn from_user_state(state: &UserState, tolerance_pct: f64) -> Self {
        let mut store = Self::new(tolerance_pct);
        store.seed(state);
        store
    }

    /// Add zones for every rejected rung and blacklist entry in `state`.
    pub fn seed(&mut self, state: &UserState) {
        let entries = state.rejected_rungs.iter().chain(&state.blacklist);
        for (ticker, prices) in entries {
            for entry in prices {
                self.ban(ticker, entry.price, &entry.reason);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.zones.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl BannedZoneStore for InMemoryBannedZones {
    fn is_banned(&self, ticker: &str, price: f64) -> bool {
        self.zones
            .get(ticker)
            .is_some_and(|zones| zones.iter().any(|z| z.contains(price)))
    }

    fn ban(&mut self, ticker: &str, price: f64, reason: &str) -> BannedZone {
        let zone = BannedZone::around(price, self.tolerance_pct, reason);
        tracing::info!(
            ticker = %ticker,
            min = zone.min,
            max = zone.max,
            reason = %reason,
            "Banned zone recorded"
        );
        self.zones
            .entry(ticker.to_string())
            .or_default()
            .push(zone.clone());
        zone
    }

    fn zones(&self, ticker: &str) -> Vec<BannedZone> {
        self.zones.get(ticker).cloned().unwrap_or_default()
    }
}
