//! Persisted user state and plan commit.
//!
//! The engine never applies its own plans. [`commit`] is called only after
//! the user confirms a plan and always returns a new state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

use crate::error::EngineError;
use crate::types::{AllocationPlan, CoreAction, PendingOrder, Probability, RungStatus};

/// An open limit buy order as stored by the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimitOrder {
    pub price: f64,
    #[serde(alias = "shares")]
    pub size: u64,
    #[serde(default)]
    pub probability: Probability,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl LimitOrder {
    pub fn to_pending(&self) -> PendingOrder {
        PendingOrder::new(self.price, self.size, self.probability)
    }
}

/// A price the user never wants to buy at again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BannedPrice {
    pub price: f64,
    #[serde(default)]
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejected_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserState {
    #[serde(default)]
    pub cash: f64,
    #[serde(default, deserialize_with = "deserialize_holdings")]
    pub holdings: BTreeMap<String, u64>,
    #[serde(default)]
    pub limits: BTreeMap<String, Vec<LimitOrder>>,
    #[serde(default)]
    pub blacklist: BTreeMap<String, Vec<BannedPrice>>,
    /// Permanent rejection memory, seeds banned zones
    #[serde(default, alias = "rejectedRungs")]
    pub rejected_rungs: BTreeMap<String, Vec<BannedPrice>>,
}

/// Holdings are either a bare share count or `{ "shares": n }`.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawHolding {
    Count(f64),
    Detailed { shares: f64 },
}

fn deserialize_holdings<'de, D>(deserializer: D) -> Result<BTreeMap<String, u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = BTreeMap::<String, RawHolding>::deserialize(deserializer)?;
    raw.into_iter()
        .map(|(ticker, holding)| {
            let shares = match holding {
                RawHolding::Count(n) | RawHolding::Detailed { shares: n } => n,
            };
            if !shares.is_finite() || shares < 0.0 {
                return Err(serde::de::Error::custom(format!(
                    "holding for {ticker} must be a non-negative share count, got {shares}"
                )));
            }
            Ok((ticker, shares.floor() as u64))
        })
        .collect()
}

impl UserState {
    /// Parse persisted state.
    ///
    /// Absent or blank input is `Ok(None)`; anything unparseable is an
    /// error, never a partially recovered state.
    pub fn parse(raw: Option<&str>) -> Result<Option<Self>, EngineError> {
        let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
            return Ok(None);
        };
        serde_json::from_str(raw)
            .map(Some)
            .map_err(|e| EngineError::InvalidState(e.to_string()))
    }

    pub fn shares(&self, ticker: &str) -> u64 {
        self.holdings.get(ticker).copied().unwrap_or(0)
    }

    pub fn pending_orders(&self, ticker: &str) -> Vec<PendingOrder> {
        self.limits
            .get(ticker)
            .map(|orders| orders.iter().map(LimitOrder::to_pending).collect())
            .unwrap_or_default()
    }

    /// Record a permanent rejection at `price`.
    pub fn reject_rung(&mut self, ticker: &str, price: f64, reason: impl Into<String>) {
        let reason = reason.into();
        tracing::info!(ticker = %ticker, price, reason = %reason, "Rung rejected by user");
        self.rejected_rungs
            .entry(ticker.to_string())
            .or_default()
            .push(BannedPrice {
                price,
                reason,
                rejected_at: Some(Utc::now()),
            });
    }
}

/// New state plus a log of what changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitOutcome {
    pub state: UserState,
    pub applied: Vec<String>,
}

/// Apply a confirmed plan to a copy of `state`.
///
/// EXIT zeroes the holding, a trim reduces it, CANCEL removes the first
/// matching limit (price within `epsilon`, exact size), NEW appends one.
pub fn commit(state: &UserState, plan: &AllocationPlan, epsilon: f64) -> CommitOutcome {
    let mut next = state.clone();
    let mut applied = Vec::new();

    for (ticker, asset_plan) in &plan.asset_plans {
        let held = next.shares(ticker);

        if asset_plan.core_action == CoreAction::Exit && held > 0 {
            next.holdings.insert(ticker.clone(), 0);
            applied.push(format!("{ticker}: exit {held} shares"));
        } else if let Some(trim) = &asset_plan.core_trim {
            let remaining = held.saturating_sub(trim.shares);
            next.holdings.insert(ticker.clone(), remaining);
            applied.push(format!(
                "{ticker}: trim {} shares ({held} -> {remaining})",
                held - remaining
            ));
        }

        for rung in &asset_plan.ladder {
            match rung.status {
                RungStatus::Cancel => {
                    let Some(limits) = next.limits.get_mut(ticker) else {
                        continue;
                    };
                    if let Some(idx) = limits.iter().position(|l| {
                        (l.price - rung.price).abs() < epsilon && l.size == rung.shares
                    }) {
                        limits.remove(idx);
                        applied.push(format!(
                            "{ticker}: cancel {} @ {:.2}",
                            rung.shares, rung.price
                        ));
                    }
                }
                RungStatus::New => {
                    next.limits
                        .entry(ticker.clone())
                        .or_default()
                        .push(LimitOrder {
                            price: rung.price,
                            size: rung.shares,
                            probability: rung.probability,
                            note: Some(rung.reason.clone()),
                        });
                    applied.push(format!(
                        "{ticker}: place {} @ {:.2} ({})",
                        rung.shares, rung.price, rung.probability
                    ));
                }
                RungStatus::Keep => {}
            }
        }
    }

    next.limits.retain(|_, orders| !orders.is_empty());

    tracing::info!(changes = applied.len(), "Plan committed");
    CommitOutcome {
        state: next,
        applied,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_absent_and_blank() {
        assert_eq!(UserState::parse(None).unwrap(), None);
        assert_eq!(UserState::parse(Some("   ")).unwrap(), None);
    }

    #[test]
    fn test_parse_malformed_is_invalid_state() {
        let err = UserState::parse(Some("{ holdings: ")).unwrap_err();
        assert!(matches!(err, EngineError::InvalidState(_)));
    }

    #[test]
    fn test_parse_holding_shapes() {
        let raw = r#"{
            "cash": 5000,
            "holdings": { "AAPL": 100, "NVDA": { "shares": 25 } },
            "limits": { "AAPL": [{ "price": 150.0, "size": 10 }] },
            "rejectedRungs": { "SMCI": [{ "price": 40.0, "reason": "bad fill" }] }
        }"#;
        let state = UserState::parse(Some(raw)).unwrap().unwrap();
        assert_eq!(state.shares("AAPL"), 100);
        assert_eq!(state.shares("NVDA"), 25);
        assert_eq!(state.shares("MSFT"), 0);
        assert_eq!(state.limits["AAPL"][0].probability, Probability::P30);
        assert_eq!(state.rejected_rungs["SMCI"][0].reason, "bad fill");
        assert_eq!(state.pending_orders("AAPL")[0].cost(), 1500.0);
    }

    #[test]
    fn test_negative_holding_rejected() {
        let raw = r#"{ "holdings": { "AAPL": -5 } }"#;
        assert!(matches!(
            UserState::parse(Some(raw)),
            Err(EngineError::InvalidState(_))
        ));
    }

    #[test]
    fn test_reject_rung_appends() {
        let mut state = UserState::default();
        state.reject_rung("SMCI", 40.0, "bad fill");
        state.reject_rung("SMCI", 35.0, "too deep");
        assert_eq!(state.rejected_rungs["SMCI"].len(), 2);
        assert!(state.rejected_rungs["SMCI"][0].rejected_at.is_some());
    }
}
