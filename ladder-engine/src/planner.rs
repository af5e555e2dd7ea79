//! Allocation planning.
//!
//! One call to [`AllocationPlanner::plan`] consumes one immutable
//! [`PortfolioSnapshot`] and produces one [`AllocationPlan`]:
//!
//! 1. benchmark snapshot → [`regime::analyze`] → [`GlobalRegime`]
//! 2. per asset, in ticker order: strategy detect → policy decide → [`Action`]
//! 3. reconcile the action against pending orders, threading a
//!    [`DryPowderLedger`] from asset to asset
//!
//! The planner holds no mutable state between calls.

use std::collections::BTreeMap;

use crate::config::AllocatorConfig;
use crate::error::EngineError;
use crate::phase::MarketMetrics;
use crate::policy::{self, PolicyContext};
use crate::regime;
use crate::rungs::RungGenerator;
use crate::strategy;
use crate::types::{
    Action, AllocationPlan, AssetPlan, AssetSnapshot, AssetType, CoreAction, GlobalRegime,
    GlobalSummary, Phase, PhaseClassification, PortfolioSnapshot, PositionInfo, RejectionReason,
    Rung, RungRejection, RungStatus, SkippedAsset,
};
use crate::zones::BannedZoneStore;

/// Tolerance for ledger bookkeeping.
const LEDGER_EPSILON: f64 = 1e-6;

// ============================================================================
// Dry Powder Ledger
// ============================================================================

/// Cash accounting threaded through per-asset processing.
///
/// `total_pool` is fixed at open: free cash plus the cost already held by
/// pending orders. Cancels release cost back into dry powder, new rungs
/// reserve it. `deployed` is always `total_pool - dry_powder`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DryPowderLedger {
    initial_cash: f64,
    total_pool: f64,
    dry_powder: f64,
    /// Cost reserved by new rungs this cycle
    reserved: f64,
    bootstrap_limit: f64,
}

impl DryPowderLedger {
    pub fn open(cash: f64, pending_cost: f64, bootstrap_cap: f64) -> Self {
        Self {
            initial_cash: cash,
            total_pool: cash + pending_cost,
            dry_powder: cash,
            reserved: 0.0,
            bootstrap_limit: cash * bootstrap_cap,
        }
    }

    pub fn initial_cash(&self) -> f64 {
        self.initial_cash
    }

    pub fn total_pool(&self) -> f64 {
        self.total_pool
    }

    pub fn dry_powder(&self) -> f64 {
        self.dry_powder
    }

    pub fn deployed(&self) -> f64 {
        self.total_pool - self.dry_powder
    }

    /// Return a cancelled order's cost to dry powder.
    #[must_use]
    pub fn release(self, cost: f64) -> Self {
        let next = Self {
            dry_powder: (self.dry_powder + cost).min(self.total_pool),
            ..self
        };
        next.debug_check();
        next
    }

    /// Reserve cash for a new rung.
    pub fn try_reserve(self, cost: f64) -> Result<Self, RejectionReason> {
        if cost > self.dry_powder + LEDGER_EPSILON {
            return Err(RejectionReason::InsufficientDryPowder);
        }
        if self.reserved + cost > self.bootstrap_limit + LEDGER_EPSILON {
            return Err(RejectionReason::BootstrapCap);
        }
        let next = Self {
            dry_powder: (self.dry_powder - cost).max(0.0),
            reserved: self.reserved + cost,
            ..self
        };
        next.debug_check();
        Ok(next)
    }

    fn debug_check(&self) {
        debug_assert!(
            self.dry_powder >= -LEDGER_EPSILON
                && self.dry_powder <= self.total_pool + LEDGER_EPSILON,
            "dry powder {} outside [0, {}]",
            self.dry_powder,
            self.total_pool
        );
    }
}

// ============================================================================
// Reconciliation
// ============================================================================

/// Merge an action with the asset's pending orders.
///
/// Each pending order is matched against the action's cancellations by
/// price within `epsilon` and exact size; a matched order is CANCEL and its
/// cost is released, an unmatched one is KEEP. New rungs are then reserved
/// one by one; a rung the ledger refuses becomes a rejection.
pub fn reconcile(
    ledger: DryPowderLedger,
    asset: &AssetSnapshot,
    asset_type: AssetType,
    classification: PhaseClassification,
    action: Action,
    epsilon: f64,
) -> (DryPowderLedger, AssetPlan) {
    let ticker = asset.ticker.as_str();
    let mut ledger = ledger;
    let mut ladder = Vec::with_capacity(asset.pending_orders.len() + action.new_rungs.len());
    let mut rejections = action.rejections;

    let mut cancels: Vec<Option<Rung>> = action
        .modified_rungs
        .into_iter()
        .filter(|r| r.status == RungStatus::Cancel)
        .map(Some)
        .collect();

    for order in &asset.pending_orders {
        let matched = cancels.iter_mut().find_map(|slot| {
            if slot
                .as_ref()
                .is_some_and(|r| r.matches(order.price, order.shares, epsilon))
            {
                slot.take()
            } else {
                None
            }
        });

        match matched {
            Some(cancel) => {
                ledger = ledger.release(order.cost());
                ladder.push(cancel);
            }
            None => ladder.push(Rung::kept(order)),
        }
    }

    for rung in action.new_rungs {
        match ledger.try_reserve(rung.cost()) {
            Ok(next) => {
                ledger = next;
                ladder.push(rung);
            }
            Err(reason) => {
                tracing::warn!(
                    ticker = %ticker,
                    price = rung.price,
                    shares = rung.shares,
                    dry_powder = ledger.dry_powder(),
                    reason = %reason,
                    "Rung rejected by ledger"
                );
                rejections.push(RungRejection::new(ticker, rung.price, rung.shares, reason));
            }
        }
    }

    let plan = AssetPlan {
        ticker: asset.ticker.clone(),
        asset_type,
        price: asset.price,
        regime: classification,
        core_action: action.core_action,
        core_trim: action.core_trim,
        ladder,
        meltup_exits: action.meltup_exits,
        position: PositionInfo {
            shares: asset.position_shares,
            value: asset.position_value(),
        },
        rejected_rungs: rejections,
    };

    (ledger, plan)
}

// ============================================================================
// Planner
// ============================================================================

/// Turns portfolio snapshots into allocation plans.
#[derive(Debug, Clone, Default)]
pub struct AllocationPlanner {
    config: AllocatorConfig,
}

impl AllocationPlanner {
    pub fn new(config: AllocatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AllocatorConfig {
        &self.config
    }

    /// Whether `ticker` receives an asset plan.
    fn is_planned(&self, ticker: &str) -> bool {
        let universe = &self.config.universe;
        !universe.is_benchmark(ticker) && !universe.is_banned(ticker)
    }

    /// Generate one plan.
    ///
    /// Fails only when the snapshot as a whole is unusable. An asset with
    /// malformed numbers is skipped and reported; its pending orders are
    /// left out of the pool. A missing benchmark degrades RESET gating but
    /// never aborts the cycle.
    pub fn plan(
        &self,
        snapshot: &PortfolioSnapshot,
        zones: &dyn BannedZoneStore,
    ) -> Result<AllocationPlan, EngineError> {
        snapshot.validate()?;

        let universe = &self.config.universe;
        let mut skipped_assets = Vec::new();
        let assets: Vec<&AssetSnapshot> = snapshot
            .assets
            .values()
            .filter(|asset| match asset.validate() {
                Ok(()) => true,
                Err(err) => {
                    tracing::warn!(ticker = %asset.ticker, error = %err, "Skipping malformed asset");
                    skipped_assets.push(SkippedAsset {
                        ticker: asset.ticker.clone(),
                        reason: err.to_string(),
                    });
                    false
                }
            })
            .collect();

        let benchmark = assets
            .iter()
            .copied()
            .find(|a| universe.is_benchmark(&a.ticker));
        let global_regime = regime::analyze(benchmark, &self.config.regime);

        let pending_cost: f64 = assets
            .iter()
            .filter(|a| self.is_planned(&a.ticker))
            .map(|a| a.pending_cost())
            .sum();
        let mut ledger = DryPowderLedger::open(
            snapshot.cash_available,
            pending_cost,
            self.config.bootstrap_cap,
        );

        let mut asset_plans = BTreeMap::new();
        for asset in assets {
            let ticker = &asset.ticker;
            if universe.is_benchmark(ticker) {
                continue;
            }
            if universe.is_banned(ticker) {
                tracing::debug!(ticker = %ticker, "Skipping banned ticker");
                continue;
            }

            let (next, plan) = self.plan_asset(ledger, asset, &global_regime, zones);
            ledger = next;
            asset_plans.insert(ticker.clone(), plan);
        }

        let rejected_rungs: Vec<RungRejection> = asset_plans
            .values()
            .flat_map(|p: &AssetPlan| p.rejected_rungs.iter().cloned())
            .collect();

        let global = GlobalSummary {
            total_pool: ledger.total_pool(),
            initial_cash: ledger.initial_cash(),
            deployed_value: ledger.deployed(),
            dry_powder: ledger.dry_powder(),
            regime: global_regime,
        };
        let summary = summarize(&asset_plans, &global);

        tracing::info!(
            assets = asset_plans.len(),
            skipped = skipped_assets.len(),
            regime = %global.regime.regime,
            total_pool = global.total_pool,
            deployed = global.deployed_value,
            dry_powder = global.dry_powder,
            rejected = rejected_rungs.len(),
            "{summary}"
        );

        Ok(AllocationPlan {
            asset_plans,
            global,
            rejected_rungs,
            skipped_assets,
            summary,
        })
    }

    fn plan_asset(
        &self,
        ledger: DryPowderLedger,
        asset: &AssetSnapshot,
        global_regime: &GlobalRegime,
        zones: &dyn BannedZoneStore,
    ) -> (DryPowderLedger, AssetPlan) {
        let asset_type = self.config.universe.classify(&asset.ticker);
        let strategy = strategy::for_type(asset_type);
        let metrics = MarketMetrics::from_snapshot(asset);
        let classification = strategy.detect(&asset.ticker, &metrics, global_regime, &self.config);

        let ctx = PolicyContext {
            asset,
            asset_type,
            metrics: &metrics,
            classification: &classification,
            dry_powder: ledger.dry_powder(),
            total_pool: ledger.total_pool(),
            config: &self.config,
            rungs: RungGenerator::new(&self.config, zones),
        };
        let action = policy::decide(strategy, &ctx);

        reconcile(
            ledger,
            asset,
            asset_type,
            classification,
            action,
            self.config.price_epsilon,
        )
    }
}

/// One-line digest of a plan.
fn summarize(plans: &BTreeMap<String, AssetPlan>, global: &GlobalSummary) -> String {
    let mut phases: BTreeMap<Phase, usize> = BTreeMap::new();
    let mut trims = 0;
    let mut exits = 0;
    let mut new_rungs = 0;
    let mut cancels = 0;

    for plan in plans.values() {
        *phases.entry(plan.regime.phase).or_default() += 1;
        if plan.core_action == CoreAction::Exit {
            exits += 1;
        } else if plan.core_trim.is_some() {
            trims += 1;
        }
        new_rungs += plan.rungs_with_status(RungStatus::New).count();
        cancels += plan.rungs_with_status(RungStatus::Cancel).count();
    }

    let phases = phases
        .iter()
        .map(|(phase, n)| format!("{phase} {n}"))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "Market {} | {} assets ({}) | {} exits, {} trims | {} new rungs, {} cancels | dry powder ${:.2} of ${:.2}",
        global.regime.regime,
        plans.len(),
        if phases.is_empty() { "none".to_string() } else { phases },
        exits,
        trims,
        new_rungs,
        cancels,
        global.dry_powder,
        global.total_pool
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Indicators, PendingOrder, Probability};
    use crate::zones::InMemoryBannedZones;

    fn asset(ticker: &str, price: f64, orders: Vec<PendingOrder>) -> AssetSnapshot {
        AssetSnapshot {
            ticker: ticker.into(),
            price,
            indicators: Indicators {
                rsi: 50.0,
                sma200: price,
                ema20: price,
                volume: 1.0,
                volume_avg20: 1.0,
                drawdown_60d: 0.0,
                change_24h_pct: None,
            },
            position_shares: 0,
            pending_orders: orders,
        }
    }

    #[test]
    fn test_ledger_release_and_reserve() {
        let ledger = DryPowderLedger::open(1_000.0, 500.0, 0.40);
        assert_eq!(ledger.total_pool(), 1_500.0);
        assert_eq!(ledger.deployed(), 500.0);

        let ledger = ledger.release(500.0);
        assert_eq!(ledger.dry_powder(), 1_500.0);
        assert_eq!(ledger.deployed(), 0.0);

        let ledger = ledger.try_reserve(300.0).unwrap();
        assert_eq!(ledger.dry_powder(), 1_200.0);
        assert_eq!(ledger.deployed(), 300.0);
    }

    #[test]
    fn test_ledger_bootstrap_cap() {
        let ledger = DryPowderLedger::open(1_000.0, 0.0, 0.40);
        let ledger = ledger.try_reserve(350.0).unwrap();
        assert_eq!(
            ledger.try_reserve(100.0),
            Err(RejectionReason::BootstrapCap)
        );
        assert!(ledger.try_reserve(50.0).is_ok());
    }

    #[test]
    fn test_ledger_insufficient_dry_powder() {
        let ledger = DryPowderLedger::open(100.0, 0.0, 1.0);
        assert_eq!(
            ledger.try_reserve(150.0),
            Err(RejectionReason::InsufficientDryPowder)
        );
    }

    #[test]
    fn test_reconcile_matches_each_order_once() {
        let orders = vec![
            PendingOrder::new(90.0, 10, Probability::P60),
            PendingOrder::new(90.0, 10, Probability::P60),
        ];
        let a = asset("AAPL", 100.0, orders.clone());
        let mut action = Action::hold(Phase::Normal);
        action.modified_rungs = vec![Rung::cancelled(&orders[0], "cancel one")];

        let ledger = DryPowderLedger::open(1_000.0, a.pending_cost(), 0.40);
        let (ledger, plan) = reconcile(
            ledger,
            &a,
            AssetType::Stock,
            PhaseClassification::new(Phase::Normal, "test"),
            action,
            0.01,
        );

        assert_eq!(plan.rungs_with_status(RungStatus::Cancel).count(), 1);
        assert_eq!(plan.rungs_with_status(RungStatus::Keep).count(), 1);
        assert!((ledger.dry_powder() - 1_900.0).abs() < 1e-9);
    }

    #[test]
    fn test_reconcile_size_must_match_exactly() {
        let a = asset("AAPL", 100.0, vec![PendingOrder::new(90.0, 10, Probability::P30)]);
        let mut action = Action::hold(Phase::Normal);
        action.modified_rungs = vec![Rung::cancelled(
            &PendingOrder::new(90.001, 11, Probability::P30),
            "different size",
        )];

        let ledger = DryPowderLedger::open(0.0, a.pending_cost(), 0.40);
        let (after, plan) = reconcile(
            ledger,
            &a,
            AssetType::Stock,
            PhaseClassification::new(Phase::Normal, "test"),
            action,
            0.01,
        );
        assert_eq!(plan.ladder[0].status, RungStatus::Keep);
        assert_eq!(after, ledger);
    }

    #[test]
    fn test_reconcile_rejects_over_budget_rungs() {
        let a = asset("AAPL", 100.0, vec![]);
        let mut action = Action::hold(Phase::Reset);
        action.new_rungs = vec![
            Rung::proposed(80.0, 4, Probability::P30, "fits"),
            Rung::proposed(70.0, 2, Probability::P5, "over the cap"),
        ];

        let ledger = DryPowderLedger::open(1_000.0, 0.0, 0.40);
        let (ledger, plan) = reconcile(
            ledger,
            &a,
            AssetType::Stock,
            PhaseClassification::new(Phase::Reset, "test"),
            action,
            0.01,
        );

        assert_eq!(plan.ladder.len(), 1);
        assert_eq!(plan.rejected_rungs.len(), 1);
        assert_eq!(plan.rejected_rungs[0].reason, RejectionReason::BootstrapCap);
        assert!((ledger.dry_powder() - 680.0).abs() < 1e-9);
    }

    #[test]
    fn test_plan_skips_benchmark_and_banned() {
        let snapshot = PortfolioSnapshot::new(10_000.0)
            .with_asset(asset("SPY", 500.0, vec![]))
            .with_asset(asset("ETH", 3_000.0, vec![]))
            .with_asset(asset("AAPL", 100.0, vec![]));
        let zones = InMemoryBannedZones::new(3.0);
        let plan = AllocationPlanner::default().plan(&snapshot, &zones).unwrap();

        assert_eq!(plan.asset_plans.len(), 1);
        assert!(plan.asset_plans.contains_key("AAPL"));
        assert!(plan.summary.contains("1 assets"));
    }

    #[test]
    fn test_plan_without_benchmark_still_plans() {
        let snapshot = PortfolioSnapshot::new(10_000.0).with_asset(asset("AAPL", 100.0, vec![]));
        let zones = InMemoryBannedZones::new(3.0);
        let plan = AllocationPlanner::default().plan(&snapshot, &zones).unwrap();

        assert!(!plan.global.regime.allow_reset);
        assert_eq!(plan.asset_plans["AAPL"].regime.phase, Phase::Normal);
        assert_eq!(plan.global.dry_powder, 10_000.0);
    }

    #[test]
    fn test_monitor_only_keeps_orders() {
        let snapshot = PortfolioSnapshot::new(10_000.0).with_asset(asset(
            "GOOG",
            100.0,
            vec![PendingOrder::new(90.0, 10, Probability::P80)],
        ));
        let zones = InMemoryBannedZones::new(3.0);
        let plan = AllocationPlanner::default().plan(&snapshot, &zones).unwrap();

        let goog = &plan.asset_plans["GOOG"];
        assert_eq!(goog.core_action, CoreAction::Monitor);
        assert_eq!(goog.ladder.len(), 1);
        assert_eq!(goog.ladder[0].status, RungStatus::Keep);
        assert_eq!(plan.global.deployed_value, 900.0);
    }

    #[test]
    fn test_malformed_asset_is_skipped() {
        let broken = asset(
            "AMD",
            0.0,
            vec![PendingOrder::new(50.0, 10, Probability::P30)],
        );
        let snapshot = PortfolioSnapshot::new(10_000.0)
            .with_asset(broken)
            .with_asset(asset("MSFT", 100.0, vec![]));
        let zones = InMemoryBannedZones::new(3.0);
        let plan = AllocationPlanner::default().plan(&snapshot, &zones).unwrap();

        assert!(plan.asset_plans.contains_key("MSFT"));
        assert!(!plan.asset_plans.contains_key("AMD"));
        assert_eq!(plan.skipped_assets.len(), 1);
        assert_eq!(plan.skipped_assets[0].ticker, "AMD");
        assert!(plan.skipped_assets[0].reason.contains("price"));
        // The skipped asset's order is not part of the pool
        assert_eq!(plan.global.total_pool, 10_000.0);
    }

    #[test]
    fn test_invalid_snapshot_is_an_error() {
        let snapshot = PortfolioSnapshot::new(f64::NAN);
        let zones = InMemoryBannedZones::new(3.0);
        assert!(matches!(
            AllocationPlanner::default().plan(&snapshot, &zones),
            Err(EngineError::InvalidSnapshot(_))
        ));
    }
}
