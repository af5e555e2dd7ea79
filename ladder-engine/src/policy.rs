//! Phase action policy.
//!
//! Maps a classified asset to a concrete [`Action`]: trim, exit, new rungs,
//! cancellations, or a staged exit ladder. The per-phase builders here are
//! shared by the stock and crypto strategies; small caps compose their own
//! from the same helpers.

use crate::config::{AllocatorConfig, ExitStep};
use crate::phase::MarketMetrics;
use crate::rungs::{RungBatch, RungGenerator};
use crate::strategy::AssetStrategy;
use crate::types::{
    Action, AssetSnapshot, AssetType, CoreAction, CoreTrim, ExitTier, PendingOrder, Phase,
    PhaseClassification, Rung,
};

/// Everything a strategy sees when deciding one asset.
pub struct PolicyContext<'a> {
    pub asset: &'a AssetSnapshot,
    pub asset_type: AssetType,
    pub metrics: &'a MarketMetrics,
    pub classification: &'a PhaseClassification,
    /// Dry powder at the moment this asset is processed
    pub dry_powder: f64,
    pub total_pool: f64,
    pub config: &'a AllocatorConfig,
    pub rungs: RungGenerator<'a>,
}

impl PolicyContext<'_> {
    pub fn phase(&self) -> Phase {
        self.classification.phase
    }
}

/// Decide the action for one asset.
///
/// Monitor-only assets never generate orders, whatever their phase.
pub fn decide(strategy: &dyn AssetStrategy, ctx: &PolicyContext<'_>) -> Action {
    let ticker = ctx.asset.ticker.as_str();

    let action = if ctx.config.universe.is_monitor_only(ticker) {
        Action::monitor(ctx.phase())
    } else {
        strategy.decide(ctx)
    };

    tracing::debug!(
        ticker = %ticker,
        phase = %action.phase,
        core_action = %action.core_action,
        trim = action.core_trim.as_ref().map_or(0, |t| t.shares),
        new_rungs = action.new_rungs.len(),
        cancels = action.modified_rungs.len(),
        "Action decided"
    );

    action
}

// ============================================================================
// Helpers
// ============================================================================

/// Trim `fraction` of `shares`, or nothing when that rounds down to zero.
pub fn trim(shares: u64, fraction: f64, reason: impl Into<String>) -> Option<CoreTrim> {
    let trimmed = (shares as f64 * fraction).floor() as u64;
    (trimmed > 0).then(|| CoreTrim {
        shares: trimmed.min(shares),
        reason: reason.into(),
    })
}

pub fn cancel_all(orders: &[PendingOrder], reason: &str) -> Vec<Rung> {
    cancel_where(orders, |_| true, reason)
}

pub fn cancel_where<F>(orders: &[PendingOrder], predicate: F, reason: &str) -> Vec<Rung>
where
    F: Fn(&PendingOrder) -> bool,
{
    orders
        .iter()
        .filter(|o| predicate(o))
        .map(|o| Rung::cancelled(o, reason))
        .collect()
}

/// Staged sells at multiples of `price`; zero-share tiers are dropped.
pub fn exit_ladder(shares: u64, price: f64, steps: &[ExitStep], label: &str) -> Vec<ExitTier> {
    steps
        .iter()
        .map(|step| ExitTier {
            price: price * step.multiple,
            shares: (shares as f64 * step.fraction).floor() as u64,
            reason: format!("{label} (+{:.0}%)", (step.multiple - 1.0) * 100.0),
        })
        .filter(|tier| tier.shares > 0)
        .collect()
}

fn with_batch(mut action: Action, batch: RungBatch) -> Action {
    action.new_rungs.extend(batch.rungs);
    action.rejections.extend(batch.rejections);
    action
}

// ============================================================================
// Phase Builders
// ============================================================================

/// Full exit and cancel everything.
pub fn catastrophic_exit(ctx: &PolicyContext<'_>) -> Action {
    let asset = ctx.asset;
    let mut action = Action::hold(Phase::Catastrophic);
    action.core_action = CoreAction::Exit;
    action.core_trim = trim(asset.position_shares, 1.0, "Catastrophic breakdown - Full exit");
    action.modified_rungs = cancel_all(&asset.pending_orders, "Catastrophic phase - Cancel all");
    action
}

/// Staged exit, cancel all buys, and trim 70% past the RSI trigger.
pub fn parabolic(ctx: &PolicyContext<'_>) -> Action {
    let asset = ctx.asset;
    let policy = &ctx.config.policy;
    let mut action = Action::hold(Phase::Parabolic);

    if ctx.metrics.rsi > policy.parabolic_trim_rsi {
        action.core_trim = trim(
            asset.position_shares,
            policy.parabolic_trim_fraction,
            format!(
                "PARABOLIC BLOWOFF (RSI > {:.0}) - Exit {:.0}%",
                policy.parabolic_trim_rsi,
                policy.parabolic_trim_fraction * 100.0
            ),
        );
    }
    action.meltup_exits = Some(exit_ladder(
        asset.position_shares,
        asset.price,
        &policy.parabolic_exits,
        "Parabolic exit",
    ));
    action.modified_rungs = cancel_all(&asset.pending_orders, "PARABOLIC - No buying at blowoff");
    action
}

/// Proactive trim above the floor, deeper rungs, cancel high-conviction rungs.
pub fn reset(ctx: &PolicyContext<'_>, trim_floor: f64) -> Action {
    let asset = ctx.asset;
    let metrics = ctx.metrics;
    let fraction = ctx.config.policy.reset_trim_fraction;
    let mut action = Action::hold(Phase::Reset);

    if metrics.price > metrics.sma200 * trim_floor {
        action.core_trim = trim(
            asset.position_shares,
            fraction,
            format!("RESET - Proactive {:.0}% derisking", fraction * 100.0),
        );
    }
    action.modified_rungs = cancel_where(
        &asset.pending_orders,
        |o| o.probability.is_high_conviction(),
        "RESET - Cancel high-conviction rungs",
    );

    let batch = ctx
        .rungs
        .dip_rungs(asset, metrics, ctx.asset_type, ctx.dry_powder);
    with_batch(action, batch)
}

/// Light trim only when RSI is extreme, staged exits, stop buying.
pub fn meltup(ctx: &PolicyContext<'_>, steps: &[ExitStep], label: &str) -> Action {
    let asset = ctx.asset;
    let policy = &ctx.config.policy;
    let mut action = Action::hold(Phase::Meltup);

    if ctx.metrics.rsi > policy.meltup_trim_rsi {
        action.core_trim = trim(
            asset.position_shares,
            policy.meltup_trim_fraction,
            format!(
                "MELTUP (RSI > {:.0}) - Proactive {:.0}% trim",
                policy.meltup_trim_rsi,
                policy.meltup_trim_fraction * 100.0
            ),
        );
    }
    action.meltup_exits = Some(exit_ladder(asset.position_shares, asset.price, steps, label));
    action.modified_rungs = cancel_all(&asset.pending_orders, "MELTUP - Stop buying");
    action
}

/// Fair-value entry and freeze of rungs too deep to matter.
pub fn ignition(ctx: &PolicyContext<'_>) -> Action {
    let asset = ctx.asset;
    let freeze_below = asset.price * ctx.config.policy.ignition_freeze_ratio;
    let mut action = Action::hold(Phase::Ignition);

    action.modified_rungs = cancel_where(
        &asset.pending_orders,
        |o| o.price < freeze_below,
        "IGNITION - Freeze deep rungs",
    );

    let batch = ctx.rungs.fair_value_rung(asset, ctx.metrics, ctx.dry_powder);
    with_batch(action, batch)
}

/// Hold; only low-conviction rungs may remain.
pub fn normal(ctx: &PolicyContext<'_>) -> Action {
    let mut action = Action::hold(Phase::Normal);
    action.modified_rungs = cancel_where(
        &ctx.asset.pending_orders,
        |o| o.probability.is_high_conviction(),
        "NORMAL - Only 30% and 5% allowed",
    );
    action
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PolicyConfig;
    use crate::types::Probability;

    #[test]
    fn test_trim_rounds_down() {
        assert_eq!(trim(1000, 0.35, "r").unwrap().shares, 350);
        assert_eq!(trim(9, 0.10, "r"), None);
        assert_eq!(trim(0, 1.0, "r"), None);
        assert_eq!(trim(7, 1.0, "r").unwrap().shares, 7);
    }

    #[test]
    fn test_exit_ladder_drops_empty_tiers() {
        let steps = PolicyConfig::default().stock_meltup_exits;
        let tiers = exit_ladder(20, 100.0, &steps, "Meltup exit");
        assert_eq!(tiers.len(), 5);
        assert_eq!(tiers[0].shares, 1);
        assert_eq!(tiers[4].shares, 10);
        assert!((tiers[0].price - 120.0).abs() < 1e-9);
        assert_eq!(tiers[0].reason, "Meltup exit (+20%)");

        let tiers = exit_ladder(10, 100.0, &steps, "Meltup exit");
        assert_eq!(tiers.len(), 4);
    }

    #[test]
    fn test_cancel_where() {
        let orders = vec![
            PendingOrder::new(95.0, 5, Probability::P80),
            PendingOrder::new(90.0, 5, Probability::P30),
            PendingOrder::new(85.0, 5, Probability::P60),
        ];
        let cancelled = cancel_where(&orders, |o| o.probability.is_high_conviction(), "x");
        assert_eq!(cancelled.len(), 2);
        assert!(cancelled.iter().all(|r| r.status == crate::types::RungStatus::Cancel));
        assert_eq!(cancel_all(&orders, "x").len(), 3);
    }
}
