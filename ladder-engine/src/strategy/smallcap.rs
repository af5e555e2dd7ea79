//! Capped small-cap strategy.
//!
//! Fails fast on any one of two breakdown conditions, derisks into strength
//! when overstretched, and otherwise ladders only inside capped buy zones.

use super::AssetStrategy;
use crate::config::{AllocatorConfig, SmallCapThresholds};
use crate::phase::{self, MarketMetrics, PhaseRule, RuleInput, Signals, Verdict};
use crate::policy::{self, PolicyContext};
use crate::types::{Action, CoreAction, GlobalRegime, Phase, PhaseClassification};

/// Small-cap phase table, highest priority first.
pub const RULES: &[PhaseRule<SmallCapThresholds>] = &[
    PhaseRule {
        name: "catastrophic",
        check: catastrophic,
    },
    PhaseRule {
        name: "reset",
        check: reset,
    },
    PhaseRule {
        name: "normal",
        check: phase::normal,
    },
];

/// Structure breakdown or violent selloff; either one suffices.
fn catastrophic(input: &RuleInput<'_, SmallCapThresholds>) -> Option<Verdict> {
    let m = input.metrics;
    let t = input.thresholds;
    let breakdown = m.pct_vs_sma200 < t.breakdown_pct_vs_sma200
        && m.rsi < t.breakdown_rsi
        && m.volume_ratio >= t.breakdown_volume_ratio;
    let selloff =
        m.change_24h_pct < t.selloff_change_24h_pct && m.volume_ratio >= t.selloff_volume_ratio;

    if breakdown {
        Some(Verdict::new(
            Phase::Catastrophic,
            format!(
                "SMALL CAP CATASTROPHIC: Structure breakdown ({:.1}% vs SMA200, RSI {:.0})",
                m.pct_vs_sma200, m.rsi
            ),
        ))
    } else if selloff {
        Some(Verdict::new(
            Phase::Catastrophic,
            format!(
                "SMALL CAP CATASTROPHIC: Violent selloff ({:.1}% day)",
                m.change_24h_pct
            ),
        ))
    } else {
        None
    }
}

/// Overstretched: at least two of four signals.
fn reset(input: &RuleInput<'_, SmallCapThresholds>) -> Option<Verdict> {
    let m = input.metrics;
    let t = input.thresholds;
    let mut signals = Signals::default();
    signals.check(m.rsi > t.overstretched_rsi, || format!("RSI {:.0}", m.rsi));
    signals.check(m.pct_vs_ema20 > t.overstretched_pct_vs_ema20, || {
        format!("{:+.1}% vs EMA20", m.pct_vs_ema20)
    });
    signals.check(m.change_24h_pct > t.overstretched_change_24h_pct, || {
        format!("{:+.1}% day", m.change_24h_pct)
    });
    signals.check(m.pct_vs_sma200 > t.overstretched_pct_vs_sma200, || {
        format!("{:+.1}% vs SMA200", m.pct_vs_sma200)
    });

    (signals.count() >= t.min_reset_signals).then(|| {
        Verdict::new(
            Phase::Reset,
            format!("SMALL CAP RESET: {}", signals.joined()),
        )
    })
}

pub struct SmallCapStrategy;

impl SmallCapStrategy {
    /// Trim 70%, clear the ladder, maybe leave a deep probe.
    fn flush(ctx: &PolicyContext<'_>) -> Action {
        let asset = ctx.asset;
        let caps = &ctx.config.smallcap_caps;
        let mut action = Action::hold(Phase::Catastrophic);
        action.core_trim = policy::trim(
            asset.position_shares,
            caps.catastrophic_trim_fraction,
            format!(
                "SMALL CAP CATASTROPHIC - Fail fast {:.0}% exit",
                caps.catastrophic_trim_fraction * 100.0
            ),
        );
        action.modified_rungs =
            policy::cancel_all(&asset.pending_orders, "SMALL CAP CATASTROPHIC - Clear all");

        let batch = ctx.rungs.smallcap_probe(asset, ctx.metrics, ctx.total_pool);
        action.new_rungs = batch.rungs;
        action.rejections = batch.rejections;
        action
    }

    /// Trim 50% into strength and cancel buys above SMA200.
    fn derisk(ctx: &PolicyContext<'_>) -> Action {
        let asset = ctx.asset;
        let caps = &ctx.config.smallcap_caps;
        let sma200 = ctx.metrics.sma200;
        let mut action = Action::hold(Phase::Reset);
        action.core_trim = policy::trim(
            asset.position_shares,
            caps.reset_trim_fraction,
            format!(
                "SMALL CAP RESET - Derisk {:.0}% into strength",
                caps.reset_trim_fraction * 100.0
            ),
        );
        action.modified_rungs = policy::cancel_where(
            &asset.pending_orders,
            |o| o.price > sma200,
            "SMALL CAP RESET - Cancel above SMA200",
        );
        action
    }

    fn ladder(ctx: &PolicyContext<'_>) -> Action {
        let batch =
            ctx.rungs
                .smallcap_rungs(ctx.asset, ctx.metrics, ctx.dry_powder, ctx.total_pool);
        let mut action = Action::hold(Phase::Normal);
        action.core_action = CoreAction::Hold;
        action.new_rungs = batch.rungs;
        action.rejections = batch.rejections;
        action
    }
}

impl AssetStrategy for SmallCapStrategy {
    fn detect(
        &self,
        ticker: &str,
        metrics: &MarketMetrics,
        regime: &GlobalRegime,
        config: &AllocatorConfig,
    ) -> PhaseClassification {
        phase::evaluate(ticker, RULES, metrics, regime, &config.smallcap)
    }

    fn decide(&self, ctx: &PolicyContext<'_>) -> Action {
        match ctx.phase() {
            Phase::Catastrophic => Self::flush(ctx),
            Phase::Reset => Self::derisk(ctx),
            _ => Self::ladder(ctx),
        }
    }
}
