//! Stock strategy (default asset type).

use super::{catastrophic, meltup, AssetStrategy};
use crate::config::{AllocatorConfig, PhaseThresholds};
use crate::phase::{self, MarketMetrics, PhaseRule, RuleInput, Verdict};
use crate::policy::{self, PolicyContext};
use crate::types::{Action, GlobalRegime, Phase, PhaseClassification};

/// Stock phase table, highest priority first.
pub const RULES: &[PhaseRule<PhaseThresholds>] = &[
    PhaseRule {
        name: "catastrophic",
        check: catastrophic,
    },
    PhaseRule {
        name: "reset",
        check: reset,
    },
    PhaseRule {
        name: "meltup",
        check: meltup,
    },
    PhaseRule {
        name: "ignition",
        check: ignition,
    },
    PhaseRule {
        name: "normal",
        check: phase::normal,
    },
];

/// Two or more stress signals. When the market is healthy only an
/// individual extreme escalates; otherwise the asset resolves to NORMAL.
fn reset(input: &RuleInput<'_, PhaseThresholds>) -> Option<Verdict> {
    let m = input.metrics;
    let t = input.thresholds;
    let signals = m.stress_signals(t);
    if signals.count() < t.min_stress_signals {
        return None;
    }

    if t.reset_gated_by_regime && !input.regime.allow_reset {
        let extreme = m.drawdown_60d > t.extreme_drawdown_pct
            && m.price < m.sma200 * t.extreme_sma200_ratio;
        if extreme {
            return Some(Verdict::new(
                Phase::Reset,
                format!(
                    "{} [Individual extreme, market {}]",
                    signals.joined(),
                    input.regime.regime
                ),
            ));
        }
        return Some(Verdict::new(
            Phase::Normal,
            format!(
                "Price {:+.1}% vs SMA200, RSI {:.0} [Market healthy, {}]",
                m.pct_vs_sma200, m.rsi, input.regime.reason
            ),
        ));
    }

    Some(Verdict::new(Phase::Reset, signals.joined()))
}

fn ignition(input: &RuleInput<'_, PhaseThresholds>) -> Option<Verdict> {
    let m = input.metrics;
    let t = input.thresholds.ignition.as_ref()?;
    (m.price > m.sma200 * t.sma200_ratio
        && m.rsi >= t.rsi_min
        && m.rsi <= t.rsi_max
        && m.volume_ratio > t.volume_ratio)
        .then(|| Verdict::new(Phase::Ignition, m.describe()))
}

pub struct StockStrategy;

impl AssetStrategy for StockStrategy {
    fn detect(
        &self,
        ticker: &str,
        metrics: &MarketMetrics,
        regime: &GlobalRegime,
        config: &AllocatorConfig,
    ) -> PhaseClassification {
        phase::evaluate(ticker, RULES, metrics, regime, &config.stock)
    }

    fn decide(&self, ctx: &PolicyContext<'_>) -> Action {
        let policy_config = &ctx.config.policy;
        match ctx.phase() {
            Phase::Catastrophic => policy::catastrophic_exit(ctx),
            Phase::Reset => policy::reset(ctx, ctx.config.stock.reset_trim_floor),
            Phase::Meltup => policy::meltup(ctx, &policy_config.stock_meltup_exits, "Meltup exit"),
            Phase::Ignition => policy::ignition(ctx),
            Phase::Normal | Phase::Parabolic => policy::normal(ctx),
        }
    }
}
