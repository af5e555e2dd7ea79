//! Crypto strategy: deeper thresholds, a PARABOLIC phase, no regime gating.

use super::{catastrophic, meltup, AssetStrategy};
use crate::config::{AllocatorConfig, PhaseThresholds};
use crate::phase::{self, MarketMetrics, PhaseRule, RuleInput, Verdict};
use crate::policy::{self, PolicyContext};
use crate::types::{Action, GlobalRegime, Phase, PhaseClassification};

/// Crypto phase table, highest priority first.
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
        name: "parabolic",
        check: parabolic,
    },
    PhaseRule {
        name: "meltup",
        check: meltup,
    },
    PhaseRule {
        name: "normal",
        check: phase::normal,
    },
];

fn reset(input: &RuleInput<'_, PhaseThresholds>) -> Option<Verdict> {
    let m = input.metrics;
    let t = input.thresholds;
    let signals = m.stress_signals(t);
    let deep_enough = t
        .reset_sma200_ceiling
        .map_or(true, |ceiling| m.price < m.sma200 * ceiling);

    (signals.count() >= t.min_stress_signals && deep_enough)
        .then(|| Verdict::new(Phase::Reset, format!("CRYPTO RESET: {}", signals.joined())))
}

fn parabolic(input: &RuleInput<'_, PhaseThresholds>) -> Option<Verdict> {
    let m = input.metrics;
    let t = input.thresholds.parabolic.as_ref()?;
    (m.rsi > t.rsi && m.volume_ratio > t.volume_ratio && m.price > m.ema20 * t.ema20_ratio).then(
        || {
            Verdict::new(
                Phase::Parabolic,
                format!(
                    "BLOWOFF: RSI {:.0}, Vol {:.0}%, Price {:+.1}% vs EMA20",
                    m.rsi,
                    m.volume_ratio * 100.0,
                    m.pct_vs_ema20
                ),
            )
        },
    )
}

pub struct CryptoStrategy;

impl AssetStrategy for CryptoStrategy {
    fn detect(
        &self,
        ticker: &str,
        metrics: &MarketMetrics,
        regime: &GlobalRegime,
        config: &AllocatorConfig,
    ) -> PhaseClassification {
        phase::evaluate(ticker, RULES, metrics, regime, &config.crypto)
    }

    fn decide(&self, ctx: &PolicyContext<'_>) -> Action {
        let policy_config = &ctx.config.policy;
        match ctx.phase() {
            Phase::Catastrophic => policy::catastrophic_exit(ctx),
            Phase::Parabolic => policy::parabolic(ctx),
            Phase::Reset => policy::reset(ctx, ctx.config.crypto.reset_trim_floor),
            Phase::Meltup => policy::meltup(
                ctx,
                &policy_config.crypto_meltup_exits,
                "Crypto meltup exit",
            ),
            Phase::Ignition => policy::ignition(ctx),
            Phase::Normal => policy::normal(ctx),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::test_support::{regime, Market};

    fn detect(market: Market) -> PhaseClassification {
        CryptoStrategy.detect(
            "BTC-USD",
            &market.metrics(),
            &regime(false),
            &AllocatorConfig::default(),
        )
    }

    #[test]
    fn test_parabolic_before_meltup() {
        // Satisfies both PARABOLIC and MELTUP
        let market = Market {
            price: 200.0,
            ema20: 140.0,
            rsi: 85.0,
            volume_ratio: 2.5,
            ..Default::default()
        };
        let result = detect(market);
        assert_eq!(result.phase, Phase::Parabolic);
        assert_eq!(result.score, 10);
    }

    #[test]
    fn test_meltup_needs_larger_extension() {
        let stock_like = Market {
            price: 120.0,
            ema20: 115.0,
            rsi: 75.0,
            volume_ratio: 1.6,
            ..Default::default()
        };
        assert_eq!(detect(stock_like).phase, Phase::Normal);

        let crypto_meltup = Market {
            price: 160.0,
            ema20: 150.0,
            rsi: 75.0,
            volume_ratio: 1.6,
            ..Default::default()
        };
        assert_eq!(detect(crypto_meltup).phase, Phase::Meltup);
    }

    #[test]
    fn test_reset_ignores_regime_but_needs_depth() {
        let shallow = Market {
            price: 80.0,
            ema20: 100.0,
            rsi: 35.0,
            drawdown: 25.0,
            ..Default::default()
        };
        assert_eq!(detect(shallow).phase, Phase::Normal);

        let deep = Market {
            price: 65.0,
            ema20: 100.0,
            rsi: 35.0,
            drawdown: 30.0,
            ..Default::default()
        };
        let result = detect(deep);
        assert_eq!(result.phase, Phase::Reset);
        assert!(result.reason.starts_with("CRYPTO RESET"));
    }

    #[test]
    fn test_catastrophic_collapse() {
        let market = Market {
            price: 35.0,
            ema20: 40.0,
            rsi: 20.0,
            volume_ratio: 0.2,
            drawdown: 60.0,
            ..Default::default()
        };
        assert_eq!(detect(market).phase, Phase::Catastrophic);
    }
}
