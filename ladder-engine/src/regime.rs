//! Global regime analysis from the benchmark asset.

use crate::config::RegimeThresholds;
use crate::types::{AssetSnapshot, GlobalRegime, RegimeKind};

/// Derive the market-wide regime from the benchmark snapshot.
///
/// A missing benchmark yields NORMAL with RESET escalation blocked.
pub fn analyze(benchmark: Option<&AssetSnapshot>, thresholds: &RegimeThresholds) -> GlobalRegime {
    let Some(benchmark) = benchmark else {
        tracing::warn!("Benchmark data unavailable, blocking individual RESET escalation");
        return GlobalRegime {
            regime: RegimeKind::Normal,
            reason: "Benchmark data unavailable".to_string(),
            allow_reset: false,
        };
    };

    let rsi = benchmark.indicators.rsi;
    let sma200 = benchmark.indicators.sma200;
    let pct_vs_sma200 = (benchmark.price - sma200) / sma200 * 100.0;

    let mut reasons = Vec::new();
    if pct_vs_sma200 < thresholds.stress_pct_vs_sma200 {
        reasons.push(format!(
            "{} {:.1}% below SMA200",
            benchmark.ticker, pct_vs_sma200
        ));
    }
    if rsi < thresholds.stress_rsi {
        reasons.push(format!("{} RSI {:.0}", benchmark.ticker, rsi));
    }
    let signals = reasons.len();

    let regime = if signals >= thresholds.reset_min_signals
        || pct_vs_sma200 < thresholds.reset_pct_vs_sma200
    {
        GlobalRegime {
            regime: RegimeKind::Reset,
            reason: reasons.join(", "),
            allow_reset: true,
        }
    } else if signals >= 1 {
        GlobalRegime {
            regime: RegimeKind::Stress,
            reason: reasons.join(", "),
            allow_reset: true,
        }
    } else {
        GlobalRegime {
            regime: RegimeKind::Normal,
            reason: format!(
                "{} {:+.1}% vs SMA200, RSI {:.0}",
                benchmark.ticker, pct_vs_sma200, rsi
            ),
            allow_reset: false,
        }
    };

    tracing::debug!(
        benchmark = %benchmark.ticker,
        regime = %regime.regime,
        stress_signals = signals,
        allow_reset = regime.allow_reset,
        "Global regime analyzed"
    );

    regime
}
