//! Asset-type strategies.
//!
//! Each [`AssetType`] has one strategy that owns its phase rule table and
//! its phase-to-action mapping. The planner selects a strategy once per
//! asset per cycle with [`for_type`].

mod crypto;
mod smallcap;
mod stock;

pub use crypto::CryptoStrategy;
pub use smallcap::SmallCapStrategy;
pub use stock::StockStrategy;

use crate::config::{AllocatorConfig, PhaseThresholds};
use crate::phase::{MarketMetrics, RuleInput, Verdict};
use crate::policy::PolicyContext;
use crate::types::{Action, AssetType, GlobalRegime, Phase, PhaseClassification};

/// Phase detection and action mapping for one asset variant.
pub trait AssetStrategy: Send + Sync {
    /// Classify the asset's phase.
    fn detect(
        &self,
        ticker: &str,
        metrics: &MarketMetrics,
        regime: &GlobalRegime,
        config: &AllocatorConfig,
    ) -> PhaseClassification;

    /// Map the classified phase to an action.
    fn decide(&self, ctx: &PolicyContext<'_>) -> Action;
}

/// Strategy for an asset variant.
pub fn for_type(asset_type: AssetType) -> &'static dyn AssetStrategy {
    match asset_type {
        AssetType::Stock => &StockStrategy,
        AssetType::Crypto => &CryptoStrategy,
        AssetType::SmallCap => &SmallCapStrategy,
    }
}

// ============================================================================
// Rules shared by stock and crypto tables
// ============================================================================

fn catastrophic(input: &RuleInput<'_, PhaseThresholds>) -> Option<Verdict> {
    let m = input.metrics;
    let t = input.thresholds;
    (m.price < m.sma200 * t.catastrophic_sma200_ratio
        && m.rsi < t.catastrophic_rsi
        && m.volume_ratio < t.catastrophic_volume_ratio)
        .then(|| {
            Verdict::new(
                Phase::Catastrophic,
                format!(
                    "Price {:.1}% below SMA200, RSI {:.0}, Vol {:.0}%",
                    m.pct_vs_sma200,
                    m.rsi,
                    m.volume_ratio * 100.0
                ),
            )
        })
}

fn meltup(input: &RuleInput<'_, PhaseThresholds>) -> Option<Verdict> {
    let m = input.metrics;
    let t = input.thresholds;
    (m.price > m.sma200 * t.meltup_sma200_ratio
        && m.rsi > t.meltup_rsi
        && m.volume_ratio > t.meltup_volume_ratio)
        .then(|| Verdict::new(Phase::Meltup, m.describe()))
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::phase::MarketMetrics;
    use crate::types::{AssetSnapshot, GlobalRegime, Indicators, RegimeKind};

    pub struct Market {
        pub price: f64,
        pub sma200: f64,
        pub ema20: f64,
        pub rsi: f64,
        pub volume_ratio: f64,
        pub drawdown: f64,
        pub change_24h: Option<f64>,
    }

    impl Default for Market {
        fn default() -> Self {
            Self {
                price: 100.0,
                sma200: 100.0,
                ema20: 100.0,
                rsi: 50.0,
                volume_ratio: 1.0,
                drawdown: 0.0,
                change_24h: None,
            }
        }
    }

    impl Market {
        pub fn snapshot(&self, ticker: &str) -> AssetSnapshot {
            AssetSnapshot {
                ticker: ticker.into(),
                price: self.price,
                indicators: Indicators {
                    rsi: self.rsi,
                    sma200: self.sma200,
                    ema20: self.ema20,
                    volume: self.volume_ratio * 1_000_000.0,
                    volume_avg20: 1_000_000.0,
                    drawdown_60d: self.drawdown,
                    change_24h_pct: self.change_24h,
                },
                position_shares: 0,
                pending_orders: vec![],
            }
        }

        pub fn metrics(&self) -> MarketMetrics {
            MarketMetrics::from_snapshot(&self.snapshot("X"))
        }
    }

    pub fn regime(allow_reset: bool) -> GlobalRegime {
        GlobalRegime {
            regime: if allow_reset {
                RegimeKind::Stress
            } else {
                RegimeKind::Normal
            },
            reason: "test".into(),
            allow_reset,
        }
    }
}
