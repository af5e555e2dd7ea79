//! Phase detection as ordered rule tables.
//!
//! Each asset type owns a table of [`PhaseRule`]s evaluated top to bottom;
//! the first rule that returns a [`Verdict`] wins. Tables live with their
//! strategies in [`crate::strategy`].
//!
//! ```text
//! STOCK                 CRYPTO                SMALL_CAP
//! 1. CATASTROPHIC       1. CATASTROPHIC       1. CATASTROPHIC (1 of 2)
//! 2. RESET (gated)      2. RESET (<0.70×SMA)  2. RESET (2 of 4)
//! 3. MELTUP             3. PARABOLIC          3. NORMAL
//! 4. IGNITION           4. MELTUP
//! 5. NORMAL             5. NORMAL
//! ```

use crate::config::PhaseThresholds;
use crate::types::{AssetSnapshot, GlobalRegime, Phase, PhaseClassification};

/// Derived quantities shared by every rule.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarketMetrics {
    pub price: f64,
    pub sma200: f64,
    pub ema20: f64,
    pub rsi: f64,
    pub volume_ratio: f64,
    pub drawdown_60d: f64,
    pub pct_vs_sma200: f64,
    pub pct_vs_ema20: f64,
    /// Zero when unknown
    pub change_24h_pct: f64,
}

impl MarketMetrics {
    pub fn from_snapshot(asset: &AssetSnapshot) -> Self {
        let ind = &asset.indicators;
        let price = asset.price;
        let volume_ratio = if ind.volume_avg20 > 0.0 {
            ind.volume / ind.volume_avg20
        } else {
            1.0
        };

        Self {
            price,
            sma200: ind.sma200,
            ema20: ind.ema20,
            rsi: ind.rsi,
            volume_ratio,
            drawdown_60d: ind.drawdown_60d,
            pct_vs_sma200: (price - ind.sma200) / ind.sma200 * 100.0,
            pct_vs_ema20: (price - ind.ema20) / ind.ema20 * 100.0,
            change_24h_pct: ind.change_24h_pct.unwrap_or(0.0),
        }
    }

    /// Count the four RESET stress signals.
    pub fn stress_signals(&self, t: &PhaseThresholds) -> Signals {
        let mut signals = Signals::default();
        signals.check(self.rsi < t.stress_rsi, || format!("RSI {:.0}", self.rsi));
        signals.check(self.price < self.ema20 * t.stress_ema20_ratio, || {
            format!("Price <EMA20 -{:.1}%", self.pct_vs_ema20.abs())
        });
        signals.check(self.drawdown_60d > t.stress_drawdown_pct, || {
            format!("Drawdown {:.1}%", self.drawdown_60d)
        });
        signals.check(self.volume_ratio < t.stress_volume_ratio, || {
            format!("Vol collapse {:.0}%", self.volume_ratio * 100.0)
        });
        signals
    }

    /// Short description used by default verdicts.
    pub fn describe(&self) -> String {
        format!(
            "Price {:+.1}% vs SMA200, RSI {:.0}, Vol {:.0}%",
            self.pct_vs_sma200,
            self.rsi,
            self.volume_ratio * 100.0
        )
    }
}

/// Tally of triggered signals with their reasons.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Signals {
    pub reasons: Vec<String>,
}

impl Signals {
    pub fn check(&mut self, fired: bool, reason: impl FnOnce() -> String) {
        if fired {
            self.reasons.push(reason());
        }
    }

    pub fn count(&self) -> usize {
        self.reasons.len()
    }

    pub fn joined(&self) -> String {
        self.reasons.join(", ")
    }
}

/// Outcome of a matching rule.
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub phase: Phase,
    pub reason: String,
}

impl Verdict {
    pub fn new(phase: Phase, reason: impl Into<String>) -> Self {
        Self {
            phase,
            reason: reason.into(),
        }
    }
}

/// Inputs visible to a rule.
pub struct RuleInput<'a, T> {
    pub metrics: &'a MarketMetrics,
    pub regime: &'a GlobalRegime,
    pub thresholds: &'a T,
}

/// One row of a priority table.
///
/// A rule may resolve to a phase other than its own (gated RESET resolves
/// to NORMAL), which ends evaluation.
pub struct PhaseRule<T: 'static> {
    pub name: &'static str,
    pub check: fn(&RuleInput<'_, T>) -> Option<Verdict>,
}

/// Evaluate a rule table with first-match-wins semantics.
pub fn evaluate<T>(
    ticker: &str,
    rules: &[PhaseRule<T>],
    metrics: &MarketMetrics,
    regime: &GlobalRegime,
    thresholds: &T,
) -> PhaseClassification {
    let input = RuleInput {
        metrics,
        regime,
        thresholds,
    };

    for rule in rules {
        if let Some(verdict) = (rule.check)(&input) {
            tracing::debug!(
                ticker = %ticker,
                rule = rule.name,
                phase = %verdict.phase,
                reason = %verdict.reason,
                "Phase rule matched"
            );
            return PhaseClassification::new(verdict.phase, verdict.reason);
        }
    }

    PhaseClassification::new(Phase::Normal, metrics.describe())
}

/// Terminal rule shared by every table.
pub fn normal<T>(input: &RuleInput<'_, T>) -> Option<Verdict> {
    Some(Verdict::new(Phase::Normal, input.metrics.describe()))
}
