//! Allocator configuration.
//!
//! Every threshold the engine uses lives here with its default value.
//! [`AllocatorConfig::from_config`] applies the optional overrides from the
//! `allocator` section of the shared configuration file.

use ladder_common::config::{AllocatorSection, Config, PhaseThresholdSection};
use ladder_common::Validate;

use crate::error::EngineError;
use crate::types::{AssetType, Probability};

// ============================================================================
// Universe
// ============================================================================

/// Which tickers are traded, watched, or skipped, and how they are classified.
#[derive(Debug, Clone, PartialEq)]
pub struct UniverseConfig {
    /// Drives the global regime; never receives an asset plan
    pub benchmark_ticker: String,
    /// Classified but never traded
    pub monitor_only: Vec<String>,
    /// Skipped entirely
    pub banned: Vec<String>,
    pub crypto_tickers: Vec<String>,
    pub smallcap_tickers: Vec<String>,
}

impl Default for UniverseConfig {
    fn default() -> Self {
        Self {
            benchmark_ticker: "SPY".into(),
            monitor_only: vec!["GOOG".into()],
            banned: vec!["ETH".into()],
            crypto_tickers: vec![
                "BTC-USD".into(),
                "ETH-USD".into(),
                "BTC".into(),
                "ETH".into(),
            ],
            smallcap_tickers: vec!["SMCI".into()],
        }
    }
}

impl UniverseConfig {
    /// Map a ticker to its asset variant.
    pub fn classify(&self, ticker: &str) -> AssetType {
        if self.crypto_tickers.iter().any(|t| t == ticker) {
            AssetType::Crypto
        } else if self.smallcap_tickers.iter().any(|t| t == ticker) {
            AssetType::SmallCap
        } else {
            AssetType::Stock
        }
    }

    pub fn is_benchmark(&self, ticker: &str) -> bool {
        self.benchmark_ticker == ticker
    }

    pub fn is_monitor_only(&self, ticker: &str) -> bool {
        self.monitor_only.iter().any(|t| t == ticker)
    }

    pub fn is_banned(&self, ticker: &str) -> bool {
        self.banned.iter().any(|t| t == ticker)
    }
}

// ============================================================================
// Regime
// ============================================================================

/// Benchmark stress thresholds.
#[derive(Debug, Clone, PartialEq)]
pub struct RegimeThresholds {
    /// Percent vs SMA200 below which the benchmark counts one stress signal
    pub stress_pct_vs_sma200: f64,
    /// RSI below which the benchmark counts one stress signal
    pub stress_rsi: f64,
    /// Percent vs SMA200 below which the regime is RESET outright
    pub reset_pct_vs_sma200: f64,
    pub reset_min_signals: usize,
}

impl Default for RegimeThresholds {
    fn default() -> Self {
        Self {
            stress_pct_vs_sma200: -3.0,
            stress_rsi: 50.0,
            reset_pct_vs_sma200: -5.0,
            reset_min_signals: 2,
        }
    }
}

// ============================================================================
// Phase Thresholds
// ============================================================================

/// Phase rule thresholds for stock and crypto assets.
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseThresholds {
    pub catastrophic_sma200_ratio: f64,
    pub catastrophic_rsi: f64,
    pub catastrophic_volume_ratio: f64,

    // Stress signals
    pub stress_rsi: f64,
    pub stress_ema20_ratio: f64,
    pub stress_drawdown_pct: f64,
    pub stress_volume_ratio: f64,
    pub min_stress_signals: usize,

    /// Stock only: individual-extreme override when the market is healthy
    pub extreme_drawdown_pct: f64,
    pub extreme_sma200_ratio: f64,
    /// Crypto only: RESET requires price below this multiple of SMA200
    pub reset_sma200_ceiling: Option<f64>,
    /// Whether RESET is gated by the global regime
    pub reset_gated_by_regime: bool,

    pub meltup_sma200_ratio: f64,
    pub meltup_rsi: f64,
    pub meltup_volume_ratio: f64,

    /// Stock only
    pub ignition: Option<IgnitionThresholds>,
    /// Crypto only
    pub parabolic: Option<ParabolicThresholds>,

    /// RESET trims only while price stays above this multiple of SMA200
    pub reset_trim_floor: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IgnitionThresholds {
    pub sma200_ratio: f64,
    pub rsi_min: f64,
    pub rsi_max: f64,
    pub volume_ratio: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParabolicThresholds {
    pub rsi: f64,
    pub volume_ratio: f64,
    pub ema20_ratio: f64,
}

impl PhaseThresholds {
    pub fn stock() -> Self {
        Self {
            catastrophic_sma200_ratio: 0.85,
            catastrophic_rsi: 32.0,
            catastrophic_volume_ratio: 0.40,
            stress_rsi: 38.0,
            stress_ema20_ratio: 0.96,
            stress_drawdown_pct: 20.0,
            stress_volume_ratio: 0.45,
            min_stress_signals: 2,
            extreme_drawdown_pct: 22.0,
            extreme_sma200_ratio: 0.80,
            reset_sma200_ceiling: None,
            reset_gated_by_regime: true,
            meltup_sma200_ratio: 1.12,
            meltup_rsi: 70.0,
            meltup_volume_ratio: 1.5,
            ignition: Some(IgnitionThresholds {
                sma200_ratio: 1.05,
                rsi_min: 60.0,
                rsi_max: 72.0,
                volume_ratio: 1.3,
            }),
            parabolic: None,
            reset_trim_floor: 0.90,
        }
    }

    pub fn crypto() -> Self {
        Self {
            catastrophic_sma200_ratio: 0.40,
            reset_sma200_ceiling: Some(0.70),
            reset_gated_by_regime: false,
            meltup_sma200_ratio: 1.50,
            ignition: None,
            parabolic: Some(ParabolicThresholds {
                rsi: 80.0,
                volume_ratio: 2.0,
                ema20_ratio: 1.30,
            }),
            reset_trim_floor: 0.70,
            ..Self::stock()
        }
    }

    fn apply(&mut self, section: &PhaseThresholdSection) {
        if let Some(v) = section.catastrophic_sma200_ratio {
            self.catastrophic_sma200_ratio = v;
        }
        if let Some(v) = section.catastrophic_rsi {
            self.catastrophic_rsi = v;
        }
        if let Some(v) = section.catastrophic_volume_ratio {
            self.catastrophic_volume_ratio = v;
        }
        if let Some(v) = section.meltup_sma200_ratio {
            self.meltup_sma200_ratio = v;
        }
        if let Some(v) = section.meltup_rsi {
            self.meltup_rsi = v;
        }
        if let Some(v) = section.meltup_volume_ratio {
            self.meltup_volume_ratio = v;
        }
        if let Some(v) = section.reset_trim_floor {
            self.reset_trim_floor = v;
        }
    }
}

/// Two-tier rule thresholds for capped small caps.
#[derive(Debug, Clone, PartialEq)]
pub struct SmallCapThresholds {
    // Structure breakdown
    pub breakdown_pct_vs_sma200: f64,
    pub breakdown_rsi: f64,
    pub breakdown_volume_ratio: f64,
    // Violent selloff
    pub selloff_change_24h_pct: f64,
    pub selloff_volume_ratio: f64,
    // Overstretched signals
    pub overstretched_rsi: f64,
    pub overstretched_pct_vs_ema20: f64,
    pub overstretched_change_24h_pct: f64,
    pub overstretched_pct_vs_sma200: f64,
    pub min_reset_signals: usize,
}

impl Default for SmallCapThresholds {
    fn default() -> Self {
        Self {
            breakdown_pct_vs_sma200: -10.0,
            breakdown_rsi: 40.0,
            breakdown_volume_ratio: 1.5,
            selloff_change_24h_pct: -15.0,
            selloff_volume_ratio: 2.0,
            overstretched_rsi: 72.0,
            overstretched_pct_vs_ema20: 15.0,
            overstretched_change_24h_pct: 12.0,
            overstretched_pct_vs_sma200: 20.0,
            min_reset_signals: 2,
        }
    }
}

// ============================================================================
// Rung Generation
// ============================================================================

/// Secondary brake against buying into a collapse.
#[derive(Debug, Clone, PartialEq)]
pub struct CrashBrake {
    pub max_drawdown_pct: f64,
    pub min_sma200_ratio: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CrashBrakes {
    /// Applies to stocks and small caps
    pub stock: CrashBrake,
    pub crypto: CrashBrake,
    /// Dip rungs need price at least this far below SMA200 (percent)
    pub min_depth_pct: f64,
}

impl Default for CrashBrakes {
    fn default() -> Self {
        Self {
            stock: CrashBrake {
                max_drawdown_pct: 35.0,
                min_sma200_ratio: 0.60,
            },
            crypto: CrashBrake {
                max_drawdown_pct: 50.0,
                min_sma200_ratio: 0.40,
            },
            min_depth_pct: -10.0,
        }
    }
}

impl CrashBrakes {
    pub fn for_type(&self, asset_type: AssetType) -> &CrashBrake {
        match asset_type {
            AssetType::Crypto => &self.crypto,
            AssetType::Stock | AssetType::SmallCap => &self.stock,
        }
    }
}

/// A dip band: when percent vs SMA200 lies in `[min_pct, max_pct)`, place a
/// rung at `sma200_multiple × SMA200` sized at a fraction of dry powder.
#[derive(Debug, Clone, PartialEq)]
pub struct DipTier {
    pub min_pct: f64,
    pub max_pct: f64,
    pub sma200_multiple: f64,
    pub dry_powder_fraction: f64,
    pub probability: Probability,
    pub label: &'static str,
}

impl DipTier {
    pub fn contains(&self, pct_vs_sma200: f64) -> bool {
        pct_vs_sma200 >= self.min_pct && pct_vs_sma200 < self.max_pct
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DipTiers {
    pub stock: Vec<DipTier>,
    pub crypto: Vec<DipTier>,
}

impl Default for DipTiers {
    fn default() -> Self {
        Self {
            stock: vec![
                DipTier {
                    min_pct: -25.0,
                    max_pct: -15.0,
                    sma200_multiple: 0.80,
                    dry_powder_fraction: 0.10,
                    probability: Probability::P30,
                    label: "Dip buy (20% below SMA200)",
                },
                DipTier {
                    min_pct: f64::NEG_INFINITY,
                    max_pct: -25.0,
                    sma200_multiple: 0.70,
                    dry_powder_fraction: 0.10,
                    probability: Probability::P5,
                    label: "Deep value (30% below SMA200)",
                },
            ],
            crypto: vec![
                DipTier {
                    min_pct: -50.0,
                    max_pct: -30.0,
                    sma200_multiple: 0.60,
                    dry_powder_fraction: 0.08,
                    probability: Probability::P30,
                    label: "Crypto dip buy (40% below SMA200)",
                },
                DipTier {
                    min_pct: f64::NEG_INFINITY,
                    max_pct: -50.0,
                    sma200_multiple: 0.40,
                    dry_powder_fraction: 0.08,
                    probability: Probability::P10,
                    label: "Crypto deep value (60% below SMA200)",
                },
                DipTier {
                    min_pct: f64::NEG_INFINITY,
                    max_pct: -70.0,
                    sma200_multiple: 0.20,
                    dry_powder_fraction: 0.05,
                    probability: Probability::P5,
                    label: "Crypto crash buy (80% below SMA200)",
                },
            ],
        }
    }
}

impl DipTiers {
    /// Small caps ladder through their own capped zones; they share the
    /// stock tiers only for RESET dip rungs.
    pub fn for_type(&self, asset_type: AssetType) -> &[DipTier] {
        match asset_type {
            AssetType::Crypto => &self.crypto,
            AssetType::Stock | AssetType::SmallCap => &self.stock,
        }
    }
}

/// Exposure caps and buy zones for capped small caps. Fractions are of the
/// total pool.
#[derive(Debug, Clone, PartialEq)]
pub struct SmallCapCaps {
    pub max_exposure_fraction: f64,
    pub max_ladder_fraction: f64,
    pub max_rung_fraction: f64,
    /// No single rung may exceed this share of future exposure
    pub max_rung_share: f64,

    /// Below this percent vs SMA200 the asset is broken
    pub broken_pct: f64,
    /// Above this percent vs SMA200 the asset is parabolic
    pub parabolic_pct: f64,
    pub structural_band: (f64, f64),
    pub sniper_band: (f64, f64),

    pub structural_multiples: Vec<f64>,
    pub structural_rung_fraction: f64,
    pub structural_dry_powder_fraction: f64,
    pub sniper_multiple: f64,
    pub sniper_rung_fraction: f64,

    pub catastrophic_trim_fraction: f64,
    pub reset_trim_fraction: f64,
    pub probe_multiple: f64,
    pub probe_fraction: f64,
    /// Probe only when the remaining position is at most this share of the pool
    pub probe_max_remaining_fraction: f64,
}

impl Default for SmallCapCaps {
    fn default() -> Self {
        Self {
            max_exposure_fraction: 0.05,
            max_ladder_fraction: 0.03,
            max_rung_fraction: 0.0075,
            max_rung_share: 0.20,
            broken_pct: -25.0,
            parabolic_pct: 20.0,
            structural_band: (-15.0, 5.0),
            sniper_band: (-25.0, -15.0),
            structural_multiples: vec![0.95, 0.90, 0.85],
            structural_rung_fraction: 0.0075,
            structural_dry_powder_fraction: 0.10,
            sniper_multiple: 0.80,
            sniper_rung_fraction: 0.0025,
            catastrophic_trim_fraction: 0.70,
            reset_trim_fraction: 0.50,
            probe_multiple: 0.78,
            probe_fraction: 0.0025,
            probe_max_remaining_fraction: 0.02,
        }
    }
}

// ============================================================================
// Phase Actions
// ============================================================================

/// One step of a staged exit: sell `fraction` of the position at
/// `multiple × price`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExitStep {
    pub multiple: f64,
    pub fraction: f64,
}

const fn step(multiple: f64, fraction: f64) -> ExitStep {
    ExitStep { multiple, fraction }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PolicyConfig {
    pub reset_trim_fraction: f64,
    pub meltup_trim_fraction: f64,
    pub meltup_trim_rsi: f64,
    pub parabolic_trim_fraction: f64,
    pub parabolic_trim_rsi: f64,
    pub ignition_deploy_fraction: f64,
    /// IGNITION buys only while price is at most this multiple of fair value
    pub ignition_chase_ratio: f64,
    /// IGNITION cancels rungs priced below this multiple of price
    pub ignition_freeze_ratio: f64,
    pub stock_meltup_exits: Vec<ExitStep>,
    pub crypto_meltup_exits: Vec<ExitStep>,
    pub parabolic_exits: Vec<ExitStep>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            reset_trim_fraction: 0.35,
            meltup_trim_fraction: 0.10,
            meltup_trim_rsi: 90.0,
            parabolic_trim_fraction: 0.70,
            parabolic_trim_rsi: 85.0,
            ignition_deploy_fraction: 0.20,
            ignition_chase_ratio: 1.02,
            ignition_freeze_ratio: 0.85,
            stock_meltup_exits: vec![
                step(1.20, 0.05),
                step(1.40, 0.10),
                step(1.70, 0.15),
                step(2.00, 0.20),
                step(3.00, 0.50),
            ],
            crypto_meltup_exits: vec![
                step(1.50, 0.05),
                step(2.00, 0.10),
                step(3.00, 0.15),
                step(5.00, 0.20),
                step(10.0, 0.50),
            ],
            parabolic_exits: vec![
                step(1.50, 0.10),
                step(2.00, 0.20),
                step(3.00, 0.30),
                step(5.00, 0.40),
            ],
        }
    }
}

// ============================================================================
// Allocator Config
// ============================================================================

/// Complete allocator configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct AllocatorConfig {
    pub universe: UniverseConfig,
    pub regime: RegimeThresholds,
    pub stock: PhaseThresholds,
    pub crypto: PhaseThresholds,
    pub smallcap: SmallCapThresholds,
    pub brakes: CrashBrakes,
    pub dip_tiers: DipTiers,
    pub smallcap_caps: SmallCapCaps,
    pub policy: PolicyConfig,
    /// Max fraction of cash new rungs may reserve in one cycle
    pub bootstrap_cap: f64,
    /// Half-width of a banned zone, percent
    pub banned_zone_tolerance_pct: f64,
    /// Price tolerance when matching orders
    pub price_epsilon: f64,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            universe: UniverseConfig::default(),
            regime: RegimeThresholds::default(),
            stock: PhaseThresholds::stock(),
            crypto: PhaseThresholds::crypto(),
            smallcap: SmallCapThresholds::default(),
            brakes: CrashBrakes::default(),
            dip_tiers: DipTiers::default(),
            smallcap_caps: SmallCapCaps::default(),
            policy: PolicyConfig::default(),
            bootstrap_cap: 0.40,
            banned_zone_tolerance_pct: 3.0,
            price_epsilon: 0.01,
        }
    }
}

impl AllocatorConfig {
    /// Build from the shared configuration, applying `allocator` overrides.
    pub fn from_config(config: &Config) -> Result<Self, EngineError> {
        let mut allocator = Self::default();
        if let Some(section) = &config.allocator {
            section
                .validate()
                .map_err(|e| EngineError::Config(e.to_string()))?;
            allocator.apply(section);
        }
        Ok(allocator)
    }

    fn apply(&mut self, section: &AllocatorSection) {
        if let Some(cap) = section.bootstrap_cap {
            self.bootstrap_cap = cap;
        }
        if let Some(tol) = section.banned_zone_tolerance_pct {
            self.banned_zone_tolerance_pct = tol;
        }
        if let Some(eps) = section.price_epsilon {
            self.price_epsilon = eps;
        }

        let universe = &mut self.universe;
        if let Some(benchmark) = &section.benchmark_ticker {
            universe.benchmark_ticker = benchmark.clone();
        }
        if let Some(list) = &section.monitor_only {
            universe.monitor_only = list.clone();
        }
        if let Some(list) = &section.banned {
            universe.banned = list.clone();
        }
        if let Some(list) = &section.crypto_tickers {
            universe.crypto_tickers = list.clone();
        }
        if let Some(list) = &section.smallcap_tickers {
            universe.smallcap_tickers = list.clone();
        }

        if let Some(brakes) = &section.crash_brakes {
            if let Some(v) = brakes.stock_max_drawdown_pct {
                self.brakes.stock.max_drawdown_pct = v;
            }
            if let Some(v) = brakes.stock_min_sma200_ratio {
                self.brakes.stock.min_sma200_ratio = v;
            }
            if let Some(v) = brakes.crypto_max_drawdown_pct {
                self.brakes.crypto.max_drawdown_pct = v;
            }
            if let Some(v) = brakes.crypto_min_sma200_ratio {
                self.brakes.crypto.min_sma200_ratio = v;
            }
        }

        if let Some(caps) = &section.smallcap_caps {
            let target = &mut self.smallcap_caps;
            if let Some(v) = caps.max_exposure_fraction {
                target.max_exposure_fraction = v;
            }
            if let Some(v) = caps.max_ladder_fraction {
                target.max_ladder_fraction = v;
            }
            if let Some(v) = caps.structural_rung_fraction {
                target.structural_rung_fraction = v;
                target.max_rung_fraction = v;
            }
            if let Some(v) = caps.sniper_rung_fraction {
                target.sniper_rung_fraction = v;
            }
            if let Some(v) = caps.max_rung_share {
                target.max_rung_share = v;
            }
        }

        if let Some(section) = &section.stock_thresholds {
            self.stock.apply(section);
        }
        if let Some(section) = &section.crypto_thresholds {
            self.crypto.apply(section);
        }
    }
}
