//! Core data model for one planning cycle.
//!
//! Inputs ([`PortfolioSnapshot`], [`AssetSnapshot`], [`PendingOrder`]) are
//! constructed fresh each cycle and never mutated by the engine. Outputs
//! ([`Action`], [`AssetPlan`], [`AllocationPlan`]) are always newly built.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::EngineError;

// ============================================================================
// Asset Type
// ============================================================================

/// Closed set of asset variants. Selected once per asset per cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssetType {
    Stock,
    Crypto,
    /// Higher-volatility small cap with exposure caps
    SmallCap,
}

impl std::fmt::Display for AssetType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stock => write!(f, "STOCK"),
            Self::Crypto => write!(f, "CRYPTO"),
            Self::SmallCap => write!(f, "SMALL_CAP"),
        }
    }
}

// ============================================================================
// Probability Tiers
// ============================================================================

/// Conviction tier of a rung.
///
/// Higher tiers sit closer to the current price and are the first to be
/// cancelled when risk rises. Serialized as the bare integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Probability {
    /// Deepest value / crash rung
    P5,
    /// Deep or sniper rung
    P10,
    /// Standard dip rung
    #[default]
    P30,
    P60,
    P80,
}

impl Probability {
    pub fn value(self) -> u8 {
        match self {
            Self::P5 => 5,
            Self::P10 => 10,
            Self::P30 => 30,
            Self::P60 => 60,
            Self::P80 => 80,
        }
    }

    /// P60 and P80 rungs.
    pub fn is_high_conviction(self) -> bool {
        self >= Self::P60
    }

    /// Whether a rung of this tier may be placed at `target`.
    ///
    /// P80 only below 0.92×SMA200, P60 only below 0.95×SMA200.
    pub fn allows_placement(self, target: f64, sma200: f64) -> bool {
        match self {
            Self::P80 => target < sma200 * 0.92,
            Self::P60 => target < sma200 * 0.95,
            _ => true,
        }
    }
}

impl From<Probability> for u8 {
    fn from(p: Probability) -> Self {
        p.value()
    }
}

impl TryFrom<u8> for Probability {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            5 => Ok(Self::P5),
            10 => Ok(Self::P10),
            30 => Ok(Self::P30),
            60 => Ok(Self::P60),
            80 => Ok(Self::P80),
            other => Err(format!("unknown probability tier {other}")),
        }
    }
}

impl std::fmt::Display for Probability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}%", self.value())
    }
}

// ============================================================================
// Orders and Rungs
// ============================================================================

/// An existing open limit buy order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingOrder {
    pub price: f64,
    #[serde(alias = "size")]
    pub shares: u64,
    #[serde(default)]
    pub probability: Probability,
}

impl PendingOrder {
    pub fn new(price: f64, shares: u64, probability: Probability) -> Self {
        Self {
            price,
            shares,
            probability,
        }
    }

    /// Cash held by this order.
    pub fn cost(&self) -> f64 {
        self.price * self.shares as f64
    }
}

/// Status of a ladder entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RungStatus {
    Keep,
    New,
    Cancel,
}

/// A single limit order rung, existing or proposed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rung {
    pub price: f64,
    pub shares: u64,
    pub probability: Probability,
    pub status: RungStatus,
    pub reason: String,
    /// `price × shares`, set on newly proposed rungs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dollar_value: Option<f64>,
}

impl Rung {
    /// A newly proposed buy rung.
    pub fn proposed(
        price: f64,
        shares: u64,
        probability: Probability,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            price,
            shares,
            probability,
            status: RungStatus::New,
            reason: reason.into(),
            dollar_value: Some(price * shares as f64),
        }
    }

    /// An existing order that stays in place.
    pub fn kept(order: &PendingOrder) -> Self {
        Self {
            price: order.price,
            shares: order.shares,
            probability: order.probability,
            status: RungStatus::Keep,
            reason: "Active".to_string(),
            dollar_value: None,
        }
    }

    /// An existing order marked for cancellation.
    pub fn cancelled(order: &PendingOrder, reason: impl Into<String>) -> Self {
        Self {
            price: order.price,
            shares: order.shares,
            probability: order.probability,
            status: RungStatus::Cancel,
            reason: reason.into(),
            dollar_value: None,
        }
    }

    pub fn cost(&self) -> f64 {
        self.dollar_value
            .unwrap_or_else(|| self.price * self.shares as f64)
    }

    /// Matches an order by price within `epsilon` and exact size.
    pub fn matches(&self, price: f64, shares: u64, epsilon: f64) -> bool {
        (self.price - price).abs() < epsilon && self.shares == shares
    }
}

// ============================================================================
// Rejections
// ============================================================================

/// Why a candidate rung was not emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectionReason {
    ExposureCap,
    LadderCap,
    PerRungCap,
    ConcentrationCap,
    BannedZone,
    ZoneBroken,
    ZoneParabolic,
    OutsideBuyZone,
    BelowMinimumSize,
    InsufficientDryPowder,
    BootstrapCap,
    CrashBrake,
}

impl std::fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ExposureCap => write!(f, "total exposure cap hit"),
            Self::LadderCap => write!(f, "ladder capital cap hit"),
            Self::PerRungCap => write!(f, "per-rung cap hit"),
            Self::ConcentrationCap => write!(f, "single rung too large a share of exposure"),
            Self::BannedZone => write!(f, "price inside a banned zone"),
            Self::ZoneBroken => write!(f, "broken below structure, no knife catching"),
            Self::ZoneParabolic => write!(f, "parabolic, no chasing"),
            Self::OutsideBuyZone => write!(f, "outside buy zones"),
            Self::BelowMinimumSize => write!(f, "allocation too small for one share"),
            Self::InsufficientDryPowder => write!(f, "not enough dry powder"),
            Self::BootstrapCap => write!(f, "bootstrap deployment cap hit"),
            Self::CrashBrake => write!(f, "crash brake engaged"),
        }
    }
}

/// A candidate rung that was rejected, kept for inspection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RungRejection {
    pub ticker: String,
    pub price: f64,
    pub shares: u64,
    pub reason: RejectionReason,
}

impl RungRejection {
    pub fn new(ticker: &str, price: f64, shares: u64, reason: RejectionReason) -> Self {
        Self {
            ticker: ticker.to_string(),
            price,
            shares,
            reason,
        }
    }
}

// ============================================================================
// Snapshots
// ============================================================================

/// Precomputed indicators for one asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Indicators {
    pub rsi: f64,
    pub sma200: f64,
    pub ema20: f64,
    pub volume: f64,
    pub volume_avg20: f64,
    /// Percent below the trailing 60-period high, clamped at 0
    #[serde(default)]
    pub drawdown_60d: f64,
    /// Percent change versus the previous close, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_24h_pct: Option<f64>,
}

/// One asset's state at plan time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetSnapshot {
    pub ticker: String,
    pub price: f64,
    pub indicators: Indicators,
    #[serde(default)]
    pub position_shares: u64,
    #[serde(default)]
    pub pending_orders: Vec<PendingOrder>,
}

impl AssetSnapshot {
    pub fn position_value(&self) -> f64 {
        self.position_shares as f64 * self.price
    }

    /// Cash reserved by all pending orders.
    pub fn pending_cost(&self) -> f64 {
        self.pending_orders.iter().map(PendingOrder::cost).sum()
    }

    /// Check numeric preconditions for planning this asset.
    pub fn validate(&self) -> Result<(), EngineError> {
        let invalid = |what: &str, value: f64| {
            EngineError::InvalidSnapshot(format!("{}: {what} must be positive, got {value}", self.ticker))
        };

        if !(self.price.is_finite() && self.price > 0.0) {
            return Err(invalid("price", self.price));
        }
        let ind = &self.indicators;
        if !(ind.sma200.is_finite() && ind.sma200 > 0.0) {
            return Err(invalid("sma200", ind.sma200));
        }
        if !(ind.ema20.is_finite() && ind.ema20 > 0.0) {
            return Err(invalid("ema20", ind.ema20));
        }
        for (name, value) in [
            ("rsi", ind.rsi),
            ("volume", ind.volume),
            ("volume_avg20", ind.volume_avg20),
            ("drawdown_60d", ind.drawdown_60d),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(EngineError::InvalidSnapshot(format!(
                    "{}: {name} must be a non-negative number, got {value}",
                    self.ticker
                )));
            }
        }
        if let Some(order) = self
            .pending_orders
            .iter()
            .find(|o| !(o.price.is_finite() && o.price > 0.0))
        {
            return Err(invalid("pending order price", order.price));
        }
        Ok(())
    }
}

/// An indicator that was substituted with a neutral default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataGap {
    pub ticker: String,
    pub field: String,
    pub substituted: f64,
}

/// An asset left out of a plan because its data was unusable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedAsset {
    pub ticker: String,
    pub reason: String,
}

/// Full input of one planning cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    pub cash_available: f64,
    /// Keyed by ticker; iteration order is the processing order
    #[serde(default)]
    pub assets: BTreeMap<String, AssetSnapshot>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub data_gaps: Vec<DataGap>,
}

impl PortfolioSnapshot {
    pub fn new(cash_available: f64) -> Self {
        Self {
            cash_available,
            ..Default::default()
        }
    }

    pub fn with_asset(mut self, asset: AssetSnapshot) -> Self {
        self.assets.insert(asset.ticker.clone(), asset);
        self
    }

    /// Check the preconditions that make the whole snapshot unusable.
    ///
    /// Per-asset numeric problems are not checked here; the planner skips
    /// those assets individually.
    pub fn validate(&self) -> Result<(), EngineError> {
        if !self.cash_available.is_finite() || self.cash_available < 0.0 {
            return Err(EngineError::InvalidSnapshot(format!(
                "cash_available must be a non-negative number, got {}",
                self.cash_available
            )));
        }
        if let Some((key, asset)) = self.assets.iter().find(|(key, asset)| **key != asset.ticker) {
            return Err(EngineError::InvalidSnapshot(format!(
                "asset keyed {key} carries ticker {}",
                asset.ticker
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Phase and Regime
// ============================================================================

/// Market phase of a single asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Catastrophic,
    Reset,
    Normal,
    Ignition,
    Meltup,
    /// Crypto only
    Parabolic,
}

impl Phase {
    /// Ordinal rank for reporting, 0 = worst.
    pub fn score(self) -> u8 {
        match self {
            Self::Catastrophic => 0,
            Self::Reset => 2,
            Self::Normal => 4,
            Self::Ignition => 6,
            Self::Meltup => 8,
            Self::Parabolic => 10,
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Catastrophic => "CATASTROPHIC",
            Self::Reset => "RESET",
            Self::Normal => "NORMAL",
            Self::Ignition => "IGNITION",
            Self::Meltup => "MELTUP",
            Self::Parabolic => "PARABOLIC",
        };
        write!(f, "{name}")
    }
}

/// Phase classification with its audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseClassification {
    pub phase: Phase,
    pub reason: String,
    pub score: u8,
}

impl PhaseClassification {
    pub fn new(phase: Phase, reason: impl Into<String>) -> Self {
        Self {
            phase,
            reason: reason.into(),
            score: phase.score(),
        }
    }
}

/// Market-wide regime derived from the benchmark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RegimeKind {
    Normal,
    Stress,
    Reset,
}

impl std::fmt::Display for RegimeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Normal => write!(f, "NORMAL"),
            Self::Stress => write!(f, "STRESS"),
            Self::Reset => write!(f, "RESET"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalRegime {
    pub regime: RegimeKind,
    pub reason: String,
    /// Whether single-stock stress may escalate to RESET
    pub allow_reset: bool,
}

// ============================================================================
// Actions
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CoreAction {
    Hold,
    Exit,
    Monitor,
}

impl std::fmt::Display for CoreAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Hold => write!(f, "HOLD"),
            Self::Exit => write!(f, "EXIT"),
            Self::Monitor => write!(f, "MONITOR"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoreTrim {
    pub shares: u64,
    pub reason: String,
}

/// One staged profit-taking sell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExitTier {
    pub price: f64,
    pub shares: u64,
    pub reason: String,
}

/// Per-asset decision before reconciliation.
#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    pub phase: Phase,
    pub core_trim: Option<CoreTrim>,
    pub core_action: CoreAction,
    pub new_rungs: Vec<Rung>,
    pub modified_rungs: Vec<Rung>,
    pub meltup_exits: Option<Vec<ExitTier>>,
    pub rejections: Vec<RungRejection>,
}

impl Action {
    pub fn hold(phase: Phase) -> Self {
        Self {
            phase,
            core_trim: None,
            core_action: CoreAction::Hold,
            new_rungs: Vec::new(),
            modified_rungs: Vec::new(),
            meltup_exits: None,
            rejections: Vec::new(),
        }
    }

    pub fn monitor(phase: Phase) -> Self {
        Self {
            core_action: CoreAction::Monitor,
            ..Self::hold(phase)
        }
    }
}

// ============================================================================
// Plan
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionInfo {
    pub shares: u64,
    pub value: f64,
}

/// Final plan for one asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetPlan {
    pub ticker: String,
    pub asset_type: AssetType,
    pub price: f64,
    pub regime: PhaseClassification,
    pub core_action: CoreAction,
    pub core_trim: Option<CoreTrim>,
    pub ladder: Vec<Rung>,
    pub meltup_exits: Option<Vec<ExitTier>>,
    pub position: PositionInfo,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rejected_rungs: Vec<RungRejection>,
}

impl AssetPlan {
    pub fn rungs_with_status(&self, status: RungStatus) -> impl Iterator<Item = &Rung> {
        self.ladder.iter().filter(move |r| r.status == status)
    }
}

/// Global cash accounting. `deployed_value + dry_powder == total_pool`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalSummary {
    pub total_pool: f64,
    pub initial_cash: f64,
    pub deployed_value: f64,
    pub dry_powder: f64,
    pub regime: GlobalRegime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationPlan {
    pub asset_plans: BTreeMap<String, AssetPlan>,
    pub global: GlobalSummary,
    #[serde(default)]
    pub rejected_rungs: Vec<RungRejection>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped_assets: Vec<SkippedAsset>,
    #[serde(default)]
    pub summary: String,
}
