//! Dip-rung generation.
//!
//! Three generators share one banned-zone filter:
//!
//! - [`RungGenerator::dip_rungs`]: tiered rungs below SMA200 behind crash brakes
//! - [`RungGenerator::smallcap_rungs`]: zone-gated, capped small-cap rungs
//! - [`RungGenerator::smallcap_probe`]: single deep probe after a small-cap flush
//!
//! Every rejected candidate is returned as a [`RungRejection`].

use crate::config::{AllocatorConfig, SmallCapCaps};
use crate::phase::MarketMetrics;
use crate::types::{AssetSnapshot, AssetType, Probability, RejectionReason, Rung, RungRejection};
use crate::zones::BannedZoneStore;

/// Rungs accepted by a generator plus the candidates it rejected.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RungBatch {
    pub rungs: Vec<Rung>,
    pub rejections: Vec<RungRejection>,
}

impl RungBatch {
    fn reject(&mut self, ticker: &str, price: f64, shares: u64, reason: RejectionReason) {
        tracing::debug!(
            ticker = %ticker,
            price,
            shares,
            reason = %reason,
            "Rung candidate rejected"
        );
        self.rejections
            .push(RungRejection::new(ticker, price, shares, reason));
    }
}

/// Small-cap buy zone by distance from SMA200.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmallCapZone {
    Structural,
    Sniper,
}

impl SmallCapZone {
    pub fn classify(pct_vs_sma200: f64, caps: &SmallCapCaps) -> Result<Self, RejectionReason> {
        if pct_vs_sma200 < caps.broken_pct {
            return Err(RejectionReason::ZoneBroken);
        }
        if pct_vs_sma200 > caps.parabolic_pct {
            return Err(RejectionReason::ZoneParabolic);
        }
        let (lo, hi) = caps.structural_band;
        if pct_vs_sma200 >= lo && pct_vs_sma200 <= hi {
            return Ok(Self::Structural);
        }
        let (lo, hi) = caps.sniper_band;
        if pct_vs_sma200 >= lo && pct_vs_sma200 < hi {
            return Ok(Self::Sniper);
        }
        Err(RejectionReason::OutsideBuyZone)
    }
}

/// Running small-cap exposure while a batch is assembled.
#[derive(Debug, Clone, Copy)]
struct Exposure {
    /// Position value plus pending and accepted rung cost
    total: f64,
    /// Pending and accepted rung cost
    ladder: f64,
}

impl Exposure {
    fn check(&self, cost: f64, pool: f64, caps: &SmallCapCaps) -> Result<(), RejectionReason> {
        if self.total + cost > pool * caps.max_exposure_fraction {
            return Err(RejectionReason::ExposureCap);
        }
        if self.ladder + cost > pool * caps.max_ladder_fraction {
            return Err(RejectionReason::LadderCap);
        }
        if cost > pool * caps.max_rung_fraction {
            return Err(RejectionReason::PerRungCap);
        }
        let future = self.total + cost;
        if future > 0.0 && cost > future * caps.max_rung_share {
            return Err(RejectionReason::ConcentrationCap);
        }
        Ok(())
    }

    fn add(&mut self, cost: f64) {
        self.total += cost;
        self.ladder += cost;
    }
}

/// Proposes new limit-buy rungs for one asset.
pub struct RungGenerator<'a> {
    config: &'a AllocatorConfig,
    zones: &'a dyn BannedZoneStore,
}

impl<'a> RungGenerator<'a> {
    pub fn new(config: &'a AllocatorConfig, zones: &'a dyn BannedZoneStore) -> Self {
        Self { config, zones }
    }

    /// Tiered dip rungs sized from dry powder.
    pub fn dip_rungs(
        &self,
        asset: &AssetSnapshot,
        metrics: &MarketMetrics,
        asset_type: AssetType,
        dry_powder: f64,
    ) -> RungBatch {
        let mut batch = RungBatch::default();
        let ticker = asset.ticker.as_str();

        let brake = self.config.brakes.for_type(asset_type);
        if metrics.drawdown_60d > brake.max_drawdown_pct
            || metrics.price < metrics.sma200 * brake.min_sma200_ratio
        {
            batch.reject(ticker, metrics.price, 0, RejectionReason::CrashBrake);
            return batch;
        }

        if metrics.pct_vs_sma200 > self.config.brakes.min_depth_pct {
            return batch;
        }

        for tier in self.config.dip_tiers.for_type(asset_type) {
            if !tier.contains(metrics.pct_vs_sma200) {
                continue;
            }
            let target = metrics.sma200 * tier.sma200_multiple;
            let allocation = dry_powder * tier.dry_powder_fraction;

            if allocation <= target {
                batch.reject(ticker, target, 0, RejectionReason::BelowMinimumSize);
                continue;
            }
            if !tier.probability.allows_placement(target, metrics.sma200) {
                continue;
            }
            let shares = (allocation / target).floor() as u64;
            if self.zones.is_banned(ticker, target) {
                batch.reject(ticker, target, shares, RejectionReason::BannedZone);
                continue;
            }
            batch
                .rungs
                .push(Rung::proposed(target, shares, tier.probability, tier.label));
        }

        batch
    }

    /// Zone-gated rungs for a capped small cap.
    pub fn smallcap_rungs(
        &self,
        asset: &AssetSnapshot,
        metrics: &MarketMetrics,
        dry_powder: f64,
        total_pool: f64,
    ) -> RungBatch {
        let mut batch = RungBatch::default();
        let ticker = asset.ticker.as_str();
        let caps = &self.config.smallcap_caps;

        let zone = match SmallCapZone::classify(metrics.pct_vs_sma200, caps) {
            Ok(zone) => zone,
            Err(reason) => {
                batch.reject(ticker, metrics.price, 0, reason);
                return batch;
            }
        };

        let pending = asset.pending_cost();
        let mut exposure = Exposure {
            total: asset.position_value() + pending,
            ladder: pending,
        };

        let candidates: Vec<(f64, f64, Probability, String)> = match zone {
            SmallCapZone::Structural => {
                let allocation = (dry_powder * caps.structural_dry_powder_fraction)
                    .min(total_pool * caps.structural_rung_fraction);
                caps.structural_multiples
                    .iter()
                    .map(|m| {
                        let target = metrics.sma200 * m;
                        let label = format!("Structural ({:.0}% vs SMA200)", (m - 1.0) * 100.0);
                        (target, allocation, Probability::P30, label)
                    })
                    .collect()
            }
            SmallCapZone::Sniper => vec![(
                metrics.sma200 * caps.sniper_multiple,
                total_pool * caps.sniper_rung_fraction,
                Probability::P10,
                "Sniper, deep flush".to_string(),
            )],
        };

        for (target, allocation, probability, label) in candidates {
            if metrics.price <= target {
                continue;
            }
            let shares = (allocation / target).floor() as u64;
            if shares == 0 {
                batch.reject(ticker, target, 0, RejectionReason::BelowMinimumSize);
                continue;
            }
            let cost = target * shares as f64;
            if let Err(reason) = exposure.check(cost, total_pool, caps) {
                batch.reject(ticker, target, shares, reason);
                continue;
            }
            if self.zones.is_banned(ticker, target) {
                batch.reject(ticker, target, shares, RejectionReason::BannedZone);
                continue;
            }
            exposure.add(cost);
            batch
                .rungs
                .push(Rung::proposed(target, shares, probability, label));
        }

        batch
    }

    /// IGNITION entry: one rung at fair value (SMA200), only while price has
    /// not run more than the chase ratio above it.
    pub fn fair_value_rung(
        &self,
        asset: &AssetSnapshot,
        metrics: &MarketMetrics,
        dry_powder: f64,
    ) -> RungBatch {
        let mut batch = RungBatch::default();
        let ticker = asset.ticker.as_str();
        let policy = &self.config.policy;

        let fair_value = metrics.sma200;
        if metrics.price > fair_value * policy.ignition_chase_ratio {
            return batch;
        }

        let shares = (dry_powder * policy.ignition_deploy_fraction / fair_value).floor() as u64;
        if shares == 0 {
            batch.reject(ticker, fair_value, 0, RejectionReason::BelowMinimumSize);
        } else if self.zones.is_banned(ticker, fair_value) {
            batch.reject(ticker, fair_value, shares, RejectionReason::BannedZone);
        } else {
            batch.rungs.push(Rung::proposed(
                fair_value,
                shares,
                Probability::P30,
                "IGNITION - Fair value entry",
            ));
        }
        batch
    }

    /// Single deep probe after a small-cap catastrophic trim.
    ///
    /// Offered only when the remaining position is small relative to the pool.
    pub fn smallcap_probe(
        &self,
        asset: &AssetSnapshot,
        metrics: &MarketMetrics,
        total_pool: f64,
    ) -> RungBatch {
        let mut batch = RungBatch::default();
        let ticker = asset.ticker.as_str();
        let caps = &self.config.smallcap_caps;

        let remaining = asset.position_value() * (1.0 - caps.catastrophic_trim_fraction);
        if remaining > total_pool * caps.probe_max_remaining_fraction {
            return batch;
        }

        let target = metrics.sma200 * caps.probe_multiple;
        let shares = (total_pool * caps.probe_fraction / target).floor() as u64;
        if shares == 0 {
            return batch;
        }
        let cost = target * shares as f64;
        if remaining + cost > total_pool * caps.max_exposure_fraction {
            batch.reject(ticker, target, shares, RejectionReason::ExposureCap);
            return batch;
        }
        if self.zones.is_banned(ticker, target) {
            batch.reject(ticker, target, shares, RejectionReason::BannedZone);
            return batch;
        }

        batch.rungs.push(Rung::proposed(
            target,
            shares,
            Probability::P5,
            "Sniper, post-flush probe",
        ));
        batch
    }
}
