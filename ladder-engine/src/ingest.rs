//! Market data ingestion.
//!
//! Turns raw per-ticker price history and precomputed indicators into a
//! [`PortfolioSnapshot`]. Missing indicators are replaced with neutral
//! values here, never inside the policy, and each substitution is recorded
//! as a [`DataGap`].

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::config::UniverseConfig;
use crate::state::UserState;
use crate::types::{AssetSnapshot, DataGap, Indicators, PortfolioSnapshot};

/// Trailing window for drawdown.
const DRAWDOWN_WINDOW: usize = 60;
/// Below this many closes the drawdown is reported as zero.
const DRAWDOWN_MIN_CLOSES: usize = 10;
const VOLUME_AVG_WINDOW: usize = 20;
const NEUTRAL_RSI: f64 = 50.0;
const NEUTRAL_VOLUME: f64 = 1_000_000.0;

/// Indicators as delivered upstream; any of them may be absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawIndicators {
    pub price: Option<f64>,
    pub rsi: Option<f64>,
    pub sma200: Option<f64>,
    pub ema20: Option<f64>,
    pub volume: Option<f64>,
    pub volume_avg20: Option<f64>,
    pub drawdown_60d: Option<f64>,
    pub change_24h_pct: Option<f64>,
}

/// Daily history for one ticker, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketSeries {
    #[serde(default)]
    pub closes: Vec<f64>,
    #[serde(default)]
    pub volumes: Vec<f64>,
    #[serde(default)]
    pub indicators: RawIndicators,
}

/// Source of fully resolved market data.
///
/// Fetching happens before planning; implementations only hand out what
/// they already hold.
pub trait MarketDataProvider {
    fn tickers(&self) -> Vec<String>;

    fn series(&self, ticker: &str) -> Option<MarketSeries>;
}

impl MarketDataProvider for HashMap<String, MarketSeries> {
    fn tickers(&self) -> Vec<String> {
        let mut tickers: Vec<String> = self.keys().cloned().collect();
        tickers.sort();
        tickers
    }

    fn series(&self, ticker: &str) -> Option<MarketSeries> {
        self.get(ticker).cloned()
    }
}

/// Percent below the highest of the trailing 60 closes, clamped at zero.
pub fn drawdown_60d(closes: &[f64], price: f64) -> f64 {
    if closes.len() < DRAWDOWN_MIN_CLOSES {
        return 0.0;
    }
    let window = &closes[closes.len().saturating_sub(DRAWDOWN_WINDOW)..];
    let high = window
        .iter()
        .copied()
        .filter(|c| c.is_finite())
        .fold(f64::MIN, f64::max);
    if high <= 0.0 {
        return 0.0;
    }
    ((high - price) / high * 100.0).max(0.0)
}

/// Percent change of the last close versus the one before.
pub fn change_24h_pct(closes: &[f64]) -> Option<f64> {
    match closes {
        [.., prev, last] if *prev > 0.0 && last.is_finite() => Some((last - prev) / prev * 100.0),
        _ => None,
    }
}

fn usable(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite() && *v >= 0.0)
}

fn positive(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite() && *v > 0.0)
}

fn trailing_mean(values: &[f64], window: usize) -> Option<f64> {
    let tail = &values[values.len().saturating_sub(window)..];
    (!tail.is_empty()).then(|| tail.iter().sum::<f64>() / tail.len() as f64)
}

/// Collects neutral substitutions for one ticker.
struct Gaps<'a> {
    ticker: &'a str,
    gaps: Vec<DataGap>,
}

impl Gaps<'_> {
    fn fill(&mut self, field: &str, value: Option<f64>, neutral: f64) -> f64 {
        value.unwrap_or_else(|| {
            self.note(field, neutral);
            neutral
        })
    }

    fn note(&mut self, field: &str, substituted: f64) {
        tracing::warn!(
            ticker = %self.ticker,
            field = %field,
            substituted,
            "Indicator missing, using neutral value"
        );
        self.gaps.push(DataGap {
            ticker: self.ticker.to_string(),
            field: field.to_string(),
            substituted,
        });
    }
}

/// Build one asset snapshot, or `None` when the series has no valid price.
fn asset_snapshot(
    ticker: &str,
    series: &MarketSeries,
    state: Option<&UserState>,
    gaps: &mut Vec<DataGap>,
) -> Option<AssetSnapshot> {
    let raw = &series.indicators;
    let price = positive(raw.price).or_else(|| positive(series.closes.last().copied()))?;

    let mut notes = Gaps {
        ticker,
        gaps: Vec::new(),
    };

    let rsi = notes.fill("rsi", usable(raw.rsi), NEUTRAL_RSI);
    let sma200 = notes.fill("sma200", positive(raw.sma200), price);
    let ema20 = notes.fill("ema20", positive(raw.ema20), price);

    let volume = usable(raw.volume).or_else(|| usable(series.volumes.last().copied()));
    let volume_avg20 = usable(raw.volume_avg20)
        .or_else(|| positive(trailing_mean(&series.volumes, VOLUME_AVG_WINDOW)));
    let (volume, volume_avg20) = match (volume, volume_avg20) {
        (Some(v), Some(avg)) => (v, avg),
        (Some(v), None) => (v, notes.fill("volume_avg20", None, v)),
        (None, Some(avg)) => (notes.fill("volume", None, avg), avg),
        (None, None) => (
            notes.fill("volume", None, NEUTRAL_VOLUME),
            notes.fill("volume_avg20", None, NEUTRAL_VOLUME),
        ),
    };

    let drawdown = match usable(raw.drawdown_60d) {
        Some(d) => d,
        None if series.closes.len() >= DRAWDOWN_MIN_CLOSES => drawdown_60d(&series.closes, price),
        None => notes.fill("drawdown_60d", None, 0.0),
    };

    let change_24h = raw
        .change_24h_pct
        .filter(|v| v.is_finite())
        .or_else(|| change_24h_pct(&series.closes));
    if change_24h.is_none() {
        notes.note("change_24h_pct", 0.0);
    }

    gaps.extend(notes.gaps);

    Some(AssetSnapshot {
        ticker: ticker.to_string(),
        price,
        indicators: Indicators {
            rsi,
            sma200,
            ema20,
            volume,
            volume_avg20,
            drawdown_60d: drawdown,
            change_24h_pct: change_24h,
        },
        position_shares: state.map_or(0, |s| s.shares(ticker)),
        pending_orders: state.map(|s| s.pending_orders(ticker)).unwrap_or_default(),
    })
}

/// Materialise a planning snapshot from provider data and user state.
///
/// Cash comes from the user state when present, else `default_cash`.
/// Banned tickers and tickers without a usable price are skipped.
pub fn build_snapshot(
    provider: &dyn MarketDataProvider,
    universe: &UniverseConfig,
    state: Option<&UserState>,
    default_cash: f64,
) -> PortfolioSnapshot {
    let mut snapshot = PortfolioSnapshot::new(state.map_or(default_cash, |s| s.cash));
    let mut gaps = Vec::new();

    for ticker in provider.tickers() {
        if universe.is_banned(&ticker) {
            continue;
        }
        let Some(series) = provider.series(&ticker) else {
            tracing::warn!(ticker = %ticker, "No market data, skipping");
            continue;
        };
        if let Some(asset) = asset_snapshot(&ticker, &series, state, &mut gaps) {
            snapshot.assets.insert(ticker, asset);
        } else {
            tracing::warn!(ticker = %ticker, "No valid price, skipping");
        }
    }

    snapshot.data_gaps = gaps;
    tracing::debug!(
        assets = snapshot.assets.len(),
        data_gaps = snapshot.data_gaps.len(),
        "Snapshot built"
    );
    snapshot
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Probability;

    fn full_series(price: f64) -> MarketSeries {
        MarketSeries {
            closes: vec![price; 20],
            volumes: vec![1_000.0; 20],
            indicators: RawIndicators {
                price: Some(price),
                rsi: Some(45.0),
                sma200: Some(price * 1.1),
                ema20: Some(price),
                volume: Some(800.0),
                volume_avg20: Some(1_000.0),
                drawdown_60d: None,
                change_24h_pct: None,
            },
        }
    }

    #[test]
    fn test_drawdown() {
        let mut closes = vec![100.0; 30];
        closes.push(120.0);
        closes.extend(vec![100.0; 10]);
        let dd = drawdown_60d(&closes, 90.0);
        assert!((dd - 25.0).abs() < 1e-9);

        // Above the high clamps to zero
        assert_eq!(drawdown_60d(&closes, 130.0), 0.0);
        // Too little history
        assert_eq!(drawdown_60d(&[100.0; 5], 50.0), 0.0);
    }

    #[test]
    fn test_drawdown_uses_trailing_window() {
        let mut closes = vec![200.0];
        closes.extend(vec![100.0; 60]);
        assert_eq!(drawdown_60d(&closes, 100.0), 0.0);
    }

    #[test]
    fn test_change_24h() {
        let change = change_24h_pct(&[100.0, 80.0]).unwrap();
        assert!((change + 20.0).abs() < 1e-9);
        assert_eq!(change_24h_pct(&[100.0]), None);
        assert_eq!(change_24h_pct(&[]), None);
    }

    #[test]
    fn test_complete_series_has_no_gaps() {
        let mut data = HashMap::new();
        data.insert("AAPL".to_string(), full_series(100.0));
        let snapshot = build_snapshot(&data, &UniverseConfig::default(), None, 5_000.0);

        assert_eq!(snapshot.cash_available, 5_000.0);
        assert!(snapshot.data_gaps.is_empty());
        let aapl = &snapshot.assets["AAPL"];
        assert_eq!(aapl.indicators.drawdown_60d, 0.0);
        assert_eq!(aapl.indicators.change_24h_pct, Some(0.0));
    }

    #[test]
    fn test_missing_indicators_default_to_neutral() {
        let mut data = HashMap::new();
        data.insert(
            "NVDA".to_string(),
            MarketSeries {
                closes: vec![50.0],
                volumes: vec![],
                indicators: RawIndicators::default(),
            },
        );
        let snapshot = build_snapshot(&data, &UniverseConfig::default(), None, 0.0);

        let nvda = &snapshot.assets["NVDA"];
        assert_eq!(nvda.price, 50.0);
        assert_eq!(nvda.indicators.rsi, 50.0);
        assert_eq!(nvda.indicators.sma200, 50.0);
        assert_eq!(nvda.indicators.ema20, 50.0);
        assert_eq!(nvda.indicators.volume, nvda.indicators.volume_avg20);
        assert_eq!(nvda.indicators.drawdown_60d, 0.0);
        assert_eq!(nvda.indicators.change_24h_pct, None);

        let fields: Vec<&str> = snapshot.data_gaps.iter().map(|g| g.field.as_str()).collect();
        assert_eq!(
            fields,
            vec![
                "rsi",
                "sma200",
                "ema20",
                "volume",
                "volume_avg20",
                "drawdown_60d",
                "change_24h_pct"
            ]
        );
    }

    #[test]
    fn test_priceless_and_banned_tickers_skipped() {
        let mut data = HashMap::new();
        data.insert("BAD".to_string(), MarketSeries::default());
        data.insert("ETH".to_string(), full_series(3_000.0));
        data.insert("MSFT".to_string(), full_series(400.0));
        let snapshot = build_snapshot(&data, &UniverseConfig::default(), None, 0.0);

        assert_eq!(snapshot.assets.len(), 1);
        assert!(snapshot.assets.contains_key("MSFT"));
    }

    #[test]
    fn test_user_state_supplies_position_and_orders() {
        let state = UserState::parse(Some(
            r#"{
                "cash": 12000,
                "holdings": { "AAPL": 40 },
                "limits": { "AAPL": [{ "price": 90, "size": 5, "probability": 60 }] }
            }"#,
        ))
        .unwrap()
        .unwrap();
        let mut data = HashMap::new();
        data.insert("AAPL".to_string(), full_series(100.0));
        let snapshot = build_snapshot(&data, &UniverseConfig::default(), Some(&state), 0.0);

        assert_eq!(snapshot.cash_available, 12_000.0);
        let aapl = &snapshot.assets["AAPL"];
        assert_eq!(aapl.position_shares, 40);
        assert_eq!(aapl.pending_orders.len(), 1);
        assert_eq!(aapl.pending_orders[0].probability, Probability::P60);
    }
}
