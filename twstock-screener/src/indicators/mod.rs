//! Indicator engine.
//!
//! Turns raw price, institutional and revenue rows into one
//! [`IndicatorSnapshot`] per trading day. Every derived value is an
//! `Option`: `None` means there was not enough history to compute it, and
//! screening conditions treat it as a failure.

mod institutional;
mod moving_average;

pub use institutional::streaks;
pub use moving_average::{ema, ema_defined, macd, sma, MacdSeries};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

use crate::data::{InstitutionalRow, RawPriceRow, RevenueRow, StockHistory};

// ============================================================================
// Errors
// ============================================================================

/// Errors raised when rows cannot produce any snapshot.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IndicatorError {
    /// No price rows at all
    #[error("insufficient data: {0}")]
    InsufficientData(String),

    /// A price that is zero, negative or not finite
    #[error("degenerate price on {date}: {reason}")]
    DegeneratePrice { date: NaiveDate, reason: String },
}

// ============================================================================
// Snapshot
// ============================================================================

/// Indicator values for one stock on one trading day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    pub date: NaiveDate,
    pub close: f64,
    /// Traded volume in lots
    pub volume: i64,
    pub ma5: Option<f64>,
    pub ma20: Option<f64>,
    pub ma60: Option<f64>,
    pub macd_dif: Option<f64>,
    pub macd_signal: Option<f64>,
    pub macd_osc: Option<f64>,
    /// Foreign + trust + dealer net lots on this day
    pub institutional_net_total: Option<i64>,
    /// Signed streak, see [`streaks`]
    pub institutional_streak_days: Option<i64>,
    pub price_change_pct: Option<f64>,
    /// Latest monthly revenue (億) for a month starting on or before this day
    pub latest_revenue: Option<f64>,
    pub revenue_yoy_pct: Option<f64>,
}

/// Snapshot fields that a screening condition can reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Indicator {
    Close,
    Volume,
    Ma5,
    Ma20,
    Ma60,
    MacdDif,
    MacdSignal,
    MacdOsc,
    InstitutionalNetTotal,
    InstitutionalStreakDays,
    PriceChangePct,
    LatestRevenue,
    RevenueYoyPct,
}

impl Indicator {
    /// Field name as shown in messages and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Close => "close",
            Self::Volume => "volume",
            Self::Ma5 => "ma5",
            Self::Ma20 => "ma20",
            Self::Ma60 => "ma60",
            Self::MacdDif => "macd_dif",
            Self::MacdSignal => "macd_signal",
            Self::MacdOsc => "macd_osc",
            Self::InstitutionalNetTotal => "institutional_net_total",
            Self::InstitutionalStreakDays => "institutional_streak_days",
            Self::PriceChangePct => "price_change_pct",
            Self::LatestRevenue => "latest_revenue",
            Self::RevenueYoyPct => "revenue_yoy_pct",
        }
    }
}

impl fmt::Display for Indicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl IndicatorSnapshot {
    /// Value of one indicator as `f64`, `None` when undefined.
    pub fn value(&self, indicator: Indicator) -> Option<f64> {
        match indicator {
            Indicator::Close => Some(self.close),
            Indicator::Volume => Some(self.volume as f64),
            Indicator::Ma5 => self.ma5,
            Indicator::Ma20 => self.ma20,
            Indicator::Ma60 => self.ma60,
            Indicator::MacdDif => self.macd_dif,
            Indicator::MacdSignal => self.macd_signal,
            Indicator::MacdOsc => self.macd_osc,
            Indicator::InstitutionalNetTotal => self.institutional_net_total.map(|v| v as f64),
            Indicator::InstitutionalStreakDays => {
                self.institutional_streak_days.map(|v| v as f64)
            }
            Indicator::PriceChangePct => self.price_change_pct,
            Indicator::LatestRevenue => self.latest_revenue,
            Indicator::RevenueYoyPct => self.revenue_yoy_pct,
        }
    }
}

// ============================================================================
// Engine
// ============================================================================

/// One snapshot per price row of `history`, ascending by date.
pub fn compute_snapshots(history: &StockHistory) -> Result<Vec<IndicatorSnapshot>, IndicatorError> {
    compute_series(&history.prices, &history.institutional, &history.revenue)
}

/// Snapshot for the most recent trading day of `history`.
pub fn latest_snapshot(history: &StockHistory) -> Result<IndicatorSnapshot, IndicatorError> {
    compute_snapshots(history)?
        .pop()
        .ok_or_else(|| IndicatorError::InsufficientData("no price rows".into()))
}

/// Compute snapshots from raw rows.
///
/// Rows may arrive in any order; they are sorted by date and, for a
/// duplicated date, the row supplied last wins.
pub fn compute_series(
    prices: &[RawPriceRow],
    institutional: &[InstitutionalRow],
    revenue: &[RevenueRow],
) -> Result<Vec<IndicatorSnapshot>, IndicatorError> {
    if prices.is_empty() {
        return Err(IndicatorError::InsufficientData("no price rows".into()));
    }

    let prices = normalize(prices, |r| r.date);
    validate_prices(&prices)?;

    let closes: Vec<f64> = prices.iter().map(|r| r.close).collect();
    let ma5 = sma(&closes, 5);
    let ma20 = sma(&closes, 20);
    let ma60 = sma(&closes, 60);
    let m = macd(&closes);

    let institutional = normalize(institutional, |r| r.date);
    let by_date: HashMap<NaiveDate, &InstitutionalRow> =
        institutional.iter().map(|row| (row.date, row)).collect();
    let day_rows: Vec<Option<&InstitutionalRow>> =
        prices.iter().map(|row| by_date.get(&row.date).copied()).collect();
    let streak_series = streaks(day_rows.iter().copied());

    let revenue = normalize(revenue, |r| r.month);

    let snapshots = prices
        .iter()
        .enumerate()
        .map(|(i, row)| {
            let rev = revenue.iter().rev().find(|r| r.month <= row.date);

            IndicatorSnapshot {
                date: row.date,
                close: row.close,
                volume: row.volume,
                ma5: ma5[i],
                ma20: ma20[i],
                ma60: ma60[i],
                macd_dif: m.dif[i],
                macd_signal: m.signal[i],
                macd_osc: m.osc[i],
                institutional_net_total: day_rows[i].map(InstitutionalRow::total),
                institutional_streak_days: streak_series[i],
                price_change_pct: i
                    .checked_sub(1)
                    .map(|p| (row.close - prices[p].close) / prices[p].close * 100.0),
                latest_revenue: rev.map(|r| r.revenue),
                revenue_yoy_pct: rev.and_then(|r| r.yoy_growth_pct),
            }
        })
        .collect();

    Ok(snapshots)
}

/// Sort ascending by key; on duplicate keys keep the row supplied last.
fn normalize<T: Clone, F>(rows: &[T], key: F) -> Vec<T>
where
    F: Fn(&T) -> NaiveDate,
{
    let mut latest: HashMap<NaiveDate, &T> = HashMap::with_capacity(rows.len());
    for row in rows {
        latest.insert(key(row), row);
    }

    let mut out: Vec<T> = latest.into_values().cloned().collect();
    out.sort_by_key(|r| key(r));
    out
}

fn validate_prices(prices: &[RawPriceRow]) -> Result<(), IndicatorError> {
    for row in prices {
        let fields = [
            ("open", row.open),
            ("high", row.high),
            ("low", row.low),
            ("close", row.close),
        ];
        if let Some((name, value)) = fields.iter().find(|(_, v)| !v.is_finite() || *v <= 0.0) {
            return Err(IndicatorError::DegeneratePrice {
                date: row.date,
                reason: format!("{} = {}", name, value),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::StockId;
    use chrono::Duration;

    fn day(i: usize) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + Duration::days(i as i64)
    }

    fn price_rows(closes: &[f64]) -> Vec<RawPriceRow> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| RawPriceRow {
                date: day(i),
                open: c,
                high: c,
                low: c,
                close: c,
                volume: 6000,
            })
            .collect()
    }

    #[test]
    fn test_empty_prices_is_insufficient() {
        let err = compute_series(&[], &[], &[]).unwrap_err();
        assert!(matches!(err, IndicatorError::InsufficientData(_)));
    }

    #[test]
    fn test_degenerate_price() {
        let mut rows = price_rows(&[10.0, 11.0]);
        rows[1].low = 0.0;
        let err = compute_series(&rows, &[], &[]).unwrap_err();
        assert_eq!(
            err,
            IndicatorError::DegeneratePrice {
                date: day(1),
                reason: "low = 0".into()
            }
        );

        let mut rows = price_rows(&[10.0]);
        rows[0].close = f64::NAN;
        assert!(compute_series(&rows, &[], &[]).is_err());
    }

    #[test]
    fn test_short_history_leaves_undefined() {
        let rows = price_rows(&[10.0; 30]);
        let history = StockHistory::new(StockId::new("2330"), rows);
        let snap = latest_snapshot(&history).unwrap();

        assert_eq!(snap.ma5, Some(10.0));
        assert_eq!(snap.ma20, Some(10.0));
        assert_eq!(snap.ma60, None);
        assert!(snap.macd_dif.is_some());
        assert_eq!(snap.macd_signal, None);
        assert_eq!(snap.institutional_net_total, None);
        assert_eq!(snap.institutional_streak_days, None);
        assert_eq!(snap.price_change_pct, Some(0.0));
    }

    #[test]
    fn test_first_row_has_no_change() {
        let snaps = compute_series(&price_rows(&[10.0, 11.0]), &[], &[]).unwrap();
        assert_eq!(snaps[0].price_change_pct, None);
        assert!((snaps[1].price_change_pct.unwrap() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_out_of_order_and_duplicates() {
        let mut rows = price_rows(&[10.0, 11.0, 12.0]);
        rows.swap(0, 2);
        let mut dup = rows[1].clone();
        dup.close = 20.0;
        rows.push(dup);

        let snaps = compute_series(&rows, &[], &[]).unwrap();
        assert_eq!(snaps.len(), 3);
        assert_eq!(snaps[0].date, day(0));
        assert_eq!(snaps[1].close, 20.0);
        assert_eq!(snaps[2].close, 12.0);
    }

    #[test]
    fn test_institutional_fields_by_date() {
        let prices = price_rows(&[10.0, 11.0, 12.0]);
        let inst = vec![
            InstitutionalRow {
                date: day(1),
                foreign_net: 10,
                trust_net: 2,
                dealer_net: 1,
            },
            InstitutionalRow {
                date: day(2),
                foreign_net: 5,
                trust_net: 5,
                dealer_net: 5,
            },
        ];

        let snaps = compute_series(&prices, &inst, &[]).unwrap();
        assert_eq!(snaps[0].institutional_net_total, None);
        assert_eq!(snaps[0].institutional_streak_days, None);
        assert_eq!(snaps[1].institutional_net_total, Some(13));
        assert_eq!(snaps[2].institutional_net_total, Some(15));
        assert_eq!(snaps[2].institutional_streak_days, Some(2));
    }

    #[test]
    fn test_streak_restarts_after_trading_day_without_row() {
        let prices = price_rows(&[10.0, 11.0, 12.0, 13.0]);
        let buying = |i| InstitutionalRow {
            date: day(i),
            foreign_net: 1,
            trust_net: 1,
            dealer_net: 1,
        };
        let inst = vec![buying(0), buying(1), buying(3)];

        let snaps = compute_series(&prices, &inst, &[]).unwrap();
        assert_eq!(snaps[1].institutional_streak_days, Some(2));
        assert_eq!(snaps[2].institutional_streak_days, None);
        assert_eq!(snaps[2].institutional_net_total, None);
        assert_eq!(snaps[3].institutional_streak_days, Some(1));
    }

    #[test]
    fn test_rows_outside_trading_days_are_ignored() {
        let prices = price_rows(&[10.0, 11.0]);
        let inst: Vec<InstitutionalRow> = (0..4)
            .map(|i| InstitutionalRow {
                date: day(i),
                foreign_net: 1,
                trust_net: 1,
                dealer_net: 1,
            })
            .collect();

        let snaps = compute_series(&prices, &inst, &[]).unwrap();
        assert_eq!(snaps.len(), 2);
        assert_eq!(snaps[1].institutional_streak_days, Some(2));
    }

    #[test]
    fn test_revenue_not_after_date() {
        let prices = price_rows(&[10.0; 40]);
        let revenue = vec![
            RevenueRow {
                month: NaiveDate::from_ymd_opt(2023, 12, 1).unwrap(),
                revenue: 100.0,
                mom_growth_pct: None,
                yoy_growth_pct: Some(5.0),
            },
            RevenueRow {
                month: NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
                revenue: 120.0,
                mom_growth_pct: None,
                yoy_growth_pct: Some(9.0),
            },
        ];

        let snaps = compute_series(&prices, &[], &revenue).unwrap();
        // 2024-01-01
        assert_eq!(snaps[0].latest_revenue, Some(100.0));
        // 2024-02-09
        assert_eq!(snaps[39].latest_revenue, Some(120.0));
        assert_eq!(snaps[39].revenue_yoy_pct, Some(9.0));
    }

    #[test]
    fn test_indicator_value_lookup() {
        let snap = compute_series(&price_rows(&[10.0; 5]), &[], &[])
            .unwrap()
            .pop()
            .unwrap();
        assert_eq!(snap.value(Indicator::Volume), Some(6000.0));
        assert_eq!(snap.value(Indicator::Ma5), Some(10.0));
        assert_eq!(snap.value(Indicator::Ma20), None);
        assert_eq!(Indicator::InstitutionalStreakDays.to_string(), "institutional_streak_days");
    }
}
