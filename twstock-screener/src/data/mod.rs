//! Market data module for Taiwan-listed equities.
//!
//! Provides the raw row types, the `DataProvider` abstraction and the
//! goodinfo.tw adapter that scrapes daily prices, institutional trading and
//! monthly revenue tables.

mod goodinfo;
mod provider;
mod rate_limiter;
mod table;

pub use goodinfo::GoodinfoAdapter;
pub use provider::{DataProvider, ProviderError};
pub use rate_limiter::RequestInterval;
pub use table::{parse_number, HtmlTable};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Stock Identifier
// ============================================================================

/// Textual stock code as used by TWSE/TPEx (e.g. `2330`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StockId(String);

impl StockId {
    /// Create an id from a code. The code is trimmed but otherwise unchecked.
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into().trim().to_string())
    }

    /// The code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Listed common stock codes are exactly four ASCII digits.
    ///
    /// ETFs, warrants and preferred shares use longer or lettered codes.
    pub fn is_common_equity(&self) -> bool {
        self.0.len() == 4 && self.0.bytes().all(|b| b.is_ascii_digit())
    }
}

impl fmt::Display for StockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for StockId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim();
        if code.is_empty() {
            return Err("stock id must not be empty".into());
        }
        if !code.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(format!("invalid stock id: {}", s));
        }
        Ok(Self(code.to_uppercase()))
    }
}

impl From<&str> for StockId {
    fn from(code: &str) -> Self {
        Self::new(code)
    }
}

// ============================================================================
// Raw Rows
// ============================================================================

/// One trading day of price and volume data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPriceRow {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    /// Traded volume in lots (張, 1,000 shares)
    pub volume: i64,
}

/// Net buy/sell of the three institutional investor classes for one day.
///
/// Values are signed lot counts: positive is net buying.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstitutionalRow {
    pub date: NaiveDate,
    pub foreign_net: i64,
    pub trust_net: i64,
    pub dealer_net: i64,
}

impl InstitutionalRow {
    /// Combined net of all three classes.
    pub fn total(&self) -> i64 {
        self.foreign_net + self.trust_net + self.dealer_net
    }

    /// All three classes bought on this day.
    pub fn all_buying(&self) -> bool {
        self.foreign_net > 0 && self.trust_net > 0 && self.dealer_net > 0
    }

    /// All three classes sold on this day.
    pub fn all_selling(&self) -> bool {
        self.foreign_net < 0 && self.trust_net < 0 && self.dealer_net < 0
    }
}

/// Monthly revenue figure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevenueRow {
    /// First day of the reported month
    pub month: NaiveDate,
    /// Revenue in hundred-million TWD (億)
    pub revenue: f64,
    /// Month-over-month growth (%)
    pub mom_growth_pct: Option<f64>,
    /// Year-over-year growth (%)
    pub yoy_growth_pct: Option<f64>,
}

/// Everything fetched for one stock in a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockHistory {
    pub stock_id: StockId,
    /// Display name when the source provides one
    pub name: Option<String>,
    /// Ascending by date
    pub prices: Vec<RawPriceRow>,
    /// May be empty when the source had nothing or failed
    pub institutional: Vec<InstitutionalRow>,
    /// May be empty when the source had nothing or failed
    pub revenue: Vec<RevenueRow>,
}

impl StockHistory {
    /// History with prices only.
    pub fn new(stock_id: StockId, prices: Vec<RawPriceRow>) -> Self {
        Self {
            stock_id,
            name: None,
            prices,
            institutional: Vec::new(),
            revenue: Vec::new(),
        }
    }

    /// Date of the most recent price row.
    pub fn latest_date(&self) -> Option<NaiveDate> {
        self.prices.iter().map(|r| r.date).max()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_common_equity_codes() {
        assert!(StockId::new("2330").is_common_equity());
        assert!(!StockId::new("0050B").is_common_equity());
        assert!(!StockId::new("00878").is_common_equity());
        assert!(!StockId::new("").is_common_equity());
    }

    #[test]
    fn test_parse_stock_id() {
        let id: StockId = " 2330 ".parse().unwrap();
        assert_eq!(id.as_str(), "2330");
        assert!("".parse::<StockId>().is_err());
        assert!("23 30".parse::<StockId>().is_err());
        assert!("../x".parse::<StockId>().is_err());
    }

    #[test]
    fn test_institutional_direction() {
        let date = NaiveDate::from_ymd_opt(2024, 5, 17).unwrap();
        let buy = InstitutionalRow {
            date,
            foreign_net: 10,
            trust_net: 1,
            dealer_net: 2,
        };
        assert!(buy.all_buying());
        assert!(!buy.all_selling());
        assert_eq!(buy.total(), 13);

        let mixed = InstitutionalRow {
            date,
            foreign_net: 10,
            trust_net: 0,
            dealer_net: -2,
        };
        assert!(!mixed.all_buying());
        assert!(!mixed.all_selling());
    }
}
