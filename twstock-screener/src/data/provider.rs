//! Data provider abstraction.
//!
//! Defines the `DataProvider` trait implemented by the goodinfo adapter and
//! by test doubles.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::fmt;
use tracing::warn;

use super::{InstitutionalRow, RawPriceRow, RevenueRow, StockHistory, StockId};

// ============================================================================
// Provider Error
// ============================================================================

/// Errors specific to data providers.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderError {
    /// Network error (connection failed, timeout)
    Network(String),
    /// Non-success HTTP status
    Status { status: u16, url: String },
    /// No data for the requested stock (unknown or delisted id)
    DataNotAvailable(String),
    /// The response could not be interpreted
    Parse(String),
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network(msg) => write!(f, "Network error: {}", msg),
            Self::Status { status, url } => write!(f, "HTTP {} from {}", status, url),
            Self::DataNotAvailable(msg) => write!(f, "Data not available: {}", msg),
            Self::Parse(msg) => write!(f, "Parse error: {}", msg),
        }
    }
}

impl std::error::Error for ProviderError {}

impl ProviderError {
    /// Check if the error is transient (a later attempt may succeed).
    ///
    /// `DataNotAvailable` and `Parse` are not: the stock or page itself is the problem.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::DataNotAvailable(_) | Self::Parse(_) => false,
        }
    }
}

// ============================================================================
// Data Provider Trait
// ============================================================================

/// Trait for market data sources.
#[async_trait]
pub trait DataProvider: Send + Sync {
    /// Provider name for logging (e.g. "goodinfo")
    fn name(&self) -> &'static str;

    /// Stocks to consider in a daily screen.
    ///
    /// Only common-equity codes are returned.
    async fn candidate_universe(&self) -> Result<Vec<StockId>, ProviderError>;

    /// Daily price rows between `start` and `end` inclusive, ascending by date.
    async fn daily_prices(
        &self,
        id: &StockId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<RawPriceRow>, ProviderError>;

    /// Daily institutional net rows, ascending by date.
    async fn institutional(&self, id: &StockId) -> Result<Vec<InstitutionalRow>, ProviderError>;

    /// Monthly revenue rows, ascending by month.
    async fn monthly_revenue(&self, id: &StockId) -> Result<Vec<RevenueRow>, ProviderError>;

    /// Display name of a stock, when known.
    async fn stock_name(&self, _id: &StockId) -> Option<String> {
        None
    }

    /// Fetch everything needed to analyse one stock.
    ///
    /// A price failure (or an empty price table) fails the whole fetch.
    /// Institutional and revenue failures are logged and leave those parts empty.
    async fn fetch_history(
        &self,
        id: &StockId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<StockHistory, ProviderError> {
        let prices = self.daily_prices(id, start, end).await?;
        if prices.is_empty() {
            return Err(ProviderError::DataNotAvailable(format!(
                "no price rows for {} between {} and {}",
                id, start, end
            )));
        }

        let institutional = match self.institutional(id).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!(
                    provider = self.name(),
                    stock_id = %id,
                    error = %e,
                    "Institutional data unavailable"
                );
                Vec::new()
            }
        };

        let revenue = match self.monthly_revenue(id).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!(
                    provider = self.name(),
                    stock_id = %id,
                    error = %e,
                    "Revenue data unavailable"
                );
                Vec::new()
            }
        };

        Ok(StockHistory {
            stock_id: id.clone(),
            name: self.stock_name(id).await,
            prices,
            institutional,
            revenue,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(ProviderError::Network("timeout".into()).is_transient());
        assert!(ProviderError::Status {
            status: 503,
            url: "https://goodinfo.tw".into()
        }
        .is_transient());
        assert!(ProviderError::Status {
            status: 429,
            url: "https://goodinfo.tw".into()
        }
        .is_transient());
        assert!(!ProviderError::Status {
            status: 404,
            url: "https://goodinfo.tw".into()
        }
        .is_transient());
        assert!(!ProviderError::DataNotAvailable("9999".into()).is_transient());
        assert!(!ProviderError::Parse("no table".into()).is_transient());
    }

    #[test]
    fn test_display() {
        let err = ProviderError::Status {
            status: 502,
            url: "https://goodinfo.tw/tw/x".into(),
        };
        assert_eq!(err.to_string(), "HTTP 502 from https://goodinfo.tw/tw/x");
    }
}
