//! goodinfo.tw adapter.
//!
//! Scrapes HTML tables from goodinfo.tw (台灣股市資訊網):
//! - `StockList.asp` "三大法人連買" smart list for the candidate universe
//! - `ShowK_Chart.asp` for daily OHLC and volume
//! - `ShowBuySaleChart.asp` for daily institutional net buy/sell
//! - `ShowSaleMonChart.asp` for monthly revenue
//!
//! Requests are spaced by [`RequestInterval`]; the site blocks bursts.

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use scraper::{Html, Selector};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};
use twstock_common::config::DataConfig;

use super::provider::{DataProvider, ProviderError};
use super::rate_limiter::RequestInterval;
use super::table::{parse_number, HtmlTable};
use super::{InstitutionalRow, RawPriceRow, RevenueRow, StockId};

/// Smart-selection list "三大法人連買 – 日", sheet "法人買賣_三大".
const UNIVERSE_QUERY: &str = "SEARCH_WORD=&MARKET_CAT=%E6%99%BA%E6%85%A7%E9%81%B8%E8%82%A1\
&INDUSTRY_CAT=%E4%B8%89%E5%A4%A7%E6%B3%95%E4%BA%BA%E9%80%A3%E8%B2%B7+%E2%80%93+%E6%97%A5\
%40%40%E4%B8%89%E5%A4%A7%E6%B3%95%E4%BA%BA%E9%80%A3%E7%BA%8C%E8%B2%B7%E8%B6%85\
%40%40%E4%B8%89%E5%A4%A7%E6%B3%95%E4%BA%BA%E9%80%A3%E7%BA%8C%E8%B2%B7%E8%B6%85+%E2%80%93+%E6%97%A5\
&STOCK_CODE=&RANK=0&STEP=DATA&SHEET=%E6%B3%95%E4%BA%BA%E8%B2%B7%E8%B3%A3_%E4%B8%89%E5%A4%A7";

const LIST_TABLE: &str = "#tblStockList";
const DETAIL_TABLE: &str = "#tblDetail";

/// goodinfo.tw scraping adapter.
pub struct GoodinfoAdapter {
    client: Client,
    base_url: String,
    cookie: Option<String>,
    limiter: RequestInterval,
    names: Mutex<HashMap<StockId, String>>,
}

impl GoodinfoAdapter {
    /// Create an adapter from the data configuration.
    pub fn new(config: &DataConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(config.user_agent.clone())
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            cookie: config.cookie.clone().filter(|c| !c.trim().is_empty()),
            limiter: RequestInterval::from_millis("goodinfo", config.request_interval_ms),
            names: Mutex::new(HashMap::new()),
        }
    }

    /// GET a page, honouring the request interval.
    async fn fetch_page(&self, path_and_query: &str) -> Result<String, ProviderError> {
        let url = format!("{}{}", self.base_url, path_and_query);
        self.limiter.acquire().await;

        debug!(url = %url, "Fetching goodinfo page");

        let mut request = self
            .client
            .get(&url)
            .header("Referer", format!("{}/tw/index.asp", self.base_url));
        if let Some(ref cookie) = self.cookie {
            request = request.header("Cookie", cookie.as_str());
        }

        let response = request
            .send()
            .await
            .map_err(|e| ProviderError::Network(format!("{}: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Status {
                status: status.as_u16(),
                url,
            });
        }

        response
            .text()
            .await
            .map_err(|e| ProviderError::Network(format!("reading {}: {}", url, e)))
    }

    /// Fetch a page and extract one table; a missing table means no data.
    async fn fetch_table(
        &self,
        path_and_query: &str,
        css: &str,
        id: Option<&StockId>,
    ) -> Result<(HtmlTable, String), ProviderError> {
        let html = self.fetch_page(path_and_query).await?;
        let table = HtmlTable::find(&html, css)?.ok_or_else(|| {
            ProviderError::DataNotAvailable(match id {
                Some(id) => format!("no {} table for {}", css, id),
                None => format!("no {} table", css),
            })
        })?;
        Ok((table, html))
    }

    async fn remember_name(&self, id: &StockId, name: String) {
        if !name.is_empty() {
            self.names.lock().await.insert(id.clone(), name);
        }
    }
}

#[async_trait]
impl DataProvider for GoodinfoAdapter {
    fn name(&self) -> &'static str {
        "goodinfo"
    }

    async fn candidate_universe(&self) -> Result<Vec<StockId>, ProviderError> {
        let path = format!("/tw2/StockList.asp?{}", UNIVERSE_QUERY);
        let (table, _) = self.fetch_table(&path, LIST_TABLE, None).await?;

        let entries = parse_universe(&table)?;
        let mut ids = Vec::with_capacity(entries.len());
        for (id, name) in entries {
            if let Some(name) = name {
                self.remember_name(&id, name).await;
            }
            ids.push(id);
        }

        info!(count = ids.len(), "Fetched candidate universe");
        Ok(ids)
    }

    async fn daily_prices(
        &self,
        id: &StockId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<RawPriceRow>, ProviderError> {
        let path = format!(
            "/tw/ShowK_Chart.asp?STOCK_ID={}&CHT_CAT=DATE&PRICE_ADJ=F&START_DT={}&END_DT={}",
            id,
            start.format("%Y-%m-%d"),
            end.format("%Y-%m-%d")
        );
        let (table, html) = self.fetch_table(&path, DETAIL_TABLE, Some(id)).await?;

        if let Some(name) = name_from_title(&html, id) {
            self.remember_name(id, name).await;
        }

        let rows: Vec<RawPriceRow> = parse_daily_rows(&table)?
            .into_iter()
            .filter(|r| r.date >= start && r.date <= end)
            .collect();

        debug!(stock_id = %id, rows = rows.len(), "Parsed daily prices");
        Ok(rows)
    }

    async fn institutional(&self, id: &StockId) -> Result<Vec<InstitutionalRow>, ProviderError> {
        let path = format!("/tw/ShowBuySaleChart.asp?STOCK_ID={}&CHT_CAT=DATE", id);
        let (table, _) = self.fetch_table(&path, DETAIL_TABLE, Some(id)).await?;
        let rows = parse_institutional_rows(&table)?;
        debug!(stock_id = %id, rows = rows.len(), "Parsed institutional rows");
        Ok(rows)
    }

    async fn monthly_revenue(&self, id: &StockId) -> Result<Vec<RevenueRow>, ProviderError> {
        let path = format!("/tw/ShowSaleMonChart.asp?STOCK_ID={}", id);
        let (table, _) = self.fetch_table(&path, DETAIL_TABLE, Some(id)).await?;
        let rows = parse_revenue_rows(&table)?;
        debug!(stock_id = %id, rows = rows.len(), "Parsed revenue rows");
        Ok(rows)
    }

    async fn stock_name(&self, id: &StockId) -> Option<String> {
        self.names.lock().await.get(id).cloned()
    }
}

// ============================================================================
// Table Parsing
// ============================================================================

fn require_column(
    table: &HtmlTable,
    what: &str,
    all: &[&str],
    none: &[&str],
) -> Result<usize, ProviderError> {
    table.find_column(all, none).ok_or_else(|| {
        ProviderError::Parse(format!("missing {} column in {:?}", what, table.headers))
    })
}

/// Parse goodinfo trade dates such as `'24/05/17` or `2024/05/17`.
pub(crate) fn parse_trade_date(raw: &str) -> Option<NaiveDate> {
    let cleaned = raw.trim().trim_start_matches('\'').trim();
    ["%y/%m/%d", "%Y/%m/%d", "%Y-%m-%d"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(cleaned, fmt).ok())
}

/// Parse revenue months such as `2024/04`, returning the first of the month.
pub(crate) fn parse_month(raw: &str) -> Option<NaiveDate> {
    let cleaned = raw.trim().trim_start_matches('\'').trim();
    let with_day = format!("{}/01", cleaned);
    ["%Y/%m/%d", "%y/%m/%d"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(&with_day, fmt).ok())
}

fn parse_lots(raw: &str) -> Option<i64> {
    parse_number(raw).map(|v| v.round() as i64)
}

/// Sort ascending and keep the last row for a duplicated date.
fn sort_dedup_by_date<T, F>(mut rows: Vec<T>, key: F) -> Vec<T>
where
    F: Fn(&T) -> NaiveDate,
{
    rows.sort_by_key(|r| key(r));
    let mut out: Vec<T> = Vec::with_capacity(rows.len());
    for row in rows {
        match out.last() {
            Some(last) if key(last) == key(&row) => {
                if let Some(slot) = out.last_mut() {
                    *slot = row;
                }
            }
            _ => out.push(row),
        }
    }
    out
}

fn parse_universe(table: &HtmlTable) -> Result<Vec<(StockId, Option<String>)>, ProviderError> {
    let code_col = require_column(table, "代號", &["代號"], &[])?;
    let name_col = table.find_column(&["名稱"], &[]);

    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for i in 0..table.len() {
        let id = StockId::new(table.cell(i, code_col));
        if !id.is_common_equity() || !seen.insert(id.clone()) {
            continue;
        }
        let name = name_col
            .map(|c| table.cell(i, c).to_string())
            .filter(|n| !n.is_empty());
        out.push((id, name));
    }
    Ok(out)
}

fn parse_daily_rows(table: &HtmlTable) -> Result<Vec<RawPriceRow>, ProviderError> {
    let date_col = require_column(table, "date", &["日期"], &[])?;
    let open_col = require_column(table, "open", &["開盤"], &[])?;
    let high_col = require_column(table, "high", &["最高"], &[])?;
    let low_col = require_column(table, "low", &["最低"], &[])?;
    let close_col = require_column(table, "close", &["收盤"], &[])?;
    let volume_col = require_column(table, "volume", &["成交", "張"], &[])?;

    let rows: Vec<RawPriceRow> = (0..table.len())
        .filter_map(|i| {
            Some(RawPriceRow {
                date: parse_trade_date(table.cell(i, date_col))?,
                open: parse_number(table.cell(i, open_col))?,
                high: parse_number(table.cell(i, high_col))?,
                low: parse_number(table.cell(i, low_col))?,
                close: parse_number(table.cell(i, close_col))?,
                volume: parse_lots(table.cell(i, volume_col))?,
            })
        })
        .collect();

    Ok(sort_dedup_by_date(rows, |r| r.date))
}

fn parse_institutional_rows(table: &HtmlTable) -> Result<Vec<InstitutionalRow>, ProviderError> {
    let date_col = table
        .find_column(&["日期"], &[])
        .or_else(|| table.find_column(&["期別"], &[]))
        .ok_or_else(|| ProviderError::Parse("missing date column".into()))?;

    let net_column = |who: &str| {
        table
            .find_column(&[who, "買賣超"], &["持股"])
            .or_else(|| table.find_column(&[who], &["持股", "買進", "賣出"]))
            .ok_or_else(|| {
                ProviderError::Parse(format!(
                    "missing {} net column in {:?}",
                    who, table.headers
                ))
            })
    };
    let foreign_col = net_column("外資")?;
    let trust_col = net_column("投信")?;
    let dealer_col = net_column("自營")?;

    let rows: Vec<InstitutionalRow> = (0..table.len())
        .filter_map(|i| {
            Some(InstitutionalRow {
                date: parse_trade_date(table.cell(i, date_col))?,
                foreign_net: parse_lots(table.cell(i, foreign_col))?,
                trust_net: parse_lots(table.cell(i, trust_col))?,
                dealer_net: parse_lots(table.cell(i, dealer_col))?,
            })
        })
        .collect();

    Ok(sort_dedup_by_date(rows, |r| r.date))
}

fn parse_revenue_rows(table: &HtmlTable) -> Result<Vec<RevenueRow>, ProviderError> {
    let month_col = require_column(table, "月別", &["月別"], &[])?;
    let revenue_col = require_column(table, "revenue", &["單月", "營收"], &["合併"])?;
    let mom_col = table.find_column(&["單月", "月增"], &["合併"]);
    let yoy_col = table.find_column(&["單月", "年增"], &["合併"]);

    let rows: Vec<RevenueRow> = (0..table.len())
        .filter_map(|i| {
            Some(RevenueRow {
                month: parse_month(table.cell(i, month_col))?,
                revenue: parse_number(table.cell(i, revenue_col))?,
                mom_growth_pct: mom_col.and_then(|c| parse_number(table.cell(i, c))),
                yoy_growth_pct: yoy_col.and_then(|c| parse_number(table.cell(i, c))),
            })
        })
        .collect();

    Ok(sort_dedup_by_date(rows, |r| r.month))
}

/// Page titles look like `2330 台積電 K線圖 - Goodinfo!台灣股市資訊網`.
fn name_from_title(html: &str, id: &StockId) -> Option<String> {
    let selector = Selector::parse("title").ok()?;
    let document = Html::parse_document(html);
    let title = document.select(&selector).next()?.text().collect::<String>();

    let mut parts = title.split_whitespace();
    let first = parts.next()?;
    if first != id.as_str() {
        return None;
    }
    parts.next().map(ToString::to_string)
}
