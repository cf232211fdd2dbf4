//! The two workflows: the daily screen and single-stock analysis.
//!
//! Control flow is sequential. Every external call is awaited before the
//! next stage starts, and nothing is retried here.

use chrono::{Duration, Local, NaiveDate};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};
use twstock_common::Config;

use crate::chart::{ChartArtifact, ChartRenderer, ChartRequest};
use crate::data::{DataProvider, RawPriceRow, StockHistory, StockId};
use crate::error::AnalyzerError;
use crate::indicators::{compute_snapshots, IndicatorError, IndicatorSnapshot};
use crate::notification::{Notification, Notifier};
use crate::report::{DailyReport, Decision, SkippedStock, StockAnalysis, StockReport};
use crate::screener::{Candidate, RuleSetError, Screener, ScreeningRuleSet};
use crate::summarizer::{SummaryRequest, Summarizer};

/// Rule set a screened stock must also satisfy to be reported as a buy.
const BUY_RULE_SET: &str = "momentum";

/// A notifier together with the user it delivers to.
struct Delivery {
    notifier: Arc<dyn Notifier>,
    recipient: String,
}

/// Runs the workflows against injected collaborators.
///
/// Absent collaborators mean the stage is skipped.
pub struct Orchestrator {
    config: Config,
    provider: Arc<dyn DataProvider>,
    summarizer: Option<Arc<dyn Summarizer>>,
    renderer: Option<Arc<dyn ChartRenderer>>,
    delivery: Option<Delivery>,
    run_date: NaiveDate,
}

impl Orchestrator {
    pub fn new(config: Config, provider: Arc<dyn DataProvider>) -> Self {
        Self {
            config,
            provider,
            summarizer: None,
            renderer: None,
            delivery: None,
            run_date: Local::now().date_naive(),
        }
    }

    pub fn with_summarizer(mut self, summarizer: Arc<dyn Summarizer>) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn ChartRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn with_notifier(
        mut self,
        notifier: Arc<dyn Notifier>,
        recipient: impl Into<String>,
    ) -> Self {
        self.delivery = Some(Delivery {
            notifier,
            recipient: recipient.into(),
        });
        self
    }

    /// Last day of the fetch window (defaults to today).
    pub fn with_run_date(mut self, date: NaiveDate) -> Self {
        self.run_date = date;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn fetch_window(&self) -> Result<(NaiveDate, NaiveDate), AnalyzerError> {
        let days = self.config.data.history_days;
        let start = Duration::try_days(days)
            .and_then(|span| self.run_date.checked_sub_signed(span))
            .ok_or_else(|| {
                AnalyzerError::Config(format!("data.history_days out of range: {}", days))
            })?;
        Ok((start, self.run_date))
    }

    /// Built-in rule set by name. Configured threshold overrides and disabled
    /// conditions apply to the default set only.
    pub fn rule_set(&self, name: &str) -> Result<ScreeningRuleSet, RuleSetError> {
        let mut rules = ScreeningRuleSet::by_name(name)?;
        if rules.name == "default" {
            rules.apply_overrides(&self.config.screening.thresholds)?;
            rules.disable(&self.config.screening.disabled_conditions)?;
        }
        Ok(rules)
    }

    // ========================================================================
    // Daily screen
    // ========================================================================

    /// Screen every candidate and deliver one batch message.
    ///
    /// Stocks that pass the screen are classified again with the buy rule
    /// set; both counts end up in the report. Per-stock fetch and indicator
    /// failures are recorded as skipped. Only a failure to obtain the
    /// candidate list, an invalid rule set or an unusable fetch window ends
    /// the run.
    pub async fn run_daily_screen(&self) -> Result<DailyReport, AnalyzerError> {
        let screener = Screener::new(self.rule_set("default")?);
        let buy_rules = self.rule_set(BUY_RULE_SET)?;
        let (start, end) = self.fetch_window()?;
        let candidates = self.candidates().await?;

        info!(
            candidates = candidates.len(),
            rule_set = %screener.rule_set().name,
            conditions = %screener.rule_set().describe(),
            %start,
            %end,
            "Starting daily screen"
        );

        let mut screened: Vec<Candidate> = Vec::with_capacity(candidates.len());
        let mut prepared: BTreeMap<StockId, (StockHistory, Vec<IndicatorSnapshot>)> =
            BTreeMap::new();
        let mut skipped = Vec::new();

        for id in &candidates {
            let history = match self.provider.fetch_history(id, start, end).await {
                Ok(h) => h,
                Err(e) => {
                    warn!(
                        stock_id = %id,
                        error = %e,
                        transient = e.is_transient(),
                        "Skipping stock: fetch failed"
                    );
                    skipped.push(SkippedStock {
                        stock_id: id.clone(),
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            let snapshots = match compute_snapshots(&history) {
                Ok(s) => s,
                Err(e) => {
                    warn!(stock_id = %id, error = %e, "Skipping stock: indicators failed");
                    skipped.push(SkippedStock {
                        stock_id: id.clone(),
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            // compute_snapshots never returns an empty series
            let Some(latest) = snapshots.last().cloned() else {
                continue;
            };

            screened.push(Candidate {
                stock_id: id.clone(),
                name: history.name.clone(),
                snapshot: latest,
            });
            prepared.insert(id.clone(), (history, snapshots));
        }

        let results = screener.screen(&screened);
        let mut passed = Vec::new();

        for result in results.iter().filter(|r| r.passed) {
            let evaluation = buy_rules.evaluate(&result.snapshot);
            let decision = Decision::from_passed(evaluation.passed);
            info!(
                stock_id = %result.stock_id,
                decision = ?decision,
                failed = ?evaluation.failed_conditions,
                "Buy check"
            );

            let (narrative, charts) = match prepared.get(&result.stock_id) {
                Some((history, snapshots)) => (
                    self.summarize(history, snapshots).await,
                    self.render(history, snapshots).await,
                ),
                None => (None, Vec::new()),
            };
            passed.push(StockReport {
                result: result.clone(),
                decision,
                buy_failed_conditions: evaluation.failed_conditions,
                narrative,
                charts,
            });
        }

        let mut report = DailyReport {
            run_date: self.run_date,
            rule_set: screener.rule_set().name.clone(),
            buy_rule_set: buy_rules.name.clone(),
            candidates: candidates.len(),
            results,
            passed,
            skipped,
            notification_sent: false,
        };

        if let Some(delivery) = &self.delivery {
            let notification = Notification {
                recipient: delivery.recipient.clone(),
                text: report.batch_message(),
                attachments: report
                    .passed
                    .iter()
                    .flat_map(|p| p.charts.iter().map(|c| c.path.clone()))
                    .collect(),
            };
            report.notification_sent = self.deliver(delivery, &notification).await;
        }

        info!(
            screened = report.results.len(),
            passed = report.passed.len(),
            buy = report.buy_ids().len(),
            skipped = report.skipped.len(),
            "Daily screen complete"
        );

        Ok(report)
    }

    async fn candidates(&self) -> Result<Vec<StockId>, AnalyzerError> {
        let configured: Vec<StockId> = self
            .config
            .screening
            .candidates
            .iter()
            .map(|c| StockId::new(c.as_str()))
            .filter(|c| !c.as_str().is_empty())
            .collect();

        if !configured.is_empty() {
            return Ok(configured);
        }

        Ok(self.provider.candidate_universe().await?)
    }

    // ========================================================================
    // Single stock
    // ========================================================================

    /// Classify one stock with the configured rule set.
    ///
    /// A price fetch failure or degenerate prices end the analysis; everything
    /// after classification is best effort.
    pub async fn analyze_stock(&self, id: &StockId) -> Result<StockAnalysis, AnalyzerError> {
        let rules = self.rule_set(&self.config.analysis.rule_set)?;
        let (start, end) = self.fetch_window()?;

        info!(
            stock_id = %id,
            rule_set = %rules.name,
            conditions = %rules.describe(),
            "Analyzing stock"
        );

        let history = self.provider.fetch_history(id, start, end).await?;
        let snapshots = compute_snapshots(&history)?;
        let snapshot = snapshots
            .last()
            .cloned()
            .ok_or_else(|| IndicatorError::InsufficientData(format!("no snapshots for {}", id)))?;

        let evaluation = rules.evaluate(&snapshot);
        let decision = Decision::from_passed(evaluation.passed);
        info!(
            stock_id = %id,
            decision = ?decision,
            failed = ?evaluation.failed_conditions,
            "Stock classified"
        );

        let narrative = self.summarize(&history, &snapshots).await;
        let charts = self.render(&history, &snapshots).await;

        let mut analysis = StockAnalysis {
            stock_id: id.clone(),
            name: history.name.clone(),
            rule_set: rules.name.clone(),
            decision,
            snapshot,
            failed_conditions: evaluation.failed_conditions,
            narrative,
            charts,
            notification_sent: false,
        };

        if let Some(delivery) = &self.delivery {
            if decision.is_bullish() || self.config.analysis.notify_on_bearish {
                let notification = Notification {
                    recipient: delivery.recipient.clone(),
                    text: analysis.message(),
                    attachments: analysis.charts.iter().map(|c| c.path.clone()).collect(),
                };
                analysis.notification_sent = self.deliver(delivery, &notification).await;
            } else {
                info!(stock_id = %id, "Bearish result, notification skipped");
            }
        }

        Ok(analysis)
    }

    // ========================================================================
    // Best-effort stages
    // ========================================================================

    async fn summarize(
        &self,
        history: &StockHistory,
        snapshots: &[IndicatorSnapshot],
    ) -> Option<String> {
        let summarizer = self.summarizer.as_ref()?;
        let snapshot = snapshots.last()?.clone();
        let window = self.config.llm.history_window.max(1);
        let skip = snapshots.len().saturating_sub(window);

        let request = SummaryRequest {
            stock_id: history.stock_id.clone(),
            name: history.name.clone(),
            snapshot,
            history: snapshots[skip..].to_vec(),
            revenue: history.revenue.clone(),
        };

        match summarizer.summarize(&request).await {
            Ok(text) => Some(text),
            Err(e) => {
                warn!(stock_id = %history.stock_id, error = %e, "Summary unavailable");
                None
            }
        }
    }

    async fn render(
        &self,
        history: &StockHistory,
        snapshots: &[IndicatorSnapshot],
    ) -> Vec<ChartArtifact> {
        let Some(renderer) = self.renderer.as_ref() else {
            return Vec::new();
        };

        let request = ChartRequest {
            stock_id: history.stock_id.clone(),
            name: history.name.clone(),
            prices: ordered_prices(&history.prices),
            snapshots: snapshots.to_vec(),
            revenue: history.revenue.clone(),
        };

        match renderer.render(&request).await {
            Ok(artifacts) => artifacts,
            Err(e) => {
                warn!(stock_id = %history.stock_id, error = %e, "Chart rendering failed");
                Vec::new()
            }
        }
    }

    async fn deliver(&self, delivery: &Delivery, notification: &Notification) -> bool {
        match delivery.notifier.send(notification).await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Notification failed");
                false
            }
        }
    }
}

/// Prices ascending by date, last row winning on duplicate dates, matching
/// the snapshot series.
fn ordered_prices(prices: &[RawPriceRow]) -> Vec<RawPriceRow> {
    let by_date: BTreeMap<NaiveDate, &RawPriceRow> = prices.iter().map(|p| (p.date, p)).collect();
    by_date.into_values().cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(day: u32, close: f64) -> RawPriceRow {
        RawPriceRow {
            date: NaiveDate::from_ymd_opt(2024, 5, day).unwrap(),
            open: close,
            high: close,
            low: close,
            close,
            volume: 1,
        }
    }

    #[test]
    fn test_ordered_prices_last_duplicate_wins() {
        let rows = vec![row(3, 1.0), row(1, 2.0), row(3, 4.0)];
        let ordered = ordered_prices(&rows);
        assert_eq!(ordered.len(), 2);
        assert_eq!(ordered[0].close, 2.0);
        assert_eq!(ordered[1].close, 4.0);
    }
}
