//! Run reports and the text sent to users.

use chrono::NaiveDate;
use serde::Serialize;
use std::fmt::{self, Write as _};
use twstock_common::util::format_thousands;

use crate::chart::ChartArtifact;
use crate::data::StockId;
use crate::indicators::IndicatorSnapshot;
use crate::screener::ScreeningResult;

const NO_MATCH_MESSAGE: &str = "⚠️ 今日沒有符合條件的股票";

/// A candidate that could not be screened.
#[derive(Debug, Clone, Serialize)]
pub struct SkippedStock {
    pub stock_id: StockId,
    pub reason: String,
}

/// A stock that passed the screen, with its buy decision and whatever the
/// follow-up stages produced.
#[derive(Debug, Clone, Serialize)]
pub struct StockReport {
    pub result: ScreeningResult,
    /// Outcome of the buy rule set on the same snapshot
    pub decision: Decision,
    pub buy_failed_conditions: Vec<String>,
    pub narrative: Option<String>,
    pub charts: Vec<ChartArtifact>,
}

/// Outcome of the daily screen.
#[derive(Debug, Clone, Serialize)]
pub struct DailyReport {
    pub run_date: NaiveDate,
    pub rule_set: String,
    /// Rule set that turns a passing stock into a buy
    pub buy_rule_set: String,
    /// Candidates considered, screened or skipped
    pub candidates: usize,
    /// Every screened stock, in candidate order
    pub results: Vec<ScreeningResult>,
    /// Stocks that passed the screen, in candidate order
    pub passed: Vec<StockReport>,
    pub skipped: Vec<SkippedStock>,
    pub notification_sent: bool,
}

impl DailyReport {
    pub fn passed_ids(&self) -> Vec<StockId> {
        self.passed.iter().map(|p| p.result.stock_id.clone()).collect()
    }

    /// Passing stocks that also hold under the buy rule set.
    pub fn buy_ids(&self) -> Vec<StockId> {
        self.passed
            .iter()
            .filter(|p| p.decision.is_bullish())
            .map(|p| p.result.stock_id.clone())
            .collect()
    }

    /// Trading date the passing snapshots refer to, else the run date.
    pub fn market_date(&self) -> NaiveDate {
        self.passed
            .iter()
            .map(|p| p.result.snapshot.date)
            .max()
            .unwrap_or(self.run_date)
    }

    /// The single message delivered for a daily run.
    pub fn batch_message(&self) -> String {
        if self.passed.is_empty() {
            return NO_MATCH_MESSAGE.to_string();
        }

        let mut out = format!("📈 {} 符合條件的股票:\n", self.market_date());
        let _ = writeln!(
            out,
            "符合初步條件: {} 支 / 符合買入條件: {} 支\n",
            self.passed.len(),
            self.buy_ids().len()
        );
        for stock in &self.passed {
            let r = &stock.result;
            let _ = writeln!(out, "🔢 代號: {}", r.stock_id);
            if let Some(name) = &r.name {
                let _ = writeln!(out, "📊 名稱: {}", name);
            }
            write_snapshot_lines(&mut out, &r.snapshot);
            let _ = writeln!(out, "🧭 判斷: {}", stock.decision);
            if let Some(narrative) = &stock.narrative {
                let _ = writeln!(out, "📝 分析:\n{}", narrative.trim());
            }
            out.push('\n');
        }
        out.trim_end().to_string()
    }

    /// Console summary printed at the end of a daily run.
    pub fn console_summary(&self) -> String {
        let ids: Vec<String> = self.buy_ids().iter().map(ToString::to_string).collect();
        let mut out = String::new();
        let _ = writeln!(out, "=== 每日股票分析報告 ===");
        let _ = writeln!(out);
        let _ = writeln!(out, "📊 篩選結果 ({} / {}):", self.rule_set, self.buy_rule_set);
        let _ = writeln!(out, "• 候選股票: {} 支", self.candidates);
        let _ = writeln!(out, "• 完成篩選: {} 支", self.results.len());
        let _ = writeln!(out, "• 符合初步條件: {} 支", self.passed.len());
        let _ = writeln!(out, "• 符合買入條件: {} 支", ids.len());
        if !self.skipped.is_empty() {
            let _ = writeln!(out, "• 略過: {} 支", self.skipped.len());
            for s in &self.skipped {
                let _ = writeln!(out, "  - {}: {}", s.stock_id, s.reason);
            }
        }
        let _ = writeln!(out);
        let _ = writeln!(out, "🎯 推薦股票:");
        let picks = if ids.is_empty() {
            "無".to_string()
        } else {
            ids.join(", ")
        };
        let _ = writeln!(out, "{}", picks);
        let _ = writeln!(out);
        let _ = writeln!(out, "📱 通知狀態:");
        let _ = writeln!(
            out,
            "{}",
            if self.notification_sent { "已發送LINE通知" } else { "未發送通知" }
        );
        let _ = write!(out, "=========================");
        out
    }
}

/// Bullish when every condition of the rule set holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Bullish,
    Bearish,
}

impl Decision {
    pub fn from_passed(passed: bool) -> Self {
        if passed {
            Self::Bullish
        } else {
            Self::Bearish
        }
    }

    pub fn is_bullish(&self) -> bool {
        matches!(self, Self::Bullish)
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Bullish => "推薦買入",
            Self::Bearish => "不建議買入",
        })
    }
}

/// Outcome of a single-stock analysis.
#[derive(Debug, Clone, Serialize)]
pub struct StockAnalysis {
    pub stock_id: StockId,
    pub name: Option<String>,
    pub rule_set: String,
    pub decision: Decision,
    pub snapshot: IndicatorSnapshot,
    pub failed_conditions: Vec<String>,
    pub narrative: Option<String>,
    pub charts: Vec<ChartArtifact>,
    pub notification_sent: bool,
}

impl StockAnalysis {
    /// Message delivered for a single-stock analysis.
    pub fn message(&self) -> String {
        let mut out = format!("📊 股票 {} 詳細分析\n\n", self.stock_id);
        if let Some(name) = &self.name {
            let _ = writeln!(out, "📊 名稱: {}", name);
        }
        let _ = writeln!(out, "📅 日期: {}", self.snapshot.date);
        write_snapshot_lines(&mut out, &self.snapshot);
        let _ = writeln!(out, "🧭 判斷: {}", self.decision);
        if !self.failed_conditions.is_empty() {
            let _ = writeln!(out, "❌ 未通過: {}", self.failed_conditions.join(", "));
        }
        if let Some(narrative) = &self.narrative {
            let _ = write!(out, "\n{}", narrative.trim());
        }
        out.trim_end().to_string()
    }

    pub fn console_summary(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "=== 股票 {} 分析結果 ===", self.stock_id);
        let _ = writeln!(out, "規則: {}", self.rule_set);
        let _ = writeln!(out, "買入建議: {}", self.decision);
        if !self.failed_conditions.is_empty() {
            let _ = writeln!(out, "未通過條件: {}", self.failed_conditions.join(", "));
        }
        for chart in &self.charts {
            let _ = writeln!(out, "圖表: {}", chart.path.display());
        }
        let _ = write!(
            out,
            "分析結果:\n{}",
            self.narrative.as_deref().unwrap_or("未產生")
        );
        out
    }
}

fn write_snapshot_lines(out: &mut String, s: &IndicatorSnapshot) {
    let _ = writeln!(out, "💰 成交: {:.2}", s.close);
    match s.price_change_pct {
        Some(pct) => {
            let _ = writeln!(out, "📈 漲跌幅: {:.2}%", pct);
        }
        None => {
            let _ = writeln!(out, "📈 漲跌幅: -");
        }
    }
    let _ = writeln!(out, "💼 成交量: {} 張", format_thousands(s.volume));
    match s.institutional_net_total {
        Some(net) => {
            let _ = writeln!(out, "🏛️ 法人買超: {} 張", format_thousands(net));
        }
        None => {
            let _ = writeln!(out, "🏛️ 法人買超: -");
        }
    }
}
