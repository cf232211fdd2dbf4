//! twstock Screener Library
//!
//! Daily screening and single-stock analysis of Taiwan-listed equities.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                         Orchestrator                          │
//! ├───────────────┬──────────────┬──────────────┬─────────────────┤
//! │  DataProvider │  Indicators  │   Screener   │  Summarizer /   │
//! │  (goodinfo)   │  MA/MACD/    │  rule sets   │  ChartRenderer /│
//! │               │  streaks     │              │  Notifier       │
//! └───────────────┴──────────────┴──────────────┴─────────────────┘
//! ```
//!
//! ## Daily screen
//! Candidates → history → latest snapshot → default rule set → momentum buy
//! check, summary and charts for passing stocks → one LINE message.
//!
//! ## Single stock
//! History → snapshot → bullish/bearish classification → summary → charts →
//! LINE message when bullish (or when configured to report bearish results).

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod chart;
pub mod data;
pub mod error;
pub mod indicators;
pub mod notification;
pub mod orchestrator;
pub mod report;
pub mod screener;
pub mod summarizer;

pub use chart::{ChartArtifact, ChartKind, ChartRenderer, ChartRequest, SvgChartRenderer};
pub use data::{DataProvider, GoodinfoAdapter, ProviderError, StockHistory, StockId};
pub use error::{AnalyzerError, CollaboratorError};
pub use indicators::{IndicatorError, IndicatorSnapshot};
pub use notification::{LineNotifier, Notification, Notifier};
pub use orchestrator::Orchestrator;
pub use report::{DailyReport, Decision, StockAnalysis};
pub use screener::{Screener, ScreeningResult, ScreeningRuleSet};
pub use summarizer::{OpenAiSummarizer, Summarizer, SummaryRequest};
