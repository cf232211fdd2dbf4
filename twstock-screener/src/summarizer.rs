//! Narrative summaries from an OpenAI-compatible chat completions API.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::time::{Duration, Instant};
use twstock_common::config::LlmConfig;

use crate::data::{RevenueRow, StockId};
use crate::error::CollaboratorError;
use crate::indicators::IndicatorSnapshot;

const SYSTEM_PROMPT: &str = "使用繁體中文回答：你是個一位專業股票分析師，請幫我解讀以下技術面訊息和月盈利狀況，並幫我針對長期(約半年)及短期(約一個月)提供交易策略";

/// Input for one narrative.
#[derive(Debug, Clone)]
pub struct SummaryRequest {
    pub stock_id: StockId,
    pub name: Option<String>,
    /// Snapshot the narrative is about
    pub snapshot: IndicatorSnapshot,
    /// Recent snapshots, ascending, ending at `snapshot`
    pub history: Vec<IndicatorSnapshot>,
    /// Monthly revenue, ascending
    pub revenue: Vec<RevenueRow>,
}

/// Produces a natural-language reading of a stock's indicators.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, request: &SummaryRequest) -> Result<String, CollaboratorError>;
}

// ============================================================================
// OpenAI-compatible client
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f64,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Summarizer backed by `{base_url}/chat/completions`.
pub struct OpenAiSummarizer {
    base_url: String,
    api_key: Option<String>,
    model: String,
    temperature: f64,
    max_tokens: u32,
    client: Client,
}

impl OpenAiSummarizer {
    pub fn new(config: &LlmConfig) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config
                .api_key
                .as_deref()
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(String::from),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            client: Client::builder()
                .timeout(Duration::from_secs(config.timeout_secs))
                .connect_timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }
}

#[async_trait]
impl Summarizer for OpenAiSummarizer {
    async fn summarize(&self, request: &SummaryRequest) -> Result<String, CollaboratorError> {
        let start = Instant::now();

        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| CollaboratorError::Auth("API key not set (OPENAI_API_KEY)".into()))?;

        let body = ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: build_prompt(request),
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", api_key))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(CollaboratorError::from_status(status.as_u16(), &error_text));
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| CollaboratorError::InvalidResponse(e.to_string()))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or_else(|| CollaboratorError::InvalidResponse("no completion content".into()))?;

        tracing::info!(
            stock_id = %request.stock_id,
            model = %self.model,
            latency_ms = start.elapsed().as_millis() as u64,
            "Summary generated"
        );

        Ok(content)
    }
}

// ============================================================================
// Prompt
// ============================================================================

fn opt(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{:.2}", v))
}

fn opt_int(value: Option<i64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

/// Plain-text table of the recent indicators and monthly revenue.
pub fn build_prompt(request: &SummaryRequest) -> String {
    let mut out = String::new();
    let title = match &request.name {
        Some(name) => format!("{} {}", request.stock_id, name),
        None => request.stock_id.to_string(),
    };
    let _ = writeln!(out, "股票: {}", title);
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "日期 收盤 成交量(張) 漲跌幅(%) MA5 MA20 MA60 DIF MACD OSC 法人買賣超(張) 法人連續天數"
    );

    let rows: Vec<&IndicatorSnapshot> = if request.history.is_empty() {
        vec![&request.snapshot]
    } else {
        request.history.iter().collect()
    };

    for s in rows {
        let _ = writeln!(
            out,
            "{} {:.2} {} {} {} {} {} {} {} {} {} {}",
            s.date,
            s.close,
            s.volume,
            opt(s.price_change_pct),
            opt(s.ma5),
            opt(s.ma20),
            opt(s.ma60),
            opt(s.macd_dif),
            opt(s.macd_signal),
            opt(s.macd_osc),
            opt_int(s.institutional_net_total),
            opt_int(s.institutional_streak_days),
        );
    }

    if !request.revenue.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "月別 單月營收(億) 月增(%) 年增(%)");
        for r in request.revenue.iter().rev().take(12) {
            let _ = writeln!(
                out,
                "{} {:.2} {} {}",
                r.month.format("%Y-%m"),
                r.revenue,
                opt(r.mom_growth_pct),
                opt(r.yoy_growth_pct),
            );
        }
    }

    out
}
