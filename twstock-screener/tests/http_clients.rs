//! HTTP-level tests for the LINE notifier and the chat completions summarizer
//! against mock servers.

use chrono::NaiveDate;
use serde_json::{json, Value};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use twstock_common::config::{LineConfig, LlmConfig};
use twstock_screener::{
    CollaboratorError, IndicatorSnapshot, LineNotifier, Notification, Notifier, OpenAiSummarizer,
    StockId, Summarizer, SummaryRequest,
};

fn line_notifier(server: &MockServer) -> LineNotifier {
    let config = LineConfig {
        api_base: server.uri(),
        ..LineConfig::default()
    };
    LineNotifier::new(&config, "line-token")
}

fn summarizer(server: &MockServer) -> OpenAiSummarizer {
    let config = LlmConfig {
        api_key: Some("test-key".into()),
        base_url: format!("{}/v1", server.uri()),
        ..LlmConfig::default()
    };
    OpenAiSummarizer::new(&config)
}

fn summary_request() -> SummaryRequest {
    let snapshot = IndicatorSnapshot {
        date: NaiveDate::from_ymd_opt(2024, 5, 17).unwrap(),
        close: 812.0,
        volume: 25_300,
        ma5: Some(805.0),
        ma20: Some(790.0),
        ma60: Some(760.0),
        macd_dif: Some(8.1),
        macd_signal: Some(6.4),
        macd_osc: Some(3.4),
        institutional_net_total: Some(12_345),
        institutional_streak_days: Some(3),
        price_change_pct: Some(1.25),
        latest_revenue: None,
        revenue_yoy_pct: None,
    };
    SummaryRequest {
        stock_id: StockId::new("2330"),
        name: None,
        snapshot: snapshot.clone(),
        history: vec![snapshot],
        revenue: Vec::new(),
    }
}

// ============================================================================
// LINE
// ============================================================================

#[tokio::test]
async fn test_line_long_message_is_chunked_into_batches() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v2/bot/message/push"))
        .and(header("authorization", "Bearer line-token"))
        .and(body_partial_json(json!({"to": "U123"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(2)
        .mount(&server)
        .await;

    // 6 full chunks plus one character: 7 messages, sent as 5 + 2
    let text = "股".repeat(2000 * 6 + 1);
    line_notifier(&server)
        .send(&Notification::text("U123", text))
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 2);

    let mut total = 0;
    for (i, request) in requests.iter().enumerate() {
        let body: Value = serde_json::from_slice(&request.body).unwrap();
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), if i == 0 { 5 } else { 2 });
        for message in messages {
            assert_eq!(message["type"], "text");
            let chars = message["text"].as_str().unwrap().chars().count();
            assert!(chars <= 2000);
            total += chars;
        }
    }
    assert_eq!(total, 2000 * 6 + 1);
}

#[tokio::test]
async fn test_line_short_message_single_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v2/bot/message/push"))
        .and(body_partial_json(json!({
            "to": "U123",
            "messages": [{"type": "text", "text": "⚠️ 今日沒有符合條件的股票"}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    line_notifier(&server)
        .send(&Notification::text("U123", "⚠️ 今日沒有符合條件的股票"))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_line_error_statuses() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v2/bot/message/push"))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_json(json!({"message": "Authentication failed. Confirm that the access token in the authorization header is valid."})),
        )
        .mount(&server)
        .await;

    let err = line_notifier(&server)
        .send(&Notification::text("U123", "hello"))
        .await
        .unwrap_err();
    assert!(matches!(err, CollaboratorError::Auth(ref m) if m.contains("Authentication failed")));
}

#[tokio::test]
async fn test_line_rate_limited() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({"message": "You have reached your monthly limit."})))
        .mount(&server)
        .await;

    let err = line_notifier(&server)
        .send(&Notification::text("U123", "hello"))
        .await
        .unwrap_err();
    assert!(matches!(err, CollaboratorError::Quota(_)));
}

// ============================================================================
// Chat completions
// ============================================================================

#[tokio::test]
async fn test_summarizer_success() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer test-key"))
        .and(body_partial_json(json!({"model": "gpt-4o-mini", "max_tokens": 4096})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "chatcmpl-1",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "  短期偏多，長期持有。\n"},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 100, "completion_tokens": 20, "total_tokens": 120}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let text = summarizer(&server).summarize(&summary_request()).await.unwrap();
    assert_eq!(text, "短期偏多，長期持有。");

    let requests = server.received_requests().await.unwrap();
    let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body["messages"][0]["role"], "system");
    assert!(body["messages"][0]["content"].as_str().unwrap().starts_with("使用繁體中文回答"));
    assert!(body["messages"][1]["content"].as_str().unwrap().contains("2024-05-17 812.00"));
}

#[tokio::test]
async fn test_summarizer_quota_maps_to_quota() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "error": {"message": "You exceeded your current quota", "type": "insufficient_quota"}
        })))
        .mount(&server)
        .await;

    let err = summarizer(&server).summarize(&summary_request()).await.unwrap_err();
    assert!(matches!(err, CollaboratorError::Quota(ref m) if m.contains("insufficient_quota")));
}

#[tokio::test]
async fn test_summarizer_auth_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
        .mount(&server)
        .await;

    let err = summarizer(&server).summarize(&summary_request()).await.unwrap_err();
    assert!(matches!(err, CollaboratorError::Auth(_)));
}

#[tokio::test]
async fn test_summarizer_empty_choices_is_invalid() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
        .mount(&server)
        .await;

    let err = summarizer(&server).summarize(&summary_request()).await.unwrap_err();
    assert!(matches!(err, CollaboratorError::InvalidResponse(_)));
}

#[tokio::test]
async fn test_summarizer_server_error_is_request_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .mount(&server)
        .await;

    let err = summarizer(&server).summarize(&summary_request()).await.unwrap_err();
    assert!(matches!(err, CollaboratorError::Request(_)));
}
