//! Telegram Bot API client used by the poll runtime and outbound transport.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Debug, Clone, Deserialize)]
struct SendMessageResponse {
    ok: bool,
    description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct AnswerCallbackQueryResponse {
    ok: bool,
    description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct GetUpdatesResponse {
    ok: bool,
    result: Option<Vec<TelegramUpdate>>,
    description: Option<String>,
}

/// One entry from `getUpdates`. Unknown update kinds decode with both
/// payload fields empty and are skipped by the poll runtime.
#[derive(Debug, Clone, Deserialize)]
pub struct TelegramUpdate {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<TelegramMessage>,
    #[serde(default)]
    pub callback_query: Option<TelegramCallbackQuery>,
}

#[derive(Debug, Clone, Deserialize)]
/// Public struct `TelegramMessage` used across Tally components.
pub struct TelegramMessage {
    pub chat: TelegramChat,
    #[serde(default)]
    pub from: Option<TelegramUser>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
/// Public struct `TelegramChat` used across Tally components.
pub struct TelegramChat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
/// Public struct `TelegramUser` used across Tally components.
pub struct TelegramUser {
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

impl TelegramUser {
    /// Human-readable sender label for admin notices and logs.
    pub fn display_name(&self) -> String {
        let full = format!(
            "{} {}",
            self.first_name.as_deref().unwrap_or(""),
            self.last_name.as_deref().unwrap_or("")
        );
        let full = full.trim();
        if !full.is_empty() {
            return full.to_string();
        }
        if let Some(username) = self.username.as_deref().filter(|value| !value.is_empty()) {
            return format!("@{username}");
        }
        "unknown".to_string()
    }
}

#[derive(Debug, Clone, Deserialize)]
/// Public struct `TelegramCallbackQuery` used across Tally components.
pub struct TelegramCallbackQuery {
    pub id: String,
    #[serde(default)]
    pub from: Option<TelegramUser>,
    #[serde(default)]
    pub message: Option<TelegramMessage>,
    #[serde(default)]
    pub data: Option<String>,
}

/// Connection settings for [`TelegramBotClient::new`].
#[derive(Debug, Clone)]
pub struct TelegramBotClientConfig {
    pub api_base: String,
    pub bot_token: String,
    pub request_timeout_ms: u64,
    pub retry_max_attempts: usize,
    pub retry_base_delay_ms: u64,
}

#[derive(Clone)]
/// Public struct `TelegramBotClient` used across Tally components.
pub struct TelegramBotClient {
    http: reqwest::Client,
    api_base: String,
    bot_token: String,
    retry_max_attempts: usize,
    retry_base_delay_ms: u64,
}

impl TelegramBotClient {
    pub fn new(config: TelegramBotClientConfig) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static("tally-hours-bot"),
        );
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/json"),
        );
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(config.request_timeout_ms.max(1)))
            .build()
            .context("failed to create telegram api client")?;

        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            bot_token: config.bot_token.trim().to_string(),
            retry_max_attempts: config.retry_max_attempts.max(1),
            retry_base_delay_ms: config.retry_base_delay_ms.max(1),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.bot_token, method)
    }

    /// Sends a chat message, optionally with an inline keyboard in
    /// Bot API `reply_markup` shape.
    pub async fn send_message(
        &self,
        chat_id: &str,
        text: &str,
        inline_keyboard: Option<Value>,
    ) -> Result<()> {
        let mut payload = json!({
            "chat_id": chat_id,
            "text": text,
            "disable_web_page_preview": true,
        });
        if let Some(inline_keyboard) = inline_keyboard {
            payload["reply_markup"] = json!({ "inline_keyboard": inline_keyboard });
        }
        let response: SendMessageResponse = self
            .request_json("sendMessage", || {
                self.http
                    .post(self.method_url("sendMessage"))
                    .json(&payload)
            })
            .await?;
        if !response.ok {
            bail!(
                "telegram sendMessage failed: {}",
                response
                    .description
                    .unwrap_or_else(|| "unknown error".to_string())
            );
        }
        Ok(())
    }

    pub async fn answer_callback_query(
        &self,
        callback_query_id: &str,
        text: Option<&str>,
    ) -> Result<()> {
        let mut payload = json!({ "callback_query_id": callback_query_id });
        if let Some(text) = text {
            payload["text"] = Value::String(text.to_string());
        }
        let response: AnswerCallbackQueryResponse = self
            .request_json("answerCallbackQuery", || {
                self.http
                    .post(self.method_url("answerCallbackQuery"))
                    .json(&payload)
            })
            .await?;
        if !response.ok {
            bail!(
                "telegram answerCallbackQuery failed: {}",
                response
                    .description
                    .unwrap_or_else(|| "unknown error".to_string())
            );
        }
        Ok(())
    }

    /// Fetches pending updates. The caller advances `offset` past the
    /// highest `update_id` it has seen to confirm them.
    pub async fn get_updates(&self, offset: Option<i64>) -> Result<Vec<TelegramUpdate>> {
        let mut payload = json!({ "timeout": 0 });
        if let Some(offset) = offset {
            payload["offset"] = json!(offset);
        }
        let response: GetUpdatesResponse = self
            .request_json("getUpdates", || {
                self.http.post(self.method_url("getUpdates")).json(&payload)
            })
            .await?;
        if !response.ok {
            bail!(
                "telegram getUpdates failed: {}",
                response
                    .description
                    .unwrap_or_else(|| "unknown error".to_string())
            );
        }
        Ok(response.result.unwrap_or_default())
    }

    async fn request_json<T, F>(&self, operation: &str, mut builder: F) -> Result<T>
    where
        T: DeserializeOwned,
        F: FnMut() -> reqwest::RequestBuilder,
    {
        let mut attempt = 0_usize;
        loop {
            attempt = attempt.saturating_add(1);
            let response = builder().send().await;
            match response {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let parsed = response
                            .json::<T>()
                            .await
                            .with_context(|| format!("failed to decode telegram {operation}"))?;
                        return Ok(parsed);
                    }

                    let retry_after = parse_retry_after(response.headers());
                    let body = response.text().await.unwrap_or_default();
                    if attempt < self.retry_max_attempts
                        && is_retryable_telegram_status(status.as_u16())
                    {
                        tokio::time::sleep(retry_delay(
                            self.retry_base_delay_ms,
                            attempt,
                            retry_after,
                        ))
                        .await;
                        continue;
                    }

                    bail!(
                        "telegram api {operation} failed with status {}: {}",
                        status.as_u16(),
                        truncate_for_error(&body, 800)
                    );
                }
                Err(error) => {
                    if attempt < self.retry_max_attempts && is_retryable_transport_error(&error) {
                        tokio::time::sleep(retry_delay(self.retry_base_delay_ms, attempt, None))
                            .await;
                        continue;
                    }
                    return Err(error)
                        .with_context(|| format!("telegram api {operation} request failed"));
                }
            }
        }
    }
}

fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
}

fn retry_delay(base_delay_ms: u64, attempt: usize, retry_after_seconds: Option<u64>) -> Duration {
    if let Some(retry_after_seconds) = retry_after_seconds {
        return Duration::from_secs(retry_after_seconds);
    }
    let exponent = attempt.saturating_sub(1).min(6) as u32;
    let scale = 2_u64.pow(exponent);
    Duration::from_millis(base_delay_ms.max(1).saturating_mul(scale))
}

fn is_retryable_telegram_status(status: u16) -> bool {
    status == 429 || (500..600).contains(&status)
}

fn is_retryable_transport_error(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect() || error.is_request() || error.is_body()
}

fn truncate_for_error(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    let mut truncated = String::new();
    for ch in value.chars().take(max_chars) {
        truncated.push(ch);
    }
    truncated.push_str("...");
    truncated
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn client_for(server: &MockServer, retry_max_attempts: usize) -> TelegramBotClient {
        TelegramBotClient::new(TelegramBotClientConfig {
            api_base: server.base_url(),
            bot_token: "test-token".to_string(),
            request_timeout_ms: 3_000,
            retry_max_attempts,
            retry_base_delay_ms: 1,
        })
        .expect("client")
    }

    #[test]
    fn unit_retry_delay_prefers_retry_after_and_backs_off_exponentially() {
        assert_eq!(retry_delay(50, 1, Some(3)), Duration::from_secs(3));
        assert_eq!(retry_delay(100, 1, None), Duration::from_millis(100));
        assert_eq!(retry_delay(100, 2, None), Duration::from_millis(200));
        assert_eq!(retry_delay(100, 3, None), Duration::from_millis(400));
    }

    #[test]
    fn unit_is_retryable_telegram_status_covers_rate_limit_and_server_errors() {
        assert!(is_retryable_telegram_status(429));
        assert!(is_retryable_telegram_status(500));
        assert!(is_retryable_telegram_status(503));
        assert!(!is_retryable_telegram_status(400));
        assert!(!is_retryable_telegram_status(404));
    }

    #[test]
    fn unit_display_name_prefers_full_name_then_username() {
        let full = TelegramUser {
            first_name: Some("Ivan".to_string()),
            last_name: Some("Petrov".to_string()),
            username: Some("ivanp".to_string()),
        };
        assert_eq!(full.display_name(), "Ivan Petrov");

        let username_only = TelegramUser {
            first_name: None,
            last_name: None,
            username: Some("ivanp".to_string()),
        };
        assert_eq!(username_only.display_name(), "@ivanp");

        let anonymous = TelegramUser {
            first_name: None,
            last_name: None,
            username: None,
        };
        assert_eq!(anonymous.display_name(), "unknown");
    }

    #[tokio::test]
    async fn functional_send_message_attaches_inline_keyboard() {
        let server = MockServer::start();
        let sent = server.mock(|when, then| {
            when.method(POST)
                .path("/bottest-token/sendMessage")
                .json_body_includes(
                    json!({
                        "chat_id": "100500",
                        "text": "Pick one",
                        "reply_markup": {
                            "inline_keyboard": [[
                                {"text": "Correct ✅", "callback_data": "correct:42:19787"}
                            ]]
                        }
                    })
                    .to_string(),
                );
            then.status(200)
                .header("content-type", "application/json")
                .body(r#"{"ok":true,"result":{"message_id":7}}"#);
        });

        let client = client_for(&server, 1);
        let keyboard = json!([[{ "text": "Correct ✅", "callback_data": "correct:42:19787" }]]);
        client
            .send_message("100500", "Pick one", Some(keyboard))
            .await
            .expect("send");
        sent.assert_calls(1);
    }

    #[tokio::test]
    async fn functional_send_message_retries_server_errors_until_exhaustion() {
        let server = MockServer::start();
        let failing = server.mock(|when, then| {
            when.method(POST).path("/bottest-token/sendMessage");
            then.status(503)
                .header("content-type", "application/json")
                .body(r#"{"ok":false,"description":"unavailable"}"#);
        });

        let client = client_for(&server, 3);
        let error = client
            .send_message("100500", "hello", None)
            .await
            .expect_err("exhausted retries");
        assert!(error.to_string().contains("503"));
        failing.assert_calls(3);
    }

    #[tokio::test]
    async fn functional_client_does_not_retry_client_errors() {
        let server = MockServer::start();
        let rejected = server.mock(|when, then| {
            when.method(POST).path("/bottest-token/sendMessage");
            then.status(400)
                .header("content-type", "application/json")
                .body(r#"{"ok":false,"description":"Bad Request: chat not found"}"#);
        });

        let client = client_for(&server, 3);
        let error = client
            .send_message("100500", "hello", None)
            .await
            .expect_err("client error");
        assert!(error.to_string().contains("chat not found"));
        rejected.assert_calls(1);
    }

    #[tokio::test]
    async fn functional_error_envelope_surfaces_description() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/bottest-token/answerCallbackQuery");
            then.status(200)
                .header("content-type", "application/json")
                .body(r#"{"ok":false,"description":"query is too old"}"#);
        });

        let client = client_for(&server, 1);
        let error = client
            .answer_callback_query("cb-1", Some("noted"))
            .await
            .expect_err("envelope error");
        assert!(error.to_string().contains("query is too old"));
    }

    #[tokio::test]
    async fn functional_get_updates_passes_offset_and_decodes_update_kinds() {
        let server = MockServer::start();
        let polled = server.mock(|when, then| {
            when.method(POST)
                .path("/bottest-token/getUpdates")
                .json_body_includes(json!({"offset": 7}).to_string());
            then.status(200)
                .header("content-type", "application/json")
                .body(
                    r#"{"ok":true,"result":[
                        {"update_id":7,"message":{"chat":{"id":100500},"from":{"first_name":"Ivan"},"text":"/start"}},
                        {"update_id":8,"callback_query":{"id":"cb-1","from":{"username":"ivanp"},"data":"menu:days","message":{"chat":{"id":100500}}}},
                        {"update_id":9,"edited_message":{"chat":{"id":100500}}}
                    ]}"#,
                );
        });

        let client = client_for(&server, 1);
        let updates = client.get_updates(Some(7)).await.expect("updates");
        polled.assert_calls(1);
        assert_eq!(updates.len(), 3);
        assert_eq!(updates[0].update_id, 7);
        assert_eq!(
            updates[0].message.as_ref().and_then(|m| m.text.as_deref()),
            Some("/start")
        );
        let callback = updates[1].callback_query.as_ref().expect("callback");
        assert_eq!(callback.data.as_deref(), Some("menu:days"));
        assert_eq!(
            callback.message.as_ref().map(|m| m.chat.id),
            Some(100_500)
        );
        // The unknown update kind decodes with both payloads empty.
        assert!(updates[2].message.is_none());
        assert!(updates[2].callback_query.is_none());
    }
}
