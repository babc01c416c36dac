//! Outbound Slack Web API calls.

use std::time::Duration;

use serde::Deserialize;
use serde_json::{json, Value};
use whatsupdoc_core::{AppError, AppResult};
use whatsupdoc_rag::format::SlackMessage;
use whatsupdoc_rag::{MessageHandle, Responder};

const DEFAULT_BASE_URL: &str = "https://slack.com/api";

/// Identity returned by `auth.test`.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthInfo {
    pub user_id: String,
    #[serde(default)]
    pub team: Option<String>,
    #[serde(default)]
    pub bot_id: Option<String>,
}

/// Slack Web API client bound to one bot token.
#[derive(Clone)]
pub struct SlackApi {
    token: String,
    base_url: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for SlackApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlackApi")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

/// Map Slack's `error` codes onto text the error classifier understands.
fn describe_error(method: &str, code: &str) -> AppError {
    let detail = match code {
        "invalid_auth" | "not_authed" | "account_inactive" | "token_revoked" => {
            format!("authentication failed ({})", code)
        }
        "ratelimited" => "rate limited".to_string(),
        other => other.to_string(),
    };
    AppError::Platform(format!("Slack {} failed: {}", method, detail))
}

impl SlackApi {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn call(&self, method: &str, body: Value) -> AppResult<Value> {
        let response = self
            .client
            .post(format!("{}/{}", self.base_url, method))
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AppError::Platform(format!("Slack {} timed out: {}", method, e))
                } else {
                    AppError::Platform(format!("Connection to Slack failed: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Platform(format!(
                "Slack {} returned HTTP ({})",
                method,
                status.as_u16()
            )));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| AppError::Platform(format!("Invalid Slack {} response: {}", method, e)))?;

        if payload["ok"].as_bool() != Some(true) {
            let code = payload["error"].as_str().unwrap_or("unknown_error");
            return Err(describe_error(method, code));
        }
        Ok(payload)
    }

    /// Check the token and learn the bot's own user id.
    pub async fn auth_test(&self) -> AppResult<AuthInfo> {
        let payload = self.call("auth.test", json!({})).await?;
        Ok(serde_json::from_value(payload)?)
    }

    /// Post a message, in a thread when `thread_ts` is given.
    pub async fn post_message(
        &self,
        channel: &str,
        thread_ts: Option<&str>,
        message: &SlackMessage,
    ) -> AppResult<MessageHandle> {
        let mut body = serde_json::to_value(message)?;
        body["channel"] = json!(channel);
        if let Some(ts) = thread_ts {
            body["thread_ts"] = json!(ts);
        }

        let payload = self.call("chat.postMessage", body).await?;
        Ok(MessageHandle {
            channel: payload["channel"].as_str().unwrap_or(channel).to_string(),
            ts: payload["ts"].as_str().unwrap_or_default().to_string(),
        })
    }

    /// Replace the content of a posted message.
    pub async fn update_message(
        &self,
        handle: &MessageHandle,
        message: &SlackMessage,
    ) -> AppResult<()> {
        let mut body = serde_json::to_value(message)?;
        body["channel"] = json!(handle.channel);
        body["ts"] = json!(handle.ts);
        self.call("chat.update", body).await.map(|_| ())
    }

    /// Reply to a slash command through its `response_url`.
    pub async fn respond(&self, response_url: &str, message: &SlackMessage) -> AppResult<()> {
        let mut body = serde_json::to_value(message)?;
        body["response_type"] = json!("in_channel");

        let response = self
            .client
            .post(response_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Platform(format!("Connection to Slack failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::Platform(format!(
                "Slack response_url returned HTTP ({})",
                response.status().as_u16()
            )));
        }
        Ok(())
    }
}

/// Replies in a channel or thread; the placeholder is edited in place.
pub struct ChannelResponder {
    api: SlackApi,
    channel: String,
    thread_ts: Option<String>,
}

impl ChannelResponder {
    pub fn new(api: SlackApi, channel: impl Into<String>, thread_ts: Option<String>) -> Self {
        Self {
            api,
            channel: channel.into(),
            thread_ts,
        }
    }
}

#[async_trait::async_trait]
impl Responder for ChannelResponder {
    fn supports_update(&self) -> bool {
        true
    }

    async fn send(&self, message: &SlackMessage) -> AppResult<Option<MessageHandle>> {
        let handle = self
            .api
            .post_message(&self.channel, self.thread_ts.as_deref(), message)
            .await?;
        Ok(Some(handle))
    }

    async fn update(&self, handle: &MessageHandle, message: &SlackMessage) -> AppResult<()> {
        self.api.update_message(handle, message).await
    }
}

/// Replies to a slash command via its `response_url`.
pub struct ResponseUrlResponder {
    api: SlackApi,
    response_url: String,
}

impl ResponseUrlResponder {
    pub fn new(api: SlackApi, response_url: impl Into<String>) -> Self {
        Self {
            api,
            response_url: response_url.into(),
        }
    }
}

#[async_trait::async_trait]
impl Responder for ResponseUrlResponder {
    async fn send(&self, message: &SlackMessage) -> AppResult<Option<MessageHandle>> {
        self.api.respond(&self.response_url, message).await?;
        Ok(None)
    }

    async fn update(&self, _handle: &MessageHandle, _message: &SlackMessage) -> AppResult<()> {
        Err(AppError::Platform(
            "Slash command replies cannot be updated".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::Path, routing::post, Json, Router};
    use whatsupdoc_core::ErrorKind;
    use whatsupdoc_rag::format::slack::format_notice;

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn fake_slack() -> Router {
        Router::new().route(
            "/api/{method}",
            post(|Path(method): Path<String>, Json(body): Json<Value>| async move {
                Json(match method.as_str() {
                    "auth.test" => json!({"ok": true, "user_id": "UBOT", "team": "Acme"}),
                    "chat.postMessage" => json!({
                        "ok": true,
                        "channel": body["channel"],
                        "ts": "1700000000.000100"
                    }),
                    "chat.update" if body["ts"] == "1700000000.000100" => json!({"ok": true}),
                    _ => json!({"ok": false, "error": "message_not_found"}),
                })
            }),
        )
    }

    #[tokio::test]
    async fn test_auth_test() {
        let base = serve(fake_slack()).await;
        let info = SlackApi::new("xoxb-test")
            .with_base_url(format!("{}/api", base))
            .auth_test()
            .await
            .unwrap();
        assert_eq!(info.user_id, "UBOT");
        assert_eq!(info.team.as_deref(), Some("Acme"));
    }

    #[tokio::test]
    async fn test_channel_responder_posts_then_updates() {
        let base = serve(fake_slack()).await;
        let api = SlackApi::new("xoxb-test").with_base_url(format!("{}/api", base));
        let responder = ChannelResponder::new(api, "C1", None);

        let handle = responder
            .send(&format_notice("searching"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(handle.channel, "C1");
        assert_eq!(handle.ts, "1700000000.000100");

        responder.update(&handle, &format_notice("done")).await.unwrap();

        let stale = MessageHandle {
            channel: "C1".into(),
            ts: "1.0".into(),
        };
        let err = responder.update(&stale, &format_notice("x")).await.unwrap_err();
        assert!(err.to_string().contains("message_not_found"));
    }

    #[test]
    fn test_error_codes_classify() {
        assert_eq!(
            describe_error("auth.test", "invalid_auth").kind(),
            ErrorKind::Authentication
        );
        assert_eq!(
            describe_error("chat.postMessage", "ratelimited").kind(),
            ErrorKind::Capacity
        );
    }

    #[tokio::test]
    async fn test_unreachable_slack_is_transient() {
        let err = SlackApi::new("xoxb-test")
            .with_base_url("http://127.0.0.1:1/api")
            .auth_test()
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transient);
    }
}
