//! Inbound Slack payloads.

use serde::Deserialize;
use whatsupdoc_core::{AppError, AppResult};

/// Outer envelope of the Events API.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventEnvelope {
    UrlVerification {
        challenge: String,
    },
    EventCallback {
        event: SlackEvent,
        #[serde(default)]
        event_id: Option<String>,
    },
    #[serde(other)]
    Other,
}

/// The inner event of an `event_callback`.
#[derive(Debug, Clone, Deserialize)]
pub struct SlackEvent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub subtype: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub bot_id: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub channel_type: Option<String>,
    #[serde(default)]
    pub ts: Option<String>,
    #[serde(default)]
    pub thread_ts: Option<String>,
}

/// A question extracted from an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    pub user: String,
    pub text: String,
    pub channel: String,
    /// Thread to reply in, if the question was asked in one
    pub thread_ts: Option<String>,
}

impl SlackEvent {
    /// The question this event asks, or `None` if it should be ignored.
    ///
    /// Mentions are answered anywhere; plain messages only in direct
    /// messages. Messages from bots (including this one) and edits are
    /// skipped.
    pub fn question(&self, bot_user_id: Option<&str>) -> Option<Question> {
        if self.bot_id.is_some() || self.subtype.is_some() {
            return None;
        }
        let user = self.user.as_deref()?;
        if bot_user_id == Some(user) {
            return None;
        }

        let answerable = match self.kind.as_str() {
            "app_mention" => true,
            "message" => self.channel_type.as_deref() == Some("im"),
            _ => false,
        };
        if !answerable {
            return None;
        }

        Some(Question {
            user: user.to_string(),
            text: self.text.clone().unwrap_or_default(),
            channel: self.channel.clone()?,
            thread_ts: self.thread_ts.clone(),
        })
    }
}

/// Form fields of a slash command invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlashCommand {
    pub command: String,
    pub text: String,
    pub user_id: String,
    pub channel_id: String,
    pub response_url: String,
}

impl SlashCommand {
    /// Parse the `application/x-www-form-urlencoded` body.
    pub fn from_form(body: &[u8]) -> AppResult<Self> {
        let mut command = SlashCommand::default();
        for (key, value) in url::form_urlencoded::parse(body) {
            match key.as_ref() {
                "command" => command.command = value.into_owned(),
                "text" => command.text = value.into_owned(),
                "user_id" => command.user_id = value.into_owned(),
                "channel_id" => command.channel_id = value.into_owned(),
                "response_url" => command.response_url = value.into_owned(),
                _ => {}
            }
        }

        if command.user_id.is_empty() || command.response_url.is_empty() {
            return Err(AppError::Platform(
                "Slash command payload missing user_id or response_url".to_string(),
            ));
        }
        Ok(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(value: serde_json::Value) -> SlackEvent {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_url_verification() {
        let envelope: EventEnvelope = serde_json::from_value(json!({
            "token": "x", "challenge": "abc123", "type": "url_verification"
        }))
        .unwrap();
        assert!(matches!(envelope, EventEnvelope::UrlVerification { challenge } if challenge == "abc123"));
    }

    #[test]
    fn test_unknown_envelope_type() {
        let envelope: EventEnvelope =
            serde_json::from_value(json!({"type": "app_rate_limited"})).unwrap();
        assert!(matches!(envelope, EventEnvelope::Other));
    }

    #[test]
    fn test_mention_is_a_question() {
        let envelope: EventEnvelope = serde_json::from_value(json!({
            "type": "event_callback",
            "event_id": "Ev1",
            "event": {
                "type": "app_mention",
                "user": "U1",
                "text": "<@UBOT> what is PTO?",
                "channel": "C1",
                "ts": "1.0",
                "thread_ts": "0.5"
            }
        }))
        .unwrap();
        let EventEnvelope::EventCallback { event, .. } = envelope else {
            panic!("expected event callback");
        };
        assert_eq!(
            event.question(Some("UBOT")),
            Some(Question {
                user: "U1".into(),
                text: "<@UBOT> what is PTO?".into(),
                channel: "C1".into(),
                thread_ts: Some("0.5".into()),
            })
        );
    }

    #[test]
    fn test_direct_messages_only() {
        let dm = event(json!({"type": "message", "channel_type": "im", "user": "U1", "text": "hi there", "channel": "D1"}));
        assert!(dm.question(None).is_some());

        let channel = event(json!({"type": "message", "channel_type": "channel", "user": "U1", "text": "hi there", "channel": "C1"}));
        assert!(channel.question(None).is_none());
    }

    #[test]
    fn test_bot_and_edited_messages_are_ignored() {
        let from_bot = event(json!({"type": "message", "channel_type": "im", "bot_id": "B1", "user": "U2", "text": "x", "channel": "D1"}));
        assert!(from_bot.question(None).is_none());

        let from_self = event(json!({"type": "app_mention", "user": "UBOT", "text": "x", "channel": "C1"}));
        assert!(from_self.question(Some("UBOT")).is_none());

        let edited = event(json!({"type": "message", "subtype": "message_changed", "channel_type": "im", "channel": "D1"}));
        assert!(edited.question(None).is_none());
    }

    #[test]
    fn test_slash_command_form() {
        let command = SlashCommand::from_form(
            b"command=%2Fask&text=expense+limits&user_id=U1&channel_id=C1&response_url=https%3A%2F%2Fhooks.slack.com%2Fcommands%2F1",
        )
        .unwrap();
        assert_eq!(command.command, "/ask");
        assert_eq!(command.text, "expense limits");
        assert_eq!(command.response_url, "https://hooks.slack.com/commands/1");

        assert!(SlashCommand::from_form(b"command=%2Fask&text=x").is_err());
    }
}
