use serde::Deserialize;
use serde::Serialize;
use strum_macros::Display;

/// Author of a single conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Body of `POST /api/chat/stream`.
///
/// `history` already contains the turn for `message`; the server treats it as
/// the full context window for this reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    pub history: Vec<ChatTurn>,
    pub stream: bool,
}

/// Acknowledgement returned by `POST /api/chat/stop/{session}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopAck {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(rename = "sessionId", default)]
    pub session_id: Option<String>,
}

/// Response of `GET /api/chat/health`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    #[serde(default)]
    pub service: Option<String>,
    #[serde(default)]
    pub timestamp: Option<i64>,
}

impl HealthStatus {
    pub fn is_ok(&self) -> bool {
        self.status.eq_ignore_ascii_case("ok")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn chat_request_serializes_roles_lowercase() -> anyhow::Result<()> {
        let request = ChatRequest {
            message: "hi".to_string(),
            history: vec![ChatTurn::user("hi")],
            stream: true,
        };
        assert_eq!(
            serde_json::to_value(&request)?,
            json!({
                "message": "hi",
                "history": [{ "role": "user", "content": "hi" }],
                "stream": true,
            })
        );
        Ok(())
    }

    #[test]
    fn stop_ack_reads_camel_case_session_id() -> anyhow::Result<()> {
        let ack: StopAck = serde_json::from_str(
            r#"{"success":true,"message":"stopped","sessionId":"session_1_abc"}"#,
        )?;
        assert_eq!(
            ack,
            StopAck {
                success: true,
                message: Some("stopped".to_string()),
                session_id: Some("session_1_abc".to_string()),
            }
        );
        Ok(())
    }

    #[test]
    fn role_display_matches_wire_name() {
        assert_eq!(Role::Assistant.to_string(), "assistant");
    }
}
