//! Tavus conversation bootstrap.
//!
//! Creates the avatar conversation the browser joins as a Daily room. When
//! the provider is unreachable after the configured retries, the service
//! falls back to a local mock conversation so an interview can still run.

use chrono::{DateTime, Utc};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::AvatarConfig;
use crate::error::TransportError;

const PROVIDER: &str = "tavus";

const CONVERSATIONAL_CONTEXT: &str = "You are a professional AI interviewer conducting a \
comprehensive interview. Ask thoughtful questions across different areas including introductory \
questions, reasoning, technical skills, and behavioral scenarios. Provide encouraging feedback \
and maintain a conversational tone. Keep responses concise and engaging.";

const CUSTOM_GREETING: &str = "Hello! I'm excited to conduct your interview today. I'll be asking \
you questions across different areas including your background, technical skills, and \
problem-solving abilities. Let's begin with some introductory questions. Could you tell me about \
yourself and what drives you in your career?";

/// Conversation lifecycle as reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    Active,
    Ended,
}

/// An avatar conversation the browser can join.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Conversation {
    pub conversation_id: String,
    #[serde(default)]
    pub conversation_name: String,
    pub status: ConversationStatus,
    pub conversation_url: String,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    /// Local stand-in used when the provider cannot be reached.
    pub fn mock() -> Self {
        let now = Utc::now();
        Self {
            conversation_id: format!("mock_{}", now.timestamp_millis()),
            conversation_name: "Mock Interview".to_string(),
            status: ConversationStatus::Active,
            conversation_url: "https://mock-daily-room.daily.co/mock-room".to_string(),
            created_at: now,
        }
    }

    pub fn is_mock(&self) -> bool {
        self.conversation_id.starts_with("mock_")
    }
}

#[derive(Debug, Serialize)]
struct ConversationProperties {
    max_call_duration: u64,
    participant_left_timeout: u64,
    participant_absent_timeout: u64,
}

#[derive(Debug, Serialize)]
struct CreateConversationRequest<'a> {
    persona_id: &'a str,
    custom_greeting: &'a str,
    conversational_context: &'a str,
    properties: ConversationProperties,
}

/// HTTP client for the Tavus conversations API.
pub struct TavusClient {
    config: AvatarConfig,
    client: reqwest::Client,
}

impl TavusClient {
    pub fn new(config: AvatarConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/v2/{path}", self.config.base_url.trim_end_matches('/'))
    }

    fn request_body(&self) -> CreateConversationRequest<'_> {
        CreateConversationRequest {
            persona_id: &self.config.persona_id,
            custom_greeting: CUSTOM_GREETING,
            conversational_context: CONVERSATIONAL_CONTEXT,
            properties: ConversationProperties {
                max_call_duration: self.config.max_call_duration.as_secs(),
                participant_left_timeout: self.config.participant_left_timeout.as_secs(),
                participant_absent_timeout: self.config.participant_absent_timeout.as_secs(),
            },
        }
    }

    /// Create a new avatar conversation.
    pub async fn create_conversation(&self) -> Result<Conversation, TransportError> {
        let resp = self
            .client
            .post(self.api_url("conversations"))
            .header("x-api-key", self.config.api_key.expose_secret())
            .json(&self.request_body())
            .send()
            .await
            .map_err(|e| TransportError::RequestFailed {
                provider: PROVIDER.into(),
                reason: e.to_string(),
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(TransportError::RequestFailed {
                provider: PROVIDER.into(),
                reason: format!("HTTP {status}: {body}"),
            });
        }

        resp.json::<Conversation>()
            .await
            .map_err(|e| TransportError::InvalidResponse {
                provider: PROVIDER.into(),
                reason: e.to_string(),
            })
    }
}

/// Create a conversation, retrying with linear back-off, then fall back to a
/// mock conversation. Never fails.
pub async fn connect_with_fallback(client: &TavusClient) -> Conversation {
    let max_retries = client.config.max_retries;
    for attempt in 0..=max_retries {
        match client.create_conversation().await {
            Ok(conversation) => {
                info!(
                    conversation_id = %conversation.conversation_id,
                    "Avatar conversation created"
                );
                return conversation;
            }
            Err(e) if attempt < max_retries => {
                let delay = client.config.retry_backoff * (attempt + 1);
                warn!(
                    error = %e,
                    attempt = attempt + 1,
                    max_retries,
                    "Avatar conversation failed, retrying in {:?}",
                    delay
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                warn!(error = %e, "Max retries reached, using mock conversation");
            }
        }
    }
    Conversation::mock()
}
