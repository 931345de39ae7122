//! Configuration types.

use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Service configuration.
#[derive(Debug, Clone)]
pub struct InterviewConfig {
    /// Port for the HTTP/WebSocket API.
    pub bind_port: u16,
    /// Upper bound on a single question-source call.
    pub question_fetch_timeout: Duration,
    /// Capacity of the session event and app-message broadcast channels.
    pub event_capacity: usize,
}

impl Default for InterviewConfig {
    fn default() -> Self {
        Self {
            bind_port: 8080,
            question_fetch_timeout: Duration::from_secs(10),
            event_capacity: 256,
        }
    }
}

impl InterviewConfig {
    /// Build from `INTERVIEW_*` environment variables, falling back to defaults
    /// for anything missing or unparseable.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let bind_port: u16 = std::env::var("INTERVIEW_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.bind_port);

        let question_fetch_timeout = std::env::var("INTERVIEW_FETCH_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.question_fetch_timeout);

        let event_capacity: usize = std::env::var("INTERVIEW_EVENT_CAPACITY")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.event_capacity);

        Self {
            bind_port,
            question_fetch_timeout,
            event_capacity,
        }
    }

    /// Reject values the runtime cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.question_fetch_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                key: "INTERVIEW_FETCH_TIMEOUT_SECS".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        // tokio's broadcast channel panics on zero capacity.
        if self.event_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                key: "INTERVIEW_EVENT_CAPACITY".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

/// Tavus avatar provider configuration.
#[derive(Debug, Clone)]
pub struct AvatarConfig {
    pub api_key: SecretString,
    pub base_url: String,
    pub persona_id: String,
    /// Hard cap on the video call length.
    pub max_call_duration: Duration,
    pub participant_left_timeout: Duration,
    pub participant_absent_timeout: Duration,
    /// Connection attempts before falling back to a mock conversation.
    pub max_retries: u32,
    /// Back-off unit; attempt `n` waits `n * retry_backoff`.
    pub retry_backoff: Duration,
}

impl AvatarConfig {
    /// Build from `TAVUS_*` environment variables. Returns `None` when no API
    /// key is set, in which case the service runs with a mock conversation.
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("TAVUS_API_KEY").ok()?;
        if api_key.trim().is_empty() {
            return None;
        }

        let base_url =
            std::env::var("TAVUS_BASE_URL").unwrap_or_else(|_| "https://tavusapi.com".to_string());
        let persona_id = std::env::var("TAVUS_PERSONA_ID").unwrap_or_else(|_| "pd43ffef".to_string());

        Some(Self {
            api_key: SecretString::from(api_key),
            base_url,
            persona_id,
            ..Self::with_key("")
        })
    }

    /// Defaults around a given API key.
    pub fn with_key(api_key: &str) -> Self {
        Self {
            api_key: SecretString::from(api_key.to_string()),
            base_url: "https://tavusapi.com".to_string(),
            persona_id: "pd43ffef".to_string(),
            max_call_duration: Duration::from_secs(3600), // 1 hour
            participant_left_timeout: Duration::from_secs(60),
            participant_absent_timeout: Duration::from_secs(300),
            max_retries: 3,
            retry_backoff: Duration::from_secs(2),
        }
    }
}
