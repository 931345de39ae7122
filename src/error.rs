//! Error types for Interview Coach.

use std::time::Duration;

use crate::interview::InterviewStage;

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Errors raised by the session controller.
///
/// Every variant is recoverable: the session is left exactly as it was
/// before the rejected action.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Validation failed: {reason}")]
    Validation { reason: String },

    #[error("Invalid profile: {reason}")]
    InvalidProfile { reason: String },

    #[error("Cannot {action} while session is {state}")]
    InvalidTransition { state: String, action: String },

    #[error("Failed to fetch questions for stage {stage}: {reason}")]
    QuestionFetch {
        stage: InterviewStage,
        reason: String,
    },

    #[error("Question fetch for stage {stage} timed out after {timeout:?}")]
    FetchTimeout {
        stage: InterviewStage,
        timeout: Duration,
    },

    #[error("A question fetch is already in progress")]
    FetchInProgress,

    #[error("Stage {stage} has no questions; retry the fetch or end the interview")]
    StageStalled { stage: InterviewStage },

    #[error("Current question is not a coding question")]
    NoCodeQuestion,
}

/// Failures reported by a question source.
#[derive(Debug, thiserror::Error)]
pub enum QuestionSourceError {
    #[error("Question source unavailable: {reason}")]
    Unavailable { reason: String },
}

/// Avatar provider / conversation transport errors.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },
}
