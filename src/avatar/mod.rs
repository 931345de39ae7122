//! Avatar side of the interview: the conversation transport seam, the Tavus
//! conversation bootstrap, the app-message relay to browser clients, and the
//! avatar expression reducer.
//!
//! The controller only ever talks to a [`ConversationTransport`]. It hands
//! over the conversation id and text; the transport never sees or mutates
//! session state.

pub mod expression;
pub mod relay;
pub mod tavus;

use async_trait::async_trait;

use crate::error::TransportError;
use crate::interview::InterviewStage;

pub use expression::{AvatarEvent, AvatarExpression, ExpressionKind};
pub use relay::{AppMessage, AppMessageRelay};
pub use tavus::{Conversation, ConversationStatus, TavusClient, connect_with_fallback};

/// Outbound channel to the live avatar call.
///
/// Neither operation requires an acknowledgement from the avatar. Callers
/// treat failures as non-fatal.
#[async_trait]
pub trait ConversationTransport: Send + Sync {
    /// Ask the avatar to introduce a newly started stage.
    async fn announce_stage(
        &self,
        conversation_id: &str,
        stage: InterviewStage,
        introduction: &str,
    ) -> Result<(), TransportError>;

    /// Echo a candidate chat message into the conversation.
    async fn send_text(&self, conversation_id: &str, text: &str) -> Result<(), TransportError>;
}
