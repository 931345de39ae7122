//! App-message relay: turns transport calls into Daily app-message payloads
//! and fans them out to connected browser clients, which forward them into
//! the video call.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use super::ConversationTransport;
use crate::error::TransportError;
use crate::interview::InterviewStage;

/// Text payload inside an app message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppMessageProperties {
    pub modality: String,
    pub text: String,
}

/// A Daily `sendAppMessage` body addressed to the avatar conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppMessage {
    pub message_type: String,
    /// `conversation.echo` repeats candidate text; `conversation.respond`
    /// makes the avatar speak.
    pub event_type: String,
    pub conversation_id: String,
    pub properties: AppMessageProperties,
}

impl AppMessage {
    fn conversation(event_type: &str, conversation_id: &str, text: &str) -> Self {
        Self {
            message_type: "conversation".to_string(),
            event_type: event_type.to_string(),
            conversation_id: conversation_id.to_string(),
            properties: AppMessageProperties {
                modality: "text".to_string(),
                text: text.to_string(),
            },
        }
    }

    pub fn echo(conversation_id: &str, text: &str) -> Self {
        Self::conversation("conversation.echo", conversation_id, text)
    }

    pub fn respond(conversation_id: &str, text: &str) -> Self {
        Self::conversation("conversation.respond", conversation_id, text)
    }
}

/// Broadcast-backed [`ConversationTransport`].
pub struct AppMessageRelay {
    tx: broadcast::Sender<AppMessage>,
}

impl AppMessageRelay {
    pub fn new(capacity: usize) -> Arc<Self> {
        let (tx, _rx) = broadcast::channel(capacity);
        Arc::new(Self { tx })
    }

    /// Subscribe to outbound app messages. Each WS client calls this.
    pub fn subscribe(&self) -> broadcast::Receiver<AppMessage> {
        self.tx.subscribe()
    }

    fn publish(&self, msg: AppMessage) {
        // No browser connected is fine; the message is simply dropped.
        if self.tx.send(msg).is_err() {
            debug!("No app-message subscribers, message dropped");
        }
    }
}

#[async_trait]
impl ConversationTransport for AppMessageRelay {
    async fn announce_stage(
        &self,
        conversation_id: &str,
        stage: InterviewStage,
        introduction: &str,
    ) -> Result<(), TransportError> {
        debug!(conversation_id, stage = %stage, "Relaying stage announcement");
        self.publish(AppMessage::respond(conversation_id, introduction));
        Ok(())
    }

    async fn send_text(&self, conversation_id: &str, text: &str) -> Result<(), TransportError> {
        self.publish(AppMessage::echo(conversation_id, text));
        Ok(())
    }
}
