//! Avatar expression: view-only state reduced from call events.
//!
//! Has no bearing on session correctness; the browser uses it to pick an
//! overlay for the avatar tile.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpressionKind {
    Neutral,
    Listening,
    Speaking,
    Thinking,
    Encouraging,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AvatarExpression {
    pub kind: ExpressionKind,
    /// 0.0 – 1.0
    pub intensity: f32,
}

impl Default for AvatarExpression {
    fn default() -> Self {
        Self::new(ExpressionKind::Neutral, 0.5)
    }
}

/// Events observed on the call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum AvatarEvent {
    /// `participant-updated` for the avatar; `audio` is whether its track is on.
    ParticipantUpdated { audio: bool },
    UserSpeaking,
    UserFinishedSpeaking,
    PositiveKeyword,
    StageAnnounced,
    #[serde(other)]
    Unknown,
}

impl AvatarExpression {
    pub fn new(kind: ExpressionKind, intensity: f32) -> Self {
        Self { kind, intensity }
    }

    /// Next expression after `event`. Unknown events leave it unchanged.
    pub fn reduce(self, event: &AvatarEvent) -> Self {
        use ExpressionKind::*;
        match event {
            AvatarEvent::ParticipantUpdated { audio: true } => Self::new(Speaking, 0.9),
            AvatarEvent::ParticipantUpdated { audio: false } => Self::new(Listening, 0.6),
            AvatarEvent::UserSpeaking => Self::new(Listening, 0.7),
            // The browser flips back to speaking on its own after a beat.
            AvatarEvent::UserFinishedSpeaking => Self::new(Thinking, 0.5),
            AvatarEvent::PositiveKeyword => Self::new(Encouraging, 0.9),
            AvatarEvent::StageAnnounced => Self::new(Speaking, 0.8),
            AvatarEvent::Unknown => self,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_neutral() {
        let e = AvatarExpression::default();
        assert_eq!(e.kind, ExpressionKind::Neutral);
        assert!((e.intensity - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn conversation_turn_sequence() {
        let events = [
            AvatarEvent::StageAnnounced,
            AvatarEvent::UserSpeaking,
            AvatarEvent::UserFinishedSpeaking,
            AvatarEvent::PositiveKeyword,
            AvatarEvent::ParticipantUpdated { audio: false },
        ];
        let kinds: Vec<ExpressionKind> = events
            .iter()
            .scan(AvatarExpression::default(), |state, event| {
                *state = state.reduce(event);
                Some(state.kind)
            })
            .collect();
        assert_eq!(
            kinds,
            vec![
                ExpressionKind::Speaking,
                ExpressionKind::Listening,
                ExpressionKind::Thinking,
                ExpressionKind::Encouraging,
                ExpressionKind::Listening,
            ]
        );
    }

    #[test]
    fn unknown_event_is_ignored() {
        let e = AvatarExpression::new(ExpressionKind::Thinking, 0.5);
        let event: AvatarEvent = serde_json::from_str(r#"{"event_type": "replica_blinked"}"#).unwrap();
        assert_eq!(event, AvatarEvent::Unknown);
        assert_eq!(e.reduce(&event), e);
    }

    #[test]
    fn parses_wire_events() {
        let event: AvatarEvent =
            serde_json::from_str(r#"{"event_type": "participant_updated", "audio": true}"#).unwrap();
        assert_eq!(event, AvatarEvent::ParticipantUpdated { audio: true });
        let event: AvatarEvent =
            serde_json::from_str(r#"{"event_type": "user_finished_speaking"}"#).unwrap();
        assert_eq!(event, AvatarEvent::UserFinishedSpeaking);
    }
}
