//! Interview stage order and the session state machine.

use serde::{Deserialize, Serialize};

/// The five interview stages.
///
/// Progresses linearly: Introductory → Reasoning → NonReasoning → Technical →
/// Behavioral. The order never changes at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterviewStage {
    Introductory,
    Reasoning,
    NonReasoning,
    Technical,
    Behavioral,
}

impl InterviewStage {
    /// All stages in interview order.
    pub const ALL: [InterviewStage; 5] = [
        Self::Introductory,
        Self::Reasoning,
        Self::NonReasoning,
        Self::Technical,
        Self::Behavioral,
    ];

    /// The first stage of every session.
    pub fn first() -> Self {
        Self::Introductory
    }

    /// Zero-based position in the stage order.
    pub fn index(&self) -> usize {
        match self {
            Self::Introductory => 0,
            Self::Reasoning => 1,
            Self::NonReasoning => 2,
            Self::Technical => 3,
            Self::Behavioral => 4,
        }
    }

    /// The stage immediately after this one, if any.
    pub fn next(&self) -> Option<InterviewStage> {
        Self::ALL.get(self.index() + 1).copied()
    }

    /// Whether this is the final stage.
    pub fn is_last(&self) -> bool {
        self.next().is_none()
    }

    /// Fraction of the interview reached once this stage is active.
    pub fn progress(&self) -> f32 {
        (self.index() + 1) as f32 / Self::ALL.len() as f32
    }

    /// Human-readable label, e.g. "Non Reasoning".
    pub fn label(&self) -> &'static str {
        match self {
            Self::Introductory => "Introductory",
            Self::Reasoning => "Reasoning",
            Self::NonReasoning => "Non Reasoning",
            Self::Technical => "Technical",
            Self::Behavioral => "Behavioral",
        }
    }

    /// What the avatar says when the stage begins.
    pub fn introduction(&self) -> &'static str {
        match self {
            Self::Introductory => {
                "Hello! I'm excited to get to know you better. Let's start with some introductory \
                 questions about yourself, your interests, and your career goals."
            }
            Self::Reasoning => {
                "Great! Now let's move on to some reasoning questions. I'll present you with \
                 logical scenarios and problem-solving challenges."
            }
            Self::NonReasoning => {
                "Perfect! Let's shift to some general aptitude questions. These will help me \
                 understand your thought process and personality."
            }
            Self::Technical => {
                "Excellent! Now we're entering the technical phase. I'll ask questions specific \
                 to your profession and skills. For coding questions, I'll open a code editor \
                 for you."
            }
            Self::Behavioral => {
                "Finally, let's discuss some behavioral scenarios. I'll ask about teamwork, \
                 conflict resolution, and how you handle various workplace situations."
            }
        }
    }
}

impl std::fmt::Display for InterviewStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Introductory => "introductory",
            Self::Reasoning => "reasoning",
            Self::NonReasoning => "non_reasoning",
            Self::Technical => "technical",
            Self::Behavioral => "behavioral",
        };
        write!(f, "{s}")
    }
}

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "stage", rename_all = "snake_case")]
pub enum SessionState {
    /// No profile submitted yet.
    Uninitialized,
    StageActive(InterviewStage),
    Completed,
}

impl SessionState {
    /// Check if a transition from `self` to `target` is valid.
    ///
    /// `StageActive(s) → StageActive(s)` is the "advance question" step.
    /// Ending early is legal from any active stage.
    pub fn can_transition_to(&self, target: SessionState) -> bool {
        use SessionState::*;
        match (self, target) {
            (Uninitialized, StageActive(stage)) => stage == InterviewStage::first(),
            (StageActive(from), StageActive(to)) => *from == to || from.next() == Some(to),
            (StageActive(_), Completed) => true,
            _ => false,
        }
    }

    /// Whether the session is finished.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed)
    }

    /// The active stage, if any.
    pub fn stage(&self) -> Option<InterviewStage> {
        match self {
            Self::StageActive(stage) => Some(*stage),
            _ => None,
        }
    }

    /// Progress fraction: 0 before the interview, 1 once complete.
    pub fn progress(&self) -> f32 {
        match self {
            Self::Uninitialized => 0.0,
            Self::StageActive(stage) => stage.progress(),
            Self::Completed => 1.0,
        }
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::Uninitialized
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "uninitialized"),
            Self::StageActive(stage) => write!(f, "active ({stage})"),
            Self::Completed => write!(f, "completed"),
        }
    }
}
