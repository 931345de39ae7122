//! Interview domain: stages and session state, the session data model, the
//! question source seam, the session controller, feedback and HTTP routes.

pub mod controller;
pub mod feedback;
pub mod model;
pub mod questions;
pub mod routes;
pub mod stage;

pub use controller::{AdvanceOutcome, SessionController, SessionEvent, SessionSnapshot};
pub use feedback::{FeedbackReport, FeedbackSection, ScoreBand};
pub use model::{
    CodeAnswer, CodeLanguage, InterviewQuestion, InterviewResponse, InterviewSession,
    QuestionType, UserProfile,
};
pub use questions::{QuestionSource, TemplateQuestionSource};
pub use routes::{AppState, WsMessage, interview_routes};
pub use stage::{InterviewStage, SessionState};
