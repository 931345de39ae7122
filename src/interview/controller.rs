//! SessionController owns one interview session and drives it through the
//! five stages to completion.
//!
//! Actions are serialized on an internal lock. The lock is never held across
//! a question fetch; instead a fetch-in-flight flag makes concurrent
//! advances fail fast with [`SessionError::FetchInProgress`]. The flag is
//! owned by a [`FetchGuard`], so a cancelled action never leaves it set.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, broadcast};
use tracing::{debug, info, warn};

use super::feedback::FeedbackReport;
use super::model::{
    CodeAnswer, CodeLanguage, InterviewQuestion, InterviewResponse, InterviewSession, UserProfile,
};
use super::questions::QuestionSource;
use super::stage::{InterviewStage, SessionState};
use crate::avatar::{Conversation, ConversationTransport};
use crate::config::InterviewConfig;
use crate::error::SessionError;

/// Events broadcast to observers as the session moves.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    StageStarted {
        stage: InterviewStage,
        introduction: String,
        progress: f32,
    },
    QuestionPresented {
        stage: InterviewStage,
        index: usize,
        total: usize,
        question: InterviewQuestion,
    },
    ResponseRecorded {
        question_id: String,
    },
    /// A code question was left without a saved draft.
    QuestionSkipped {
        question_id: String,
    },
    StageStalled {
        stage: InterviewStage,
        reason: String,
    },
    Completed {
        end_time: DateTime<Utc>,
    },
}

/// Where the session stands after a successful action.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AdvanceOutcome {
    Question {
        stage: InterviewStage,
        index: usize,
        total: usize,
        question: InterviewQuestion,
    },
    /// The stage has no questions to present. Retry the fetch or end the
    /// interview.
    Stalled {
        stage: InterviewStage,
        reason: String,
    },
    Completed {
        end_time: DateTime<Utc>,
    },
}

/// Serializable view of the controller for the HTTP layer.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub progress: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_question: Option<InterviewQuestion>,
    /// 1-based position of the current question within its stage.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question_number: Option<usize>,
    pub question_total: usize,
    /// Suggested answer time for the current question, as `m:ss`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_duration: Option<String>,
    pub stalled: bool,
    pub fetch_in_flight: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_draft: Option<CodeAnswer>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation: Option<Conversation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<InterviewSession>,
}

#[derive(Default)]
struct ControllerInner {
    session: Option<InterviewSession>,
    /// Editor contents for the current code question.
    code_draft: Option<CodeAnswer>,
}

impl ControllerInner {
    fn state(&self) -> SessionState {
        match &self.session {
            None => SessionState::Uninitialized,
            Some(s) if s.is_completed() => SessionState::Completed,
            Some(s) => SessionState::StageActive(s.current_stage),
        }
    }

    /// The active session, or `InvalidTransition` naming `action`.
    fn active_session_mut(&mut self, action: &str) -> Result<&mut InterviewSession, SessionError> {
        let state = self.state();
        match self.session.as_mut() {
            Some(session) if !session.is_completed() => Ok(session),
            _ => Err(invalid(state, action)),
        }
    }
}

/// Marks a question fetch as outstanding; clears the mark on drop.
///
/// Only created while holding the controller lock.
struct FetchGuard<'a>(&'a AtomicBool);

impl<'a> FetchGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self, SessionError> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| Self(flag))
            .map_err(|_| SessionError::FetchInProgress)
    }
}

impl Drop for FetchGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

fn invalid(state: SessionState, action: &str) -> SessionError {
    SessionError::InvalidTransition {
        state: state.to_string(),
        action: action.to_string(),
    }
}

fn question_outcome(session: &InterviewSession) -> AdvanceOutcome {
    match session.current_question() {
        Some(question) => AdvanceOutcome::Question {
            stage: session.current_stage,
            index: session.current_question_index,
            total: session.questions.len(),
            question: question.clone(),
        },
        None => AdvanceOutcome::Stalled {
            stage: session.current_stage,
            reason: SessionError::StageStalled {
                stage: session.current_stage,
            }
            .to_string(),
        },
    }
}

/// Drives a single interview session.
pub struct SessionController {
    source: Arc<dyn QuestionSource>,
    transport: Option<Arc<dyn ConversationTransport>>,
    conversation: Option<Conversation>,
    fetch_timeout: Duration,
    inner: Mutex<ControllerInner>,
    fetch_in_flight: AtomicBool,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionController {
    pub fn new(source: Arc<dyn QuestionSource>, config: &InterviewConfig) -> Self {
        let (events, _rx) = broadcast::channel(config.event_capacity);
        Self {
            source,
            transport: None,
            conversation: None,
            fetch_timeout: config.question_fetch_timeout,
            inner: Mutex::new(ControllerInner::default()),
            fetch_in_flight: AtomicBool::new(false),
            events,
        }
    }

    /// Attach the avatar conversation that stage changes and chat go to.
    pub fn with_transport(
        mut self,
        transport: Arc<dyn ConversationTransport>,
        conversation: Conversation,
    ) -> Self {
        self.transport = Some(transport);
        self.conversation = Some(conversation);
        self
    }

    /// Subscribe to session events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn conversation(&self) -> Option<&Conversation> {
        self.conversation.as_ref()
    }

    pub async fn state(&self) -> SessionState {
        self.inner.lock().await.state()
    }

    /// Progress fraction for the current state.
    pub async fn progress(&self) -> f32 {
        self.state().await.progress()
    }

    /// A copy of the session, if one has started.
    pub async fn session(&self) -> Option<InterviewSession> {
        self.inner.lock().await.session.clone()
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let inner = self.inner.lock().await;
        let state = inner.state();
        let session = inner.session.as_ref();
        let active = session.filter(|s| !s.is_completed());
        let current_question = active.and_then(|s| s.current_question()).cloned();
        SessionSnapshot {
            state,
            progress: state.progress(),
            question_number: current_question
                .as_ref()
                .and(active.map(|s| s.current_question_index + 1)),
            question_total: active.map(|s| s.questions.len()).unwrap_or(0),
            expected_duration: current_question
                .as_ref()
                .and_then(InterviewQuestion::expected_duration_label),
            current_question,
            stalled: active.is_some_and(|s| s.questions.is_empty()),
            fetch_in_flight: self.fetch_in_flight.load(Ordering::Acquire),
            code_draft: inner.code_draft.clone(),
            conversation: self.conversation.clone(),
            session: inner.session.clone(),
        }
    }

    /// Start the session for a submitted profile (`Uninitialized → introductory`).
    /// A completed session is replaced; an active one is left alone.
    ///
    /// The session exists once this returns, even if the first fetch fails;
    /// in that case the outcome is `Stalled`.
    pub async fn start(&self, profile: UserProfile) -> Result<AdvanceOutcome, SessionError> {
        let profile = profile.normalized()?;
        let start_time = Utc::now();
        let guard = {
            let inner = self.inner.lock().await;
            if self.fetch_in_flight.load(Ordering::Acquire) {
                return Err(SessionError::FetchInProgress);
            }
            let state = inner.state();
            if state != SessionState::Uninitialized && !state.is_terminal() {
                return Err(invalid(state, "start a new session"));
            }
            if let Some(previous) = &inner.session {
                info!(session_id = %previous.id, "Replacing completed session");
            }
            FetchGuard::acquire(&self.fetch_in_flight)?
        };

        let stage = InterviewStage::first();
        let fetched = self.fetch(&profile, stage).await;

        let (outcome, session_id) = {
            let mut inner = self.inner.lock().await;
            let mut session = InterviewSession::new(profile, start_time);
            let outcome = self.enter_stage(&mut session, stage, fetched);
            let id = session.id;
            inner.session = Some(session);
            inner.code_draft = None;
            drop(guard);
            (outcome, id)
        };

        info!(session_id = %session_id, "Interview session started");
        self.announce(stage).await;
        Ok(outcome)
    }

    /// Submit the current question and move on.
    ///
    /// Text questions need a non-blank `response`. Code questions record the
    /// saved draft (with `response` as its explanation), or are skipped when
    /// no draft exists. On the last question of a stage the next stage's
    /// questions are fetched; on the last question of the last stage the
    /// session completes.
    pub async fn advance(&self, response: Option<&str>) -> Result<AdvanceOutcome, SessionError> {
        let now = Utc::now();
        let text = response.map(str::trim).unwrap_or_default().to_string();

        let (profile, next_stage, pending, guard) = {
            let mut inner = self.inner.lock().await;
            if self.fetch_in_flight.load(Ordering::Acquire) {
                return Err(SessionError::FetchInProgress);
            }
            let draft = inner.code_draft.clone();
            let session = inner.active_session_mut("advance")?;
            let stage = session.current_stage;
            let question = session
                .current_question()
                .cloned()
                .ok_or(SessionError::StageStalled { stage })?;

            let pending = if question.is_code() {
                draft.map(|code| session.response_at(&question, text.clone(), Some(code), now))
            } else if text.is_empty() {
                warn!(question_id = %question.id, "Rejected empty response");
                return Err(SessionError::Validation {
                    reason: "a response is required for this question".to_string(),
                });
            } else {
                Some(session.response_at(&question, text.clone(), None, now))
            };

            if !session.is_last_question() {
                Self::record(session, &question, pending, &self.events);
                session.current_question_index += 1;
                debug!(
                    session_id = %session.id,
                    stage = %stage,
                    index = session.current_question_index,
                    "Advanced to next question"
                );
                let outcome = question_outcome(session);
                self.emit_question(session);
                inner.code_draft = None;
                return Ok(outcome);
            }

            match stage.next() {
                None => {
                    Self::record(session, &question, pending, &self.events);
                    session.end_time = Some(now);
                    info!(
                        session_id = %session.id,
                        responses = session.responses.len(),
                        "Interview completed"
                    );
                    inner.code_draft = None;
                    let _ = self.events.send(SessionEvent::Completed { end_time: now });
                    return Ok(AdvanceOutcome::Completed { end_time: now });
                }
                Some(next) => {
                    let profile = session.user_profile.clone();
                    let guard = FetchGuard::acquire(&self.fetch_in_flight)?;
                    (profile, next, (question, pending), guard)
                }
            }
        };

        let fetched = self.fetch(&profile, next_stage).await;

        let outcome = {
            let mut inner = self.inner.lock().await;
            drop(guard);
            let Some(session) = inner.session.as_mut() else {
                return Err(invalid(SessionState::Uninitialized, "advance"));
            };
            if let Some(end_time) = session.end_time {
                warn!(
                    session_id = %session.id,
                    "Session ended during question fetch, pending answer dropped"
                );
                return Ok(AdvanceOutcome::Completed { end_time });
            }
            debug_assert!(
                SessionState::StageActive(session.current_stage)
                    .can_transition_to(SessionState::StageActive(next_stage))
            );
            let (question, pending) = pending;
            Self::record(session, &question, pending, &self.events);
            let outcome = self.enter_stage(session, next_stage, fetched);
            inner.code_draft = None;
            outcome
        };

        self.announce(next_stage).await;
        Ok(outcome)
    }

    /// Re-request questions for a stalled stage.
    pub async fn retry_fetch(&self) -> Result<AdvanceOutcome, SessionError> {
        let (profile, stage, guard) = {
            let mut inner = self.inner.lock().await;
            if self.fetch_in_flight.load(Ordering::Acquire) {
                return Err(SessionError::FetchInProgress);
            }
            let state = inner.state();
            let session = inner.active_session_mut("retry a question fetch")?;
            if !session.questions.is_empty() {
                return Err(invalid(state, "retry a fetch for a stage that has questions"));
            }
            let profile = session.user_profile.clone();
            let stage = session.current_stage;
            (profile, stage, FetchGuard::acquire(&self.fetch_in_flight)?)
        };

        info!(stage = %stage, "Retrying question fetch");
        let fetched = self.fetch(&profile, stage).await;

        let mut inner = self.inner.lock().await;
        drop(guard);
        let Some(session) = inner.session.as_mut() else {
            return Err(invalid(SessionState::Uninitialized, "retry a question fetch"));
        };
        if let Some(end_time) = session.end_time {
            return Ok(AdvanceOutcome::Completed { end_time });
        }
        let questions = fetched?;
        session.questions = questions;
        session.current_question_index = 0;
        self.emit_question(session);
        Ok(question_outcome(session))
    }

    /// End the interview now. Idempotent: once completed, returns the
    /// original end time without changing anything.
    pub async fn end_now(&self) -> Result<DateTime<Utc>, SessionError> {
        let mut inner = self.inner.lock().await;
        let state = inner.state();
        let session = inner
            .session
            .as_mut()
            .ok_or_else(|| invalid(state, "end the interview"))?;

        if let Some(end_time) = session.end_time {
            debug!(session_id = %session.id, "End requested on completed session, ignoring");
            return Ok(end_time);
        }

        let end_time = Utc::now();
        session.end_time = Some(end_time);
        info!(
            session_id = %session.id,
            stage = %session.current_stage,
            responses = session.responses.len(),
            "Interview ended early"
        );
        inner.code_draft = None;
        let _ = self.events.send(SessionEvent::Completed { end_time });
        Ok(end_time)
    }

    /// Save editor contents for the current code question.
    pub async fn save_code(&self, code: &str, language: CodeLanguage) -> Result<(), SessionError> {
        if code.trim().is_empty() {
            return Err(SessionError::Validation {
                reason: "code must not be empty".to_string(),
            });
        }
        let mut inner = self.inner.lock().await;
        let session = inner.active_session_mut("save code")?;
        let question = session
            .current_question()
            .ok_or(SessionError::NoCodeQuestion)?;
        if !question.is_code() {
            return Err(SessionError::NoCodeQuestion);
        }
        debug!(question_id = %question.id, language = %language, "Code draft saved");
        inner.code_draft = Some(CodeAnswer {
            code: code.to_string(),
            language,
        });
        Ok(())
    }

    /// Forward a candidate chat message to the avatar.
    ///
    /// Returns whether the message was handed to a transport. Transport
    /// failures are logged, not returned.
    pub async fn send_chat(&self, text: &str) -> Result<bool, SessionError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SessionError::Validation {
                reason: "message must not be empty".to_string(),
            });
        }
        let (Some(transport), Some(conversation)) = (&self.transport, &self.conversation) else {
            debug!("No conversation transport, chat message not forwarded");
            return Ok(false);
        };
        match transport
            .send_text(&conversation.conversation_id, text)
            .await
        {
            Ok(()) => Ok(true),
            Err(e) => {
                warn!(error = %e, "Failed to forward chat message");
                Ok(false)
            }
        }
    }

    /// Feedback for a completed session.
    pub async fn feedback(&self) -> Result<FeedbackReport, SessionError> {
        let inner = self.inner.lock().await;
        match inner.session.as_ref() {
            Some(session) if session.is_completed() => Ok(FeedbackReport::from_session(session)),
            _ => Err(invalid(inner.state(), "produce feedback")),
        }
    }

    /// Fetch a stage's questions, bounded by the configured timeout.
    ///
    /// Empty lists and questions belonging to another stage count as a
    /// failed fetch.
    async fn fetch(
        &self,
        profile: &UserProfile,
        stage: InterviewStage,
    ) -> Result<Vec<InterviewQuestion>, SessionError> {
        let questions =
            match tokio::time::timeout(self.fetch_timeout, self.source.questions(profile, stage))
                .await
            {
                Err(_) => {
                    return Err(SessionError::FetchTimeout {
                        stage,
                        timeout: self.fetch_timeout,
                    });
                }
                Ok(Err(e)) => {
                    return Err(SessionError::QuestionFetch {
                        stage,
                        reason: e.to_string(),
                    });
                }
                Ok(Ok(questions)) => questions,
            };

        let total = questions.len();
        let questions: Vec<InterviewQuestion> =
            questions.into_iter().filter(|q| q.stage == stage).collect();
        if questions.len() != total {
            warn!(
                stage = %stage,
                dropped = total - questions.len(),
                "Question source returned questions for another stage"
            );
        }
        if questions.is_empty() {
            return Err(SessionError::QuestionFetch {
                stage,
                reason: "question source returned no questions".to_string(),
            });
        }
        Ok(questions)
    }

    /// Replace the question list wholesale and reset the cursor.
    fn enter_stage(
        &self,
        session: &mut InterviewSession,
        stage: InterviewStage,
        fetched: Result<Vec<InterviewQuestion>, SessionError>,
    ) -> AdvanceOutcome {
        session.current_stage = stage;
        session.current_question_index = 0;
        let _ = self.events.send(SessionEvent::StageStarted {
            stage,
            introduction: stage.introduction().to_string(),
            progress: stage.progress(),
        });

        match fetched {
            Ok(questions) => {
                info!(
                    session_id = %session.id,
                    stage = %stage,
                    questions = questions.len(),
                    "Stage started"
                );
                session.questions = questions;
                self.emit_question(session);
                question_outcome(session)
            }
            Err(e) => {
                warn!(session_id = %session.id, stage = %stage, error = %e, "Stage stalled");
                session.questions.clear();
                let reason = e.to_string();
                let _ = self.events.send(SessionEvent::StageStalled {
                    stage,
                    reason: reason.clone(),
                });
                AdvanceOutcome::Stalled { stage, reason }
            }
        }
    }

    /// Append a pending response, or note a skipped code question.
    fn record(
        session: &mut InterviewSession,
        question: &InterviewQuestion,
        pending: Option<InterviewResponse>,
        events: &broadcast::Sender<SessionEvent>,
    ) {
        match pending {
            Some(response) if !session.has_response_for(&response.question_id) => {
                let question_id = response.question_id.clone();
                session.responses.push(response);
                let _ = events.send(SessionEvent::ResponseRecorded { question_id });
            }
            Some(response) => {
                warn!(question_id = %response.question_id, "Question already answered, response ignored");
            }
            None => {
                info!(question_id = %question.id, "Code question left without an answer");
                let _ = events.send(SessionEvent::QuestionSkipped {
                    question_id: question.id.clone(),
                });
            }
        }
    }

    fn emit_question(&self, session: &InterviewSession) {
        if let Some(question) = session.current_question() {
            let _ = self.events.send(SessionEvent::QuestionPresented {
                stage: session.current_stage,
                index: session.current_question_index,
                total: session.questions.len(),
                question: question.clone(),
            });
        }
    }

    /// Tell the avatar a stage began. Failures never affect the session.
    async fn announce(&self, stage: InterviewStage) {
        let (Some(transport), Some(conversation)) = (&self.transport, &self.conversation) else {
            return;
        };
        if let Err(e) = transport
            .announce_stage(&conversation.conversation_id, stage, stage.introduction())
            .await
        {
            warn!(stage = %stage, error = %e, "Failed to announce stage to avatar");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::error::{QuestionSourceError, TransportError};
    use crate::interview::model::QuestionType;
    use crate::interview::questions::TemplateQuestionSource;

    fn ada() -> UserProfile {
        UserProfile {
            full_name: "Ada".to_string(),
            profession: "Engineer".to_string(),
            skills: vec!["C".to_string()],
            ..Default::default()
        }
    }

    fn config() -> InterviewConfig {
        InterviewConfig {
            question_fetch_timeout: Duration::from_millis(200),
            ..Default::default()
        }
    }

    /// `per_stage` text questions per stage, ids `<stage>_<n>`.
    struct FixedSource {
        per_stage: usize,
        code_in: Option<InterviewStage>,
    }

    #[async_trait]
    impl QuestionSource for FixedSource {
        async fn questions(
            &self,
            _profile: &UserProfile,
            stage: InterviewStage,
        ) -> Result<Vec<InterviewQuestion>, QuestionSourceError> {
            Ok((0..self.per_stage)
                .map(|n| {
                    let id = format!("{stage}_{n}");
                    if self.code_in == Some(stage) && n == 0 {
                        InterviewQuestion::code(id, stage, "Write code")
                    } else {
                        InterviewQuestion::text(id, stage, "Tell me")
                    }
                })
                .collect())
        }
    }

    /// Fails (or returns nothing) for one stage until `heal` is set.
    struct FlakySource {
        broken: InterviewStage,
        empty_instead_of_error: bool,
        calls: AtomicUsize,
        healed: StdMutex<bool>,
    }

    #[async_trait]
    impl QuestionSource for FlakySource {
        async fn questions(
            &self,
            profile: &UserProfile,
            stage: InterviewStage,
        ) -> Result<Vec<InterviewQuestion>, QuestionSourceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if stage == self.broken && !*self.healed.lock().unwrap() {
                if self.empty_instead_of_error {
                    return Ok(vec![]);
                }
                return Err(QuestionSourceError::Unavailable {
                    reason: "backend down".to_string(),
                });
            }
            FixedSource {
                per_stage: 1,
                code_in: None,
            }
            .questions(profile, stage)
            .await
        }
    }

    /// Sleeps before answering any stage after the first.
    struct SlowSource {
        delay: Duration,
    }

    #[async_trait]
    impl QuestionSource for SlowSource {
        async fn questions(
            &self,
            _profile: &UserProfile,
            stage: InterviewStage,
        ) -> Result<Vec<InterviewQuestion>, QuestionSourceError> {
            if stage != InterviewStage::first() {
                tokio::time::sleep(self.delay).await;
            }
            Ok(vec![InterviewQuestion::text(format!("{stage}_0"), stage, "?")])
        }
    }

    #[derive(Default)]
    struct RecordingTransport {
        announced: StdMutex<Vec<InterviewStage>>,
        sent: StdMutex<Vec<String>>,
    }

    #[async_trait]
    impl ConversationTransport for RecordingTransport {
        async fn announce_stage(
            &self,
            _conversation_id: &str,
            stage: InterviewStage,
            _introduction: &str,
        ) -> Result<(), TransportError> {
            self.announced.lock().unwrap().push(stage);
            Ok(())
        }

        async fn send_text(&self, _conversation_id: &str, text: &str) -> Result<(), TransportError> {
            self.sent.lock().unwrap().push(text.to_string());
            Ok(())
        }
    }

    fn fixed(per_stage: usize) -> SessionController {
        SessionController::new(
            Arc::new(FixedSource {
                per_stage,
                code_in: None,
            }),
            &config(),
        )
    }

    async fn answer_stage(controller: &SessionController) -> AdvanceOutcome {
        let stage = controller.state().await.stage().unwrap();
        loop {
            let outcome = controller.advance(Some("an answer")).await.unwrap();
            match &outcome {
                AdvanceOutcome::Question { stage: s, .. } if *s == stage => continue,
                _ => return outcome,
            }
        }
    }

    #[tokio::test]
    async fn start_enters_introductory_stage() {
        let controller = SessionController::new(Arc::new(TemplateQuestionSource::new()), &config());
        assert_eq!(controller.state().await, SessionState::Uninitialized);

        let outcome = controller.start(ada()).await.unwrap();
        assert!(matches!(
            outcome,
            AdvanceOutcome::Question {
                stage: InterviewStage::Introductory,
                index: 0,
                ..
            }
        ));

        let session = controller.session().await.unwrap();
        assert_eq!(session.current_stage, InterviewStage::Introductory);
        assert_eq!(session.current_question_index, 0);
        assert!(session.responses.is_empty());
        assert!(session.end_time.is_none());
    }

    #[tokio::test]
    async fn answering_all_introductory_questions_moves_to_reasoning() {
        let controller = SessionController::new(Arc::new(TemplateQuestionSource::new()), &config());
        controller.start(ada()).await.unwrap();
        let intro_count = controller.session().await.unwrap().questions.len();

        let outcome = answer_stage(&controller).await;
        assert!(matches!(
            outcome,
            AdvanceOutcome::Question {
                stage: InterviewStage::Reasoning,
                index: 0,
                ..
            }
        ));

        let session = controller.session().await.unwrap();
        assert_eq!(session.current_stage, InterviewStage::Reasoning);
        assert_eq!(session.current_question_index, 0);
        assert_eq!(session.responses.len(), intro_count);
        assert!(session.questions.iter().all(|q| q.stage == InterviewStage::Reasoning));
    }

    #[tokio::test]
    async fn start_twice_is_rejected() {
        let controller = fixed(1);
        controller.start(ada()).await.unwrap();
        let err = controller.start(ada()).await.unwrap_err();
        assert!(matches!(err, SessionError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn start_after_completion_begins_fresh_session() {
        let controller = fixed(1);
        controller.start(ada()).await.unwrap();
        controller.advance(Some("answer")).await.unwrap();
        controller.end_now().await.unwrap();
        let old_id = controller.session().await.unwrap().id;

        controller.start(ada()).await.unwrap();
        let session = controller.session().await.unwrap();
        assert_ne!(session.id, old_id);
        assert!(session.responses.is_empty());
        assert_eq!(
            controller.state().await,
            SessionState::StageActive(InterviewStage::Introductory)
        );
    }

    #[tokio::test]
    async fn start_rejects_invalid_profile() {
        let controller = fixed(1);
        let profile = UserProfile {
            full_name: "  ".to_string(),
            ..ada()
        };
        let err = controller.start(profile).await.unwrap_err();
        assert!(matches!(err, SessionError::InvalidProfile { .. }));
        assert_eq!(controller.state().await, SessionState::Uninitialized);
    }

    #[tokio::test]
    async fn advance_before_start_is_rejected() {
        let controller = fixed(1);
        let err = controller.advance(Some("hello")).await.unwrap_err();
        assert!(matches!(err, SessionError::InvalidTransition { .. }));
        assert!(err.to_string().contains("uninitialized"));
    }

    #[tokio::test]
    async fn stages_visited_in_order_then_completed() {
        let controller = fixed(2);
        controller.start(ada()).await.unwrap();

        let mut visited = vec![controller.state().await.stage().unwrap()];
        loop {
            match answer_stage(&controller).await {
                AdvanceOutcome::Question { stage, .. } => visited.push(stage),
                AdvanceOutcome::Completed { .. } => break,
                other => panic!("unexpected outcome {other:?}"),
            }
        }
        assert_eq!(visited, InterviewStage::ALL.to_vec());
        assert_eq!(controller.state().await, SessionState::Completed);

        let session = controller.session().await.unwrap();
        assert_eq!(session.responses.len(), 10);
        assert!(session.end_time.is_some());
    }

    #[tokio::test]
    async fn single_question_stage_progresses_one_fifth() {
        let controller = fixed(1);
        controller.start(ada()).await.unwrap();
        assert!((controller.progress().await - 0.2).abs() < f32::EPSILON);

        controller.advance(Some("answer")).await.unwrap();
        assert_eq!(
            controller.state().await,
            SessionState::StageActive(InterviewStage::Reasoning)
        );
        assert!((controller.progress().await - 0.4).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn blank_response_leaves_state_unchanged() {
        let controller = fixed(2);
        controller.start(ada()).await.unwrap();

        for blank in [None, Some(""), Some("   \n\t")] {
            let err = controller.advance(blank).await.unwrap_err();
            assert!(matches!(err, SessionError::Validation { .. }));
        }

        let session = controller.session().await.unwrap();
        assert_eq!(session.current_question_index, 0);
        assert!(session.responses.is_empty());
    }

    #[tokio::test]
    async fn response_records_question_and_elapsed_time() {
        let controller = fixed(2);
        controller.start(ada()).await.unwrap();
        controller.advance(Some("  first answer  ")).await.unwrap();

        let session = controller.session().await.unwrap();
        let response = &session.responses[0];
        assert_eq!(response.question_id, "introductory_0");
        assert_eq!(response.response, "first answer");
        assert!(response.duration_ms >= 0);
        assert!(response.timestamp >= session.start_time);
    }

    #[tokio::test]
    async fn last_behavioral_question_completes_session() {
        let controller = fixed(1);
        controller.start(ada()).await.unwrap();
        for _ in 0..4 {
            controller.advance(Some("answer")).await.unwrap();
        }
        assert_eq!(
            controller.state().await,
            SessionState::StageActive(InterviewStage::Behavioral)
        );

        let outcome = controller.advance(Some("final answer")).await.unwrap();
        assert!(matches!(outcome, AdvanceOutcome::Completed { .. }));
        assert_eq!(controller.state().await, SessionState::Completed);
        assert_eq!(controller.session().await.unwrap().responses.len(), 5);
    }

    #[tokio::test]
    async fn end_now_is_idempotent() {
        let controller = fixed(2);
        controller.start(ada()).await.unwrap();

        let first = controller.end_now().await.unwrap();
        let second = controller.end_now().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(controller.session().await.unwrap().end_time, Some(first));
    }

    #[tokio::test]
    async fn end_now_before_start_is_rejected() {
        let controller = fixed(1);
        assert!(matches!(
            controller.end_now().await,
            Err(SessionError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn end_mid_technical_blocks_further_advances() {
        let controller = fixed(1);
        controller.start(ada()).await.unwrap();
        for _ in 0..3 {
            controller.advance(Some("answer")).await.unwrap();
        }
        assert_eq!(
            controller.state().await,
            SessionState::StageActive(InterviewStage::Technical)
        );

        let before = Utc::now();
        let end_time = controller.end_now().await.unwrap();
        assert!(end_time >= before);

        let responses_before = controller.session().await.unwrap().responses.len();
        let err = controller.advance(Some("too late")).await.unwrap_err();
        assert!(matches!(err, SessionError::InvalidTransition { .. }));

        let session = controller.session().await.unwrap();
        assert_eq!(session.end_time, Some(end_time));
        assert_eq!(session.responses.len(), responses_before);
        assert_eq!(session.current_stage, InterviewStage::Technical);
    }

    #[tokio::test]
    async fn code_question_without_draft_is_skipped() {
        let controller = SessionController::new(
            Arc::new(FixedSource {
                per_stage: 2,
                code_in: Some(InterviewStage::Introductory),
            }),
            &config(),
        );
        controller.start(ada()).await.unwrap();
        let mut rx = controller.subscribe();

        // Blank response is fine for code questions.
        controller.advance(None).await.unwrap();

        let session = controller.session().await.unwrap();
        assert_eq!(session.current_question_index, 1);
        assert!(session.responses.is_empty());
        assert!(matches!(
            rx.recv().await.unwrap(),
            SessionEvent::QuestionSkipped { .. }
        ));
    }

    #[tokio::test]
    async fn code_answer_is_persisted() {
        let controller = SessionController::new(
            Arc::new(FixedSource {
                per_stage: 2,
                code_in: Some(InterviewStage::Introductory),
            }),
            &config(),
        );
        controller.start(ada()).await.unwrap();
        assert_eq!(
            controller.snapshot().await.current_question.unwrap().kind,
            QuestionType::Code
        );

        controller
            .save_code("def solution():\n    return 42", CodeLanguage::Python)
            .await
            .unwrap();
        assert!(controller.snapshot().await.code_draft.is_some());

        controller.advance(Some("returns the answer")).await.unwrap();

        let session = controller.session().await.unwrap();
        let response = &session.responses[0];
        assert_eq!(response.response, "returns the answer");
        let code = response.code.as_ref().unwrap();
        assert_eq!(code.language, CodeLanguage::Python);
        assert!(code.code.contains("return 42"));

        // Draft does not leak onto the next question.
        assert!(controller.snapshot().await.code_draft.is_none());
    }

    #[tokio::test]
    async fn save_code_on_text_question_is_rejected() {
        let controller = fixed(2);
        controller.start(ada()).await.unwrap();
        let err = controller
            .save_code("fn main() {}", CodeLanguage::C)
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::NoCodeQuestion));
    }

    #[tokio::test]
    async fn failed_fetch_stalls_next_stage_and_retry_recovers() {
        let source = Arc::new(FlakySource {
            broken: InterviewStage::Reasoning,
            empty_instead_of_error: false,
            calls: AtomicUsize::new(0),
            healed: StdMutex::new(false),
        });
        let controller = SessionController::new(source.clone(), &config());
        controller.start(ada()).await.unwrap();

        let outcome = controller.advance(Some("intro answer")).await.unwrap();
        assert!(matches!(
            outcome,
            AdvanceOutcome::Stalled {
                stage: InterviewStage::Reasoning,
                ..
            }
        ));
        let snapshot = controller.snapshot().await;
        assert!(snapshot.stalled);
        assert!(snapshot.current_question.is_none());
        // The answer was committed together with the stage move.
        assert_eq!(snapshot.session.unwrap().responses.len(), 1);

        // Not auto-skipped: advancing a stalled stage is an error.
        let err = controller.advance(Some("anything")).await.unwrap_err();
        assert!(matches!(err, SessionError::StageStalled { .. }));

        // Retry while still broken fails without changing state.
        assert!(controller.retry_fetch().await.is_err());
        assert!(controller.snapshot().await.stalled);

        *source.healed.lock().unwrap() = true;
        let outcome = controller.retry_fetch().await.unwrap();
        assert!(matches!(
            outcome,
            AdvanceOutcome::Question {
                stage: InterviewStage::Reasoning,
                index: 0,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn empty_question_list_stalls_first_stage() {
        let source = Arc::new(FlakySource {
            broken: InterviewStage::Introductory,
            empty_instead_of_error: true,
            calls: AtomicUsize::new(0),
            healed: StdMutex::new(false),
        });
        let controller = SessionController::new(source.clone(), &config());

        let outcome = controller.start(ada()).await.unwrap();
        assert!(matches!(outcome, AdvanceOutcome::Stalled { .. }));
        assert_eq!(
            controller.state().await,
            SessionState::StageActive(InterviewStage::Introductory)
        );

        // Ending a stalled session is always possible.
        controller.end_now().await.unwrap();
        assert_eq!(controller.state().await, SessionState::Completed);
    }

    #[tokio::test]
    async fn retry_on_healthy_stage_is_rejected() {
        let controller = fixed(1);
        controller.start(ada()).await.unwrap();
        let err = controller.retry_fetch().await.unwrap_err();
        assert!(matches!(err, SessionError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn slow_fetch_times_out_into_stall() {
        let controller = SessionController::new(
            Arc::new(SlowSource {
                delay: Duration::from_secs(5),
            }),
            &config(),
        );
        controller.start(ada()).await.unwrap();

        let outcome = controller.advance(Some("answer")).await.unwrap();
        match outcome {
            AdvanceOutcome::Stalled { stage, reason } => {
                assert_eq!(stage, InterviewStage::Reasoning);
                assert!(reason.contains("timed out"));
            }
            other => panic!("expected stall, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn concurrent_advance_during_fetch_is_rejected() {
        let controller = Arc::new(SessionController::new(
            Arc::new(SlowSource {
                delay: Duration::from_millis(100),
            }),
            &config(),
        ));
        controller.start(ada()).await.unwrap();

        let first = {
            let controller = Arc::clone(&controller);
            tokio::spawn(async move { controller.advance(Some("answer")).await })
        };
        // Let the first advance reach the fetch.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(controller.snapshot().await.fetch_in_flight);

        let second = controller.advance(Some("again")).await;
        assert!(matches!(second, Err(SessionError::FetchInProgress)));

        let first = first.await.unwrap().unwrap();
        assert!(matches!(
            first,
            AdvanceOutcome::Question {
                stage: InterviewStage::Reasoning,
                ..
            }
        ));
        assert_eq!(controller.session().await.unwrap().responses.len(), 1);
    }

    #[tokio::test]
    async fn cancelled_advance_releases_fetch() {
        let controller = Arc::new(SessionController::new(
            Arc::new(SlowSource {
                delay: Duration::from_millis(100),
            }),
            &config(),
        ));
        controller.start(ada()).await.unwrap();

        let pending = {
            let controller = Arc::clone(&controller);
            tokio::spawn(async move { controller.advance(Some("answer")).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(controller.snapshot().await.fetch_in_flight);

        // Dropping the action mid-fetch, as a disconnected HTTP client does.
        pending.abort();
        assert!(pending.await.unwrap_err().is_cancelled());

        let snapshot = controller.snapshot().await;
        assert!(!snapshot.fetch_in_flight);
        let session = snapshot.session.unwrap();
        assert_eq!(session.current_stage, InterviewStage::Introductory);
        assert!(session.responses.is_empty());

        // Nothing is stalled, so retry is refused for that reason only.
        assert!(matches!(
            controller.retry_fetch().await,
            Err(SessionError::InvalidTransition { .. })
        ));

        let outcome = controller.advance(Some("answer")).await.unwrap();
        assert!(matches!(
            outcome,
            AdvanceOutcome::Question {
                stage: InterviewStage::Reasoning,
                ..
            }
        ));
        assert_eq!(controller.session().await.unwrap().responses.len(), 1);
    }

    #[tokio::test]
    async fn end_during_fetch_wins() {
        let controller = Arc::new(SessionController::new(
            Arc::new(SlowSource {
                delay: Duration::from_millis(100),
            }),
            &config(),
        ));
        controller.start(ada()).await.unwrap();

        let pending = {
            let controller = Arc::clone(&controller);
            tokio::spawn(async move { controller.advance(Some("answer")).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        let end_time = controller.end_now().await.unwrap();

        let outcome = pending.await.unwrap().unwrap();
        assert_eq!(outcome, AdvanceOutcome::Completed { end_time });
        let session = controller.session().await.unwrap();
        assert_eq!(session.current_stage, InterviewStage::Introductory);
        assert!(session.responses.is_empty());
    }

    #[tokio::test]
    async fn transport_hears_every_stage_and_chat() {
        let transport = Arc::new(RecordingTransport::default());
        let controller = fixed(1).with_transport(transport.clone(), Conversation::mock());

        controller.start(ada()).await.unwrap();
        while controller.state().await != SessionState::Completed {
            controller.advance(Some("answer")).await.unwrap();
        }
        assert_eq!(
            *transport.announced.lock().unwrap(),
            InterviewStage::ALL.to_vec()
        );

        assert!(controller.send_chat("  hello avatar ").await.unwrap());
        assert_eq!(*transport.sent.lock().unwrap(), vec!["hello avatar".to_string()]);
    }

    #[tokio::test]
    async fn chat_without_transport_is_not_forwarded() {
        let controller = fixed(1);
        assert!(!controller.send_chat("hi").await.unwrap());
        assert!(matches!(
            controller.send_chat("   ").await,
            Err(SessionError::Validation { .. })
        ));
    }

    #[tokio::test]
    async fn events_follow_stage_change() {
        let controller = fixed(1);
        let mut rx = controller.subscribe();
        controller.start(ada()).await.unwrap();

        assert!(matches!(
            rx.recv().await.unwrap(),
            SessionEvent::StageStarted {
                stage: InterviewStage::Introductory,
                ..
            }
        ));
        assert!(matches!(
            rx.recv().await.unwrap(),
            SessionEvent::QuestionPresented { index: 0, .. }
        ));

        controller.advance(Some("answer")).await.unwrap();
        assert!(matches!(
            rx.recv().await.unwrap(),
            SessionEvent::ResponseRecorded { .. }
        ));
        assert!(matches!(
            rx.recv().await.unwrap(),
            SessionEvent::StageStarted {
                stage: InterviewStage::Reasoning,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn responses_never_exceed_questions_asked() {
        let controller = SessionController::new(
            Arc::new(FixedSource {
                per_stage: 3,
                code_in: Some(InterviewStage::Technical),
            }),
            &config(),
        );
        controller.start(ada()).await.unwrap();
        let mut asked = 1;
        while controller.state().await != SessionState::Completed {
            let session = controller.session().await.unwrap();
            assert!(session.responses.len() < asked);
            controller.advance(Some("answer")).await.unwrap();
            asked += 1;
        }
        let session = controller.session().await.unwrap();
        // One technical code question skipped.
        assert_eq!(session.responses.len(), 14);
    }

    #[tokio::test]
    async fn feedback_only_after_completion() {
        let controller = fixed(1);
        controller.start(ada()).await.unwrap();
        assert!(controller.feedback().await.is_err());

        controller.end_now().await.unwrap();
        let report = controller.feedback().await.unwrap();
        assert_eq!(report.questions_answered, 0);
    }
}
