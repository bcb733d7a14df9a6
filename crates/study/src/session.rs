use std::{fmt, sync::Arc, time::Duration};

use assistant::{AssistantResponder, APOLOGY_REPLY};
use chrono::Utc;
use shared::{
    domain::{AnswerBuffer, Case, SessionId, Turn},
    protocol::{CaseView, ResponseRecord, StudyView},
};
use storage::ResponseRecorder;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::plan::{PlanError, SequenceSlot, StudyPlan};

pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(45);
pub const DEFAULT_RECORD_TIMEOUT: Duration = Duration::from_secs(10);

/// Where a participant is in the study. `Complete` is terminal until restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StudyState {
    Welcome,
    InCase(usize),
    Complete,
}

impl fmt::Display for StudyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StudyState::Welcome => f.write_str("on the welcome page"),
            StudyState::InCase(index) => write!(f, "on case {}", index + 1),
            StudyState::Complete => f.write_str("complete"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StudyError {
    #[error("the study has not been started")]
    NotStarted,
    #[error("the study is already complete")]
    AlreadyComplete,
    #[error("cannot {operation} while {state}")]
    InvalidTransition {
        operation: &'static str,
        state: StudyState,
    },
    #[error("the assistant is not available for the current case")]
    AssistantUnavailable,
}

/// Shared, validated ingredients for building per-participant sessions.
#[derive(Clone)]
pub struct SessionFactory {
    plan: Arc<StudyPlan>,
    cases: Arc<Vec<Case>>,
    responder: Arc<dyn AssistantResponder>,
    recorder: Arc<dyn ResponseRecorder>,
    reply_timeout: Duration,
    record_timeout: Duration,
}

impl SessionFactory {
    /// Fails if the plan references a case that was not loaded.
    pub fn new(
        plan: StudyPlan,
        cases: Vec<Case>,
        responder: Arc<dyn AssistantResponder>,
        recorder: Arc<dyn ResponseRecorder>,
    ) -> Result<Self, PlanError> {
        plan.validate(&cases)?;
        Ok(Self {
            plan: Arc::new(plan),
            cases: Arc::new(cases),
            responder,
            recorder,
            reply_timeout: DEFAULT_REPLY_TIMEOUT,
            record_timeout: DEFAULT_RECORD_TIMEOUT,
        })
    }

    pub fn with_reply_timeout(mut self, reply_timeout: Duration) -> Self {
        self.reply_timeout = reply_timeout;
        self
    }

    /// Upper bound on a single recorder call; expiry counts as a failed save.
    pub fn with_record_timeout(mut self, record_timeout: Duration) -> Self {
        self.record_timeout = record_timeout;
        self
    }

    pub fn plan(&self) -> &StudyPlan {
        &self.plan
    }

    pub fn cases(&self) -> &[Case] {
        &self.cases
    }

    pub fn responder_name(&self) -> &'static str {
        self.responder.name()
    }

    pub fn create(&self) -> StudySession {
        StudySession {
            id: SessionId::new(),
            plan: Arc::clone(&self.plan),
            cases: Arc::clone(&self.cases),
            responder: Arc::clone(&self.responder),
            recorder: Arc::clone(&self.recorder),
            reply_timeout: self.reply_timeout,
            record_timeout: self.record_timeout,
            state: StudyState::Welcome,
            answers: AnswerBuffer::default(),
            conversation: Vec::new(),
            recorded: Vec::new(),
        }
    }
}

/// One participant's pass through the study plan.
///
/// The session owns the position, the answers for the case on screen, and the
/// conversation with the assistant. Answers are recorded exactly once per case
/// per pass, always before the position moves on; the conversation is dropped
/// at every case transition and never recorded.
pub struct StudySession {
    id: SessionId,
    plan: Arc<StudyPlan>,
    cases: Arc<Vec<Case>>,
    responder: Arc<dyn AssistantResponder>,
    recorder: Arc<dyn ResponseRecorder>,
    reply_timeout: Duration,
    record_timeout: Duration,
    state: StudyState,
    answers: AnswerBuffer,
    conversation: Vec<Turn>,
    recorded: Vec<usize>,
}

impl StudySession {
    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn state(&self) -> StudyState {
        self.state
    }

    pub fn answers(&self) -> &AnswerBuffer {
        &self.answers
    }

    pub fn conversation(&self) -> &[Turn] {
        &self.conversation
    }

    /// Ordinals recorded during the current pass, in order.
    pub fn recorded(&self) -> &[usize] {
        &self.recorded
    }

    pub fn start(&mut self) -> Result<StudyView, StudyError> {
        if self.state != StudyState::Welcome {
            return Err(StudyError::InvalidTransition {
                operation: "start",
                state: self.state,
            });
        }
        self.enter_case(0);
        info!(session = %self.id, "study started");
        Ok(self.load_case(0))
    }

    /// Payload for slot `index` with fresh answers and an empty conversation.
    pub fn load_case(&self, index: usize) -> StudyView {
        let Some(slot) = self.plan.slot(index) else {
            return self.completion_view();
        };
        StudyView::Case(self.case_view(index, slot, AnswerBuffer::default(), Vec::new()))
    }

    pub fn view(&self) -> StudyView {
        match self.state {
            StudyState::Welcome => StudyView::Welcome {
                total_cases: self.plan.len(),
            },
            StudyState::InCase(index) => match self.plan.slot(index) {
                Some(slot) => StudyView::Case(self.case_view(
                    index,
                    slot,
                    self.answers.clone(),
                    self.conversation.clone(),
                )),
                None => self.completion_view(),
            },
            StudyState::Complete => self.completion_view(),
        }
    }

    /// Stores a draft for case `ordinal`. A draft aimed at any other case is
    /// rejected so a late save cannot land on the case that replaced it.
    pub fn update_answers(
        &mut self,
        ordinal: usize,
        answers: AnswerBuffer,
    ) -> Result<(), StudyError> {
        let index = self.current_index()?;
        if ordinal != index + 1 {
            return Err(StudyError::InvalidTransition {
                operation: "update answers for another case",
                state: self.state,
            });
        }
        self.answers = answers;
        Ok(())
    }

    /// Sends `text` to the assistant and appends both turns. Blank input is ignored.
    pub async fn submit_message(&mut self, text: &str) -> Result<&[Turn], StudyError> {
        self.require_assistant()?;
        if text.trim().is_empty() {
            return Ok(&self.conversation);
        }

        let reply = match tokio::time::timeout(
            self.reply_timeout,
            self.responder.respond(text, &self.conversation),
        )
        .await
        {
            Ok(reply) => reply,
            Err(_) => {
                error!(
                    session = %self.id,
                    responder = self.responder.name(),
                    timeout_ms = self.reply_timeout.as_millis() as u64,
                    "assistant reply timed out"
                );
                APOLOGY_REPLY.to_string()
            }
        };

        self.conversation.push(Turn::user(text));
        self.conversation.push(Turn::assistant(reply));
        Ok(&self.conversation)
    }

    pub fn clear_conversation(&mut self) -> Result<(), StudyError> {
        self.require_assistant()?;
        self.conversation.clear();
        Ok(())
    }

    /// Records `snapshot` for the current case, then moves to the next case or
    /// to completion. A recording failure is logged and does not stop the move.
    pub async fn advance(&mut self, snapshot: AnswerBuffer) -> Result<StudyView, StudyError> {
        let index = self.current_index()?;
        let ordinal = index + 1;
        let Some(slot) = self.plan.slot(index) else {
            self.state = StudyState::Complete;
            return Ok(self.completion_view());
        };

        let record = ResponseRecord {
            case_ordinal: ordinal,
            condition: slot.condition,
            difficulty: slot.difficulty.clone(),
            case_file: self.case_for(index, slot).source_file.clone(),
            session_id: self.id,
            timestamp: unix_timestamp(),
            answers: snapshot,
        };
        match tokio::time::timeout(self.record_timeout, self.recorder.record(&record)).await {
            Ok(Ok(())) => {}
            Ok(Err(error)) => warn!(
                session = %self.id,
                case_ordinal = ordinal,
                error = %format!("{error:#}"),
                "failed to save responses; continuing"
            ),
            Err(_) => warn!(
                session = %self.id,
                case_ordinal = ordinal,
                timeout_ms = self.record_timeout.as_millis() as u64,
                "saving responses timed out; continuing"
            ),
        }
        self.recorded.push(ordinal);

        let next = index + 1;
        if next >= self.plan.len() {
            self.state = StudyState::Complete;
            self.answers = AnswerBuffer::default();
            self.conversation.clear();
            info!(session = %self.id, recorded = self.recorded.len(), "study complete");
            return Ok(self.completion_view());
        }

        self.enter_case(next);
        info!(session = %self.id, case_ordinal = next + 1, "advanced to next case");
        Ok(self.load_case(next))
    }

    pub fn restart(&mut self) -> Result<StudyView, StudyError> {
        if self.state != StudyState::Complete {
            return Err(StudyError::InvalidTransition {
                operation: "restart",
                state: self.state,
            });
        }
        self.state = StudyState::Welcome;
        self.answers = AnswerBuffer::default();
        self.conversation.clear();
        self.recorded.clear();
        info!(session = %self.id, "study restarted");
        Ok(self.view())
    }

    fn enter_case(&mut self, index: usize) {
        self.state = StudyState::InCase(index);
        self.answers = AnswerBuffer::default();
        self.conversation.clear();
    }

    fn current_index(&self) -> Result<usize, StudyError> {
        match self.state {
            StudyState::InCase(index) => Ok(index),
            StudyState::Welcome => Err(StudyError::NotStarted),
            StudyState::Complete => Err(StudyError::AlreadyComplete),
        }
    }

    fn require_assistant(&self) -> Result<(), StudyError> {
        match self.state {
            StudyState::InCase(index)
                if self
                    .plan
                    .slot(index)
                    .is_some_and(|slot| slot.condition.shows_assistant()) =>
            {
                Ok(())
            }
            _ => Err(StudyError::AssistantUnavailable),
        }
    }

    // The plan was validated against these cases when the factory was built.
    fn case_for(&self, index: usize, slot: &SequenceSlot) -> &Case {
        &self.cases[slot.resolved_case_index(index)]
    }

    fn case_view(
        &self,
        index: usize,
        slot: &SequenceSlot,
        answers: AnswerBuffer,
        conversation: Vec<Turn>,
    ) -> CaseView {
        let case = self.case_for(index, slot);
        let ordinal = index + 1;
        let total = self.plan.len();
        let heading = match slot.difficulty.as_deref() {
            Some(difficulty) => format!("{} ({difficulty})", slot.condition),
            None => slot.condition.to_string(),
        };
        CaseView {
            ordinal,
            total,
            condition: slot.condition,
            difficulty: slot.difficulty.clone(),
            condition_label: format!("Case {ordinal}/{total} - {heading}"),
            case_file: case.source_file.clone(),
            case_text: case.text.clone(),
            ai_visible: slot.condition.shows_assistant(),
            answers,
            conversation,
            progress: format!("Progress: Case {ordinal} of {total}"),
        }
    }

    fn completion_view(&self) -> StudyView {
        StudyView::Complete {
            recorded_cases: self.recorded.len(),
        }
    }
}

fn unix_timestamp() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
