use serde::{Deserialize, Serialize};

use crate::domain::{AnswerBuffer, Condition, SessionId, Turn};

/// One saved set of answers for a single case of a single pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseRecord {
    pub case_ordinal: usize,
    pub condition: Condition,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<String>,
    pub case_file: String,
    pub session_id: SessionId,
    /// Unix seconds, fractional.
    pub timestamp: f64,
    pub answers: AnswerBuffer,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseView {
    pub ordinal: usize,
    pub total: usize,
    pub condition: Condition,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<String>,
    pub condition_label: String,
    pub case_file: String,
    pub case_text: String,
    pub ai_visible: bool,
    pub answers: AnswerBuffer,
    pub conversation: Vec<Turn>,
    pub progress: String,
}

/// Everything the presentation layer needs to render the current stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum StudyView {
    Welcome { total_cases: usize },
    Case(CaseView),
    Complete { recorded_cases: usize },
}

impl StudyView {
    pub fn as_case(&self) -> Option<&CaseView> {
        match self {
            StudyView::Case(view) => Some(view),
            _ => None,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, StudyView::Complete { .. })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSessionResponse {
    pub session_id: SessionId,
    pub view: StudyView,
}

/// Draft answers for the case with `case_ordinal`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateAnswersRequest {
    pub case_ordinal: usize,
    #[serde(default)]
    pub answers: AnswerBuffer,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitMessageRequest {
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationResponse {
    pub conversation: Vec<Turn>,
}
