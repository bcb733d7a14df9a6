use shared::{
    domain::{AnswerBuffer, SessionId, Turn},
    error::{ApiError, ErrorCode},
    protocol::{ConversationResponse, CreateSessionResponse, StudyView},
};
use study::StudyError;
use tracing::{error, info};

use crate::app_state::{AppState, SharedSession};

pub async fn create_session(state: &AppState) -> CreateSessionResponse {
    let session = state.factory.create();
    let session_id = session.id();
    let view = session.view();
    state.sessions.insert(session).await;
    let active = state.sessions.len().await;
    info!(session = %session_id, active, "session created");
    CreateSessionResponse { session_id, view }
}

pub async fn end_session(state: &AppState, id: SessionId) -> Result<(), ApiError> {
    if state.sessions.remove(id).await {
        info!(session = %id, "session closed");
        Ok(())
    } else {
        Err(unknown_session(id))
    }
}

pub async fn session_view(state: &AppState, id: SessionId) -> Result<StudyView, ApiError> {
    let session = find_session(state, id).await?;
    let view = session.lock().await.view();
    Ok(view)
}

pub async fn start_session(state: &AppState, id: SessionId) -> Result<StudyView, ApiError> {
    let session = find_session(state, id).await?;
    let mut session = session.lock().await;
    session.start().map_err(study_error)
}

pub async fn update_answers(
    state: &AppState,
    id: SessionId,
    case_ordinal: usize,
    answers: AnswerBuffer,
) -> Result<(), ApiError> {
    let session = find_session(state, id).await?;
    let mut session = session.lock().await;
    session
        .update_answers(case_ordinal, answers)
        .map_err(study_error)
}

/// Runs on its own task so a client that disconnects mid-reply does not leave
/// the conversation half updated.
pub async fn submit_message(
    state: &AppState,
    id: SessionId,
    text: String,
) -> Result<ConversationResponse, ApiError> {
    let session = find_session(state, id).await?;
    let conversation = tokio::spawn(async move {
        let mut guard = session.lock().await;
        guard
            .submit_message(&text)
            .await
            .map(|turns| turns.to_vec())
    })
    .await
    .map_err(|join_error| internal(id, join_error))?
    .map_err(study_error)?;
    Ok(ConversationResponse { conversation })
}

pub async fn clear_conversation(
    state: &AppState,
    id: SessionId,
) -> Result<ConversationResponse, ApiError> {
    let session = find_session(state, id).await?;
    let mut session = session.lock().await;
    session.clear_conversation().map_err(study_error)?;
    Ok(ConversationResponse {
        conversation: Vec::<Turn>::new(),
    })
}

/// Records the snapshot and moves on. Like `submit_message`, this is detached
/// from the request so a record is never written without the position moving.
pub async fn advance(
    state: &AppState,
    id: SessionId,
    answers: AnswerBuffer,
) -> Result<StudyView, ApiError> {
    let session = find_session(state, id).await?;
    tokio::spawn(async move {
        let mut guard = session.lock().await;
        guard.advance(answers).await
    })
    .await
    .map_err(|join_error| internal(id, join_error))?
    .map_err(study_error)
}

pub async fn restart(state: &AppState, id: SessionId) -> Result<StudyView, ApiError> {
    let session = find_session(state, id).await?;
    let mut session = session.lock().await;
    session.restart().map_err(study_error)
}

async fn find_session(state: &AppState, id: SessionId) -> Result<SharedSession, ApiError> {
    state
        .sessions
        .get(id)
        .await
        .ok_or_else(|| unknown_session(id))
}

fn unknown_session(id: SessionId) -> ApiError {
    ApiError::new(ErrorCode::NotFound, format!("session {id} not found"))
}

fn study_error(error: StudyError) -> ApiError {
    let code = match error {
        StudyError::AssistantUnavailable => ErrorCode::Validation,
        StudyError::NotStarted
        | StudyError::AlreadyComplete
        | StudyError::InvalidTransition { .. } => ErrorCode::Conflict,
    };
    ApiError::new(code, error.to_string())
}

fn internal(id: SessionId, error: impl std::fmt::Display) -> ApiError {
    error!(session = %id, %error, "session task failed");
    ApiError::new(ErrorCode::Internal, "internal error")
}

#[cfg(test)]
#[path = "tests/mod_tests.rs"]
mod tests;
