use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use assistant::{AssistantResponder, CannedResponder, RemoteModelConfig, RemoteModelResponder};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Html,
    routing::{get, post, put},
    Json, Router,
};
use shared::{
    domain::{AnswerBuffer, SessionId},
    error::{ApiError, ErrorCode},
    protocol::{
        ConversationResponse, CreateSessionResponse, StudyView, SubmitMessageRequest,
        UpdateAnswersRequest,
    },
};
use storage::{load_cases_or_samples, JsonFileRecorder, ResponseRecorder};
use study::SessionFactory;
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod api;
mod app_state;
mod config;

use app_state::AppState;
use config::{load_settings, AssistantMode, Settings};

const INDEX_HTML: &str = include_str!("../static/index.html");

/// Extra time the session allows beyond the HTTP client's own timeout before
/// it gives up on a reply.
const REPLY_GRACE: Duration = Duration::from_secs(5);

type HttpResult<T> = Result<T, (StatusCode, Json<ApiError>)>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let settings = load_settings()?;
    let state = build_state(&settings).await?;
    let _sweep = state
        .sessions
        .spawn_idle_sweep(settings.session_idle(), settings.session_sweep_interval());
    let app = build_router(Arc::new(state), settings.max_body_bytes);

    let addr: SocketAddr = settings
        .bind_addr
        .parse()
        .with_context(|| format!("invalid bind address '{}'", settings.bind_addr))?;
    info!(%addr, "study server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn build_state(settings: &Settings) -> anyhow::Result<AppState> {
    let cases_dir = settings.cases_dir.clone();
    let cases = tokio::task::spawn_blocking(move || load_cases_or_samples(&cases_dir))
        .await
        .context("case loading task failed")?;
    info!(
        cases_dir = %settings.cases_dir.display(),
        count = cases.len(),
        "cases loaded"
    );

    let responder = build_responder(settings)?;

    let recorder = JsonFileRecorder::new(settings.responses_dir.clone());
    if let Err(error) = recorder.ensure_dir().await {
        warn!(
            responses_dir = %settings.responses_dir.display(),
            error = %format!("{error:#}"),
            "responses directory is not writable; answers will not be saved"
        );
    }
    let recorder: Arc<dyn ResponseRecorder> = Arc::new(recorder);

    let factory = SessionFactory::new(settings.plan.clone(), cases, responder, recorder)
        .map_err(|plan_error| {
            error!(error = %plan_error, "study sequence does not match the loaded cases");
            plan_error
        })?
        .with_reply_timeout(settings.assistant.timeout() + REPLY_GRACE);
    info!(
        responder = factory.responder_name(),
        slots = factory.plan().len(),
        "study ready"
    );
    Ok(AppState::new(factory))
}

fn build_responder(settings: &Settings) -> anyhow::Result<Arc<dyn AssistantResponder>> {
    let assistant = &settings.assistant;
    match assistant.mode {
        AssistantMode::Canned => Ok(Arc::new(CannedResponder::new())),
        AssistantMode::Remote => {
            let responder = RemoteModelResponder::new(RemoteModelConfig {
                endpoint: assistant.endpoint.clone(),
                model: assistant.model.clone(),
                api_key: assistant.api_key.clone().unwrap_or_default(),
                system_prompt: assistant.system_prompt.clone(),
                timeout: assistant.timeout(),
            })
            .context("failed to build remote assistant client")?;
            Ok(Arc::new(responder))
        }
    }
}

fn build_router(state: Arc<AppState>, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/healthz", get(healthz))
        .route("/sessions", post(http_create_session))
        .route(
            "/sessions/:session_id",
            get(http_session_view).delete(http_end_session),
        )
        .route("/sessions/:session_id/start", post(http_start))
        .route("/sessions/:session_id/answers", put(http_update_answers))
        .route(
            "/sessions/:session_id/messages",
            post(http_submit_message).delete(http_clear_conversation),
        )
        .route("/sessions/:session_id/advance", post(http_advance))
        .route("/sessions/:session_id/restart", post(http_restart))
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .with_state(state)
}

fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Validation => StatusCode::BAD_REQUEST,
        ErrorCode::Conflict => StatusCode::CONFLICT,
        ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn reject(error: ApiError) -> (StatusCode, Json<ApiError>) {
    (status_for(error.code), Json(error))
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn http_create_session(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<CreateSessionResponse>) {
    let created = api::create_session(&state).await;
    (StatusCode::CREATED, Json(created))
}

async fn http_session_view(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<SessionId>,
) -> HttpResult<Json<StudyView>> {
    let view = api::session_view(&state, session_id)
        .await
        .map_err(reject)?;
    Ok(Json(view))
}

async fn http_end_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<SessionId>,
) -> HttpResult<StatusCode> {
    api::end_session(&state, session_id)
        .await
        .map_err(reject)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn http_start(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<SessionId>,
) -> HttpResult<Json<StudyView>> {
    let view = api::start_session(&state, session_id)
        .await
        .map_err(reject)?;
    Ok(Json(view))
}

async fn http_update_answers(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<SessionId>,
    Json(req): Json<UpdateAnswersRequest>,
) -> HttpResult<StatusCode> {
    api::update_answers(&state, session_id, req.case_ordinal, req.answers)
        .await
        .map_err(reject)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn http_submit_message(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<SessionId>,
    Json(req): Json<SubmitMessageRequest>,
) -> HttpResult<Json<ConversationResponse>> {
    let conversation = api::submit_message(&state, session_id, req.text)
        .await
        .map_err(reject)?;
    Ok(Json(conversation))
}

async fn http_clear_conversation(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<SessionId>,
) -> HttpResult<Json<ConversationResponse>> {
    let conversation = api::clear_conversation(&state, session_id)
        .await
        .map_err(reject)?;
    Ok(Json(conversation))
}

async fn http_advance(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<SessionId>,
    Json(answers): Json<AnswerBuffer>,
) -> HttpResult<Json<StudyView>> {
    let view = api::advance(&state, session_id, answers)
        .await
        .map_err(reject)?;
    Ok(Json(view))
}

async fn http_restart(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<SessionId>,
) -> HttpResult<Json<StudyView>> {
    let view = api::restart(&state, session_id)
        .await
        .map_err(reject)?;
    Ok(Json(view))
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
