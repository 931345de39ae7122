//! WebSocket server + REST endpoints for the interview session.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{
        Path, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;
use tower_http::cors::CorsLayer;
use tracing::{debug, info, warn};

use super::controller::{SessionController, SessionEvent, SessionSnapshot};
use super::model::{CodeLanguage, UserProfile};
use crate::avatar::{AppMessage, AppMessageRelay, AvatarEvent, AvatarExpression};
use crate::error::SessionError;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<SessionController>,
    /// Outbound avatar app messages, forwarded to every browser client.
    pub relay: Arc<AppMessageRelay>,
}

/// Frames pushed to WebSocket clients.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsMessage {
    /// Full session view (sent on connect and after lag).
    SessionSync { snapshot: Box<SessionSnapshot> },
    SessionEvent { event: SessionEvent },
    /// Payload for the browser to hand to the video call.
    AppMessage { message: AppMessage },
    /// Avatar overlay for this client.
    Expression { expression: AvatarExpression },
}

/// Frames accepted from WebSocket clients.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientMessage {
    /// A call event observed by the browser.
    AvatarEvent { event: AvatarEvent },
    Chat { text: String },
}

/// Build the Axum router with session WebSocket and REST routes.
pub fn interview_routes(controller: Arc<SessionController>, relay: Arc<AppMessageRelay>) -> Router {
    let state = AppState { controller, relay };

    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health))
        .route("/api/profile", post(submit_profile))
        .route("/api/session", get(get_session))
        .route("/api/session/advance", post(advance))
        .route("/api/session/code", post(save_code))
        .route("/api/session/retry", post(retry_fetch))
        .route("/api/session/end", post(end_session))
        .route("/api/code/templates/{language}", get(code_template))
        .route("/api/chat", post(send_chat))
        .route("/api/feedback", get(get_feedback))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn status_for(err: &SessionError) -> StatusCode {
    match err {
        SessionError::Validation { .. }
        | SessionError::InvalidProfile { .. }
        | SessionError::NoCodeQuestion => StatusCode::BAD_REQUEST,
        SessionError::InvalidTransition { .. }
        | SessionError::FetchInProgress
        | SessionError::StageStalled { .. } => StatusCode::CONFLICT,
        SessionError::QuestionFetch { .. } | SessionError::FetchTimeout { .. } => {
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

fn error_response(err: SessionError) -> Response {
    let status = status_for(&err);
    if status.is_server_error() {
        warn!(error = %err, "Request failed");
    } else {
        debug!(error = %err, "Request rejected");
    }
    (status, Json(serde_json::json!({"error": err.to_string()}))).into_response()
}

fn json_result<T: Serialize>(result: Result<T, SessionError>) -> Response {
    match result {
        Ok(body) => (StatusCode::OK, Json(body)).into_response(),
        Err(e) => error_response(e),
    }
}

// ── Health ──────────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "interview-coach"
    }))
}

// ── WebSocket ───────────────────────────────────────────────────────────

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    info!("WebSocket client connecting");
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn send_frame(socket: &mut WebSocket, msg: &WsMessage) -> bool {
    match serde_json::to_string(msg) {
        Ok(json) => socket.send(Message::Text(json.into())).await.is_ok(),
        Err(e) => {
            warn!(error = %e, "Failed to serialize WS frame");
            true
        }
    }
}

async fn sync_frame(controller: &SessionController) -> WsMessage {
    WsMessage::SessionSync {
        snapshot: Box::new(controller.snapshot().await),
    }
}

async fn handle_socket(mut socket: WebSocket, state: AppState) {
    info!("WebSocket client connected");

    // Subscribe before the sync so nothing falls between the two.
    let mut events = state.controller.subscribe();
    let mut app_messages = state.relay.subscribe();
    let mut expression = AvatarExpression::default();

    if !send_frame(&mut socket, &sync_frame(&state.controller).await).await {
        warn!("Failed to send initial sync, client disconnected");
        return;
    }

    loop {
        tokio::select! {
            result = events.recv() => {
                match result {
                    Ok(event) => {
                        let announced = matches!(event, SessionEvent::StageStarted { .. });
                        if !send_frame(&mut socket, &WsMessage::SessionEvent { event }).await {
                            debug!("Client disconnected during send");
                            break;
                        }
                        if announced {
                            expression = expression.reduce(&AvatarEvent::StageAnnounced);
                            if !send_frame(&mut socket, &WsMessage::Expression { expression }).await {
                                break;
                            }
                        }
                    }
                    Err(RecvError::Lagged(n)) => {
                        warn!(missed = n, "WS client lagged behind session events");
                        if !send_frame(&mut socket, &sync_frame(&state.controller).await).await {
                            break;
                        }
                    }
                    Err(RecvError::Closed) => {
                        debug!("Session event channel closed");
                        break;
                    }
                }
            }

            result = app_messages.recv() => {
                match result {
                    Ok(message) => {
                        if !send_frame(&mut socket, &WsMessage::AppMessage { message }).await {
                            debug!("Client disconnected during send");
                            break;
                        }
                    }
                    Err(RecvError::Lagged(n)) => {
                        warn!(missed = n, "WS client lagged behind app messages");
                    }
                    Err(RecvError::Closed) => {
                        debug!("App message channel closed");
                        break;
                    }
                }
            }

            result = socket.recv() => {
                match result {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(next) = handle_client_message(&text, &state.controller, expression).await {
                            expression = next;
                            if !send_frame(&mut socket, &WsMessage::Expression { expression }).await {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!("WebSocket client disconnected");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "WebSocket error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    info!("WebSocket connection closed");
}

/// Apply a client frame. Returns the new expression when it changed.
async fn handle_client_message(
    text: &str,
    controller: &SessionController,
    expression: AvatarExpression,
) -> Option<AvatarExpression> {
    match serde_json::from_str::<ClientMessage>(text) {
        Ok(ClientMessage::AvatarEvent { event }) => {
            let next = expression.reduce(&event);
            (next != expression).then_some(next)
        }
        Ok(ClientMessage::Chat { text }) => {
            if let Err(e) = controller.send_chat(&text).await {
                debug!(error = %e, "Chat message via WS rejected");
            }
            None
        }
        Err(e) => {
            debug!(error = %e, text = text, "Unrecognized WS message from client");
            None
        }
    }
}

// ── REST Endpoints ──────────────────────────────────────────────────────

async fn submit_profile(
    State(state): State<AppState>,
    Json(profile): Json<UserProfile>,
) -> Response {
    json_result(state.controller.start(profile).await)
}

async fn get_session(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.controller.snapshot().await)
}

#[derive(Deserialize)]
struct AdvanceRequest {
    #[serde(default)]
    response: Option<String>,
}

async fn advance(State(state): State<AppState>, Json(body): Json<AdvanceRequest>) -> Response {
    json_result(state.controller.advance(body.response.as_deref()).await)
}

#[derive(Deserialize)]
struct CodeRequest {
    code: String,
    #[serde(default)]
    language: Option<String>,
}

async fn save_code(State(state): State<AppState>, Json(body): Json<CodeRequest>) -> Response {
    let language = match body.language.as_deref().map(str::parse::<CodeLanguage>) {
        None => CodeLanguage::default(),
        Some(Ok(language)) => language,
        Some(Err(reason)) => return error_response(SessionError::Validation { reason }),
    };
    json_result(
        state
            .controller
            .save_code(&body.code, language)
            .await
            .map(|()| serde_json::json!({"status": "saved", "language": language})),
    )
}

async fn code_template(Path(language): Path<String>) -> Response {
    match language.parse::<CodeLanguage>() {
        Ok(language) => Json(serde_json::json!({
            "language": language,
            "template": language.starter_template(),
        }))
        .into_response(),
        Err(reason) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"error": reason})),
        )
            .into_response(),
    }
}

async fn retry_fetch(State(state): State<AppState>) -> Response {
    json_result(state.controller.retry_fetch().await)
}

async fn end_session(State(state): State<AppState>) -> Response {
    json_result(
        state
            .controller
            .end_now()
            .await
            .map(|end_time| serde_json::json!({"status": "completed", "end_time": end_time})),
    )
}

#[derive(Deserialize)]
struct ChatRequest {
    text: String,
}

async fn send_chat(State(state): State<AppState>, Json(body): Json<ChatRequest>) -> Response {
    json_result(
        state
            .controller
            .send_chat(&body.text)
            .await
            .map(|forwarded| serde_json::json!({"forwarded": forwarded})),
    )
}

async fn get_feedback(State(state): State<AppState>) -> Response {
    json_result(state.controller.feedback().await)
}
