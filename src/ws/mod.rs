pub mod admin;
pub mod handlers;
pub mod marshal;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::IntoResponse,
};
use futures::{sink::SinkExt, stream::StreamExt};
use serde::Deserialize;
use std::sync::Arc;

use crate::protocol::{ClientMessage, ServerMessage};
use crate::state::{AppState, RevealSequencer};
use crate::sync::{react, FeedItem, LiveFeed};
use crate::types::{Role, Username};

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub role: Option<String>,
    pub token: Option<String>,
}

/// Per-connection state
#[derive(Debug)]
pub struct Session {
    pub id: String,
    pub role: Role,
    /// Set for marshal sessions
    pub username: Option<Username>,
    /// Marshal login token, re-checked on every resync
    pub token: Option<String>,
    /// Admin only; a reconnect gets a fresh one
    pub reveal: RevealSequencer,
}

impl Session {
    pub fn new(role: Role, username: Option<Username>) -> Self {
        Self {
            id: ulid::Ulid::new().to_string(),
            role,
            username,
            token: None,
            reveal: RevealSequencer::new(),
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// A marshal session whose token is gone (reset, deletion, logout)
    /// must not keep running.
    pub async fn is_revoked(&self, state: &AppState) -> bool {
        match (self.role, self.token.as_deref()) {
            (Role::Marshal, Some(token)) => state.resolve_session(token).await.is_none(),
            (Role::Marshal, None) => true,
            _ => false,
        }
    }
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsQuery>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    tracing::info!("WebSocket connection request: role={:?}", params.role);
    ws.on_upgrade(move |socket| handle_socket(socket, params, state))
}

/// Role-specific full snapshot for (re)sync
pub async fn snapshot(session: &Session, state: &AppState) -> ServerMessage {
    let result = match (session.role, session.username.as_deref()) {
        (Role::Admin, _) => state
            .dashboard()
            .await
            .map(|dashboard| ServerMessage::Dashboard { dashboard }),
        (Role::Marshal, Some(username)) => state
            .team_summary(username)
            .await
            .map(|team| ServerMessage::TeamState { team }),
        _ => state
            .standings()
            .await
            .map(|standings| ServerMessage::Standings { standings }),
    };
    result.unwrap_or_else(ServerMessage::from)
}

async fn send(
    sender: &mut futures::stream::SplitSink<WebSocket, Message>,
    msg: &ServerMessage,
) -> bool {
    match serde_json::to_string(msg) {
        Ok(json) => sender.send(Message::Text(json.into())).await.is_ok(),
        Err(e) => {
            tracing::error!("Failed to encode server message: {}", e);
            true
        }
    }
}

/// Handle individual WebSocket connection
async fn handle_socket(socket: WebSocket, params: WsQuery, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    let role = match params.role.as_deref() {
        Some("admin") => Role::Admin,
        Some("marshal") => Role::Marshal,
        _ => Role::Audience,
    };

    let username = match role {
        Role::Marshal => {
            let token = params.token.as_deref().unwrap_or_default();
            match state.resolve_session(token).await {
                Some(u) => Some(u),
                None => {
                    tracing::warn!("Marshal WebSocket with unknown session token");
                    let error = ServerMessage::Error {
                        code: "UNAUTHORIZED".to_string(),
                        msg: "Log in again".to_string(),
                    };
                    send(&mut sender, &error).await;
                    let _ = sender.send(Message::Close(None)).await;
                    return;
                }
            }
        }
        _ => None,
    };

    let mut session = Session::new(role, username);
    if let Some(token) = params.token.as_deref().filter(|_| role == Role::Marshal) {
        session = session.with_token(token);
    }
    let mut feed = LiveFeed::connect(state.bus.clone(), state.poll_interval);
    tracing::info!(
        "WebSocket connected: session={} role={:?} user={:?} sync={:?}",
        session.id,
        session.role,
        session.username,
        feed.mode()
    );

    let welcome = ServerMessage::Welcome {
        protocol: "1.0".to_string(),
        role,
        session_id: session.id.clone(),
        sync: feed.mode(),
        server_now: chrono::Utc::now().to_rfc3339(),
    };
    if !send(&mut sender, &welcome).await || !send(&mut sender, &snapshot(&session, &state).await).await
    {
        tracing::error!("Failed to send welcome message");
        return;
    }

    loop {
        tokio::select! {
            item = feed.next() => {
                match item {
                    FeedItem::Event(event) => {
                        let reaction = react(session.role, session.username.as_deref(), &event);
                        if reaction.forward
                            && !send(&mut sender, &ServerMessage::Event { event }).await
                        {
                            break;
                        }
                        if reaction.logout {
                            if let Some(username) = &session.username {
                                tracing::info!("Ending session for {}", username);
                            }
                            let logout = ServerMessage::Logout {
                                reason: "Session ended by an administrator".to_string(),
                            };
                            send(&mut sender, &logout).await;
                            break;
                        }
                        if reaction.refetch
                            && !send(&mut sender, &snapshot(&session, &state).await).await
                        {
                            break;
                        }
                    }
                    FeedItem::Resync => {
                        // A missed gamesReset or marshalDeleted still ends the session
                        if session.is_revoked(&state).await {
                            tracing::info!("Session {} has no live token, logging out", session.id);
                            let logout = ServerMessage::Logout {
                                reason: "Session ended by an administrator".to_string(),
                            };
                            send(&mut sender, &logout).await;
                            break;
                        }
                        if !send(&mut sender, &snapshot(&session, &state).await).await {
                            break;
                        }
                    }
                }
            }

            // Handle client messages
            ws_msg = receiver.next() => {
                match ws_msg {
                    Some(Ok(Message::Text(text))) => {
                        tracing::debug!("Received message: {}", text);

                        let response = match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(client_msg) => {
                                handlers::handle_message(client_msg, &mut session, &state).await
                            }
                            Err(e) => {
                                tracing::warn!("Failed to parse client message: {}", e);
                                Some(ServerMessage::Error {
                                    code: "PARSE_ERROR".to_string(),
                                    msg: format!("Invalid message format: {}", e),
                                })
                            }
                        };
                        if let Some(response) = response {
                            if !send(&mut sender, &response).await {
                                tracing::error!("Failed to send response");
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        tracing::info!("WebSocket closed");
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::error!("WebSocket error: {}", e);
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    tracing::info!(
        "WebSocket connection closed: session={} role={:?}",
        session.id,
        session.role
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::RegisterRequest;

    async fn marshal_login(state: &AppState) -> String {
        state.create_game_code(Some("RALLY2026")).await.unwrap();
        state
            .register_marshal(RegisterRequest {
                username: "mo".to_string(),
                password: "hunter2".to_string(),
                marshal_name: "Mo".to_string(),
                game_code: "RALLY2026".to_string(),
            })
            .await
            .unwrap();
        state
            .login("mo", "hunter2", "RALLY2026")
            .await
            .unwrap()
            .token
    }

    #[tokio::test]
    async fn test_marshal_session_revoked_after_reset() {
        let state = AppState::in_memory();
        let token = marshal_login(&state).await;
        let session = Session::new(Role::Marshal, Some("mo".to_string())).with_token(token);
        assert!(!session.is_revoked(&state).await);

        // Nothing here listens for gamesReset
        state.reset_all_games().await.unwrap();
        assert!(session.is_revoked(&state).await);
    }

    #[tokio::test]
    async fn test_marshal_session_revoked_after_deletion() {
        let state = AppState::in_memory();
        let token = marshal_login(&state).await;
        let session = Session::new(Role::Marshal, Some("mo".to_string())).with_token(token);

        state.delete_marshal("mo").await.unwrap();
        assert!(session.is_revoked(&state).await);
    }

    #[tokio::test]
    async fn test_other_roles_are_never_revoked() {
        let state = AppState::in_memory();
        assert!(!Session::new(Role::Admin, None).is_revoked(&state).await);
        assert!(!Session::new(Role::Audience, None).is_revoked(&state).await);
        assert!(Session::new(Role::Marshal, Some("mo".into())).is_revoked(&state).await);
    }
}
