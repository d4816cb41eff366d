//! Admin-only command handlers
//!
//! Authorization is checked in the main dispatch layer before calling these.

use crate::protocol::ServerMessage;
use crate::state::AppState;
use crate::types::GameIndex;

use super::Session;

/// Fresh dashboard after a successful admin mutation
async fn dashboard_or_error(state: &AppState) -> Option<ServerMessage> {
    Some(match state.dashboard().await {
        Ok(dashboard) => ServerMessage::Dashboard { dashboard },
        Err(e) => e.into(),
    })
}

pub async fn handle_allow_edit(
    state: &AppState,
    team_id: &str,
    game_index: GameIndex,
) -> Option<ServerMessage> {
    tracing::info!("Admin allowing edit of {} game {}", team_id, game_index);
    match state.allow_edit(team_id, game_index).await {
        Ok(_) => dashboard_or_error(state).await,
        Err(e) => Some(e.into()),
    }
}

pub async fn handle_accept_edit(
    state: &AppState,
    team_id: &str,
    game_index: GameIndex,
) -> Option<ServerMessage> {
    tracing::info!("Admin accepting edit of {} game {}", team_id, game_index);
    match state.accept_edit(team_id, game_index).await {
        Ok(_) => dashboard_or_error(state).await,
        Err(e) => Some(e.into()),
    }
}

pub async fn handle_reset_games(state: &AppState) -> Option<ServerMessage> {
    match state.reset_all_games().await {
        Ok(count) => {
            tracing::info!("Admin reset games for {} teams", count);
            dashboard_or_error(state).await
        }
        Err(e) => Some(e.into()),
    }
}

pub async fn handle_delete_marshal(state: &AppState, username: &str) -> Option<ServerMessage> {
    match state.delete_marshal(username).await {
        Ok(()) => dashboard_or_error(state).await,
        Err(e) => Some(e.into()),
    }
}

pub async fn handle_set_results_revealed(state: &AppState, revealed: bool) -> Option<ServerMessage> {
    match state.save_settings(revealed).await {
        Ok(_) => dashboard_or_error(state).await,
        Err(e) => Some(e.into()),
    }
}

pub async fn handle_reset_settings(state: &AppState) -> Option<ServerMessage> {
    match state.reset_settings().await {
        Ok(_) => dashboard_or_error(state).await,
        Err(e) => Some(e.into()),
    }
}

pub async fn handle_show_results(state: &AppState, session: &mut Session) -> Option<ServerMessage> {
    match state.start_reveal(&mut session.reveal).await {
        Ok(reveal) => Some(ServerMessage::Reveal { reveal }),
        Err(e) => Some(e.into()),
    }
}

pub fn handle_reveal_next(session: &mut Session) -> Option<ServerMessage> {
    match session.reveal.next() {
        Ok(reveal) => Some(ServerMessage::Reveal { reveal }),
        Err(e) => Some(crate::error::CoreError::from(e).into()),
    }
}

/// The dashboard follows through the `adminSettingsUpdate` event.
pub async fn handle_reveal_finish(state: &AppState, session: &mut Session) -> Option<ServerMessage> {
    match state.finish_reveal(&mut session.reveal).await {
        Ok(reveal) => {
            tracing::info!("Reveal finished; results are public");
            Some(ServerMessage::Reveal { reveal })
        }
        Err(e) => Some(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::RevealStep;
    use crate::types::Role;

    #[tokio::test]
    async fn test_reveal_next_without_start_is_an_error() {
        let mut session = Session::new(Role::Admin, None);
        match handle_reveal_next(&mut session) {
            Some(ServerMessage::Error { code, .. }) => assert_eq!(code, "REVEAL_FAILED"),
            other => panic!("unexpected response {other:?}"),
        }
        assert_eq!(session.reveal.step(), RevealStep::Idle);
    }

    #[tokio::test]
    async fn test_show_results_gated_on_completion() {
        let state = AppState::in_memory();
        let mut session = Session::new(Role::Admin, None);
        match handle_show_results(&state, &mut session).await {
            Some(ServerMessage::Error { code, msg }) => {
                assert_eq!(code, "REVEAL_FAILED");
                assert!(msg.contains("no teams"));
            }
            other => panic!("unexpected response {other:?}"),
        }
    }
}
