//! WebSocket message dispatch
//!
//! Authorization is checked here, then dispatched to role-specific handler modules.

use crate::protocol::{ClientMessage, ServerMessage};
use crate::state::AppState;
use crate::types::Role;

use super::{admin, marshal, snapshot, Session};

/// Return early unless the session is an admin
macro_rules! check_admin {
    ($session:expr, $action:expr) => {
        if $session.role != Role::Admin {
            return Some(ServerMessage::Error {
                code: "UNAUTHORIZED".to_string(),
                msg: format!("Only admin can {}", $action),
            });
        }
    };
}

/// Return early unless the session belongs to a logged-in marshal;
/// evaluates to the username
macro_rules! marshal_username {
    ($session:expr, $action:expr) => {
        match ($session.role, $session.username.clone()) {
            (Role::Marshal, Some(username)) => username,
            _ => {
                return Some(ServerMessage::Error {
                    code: "UNAUTHORIZED".to_string(),
                    msg: format!("Only a logged-in marshal can {}", $action),
                })
            }
        }
    };
}

/// Handle client messages and return optional response
pub async fn handle_message(
    msg: ClientMessage,
    session: &mut Session,
    state: &AppState,
) -> Option<ServerMessage> {
    match msg {
        ClientMessage::Refresh => Some(snapshot(session, state).await),

        // Marshal messages
        ClientMessage::CompleteGame { game_index, result } => {
            let username = marshal_username!(session, "complete games");
            marshal::handle_complete_game(state, &username, game_index, result).await
        }

        ClientMessage::RequestEdit { game_index } => {
            let username = marshal_username!(session, "request edits");
            marshal::handle_request_edit(state, &username, game_index).await
        }

        ClientMessage::SubmitEdit { game_index, result } => {
            let username = marshal_username!(session, "submit edits");
            marshal::handle_submit_edit(state, &username, game_index, result).await
        }

        ClientMessage::SetTeamName { team_name } => {
            let username = marshal_username!(session, "name a team");
            marshal::handle_set_team_name(state, &username, &team_name).await
        }

        // Admin-only commands (authorization checked before dispatch)
        ClientMessage::AdminAllowEdit {
            team_id,
            game_index,
        } => {
            check_admin!(session, "allow edits");
            admin::handle_allow_edit(state, &team_id, game_index).await
        }

        ClientMessage::AdminAcceptEdit {
            team_id,
            game_index,
        } => {
            check_admin!(session, "accept edits");
            admin::handle_accept_edit(state, &team_id, game_index).await
        }

        ClientMessage::AdminResetGames => {
            check_admin!(session, "reset games");
            admin::handle_reset_games(state).await
        }

        ClientMessage::AdminDeleteMarshal { username } => {
            check_admin!(session, "delete marshals");
            admin::handle_delete_marshal(state, &username).await
        }

        ClientMessage::AdminSetResultsRevealed { revealed } => {
            check_admin!(session, "change settings");
            admin::handle_set_results_revealed(state, revealed).await
        }

        ClientMessage::AdminResetSettings => {
            check_admin!(session, "reset settings");
            admin::handle_reset_settings(state).await
        }

        ClientMessage::AdminShowResults => {
            check_admin!(session, "show results");
            admin::handle_show_results(state, session).await
        }

        ClientMessage::AdminRevealNext => {
            check_admin!(session, "control the reveal");
            admin::handle_reveal_next(session)
        }

        ClientMessage::AdminRevealFinish => {
            check_admin!(session, "finish the reveal");
            admin::handle_reveal_finish(state, session).await
        }
    }
}
