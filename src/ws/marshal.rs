//! Marshal command handlers. Every successful call answers with the
//! marshal's refreshed team.

use crate::error::CoreResult;
use crate::protocol::ServerMessage;
use crate::state::{AppState, GameResult, TeamSummary};
use crate::types::{GameIndex, TeamRecord};

fn team_state(result: CoreResult<TeamRecord>) -> Option<ServerMessage> {
    let summary = result.and_then(|team| Ok(TeamSummary::try_from(&team)?));
    Some(match summary {
        Ok(team) => ServerMessage::TeamState { team },
        Err(e) => e.into(),
    })
}

pub async fn handle_complete_game(
    state: &AppState,
    username: &str,
    game_index: GameIndex,
    result: GameResult,
) -> Option<ServerMessage> {
    tracing::info!("Marshal {} completing game {}", username, game_index);
    team_state(state.complete_game(username, game_index, result).await)
}

pub async fn handle_request_edit(
    state: &AppState,
    username: &str,
    game_index: GameIndex,
) -> Option<ServerMessage> {
    tracing::info!("Marshal {} requesting edit of game {}", username, game_index);
    team_state(state.request_edit(username, game_index).await)
}

pub async fn handle_submit_edit(
    state: &AppState,
    username: &str,
    game_index: GameIndex,
    result: GameResult,
) -> Option<ServerMessage> {
    tracing::info!("Marshal {} submitting edit of game {}", username, game_index);
    team_state(state.submit_edit(username, game_index, result).await)
}

pub async fn handle_set_team_name(
    state: &AppState,
    username: &str,
    team_name: &str,
) -> Option<ServerMessage> {
    team_state(state.set_team_name(username, team_name).await)
}
