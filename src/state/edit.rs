//! Per-game correction workflow.
//!
//! `Normal -> EditRequested -> EditAllowed -> EditPending -> Normal`. Every
//! transition is written with compare-and-swap so two admins acting on the
//! same record cannot both win.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use super::{now, AppState, GameResult};
use crate::error::{CoreError, CoreResult};
use crate::protocol::LiveEvent;
use crate::types::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditAction {
    Request,
    Allow,
    Submit,
    Accept,
}

impl fmt::Display for EditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EditAction::Request => "request an edit",
            EditAction::Allow => "allow an edit",
            EditAction::Submit => "submit an edit",
            EditAction::Accept => "accept an edit",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("cannot {action} while the game is in state {from}")]
pub struct InvalidTransition {
    pub from: EditState,
    pub action: EditAction,
}

impl EditState {
    pub fn apply(self, action: EditAction) -> Result<EditState, InvalidTransition> {
        use EditAction::*;
        use EditState::*;
        match (self, action) {
            (Normal, Request) => Ok(EditRequested),
            (EditRequested, Allow) => Ok(EditAllowed),
            (EditAllowed, Submit) => Ok(EditPending),
            (EditPending, Accept) => Ok(Normal),
            (from, action) => Err(InvalidTransition { from, action }),
        }
    }
}

impl AppState {
    pub async fn request_edit(&self, username: &str, game_index: GameIndex) -> CoreResult<TeamRecord> {
        let team = self
            .transition_game(username, game_index, EditAction::Request, None)
            .await?;
        self.publish(LiveEvent::EditRequested {
            team_id: username.to_string(),
            game_index,
        });
        Ok(team)
    }

    pub async fn allow_edit(&self, username: &str, game_index: GameIndex) -> CoreResult<TeamRecord> {
        let team = self
            .transition_game(username, game_index, EditAction::Allow, None)
            .await?;
        self.publish(LiveEvent::EditAllowed {
            team_id: username.to_string(),
            game_index,
        });
        Ok(team)
    }

    /// Replace a game's result. Same validation as first entry.
    pub async fn submit_edit(
        &self,
        username: &str,
        game_index: GameIndex,
        result: GameResult,
    ) -> CoreResult<TeamRecord> {
        let team = self
            .transition_game(username, game_index, EditAction::Submit, Some(result))
            .await?;
        self.publish(LiveEvent::EditPending {
            team_id: username.to_string(),
            game_index,
        });
        Ok(team)
    }

    pub async fn accept_edit(&self, username: &str, game_index: GameIndex) -> CoreResult<TeamRecord> {
        let team = self
            .transition_game(username, game_index, EditAction::Accept, None)
            .await?;
        self.publish(LiveEvent::EditAccepted {
            team_id: username.to_string(),
            game_index,
        });
        Ok(team)
    }

    async fn transition_game(
        &self,
        username: &str,
        game_index: GameIndex,
        action: EditAction,
        update: Option<GameResult>,
    ) -> CoreResult<TeamRecord> {
        let (mut team, expected) = self.load_team(username).await?;
        let game = team.games.get_mut(game_index).ok_or_else(|| {
            CoreError::validation(format!("team {username} has no game {game_index}"))
        })?;

        if action == EditAction::Request && !game.completed {
            return Err(CoreError::validation(format!(
                "{} is not completed yet",
                game.name
            )));
        }
        let next = game.edit.apply(action)?;

        if let Some(result) = update {
            let completed_at = game.completed_at.clone().unwrap_or_else(now);
            *game = result.into_record(game.name, completed_at)?;
        }
        game.edit = next;
        let name = game.name;
        team.updated_at = Some(now());

        self.swap_team(&team, &expected).await?;
        tracing::info!(
            "Edit workflow for {} game {} ({}): now {}",
            username,
            game_index,
            name,
            next
        );
        Ok(team)
    }
}
