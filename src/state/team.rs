use super::{now, AppState, ScoreError};
use crate::error::{CoreError, CoreResult};
use crate::protocol::LiveEvent;
use crate::state::GameResult;
use crate::store::keys;
use crate::types::*;
use serde::Deserialize;
use serde_json::Value;

impl TeamRecord {
    /// Fresh team with five placeholder games
    pub fn new(username: &str, marshal_name: &str, registered_at: String) -> Self {
        Self {
            username: username.to_string(),
            marshal_name: marshal_name.to_string(),
            team_name: String::new(),
            games: GameName::ALL
                .iter()
                .map(|g| GameRecord::placeholder(*g))
                .collect(),
            registered_at,
            updated_at: None,
        }
    }

    /// Sum of final scores; incomplete games contribute 0.
    pub fn total_time(&self) -> Result<u32, ScoreError> {
        self.games
            .iter()
            .try_fold(0u32, |acc, g| Ok(acc.saturating_add(g.final_score()?)))
    }

    pub fn completed_games(&self) -> usize {
        self.games.iter().filter(|g| g.completed).count()
    }

    /// Exactly five entries, all completed. Short legacy records are
    /// incomplete, not malformed.
    pub fn is_complete(&self) -> bool {
        self.games.len() == GAME_COUNT && self.games.iter().all(|g| g.completed)
    }

    /// Reject records whose games are out of the fixed order or unscoreable.
    pub fn validate(&self) -> Result<(), ScoreError> {
        if self.games.len() > GAME_COUNT {
            return Err(ScoreError::TooManyGames(self.games.len()));
        }
        for (index, game) in self.games.iter().enumerate() {
            let expected = GameName::ALL[index];
            if game.name != expected {
                return Err(ScoreError::OutOfOrder {
                    index,
                    expected,
                    found: game.name,
                });
            }
            game.final_score()?;
        }
        Ok(())
    }

    /// Append placeholders for games a short legacy record is missing.
    pub fn fill_missing_games(&mut self) {
        for name in GameName::ALL.iter().skip(self.games.len()) {
            self.games.push(GameRecord::placeholder(*name));
        }
    }

    /// Back to five placeholders. Names are kept.
    pub fn reset_games(&mut self) {
        self.games.clear();
        self.fill_missing_games();
    }
}

impl AppState {
    /// Load a team. A missing team is a hard failure.
    pub async fn get_team(&self, username: &str) -> CoreResult<TeamRecord> {
        Ok(self.load_team(username).await?.0)
    }

    /// Record a finished game.
    ///
    /// Games are played in the fixed order and a finished game can only be
    /// changed through the edit workflow.
    pub async fn complete_game(
        &self,
        username: &str,
        game_index: GameIndex,
        result: GameResult,
    ) -> CoreResult<TeamRecord> {
        let name = GameName::from_index(game_index)
            .ok_or_else(|| CoreError::validation(format!("unknown game index {game_index}")))?;
        let (mut team, _) = self.load_team(username).await?;
        team.fill_missing_games();

        if team.games[game_index].completed {
            return Err(CoreError::validation(format!(
                "{name} is already completed; request an edit instead"
            )));
        }
        if let Some(pending) = team.games[..game_index].iter().find(|g| !g.completed) {
            return Err(CoreError::validation(format!(
                "complete {} before {name}",
                pending.name
            )));
        }

        let timestamp = now();
        team.games[game_index] = result.into_record(name, timestamp.clone())?;
        team.updated_at = Some(timestamp);
        self.save_team(&team).await?;

        tracing::info!(
            "Team {} completed {} ({}/{})",
            username,
            name,
            team.completed_games(),
            GAME_COUNT
        );
        self.publish(LiveEvent::LiveUpdate {
            team_id: Some(team.username.clone()),
            completed_games: Some(team.completed_games()),
            message: format!("{} completed {}", display_name(&team), name),
        });
        Ok(team)
    }

    pub async fn set_team_name(&self, username: &str, team_name: &str) -> CoreResult<TeamRecord> {
        let team_name = team_name.trim();
        if team_name.is_empty() {
            return Err(CoreError::validation("team name must not be empty"));
        }
        if team_name.chars().count() > 64 {
            return Err(CoreError::validation("team name is too long"));
        }

        let (mut team, _) = self.load_team(username).await?;
        team.team_name = team_name.to_string();
        team.updated_at = Some(now());
        self.save_team(&team).await?;

        self.publish(LiveEvent::LiveUpdate {
            team_id: Some(team.username.clone()),
            completed_games: Some(team.completed_games()),
            message: format!("{} named their team {}", team.marshal_name, team_name),
        });
        Ok(team)
    }

    /// Reset every team to five placeholders. Returns the number of teams reset.
    ///
    /// Works from the stored keys, not [`list_teams`](Self::list_teams), so
    /// records too malformed to score are rebuilt from their names as well.
    /// Marshal sessions are logged out.
    pub async fn reset_all_games(&self) -> CoreResult<usize> {
        let timestamp = now();
        let mut reset = 0;
        for key in self.store.list_keys(keys::TEAM_PREFIX).await? {
            let Some(username) = keys::suffix(&key, keys::TEAM_PREFIX) else {
                continue;
            };
            let Some(raw) = self.store.get(&key).await? else {
                continue;
            };
            let mut team = rebuild_team(&key, username, raw);
            team.updated_at = Some(timestamp.clone());
            self.save_team(&team).await?;
            reset += 1;
        }
        self.clear_sessions().await;

        tracing::warn!("All games reset for {} teams", reset);
        self.publish(LiveEvent::GamesReset {
            message: "All games have been reset".to_string(),
        });
        self.publish(LiveEvent::LiveUpdate {
            team_id: None,
            completed_games: None,
            message: "Games reset".to_string(),
        });
        Ok(reset)
    }
}

/// Names of a stored team, read without looking at its games
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct TeamIdentity {
    marshal_name: String,
    team_name: String,
    registered_at: String,
}

/// Fresh placeholders for a stored team, keeping whatever names it has.
fn rebuild_team(key: &str, username: &str, raw: Value) -> TeamRecord {
    let identity: TeamIdentity = serde_json::from_value(raw).unwrap_or_else(|e| {
        tracing::warn!("Team record {} has unreadable names, resetting them: {}", key, e);
        TeamIdentity::default()
    });
    let mut team = TeamRecord::new(username, &identity.marshal_name, identity.registered_at);
    team.team_name = identity.team_name;
    team
}

/// Team name, or the marshal name before setup
pub fn display_name(team: &TeamRecord) -> &str {
    if team.team_name.is_empty() {
        &team.marshal_name
    } else {
        &team.team_name
    }
}
