//! Ranking, summary statistics and the views built on them.

use serde::{Deserialize, Serialize};

use super::{display_name, AppState, ScoreError};
use crate::error::CoreResult;
use crate::types::*;

/// One game as the dashboard shows it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GameSummary {
    pub index: GameIndex,
    pub name: GameName,
    pub completed: bool,
    pub time: u32,
    pub final_score: u32,
    pub edit: EditState,
}

/// A team with its derived values computed once
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TeamSummary {
    pub username: Username,
    pub marshal_name: String,
    pub team_name: String,
    pub registered_at: String,
    pub total_time: u32,
    pub completed_games: usize,
    pub complete: bool,
    pub games: Vec<GameSummary>,
}

impl TryFrom<&TeamRecord> for TeamSummary {
    type Error = ScoreError;

    fn try_from(team: &TeamRecord) -> Result<Self, Self::Error> {
        let games = team
            .games
            .iter()
            .enumerate()
            .map(|(index, g)| {
                Ok(GameSummary {
                    index,
                    name: g.name,
                    completed: g.completed,
                    time: g.time,
                    final_score: g.final_score()?,
                    edit: g.edit,
                })
            })
            .collect::<Result<Vec<_>, ScoreError>>()?;

        Ok(Self {
            username: team.username.clone(),
            marshal_name: team.marshal_name.clone(),
            team_name: display_name(team).to_string(),
            registered_at: team.registered_at.clone(),
            total_time: team.total_time()?,
            completed_games: team.completed_games(),
            complete: team.is_complete(),
            games,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RankedTeam {
    /// 1-based; 1 is the winner
    pub place: usize,
    pub place_label: String,
    pub username: Username,
    pub team_name: String,
    pub marshal_name: String,
    pub total_time: u32,
}

/// Rank complete teams, fastest first.
///
/// The sort is stable, so equal totals keep the input (registration) order.
pub fn rank(teams: &[TeamSummary]) -> Vec<RankedTeam> {
    let mut complete: Vec<&TeamSummary> = teams.iter().filter(|t| t.complete).collect();
    complete.sort_by_key(|t| t.total_time);
    complete
        .into_iter()
        .enumerate()
        .map(|(i, t)| RankedTeam {
            place: i + 1,
            place_label: place_label(i + 1),
            username: t.username.clone(),
            team_name: t.team_name.clone(),
            marshal_name: t.marshal_name.clone(),
            total_time: t.total_time,
        })
        .collect()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardStats {
    pub team_count: usize,
    pub complete_count: usize,
    pub total_time_sum: u64,
    /// Rounded mean over every registered team, complete or not
    pub average_time: u64,
}

pub fn summarize(teams: &[TeamSummary]) -> LeaderboardStats {
    let team_count = teams.len();
    let total_time_sum: u64 = teams.iter().map(|t| u64::from(t.total_time)).sum();
    let average_time = if team_count == 0 {
        0
    } else {
        // Round half up
        let n = team_count as u64;
        (total_time_sum * 2 + n) / (2 * n)
    };
    LeaderboardStats {
        team_count,
        complete_count: teams.iter().filter(|t| t.complete).count(),
        total_time_sum,
        average_time,
    }
}

/// At least one team, and every team done
pub fn all_complete(teams: &[TeamSummary]) -> bool {
    !teams.is_empty() && teams.iter().all(|t| t.complete)
}

pub fn reveal_available(teams: &[TeamSummary], settings: &AdminSettings) -> bool {
    all_complete(teams) && !settings.results_revealed
}

/// What audience-facing views may show
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum Standings {
    InProgress { completed: usize, registered: usize },
    AwaitingReveal,
    Final { ranking: Vec<RankedTeam> },
}

pub fn standings(teams: &[TeamSummary], settings: &AdminSettings) -> Standings {
    if !all_complete(teams) {
        return Standings::InProgress {
            completed: teams.iter().filter(|t| t.complete).count(),
            registered: teams.len(),
        };
    }
    if settings.results_revealed {
        Standings::Final {
            ranking: rank(teams),
        }
    } else {
        Standings::AwaitingReveal
    }
}

/// "1st PLACE", "2nd PLACE", "11th PLACE", ...
pub fn place_label(place: usize) -> String {
    let suffix = match (place % 10, place % 100) {
        (_, 11..=13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    };
    format!("{place}{suffix} PLACE")
}

/// A game waiting on an admin decision
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PendingEdit {
    pub team_id: Username,
    pub team_name: String,
    pub game_index: GameIndex,
    pub game_name: GameName,
    pub state: EditState,
}

/// Everything an admin session renders
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    pub teams: Vec<TeamSummary>,
    pub stats: LeaderboardStats,
    pub pending_requests: Vec<PendingEdit>,
    pub pending_edits: Vec<PendingEdit>,
    pub reveal_available: bool,
    pub results_revealed: bool,
    /// Present only once every team is complete
    pub ranking: Option<Vec<RankedTeam>>,
}

impl Dashboard {
    pub fn build(teams: Vec<TeamSummary>, settings: &AdminSettings) -> Self {
        let pending = |wanted: EditState| -> Vec<PendingEdit> {
            teams
                .iter()
                .flat_map(|t| {
                    t.games
                        .iter()
                        .filter(move |g| g.edit == wanted)
                        .map(move |g| PendingEdit {
                            team_id: t.username.clone(),
                            team_name: t.team_name.clone(),
                            game_index: g.index,
                            game_name: g.name,
                            state: g.edit,
                        })
                })
                .collect()
        };

        let pending_requests = pending(EditState::EditRequested);
        let pending_edits = pending(EditState::EditPending);
        let ranking = all_complete(&teams).then(|| rank(&teams));

        Self {
            stats: summarize(&teams),
            pending_requests,
            pending_edits,
            reveal_available: reveal_available(&teams, settings),
            results_revealed: settings.results_revealed,
            ranking,
            teams,
        }
    }
}

impl AppState {
    pub async fn team_summary(&self, username: &str) -> CoreResult<TeamSummary> {
        let team = self.get_team(username).await?;
        Ok(TeamSummary::try_from(&team)?)
    }

    pub async fn dashboard(&self) -> CoreResult<Dashboard> {
        let teams = self.team_summaries().await?;
        let settings = self.get_settings().await?;
        Ok(Dashboard::build(teams, &settings))
    }

    pub async fn standings(&self) -> CoreResult<Standings> {
        let teams = self.team_summaries().await?;
        let settings = self.get_settings().await?;
        Ok(standings(&teams, &settings))
    }

    /// Ranking of complete teams regardless of reveal state (admin polling)
    pub async fn leaderboard(&self) -> CoreResult<Vec<RankedTeam>> {
        Ok(rank(&self.team_summaries().await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(username: &str, total_time: u32, complete: bool) -> TeamSummary {
        TeamSummary {
            username: username.to_string(),
            marshal_name: username.to_uppercase(),
            team_name: format!("Team {username}"),
            registered_at: String::new(),
            total_time,
            completed_games: if complete { GAME_COUNT } else { 2 },
            complete,
            games: Vec::new(),
        }
    }

    #[test]
    fn test_rank_excludes_incomplete_and_sorts_ascending() {
        let teams = vec![
            summary("a", 300, true),
            summary("b", 100, false),
            summary("c", 200, true),
        ];
        let ranking = rank(&teams);
        assert_eq!(ranking.len(), 2);
        assert_eq!(ranking[0].username, "c");
        assert_eq!(ranking[0].place, 1);
        assert_eq!(ranking[1].username, "a");
        assert_eq!(ranking[1].place, 2);
    }

    #[test]
    fn test_ties_keep_registration_order() {
        let teams = vec![
            summary("first", 150, true),
            summary("second", 150, true),
            summary("fast", 100, true),
        ];
        let order: Vec<String> = rank(&teams).into_iter().map(|r| r.username).collect();
        assert_eq!(order, vec!["fast", "first", "second"]);
    }

    #[test]
    fn test_average_includes_incomplete_teams() {
        let teams = vec![summary("a", 300, true), summary("b", 0, false)];
        let stats = summarize(&teams);
        assert_eq!(stats.team_count, 2);
        assert_eq!(stats.complete_count, 1);
        assert_eq!(stats.total_time_sum, 300);
        assert_eq!(stats.average_time, 150);

        // 301 / 2 = 150.5 rounds up
        let teams = vec![summary("a", 301, true), summary("b", 0, false)];
        assert_eq!(summarize(&teams).average_time, 151);

        assert_eq!(summarize(&[]).average_time, 0);
    }

    #[test]
    fn test_reveal_gating() {
        let hidden = AdminSettings::default();
        let revealed = AdminSettings {
            results_revealed: true,
            updated_at: None,
        };

        assert!(!reveal_available(&[], &hidden));
        assert!(!reveal_available(
            &[summary("a", 10, true), summary("b", 10, false)],
            &hidden
        ));
        assert!(reveal_available(&[summary("a", 10, true)], &hidden));
        assert!(!reveal_available(&[summary("a", 10, true)], &revealed));
    }

    #[test]
    fn test_standings_never_leak_partial_rankings() {
        let hidden = AdminSettings::default();
        let revealed = AdminSettings {
            results_revealed: true,
            updated_at: None,
        };
        let partial = vec![summary("a", 10, true), summary("b", 5, false)];
        assert_eq!(
            standings(&partial, &revealed),
            Standings::InProgress {
                completed: 1,
                registered: 2
            }
        );

        let done = vec![summary("a", 10, true), summary("b", 5, true)];
        assert_eq!(standings(&done, &hidden), Standings::AwaitingReveal);
        match standings(&done, &revealed) {
            Standings::Final { ranking } => assert_eq!(ranking[0].username, "b"),
            other => panic!("unexpected standings {other:?}"),
        }
    }

    #[test]
    fn test_place_labels() {
        assert_eq!(place_label(1), "1st PLACE");
        assert_eq!(place_label(2), "2nd PLACE");
        assert_eq!(place_label(3), "3rd PLACE");
        assert_eq!(place_label(4), "4th PLACE");
        assert_eq!(place_label(11), "11th PLACE");
        assert_eq!(place_label(12), "12th PLACE");
        assert_eq!(place_label(13), "13th PLACE");
        assert_eq!(place_label(21), "21st PLACE");
        assert_eq!(place_label(112), "112th PLACE");
    }

    #[test]
    fn test_dashboard_lists_pending_edits() {
        let mut a = summary("a", 10, true);
        a.games = vec![
            GameSummary {
                index: 0,
                name: GameName::HouseOfCards,
                completed: true,
                time: 0,
                final_score: 60,
                edit: EditState::EditRequested,
            },
            GameSummary {
                index: 1,
                name: GameName::OfficeChairRace,
                completed: true,
                time: 50,
                final_score: 50,
                edit: EditState::EditPending,
            },
        ];
        let b = summary("b", 0, false);

        let dashboard = Dashboard::build(vec![a, b], &AdminSettings::default());
        assert_eq!(dashboard.pending_requests.len(), 1);
        assert_eq!(dashboard.pending_requests[0].game_index, 0);
        assert_eq!(dashboard.pending_edits.len(), 1);
        assert_eq!(dashboard.pending_edits[0].game_name, GameName::OfficeChairRace);
        assert!(!dashboard.reveal_available);
        assert!(dashboard.ranking.is_none());
    }
}
