use crate::state::{Dashboard, GameResult, RevealView, Standings, TeamSummary};
use crate::sync::SyncMode;
use crate::types::*;
use serde::{Deserialize, Serialize};

/// Change notifications fanned out to every connected session.
///
/// Delivery is best effort. Sessions refetch from the store instead of
/// trusting event payloads for state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum LiveEvent {
    #[serde(rename = "liveUpdate", rename_all = "camelCase")]
    LiveUpdate {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        team_id: Option<Username>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        completed_games: Option<usize>,
        #[serde(default)]
        message: String,
    },
    #[serde(rename = "editRequested", rename_all = "camelCase")]
    EditRequested {
        team_id: Username,
        game_index: GameIndex,
    },
    #[serde(rename = "editAllowed", rename_all = "camelCase")]
    EditAllowed {
        team_id: Username,
        game_index: GameIndex,
    },
    #[serde(rename = "editPending", rename_all = "camelCase")]
    EditPending {
        team_id: Username,
        game_index: GameIndex,
    },
    #[serde(rename = "editAccepted", rename_all = "camelCase")]
    EditAccepted {
        team_id: Username,
        game_index: GameIndex,
    },
    #[serde(rename = "new_marshal")]
    NewMarshal { message: String, time: String },
    #[serde(rename = "gamesReset")]
    GamesReset { message: String },
    #[serde(rename = "marshalDeleted")]
    MarshalDeleted { username: Username, message: String },
    #[serde(rename = "adminSettingsUpdate", rename_all = "camelCase")]
    AdminSettingsUpdate { results_revealed: bool },
    /// Any `type` this build does not know
    #[serde(other)]
    Unknown,
}

impl LiveEvent {
    /// Parse an event from the wire. Unknown types become [`LiveEvent::Unknown`];
    /// only malformed JSON or a missing `type` is an error.
    pub fn from_wire(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum ClientMessage {
    // Marshal messages (session from the connection token)
    CompleteGame {
        game_index: GameIndex,
        result: GameResult,
    },
    RequestEdit {
        game_index: GameIndex,
    },
    SubmitEdit {
        game_index: GameIndex,
        result: GameResult,
    },
    SetTeamName {
        team_name: String,
    },
    // Admin-only messages
    AdminAllowEdit {
        team_id: Username,
        game_index: GameIndex,
    },
    AdminAcceptEdit {
        team_id: Username,
        game_index: GameIndex,
    },
    AdminResetGames,
    AdminDeleteMarshal {
        username: Username,
    },
    AdminSetResultsRevealed {
        revealed: bool,
    },
    AdminResetSettings,
    /// Open the reveal splash screen
    AdminShowResults,
    AdminRevealNext,
    AdminRevealFinish,
    /// Ask for a fresh snapshot
    Refresh,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum ServerMessage {
    Welcome {
        protocol: String,
        role: Role,
        session_id: String,
        sync: SyncMode,
        server_now: String,
    },
    /// A live event, forwarded as-is
    Event {
        event: LiveEvent,
    },
    Dashboard {
        dashboard: Dashboard,
    },
    TeamState {
        team: TeamSummary,
    },
    Standings {
        standings: Standings,
    },
    Reveal {
        reveal: RevealView,
    },
    /// The session must end (account removed or games reset)
    Logout {
        reason: String,
    },
    Error {
        code: String,
        msg: String,
    },
}

impl From<crate::error::CoreError> for ServerMessage {
    fn from(e: crate::error::CoreError) -> Self {
        ServerMessage::Error {
            code: e.code().to_string(),
            msg: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_live_event_wire_names() {
        let event = LiveEvent::EditRequested {
            team_id: "mo".to_string(),
            game_index: 2,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": "editRequested", "teamId": "mo", "gameIndex": 2})
        );

        let json = serde_json::to_value(LiveEvent::NewMarshal {
            message: "hi".into(),
            time: "now".into(),
        })
        .unwrap();
        assert_eq!(json["type"], "new_marshal");

        let json = serde_json::to_value(LiveEvent::AdminSettingsUpdate {
            results_revealed: true,
        })
        .unwrap();
        assert_eq!(json["resultsRevealed"], true);
    }

    #[test]
    fn test_unknown_event_type_is_tolerated() {
        let event = LiveEvent::from_wire(r#"{"type":"confetti","colour":"gold"}"#).unwrap();
        assert_eq!(event, LiveEvent::Unknown);

        assert!(LiveEvent::from_wire("not json").is_err());
    }

    #[test]
    fn test_live_update_optional_fields() {
        let event = LiveEvent::from_wire(r#"{"type":"liveUpdate"}"#).unwrap();
        assert_eq!(
            event,
            LiveEvent::LiveUpdate {
                team_id: None,
                completed_games: None,
                message: String::new()
            }
        );
    }

    #[test]
    fn test_client_message_format() {
        let msg: ClientMessage = serde_json::from_str(
            r#"{"t":"complete_game","game_index":1,"result":{"timeSeconds":120,"penaltyCount":3}}"#,
        )
        .unwrap();
        match msg {
            ClientMessage::CompleteGame { game_index, result } => {
                assert_eq!(game_index, 1);
                assert_eq!(result.time_seconds, 120);
                assert_eq!(result.penalty_count, 3);
            }
            other => panic!("unexpected message {other:?}"),
        }

        let msg: ClientMessage = serde_json::from_str(r#"{"t":"admin_reveal_next"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::AdminRevealNext));
    }
}
