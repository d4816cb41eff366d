use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque ID types for readability
pub type Username = String;
pub type GameIndex = usize;

/// Every team plays exactly this many games, in [`GameName::ALL`] order
pub const GAME_COUNT: usize = 5;

/// Seconds added per infraction in the penalty game
pub const SECONDS_PER_INFRACTION: u32 = 5;

/// Seconds removed when the creativity flag is set
pub const CREATIVITY_BONUS_SECONDS: u32 = 15;

/// Ceiling for a marshal-entered base time (10 minutes)
pub const MAX_ENTRY_SECONDS: i64 = 600;

/// The five fixed mini-games. Declaration order is the global game order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum GameName {
    #[serde(rename = "House of Cards")]
    HouseOfCards,
    #[serde(rename = "Office Chair Race")]
    OfficeChairRace,
    #[serde(rename = "Around the Clock")]
    AroundTheClock,
    #[serde(rename = "Pass the Spud")]
    PassTheSpud,
    #[serde(rename = "Skin the Snake")]
    SkinTheSnake,
}

impl GameName {
    pub const ALL: [GameName; GAME_COUNT] = [
        GameName::HouseOfCards,
        GameName::OfficeChairRace,
        GameName::AroundTheClock,
        GameName::PassTheSpud,
        GameName::SkinTheSnake,
    ];

    pub fn from_index(index: GameIndex) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn index(self) -> GameIndex {
        Self::ALL
            .iter()
            .position(|g| *g == self)
            .unwrap_or_default()
    }

    pub fn label(self) -> &'static str {
        match self {
            GameName::HouseOfCards => "House of Cards",
            GameName::OfficeChairRace => "Office Chair Race",
            GameName::AroundTheClock => "Around the Clock",
            GameName::PassTheSpud => "Pass the Spud",
            GameName::SkinTheSnake => "Skin the Snake",
        }
    }

    /// Scoring formula for this game. Identity decides the rule, never position.
    pub fn rule(self) -> ScoringRule {
        match self {
            GameName::HouseOfCards => ScoringRule::Placement,
            GameName::OfficeChairRace => ScoringRule::TimedWithPenalties,
            GameName::AroundTheClock | GameName::PassTheSpud | GameName::SkinTheSnake => {
                ScoringRule::Timed
            }
        }
    }
}

impl fmt::Display for GameName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoringRule {
    /// Final score is the measured time
    Timed,
    /// Measured time plus a fixed cost per infraction
    TimedWithPenalties,
    /// Measured time is ignored; a placement schedule applies
    Placement,
}

/// Finishing position in the creative building game
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Placement {
    First,
    Second,
    Third,
    Fourth,
    Fifth,
}

impl Placement {
    pub const ALL: [Placement; 5] = [
        Placement::First,
        Placement::Second,
        Placement::Third,
        Placement::Fourth,
        Placement::Fifth,
    ];

    /// Seconds added to the team's time for this placement
    pub fn bonus_seconds(self) -> u32 {
        match self {
            Placement::First => 60,
            Placement::Second => 75,
            Placement::Third => 90,
            Placement::Fourth => 105,
            Placement::Fifth => 120,
        }
    }
}

/// Per-game correction workflow. A single field, so conflicting flag
/// combinations cannot be stored.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum EditState {
    #[default]
    Normal,
    EditRequested,
    EditAllowed,
    EditPending,
}

impl fmt::Display for EditState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EditState::Normal => "normal",
            EditState::EditRequested => "edit requested",
            EditState::EditAllowed => "edit allowed",
            EditState::EditPending => "edit pending",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct GameDetails {
    /// Informational: final score minus base time
    #[serde(default)]
    pub bonus_seconds: i64,
    /// Infraction count, not seconds
    #[serde(default)]
    pub penalty_seconds: u32,
    #[serde(default)]
    pub creativity_bonus: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winner_status: Option<Placement>,
    /// Explicit score set through an edit; wins over the formula when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_score: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GameRecord {
    pub name: GameName,
    pub completed: bool,
    /// Base measured time in seconds
    #[serde(default)]
    pub time: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<GameDetails>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    #[serde(default)]
    pub edit: EditState,
}

impl GameRecord {
    pub fn placeholder(name: GameName) -> Self {
        Self {
            name,
            completed: false,
            time: 0,
            details: None,
            completed_at: None,
            edit: EditState::Normal,
        }
    }
}

/// A team's stored record. Keyed by `team:{username}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TeamRecord {
    pub username: Username,
    #[serde(default)]
    pub marshal_name: String,
    #[serde(default)]
    pub team_name: String,
    /// Legacy records may carry fewer than five entries
    #[serde(default)]
    pub games: Vec<GameRecord>,
    /// Registration timestamp (RFC 3339); ranking tiebreak
    #[serde(default)]
    pub registered_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

/// Process-wide admin settings. Keyed by `admin:settings`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct AdminSettings {
    #[serde(default)]
    pub results_revealed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

/// Event code marshals enter at login. Keyed by `admin:gameCode`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GameCode {
    pub code: String,
    pub created_at: String,
    pub updated_at: String,
    pub active: bool,
}

/// Marshal login account. Keyed by `user:{username}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MarshalAccount {
    pub username: Username,
    pub password_hash: String,
    #[serde(default)]
    pub marshal_name: String,
    #[serde(default)]
    pub created_at: String,
}

/// Marshal account without password material
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MarshalProfile {
    pub username: Username,
    pub marshal_name: String,
    pub created_at: String,
}

impl From<&MarshalAccount> for MarshalProfile {
    fn from(account: &MarshalAccount) -> Self {
        Self {
            username: account.username.clone(),
            marshal_name: account.marshal_name.clone(),
            created_at: account.created_at.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Marshal,
    Audience,
}
