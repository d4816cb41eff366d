//! Per-game score derivation and validation of marshal-entered results.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::*;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScoreError {
    #[error("{field} must not be negative (got {value})")]
    Negative { field: &'static str, value: i64 },
    #[error("time must be between 1 and {max} seconds (got {0})", max = MAX_ENTRY_SECONDS)]
    TimeOutOfRange(i64),
    #[error("{0} needs a placement")]
    MissingPlacement(GameName),
    #[error("game {index} should be {expected} but record has {found}")]
    OutOfOrder {
        index: GameIndex,
        expected: GameName,
        found: GameName,
    },
    #[error("team has {0} game entries, more than the {max} allowed", max = GAME_COUNT)]
    TooManyGames(usize),
}

/// Result values as a marshal submits them, before validation.
///
/// Numbers are signed so that negative input is reported instead of
/// failing deserialization with an opaque message.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GameResult {
    #[serde(default)]
    pub time_seconds: i64,
    /// Number of infractions, not seconds
    #[serde(default)]
    pub penalty_count: i64,
    #[serde(default)]
    pub creativity_bonus: bool,
    #[serde(default)]
    pub placement: Option<Placement>,
    /// Explicit score that overrides the formula
    #[serde(default)]
    pub final_score: Option<i64>,
}

fn non_negative(field: &'static str, value: i64) -> Result<u32, ScoreError> {
    if value < 0 {
        return Err(ScoreError::Negative { field, value });
    }
    u32::try_from(value).map_err(|_| ScoreError::TimeOutOfRange(value))
}

impl GameResult {
    /// Validate and turn into a completed record for `name`.
    pub fn into_record(self, name: GameName, completed_at: String) -> Result<GameRecord, ScoreError> {
        let time = non_negative("time", self.time_seconds)?;
        let penalties = non_negative("penalty count", self.penalty_count)?;
        let explicit = self
            .final_score
            .map(|s| non_negative("final score", s))
            .transpose()?;

        let rule = name.rule();
        let (time, details) = match rule {
            ScoringRule::Placement => {
                let placement = self.placement.ok_or(ScoreError::MissingPlacement(name))?;
                let details = GameDetails {
                    creativity_bonus: self.creativity_bonus,
                    winner_status: Some(placement),
                    final_score: explicit,
                    ..Default::default()
                };
                (0, details)
            }
            ScoringRule::Timed | ScoringRule::TimedWithPenalties => {
                if time == 0 || i64::from(time) > MAX_ENTRY_SECONDS {
                    return Err(ScoreError::TimeOutOfRange(self.time_seconds));
                }
                let penalty_seconds = if rule == ScoringRule::TimedWithPenalties {
                    penalties
                } else {
                    0
                };
                let details = GameDetails {
                    penalty_seconds,
                    final_score: explicit,
                    ..Default::default()
                };
                (time, details)
            }
        };

        let mut record = GameRecord {
            name,
            completed: true,
            time,
            details: Some(details),
            completed_at: Some(completed_at),
            edit: EditState::Normal,
        };
        let score = record.final_score()?;
        if let Some(details) = record.details.as_mut() {
            details.bonus_seconds = i64::from(score) - i64::from(time);
        }
        Ok(record)
    }
}

impl GameRecord {
    /// Adjusted time used for ranking.
    ///
    /// Incomplete games score 0, whatever their details say. Otherwise an
    /// explicit `details.finalScore` wins over the game's rule.
    pub fn final_score(&self) -> Result<u32, ScoreError> {
        if !self.completed {
            return Ok(0);
        }
        let details = self.details.as_ref();
        if let Some(explicit) = details.and_then(|d| d.final_score) {
            return Ok(explicit);
        }

        match self.name.rule() {
            ScoringRule::Timed => Ok(self.time),
            ScoringRule::TimedWithPenalties => {
                let count = details.map(|d| d.penalty_seconds).unwrap_or(0);
                Ok(self
                    .time
                    .saturating_add(count.saturating_mul(SECONDS_PER_INFRACTION)))
            }
            ScoringRule::Placement => {
                let placement = details
                    .and_then(|d| d.winner_status)
                    .ok_or(ScoreError::MissingPlacement(self.name))?;
                let creative = details.map(|d| d.creativity_bonus).unwrap_or(false);
                let malus = if creative { CREATIVITY_BONUS_SECONDS } else { 0 };
                Ok(placement.bonus_seconds().saturating_sub(malus))
            }
        }
    }
}
