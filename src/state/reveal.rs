//! Staged results reveal, driven by one admin session.
//!
//! The ranking is frozen when the splash screen opens; later team changes
//! are not seen until the sequence restarts. The sequencer lives in the
//! admin's session, so a reconnect starts over at `Idle`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{reveal_available, rank, AppState, RankedTeam, TeamSummary};
use crate::error::CoreResult;
use crate::types::AdminSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "camelCase")]
pub enum RevealStep {
    #[default]
    Idle,
    Splash,
    /// Index into the frozen ranking; counts down to 0 (the winner)
    TeamReveal { index: usize },
    Final,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RevealError {
    #[error("results cannot be shown yet: {0}")]
    NotAvailable(&'static str),
    #[error("cannot advance from {0:?}")]
    CannotAdvance(RevealStep),
    #[error("reveal can only be finished from the final screen (currently {0:?})")]
    NotFinal(RevealStep),
}

/// What the admin screen renders for the current step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevealView {
    pub step: RevealStep,
    pub team: Option<RankedTeam>,
    /// Label of the advance button, if there is one
    pub button_label: Option<String>,
    pub total_teams: usize,
}

#[derive(Debug, Clone, Default)]
pub struct RevealSequencer {
    step: RevealStep,
    snapshot: Vec<RankedTeam>,
}

impl RevealSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn step(&self) -> RevealStep {
        self.step
    }

    /// Open the splash screen and freeze the ranking.
    ///
    /// Starting again mid-sequence restarts from the splash.
    pub fn start(
        &mut self,
        teams: &[TeamSummary],
        settings: &AdminSettings,
    ) -> Result<RevealView, RevealError> {
        if !reveal_available(teams, settings) {
            let reason = if settings.results_revealed {
                "results were already revealed"
            } else if teams.is_empty() {
                "no teams registered"
            } else {
                "not every team has completed all games"
            };
            return Err(RevealError::NotAvailable(reason));
        }
        self.snapshot = rank(teams);
        self.step = RevealStep::Splash;
        tracing::info!("Reveal started for {} teams", self.snapshot.len());
        Ok(self.view())
    }

    /// Advance one step: splash, last place, ..., winner, final.
    pub fn next(&mut self) -> Result<RevealView, RevealError> {
        self.step = match self.step {
            RevealStep::Splash => match self.snapshot.len() {
                0 => RevealStep::Final,
                n => RevealStep::TeamReveal { index: n - 1 },
            },
            RevealStep::TeamReveal { index: 0 } => RevealStep::Final,
            RevealStep::TeamReveal { index } => RevealStep::TeamReveal { index: index - 1 },
            step @ (RevealStep::Idle | RevealStep::Final) => {
                return Err(RevealError::CannotAdvance(step))
            }
        };
        Ok(self.view())
    }

    /// Check the sequence may be finished. Persisting the flag happens
    /// between this and [`finish`](Self::finish).
    pub fn check_finish(&self) -> Result<(), RevealError> {
        match self.step {
            RevealStep::Final => Ok(()),
            step => Err(RevealError::NotFinal(step)),
        }
    }

    /// Back to idle. Only call after `resultsRevealed` was persisted.
    pub fn finish(&mut self) -> Result<RevealView, RevealError> {
        self.check_finish()?;
        self.step = RevealStep::Idle;
        self.snapshot.clear();
        Ok(self.view())
    }

    pub fn view(&self) -> RevealView {
        let team = match self.step {
            RevealStep::TeamReveal { index } => self.snapshot.get(index).cloned(),
            RevealStep::Final => self.snapshot.first().cloned(),
            _ => None,
        };
        let button_label = match self.step {
            RevealStep::Idle => None,
            RevealStep::Splash => Some("Next"),
            RevealStep::TeamReveal { index: 0 } | RevealStep::Final => Some("Finish"),
            RevealStep::TeamReveal { .. } => Some("Next"),
        };
        RevealView {
            step: self.step,
            team,
            button_label: button_label.map(str::to_string),
            total_teams: self.snapshot.len(),
        }
    }
}

impl AppState {
    pub async fn start_reveal(&self, sequencer: &mut RevealSequencer) -> CoreResult<RevealView> {
        let teams = self.team_summaries().await?;
        let settings = self.get_settings().await?;
        Ok(sequencer.start(&teams, &settings)?)
    }

    /// Persist `resultsRevealed` and return the sequencer to idle.
    ///
    /// On a storage failure the sequencer stays on the final screen.
    pub async fn finish_reveal(&self, sequencer: &mut RevealSequencer) -> CoreResult<RevealView> {
        sequencer.check_finish()?;
        self.save_settings(true).await?;
        Ok(sequencer.finish()?)
    }
}
