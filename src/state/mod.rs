mod edit;
mod leaderboard;
mod marshal;
mod reveal;
mod score;
mod settings;
mod team;

pub use edit::{EditAction, InvalidTransition};
pub use leaderboard::{
    all_complete, place_label, rank, reveal_available, standings, summarize, Dashboard,
    GameSummary, LeaderboardStats, PendingEdit, RankedTeam, Standings, TeamSummary,
};
pub use marshal::{LoginResponse, RegisterRequest};
pub use reveal::{RevealError, RevealSequencer, RevealStep, RevealView};
pub use score::{GameResult, ScoreError};
pub use team::display_name;

use crate::broadcast::{ChannelBus, EventBus};
use crate::error::{CoreError, CoreResult};
use crate::protocol::LiveEvent;
use crate::store::{self, keys, MemoryStore, Store};
use crate::types::*;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::RwLock;

/// Default fallback polling interval for sessions without a live channel
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Shared application state
///
/// Holds no scoring data itself: the store is authoritative and every
/// operation is a whole-record read-modify-write against it.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    /// Fan-out of live events to connected sessions
    pub bus: Arc<dyn EventBus>,
    /// Interval for sessions that lost (or never had) the live channel
    pub poll_interval: Duration,
    /// Marshal session tokens -> username
    pub sessions: Arc<RwLock<HashMap<String, Username>>>,
    /// Digest of the last record this process wrote per team key, `None`
    /// after a delete. The store watcher skips changes that match.
    own_team_writes: Arc<Mutex<HashMap<String, Option<String>>>>,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, bus: Arc<dyn EventBus>) -> Self {
        Self {
            store,
            bus,
            poll_interval: DEFAULT_POLL_INTERVAL,
            sessions: Arc::new(RwLock::new(HashMap::new())),
            own_team_writes: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn with_store(store: Arc<dyn Store>) -> Self {
        Self::new(store, Arc::new(ChannelBus::new(100)))
    }

    /// Ephemeral state for tests and demo runs
    pub fn in_memory() -> Self {
        Self::with_store(Arc::new(MemoryStore::new()))
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Publish after a successful write. Having no subscribers is fine.
    pub fn publish(&self, event: LiveEvent) {
        let delivered = self.bus.publish(event.clone());
        tracing::debug!("Published {:?} to {} sessions", event, delivered);
    }

    fn note_team_write(&self, key: &str, digest: Option<String>) {
        self.own_team_writes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), digest);
    }

    /// Per-key digests of this process's latest team writes
    pub fn own_team_writes(&self) -> HashMap<String, Option<String>> {
        self.own_team_writes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Load and validate a team, returning the raw stored value alongside
    /// for compare-and-swap.
    pub(crate) async fn load_team(&self, username: &str) -> CoreResult<(TeamRecord, Value)> {
        let key = keys::team(username);
        let raw = self
            .store
            .get(&key)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("team {username}")))?;
        let team = decode_team(&key, raw.clone())?;
        Ok((team, raw))
    }

    /// Overwrite a team record (last write wins).
    pub async fn save_team(&self, team: &TeamRecord) -> CoreResult<()> {
        let key = keys::team(&team.username);
        let record = store::to_record(team)?;
        self.note_team_write(&key, Some(store::digest(&record)));
        self.store.put(&key, record).await?;
        Ok(())
    }

    /// Remove a team record, returning whether it existed.
    pub(crate) async fn delete_team(&self, username: &str) -> CoreResult<bool> {
        let key = keys::team(username);
        self.note_team_write(&key, None);
        Ok(self.store.delete(&key).await?)
    }

    /// Like [`save_team`](Self::save_team) but only if the stored value is
    /// still `expected`.
    pub(crate) async fn swap_team(&self, team: &TeamRecord, expected: &Value) -> CoreResult<()> {
        let key = keys::team(&team.username);
        let record = store::to_record(team)?;
        self.note_team_write(&key, Some(store::digest(&record)));
        if !self.store.compare_and_put(&key, expected, record).await? {
            tracing::warn!("Compare-and-swap lost on {}", key);
            return Err(CoreError::Conflict { key });
        }
        Ok(())
    }

    /// All teams, in registration order.
    ///
    /// Malformed records are logged and left out rather than coerced.
    pub async fn list_teams(&self) -> CoreResult<Vec<TeamRecord>> {
        let mut teams = Vec::new();
        for key in self.store.list_keys(keys::TEAM_PREFIX).await? {
            let Some(raw) = self.store.get(&key).await? else {
                // Deleted between list and get
                continue;
            };
            match decode_team(&key, raw) {
                Ok(team) => teams.push(team),
                Err(e) => tracing::warn!("Skipping team record {}: {}", key, e),
            }
        }
        teams.sort_by(|a, b| {
            a.registered_at
                .cmp(&b.registered_at)
                .then_with(|| a.username.cmp(&b.username))
        });
        Ok(teams)
    }

    pub async fn team_summaries(&self) -> CoreResult<Vec<TeamSummary>> {
        let teams = self.list_teams().await?;
        let mut summaries = Vec::with_capacity(teams.len());
        for team in &teams {
            summaries.push(TeamSummary::try_from(team)?);
        }
        Ok(summaries)
    }
}

fn decode_team(key: &str, raw: Value) -> CoreResult<TeamRecord> {
    let team: TeamRecord = store::from_record(key, raw).map_err(CoreError::Validation)?;
    team.validate()?;
    Ok(team)
}

/// RFC 3339 timestamp for stored records
pub(crate) fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}
