use crate::protocol::LiveEvent;
use crate::state::AppState;
use crate::store::{self, keys};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;

/// Pub/sub fan-out for live events.
///
/// At-most-once and best effort: a session that is not subscribed when an
/// event is published never sees it.
pub trait EventBus: Send + Sync {
    /// Returns how many subscribers the event reached.
    fn publish(&self, event: LiveEvent) -> usize;

    /// `None` when the channel is down; callers fall back to polling.
    fn subscribe(&self) -> Option<broadcast::Receiver<LiveEvent>>;
}

/// In-process bus on a tokio broadcast channel
pub struct ChannelBus {
    capacity: usize,
    tx: Mutex<Option<broadcast::Sender<LiveEvent>>>,
}

impl ChannelBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self {
            capacity: capacity.max(1),
            tx: Mutex::new(Some(tx)),
        }
    }

    fn sender(&self) -> std::sync::MutexGuard<'_, Option<broadcast::Sender<LiveEvent>>> {
        self.tx.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Drop the channel. Current subscribers see it close.
    pub fn disconnect(&self) {
        if self.sender().take().is_some() {
            tracing::warn!("Live channel disconnected");
        }
    }

    /// Open a fresh channel after [`disconnect`](Self::disconnect).
    pub fn reconnect(&self) {
        let mut tx = self.sender();
        if tx.is_none() {
            let (new_tx, _rx) = broadcast::channel(self.capacity);
            *tx = Some(new_tx);
            tracing::info!("Live channel reconnected");
        }
    }
}

impl EventBus for ChannelBus {
    fn publish(&self, event: LiveEvent) -> usize {
        match self.sender().as_ref() {
            // Ignore send errors (no receivers connected is fine)
            Some(tx) => tx.send(event).unwrap_or(0),
            None => 0,
        }
    }

    fn subscribe(&self) -> Option<broadcast::Receiver<LiveEvent>> {
        self.sender().as_ref().map(|tx| tx.subscribe())
    }
}

/// Digest per team key, for change detection
async fn snapshot_teams(
    state: &AppState,
) -> Result<BTreeMap<String, String>, crate::store::StoreError> {
    let mut snapshot = BTreeMap::new();
    for key in state.store.list_keys(keys::TEAM_PREFIX).await? {
        if let Some(record) = state.store.get(&key).await? {
            snapshot.insert(key, store::digest(&record));
        }
    }
    Ok(snapshot)
}

/// Keys that changed between two snapshots in a way this process did not write.
fn out_of_band_changes(
    previous: &BTreeMap<String, String>,
    current: &BTreeMap<String, String>,
    own_writes: &HashMap<String, Option<String>>,
) -> Vec<String> {
    previous
        .keys()
        .chain(current.keys().filter(|k| !previous.contains_key(*k)))
        .filter(|key| previous.get(*key) != current.get(*key))
        .filter(|key| own_writes.get(*key) != Some(&current.get(*key).cloned()))
        .cloned()
        .collect()
}

/// Spawn a background task that notices team records changed outside this
/// process (another instance on the same store) and publishes `liveUpdate`.
pub fn spawn_store_watcher(state: Arc<AppState>, every: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut last: Option<BTreeMap<String, String>> = None;
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            interval.tick().await;

            let snapshot = match snapshot_teams(&state).await {
                Ok(s) => s,
                Err(e) => {
                    tracing::warn!("Store watcher could not read teams: {}", e);
                    continue;
                }
            };

            if let Some(previous) = &last {
                // Our own writes already published their events
                let own_writes = state.own_team_writes();
                let changed = out_of_band_changes(previous, &snapshot, &own_writes);
                if !changed.is_empty() {
                    tracing::info!("Team records changed out-of-band: {:?}", changed);
                    state.publish(LiveEvent::LiveUpdate {
                        team_id: None,
                        completed_games: None,
                        message: "Scores updated".to_string(),
                    });
                }
            }
            last = Some(snapshot);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TeamRecord;

    #[tokio::test]
    async fn test_publish_without_subscribers() {
        let bus = ChannelBus::new(8);
        assert_eq!(
            bus.publish(LiveEvent::GamesReset {
                message: "x".into()
            }),
            0
        );
    }

    #[tokio::test]
    async fn test_disconnect_closes_subscribers() {
        let bus = ChannelBus::new(8);
        let mut rx = bus.subscribe().unwrap();

        bus.disconnect();
        assert!(bus.subscribe().is_none());
        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Closed)
        ));

        bus.reconnect();
        let mut rx = bus.subscribe().unwrap();
        assert_eq!(
            bus.publish(LiveEvent::GamesReset {
                message: "x".into()
            }),
            1
        );
        assert!(rx.recv().await.is_ok());
    }

    #[tokio::test]
    async fn test_store_watcher_reports_out_of_band_writes() {
        let state = Arc::new(AppState::in_memory());
        state
            .save_team(&TeamRecord::new("a", "A", "2026-05-01T10:00:00Z".into()))
            .await
            .unwrap();
        let mut rx = state.bus.subscribe().unwrap();
        let watcher = spawn_store_watcher(state.clone(), Duration::from_millis(20));

        // Let the watcher take its baseline
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(rx.try_recv().is_err());

        // Write behind AppState's back
        let other = TeamRecord::new("b", "B", "2026-05-01T10:01:00Z".into());
        state
            .store
            .put(&keys::team("b"), serde_json::to_value(&other).unwrap())
            .await
            .unwrap();

        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("watcher did not publish")
            .unwrap();
        assert!(matches!(event, LiveEvent::LiveUpdate { team_id: None, .. }));
        watcher.abort();
    }

    #[tokio::test]
    async fn test_store_watcher_sees_foreign_write_next_to_own_write() {
        let state = Arc::new(AppState::in_memory());
        state
            .save_team(&TeamRecord::new("a", "A", "2026-05-01T10:00:00Z".into()))
            .await
            .unwrap();
        let mut rx = state.bus.subscribe().unwrap();
        let watcher = spawn_store_watcher(state.clone(), Duration::from_millis(50));
        tokio::time::sleep(Duration::from_millis(150)).await;

        // Both land within one interval
        let mut own = TeamRecord::new("a", "A", "2026-05-01T10:00:00Z".into());
        own.team_name = "Ours".into();
        state.save_team(&own).await.unwrap();
        let foreign = TeamRecord::new("b", "B", "2026-05-01T10:01:00Z".into());
        state
            .store
            .put(&keys::team("b"), serde_json::to_value(&foreign).unwrap())
            .await
            .unwrap();

        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("watcher did not publish")
            .unwrap();
        assert!(matches!(event, LiveEvent::LiveUpdate { team_id: None, .. }));
        watcher.abort();
    }

    #[test]
    fn test_own_writes_are_not_out_of_band() {
        let previous = BTreeMap::from([
            ("team:a".to_string(), "1".to_string()),
            ("team:gone".to_string(), "2".to_string()),
        ]);
        let current = BTreeMap::from([
            ("team:a".to_string(), "3".to_string()),
            ("team:new".to_string(), "4".to_string()),
        ]);

        let own = HashMap::from([
            ("team:a".to_string(), Some("3".to_string())),
            ("team:gone".to_string(), None),
            ("team:new".to_string(), Some("4".to_string())),
        ]);
        assert!(out_of_band_changes(&previous, &current, &own).is_empty());

        // Someone else overwrote our last write to team:a
        let own = HashMap::from([
            ("team:a".to_string(), Some("9".to_string())),
            ("team:gone".to_string(), None),
        ]);
        assert_eq!(
            out_of_band_changes(&previous, &current, &own),
            vec!["team:a".to_string(), "team:new".to_string()]
        );
        assert!(out_of_band_changes(&current, &current, &HashMap::new()).is_empty());
    }
}
