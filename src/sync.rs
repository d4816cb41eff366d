//! Live sync for one session: push when the channel is up, polling when not.
//!
//! Correctness never depends on the channel. Every event that matters
//! makes the session refetch from the store, and a session without a
//! channel refetches on a fixed interval instead.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::{Instant, Interval, MissedTickBehavior};

use crate::broadcast::EventBus;
use crate::protocol::LiveEvent;
use crate::types::Role;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    Push,
    Poll,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedItem {
    Event(LiveEvent),
    /// State may have changed without an event; refetch everything
    Resync,
}

pub struct LiveFeed {
    bus: Arc<dyn EventBus>,
    rx: Option<broadcast::Receiver<LiveEvent>>,
    poll: Option<Interval>,
    poll_interval: Duration,
}

impl LiveFeed {
    /// Subscribe, falling back to polling if the channel is down.
    pub fn connect(bus: Arc<dyn EventBus>, poll_interval: Duration) -> Self {
        let rx = bus.subscribe();
        let mut feed = Self {
            bus,
            rx,
            poll: None,
            poll_interval,
        };
        if feed.rx.is_none() {
            tracing::warn!("Live channel unavailable, polling every {:?}", poll_interval);
            feed.start_polling();
        }
        feed
    }

    pub fn mode(&self) -> SyncMode {
        if self.rx.is_some() {
            SyncMode::Push
        } else {
            SyncMode::Poll
        }
    }

    fn start_polling(&mut self) {
        let mut interval =
            tokio::time::interval_at(Instant::now() + self.poll_interval, self.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.poll = Some(interval);
    }

    /// Wait for the next thing the session must handle. Cancel safe.
    pub async fn next(&mut self) -> FeedItem {
        if let Some(rx) = self.rx.as_mut() {
            return match rx.recv().await {
                Ok(event) => FeedItem::Event(event),
                Err(RecvError::Lagged(missed)) => {
                    tracing::warn!("Session lagged, {} events dropped; resyncing", missed);
                    FeedItem::Resync
                }
                Err(RecvError::Closed) => {
                    tracing::warn!("Live channel closed, falling back to polling");
                    self.rx = None;
                    self.start_polling();
                    FeedItem::Resync
                }
            };
        }

        if self.poll.is_none() {
            self.start_polling();
        }
        if let Some(poll) = self.poll.as_mut() {
            poll.tick().await;
        }
        if let Some(rx) = self.bus.subscribe() {
            tracing::info!("Live channel back, leaving polling mode");
            self.rx = Some(rx);
            self.poll = None;
        }
        FeedItem::Resync
    }
}

/// What a session does in response to an event
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Reaction {
    /// Pass the event on to the client
    pub forward: bool,
    /// Fetch a fresh snapshot
    pub refetch: bool,
    /// End the session
    pub logout: bool,
}

/// Decide how a session with `role` (and `username`, for marshals) reacts.
///
/// Unknown events get no reaction at all.
pub fn react(role: Role, username: Option<&str>, event: &LiveEvent) -> Reaction {
    let mine = |team_id: &str| username == Some(team_id);
    let forward = Reaction {
        forward: true,
        ..Reaction::default()
    };
    let refetch = Reaction {
        forward: true,
        refetch: true,
        logout: false,
    };

    match (role, event) {
        (_, LiveEvent::Unknown) => Reaction::default(),

        (Role::Admin, LiveEvent::GamesReset { .. }) => forward,
        (Role::Admin, LiveEvent::MarshalDeleted { .. }) => forward,
        (Role::Admin, _) => refetch,

        (Role::Marshal, LiveEvent::GamesReset { .. }) => Reaction {
            forward: true,
            refetch: false,
            logout: true,
        },
        (Role::Marshal, LiveEvent::MarshalDeleted { username: target, .. }) => {
            if mine(target) {
                Reaction {
                    forward: true,
                    refetch: false,
                    logout: true,
                }
            } else {
                Reaction::default()
            }
        }
        (
            Role::Marshal,
            LiveEvent::EditRequested { team_id, .. }
            | LiveEvent::EditAllowed { team_id, .. }
            | LiveEvent::EditPending { team_id, .. }
            | LiveEvent::EditAccepted { team_id, .. },
        ) => {
            if mine(team_id) {
                refetch
            } else {
                Reaction::default()
            }
        }
        (Role::Marshal, LiveEvent::LiveUpdate { team_id, .. }) => match team_id {
            Some(id) if !mine(id) => Reaction::default(),
            _ => refetch,
        },
        (Role::Marshal, _) => Reaction::default(),

        (
            Role::Audience,
            LiveEvent::LiveUpdate { .. }
            | LiveEvent::EditAccepted { .. }
            | LiveEvent::NewMarshal { .. }
            | LiveEvent::AdminSettingsUpdate { .. },
        ) => refetch,
        (Role::Audience, _) => Reaction::default(),
    }
}
