//! World events that periodically damage every player of a session.

use super::ticker;
use crate::cache::{CacheLobbySetEntry, EventKind, NetworkingCache, SessionEvent};
use crate::config::EventSettings;
use crate::error::ServerError;
use log::{debug, info};
use rand::Rng;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Chooses which event, if any, starts next.
pub trait EventSelector: Send + Sync {
    fn select(&self) -> Option<EventKind>;
}

/// Uniform choice among all event kinds and no event at all.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomEventSelector;

impl EventSelector for RandomEventSelector {
    fn select(&self) -> Option<EventKind> {
        let index = rand::thread_rng().gen_range(0..=EventKind::ALL.len());
        EventKind::ALL.get(index).copied()
    }
}

/// Always returns the same choice.
#[derive(Debug, Clone, Copy)]
pub struct FixedEventSelector(pub Option<EventKind>);

impl EventSelector for FixedEventSelector {
    fn select(&self) -> Option<EventKind> {
        self.0
    }
}

pub struct EventEngine<S = RandomEventSelector> {
    cache: Arc<NetworkingCache>,
    settings: EventSettings,
    period: Duration,
    selector: S,
}

impl<S: EventSelector> EventEngine<S> {
    pub fn new(
        cache: Arc<NetworkingCache>,
        settings: EventSettings,
        period: Duration,
        selector: S,
    ) -> Self {
        Self {
            cache,
            settings,
            period,
            selector,
        }
    }

    pub async fn run(self) -> Result<(), ServerError> {
        info!("Event engine running every {:?}", self.period);
        let mut ticker = ticker(self.period);
        ticker.tick().await;

        loop {
            ticker.tick().await;
            self.tick().await?;
        }
    }

    pub async fn tick(&self) -> Result<usize, ServerError> {
        self.tick_at(Instant::now()).await
    }

    /// Advances every started session's event to `now`. Returns the number of
    /// player records that were hit.
    pub async fn tick_at(&self, now: Instant) -> Result<usize, ServerError> {
        let mut hits = 0;

        for (session_id, lobby_set) in self.cache.lobby_sets().mappings().await {
            if lobby_set.is_empty() {
                continue;
            }
            let Some(session) = self.cache.sessions().get(&session_id).await else {
                continue;
            };
            if !session.started {
                continue;
            }

            let due = {
                let mut events = self.cache.session_events().begin().await;
                let mut event = events.get(session.name.as_str()).unwrap_or_default();
                let due = self.advance(&mut event, now);
                events.add(session.name.clone(), event);
                events.commit();
                due
            };

            if let Some(kind) = due {
                let affected = self.hit(session_id, &lobby_set).await;
                debug!(
                    "{} hit {} players in session {}",
                    kind.name(),
                    affected,
                    session.name
                );
                hits += affected;
            }
        }

        Ok(hits)
    }

    /// Moves `event` forward to `now`, returning the kind whose hit is due.
    fn advance(&self, event: &mut SessionEvent, now: Instant) -> Option<EventKind> {
        if let (Some(kind), Some(end_time)) = (event.name, event.end_time) {
            if now >= end_time {
                info!("{} ended", kind.name());
                event.name = None;
                event.next_hit_time = None;
                event.pause_end_time = Some(end_time + self.settings.pause);
                return None;
            }

            return match event.next_hit_time {
                Some(next_hit) if now < next_hit => None,
                _ => {
                    event.next_hit_time = Some(now + self.settings.frequency);
                    Some(kind)
                }
            };
        }

        if event.pause_end_time.is_some_and(|pause_end| now < pause_end) {
            return None;
        }

        match self.selector.select() {
            Some(kind) => {
                info!("{} started", kind.name());
                event.name = Some(kind);
                event.end_time = Some(now + self.settings.duration);
                event.next_hit_time = Some(now + self.settings.frequency);
                event.pause_end_time = None;
                Some(kind)
            }
            None => {
                event.pause_end_time = Some(now + self.settings.pause);
                None
            }
        }
    }

    async fn hit(&self, session_id: i64, lobby_set: &[CacheLobbySetEntry]) -> usize {
        let mut metadata = self.cache.metadata().begin().await;
        let mut affected = 0;

        for entry in lobby_set {
            let Some(records) = metadata.get_mut(entry.issuer.as_str()) else {
                continue;
            };
            for record in records
                .iter_mut()
                .filter(|record| record.session_id == session_id && !record.eliminated)
            {
                record.apply_damage(self.settings.hit_rate);
                affected += 1;
            }
        }

        metadata.commit();
        affected
    }
}
