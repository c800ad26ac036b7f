//! Periodic reconciliation between the networking cache and storage.
//!
//! Each worker owns one infinite loop. A tick error ends the loop and is
//! returned from `run`, leaving the decision to stop the process to the
//! caller.

mod activity;
mod dashboards;
mod events;
mod sync;

pub use activity::ActivitySync;
pub use dashboards::DashboardsSync;
pub use events::{EventEngine, EventSelector, FixedEventSelector, RandomEventSelector};
pub use sync::RepositorySync;

use crate::error::ServerError;
use crate::readthrough;
use crate::repository::{LobbyUpsert, Repository};
use log::{debug, warn};
use std::collections::BTreeSet;
use std::time::Duration;
use tokio::time::{interval, Interval, MissedTickBehavior};

/// Interval whose next tick is scheduled only after the previous one completed.
fn ticker(period: Duration) -> Interval {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlushMode {
    /// Every persisted field.
    Full,
    /// Health, elimination and position only.
    Activity,
}

/// Writes a snapshot of the metadata segment to the lobbies table.
///
/// The snapshot is taken under the metadata transaction and written after
/// it is released. Records of sessions that no longer exist are skipped.
/// Returns the number of records written.
async fn flush_metadata(repository: &Repository, mode: FlushMode) -> Result<usize, ServerError> {
    let snapshot = repository.cache().metadata().mappings().await;
    let mut written = 0;
    let mut flushed_sessions = BTreeSet::new();

    for (issuer, records) in snapshot {
        let user_id = readthrough::resolve_user_id(repository, &issuer).await?;
        for record in &records {
            match readthrough::session(repository, record.session_id).await {
                Ok(_) => {}
                Err(ServerError::SessionNotFound(id)) => {
                    warn!("Skipping record of {} for removed session {}", issuer, id);
                    continue;
                }
                Err(e) => return Err(e),
            }

            let upsert = match mode {
                FlushMode::Full => LobbyUpsert::full(user_id, record),
                FlushMode::Activity => LobbyUpsert::activity(user_id, record),
            };
            if let Err(e) = repository.lobbies().insert_or_update(upsert).await {
                // The session may have been deleted after the check above.
                if repository.sessions().get_by_id(record.session_id).await?.is_none() {
                    warn!(
                        "Skipping record of {} for removed session {}",
                        issuer, record.session_id
                    );
                    continue;
                }
                return Err(e);
            }
            written += 1;
            flushed_sessions.insert(record.session_id);
        }
    }

    // Lobby writes evict the lobby sets of the flushed sessions.
    for session_id in flushed_sessions {
        match readthrough::lobby_set(repository, session_id).await {
            Ok(_) | Err(ServerError::LobbySetNotFound(_)) => {}
            Err(e) => return Err(e),
        }
    }

    debug!("Flushed {} metadata records ({:?})", written, mode);
    Ok(written)
}
