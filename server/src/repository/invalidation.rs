//! Cache maintenance run after repository access.

use crate::cache::{CacheMetadata, NetworkingCache, Transaction};
use crate::entity::user;
use log::debug;

/// Drops the views of a session row and of its issuer's session list.
pub(super) async fn session_changed(cache: &NetworkingCache, session_id: i64, issuer_name: &str) {
    let mut sessions = cache.sessions().begin().await;
    sessions.evict(&session_id);
    sessions.commit();

    let mut user_sessions = cache.user_sessions().begin().await;
    user_sessions.evict(issuer_name);
    user_sessions.commit();

    debug!(
        "Invalidated session {} and session list of {}",
        session_id, issuer_name
    );
}

/// Drops the whole lobby set of a session.
pub(super) async fn lobby_changed(cache: &NetworkingCache, session_id: i64) {
    let mut lobby_sets = cache.lobby_sets().begin().await;
    lobby_sets.evict(&session_id);
    lobby_sets.commit();

    debug!("Invalidated lobby set of session {}", session_id);
}

/// Drops every live view of a deleted session, including the metadata records
/// of its players so no worker writes them back.
pub(super) async fn session_removed(cache: &NetworkingCache, session_id: i64, session_name: &str) {
    let purged = {
        let mut metadata = cache.metadata().begin().await;
        let purged = purge_metadata(&mut metadata, |record| record.session_id == session_id);
        metadata.commit();
        purged
    };

    cache.generated_chests().evict(session_name).await;
    cache.generated_health_packs().evict(session_name).await;
    cache.session_events().evict(session_name).await;

    debug!(
        "Dropped live state of session {} ({} metadata records)",
        session_id, purged
    );
}

/// Drops the metadata record of a deleted lobby.
pub(super) async fn lobby_removed(cache: &NetworkingCache, lobby_id: i64) {
    let mut metadata = cache.metadata().begin().await;
    purge_metadata(&mut metadata, |record| record.lobby_id == lobby_id);
    metadata.commit();
}

/// Removes matching records, evicting issuers left with none.
fn purge_metadata<F>(
    metadata: &mut Transaction<'_, String, Vec<CacheMetadata>>,
    stale: F,
) -> usize
where
    F: Fn(&CacheMetadata) -> bool,
{
    let mut purged = 0;
    metadata.retain(|_, records| {
        let before = records.len();
        records.retain(|record| !stale(record));
        purged += before - records.len();
        !records.is_empty()
    });
    purged
}

pub(super) async fn user_loaded(cache: &NetworkingCache, user: &user::Model) {
    cache.users().add(user.name.clone(), user.id).await;
}
