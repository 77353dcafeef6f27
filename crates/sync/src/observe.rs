//! Long-lived change stream observers.

use std::sync::Arc;

use kasse_core::{Id, ListItem};
use kasse_remote::{ChildEvent, RemoteStore};
use kasse_store::{ListCache, Mutation};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::ClubScope;

fn queue_cap() -> usize {
    std::env::var("KASSE_QUEUE_CAP").ok().and_then(|s| s.parse().ok()).unwrap_or(256)
}

/// Subscribe to the change stream of `T`'s list and fold every event into
/// the cache. Runs until the subscription ends (normally the session).
///
/// Events may race the snapshot the cache was loaded from; the cache's
/// idempotent upsert and no-op delete make replays and stale removes safe.
/// A malformed event payload is dropped; one bad push must not tear down
/// the stream.
pub fn spawn_observer<T: ListItem>(
    store: Arc<dyn RemoteStore>,
    scope: ClubScope,
    cache: Arc<ListCache<T>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let (tx, mut rx) = mpsc::channel(queue_cap());
        let path = scope.path(T::PATH);
        if let Err(error) = store.subscribe(&path, tx).await {
            warn!(list = T::PATH, %error, "subscribe failed");
            return;
        }
        info!(list = T::PATH, "observer armed");
        while let Some(event) = rx.recv().await {
            match decode_event::<T>(event) {
                Ok(mutation) => cache.apply(mutation),
                Err(error) => warn!(list = T::PATH, %error, "dropping malformed event"),
            }
        }
        debug!(list = T::PATH, "change stream ended");
    })
}

fn decode_event<T: ListItem>(event: ChildEvent) -> Result<Mutation<T>, serde_json::Error> {
    match event {
        ChildEvent::Added { key, payload } | ChildEvent::Changed { key, payload } => {
            let wire: T::Wire = serde_json::from_value(payload)?;
            Ok(Mutation::Upsert(T::from_wire(Id::new(key), wire)))
        }
        ChildEvent::Removed { key } => Ok(Mutation::Delete(Id::new(key))),
    }
}
