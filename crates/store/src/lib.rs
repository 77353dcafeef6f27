//! Kasse store: the in-RAM caches the sync engine writes into and the
//! presentation layer reads from.
//!
//! One [`ListCache`] owns the authoritative local copy of one list type.
//! Readers get lock-free snapshots via arc-swap; the two writers (the change
//! stream observer and the optimistic mutator) serialize through a single
//! writer gate, so a reader always sees a fully applied state.

#![forbid(unsafe_code)]

use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;
use kasse_core::{Id, ListItem};
use tokio::sync::watch;
use tracing::debug;

/// Tri-state content of a cache: "never fetched" is distinct from
/// "fetched, zero items".
#[derive(Debug, Clone, PartialEq)]
pub enum ListState<T> {
    Unloaded,
    Loaded(Vec<T>),
}

impl<T> ListState<T> {
    pub fn is_loaded(&self) -> bool {
        matches!(self, ListState::Loaded(_))
    }

    pub fn items(&self) -> Option<&[T]> {
        match self {
            ListState::Loaded(items) => Some(items),
            ListState::Unloaded => None,
        }
    }
}

/// A single cache mutation. The only way list content changes after load.
#[derive(Debug, Clone)]
pub enum Mutation<T: ListItem> {
    Upsert(T),
    Delete(Id<T>),
}

/// Cache of one list type.
pub struct ListCache<T: ListItem> {
    state: ArcSwap<ListState<T>>,
    gate: Mutex<()>,
    epoch: watch::Sender<u64>,
}

impl<T: ListItem> Default for ListCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ListItem> ListCache<T> {
    pub fn new() -> Self {
        let (epoch, _) = watch::channel(0);
        Self { state: ArcSwap::from_pointee(ListState::Unloaded), gate: Mutex::new(()), epoch }
    }

    /// Current state; non-blocking, never partial.
    pub fn read(&self) -> Arc<ListState<T>> {
        self.state.load_full()
    }

    pub fn is_loaded(&self) -> bool {
        self.read().is_loaded()
    }

    /// Epoch channel bumped on every committed write; readers use it to
    /// learn when to re-read.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.epoch.subscribe()
    }

    /// Commit the initial snapshot. `Unloaded -> Loaded` exactly once; a
    /// cache that is already loaded keeps its content and ignores the call.
    pub fn mark_loaded(&self, items: Vec<T>) {
        let _gate = self.gate.lock().unwrap();
        if self.state.load().is_loaded() {
            debug!(list = T::PATH, "already loaded; snapshot ignored");
            return;
        }
        self.state.store(Arc::new(ListState::Loaded(items)));
        self.bump();
    }

    /// Apply one mutation. Before the snapshot has been committed this is a
    /// no-op: events racing the bootstrap are replayed by the transport
    /// after the observer is armed.
    ///
    /// `Upsert` replaces an existing item in place (keeping its position) or
    /// appends; `Delete` of an absent id does nothing, because remove events
    /// may race the snapshot fetch.
    pub fn apply(&self, mutation: Mutation<T>) {
        let _gate = self.gate.lock().unwrap();
        let mut items = match &**self.state.load() {
            ListState::Loaded(items) => items.clone(),
            ListState::Unloaded => {
                debug!(list = T::PATH, "mutation before load ignored");
                return;
            }
        };
        match mutation {
            Mutation::Upsert(item) => {
                match items.iter().position(|existing| existing.id() == item.id()) {
                    Some(index) => items[index] = item,
                    None => items.push(item),
                }
            }
            Mutation::Delete(id) => {
                items.retain(|existing| existing.id() != id);
            }
        }
        self.state.store(Arc::new(ListState::Loaded(items)));
        self.bump();
    }

    fn bump(&self) {
        self.epoch.send_modify(|epoch| *epoch += 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq)]
    struct Note {
        id: Id<Note>,
        text: String,
    }

    #[derive(Serialize, Deserialize)]
    struct NoteWire {
        text: String,
    }

    impl ListItem for Note {
        const PATH: &'static str = "notes";
        type Wire = NoteWire;

        fn id(&self) -> Id<Note> {
            self.id.clone()
        }

        fn from_wire(id: Id<Note>, wire: NoteWire) -> Self {
            Self { id, text: wire.text }
        }

        fn to_wire(&self) -> NoteWire {
            NoteWire { text: self.text.clone() }
        }
    }

    fn note(id: &str, text: &str) -> Note {
        Note { id: Id::new(id), text: text.into() }
    }

    fn items(cache: &ListCache<Note>) -> Vec<Note> {
        cache.read().items().expect("loaded").to_vec()
    }

    #[test]
    fn starts_unloaded_and_loads_once() {
        let cache = ListCache::new();
        assert_eq!(*cache.read(), ListState::<Note>::Unloaded);

        cache.mark_loaded(vec![note("A", "one")]);
        cache.mark_loaded(vec![note("B", "two"), note("C", "three")]);
        assert_eq!(items(&cache), vec![note("A", "one")]);
    }

    #[test]
    fn loaded_empty_is_distinct_from_unloaded() {
        let cache: ListCache<Note> = ListCache::new();
        cache.mark_loaded(Vec::new());
        assert_eq!(*cache.read(), ListState::Loaded(Vec::new()));
    }

    #[test]
    fn upsert_replaces_in_place_or_appends() {
        let cache = ListCache::new();
        cache.mark_loaded(vec![note("A", "one"), note("B", "two")]);

        cache.apply(Mutation::Upsert(note("A", "uno")));
        assert_eq!(items(&cache), vec![note("A", "uno"), note("B", "two")]);

        cache.apply(Mutation::Upsert(note("C", "three")));
        assert_eq!(items(&cache).len(), 3);
        assert_eq!(items(&cache)[2], note("C", "three"));
    }

    #[test]
    fn duplicate_upsert_keeps_length() {
        let cache = ListCache::new();
        cache.mark_loaded(vec![note("A", "one")]);
        cache.apply(Mutation::Upsert(note("A", "one")));
        cache.apply(Mutation::Upsert(note("A", "one")));
        assert_eq!(items(&cache).len(), 1);
    }

    #[test]
    fn delete_absent_id_is_a_no_op() {
        let cache = ListCache::new();
        cache.mark_loaded(vec![note("A", "one")]);
        cache.apply(Mutation::Delete(Id::new("MISSING")));
        assert_eq!(items(&cache).len(), 1);
    }

    #[test]
    fn last_write_wins_per_id() {
        let cache = ListCache::new();
        cache.mark_loaded(Vec::new());
        cache.apply(Mutation::Upsert(note("A", "one")));
        cache.apply(Mutation::Upsert(note("A", "two")));
        cache.apply(Mutation::Upsert(note("A", "three")));
        assert_eq!(items(&cache), vec![note("A", "three")]);

        cache.apply(Mutation::Delete(Id::new("A")));
        assert_eq!(items(&cache), Vec::<Note>::new());
    }

    #[test]
    fn mutation_before_load_is_ignored() {
        let cache = ListCache::new();
        cache.apply(Mutation::Upsert(note("A", "one")));
        assert_eq!(*cache.read(), ListState::<Note>::Unloaded);
    }

    #[test]
    fn epoch_bumps_on_every_commit() {
        let cache = ListCache::new();
        let rx = cache.subscribe();
        cache.mark_loaded(Vec::new());
        cache.apply(Mutation::Upsert(note("A", "one")));
        cache.apply(Mutation::Delete(Id::new("A")));
        assert_eq!(*rx.borrow(), 3);
    }
}
