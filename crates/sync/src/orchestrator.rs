//! Session orchestration: multi-list bootstrap and observer lifecycle.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use futures::future::join_all;
use kasse_core::{Club, Fine, LatePaymentInterest, ListItem, Person, ReasonTemplate, Transaction};
use kasse_remote::RemoteStore;
use kasse_store::ListCache;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::change::Changer;
use crate::fetch::{fetch_club, fetch_late_payment_interest, fetch_list};
use crate::observe::spawn_observer;
use crate::{ClubScope, FetchError};

/// Lifecycle of the bootstrap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    NotStarted,
    Loading,
    Failed,
    Ready,
}

/// The four bootstrap-managed caches of one session, handed out by
/// reference so readers and writers share the same instances.
#[derive(Default)]
pub struct Caches {
    pub persons: Arc<ListCache<Person>>,
    pub fines: Arc<ListCache<Fine>>,
    pub reasons: Arc<ListCache<ReasonTemplate>>,
    pub transactions: Arc<ListCache<Transaction>>,
}

/// Owns the caches, the bootstrap and the change stream observers of one
/// club session.
pub struct SyncOrchestrator {
    store: Arc<dyn RemoteStore>,
    scope: ClubScope,
    caches: Caches,
    state: watch::Sender<ConnectionState>,
    observers: Mutex<Vec<JoinHandle<()>>>,
}

impl SyncOrchestrator {
    pub fn new(store: Arc<dyn RemoteStore>, scope: ClubScope) -> Self {
        let (state, _) = watch::channel(ConnectionState::default());
        Self { store, scope, caches: Caches::default(), state, observers: Mutex::new(Vec::new()) }
    }

    pub fn caches(&self) -> &Caches {
        &self.caches
    }

    pub fn scope(&self) -> &ClubScope {
        &self.scope
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Channel carrying every connection state transition.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// A mutator sharing this session's store and scope.
    pub fn changer(&self) -> Changer {
        Changer::new(Arc::clone(&self.store), self.scope.clone())
    }

    /// Fetch every list, wait for all outcomes, then resolve to `Ready` or
    /// `Failed` exactly once. Already-loaded caches are skipped, so a retry
    /// after partial failure only refetches what is missing. A concurrent
    /// bootstrap is a no-op returning the in-flight `Loading` state.
    pub async fn bootstrap(&self) -> ConnectionState {
        let mut started = false;
        self.state.send_if_modified(|state| {
            if *state == ConnectionState::Loading {
                return false;
            }
            started = true;
            *state = ConnectionState::Loading;
            true
        });
        if !started {
            return ConnectionState::Loading;
        }

        let begin = Instant::now();
        let loads: Vec<Pin<Box<dyn Future<Output = bool> + Send + '_>>> = vec![
            Box::pin(self.load_list(&self.caches.persons)),
            Box::pin(self.load_list(&self.caches.fines)),
            Box::pin(self.load_list(&self.caches.reasons)),
            Box::pin(self.load_list(&self.caches.transactions)),
        ];
        let outcomes = join_all(loads).await;

        let next = if outcomes.iter().all(|ok| *ok) {
            self.arm_observers();
            ConnectionState::Ready
        } else {
            ConnectionState::Failed
        };
        info!(state = ?next, took_ms = %begin.elapsed().as_millis(), "bootstrap finished");
        self.state.send_replace(next);
        next
    }

    async fn load_list<T: ListItem>(&self, cache: &ListCache<T>) -> bool {
        if cache.is_loaded() {
            return true;
        }
        match fetch_list::<T>(self.store.as_ref(), &self.scope).await {
            Ok(items) => {
                info!(list = T::PATH, count = items.len(), "list loaded");
                cache.mark_loaded(items);
                true
            }
            Err(err) => {
                error!(list = T::PATH, error = %err, "list load failed");
                false
            }
        }
    }

    /// Arm one observer per list. Idempotent across re-bootstraps: armed
    /// observers stay; they are aborted only on drop.
    fn arm_observers(&self) {
        let mut observers = self.observers.lock().unwrap();
        if !observers.is_empty() {
            return;
        }
        observers.push(spawn_observer(
            Arc::clone(&self.store),
            self.scope.clone(),
            Arc::clone(&self.caches.persons),
        ));
        observers.push(spawn_observer(
            Arc::clone(&self.store),
            self.scope.clone(),
            Arc::clone(&self.caches.fines),
        ));
        observers.push(spawn_observer(
            Arc::clone(&self.store),
            self.scope.clone(),
            Arc::clone(&self.caches.reasons),
        ));
        observers.push(spawn_observer(
            Arc::clone(&self.store),
            self.scope.clone(),
            Arc::clone(&self.caches.transactions),
        ));
    }

    /// The scoped club's properties; fetched on demand, not cached.
    pub async fn club(&self) -> Result<Club, FetchError> {
        fetch_club(self.store.as_ref(), &self.scope).await
    }

    pub async fn late_payment_interest(&self) -> Result<Option<LatePaymentInterest>, FetchError> {
        fetch_late_payment_interest(self.store.as_ref(), &self.scope).await
    }
}

impl Drop for SyncOrchestrator {
    fn drop(&mut self) {
        for observer in self.observers.lock().unwrap().drain(..) {
            observer.abort();
        }
    }
}
