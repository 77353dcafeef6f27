//! End-to-end engine tests against the in-memory remote store.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use kasse_core::{
    Fine, FineReason, Id, LatePaymentInterest, ListItem, PayedState, Period, PeriodUnit, Person,
    PersonName,
};
use kasse_remote::{MemoryStore, RemoteError, RemoteStore};
use kasse_store::ListCache;
use kasse_sync::{
    get_club_id, ClubScope, ConnectionState, Level, ListChange, SyncOrchestrator,
};
use serde_json::json;
use tokio::time::timeout;

fn fine_json() -> serde_json::Value {
    json!({
        "personId": "P1", "date": 1000, "number": 1,
        "payed": { "state": "unpayed" },
        "reason": { "templateId": "R1" }
    })
}

fn seeded_store() -> Arc<MemoryStore> {
    Arc::new(MemoryStore::with_tree(json!({
        "clubs": {
            "CLUB-1": {
                "name": "SG Kleinsendelbach",
                "identifier": "sgk",
                "regionCode": "DE",
                "persons": {
                    "P1": {
                        "name": { "first": "Max", "last": "Mustermann" },
                        "signInData": { "cashier": true, "userId": "u1", "signInDate": 500 }
                    }
                },
                "fines": { "F1": fine_json() },
                "reasons": { "R1": { "reason": "too late", "amount": 2.5, "importance": "high" } }
            }
        }
    })))
}

fn scope() -> ClubScope {
    ClubScope::new(Id::new("CLUB-1"), "key")
}

/// Wait until the cache satisfies `pred`, re-checking on every epoch bump.
async fn wait_for<T: ListItem>(cache: &ListCache<T>, mut pred: impl FnMut(&[T]) -> bool) {
    let mut epochs = cache.subscribe();
    timeout(Duration::from_secs(2), async {
        loop {
            if let Some(items) = cache.read().items() {
                if pred(items) {
                    return;
                }
            }
            epochs.changed().await.expect("cache dropped");
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test]
async fn bootstrap_loads_every_list() {
    let store = seeded_store();
    let engine = SyncOrchestrator::new(store, scope());
    assert_eq!(engine.connection_state(), ConnectionState::NotStarted);

    assert_eq!(engine.bootstrap().await, ConnectionState::Ready);

    let caches = engine.caches();
    assert_eq!(caches.persons.read().items().unwrap().len(), 1);
    assert_eq!(caches.fines.read().items().unwrap().len(), 1);
    assert_eq!(caches.reasons.read().items().unwrap().len(), 1);
    // No transactions in the tree: loaded and empty, not unloaded.
    assert_eq!(caches.transactions.read().items(), Some(&[][..]));
}

#[tokio::test]
async fn bootstrap_offline_fails_then_recovers() {
    let store = seeded_store();
    store.set_offline(true);
    let engine = SyncOrchestrator::new(store.clone(), scope());

    assert_eq!(engine.bootstrap().await, ConnectionState::Failed);
    assert!(!engine.caches().persons.is_loaded());

    store.set_offline(false);
    assert_eq!(engine.bootstrap().await, ConnectionState::Ready);
    assert!(engine.caches().persons.is_loaded());
}

#[tokio::test]
async fn bootstrap_retry_refetches_only_missing_lists() {
    let store = seeded_store();
    // One undecodable child fails the fines fetch; the other lists load.
    store.put_child("clubs/CLUB-1/fines", "F2", json!({ "bogus": true })).await;
    let engine = SyncOrchestrator::new(store.clone(), scope());

    assert_eq!(engine.bootstrap().await, ConnectionState::Failed);
    assert!(engine.caches().persons.is_loaded());
    assert!(!engine.caches().fines.is_loaded());

    store.put_child("clubs/CLUB-1/fines", "F2", fine_json()).await;
    assert_eq!(engine.bootstrap().await, ConnectionState::Ready);
    assert_eq!(engine.caches().fines.read().items().unwrap().len(), 2);
}

#[tokio::test]
async fn observers_fold_remote_events_into_caches() {
    let store = seeded_store();
    let engine = SyncOrchestrator::new(store.clone(), scope());
    engine.bootstrap().await;
    let persons = &engine.caches().persons;

    store
        .put_child("clubs/CLUB-1/persons", "P2", json!({ "name": { "first": "Eva" } }))
        .await;
    wait_for(persons, |items| items.len() == 2).await;

    store
        .put_child("clubs/CLUB-1/persons", "P1", json!({ "name": { "first": "Moritz" } }))
        .await;
    wait_for(persons, |items| {
        items.iter().any(|p| p.id == Id::new("P1") && p.name.first == "Moritz")
    })
    .await;

    store.remove_child("clubs/CLUB-1/persons", "P2").await;
    wait_for(persons, |items| items.len() == 1).await;
}

#[tokio::test]
async fn malformed_event_is_dropped_without_killing_the_stream() {
    let store = seeded_store();
    let engine = SyncOrchestrator::new(store.clone(), scope());
    engine.bootstrap().await;
    let persons = &engine.caches().persons;

    store.put_child("clubs/CLUB-1/persons", "P9", json!({ "noName": true })).await;
    store
        .put_child("clubs/CLUB-1/persons", "P2", json!({ "name": { "first": "Eva" } }))
        .await;

    wait_for(persons, |items| items.iter().any(|p| p.id == Id::new("P2"))).await;
    assert!(!persons.read().items().unwrap().iter().any(|p| p.id == Id::new("P9")));
}

#[tokio::test]
async fn optimistic_change_survives_a_rejected_operation() {
    let store = seeded_store();
    let engine = SyncOrchestrator::new(store.clone(), scope());
    engine.bootstrap().await;

    store.script_failure("changeList", RemoteError::Transport("boom".into()));
    let person = Person {
        id: Id::new("P2"),
        name: PersonName::new("Eva", None),
        sign_in_data: None,
    };
    let result = engine
        .changer()
        .change(&engine.caches().persons, ListChange::Upsert(person))
        .await;

    assert!(matches!(result, Err(RemoteError::Transport(_))));
    // No rollback: the cache keeps the optimistic state.
    let persons = engine.caches().persons.read();
    assert!(persons.items().unwrap().iter().any(|p| p.id == Id::new("P2")));
    // The remote never saw the change.
    assert!(store.fetch("clubs/CLUB-1/persons/P2").await.unwrap().is_none());
}

#[tokio::test]
async fn confirmed_change_fires_the_commit_hook() {
    let store = seeded_store();
    let engine = SyncOrchestrator::new(store.clone(), scope());
    engine.bootstrap().await;

    let commits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&commits);
    let changer = engine
        .changer()
        .with_commit_hook(Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

    let person = Person {
        id: Id::new("P2"),
        name: PersonName::new("Eva", None),
        sign_in_data: None,
    };
    changer
        .change(&engine.caches().persons, ListChange::Upsert(person))
        .await
        .unwrap();

    assert_eq!(commits.load(Ordering::SeqCst), 1);
    let remote = store.fetch("clubs/CLUB-1/persons/P2").await.unwrap().unwrap();
    assert_eq!(remote["name"]["first"], json!("Eva"));
}

#[tokio::test]
async fn delete_change_removes_locally_and_remotely() {
    let store = seeded_store();
    let engine = SyncOrchestrator::new(store.clone(), scope());
    engine.bootstrap().await;

    engine
        .changer()
        .change::<Fine>(&engine.caches().fines, ListChange::Delete(Id::new("F1")))
        .await
        .unwrap();

    assert!(engine.caches().fines.read().items().unwrap().is_empty());
    let fines = store.fetch("clubs/CLUB-1/fines").await.unwrap().unwrap();
    assert!(fines.as_object().unwrap().is_empty());
}

#[tokio::test]
async fn change_fine_payed_updates_cache_and_remote() {
    let store = seeded_store();
    let engine = SyncOrchestrator::new(store.clone(), scope());
    engine.bootstrap().await;

    engine
        .changer()
        .change_fine_payed(
            &engine.caches().fines,
            &Id::new("F1"),
            PayedState::Payed { pay_date: 2000, in_app: false },
        )
        .await
        .unwrap();

    let fines = engine.caches().fines.read();
    assert_eq!(fines.items().unwrap()[0].payed, PayedState::Payed { pay_date: 2000, in_app: false });
    assert_eq!(fines.items().unwrap()[0].reason, FineReason::Template(Id::new("R1")));
    let remote = store.fetch("clubs/CLUB-1/fines/F1").await.unwrap().unwrap();
    assert_eq!(remote["payed"]["state"], json!("payed"));
}

#[tokio::test]
async fn force_sign_out_echoes_through_the_observer() {
    let store = seeded_store();
    let engine = SyncOrchestrator::new(store.clone(), scope());
    engine.bootstrap().await;

    engine.changer().force_sign_out(&Id::new("P1")).await.unwrap();
    wait_for(&engine.caches().persons, |items| {
        items.iter().any(|p| p.id == Id::new("P1") && p.sign_in_data.is_none())
    })
    .await;
}

#[tokio::test]
async fn late_payment_interest_roundtrip() {
    let store = seeded_store();
    let engine = SyncOrchestrator::new(store.clone(), scope());
    assert_eq!(engine.late_payment_interest().await.unwrap(), None);

    let interest = LatePaymentInterest {
        interest_free_period: Period { value: 2, unit: PeriodUnit::Day },
        interest_rate: 0.05,
        interest_period: Period { value: 1, unit: PeriodUnit::Month },
        compound_interest: false,
    };
    engine.changer().change_late_payment_interest(Some(&interest)).await.unwrap();
    assert_eq!(engine.late_payment_interest().await.unwrap(), Some(interest));

    engine.changer().change_late_payment_interest(None).await.unwrap();
    assert_eq!(engine.late_payment_interest().await.unwrap(), None);
}

#[tokio::test]
async fn club_properties_carry_the_scoped_id() {
    let store = seeded_store();
    let engine = SyncOrchestrator::new(store, scope());
    let club = engine.club().await.unwrap();
    assert_eq!(club.id, Id::new("CLUB-1"));
    assert_eq!(club.name, "SG Kleinsendelbach");
    assert!(!club.is_in_app_payment_active());
}

#[tokio::test]
async fn club_id_resolves_from_identifier() {
    let store = seeded_store();
    let id = get_club_id(store.as_ref(), Level::Regular, "key", "sgk").await.unwrap();
    assert_eq!(id, Id::new("CLUB-1"));

    let err = get_club_id(store.as_ref(), Level::Regular, "key", "nope").await.unwrap_err();
    assert!(matches!(err, RemoteError::Rejected { code, .. } if code == "not-found"));
}
