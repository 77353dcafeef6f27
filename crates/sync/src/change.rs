//! Optimistic mutations against the remote store.

use std::sync::Arc;

use kasse_core::{Changeable, Club, Fine, Id, LatePaymentInterest, ListItem, PayedState, Person};
use kasse_remote::{RemoteError, RemoteStore};
use kasse_store::{ListCache, Mutation};
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use crate::{ClubScope, Level};

/// Callback fired after the remote operation confirms a change, keyed by the
/// operation name. Hook for persistence or UI refresh layers.
pub type CommitHook = Arc<dyn Fn(&str) + Send + Sync>;

/// One list change the `changeList` remote operation carries.
#[derive(Debug, Clone)]
pub enum ListChange<T: Changeable> {
    Upsert(T),
    Delete(Id<T>),
}

/// Writes changes optimistically: the local cache is updated first, then
/// the remote operation is invoked. A rejected operation leaves the
/// optimistic state in place and surfaces the error to the caller; the
/// change stream carries the authoritative correction once the server
/// state is observed again.
pub struct Changer {
    store: Arc<dyn RemoteStore>,
    scope: ClubScope,
    on_commit: Option<CommitHook>,
}

impl Changer {
    pub fn new(store: Arc<dyn RemoteStore>, scope: ClubScope) -> Self {
        Self { store, scope, on_commit: None }
    }

    pub fn with_commit_hook(mut self, hook: CommitHook) -> Self {
        self.on_commit = Some(hook);
        self
    }

    /// Update or delete one item of a changeable list.
    pub async fn change<T: Changeable>(
        &self,
        cache: &ListCache<T>,
        change: ListChange<T>,
    ) -> Result<(), RemoteError> {
        let (item_id, change_type, mutation, mut parameters) = match change {
            ListChange::Upsert(item) => {
                let parameters = item.update_parameters();
                (item.id(), "update", Mutation::Upsert(item), parameters)
            }
            ListChange::Delete(id) => (id.clone(), "delete", Mutation::Delete(id), Map::new()),
        };
        parameters.insert("itemId".into(), json!(item_id));
        parameters.insert("listType".into(), json!(T::KIND));
        parameters.insert("changeType".into(), json!(change_type));

        cache.apply(mutation);
        let outcome =
            self.store.invoke("changeList", self.scope.parameters(parameters)).await;
        self.confirm("changeList", T::KIND, outcome)
    }

    /// Change only the payed state of a fine.
    pub async fn change_fine_payed(
        &self,
        cache: &ListCache<Fine>,
        fine_id: &Id<Fine>,
        new_state: PayedState,
    ) -> Result<(), RemoteError> {
        if let Some(fines) = cache.read().items() {
            if let Some(fine) = fines.iter().find(|fine| fine.id() == *fine_id) {
                let mut updated = fine.clone();
                updated.payed = new_state;
                cache.apply(Mutation::Upsert(updated));
            }
        }

        let mut parameters = Map::new();
        parameters.insert("fineId".into(), json!(fine_id));
        parameters.insert("state".into(), json!(new_state.state_str()));
        parameters.insert("payDate".into(), json!(new_state.pay_date()));
        parameters.insert("inApp".into(), json!(new_state.in_app()));
        let outcome =
            self.store.invoke("changeFinePayed", self.scope.parameters(parameters)).await;
        self.confirm("changeFinePayed", "fine", outcome)
    }

    /// Force the given person's account off this club.
    pub async fn force_sign_out(&self, person_id: &Id<Person>) -> Result<(), RemoteError> {
        let mut parameters = Map::new();
        parameters.insert("personId".into(), json!(person_id));
        let outcome =
            self.store.invoke("forceSignOut", self.scope.parameters(parameters)).await;
        self.confirm("forceSignOut", "person", outcome)
    }

    /// Set or deactivate (`None`) the club's late payment interest.
    pub async fn change_late_payment_interest(
        &self,
        interest: Option<&LatePaymentInterest>,
    ) -> Result<(), RemoteError> {
        let mut parameters = Map::new();
        if let Some(interest) = interest {
            parameters.insert("interestFreeValue".into(), json!(interest.interest_free_period.value));
            parameters.insert("interestFreeUnit".into(), json!(interest.interest_free_period.unit));
            parameters.insert("interestRate".into(), json!(interest.interest_rate));
            parameters.insert("interestValue".into(), json!(interest.interest_period.value));
            parameters.insert("interestUnit".into(), json!(interest.interest_period.unit));
            parameters.insert("compoundInterest".into(), json!(interest.compound_interest));
        }
        let outcome = self
            .store
            .invoke("changeLatePaymentInterest", self.scope.parameters(parameters))
            .await;
        self.confirm("changeLatePaymentInterest", "club", outcome)
    }

    fn confirm(
        &self,
        function: &str,
        kind: &str,
        outcome: Result<Value, RemoteError>,
    ) -> Result<(), RemoteError> {
        match outcome {
            Ok(_) => {
                info!(%function, %kind, "change confirmed");
                if let Some(hook) = &self.on_commit {
                    hook(function);
                }
                Ok(())
            }
            Err(error) => {
                warn!(%function, %kind, %error, "change rejected; cache keeps optimistic state");
                Err(error)
            }
        }
    }
}

/// Resolve a club id from its human-readable identifier. Runs outside a
/// [`ClubScope`] because it is how a scope's club id is found.
pub async fn get_club_id(
    store: &dyn RemoteStore,
    level: Level,
    private_key: &str,
    identifier: &str,
) -> Result<Id<Club>, RemoteError> {
    let parameters = json!({
        "identifier": identifier,
        "clubLevel": level.as_str(),
        "privateKey": private_key,
    });
    let value = store.invoke("getClubId", parameters).await?;
    match value.as_str() {
        Some(id) => Ok(Id::new(id)),
        None => Err(RemoteError::rejected("internal", "getClubId returned a non-string")),
    }
}
