//! One-shot snapshot fetches.

use std::collections::BTreeMap;

use kasse_core::{Club, Id, LatePaymentInterest, ListItem};
use kasse_remote::RemoteStore;
use serde_json::Value;
use tracing::debug;

use crate::{ClubScope, FetchError};

/// Fetch and decode the full current list of `T` for the scoped club.
///
/// "No data at the path" is the empty list. A child that fails to decode
/// fails the whole fetch: a list snapshot with holes would silently drop
/// items for the rest of the session.
pub async fn fetch_list<T: ListItem>(
    store: &dyn RemoteStore,
    scope: &ClubScope,
) -> Result<Vec<T>, FetchError> {
    let path = scope.path(T::PATH);
    let Some(data) = store.fetch(&path).await? else {
        debug!(list = T::PATH, "no data; empty list");
        return Ok(Vec::new());
    };
    let children: BTreeMap<String, T::Wire> = serde_json::from_value(data)?;
    Ok(children
        .into_iter()
        .map(|(key, wire)| T::from_wire(Id::new(key), wire))
        .collect())
}

/// Fetch the scoped club's properties (name, identifier, region code).
pub async fn fetch_club(store: &dyn RemoteStore, scope: &ClubScope) -> Result<Club, FetchError> {
    let path = scope.path("");
    let data = store.fetch(&path).await?.ok_or_else(|| FetchError::NoData(path))?;
    let mut club: Club = serde_json::from_value(data)?;
    club.id = scope.club_id.clone();
    Ok(club)
}

/// Fetch the club's late payment interest configuration; absent or null
/// means interest is not configured.
pub async fn fetch_late_payment_interest(
    store: &dyn RemoteStore,
    scope: &ClubScope,
) -> Result<Option<LatePaymentInterest>, FetchError> {
    match store.fetch(&scope.path("latePaymentInterest")).await? {
        None | Some(Value::Null) => Ok(None),
        Some(data) => Ok(Some(serde_json::from_value(data)?)),
    }
}
