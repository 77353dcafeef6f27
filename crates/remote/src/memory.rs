//! In-memory remote store: a JSON tree plus child-event fan-out, with the
//! named operations applied to the tree the way the real backend does, so
//! local mutations echo back through subscriptions.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::{ChildEvent, RemoteError, RemoteStore};

pub struct MemoryStore {
    inner: Mutex<Inner>,
}

struct Inner {
    tree: Value,
    subscribers: HashMap<String, Vec<mpsc::Sender<ChildEvent>>>,
    scripted: HashMap<String, RemoteError>,
    private_key: Option<String>,
    offline: bool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_tree(json!({}))
    }

    /// Seed the store with a full JSON tree (e.g. a demo club file).
    pub fn with_tree(tree: Value) -> Self {
        Self {
            inner: Mutex::new(Inner {
                tree,
                subscribers: HashMap::new(),
                scripted: HashMap::new(),
                private_key: None,
                offline: false,
            }),
        }
    }

    /// Require this private key on every invoke; mismatch is rejected with
    /// `permission-denied`.
    pub fn set_private_key(&self, key: impl Into<String>) {
        self.inner.lock().unwrap().private_key = Some(key.into());
    }

    /// While offline, fetches and invokes fail with a transport error.
    pub fn set_offline(&self, offline: bool) {
        self.inner.lock().unwrap().offline = offline;
    }

    /// Make the next invoke of `function` fail with `error` without
    /// touching the tree.
    pub fn script_failure(&self, function: impl Into<String>, error: RemoteError) {
        self.inner.lock().unwrap().scripted.insert(function.into(), error);
    }

    /// Write a child under `path`, emitting `Added` or `Changed` to
    /// subscribers. Used by tests to simulate writes from other clients.
    pub async fn put_child(&self, path: &str, key: &str, payload: Value) {
        let event = {
            let mut inner = self.inner.lock().unwrap();
            let node = ensure_object(&mut inner.tree, path);
            let existed = node.contains_key(key);
            node.insert(key.to_string(), payload.clone());
            if existed {
                ChildEvent::Changed { key: key.to_string(), payload }
            } else {
                ChildEvent::Added { key: key.to_string(), payload }
            }
        };
        self.emit(path, event).await;
    }

    /// Remove a child under `path`, emitting `Removed` if it existed.
    pub async fn remove_child(&self, path: &str, key: &str) {
        let removed = {
            let mut inner = self.inner.lock().unwrap();
            match lookup_mut(&mut inner.tree, path).and_then(Value::as_object_mut) {
                Some(node) => node.remove(key).is_some(),
                None => false,
            }
        };
        if removed {
            self.emit(path, ChildEvent::Removed { key: key.to_string() }).await;
        }
    }

    /// Set a plain (non-list) value at `path`, replacing whatever is there.
    pub fn put_value(&self, path: &str, value: Value) {
        let mut inner = self.inner.lock().unwrap();
        let (parent, leaf) = match path.rsplit_once('/') {
            Some((parent, leaf)) => (parent, leaf),
            None => ("", path),
        };
        let node = ensure_object(&mut inner.tree, parent);
        if value.is_null() {
            node.remove(leaf);
        } else {
            node.insert(leaf.to_string(), value);
        }
    }

    async fn emit(&self, path: &str, event: ChildEvent) {
        let senders: Vec<mpsc::Sender<ChildEvent>> = {
            let inner = self.inner.lock().unwrap();
            inner.subscribers.get(path).cloned().unwrap_or_default()
        };
        for tx in &senders {
            if tx.send(event.clone()).await.is_err() {
                debug!(path, "subscriber gone");
            }
        }
        let mut inner = self.inner.lock().unwrap();
        if let Some(list) = inner.subscribers.get_mut(path) {
            list.retain(|tx| !tx.is_closed());
        }
    }

    fn guard(&self, function: &str, parameters: &Value) -> Result<(), RemoteError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.offline {
            return Err(RemoteError::Transport("store is offline".into()));
        }
        if let Some(error) = inner.scripted.remove(function) {
            return Err(error);
        }
        if let Some(expected) = &inner.private_key {
            let given = parameters.get("privateKey").and_then(Value::as_str);
            if given != Some(expected.as_str()) {
                return Err(RemoteError::rejected("permission-denied", "invalid private key"));
            }
        }
        Ok(())
    }

    async fn change_list(&self, parameters: &Value) -> Result<Value, RemoteError> {
        let list_type = str_param(parameters, "listType")?;
        if !matches!(list_type.as_str(), "person" | "fine" | "reason" | "transaction") {
            return Err(RemoteError::rejected(
                "invalid-argument",
                format!("invalid list type: {list_type}"),
            ));
        }
        let list_path = format!("{}/{}s", club_path(parameters)?, list_type);
        let item_id = str_param(parameters, "itemId")?.to_ascii_uppercase();
        match str_param(parameters, "changeType")?.as_str() {
            "delete" => {
                self.remove_child(&list_path, &item_id).await;
                Ok(Value::Null)
            }
            "update" => {
                let previous = {
                    let inner = self.inner.lock().unwrap();
                    lookup(&inner.tree, &list_path)
                        .and_then(|node| node.get(&item_id))
                        .cloned()
                };
                let payload = build_item(&list_type, parameters, previous.as_ref())?;
                self.put_child(&list_path, &item_id, payload).await;
                Ok(Value::Null)
            }
            other => Err(RemoteError::rejected(
                "invalid-argument",
                format!("invalid change type: {other}"),
            )),
        }
    }

    async fn change_fine_payed(&self, parameters: &Value) -> Result<Value, RemoteError> {
        let fines_path = format!("{}/fines", club_path(parameters)?);
        let fine_id = str_param(parameters, "fineId")?.to_ascii_uppercase();
        let mut fine = {
            let inner = self.inner.lock().unwrap();
            lookup(&inner.tree, &fines_path)
                .and_then(|node| node.get(&fine_id))
                .cloned()
                .ok_or_else(|| {
                    RemoteError::rejected("failed-precondition", "no fine to update")
                })?
        };
        fine["payed"] = payed_value(parameters, "state", "payDate", "inApp")?;
        self.put_child(&fines_path, &fine_id, fine).await;
        Ok(Value::Null)
    }

    async fn force_sign_out(&self, parameters: &Value) -> Result<Value, RemoteError> {
        let persons_path = format!("{}/persons", club_path(parameters)?);
        let person_id = str_param(parameters, "personId")?.to_ascii_uppercase();
        let person = {
            let inner = self.inner.lock().unwrap();
            lookup(&inner.tree, &persons_path)
                .and_then(|node| node.get(&person_id))
                .cloned()
        };
        if let Some(mut person) = person {
            if person.as_object_mut().and_then(|p| p.remove("signInData")).is_some() {
                self.put_child(&persons_path, &person_id, person).await;
            }
        }
        Ok(Value::Null)
    }

    fn change_late_payment_interest(&self, parameters: &Value) -> Result<Value, RemoteError> {
        let path = format!("{}/latePaymentInterest", club_path(parameters)?);
        let interest = match parameters.get("interestRate") {
            None | Some(Value::Null) => Value::Null,
            Some(rate) => json!({
                "interestFreePeriod": {
                    "value": required(parameters, "interestFreeValue")?,
                    "unit": required(parameters, "interestFreeUnit")?,
                },
                "interestRate": rate,
                "interestPeriod": {
                    "value": required(parameters, "interestValue")?,
                    "unit": required(parameters, "interestUnit")?,
                },
                "compoundInterest": required(parameters, "compoundInterest")?,
            }),
        };
        self.put_value(&path, interest);
        Ok(Value::Null)
    }

    fn get_club_id(&self, parameters: &Value) -> Result<Value, RemoteError> {
        let identifier = str_param(parameters, "identifier")?;
        let component = club_component(parameters);
        let inner = self.inner.lock().unwrap();
        if let Some(clubs) = lookup(&inner.tree, component).and_then(Value::as_object) {
            for (club_id, club) in clubs {
                if club.get("identifier").and_then(Value::as_str) == Some(identifier.as_str()) {
                    return Ok(json!(club_id));
                }
            }
        }
        Err(RemoteError::rejected("not-found", format!("no club with identifier: {identifier}")))
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn fetch(&self, path: &str) -> Result<Option<Value>, RemoteError> {
        let inner = self.inner.lock().unwrap();
        if inner.offline {
            return Err(RemoteError::Transport("store is offline".into()));
        }
        Ok(lookup(&inner.tree, path).cloned())
    }

    async fn subscribe(
        &self,
        path: &str,
        events: mpsc::Sender<ChildEvent>,
    ) -> Result<(), RemoteError> {
        let existing: Vec<(String, Value)> = {
            let mut inner = self.inner.lock().unwrap();
            if inner.offline {
                return Err(RemoteError::Transport("store is offline".into()));
            }
            inner
                .subscribers
                .entry(path.to_string())
                .or_default()
                .push(events.clone());
            let mut children: Vec<(String, Value)> = lookup(&inner.tree, path)
                .and_then(Value::as_object)
                .map(|node| node.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
                .unwrap_or_default();
            children.sort_by(|a, b| a.0.cmp(&b.0));
            children
        };
        // Replay existing children as Added, as the backend does on a fresh
        // child-added observer.
        for (key, payload) in existing {
            if events.send(ChildEvent::Added { key, payload }).await.is_err() {
                break;
            }
        }
        Ok(())
    }

    async fn invoke(&self, function: &str, parameters: Value) -> Result<Value, RemoteError> {
        self.guard(function, &parameters)?;
        debug!(function, "invoke");
        match function {
            "changeList" => self.change_list(&parameters).await,
            "changeFinePayed" => self.change_fine_payed(&parameters).await,
            "forceSignOut" => self.force_sign_out(&parameters).await,
            "changeLatePaymentInterest" => self.change_late_payment_interest(&parameters),
            "getClubId" => self.get_club_id(&parameters),
            other => {
                warn!(function = other, "unknown function");
                Err(RemoteError::rejected("not-found", format!("unknown function: {other}")))
            }
        }
    }
}

// ---- tree helpers ----

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

fn lookup<'a>(tree: &'a Value, path: &str) -> Option<&'a Value> {
    segments(path).try_fold(tree, |node, seg| node.get(seg))
}

fn lookup_mut<'a>(tree: &'a mut Value, path: &str) -> Option<&'a mut Value> {
    segments(path).try_fold(tree, |node, seg| node.get_mut(seg))
}

fn ensure_object<'a>(tree: &'a mut Value, path: &str) -> &'a mut Map<String, Value> {
    let mut node = tree;
    for seg in segments(path) {
        if !node.is_object() {
            *node = json!({});
        }
        node = node
            .as_object_mut()
            .unwrap()
            .entry(seg.to_string())
            .or_insert_with(|| json!({}));
    }
    if !node.is_object() {
        *node = json!({});
    }
    node.as_object_mut().unwrap()
}

// ---- parameter helpers ----

fn str_param(parameters: &Value, key: &str) -> Result<String, RemoteError> {
    parameters
        .get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| RemoteError::rejected("invalid-argument", format!("missing parameter: {key}")))
}

fn required<'a>(parameters: &'a Value, key: &str) -> Result<&'a Value, RemoteError> {
    match parameters.get(key) {
        Some(value) if !value.is_null() => Ok(value),
        _ => Err(RemoteError::rejected("invalid-argument", format!("missing parameter: {key}"))),
    }
}

fn optional<'a>(parameters: &'a Value, key: &str) -> Option<&'a Value> {
    parameters.get(key).filter(|value| !value.is_null())
}

fn club_component(parameters: &Value) -> &'static str {
    match parameters.get("clubLevel").and_then(Value::as_str) {
        Some("debug") => "debugClubs",
        Some("testing") => "testableClubs",
        _ => "clubs",
    }
}

fn club_path(parameters: &Value) -> Result<String, RemoteError> {
    let club_id = str_param(parameters, "clubId")?.to_ascii_uppercase();
    Ok(format!("{}/{}", club_component(parameters), club_id))
}

fn payed_value(
    parameters: &Value,
    state_key: &str,
    pay_date_key: &str,
    in_app_key: &str,
) -> Result<Value, RemoteError> {
    match str_param(parameters, state_key)?.as_str() {
        "payed" => Ok(json!({
            "state": "payed",
            "payDate": required(parameters, pay_date_key)?,
            "inApp": required(parameters, in_app_key)?,
        })),
        state @ ("settled" | "unpayed") => Ok(json!({ "state": state })),
        other => {
            Err(RemoteError::rejected("invalid-argument", format!("invalid payed state: {other}")))
        }
    }
}

fn build_item(
    list_type: &str,
    parameters: &Value,
    previous: Option<&Value>,
) -> Result<Value, RemoteError> {
    match list_type {
        "person" => {
            let mut person = json!({
                "name": {
                    "first": required(parameters, "firstName")?,
                    "last": parameters.get("lastName").cloned().unwrap_or(Value::Null),
                }
            });
            // A person update never touches registration data.
            if let Some(sign_in) = previous.and_then(|p| p.get("signInData")) {
                person["signInData"] = sign_in.clone();
            }
            Ok(person)
        }
        "fine" => {
            let reason = match optional(parameters, "templateId") {
                Some(template_id) => json!({ "templateId": template_id }),
                None => json!({
                    "reason": required(parameters, "reason")?,
                    "amount": required(parameters, "amount")?,
                    "importance": required(parameters, "importance")?,
                }),
            };
            Ok(json!({
                "personId": required(parameters, "personId")?,
                "number": required(parameters, "number")?,
                "date": required(parameters, "date")?,
                "payed": payed_value(parameters, "payedState", "payedPayDate", "payedInApp")?,
                "reason": reason,
            }))
        }
        "reason" => Ok(json!({
            "reason": required(parameters, "reason")?,
            "amount": required(parameters, "amount")?,
            "importance": required(parameters, "importance")?,
        })),
        "transaction" => {
            let name = match optional(parameters, "firstName") {
                Some(first) => json!({
                    "first": first,
                    "last": parameters.get("lastName").cloned().unwrap_or(Value::Null),
                }),
                None => Value::Null,
            };
            Ok(json!({
                "approved": required(parameters, "approved")?,
                "fineIds": required(parameters, "fineIds")?,
                "name": name,
                "payDate": required(parameters, "payDate")?,
                "personId": required(parameters, "personId")?,
                "payoutId": parameters.get("payoutId").cloned().unwrap_or(Value::Null),
            }))
        }
        other => {
            Err(RemoteError::rejected("invalid-argument", format!("invalid list type: {other}")))
        }
    }
}
