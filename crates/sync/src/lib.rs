//! Kasse sync engine.
//!
//! Keeps the in-RAM list caches in step with the remote club database:
//! one-time multi-list bootstrap (fan-out fetch, fan-in barrier), long-lived
//! change stream observers, and optimistic mutations that hit the cache
//! before the remote operation confirms.

#![forbid(unsafe_code)]

mod change;
mod fetch;
mod observe;
mod orchestrator;

pub use change::{get_club_id, Changer, CommitHook, ListChange};
pub use fetch::{fetch_club, fetch_late_payment_interest, fetch_list};
pub use observe::spawn_observer;
pub use orchestrator::{Caches, ConnectionState, SyncOrchestrator};

use kasse_core::{Club, Id};
use kasse_remote::RemoteError;
use serde_json::{json, Map, Value};

/// Which copy of the club tree calls and paths address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Level {
    #[default]
    Regular,
    Debug,
    Testing,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Regular => "regular",
            Level::Debug => "debug",
            Level::Testing => "testing",
        }
    }

    /// Top-level component the club nodes live under.
    pub fn club_component(&self) -> &'static str {
        match self {
            Level::Regular => "clubs",
            Level::Debug => "debugClubs",
            Level::Testing => "testableClubs",
        }
    }
}

/// Authentication context and club addressing shared by every fetch,
/// subscription and remote operation of one session.
#[derive(Debug, Clone)]
pub struct ClubScope {
    pub club_id: Id<Club>,
    pub private_key: String,
    pub level: Level,
}

impl ClubScope {
    pub fn new(club_id: Id<Club>, private_key: impl Into<String>) -> Self {
        Self { club_id, private_key: private_key.into(), level: Level::default() }
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Absolute path of a value under this club's node.
    pub fn path(&self, from_club: &str) -> String {
        if from_club.is_empty() {
            format!("{}/{}", self.level.club_component(), self.club_id)
        } else {
            format!("{}/{}/{}", self.level.club_component(), self.club_id, from_club)
        }
    }

    /// Complete a remote operation's parameter set with the ambient
    /// authentication and scope parameters every call carries.
    pub fn parameters(&self, mut parameters: Map<String, Value>) -> Value {
        parameters.insert("privateKey".into(), json!(self.private_key));
        parameters.insert("clubLevel".into(), json!(self.level.as_str()));
        parameters.insert("clubId".into(), json!(self.club_id));
        Value::Object(parameters)
    }
}

/// Error of a snapshot fetch. Routed to the orchestrator, which folds it
/// into the connection state instead of propagating.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("decode: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("no data at {0}")]
    NoData(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_paths() {
        let scope = ClubScope::new(Id::new("club-1"), "key");
        assert_eq!(scope.path("persons"), "clubs/CLUB-1/persons");
        assert_eq!(scope.path(""), "clubs/CLUB-1");

        let testing = scope.with_level(Level::Testing);
        assert_eq!(testing.path("fines"), "testableClubs/CLUB-1/fines");
    }

    #[test]
    fn scope_parameters_carry_auth_and_club() {
        let scope = ClubScope::new(Id::new("C1"), "secret");
        let mut extra = Map::new();
        extra.insert("itemId".into(), json!("A1"));
        let params = scope.parameters(extra);
        assert_eq!(params["privateKey"], json!("secret"));
        assert_eq!(params["clubLevel"], json!("regular"));
        assert_eq!(params["clubId"], json!("C1"));
        assert_eq!(params["itemId"], json!("A1"));
    }
}
