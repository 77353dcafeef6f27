//! Remote store interface: snapshot fetch, child-level event subscription
//! and named remote operations.
//!
//! The real backend (a hierarchical realtime database plus callable cloud
//! functions) stays behind [`RemoteStore`]; the engine only depends on this
//! trait. [`MemoryStore`] is the tokio-native in-process implementation used
//! by the CLI demo and the test suites.

#![forbid(unsafe_code)]

mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

/// Error of a remote read, subscription or operation invoke.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    /// The request never reached the backend or the connection dropped.
    #[error("transport: {0}")]
    Transport(String),

    /// The backend refused the operation.
    #[error("rejected ({code}): {message}")]
    Rejected { code: String, message: String },
}

impl RemoteError {
    pub fn rejected(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Rejected { code: code.into(), message: message.into() }
    }
}

/// One child-level notification from a subscription.
///
/// Delivered in arrival order per path; there is no ordering guarantee
/// relative to a snapshot fetch running on the same path.
#[derive(Debug, Clone, PartialEq)]
pub enum ChildEvent {
    Added { key: String, payload: Value },
    Changed { key: String, payload: Value },
    Removed { key: String },
}

impl ChildEvent {
    pub fn key(&self) -> &str {
        match self {
            ChildEvent::Added { key, .. }
            | ChildEvent::Changed { key, .. }
            | ChildEvent::Removed { key } => key,
        }
    }
}

/// The opaque remote data store.
#[async_trait]
pub trait RemoteStore: Send + Sync + 'static {
    /// Full snapshot of the value under `path`; `Ok(None)` when no data
    /// exists there.
    async fn fetch(&self, path: &str) -> Result<Option<Value>, RemoteError>;

    /// Long-lived child-level subscription under `path`. Events are pushed
    /// into `events` until the receiver is dropped; existing children are
    /// replayed as `Added` on arrival, as the backend does.
    async fn subscribe(
        &self,
        path: &str,
        events: mpsc::Sender<ChildEvent>,
    ) -> Result<(), RemoteError>;

    /// Invoke the named remote operation with a parameter object.
    async fn invoke(&self, function: &str, parameters: Value) -> Result<Value, RemoteError>;
}
