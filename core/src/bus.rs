//! Bus - the transport heartwire sits on
//!
//! The bus is an external collaborator. heartwire only needs five primitives
//! from it: subscribe to a path, publish a delta, read the current value of a
//! path (or subtree), and read/write a small persisted key/value store.
//!
//! Subscriptions are disposables: dropping a [`Subscription`] releases it.

use crate::delta::Delta;
use crate::error::BusError;
use crate::source::SourceMeta;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::mpsc;

/// A value observed on a subscribed path.
#[derive(Debug, Clone, PartialEq)]
pub struct BusEvent {
    pub path: String,
    pub value: Value,
    /// `None` when the transport carries no source metadata.
    pub source: Option<SourceMeta>,
    pub timestamp: DateTime<Utc>,
}

impl BusEvent {
    pub fn new(path: impl Into<String>, value: Value, source: Option<SourceMeta>) -> Self {
        Self {
            path: path.into(),
            value,
            source,
            timestamp: Utc::now(),
        }
    }
}

/// The bus primitives heartwire consumes.
#[async_trait]
pub trait BusAdapter: Send + Sync + 'static {
    /// Subscribe to every update of `path`.
    async fn subscribe(&self, path: &str) -> Result<Subscription, BusError>;

    /// Publish a delta. The delta's `source` is what subscribers will see.
    async fn publish(&self, delta: Delta) -> Result<(), BusError>;

    /// Current node at `path` (a leaf object, a bare value, or a subtree).
    async fn read_current(&self, path: &str) -> Result<Option<Value>, BusError>;

    async fn read_persisted(&self, key: &str) -> Result<Option<Value>, BusError>;

    async fn write_persisted(&self, key: &str, value: Value) -> Result<(), BusError>;
}

/// Unwrap a leaf node: `{"value": 12, ...}` yields `12`, anything else is returned as is.
pub fn leaf_value(node: &Value) -> &Value {
    match node {
        Value::Object(map) => map.get("value").unwrap_or(node),
        _ => node,
    }
}

type ReleaseFn = Box<dyn FnOnce() + Send>;

/// Handle to a live subscription.
///
/// The release action runs exactly once, on [`Subscription::release`] or on drop.
pub struct Subscription {
    path: String,
    rx: mpsc::UnboundedReceiver<BusEvent>,
    release: Option<ReleaseFn>,
}

impl Subscription {
    pub fn new(
        path: impl Into<String>,
        rx: mpsc::UnboundedReceiver<BusEvent>,
        release: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            path: path.into(),
            rx,
            release: Some(Box::new(release)),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub async fn recv(&mut self) -> Option<BusEvent> {
        self.rx.recv().await
    }

    /// Release now instead of waiting for drop.
    pub fn release(mut self) {
        self.run_release();
    }

    fn run_release(&mut self) {
        if let Some(release) = self.release.take() {
            tracing::trace!(path = %self.path, "Releasing subscription");
            self.rx.close();
            release();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.run_release();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("path", &self.path)
            .field("released", &self.release.is_none())
            .finish()
    }
}
