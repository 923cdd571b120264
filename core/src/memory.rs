//! MemoryBus - an in-process bus
//!
//! Holds a JSON state tree, per-path subscriber lists, a persisted key/value
//! map and a log of every published delta. Used by the CLI to run heartwire
//! against a captured state tree, and by tests to drive the engine.

use crate::bus::{BusAdapter, BusEvent, Subscription};
use crate::delta::Delta;
use crate::error::BusError;
use crate::source::SourceMeta;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;

type Subscribers = HashMap<String, Vec<(u64, mpsc::UnboundedSender<BusEvent>)>>;

#[derive(Default)]
struct Inner {
    tree: Mutex<Value>,
    subscribers: Mutex<Subscribers>,
    persisted: Mutex<HashMap<String, Value>>,
    published: Mutex<Vec<Delta>>,
    next_id: AtomicU64,
    unavailable: AtomicBool,
}

/// Cloneable handle to an in-process bus.
#[derive(Clone, Default)]
pub struct MemoryBus {
    inner: Arc<Inner>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a bus whose state tree starts as `tree`.
    pub fn with_tree(tree: Value) -> Self {
        let bus = Self::new();
        *bus.inner.tree.lock() = tree;
        bus
    }

    /// Simulate an upstream transmitter updating `path`.
    pub fn inject(&self, path: &str, value: Value, source: Option<SourceMeta>) {
        set_leaf(&mut self.inner.tree.lock(), path, value.clone(), source.as_ref());
        self.fan_out(BusEvent::new(path, value, source));
    }

    /// When unavailable, every adapter operation fails with [`BusError::Unavailable`].
    pub fn set_available(&self, available: bool) {
        self.inner.unavailable.store(!available, Ordering::SeqCst);
    }

    pub fn published(&self) -> Vec<Delta> {
        self.inner.published.lock().clone()
    }

    pub fn subscriber_count(&self, path: &str) -> usize {
        self.inner
            .subscribers
            .lock()
            .get(path)
            .map_or(0, |subs| subs.len())
    }

    pub fn total_subscribers(&self) -> usize {
        self.inner.subscribers.lock().values().map(Vec::len).sum()
    }

    pub fn persisted(&self, key: &str) -> Option<Value> {
        self.inner.persisted.lock().get(key).cloned()
    }

    fn check_available(&self) -> Result<(), BusError> {
        if self.inner.unavailable.load(Ordering::SeqCst) {
            Err(BusError::Unavailable("memory bus switched off".to_string()))
        } else {
            Ok(())
        }
    }

    fn fan_out(&self, event: BusEvent) {
        let mut subscribers = self.inner.subscribers.lock();
        if let Some(subs) = subscribers.get_mut(&event.path) {
            subs.retain(|(_, tx)| tx.send(event.clone()).is_ok());
        }
    }
}

#[async_trait]
impl BusAdapter for MemoryBus {
    async fn subscribe(&self, path: &str) -> Result<Subscription, BusError> {
        self.check_available()?;

        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .subscribers
            .lock()
            .entry(path.to_string())
            .or_default()
            .push((id, tx));

        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let key = path.to_string();
        Ok(Subscription::new(path, rx, move || {
            if let Some(inner) = weak.upgrade() {
                let mut subscribers = inner.subscribers.lock();
                if let Some(subs) = subscribers.get_mut(&key) {
                    subs.retain(|(sub_id, _)| *sub_id != id);
                    if subs.is_empty() {
                        subscribers.remove(&key);
                    }
                }
            }
        }))
    }

    async fn publish(&self, delta: Delta) -> Result<(), BusError> {
        self.check_available()?;

        {
            let mut tree = self.inner.tree.lock();
            for pv in &delta.values {
                set_leaf(&mut tree, &pv.path, pv.value.clone(), Some(&delta.source));
            }
        }
        for pv in &delta.values {
            let mut event = BusEvent::new(&pv.path, pv.value.clone(), Some(delta.source.clone()));
            event.timestamp = delta.timestamp;
            self.fan_out(event);
        }
        self.inner.published.lock().push(delta);
        Ok(())
    }

    async fn read_current(&self, path: &str) -> Result<Option<Value>, BusError> {
        self.check_available()?;
        let tree = self.inner.tree.lock();
        Ok(get_node(&tree, path).cloned())
    }

    async fn read_persisted(&self, key: &str) -> Result<Option<Value>, BusError> {
        self.check_available()?;
        Ok(self.inner.persisted.lock().get(key).cloned())
    }

    async fn write_persisted(&self, key: &str, value: Value) -> Result<(), BusError> {
        self.check_available()?;
        self.inner.persisted.lock().insert(key.to_string(), value);
        Ok(())
    }
}

impl std::fmt::Debug for MemoryBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBus")
            .field("subscribers", &self.total_subscribers())
            .field("published", &self.inner.published.lock().len())
            .finish()
    }
}

fn get_node<'a>(tree: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(tree);
    }
    path.split('.').try_fold(tree, |node, segment| node.get(segment))
}

fn set_leaf(tree: &mut Value, path: &str, value: Value, source: Option<&SourceMeta>) {
    let mut node = tree;
    for segment in path.split('.') {
        if !node.is_object() {
            *node = Value::Object(Map::new());
        }
        let Value::Object(map) = node else {
            return;
        };
        node = map
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }

    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    if let Value::Object(leaf) = node {
        leaf.insert("value".to_string(), value);
        match source.and_then(SourceMeta::identity) {
            Some(identity) => {
                leaf.insert("$source".to_string(), Value::String(identity));
            }
            None => {
                leaf.remove("$source");
            }
        }
    }
}
