//! Per-session characteristic-change event queue and coalescing (§3 Event,
//! §4.9). A write enqueues one event per subscribed session (excluding the
//! session that caused the change, if any); each session drains its queue
//! at most once per [`NOTIFY_FLUSH_PERIOD`], coalescing multiple pending
//! events for the same `(aid, iid)` down to the latest value while
//! preserving first-seen order across distinct characteristics.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use serde_json::json;

use crate::accessory::{Accessory, CharacteristicValue};

/// How often a session may flush its pending events onto the wire (§3).
pub const NOTIFY_FLUSH_PERIOD: Duration = Duration::from_secs(1);

/// One pending change, not yet flushed.
#[derive(Debug, Clone)]
pub struct PendingEvent {
    pub aid: u64,
    pub iid: u64,
    pub value: CharacteristicValue,
}

#[derive(Default)]
struct SessionQueue {
    order: Vec<(u64, u64)>,
    values: HashMap<(u64, u64), CharacteristicValue>,
}

impl SessionQueue {
    fn push(&mut self, aid: u64, iid: u64, value: CharacteristicValue) {
        let key = (aid, iid);
        if !self.values.contains_key(&key) {
            self.order.push(key);
        }
        self.values.insert(key, value);
    }

    fn drain(&mut self) -> Vec<PendingEvent> {
        let order = std::mem::take(&mut self.order);
        order
            .into_iter()
            .filter_map(|key| self.values.remove(&key).map(|value| PendingEvent { aid: key.0, iid: key.1, value }))
            .collect()
    }

    fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Process-wide table of per-session pending-event queues.
#[derive(Default)]
pub struct EventDispatcher {
    queues: Mutex<HashMap<u64, SessionQueue>>,
}

impl EventDispatcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_session(&self, session_id: u64) {
        self.queues.lock().unwrap().entry(session_id).or_default();
    }

    /// Drop a session's queue. Callers must separately unsubscribe it from
    /// every characteristic in the tree (§4.9: "clear all subscriptions for
    /// that session from every characteristic" on disconnect).
    pub fn remove_session(&self, session_id: u64) {
        self.queues.lock().unwrap().remove(&session_id);
    }

    /// Enqueue a change on every subscriber of `(aid, iid)` except
    /// `originator` (the session whose write caused it, if any).
    pub fn notify(&self, tree: &Accessory, aid: u64, iid: u64, value: &CharacteristicValue, originator: Option<u64>) {
        let Some(characteristic) = tree.characteristic(iid) else { return };
        let mut queues = self.queues.lock().unwrap();
        for &subscriber in characteristic.subscribers() {
            if Some(subscriber) == originator {
                continue;
            }
            queues.entry(subscriber).or_default().push(aid, iid, value.clone());
        }
    }

    /// Drain a session's coalesced events, or `None` if nothing is pending.
    #[must_use]
    pub fn drain(&self, session_id: u64) -> Option<Vec<PendingEvent>> {
        let mut queues = self.queues.lock().unwrap();
        let queue = queues.get_mut(&session_id)?;
        if queue.is_empty() {
            return None;
        }
        Some(queue.drain())
    }
}

/// Render a drained batch as the `{"characteristics":[...]}` body an
/// `EVENT/1.0` push carries.
#[must_use]
pub fn events_to_json(events: &[PendingEvent]) -> serde_json::Value {
    json!({
        "characteristics": events.iter().map(|e| json!({
            "aid": e.aid,
            "iid": e.iid,
            "value": e.value.to_json(),
        })).collect::<Vec<_>>()
    })
}
