use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, trace, warn};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BusError {
    #[error("event type must not be empty")]
    EmptyEventType,
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),
}

/// Wire message pushed by the server: `{ "type": ..., "data": ... }`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventEnvelope {
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: Value,
}

impl EventEnvelope {
    pub fn new(event_type: impl Into<String>, data: Value) -> Self {
        Self {
            event_type: event_type.into(),
            data,
        }
    }

    /// Parse one text frame. Only a JSON object with a non-blank string
    /// `type` is an envelope; a missing `data` becomes `null`.
    pub fn parse(text: &str) -> Result<Self, BusError> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| BusError::MalformedEnvelope(e.to_string()))?;
        let Value::Object(mut fields) = value else {
            return Err(BusError::MalformedEnvelope(
                "envelope must be a JSON object".to_string(),
            ));
        };
        let event_type = match fields.remove("type") {
            Some(Value::String(event_type)) => event_type,
            Some(_) => {
                return Err(BusError::MalformedEnvelope(
                    "`type` must be a string".to_string(),
                ))
            }
            None => return Err(BusError::MalformedEnvelope("missing `type`".to_string())),
        };
        if event_type.trim().is_empty() {
            return Err(BusError::EmptyEventType);
        }
        Ok(Self {
            event_type,
            data: fields.remove("data").unwrap_or(Value::Null),
        })
    }
}

type Callback = Arc<dyn Fn(&Value) + Send + Sync>;

#[derive(Clone)]
struct Listener {
    id: u64,
    active: Arc<AtomicBool>,
    callback: Callback,
}

#[derive(Default)]
struct Registry {
    listeners: DashMap<String, Vec<Listener>>,
    next_id: AtomicU64,
}

impl Registry {
    fn remove(&self, event_type: &str, id: u64) {
        if let Some(mut entry) = self.listeners.get_mut(event_type) {
            entry.retain(|listener| listener.id != id);
        }
        self.listeners
            .remove_if(event_type, |_, listeners| listeners.is_empty());
    }
}

/// Listener registry for server push events.
///
/// Cloning is cheap and every clone shares one registry. Each application
/// session (and each test) builds its own bus; there is no global instance.
#[derive(Clone, Default)]
pub struct EventBus {
    registry: Arc<Registry>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` for `event_type`. The returned guard removes
    /// exactly this callback when unsubscribed or dropped.
    pub fn subscribe<F>(
        &self,
        event_type: impl Into<String>,
        callback: F,
    ) -> Result<Subscription, BusError>
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let event_type = event_type.into();
        if event_type.trim().is_empty() {
            return Err(BusError::EmptyEventType);
        }

        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        let active = Arc::new(AtomicBool::new(true));
        self.registry
            .listeners
            .entry(event_type.clone())
            .or_default()
            .push(Listener {
                id,
                active: active.clone(),
                callback: Arc::new(callback),
            });
        debug!("subscribed listener {id} to '{event_type}'");

        Ok(Subscription {
            id,
            event_type,
            active,
            registry: Arc::downgrade(&self.registry),
        })
    }

    /// Invoke every live listener for the envelope's type, in registration
    /// order. Returns how many listeners ran to completion.
    ///
    /// Listeners run outside the registry lock, so they may subscribe or
    /// unsubscribe (themselves or others) while the dispatch is in progress.
    /// A listener removed mid-dispatch is not called afterwards. A panic in
    /// one listener is logged and the rest still run.
    pub fn dispatch(&self, envelope: &EventEnvelope) -> usize {
        let snapshot: Vec<Listener> = match self.registry.listeners.get(&envelope.event_type) {
            Some(entry) => entry.value().clone(),
            None => {
                trace!("no listeners for '{}'", envelope.event_type);
                return 0;
            }
        };

        let mut delivered = 0;
        for listener in snapshot {
            if !listener.active.load(Ordering::SeqCst) {
                continue;
            }
            let result = catch_unwind(AssertUnwindSafe(|| (listener.callback)(&envelope.data)));
            match result {
                Ok(()) => delivered += 1,
                Err(panic) => {
                    error!(
                        "listener {} for '{}' panicked: {}",
                        listener.id,
                        envelope.event_type,
                        panic_message(panic.as_ref())
                    );
                }
            }
        }
        trace!("dispatched '{}' to {delivered} listener(s)", envelope.event_type);
        delivered
    }

    /// Parse a raw text frame and dispatch it. Malformed frames are logged
    /// and dropped.
    pub fn dispatch_frame(&self, text: &str) -> usize {
        match EventEnvelope::parse(text) {
            Ok(envelope) => self.dispatch(&envelope),
            Err(e) => {
                warn!("dropping push frame: {e}");
                0
            }
        }
    }

    pub fn listener_count(&self, event_type: &str) -> usize {
        self.registry
            .listeners
            .get(event_type)
            .map(|entry| entry.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.registry.listeners.is_empty()
    }

    /// End of session: drop every registration. Outstanding guards become
    /// no-ops.
    pub fn dispose(&self) {
        for entry in self.registry.listeners.iter() {
            for listener in entry.value() {
                listener.active.store(false, Ordering::SeqCst);
            }
        }
        self.registry.listeners.clear();
        debug!("event bus disposed");
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("event_types", &self.registry.listeners.len())
            .finish()
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        return (*message).to_string();
    }
    if let Some(message) = panic.downcast_ref::<String>() {
        return message.clone();
    }
    "non-string panic payload".to_string()
}

/// Registration handle held by a view.
#[must_use = "dropping a Subscription unsubscribes it"]
pub struct Subscription {
    id: u64,
    event_type: String,
    active: Arc<AtomicBool>,
    registry: Weak<Registry>,
}

impl Subscription {
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn unsubscribe(mut self) {
        self.detach();
    }

    fn detach(&mut self) {
        if !self.active.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(&self.event_type, self.id);
            debug!("unsubscribed listener {} from '{}'", self.id, self.event_type);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.detach();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("event_type", &self.event_type)
            .field("active", &self.is_active())
            .finish()
    }
}
