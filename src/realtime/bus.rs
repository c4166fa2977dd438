use super::event::{DataChangeEvent, PushMessage};
use crate::error::{Error, Result};
use crate::fetch::Side;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, Weak};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub type EventCallback = Arc<dyn Fn(&DataChangeEvent) + Send + Sync>;

/// Delivers one serialized event to an external push client
pub type PushSink = Arc<dyn Fn(&str) -> Result<()> + Send + Sync>;

struct Listener {
    id: String,
    callback: EventCallback,
}

/// Publish/subscribe keyed by component id, with push-channel fan-out
pub struct RealtimeBus {
    side: Side,
    channels: RwLock<HashMap<String, Vec<Listener>>>,
    sse_clients: RwLock<HashMap<String, PushSink>>,
}

impl std::fmt::Debug for RealtimeBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeBus")
            .field("side", &self.side)
            .field("subscribers", &self.subscriber_count())
            .field("sse_clients", &self.sse_client_count())
            .finish()
    }
}

impl RealtimeBus {
    #[must_use]
    pub fn new(side: Side) -> Arc<Self> {
        Arc::new(Self {
            side,
            channels: RwLock::new(HashMap::new()),
            sse_clients: RwLock::new(HashMap::new()),
        })
    }

    #[must_use]
    pub const fn side(&self) -> Side {
        self.side
    }

    /// Registers `callback` for `component_id`; dropping the handle deregisters it.
    pub fn subscribe(
        self: &Arc<Self>,
        component_id: &str,
        callback: impl Fn(&DataChangeEvent) + Send + Sync + 'static,
    ) -> Subscription {
        let id = Uuid::new_v4().to_string();
        self.channels
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(component_id.to_string())
            .or_default()
            .push(Listener {
                id: id.clone(),
                callback: Arc::new(callback),
            });
        debug!("📡 Subscribed {} to {}", id, component_id);

        Subscription {
            id,
            component_id: component_id.to_string(),
            bus: Arc::downgrade(self),
        }
    }

    fn remove_listener(&self, component_id: &str, listener_id: &str) -> bool {
        let mut channels = self.channels.write().unwrap_or_else(PoisonError::into_inner);
        let Some(listeners) = channels.get_mut(component_id) else {
            return false;
        };
        let before = listeners.len();
        listeners.retain(|l| l.id != listener_id);
        let removed = listeners.len() < before;
        if listeners.is_empty() {
            channels.remove(component_id);
        }
        removed
    }

    /// Invokes the component's callbacks in subscription order, then pushes
    /// the event to external clients when running server-side.
    pub fn publish(&self, event: &DataChangeEvent) {
        let callbacks: Vec<EventCallback> = self
            .channels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&event.component_id)
            .map(|listeners| listeners.iter().map(|l| Arc::clone(&l.callback)).collect())
            .unwrap_or_default();

        debug!(
            "📣 Publish {:?} for {} to {} listeners",
            event.action,
            event.component_id,
            callbacks.len()
        );
        for callback in callbacks {
            callback(event);
        }

        if self.side.is_server() {
            self.broadcast(event);
        }
    }

    fn broadcast(&self, event: &DataChangeEvent) {
        let payload = match serde_json::to_string(event) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Failed to serialize event for {}: {}", event.component_id, e);
                return;
            }
        };

        let sinks: Vec<(String, PushSink)> = self
            .sse_clients
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(id, sink)| (id.clone(), Arc::clone(sink)))
            .collect();

        let failed: Vec<String> = sinks
            .into_iter()
            .filter_map(|(id, sink)| match sink(&payload) {
                Ok(()) => None,
                Err(e) => {
                    warn!("🔌 Dropping push client {}: {}", id, e);
                    Some(id)
                }
            })
            .collect();

        if !failed.is_empty() {
            let mut clients = self.sse_clients.write().unwrap_or_else(PoisonError::into_inner);
            for id in failed {
                clients.remove(&id);
            }
        }
    }

    pub fn register_sse_client(&self, client_id: impl Into<String>, sink: PushSink) {
        let client_id = client_id.into();
        info!("🔌 Push client registered: {}", client_id);
        self.sse_clients
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(client_id, sink);
    }

    pub fn unregister_sse_client(&self, client_id: &str) -> bool {
        let removed = self
            .sse_clients
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(client_id)
            .is_some();
        if removed {
            info!("🔌 Push client unregistered: {}", client_id);
        }
        removed
    }

    /// Registers a channel-backed push client. The stream yields the
    /// `connected` handshake first, then every broadcast payload; dropping
    /// it makes the next broadcast remove the client.
    pub fn register_channel_client(&self, client_id: &str) -> UnboundedReceiverStream<String> {
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(PushMessage::connected_payload(client_id));

        let sink: PushSink = Arc::new(move |payload: &str| {
            tx.send(payload.to_string())
                .map_err(|_| Error::Custom("push channel closed".to_string()))
        });
        self.register_sse_client(client_id, sink);
        UnboundedReceiverStream::new(rx)
    }

    pub fn subscriber_count(&self) -> usize {
        self.channels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(Vec::len)
            .sum()
    }

    pub fn subscribers_for(&self, component_id: &str) -> usize {
        self.channels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(component_id)
            .map_or(0, Vec::len)
    }

    pub fn sse_client_count(&self) -> usize {
        self.sse_clients.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Drops every listener and push client.
    pub fn clear(&self) {
        self.channels.write().unwrap_or_else(PoisonError::into_inner).clear();
        self.sse_clients.write().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

/// Handle to one bus listener; deregisters on `unsubscribe` or drop
#[derive(Debug)]
pub struct Subscription {
    id: String,
    component_id: String,
    bus: Weak<RealtimeBus>,
}

impl Subscription {
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn component_id(&self) -> &str {
        &self.component_id
    }

    /// Returns whether the listener was still registered.
    pub fn unsubscribe(self) -> bool {
        self.detach()
    }

    fn detach(&self) -> bool {
        self.bus
            .upgrade()
            .is_some_and(|bus| bus.remove_listener(&self.component_id, &self.id))
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.detach();
    }
}
