use super::bus::{EventCallback, RealtimeBus, Subscription};
use super::event::{DataChangeEvent, PushMessage};
use super::sse::PushConnector;
use crate::config::ReconnectPolicy;
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    /// Reconnect attempts exhausted; only the local bus still delivers
    GaveUp,
    Closed,
}

/// Consumer-side realtime hook for one component.
///
/// Local bus events arrive synchronously; push-channel events arrive from a
/// background task that reconnects with capped exponential backoff. Both
/// paths call the same callback, which must tolerate seeing one logical
/// change twice.
pub struct RealtimeSubscription {
    component_id: String,
    local: Option<Subscription>,
    task: Option<JoinHandle<()>>,
    state_tx: Arc<watch::Sender<ConnectionState>>,
}

impl std::fmt::Debug for RealtimeSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeSubscription")
            .field("component_id", &self.component_id)
            .field("state", &*self.state_tx.borrow())
            .finish_non_exhaustive()
    }
}

impl RealtimeSubscription {
    /// Subscribes to the bus and, when a connector is given, spawns the
    /// push-channel loop. Must be called inside a tokio runtime.
    pub fn start(
        bus: &Arc<RealtimeBus>,
        component_id: impl Into<String>,
        connector: Option<Arc<dyn PushConnector>>,
        policy: ReconnectPolicy,
        callback: impl Fn(&DataChangeEvent) + Send + Sync + 'static,
    ) -> Self {
        let component_id = component_id.into();
        let callback: EventCallback = Arc::new(callback);

        let local_callback = Arc::clone(&callback);
        let local = bus.subscribe(&component_id, move |event| local_callback(event));

        let initial = if connector.is_some() {
            ConnectionState::Connecting
        } else {
            ConnectionState::Closed
        };
        let state_tx = Arc::new(watch::channel(initial).0);

        let task = connector.map(|connector| {
            let component_id = component_id.clone();
            let state_tx = Arc::clone(&state_tx);
            tokio::spawn(async move {
                run_push_loop(connector, component_id, callback, policy, state_tx).await;
            })
        });

        Self {
            component_id,
            local: Some(local),
            task,
            state_tx,
        }
    }

    #[must_use]
    pub fn component_id(&self) -> &str {
        &self.component_id
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Stops the reconnect loop and leaves the bus.
    pub fn close(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        if let Some(local) = self.local.take() {
            local.unsubscribe();
        }
        self.state_tx.send_replace(ConnectionState::Closed);
        debug!("Realtime subscription for {} closed", self.component_id);
    }
}

impl Drop for RealtimeSubscription {
    fn drop(&mut self) {
        self.close();
    }
}

async fn run_push_loop(
    connector: Arc<dyn PushConnector>,
    component_id: String,
    callback: EventCallback,
    policy: ReconnectPolicy,
    state_tx: Arc<watch::Sender<ConnectionState>>,
) {
    let mut failures: u32 = 0;

    loop {
        state_tx.send_replace(ConnectionState::Connecting);
        match connector.connect().await {
            Ok(mut messages) => {
                failures = 0;
                state_tx.send_replace(ConnectionState::Connected);
                info!("📡 Push channel open for {}", component_id);

                while let Some(message) = messages.next().await {
                    match message {
                        Ok(payload) => dispatch(&payload, &component_id, &callback),
                        Err(e) => {
                            warn!("📡 Push channel error for {}: {}", component_id, e);
                            break;
                        }
                    }
                }
            }
            Err(e) => warn!("📡 Push channel connect failed for {}: {}", component_id, e),
        }

        failures += 1;
        if failures >= policy.max_attempts {
            debug!(
                "Giving up on push channel for {} after {} attempts",
                component_id, failures
            );
            state_tx.send_replace(ConnectionState::GaveUp);
            return;
        }

        let delay = policy.delay(failures);
        debug!("🔄 Reconnecting {} in {}ms", component_id, delay.as_millis());
        sleep(delay).await;
    }
}

fn dispatch(payload: &str, component_id: &str, callback: &EventCallback) {
    match PushMessage::parse(payload) {
        Some(PushMessage::Connected { client_id }) => {
            debug!("Push channel handshake for {}: client {}", component_id, client_id);
        }
        Some(PushMessage::Change(event)) if event.component_id == component_id => callback(&event),
        Some(PushMessage::Change(_)) => {}
        None => debug!("Ignoring unrecognized push message: {}", payload),
    }
}
