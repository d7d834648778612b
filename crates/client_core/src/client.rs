use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use shared::{
    domain::ServiceName,
    protocol::{ConnectionStatus, ConnectionStatusUpdate},
};
use tokio::{
    sync::{mpsc, RwLock},
    task::JoinHandle,
};
use tracing::debug;

/// Opaque handle for a registered push listener on the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

/// Seam over the daemon connection's lifecycle operations. Implemented
/// by the transport; test doubles stand in for it elsewhere.
#[async_trait]
pub trait ConnectionControl: Send + Sync {
    async fn close(&self, force: bool) -> Result<bool>;
    async fn start_service(&self, service: ServiceName) -> Result<bool>;
    async fn stop_service(&self, service: ServiceName) -> Result<bool>;
    async fn current_status(&self) -> Result<ConnectionStatus>;
    /// Registers a push listener and returns its id plus the stream of
    /// status deltas it will receive.
    async fn register_listener(
        &self,
    ) -> Result<(ListenerId, mpsc::Receiver<ConnectionStatusUpdate>)>;
    async fn release_listener(&self, id: ListenerId);
}

/// Adapts one connection's lifecycle into the request/response plus
/// live-subscription idiom the rest of the application uses.
pub struct ConnectionClient {
    control: Arc<dyn ConnectionControl>,
}

impl ConnectionClient {
    pub fn new(control: Arc<dyn ConnectionControl>) -> Self {
        Self { control }
    }

    pub async fn close(&self, force: bool) -> Result<bool> {
        self.control.close(force).await
    }

    pub async fn start_service(&self, service: ServiceName) -> Result<bool> {
        self.control.start_service(service).await
    }

    pub async fn stop_service(&self, service: ServiceName) -> Result<bool> {
        self.control.stop_service(service).await
    }

    /// Loads the current status snapshot, then attaches a push listener
    /// that applies every delta onto the cached snapshot until the
    /// returned subscription is dropped or unsubscribed.
    pub async fn get_state(&self) -> Result<StateSubscription> {
        let snapshot = self.control.current_status().await?;
        let shared = Arc::new(RwLock::new(snapshot));

        let (id, mut updates) = self.control.register_listener().await?;
        let cache = Arc::clone(&shared);
        let apply_task = tokio::spawn(async move {
            while let Some(update) = updates.recv().await {
                update.apply_to(&mut *cache.write().await);
            }
        });

        Ok(StateSubscription {
            control: Arc::clone(&self.control),
            shared,
            listener: Some((id, apply_task)),
        })
    }
}

/// Live view of the connection status. The underlying listener is
/// released exactly once, whether through `unsubscribe` or drop.
pub struct StateSubscription {
    control: Arc<dyn ConnectionControl>,
    shared: Arc<RwLock<ConnectionStatus>>,
    listener: Option<(ListenerId, JoinHandle<()>)>,
}

impl StateSubscription {
    pub async fn status(&self) -> ConnectionStatus {
        self.shared.read().await.clone()
    }

    /// Idempotent: a second call is a no-op.
    pub async fn unsubscribe(&mut self) {
        if let Some((id, task)) = self.listener.take() {
            task.abort();
            self.control.release_listener(id).await;
            debug!("released connection state listener id={}", id.0);
        }
    }
}

impl Drop for StateSubscription {
    fn drop(&mut self) {
        if let Some((id, task)) = self.listener.take() {
            task.abort();
            let control = Arc::clone(&self.control);
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    handle.spawn(async move {
                        control.release_listener(id).await;
                    });
                }
                // Release needs a runtime to run on. Callers tearing
                // down outside one must use `unsubscribe`.
                Err(_) => debug!("dropped outside a runtime, listener id={} leaked", id.0),
            }
        }
    }
}
