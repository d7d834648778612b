use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use anyhow::Result;
use async_trait::async_trait;
use shared::{
    domain::ServiceName,
    protocol::{ConnectionState, ConnectionStatus, ConnectionStatusUpdate},
};
use tokio::sync::{mpsc, Mutex};

use crate::client::{ConnectionClient, ConnectionControl, ListenerId};

struct TestControl {
    status: ConnectionStatus,
    next_listener: AtomicU64,
    push: Mutex<Option<mpsc::Sender<ConnectionStatusUpdate>>>,
    released: Mutex<Vec<ListenerId>>,
    calls: Mutex<Vec<String>>,
}

impl TestControl {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            status: ConnectionStatus {
                state: ConnectionState::Connecting,
                attempt: 2,
                service_name: Some(ServiceName::WalletServer),
            },
            next_listener: AtomicU64::new(1),
            push: Mutex::new(None),
            released: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
        })
    }

    async fn push_update(&self, update: ConnectionStatusUpdate) {
        let guard = self.push.lock().await;
        let sender = guard.as_ref().expect("listener registered");
        sender.send(update).await.expect("push update");
    }

    async fn released(&self) -> Vec<ListenerId> {
        self.released.lock().await.clone()
    }
}

#[async_trait]
impl ConnectionControl for TestControl {
    async fn close(&self, force: bool) -> Result<bool> {
        self.calls.lock().await.push(format!("close force={force}"));
        Ok(true)
    }

    async fn start_service(&self, service: ServiceName) -> Result<bool> {
        self.calls
            .lock()
            .await
            .push(format!("start {}", service.as_str()));
        Ok(true)
    }

    async fn stop_service(&self, service: ServiceName) -> Result<bool> {
        self.calls
            .lock()
            .await
            .push(format!("stop {}", service.as_str()));
        Ok(false)
    }

    async fn current_status(&self) -> Result<ConnectionStatus> {
        Ok(self.status.clone())
    }

    async fn register_listener(
        &self,
    ) -> Result<(ListenerId, mpsc::Receiver<ConnectionStatusUpdate>)> {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::SeqCst));
        let (sender, receiver) = mpsc::channel(8);
        *self.push.lock().await = Some(sender);
        Ok((id, receiver))
    }

    async fn release_listener(&self, id: ListenerId) {
        self.released.lock().await.push(id);
    }
}

async fn settle() {
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn get_state_returns_the_loaded_snapshot() {
    let control = TestControl::new();
    let client = ConnectionClient::new(control.clone());

    let mut subscription = client.get_state().await.expect("subscribe");
    let status = subscription.status().await;
    assert_eq!(status.state, ConnectionState::Connecting);
    assert_eq!(status.attempt, 2);

    subscription.unsubscribe().await;
}

#[tokio::test]
async fn pushed_deltas_are_applied_onto_the_cached_snapshot() {
    let control = TestControl::new();
    let client = ConnectionClient::new(control.clone());
    let mut subscription = client.get_state().await.expect("subscribe");

    control
        .push_update(ConnectionStatusUpdate {
            state: Some(ConnectionState::Connected),
            attempt: None,
            service_name: None,
        })
        .await;
    settle().await;

    let status = subscription.status().await;
    assert_eq!(status.state, ConnectionState::Connected);
    // Untouched fields keep their snapshot values.
    assert_eq!(status.attempt, 2);
    assert_eq!(status.service_name, Some(ServiceName::WalletServer));

    subscription.unsubscribe().await;
}

#[tokio::test]
async fn unsubscribe_releases_the_listener_exactly_once() {
    let control = TestControl::new();
    let client = ConnectionClient::new(control.clone());
    let mut subscription = client.get_state().await.expect("subscribe");

    subscription.unsubscribe().await;
    subscription.unsubscribe().await;

    assert_eq!(control.released().await, vec![ListenerId(1)]);
}

#[tokio::test]
async fn dropping_the_subscription_also_releases_the_listener() {
    let control = TestControl::new();
    let client = ConnectionClient::new(control.clone());
    let subscription = client.get_state().await.expect("subscribe");

    drop(subscription);
    settle().await;

    assert_eq!(control.released().await, vec![ListenerId(1)]);
}

#[tokio::test]
async fn unsubscribed_subscription_drops_without_a_second_release() {
    let control = TestControl::new();
    let client = ConnectionClient::new(control.clone());
    let mut subscription = client.get_state().await.expect("subscribe");

    subscription.unsubscribe().await;
    drop(subscription);
    settle().await;

    assert_eq!(control.released().await.len(), 1);
}

#[tokio::test]
async fn dropping_outside_a_runtime_is_quiet_and_skips_the_release() {
    let control = TestControl::new();
    let client = ConnectionClient::new(control.clone());
    let subscription = client.get_state().await.expect("subscribe");

    std::thread::spawn(move || drop(subscription))
        .join()
        .expect("drop thread");
    settle().await;

    assert!(control.released().await.is_empty());
}

#[tokio::test]
async fn lifecycle_operations_pass_through_to_the_connection() {
    let control = TestControl::new();
    let client = ConnectionClient::new(control.clone());

    assert!(client.close(true).await.expect("close"));
    assert!(client
        .start_service(ServiceName::Farmer)
        .await
        .expect("start"));
    assert!(!client
        .stop_service(ServiceName::Farmer)
        .await
        .expect("stop"));

    assert_eq!(
        control.calls.lock().await.clone(),
        vec!["close force=true", "start farmer", "stop farmer"]
    );
}
