//! Websocket transport to the local daemon. Implements both seams the
//! client core needs: the outbound service bus and the connection
//! lifecycle control.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use anyhow::{Context, Result};
use async_trait::async_trait;
use client_core::{ConnectionControl, ListenerId, ServiceBus};
use futures::{
    stream::{SplitSink, StreamExt},
    SinkExt,
};
use serde::Serialize;
use shared::{
    domain::ServiceName,
    error::{DaemonError, DaemonException, ErrorCode},
    protocol::{
        ConnectionState, ConnectionStatus, ConnectionStatusUpdate, Envelope, OutboundRequest,
    },
};
use tokio::{
    net::TcpStream,
    sync::{mpsc, Mutex, RwLock},
};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{info, warn};

const RECONNECT_DELAY: Duration = Duration::from_secs(1);

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// Wire frame for an outbound request: the `{command, args}` pair plus
/// the service it should be forwarded to.
#[derive(Serialize)]
struct OutboundFrame<'a> {
    destination: ServiceName,
    #[serde(flatten)]
    request: &'a OutboundRequest,
}

#[derive(Serialize)]
struct LifecycleFrame {
    command: &'static str,
    args: LifecycleArgs,
}

#[derive(Serialize)]
struct LifecycleArgs {
    service: ServiceName,
}

/// What a raw daemon frame turned out to be.
#[derive(Debug)]
enum InboundFrame {
    Message(Envelope),
    Fault(DaemonError),
    Undecodable(serde_json::Error),
}

fn classify_frame(raw: &str) -> InboundFrame {
    match serde_json::from_str::<Envelope>(raw) {
        Ok(envelope) => InboundFrame::Message(envelope),
        Err(err) => match serde_json::from_str::<DaemonError>(raw) {
            Ok(fault) => InboundFrame::Fault(fault),
            Err(_) => InboundFrame::Undecodable(err),
        },
    }
}

pub struct DaemonTransport {
    sink: Mutex<Option<WsSink>>,
    status: RwLock<ConnectionStatus>,
    listeners: Mutex<HashMap<u64, mpsc::Sender<ConnectionStatusUpdate>>>,
    next_listener: AtomicU64,
}

impl DaemonTransport {
    /// Dials the daemon, retrying up to `attempts` times, and returns
    /// the transport plus the stream of inbound envelopes.
    pub async fn connect(url: &str, attempts: u32) -> Result<(Arc<Self>, mpsc::Receiver<Envelope>)> {
        let transport = Arc::new(Self {
            sink: Mutex::new(None),
            status: RwLock::new(ConnectionStatus {
                state: ConnectionState::Connecting,
                attempt: 0,
                service_name: None,
            }),
            listeners: Mutex::new(HashMap::new()),
            next_listener: AtomicU64::new(1),
        });

        let mut attempt = 0;
        let stream = loop {
            attempt += 1;
            transport
                .apply_status(ConnectionStatusUpdate {
                    state: Some(ConnectionState::Connecting),
                    attempt: Some(attempt),
                    service_name: None,
                })
                .await;

            match connect_async(url).await {
                Ok((stream, _response)) => break stream,
                Err(err) if attempt < attempts => {
                    warn!("daemon connect failed attempt={attempt} err={err}");
                    tokio::time::sleep(RECONNECT_DELAY).await;
                }
                Err(err) => {
                    transport
                        .apply_status(ConnectionStatusUpdate {
                            state: Some(ConnectionState::Error),
                            attempt: Some(attempt),
                            service_name: None,
                        })
                        .await;
                    return Err(err).with_context(|| format!("failed to connect daemon at {url}"));
                }
            }
        };

        let (sink, mut source) = stream.split();
        *transport.sink.lock().await = Some(sink);
        transport
            .apply_status(ConnectionStatusUpdate {
                state: Some(ConnectionState::Connected),
                attempt: Some(attempt),
                service_name: None,
            })
            .await;
        info!("daemon connected url={url} attempt={attempt}");

        let (inbound_tx, inbound_rx) = mpsc::channel(256);
        let reader = Arc::clone(&transport);
        tokio::spawn(async move {
            while let Some(message) = source.next().await {
                match message {
                    Ok(Message::Text(raw)) => match classify_frame(&raw) {
                        InboundFrame::Message(envelope) => {
                            if inbound_tx.send(envelope).await.is_err() {
                                break;
                            }
                        }
                        InboundFrame::Fault(fault) => {
                            warn!(
                                "daemon reported fault code={:?} message={}",
                                fault.code, fault.message
                            );
                        }
                        InboundFrame::Undecodable(err) => {
                            warn!("dropping undecodable frame err={err}");
                        }
                    },
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(err) => {
                        warn!("daemon read failed err={err}");
                        break;
                    }
                }
            }

            *reader.sink.lock().await = None;
            reader
                .apply_status(ConnectionStatusUpdate {
                    state: Some(ConnectionState::Closed),
                    attempt: None,
                    service_name: None,
                })
                .await;
        });

        Ok((transport, inbound_rx))
    }

    async fn apply_status(&self, update: ConnectionStatusUpdate) {
        update.apply_to(&mut *self.status.write().await);

        let mut listeners = self.listeners.lock().await;
        listeners.retain(|id, sender| match sender.try_send(update.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                // The listener's cached snapshot misses this delta
                // until it catches up.
                warn!("status listener id={id} lagging, dropping delta");
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
    }

    async fn send_text(&self, frame: String) -> Result<bool> {
        let mut sink = self.sink.lock().await;
        let Some(sink) = sink.as_mut() else {
            return Ok(false);
        };
        sink.send(Message::Text(frame))
            .await
            .context("daemon send failed")?;
        Ok(true)
    }
}

#[async_trait]
impl ServiceBus for DaemonTransport {
    async fn send(&self, request: OutboundRequest) -> Result<()> {
        let frame = serde_json::to_string(&OutboundFrame {
            destination: request.destination(),
            request: &request,
        })?;

        if !self.send_text(frame).await? {
            return Err(DaemonException::new(
                ErrorCode::NotRunning,
                "daemon connection is closed",
            )
            .into());
        }
        Ok(())
    }
}

#[async_trait]
impl ConnectionControl for DaemonTransport {
    async fn close(&self, force: bool) -> Result<bool> {
        let Some(mut sink) = self.sink.lock().await.take() else {
            return Ok(false);
        };

        if force {
            // Forced close drops the socket without a close handshake.
            drop(sink);
        } else if let Err(err) = sink.send(Message::Close(None)).await {
            warn!("close handshake failed err={err}");
        }

        self.apply_status(ConnectionStatusUpdate {
            state: Some(ConnectionState::Closed),
            attempt: None,
            service_name: None,
        })
        .await;
        Ok(true)
    }

    async fn start_service(&self, service: ServiceName) -> Result<bool> {
        let frame = serde_json::to_string(&LifecycleFrame {
            command: "start_service",
            args: LifecycleArgs { service },
        })?;
        self.send_text(frame).await
    }

    async fn stop_service(&self, service: ServiceName) -> Result<bool> {
        let frame = serde_json::to_string(&LifecycleFrame {
            command: "stop_service",
            args: LifecycleArgs { service },
        })?;
        self.send_text(frame).await
    }

    async fn current_status(&self) -> Result<ConnectionStatus> {
        Ok(self.status.read().await.clone())
    }

    async fn register_listener(
        &self,
    ) -> Result<(ListenerId, mpsc::Receiver<ConnectionStatusUpdate>)> {
        let id = self.next_listener.fetch_add(1, Ordering::SeqCst);
        let (sender, receiver) = mpsc::channel(16);
        self.listeners.lock().await.insert(id, sender);
        Ok((ListenerId(id), receiver))
    }

    async fn release_listener(&self, id: ListenerId) {
        self.listeners.lock().await.remove(&id.0);
    }
}
