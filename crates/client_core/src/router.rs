use std::{collections::HashMap, sync::Arc, time::Duration};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::Value;
use shared::{
    domain::{ServiceName, WalletKind},
    protocol::{
        CcSetNameData, Command, DiscrepanciesData, Envelope, LoggedInData, OutboundRequest,
        PublicKeysData, ServiceLifecycleData, StateChangedData, StatusData, WalletStateChange,
        WalletsData,
    },
};
use thiserror::Error;
use tokio::{sync::Mutex, task::JoinHandle};
use tracing::{debug, warn};

use crate::store::{EntranceScreen, StoreAction, WalletStore};

/// Delay before a just-started service gets its liveness probe.
pub const PROBE_DELAY: Duration = Duration::from_millis(1500);

/// Seam between the router and the outbound daemon transport.
#[async_trait]
pub trait ServiceBus: Send + Sync {
    async fn send(&self, request: OutboundRequest) -> Result<()>;
}

/// Wiring default for builds without a daemon transport attached;
/// every send fails.
pub struct MissingServiceBus;

#[async_trait]
impl ServiceBus for MissingServiceBus {
    async fn send(&self, request: OutboundRequest) -> Result<()> {
        Err(anyhow!("no service bus wired, dropping {request:?}"))
    }
}

#[derive(Debug, Error)]
pub enum RouterError {
    #[error("malformed {command:?} payload: {source}")]
    MalformedPayload {
        command: Command,
        source: serde_json::Error,
    },
    #[error("{command:?} payload missing field `{field}`")]
    MissingField {
        command: Command,
        field: &'static str,
    },
}

fn decode<T: serde::de::DeserializeOwned>(command: Command, data: &Value) -> Result<T, RouterError> {
    serde_json::from_value(data.clone())
        .map_err(|source| RouterError::MalformedPayload { command, source })
}

/// Backend-reported failure with a displayable reason. Matches only an
/// explicit `success: false`; an absent flag is not a failure.
fn failure_reason(data: &Value) -> Option<&str> {
    if data.get("success").and_then(Value::as_bool) != Some(false) {
        return None;
    }
    data.get("reason")
        .and_then(Value::as_str)
        .filter(|reason| !reason.is_empty())
}

/// One-shot delayed liveness probes, keyed by the started service.
/// Re-arming a service replaces its pending probe; an observed stop
/// cancels it.
pub struct ProbeScheduler {
    bus: Arc<dyn ServiceBus>,
    pending: Mutex<HashMap<ServiceName, JoinHandle<()>>>,
}

impl ProbeScheduler {
    pub fn new(bus: Arc<dyn ServiceBus>) -> Self {
        Self {
            bus,
            pending: Mutex::new(HashMap::new()),
        }
    }

    pub async fn schedule(&self, service: ServiceName) {
        let target = service.probe_target();
        let bus = Arc::clone(&self.bus);
        let task = tokio::spawn(async move {
            tokio::time::sleep(PROBE_DELAY).await;
            debug!("probing service={}", target.as_str());
            if let Err(err) = bus.send(OutboundRequest::Ping { service: target }).await {
                warn!("probe send failed service={} err={err:#}", target.as_str());
            }
        });

        if let Some(previous) = self.pending.lock().await.insert(service, task) {
            previous.abort();
        }
    }

    pub async fn cancel(&self, service: ServiceName) {
        if let Some(task) = self.pending.lock().await.remove(&service) {
            task.abort();
        }
    }
}

/// Stateless translation of inbound service messages into follow-up
/// requests and store transitions. Holds no message state of its own.
pub struct MessageRouter {
    bus: Arc<dyn ServiceBus>,
    probes: ProbeScheduler,
}

impl MessageRouter {
    pub fn new(bus: Arc<dyn ServiceBus>) -> Self {
        let probes = ProbeScheduler::new(Arc::clone(&bus));
        Self { bus, probes }
    }

    /// Handles one inbound message to completion: records it in the
    /// store log, evaluates the routing table for its command, then
    /// runs the unconditional failure check. A command can both issue
    /// its follow-ups and surface an error dialog in the same pass.
    pub async fn handle(&self, store: &mut WalletStore, envelope: Envelope) -> Result<()> {
        store.apply(StoreAction::LogMessage(envelope.clone()));

        let command = envelope.command;
        let data = &envelope.data;
        match command {
            Command::Ping => self.route_ping(envelope.origin).await?,
            Command::LogIn => {
                if decode::<StatusData>(command, data)?.success == Some(true) {
                    self.bus.send(OutboundRequest::GetWallets).await?;
                }
            }
            Command::LoggedIn => {
                if decode::<LoggedInData>(command, data)?.logged_in {
                    self.bus.send(OutboundRequest::GetWallets).await?;
                }
            }
            Command::AddKey => {
                if decode::<StatusData>(command, data)?.success == Some(true) {
                    self.bus.send(OutboundRequest::GetWallets).await?;
                    self.bus.send(OutboundRequest::GetPublicKeys).await?;
                }
            }
            Command::DeleteKey | Command::DeleteAllKeys => {
                if decode::<StatusData>(command, data)?.success == Some(true) {
                    self.bus.send(OutboundRequest::GetPublicKeys).await?;
                }
            }
            Command::GetPublicKeys => {
                let keys: PublicKeysData = decode(command, data)?;
                let screen = if keys.success && !keys.public_key_fingerprints.is_empty() {
                    EntranceScreen::SelectKeys
                } else {
                    EntranceScreen::NewWallet
                };
                store.apply(StoreAction::ChangeEntranceScreen(screen));
            }
            Command::OpenConnection | Command::CloseConnection => {
                if envelope.origin == ServiceName::Farmer {
                    self.bus
                        .send(OutboundRequest::GetConnections {
                            service: ServiceName::Farmer,
                        })
                        .await?;
                }
            }
            Command::DeletePlot => {
                self.bus.send(OutboundRequest::GetPlots).await?;
            }
            Command::GetWallets => {
                let wallets: WalletsData = decode(command, data)?;
                if wallets.success {
                    for wallet in &wallets.wallets {
                        self.bus
                            .send(OutboundRequest::GetBalanceForWallet { wallet_id: wallet.id })
                            .await?;
                        self.bus
                            .send(OutboundRequest::GetTransactions { wallet_id: wallet.id })
                            .await?;
                        self.bus
                            .send(OutboundRequest::GetPuzzleHash { wallet_id: wallet.id })
                            .await?;
                        if wallet.kind == WalletKind::ColouredCoin {
                            self.bus
                                .send(OutboundRequest::GetColourName { wallet_id: wallet.id })
                                .await?;
                            self.bus
                                .send(OutboundRequest::GetColourInfo { wallet_id: wallet.id })
                                .await?;
                        }
                    }
                }
            }
            Command::StateChanged => {
                let change: StateChangedData = decode(command, data)?;
                match change.state {
                    WalletStateChange::CoinAdded
                    | WalletStateChange::CoinRemoved
                    | WalletStateChange::PendingTransaction => {
                        let wallet_id = change.wallet_id.ok_or(RouterError::MissingField {
                            command,
                            field: "wallet_id",
                        })?;
                        self.bus
                            .send(OutboundRequest::GetBalanceForWallet { wallet_id })
                            .await?;
                        self.bus
                            .send(OutboundRequest::GetTransactions { wallet_id })
                            .await?;
                    }
                    WalletStateChange::SyncChanged => {
                        self.bus.send(OutboundRequest::GetSyncStatus).await?;
                    }
                    WalletStateChange::NewBlock => {
                        self.bus.send(OutboundRequest::GetHeightInfo).await?;
                    }
                    WalletStateChange::Other => {}
                }
            }
            Command::CreateNewWallet => {
                if decode::<StatusData>(command, data)?.success == Some(true) {
                    self.bus.send(OutboundRequest::GetWallets).await?;
                }
                store.apply(StoreAction::ResetWalletCreation);
            }
            Command::CcSetName => {
                let renamed: CcSetNameData = decode(command, data)?;
                if renamed.success {
                    let wallet_id = renamed.wallet_id.ok_or(RouterError::MissingField {
                        command,
                        field: "wallet_id",
                    })?;
                    self.bus
                        .send(OutboundRequest::GetColourName { wallet_id })
                        .await?;
                }
            }
            Command::RespondToOffer => {
                if decode::<StatusData>(command, data)?.success == Some(true) {
                    store.apply(StoreAction::OpenDialog {
                        title: "Success!".to_string(),
                        body: "Offer accepted".to_string(),
                    });
                }
                store.apply(StoreAction::ResetTrades);
            }
            Command::GetDiscrepanciesForOffer => {
                let offer: DiscrepanciesData = decode(command, data)?;
                if offer.success {
                    let discrepancies = offer.discrepancies.ok_or(RouterError::MissingField {
                        command,
                        field: "discrepancies",
                    })?;
                    store.apply(StoreAction::OfferParsed(discrepancies));
                }
            }
            Command::StartService => {
                let started: ServiceLifecycleData = decode(command, data)?;
                let already_running = started.error.as_deref() == Some("already running");
                if started.success || already_running {
                    if let Some(service) = started.service {
                        self.probes.schedule(service).await;
                    }
                }
            }
            Command::StopService => {
                let stopped: ServiceLifecycleData = decode(command, data)?;
                if stopped.success {
                    if let Some(service) = stopped.service {
                        self.probes.cancel(service).await;
                    }
                }
            }
            Command::Other => {}
        }

        // Runs after the command-specific branch for every message.
        if let Some(reason) = failure_reason(data) {
            store.apply(StoreAction::OpenDialog {
                title: "Error".to_string(),
                body: reason.to_string(),
            });
        }

        Ok(())
    }

    async fn route_ping(&self, origin: ServiceName) -> Result<()> {
        match origin {
            ServiceName::WalletServer => {
                debug!("ping from wallet server, refreshing wallet state");
                self.bus.send(OutboundRequest::GetPublicKeys).await?;
                self.bus.send(OutboundRequest::GetWallets).await?;
                self.bus.send(OutboundRequest::GetHeightInfo).await?;
                self.bus.send(OutboundRequest::GetSyncStatus).await?;
                self.bus
                    .send(OutboundRequest::GetConnections {
                        service: ServiceName::WalletServer,
                    })
                    .await?;
            }
            ServiceName::FullNode => {
                self.bus.send(OutboundRequest::GetBlockchainState).await?;
                self.bus.send(OutboundRequest::GetLatestBlocks).await?;
                self.bus
                    .send(OutboundRequest::GetConnections {
                        service: ServiceName::FullNode,
                    })
                    .await?;
            }
            ServiceName::Farmer => {
                self.bus.send(OutboundRequest::GetLatestChallenges).await?;
                self.bus
                    .send(OutboundRequest::GetConnections {
                        service: ServiceName::Farmer,
                    })
                    .await?;
            }
            ServiceName::Harvester => {
                self.bus.send(OutboundRequest::GetPlots).await?;
            }
            ServiceName::Simulator => {}
        }
        Ok(())
    }
}
