use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{Fingerprint, ServiceName, WalletId, WalletKind};

/// Command tag of an inbound daemon message. Closed so the router match
/// is exhaustive; tags we do not route still hit the failure catch-all
/// through `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    Ping,
    LogIn,
    LoggedIn,
    AddKey,
    DeleteKey,
    DeleteAllKeys,
    GetPublicKeys,
    OpenConnection,
    CloseConnection,
    DeletePlot,
    GetWallets,
    StateChanged,
    CreateNewWallet,
    CcSetName,
    RespondToOffer,
    GetDiscrepanciesForOffer,
    StartService,
    StopService,
    #[serde(other)]
    Other,
}

/// Inbound tagged message from a backend service connection. `data` is
/// kept opaque at the envelope level; the router decodes it per command
/// with presence checks only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub command: Command,
    pub origin: ServiceName,
    #[serde(default)]
    pub data: Value,
}

/// Generic success/reason shape shared by most command responses.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatusData {
    pub success: Option<bool>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggedInData {
    #[serde(default)]
    pub logged_in: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PublicKeysData {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub public_key_fingerprints: Vec<Fingerprint>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WalletSummary {
    pub id: WalletId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub kind: WalletKind,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WalletsData {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub wallets: Vec<WalletSummary>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalletStateChange {
    CoinAdded,
    CoinRemoved,
    PendingTransaction,
    SyncChanged,
    NewBlock,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StateChangedData {
    pub state: WalletStateChange,
    #[serde(default)]
    pub wallet_id: Option<WalletId>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceLifecycleData {
    #[serde(default)]
    pub service: Option<ServiceName>,
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CcSetNameData {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub wallet_id: Option<WalletId>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiscrepanciesData {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub discrepancies: Option<std::collections::HashMap<String, i64>>,
}

/// Follow-up request the router issues back to a backend service.
/// Serializes as a `{command, args}` pair; transport framing is owned
/// by the daemon connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", content = "args", rename_all = "snake_case")]
pub enum OutboundRequest {
    GetPublicKeys,
    GetWallets,
    GetHeightInfo,
    GetSyncStatus,
    GetConnections { service: ServiceName },
    GetBlockchainState,
    GetLatestBlocks,
    GetLatestChallenges,
    GetPlots,
    GetBalanceForWallet { wallet_id: WalletId },
    GetTransactions { wallet_id: WalletId },
    GetPuzzleHash { wallet_id: WalletId },
    GetColourName { wallet_id: WalletId },
    GetColourInfo { wallet_id: WalletId },
    Ping { service: ServiceName },
}

impl OutboundRequest {
    pub fn destination(&self) -> ServiceName {
        match self {
            OutboundRequest::GetPublicKeys
            | OutboundRequest::GetWallets
            | OutboundRequest::GetHeightInfo
            | OutboundRequest::GetSyncStatus
            | OutboundRequest::GetBalanceForWallet { .. }
            | OutboundRequest::GetTransactions { .. }
            | OutboundRequest::GetPuzzleHash { .. }
            | OutboundRequest::GetColourName { .. }
            | OutboundRequest::GetColourInfo { .. } => ServiceName::WalletServer,
            OutboundRequest::GetBlockchainState | OutboundRequest::GetLatestBlocks => {
                ServiceName::FullNode
            }
            OutboundRequest::GetLatestChallenges => ServiceName::Farmer,
            OutboundRequest::GetPlots => ServiceName::Harvester,
            OutboundRequest::GetConnections { service } | OutboundRequest::Ping { service } => {
                *service
            }
        }
    }
}

/// Link health to one service connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Connecting,
    Connected,
    Closed,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    pub attempt: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_name: Option<ServiceName>,
}

/// Partial status delta pushed over the live subscription. Only present
/// fields overwrite the cached snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionStatusUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<ConnectionState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempt: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_name: Option<ServiceName>,
}

impl ConnectionStatusUpdate {
    pub fn apply_to(&self, status: &mut ConnectionStatus) {
        if let Some(state) = self.state {
            status.state = state;
        }
        if let Some(attempt) = self.attempt {
            status.attempt = attempt;
        }
        if let Some(service_name) = self.service_name {
            status.service_name = Some(service_name);
        }
    }
}
