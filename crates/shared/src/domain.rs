use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident, $inner:ty) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub $inner);
    };
}

id_newtype!(WalletId, i64);
id_newtype!(Fingerprint, u32);

/// The fixed set of backend processes the front end talks to. Used as a
/// routing key only; services have no lifecycle object on this side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceName {
    WalletServer,
    FullNode,
    Simulator,
    Farmer,
    Harvester,
}

impl ServiceName {
    pub fn as_str(self) -> &'static str {
        match self {
            ServiceName::WalletServer => "wallet_server",
            ServiceName::FullNode => "full_node",
            ServiceName::Simulator => "simulator",
            ServiceName::Farmer => "farmer",
            ServiceName::Harvester => "harvester",
        }
    }

    /// The service a liveness probe should be addressed to once this
    /// service has been started. The simulator answers on the full node
    /// probe path.
    pub fn probe_target(self) -> ServiceName {
        match self {
            ServiceName::Simulator => ServiceName::FullNode,
            other => other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WalletKind {
    StandardWallet,
    RateLimited,
    /// Colour-coin wallets require extra metadata requests (colour name
    /// and colour info) beyond the standard set.
    ColouredCoin,
    #[serde(other)]
    Other,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_name_round_trips_snake_case() {
        let json = serde_json::to_string(&ServiceName::FullNode).expect("serialize");
        assert_eq!(json, "\"full_node\"");
        let parsed: ServiceName = serde_json::from_str("\"wallet_server\"").expect("deserialize");
        assert_eq!(parsed, ServiceName::WalletServer);
    }

    #[test]
    fn simulator_probes_as_full_node() {
        assert_eq!(ServiceName::Simulator.probe_target(), ServiceName::FullNode);
        assert_eq!(ServiceName::Farmer.probe_target(), ServiceName::Farmer);
    }

    #[test]
    fn unknown_wallet_kind_falls_back_to_other() {
        let parsed: WalletKind = serde_json::from_str("\"COLOURED_COIN\"").expect("deserialize");
        assert_eq!(parsed, WalletKind::ColouredCoin);
        let parsed: WalletKind = serde_json::from_str("\"DISTRIBUTED_ID\"").expect("deserialize");
        assert_eq!(parsed, WalletKind::Other);
    }
}
