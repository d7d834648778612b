//! Renderer-side glue between the backend service bus and local
//! application state: the message router, the state store it dispatches
//! into, and the connection lifecycle client.

pub mod client;
pub mod router;
pub mod store;

pub use client::{ConnectionClient, ConnectionControl, ListenerId, StateSubscription};
pub use router::{
    MessageRouter, MissingServiceBus, ProbeScheduler, RouterError, ServiceBus, PROBE_DELAY,
};
pub use store::{
    Dialog, EntranceScreen, LoggedMessage, StoreAction, TradeState, WalletCreationState,
    WalletStore,
};

#[cfg(test)]
mod tests;
