use std::collections::HashMap;

use chrono::{DateTime, Utc};
use shared::protocol::Envelope;
use tokio::sync::broadcast;
use tracing::debug;

/// Which entrance screen the key-selection flow should present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EntranceScreen {
    #[default]
    Entrance,
    SelectKeys,
    NewWallet,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dialog {
    pub title: String,
    pub body: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WalletCreationState {
    pub pending: bool,
    pub created: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TradeState {
    /// Parsed offer discrepancies keyed by colour, set once an offer
    /// file has been inspected.
    pub discrepancies: Option<HashMap<String, i64>>,
}

/// Inbound message as recorded in the display/debug log.
#[derive(Debug, Clone)]
pub struct LoggedMessage {
    pub envelope: Envelope,
    pub received_at: DateTime<Utc>,
}

/// State transition dispatched into the store. This is the only way
/// store state changes; view components consume the same actions via
/// the observer channel.
#[derive(Debug, Clone)]
pub enum StoreAction {
    LogMessage(Envelope),
    ChangeEntranceScreen(EntranceScreen),
    OpenDialog { title: String, body: String },
    ResetWalletCreation,
    ResetTrades,
    OfferParsed(HashMap<String, i64>),
}

/// Central application state. Owned by the caller and handed to the
/// router by mutable reference; never shared behind a global.
#[derive(Debug, Default)]
pub struct WalletStore {
    message_log: Vec<LoggedMessage>,
    entrance_screen: EntranceScreen,
    dialogs: Vec<Dialog>,
    wallet_creation: WalletCreationState,
    trade: TradeState,
    observer: Option<broadcast::Sender<StoreAction>>,
}

impl WalletStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every applied action is also mirrored to the returned channel so
    /// a view layer can react without reaching into the store.
    pub fn subscribe(&mut self) -> broadcast::Receiver<StoreAction> {
        match &self.observer {
            Some(sender) => sender.subscribe(),
            None => {
                let (sender, receiver) = broadcast::channel(256);
                self.observer = Some(sender);
                receiver
            }
        }
    }

    pub fn apply(&mut self, action: StoreAction) {
        if let Some(observer) = &self.observer {
            // Receivers may have gone away; the store is still the
            // source of truth.
            let _ = observer.send(action.clone());
        }

        match action {
            StoreAction::LogMessage(envelope) => {
                self.message_log.push(LoggedMessage {
                    envelope,
                    received_at: Utc::now(),
                });
            }
            StoreAction::ChangeEntranceScreen(screen) => {
                debug!("entrance screen changed to {screen:?}");
                self.entrance_screen = screen;
            }
            StoreAction::OpenDialog { title, body } => {
                self.dialogs.push(Dialog { title, body });
            }
            StoreAction::ResetWalletCreation => {
                self.wallet_creation = WalletCreationState {
                    pending: true,
                    created: false,
                };
            }
            StoreAction::ResetTrades => {
                self.trade = TradeState::default();
            }
            StoreAction::OfferParsed(discrepancies) => {
                self.trade.discrepancies = Some(discrepancies);
            }
        }
    }

    pub fn message_log(&self) -> &[LoggedMessage] {
        &self.message_log
    }

    pub fn entrance_screen(&self) -> EntranceScreen {
        self.entrance_screen
    }

    pub fn dialogs(&self) -> &[Dialog] {
        &self.dialogs
    }

    pub fn wallet_creation(&self) -> WalletCreationState {
        self.wallet_creation
    }

    pub fn trade(&self) -> &TradeState {
        &self.trade
    }
}
