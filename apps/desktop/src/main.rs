use std::{path::PathBuf, sync::Arc, thread};

use anyhow::Result;
use clap::Parser;
use client_core::{ConnectionClient, MessageRouter, ServiceBus, StoreAction, WalletStore};
use crossbeam_channel::{bounded, Receiver, TrySendError};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod transport;

use transport::DaemonTransport;

#[derive(Parser)]
#[command(about = "Headless wallet GUI shell: daemon event loop and state store")]
struct Args {
    /// Websocket URL of the local daemon.
    #[arg(long)]
    daemon_url: Option<String>,

    /// Path to a desktop.toml settings file.
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let mut settings = config::load_settings(args.config.as_deref());
    if let Some(url) = args.daemon_url {
        settings.daemon_url = config::normalize_daemon_url(&url);
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(settings.log_filter.clone())),
        )
        .init();

    // The view layer consumes store actions from this channel; until one
    // is attached, a logging sink stands in for it.
    let (ui_tx, ui_rx) = bounded::<StoreAction>(256);
    let ui_thread = thread::spawn(move || run_ui_sink(ui_rx));

    // All message handling runs on one cooperative loop.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let result = runtime.block_on(run(settings, ui_tx));

    drop(runtime);
    let _ = ui_thread.join();
    result
}

async fn run(settings: config::Settings, ui_tx: crossbeam_channel::Sender<StoreAction>) -> Result<()> {
    let (transport, mut inbound) =
        DaemonTransport::connect(&settings.daemon_url, settings.connect_attempts).await?;

    let mut store = WalletStore::new();
    let mut actions = store.subscribe();
    tokio::spawn(async move {
        while let Ok(action) = actions.recv().await {
            match ui_tx.try_send(action) {
                Ok(()) => {}
                Err(TrySendError::Full(action)) => {
                    warn!("ui channel full, dropping {action:?}");
                }
                Err(TrySendError::Disconnected(_)) => break,
            }
        }
    });

    let bus: Arc<dyn ServiceBus> = transport.clone();
    let router = MessageRouter::new(bus);
    let connection = ConnectionClient::new(transport.clone());
    let mut link = connection.get_state().await?;

    while let Some(envelope) = inbound.recv().await {
        if let Err(err) = router.handle(&mut store, envelope).await {
            warn!("message handling faulted err={err:#}");
        }
    }

    let status = link.status().await;
    info!(
        "daemon connection ended state={:?} attempt={}",
        status.state, status.attempt
    );
    link.unsubscribe().await;
    Ok(())
}

fn run_ui_sink(ui_rx: Receiver<StoreAction>) {
    while let Ok(action) = ui_rx.recv() {
        match action {
            StoreAction::OpenDialog { title, body } => {
                info!("dialog title={title:?} body={body:?}");
            }
            StoreAction::ChangeEntranceScreen(screen) => {
                info!("entrance screen -> {screen:?}");
            }
            StoreAction::LogMessage(envelope) => {
                info!(
                    "message command={:?} origin={}",
                    envelope.command,
                    envelope.origin.as_str()
                );
            }
            StoreAction::ResetWalletCreation
            | StoreAction::ResetTrades
            | StoreAction::OfferParsed(_) => {}
        }
    }
}
