//! Hive gateway - mesh-radio gateway with a REST/WebSocket API
//!
//! This binary runs the full gateway:
//! - Resource state (devices, groups, scenes, resourcelinks) behind one lock
//! - REST API and WebSocket event feed via axum
//! - Host-link channels towards the radio adapter
//! - SQLite persistence driven by the save scheduler

mod flasher;
mod gateway;
mod host;
mod persist;
mod server;

use clap::Parser;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use hive_cluster::ApsRequest;
use hive_core::ResourceEvent;
use hive_ddf::BundleStore;
use hive_net::{FirmwareAction, FirmwareUpdate};
use hive_state::SqliteStore;

use flasher::{DevPortScanner, GcfFlasher};
use gateway::{GatewayCore, TickOutput};
use host::{ChannelHost, HostCommand, HostEvent};

#[derive(Parser)]
#[command(name = "hive-gateway")]
#[command(about = "Mesh-radio gateway with REST and WebSocket API")]
struct Args {
    /// HTTP server port
    #[arg(long, default_value_t = 8090)]
    http_port: u16,

    /// Database path
    #[arg(long, default_value = "hive.db")]
    db: String,

    /// Read-only system bundle directory
    #[arg(long, default_value = "/usr/share/hive/bundles")]
    system_bundles: String,

    /// Writable user bundle directory
    #[arg(long, default_value = "bundles")]
    user_bundles: String,

    /// Directory searched for coordinator firmware images
    #[arg(long, default_value = "/usr/share/hive/firmware")]
    firmware_dir: String,

    /// Flasher program invoked for coordinator updates
    #[arg(long, default_value = "GCFFlasher")]
    flasher: String,

    /// Open the key-registration unlock window for this many seconds at boot
    #[arg(long, default_value_t = 0)]
    unlock: u32,

    /// Enable verbose logging
    #[arg(long, short)]
    verbose: bool,
}

/// Application state shared across handlers
pub struct AppState {
    /// The gateway resource state
    pub core: Mutex<GatewayCore>,
    /// Coordinator firmware update supervisor
    pub firmware: Mutex<FirmwareUpdate<DevPortScanner, GcfFlasher>>,
    /// State storage
    pub store: SqliteStore,
    /// Broadcast channel for WebSocket events
    pub event_tx: broadcast::Sender<ResourceEvent>,
    /// Send primitive towards the radio adapter
    pub host: ChannelHost,
    /// Non-APS commands towards the radio adapter
    pub command_tx: mpsc::Sender<HostCommand>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting hive gateway");

    // Initialize state store
    let store = SqliteStore::new(&args.db).await?;
    info!("Database initialized: {}", args.db);

    let bundles = BundleStore::open(&args.system_bundles, &args.user_bundles)?;
    let mut core = GatewayCore::new(bundles);
    persist::load_state(&store, &mut core).await?;
    if args.unlock > 0 {
        core.unlock(args.unlock);
    }

    let firmware = FirmwareUpdate::new(
        DevPortScanner,
        GcfFlasher::new(args.flasher.clone()),
        &args.firmware_dir,
    );

    // Channels towards the radio adapter. The serial driver attaches on the
    // receiving ends; until one does, outbound traffic is drained and logged
    // so the queues never back up.
    let (aps_tx, aps_rx) = mpsc::channel::<ApsRequest>(64);
    let (command_tx, command_rx) = mpsc::channel::<HostCommand>(16);
    let (host_event_tx, host_event_rx) = mpsc::channel::<HostEvent>(64);

    // Create broadcast channel for WebSocket events
    let (event_tx, _) = broadcast::channel(256);

    let state = Arc::new(AppState {
        core: Mutex::new(core),
        firmware: Mutex::new(firmware),
        store,
        event_tx: event_tx.clone(),
        host: ChannelHost::new(aps_tx),
        command_tx,
    });

    tokio::spawn(drain_adapter_queues(aps_rx, command_rx, host_event_tx));

    // Start HTTP server
    let bind_addr = format!("0.0.0.0:{}", args.http_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    let actual_port = listener.local_addr()?.port();
    info!("REST API listening on http://127.0.0.1:{}/api", actual_port);
    info!("WebSocket endpoint: ws://127.0.0.1:{}/ws", actual_port);

    let app = server::create_router(state.clone());
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("HTTP server error: {}", e);
        }
    });

    run_loop(state, host_event_rx).await;
    Ok(())
}

/// The gateway event loop: host events, the 1 s housekeeping tick and the
/// 100 ms fast tick for the channel-change machine.
async fn run_loop(state: Arc<AppState>, mut host_events: mpsc::Receiver<HostEvent>) {
    let mut second = tokio::time::interval(Duration::from_secs(1));
    let mut fast = tokio::time::interval(Duration::from_millis(100));

    loop {
        tokio::select! {
            Some(event) = host_events.recv() => {
                let out = handle_host_event(&state, event).await;
                dispatch(&state, out).await;
            }
            _ = second.tick() => {
                let out = state.core.lock().tick_second();
                dispatch(&state, out).await;
                let actions = state.firmware.lock().tick();
                apply_firmware_actions(&state, actions).await;
            }
            _ = fast.tick() => {
                let out = state.core.lock().tick_fast();
                dispatch(&state, out).await;
            }
        }
    }
}

/// Feed one adapter event into the core.
async fn handle_host_event(state: &Arc<AppState>, event: HostEvent) -> TickOutput {
    match event {
        HostEvent::Indication(ind) => {
            state.core.lock().handle_indication(&ind);
            TickOutput::default()
        }
        HostEvent::Confirm { aps_req_id, zdp_seq, success } => {
            state.core.lock().handle_confirm(aps_req_id, zdp_seq, success)
        }
        HostEvent::CurrentChannel(channel) => state.core.lock().on_current_channel(channel),
        HostEvent::NetworkState(joined) => state.core.lock().on_network_state(joined),
        HostEvent::FirmwareVersion(version) => {
            let actions = state.firmware.lock().version_read(version);
            apply_firmware_actions(state, actions).await;
            TickOutput::default()
        }
    }
}

/// Ship everything a tick or host event produced: requests to the adapter,
/// host commands, due saves, and queued resource events to the WS clients.
async fn dispatch(state: &Arc<AppState>, out: TickOutput) {
    server::send_requests(state, out.requests).await;
    for command in out.commands {
        if let Err(e) = state.command_tx.send(command).await {
            warn!("host command dropped: {}", e);
        }
    }
    for category in out.saves {
        let batch = persist::snapshot(&mut state.core.lock(), category);
        if let Err(e) = persist::write_batch(&state.store, &batch).await {
            error!("save of {} failed: {}", category.as_str(), e);
        }
    }
    server::publish_events(state);
}

async fn apply_firmware_actions(state: &Arc<AppState>, actions: Vec<FirmwareAction>) {
    for action in actions {
        match action {
            FirmwareAction::ReadVersion => {
                if let Err(e) = state.command_tx.send(HostCommand::ReadFirmwareVersion).await {
                    warn!("firmware version read dropped: {}", e);
                }
            }
            FirmwareAction::UpdateReady => {
                info!("firmware update staged, waiting for user confirmation");
                state.core.lock().bus.push(ResourceEvent::notify("firmware-update-ready"));
                server::publish_events(state);
            }
        }
    }
}

/// Placeholder for the radio adapter: consume outbound queues so senders
/// never block, and hold the event sender open.
async fn drain_adapter_queues(
    mut aps_rx: mpsc::Receiver<ApsRequest>,
    mut command_rx: mpsc::Receiver<HostCommand>,
    _host_event_tx: mpsc::Sender<HostEvent>,
) {
    loop {
        tokio::select! {
            Some(req) = aps_rx.recv() => {
                debug!(
                    "aps request {} to {:?} cluster 0x{:04X} ({} bytes)",
                    req.aps_req_id,
                    req.destination,
                    req.cluster_id,
                    req.frame.len()
                );
            }
            Some(command) = command_rx.recv() => {
                debug!("host command {:?}", command);
            }
            else => break,
        }
    }
}
