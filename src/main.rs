use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;

use galaku_bridge_lib::config::{BridgeConfig, DeviceCatalog};
use galaku_bridge_lib::core::InputKey;
use galaku_bridge_lib::logging::ConsoleLogger;
use galaku_bridge_lib::state::AppState;
use log::{info, warn};
use tokio::sync::mpsc;

/// Reads operator keys from stdin on a dedicated thread, one key per line.
fn spawn_key_reader() -> mpsc::Receiver<InputKey> {
    let (key_tx, key_rx) = mpsc::channel(16);
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            let Some(c) = line.trim().chars().next() else { continue };
            if key_tx.blocking_send(InputKey::from_char(c)).is_err() {
                break;
            }
        }
    });
    key_rx
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(BridgeConfig::default_config_path);
    let (config, config_error) = match BridgeConfig::load_or_create(&config_path).await {
        Ok(config) => (config, None),
        Err(e) => (BridgeConfig::default(), Some(e)),
    };

    let level = config.level_filter();
    if ConsoleLogger::init(level).is_err() {
        // Only fall back to env_logger if the console logger could not be installed
        let _ = env_logger::builder()
            .filter_level(level)
            .parse_default_env()
            .try_init();
    }
    if let Some(e) = config_error {
        warn!("Failed to load config from {:?}: {}, using defaults", config_path, e);
    }

    let catalog = Arc::new(DeviceCatalog::load(&config.catalog_path).await);
    let (mut app, mut announcements) = AppState::new(config);
    if let Some(cached) = app.engine.get_device_snapshot().await {
        info!("Last known device: {}", cached.device_name);
    }

    app.start_bluetooth(catalog).await?;
    app.engine.set_scanning_state(true);
    app.start_presence_probe();

    let mut keys = spawn_key_reader();
    info!("Galaku bridge running, press Ctrl-C to exit");
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down...");
                break;
            }
            Some(added) = announcements.recv() => match added.to_message() {
                Ok(message) => info!("Device added: {}", message),
                Err(e) => warn!("Failed to serialize device announcement: {}", e),
            },
            Some(key) = keys.recv() => app.engine.execute_input_key(key).await,
        }
    }

    app.shutdown().await;
    Ok(())
}
