use paracook_link::config::{ClientConfig, CONFIG_ENV, DEFAULT_CONFIG_PATH};
use paracook_link::{ConnectionManager, SubscriptionGroup, WebSocketConnector};
use paracook_shared::kinds;

use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var(CONFIG_ENV).ok())
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_owned());

    let config = ClientConfig::load(&config_path)?;
    let url = config.ws_url();
    info!("Link starting with {}", config_path);
    info!("  Server: {}", url);

    let manager = ConnectionManager::new(WebSocketConnector::default(), config.connection_config());

    let mut subscriptions = SubscriptionGroup::new();
    subscriptions
        .add(manager.subscribe(kinds::CONNECTED, |payload| {
            info!("Link connected: {}", payload["connected"]);
            Ok(())
        }))
        .add(manager.subscribe(kinds::ERROR, |payload| {
            warn!("Link error: {}", payload["error"]);
            Ok(())
        }))
        .add(manager.subscribe(kinds::RECONNECT_FAILED, |payload| {
            error!("{}", payload["message"].as_str().unwrap_or("Reconnect failed"));
            Ok(())
        }));

    for kind in [
        kinds::HELLO,
        kinds::LOG,
        kinds::TASK_STATUS,
        kinds::MAP_UPDATE,
        kinds::CONFIG_UPDATE,
        kinds::AGENTS_UPDATE,
        kinds::ACTIONS_UPDATE,
        kinds::SYSTEM_RESET,
        kinds::WORLD_UPDATE,
    ] {
        subscriptions.add(manager.subscribe(kind, move |payload| {
            info!("[{}] {}", kind, payload);
            Ok(())
        }));
    }

    manager.connect(url).await;

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");

    manager.disconnect().await;
    subscriptions.clear();
    info!("Final stats: {}", serde_json::to_string(&manager.stats())?);

    Ok(())
}
