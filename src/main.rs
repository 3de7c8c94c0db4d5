use anyhow::Result;
use helios::command::{CommandExecutor, FleetApiClient};
use helios::config::Config;
use helios::controller::ChargeController;
use helios::store::{RuntimeConfig, RuntimeConfigHandle, TelemetryStore};
use helios::token::FileTokenStore;
use helios::web::WebServer;
use tokio::sync::watch;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid config: {}", e))?;

    helios::logging::init_logging(&config.logging)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!("Helios charge controller starting up");

    let store = TelemetryStore::connect(&config.database.url)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to open store: {}", e))?;
    let runtime = RuntimeConfigHandle::load_or_seed(
        store.clone(),
        RuntimeConfig {
            enabled: config.control.default_enabled,
            max_grid_draw_watts: config.control.default_max_grid_draw_watts,
        },
    )
    .await
    .map_err(|e| anyhow::anyhow!("Failed to load runtime config: {}", e))?;

    // Web control surface runs alongside the control loop
    let web = WebServer::new(
        runtime.clone(),
        store.clone(),
        config.web.api_token.clone(),
    );
    let web_host = config.web.host.clone();
    let web_port = config.web.port;
    let web_task = tokio::spawn(async move {
        if let Err(e) = web.start(&web_host, web_port).await {
            error!("Web server error: {}", e);
        }
    });

    // Ctrl-C flips the shutdown flag; the loop finishes its tick and exits
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, shutting down");
            let _ = shutdown_tx.send(true);
        }
    });

    let tokens = FileTokenStore::new(config.tesla.clone())
        .map_err(|e| anyhow::anyhow!("Failed to build token store: {}", e))?;
    let api = FleetApiClient::new(config.tesla.clone())
        .map_err(|e| anyhow::anyhow!("Failed to build Fleet API client: {}", e))?;
    let executor = CommandExecutor::new(tokens, api);

    let mut controller =
        ChargeController::new(config, runtime, store.clone(), executor, shutdown_rx)
            .map_err(|e| anyhow::anyhow!("Failed to build controller: {}", e))?;

    let result = controller.run().await;
    web_task.abort();
    store.close().await;

    match result {
        Ok(()) => {
            info!("Controller shutdown complete");
            Ok(())
        }
        Err(e) => {
            error!("Controller failed with error: {}", e);
            Err(anyhow::anyhow!("Controller error: {}", e))
        }
    }
}
