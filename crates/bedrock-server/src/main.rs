mod config;
mod connections;
mod dispatcher;
mod error;
mod login;
mod session;

use bedrock_raknet::RakNetServer;
use config::ServerConfig;
use connections::ConnectionHandler;
use dispatcher::Dispatcher;
use login::NegotiationSettings;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let path = std::env::args().nth(1).unwrap_or_else(|| "server.toml".into());
    let config = match ServerConfig::load(&path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load {path}: {e}");
            std::process::exit(1);
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    info!(
        "Bedrock server v{} starting on {}:{}",
        env!("CARGO_PKG_VERSION"),
        config.server.address,
        config.server.port
    );
    info!("MOTD: {}", config.server.motd);
    info!("Max players: {}", config.server.max_players);
    info!(
        "Compression: {} (threshold {}), encryption: {}",
        config.network.compression_algorithm,
        config.network.compression_threshold,
        config.network.encryption
    );

    let server_guid: i64 = rand::random();

    let (raknet_config, batch, compression) = match (
        config.raknet_config(server_guid),
        config.batch_config(),
        config.compression(),
    ) {
        (Ok(raknet), Ok(batch), Ok(compression)) => (raknet, batch, compression),
        (Err(e), _, _) | (_, Err(e), _) | (_, _, Err(e)) => {
            eprintln!("Invalid configuration: {e}");
            std::process::exit(1);
        }
    };

    let (server, mut events, server_handle) = match RakNetServer::bind(raknet_config).await {
        Ok(bound) => bound,
        Err(e) => {
            error!("Failed to bind RakNet server: {e}");
            std::process::exit(1);
        }
    };

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    let mut dispatcher = Dispatcher::new();
    login::register(
        &mut dispatcher,
        &NegotiationSettings {
            compression,
            compression_threshold: config.network.compression_threshold,
            encryption: config.network.encryption,
        },
    );

    let mut shutdown_rx_handler = shutdown_rx.clone();
    tokio::spawn(async move {
        let mut handler = ConnectionHandler::new(dispatcher, batch);
        loop {
            tokio::select! {
                event = events.recv() => {
                    let Some(event) = event else { break };
                    handler.handle_event(event, &server_handle).await;
                }
                _ = shutdown_rx_handler.changed() => {
                    if *shutdown_rx_handler.borrow() {
                        break;
                    }
                }
            }
        }
    });

    server.run(shutdown_rx).await;
    info!("Server shut down.");
}
