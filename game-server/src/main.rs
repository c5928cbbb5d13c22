use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::info;

use game_persistence::{RoomRepository, connection::connect_and_migrate};
use game_server::{
    config::Config,
    create_routes,
    gateway::ActionGateway,
    outbox::{DeliveryMode, Outbox},
    relay::RelayRooms,
    session::RoomSessionManager,
};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    info!("Starting room server...");

    let config = Config::new();

    // Initialize database connection and run migrations
    let db = match connect_and_migrate(&config.database_url).await {
        Ok(db) => db,
        Err(e) => {
            tracing::error!("Failed to connect to database and run migrations: {}", e);
            std::process::exit(1);
        }
    };
    let repo = Arc::new(RoomRepository::new(db));

    let relay_rooms = Arc::new(RelayRooms::new());

    let delivery = match &config.relay_base {
        Some(base) => {
            info!("Delivering room notices to external relay at {}", base);
            DeliveryMode::Http {
                base: base.clone(),
                token: config.relay_token.clone(),
                client: reqwest::Client::new(),
            }
        }
        None => DeliveryMode::Local(relay_rooms.clone()),
    };
    let outbox = Outbox::start(delivery, config.outbox_capacity);

    let session = Arc::new(RoomSessionManager::new(repo.clone(), outbox.clone()));
    let gateway = Arc::new(ActionGateway::new(repo, outbox));

    let routes = create_routes(
        session,
        gateway,
        relay_rooms.clone(),
        config.relay_token.clone(),
    );

    // Start the idle-subscriber sweep
    let sweep_rooms = relay_rooms.clone();
    let heartbeat_timeout = Duration::from_secs(config.heartbeat_timeout_seconds);
    let sweep_interval = Duration::from_secs(config.sweep_interval_seconds);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(sweep_interval);
        loop {
            interval.tick().await;
            sweep_rooms.sweep(heartbeat_timeout);
        }
    });

    info!("Server starting on {}:{}", config.host, config.port);

    let addr = (
        config.host.parse::<std::net::IpAddr>().unwrap(),
        config.port,
    );

    let (addr, server) = warp::serve(routes).bind_with_graceful_shutdown(addr, async {
        // Wait for SIGINT (Ctrl+C) or SIGTERM
        #[cfg(unix)]
        {
            let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt()).unwrap();
            let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate()).unwrap();

            tokio::select! {
                _ = sigint.recv() => {
                    info!("Received SIGINT, shutting down gracefully...");
                }
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, shutting down gracefully...");
                }
            }
        }

        #[cfg(not(unix))]
        {
            signal::ctrl_c().await.expect("Failed to listen for ctrl+c");
            info!("Received Ctrl+C, shutting down gracefully...");
        }
    });

    info!(
        "Server started successfully on {}. Press Ctrl+C to stop.",
        addr
    );
    server.await;
    info!("Server shutdown complete.");
}
