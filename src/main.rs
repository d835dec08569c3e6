//! Radio Control
//!
//! Web front end, playback monitor and keyboard shortcuts in one process.

use radio_control::{api, bus, config, keyboard, monitor, radio, spotify, store, ui};

use anyhow::Result;
use axum::{
    routing::{delete, get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "radio_control=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(keyboard::RawModeWriter::stderr))
        .init();

    tracing::info!(
        "Starting Radio Control v{} ({})",
        radio_control::VERSION,
        radio_control::GIT_SHA
    );

    // Load configuration
    let config = config::load_config()?;
    let data_dir = config::get_data_dir();
    tracing::info!(
        "Configuration loaded, port: {}, data dir: {}",
        config.port,
        data_dir.display()
    );

    // Create event bus
    let bus = bus::create_bus();

    // Spotify login + client
    let auth = Arc::new(spotify::SpotifyAuth::new(config.spotify.clone(), &data_dir));
    if !auth.is_configured() {
        tracing::warn!("Spotify client id/secret not configured; login will fail");
    }
    let client = Arc::new(spotify::SpotifyClient::new(
        auth.clone(),
        config.spotify.api_base_url.clone(),
    ));

    // Persistence
    let channels = store::ChannelStore::new(&data_dir);
    let commands = store::CommandStore::new(&data_dir);

    // Radio controller (also the monitor's trigger action)
    let jingle = radio::jingle::player_from_config(&config.monitor);
    let radio = Arc::new(radio::RadioController::new(
        client.clone(),
        channels.clone(),
        bus.clone(),
        radio::RadioSettings::from(&config.monitor),
        jingle,
    ));

    // Playback monitor
    let monitor = monitor::MonitorService::new(
        client.clone(),
        radio.clone(),
        commands.clone(),
        bus.clone(),
        monitor::MonitorSettings::from(&config.monitor),
        Duration::from_millis(config.monitor.poll_interval_ms),
    );
    if config.monitor.enabled {
        monitor.start().await?;
    } else {
        tracing::info!("Playback monitor disabled by config");
    }

    // Keyboard shortcuts
    let shutdown = CancellationToken::new();
    if let Some((keys, _handle)) = keyboard::spawn_listener(&config.keyboard, shutdown.clone())? {
        tokio::spawn(handle_keys(keys, radio.clone(), shutdown.clone()));
    }

    // Build application state
    let state = api::AppState::new(auth, radio, monitor.clone(), channels, commands, bus);

    // Build API routes
    let app = Router::new()
        // Health check
        .route("/status", get(api::status_handler))
        // Login
        .route("/", get(api::index_handler))
        .route("/login", get(api::login_handler))
        .route("/callback", get(api::callback_handler))
        // Channels
        .route("/playlists", get(ui::playlists_page))
        .route("/set_playlists", post(api::set_playlists_handler))
        .route("/get_playlists", get(api::get_playlists_handler))
        // Pending command
        .route("/set_command", post(api::set_command_handler))
        .route("/get_command", get(api::get_command_handler))
        .route("/command", delete(api::clear_command_handler))
        // Playback control
        .route("/play", post(api::play_handler))
        .route("/pause", post(api::pause_handler))
        .route("/zap", post(api::zap_handler))
        // Event stream (SSE)
        .route("/events", get(api::events_handler))
        // Middleware
        .layer(CorsLayer::permissive())
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Start server with graceful shutdown
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    // Cleanup
    tracing::info!("Stopping playback monitor...");
    shutdown.cancel();
    monitor.stop().await;
    tracing::info!("Shutdown complete");

    Ok(())
}

/// Run key actions one at a time against the controller
async fn handle_keys(
    mut keys: mpsc::Receiver<keyboard::KeyAction>,
    radio: Arc<radio::RadioController>,
    shutdown: CancellationToken,
) {
    while let Some(action) = keys.recv().await {
        let result = match action {
            keyboard::KeyAction::ZapNext => radio.zap_next().await,
            keyboard::KeyAction::PlayPause => radio.play_pause().await,
            keyboard::KeyAction::Quit => {
                tracing::info!("Quit requested from keyboard");
                shutdown.cancel();
                break;
            }
        };
        if let Err(e) = result {
            tracing::warn!("Key action {:?} failed: {:#}", action, e);
        }
    }
}

/// Wait for shutdown signal (Ctrl+C, SIGTERM or keyboard quit)
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down..."),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down..."),
        _ = shutdown.cancelled() => tracing::info!("Shutting down..."),
    }
}
