use std::net::SocketAddr;

use tokio::net::TcpListener;

use kanto_server::auth;
use kanto_server::config::{generate_config_template, Config};
use kanto_server::routes;
use kanto_server::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load config with layered precedence: defaults < TOML < env < CLI
    let config = Config::load()?;

    // Handle --generate-config: print template and exit
    if config.generate_config {
        print!("{}", generate_config_template());
        return Ok(());
    }

    // Initialize tracing/logging
    if config.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "kanto_server=info".parse().unwrap()),
            )
            .init();
    } else {
        tracing_subscriber::fmt()
            .pretty()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "kanto_server=info".parse().unwrap()),
            )
            .init();
    }

    tracing::info!("Kanto signaling server v{} starting", env!("CARGO_PKG_VERSION"));

    let mut state = AppState::open(config.max_players_per_room);
    state.turn = config.turn.clone();

    match &config.users_file {
        Some(path) => {
            let users = auth::load_users(path)?;
            tracing::info!(count = users.len(), path = %path, "Loaded registered users");
            state.users = std::sync::Arc::new(users);
            state.auth_required = true;
        }
        None => {
            tracing::warn!("No users file configured, running open (no authentication)");
        }
    }

    let app = routes::build_router(state, config.static_dir.as_deref());

    let addr = format!("{}:{}", config.bind_address, config.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
