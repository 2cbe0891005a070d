use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

use courier_server::auth::jwt::{self, JwtIdentity};
use courier_server::chat::RoutingSettings;
use courier_server::config::{generate_config_template, Config};
use courier_server::db::{self, SqliteStore};
use courier_server::error::ServerError;
use courier_server::routes;
use courier_server::state::AppState;
use courier_server::ws;

fn init_tracing(json_logs: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("courier_server=info"));

    if json_logs {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().pretty().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> Result<(), ServerError> {
    // Load config with layered precedence: defaults < TOML < env < CLI
    let config = Config::load()?;

    // Handle --generate-config: print template and exit
    if config.generate_config {
        print!("{}", generate_config_template());
        return Ok(());
    }

    init_tracing(config.json_logs);

    tracing::info!("Courier server v{} starting", env!("CARGO_PKG_VERSION"));

    let db = db::init_db(&config.data_dir)?;

    // Load or generate JWT signing key (256-bit random, stored in data_dir)
    let jwt_secret = jwt::load_or_generate_jwt_secret(&config.data_dir)?;

    let routing = RoutingSettings::from(&config);
    tracing::info!(
        chat_payload = ?routing.payload,
        max_message_length = routing.max_message_length,
        "Routing configured"
    );

    let app_state = AppState::new(
        Arc::new(SqliteStore::new(db)),
        Arc::new(JwtIdentity::new(jwt_secret)),
        ws::new_connection_registry(),
        routing,
    );

    let app = routes::build_router(app_state);

    // Bind and serve
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
