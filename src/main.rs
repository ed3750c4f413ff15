use std::net::Ipv4Addr;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use tasklist::{config::Config, create_app, db, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("tasklist=debug,tower_http=info")),
        )
        .init();

    let config = Config::from_env()?;
    let db = db::init_db(&config.database_path)
        .with_context(|| format!("initializing database at {}", config.database_path))?;

    let state = AppState::new(db, &config)?;
    let app = create_app(state);
    let addr = (Ipv4Addr::UNSPECIFIED, config.port);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding port {}", config.port))?;

    info!("running on {addr:?}");

    axum::serve(listener, app).await?;
    Ok(())
}
