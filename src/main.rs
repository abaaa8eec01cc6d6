use anyhow::Result;
use lingofield::{config::Config, server};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (ignored in production)
    let _ = dotenvy::dotenv();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("lingofield=info".parse()?),
        )
        .init();

    info!("Starting lingofield");

    let config = Config::from_env()?;
    info!(
        "Default language {}, {} translatable model(s)",
        config.translations.default_language(),
        config.models.len()
    );

    server::serve(config).await
}
