//! Binary entry point: environment, logging, then the REPL.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use digiyatra_console::config::Config;
use digiyatra_console::console::Console;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "digiyatra_console=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    tracing::info!(api = %config.api_url, table = %config.table, "starting console");

    let mut console = Console::new(config)?;
    console.run().await
}
