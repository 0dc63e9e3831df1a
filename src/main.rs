use std::process::ExitCode;
use std::sync::Arc;

use tracing::{error, info};

use chathub::{ChatHub, Config, Database, SqliteStore, WebServer};

#[tokio::main]
async fn main() -> ExitCode {
    // Load configuration
    let config = match Config::load_with_env("config.toml") {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config.toml: {e}");
            eprintln!("Using default configuration.");
            let mut config = Config::default();
            config.apply_env_overrides();
            config
        }
    };

    // Initialize logging
    if let Err(e) = chathub::logging::init(&config.logging) {
        eprintln!("Failed to initialize logging: {e}");
        chathub::logging::init_console_only(&config.logging.level);
    }

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Config) -> chathub::Result<()> {
    config.validate()?;

    info!("chathub starting on {}", config.bind_addr());

    let db = Database::open(&config.database.path).await?;
    info!("Database opened at {}", config.database.path);

    let hub = Arc::new(ChatHub::from_config(&config, SqliteStore::new(db)));
    let server = WebServer::new(&config.server, hub)?;

    tokio::select! {
        result = server.run() => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
            Ok(())
        }
    }
}
