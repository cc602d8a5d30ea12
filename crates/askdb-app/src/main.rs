//! askdb application binary - composition root.
//!
//! 1. Parse CLI arguments and load configuration from TOML
//! 2. Open the application database (conversations and messages)
//! 3. Locate, or seed, the analytical database
//! 4. Build the model client and the turn orchestrator
//! 5. Start the axum HTTP server

mod cli;

use std::sync::Arc;

use clap::Parser;

use askdb_api::{start_server, AppState};
use askdb_chat::{Collaborators, OpenAiCompatClient};
use askdb_core::config::AskConfig;
use askdb_sandbox::seed_sample_database;
use askdb_storage::Database;

use cli::CliArgs;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config.
    let config_file = args.resolve_config_path();
    let mut config = AskConfig::load_or_default(&config_file);
    config.server.port = args.resolve_port(config.server.port);
    if let Ok(key) = std::env::var("ASKDB_LLM_API_KEY") {
        config.llm.api_key = key;
    }

    // Tracing. RUST_LOG wins over the configured level.
    let log_level = args.resolve_log_level(&config.general.log_level);
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level)),
        )
        .init();

    tracing::info!("Starting askdb v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(path = %config_file.display(), "Configuration loaded");

    // Application storage.
    let data_dir = args.resolve_data_dir(&config.general.data_dir);
    if let Err(e) = std::fs::create_dir_all(&data_dir) {
        tracing::error!(path = %data_dir.display(), error = %e, "Failed to create data directory");
        return Err(e.into());
    }

    let db_path = data_dir.join("askdb.db");
    let database = Database::new(&db_path)?;
    tracing::info!(path = %db_path.display(), "Application database opened");

    // Analytical database.
    let warehouse = args.resolve_warehouse(&config.sandbox.database_path);
    if !warehouse.is_file() {
        if args.init_sample {
            let summary = seed_sample_database(&warehouse)?;
            tracing::info!(
                path = %warehouse.display(),
                products = summary.products,
                customers = summary.customers,
                orders = summary.orders,
                "Sample database created"
            );
        } else {
            tracing::warn!(
                path = %warehouse.display(),
                "Analytical database not found; queries will fail until it exists (see --init-sample)"
            );
        }
    } else if args.init_sample {
        tracing::info!(path = %warehouse.display(), "Analytical database exists, sample not created");
    }

    // Model client.
    if config.llm.api_key.is_empty() {
        tracing::warn!("No model API key configured (set ASKDB_LLM_API_KEY or [llm].api_key)");
    }
    let client = OpenAiCompatClient::new(&config.llm)?;
    tracing::info!(model = %client.model(), base_url = %config.llm.base_url, "Model client ready");
    let collaborators = Collaborators::shared(Arc::new(client));

    let port = config.server.port;
    let state = AppState::new(config, database, warehouse, collaborators);

    if let Err(e) = start_server(state).await {
        tracing::error!(error = %e, "Server stopped");
        tracing::error!("Try: askdb --port {}", port.saturating_add(1));
        return Err(e.into());
    }

    Ok(())
}
