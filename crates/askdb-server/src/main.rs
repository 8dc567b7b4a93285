//! askdb server
//!
//! Answers natural-language questions about a DuckDB database. Each request
//! runs a three-stage pipeline: OpenAI translates the question into SQL,
//! DuckDB executes it, and OpenAI composes a natural-language answer from
//! the result.

use std::sync::Arc;

use tracing::info;

mod catalog;
mod config;
mod http;
mod llm;
mod logging;
mod pipeline;

use askdb_duck::DuckExecutor;
use catalog::DatabaseCatalog;
use config::Config;
use http::AppState;
use llm::{NlComposer, SqlGenerator};
use pipeline::Pipeline;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables (.env holds OPENAI_API_KEY)
    dotenvy::dotenv().ok();

    let config = Config::load_or_default("config.yaml")?;
    config.apply_logging_env();
    logging::init();

    let api_key = Config::openai_api_key()?;
    let openai_config = async_openai::config::OpenAIConfig::new().with_api_key(api_key);
    let openai_client = async_openai::Client::with_config(openai_config);
    info!(model = %config.llm.model, "OpenAI client ready");

    // Schema introspection runs exactly once. Any failure here aborts startup
    // with a non-zero exit before the listener binds.
    let db_catalog = DatabaseCatalog::from_database(&config.database.path)?;
    info!(
        database = %config.database.path,
        tables = db_catalog.tables.len(),
        "schema catalog loaded"
    );
    let schema = db_catalog.to_prompt_context();

    let executor = DuckExecutor::open(&config.database.path)?;

    let pipeline = Pipeline::new(
        schema,
        Arc::new(SqlGenerator::new(openai_client.clone(), &config.llm)),
        Arc::new(executor),
        Arc::new(NlComposer::new(openai_client, &config.llm)),
    );

    let app = http::router(AppState {
        pipeline: Arc::new(pipeline),
    });

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("askdb server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
