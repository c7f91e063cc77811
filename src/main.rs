//! Assistant Chat - terminal client for hosted assistant runs
//!
//! Drives each run through a pure state machine, executes requested tool
//! calls locally, and feeds their outputs back until the run finishes.

mod backend;
mod config;
mod runtime;
mod session;
mod state_machine;
mod store;
mod tools;

use backend::{LoggingBackend, OpenAiBackend};
use config::AppConfig;
use session::{ChatSession, TerminalUi};
use std::sync::Arc;
use store::LabelStore;
use tools::ToolRegistry;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logs go to stderr so they never interleave with the chat
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "assistant_chat=warn".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let config = AppConfig::from_env()?;
    config.install_default_tools()?;
    tracing::info!(data_dir = %config.data_dir.display(), "Configuration loaded");

    let backend = Arc::new(LoggingBackend::new(OpenAiBackend::new(config.openai())?));
    let registry = Arc::new(ToolRegistry::standard(
        config.tool_store(),
        config.shell_limits(),
    )?);
    let labels = LabelStore::open(config.labels_path())?;
    tracing::debug!(path = %labels.path().display(), labels = labels.labels().len(), "Thread labels loaded");
    let ui = TerminalUi::new()?;

    let mut session = ChatSession::new(backend, registry, config.runtime_config(), labels, ui);
    session.run().await?;

    Ok(())
}
