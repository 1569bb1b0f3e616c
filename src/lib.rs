pub mod config; // Engine, provider and retry configuration
pub mod llm; // Model collaborators behind the LlmClient trait
pub mod pipeline; // Propose, verify, merge

pub use config::EngineConfig;
pub use pipeline::{ConsensusEngine, ConsensusError, ConsensusReport, ExtractionResponse};

use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber. `RUST_LOG` overrides the default
/// filter. Logs go to stderr so stdout stays machine-readable.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);
}
