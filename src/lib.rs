pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::use_cases::import_service::ImportService;
pub use domain::error::{AppError, Result};
pub use domain::import::{ImportOptions, ImportSummary};
pub use domain::worksheet::ColumnMapping;
pub use infrastructure::config::ImportConfig;
pub use infrastructure::db::connection::init_db;

/// Install the default subscriber; safe to call more than once.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init();
}
