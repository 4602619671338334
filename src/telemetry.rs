// Tracing setup

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// Initialize console tracing.
///
/// `RUST_LOG` wins when set; otherwise `console_level` applies to everything.
///
/// # Errors
///
/// - `TryInitError` - A global subscriber was already installed
pub fn init_tracing(console_level: Level) -> Result<(), tracing_subscriber::util::TryInitError> {
    let console_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(console_level.to_string()));

    let console_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_file(false)
        .with_line_number(false)
        .with_filter(console_filter);

    tracing_subscriber::registry().with(console_layer).try_init()?;

    tracing::info!("Tracing initialized: console={}", console_level);
    Ok(())
}
