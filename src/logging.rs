use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::{MonitorError, Result};

/// Sets up the logging subscriber for the service.
///
/// `RUST_LOG` wins when set; otherwise the crate logs at INFO. `LOG_FORMAT=json`
/// switches to one JSON object per line.
pub fn init_logger(json: bool) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "{}={},tower_http={}",
            env!("CARGO_CRATE_NAME"),
            Level::INFO,
            Level::INFO
        ))
    });

    let registry = tracing_subscriber::registry().with(env_filter);

    let result = if json {
        registry
            .with(fmt::layer().json().with_current_span(true))
            .try_init()
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_level(true)
                    .with_ansi(true)
                    .compact(),
            )
            .try_init()
    };

    result.map_err(|e| MonitorError::Internal(format!("Failed to initialize logger: {}", e)))
}
