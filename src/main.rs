use std::env;
use cpu_usage_monitor::{api, config::Config, logging, metrics};

#[tokio::main]
async fn main() {
    let json_logs = env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if let Err(e) = logging::init_logger(json_logs) {
        eprintln!("{}", e);
        std::process::exit(1);
    }

    // Initialize metrics
    metrics::init_metrics();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("{}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = api::start_server(config).await {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}
