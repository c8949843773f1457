pub mod api;
pub mod clients;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod period;
pub mod pipeline;
pub mod query;
pub mod resilience;
pub mod resolver;
pub mod shaper;

pub use error::{MonitorError, Result, Upstream};
