use chrono::Utc;
use tracing::{info, warn};

use crate::fetcher::MetricFetcher;
use crate::metrics::{self, RequestTimer};
use crate::models::CpuUsageRequest;
use crate::period::{parse_granularity, parse_window};
use crate::query::{is_degenerate_window, MetricQuery, TimeWindow};
use crate::resolver::InstanceResolver;
use crate::shaper::{RenderableSeries, SeriesShaper};
use crate::{MonitorError, Result};

#[derive(Debug, Clone, Copy)]
pub struct PipelineOptions {
    /// Turn zero-width windows and buckets wider than the window into `InvalidInput`.
    pub reject_degenerate: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            reject_degenerate: true,
        }
    }
}

/// Address + window tokens in, plot-ready CPU series out.
///
/// Collaborators are built once at start-up and shared by every request; the
/// pipeline itself keeps no mutable state.
pub struct CpuUsagePipeline {
    resolver: InstanceResolver,
    fetcher: MetricFetcher,
    shaper: SeriesShaper,
    options: PipelineOptions,
}

impl CpuUsagePipeline {
    pub fn new(
        resolver: InstanceResolver,
        fetcher: MetricFetcher,
        shaper: SeriesShaper,
        options: PipelineOptions,
    ) -> Self {
        Self {
            resolver,
            fetcher,
            shaper,
            options,
        }
    }

    pub async fn run(&self, request: &CpuUsageRequest) -> Result<RenderableSeries> {
        let mut timer = RequestTimer::new();
        let result = self.execute(request).await;
        match &result {
            Ok(series) => {
                timer.succeed();
                info!("Returning {} CPU samples for {}", series.len(), request.ip_address);
            }
            Err(e) => {
                metrics::record_failure(e);
                warn!("CPU usage request for {} failed: {}", request.ip_address, e);
            }
        }
        result
    }

    async fn execute(&self, request: &CpuUsageRequest) -> Result<RenderableSeries> {
        let width = parse_window(&request.time_period)?;
        let granularity = parse_granularity(&request.interval)?;
        let window = TimeWindow::ending_at(Utc::now(), width)?;

        if is_degenerate_window(width, granularity) {
            let message = format!(
                "window '{}' ({}s) cannot hold a '{}' ({}s) bucket",
                request.time_period,
                width.num_seconds(),
                request.interval,
                granularity
            );
            if self.options.reject_degenerate {
                return Err(MonitorError::InvalidInput(message));
            }
            warn!("Issuing degenerate query: {}", message);
        }

        let identity = self.resolver.resolve(&request.ip_address).await?;
        let query = MetricQuery::new(&identity, window, granularity);

        let raw = self.fetcher.fetch(&query).await?;
        Ok(self.shaper.shape(&raw.timestamps, &raw.values))
    }
}
