use std::future::Future;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::warn;

use crate::fetcher::{BackendError, MetricDataResult, MetricsBackend};
use crate::metrics;
use crate::query::MetricQuery;
use crate::resolver::{DirectoryError, Filter, InstanceDirectory, Reservation};

/// Per-call limits applied at the collaborator boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallPolicy {
    pub timeout: Duration,
    pub max_attempts: u32,
    pub initial_backoff: Duration,
}

impl Default for CallPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            max_attempts: 1,
            initial_backoff: Duration::from_millis(200),
        }
    }
}

/// Wraps a collaborator so every call is time-boxed and, if allowed, retried.
pub struct Resilient<T> {
    inner: T,
    policy: CallPolicy,
}

impl<T> Resilient<T> {
    pub fn new(inner: T, policy: CallPolicy) -> Self {
        Self { inner, policy }
    }
}

async fn call_with_policy<T, E, F, Fut>(
    policy: &CallPolicy,
    service: &'static str,
    mut op: F,
    on_timeout: fn(String) -> E,
    retryable: fn(&E) -> bool,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let attempts = policy.max_attempts.max(1);
    let mut backoff = policy.initial_backoff;
    let mut attempt = 1;

    loop {
        let started = Instant::now();
        let outcome = match tokio::time::timeout(policy.timeout, op()).await {
            Ok(result) => result,
            Err(_) => Err(on_timeout(format!(
                "no response within {}ms",
                policy.timeout.as_millis()
            ))),
        };
        metrics::observe_upstream_call(service, started.elapsed().as_secs_f64(), outcome.is_ok());

        match outcome {
            Ok(value) => return Ok(value),
            Err(e) if attempt < attempts && retryable(&e) => {
                warn!(
                    "{} call failed (attempt {}/{}), retrying in {:?}: {}",
                    service, attempt, attempts, backoff, e
                );
                tokio::time::sleep(backoff).await;
                backoff = backoff.saturating_mul(2);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[async_trait]
impl<D: InstanceDirectory> InstanceDirectory for Resilient<D> {
    async fn describe_instances(
        &self,
        filters: &[Filter],
    ) -> Result<Vec<Reservation>, DirectoryError> {
        let inner = &self.inner;
        call_with_policy(
            &self.policy,
            "directory",
            || inner.describe_instances(filters),
            DirectoryError::Unreachable,
            DirectoryError::is_retryable,
        )
        .await
    }
}

#[async_trait]
impl<B: MetricsBackend> MetricsBackend for Resilient<B> {
    async fn get_metric_data(
        &self,
        query: &MetricQuery,
    ) -> Result<Vec<MetricDataResult>, BackendError> {
        let inner = &self.inner;
        call_with_policy(
            &self.policy,
            "metrics",
            || inner.get_metric_data(query),
            BackendError::Unreachable,
            BackendError::is_retryable,
        )
        .await
    }
}
