use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::resolver::InstanceIdentity;
use crate::{MonitorError, Result};

pub const QUERY_ID: &str = "cpuUsage";
pub const NAMESPACE: &str = "AWS/EC2";
pub const CPU_METRIC: &str = "CPUUtilization";
pub const INSTANCE_DIMENSION: &str = "InstanceId";

/// Absolute query window; `end` is the instant the window was fixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    /// Fails when `end - width` falls outside the representable date range.
    pub fn ending_at(end: DateTime<Utc>, width: Duration) -> Result<Self> {
        let start = end.checked_sub_signed(width).ok_or_else(|| {
            MonitorError::InvalidInput(format!(
                "window of {}s reaches past the supported date range",
                width.num_seconds()
            ))
        })?;
        Ok(Self { start, end })
    }

    pub fn width(&self) -> Duration {
        self.end - self.start
    }
}

/// True when a window of `width` is empty or narrower than one `granularity` bucket.
pub fn is_degenerate_window(width: Duration, granularity: u32) -> bool {
    width <= Duration::zero() || width < Duration::seconds(i64::from(granularity))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Statistic {
    Average,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ScanBy {
    TimestampAscending,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Dimension {
    pub name: String,
    pub value: String,
}

/// A single windowed-average query over one metric of one instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricQuery {
    pub id: String,
    pub namespace: String,
    pub metric_name: String,
    pub dimension: Dimension,
    pub window: TimeWindow,
    pub period_seconds: u32,
    pub stat: Statistic,
    pub scan_by: ScanBy,
}

impl MetricQuery {
    /// Builds the CPU query over an already fixed window. Degenerate windows pass through.
    pub fn new(identity: &InstanceIdentity, window: TimeWindow, granularity: u32) -> Self {
        Self {
            id: QUERY_ID.to_string(),
            namespace: NAMESPACE.to_string(),
            metric_name: CPU_METRIC.to_string(),
            dimension: Dimension {
                name: INSTANCE_DIMENSION.to_string(),
                value: identity.as_str().to_string(),
            },
            window,
            period_seconds: granularity,
            stat: Statistic::Average,
            scan_by: ScanBy::TimestampAscending,
        }
    }

    pub fn instance_id(&self) -> &str {
        &self.dimension.value
    }

    pub fn is_degenerate(&self) -> bool {
        is_degenerate_window(self.window.width(), self.period_seconds)
    }
}

pub fn build_query(
    identity: &InstanceIdentity,
    window: Duration,
    granularity: u32,
) -> Result<MetricQuery> {
    build_query_at(identity, window, granularity, Utc::now())
}

/// Builds the CPU query for a window ending at `now`.
pub fn build_query_at(
    identity: &InstanceIdentity,
    window: Duration,
    granularity: u32,
    now: DateTime<Utc>,
) -> Result<MetricQuery> {
    Ok(MetricQuery::new(
        identity,
        TimeWindow::ending_at(now, window)?,
        granularity,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::period::{parse_granularity, parse_window};
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_six_hours_at_five_minutes() {
        let id = InstanceIdentity::new("i-abc123");
        let query = build_query_at(
            &id,
            parse_window("6h").unwrap(),
            parse_granularity("5m").unwrap(),
            now(),
        )
        .unwrap();

        assert_eq!(query.window.end, now());
        assert_eq!(query.window.start, now() - Duration::hours(6));
        assert_eq!(query.window.width(), Duration::seconds(21_600));
        assert_eq!(query.period_seconds, 300);
        assert_eq!(query.metric_name, CPU_METRIC);
        assert_eq!(query.namespace, NAMESPACE);
        assert_eq!(query.stat, Statistic::Average);
        assert_eq!(query.dimension.name, INSTANCE_DIMENSION);
        assert_eq!(query.instance_id(), "i-abc123");
        assert!(!query.is_degenerate());
    }

    #[test]
    fn test_week_at_one_minute_is_not_rejected() {
        let id = InstanceIdentity::new("i-abc123");
        let query = build_query_at(&id, parse_window("1w").unwrap(), 60, now()).unwrap();
        assert_eq!(query.window.width().num_seconds(), 604_800);
        assert_eq!(query.period_seconds, 60);
        assert!(!query.is_degenerate());
    }

    #[test]
    fn test_zero_window_passes_through() {
        let id = InstanceIdentity::new("i-abc123");
        let query = build_query_at(&id, parse_window("30m").unwrap(), 60, now()).unwrap();
        assert_eq!(query.window.start, query.window.end);
        assert!(query.is_degenerate());
    }

    #[test]
    fn test_bucket_wider_than_window_is_degenerate() {
        let id = InstanceIdentity::new("i-abc123");
        let query = build_query_at(&id, Duration::hours(1), 86_400, now()).unwrap();
        assert!(query.is_degenerate());
    }

    #[test]
    fn test_build_query_ends_now() {
        let before = Utc::now();
        let query = build_query(&InstanceIdentity::new("i-1"), Duration::hours(1), 60).unwrap();
        let after = Utc::now();
        assert!(query.window.end >= before && query.window.end <= after);
        assert_eq!(query.window.width(), Duration::hours(1));
    }

    #[test]
    fn test_window_past_date_range_is_invalid() {
        let id = InstanceIdentity::new("i-abc123");
        let width = parse_window("100000000000h").unwrap();
        let err = build_query_at(&id, width, 300, now()).unwrap_err();
        assert!(matches!(err, MonitorError::InvalidInput(_)));
        assert!(TimeWindow::ending_at(now(), width).is_err());
    }

    #[test]
    fn test_degenerate_window_check() {
        assert!(is_degenerate_window(Duration::zero(), 60));
        assert!(is_degenerate_window(Duration::hours(1), 86_400));
        assert!(!is_degenerate_window(Duration::days(1), 86_400));
        assert!(!is_degenerate_window(Duration::weeks(1), 60));
    }
}
