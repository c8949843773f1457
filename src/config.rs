use chrono::FixedOffset;
use std::collections::HashMap;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::pipeline::PipelineOptions;
use crate::resilience::CallPolicy;
use crate::resolver::AmbiguityPolicy;
use crate::{MonitorError, Result};

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub directory_url: String,
    pub metrics_url: String,
    pub region: String,
    pub call_policy: CallPolicy,
    pub ambiguity_policy: AmbiguityPolicy,
    pub pipeline: PipelineOptions,
    pub display_offset: FixedOffset,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_vars(env::vars().collect())
    }

    /// Builds the configuration from an explicit variable map; unset keys take defaults.
    pub fn from_vars(vars: HashMap<String, String>) -> Result<Self> {
        let offset_minutes: i32 = var(&vars, "DISPLAY_UTC_OFFSET_MINUTES", "0")?;
        let display_offset = offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .ok_or_else(|| {
                MonitorError::Config(format!(
                    "DISPLAY_UTC_OFFSET_MINUTES {} is out of range",
                    offset_minutes
                ))
            })?;

        let timeout_secs: u64 = var(&vars, "UPSTREAM_TIMEOUT_SECS", "5")?;
        if timeout_secs == 0 {
            return Err(MonitorError::Config(
                "UPSTREAM_TIMEOUT_SECS must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            port: var(&vars, "PORT", "3000")?,
            directory_url: text(&vars, "DIRECTORY_URL", "http://localhost:4566/ec2"),
            metrics_url: text(&vars, "METRICS_URL", "http://localhost:4566/cloudwatch"),
            region: text(&vars, "AWS_REGION", "us-east-1"),
            call_policy: CallPolicy {
                timeout: Duration::from_secs(timeout_secs),
                max_attempts: var(&vars, "UPSTREAM_MAX_ATTEMPTS", "1")?,
                initial_backoff: Duration::from_millis(var(&vars, "UPSTREAM_BACKOFF_MS", "200")?),
            },
            ambiguity_policy: text(&vars, "AMBIGUITY_POLICY", "first").parse()?,
            pipeline: PipelineOptions {
                reject_degenerate: var(&vars, "REJECT_DEGENERATE", "true")?,
            },
            display_offset,
        })
    }
}

/// Trimmed value of `key`, or `default` when unset or blank.
fn text(vars: &HashMap<String, String>, key: &str, default: &str) -> String {
    vars.get(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn var<T: FromStr>(vars: &HashMap<String, String>, key: &str, default: &str) -> Result<T> {
    parse_var(key, &text(vars, key, default))
}

fn parse_var<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| MonitorError::Config(format!("{} has invalid value '{}'", key, value)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_vars(HashMap::new()).unwrap();
        assert_eq!(config.port, 3000);
        assert_eq!(config.region, "us-east-1");
        assert_eq!(config.call_policy, CallPolicy::default());
        assert_eq!(config.ambiguity_policy, AmbiguityPolicy::FirstMatch);
        assert!(config.pipeline.reject_degenerate);
        assert_eq!(config.display_offset.local_minus_utc(), 0);
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_vars(vars(&[
            ("PORT", "8080"),
            ("UPSTREAM_TIMEOUT_SECS", "2"),
            ("UPSTREAM_MAX_ATTEMPTS", "3"),
            ("AMBIGUITY_POLICY", "reject"),
            ("REJECT_DEGENERATE", "false"),
            ("DISPLAY_UTC_OFFSET_MINUTES", "-300"),
        ]))
        .unwrap();

        assert_eq!(config.port, 8080);
        assert_eq!(config.call_policy.timeout, Duration::from_secs(2));
        assert_eq!(config.call_policy.max_attempts, 3);
        assert_eq!(config.ambiguity_policy, AmbiguityPolicy::Reject);
        assert!(!config.pipeline.reject_degenerate);
        assert_eq!(config.display_offset.local_minus_utc(), -18_000);
    }

    #[test]
    fn test_invalid_values() {
        for pair in [
            ("PORT", "eighty"),
            ("UPSTREAM_TIMEOUT_SECS", "0"),
            ("REJECT_DEGENERATE", "maybe"),
            ("AMBIGUITY_POLICY", "random"),
            ("DISPLAY_UTC_OFFSET_MINUTES", "100000"),
        ] {
            let err = Config::from_vars(vars(&[pair])).unwrap_err();
            assert!(matches!(err, MonitorError::Config(_)), "{:?}", pair);
        }
    }
}
