use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{MonitorError, Result, Upstream};

/// Directory filter name for the primary private address of an instance.
pub const PRIVATE_IP_FILTER: &str = "private-ip-address";

/// Opaque identity issued by the compute directory, e.g. `i-abc123`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InstanceIdentity(String);

impl InstanceIdentity {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for InstanceIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Filter {
    pub name: String,
    pub values: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Instance {
    pub instance_id: String,
    #[serde(default)]
    pub private_ip_address: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Reservation {
    #[serde(default)]
    pub instances: Vec<Instance>,
}

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("directory unreachable: {0}")]
    Unreachable(String),

    #[error("directory rejected request with status {status}: {message}")]
    Rejected { status: u16, message: String },
}

impl DirectoryError {
    /// Client-side rejections will fail the same way on every attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            DirectoryError::Unreachable(_) => true,
            DirectoryError::Rejected { status, .. } => !(400..500).contains(status),
        }
    }
}

/// Compute-instance directory lookup.
#[async_trait]
pub trait InstanceDirectory: Send + Sync {
    async fn describe_instances(
        &self,
        filters: &[Filter],
    ) -> std::result::Result<Vec<Reservation>, DirectoryError>;
}

/// What to do when more than one instance carries the requested address.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AmbiguityPolicy {
    /// Take the first instance of the first reservation.
    #[default]
    FirstMatch,
    Reject,
}

impl std::str::FromStr for AmbiguityPolicy {
    type Err = MonitorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "first" | "first-match" | "first_match" => Ok(AmbiguityPolicy::FirstMatch),
            "reject" => Ok(AmbiguityPolicy::Reject),
            other => Err(MonitorError::Config(format!(
                "unknown ambiguity policy '{}', expected 'first' or 'reject'",
                other
            ))),
        }
    }
}

pub struct InstanceResolver {
    directory: Arc<dyn InstanceDirectory>,
    policy: AmbiguityPolicy,
}

impl InstanceResolver {
    pub fn new(directory: Arc<dyn InstanceDirectory>, policy: AmbiguityPolicy) -> Self {
        Self { directory, policy }
    }

    /// Maps a private network address to the identity of the instance holding it.
    ///
    /// Issues exactly one directory lookup. Zero matches are `InstanceNotFound`;
    /// any directory failure is `UpstreamUnavailable`. The address must parse as an
    /// IP but is sent as the caller wrote it (trimmed), so the match stays exact.
    pub async fn resolve(&self, address: &str) -> Result<InstanceIdentity> {
        let ip = address.trim();
        ip.parse::<IpAddr>().map_err(|_| {
            MonitorError::InvalidInput(format!("'{}' is not a valid IP address", ip))
        })?;

        let filters = [Filter {
            name: PRIVATE_IP_FILTER.to_string(),
            values: vec![ip.to_string()],
        }];

        debug!("Looking up instance for address {}", ip);
        let reservations = self
            .directory
            .describe_instances(&filters)
            .await
            .map_err(|e| MonitorError::upstream(Upstream::Directory, e.to_string()))?;

        let mut candidates = reservations
            .into_iter()
            .flat_map(|r| r.instances)
            .map(|i| i.instance_id)
            .filter(|id| !id.is_empty());

        let first = candidates.next().ok_or_else(|| {
            MonitorError::InstanceNotFound(format!("no instance has address {}", ip))
        })?;
        let rest: Vec<String> = candidates.collect();

        if !rest.is_empty() {
            match self.policy {
                AmbiguityPolicy::FirstMatch => {
                    warn!(
                        "Address {} matches {} instances, using {} (others: {})",
                        ip,
                        rest.len() + 1,
                        first,
                        rest.join(", ")
                    );
                }
                AmbiguityPolicy::Reject => {
                    return Err(MonitorError::InstanceNotFound(format!(
                        "address {} is ambiguous across {} instances",
                        ip,
                        rest.len() + 1
                    )));
                }
            }
        }

        info!("Instance ID: {}", first);
        Ok(InstanceIdentity::new(first))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Directory double that answers every lookup from a fixed table.
    pub(crate) struct StaticDirectory {
        instances: Vec<(String, String)>,
        fail: bool,
        pub(crate) calls: AtomicUsize,
        pub(crate) last_filters: Mutex<Vec<Filter>>,
    }

    impl StaticDirectory {
        pub(crate) fn new(instances: &[(&str, &str)]) -> Self {
            Self {
                instances: instances
                    .iter()
                    .map(|(ip, id)| (ip.to_string(), id.to_string()))
                    .collect(),
                fail: false,
                calls: AtomicUsize::new(0),
                last_filters: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn unreachable() -> Self {
            Self {
                fail: true,
                ..Self::new(&[])
            }
        }
    }

    #[async_trait]
    impl InstanceDirectory for StaticDirectory {
        async fn describe_instances(
            &self,
            filters: &[Filter],
        ) -> std::result::Result<Vec<Reservation>, DirectoryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_filters.lock().unwrap() = filters.to_vec();
            if self.fail {
                return Err(DirectoryError::Unreachable("connection refused".into()));
            }

            let wanted = &filters[0].values;
            Ok(self
                .instances
                .iter()
                .filter(|(ip, _)| wanted.contains(ip))
                .map(|(ip, id)| Reservation {
                    instances: vec![Instance {
                        instance_id: id.clone(),
                        private_ip_address: Some(ip.clone()),
                    }],
                })
                .collect())
        }
    }

    fn resolver(directory: StaticDirectory, policy: AmbiguityPolicy) -> InstanceResolver {
        InstanceResolver::new(Arc::new(directory), policy)
    }

    #[tokio::test]
    async fn test_resolve_single_match() {
        let directory = Arc::new(StaticDirectory::new(&[
            ("10.0.0.5", "i-abc123"),
            ("10.0.0.6", "i-def456"),
        ]));
        let resolver = InstanceResolver::new(directory.clone(), AmbiguityPolicy::FirstMatch);

        let id = resolver.resolve("10.0.0.5").await.unwrap();
        assert_eq!(id.as_str(), "i-abc123");

        let filters = directory.last_filters.lock().unwrap().clone();
        assert_eq!(filters.len(), 1);
        assert_eq!(filters[0].name, PRIVATE_IP_FILTER);
        assert_eq!(filters[0].values, vec!["10.0.0.5".to_string()]);
    }

    #[tokio::test]
    async fn test_resolve_sends_address_as_written() {
        let directory = Arc::new(StaticDirectory::new(&[("FE80::1", "i-v6")]));
        let resolver = InstanceResolver::new(directory.clone(), AmbiguityPolicy::FirstMatch);

        let id = resolver.resolve("  FE80::1 ").await.unwrap();
        assert_eq!(id.as_str(), "i-v6");
        let filters = directory.last_filters.lock().unwrap().clone();
        assert_eq!(filters[0].values, vec!["FE80::1".to_string()]);
    }

    #[tokio::test]
    async fn test_resolve_no_match() {
        let resolver = resolver(
            StaticDirectory::new(&[("10.0.0.5", "i-abc123")]),
            AmbiguityPolicy::FirstMatch,
        );
        let err = resolver.resolve("10.0.0.99").await.unwrap_err();
        assert!(matches!(err, MonitorError::InstanceNotFound(_)));
    }

    #[tokio::test]
    async fn test_resolve_ambiguous_first_match() {
        let resolver = resolver(
            StaticDirectory::new(&[("10.0.0.5", "i-first"), ("10.0.0.5", "i-second")]),
            AmbiguityPolicy::FirstMatch,
        );
        assert_eq!(resolver.resolve("10.0.0.5").await.unwrap().as_str(), "i-first");
    }

    #[tokio::test]
    async fn test_resolve_ambiguous_rejected() {
        let resolver = resolver(
            StaticDirectory::new(&[("10.0.0.5", "i-first"), ("10.0.0.5", "i-second")]),
            AmbiguityPolicy::Reject,
        );
        let err = resolver.resolve("10.0.0.5").await.unwrap_err();
        assert!(matches!(err, MonitorError::InstanceNotFound(_)));
    }

    #[tokio::test]
    async fn test_resolve_directory_unreachable() {
        let resolver = resolver(StaticDirectory::unreachable(), AmbiguityPolicy::FirstMatch);
        let err = resolver.resolve("10.0.0.5").await.unwrap_err();
        assert!(matches!(
            err,
            MonitorError::UpstreamUnavailable {
                service: Upstream::Directory,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_resolve_malformed_address_skips_lookup() {
        let directory = Arc::new(StaticDirectory::new(&[("10.0.0.5", "i-abc123")]));
        let resolver = InstanceResolver::new(directory.clone(), AmbiguityPolicy::FirstMatch);

        let err = resolver.resolve("not-an-ip").await.unwrap_err();
        assert!(matches!(err, MonitorError::InvalidInput(_)));
        assert_eq!(directory.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_reservation_wire_shape() {
        let body = r#"{"Reservations":[{"Instances":[
            {"InstanceId":"i-abc123","PrivateIpAddress":"10.0.0.5"}
        ]}]}"#;
        #[derive(Deserialize)]
        #[serde(rename_all = "PascalCase")]
        struct Envelope {
            reservations: Vec<Reservation>,
        }
        let parsed: Envelope = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.reservations[0].instances[0].instance_id, "i-abc123");
    }

    #[test]
    fn test_ambiguity_policy_parse() {
        assert_eq!("first".parse::<AmbiguityPolicy>().unwrap(), AmbiguityPolicy::FirstMatch);
        assert_eq!("Reject".parse::<AmbiguityPolicy>().unwrap(), AmbiguityPolicy::Reject);
        assert!("random".parse::<AmbiguityPolicy>().is_err());
    }
}
