//! Health checks for readiness reporting
//!
//! Probes are registered by name during startup and run together on demand.
//! A failing probe is reported as unhealthy and never aborts the run, so every
//! registered name appears exactly once in the result.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;

use crate::error::Result;

type SyncProbeFn = dyn Fn() -> Result<Value> + Send + Sync;
type AsyncProbeFn = dyn Fn() -> BoxFuture<'static, Result<Value>> + Send + Sync;

/// A zero-argument health probe
#[derive(Clone)]
pub enum Probe {
    Sync(Arc<SyncProbeFn>),
    Async(Arc<AsyncProbeFn>),
}

impl Probe {
    pub fn sync<F>(f: F) -> Self
    where
        F: Fn() -> Result<Value> + Send + Sync + 'static,
    {
        Probe::Sync(Arc::new(f))
    }

    pub fn from_async<F, Fut>(f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        Probe::Async(Arc::new(move || f().boxed()))
    }

    async fn call(&self) -> Result<Value> {
        match self {
            Probe::Sync(f) => f(),
            Probe::Async(f) => f().await,
        }
    }
}

impl std::fmt::Debug for Probe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Probe::Sync(_) => f.write_str("Probe::Sync"),
            Probe::Async(_) => f.write_str("Probe::Async"),
        }
    }
}

/// Outcome of a single probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Healthy,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    pub status: CheckStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CheckResult {
    pub fn is_healthy(&self) -> bool {
        self.status == CheckStatus::Healthy
    }
}

/// Aggregate status over all probes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OverallStatus {
    /// Every probe passed (or none are registered)
    Healthy,
    /// Some probes failed
    Degraded,
    /// Every probe failed
    Unhealthy,
}

impl OverallStatus {
    pub fn http_status_code(&self) -> u16 {
        match self {
            OverallStatus::Healthy | OverallStatus::Degraded => 200,
            OverallStatus::Unhealthy => 503,
        }
    }
}

/// Full health report
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: OverallStatus,
    pub checks: BTreeMap<String, CheckResult>,
    pub timestamp: DateTime<Utc>,
}

impl HealthReport {
    pub fn from_checks(checks: BTreeMap<String, CheckResult>) -> Self {
        let healthy = checks.values().filter(|c| c.is_healthy()).count();
        let status = if healthy == checks.len() {
            OverallStatus::Healthy
        } else if healthy == 0 {
            OverallStatus::Unhealthy
        } else {
            OverallStatus::Degraded
        };
        Self {
            status,
            checks,
            timestamp: Utc::now(),
        }
    }
}

/// Registry of named probes
#[derive(Debug, Default)]
pub struct HealthChecker {
    checks: RwLock<BTreeMap<String, Probe>>,
}

impl HealthChecker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a probe, silently replacing any probe with the same name
    pub fn register(&self, name: impl Into<String>, probe: Probe) {
        self.checks.write().insert(name.into(), probe);
    }

    pub fn names(&self) -> Vec<String> {
        self.checks.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.checks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.checks.read().is_empty()
    }

    /// Run every registered probe
    pub async fn run(&self) -> BTreeMap<String, CheckResult> {
        // Snapshot so no lock is held across probe awaits
        let probes: Vec<(String, Probe)> = self
            .checks
            .read()
            .iter()
            .map(|(name, probe)| (name.clone(), probe.clone()))
            .collect();

        let mut results = BTreeMap::new();
        for (name, probe) in probes {
            let outcome = match probe.call().await {
                Ok(value) => CheckResult {
                    status: CheckStatus::Healthy,
                    result: Some(value),
                    error: None,
                },
                Err(e) => {
                    tracing::warn!(check = %name, "Health check '{}' failed: {}", name, e);
                    CheckResult {
                        status: CheckStatus::Unhealthy,
                        result: None,
                        error: Some(e.to_string()),
                    }
                }
            };
            results.insert(name, outcome);
        }
        results
    }

    /// Run every probe and summarise
    pub async fn report(&self) -> HealthReport {
        HealthReport::from_checks(self.run().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServerError;
    use serde_json::json;

    #[tokio::test]
    async fn test_failing_probe_does_not_hide_others() {
        let checker = HealthChecker::new();
        checker.register("ok", Probe::sync(|| Ok(json!({"tools": 13}))));
        checker.register(
            "broken",
            Probe::sync(|| Err(ServerError::api("service unavailable"))),
        );

        let results = checker.run().await;
        assert_eq!(results.len(), 2);
        assert_eq!(results["ok"].status, CheckStatus::Healthy);
        assert_eq!(results["ok"].result, Some(json!({"tools": 13})));
        assert_eq!(results["broken"].status, CheckStatus::Unhealthy);
        assert_eq!(results["broken"].error.as_deref(), Some("service unavailable"));
    }

    #[tokio::test]
    async fn test_async_probe() {
        let checker = HealthChecker::new();
        checker.register(
            "upstream",
            Probe::from_async(|| async {
                tokio::task::yield_now().await;
                Ok(json!([1, "Usługa dostępna"]))
            }),
        );

        let results = checker.run().await;
        assert!(results["upstream"].is_healthy());
    }

    #[tokio::test]
    async fn test_register_overwrites() {
        let checker = HealthChecker::new();
        checker.register("tool_config", Probe::sync(|| Ok(json!("first"))));
        checker.register("tool_config", Probe::sync(|| Ok(json!("second"))));

        assert_eq!(checker.len(), 1);
        let results = checker.run().await;
        assert_eq!(results["tool_config"].result, Some(json!("second")));
    }

    #[tokio::test]
    async fn test_report_status() {
        let checker = HealthChecker::new();
        assert_eq!(checker.report().await.status, OverallStatus::Healthy);

        checker.register("a", Probe::sync(|| Err(ServerError::network("down"))));
        assert_eq!(checker.report().await.status, OverallStatus::Unhealthy);

        checker.register("b", Probe::sync(|| Ok(Value::Null)));
        let report = checker.report().await;
        assert_eq!(report.status, OverallStatus::Degraded);
        assert_eq!(report.status.http_status_code(), 200);
    }
}
