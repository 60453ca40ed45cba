//! Lifecycle monitoring and emergency cleanup
//!
//! The [`LifecycleManager`] watches a [`Registry`] through a non-owning
//! handle: it can run health checks and force cleanups, but it is never the
//! reason a registry stays alive.

use std::sync::{Arc, Weak};
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::registry::{CleanupReport, Registry, RegistrySnapshot};
use crate::session::SessionMetrics;

/// Ceilings used to classify a session as degraded.
///
/// Explicit configuration, not inferred constants; tune per deployment.
#[derive(Debug, Clone)]
pub struct HealthThresholds {
    /// Agent count above this is degraded
    pub max_agents_per_user: usize,
    /// Execution context count above this is degraded
    pub max_contexts_per_user: usize,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            max_agents_per_user: 25,
            max_contexts_per_user: 50,
        }
    }
}

/// Health classification for one user's session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// Within all configured ceilings
    Healthy,
    /// Over a ceiling, or the session could not be inspected
    Degraded,
}

/// Per-user health report.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    /// Classification outcome
    pub status: HealthStatus,
    /// User the report is about
    pub user_id: String,
    /// Metrics snapshot, absent when the session could not be inspected
    pub metrics: Option<SessionMetrics>,
    /// Human-readable reason for a degraded classification
    pub detail: Option<String>,
}

impl HealthReport {
    /// Classify a metrics snapshot against the given thresholds.
    pub fn classify(metrics: SessionMetrics, thresholds: &HealthThresholds) -> Self {
        let mut detail = None;
        let status = if metrics.agent_count > thresholds.max_agents_per_user {
            detail = Some(format!(
                "agent count {} above ceiling {}",
                metrics.agent_count, thresholds.max_agents_per_user
            ));
            HealthStatus::Degraded
        } else if metrics.context_count > thresholds.max_contexts_per_user {
            detail = Some(format!(
                "context count {} above ceiling {}",
                metrics.context_count, thresholds.max_contexts_per_user
            ));
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };

        Self {
            status,
            user_id: metrics.user_id.clone(),
            metrics: Some(metrics),
            detail,
        }
    }

    /// Degraded report for a user whose session could not be inspected.
    pub fn degraded(user_id: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Degraded,
            user_id: user_id.into(),
            metrics: None,
            detail: Some(detail.into()),
        }
    }
}

/// Monitoring companion to the registry.
///
/// Holds only a `Weak` handle: dropping the registry while a manager exists
/// is fine, and subsequent calls surface [`Error::RegistryUnavailable`].
pub struct LifecycleManager {
    registry: Weak<Registry>,
    thresholds: HealthThresholds,
    tasks: Vec<JoinHandle<()>>,
}

impl LifecycleManager {
    /// Create a manager observing `registry`, inheriting its thresholds.
    pub fn new(registry: &Arc<Registry>) -> Self {
        Self::with_thresholds(registry, registry.thresholds().clone())
    }

    /// Create a manager with its own thresholds for single-user checks.
    pub fn with_thresholds(registry: &Arc<Registry>, thresholds: HealthThresholds) -> Self {
        Self {
            registry: Arc::downgrade(registry),
            thresholds,
            tasks: Vec::new(),
        }
    }

    fn registry(&self) -> Result<Arc<Registry>> {
        self.registry.upgrade().ok_or(Error::RegistryUnavailable)
    }

    /// Auditable delegate for removing one agent's resources.
    ///
    /// Same semantics as [`Registry::remove_user_agent`], with its own log
    /// line so cleanup initiated here is distinguishable from direct calls.
    pub async fn cleanup_agent_resources(&self, user_id: &str, agent_type: &str) -> Result<bool> {
        info!(user_id, agent_type, "lifecycle agent cleanup");
        self.registry()?.remove_user_agent(user_id, agent_type).await
    }

    /// Health-check one user's session against the configured thresholds.
    ///
    /// A user without a session yields a degraded report rather than an
    /// error, so a monitoring sweep over a user list never aborts.
    pub fn monitor_memory_usage(&self, user_id: &str) -> Result<HealthReport> {
        let registry = self.registry()?;
        match registry.session_metrics(user_id) {
            Ok(Some(metrics)) => Ok(HealthReport::classify(metrics, &self.thresholds)),
            Ok(None) => Ok(HealthReport::degraded(user_id, "no session for user")),
            Err(e) => Ok(HealthReport::degraded(user_id, e.to_string())),
        }
    }

    /// Aggregate health view over every live session.
    pub fn monitor_all_users(&self) -> Result<RegistrySnapshot> {
        Ok(self.registry()?.monitor_all_users())
    }

    /// Emergency single-user cleanup, callable outside the monitor path
    /// (e.g. from an external alert).
    pub async fn trigger_cleanup(&self, user_id: &str) -> Result<CleanupReport> {
        warn!(user_id, "emergency cleanup triggered");
        self.registry()?.cleanup_user_session(user_id).await
    }

    /// Spawn a background task that health-sweeps the registry on a timer.
    ///
    /// Degraded users are logged at warn level. The task holds the same
    /// weak handle and exits quietly once the registry is gone.
    pub fn spawn_monitor(&mut self, interval: Duration) {
        let registry = Weak::clone(&self.registry);
        let handle = tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                let Some(registry) = registry.upgrade() else {
                    break;
                };
                let snapshot = registry.monitor_all_users();
                for report in &snapshot.reports {
                    if report.status == HealthStatus::Degraded {
                        warn!(
                            user_id = %report.user_id,
                            detail = report.detail.as_deref().unwrap_or("unknown"),
                            "session degraded"
                        );
                    }
                }
                info!(
                    users = snapshot.total_users,
                    agents = snapshot.total_agents,
                    "health sweep complete"
                );
            }
        });
        self.tasks.push(handle);
    }

    /// Stop all background monitor tasks.
    pub fn shutdown(self) {
        info!(tasks = self.tasks.len(), "stopping lifecycle monitor tasks");
        for task in self.tasks {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::AgentCapability;
    use std::sync::Arc;

    struct PlainAgent;

    impl AgentCapability for PlainAgent {}

    fn small_thresholds() -> HealthThresholds {
        HealthThresholds {
            max_agents_per_user: 2,
            max_contexts_per_user: 4,
        }
    }

    #[tokio::test]
    async fn test_monitor_classifies_against_ceiling() {
        let registry = Arc::new(Registry::new());
        let manager = LifecycleManager::with_thresholds(&registry, small_thresholds());

        let session = registry.get_user_session("u1").await.unwrap();
        session.register_agent("a", Arc::new(PlainAgent));
        session.register_agent("b", Arc::new(PlainAgent));

        let report = manager.monitor_memory_usage("u1").unwrap();
        assert_eq!(report.status, HealthStatus::Healthy);

        session.register_agent("c", Arc::new(PlainAgent));
        let report = manager.monitor_memory_usage("u1").unwrap();
        assert_eq!(report.status, HealthStatus::Degraded);
        assert!(report.detail.unwrap().contains("above ceiling"));
    }

    #[tokio::test]
    async fn test_missing_session_reports_degraded() {
        let registry = Arc::new(Registry::new());
        let manager = LifecycleManager::new(&registry);

        let report = manager.monitor_memory_usage("ghost").unwrap();
        assert_eq!(report.status, HealthStatus::Degraded);
        assert!(report.metrics.is_none());
    }

    #[tokio::test]
    async fn test_dropped_registry_surfaces_unavailable() {
        let registry = Arc::new(Registry::new());
        let manager = LifecycleManager::new(&registry);
        drop(registry);

        assert!(matches!(
            manager.monitor_all_users(),
            Err(Error::RegistryUnavailable)
        ));
        assert!(matches!(
            manager.trigger_cleanup("u1").await,
            Err(Error::RegistryUnavailable)
        ));
    }

    #[tokio::test]
    async fn test_trigger_cleanup_removes_session() {
        let registry = Arc::new(Registry::new());
        let manager = LifecycleManager::new(&registry);

        let session = registry.get_user_session("u1").await.unwrap();
        session.register_agent("a", Arc::new(PlainAgent));

        let report = manager.trigger_cleanup("u1").await.unwrap();
        assert_eq!(report.cleaned_agents, 1);
        assert_eq!(registry.user_count(), 0);
    }

    #[tokio::test]
    async fn test_spawn_monitor_runs_and_shuts_down() {
        let registry = Arc::new(Registry::new());
        registry
            .get_user_session("u1")
            .await
            .unwrap()
            .register_agent("a", Arc::new(PlainAgent));

        let mut manager = LifecycleManager::new(&registry);
        manager.spawn_monitor(Duration::from_millis(5));
        tokio::time::sleep(Duration::from_millis(30)).await;
        manager.shutdown();
    }

    #[tokio::test]
    async fn test_cleanup_agent_resources_delegates() {
        let registry = Arc::new(Registry::new());
        let manager = LifecycleManager::new(&registry);

        let session = registry.get_user_session("u1").await.unwrap();
        session.register_agent("a", Arc::new(PlainAgent));

        assert!(manager.cleanup_agent_resources("u1", "a").await.unwrap());
        assert!(!manager.cleanup_agent_resources("u1", "a").await.unwrap());
        // Session itself survives an agent-level cleanup.
        assert_eq!(registry.user_count(), 1);
    }
}
