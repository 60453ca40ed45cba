//! Session registry
//!
//! The [`Registry`] owns the user id -> [`Session`] map and is the single
//! shared structure in the process. Structural changes (create, remove,
//! swap) go through the map's own shard locks; everything session-internal
//! stays behind that session's lock. A slow cleanup inside one session never
//! holds the map-level lock.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::join_all;
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::capability::{AgentCapability, AgentFactory};
use crate::context::{CallerContext, ExecutionContext};
use crate::error::{Error, Result};
use crate::lifecycle::{HealthReport, HealthThresholds};
use crate::session::{validate_user_id, Session, SessionMetrics};
use crate::transport::TransportManager;

/// Status of a session-level cleanup or reset operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OpStatus {
    /// Every agent cleaned up without error
    Completed,
    /// The pass finished but one or more agent cleanups faulted
    CompletedWithErrors,
    /// No session existed for the user
    NotFound,
}

impl OpStatus {
    fn from_failures(failures: usize) -> Self {
        if failures == 0 {
            Self::Completed
        } else {
            Self::CompletedWithErrors
        }
    }
}

/// Result of replacing a user's session with a fresh one.
#[derive(Debug, Clone, Serialize)]
pub struct ResetReport {
    /// User whose session was reset
    pub user_id: String,
    /// Outcome of cleaning the old session
    pub status: OpStatus,
    /// Agents the old session held (cleaned plus faulted)
    pub agents_reset: usize,
}

/// Result of removing a user's session from the registry.
#[derive(Debug, Clone, Serialize)]
pub struct CleanupReport {
    /// User whose session was removed
    pub user_id: String,
    /// Outcome of the cleanup pass
    pub status: OpStatus,
    /// Agents cleaned up without error
    pub cleaned_agents: usize,
}

/// Read-only aggregate view over every live session.
#[derive(Debug, Clone, Serialize)]
pub struct RegistrySnapshot {
    /// Number of live sessions
    pub total_users: usize,
    /// Sum of registered agents across all sessions
    pub total_agents: usize,
    /// Per-user health classification
    pub reports: Vec<HealthReport>,
}

/// Accounting for an emergency cleanup sweep over the whole registry.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct EmergencyReport {
    /// Sessions removed and cleaned
    pub users_cleaned: usize,
    /// Agents cleaned up without error, summed across sessions
    pub agents_cleaned: usize,
}

/// Concurrency-safe directory of per-user sessions.
///
/// Constructed once at process startup and passed explicitly into
/// request-handling code; core logic never reaches for an ambient global.
pub struct Registry {
    sessions: DashMap<String, Arc<Session>>,
    factories: DashMap<String, Arc<dyn AgentFactory>>,
    transport: RwLock<Option<Arc<dyn TransportManager>>>,
    thresholds: HealthThresholds,
}

impl Registry {
    /// Create an empty registry with default health thresholds.
    pub fn new() -> Self {
        Self::with_thresholds(HealthThresholds::default())
    }

    /// Create an empty registry with explicit health thresholds.
    pub fn with_thresholds(thresholds: HealthThresholds) -> Self {
        Self {
            sessions: DashMap::new(),
            factories: DashMap::new(),
            transport: RwLock::new(None),
            thresholds,
        }
    }

    /// Health thresholds this registry classifies sessions against
    pub fn thresholds(&self) -> &HealthThresholds {
        &self.thresholds
    }

    /// Register the factory used to build agents of `agent_type`.
    ///
    /// The factory table is global across users; a later registration for
    /// the same type replaces the earlier one.
    pub fn register_agent_factory(
        &self,
        agent_type: impl Into<String>,
        factory: Arc<dyn AgentFactory>,
    ) {
        self.factories.insert(agent_type.into(), factory);
    }

    fn current_transport(&self) -> Option<Arc<dyn TransportManager>> {
        self.transport.read().clone()
    }

    /// Get the user's session, creating it on first access.
    ///
    /// Race-free under concurrent first accesses: the map's entry API
    /// guarantees exactly one created session survives. A freshly created
    /// session receives a bridge from the shared transport manager, if one
    /// has been set; bridge failure is logged and the session continues
    /// without real-time notification.
    pub async fn get_user_session(&self, user_id: &str) -> Result<Arc<Session>> {
        validate_user_id(user_id)?;

        // Fast path, no entry lock for the common repeat access.
        if let Some(existing) = self.sessions.get(user_id) {
            return Ok(Arc::clone(&existing));
        }

        let (session, created) = match self.sessions.entry(user_id.to_string()) {
            Entry::Occupied(entry) => (Arc::clone(entry.get()), false),
            Entry::Vacant(entry) => {
                let session = Arc::new(Session::new(user_id)?);
                entry.insert(Arc::clone(&session));
                (session, true)
            }
        };

        // The entry guard is gone here; bridge construction may suspend.
        if created {
            debug!(user_id, "session created");
            self.apply_shared_transport(&session).await;
        }
        Ok(session)
    }

    async fn apply_shared_transport(&self, session: &Arc<Session>) {
        if let Some(transport) = self.current_transport() {
            if let Err(e) = session.set_websocket_bridge(Some(transport), None).await {
                warn!(
                    user_id = session.user_id(),
                    error = %e,
                    "bridge setup failed, session continues without notifications"
                );
            }
        }
    }

    /// Store `transport` as the shared manager and propagate it to every
    /// existing session. Sessions created afterward pick it up automatically.
    pub async fn set_websocket_manager(&self, transport: Arc<dyn TransportManager>) {
        *self.transport.write() = Some(Arc::clone(&transport));

        // Snapshot first so no map guard is held across the awaits below.
        let sessions: Vec<Arc<Session>> = self
            .sessions
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        for session in sessions {
            if let Err(e) = session
                .set_websocket_bridge(Some(Arc::clone(&transport)), None)
                .await
            {
                warn!(
                    user_id = session.user_id(),
                    error = %e,
                    "bridge propagation failed"
                );
            }
        }
    }

    /// Build an agent of `agent_type` for the user and register it in their
    /// session.
    ///
    /// Fails with [`Error::UnknownAgentType`] when no factory is registered
    /// for the type. A supplied caller context is stored as the agent's
    /// execution context; a supplied transport manager is attached as the
    /// session's bridge for this call.
    pub async fn create_agent_for_user(
        &self,
        user_id: &str,
        agent_type: &str,
        caller: Option<&CallerContext>,
        transport: Option<Arc<dyn TransportManager>>,
    ) -> Result<Arc<dyn AgentCapability>> {
        let session = self.get_user_session(user_id).await?;

        let factory = self
            .factories
            .get(agent_type)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| Error::UnknownAgentType(agent_type.to_string()))?;

        let ctx = match caller {
            Some(caller) => ExecutionContext::from_caller(session.user_id(), caller),
            None => ExecutionContext::session_scoped(session.user_id(), session.correlation_id()),
        };

        if transport.is_some() {
            session.set_websocket_bridge(transport, caller).await?;
        }

        let instance = factory.build(&ctx)?;

        // Commit only once every fallible step has passed: a failed create
        // leaves no context or agent behind in the session.
        if let Some(caller) = caller {
            session.create_execution_context(agent_type, caller);
        }
        session.register_agent(agent_type, Arc::clone(&instance));
        info!(user_id, agent_type, "agent created");
        Ok(instance)
    }

    /// Get the user's agent of `agent_type`, or `None` when either the
    /// session or the agent does not exist.
    pub fn get_user_agent(
        &self,
        user_id: &str,
        agent_type: &str,
    ) -> Result<Option<Arc<dyn AgentCapability>>> {
        validate_user_id(user_id)?;
        Ok(self
            .sessions
            .get(user_id)
            .and_then(|session| session.get_agent(agent_type)))
    }

    /// Remove the user's agent of `agent_type` and invoke its cleanup.
    ///
    /// Returns whether an agent was actually present. A cleanup fault is
    /// logged; the removal still counts as successful.
    pub async fn remove_user_agent(&self, user_id: &str, agent_type: &str) -> Result<bool> {
        validate_user_id(user_id)?;

        let session = match self.sessions.get(user_id) {
            Some(entry) => Arc::clone(&entry),
            None => return Ok(false),
        };

        let Some(agent) = session.remove_agent(agent_type) else {
            return Ok(false);
        };

        if let Err(e) = agent.cleanup().await {
            warn!(user_id, agent_type, error = %e, "agent cleanup failed during removal");
        }
        debug!(user_id, agent_type, "agent removed");
        Ok(true)
    }

    /// Replace the user's session with a fresh, empty one under the same id,
    /// then clean the old session up.
    ///
    /// The swap happens in place under the map's entry lock, so exactly one
    /// session is live for the user at any instant; callers racing the reset
    /// observe either the old or the new object, never neither. A user with
    /// no session reports [`OpStatus::NotFound`] — reset only ever replaces,
    /// it never creates.
    pub async fn reset_user_agents(&self, user_id: &str) -> Result<ResetReport> {
        validate_user_id(user_id)?;

        let swapped = match self.sessions.entry(user_id.to_string()) {
            Entry::Occupied(mut entry) => {
                let fresh = Arc::new(Session::new(user_id)?);
                let old = std::mem::replace(entry.get_mut(), Arc::clone(&fresh));
                Some((old, fresh))
            }
            Entry::Vacant(_) => None,
        };

        let Some((old, fresh)) = swapped else {
            return Ok(ResetReport {
                user_id: user_id.to_string(),
                status: OpStatus::NotFound,
                agents_reset: 0,
            });
        };

        // The entry guard is gone here; bridge construction may suspend.
        debug_assert!(!Arc::ptr_eq(&old, &fresh));
        self.apply_shared_transport(&fresh).await;
        let outcome = old.cleanup_all_agents().await;

        info!(user_id, agents_reset = outcome.total(), "session reset");
        Ok(ResetReport {
            user_id: user_id.to_string(),
            status: OpStatus::from_failures(outcome.failures),
            agents_reset: outcome.total(),
        })
    }

    /// Clean up and remove the user's session entirely.
    ///
    /// The map removal claims the session, so a concurrent emergency sweep
    /// cannot double-process it.
    pub async fn cleanup_user_session(&self, user_id: &str) -> Result<CleanupReport> {
        validate_user_id(user_id)?;

        let Some((_, session)) = self.sessions.remove(user_id) else {
            return Ok(CleanupReport {
                user_id: user_id.to_string(),
                status: OpStatus::NotFound,
                cleaned_agents: 0,
            });
        };

        let outcome = session.cleanup_all_agents().await;
        info!(
            user_id,
            cleaned = outcome.agents_cleaned,
            failures = outcome.failures,
            "session removed"
        );
        Ok(CleanupReport {
            user_id: user_id.to_string(),
            status: OpStatus::from_failures(outcome.failures),
            cleaned_agents: outcome.agents_cleaned,
        })
    }

    /// Aggregate health view over every live session. Never mutates.
    pub fn monitor_all_users(&self) -> RegistrySnapshot {
        let mut reports = Vec::new();
        let mut total_agents = 0;

        for entry in self.sessions.iter() {
            let metrics = entry.value().get_metrics();
            total_agents += metrics.agent_count;
            reports.push(HealthReport::classify(metrics, &self.thresholds));
        }

        RegistrySnapshot {
            total_users: reports.len(),
            total_agents,
            reports,
        }
    }

    /// Clean up and remove every session.
    ///
    /// Each session is claimed via map removal before its cleanup runs, so
    /// concurrent per-user cleanups and this sweep together process every
    /// session exactly once. Cleanup passes run concurrently across users.
    pub async fn emergency_cleanup_all(&self) -> EmergencyReport {
        let user_ids: Vec<String> = self
            .sessions
            .iter()
            .map(|entry| entry.key().clone())
            .collect();

        let mut claimed = Vec::new();
        for user_id in user_ids {
            if let Some((_, session)) = self.sessions.remove(&user_id) {
                claimed.push(session);
            }
        }

        let outcomes = join_all(claimed.iter().map(|s| s.cleanup_all_agents())).await;

        let mut report = EmergencyReport {
            users_cleaned: claimed.len(),
            agents_cleaned: 0,
        };
        for outcome in outcomes {
            report.agents_cleaned += outcome.agents_cleaned;
        }
        info!(
            users = report.users_cleaned,
            agents = report.agents_cleaned,
            "emergency cleanup complete"
        );
        report
    }

    /// Number of live sessions
    pub fn user_count(&self) -> usize {
        self.sessions.len()
    }

    /// Metrics snapshot for one user's session, if it exists.
    pub fn session_metrics(&self, user_id: &str) -> Result<Option<SessionMetrics>> {
        validate_user_id(user_id)?;
        Ok(self
            .sessions
            .get(user_id)
            .map(|session| session.get_metrics()))
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
