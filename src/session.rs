//! Per-user session aggregate
//!
//! A [`Session`] holds everything the process keeps for one authenticated
//! user: agent instances keyed by agent type, execution contexts keyed the
//! same way, and an optional notification bridge. All structural mutation
//! goes through one `parking_lot::Mutex` scoped to the session instance, so
//! contention on one user's session never blocks another user's.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::capability::AgentCapability;
use crate::context::{CallerContext, ExecutionContext};
use crate::error::{Error, Result};
use crate::transport::{NotifierBridge, TransportManager};

/// Read-only snapshot of a session's state, consumable by health endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct SessionMetrics {
    /// Owning user
    pub user_id: String,
    /// Number of registered agent instances
    pub agent_count: usize,
    /// Number of stored execution contexts
    pub context_count: usize,
    /// Whether a notification bridge is attached
    pub has_bridge: bool,
    /// Seconds since the session was created
    pub uptime_secs: i64,
}

/// Accounting for a best-effort cleanup pass over a session's agents.
///
/// Per-agent faults are counted here, never raised: cleanup always runs to
/// completion over the remaining agents.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct CleanupOutcome {
    /// Agents whose cleanup completed without error
    pub agents_cleaned: usize,
    /// Agents whose cleanup faulted (logged and skipped over)
    pub failures: usize,
}

impl CleanupOutcome {
    /// Total agents the pass touched
    pub fn total(&self) -> usize {
        self.agents_cleaned + self.failures
    }
}

#[derive(Default)]
struct SessionInner {
    agents: HashMap<String, Arc<dyn AgentCapability>>,
    contexts: HashMap<String, ExecutionContext>,
    bridge: Option<Arc<dyn NotifierBridge>>,
}

/// Per-user aggregate of agents, execution contexts, and bridge state.
pub struct Session {
    user_id: String,
    correlation_id: String,
    created_at: DateTime<Utc>,
    inner: Mutex<SessionInner>,
}

/// Validate a tenant identifier: non-empty, not blank, no control characters.
pub(crate) fn validate_user_id(user_id: &str) -> Result<()> {
    if user_id.trim().is_empty() {
        return Err(Error::invalid_user_id("user id must not be empty or blank"));
    }
    if user_id.chars().any(char::is_control) {
        return Err(Error::invalid_user_id(
            "user id must not contain control characters",
        ));
    }
    Ok(())
}

impl Session {
    /// Create an empty session for the given user.
    ///
    /// Fails with [`Error::InvalidUserId`] when the id is empty, blank, or
    /// contains control characters.
    pub fn new(user_id: impl Into<String>) -> Result<Self> {
        let user_id = user_id.into();
        validate_user_id(&user_id)?;
        Ok(Self {
            user_id,
            correlation_id: Uuid::new_v4().simple().to_string(),
            created_at: Utc::now(),
            inner: Mutex::new(SessionInner::default()),
        })
    }

    /// Owning user id
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Session-scoped correlation id, stable for the session's lifetime
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    /// Creation timestamp
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Register an agent instance under `agent_type`, overwriting any prior
    /// instance of the same type. Idempotent.
    pub fn register_agent(&self, agent_type: impl Into<String>, instance: Arc<dyn AgentCapability>) {
        let agent_type = agent_type.into();
        debug!(user_id = %self.user_id, agent_type = %agent_type, "registering agent");
        self.inner.lock().agents.insert(agent_type, instance);
    }

    /// Get the agent registered under `agent_type`, or `None` when absent.
    ///
    /// Reads go through the session lock so a caller never observes a torn
    /// structural mutation.
    pub fn get_agent(&self, agent_type: &str) -> Option<Arc<dyn AgentCapability>> {
        self.inner.lock().agents.get(agent_type).map(Arc::clone)
    }

    /// Remove the agent registered under `agent_type` along with its stored
    /// execution context. Returns the removed instance, if any.
    pub fn remove_agent(&self, agent_type: &str) -> Option<Arc<dyn AgentCapability>> {
        let mut inner = self.inner.lock();
        inner.contexts.remove(agent_type);
        inner.agents.remove(agent_type)
    }

    /// Build an execution context bound to this session's user id and the
    /// caller's request/thread/run ids, store it under `agent_type`
    /// (overwriting any prior value), and return it.
    pub fn create_execution_context(
        &self,
        agent_type: impl Into<String>,
        caller: &CallerContext,
    ) -> ExecutionContext {
        let ctx = ExecutionContext::from_caller(&self.user_id, caller);
        self.inner.lock().contexts.insert(agent_type.into(), ctx.clone());
        ctx
    }

    /// Get the execution context stored under `agent_type`, if any.
    pub fn get_execution_context(&self, agent_type: &str) -> Option<ExecutionContext> {
        self.inner.lock().contexts.get(agent_type).cloned()
    }

    /// Attach or clear the session's notification bridge.
    ///
    /// With `transport` absent, any existing bridge is dropped and the
    /// session keeps operating without real-time notification. Otherwise a
    /// bridge is built from `caller`, or from a default context stamped with
    /// the session's user id and correlation id when no caller is supplied.
    ///
    /// Bridge construction happens outside the session lock; only the final
    /// store is a critical section.
    pub async fn set_websocket_bridge(
        &self,
        transport: Option<Arc<dyn TransportManager>>,
        caller: Option<&CallerContext>,
    ) -> Result<()> {
        let Some(transport) = transport else {
            if self.inner.lock().bridge.take().is_some() {
                debug!(user_id = %self.user_id, "notification bridge cleared");
            }
            return Ok(());
        };

        let ctx = match caller {
            Some(caller) => ExecutionContext::from_caller(&self.user_id, caller),
            None => ExecutionContext::session_scoped(&self.user_id, &self.correlation_id),
        };

        let bridge = transport.create_bridge(&ctx).await?;
        self.inner.lock().bridge = Some(bridge);
        debug!(user_id = %self.user_id, "notification bridge attached");
        Ok(())
    }

    /// Whether a notification bridge is currently attached
    pub fn has_bridge(&self) -> bool {
        self.inner.lock().bridge.is_some()
    }

    /// The attached notification bridge, if any
    pub fn bridge(&self) -> Option<Arc<dyn NotifierBridge>> {
        self.inner.lock().bridge.as_ref().map(Arc::clone)
    }

    /// Clean up every registered agent and empty the session.
    ///
    /// Both maps and the bridge are drained under the lock first, then every
    /// agent's `cleanup` runs concurrently outside it. Faults are caught at
    /// the agent boundary, logged, and counted; a single agent faulting or
    /// hanging never stops cleanup of the remaining agents in the pass and
    /// never propagates to the caller.
    pub async fn cleanup_all_agents(&self) -> CleanupOutcome {
        let agents: Vec<(String, Arc<dyn AgentCapability>)> = {
            let mut inner = self.inner.lock();
            inner.contexts.clear();
            inner.bridge = None;
            inner.agents.drain().collect()
        };

        let user_id = self.user_id.as_str();
        let results = join_all(agents.into_iter().map(|(agent_type, agent)| async move {
            match agent.cleanup().await {
                Ok(()) => true,
                Err(e) => {
                    warn!(
                        user_id,
                        agent_type = %agent_type,
                        error = %e,
                        "agent cleanup failed"
                    );
                    false
                }
            }
        }))
        .await;

        let mut outcome = CleanupOutcome::default();
        for cleaned in results {
            if cleaned {
                outcome.agents_cleaned += 1;
            } else {
                outcome.failures += 1;
            }
        }
        outcome
    }

    /// Pure read of the session's current state.
    pub fn get_metrics(&self) -> SessionMetrics {
        let inner = self.inner.lock();
        SessionMetrics {
            user_id: self.user_id.clone(),
            agent_count: inner.agents.len(),
            context_count: inner.contexts.len(),
            has_bridge: inner.bridge.is_some(),
            uptime_secs: (Utc::now() - self.created_at).num_seconds(),
        }
    }

    /// Number of registered agents
    pub fn agent_count(&self) -> usize {
        self.inner.lock().agents.len()
    }
}
