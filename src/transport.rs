//! Real-time transport seams
//!
//! The registry consumes a transport but never owns one. A
//! [`TransportManager`] builds per-user [`NotifierBridge`]s; the bridges are
//! stored inside sessions and invoked by agent execution code to push
//! lifecycle events to whatever transport backs them (websocket, SSE, ...).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::info;

use crate::context::ExecutionContext;
use crate::error::Result;

/// Per-user channel for emitting agent lifecycle events to a real-time
/// transport. The registry invokes these methods and never looks inside.
#[async_trait]
pub trait NotifierBridge: Send + Sync {
    /// An agent started working on a request
    async fn notify_agent_started(&self, agent_type: &str) -> Result<()>;

    /// An agent is reasoning / waiting on its provider
    async fn notify_agent_thinking(&self, agent_type: &str) -> Result<()>;

    /// An agent began executing a tool
    async fn notify_tool_executing(&self, agent_type: &str, tool_name: &str) -> Result<()>;

    /// A tool execution finished
    async fn notify_tool_completed(&self, agent_type: &str, tool_name: &str) -> Result<()>;

    /// An agent finished its task
    async fn notify_agent_completed(&self, agent_type: &str) -> Result<()>;

    /// An agent failed
    async fn notify_agent_error(&self, agent_type: &str, message: &str) -> Result<()>;

    /// Record a run -> thread mapping so later events can be correlated
    fn register_run_thread(&self, run_id: &str, thread_id: &str);
}

/// External collaborator that owns the real-time transport and builds
/// bridges on demand.
#[async_trait]
pub trait TransportManager: Send + Sync {
    /// Build a notification bridge scoped to the given context.
    ///
    /// May perform I/O (e.g. attach to a live websocket connection).
    async fn create_bridge(&self, ctx: &ExecutionContext) -> Result<Arc<dyn NotifierBridge>>;
}

/// A bridge that logs events via tracing instead of a live transport.
///
/// Useful for local development and as a stand-in when no transport is
/// wired up yet.
pub struct LogBridge {
    user_id: String,
    runs: Mutex<HashMap<String, String>>,
}

impl LogBridge {
    /// Create a log bridge for the given user
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            runs: Mutex::new(HashMap::new()),
        }
    }

    /// Thread id previously registered for a run, if any
    pub fn thread_for_run(&self, run_id: &str) -> Option<String> {
        self.runs.lock().get(run_id).cloned()
    }
}

#[async_trait]
impl NotifierBridge for LogBridge {
    async fn notify_agent_started(&self, agent_type: &str) -> Result<()> {
        info!(user_id = %self.user_id, agent_type, "agent started");
        Ok(())
    }

    async fn notify_agent_thinking(&self, agent_type: &str) -> Result<()> {
        info!(user_id = %self.user_id, agent_type, "agent thinking");
        Ok(())
    }

    async fn notify_tool_executing(&self, agent_type: &str, tool_name: &str) -> Result<()> {
        info!(user_id = %self.user_id, agent_type, tool_name, "tool executing");
        Ok(())
    }

    async fn notify_tool_completed(&self, agent_type: &str, tool_name: &str) -> Result<()> {
        info!(user_id = %self.user_id, agent_type, tool_name, "tool completed");
        Ok(())
    }

    async fn notify_agent_completed(&self, agent_type: &str) -> Result<()> {
        info!(user_id = %self.user_id, agent_type, "agent completed");
        Ok(())
    }

    async fn notify_agent_error(&self, agent_type: &str, message: &str) -> Result<()> {
        info!(user_id = %self.user_id, agent_type, message, "agent error");
        Ok(())
    }

    fn register_run_thread(&self, run_id: &str, thread_id: &str) {
        self.runs
            .lock()
            .insert(run_id.to_string(), thread_id.to_string());
    }
}

/// Transport manager that hands out [`LogBridge`]s.
#[derive(Default)]
pub struct LogTransport;

#[async_trait]
impl TransportManager for LogTransport {
    async fn create_bridge(&self, ctx: &ExecutionContext) -> Result<Arc<dyn NotifierBridge>> {
        Ok(Arc::new(LogBridge::new(ctx.user_id.clone())))
    }
}
