//! Agent capability seams
//!
//! The registry never inspects what an agent does. It stores agents behind
//! [`AgentCapability`] and builds them through [`AgentFactory`], so the same
//! registry serves any mix of agent implementations.

use std::sync::Arc;

use async_trait::async_trait;

use crate::context::ExecutionContext;
use crate::error::Result;

/// Opaque stateful object that performs task execution on behalf of a user.
///
/// The registry only ever invokes `cleanup`; everything else an agent does
/// is between the agent and its caller.
#[async_trait]
pub trait AgentCapability: Send + Sync {
    /// Release resources held by this agent.
    ///
    /// The default implementation is a no-op: an agent with nothing to
    /// release simply does not override it, which the registry treats the
    /// same as a successful cleanup.
    async fn cleanup(&self) -> Result<()> {
        Ok(())
    }
}

impl std::fmt::Debug for dyn AgentCapability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn AgentCapability")
    }
}

/// Factory for building agent instances of a single agent type.
///
/// Factories are registered once on the [`Registry`](crate::registry::Registry)
/// and shared across all users.
pub trait AgentFactory: Send + Sync {
    /// Build a fresh agent instance bound to the given execution context.
    fn build(&self, ctx: &ExecutionContext) -> Result<Arc<dyn AgentCapability>>;
}
