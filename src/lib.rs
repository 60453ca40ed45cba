//! # Agentry - Per-User Agent Session Registry
//!
//! A concurrency-safe directory that isolates stateful agent instances,
//! execution contexts, and a real-time notification channel per
//! authenticated user inside one shared multi-tenant process.
//!
//! This crate provides:
//! - Sessions (`session`) - per-user aggregate of agents, contexts, bridge
//! - Registry (`registry`) - race-free get-or-create plus cleanup operations
//! - Lifecycle (`lifecycle`) - health checks and emergency cleanup
//! - Capability seams (`capability`, `transport`) - injected collaborators
//! - Contexts (`context`) - correlation records for agent invocations
//!
//! The registry decides nothing about what an agent does: agents, factories,
//! and transports are opaque trait objects supplied by the host application.
//! One [`registry::Registry`] is constructed at startup and passed explicitly
//! into request-handling code.

#![warn(missing_docs)]

pub mod capability;
pub mod context;
pub mod error;
pub mod lifecycle;
pub mod logging;
pub mod registry;
pub mod session;
pub mod transport;

/// Prelude - commonly used types
pub mod prelude {
    pub use crate::capability::{AgentCapability, AgentFactory};
    pub use crate::context::{CallerContext, ExecutionContext};
    pub use crate::error::{Error, Result};
    pub use crate::lifecycle::{
        HealthReport, HealthStatus, HealthThresholds, LifecycleManager,
    };
    pub use crate::registry::{
        CleanupReport, EmergencyReport, OpStatus, Registry, RegistrySnapshot, ResetReport,
    };
    pub use crate::session::{CleanupOutcome, Session, SessionMetrics};
    pub use crate::transport::{LogBridge, LogTransport, NotifierBridge, TransportManager};
}
