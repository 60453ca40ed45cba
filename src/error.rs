//! Error types for the agentry registry

use thiserror::Error;

/// Result type alias using agentry's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the agentry registry
#[derive(Debug, Error)]
pub enum Error {
    // ============ Validation Errors ============
    /// User id is empty, blank, or otherwise not a valid identifier
    #[error("Invalid user id: {0}")]
    InvalidUserId(String),

    // ============ Registry Errors ============
    /// No factory registered for the requested agent type
    #[error("Unknown agent type: {0}")]
    UnknownAgentType(String),

    /// The registry observed by a lifecycle manager has been dropped
    #[error("Registry is no longer available")]
    RegistryUnavailable,

    // ============ Agent Errors ============
    /// An agent's cleanup capability failed
    #[error("Agent cleanup error: {agent_type} - {message}")]
    AgentCleanup {
        /// Agent type whose cleanup failed
        agent_type: String,
        /// Error message
        message: String,
    },

    // ============ Transport Errors ============
    /// The transport manager failed to build a notification bridge
    #[error("Bridge construction error: {0}")]
    BridgeConstruction(String),

    // ============ Generic Errors ============
    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// Any other error
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Create a new invalid user id error
    pub fn invalid_user_id(msg: impl Into<String>) -> Self {
        Self::InvalidUserId(msg.into())
    }

    /// Create a new agent cleanup error
    pub fn agent_cleanup(agent_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self::AgentCleanup {
            agent_type: agent_type.into(),
            message: message.into(),
        }
    }

    /// Create a new bridge construction error
    pub fn bridge_construction(msg: impl Into<String>) -> Self {
        Self::BridgeConstruction(msg.into())
    }

    /// Check if this error is caused by bad caller input
    pub fn is_caller_error(&self) -> bool {
        matches!(self, Self::InvalidUserId(_) | Self::UnknownAgentType(_))
    }
}
