//! Execution context types
//!
//! Correlation records that bind an agent invocation to the user, request,
//! thread, and run it belongs to.

use serde::{Deserialize, Serialize};

/// Caller-supplied correlation data, read-only input to the registry.
///
/// Typically extracted from an authenticated request by the server shell.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallerContext {
    /// Authenticated user the request belongs to
    pub user_id: String,
    /// Request identifier
    pub request_id: String,
    /// Conversation thread identifier
    pub thread_id: String,
    /// Run identifier within the thread
    pub run_id: String,
}

/// Correlation record binding an agent invocation to a user/thread/run.
///
/// Always stamped with the owning session's user id, never the caller's;
/// a caller cannot smuggle another tenant's id into a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionContext {
    /// User id of the owning session
    pub user_id: String,
    /// Request identifier
    pub request_id: String,
    /// Conversation thread identifier
    pub thread_id: String,
    /// Run identifier within the thread
    pub run_id: String,
}

impl ExecutionContext {
    /// Build a context bound to `user_id`, copying correlation ids from the caller.
    pub fn from_caller(user_id: &str, caller: &CallerContext) -> Self {
        Self {
            user_id: user_id.to_string(),
            request_id: caller.request_id.clone(),
            thread_id: caller.thread_id.clone(),
            run_id: caller.run_id.clone(),
        }
    }

    /// Default context for session-scoped operations that have no caller request.
    ///
    /// All correlation fields derive from the session's own correlation id.
    pub fn session_scoped(user_id: &str, correlation_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            request_id: format!("session_{correlation_id}"),
            thread_id: correlation_id.to_string(),
            run_id: correlation_id.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_caller_binds_session_user() {
        let caller = CallerContext {
            user_id: "mallory".to_string(),
            request_id: "req-1".to_string(),
            thread_id: "thread-1".to_string(),
            run_id: "run-1".to_string(),
        };

        let ctx = ExecutionContext::from_caller("alice", &caller);
        assert_eq!(ctx.user_id, "alice");
        assert_eq!(ctx.request_id, "req-1");
        assert_eq!(ctx.thread_id, "thread-1");
        assert_eq!(ctx.run_id, "run-1");
    }

    #[test]
    fn test_session_scoped_defaults() {
        let ctx = ExecutionContext::session_scoped("alice", "abc123");
        assert_eq!(ctx.user_id, "alice");
        assert_eq!(ctx.request_id, "session_abc123");
        assert_eq!(ctx.thread_id, "abc123");
        assert_eq!(ctx.run_id, "abc123");
    }
}
