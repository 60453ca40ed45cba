//! Registry races: concurrent first access, cross-user independence, and
//! cleanup claim semantics.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use agentry::prelude::*;
use async_trait::async_trait;

struct CountingAgent {
    cleanups: Arc<AtomicUsize>,
}

#[async_trait]
impl AgentCapability for CountingAgent {
    async fn cleanup(&self) -> Result<()> {
        self.cleanups.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct CountingFactory {
    cleanups: Arc<AtomicUsize>,
}

impl AgentFactory for CountingFactory {
    fn build(&self, _ctx: &ExecutionContext) -> Result<Arc<dyn AgentCapability>> {
        Ok(Arc::new(CountingAgent {
            cleanups: Arc::clone(&self.cleanups),
        }))
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_first_access_yields_single_session() {
    let _ = tracing_subscriber::fmt::try_init();
    let registry = Arc::new(Registry::new());

    let handles: Vec<_> = (0..50)
        .map(|_| {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move { registry.get_user_session("alice").await.unwrap() })
        })
        .collect();

    let mut sessions = Vec::with_capacity(50);
    for handle in handles {
        sessions.push(handle.await.unwrap());
    }

    let first = Arc::clone(&sessions[0]);
    assert!(sessions.iter().all(|s| Arc::ptr_eq(&first, s)));
    assert_eq!(registry.user_count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_distinct_users_each_get_own_session() {
    let registry = Arc::new(Registry::new());
    let user_count = 32;

    let handles: Vec<_> = (0..user_count)
        .map(|i| {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move {
                let session = registry
                    .get_user_session(&format!("user-{i}"))
                    .await
                    .unwrap();
                assert_eq!(session.user_id(), format!("user-{i}"));
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(registry.user_count(), user_count);
    for i in 0..user_count {
        let metrics = registry
            .session_metrics(&format!("user-{i}"))
            .unwrap()
            .unwrap();
        assert_eq!(metrics.user_id, format!("user-{i}"));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn alice_and_bob_monitor_scenario() {
    let registry = Arc::new(Registry::new());
    let cleanups = Arc::new(AtomicUsize::new(0));
    for agent_type in ["triage", "coder", "reviewer"] {
        registry.register_agent_factory(
            agent_type,
            Arc::new(CountingFactory {
                cleanups: Arc::clone(&cleanups),
            }),
        );
    }

    // 50 concurrent session fetches per user.
    let mut handles = Vec::new();
    for user in ["alice", "bob"] {
        for _ in 0..50 {
            let registry = Arc::clone(&registry);
            handles.push(tokio::spawn(async move {
                registry.get_user_session(user).await.unwrap();
            }));
        }
    }
    for handle in handles {
        handle.await.unwrap();
    }

    for user in ["alice", "bob"] {
        for agent_type in ["triage", "coder", "reviewer"] {
            registry
                .create_agent_for_user(user, agent_type, None, None)
                .await
                .unwrap();
        }
    }

    let snapshot = registry.monitor_all_users();
    assert_eq!(snapshot.total_users, 2);
    assert_eq!(snapshot.total_agents, 6);
    assert!(snapshot
        .reports
        .iter()
        .all(|r| r.status == HealthStatus::Healthy));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn racing_cleanups_process_each_session_exactly_once() {
    let registry = Arc::new(Registry::new());
    let cleanups = Arc::new(AtomicUsize::new(0));

    let users = 8;
    let agents_per_user = 4;
    for u in 0..users {
        let session = registry.get_user_session(&format!("user-{u}")).await.unwrap();
        for a in 0..agents_per_user {
            session.register_agent(
                format!("worker-{a}"),
                Arc::new(CountingAgent {
                    cleanups: Arc::clone(&cleanups),
                }),
            );
        }
    }
    assert_eq!(registry.user_count(), users);

    // Emergency sweep racing per-user cleanups: every agent must be cleaned
    // exactly once regardless of which path claims the session.
    let mut handles = Vec::new();
    {
        let registry = Arc::clone(&registry);
        handles.push(tokio::spawn(async move {
            registry.emergency_cleanup_all().await;
        }));
    }
    for u in 0..users {
        let registry = Arc::clone(&registry);
        handles.push(tokio::spawn(async move {
            registry
                .cleanup_user_session(&format!("user-{u}"))
                .await
                .unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(registry.user_count(), 0);
    assert_eq!(
        cleanups.load(Ordering::SeqCst),
        users * agents_per_user,
        "each agent cleaned exactly once"
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn slow_cleanup_on_one_user_does_not_block_another() {
    struct SlowAgent;

    #[async_trait]
    impl AgentCapability for SlowAgent {
        async fn cleanup(&self) -> Result<()> {
            tokio::time::sleep(std::time::Duration::from_millis(200)).await;
            Ok(())
        }
    }

    let registry = Arc::new(Registry::new());
    let slow_session = registry.get_user_session("slow").await.unwrap();
    slow_session.register_agent("anchor", Arc::new(SlowAgent));

    let cleanup = {
        let registry = Arc::clone(&registry);
        tokio::spawn(async move { registry.cleanup_user_session("slow").await.unwrap() })
    };

    // While the slow cleanup runs, other users' structural operations finish
    // well inside its duration.
    let start = std::time::Instant::now();
    for i in 0..20 {
        registry
            .get_user_session(&format!("fast-{i}"))
            .await
            .unwrap();
    }
    assert!(start.elapsed() < std::time::Duration::from_millis(150));

    let report = cleanup.await.unwrap();
    assert_eq!(report.cleaned_agents, 1);
}
