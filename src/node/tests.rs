//! Node Facade Tests
//!
//! Validates configuration, lifecycle transitions (leave/rejoin), routing
//! fallbacks, and the stats hook registry.

#[cfg(test)]
mod tests {
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    use crate::membership::types::{Change, MemberStatus};
    use crate::node::config::Config;
    use crate::node::errors::{JoinError, NodeError};
    use crate::node::proxy::ProxyRequest;
    use crate::node::service::{Node, Routed};
    use crate::node::stats::StatsProvider;

    fn test_node(host: &str) -> Arc<Node> {
        Node::new(Config::new("test-app", host).unwrap()).unwrap()
    }

    /// Make the local member alive at incarnation 1, bypassing bootstrap.
    fn make_self_alive(node: &Node) {
        node.gossip().apply_changes(&[Change::new(
            node.whoami(),
            MemberStatus::Alive,
            1,
            None,
        )]);
    }

    // ============================================================
    // CONFIGURATION
    // ============================================================

    #[test]
    fn test_config_rejects_empty_app() {
        let result = Config::new("", "127.0.0.1:3000");
        assert!(matches!(result, Err(NodeError::Configuration(_))));
    }

    #[test]
    fn test_config_rejects_malformed_host_port() {
        assert!(Config::new("app", "127.0.0.1").is_err());
        assert!(Config::new("app", ":3000").is_err());
        assert!(Config::new("app", "127.0.0.1:http").is_err());
        assert!(Config::new("app", "127.0.0.1:3000").is_ok());
        assert!(Config::new("app", "some-host.local:3000").is_ok());
    }

    #[test]
    fn test_config_defaults() {
        let config = Config::new("app", "127.0.0.1:3000").unwrap();
        assert_eq!(config.join_size, 3);
        assert_eq!(config.ping_req_size, 3);
        assert_eq!(config.ping_timeout, Duration::from_millis(1500));
        assert_eq!(config.ping_req_timeout, Duration::from_millis(5000));
        assert_eq!(config.min_protocol_period, Duration::from_millis(200));
        assert_eq!(config.suspicion_timeout, Duration::from_millis(5000));
        assert_eq!(config.ring_replica_points, 100);
    }

    // ============================================================
    // LOOKUP
    // ============================================================

    #[tokio::test]
    async fn test_lookup_on_empty_ring_returns_whoami() {
        let node = test_node("127.0.0.1:3000");

        let owner = node.lookup("any-key");

        assert_eq!(owner, node.whoami());
        assert_eq!(node.gossip().stats.counter("lookup"), 1);
    }

    #[tokio::test]
    async fn test_lookup_routes_to_ring_owner() {
        let node = test_node("127.0.0.1:3000");
        make_self_alive(&node);

        let owner = node.lookup("any-key");
        assert_eq!(owner, node.whoami());
    }

    // ============================================================
    // LEAVE / REJOIN
    // ============================================================

    #[tokio::test]
    async fn test_rejoin_after_leave_bumps_incarnation() {
        let node = test_node("127.0.0.1:3000");
        make_self_alive(&node);
        assert_eq!(
            node.gossip().membership.local_member().unwrap().incarnation_number,
            1
        );

        assert_eq!(node.admin_leave().await.unwrap(), "left");
        let member = node.gossip().membership.local_member().unwrap();
        assert_eq!(member.status, MemberStatus::Leave);
        assert!(!node.gossip().ring.has_server(&node.whoami()));

        assert_eq!(node.admin_join().await.unwrap(), "rejoined");
        let member = node.gossip().membership.local_member().unwrap();
        assert_eq!(member.status, MemberStatus::Alive);
        assert_eq!(member.incarnation_number, 2);
        assert!(node.gossip().ring.has_server(&node.whoami()));

        node.destroy().await;
    }

    #[tokio::test]
    async fn test_double_leave_is_a_lifecycle_error() {
        let node = test_node("127.0.0.1:3000");
        make_self_alive(&node);

        node.admin_leave().await.unwrap();
        let second = node.admin_leave().await;
        assert!(matches!(second, Err(NodeError::Lifecycle(_))));
    }

    #[tokio::test]
    async fn test_admin_join_requires_local_member() {
        let node = test_node("127.0.0.1:3000");

        let result = node.admin_join().await;
        assert!(matches!(result, Err(NodeError::Lifecycle(_))));
    }

    // ============================================================
    // BOOTSTRAP
    // ============================================================

    #[tokio::test]
    async fn test_bootstrap_rejects_empty_host_list() {
        let node = test_node("127.0.0.1:3000");

        let result = node.bootstrap(Some(vec![])).await;
        assert!(matches!(result, Err(NodeError::Lifecycle(_))));
    }

    #[tokio::test]
    async fn test_bootstrap_as_founder_and_only_once() {
        let node = test_node("127.0.0.1:3000");

        // A host list containing only ourselves means founder mode.
        let joined = node.bootstrap(Some(vec!["127.0.0.1:3000".into()])).await.unwrap();
        assert!(joined.is_empty());
        assert!(node.is_ready());
        let member = node.gossip().membership.local_member().unwrap();
        assert_eq!(member.status, MemberStatus::Alive);

        let again = node.bootstrap(Some(vec!["127.0.0.1:3000".into()])).await;
        assert!(matches!(again, Err(NodeError::Lifecycle(_))));

        node.destroy().await;
    }

    #[tokio::test]
    async fn test_destroy_is_idempotent() {
        let node = test_node("127.0.0.1:3000");
        make_self_alive(&node);

        node.destroy().await;
        node.destroy().await;
        assert!(!node.is_ready());
        assert!(node.gossip().is_destroyed());

        // A destroyed node refuses to bootstrap.
        let result = node.bootstrap(Some(vec!["127.0.0.1:3000".into()])).await;
        assert!(matches!(result, Err(NodeError::Lifecycle(_))));
    }

    // ============================================================
    // ROUTING
    // ============================================================

    #[tokio::test]
    async fn test_handle_or_proxy_local_when_we_own_the_key() {
        let node = test_node("127.0.0.1:3000");
        make_self_alive(&node);

        let request = ProxyRequest::get("/kv/some-key");
        let routed = node.handle_or_proxy("some-key", &request).await.unwrap();
        assert!(matches!(routed, Routed::Local));
    }

    #[tokio::test]
    async fn test_handle_or_proxy_all_runs_local_group_once() {
        let node = test_node("127.0.0.1:3000");
        make_self_alive(&node);

        let keys: Vec<String> = vec!["a".into(), "b".into(), "c".into()];
        let request = ProxyRequest::get("/kv/batch");
        let responses = node
            .handle_or_proxy_all(&keys, |group| json!({ "handled": group.len() }), &request)
            .await;

        // Single node: one local group holding every key.
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].owner, node.whoami());
        assert_eq!(responses[0].keys.len(), 3);
        let response = responses[0].result.as_ref().unwrap();
        assert_eq!(response.body, json!({ "handled": 3 }));
    }

    // ============================================================
    // STATS HOOKS
    // ============================================================

    struct FixedStats;

    impl StatsProvider for FixedStats {
        fn get_stats(&self) -> serde_json::Value {
            json!({ "requests": 12 })
        }
    }

    #[test]
    fn test_duplicate_stats_hook_is_rejected() {
        let node = test_node("127.0.0.1:3000");

        node.register_stats_hook("worker", Arc::new(FixedStats)).unwrap();
        let duplicate = node.register_stats_hook("worker", Arc::new(FixedStats));
        assert!(matches!(duplicate, Err(NodeError::Configuration(_))));
    }

    #[test]
    fn test_get_stats_merges_hooks_and_counters() {
        let node = test_node("127.0.0.1:3000");
        node.register_stats_hook("worker", Arc::new(FixedStats)).unwrap();
        node.lookup("key");

        let stats = node.get_stats();
        assert_eq!(stats["hooks"]["worker"]["requests"], json!(12));
        assert_eq!(stats["counters"]["lookup"], json!(1));
    }

    // ============================================================
    // ERROR KINDS
    // ============================================================

    #[test]
    fn test_join_error_kinds_are_stable() {
        assert_eq!(JoinError::SelfJoin.kind(), "invalid-join.source");
        assert_eq!(
            JoinError::AppMismatch {
                expected: "mars".into(),
                actual: "jupiter".into()
            }
            .kind(),
            "invalid-join.app"
        );
        assert_eq!(JoinError::DestroyedDuringJoin.kind(), "join.destroyed");
    }
}
