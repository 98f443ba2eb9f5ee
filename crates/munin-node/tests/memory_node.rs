//! End-to-end node tests over the in-memory transport.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{HOSTNAME, Master, PROMPT, counting_registry, registry, remote};
use munin_memory::{MemoryConnector, MemoryListener};
use munin_node::plugin::PluginRegistry;
use munin_node::{
    AccessRule, AllowList, CancellationToken, Node, NodeError, NodeProfile, NodeServer,
    NodeState, TextEncoding,
};
use pretty_assertions::assert_eq;

const UNKNOWN_COMMAND: &str =
    "# Unknown command. Try cap, list, nodes, config, fetch, version or quit";

fn profile(plugins: PluginRegistry) -> NodeProfile {
    NodeProfile::new(HOSTNAME, "2.0.0", TextEncoding::Ascii, plugins).unwrap()
}

fn memory_node(
    plugins: PluginRegistry,
    rule: Option<Arc<dyn AccessRule>>,
) -> (Arc<NodeServer>, MemoryConnector) {
    let (listener, connector) = MemoryListener::new();
    let node = NodeServer::new(profile(plugins), Box::new(listener), rule);
    (Arc::new(node), connector)
}

fn spawn_run(
    node: &Arc<NodeServer>,
    cancel: &CancellationToken,
) -> tokio::task::JoinHandle<Result<(), NodeError>> {
    let node = Arc::clone(node);
    let cancel = cancel.clone();
    tokio::spawn(async move { node.run(&cancel).await })
}

async fn connect(connector: &MemoryConnector, from: &str) -> Master {
    // run() binds asynchronously
    for _ in 0..100 {
        if connector.is_listening() {
            return Master::new(connector.connect(remote(from)).unwrap());
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("node never started listening");
}

#[tokio::test]
async fn test_protocol_transcript() {
    let (node, connector) = memory_node(registry(), None);
    let cancel = CancellationToken::new();
    let run = spawn_run(&node, &cancel);

    let mut master = connect(&connector, "127.0.0.1:50000").await;
    assert_eq!(
        master.line().await.as_deref(),
        Some("# munin node at node1.example.com")
    );

    assert_eq!(master.ask("list").await, "load if_eth0");
    assert_eq!(master.ask_block("nodes").await, vec![HOSTNAME, "."]);
    assert_eq!(
        master.ask("version").await,
        "munins node on node1.example.com version: 2.0.0"
    );
    assert_eq!(master.ask("cap multigraph dirtyconfig").await, "cap");

    assert_eq!(
        master.ask_block("config load").await,
        vec![
            "graph_title Load average",
            "graph_category system",
            "graph_args --base 1000 -l 0",
            "graph_scale yes",
            "graph_vlabel load",
            "load.label load",
            "load.draw LINE2",
            "load.warning :5",
            "load.critical :10",
            ".",
        ]
    );
    assert_eq!(
        master.ask_block("config if_eth0").await,
        vec![
            "graph_title eth0 traffic",
            "graph_category network",
            "graph_scale yes",
            "graph_vlabel bits in (-) / out (+)",
            "down.label received",
            "down.type DERIVE",
            "down.graph no",
            "up.label bps",
            "up.type DERIVE",
            "up.negative down",
            ".",
        ]
    );

    assert_eq!(
        master.ask_block("fetch if_eth0").await,
        vec!["up.value 800", "down.value 1200", "."]
    );
    assert_eq!(master.ask_block("fetch load").await, vec!["load.value 0.42", "."]);

    assert_eq!(
        master.ask_block("fetch Load").await,
        vec!["# Unknown service", "."]
    );
    assert_eq!(master.ask_block("config").await, vec!["# Unknown service", "."]);
    assert_eq!(master.ask("LIST").await, UNKNOWN_COMMAND);
    assert_eq!(master.ask("").await, UNKNOWN_COMMAND);

    master.send("quit").await;
    assert_eq!(master.line().await, None);

    cancel.cancel();
    run.await.unwrap().unwrap();
    assert_eq!(node.state(), NodeState::Stopped);
    assert_eq!(node.local_endpoint(), None);

    let metrics = node.metrics();
    assert_eq!(metrics.connections, 1);
    assert_eq!(metrics.active_connections, 0);
    assert!(metrics.bytes_sent > 0);
    assert!(metrics.bytes_received > 0);
}

#[tokio::test]
async fn test_dot_ends_session() {
    let (node, connector) = memory_node(registry(), None);
    node.start().await.unwrap();

    let mut master = Master::new(connector.connect(remote("127.0.0.1:50001")).unwrap());
    master.send("nodes").await;
    master.send(".").await;
    master.send("list").await;

    node.accept_single(true, &CancellationToken::new())
        .await
        .unwrap();
    assert!(master.line().await.is_some());
    assert_eq!(master.block().await, vec![HOSTNAME, "."]);
    assert_eq!(master.line().await, None);
}

#[tokio::test]
async fn test_access_rule_rejects_without_banner() {
    let rule: Arc<dyn AccessRule> = Arc::new(AllowList::new([remote("10.0.0.5:0").ip()]));
    let (node, connector) = memory_node(registry(), Some(rule));
    node.start().await.unwrap();

    let mut stranger = Master::new(connector.connect(remote("192.0.2.1:40000")).unwrap());
    node.accept_single(true, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(stranger.line().await, None);

    let mut friend = Master::new(connector.connect(remote("[::ffff:10.0.0.5]:40001")).unwrap());
    let accept = {
        let node = Arc::clone(&node);
        tokio::spawn(async move { node.accept_single(true, &CancellationToken::new()).await })
    };
    assert_eq!(
        friend.line().await.as_deref(),
        Some("# munin node at node1.example.com")
    );
    friend.send("quit").await;
    accept.await.unwrap().unwrap();

    let metrics = node.metrics();
    assert_eq!(metrics.connections, 2);
    assert_eq!(metrics.rejected_connections, 1);
}

#[tokio::test]
async fn test_sessions_never_overlap() {
    let (registry, counter) = counting_registry();
    let (node, connector) = memory_node(registry, None);
    let cancel = CancellationToken::new();
    let run = spawn_run(&node, &cancel);

    let mut first = connect(&connector, "127.0.0.1:50010").await;
    let mut second = Master::new(connector.connect(remote("127.0.0.1:50011")).unwrap());

    assert!(first.line().await.is_some());
    assert_eq!(second.try_line(Duration::from_millis(200)).await, None);
    assert_eq!(counter.started(), 1);

    assert_eq!(first.ask("list").await, "load if_eth0");
    first.send("quit").await;
    assert_eq!(first.line().await, None);

    assert_eq!(
        second.line().await.as_deref(),
        Some("# munin node at node1.example.com")
    );
    assert_eq!(second.ask("list").await, "load if_eth0");
    second.send("quit").await;
    assert_eq!(second.line().await, None);

    cancel.cancel();
    run.await.unwrap().unwrap();
    assert_eq!(counter.started(), 2);
    assert_eq!(counter.closed(), 2);
}

#[tokio::test]
async fn test_accept_single_cancellation() {
    let (node, _connector) = memory_node(registry(), None);
    node.start().await.unwrap();

    let cancel = CancellationToken::new();
    let quiet = {
        let node = Arc::clone(&node);
        let cancel = cancel.clone();
        tokio::spawn(async move { node.accept_single(false, &cancel).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    cancel.cancel();
    tokio::time::timeout(PROMPT, quiet)
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    let err = node.accept_single(true, &cancel).await.unwrap_err();
    assert!(err.is_cancelled());
    assert!(!err.is_disconnect());
    assert_eq!(node.state(), NodeState::Started);
}

#[tokio::test]
async fn test_stop_releases_pending_accept() {
    let (node, connector) = memory_node(registry(), None);
    node.start().await.unwrap();

    let cancel = CancellationToken::new();
    let pending = {
        let node = Arc::clone(&node);
        let cancel = cancel.clone();
        tokio::spawn(async move { node.accept_single(true, &cancel).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!pending.is_finished());

    tokio::time::timeout(PROMPT, node.stop())
        .await
        .unwrap()
        .unwrap();
    let err = tokio::time::timeout(PROMPT, pending)
        .await
        .unwrap()
        .unwrap()
        .unwrap_err();
    assert!(err.is_cancelled());
    assert!(!cancel.is_cancelled());
    assert_eq!(node.state(), NodeState::Stopped);
    assert!(!connector.is_listening());
}

#[tokio::test]
async fn test_peer_gone_before_banner_fires_no_callbacks() {
    let (registry, counter) = counting_registry();
    let (node, connector) = memory_node(registry, None);
    node.start().await.unwrap();

    drop(connector.connect(remote("127.0.0.1:50025")).unwrap());
    node.accept_single(true, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(counter.started(), 0);
    assert_eq!(counter.closed(), 0);
    assert_eq!(node.state(), NodeState::Started);
}

#[tokio::test]
async fn test_cancel_ends_active_session() {
    let (registry, counter) = counting_registry();
    let (node, connector) = memory_node(registry, None);
    let cancel = CancellationToken::new();
    let run = spawn_run(&node, &cancel);

    let mut master = connect(&connector, "127.0.0.1:50020").await;
    assert!(master.line().await.is_some());
    assert_eq!(node.state(), NodeState::Accepting);

    cancel.cancel();
    tokio::time::timeout(PROMPT, run)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(master.line().await, None);
    assert_eq!(counter.closed(), 1);
    assert_eq!(node.state(), NodeState::Stopped);
}

#[tokio::test]
async fn test_graceful_stop_finishes_session() {
    let (node, connector) = memory_node(registry(), None);
    let run = spawn_run(&node, &CancellationToken::new());

    let mut master = connect(&connector, "127.0.0.1:50030").await;
    assert!(master.line().await.is_some());

    let stop = {
        let node = Arc::clone(&node);
        tokio::spawn(async move { node.stop().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!stop.is_finished());

    assert_eq!(master.ask("list").await, "load if_eth0");
    master.send("quit").await;

    tokio::time::timeout(PROMPT, stop)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    run.await.unwrap().unwrap();
    assert_eq!(node.state(), NodeState::Stopped);
    assert!(!connector.is_listening());
}

#[tokio::test]
async fn test_overlong_line() {
    let (listener, connector) = MemoryListener::new();
    let node = NodeServer::builder(profile(registry()), Box::new(listener))
        .max_line_length(16)
        .build();
    node.start().await.unwrap();

    let mut master = Master::new(connector.connect(remote("127.0.0.1:50040")).unwrap());
    master.send(&format!("fetch {}", "x".repeat(64))).await;
    master.send("nodes").await;
    master.send("quit").await;

    node.accept_single(true, &CancellationToken::new())
        .await
        .unwrap();
    assert!(master.line().await.is_some());
    assert_eq!(master.line().await.as_deref(), Some(UNKNOWN_COMMAND));
    assert_eq!(master.block().await, vec![HOSTNAME, "."]);
    assert_eq!(master.line().await, None);
}

#[tokio::test]
async fn test_lifecycle() {
    let (node, connector) = memory_node(PluginRegistry::new(), None);
    assert_eq!(node.state(), NodeState::Created);
    assert!(!connector.is_listening());

    node.start().await.unwrap();
    assert_eq!(node.state(), NodeState::Started);
    assert!(connector.is_listening());
    assert_eq!(node.local_endpoint(), Some(remote("127.0.0.1:4949")));
    assert!(matches!(
        node.start().await.unwrap_err(),
        NodeError::InvalidState(_)
    ));

    node.stop().await.unwrap();
    assert_eq!(node.state(), NodeState::Stopped);
    assert!(node.accept_single(true, &CancellationToken::new()).await.is_err());
    assert!(node.run(&CancellationToken::new()).await.is_err());

    node.dispose().await;
    node.dispose().await;
    assert_eq!(node.state(), NodeState::Disposed);
}
