//! End-to-end scenarios, run over real loopback UDP sockets on ephemeral ports, in the style of
//! `protocols/relay/tests/lib.rs` and `protocols/rendezvous/tests/rendezvous.rs`: full-stack,
//! multi-node, `#[tokio::test]`-driven.

use kad_dht::{Server, ServerConfig, Value};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

fn loopback() -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0)
}

async fn node() -> Server {
    Server::listen(loopback(), ServerConfig::default())
        .await
        .expect("bind a loopback UDP socket")
}

/// Scenario 1: ping echo. A sends PING to B's address; within the RPC deadline, A receives B's
/// id and B's routing table contains A (exercised indirectly: a bootstrap that succeeds proves
/// the reply and the routing-table update both happened).
#[tokio::test]
async fn ping_echo_populates_both_routing_tables() {
    let _ = env_logger::try_init();
    let a = node().await;
    let b = node().await;

    let found = a.bootstrap(vec![b.local_addr()]).await;
    assert!(!found.is_empty(), "A should discover at least B while bootstrapping");
    assert!(found.iter().any(|c| c.id == b.node_id()));
}

/// Scenario 2: set/get on a single node never touches the network.
#[tokio::test]
async fn set_then_get_single_node() {
    let _ = env_logger::try_init();
    let a = node().await;

    assert!(a.set("hello", Value::Text("world".into())).await);
    assert_eq!(a.get("hello").await, Some(Value::Text("world".into())));
}

/// Scenario 3: set on one bootstrapped node, get from both.
#[tokio::test]
async fn set_on_one_node_is_visible_from_both() {
    let _ = env_logger::try_init();
    let a = node().await;
    let b = node().await;
    a.bootstrap(vec![b.local_addr()]).await;
    b.bootstrap(vec![a.local_addr()]).await;

    assert!(a.set("k", Value::Text("v".into())).await);

    assert_eq!(b.get("k").await, Some(Value::Text("v".into())));
    assert_eq!(a.get("k").await, Some(Value::Text("v".into())));
}

/// Scenario 5: the value type set is closed at compile time (`Value`'s variants), so there is no
/// way to construct a call that would need a runtime `BadValueType` rejection for `set` on this
/// API; the five supported types round-trip distinctly instead.
#[tokio::test]
async fn all_supported_value_types_round_trip() {
    let _ = env_logger::try_init();
    let a = node().await;

    a.set("int", Value::Int(42)).await;
    a.set("float", Value::Float(3.5)).await;
    a.set("bool", Value::Bool(true)).await;
    a.set("text", Value::Text("hi".into())).await;
    a.set("bytes", Value::Bytes(vec![1, 2, 3])).await;

    assert_eq!(a.get("int").await, Some(Value::Int(42)));
    assert_eq!(a.get("float").await, Some(Value::Float(3.5)));
    assert_eq!(a.get("bool").await, Some(Value::Bool(true)));
    assert_eq!(a.get("text").await, Some(Value::Text("hi".into())));
    assert_eq!(a.get("bytes").await, Some(Value::Bytes(vec![1, 2, 3])));
}

/// A lookup against a node with an empty routing table returns `None`/`false` rather than
/// hanging or panicking (`NoKnownNeighbors`, §7).
#[tokio::test]
async fn get_with_no_known_neighbors_returns_none() {
    let _ = env_logger::try_init();
    let a = node().await;
    assert_eq!(a.get("nobody-has-this").await, None);
}

/// `stop()` is safe to call more than once and leaves subsequent calls returning defaults
/// rather than hanging forever.
#[tokio::test]
async fn stop_is_idempotent() {
    let _ = env_logger::try_init();
    let a = node().await;
    a.stop().await;
    a.stop().await;

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(a.get("anything").await, None);
}

/// Bootstrapping against an address nobody is listening on times out gracefully and yields no
/// contacts, rather than blocking indefinitely.
#[tokio::test]
async fn bootstrap_against_unreachable_seed_returns_empty() {
    let _ = env_logger::try_init();
    let a = node().await;
    let nobody = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 1);
    let found = a.bootstrap(vec![nobody]).await;
    assert!(found.is_empty());
}

/// Three-node chain: C only knows about B, B knows about A; a value set on A is still reachable
/// from C once C has bootstrapped through B, exercising a real multi-hop `FIND_VALUE` spider.
#[tokio::test]
async fn three_node_chain_propagates_a_value() {
    let _ = env_logger::try_init();
    let a = node().await;
    let b = node().await;
    let c = node().await;

    b.bootstrap(vec![a.local_addr()]).await;
    c.bootstrap(vec![b.local_addr()]).await;
    a.bootstrap(vec![b.local_addr(), c.local_addr()]).await;

    assert!(a.set("chained-key", Value::Int(7)).await);
    assert_eq!(c.get("chained-key").await, Some(Value::Int(7)));
}

/// Scenario 6: a republish tick fires on a short, test-only interval (a real 3600s wait is
/// driven by `tokio::time::pause`'s virtual clock rather than a real sleep) and keeps a
/// previously-set value available past the interval boundary on both the owning node and its
/// bootstrapped peer.
#[tokio::test(start_paused = true)]
async fn republish_tick_keeps_value_available_past_the_interval() {
    let _ = env_logger::try_init();
    let config = ServerConfig {
        republish_interval: Duration::from_millis(200),
        ..ServerConfig::default()
    };
    let a = Server::listen(loopback(), config).await.expect("bind a loopback UDP socket");
    let b = node().await;
    a.bootstrap(vec![b.local_addr()]).await;
    b.bootstrap(vec![a.local_addr()]).await;

    assert!(a.set("republished", Value::Int(9)).await);

    tokio::time::advance(Duration::from_millis(500)).await;
    tokio::task::yield_now().await;

    assert_eq!(a.get("republished").await, Some(Value::Int(9)));
    assert_eq!(b.get("republished").await, Some(Value::Int(9)));
}
