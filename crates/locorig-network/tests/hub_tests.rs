//! Integration tests for the network hub
//!
//! These tests run real hubs on the loopback interface:
//! - send planning and frame layout
//! - relay between a player and a monitor hub
//! - roster validation and player expiry
//! - handshake filtering on the receive path
//! - heartbeats and expiry when local address lookup fails

use async_trait::async_trait;
use locorig_core::{PeerId, Recipients, RelayMessage, Role, DEFAULT_SOURCE};
use locorig_network::{
    AddressResolver, Inbound, NetworkConfig, NetworkConfigBuilder, NetworkHub, DEFAULT_HANDSHAKE,
};
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;

const MONITOR_ID: &str = "3232235786";

async fn wait_for_message(hub: &NetworkHub) -> Option<RelayMessage> {
    for _ in 0..200 {
        if let Some(message) = hub.poll_message() {
            return Some(message);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    None
}

/// Host without any usable route
struct Unroutable;

#[async_trait]
impl AddressResolver for Unroutable {
    async fn local_addresses(&self) -> io::Result<Vec<Ipv4Addr>> {
        Err(io::Error::new(io::ErrorKind::NetworkUnreachable, "no route"))
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

fn loopback() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 40000))
}

#[tokio::test]
async fn test_player_broadcast_plan() {
    let hub = NetworkHub::start(NetworkConfig::local_test(0)).await.unwrap();
    hub.set_monitors(&[MONITOR_ID]).unwrap();

    let plan = hub
        .plan_send(Recipients::Monitors, DEFAULT_SOURCE, "position,1.0,2.0,3.0;")
        .unwrap();

    let port = hub.config().port;
    let local_port = hub.config().local_port;
    assert_eq!(
        plan.destinations,
        vec![
            SocketAddr::from(([192, 168, 1, 10], port)),
            SocketAddr::from(([127, 0, 0, 1], local_port)),
        ]
    );
    assert_eq!(
        plan.frame,
        format!("{DEFAULT_HANDSHAKE},client,monitor,default;position,1.0,2.0,3.0;")
    );
    hub.shutdown();
}

#[tokio::test]
async fn test_relay_between_player_and_monitor() {
    let monitor = NetworkHub::start(NetworkConfig::local_test(0)).await.unwrap();
    monitor.set_role(Role::Monitor);

    let player_config = NetworkConfigBuilder::new()
        .port(0)
        .local_port(monitor.local_addr().port())
        .heartbeat_interval(Duration::from_millis(100))
        .static_addresses(vec![Ipv4Addr::new(10, 254, 0, 2)])
        .build();
    let player = NetworkHub::start(player_config).await.unwrap();

    let queued = player
        .send_default(Recipients::Monitors, "position,1.0,2.0,3.0;")
        .unwrap();
    assert_eq!(queued, 1);

    let message = wait_for_message(&monitor).await.expect("relay message");
    assert_eq!(message.source, "default");
    assert_eq!(message.body, "position,1.0,2.0,3.0;");
    assert_eq!(message.instructions()[0].key, "position");

    // The player's heartbeat reaches the monitor over the same loopback path.
    let localhost = PeerId::from_ipv4(Ipv4Addr::LOCALHOST);
    let mut discovered = false;
    for _ in 0..100 {
        if monitor.players().contains(&localhost) {
            discovered = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(discovered);

    player.shutdown();
    monitor.shutdown();
}

#[tokio::test]
async fn test_handshake_mismatch_is_dropped() {
    let monitor = NetworkHub::start(NetworkConfig::local_test(0)).await.unwrap();
    monitor.set_role(Role::Monitor);
    let target = SocketAddr::from(([127, 0, 0, 1], monitor.local_addr().port()));

    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    socket
        .send_to(b"#XXX#,client,monitor,default;forged,1;", target)
        .await
        .unwrap();
    socket
        .send_to(b"#SW5#,client,monitor,default;genuine,1;", target)
        .await
        .unwrap();

    let message = wait_for_message(&monitor).await.expect("genuine message");
    assert_eq!(message.body, "genuine,1;");
    assert!(monitor.poll_message().is_none());
    monitor.shutdown();
}

#[tokio::test]
async fn test_role_switch_clears_queue() {
    let hub = NetworkHub::start(NetworkConfig::local_test(0)).await.unwrap();
    let outcome = hub.ingest(
        b"#SW5#,monitor,client,default;touch,1;",
        loopback(),
        Instant::now(),
    );
    assert!(matches!(outcome, Inbound::Queued(_)));
    assert_eq!(hub.pending(), 1);

    hub.set_role(Role::Monitor);
    assert_eq!(hub.poll_data(), "");
    hub.shutdown();
}

#[tokio::test]
async fn test_same_role_keeps_queue() {
    let hub = NetworkHub::start(NetworkConfig::local_test(0)).await.unwrap();
    hub.ingest(
        b"#SW5#,monitor,client,default;touch,1;",
        loopback(),
        Instant::now(),
    );
    hub.set_role(Role::Client);
    assert_eq!(hub.poll_data(), "default,touch,1;");
    hub.shutdown();
}

#[tokio::test]
async fn test_roster_validation() {
    let config = NetworkConfigBuilder::new()
        .port(0)
        .static_addresses(vec![Ipv4Addr::new(192, 168, 1, 20)])
        .build();
    let hub = NetworkHub::start(config).await.unwrap();
    let self_id = hub.local_ids()[0].clone();
    assert_eq!(self_id.as_str(), "3232235796");

    hub.set_monitors(&["3232235787"]).unwrap();

    let err = hub.set_monitors(&[MONITOR_ID, MONITOR_ID]).unwrap_err();
    assert!(err.is_validation());
    assert_eq!(hub.monitors()[0].as_str(), "3232235787");

    let err = hub.set_monitors(&[self_id.as_str()]).unwrap_err();
    assert_eq!(err.error_code(), "SELF_ADDRESS");
    assert_eq!(hub.monitors().len(), 1);

    hub.set_monitors::<&str>(&[]).unwrap();
    assert!(hub.monitors().is_empty());

    assert!(hub.validate("").is_ok());
    assert!(hub.validate("3232235786, 3232235787").is_ok());
    assert!(hub.validate("3232235786;3232235786").is_err());
    assert!(hub.validate("3232235796").is_err());

    hub.set_clients_text("3232235786 3232235787").unwrap();
    assert_eq!(hub.clients().len(), 2);
    hub.shutdown();
}

#[tokio::test]
async fn test_heartbeat_expiry() {
    let hub = NetworkHub::start(NetworkConfig::local_test(0)).await.unwrap();
    hub.set_role(Role::Monitor);
    let player_addr = SocketAddr::from(([192, 168, 1, 30], 25000));
    let start = Instant::now();

    let outcome = hub.ingest(b"#SW5#,client,monitor,default;monitor,1;", player_addr, start);
    assert!(matches!(outcome, Inbound::Heartbeat(_)));
    assert_eq!(hub.players().len(), 1);
    assert_eq!(hub.pending(), 0);

    assert!(hub.expire_players(start + Duration::from_millis(500)).is_empty());
    let expired = hub.expire_players(start + Duration::from_millis(1500));
    assert_eq!(expired.len(), 1);
    assert!(hub.players().is_empty());
    hub.shutdown();
}

#[tokio::test]
async fn test_players_expire_without_local_address() {
    let config = NetworkConfigBuilder::new()
        .port(0)
        .heartbeat_interval(Duration::from_millis(50))
        .player_ttl(Duration::from_millis(200))
        .build();
    let hub = NetworkHub::start_with_resolver(config, Arc::new(Unroutable))
        .await
        .unwrap();
    hub.set_role(Role::Monitor);
    assert!(hub.local_ids().is_empty());

    let player_addr = SocketAddr::from(([192, 168, 1, 30], 25000));
    let outcome = hub.ingest(
        b"#SW5#,client,monitor,default;monitor,1;",
        player_addr,
        Instant::now(),
    );
    assert!(matches!(outcome, Inbound::Heartbeat(_)));
    assert_eq!(hub.players().len(), 1);

    assert!(wait_until(|| hub.players().is_empty()).await);
    hub.shutdown();
}

#[tokio::test]
async fn test_player_heartbeat_without_local_address() {
    let monitor = NetworkHub::start(NetworkConfig::local_test(0)).await.unwrap();
    monitor.set_role(Role::Monitor);

    let player_config = NetworkConfigBuilder::new()
        .port(0)
        .local_port(monitor.local_addr().port())
        .heartbeat_interval(Duration::from_millis(50))
        .build();
    let player = NetworkHub::start_with_resolver(player_config, Arc::new(Unroutable))
        .await
        .unwrap();

    let localhost = PeerId::from_ipv4(Ipv4Addr::LOCALHOST);
    assert!(wait_until(|| monitor.players().contains(&localhost)).await);
    assert_eq!(monitor.pending(), 0);

    player.shutdown();
    monitor.shutdown();
}
