//! Peer discovery and message relay
//!
//! The [`NetworkHub`] owns the receive socket, the peer roster, the current
//! role and the per-destination senders. Two background tasks run for its
//! lifetime:
//!
//! - the receive loop authenticates and filters datagrams, records player
//!   heartbeats and queues everything else for [`NetworkHub::poll_data`];
//! - the heartbeat loop refreshes local addresses, announces a player to its
//!   monitors and expires silent players.
//!
//! All public methods are synchronous and return immediately. Each shared
//! collection has its own lock and no lock is held across socket I/O.
//! Datagram handling takes one lock at a time: it works from a copy of the
//! role and the inbox records the role its messages were accepted under, so
//! a message filtered for the old role is discarded rather than queued after
//! a switch. [`NetworkHub::set_role`] is the only place two locks nest, role
//! first and inbox second.

use locorig_core::{
    CoreError, DeviceIdCodec, PeerId, Recipients, RelayMessage, Role, WireRole, DEFAULT_SOURCE,
};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::net::UdpSocket;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{debug, info, trace, warn};

use crate::config::NetworkConfig;
use crate::error::{NetworkError, Result};
use crate::frame::{encode_frame, Frame, HEARTBEAT_BODY};
use crate::resolver::{AddressResolver, StaticResolver, SystemResolver};
use crate::roster::{split_id_list, validate_targets, PlayerDirectory};
use crate::sender::UnicastSender;

/// Largest datagram the receive loop accepts
const MAX_DATAGRAM: usize = 65_507;

/// Outcome of feeding one datagram to the hub
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Queued for polling
    Queued(RelayMessage),
    /// Player heartbeat recorded
    Heartbeat(PeerId),
    /// Silently discarded
    Dropped(DropReason),
}

/// Why an inbound datagram was discarded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Header missing or incomplete
    Malformed,
    /// Handshake token does not match
    Handshake,
    /// Addressed to another role
    WrongRecipient,
    /// Sender not expected for this role
    UnexpectedSender,
    /// Role changed while the datagram was being handled
    RoleChanged,
}

/// Datagrams prepared for one `send` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendPlan {
    /// Encoded frame, identical for every destination
    pub frame: String,
    /// Destinations in send order; the loopback copy is last
    pub destinations: Vec<SocketAddr>,
}

/// UDP discovery and relay engine
#[derive(Clone)]
pub struct NetworkHub {
    inner: Arc<HubInner>,
}

struct HubInner {
    config: NetworkConfig,
    runtime: Handle,
    codec: DeviceIdCodec,
    resolver: Arc<dyn AddressResolver>,
    listen_addr: SocketAddr,

    role: Mutex<Role>,
    clients: Mutex<Vec<Ipv4Addr>>,
    monitors: Mutex<Vec<Ipv4Addr>>,
    player: Mutex<Option<Ipv4Addr>>,
    players: Mutex<PlayerDirectory>,
    local_addresses: Mutex<Vec<Ipv4Addr>>,
    senders: Mutex<HashMap<SocketAddr, UnicastSender>>,
    inbox: Mutex<Inbox>,

    closed: AtomicBool,
    shutdown: watch::Sender<bool>,
}

impl NetworkHub {
    /// Bind the receive socket and start the background loops.
    ///
    /// Local addresses come from `config.static_addresses` when set and are
    /// auto-detected otherwise.
    pub async fn start(config: NetworkConfig) -> Result<Self> {
        let resolver: Arc<dyn AddressResolver> = if config.static_addresses.is_empty() {
            Arc::new(SystemResolver::new())
        } else {
            Arc::new(StaticResolver::new(config.static_addresses.clone()))
        };
        Self::start_with_resolver(config, resolver).await
    }

    /// Start with an explicit local address source
    pub async fn start_with_resolver(
        mut config: NetworkConfig,
        resolver: Arc<dyn AddressResolver>,
    ) -> Result<Self> {
        let socket = UdpSocket::bind(SocketAddr::from(([0, 0, 0, 0], config.port)))
            .await
            .map_err(|e| NetworkError::BindFailed {
                port: config.port,
                reason: e.to_string(),
            })?;
        let listen_addr = socket.local_addr()?;
        // Port 0 binds an ephemeral port; peers are assumed to share it.
        if config.port == 0 {
            config.port = listen_addr.port();
        }
        if config.local_port == 0 {
            config.local_port = listen_addr.port();
        }

        let (shutdown, _) = watch::channel(false);
        let inner = Arc::new(HubInner {
            runtime: Handle::current(),
            codec: DeviceIdCodec::new(),
            resolver,
            listen_addr,
            role: Mutex::new(Role::default()),
            clients: Mutex::new(Vec::new()),
            monitors: Mutex::new(Vec::new()),
            player: Mutex::new(None),
            players: Mutex::new(PlayerDirectory::new()),
            local_addresses: Mutex::new(Vec::new()),
            senders: Mutex::new(HashMap::new()),
            inbox: Mutex::new(Inbox::new(Role::default())),
            closed: AtomicBool::new(false),
            shutdown,
            config,
        });

        let hub = Self { inner };
        hub.refresh_local_addresses().await;

        tokio::spawn(receive_loop(
            hub.inner.clone(),
            socket,
            hub.inner.shutdown.subscribe(),
        ));
        tokio::spawn(heartbeat_loop(
            hub.inner.clone(),
            hub.inner.shutdown.subscribe(),
        ));

        info!(
            addr = %listen_addr,
            local_port = hub.inner.config.local_port,
            "Network hub listening"
        );
        Ok(hub)
    }

    /// Address the receive socket is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.inner.listen_addr
    }

    /// Hub configuration
    pub fn config(&self) -> &NetworkConfig {
        &self.inner.config
    }

    // ----- Role -----

    /// Current role
    pub fn role(&self) -> Role {
        *self.inner.role.lock()
    }

    /// Switch role. A change discards every queued inbound message.
    pub fn set_role(&self, role: Role) {
        let mut current = self.inner.role.lock();
        if *current != role {
            let dropped = self.inner.inbox.lock().reset(role);
            info!(from = current.as_str(), to = role.as_str(), dropped, "Role changed");
            *current = role;
        }
    }

    // ----- Roster -----

    /// Configured monitor targets
    pub fn monitors(&self) -> Vec<PeerId> {
        to_ids(&self.inner.monitors.lock())
    }

    /// Replace the monitor targets; on error the previous list is kept
    pub fn set_monitors<S: AsRef<str>>(&self, ids: &[S]) -> Result<()> {
        let ips = self.validate_ids(ids)?;
        debug!(count = ips.len(), "Monitors updated");
        *self.inner.monitors.lock() = ips;
        Ok(())
    }

    /// Replace the monitor targets from free text
    pub fn set_monitors_text(&self, text: &str) -> Result<()> {
        self.set_monitors(&split_id_list(text))
    }

    /// Configured client targets
    pub fn clients(&self) -> Vec<PeerId> {
        to_ids(&self.inner.clients.lock())
    }

    /// Replace the client targets; on error the previous list is kept
    pub fn set_clients<S: AsRef<str>>(&self, ids: &[S]) -> Result<()> {
        let ips = self.validate_ids(ids)?;
        debug!(count = ips.len(), "Clients updated");
        *self.inner.clients.lock() = ips;
        Ok(())
    }

    /// Replace the client targets from free text
    pub fn set_clients_text(&self, text: &str) -> Result<()> {
        self.set_clients(&split_id_list(text))
    }

    /// Check a free-text id list against the target rules
    pub fn validate(&self, text: &str) -> Result<()> {
        self.validate_ids(&split_id_list(text)).map(|_| ())
    }

    fn validate_ids<S: AsRef<str>>(&self, ids: &[S]) -> Result<Vec<Ipv4Addr>> {
        let local = self.inner.local_addresses.lock().clone();
        Ok(validate_targets(&self.inner.codec, ids, &local)?)
    }

    /// The player a monitor follows
    pub fn player(&self) -> Option<PeerId> {
        self.inner.player.lock().map(PeerId::from_ipv4)
    }

    /// Choose the player to follow. An empty id clears the choice.
    pub fn set_player(&self, id: &str) -> Result<()> {
        let id = id.trim();
        let ip = if id.is_empty() {
            None
        } else {
            Some(
                self.inner
                    .codec
                    .decode(id)
                    .ok_or_else(|| CoreError::InvalidPeerId(id.to_string()))?,
            )
        };
        *self.inner.player.lock() = ip;
        debug!(player = id, "Player selected");
        Ok(())
    }

    /// Players currently announcing themselves
    pub fn players(&self) -> Vec<PeerId> {
        to_ids(&self.inner.players.lock().list())
    }

    /// Ids of this machine's addresses
    pub fn local_ids(&self) -> Vec<PeerId> {
        to_ids(&self.inner.local_addresses.lock())
    }

    /// Whether this device should act on relayed state.
    ///
    /// A client always is; a monitor only while its player is live.
    pub fn is_enabled(&self) -> bool {
        match self.role() {
            Role::Client => true,
            Role::Monitor => {
                let player = *self.inner.player.lock();
                player.is_some_and(|ip| self.inner.players.lock().contains(ip))
            }
        }
    }

    // ----- Sending -----

    /// Resolve destinations and encode the frame without sending anything
    pub fn plan_send(&self, recipients: Recipients, source: &str, message: &str) -> Result<SendPlan> {
        let mut targets = match recipients {
            Recipients::Clients => self.inner.clients.lock().clone(),
            Recipients::Monitors => self.inner.monitors.lock().clone(),
            Recipients::Player => match *self.inner.player.lock() {
                Some(ip) => vec![ip],
                None => return Err(NetworkError::NoRecipient("player".to_string())),
            },
        };
        targets.push(Ipv4Addr::LOCALHOST);

        let port = self.inner.config.port;
        let local_port = self.inner.config.local_port;
        let destinations = targets
            .into_iter()
            .filter(|ip| !is_source(*ip, source))
            .map(|ip| {
                let port = if ip.is_loopback() { local_port } else { port };
                SocketAddr::from((ip, port))
            })
            .collect();

        let frame = encode_frame(
            &self.inner.config.handshake,
            self.role(),
            recipients.wire_role(),
            source,
            message,
        );
        Ok(SendPlan {
            frame,
            destinations,
        })
    }

    /// Send `message` to a recipient group plus the loopback copy.
    ///
    /// Returns the number of datagrams queued.
    pub fn send(&self, recipients: Recipients, source: &str, message: &str) -> Result<usize> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(NetworkError::ShutDown);
        }
        let plan = self.plan_send(recipients, source, message)?;
        Ok(self.inner.dispatch(&plan))
    }

    /// Broadcast from the default source
    pub fn send_default(&self, recipients: Recipients, message: &str) -> Result<usize> {
        self.send(recipients, DEFAULT_SOURCE, message)
    }

    // ----- Receiving -----

    /// Oldest queued message as `source,body`, or an empty string
    pub fn poll_data(&self) -> String {
        self.poll_message()
            .map(|m| m.to_polled())
            .unwrap_or_default()
    }

    /// Oldest queued message
    pub fn poll_message(&self) -> Option<RelayMessage> {
        self.inner.inbox.lock().messages.pop_front()
    }

    /// Number of queued messages
    pub fn pending(&self) -> usize {
        self.inner.inbox.lock().messages.len()
    }

    /// Process one datagram as if it arrived from `from` at `now`
    pub fn ingest(&self, payload: &[u8], from: SocketAddr, now: Instant) -> Inbound {
        self.inner.handle_datagram(payload, from, now)
    }

    /// Drop players silent for longer than the configured TTL
    pub fn expire_players(&self, now: Instant) -> Vec<PeerId> {
        let ttl = self.inner.config.player_ttl;
        to_ids(&self.inner.players.lock().expire(now, ttl))
    }

    async fn refresh_local_addresses(&self) -> bool {
        self.inner.refresh_local_addresses().await
    }

    // ----- Lifecycle -----

    /// Stop both loops and every sender
    pub fn shutdown(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let _ = self.inner.shutdown.send(true);
        let senders: Vec<UnicastSender> = self.inner.senders.lock().drain().map(|(_, s)| s).collect();
        for sender in &senders {
            sender.stop();
        }
        info!(senders = senders.len(), "Network hub shut down");
    }

    /// Whether `shutdown` has been called
    pub fn is_shut_down(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for NetworkHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkHub")
            .field("addr", &self.inner.listen_addr)
            .field("role", &self.role())
            .field("closed", &self.is_shut_down())
            .finish()
    }
}

impl HubInner {
    fn dispatch(&self, plan: &SendPlan) -> usize {
        let mut queued = 0;
        for destination in &plan.destinations {
            let mut senders = self.senders.lock();
            if !senders.contains_key(destination) {
                match UnicastSender::new(*destination, self.config.send_timeout, &self.runtime) {
                    Ok(sender) => {
                        senders.insert(*destination, sender);
                    }
                    Err(e) => {
                        warn!(%destination, error = %e, "Could not create sender");
                        continue;
                    }
                }
            }
            if let Some(sender) = senders.get(destination) {
                if sender.send(plan.frame.clone()) {
                    queued += 1;
                }
            }
        }
        trace!(queued, frame = %plan.frame, "Frame dispatched");
        queued
    }

    fn handle_datagram(&self, payload: &[u8], from: SocketAddr, now: Instant) -> Inbound {
        let text = String::from_utf8_lossy(payload);
        let Some(frame) = Frame::parse(&text) else {
            trace!(%from, "Dropped malformed datagram");
            return Inbound::Dropped(DropReason::Malformed);
        };
        if frame.handshake != self.config.handshake {
            debug!(%from, "Dropped datagram with foreign handshake");
            return Inbound::Dropped(DropReason::Handshake);
        }
        let sender_ip = match from.ip() {
            IpAddr::V4(ip) => ip,
            IpAddr::V6(ip) => match ip.to_ipv4_mapped() {
                Some(ip) => ip,
                None => return Inbound::Dropped(DropReason::UnexpectedSender),
            },
        };

        let role = self.role();
        let addressed = frame.recipient().is_some_and(|r| role.accepts(r));
        if !addressed {
            trace!(%from, recipient = %frame.recipient_role, "Dropped datagram for other role");
            return Inbound::Dropped(DropReason::WrongRecipient);
        }

        if frame.is_heartbeat() {
            let mut players = self.players.lock();
            players.record_heartbeat(sender_ip, now);
            return Inbound::Heartbeat(PeerId::from_ipv4(sender_ip));
        }
        self.players.lock().touch(sender_ip, now);

        if !self.expects_sender(role, frame.sender(), sender_ip) {
            debug!(%from, sender = %frame.sender_role, "Dropped datagram from unexpected sender");
            return Inbound::Dropped(DropReason::UnexpectedSender);
        }

        let keep = role.is_monitor() || frame.sender() == Some(WireRole::Monitor);
        let source = if frame.source == DEFAULT_SOURCE && !keep {
            PeerId::from_ipv4(sender_ip).to_string()
        } else {
            frame.source
        };
        let message = RelayMessage::new(source, frame.body);

        if !self.inbox.lock().push(role, message.clone(), self.config.queue_capacity) {
            debug!(%from, "Dropped datagram accepted under previous role");
            return Inbound::Dropped(DropReason::RoleChanged);
        }
        trace!(%from, source = %message.source, "Queued relay message");
        Inbound::Queued(message)
    }

    fn expects_sender(&self, role: Role, sender: Option<WireRole>, ip: Ipv4Addr) -> bool {
        let local = ip.is_loopback();
        match sender {
            Some(WireRole::Client) | Some(WireRole::Player) => {
                role.is_monitor() && (local || *self.player.lock() == Some(ip))
            }
            Some(WireRole::Monitor) => {
                role.is_player() && (local || self.monitors.lock().contains(&ip))
            }
            None => false,
        }
    }

    async fn refresh_local_addresses(&self) -> bool {
        match self.resolver.local_addresses().await {
            Ok(addresses) => {
                *self.local_addresses.lock() = addresses;
                true
            }
            Err(e) => {
                debug!(error = %e, "Local address lookup failed");
                self.local_addresses.lock().clear();
                false
            }
        }
    }

    fn role(&self) -> Role {
        *self.role.lock()
    }
}

async fn receive_loop(inner: Arc<HubInner>, socket: UdpSocket, mut stop: watch::Receiver<bool>) {
    let mut buf = vec![0u8; MAX_DATAGRAM];
    loop {
        tokio::select! {
            biased;

            _ = stop.changed() => break,

            received = socket.recv_from(&mut buf) => match received {
                Ok((n, from)) => {
                    inner.handle_datagram(&buf[..n], from, Instant::now());
                }
                Err(e) => {
                    debug!(error = %e, "Receive failed");
                    tokio::time::sleep(std::time::Duration::from_millis(1)).await;
                }
            }
        }
    }
    debug!("Receive loop stopped");
}

async fn heartbeat_loop(inner: Arc<HubInner>, mut stop: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(inner.config.heartbeat_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            biased;

            _ = stop.changed() => break,

            _ = ticker.tick() => {
                // A failed lookup only clears the local ids for this round.
                inner.refresh_local_addresses().await;
                if inner.role().is_player() {
                    let hub = NetworkHub { inner: inner.clone() };
                    if let Err(e) = hub.send_default(Recipients::Monitors, HEARTBEAT_BODY) {
                        debug!(error = %e, "Heartbeat not sent");
                    }
                }
                let expired = inner.players.lock().expire(Instant::now(), inner.config.player_ttl);
                if !expired.is_empty() {
                    debug!(count = expired.len(), "Expired players");
                }
            }
        }
    }
    debug!("Heartbeat loop stopped");
}

/// Inbound queue tagged with the role its messages were accepted under
#[derive(Debug)]
struct Inbox {
    role: Role,
    messages: VecDeque<RelayMessage>,
}

impl Inbox {
    fn new(role: Role) -> Self {
        Self {
            role,
            messages: VecDeque::new(),
        }
    }

    /// Start over under `role`, returning how many messages were discarded
    fn reset(&mut self, role: Role) -> usize {
        let dropped = self.messages.len();
        self.messages.clear();
        self.role = role;
        dropped
    }

    /// Queue `message` if it was accepted under the current role
    fn push(&mut self, role: Role, message: RelayMessage, capacity: usize) -> bool {
        if role != self.role {
            return false;
        }
        self.messages.push_back(message);
        while self.messages.len() > capacity {
            self.messages.pop_front();
        }
        true
    }
}

fn to_ids(ips: &[Ipv4Addr]) -> Vec<PeerId> {
    ips.iter().copied().map(PeerId::from_ipv4).collect()
}

fn is_source(ip: Ipv4Addr, source: &str) -> bool {
    source == ip.to_string() || source == PeerId::from_ipv4(ip).as_str()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    async fn hub() -> NetworkHub {
        NetworkHub::start(NetworkConfig::local_test(0)).await.unwrap()
    }

    fn from(ip: [u8; 4]) -> SocketAddr {
        SocketAddr::from((ip, 25000))
    }

    #[tokio::test]
    async fn test_plan_includes_loopback() {
        let hub = hub().await;
        let plan = hub.plan_send(Recipients::Clients, DEFAULT_SOURCE, "a,1").unwrap();
        assert_eq!(plan.destinations.len(), 1);
        assert!(plan.destinations[0].ip().is_loopback());
        hub.shutdown();
    }

    #[tokio::test]
    async fn test_player_recipient_requires_player() {
        let hub = hub().await;
        let err = hub.plan_send(Recipients::Player, DEFAULT_SOURCE, "a,1").unwrap_err();
        assert_eq!(err.error_code(), "NO_RECIPIENT");

        hub.set_player("3232235786").unwrap();
        let plan = hub.plan_send(Recipients::Player, DEFAULT_SOURCE, "a,1").unwrap();
        assert_eq!(plan.destinations.len(), 2);
        assert!(plan.frame.contains(",player,"));
        hub.shutdown();
    }

    #[tokio::test]
    async fn test_source_destination_skipped() {
        let hub = hub().await;
        hub.set_clients(&["3232235786", "3232235787"]).unwrap();

        let plan = hub.plan_send(Recipients::Clients, "3232235786", "a,1").unwrap();
        assert!(!plan
            .destinations
            .contains(&SocketAddr::from(([192, 168, 1, 10], hub.config().port))));
        assert_eq!(plan.destinations.len(), 2);

        let plan = hub.plan_send(Recipients::Clients, "192.168.1.11", "a,1").unwrap();
        assert_eq!(plan.destinations.len(), 2);
        hub.shutdown();
    }

    #[tokio::test]
    async fn test_set_player_rejects_invalid() {
        let hub = hub().await;
        hub.set_player("3232235786").unwrap();
        assert!(hub.set_player("not-an-id").is_err());
        assert_eq!(hub.player().unwrap().as_str(), "3232235786");
        hub.set_player("").unwrap();
        assert!(hub.player().is_none());
        hub.shutdown();
    }

    #[tokio::test]
    async fn test_monitor_accepts_chosen_player_only() {
        let hub = hub().await;
        hub.set_role(Role::Monitor);
        hub.set_player("3232235786").unwrap();
        let now = Instant::now();

        let frame = b"#SW5#,client,monitor,default;position,1,2,3;";
        let outcome = hub.ingest(frame, from([192, 168, 1, 10]), now);
        assert_eq!(
            outcome,
            Inbound::Queued(RelayMessage::new("default", "position,1,2,3;"))
        );

        let outcome = hub.ingest(frame, from([192, 168, 1, 99]), now);
        assert_eq!(outcome, Inbound::Dropped(DropReason::UnexpectedSender));

        let outcome = hub.ingest(frame, from([127, 0, 0, 1]), now);
        assert!(matches!(outcome, Inbound::Queued(_)));
        assert_eq!(hub.pending(), 2);
        hub.shutdown();
    }

    #[tokio::test]
    async fn test_client_accepts_configured_monitor() {
        let hub = hub().await;
        hub.set_monitors(&["3232235786"]).unwrap();
        let now = Instant::now();

        let frame = b"#SW5#,monitor,client,default;touch,1;";
        assert!(matches!(
            hub.ingest(frame, from([192, 168, 1, 10]), now),
            Inbound::Queued(_)
        ));
        assert_eq!(
            hub.ingest(frame, from([192, 168, 1, 11]), now),
            Inbound::Dropped(DropReason::UnexpectedSender)
        );
        assert_eq!(hub.poll_data(), "default,touch,1;");
        assert_eq!(hub.poll_data(), "");
        hub.shutdown();
    }

    #[tokio::test]
    async fn test_wrong_recipient_and_handshake() {
        let hub = hub().await;
        let now = Instant::now();
        assert_eq!(
            hub.ingest(b"#SW5#,client,monitor,default;x,1;", from([127, 0, 0, 1]), now),
            Inbound::Dropped(DropReason::WrongRecipient)
        );
        assert_eq!(
            hub.ingest(b"nope,monitor,client,default;x,1;", from([127, 0, 0, 1]), now),
            Inbound::Dropped(DropReason::Handshake)
        );
        assert_eq!(
            hub.ingest(b"garbage", from([127, 0, 0, 1]), now),
            Inbound::Dropped(DropReason::Malformed)
        );
        assert_eq!(hub.pending(), 0);
        hub.shutdown();
    }

    #[tokio::test]
    async fn test_queue_drops_oldest() {
        let mut config = NetworkConfig::local_test(0);
        config.queue_capacity = 3;
        let hub = NetworkHub::start(config).await.unwrap();
        let now = Instant::now();
        for i in 0..5 {
            let frame = format!("#SW5#,monitor,client,default;n,{i};");
            hub.ingest(frame.as_bytes(), from([127, 0, 0, 1]), now);
        }
        assert_eq!(hub.pending(), 3);
        assert_eq!(hub.poll_message().unwrap().body, "n,2;");
        hub.shutdown();
    }

    #[tokio::test]
    async fn test_monitor_enabled_tracks_player() {
        let hub = hub().await;
        assert!(hub.is_enabled());

        hub.set_role(Role::Monitor);
        hub.set_player("3232235786").unwrap();
        assert!(!hub.is_enabled());

        let now = Instant::now();
        let outcome = hub.ingest(
            b"#SW5#,client,monitor,default;monitor,1;",
            from([192, 168, 1, 10]),
            now,
        );
        assert_eq!(outcome, Inbound::Heartbeat(PeerId::from_ipv4(Ipv4Addr::new(192, 168, 1, 10))));
        assert!(hub.is_enabled());

        hub.expire_players(now + Duration::from_secs(2));
        assert!(!hub.is_enabled());
        hub.shutdown();
    }

    #[tokio::test]
    async fn test_set_monitors_rejects_padded_duplicate() {
        let hub = hub().await;
        hub.set_monitors(&["3232235787"]).unwrap();

        let err = hub.set_monitors(&["3232235786", " 3232235786"]).unwrap_err();
        assert_eq!(err.error_code(), "DUPLICATE_PEER");
        assert_eq!(hub.monitors(), vec![PeerId::from_ipv4(Ipv4Addr::new(192, 168, 1, 11))]);

        let err = hub.set_monitors_text("3232235786 ,\t3232235786").unwrap_err();
        assert_eq!(err.error_code(), "DUPLICATE_PEER");
        hub.shutdown();
    }

    #[test]
    fn test_inbox_discards_message_from_previous_role() {
        let mut inbox = Inbox::new(Role::Client);
        assert!(inbox.push(Role::Client, RelayMessage::new("default", "a,1;"), 8));

        assert_eq!(inbox.reset(Role::Monitor), 1);
        assert!(!inbox.push(Role::Client, RelayMessage::new("default", "b,1;"), 8));
        assert!(inbox.messages.is_empty());

        assert!(inbox.push(Role::Monitor, RelayMessage::new("default", "c,1;"), 8));
        assert_eq!(inbox.messages.len(), 1);
    }

    #[tokio::test]
    async fn test_role_switch_resets_inbox_role() {
        let hub = hub().await;
        let now = Instant::now();
        hub.ingest(b"#SW5#,monitor,client,default;a,1;", from([127, 0, 0, 1]), now);
        assert_eq!(hub.pending(), 1);

        hub.set_role(Role::Monitor);
        assert_eq!(hub.pending(), 0);
        assert_eq!(hub.inner.inbox.lock().role, Role::Monitor);
        assert!(matches!(
            hub.ingest(b"#SW5#,client,monitor,default;b,1;", from([127, 0, 0, 1]), now),
            Inbound::Queued(_)
        ));
        hub.shutdown();
    }

    #[tokio::test]
    async fn test_send_after_shutdown() {
        let hub = hub().await;
        hub.shutdown();
        let err = hub.send_default(Recipients::Monitors, "a,1").unwrap_err();
        assert_eq!(err.error_code(), "SHUT_DOWN");
    }
}
