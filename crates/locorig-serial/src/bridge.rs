//! The authenticated device connection
//!
//! [`DeviceBridge`] owns a [`SerialPortScanner`] while it looks for the rig.
//! Every candidate link that produces input gets a [`GreetingMatcher`]; the
//! first one to deliver the full greeting is committed and every other
//! candidate is disposed. Once committed, each byte from the device is a
//! pin state code fed to the [`PinBank`], and commands go out through the
//! committed link's write queue.
//!
//! Losing the committed link clears the connection and starts a fresh
//! scanner, unless the bridge was disposed.

use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, trace};

use crate::command::{Command, Level, StopMode};
use crate::config::SerialConfig;
use crate::error::Result;
use crate::handshake::{GreetingMatcher, GreetingStep, ROLE_REPLY};
use crate::link::{LinkEvent, LinkHandle, LinkId};
use crate::pins::PinBank;
use crate::ports::PortProvider;
use crate::scanner::SerialPortScanner;

const EVENT_CAPACITY: usize = 1024;

/// Events published to subscribers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeEvent {
    /// A device was committed (`true`) or lost (`false`)
    ConnectionChanged(bool),
    /// A counted pin transition
    PinChanged {
        /// Pin channel
        pin: u8,
        /// Reported level
        level: Level,
    },
}

#[derive(Default)]
struct BridgeState {
    link: Option<LinkHandle>,
    quitting: bool,
    candidates: HashMap<LinkId, GreetingMatcher>,
    scanner: Option<SerialPortScanner>,
}

struct BridgeInner {
    config: SerialConfig,
    provider: Arc<dyn PortProvider>,
    state: Mutex<BridgeState>,
    pins: Mutex<PinBank>,
    event_tx: broadcast::Sender<BridgeEvent>,
    link_tx: mpsc::UnboundedSender<LinkEvent>,
}

/// Connection to the rig firmware
#[derive(Clone)]
pub struct DeviceBridge {
    inner: Arc<BridgeInner>,
}

impl DeviceBridge {
    /// Start scanning for the device. Must be called from within a tokio
    /// runtime.
    pub fn start(config: SerialConfig, provider: Arc<dyn PortProvider>) -> Self {
        let (link_tx, link_rx) = mpsc::unbounded_channel();
        let (event_tx, _) = broadcast::channel(EVENT_CAPACITY);

        let inner = Arc::new(BridgeInner {
            config,
            provider,
            state: Mutex::new(BridgeState::default()),
            pins: Mutex::new(PinBank::new()),
            event_tx,
            link_tx,
        });

        inner.state.lock().scanner = Some(inner.new_scanner());
        tokio::spawn(dispatch(Arc::downgrade(&inner), link_rx));

        info!(
            baud = inner.config.baud_rate,
            timeout_ms = inner.config.handshake_timeout.as_millis() as u64,
            "Device bridge started"
        );
        Self { inner }
    }

    /// Receive connection and pin events from now on
    pub fn subscribe(&self) -> broadcast::Receiver<BridgeEvent> {
        self.inner.event_tx.subscribe()
    }

    /// Whether a device is committed
    pub fn is_connected(&self) -> bool {
        self.inner.state.lock().link.is_some()
    }

    /// Port of the committed device
    pub fn port_name(&self) -> Option<String> {
        self.inner
            .state
            .lock()
            .link
            .as_ref()
            .map(|l| l.port_name().to_string())
    }

    /// Encode and send a command.
    ///
    /// Acquisition commands restart the counters of their pins even when no
    /// device is connected. Returns whether the bytes were queued.
    pub fn send(&self, command: &Command) -> Result<bool> {
        let bytes = command.encode()?;
        {
            let mut pins = self.inner.pins.lock();
            for (pin, weight) in command.acquisition() {
                pins.configure(pin, weight);
            }
        }
        Ok(self.write(bytes))
    }

    /// Queue raw bytes to the device; dropped when none is connected
    pub fn write(&self, data: impl Into<Bytes>) -> bool {
        let link = self.inner.state.lock().link.clone();
        match link {
            Some(link) => link.write(data),
            None => {
                trace!("No device connected, dropping write");
                false
            }
        }
    }

    /// Drive `pin` to `level`
    pub fn set_binary(&self, pin: u8, level: Level) -> Result<bool> {
        self.send(&Command::SetBinary { pin, level })
    }

    /// Store `value` at device `address`
    pub fn set_address(&self, address: u8, value: u8) -> Result<bool> {
        self.send(&Command::SetAddress { address, value })
    }

    /// Stop driving `pin`
    pub fn stop_set(&self, pin: u8) -> Result<bool> {
        self.send(&Command::Stop {
            pin,
            mode: StopMode::Set,
        })
    }

    /// Stop reporting `pin`
    pub fn stop_get(&self, pin: u8) -> Result<bool> {
        self.send(&Command::Stop {
            pin,
            mode: StopMode::Get,
        })
    }

    /// Emit `repetitions` square periods on `pin`
    pub fn set_pulse(
        &self,
        pin: u8,
        start: Level,
        low: u32,
        high: u32,
        repetitions: u32,
    ) -> Result<bool> {
        self.send(&Command::SetPulse {
            pin,
            start,
            low,
            high,
            repetitions,
        })
    }

    /// Emit a ramping wave on `pin`
    pub fn set_chirp(
        &self,
        pin: u8,
        low_start: u32,
        low_end: u32,
        high_start: u32,
        high_end: u32,
        duration: u32,
    ) -> Result<bool> {
        self.send(&Command::SetChirp {
            pin,
            low_start,
            low_end,
            high_start,
            high_end,
            duration,
        })
    }

    /// Count edges of `pin` with `weight`
    pub fn get_binary(
        &self,
        pin: u8,
        debounce_rising: u32,
        debounce_falling: u32,
        weight: i8,
    ) -> Result<bool> {
        self.send(&Command::GetBinary {
            pin,
            debounce_rising,
            debounce_falling,
            weight,
        })
    }

    /// Track the level of `pin`
    pub fn get_level(&self, pin: u8, debounce_rising: u32, debounce_falling: u32) -> Result<bool> {
        self.send(&Command::GetLevel {
            pin,
            debounce_rising,
            debounce_falling,
        })
    }

    /// Count an encoder on `pin_a`/`pin_b`; the count lands on `pin_a`
    pub fn get_rotation(&self, pin_a: u8, pin_b: u8, weight: i8) -> Result<bool> {
        self.send(&Command::GetRotation {
            pin_a,
            pin_b,
            weight,
        })
    }

    /// Signed net edge count of `pin`
    pub fn value(&self, pin: u8) -> i64 {
        self.inner.pins.lock().value(pin)
    }

    /// Weighted count of `pin` samples at `level`
    pub fn count(&self, pin: u8, level: Level) -> u64 {
        self.inner.pins.lock().count(pin, level)
    }

    /// Last reported level of `pin`
    pub fn level(&self, pin: u8) -> Option<Level> {
        self.inner.pins.lock().level(pin)
    }

    /// Stop scanning and close the device. Links reporting afterwards are
    /// disposed as their events arrive.
    pub fn dispose(&self) {
        let (link, scanner) = {
            let mut state = self.inner.state.lock();
            if state.quitting {
                return;
            }
            state.quitting = true;
            state.candidates.clear();
            (state.link.clone(), state.scanner.take())
        };
        info!("Disposing device bridge");
        if let Some(scanner) = scanner {
            close_scanner(&scanner, None);
        }
        if let Some(link) = link {
            link.dispose();
        }
    }

    /// Whether `dispose` was called
    pub fn is_disposed(&self) -> bool {
        self.inner.state.lock().quitting
    }
}

impl std::fmt::Debug for DeviceBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("DeviceBridge")
            .field("link", &state.link)
            .field("candidates", &state.candidates.len())
            .field("quitting", &state.quitting)
            .finish()
    }
}

impl BridgeInner {
    fn new_scanner(&self) -> SerialPortScanner {
        SerialPortScanner::start(
            self.provider.clone(),
            self.config.clone(),
            self.link_tx.clone(),
        )
    }

    fn handle(&self, event: LinkEvent) {
        match event {
            LinkEvent::Input { link, data } => self.handle_input(&link, &data),
            LinkEvent::Connection { link, connected } => self.handle_connection(&link, connected),
        }
    }

    fn handle_input(&self, link: &LinkHandle, data: &[u8]) {
        let mut state = self.state.lock();
        if state.quitting {
            link.dispose();
            return;
        }

        match state.link.as_ref().map(|auth| auth == link) {
            Some(true) => {
                drop(state);
                self.apply_codes(data);
                return;
            }
            Some(false) => {
                debug!(port = %link.port_name(), "Device already connected, closing candidate");
                link.dispose();
                return;
            }
            None => {}
        }

        let max_len = self.config.max_greeting_len;
        let step = state
            .candidates
            .entry(link.id())
            .or_insert_with(|| GreetingMatcher::new(max_len))
            .feed(data);

        match step {
            GreetingStep::Accept => {
                self.commit(&mut state, link);
                drop(state);
                self.emit(BridgeEvent::ConnectionChanged(true));
            }
            GreetingStep::Reply => {
                debug!(port = %link.port_name(), "Greeting marker received, replying");
                link.write(Bytes::from_static(&[ROLE_REPLY]));
            }
            GreetingStep::Pending => {}
            GreetingStep::Reject => {
                debug!(port = %link.port_name(), "Unexpected greeting, closing candidate");
                state.candidates.remove(&link.id());
                link.dispose();
            }
        }
    }

    fn commit(&self, state: &mut BridgeState, link: &LinkHandle) {
        state.link = Some(link.clone());
        state.candidates.clear();
        if let Some(scanner) = state.scanner.take() {
            close_scanner(&scanner, Some(link));
        }
        *self.pins.lock() = PinBank::new();
        info!(link = %link.id(), port = %link.port_name(), "Device connected");
    }

    fn handle_connection(&self, link: &LinkHandle, connected: bool) {
        let mut state = self.state.lock();
        if connected {
            let foreign = state.link.as_ref().is_some_and(|auth| auth != link);
            if state.quitting || foreign {
                link.dispose();
            }
            return;
        }

        state.candidates.remove(&link.id());
        if state.link.as_ref() != Some(link) {
            trace!(port = %link.port_name(), "Candidate closed");
            return;
        }

        state.link = None;
        info!(port = %link.port_name(), "Device disconnected");
        if !state.quitting {
            state.scanner = Some(self.new_scanner());
        }
        drop(state);
        self.emit(BridgeEvent::ConnectionChanged(false));
    }

    fn apply_codes(&self, data: &[u8]) {
        let changes: Vec<_> = {
            let mut pins = self.pins.lock();
            data.iter().filter_map(|&code| pins.apply(code)).collect()
        };
        for (pin, level) in changes {
            trace!(pin, level = %level, "Pin changed");
            self.emit(BridgeEvent::PinChanged { pin, level });
        }
    }

    fn emit(&self, event: BridgeEvent) {
        // No subscribers is fine.
        let _ = self.event_tx.send(event);
    }
}

impl Drop for BridgeInner {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if let Some(scanner) = state.scanner.take() {
            close_scanner(&scanner, None);
        }
        if let Some(link) = state.link.take() {
            link.dispose();
        }
    }
}

/// Stop `scanner` and dispose every link it started except `keep`
fn close_scanner(scanner: &SerialPortScanner, keep: Option<&LinkHandle>) {
    scanner.dispose();
    for other in scanner.links() {
        if Some(&other) != keep {
            other.dispose();
        }
    }
}

async fn dispatch(inner: Weak<BridgeInner>, mut events: mpsc::UnboundedReceiver<LinkEvent>) {
    while let Some(event) = events.recv().await {
        match inner.upgrade() {
            Some(inner) => inner.handle(event),
            None => event.link().dispose(),
        }
    }
    debug!("Device bridge dispatcher stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::encode_state;
    use crate::handshake::GREETING_MARKER;
    use crate::test_utils::MockPorts;
    use tokio::sync::broadcast::error::TryRecvError;

    fn bridge() -> DeviceBridge {
        DeviceBridge::start(SerialConfig::default(), Arc::new(MockPorts::new()))
    }

    fn input(bridge: &DeviceBridge, link: &LinkHandle, data: &[u8]) {
        bridge.inner.handle(LinkEvent::Input {
            link: link.clone(),
            data: Bytes::copy_from_slice(data),
        });
    }

    fn closed(bridge: &DeviceBridge, link: &LinkHandle) {
        bridge.inner.handle(LinkEvent::Connection {
            link: link.clone(),
            connected: false,
        });
    }

    fn connect(bridge: &DeviceBridge, link: &LinkHandle) {
        input(bridge, link, GREETING_MARKER);
        input(bridge, link, &GreetingMatcher::greeting());
    }

    #[tokio::test]
    async fn test_handshake_replies_then_commits() {
        let bridge = bridge();
        let mut events = bridge.subscribe();
        let (link, mut written) = LinkHandle::detached("ttyACM0");

        input(&bridge, &link, GREETING_MARKER);
        assert_eq!(&written.try_recv().unwrap()[..], b"r");
        assert!(!bridge.is_connected());

        input(&bridge, &link, &GreetingMatcher::greeting());
        assert!(bridge.is_connected());
        assert_eq!(bridge.port_name().as_deref(), Some("ttyACM0"));
        assert_eq!(events.try_recv().unwrap(), BridgeEvent::ConnectionChanged(true));
        assert!(!link.is_disposed());
    }

    #[tokio::test]
    async fn test_first_committer_wins() {
        let bridge = bridge();
        let (first, _w1) = LinkHandle::detached("ttyACM0");
        let (second, _w2) = LinkHandle::detached("ttyACM1");

        input(&bridge, &first, GREETING_MARKER);
        input(&bridge, &second, GREETING_MARKER);
        input(&bridge, &first, &GreetingMatcher::greeting());
        input(&bridge, &second, &GreetingMatcher::greeting());

        assert_eq!(bridge.port_name().as_deref(), Some("ttyACM0"));
        assert!(second.is_disposed());
        assert!(!first.is_disposed());
    }

    #[tokio::test]
    async fn test_garbage_rejects_candidate() {
        let bridge = bridge();
        let (link, _w) = LinkHandle::detached("ttyS4");
        input(&bridge, &link, b"AT\r\n");
        assert!(link.is_disposed());
        assert!(!bridge.is_connected());
    }

    #[tokio::test]
    async fn test_pin_codes_after_commit() {
        let bridge = bridge();
        let mut events = bridge.subscribe();
        let (link, mut written) = LinkHandle::detached("ttyACM0");
        connect(&bridge, &link);
        let _ = written.try_recv();
        assert_eq!(events.try_recv().unwrap(), BridgeEvent::ConnectionChanged(true));

        assert!(bridge.get_binary(13, 0, 0, 1).unwrap());
        assert!(written.try_recv().is_ok());

        let low = encode_state(13, Level::Low).unwrap();
        let high = encode_state(13, Level::High).unwrap();
        input(&bridge, &link, &[low, high, low, high, 254]);

        assert_eq!(bridge.count(13, Level::High), 2);
        assert_eq!(bridge.count(13, Level::Low), 1);
        assert_eq!(bridge.value(13), 1);
        assert_eq!(bridge.level(13), Some(Level::High));

        let mut changes = Vec::new();
        while let Ok(event) = events.try_recv() {
            changes.push(event);
        }
        assert_eq!(changes.len(), 3);
        assert_eq!(
            changes[0],
            BridgeEvent::PinChanged {
                pin: 13,
                level: Level::High
            }
        );
    }

    #[tokio::test]
    async fn test_losing_device_reports_and_rescans() {
        let bridge = bridge();
        let mut events = bridge.subscribe();
        let (link, _w) = LinkHandle::detached("ttyACM0");
        connect(&bridge, &link);
        assert!(bridge.inner.state.lock().scanner.is_none());

        closed(&bridge, &link);
        assert!(!bridge.is_connected());
        assert!(bridge.inner.state.lock().scanner.is_some());
        assert_eq!(events.try_recv().unwrap(), BridgeEvent::ConnectionChanged(true));
        assert_eq!(events.try_recv().unwrap(), BridgeEvent::ConnectionChanged(false));
        assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn test_candidate_close_is_silent() {
        let bridge = bridge();
        let mut events = bridge.subscribe();
        let (link, _w) = LinkHandle::detached("ttyACM0");
        input(&bridge, &link, b"proto");
        closed(&bridge, &link);
        assert!(bridge.inner.state.lock().candidates.is_empty());
        assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn test_send_without_device_is_dropped() {
        let bridge = bridge();
        assert!(!bridge.stop_set(13).unwrap());
        assert!(!bridge.write(&b"raw"[..]));
        assert!(bridge.set_binary(127, Level::High).unwrap_err().is_validation());
    }

    #[tokio::test]
    async fn test_rotation_configures_both_pins() {
        let bridge = bridge();
        bridge.get_rotation(4, 5, -1).unwrap();
        let pins = bridge.inner.pins.lock();
        assert_eq!(pins.state(4).unwrap().weight, -1);
        assert_eq!(pins.state(5).unwrap().weight, 0);
    }

    #[tokio::test]
    async fn test_dispose_closes_late_links() {
        let bridge = bridge();
        let (link, _w) = LinkHandle::detached("ttyACM0");
        connect(&bridge, &link);

        bridge.dispose();
        assert!(bridge.is_disposed());
        assert!(link.is_disposed());

        closed(&bridge, &link);
        assert!(bridge.inner.state.lock().scanner.is_none());

        let (late, _w2) = LinkHandle::detached("ttyACM1");
        input(&bridge, &late, GREETING_MARKER);
        assert!(late.is_disposed());
    }
}
