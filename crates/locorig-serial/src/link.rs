//! One candidate serial link
//!
//! A [`SerialLinkWorker`] opens a port and runs a task that reads from it,
//! drains the outgoing queue between reads and reports to a shared event
//! channel. Until the first byte arrives a watchdog is armed; a port that
//! stays silent is closed when it fires. Any I/O failure other than a read
//! timeout closes the link. Every link reports `connected = false` exactly
//! once, when it ends.

use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, Notify};
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::config::SerialConfig;
use crate::ports::{PortProvider, SerialIo};

static NEXT_LINK_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique link identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LinkId(u64);

impl LinkId {
    fn next() -> Self {
        Self(NEXT_LINK_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for LinkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "link-{}", self.0)
    }
}

/// Lifecycle of a link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// Port being opened
    Opening,
    /// Open, waiting for the first byte
    Watching,
    /// Data has arrived
    Connected,
    /// Port closed
    Closed,
}

impl std::fmt::Display for LinkState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LinkState::Opening => write!(f, "opening"),
            LinkState::Watching => write!(f, "watching"),
            LinkState::Connected => write!(f, "connected"),
            LinkState::Closed => write!(f, "closed"),
        }
    }
}

/// Something a link reports
#[derive(Debug, Clone)]
pub enum LinkEvent {
    /// The link started receiving (`true`) or ended (`false`)
    Connection {
        /// Reporting link
        link: LinkHandle,
        /// New connection state
        connected: bool,
    },
    /// Bytes read from the port
    Input {
        /// Reporting link
        link: LinkHandle,
        /// Raw bytes in arrival order
        data: Bytes,
    },
}

impl LinkEvent {
    /// The reporting link
    pub fn link(&self) -> &LinkHandle {
        match self {
            LinkEvent::Connection { link, .. } | LinkEvent::Input { link, .. } => link,
        }
    }
}

struct LinkShared {
    id: LinkId,
    port: String,
    outgoing: mpsc::UnboundedSender<Bytes>,
    stop: AtomicBool,
    wake: Notify,
    state: Mutex<LinkState>,
}

/// Cloneable control handle of a link
#[derive(Clone)]
pub struct LinkHandle {
    shared: Arc<LinkShared>,
}

impl LinkHandle {
    fn new(port: String) -> (Self, mpsc::UnboundedReceiver<Bytes>) {
        let (outgoing, queue) = mpsc::unbounded_channel();
        let shared = Arc::new(LinkShared {
            id: LinkId::next(),
            port,
            outgoing,
            stop: AtomicBool::new(false),
            wake: Notify::new(),
            state: Mutex::new(LinkState::Opening),
        });
        (Self { shared }, queue)
    }

    /// A handle with no task behind it; written bytes land in the receiver
    pub fn detached(port: impl Into<String>) -> (Self, mpsc::UnboundedReceiver<Bytes>) {
        Self::new(port.into())
    }

    /// Link identity
    pub fn id(&self) -> LinkId {
        self.shared.id
    }

    /// Name of the port
    pub fn port_name(&self) -> &str {
        &self.shared.port
    }

    /// Current lifecycle state
    pub fn state(&self) -> LinkState {
        *self.shared.state.lock()
    }

    /// Queue bytes for the port. Returns `false` once the link is disposed.
    pub fn write(&self, data: impl Into<Bytes>) -> bool {
        if self.is_disposed() {
            return false;
        }
        self.shared.outgoing.send(data.into()).is_ok()
    }

    /// Ask the link to close; the task reports `connected = false` on exit
    pub fn dispose(&self) {
        if !self.shared.stop.swap(true, Ordering::AcqRel) {
            trace!(link = %self.id(), port = %self.port_name(), "Link disposed");
        }
        self.shared.wake.notify_one();
    }

    /// Whether `dispose` was called
    pub fn is_disposed(&self) -> bool {
        self.shared.stop.load(Ordering::Acquire)
    }

    fn set_state(&self, state: LinkState) {
        *self.shared.state.lock() = state;
    }
}

impl PartialEq for LinkHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for LinkHandle {}

impl std::fmt::Debug for LinkHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkHandle")
            .field("id", &self.id())
            .field("port", &self.port_name())
            .field("state", &self.state())
            .finish()
    }
}

/// Opens and services one candidate port
pub struct SerialLinkWorker;

impl SerialLinkWorker {
    /// Open `port` in the background and report to `events`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(
        port: impl Into<String>,
        provider: Arc<dyn PortProvider>,
        config: &SerialConfig,
        events: mpsc::UnboundedSender<LinkEvent>,
    ) -> LinkHandle {
        let (handle, queue) = LinkHandle::new(port.into());
        let task = LinkTask {
            handle: handle.clone(),
            queue,
            events,
            baud_rate: config.baud_rate,
            watchdog: config.handshake_timeout,
            read_size: config.read_buffer_size.max(1),
        };
        tokio::spawn(task.run(provider));
        handle
    }
}

struct LinkTask {
    handle: LinkHandle,
    queue: mpsc::UnboundedReceiver<Bytes>,
    events: mpsc::UnboundedSender<LinkEvent>,
    baud_rate: u32,
    watchdog: std::time::Duration,
    read_size: usize,
}

impl LinkTask {
    async fn run(mut self, provider: Arc<dyn PortProvider>) {
        let port = self.handle.port_name().to_string();
        let io = match provider.open(&port, self.baud_rate).await {
            Ok(io) => io,
            Err(e) => {
                debug!(port = %port, error = %e, "Could not open port");
                self.finish();
                return;
            }
        };

        if self.handle.is_disposed() {
            self.finish();
            return;
        }
        self.handle.set_state(LinkState::Watching);
        debug!(link = %self.handle.id(), port = %port, "Watching port for data");

        self.service(io).await;
        self.finish();
    }

    async fn service(&mut self, io: Box<dyn SerialIo>) {
        let (mut reader, mut writer) = tokio::io::split(io);
        let mut buf = vec![0u8; self.read_size];
        let deadline = Instant::now() + self.watchdog;
        let mut watching = true;

        loop {
            if self.handle.is_disposed() {
                break;
            }
            tokio::select! {
                biased;

                _ = self.handle.shared.wake.notified() => continue,

                _ = tokio::time::sleep_until(deadline), if watching => {
                    debug!(
                        port = %self.handle.port_name(),
                        timeout_ms = self.watchdog.as_millis() as u64,
                        "No data before watchdog, closing"
                    );
                    break;
                }

                Some(data) = self.queue.recv() => {
                    if let Err(e) = write_out(&mut writer, &data).await {
                        warn!(port = %self.handle.port_name(), error = %e, "Serial write failed");
                        break;
                    }
                    trace!(port = %self.handle.port_name(), bytes = data.len(), "Wrote to port");
                }

                read = reader.read(&mut buf) => match read {
                    Ok(0) => {
                        debug!(port = %self.handle.port_name(), "Port reached end of stream");
                        break;
                    }
                    Ok(n) => {
                        if watching {
                            watching = false;
                            self.handle.set_state(LinkState::Connected);
                            self.report(LinkEvent::Connection {
                                link: self.handle.clone(),
                                connected: true,
                            });
                        }
                        trace!(port = %self.handle.port_name(), bytes = n, "Read from port");
                        self.report(LinkEvent::Input {
                            link: self.handle.clone(),
                            data: Bytes::copy_from_slice(&buf[..n]),
                        });
                    }
                    Err(e) if matches!(
                        e.kind(),
                        std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
                    ) => {}
                    Err(e) => {
                        warn!(port = %self.handle.port_name(), error = %e, "Serial read failed");
                        break;
                    }
                }
            }
        }

        let _ = writer.shutdown().await;
    }

    fn report(&self, event: LinkEvent) {
        if self.events.send(event).is_err() {
            // Nobody listens any more.
            self.handle.dispose();
        }
    }

    fn finish(&mut self) {
        self.handle.dispose();
        self.handle.set_state(LinkState::Closed);
        self.queue.close();
        info!(link = %self.handle.id(), port = %self.handle.port_name(), "Serial link closed");
        let _ = self.events.send(LinkEvent::Connection {
            link: self.handle.clone(),
            connected: false,
        });
    }
}

async fn write_out<W>(writer: &mut W, data: &[u8]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(data).await?;
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Result, SerialError};
    use async_trait::async_trait;
    use std::time::Duration;
    use tokio::io::{duplex, DuplexStream};

    struct OnePort(Mutex<Option<DuplexStream>>);

    #[async_trait]
    impl PortProvider for OnePort {
        async fn available_ports(&self) -> Result<Vec<String>> {
            Ok(vec!["ttyTEST".to_string()])
        }

        async fn open(&self, name: &str, _baud_rate: u32) -> Result<Box<dyn SerialIo>> {
            match self.0.lock().take() {
                Some(io) => Ok(Box::new(io)),
                None => Err(SerialError::PortNotFound(name.to_string())),
            }
        }
    }

    fn config(watchdog: Duration) -> SerialConfig {
        SerialConfig {
            handshake_timeout: watchdog,
            ..SerialConfig::default()
        }
    }

    async fn next(rx: &mut mpsc::UnboundedReceiver<LinkEvent>) -> LinkEvent {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn test_first_read_reports_connected() {
        let (host, mut device) = duplex(256);
        let provider = Arc::new(OnePort(Mutex::new(Some(host))));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let link = SerialLinkWorker::spawn("ttyTEST", provider, &config(Duration::from_secs(5)), tx);

        device.write_all(b"hi").await.unwrap();
        match next(&mut rx).await {
            LinkEvent::Connection { connected, link: l } => {
                assert!(connected);
                assert_eq!(l, link);
            }
            other => panic!("unexpected {other:?}"),
        }
        match next(&mut rx).await {
            LinkEvent::Input { data, .. } => assert_eq!(&data[..], b"hi"),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(link.state(), LinkState::Connected);

        assert!(link.write(&b"r"[..]));
        let mut buf = [0u8; 1];
        device.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"r");

        link.dispose();
        match next(&mut rx).await {
            LinkEvent::Connection { connected, .. } => assert!(!connected),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(link.state(), LinkState::Closed);
        assert!(!link.write(&b"late"[..]));
    }

    #[tokio::test]
    async fn test_silent_port_times_out() {
        let (host, mut device) = duplex(256);
        let provider = Arc::new(OnePort(Mutex::new(Some(host))));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let link =
            SerialLinkWorker::spawn("ttyTEST", provider, &config(Duration::from_millis(50)), tx);

        match next(&mut rx).await {
            LinkEvent::Connection { connected, .. } => assert!(!connected),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(link.state(), LinkState::Closed);

        // The device side sees the port go away.
        let mut buf = [0u8; 1];
        assert_eq!(device.read(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_open_failure_reports_disconnected() {
        let provider = Arc::new(OnePort(Mutex::new(None)));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let link = SerialLinkWorker::spawn("ttyTEST", provider, &SerialConfig::default(), tx);

        match next(&mut rx).await {
            LinkEvent::Connection { connected, .. } => assert!(!connected),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(link.state(), LinkState::Closed);
    }

    #[tokio::test]
    async fn test_device_hangup_closes_link() {
        let (host, mut device) = duplex(256);
        let provider = Arc::new(OnePort(Mutex::new(Some(host))));
        let (tx, mut rx) = mpsc::unbounded_channel();
        SerialLinkWorker::spawn("ttyTEST", provider, &config(Duration::from_secs(5)), tx);

        device.write_all(b"x").await.unwrap();
        assert!(matches!(next(&mut rx).await, LinkEvent::Connection { connected: true, .. }));
        assert!(matches!(next(&mut rx).await, LinkEvent::Input { .. }));

        drop(device);
        assert!(matches!(next(&mut rx).await, LinkEvent::Connection { connected: false, .. }));
    }

    #[test]
    fn test_link_ids_are_unique() {
        let (a, _) = LinkHandle::detached("a");
        let (b, _) = LinkHandle::detached("b");
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
        assert_eq!(a.state(), LinkState::Opening);
        assert!(a.id().to_string().starts_with("link-"));
    }
}
