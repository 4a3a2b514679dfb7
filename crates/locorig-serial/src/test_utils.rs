//! Testing utilities for serial links
//!
//! [`MockPorts`] is a [`PortProvider`] whose ports are in-memory duplex
//! streams. Each added port hands back a [`MockDevice`], the far end of the
//! stream, which plays the firmware.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::time::Duration;
use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};

use crate::error::{Result, SerialError};
use crate::handshake::{GreetingMatcher, GREETING_MARKER};
use crate::ports::{PortProvider, SerialIo};

const MOCK_BUFFER: usize = 4096;

struct MockPort {
    name: String,
    stream: Option<DuplexStream>,
    opens: usize,
}

/// In-memory port provider
#[derive(Default)]
pub struct MockPorts {
    ports: Mutex<Vec<MockPort>>,
}

impl MockPorts {
    /// Provider with no ports
    pub fn new() -> Self {
        Self::default()
    }

    /// Plug in a device on `name`. Re-adding a name replaces its stream.
    pub fn add_port(&self, name: &str) -> MockDevice {
        let (host, device) = duplex(MOCK_BUFFER);
        let mut ports = self.ports.lock();
        match ports.iter_mut().find(|p| p.name == name) {
            Some(port) => port.stream = Some(host),
            None => ports.push(MockPort {
                name: name.to_string(),
                stream: Some(host),
                opens: 0,
            }),
        }
        MockDevice {
            name: name.to_string(),
            io: device,
        }
    }

    /// List `name` without anything that can be opened behind it
    pub fn add_busy_port(&self, name: &str) {
        self.ports.lock().push(MockPort {
            name: name.to_string(),
            stream: None,
            opens: 0,
        });
    }

    /// Unplug `name`
    pub fn remove_port(&self, name: &str) {
        self.ports.lock().retain(|p| p.name != name);
    }

    /// How many times `name` was opened, successfully or not
    pub fn open_count(&self, name: &str) -> usize {
        self.ports
            .lock()
            .iter()
            .find(|p| p.name == name)
            .map_or(0, |p| p.opens)
    }
}

#[async_trait]
impl PortProvider for MockPorts {
    async fn available_ports(&self) -> Result<Vec<String>> {
        Ok(self.ports.lock().iter().map(|p| p.name.clone()).collect())
    }

    async fn open(&self, name: &str, _baud_rate: u32) -> Result<Box<dyn SerialIo>> {
        let mut ports = self.ports.lock();
        let port = ports
            .iter_mut()
            .find(|p| p.name == name)
            .ok_or_else(|| SerialError::PortNotFound(name.to_string()))?;
        port.opens += 1;
        match port.stream.take() {
            Some(stream) => Ok(Box::new(stream)),
            None => Err(SerialError::PortOpenFailed {
                port: name.to_string(),
                reason: "port busy".to_string(),
            }),
        }
    }
}

/// Firmware side of a mock port
pub struct MockDevice {
    name: String,
    io: DuplexStream,
}

impl MockDevice {
    /// Port name this device is plugged into
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Send raw bytes to the host
    pub async fn send(&mut self, data: &[u8]) -> std::io::Result<()> {
        self.io.write_all(data).await
    }

    /// Send the ready marker
    pub async fn send_marker(&mut self) -> std::io::Result<()> {
        self.send(GREETING_MARKER).await
    }

    /// Send the confirming greeting
    pub async fn send_greeting(&mut self) -> std::io::Result<()> {
        self.send(&GreetingMatcher::greeting()).await
    }

    /// Read exactly `n` bytes from the host; `None` on timeout or hangup
    pub async fn recv_exact(&mut self, n: usize, timeout: Duration) -> Option<Vec<u8>> {
        let mut buf = vec![0u8; n];
        match tokio::time::timeout(timeout, self.io.read_exact(&mut buf)).await {
            Ok(Ok(_)) => Some(buf),
            _ => None,
        }
    }

    /// Wait until the host closes the port, discarding anything it writes
    pub async fn wait_closed(&mut self, timeout: Duration) -> bool {
        let drain = async {
            let mut buf = [0u8; 64];
            loop {
                match self.io.read(&mut buf).await {
                    Ok(0) | Err(_) => return,
                    Ok(_) => {}
                }
            }
        };
        tokio::time::timeout(timeout, drain).await.is_ok()
    }
}

impl std::fmt::Debug for MockDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockDevice").field("name", &self.name).finish()
    }
}
