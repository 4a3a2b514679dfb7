//! Serial port access
//!
//! Links never talk to the OS directly. A [`PortProvider`] lists port names
//! and opens them as byte streams, so the scanner and workers can run
//! against real hardware (`SystemPorts`, feature `serial`) or against
//! in-memory streams in tests.

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::Result;

/// A bidirectional byte stream to a serial device
pub trait SerialIo: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> SerialIo for T {}

/// Source of serial ports
#[async_trait]
pub trait PortProvider: Send + Sync {
    /// Names of the ports currently present
    async fn available_ports(&self) -> Result<Vec<String>>;

    /// Open `name` at `baud_rate`
    async fn open(&self, name: &str, baud_rate: u32) -> Result<Box<dyn SerialIo>>;
}

#[cfg(feature = "serial")]
pub use system::SystemPorts;

#[cfg(feature = "serial")]
mod system {
    use super::*;
    use crate::error::SerialError;
    use tokio_serial::{SerialPort, SerialPortBuilderExt};
    use tracing::{debug, info};

    /// Ports of the host, opened 8N1 with DTR raised
    #[derive(Debug, Clone, Default)]
    pub struct SystemPorts;

    impl SystemPorts {
        /// Create a provider for the host's ports
        pub fn new() -> Self {
            Self
        }
    }

    #[async_trait]
    impl PortProvider for SystemPorts {
        async fn available_ports(&self) -> Result<Vec<String>> {
            let ports = serialport::available_ports()
                .map_err(|e| SerialError::EnumerationFailed(e.to_string()))?;
            Ok(ports.into_iter().map(|p| p.port_name).collect())
        }

        async fn open(&self, name: &str, baud_rate: u32) -> Result<Box<dyn SerialIo>> {
            let mut stream = tokio_serial::new(name, baud_rate)
                .data_bits(tokio_serial::DataBits::Eight)
                .parity(tokio_serial::Parity::None)
                .stop_bits(tokio_serial::StopBits::One)
                .open_native_async()
                .map_err(|e| SerialError::PortOpenFailed {
                    port: name.to_string(),
                    reason: e.to_string(),
                })?;

            // The firmware waits for DTR before it starts talking.
            stream.write_data_terminal_ready(true)?;
            debug!(port = name, "DTR raised");

            info!(port = name, baud = baud_rate, "Opened serial port");
            Ok(Box::new(stream))
        }
    }
}
