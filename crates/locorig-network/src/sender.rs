//! Outbound UDP channel to a single destination
//!
//! Each [`UnicastSender`] owns one connected socket and one background
//! task. Callers enqueue and return immediately; the task drains the queue
//! in FIFO order. A failed or timed-out send is logged and the datagram is
//! dropped, matching UDP's best-effort delivery. Stopping does not flush:
//! datagrams still queued at that point are lost.

use bytes::Bytes;
use std::net::{SocketAddr, UdpSocket as StdUdpSocket};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tracing::{debug, trace};

use crate::error::{NetworkError, Result};

/// Queue-backed sender to one fixed destination
#[derive(Debug)]
pub struct UnicastSender {
    destination: SocketAddr,
    outgoing: mpsc::UnboundedSender<Bytes>,
    shutdown: watch::Sender<bool>,
}

impl UnicastSender {
    /// Open a sender and spawn its send loop on `runtime`.
    ///
    /// Only local socket setup happens here; nothing is transmitted.
    pub fn new(destination: SocketAddr, send_timeout: Duration, runtime: &Handle) -> Result<Self> {
        let socket = Self::open_socket(destination).map_err(|e| NetworkError::SenderFailed {
            destination: destination.to_string(),
            reason: e.to_string(),
        })?;

        let socket = {
            let _guard = runtime.enter();
            UdpSocket::from_std(socket)?
        };

        let (outgoing, queue) = mpsc::unbounded_channel();
        let (shutdown, stop) = watch::channel(false);
        runtime.spawn(send_loop(socket, destination, send_timeout, queue, stop));

        debug!(%destination, "Opened UDP sender");
        Ok(Self {
            destination,
            outgoing,
            shutdown,
        })
    }

    fn open_socket(destination: SocketAddr) -> std::io::Result<StdUdpSocket> {
        let bind: SocketAddr = if destination.is_ipv4() {
            SocketAddr::from(([0, 0, 0, 0], 0))
        } else {
            SocketAddr::from(([0u16; 8], 0))
        };
        let socket = StdUdpSocket::bind(bind)?;
        socket.set_nonblocking(true)?;
        socket.connect(destination)?;
        Ok(socket)
    }

    /// Destination of this sender
    pub fn destination(&self) -> SocketAddr {
        self.destination
    }

    /// Queue a datagram. Returns `false` once the sender has stopped.
    pub fn send(&self, payload: impl Into<Bytes>) -> bool {
        self.outgoing.send(payload.into()).is_ok()
    }

    /// Ask the send loop to exit
    pub fn stop(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Whether the send loop is still accepting datagrams
    pub fn is_running(&self) -> bool {
        !self.outgoing.is_closed() && !*self.shutdown.borrow()
    }
}

impl Drop for UnicastSender {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn send_loop(
    socket: UdpSocket,
    destination: SocketAddr,
    send_timeout: Duration,
    mut queue: mpsc::UnboundedReceiver<Bytes>,
    mut stop: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            biased;

            _ = stop.changed() => break,

            next = queue.recv() => {
                let Some(payload) = next else { break };
                match tokio::time::timeout(send_timeout, socket.send(&payload)).await {
                    Ok(Ok(n)) => trace!(%destination, bytes = n, "Sent datagram"),
                    Ok(Err(e)) => debug!(%destination, error = %e, "Datagram send failed"),
                    Err(_) => debug!(%destination, "Datagram send timed out"),
                }
            }
        }
    }
    queue.close();
    debug!(%destination, "UDP sender stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sends_in_order() {
        let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let destination = receiver.local_addr().unwrap();

        let sender =
            UnicastSender::new(destination, Duration::from_millis(500), &Handle::current())
                .unwrap();
        assert_eq!(sender.destination(), destination);
        for i in 0..5 {
            assert!(sender.send(format!("message {i}")));
        }

        let mut buf = [0u8; 64];
        for i in 0..5 {
            let (n, _) = tokio::time::timeout(Duration::from_secs(2), receiver.recv_from(&mut buf))
                .await
                .unwrap()
                .unwrap();
            assert_eq!(&buf[..n], format!("message {i}").as_bytes());
        }
    }

    #[tokio::test]
    async fn test_stop_rejects_further_sends() {
        let destination: SocketAddr = "127.0.0.1:9".parse().unwrap();
        let sender =
            UnicastSender::new(destination, Duration::from_millis(500), &Handle::current())
                .unwrap();
        assert!(sender.is_running());
        sender.stop();

        // The loop closes its queue once it observes the stop signal.
        for _ in 0..50 {
            if !sender.send("late") {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!sender.send("late"));
        assert!(!sender.is_running());
    }
}
