//! Periodic serial port enumeration
//!
//! Every tick the scanner lists the ports, skips excluded names and starts
//! one [`SerialLinkWorker`] per port name it has not seen before. Known
//! names are left alone, whether their link is still running or not.
//! Workers report straight into the event channel the scanner was given.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

use crate::config::SerialConfig;
use crate::link::{LinkEvent, LinkHandle, SerialLinkWorker};
use crate::ports::PortProvider;

/// Spawns a link per newly seen serial port
pub struct SerialPortScanner {
    links: Arc<Mutex<HashMap<String, LinkHandle>>>,
    shutdown: watch::Sender<bool>,
}

impl SerialPortScanner {
    /// Start ticking. Must be called from within a tokio runtime.
    pub fn start(
        provider: Arc<dyn PortProvider>,
        config: SerialConfig,
        events: mpsc::UnboundedSender<LinkEvent>,
    ) -> Self {
        let links = Arc::new(Mutex::new(HashMap::new()));
        let (shutdown, stop) = watch::channel(false);
        tokio::spawn(scan_loop(provider, config, events, links.clone(), stop));
        Self { links, shutdown }
    }

    /// Links started so far, in no particular order
    pub fn links(&self) -> Vec<LinkHandle> {
        self.links.lock().values().cloned().collect()
    }

    /// Stop ticking. Links already started keep running.
    pub fn dispose(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Whether the scanner still ticks
    pub fn is_running(&self) -> bool {
        !*self.shutdown.borrow()
    }
}

impl Drop for SerialPortScanner {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for SerialPortScanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialPortScanner")
            .field("links", &self.links.lock().len())
            .field("running", &self.is_running())
            .finish()
    }
}

async fn scan_loop(
    provider: Arc<dyn PortProvider>,
    config: SerialConfig,
    events: mpsc::UnboundedSender<LinkEvent>,
    links: Arc<Mutex<HashMap<String, LinkHandle>>>,
    mut stop: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(config.scan_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            biased;

            _ = stop.changed() => break,

            _ = ticker.tick() => {
                let names = match provider.available_ports().await {
                    Ok(names) => names,
                    Err(e) => {
                        debug!(error = %e, "Port enumeration failed");
                        continue;
                    }
                };
                if *stop.borrow() {
                    break;
                }
                let mut links = links.lock();
                for name in names {
                    if config.is_excluded(&name) || links.contains_key(&name) {
                        continue;
                    }
                    info!(port = %name, "Found serial port");
                    let link = SerialLinkWorker::spawn(
                        name.clone(),
                        provider.clone(),
                        &config,
                        events.clone(),
                    );
                    links.insert(name, link);
                }
            }
        }
    }
    debug!("Port scanner stopped");
}
