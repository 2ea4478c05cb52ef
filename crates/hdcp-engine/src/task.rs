//! Worker thread driving a [`Dispatcher`].
//!
//! The worker owns the dispatcher and is woken by a periodic tick and by an
//! event channel. Interrupt and hot-plug notifications never touch the
//! session directly; they only enqueue events (and, for hot-plug, store the
//! new state in the shared [`HotplugSignal`]).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, select, tick, Receiver, Sender, TrySendError};
use hdcp_core::{Error, HotplugState, InterruptKind, LinkStatus, Result};
use hdcp_ddc::DdcBus;
use hdcp_keystore::KeyStore;
use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::dispatcher::{Dispatcher, HotplugSignal};
use crate::events::Event;
use crate::hardware::{HdcpHardware, LinkControl};

/// Capacity of the event queue.
const EVENT_CAPACITY: usize = 64;

/// Handle to control a running HDCP worker.
pub struct HdcpHandle {
    events: Sender<Event>,
    hotplug: HotplugSignal,
    status: watch::Receiver<LinkStatus>,
    /// Flag to signal the worker to stop.
    stop_flag: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<()>>,
}

impl HdcpHandle {
    /// Move `dispatcher` onto a dedicated worker thread.
    pub fn spawn<B, K, H, L>(dispatcher: Dispatcher<B, K, H, L>) -> Result<Self>
    where
        B: DdcBus + 'static,
        K: KeyStore + 'static,
        H: HdcpHardware + 'static,
        L: LinkControl + 'static,
    {
        let (tx, rx) = bounded::<Event>(EVENT_CAPACITY);
        let stop_flag = Arc::new(AtomicBool::new(false));
        let stop_flag_clone = stop_flag.clone();
        let hotplug = dispatcher.hotplug_signal();
        let status = dispatcher.subscribe();
        let period = Duration::from_millis(dispatcher.config().tick_interval_ms as u64);

        let handle = thread::Builder::new()
            .name("hdcp-worker".to_string())
            .spawn(move || {
                worker_loop(dispatcher, rx, period, stop_flag_clone);
                info!("HDCP worker stopped");
            })
            .map_err(|e| Error::Worker(format!("Failed to spawn HDCP worker: {}", e)))?;

        Ok(Self {
            events: tx,
            hotplug,
            status,
            stop_flag,
            thread_handle: Some(handle),
        })
    }

    /// Enable HDCP on the link.
    pub fn start(&self) -> bool {
        self.send(Event::Start)
    }

    /// Disable HDCP on the link.
    pub fn stop(&self) -> bool {
        self.send(Event::Stop)
    }

    /// Report a hot-plug change. Takes effect at the worker's next dispatch
    /// even if the event queue is full.
    pub fn notify_hotplug(&self, state: HotplugState) -> bool {
        self.hotplug.set(state);
        self.send(Event::Hotplug(state))
    }

    /// Forward a hardware interrupt. Returns false once the worker is gone.
    pub fn notify_interrupt(&self, kind: InterruptKind) -> bool {
        self.send(Event::Interrupt(kind))
    }

    pub fn link_status(&self) -> LinkStatus {
        *self.status.borrow()
    }

    /// Receiver that observes every link-status change.
    pub fn subscribe(&self) -> watch::Receiver<LinkStatus> {
        self.status.clone()
    }

    /// Wait until the link reaches `target`.
    pub async fn wait_for_status(&self, target: LinkStatus, timeout: Duration) -> Result<()> {
        let mut rx = self.status.clone();
        let wait = async move {
            loop {
                if *rx.borrow_and_update() == target {
                    return Ok(());
                }
                if rx.changed().await.is_err() {
                    return Err(Error::Worker("HDCP worker exited".to_string()));
                }
            }
        };
        tokio::time::timeout(timeout, wait)
            .await
            .map_err(|_| Error::Timeout)?
    }

    /// Check if the worker is still running.
    pub fn is_running(&self) -> bool {
        !self.stop_flag.load(Ordering::Relaxed)
    }

    /// Stop the worker and wait for it to finish.
    pub fn shutdown(&mut self) {
        self.stop_flag.store(true, Ordering::Relaxed);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }

    fn send(&self, event: Event) -> bool {
        match self.events.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                debug!("HDCP event queue full, dropping {:?}", event);
                true
            }
            Err(TrySendError::Disconnected(_)) => {
                debug!("HDCP worker gone");
                false
            }
        }
    }
}

impl Drop for HdcpHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop<B, K, H, L>(
    mut dispatcher: Dispatcher<B, K, H, L>,
    events: Receiver<Event>,
    period: Duration,
    stop_flag: Arc<AtomicBool>,
) where
    B: DdcBus,
    K: KeyStore,
    H: HdcpHardware,
    L: LinkControl,
{
    let ticker = tick(period);
    while !stop_flag.load(Ordering::Relaxed) {
        select! {
            recv(ticker) -> _ => dispatcher.dispatch(Event::Tick),
            recv(events) -> msg => match msg {
                Ok(event) => dispatcher.dispatch(event),
                Err(_) => {
                    error!("HDCP event channel closed");
                    break;
                }
            },
        }
    }
    dispatcher.stop();
}
