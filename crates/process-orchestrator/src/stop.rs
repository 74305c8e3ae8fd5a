//! External stop requests

use async_channel::{Receiver, Sender};
use tracing::{debug, info, warn};

/// Cloneable handle used to ask a running orchestrator to stop.
///
/// Requests are level-triggered: once sent, every later wait observes them.
#[derive(Debug, Clone)]
pub struct StopHandle {
    tx: Sender<()>,
}

impl StopHandle {
    /// Ask the orchestrator to shut the group down
    pub fn request_stop(&self) {
        // A full channel already carries a pending request
        if self.tx.try_send(()).is_ok() {
            debug!("Stop requested");
        }
    }
}

/// Forwards SIGINT, SIGTERM and SIGHUP into a [`StopHandle`].
///
/// Signals are read on a dedicated thread. Dropping the forwarder closes the
/// signal iterator, joins the thread and unregisters the handlers.
#[cfg(unix)]
pub(crate) struct SignalForwarder {
    signals: signal_hook::iterator::Handle,
    thread: Option<std::thread::JoinHandle<()>>,
}

#[cfg(unix)]
impl SignalForwarder {
    pub(crate) fn install(stop: StopHandle) -> std::io::Result<Self> {
        use signal_hook::consts::{SIGHUP, SIGINT, SIGTERM};
        use signal_hook::iterator::Signals;

        let mut signals = Signals::new([SIGINT, SIGTERM, SIGHUP])?;
        let handle = signals.handle();
        let thread = std::thread::Builder::new()
            .name("orchestrator-signals".to_string())
            .spawn(move || {
                for signal in signals.forever() {
                    info!("Received signal {}, stopping services", signal);
                    stop.request_stop();
                }
                debug!("Signal forwarding stopped");
            })?;

        Ok(Self {
            signals: handle,
            thread: Some(thread),
        })
    }
}

#[cfg(unix)]
impl Drop for SignalForwarder {
    fn drop(&mut self) {
        self.signals.close();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

#[cfg(unix)]
impl std::fmt::Debug for SignalForwarder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalForwarder")
            .field("closed", &self.signals.is_closed())
            .finish()
    }
}

/// No signal forwarding outside Unix
#[cfg(not(unix))]
#[derive(Debug)]
pub(crate) struct SignalForwarder;

#[cfg(not(unix))]
impl SignalForwarder {
    pub(crate) fn install(_stop: StopHandle) -> std::io::Result<Self> {
        warn!("Signal forwarding is only supported on Unix");
        Ok(Self)
    }
}

/// Receiving side of the stop channel, owned by the orchestrator
#[derive(Debug)]
pub(crate) struct StopSignal {
    rx: Receiver<()>,
    latched: bool,
}

impl StopSignal {
    pub(crate) fn new() -> (StopHandle, Self) {
        let (tx, rx) = async_channel::bounded(1);
        (StopHandle { tx }, Self { rx, latched: false })
    }

    /// Whether a stop has been observed so far
    pub(crate) fn was_requested(&self) -> bool {
        self.latched
    }

    /// Whether a stop has been requested, without waiting
    pub(crate) fn is_requested(&mut self) -> bool {
        if !self.latched && self.rx.try_recv().is_ok() {
            self.latched = true;
        }
        self.latched
    }

    /// Resolve once a stop has been requested
    pub(crate) async fn requested(&mut self) {
        if self.latched {
            return;
        }
        if self.rx.recv().await.is_err() {
            // Every handle is gone, including ours; nothing can stop us now
            warn!("Stop channel closed");
            futures::future::pending::<()>().await;
        }
        self.latched = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_is_latched() {
        let (handle, mut signal) = StopSignal::new();
        assert!(!signal.is_requested());

        handle.request_stop();
        handle.request_stop();
        assert!(signal.is_requested());
        assert!(signal.is_requested());
    }

    #[smol_potat::test]
    async fn test_request_from_another_thread_wakes_waiter() {
        let (handle, mut signal) = StopSignal::new();
        let remote = handle.clone();
        std::thread::spawn(move || remote.request_stop());

        signal.requested().await;
        assert!(signal.is_requested());
        assert!(signal.was_requested());
    }

    #[cfg(unix)]
    #[test]
    fn test_dropping_forwarder_closes_signal_iterator() {
        let (handle, _signal) = StopSignal::new();
        let forwarder = SignalForwarder::install(handle).unwrap();
        let signals = forwarder.signals.clone();
        assert!(!signals.is_closed());

        // Joins the forwarding thread, so this returns only once it is gone
        drop(forwarder);
        assert!(signals.is_closed());
    }
}
