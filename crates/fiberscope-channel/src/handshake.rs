//! Ready/ack handshake preceding RPC traffic.
//!
//! The host page and the devtools iframe may initialise in either order, so
//! the passive side announces readiness by re-broadcasting a sentinel until
//! the active side acknowledges it. Sentinels are plain reserved payloads;
//! RPC endpoints skip them via [`is_sentinel`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use tracing::debug;

use crate::subscribers::Subscription;
use crate::Channel;

/// Tracing target for handshake operations.
const HANDSHAKE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::handshake");

/// Sentinel broadcast by the passive side until acknowledged.
pub const READY_SENTINEL: &str = "__fiberscope_ready__";

/// Sentinel the active side answers with, exactly once per ready burst.
pub const ACK_SENTINEL: &str = "__fiberscope_ack__";

/// Returns whether a payload is a reserved handshake sentinel.
#[must_use]
pub fn is_sentinel(payload: &str) -> bool {
    payload == READY_SENTINEL || payload == ACK_SENTINEL
}

/// Announce loop run by the passive side.
///
/// Broadcasts [`READY_SENTINEL`] on the given interval until the active
/// side's [`ACK_SENTINEL`] arrives, the driver is stopped, or the driver is
/// dropped. Tolerates the active side not existing yet.
pub struct HandshakeDriver {
    acked: Arc<AtomicBool>,
    stopped: Arc<AtomicBool>,
    _subscription: Subscription,
}

impl HandshakeDriver {
    /// Starts announcing readiness over the channel.
    #[must_use]
    pub fn announce(channel: Arc<dyn Channel>, interval: Duration) -> Self {
        let acked = Arc::new(AtomicBool::new(false));
        let stopped = Arc::new(AtomicBool::new(false));

        let ack_flag = Arc::clone(&acked);
        let subscription = channel.subscribe(Arc::new(move |payload: &str| {
            if payload == ACK_SENTINEL {
                ack_flag.store(true, Ordering::Release);
            }
        }));

        let loop_acked = Arc::clone(&acked);
        let loop_stopped = Arc::clone(&stopped);
        thread::spawn(move || {
            while !loop_acked.load(Ordering::Acquire) && !loop_stopped.load(Ordering::Acquire) {
                channel.send(READY_SENTINEL);
                thread::sleep(interval);
            }
            debug!(target: HANDSHAKE_TARGET, "announce loop finished");
        });

        Self {
            acked,
            stopped,
            _subscription: subscription,
        }
    }

    /// Returns whether the active side has acknowledged.
    #[must_use]
    pub fn is_acknowledged(&self) -> bool {
        self.acked.load(Ordering::Acquire)
    }

    /// Stops the announce loop without waiting for an acknowledgement.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
    }
}

impl Drop for HandshakeDriver {
    fn drop(&mut self) {
        self.stopped.store(true, Ordering::Release);
    }
}

impl std::fmt::Debug for HandshakeDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandshakeDriver")
            .field("acked", &self.is_acknowledged())
            .finish()
    }
}

/// Installs the active side of the handshake.
///
/// On the first [`READY_SENTINEL`] the channel answers with
/// [`ACK_SENTINEL`] and invokes `on_ready` exactly once. The returned
/// subscription keeps the listener installed; repeated ready broadcasts are
/// re-acknowledged (the passive side may not have seen the first ack) but
/// `on_ready` never fires twice.
pub fn acknowledge(
    channel: &Arc<dyn Channel>,
    on_ready: impl FnOnce() + Send + 'static,
) -> Subscription {
    let ready_fired = AtomicBool::new(false);
    let callback = std::sync::Mutex::new(Some(on_ready));
    let sender = Arc::clone(channel);
    channel.subscribe(Arc::new(move |payload: &str| {
        if payload != READY_SENTINEL {
            return;
        }
        sender.send(ACK_SENTINEL);
        if !ready_fired.swap(true, Ordering::AcqRel)
            && let Ok(mut slot) = callback.lock()
            && let Some(on_ready_fn) = slot.take()
        {
            on_ready_fn();
        }
    }))
}
