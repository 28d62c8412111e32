//! In-process linked channel pair.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, mpsc};
use std::thread;

use tracing::debug;

use crate::subscribers::{SubscriberList, Subscription};
use crate::{Channel, MessageHandler};

/// Tracing target for channel operations.
const CHANNEL_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::memory");

/// One endpoint of an in-process channel pair.
///
/// Payloads sent on one endpoint are queued and drained by the peer's pump
/// thread, which invokes the peer's subscribers in arrival order. Dropping
/// an endpoint makes sends from the peer silent no-ops, matching the
/// semantics of a closed window.
///
/// # Example
///
/// ```
/// use std::sync::{Arc, Mutex};
/// use fiberscope_channel::{Channel, MemoryChannel};
///
/// let (left, right) = MemoryChannel::pair();
/// let seen = Arc::new(Mutex::new(Vec::new()));
/// let sink = Arc::clone(&seen);
/// let _subscription = right.subscribe(Arc::new(move |payload: &str| {
///     sink.lock().expect("poisoned").push(payload.to_owned());
/// }));
/// left.send("hello");
/// ```
pub struct MemoryChannel {
    outbound: mpsc::Sender<String>,
    subscribers: Arc<SubscriberList>,
    closed: Arc<AtomicBool>,
}

impl MemoryChannel {
    /// Creates a linked pair of endpoints.
    #[must_use]
    pub fn pair() -> (Self, Self) {
        let (to_right, from_left) = mpsc::channel::<String>();
        let (to_left, from_right) = mpsc::channel::<String>();

        let left = Self::spawn_endpoint(to_right, from_right);
        let right = Self::spawn_endpoint(to_left, from_left);
        (left, right)
    }

    fn spawn_endpoint(outbound: mpsc::Sender<String>, inbound: mpsc::Receiver<String>) -> Self {
        let subscribers = Arc::new(SubscriberList::default());
        let closed = Arc::new(AtomicBool::new(false));

        let pump_subscribers = Arc::clone(&subscribers);
        let pump_closed = Arc::clone(&closed);
        thread::spawn(move || {
            while let Ok(payload) = inbound.recv() {
                if pump_closed.load(Ordering::Acquire) {
                    break;
                }
                pump_subscribers.dispatch(&payload);
            }
            debug!(target: CHANNEL_TARGET, "pump finished, peer gone or endpoint closed");
        });

        Self {
            outbound,
            subscribers,
            closed,
        }
    }

    /// Stops delivering inbound payloads to this endpoint.
    ///
    /// Sends from the peer become no-ops once the queued backlog drains.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

impl Channel for MemoryChannel {
    fn send(&self, payload: &str) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        if self.outbound.send(payload.to_owned()).is_err() {
            // Peer endpoint dropped; spec'd as a silent no-op.
            debug!(target: CHANNEL_TARGET, "dropping payload, remote endpoint gone");
        }
    }

    fn subscribe(&self, handler: MessageHandler) -> Subscription {
        let id = self.subscribers.add(handler);
        Subscription::new(id, Arc::downgrade(&self.subscribers))
    }
}

impl Drop for MemoryChannel {
    fn drop(&mut self) {
        self.closed.store(true, Ordering::Release);
    }
}

impl std::fmt::Debug for MemoryChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryChannel")
            .field("closed", &self.closed.load(Ordering::Acquire))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::{Duration, Instant};

    use rstest::rstest;

    use super::*;

    fn wait_until(deadline: Duration, predicate: impl Fn() -> bool) -> bool {
        let start = Instant::now();
        while start.elapsed() < deadline {
            if predicate() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        predicate()
    }

    fn collecting_subscriber(channel: &MemoryChannel) -> (Arc<Mutex<Vec<String>>>, Subscription) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let subscription = channel.subscribe(Arc::new(move |payload: &str| {
            sink.lock().expect("poisoned").push(payload.to_owned());
        }));
        (seen, subscription)
    }

    #[rstest]
    fn delivers_payloads_in_send_order() {
        let (left, right) = MemoryChannel::pair();
        let (seen, _subscription) = collecting_subscriber(&right);

        for index in 0..20 {
            left.send(&format!("message-{index}"));
        }

        assert!(wait_until(Duration::from_secs(1), || {
            seen.lock().expect("poisoned").len() == 20
        }));
        let received = seen.lock().expect("poisoned").clone();
        let expected: Vec<String> = (0..20).map(|index| format!("message-{index}")).collect();
        assert_eq!(received, expected);
    }

    #[rstest]
    fn send_after_peer_drop_is_silent_noop() {
        let (left, right) = MemoryChannel::pair();
        drop(right);

        // Must not panic or error.
        left.send("into the void");
    }

    #[rstest]
    fn dropped_subscription_stops_delivery() {
        let (left, right) = MemoryChannel::pair();
        let (seen, subscription) = collecting_subscriber(&right);

        left.send("first");
        assert!(wait_until(Duration::from_secs(1), || {
            !seen.lock().expect("poisoned").is_empty()
        }));

        subscription.dispose();
        left.send("second");
        thread::sleep(Duration::from_millis(30));

        assert_eq!(seen.lock().expect("poisoned").clone(), vec!["first"]);
    }

    #[rstest]
    fn closed_endpoint_ignores_inbound() {
        let (left, right) = MemoryChannel::pair();
        let (seen, _subscription) = collecting_subscriber(&right);

        right.close();
        left.send("late");
        thread::sleep(Duration::from_millis(30));

        assert!(seen.lock().expect("poisoned").is_empty());
    }

    #[rstest]
    fn both_directions_deliver_independently() {
        let (left, right) = MemoryChannel::pair();
        let (seen_right, _sub_right) = collecting_subscriber(&right);
        let (seen_left, _sub_left) = collecting_subscriber(&left);

        left.send("to-right");
        right.send("to-left");

        assert!(wait_until(Duration::from_secs(1), || {
            !seen_right.lock().expect("poisoned").is_empty()
                && !seen_left.lock().expect("poisoned").is_empty()
        }));
        assert_eq!(seen_right.lock().expect("poisoned").clone(), vec!["to-right"]);
        assert_eq!(seen_left.lock().expect("poisoned").clone(), vec!["to-left"]);
    }
}
