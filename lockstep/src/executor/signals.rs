//! Producer-owned signals and single-winner guards.
//!
//! A [`Signal`] is a narrow multi-subscriber channel owned by the unit that
//! raises it. Subscribers receive every payload raised after they subscribe
//! and consume them at their own pace. [`FoundLatch`] and [`Stopwatch`]
//! make "first one wins" sequences explicit when several units race to
//! report the same event.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::mpsc;

// =============================================================================
// Signal
// =============================================================================

/// Multi-subscriber signal raised by a producer.
pub struct Signal<T> {
    name: &'static str,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<T>>>,
    raised: AtomicUsize,
}

impl<T: Clone + Send + 'static> Signal<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            subscribers: Mutex::new(Vec::new()),
            raised: AtomicUsize::new(0),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Registers a new listener.
    pub fn subscribe(&self) -> SignalReceiver<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().push(tx);
        SignalReceiver { rx }
    }

    /// Delivers `payload` to every live subscriber and returns how many
    /// received it. Dropped subscribers are pruned.
    pub fn raise(&self, payload: T) -> usize {
        self.raised.fetch_add(1, Ordering::AcqRel);
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| tx.send(payload.clone()).is_ok());
        subscribers.len()
    }

    /// Number of times the signal has been raised.
    pub fn raised_count(&self) -> usize {
        self.raised.load(Ordering::Acquire)
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

/// Receiving side of a [`Signal`] subscription.
pub struct SignalReceiver<T> {
    rx: mpsc::UnboundedReceiver<T>,
}

impl<T> SignalReceiver<T> {
    /// Waits for the next payload. Returns `None` once the signal is dropped.
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Returns a queued payload without waiting.
    pub fn try_recv(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }
}

// =============================================================================
// Guards
// =============================================================================

/// One-shot compare-and-swap guard.
#[derive(Debug, Default)]
pub struct FoundLatch {
    claimed: AtomicBool,
}

impl FoundLatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true for exactly one caller.
    pub fn try_claim(&self) -> bool {
        self.claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn is_claimed(&self) -> bool {
        self.claimed.load(Ordering::Acquire)
    }
}

/// Wall clock that can be stopped once.
#[derive(Debug)]
pub struct Stopwatch {
    started: Instant,
    stopped: OnceLock<Duration>,
}

impl Stopwatch {
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
            stopped: OnceLock::new(),
        }
    }

    /// Freezes the clock. Later calls return the first reading.
    pub fn stop(&self) -> Duration {
        *self.stopped.get_or_init(|| self.started.elapsed())
    }

    /// Frozen reading, if stopped.
    pub fn stopped_at(&self) -> Option<Duration> {
        self.stopped.get().copied()
    }

    pub fn elapsed(&self) -> Duration {
        self.stopped_at().unwrap_or_else(|| self.started.elapsed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_signal_fans_out_to_subscribers() {
        let signal = Signal::new("found");
        let mut a = signal.subscribe();
        let mut b = signal.subscribe();

        assert_eq!(signal.raise(7u32), 2);
        assert_eq!(a.recv().await, Some(7));
        assert_eq!(b.recv().await, Some(7));
        assert_eq!(signal.raised_count(), 1);
    }

    #[test]
    fn test_signal_prunes_dropped_subscribers() {
        let signal = Signal::new("found");
        let keep = signal.subscribe();
        drop(signal.subscribe());

        assert_eq!(signal.raise(1u8), 1);
        assert_eq!(signal.subscriber_count(), 1);
        drop(keep);
        assert_eq!(signal.raise(2u8), 0);
    }

    #[test]
    fn test_signal_without_subscribers() {
        let signal: Signal<u8> = Signal::new("idle");
        assert_eq!(signal.raise(1), 0);
        assert_eq!(signal.raised_count(), 1);
    }

    #[test]
    fn test_latch_single_winner_across_threads() {
        let latch = Arc::new(FoundLatch::new());
        let barrier = Arc::new(std::sync::Barrier::new(8));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let latch = Arc::clone(&latch);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    latch.try_claim()
                })
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
        assert!(latch.is_claimed());
    }

    #[test]
    fn test_stopwatch_freezes() {
        let clock = Stopwatch::start();
        assert!(clock.stopped_at().is_none());
        let first = clock.stop();
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(clock.stop(), first);
        assert_eq!(clock.elapsed(), first);
    }
}
