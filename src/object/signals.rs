//! Readiness Signals
//!
//! Every kernel object carries a signal bitmask that the wait subsystem
//! observes. Objects change it only through [`StateTracker::update_state`],
//! which clears then sets bits atomically and notifies observers before
//! returning.
//!
//! # Signal Layout
//! ```text
//! bit  0  READABLE          bit  6  CONTROL_READABLE
//! bit  1  WRITABLE          bit  7  CONTROL_WRITABLE
//! bit  2  PEER_CLOSED       bit  8  ACCEPT
//! bit  4  READ_DISABLED     bit  9  SHARE
//! bit  5  WRITE_DISABLED    bits 24..31  user signals
//! ```

use alloc::sync::Arc;
use alloc::vec::Vec;
use bitflags::bitflags;
use spin::Mutex;

bitflags! {
    /// Readiness bits exposed to the wait subsystem.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Signals: u32 {
        /// Data is queued for reading.
        const READABLE = 1 << 0;
        /// The peer's queue has room.
        const WRITABLE = 1 << 1;
        /// The peer endpoint is gone.
        const PEER_CLOSED = 1 << 2;
        /// Reading is shut down and the queue is drained.
        const READ_DISABLED = 1 << 4;
        /// Writing is shut down (locally or by the peer).
        const WRITE_DISABLED = 1 << 5;
        /// A control message is pending.
        const CONTROL_READABLE = 1 << 6;
        /// The peer's control slot is free.
        const CONTROL_WRITABLE = 1 << 7;
        /// A shared handle is waiting to be accepted.
        const ACCEPT = 1 << 8;
        /// The peer's accept slot is free.
        const SHARE = 1 << 9;

        const USER_0 = 1 << 24;
        const USER_1 = 1 << 25;
        const USER_2 = 1 << 26;
        const USER_3 = 1 << 27;
        const USER_4 = 1 << 28;
        const USER_5 = 1 << 29;
        const USER_6 = 1 << 30;
        const USER_7 = 1 << 31;
        /// Every user-definable signal.
        const USER_ALL = 0xff00_0000;
    }
}

/// Receives signal transitions from a [`StateTracker`].
///
/// Called with the tracker lock held: implementations must not call back
/// into the object they observe.
pub trait StateObserver: Send + Sync {
    /// The signal state is now `signals`.
    fn on_state_change(&self, signals: Signals);
}

/// Token returned by [`StateTracker::add_observer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

struct TrackerInner {
    signals: Signals,
    observers: Vec<(ObserverId, Arc<dyn StateObserver>)>,
    next_observer: u64,
}

/// Owns an object's signal bitmask and its observer list.
///
/// The tracker lock is a leaf: nothing else is acquired while it is held,
/// so an object may update a peer's tracker while holding its own lock.
pub struct StateTracker {
    inner: Mutex<TrackerInner>,
}

impl StateTracker {
    pub fn new(signals: Signals) -> Self {
        Self {
            inner: Mutex::new(TrackerInner {
                signals,
                observers: Vec::new(),
                next_observer: 0,
            }),
        }
    }

    /// Current signal state.
    #[inline]
    pub fn signals(&self) -> Signals {
        self.inner.lock().signals
    }

    /// Clear `clear_mask`, then set `set_mask`.
    ///
    /// Observers see the new state before this returns. If the state is
    /// unchanged nobody is notified.
    pub fn update_state(&self, clear_mask: Signals, set_mask: Signals) {
        let mut inner = self.inner.lock();
        let previous = inner.signals;
        inner.signals = previous.difference(clear_mask).union(set_mask);
        if inner.signals == previous {
            return;
        }
        let signals = inner.signals;
        for (_, observer) in inner.observers.iter() {
            observer.on_state_change(signals);
        }
    }

    /// Register an observer. It is immediately told the current state.
    pub fn add_observer(&self, observer: Arc<dyn StateObserver>) -> ObserverId {
        let mut inner = self.inner.lock();
        let id = ObserverId(inner.next_observer);
        inner.next_observer += 1;
        observer.on_state_change(inner.signals);
        inner.observers.push((id, observer));
        id
    }

    /// Unregister an observer. Returns it if it was registered.
    pub fn remove_observer(&self, id: ObserverId) -> Option<Arc<dyn StateObserver>> {
        let mut inner = self.inner.lock();
        let index = inner.observers.iter().position(|(oid, _)| *oid == id)?;
        Some(inner.observers.remove(index).1)
    }
}

impl core::fmt::Debug for StateTracker {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("StateTracker")
            .field("signals", &inner.signals)
            .field("observers", &inner.observers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    struct Recorder(StdMutex<Vec<Signals>>);

    impl StateObserver for Recorder {
        fn on_state_change(&self, signals: Signals) {
            self.0.lock().unwrap().push(signals);
        }
    }

    #[test]
    fn test_clear_then_set() {
        let tracker = StateTracker::new(Signals::WRITABLE | Signals::READABLE);
        tracker.update_state(Signals::WRITABLE, Signals::PEER_CLOSED);
        assert_eq!(tracker.signals(), Signals::READABLE | Signals::PEER_CLOSED);

        // A bit both cleared and set ends up set.
        tracker.update_state(Signals::READABLE, Signals::READABLE);
        assert!(tracker.signals().contains(Signals::READABLE));
    }

    #[test]
    fn test_observer_sees_transitions_only() {
        let tracker = StateTracker::new(Signals::WRITABLE);
        let recorder = Arc::new(Recorder(StdMutex::new(Vec::new())));
        let id = tracker.add_observer(recorder.clone());

        tracker.update_state(Signals::empty(), Signals::WRITABLE);
        tracker.update_state(Signals::empty(), Signals::READABLE);
        tracker.update_state(Signals::READ_DISABLED, Signals::empty());

        let seen = recorder.0.lock().unwrap().clone();
        assert_eq!(seen, vec![Signals::WRITABLE, Signals::WRITABLE | Signals::READABLE]);

        assert!(tracker.remove_observer(id).is_some());
        assert!(tracker.remove_observer(id).is_none());
        tracker.update_state(Signals::READABLE, Signals::empty());
        assert_eq!(recorder.0.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_user_signal_range() {
        assert_eq!(Signals::USER_ALL.bits(), 0xff00_0000);
        assert!(Signals::USER_ALL.contains(Signals::USER_0 | Signals::USER_7));
        assert!(!Signals::USER_ALL.intersects(Signals::SHARE | Signals::READABLE));
    }
}
