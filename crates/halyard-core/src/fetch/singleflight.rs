use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use tokio::sync::Notify;

/// Coalesces concurrent work on the same key: the first caller leads, later
/// callers wait for the leader's outcome.
pub(crate) struct Singleflight<T> {
    flights: Mutex<HashMap<String, Arc<FlightState<T>>>>,
}

impl<T> Default for Singleflight<T> {
    fn default() -> Self {
        Self {
            flights: Mutex::new(HashMap::new()),
        }
    }
}

impl<T: Clone> Singleflight<T> {
    /// A flight stays joinable until its leader guard is dropped, so a caller
    /// arriving after [`FlightGuard::complete`] but before that drop follows
    /// and gets the stored outcome without redoing the work.
    pub(crate) fn begin(&self, key: &str) -> FlightGuard<'_, T> {
        let mut map = self.flights.lock();
        if let Some(state) = map.get(key) {
            state.add_ref();
            FlightGuard::new_follower(self, key.to_string(), Arc::clone(state))
        } else {
            let state = Arc::new(FlightState::new());
            map.insert(key.to_string(), Arc::clone(&state));
            FlightGuard::new_leader(self, key.to_string(), state)
        }
    }

    #[cfg(test)]
    pub(crate) fn in_flight(&self) -> usize {
        self.flights.lock().len()
    }

    fn release(&self, key: &str, flight: &Arc<FlightState<T>>) {
        let mut map = self.flights.lock();
        if flight.release() == 0 {
            if let Some(existing) = map.get(key) {
                if Arc::ptr_eq(existing, flight) {
                    map.remove(key);
                }
            }
        }
    }
}

struct FlightState<T> {
    notify: Notify,
    refs: AtomicUsize,
    finished: AtomicBool,
    outcome: OnceLock<T>,
}

impl<T: Clone> FlightState<T> {
    fn new() -> Self {
        Self {
            notify: Notify::new(),
            refs: AtomicUsize::new(1),
            finished: AtomicBool::new(false),
            outcome: OnceLock::new(),
        }
    }

    fn add_ref(&self) {
        self.refs.fetch_add(1, Ordering::Relaxed);
    }

    fn release(&self) -> usize {
        self.refs.fetch_sub(1, Ordering::AcqRel) - 1
    }

    async fn wait(&self) -> Option<T> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // register before checking the flag so a finish in between is not lost
            notified.as_mut().enable();
            if self.finished.load(Ordering::Acquire) {
                return self.outcome.get().cloned();
            }
            notified.await;
        }
    }

    fn finish(&self, outcome: Option<T>) {
        if let Some(value) = outcome {
            let _ = self.outcome.set(value);
        }
        self.finished.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }
}

pub(crate) struct FlightGuard<'a, T: Clone> {
    singleflight: &'a Singleflight<T>,
    key: String,
    flight: Arc<FlightState<T>>,
    finish_on_drop: bool,
    is_leader: bool,
}

impl<'a, T: Clone> FlightGuard<'a, T> {
    fn new_leader(singleflight: &'a Singleflight<T>, key: String, flight: Arc<FlightState<T>>) -> Self {
        Self {
            singleflight,
            key,
            flight,
            finish_on_drop: true,
            is_leader: true,
        }
    }

    fn new_follower(
        singleflight: &'a Singleflight<T>,
        key: String,
        flight: Arc<FlightState<T>>,
    ) -> Self {
        Self {
            singleflight,
            key,
            flight,
            finish_on_drop: false,
            is_leader: false,
        }
    }

    pub(crate) fn is_leader(&self) -> bool {
        self.is_leader
    }

    /// Waits for the leader. `None` when the leader went away without an
    /// outcome (cancelled or panicked); the caller should do the work itself.
    pub(crate) async fn wait(&self) -> Option<T> {
        self.flight.wait().await
    }

    /// Publishes the leader's outcome to every follower.
    pub(crate) fn complete(&mut self, outcome: T) {
        if self.is_leader && self.finish_on_drop {
            self.flight.finish(Some(outcome));
            self.finish_on_drop = false;
        }
    }
}

impl<T: Clone> Drop for FlightGuard<'_, T> {
    fn drop(&mut self) {
        if self.finish_on_drop {
            self.flight.finish(None);
            self.finish_on_drop = false;
        }
        self.singleflight.release(&self.key, &self.flight);
    }
}
