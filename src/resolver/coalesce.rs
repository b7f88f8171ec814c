//! Per-key request coalescing.
//!
//! The first caller for a key becomes the leader and does the work; callers
//! arriving while it runs become followers and block until the leader
//! publishes. A leader that unwinds without publishing marks the flight
//! abandoned so followers never wait forever.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

enum FlightState<T> {
    Pending,
    Done(T),
    Abandoned,
}

pub(crate) struct Flight<T> {
    state: Mutex<FlightState<T>>,
    cv: Condvar,
}

impl<T: Clone> Flight<T> {
    fn new() -> Self {
        Self {
            state: Mutex::new(FlightState::Pending),
            cv: Condvar::new(),
        }
    }

    fn set(&self, state: FlightState<T>) {
        *self.state.lock() = state;
        self.cv.notify_all();
    }

    /// The leader's result, or `None` if it gave up.
    pub(crate) fn wait(&self) -> Option<T> {
        let mut state = self.state.lock();
        loop {
            match &*state {
                FlightState::Done(value) => return Some(value.clone()),
                FlightState::Abandoned => return None,
                FlightState::Pending => {}
            }
            self.cv.wait(&mut state);
        }
    }
}

pub(crate) enum Join<'a, T: Clone> {
    Leader(LeaderGuard<'a, T>),
    Follower(Arc<Flight<T>>),
}

/// Map of keys with work in progress.
pub(crate) struct InFlight<T> {
    flights: Mutex<HashMap<String, Arc<Flight<T>>>>,
}

impl<T: Clone> InFlight<T> {
    pub(crate) fn new() -> Self {
        Self {
            flights: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn join(&self, key: &str) -> Join<'_, T> {
        let mut flights = self.flights.lock();
        if let Some(existing) = flights.get(key) {
            return Join::Follower(Arc::clone(existing));
        }

        let flight = Arc::new(Flight::new());
        flights.insert(key.to_string(), Arc::clone(&flight));
        Join::Leader(LeaderGuard {
            owner: self,
            key: key.to_string(),
            flight,
            finished: false,
        })
    }

    pub(crate) fn len(&self) -> usize {
        self.flights.lock().len()
    }

    fn retire(&self, key: &str, flight: &Arc<Flight<T>>) {
        let mut flights = self.flights.lock();
        if flights.get(key).is_some_and(|f| Arc::ptr_eq(f, flight)) {
            flights.remove(key);
        }
    }
}

/// Held by the leader until it publishes.
pub(crate) struct LeaderGuard<'a, T: Clone> {
    owner: &'a InFlight<T>,
    key: String,
    flight: Arc<Flight<T>>,
    finished: bool,
}

impl<T: Clone> LeaderGuard<'_, T> {
    /// Publish `value` to every follower and retire the flight.
    pub(crate) fn finish(mut self, value: T) {
        self.flight.set(FlightState::Done(value));
        self.owner.retire(&self.key, &self.flight);
        self.finished = true;
    }
}

impl<T: Clone> Drop for LeaderGuard<'_, T> {
    fn drop(&mut self) {
        if !self.finished {
            self.flight.set(FlightState::Abandoned);
            self.owner.retire(&self.key, &self.flight);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_single_leader_many_followers() {
        let inflight = Arc::new(InFlight::<u32>::new());
        let leaders = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let inflight = Arc::clone(&inflight);
                let leaders = Arc::clone(&leaders);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    match inflight.join("k") {
                        Join::Leader(guard) => {
                            leaders.fetch_add(1, Ordering::SeqCst);
                            thread::sleep(Duration::from_millis(100));
                            guard.finish(7);
                            Some(7)
                        }
                        Join::Follower(flight) => flight.wait(),
                    }
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        // Late arrivals after retirement lead their own flight.
        assert!(leaders.load(Ordering::SeqCst) >= 1);
        assert!(results.iter().all(|r| *r == Some(7)));
        assert_eq!(inflight.len(), 0);
    }

    #[test]
    fn test_dropped_leader_abandons() {
        let inflight = InFlight::<u32>::new();
        let Join::Leader(guard) = inflight.join("k") else {
            panic!("first join must lead");
        };
        let Join::Follower(flight) = inflight.join("k") else {
            panic!("second join must follow");
        };

        drop(guard);
        assert_eq!(flight.wait(), None);
        assert_eq!(inflight.len(), 0);
    }

    #[test]
    fn test_keys_are_independent() {
        let inflight = InFlight::<u32>::new();
        let a = inflight.join("a");
        let b = inflight.join("b");
        assert!(matches!(a, Join::Leader(_)));
        assert!(matches!(b, Join::Leader(_)));
        assert_eq!(inflight.len(), 2);
    }
}
