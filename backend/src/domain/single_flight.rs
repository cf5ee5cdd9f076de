//! Request coalescing for identical in-flight work.
//!
//! The first caller for a key starts the work; callers arriving while it is
//! still running await the same shared future. Each caller counts as a
//! holder of the flight, and the map entry is removed when the last holder
//! finishes or is cancelled, so nothing outlives the requests it represents.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard, PoisonError};

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};

struct Flight<V> {
    id: u64,
    shared: Shared<BoxFuture<'static, V>>,
    holders: usize,
}

struct Flights<K, V> {
    next_id: u64,
    active: HashMap<K, Flight<V>>,
}

/// Coalesces concurrent work by key.
pub struct SingleFlight<K, V> {
    flights: Mutex<Flights<K, V>>,
}

impl<K, V> Default for SingleFlight<K, V> {
    fn default() -> Self {
        Self {
            flights: Mutex::new(Flights {
                next_id: 0,
                active: HashMap::new(),
            }),
        }
    }
}

impl<K, V> SingleFlight<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone + Send + Sync + 'static,
{
    /// Create an empty coalescing map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `work` for `key` unless an identical call is already in flight,
    /// in which case wait for that call's result instead.
    ///
    /// `work` is only invoked by the caller that starts a flight. A cancelled
    /// caller leaves the flight running for whoever else still waits on it.
    pub async fn run<F, Fut>(&self, key: K, work: F) -> V
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V> + Send + 'static,
    {
        let (id, shared) = {
            let mut guard = lock(&self.flights);
            let flights = &mut *guard;
            if let Some(flight) = flights.active.get_mut(&key) {
                flight.holders += 1;
                (flight.id, flight.shared.clone())
            } else {
                let id = flights.next_id;
                flights.next_id = flights.next_id.wrapping_add(1);
                let shared = work().boxed().shared();
                flights.active.insert(
                    key.clone(),
                    Flight {
                        id,
                        shared: shared.clone(),
                        holders: 1,
                    },
                );
                (id, shared)
            }
        };
        let _holder = Holder {
            flights: &self.flights,
            key,
            id,
        };
        shared.await
    }

    /// Number of flights currently in progress.
    pub fn in_flight(&self) -> usize {
        lock(&self.flights).active.len()
    }
}

fn lock<K, V>(flights: &Mutex<Flights<K, V>>) -> MutexGuard<'_, Flights<K, V>> {
    flights.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One caller's interest in a flight; the last one out removes the entry.
struct Holder<'a, K, V>
where
    K: Eq + Hash,
{
    flights: &'a Mutex<Flights<K, V>>,
    key: K,
    id: u64,
}

impl<K, V> Drop for Holder<'_, K, V>
where
    K: Eq + Hash,
{
    fn drop(&mut self) {
        let mut flights = lock(self.flights);
        // A newer flight may already occupy the key; only touch our own.
        let Some(flight) = flights.active.get_mut(&self.key) else {
            return;
        };
        if flight.id != self.id {
            return;
        }
        flight.holders = flight.holders.saturating_sub(1);
        if flight.holders == 0 {
            flights.active.remove(&self.key);
        }
    }
}
