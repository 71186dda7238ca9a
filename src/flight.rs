use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex};

use tokio::sync::OnceCell;

/// Coalesces concurrent computations that share a key.
///
/// The first caller for a key runs the future; callers arriving while it
/// runs wait on the same cell and get a clone of its output. The entry is
/// dropped once every caller holding it has returned or been cancelled, so
/// a later call starts fresh. If the running caller is cancelled, one of
/// the waiters takes over.
pub struct Flights<K, V> {
    inflight: Mutex<HashMap<K, Flight<V>>>,
}

struct Flight<V> {
    cell: Arc<OnceCell<V>>,
    /// Callers currently inside `run` for this cell.
    callers: usize,
}

impl<K, V> Default for Flights<K, V> {
    fn default() -> Self {
        Self { inflight: Mutex::new(HashMap::new()) }
    }
}

impl<K, V> Flights<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn run<F, Fut>(&self, key: &K, f: F) -> V
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V>,
    {
        let cell = {
            let mut inflight = self.lock();
            let flight = inflight.entry(key.clone()).or_insert_with(|| Flight {
                cell: Arc::new(OnceCell::new()),
                callers: 0,
            });
            flight.callers += 1;
            Arc::clone(&flight.cell)
        };

        let departure = Departure { flights: self, key, cell };
        departure.cell.get_or_init(f).await.clone()
    }

    /// Number of keys with a computation in progress.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<K, Flight<V>>> {
        // The map is only touched in short critical sections that cannot
        // panic, so a poisoned lock still holds a consistent map.
        self.inflight.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Leaves a flight when a caller returns from `run` or its future is
/// dropped. A finished cell is removed right away; an unfinished one only
/// once no caller is left to take it over.
struct Departure<'a, K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    flights: &'a Flights<K, V>,
    key: &'a K,
    cell: Arc<OnceCell<V>>,
}

impl<K, V> Drop for Departure<'_, K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn drop(&mut self) {
        let mut inflight = self.flights.lock();
        let Some(flight) = inflight.get_mut(self.key) else {
            return;
        };
        // A newer flight for the same key is not ours to touch.
        if !Arc::ptr_eq(&flight.cell, &self.cell) {
            return;
        }
        flight.callers -= 1;
        if flight.callers == 0 || flight.cell.initialized() {
            inflight.remove(self.key);
        }
    }
}
