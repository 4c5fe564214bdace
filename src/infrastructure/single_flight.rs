// Single-flight - concurrent identical requests share one computation

use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Mutex;

use crate::error::AppResult;

type SharedResult<T> = Shared<BoxFuture<'static, AppResult<T>>>;

pub struct SingleFlight<K, T>
where
    T: Clone,
{
    in_flight: Mutex<HashMap<K, SharedResult<T>>>,
}

/// Removes the leader's entry once it finishes or is dropped.
struct FlightGuard<'a, K: Hash + Eq, T: Clone> {
    flights: &'a SingleFlight<K, T>,
    key: Option<K>,
}

impl<K: Hash + Eq, T: Clone> Drop for FlightGuard<'_, K, T> {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            if let Ok(mut in_flight) = self.flights.in_flight.lock() {
                in_flight.remove(&key);
            }
        }
    }
}

impl<K, T> Default for SingleFlight<K, T>
where
    K: Hash + Eq + Clone,
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, T> SingleFlight<K, T>
where
    K: Hash + Eq + Clone,
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Runs `make()` unless a computation for `key` is already in flight, in
    /// which case its result is awaited instead. The flag is true when the
    /// result came from another caller's computation.
    pub async fn run<F, Fut>(&self, key: K, make: F) -> (AppResult<T>, bool)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = AppResult<T>> + Send + 'static,
    {
        let (flight, guard) = {
            let mut in_flight = match self.in_flight.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            match in_flight.get(&key) {
                Some(existing) => (existing.clone(), None),
                None => {
                    let flight = make().boxed().shared();
                    in_flight.insert(key.clone(), flight.clone());
                    let guard = FlightGuard {
                        flights: self,
                        key: Some(key),
                    };
                    (flight, Some(guard))
                }
            }
        };

        let shared = guard.is_none();
        let result = flight.await;
        drop(guard);
        (result, shared)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.lock().map(|map| map.len()).unwrap_or(0)
    }
}
