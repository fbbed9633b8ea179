// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Exclusive access to a half-duplex resource with a post-release debounce.
//!
//! [`Arbiter::acquire`] waits for the lock, then waits until `debounce` has
//! passed since the previous holder released it. The release instant is
//! recorded when the [`BusGuard`] is dropped, so the quiet period always
//! covers the full transaction including any response timeout.
//!
//! The arbiter is a mutex plus a timestamp, not a queue: waiters are served in
//! the order tokio's mutex grants the lock (FIFO).

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, MutexGuard};
use tokio::time::Instant;

struct Slot<T> {
    resource: T,
    released_at: Option<Instant>,
}

/// Serializes access to `T` with a minimum gap between holders.
pub struct Arbiter<T> {
    slot: Mutex<Slot<T>>,
    debounce: Duration,
    acquisitions: AtomicU64,
}

impl<T> Arbiter<T> {
    /// Creates an arbiter around `resource`.
    pub fn new(resource: T, debounce: Duration) -> Self {
        Self {
            slot: Mutex::new(Slot {
                resource,
                released_at: None,
            }),
            debounce,
            acquisitions: AtomicU64::new(0),
        }
    }

    /// Returns the configured debounce.
    pub fn debounce(&self) -> Duration {
        self.debounce
    }

    /// Returns how many times the resource was acquired.
    pub fn acquisitions(&self) -> u64 {
        self.acquisitions.load(Ordering::Relaxed)
    }

    /// Waits for exclusive access.
    pub async fn acquire(&self) -> BusGuard<'_, T> {
        let slot = self.slot.lock().await;
        if let Some(released_at) = slot.released_at {
            tokio::time::sleep_until(released_at + self.debounce).await;
        }
        self.acquisitions.fetch_add(1, Ordering::Relaxed);
        BusGuard { slot }
    }
}

/// Exclusive access to the arbitrated resource; releases on drop.
pub struct BusGuard<'a, T> {
    slot: MutexGuard<'a, Slot<T>>,
}

impl<T> Deref for BusGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.slot.resource
    }
}

impl<T> DerefMut for BusGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.slot.resource
    }
}

impl<T> Drop for BusGuard<'_, T> {
    fn drop(&mut self) {
        self.slot.released_at = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_first_acquire_does_not_wait() {
        let arbiter = Arbiter::new(0u32, Duration::from_millis(500));
        let start = Instant::now();
        let _guard = arbiter.acquire().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounce_measured_from_release() {
        let arbiter = Arbiter::new(0u32, Duration::from_millis(500));

        {
            let mut guard = arbiter.acquire().await;
            *guard += 1;
            // Transaction takes 1 s.
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
        let released = Instant::now();

        let guard = arbiter.acquire().await;
        assert_eq!(released.elapsed(), Duration::from_millis(500));
        assert_eq!(*guard, 1);
        assert_eq!(arbiter.acquisitions(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_holders_never_overlap() {
        let arbiter = Arc::new(Arbiter::new(Vec::<(Instant, Instant)>::new(), Duration::from_millis(500)));

        let mut tasks = Vec::new();
        for _ in 0..4 {
            let arbiter = Arc::clone(&arbiter);
            tasks.push(tokio::spawn(async move {
                let mut guard = arbiter.acquire().await;
                let begin = Instant::now();
                tokio::time::sleep(Duration::from_millis(100)).await;
                guard.push((begin, Instant::now()));
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let spans = arbiter.acquire().await.clone();
        assert_eq!(spans.len(), 4);
        for pair in spans.windows(2) {
            assert!(pair[1].0 >= pair[0].1 + Duration::from_millis(500));
        }
    }
}
