//! Serialized report generation.
//!
//! [`GenerationSlot`] is a FIFO ticket lock: each request draws a ticket and
//! waits until the slot serves it, so at most one report renders at a time
//! and queued requests complete in arrival order. A request from the thread
//! that already holds the slot fails with [`GenerationError::Reentrant`]
//! instead of deadlocking behind itself.

use crate::error::GenerationError;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

#[derive(Debug, Default)]
struct SlotState {
    next_ticket: u64,
    serving: u64,
    holder: Option<ThreadId>,
}

/// Single-holder FIFO slot for report generation.
#[derive(Debug, Default)]
pub struct GenerationSlot {
    state: Mutex<SlotState>,
    turn: Condvar,
}

/// Proof of holding the slot; releases it on drop.
#[derive(Debug)]
pub struct SlotGuard<'a> {
    slot: &'a GenerationSlot,
    ticket: u64,
}

impl SlotGuard<'_> {
    /// Position of this request in arrival order (0-based).
    pub fn ticket(&self) -> u64 {
        self.ticket
    }
}

impl GenerationSlot {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SlotState> {
        // State updates are single assignments, so a poisoned lock is still consistent.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wait for this caller's turn.
    ///
    /// `on_queued` runs (without the lock held) when the request has to wait,
    /// with the number of requests ahead of it.
    pub fn acquire_with<F>(&self, on_queued: F) -> Result<SlotGuard<'_>, GenerationError>
    where
        F: FnOnce(u64),
    {
        let me = thread::current().id();
        let mut state = self.lock();
        if state.holder == Some(me) {
            return Err(GenerationError::Reentrant);
        }

        let ticket = state.next_ticket;
        state.next_ticket += 1;

        if state.serving != ticket {
            let ahead = ticket - state.serving;
            drop(state);
            on_queued(ahead);
            state = self.lock();
        }

        while state.serving != ticket {
            state = self
                .turn
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        state.holder = Some(me);
        Ok(SlotGuard { slot: self, ticket })
    }

    pub fn acquire(&self) -> Result<SlotGuard<'_>, GenerationError> {
        self.acquire_with(|_| {})
    }

    /// Requests holding or waiting for the slot.
    pub fn outstanding(&self) -> u64 {
        let state = self.lock();
        state.next_ticket - state.serving
    }

    /// Whether the calling thread holds the slot.
    pub fn held_by_current_thread(&self) -> bool {
        self.lock().holder == Some(thread::current().id())
    }
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.slot.lock();
        state.holder = None;
        state.serving = self.ticket + 1;
        drop(state);
        self.slot.turn.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{mpsc, Arc};
    use std::time::Duration;

    #[test]
    fn uncontended_acquire_is_immediate() {
        let slot = GenerationSlot::new();
        let guard = slot.acquire().unwrap();
        assert_eq!(guard.ticket(), 0);
        assert!(slot.held_by_current_thread());
        drop(guard);
        assert!(!slot.held_by_current_thread());
        assert_eq!(slot.outstanding(), 0);
        assert_eq!(slot.acquire().unwrap().ticket(), 1);
    }

    #[test]
    fn same_thread_reentry_is_refused() {
        let slot = GenerationSlot::new();
        let _guard = slot.acquire().unwrap();
        assert!(matches!(slot.acquire(), Err(GenerationError::Reentrant)));
        // The refused request drew no ticket.
        assert_eq!(slot.outstanding(), 1);
    }

    #[test]
    fn waiters_are_served_in_arrival_order() {
        let slot = Arc::new(GenerationSlot::new());
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let first = slot.acquire().unwrap();

        let mut handles = Vec::new();
        for id in 0..4 {
            let slot = Arc::clone(&slot);
            let order = Arc::clone(&order);
            let (queued_tx, queued_rx) = mpsc::channel();
            handles.push(std::thread::spawn(move || {
                let _guard = slot
                    .acquire_with(|_| queued_tx.send(()).unwrap())
                    .unwrap();
                order.lock().unwrap().push(id);
            }));
            // Wait until this thread holds a ticket before starting the next.
            queued_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        }

        assert_eq!(slot.outstanding(), 5);
        drop(first);
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn at_most_one_holder() {
        let slot = Arc::new(GenerationSlot::new());
        let active = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let slot = Arc::clone(&slot);
                let active = Arc::clone(&active);
                let max_seen = Arc::clone(&max_seen);
                std::thread::spawn(move || {
                    for _ in 0..20 {
                        let _guard = slot.acquire().unwrap();
                        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                        max_seen.fetch_max(now, Ordering::SeqCst);
                        std::thread::yield_now();
                        active.fetch_sub(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
        assert_eq!(slot.outstanding(), 0);
    }
}
