//! Local backlog counter and the single local-generation slot.

use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{Mutex, MutexGuard};

/// Process-wide local-path state.
///
/// `depth` counts requests that have committed to the local path (waiting or
/// generating). `slot` admits one generation at a time, so `depth` can exceed
/// one while generation stays strictly serialized.
#[derive(Debug, Default)]
pub struct QueueState {
    depth: AtomicUsize,
    slot: Mutex<()>,
}

impl QueueState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current local backlog.
    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::Acquire)
    }

    /// Whether a local generation currently holds the slot.
    pub fn is_generating(&self) -> bool {
        self.slot.try_lock().is_err()
    }

    /// Join the local backlog. The returned ticket leaves it on drop, which
    /// also covers errors, panics and cancelled futures.
    pub fn enter(&self) -> QueueTicket<'_> {
        self.depth.fetch_add(1, Ordering::AcqRel);
        QueueTicket { state: self }
    }

    /// Wait for the generation slot. Released when the returned guard drops.
    pub async fn acquire_slot(&self) -> GenerationSlot<'_> {
        GenerationSlot {
            _guard: self.slot.lock().await,
        }
    }
}

/// Membership in the local backlog.
#[derive(Debug)]
pub struct QueueTicket<'a> {
    state: &'a QueueState,
}

impl Drop for QueueTicket<'_> {
    fn drop(&mut self) {
        self.state.depth.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Exclusive right to run a local generation.
#[derive(Debug)]
pub struct GenerationSlot<'a> {
    _guard: MutexGuard<'a, ()>,
}
