// src/timer/mod.rs — Timers that re-enter an actor through its mailbox
//
// A timer never touches session state. When it fires it enqueues an event
// carrying the generation it was started with; the handler compares that
// generation against the owner's current one and drops stale firings.

pub mod coalesce;
pub mod expiry;

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::actor::Mailbox;

pub use coalesce::{Coalescer, CoalescingBuffer, Flushed};
pub use expiry::ExpiryTimer;

static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

/// Process-wide monotonic generation. Never returns the same value twice,
/// so a generation identifies one arming of one timer.
pub fn next_generation() -> u64 {
    NEXT_GENERATION.fetch_add(1, Ordering::Relaxed)
}

/// One-shot delayed enqueue. Dropping the timer aborts it.
#[derive(Debug)]
pub struct Timer {
    handle: JoinHandle<()>,
}

impl Timer {
    pub fn schedule<E: Send + 'static>(delay: Duration, mailbox: Mailbox<E>, event: E) -> Self {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if mailbox.enqueue(event).await.is_err() {
                tracing::debug!("Timer fired after actor shutdown; dropped");
            }
        });
        Self { handle }
    }

    pub fn cancel(&self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
