// src/timer/coalesce.rs — "Buffer until quiet" primitive
//
// Groups rapid related inputs (album photos, status dirty marks) under a
// group key. A different key supersedes the open buffer: its items are
// handed back to the caller before the new buffer is used. Each push
// re-arms the quiet timer with a fresh generation.

use std::time::Duration;

use tokio::time::Instant;

use super::{next_generation, Timer};
use crate::actor::Mailbox;

/// One open buffer. Lives in a `Option<CoalescingBuffer>` slot owned by the
/// session; only the session's worker touches it.
#[derive(Debug)]
pub struct CoalescingBuffer<K, T> {
    group_key: K,
    items: Vec<T>,
    generation: u64,
    first_seen_at: Instant,
    dropped: usize,
    timer: Option<Timer>,
}

impl<K, T> CoalescingBuffer<K, T> {
    fn open(group_key: K) -> Self {
        Self {
            group_key,
            items: Vec::new(),
            generation: 0,
            first_seen_at: Instant::now(),
            dropped: 0,
            timer: None,
        }
    }

    pub fn group_key(&self) -> &K {
        &self.group_key
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn first_seen_at(&self) -> Instant {
        self.first_seen_at
    }

    /// Items refused because the cap was reached.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    pub fn into_flushed(self) -> Flushed<K, T> {
        Flushed {
            group_key: self.group_key,
            items: self.items,
            dropped: self.dropped,
        }
    }
}

/// Contents of a buffer that was consumed, by supersession or by timeout.
#[derive(Debug, Clone, PartialEq)]
pub struct Flushed<K, T> {
    pub group_key: K,
    pub items: Vec<T>,
    pub dropped: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct Coalescer {
    quiet: Duration,
    max_items: usize,
}

impl Coalescer {
    pub fn new(quiet: Duration, max_items: usize) -> Self {
        Self {
            quiet,
            max_items: max_items.max(1),
        }
    }

    /// A coalescer that only tracks "something changed".
    pub fn debouncer(quiet: Duration) -> Self {
        Self::new(quiet, 1)
    }

    pub fn quiet(&self) -> Duration {
        self.quiet
    }

    /// Add an item under `key`.
    ///
    /// Returns the superseded buffer's contents when `key` differs from the
    /// open buffer's key and that buffer held items. The caller must process
    /// them before anything else. `on_quiet` builds the event enqueued when
    /// the quiet period elapses; it receives the buffer's new generation.
    pub fn push<K, T, E>(
        &self,
        slot: &mut Option<CoalescingBuffer<K, T>>,
        key: K,
        item: T,
        mailbox: &Mailbox<E>,
        on_quiet: impl FnOnce(u64) -> E,
    ) -> Option<Flushed<K, T>>
    where
        K: PartialEq,
        E: Send + 'static,
    {
        let flushed = match slot.take() {
            Some(open) if open.group_key == key => {
                *slot = Some(open);
                None
            }
            Some(superseded) => {
                let flushed = superseded.into_flushed();
                (!flushed.items.is_empty()).then_some(flushed)
            }
            None => None,
        };

        let buffer = slot.get_or_insert_with(|| CoalescingBuffer::open(key));
        if buffer.items.len() < self.max_items {
            buffer.items.push(item);
        } else {
            buffer.dropped += 1;
            tracing::debug!(
                "Coalescing buffer full ({} items); dropping item",
                self.max_items
            );
        }

        // Replacing the timer aborts the previous one.
        buffer.generation = next_generation();
        buffer.timer = Some(Timer::schedule(
            self.quiet,
            mailbox.clone(),
            on_quiet(buffer.generation),
        ));

        flushed
    }

    /// Take the buffer for a timer firing, but only if `generation` still
    /// names the open buffer. A stale firing returns `None`.
    pub fn take_if_current<K, T>(
        slot: &mut Option<CoalescingBuffer<K, T>>,
        generation: u64,
    ) -> Option<Flushed<K, T>> {
        match slot {
            Some(open) if open.generation == generation => {
                slot.take().map(CoalescingBuffer::into_flushed)
            }
            _ => None,
        }
    }

    /// Consume the open buffer immediately (cancel, teardown).
    pub fn take_now<K, T>(slot: &mut Option<CoalescingBuffer<K, T>>) -> Option<Flushed<K, T>> {
        slot.take().map(CoalescingBuffer::into_flushed)
    }
}
