// src/timer/expiry.rs — Inactivity timeout that every touch invalidates

use std::time::Duration;

use super::{next_generation, Timer};
use crate::actor::Mailbox;

/// Single inactivity timer owned by a draft or login flow.
///
/// `touch` replaces the running timer and hands out a new generation. The
/// "expired" event carries the generation it was armed with; only a match
/// with [`ExpiryTimer::is_current`] counts as a real expiration.
#[derive(Debug, Default)]
pub struct ExpiryTimer {
    generation: u64,
    timer: Option<Timer>,
}

impl ExpiryTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restart the timer. Returns the new generation.
    pub fn touch<E: Send + 'static>(
        &mut self,
        after: Duration,
        mailbox: &Mailbox<E>,
        on_expire: impl FnOnce(u64) -> E,
    ) -> u64 {
        self.generation = next_generation();
        self.timer = Some(Timer::schedule(
            after,
            mailbox.clone(),
            on_expire(self.generation),
        ));
        self.generation
    }

    /// Whether an expiration carrying `generation` is still meaningful.
    pub fn is_current(&self, generation: u64) -> bool {
        self.timer.is_some() && self.generation == generation
    }

    pub fn is_armed(&self) -> bool {
        self.timer.is_some()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn cancel(&mut self) {
        self.timer = None;
    }
}
