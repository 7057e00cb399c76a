// src/actor/mod.rs — Per-session mailbox and sequential worker
//
// One bounded queue plus one worker task per session. The worker pops an
// envelope, runs the handler to completion, then signals the envelope's
// completion channel (if any). Handler panics are caught and logged; the
// worker keeps serving. Shutdown stops intake and drops whatever is still
// queued, which closes every pending completion channel.

use std::any::Any;
use std::panic::AssertUnwindSafe;

use async_trait::async_trait;
use futures::FutureExt;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::infra::errors::MailboxError;

/// The business side of an actor. Events arrive one at a time, in order.
#[async_trait]
pub trait Handler<E: Send + 'static>: Send + 'static {
    async fn handle(&mut self, event: E);

    /// Runs after every event, including ones whose handler panicked.
    fn after_event(&mut self) {}
}

pub(crate) struct Envelope<E> {
    pub(crate) event: E,
    done: Option<oneshot::Sender<()>>,
}

/// Sending half of a session's queue. Cheap to clone; timers and
/// background tasks each hold one.
pub struct Mailbox<E> {
    tx: mpsc::Sender<Envelope<E>>,
    cancel: CancellationToken,
}

impl<E> Clone for Mailbox<E> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            cancel: self.cancel.clone(),
        }
    }
}

impl<E: Send + 'static> Mailbox<E> {
    /// Queue an event. Waits only for queue space; returns `Closed` instead
    /// of waiting once the actor is shutting down.
    pub async fn enqueue(&self, event: E) -> Result<(), MailboxError> {
        self.send(Envelope { event, done: None }).await
    }

    /// Queue an event only if there is room right now.
    pub fn try_enqueue(&self, event: E) -> Result<(), MailboxError> {
        if self.cancel.is_cancelled() {
            return Err(MailboxError::Closed);
        }
        self.tx
            .try_send(Envelope { event, done: None })
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => MailboxError::Full,
                mpsc::error::TrySendError::Closed(_) => MailboxError::Closed,
            })
    }

    /// Queue an event and wait until the handler has finished with it.
    pub async fn enqueue_and_wait(&self, event: E) -> Result<(), MailboxError> {
        let (done_tx, done_rx) = oneshot::channel();
        self.send(Envelope {
            event,
            done: Some(done_tx),
        })
        .await?;
        // A dropped sender means the envelope was discarded during shutdown.
        done_rx.await.map_err(|_| MailboxError::Closed)
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled() || self.tx.is_closed()
    }

    /// Number of envelopes waiting in the queue.
    pub fn queued(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    async fn send(&self, envelope: Envelope<E>) -> Result<(), MailboxError> {
        if self.cancel.is_cancelled() {
            return Err(MailboxError::Closed);
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(MailboxError::Closed),
            res = self.tx.send(envelope) => res.map_err(|_| MailboxError::Closed),
        }
    }
}

/// Receiving half, consumed when the worker starts.
pub struct Inbox<E> {
    pub(crate) rx: mpsc::Receiver<Envelope<E>>,
    cancel: CancellationToken,
}

/// Create a mailbox with the given queue depth. The mailbox can be handed
/// to the handler before the worker starts.
pub fn channel<E: Send + 'static>(capacity: usize) -> (Mailbox<E>, Inbox<E>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let cancel = CancellationToken::new();
    (
        Mailbox {
            tx,
            cancel: cancel.clone(),
        },
        Inbox { rx, cancel },
    )
}

impl<E: Send + 'static> Inbox<E> {
    /// Start the worker loop on the tokio runtime.
    pub fn spawn<H: Handler<E>>(self, label: impl Into<String>, handler: H) -> ActorHandle {
        let cancel = self.cancel.clone();
        let join = tokio::spawn(run_worker(label.into(), self, handler));
        ActorHandle { cancel, join }
    }
}

/// Owner-side handle used to stop a running actor.
pub struct ActorHandle {
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

impl ActorHandle {
    /// Stop intake, drain the queue and wait for the worker to exit.
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.join.await {
            tracing::warn!("Actor worker ended abnormally: {}", e);
        }
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}

async fn run_worker<E, H>(label: String, inbox: Inbox<E>, mut handler: H)
where
    E: Send + 'static,
    H: Handler<E>,
{
    let Inbox { mut rx, cancel } = inbox;
    tracing::debug!("[{label}] actor started");

    loop {
        let envelope = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            next = rx.recv() => match next {
                Some(envelope) => envelope,
                None => break,
            },
        };

        let Envelope { event, done } = envelope;
        let outcome = AssertUnwindSafe(handler.handle(event))
            .catch_unwind()
            .await;
        if let Err(panic) = outcome {
            tracing::error!(
                "[{label}] event handler panicked, actor continues: {}",
                panic_message(panic.as_ref())
            );
        }
        handler.after_event();

        if let Some(done) = done {
            let _ = done.send(());
        }
    }

    // Refuse new sends, then drop what is left so waiters are released.
    rx.close();
    let mut dropped = 0usize;
    while let Ok(envelope) = rx.try_recv() {
        drop(envelope);
        dropped += 1;
    }
    tracing::debug!("[{label}] actor stopped ({dropped} queued events discarded)");
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
