// src/session/registry.rs — User id → session actor
//
// Sessions are created lazily on the first allowed update and live until
// shutdown. Access is checked before anything is allocated for a user id.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{Event, Session, SessionView, SharedView};
use crate::actor::{self, ActorHandle, Mailbox};
use crate::auth::{self, AuthState, SharedAuth};
use crate::bot::{BotContext, SessionActor};
use crate::infra::errors::Result;
use crate::integrations::types::{Update, UserId};

struct SessionHandle {
    mailbox: Mailbox<Event>,
    actor: ActorHandle,
    auth: SharedAuth,
    view: SharedView,
}

pub struct SessionRegistry {
    ctx: Arc<BotContext>,
    sessions: Mutex<HashMap<UserId, SessionHandle>>,
}

impl SessionRegistry {
    pub fn new(ctx: Arc<BotContext>) -> Self {
        Self {
            ctx,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<UserId, SessionHandle>> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Whether `user_id` may use the bot. The session store decides when
    /// present; otherwise the configured allow-list (empty allows everyone).
    pub fn is_allowed(&self, user_id: UserId) -> bool {
        match &self.ctx.store {
            Some(store) => store.is_user_allowed(user_id),
            None => {
                let allowed = &self.ctx.config.telegram.allowed_users;
                allowed.is_empty() || allowed.contains(&user_id)
            }
        }
    }

    /// Route an update to its session. Returns `false` when the user is
    /// not allowed; no session is created in that case.
    ///
    /// Never waits for queue space: a session whose queue is full gets
    /// `MailboxError::Full` and the update is dropped, so one busy user
    /// cannot hold up the updates of everyone else.
    pub async fn dispatch(&self, update: Update) -> Result<bool> {
        let user_id = update.user_id();
        if !self.is_allowed(user_id) {
            tracing::debug!("Ignoring update from user {} (not allowed)", user_id);
            return Ok(false);
        }
        let mailbox = self.get_or_create(user_id);
        mailbox.try_enqueue(Event::from(update))?;
        Ok(true)
    }

    /// Like [`dispatch`](Self::dispatch) but returns once the session has
    /// handled the update.
    pub async fn dispatch_and_wait(&self, update: Update) -> Result<bool> {
        let user_id = update.user_id();
        if !self.is_allowed(user_id) {
            return Ok(false);
        }
        let mailbox = self.get_or_create(user_id);
        mailbox.enqueue_and_wait(Event::from(update)).await?;
        Ok(true)
    }

    /// Mailbox of the user's session, starting the session if needed.
    pub fn get_or_create(&self, user_id: UserId) -> Mailbox<Event> {
        let mut sessions = self.sessions();
        if let Some(handle) = sessions.get(&user_id) {
            return handle.mailbox.clone();
        }

        let auth = self.hydrate_auth(user_id).shared();
        let (mailbox, inbox) = actor::channel(self.ctx.config.mailbox.capacity);
        let session = Session::new(user_id, auth.clone(), mailbox.clone());
        let view = session.view_handle();
        let actor = inbox.spawn(
            format!("user:{user_id}"),
            SessionActor::new(session, self.ctx.clone()),
        );
        tracing::info!("Session started for user {}", user_id);

        sessions.insert(
            user_id,
            SessionHandle {
                mailbox: mailbox.clone(),
                actor,
                auth,
                view,
            },
        );
        mailbox
    }

    /// Credentials and installation id from the store, if there is one.
    fn hydrate_auth(&self, user_id: UserId) -> AuthState {
        let Some(store) = &self.ctx.store else {
            return AuthState::new(uuid::Uuid::new_v4().to_string(), None);
        };

        let credentials = store.get_credentials(user_id).unwrap_or_else(|e| {
            tracing::warn!("Could not load credentials for user {}: {}", user_id, e);
            None
        });
        let device_id = match store.get_installation_id(user_id) {
            Ok(Some(id)) => id,
            other => {
                if let Err(e) = other {
                    tracing::warn!("Could not load installation id for user {}: {}", user_id, e);
                }
                let id = uuid::Uuid::new_v4().to_string();
                if let Err(e) = store.set_installation_id(user_id, id.clone()) {
                    tracing::warn!("Could not save installation id for user {}: {}", user_id, e);
                }
                id
            }
        };
        AuthState::new(device_id, credentials)
    }

    pub fn len(&self) -> usize {
        self.sessions().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions().is_empty()
    }

    /// Latest snapshot of a session.
    pub fn view(&self, user_id: UserId) -> Option<SessionView> {
        let view = self.sessions().get(&user_id).map(|h| h.view.clone())?;
        let snapshot = view.lock().unwrap_or_else(|e| e.into_inner()).clone();
        Some(snapshot)
    }

    /// Refresh every session's credentials that expire soon. Returns how
    /// many were refreshed.
    pub async fn refresh_tokens(&self) -> usize {
        let margin = chrono::Duration::seconds(self.ctx.config.auth.refresh_margin_secs as i64);
        let targets: Vec<(UserId, SharedAuth)> = self
            .sessions()
            .iter()
            .map(|(user_id, h)| (*user_id, h.auth.clone()))
            .collect();

        let mut refreshed = 0;
        for (user_id, shared) in targets {
            match auth::refresh_if_expiring(&shared, self.ctx.auth.as_ref(), margin).await {
                Ok(Some(credentials)) => {
                    refreshed += 1;
                    tracing::info!("Refreshed marketplace token for user {}", user_id);
                    if let Some(store) = &self.ctx.store {
                        if let Err(e) = store.save_credentials(user_id, Some(credentials)) {
                            tracing::warn!("Could not persist refreshed token: {}", e);
                        }
                    }
                }
                Ok(None) => {}
                Err(e) => tracing::warn!("Token refresh failed for user {}: {}", user_id, e),
            }
        }
        refreshed
    }

    /// Periodic [`refresh_tokens`](Self::refresh_tokens) until `cancel`.
    pub fn spawn_refresher(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        let every = Duration::from_secs(registry.ctx.config.auth.refresh_interval_secs.max(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        registry.refresh_tokens().await;
                    }
                }
            }
            tracing::debug!("Token refresher stopped");
        })
    }

    /// Stop every session actor. Queued events are discarded and waiters
    /// released.
    pub async fn shutdown(&self) {
        let handles: Vec<(UserId, SessionHandle)> = self.sessions().drain().collect();
        tracing::info!("Stopping {} session(s)", handles.len());
        for (_, handle) in handles {
            handle.actor.stop().await;
        }
    }
}
