// src/bot/mod.rs — Session worker: interprets events against the flows
//
// `SessionActor` is the `Handler<Event>` each session worker runs. The
// dispatch in handler.rs is a plain match over `Event`; the per-flow
// behaviour lives in single.rs, bulk.rs and account.rs.

pub mod commands;
pub mod handler;
pub mod render;
pub mod tasks;

mod account;
mod bulk;
mod single;

use std::sync::Arc;

use crate::flow::CategoryTree;
use crate::infra::config::Config;
use crate::infra::errors::{BotError, Result};
use crate::infra::logger::LogContext;
use crate::integrations::types::{
    AuthService, ChatTransport, Credentials, Keyboard, ListingService, MessageId, SessionStore,
    VisionAnalyzer,
};

pub use handler::SessionActor;

/// Collaborators and settings shared by every session.
pub struct BotContext {
    pub transport: Arc<dyn ChatTransport>,
    pub listing: Arc<dyn ListingService>,
    pub analyzer: Arc<dyn VisionAnalyzer>,
    pub auth: Arc<dyn AuthService>,
    /// `None` runs without persistence; templates, default postal codes
    /// and saved logins are then unavailable.
    pub store: Option<Arc<dyn SessionStore>>,
    pub categories: Arc<CategoryTree>,
    pub config: Config,
    pub log: LogContext,
}

pub const GENERIC_FAILURE: &str = "Something went wrong on our side. Please try again.";

impl SessionActor {
    async fn reply(&self, text: &str) {
        self.reply_with(text, None).await;
    }

    /// Send a message; failures are logged, not propagated.
    async fn reply_with(&self, text: &str, keyboard: Option<&Keyboard>) -> Option<MessageId> {
        match self
            .ctx
            .transport
            .send_message(self.session.chat_id, text, keyboard)
            .await
        {
            Ok(id) => Some(id),
            Err(e) => {
                tracing::warn!(
                    "Failed to send message to user {}: {}",
                    self.session.user_id,
                    e
                );
                None
            }
        }
    }

    /// Edit `message_id` in place, or send a new message if that fails.
    async fn edit_or_send(
        &self,
        message_id: Option<MessageId>,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Option<MessageId> {
        if let Some(id) = message_id {
            match self
                .ctx
                .transport
                .edit_message(self.session.chat_id, id, text, keyboard)
                .await
            {
                Ok(()) => return Some(id),
                Err(e) => tracing::debug!("Edit of message {} failed, resending: {}", id, e),
            }
        }
        self.reply_with(text, keyboard).await
    }

    fn credentials(&self) -> Option<Credentials> {
        crate::auth::snapshot(&self.session.auth)
    }

    /// Credentials or a "please log in" reply.
    async fn require_login(&self) -> Option<Credentials> {
        let creds = self.credentials();
        if creds.is_none() {
            self.reply("You need to /login to the marketplace first.").await;
        }
        creds
    }

    /// Report a collaborator failure to the user and the log.
    async fn report_failure(&self, what: &str, err: &BotError) {
        tracing::error!(
            "{} failed for user {}: {}",
            what,
            self.session.user_id,
            err
        );
        let text = match err {
            BotError::VersionConflict { .. } => {
                "The draft was changed elsewhere. Please try again."
            }
            BotError::Auth(_) => "The marketplace rejected your login. Please /login again.",
            _ => GENERIC_FAILURE,
        };
        self.reply(text).await;
    }
}

/// Result of handling one step. Errors reaching the dispatcher are
/// collaborator failures; input problems are answered where they occur.
pub(crate) type StepResult = Result<()>;
