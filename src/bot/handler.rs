// src/bot/handler.rs — Event dispatch for one session

use std::sync::Arc;

use async_trait::async_trait;

use super::commands::{CallbackAction, Command, HELP_TEXT};
use super::{BotContext, StepResult};
use crate::actor::Handler;
use crate::integrations::types::{CallbackQuery, InboundMessage};
use crate::session::{Event, PublishTarget, Session};
use crate::timer::Coalescer;

pub struct SessionActor {
    pub(crate) session: Session,
    pub(crate) ctx: Arc<BotContext>,
}

impl SessionActor {
    pub fn new(session: Session, ctx: Arc<BotContext>) -> Self {
        Self { session, ctx }
    }

    /// Route one event to the flow that owns it.
    pub async fn dispatch(&mut self, event: Event) -> StepResult {
        match event {
            Event::Message(msg) => self.on_message(msg).await,
            Event::Callback(cb) => self.on_callback(cb).await,
            Event::AlbumFlush { generation } => self.on_album_flush(generation).await,
            Event::DraftExpired { generation } => self.on_draft_expired(generation).await,
            Event::LoginExpired { generation } => self.on_login_expired(generation).await,
            Event::DraftCreated { request, draft } => self.on_draft_created(request, *draft).await,
            Event::DraftCreateFailed { request, error } => {
                self.on_draft_create_failed(request, &error).await
            }
            Event::BulkAlbumFlush { generation } => self.on_bulk_album_flush(generation).await,
            Event::BulkAnalysisComplete { draft_id, outcome } => {
                self.on_bulk_analysis_complete(draft_id, *outcome).await
            }
            Event::BulkAnalysisError { draft_id, error } => {
                self.on_bulk_analysis_error(draft_id, error).await
            }
            Event::BulkStatusDebounce { generation } => {
                self.on_bulk_status_debounce(generation).await
            }
            Event::BulkCleanupDone { deleted, failed } => {
                self.on_bulk_cleanup_done(deleted, failed).await
            }
            Event::PublishComplete { target, result } => match target {
                PublishTarget::Single => self.on_single_published(result).await,
                PublishTarget::Bulk(draft_id) => self.on_bulk_published(draft_id, result).await,
            },
        }
    }

    async fn on_message(&mut self, msg: InboundMessage) -> StepResult {
        self.session.chat_id = msg.chat_id;
        if let Some(photo) = msg.photo.clone() {
            return self.on_photo(&msg, photo).await;
        }
        let Some(text) = msg.text.as_deref().map(str::trim) else {
            return Ok(());
        };
        if text.is_empty() {
            return Ok(());
        }
        if let Some(command) = Command::parse(text) {
            return self.on_command(command).await;
        }
        self.on_text(text.to_string()).await
    }

    /// Free text goes to whichever flow is waiting for it.
    async fn on_text(&mut self, text: String) -> StepResult {
        if self.session.login.is_active() {
            return self.login_text(&text).await;
        }
        if self.session.bulk.is_some() {
            return self.bulk_text(&text).await;
        }
        if self.session.draft.is_some() {
            return self.single_text(text).await;
        }
        if self.session.creating.is_some() {
            self.reply("Still analysing your photos, one moment…").await;
            return Ok(());
        }
        self.reply("Send me photos of something to sell, or /help.")
            .await;
        Ok(())
    }

    async fn on_callback(&mut self, cb: CallbackQuery) -> StepResult {
        self.session.chat_id = cb.chat_id;
        if let Err(e) = self.ctx.transport.answer_callback(&cb.id, None).await {
            tracing::debug!("Could not answer callback {}: {}", cb.id, e);
        }
        let Some(action) = CallbackAction::parse(&cb.data) else {
            tracing::debug!("Unknown callback data '{}'", cb.data);
            return Ok(());
        };

        match action {
            CallbackAction::Category(id) => self.select_category(&id).await,
            CallbackAction::Browse(node) => self.browse_categories(node, cb.message_id).await,
            CallbackAction::Attribute { field, value } => {
                self.answer_attribute_button(&field, &value).await
            }
            CallbackAction::Shipping(yes) => {
                self.draft_step(move |d| d.answer_shipping(yes).map(drop)).await;
                Ok(())
            }
            CallbackAction::PackageSize(id) => {
                self.draft_step(move |d| d.answer_package_size(&id).map(drop))
                    .await;
                Ok(())
            }
            CallbackAction::Confirm => self.confirm_publish(cb.message_id).await,
            CallbackAction::Cancel => self.cancel_from_button(cb.message_id).await,
            CallbackAction::Recategorize => self.recategorize(cb.message_id).await,
            CallbackAction::Page(page) => self.show_listings(page).await,
            CallbackAction::Bulk(action) => self.on_bulk_action(action).await,
        }
    }

    async fn on_command(&mut self, command: Command) -> StepResult {
        match command {
            Command::Start | Command::Help => self.reply(HELP_TEXT).await,
            Command::New => {
                if self.session.has_single_flow() || self.session.bulk.is_some() {
                    self.reply("Finish what you are doing first, or /cancel it.")
                        .await;
                } else if self.require_login().await.is_some() {
                    self.reply("Send me one or more photos of the item.").await;
                }
            }
            Command::Bulk => self.start_bulk().await?,
            Command::Cancel => self.cancel_everything().await,
            Command::Login => self.start_login().await,
            Command::Logout => self.logout().await,
            Command::Status => {
                let status = self.status_text();
                self.reply(&status).await;
            }
            Command::Listings => {
                self.session.listings.clear();
                self.show_listings(0).await?;
            }
            Command::Template(text) => self.set_template(text).await,
            Command::Postal(code) => self.set_postal_code(code).await,
            Command::Unknown(name) => {
                self.reply(&format!("I don't know /{name}. Try /help."))
                    .await;
            }
        }
        Ok(())
    }

    /// Abandon every flow in progress.
    async fn cancel_everything(&mut self) {
        let mut cancelled = false;
        if self.session.login.is_active() {
            self.session.login.reset();
            cancelled = true;
        }
        // A creation still in flight no longer matches and cleans up after itself.
        if self.session.creating.take().is_some() {
            cancelled = true;
        }
        if Coalescer::take_now(&mut self.session.album_buffer).is_some() {
            cancelled = true;
        }
        if let Some(draft) = self.session.draft.take() {
            self.discard_draft(draft);
            cancelled = true;
        }
        if self.session.bulk.is_some() {
            self.cancel_bulk();
            cancelled = true;
        }
        let text = if cancelled {
            "Cancelled."
        } else {
            "Nothing to cancel."
        };
        self.reply(text).await;
    }

    fn status_text(&self) -> String {
        let mut lines = Vec::new();
        lines.push(if self.session.is_logged_in() {
            "Marketplace: logged in".to_string()
        } else {
            "Marketplace: not logged in (/login)".to_string()
        });
        if self.session.login.is_active() {
            lines.push("Login in progress".into());
        }
        if self.session.creating.is_some() {
            lines.push("Analysing photos for a new listing".into());
        }
        if let Some(draft) = &self.session.draft {
            lines.push(format!(
                "Listing \"{}\": {}",
                draft.title,
                draft.state().name().replace('_', " ")
            ));
        }
        if let Some(bulk) = &self.session.bulk {
            let c = bulk.counts();
            lines.push(format!(
                "Bulk session: {} item(s), {} ready, {} analysing, {} failed",
                c.total,
                c.ready,
                c.pending + c.analyzing,
                c.failed
            ));
        }
        if lines.len() == 1 {
            lines.push("Nothing in progress.".into());
        }
        lines.join("\n")
    }
}

#[async_trait]
impl Handler<Event> for SessionActor {
    async fn handle(&mut self, event: Event) {
        let kind = event.kind();
        tracing::debug!("[user:{}] handling {}", self.session.user_id, kind);
        if let Err(e) = self.dispatch(event).await {
            self.report_failure(kind, &e).await;
        }
    }

    fn after_event(&mut self) {
        self.session.refresh_view();
    }
}
