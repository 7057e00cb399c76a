// src/bot/single.rs — Single-listing flow: photos → draft → publish

use std::collections::BTreeMap;

use super::render;
use super::tasks::{self, CreateRequest, PublishRequest};
use super::{SessionActor, StepResult};
use crate::flow::input;
use crate::flow::{Draft, FlowState, SelectedCategory, StepError};
use crate::integrations::types::{InboundMessage, MessageId, PhotoRef};
use crate::session::{CreatedDraft, Event, PublishFailure, PublishTarget};
use crate::timer::{self, Coalescer};

/// Album key for photos sent without a media group.
const LOOSE_PHOTOS: &str = "loose";

impl SessionActor {
    pub(super) async fn on_photo(&mut self, msg: &InboundMessage, photo: PhotoRef) -> StepResult {
        if self.session.login.is_active() {
            self.reply("Finish logging in first, or /cancel.").await;
            return Ok(());
        }
        if self.require_login().await.is_none() {
            return Ok(());
        }
        if self.session.bulk.is_some() {
            return self.bulk_photo(msg, photo).await;
        }
        if self.session.creating.is_some() {
            self.reply("I'm still working on your previous photos, one moment.")
                .await;
            return Ok(());
        }
        if self.session.draft.is_some() {
            self.reply("Finish the current listing first, or /cancel it.")
                .await;
            return Ok(());
        }

        let timers = &self.ctx.config.timers;
        let coalescer = Coalescer::new(timers.album_quiet(), timers.album_max_items);
        let key = msg
            .media_group_id
            .clone()
            .unwrap_or_else(|| LOOSE_PHOTOS.to_string());
        let superseded = coalescer.push(
            &mut self.session.album_buffer,
            key,
            photo,
            &self.session.mailbox,
            |generation| Event::AlbumFlush { generation },
        );
        if let Some(flushed) = superseded {
            self.start_creation(flushed.items).await;
        }
        Ok(())
    }

    pub(super) async fn on_album_flush(&mut self, generation: u64) -> StepResult {
        match Coalescer::take_if_current(&mut self.session.album_buffer, generation) {
            Some(flushed) => {
                if flushed.dropped > 0 {
                    self.reply(&format!(
                        "Only the first {} photos are used; {} were skipped.",
                        flushed.items.len(),
                        flushed.dropped
                    ))
                    .await;
                }
                self.start_creation(flushed.items).await;
            }
            None => tracing::debug!("Stale album flush (generation {}) ignored", generation),
        }
        Ok(())
    }

    /// Kick off the detached download → analyse → create round trip.
    async fn start_creation(&mut self, photos: Vec<PhotoRef>) {
        if photos.is_empty() {
            return;
        }
        if self.session.bulk.is_some() {
            tracing::debug!("Single-listing photos dropped, a bulk session is running");
            return;
        }
        if self.session.has_single_flow() {
            self.reply("I'm still working on your previous photos, one moment.")
                .await;
            return;
        }
        let Some(auth) = self.require_login().await else {
            return;
        };

        let request = timer::next_generation();
        self.session.creating = Some(request);
        self.reply(&format!("🔍 Analysing {} photo(s)…", photos.len()))
            .await;
        tasks::spawn_create_draft(
            self.ctx.clone(),
            self.session.mailbox.clone(),
            CreateRequest {
                user_id: self.session.user_id,
                request,
                auth,
                photos,
                template: self.stored_template(),
            },
        );
    }

    pub(super) async fn on_draft_created(&mut self, request: u64, created: CreatedDraft) -> StepResult {
        if self.session.creating != Some(request) {
            tracing::debug!(
                "Draft {} arrived for an abandoned creation; deleting it",
                created.remote.id
            );
            self.cleanup_remote(vec![created.remote.id]);
            return Ok(());
        }
        self.session.creating = None;

        let mut draft = Draft::new(
            created.remote,
            created.title,
            created.description,
            created.predictions,
            self.stored_postal_code(),
        );
        draft.image_count = created.image_count;
        self.session.draft = Some(draft);
        self.touch_draft_expiry();
        self.show_draft_prompt().await;
        Ok(())
    }

    pub(super) async fn on_draft_create_failed(&mut self, request: u64, error: &str) -> StepResult {
        if self.session.creating != Some(request) {
            tracing::debug!("Failure of an abandoned creation ignored: {}", error);
            return Ok(());
        }
        self.session.creating = None;
        self.reply("I couldn't create a listing from those photos. Please try again.")
            .await;
        Ok(())
    }

    pub(super) fn touch_draft_expiry(&mut self) {
        let after = self.ctx.config.timers.draft_expiry();
        if let Some(draft) = self.session.draft.as_mut() {
            draft
                .expiry
                .touch(after, &self.session.mailbox, |generation| Event::DraftExpired {
                    generation,
                });
        }
    }

    /// Ask for whatever the draft awaits. The ready summary is edited in
    /// place when an earlier one exists.
    async fn show_draft_prompt(&mut self) {
        let Some(draft) = self.session.draft.as_ref() else {
            return;
        };
        let Some((text, keyboard)) = render::draft_prompt(draft, &self.ctx.categories) else {
            return;
        };
        if *draft.state() == FlowState::ReadyToPublish {
            let previous = draft.confirmation_message_id;
            let sent = self.edit_or_send(previous, &text, Some(&keyboard)).await;
            if let Some(draft) = self.session.draft.as_mut() {
                draft.confirmation_message_id = sent.or(previous);
            }
        } else {
            self.reply_with(&text, Some(&keyboard)).await;
        }
    }

    /// Apply one answer to the draft and issue the next prompt. Input
    /// errors re-prompt; steps that no longer apply are ignored.
    pub(super) async fn draft_step<F>(&mut self, step: F)
    where
        F: FnOnce(&mut Draft) -> Result<(), StepError> + Send,
    {
        let Some(draft) = self.session.draft.as_mut() else {
            tracing::debug!("Draft answer without a draft ignored");
            return;
        };
        if draft.publishing {
            self.reply("Your listing is being published, one moment.")
                .await;
            return;
        }
        match step(draft) {
            Ok(()) => {
                self.touch_draft_expiry();
                self.show_draft_prompt().await;
            }
            Err(StepError::Input(e)) => {
                self.touch_draft_expiry();
                self.reply(&format!("{e}.")).await;
                self.show_draft_prompt().await;
            }
            Err(StepError::OutOfOrder) => {
                tracing::debug!("Answer for a step the draft is no longer on ignored");
            }
        }
    }

    pub(super) async fn single_text(&mut self, text: String) -> StepResult {
        let Some(state) = self.session.draft.as_ref().map(|d| d.state().clone()) else {
            return Ok(());
        };
        match state {
            FlowState::None => {}
            FlowState::AwaitingCategory => {
                self.reply("Pick one of the categories above, or /cancel.")
                    .await;
            }
            FlowState::AwaitingAttribute { .. } => {
                self.draft_step(|d| d.answer_attribute(&text).map(drop)).await;
            }
            FlowState::AwaitingPrice => {
                self.draft_step(|d| d.answer_price(&text).map(drop)).await;
            }
            FlowState::AwaitingShipping => {
                self.draft_step(|d| {
                    let yes = input::parse_yes_no(&text)?;
                    d.answer_shipping(yes).map(drop)
                })
                .await;
            }
            FlowState::AwaitingPackageSize => {
                self.draft_step(|d| d.answer_package_size(&text).map(drop))
                    .await;
            }
            FlowState::AwaitingPostalCode => {
                if let Ok(code) = input::validate_postal_code(&text) {
                    self.remember_postal_code(code);
                }
                self.draft_step(|d| d.answer_postal_code(&text).map(drop))
                    .await;
            }
            FlowState::ReadyToPublish => self.apply_edit_intent(&text).await?,
        }
        Ok(())
    }

    async fn apply_edit_intent(&mut self, text: &str) -> StepResult {
        let intent = self.ctx.analyzer.parse_edit_intent(text).await?;
        let Some(draft) = self.session.draft.as_mut() else {
            return Ok(());
        };
        match draft.apply_edit(&intent) {
            Ok(true) => {
                self.touch_draft_expiry();
                self.show_draft_prompt().await;
            }
            Ok(false) => {
                self.reply("I didn't catch that change. Try \"price 40\" or \"title Oak chair\".")
                    .await;
            }
            Err(StepError::Input(e)) => self.reply(&format!("{e}.")).await,
            Err(StepError::OutOfOrder) => {}
        }
        Ok(())
    }

    /// Category chosen from a keyboard: set it remotely, load the fields it
    /// needs, let the selector fill what it can.
    pub(super) async fn select_category(&mut self, category_id: &str) -> StepResult {
        let Some(draft) = self.session.draft.as_ref() else {
            tracing::debug!("Category choice without a draft ignored");
            return Ok(());
        };
        if *draft.state() != FlowState::AwaitingCategory || draft.publishing {
            tracing::debug!("Category choice in state {} ignored", draft.state().name());
            return Ok(());
        }
        let name = draft
            .predictions
            .iter()
            .find(|p| p.category_id == category_id)
            .map(|p| p.name.clone())
            .or_else(|| {
                let tree = &self.ctx.categories;
                tree.lookup(category_id)
                    .and_then(|id| tree.node(id))
                    .map(|n| n.name.clone())
            })
            .unwrap_or_else(|| category_id.to_string());
        let remote = draft.remote.clone();
        let title = draft.title.clone();
        let description = draft.description.clone();

        let Some(auth) = self.require_login().await else {
            return Ok(());
        };
        let etag = self
            .ctx
            .listing
            .set_category(&auth, &remote, category_id)
            .await?;
        if let Some(draft) = self.session.draft.as_mut() {
            draft.remote.etag = etag;
        }
        let fields = self
            .ctx
            .listing
            .get_field_options(&auth, category_id)
            .await?;
        let autofill = self
            .ctx
            .analyzer
            .select_attributes(&title, &description, &fields.fields)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!("Attribute selection failed, asking the user: {}", e);
                BTreeMap::new()
            });

        let category = SelectedCategory {
            id: category_id.to_string(),
            name,
        };
        self.draft_step(move |d| d.select_category(category, fields, &autofill).map(drop))
            .await;
        Ok(())
    }

    pub(super) async fn browse_categories(
        &mut self,
        node: Option<usize>,
        message_id: MessageId,
    ) -> StepResult {
        let awaiting = self
            .session
            .draft
            .as_ref()
            .is_some_and(|d| *d.state() == FlowState::AwaitingCategory);
        if !awaiting {
            return Ok(());
        }
        let tree = &self.ctx.categories;
        let node = match node {
            Some(index) => match tree.node_at(index) {
                Some(id) => Some(id),
                None => return Ok(()),
            },
            None => None,
        };
        let (text, keyboard) = render::browse_keyboard(tree, node);
        self.edit_or_send(Some(message_id), &text, Some(&keyboard))
            .await;
        Ok(())
    }

    pub(super) async fn answer_attribute_button(&mut self, field: &str, value: &str) -> StepResult {
        let current = self.session.draft.as_ref().is_some_and(|d| {
            matches!(d.state(), FlowState::AwaitingAttribute { field_id } if field_id == field)
        });
        if !current {
            tracing::debug!("Button for attribute '{}' no longer applies", field);
            return Ok(());
        }
        self.draft_step(|d| d.answer_attribute(value).map(drop)).await;
        Ok(())
    }

    /// Whether a button on `message_id` still refers to the live summary.
    fn is_current_confirmation(&self, message_id: MessageId) -> bool {
        self.session.draft.as_ref().is_some_and(|d| {
            *d.state() == FlowState::ReadyToPublish
                && !d.publishing
                && d.confirmation_message_id == Some(message_id)
        })
    }

    pub(super) async fn confirm_publish(&mut self, message_id: MessageId) -> StepResult {
        if !self.is_current_confirmation(message_id) {
            tracing::debug!("Stale confirmation on message {} ignored", message_id);
            return Ok(());
        }
        let Some(auth) = self.require_login().await else {
            return Ok(());
        };
        let Some(draft) = self.session.draft.as_mut() else {
            return Ok(());
        };
        let Some(delivery) = draft.delivery_options() else {
            return Ok(());
        };
        draft.publishing = true;
        draft.expiry.cancel();
        let request = PublishRequest {
            target: PublishTarget::Single,
            auth,
            remote: draft.remote.clone(),
            category_id: None,
            patch: draft.field_patch(),
            delivery: Some(delivery),
        };
        tasks::spawn_publish(self.ctx.clone(), self.session.mailbox.clone(), request);
        self.edit_or_send(Some(message_id), "📤 Publishing…", None)
            .await;
        Ok(())
    }

    pub(super) async fn on_single_published(
        &mut self,
        result: Result<String, PublishFailure>,
    ) -> StepResult {
        let publishing = self.session.draft.as_ref().is_some_and(|d| d.publishing);
        if !publishing {
            tracing::debug!("Publish result without a publishing draft ignored");
            return Ok(());
        }
        match result {
            Ok(listing_id) => {
                self.session.draft = None;
                self.reply(&format!("🎉 Published! Listing id: {listing_id}"))
                    .await;
            }
            Err(failure) => {
                if let Some(draft) = self.session.draft.as_mut() {
                    draft.publishing = false;
                    if let Some(etag) = failure.etag {
                        draft.remote.etag = etag;
                    }
                }
                let text = if failure.conflict {
                    "The draft was changed elsewhere, so it was not published. Please review and confirm again."
                } else {
                    "Publishing failed. Your draft is kept; you can try again."
                };
                self.reply(text).await;
                self.touch_draft_expiry();
                self.show_draft_prompt().await;
            }
        }
        Ok(())
    }

    pub(super) async fn cancel_from_button(&mut self, message_id: MessageId) -> StepResult {
        let Some(draft) = self.session.draft.as_ref() else {
            return Ok(());
        };
        let stale = draft
            .confirmation_message_id
            .is_some_and(|id| id != message_id);
        if stale || draft.publishing {
            tracing::debug!("Stale cancel on message {} ignored", message_id);
            return Ok(());
        }
        if let Some(draft) = self.session.draft.take() {
            self.discard_draft(draft);
        }
        self.edit_or_send(Some(message_id), "Listing cancelled.", None)
            .await;
        Ok(())
    }

    pub(super) async fn recategorize(&mut self, message_id: MessageId) -> StepResult {
        if !self.is_current_confirmation(message_id) {
            tracing::debug!("Stale category change on message {} ignored", message_id);
            return Ok(());
        }
        if let Some(draft) = self.session.draft.as_mut() {
            draft.reselect_category();
        }
        self.touch_draft_expiry();
        self.show_draft_prompt().await;
        Ok(())
    }

    pub(super) async fn on_draft_expired(&mut self, generation: u64) -> StepResult {
        let expired = self
            .session
            .draft
            .as_ref()
            .is_some_and(|d| d.expiry.is_current(generation) && !d.publishing);
        if !expired {
            tracing::debug!("Stale draft expiry (generation {}) ignored", generation);
            return Ok(());
        }
        if let Some(draft) = self.session.draft.take() {
            tracing::info!(
                "Draft {} of user {} expired",
                draft.remote.id,
                self.session.user_id
            );
            self.discard_draft(draft);
        }
        self.reply("Your draft expired after a while without activity and was discarded.")
            .await;
        Ok(())
    }

    /// Drop a draft and delete its remote copy in the background.
    pub(super) fn discard_draft(&self, draft: Draft) {
        if draft.publishing {
            tracing::warn!(
                "Draft {} dropped while publishing; the listing may still appear",
                draft.remote.id
            );
            return;
        }
        self.cleanup_remote(vec![draft.remote.id]);
    }

    pub(super) fn cleanup_remote(&self, draft_ids: Vec<String>) {
        let Some(auth) = self.credentials() else {
            tracing::warn!("Cannot delete {} remote draft(s) without credentials", draft_ids.len());
            return;
        };
        tasks::spawn_cleanup(
            self.ctx.clone(),
            self.session.mailbox.clone(),
            auth,
            draft_ids,
            false,
        );
    }
}
