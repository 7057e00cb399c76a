// src/bot/bulk.rs — Bulk mode: one draft per album, analysed in parallel

use super::commands::BulkAction;
use super::render;
use super::tasks::{self, AnalysisRequest, PublishRequest};
use super::{SessionActor, StepResult};
use crate::bulk::{AnalysisOutcome, BulkSession, DraftId, EditField, TradeType};
use crate::flow::SelectedCategory;
use crate::integrations::types::{DeliveryOptions, FieldPatch, InboundMessage, PhotoRef};
use crate::session::{Event, PublishFailure, PublishTarget};
use crate::timer::Coalescer;

impl SessionActor {
    pub(super) async fn start_bulk(&mut self) -> StepResult {
        if self.session.has_single_flow() || self.session.album_buffer.is_some() {
            self.reply("Finish or /cancel the current listing before starting a bulk session.")
                .await;
            return Ok(());
        }
        if self.session.bulk.is_some() {
            self.reply("A bulk session is already running.").await;
            return Ok(());
        }
        if self.require_login().await.is_none() {
            return Ok(());
        }
        self.session.bulk = Some(BulkSession::new());
        tracing::info!("Bulk session started for user {}", self.session.user_id);
        self.reply(&format!(
            "📚 Bulk mode. Send up to {} items; photos sent together as an album become one listing.",
            self.ctx.config.bulk.max_drafts
        ))
        .await;
        self.render_bulk_status().await;
        Ok(())
    }

    pub(super) async fn bulk_photo(&mut self, msg: &InboundMessage, photo: PhotoRef) -> StepResult {
        let timers = &self.ctx.config.timers;
        let coalescer = Coalescer::new(timers.album_quiet(), timers.album_max_items);
        // Without an album every photo is its own item.
        let key = msg
            .media_group_id
            .clone()
            .unwrap_or_else(|| format!("photo:{}", msg.message_id));
        let Some(bulk) = self.session.bulk.as_mut() else {
            return Ok(());
        };
        let superseded = coalescer.push(
            &mut bulk.album_buffer,
            key,
            photo,
            &self.session.mailbox,
            |generation| Event::BulkAlbumFlush { generation },
        );
        if let Some(flushed) = superseded {
            self.add_bulk_item(flushed.items).await;
        }
        Ok(())
    }

    pub(super) async fn on_bulk_album_flush(&mut self, generation: u64) -> StepResult {
        let flushed = self
            .session
            .bulk
            .as_mut()
            .and_then(|b| Coalescer::take_if_current(&mut b.album_buffer, generation));
        match flushed {
            Some(flushed) => self.add_bulk_item(flushed.items).await,
            None => tracing::debug!("Stale bulk album flush (generation {}) ignored", generation),
        }
        Ok(())
    }

    /// Register one item and start its analysis task.
    async fn add_bulk_item(&mut self, photos: Vec<PhotoRef>) {
        if photos.is_empty() {
            return;
        }
        let max = self.ctx.config.bulk.max_drafts;
        let full = self.session.bulk.as_ref().is_some_and(|b| b.len() >= max);
        if full {
            self.reply(&format!("A bulk session holds at most {max} items; those photos were skipped."))
                .await;
            return;
        }
        let Some(auth) = self.require_login().await else {
            return;
        };
        let template = self.stored_template();
        let Some(bulk) = self.session.bulk.as_mut() else {
            return;
        };
        let draft_id = bulk.add_draft(photos.clone());
        let Some(cancel) = bulk.start_analysis(draft_id) else {
            return;
        };
        tasks::spawn_bulk_analysis(
            self.ctx.clone(),
            self.session.mailbox.clone(),
            AnalysisRequest {
                user_id: self.session.user_id,
                draft_id,
                auth,
                photos,
                template,
                cancel,
            },
        );
        self.schedule_bulk_status();
    }

    /// Ask for a status re-render once things go quiet.
    pub(super) fn schedule_bulk_status(&mut self) {
        let coalescer = Coalescer::debouncer(self.ctx.config.timers.status_debounce());
        if let Some(bulk) = self.session.bulk.as_mut() {
            coalescer.push(
                &mut bulk.status_buffer,
                (),
                (),
                &self.session.mailbox,
                |generation| Event::BulkStatusDebounce { generation },
            );
        }
    }

    pub(super) async fn on_bulk_status_debounce(&mut self, generation: u64) -> StepResult {
        let current = self
            .session
            .bulk
            .as_mut()
            .and_then(|b| Coalescer::take_if_current(&mut b.status_buffer, generation))
            .is_some();
        if current {
            self.render_bulk_status().await;
        } else {
            tracing::debug!("Stale status refresh (generation {}) ignored", generation);
        }
        Ok(())
    }

    async fn render_bulk_status(&mut self) {
        let Some(bulk) = self.session.bulk.as_ref() else {
            return;
        };
        let (text, keyboard) = render::bulk_status(bulk, &self.ctx.categories);
        let previous = bulk.status_message_id;
        let sent = self.edit_or_send(previous, &text, Some(&keyboard)).await;
        if let Some(bulk) = self.session.bulk.as_mut() {
            bulk.status_message_id = sent.or(previous);
        }
    }

    pub(super) async fn on_bulk_analysis_complete(
        &mut self,
        draft_id: DraftId,
        outcome: AnalysisOutcome,
    ) -> StepResult {
        let remote_id = outcome.remote.id.clone();
        let stored = self
            .session
            .bulk
            .as_mut()
            .is_some_and(|b| b.complete_analysis(draft_id, outcome));
        if !stored {
            // Deleted while the task ran; its remote draft is orphaned.
            tracing::debug!("Analysis result for removed bulk draft {} discarded", draft_id);
            self.cleanup_remote(vec![remote_id]);
            return Ok(());
        }
        self.schedule_bulk_status();
        Ok(())
    }

    pub(super) async fn on_bulk_analysis_error(&mut self, draft_id: DraftId, error: String) -> StepResult {
        tracing::warn!("Analysis of bulk draft {} failed: {}", draft_id, error);
        let stored = self
            .session
            .bulk
            .as_mut()
            .is_some_and(|b| b.fail_analysis(draft_id, "analysis failed".into()));
        if stored {
            self.schedule_bulk_status();
        } else {
            tracing::debug!("Analysis error for removed bulk draft {} discarded", draft_id);
        }
        Ok(())
    }

    pub(super) async fn on_bulk_action(&mut self, action: BulkAction) -> StepResult {
        if self.session.bulk.is_none() {
            tracing::debug!("Bulk action without a bulk session ignored");
            return Ok(());
        }
        match action {
            BulkAction::Delete(id) => {
                let publishing = self
                    .session
                    .bulk
                    .as_ref()
                    .and_then(|b| b.get(id))
                    .is_some_and(|d| d.publishing);
                if publishing {
                    self.reply("That item is being published; it can't be deleted now.")
                        .await;
                    return Ok(());
                }
                let removed = self.session.bulk.as_mut().and_then(|b| b.delete(id));
                if let Some(draft) = removed {
                    if let Some(remote) = draft.remote {
                        self.cleanup_remote(vec![remote.id]);
                    }
                    self.schedule_bulk_status();
                }
            }
            BulkAction::Edit(id, field) => self.begin_bulk_edit(id, field).await,
            BulkAction::Category(id, category_id) => {
                let category = self.bulk_category(id, &category_id);
                let updated = self
                    .session
                    .bulk
                    .as_mut()
                    .is_some_and(|b| b.set_category(id, category));
                if updated {
                    self.schedule_bulk_status();
                }
            }
            BulkAction::Publish(id) => self.publish_bulk(vec![id]).await,
            BulkAction::PublishAll => {
                let ids = self
                    .session
                    .bulk
                    .as_ref()
                    .map(BulkSession::ready_ids)
                    .unwrap_or_default();
                if ids.is_empty() {
                    self.reply("No item is ready to publish yet.").await;
                } else {
                    self.publish_bulk(ids).await;
                }
            }
            BulkAction::Cancel => {
                self.cancel_bulk();
                self.reply("Bulk session cancelled.").await;
            }
        }
        Ok(())
    }

    fn bulk_category(&self, draft_id: DraftId, category_id: &str) -> SelectedCategory {
        let from_predictions = self
            .session
            .bulk
            .as_ref()
            .and_then(|b| b.get(draft_id))
            .and_then(|d| d.predictions.iter().find(|p| p.category_id == category_id))
            .map(|p| p.name.clone());
        let tree = &self.ctx.categories;
        let name = from_predictions
            .or_else(|| {
                tree.lookup(category_id)
                    .and_then(|id| tree.node(id))
                    .map(|n| n.name.clone())
            })
            .unwrap_or_else(|| category_id.to_string());
        SelectedCategory {
            id: category_id.to_string(),
            name,
        }
    }

    async fn begin_bulk_edit(&mut self, draft_id: DraftId, field: EditField) {
        let Some(bulk) = self.session.bulk.as_mut() else {
            return;
        };
        if !bulk.begin_edit(draft_id, field) {
            tracing::debug!("Edit of bulk draft {} ignored, not editable now", draft_id);
            return;
        }
        let Some(draft) = bulk.get(draft_id) else {
            return;
        };
        if field == EditField::Category {
            let (text, keyboard) = render::bulk_category_prompt(draft, &self.ctx.categories);
            self.reply_with(&text, Some(&keyboard)).await;
        } else {
            let text = render::bulk_edit_prompt(draft, field);
            self.reply(&text).await;
        }
    }

    pub(super) async fn bulk_text(&mut self, text: &str) -> StepResult {
        let Some(bulk) = self.session.bulk.as_mut() else {
            return Ok(());
        };
        let editing_category = bulk
            .editing()
            .filter(|t| t.field == EditField::Category)
            .map(|t| t.draft_id);
        if let Some(draft_id) = editing_category {
            // A typed category id works as well as a button.
            let category_id = text.trim().to_string();
            if self.ctx.categories.lookup(&category_id).is_none() {
                self.reply("Unknown category id; pick one of the buttons.").await;
                return Ok(());
            }
            let category = self.bulk_category(draft_id, &category_id);
            if let Some(bulk) = self.session.bulk.as_mut() {
                bulk.set_category(draft_id, category);
            }
            self.schedule_bulk_status();
            return Ok(());
        }

        match bulk.apply_text_edit(text) {
            Ok(Some(draft_id)) => {
                tracing::debug!("Bulk draft {} edited", draft_id);
                self.schedule_bulk_status();
            }
            Ok(None) => {
                self.reply("Send photos to add items, or use the buttons on the status message.")
                    .await;
            }
            Err(e) => self.reply(&format!("{e}.")).await,
        }
        Ok(())
    }

    async fn publish_bulk(&mut self, ids: Vec<DraftId>) {
        let Some(auth) = self.require_login().await else {
            return;
        };
        let Some(postal_code) = self.stored_postal_code() else {
            self.reply("Set a default postal code with /postal <code> before publishing.")
                .await;
            return;
        };
        let mut started = 0;
        for id in ids {
            let Some(draft) = self.session.bulk.as_mut().and_then(|b| b.get_mut(id)) else {
                continue;
            };
            if !draft.is_ready() || draft.publishing {
                continue;
            }
            let Some(remote) = draft.remote.clone() else {
                continue;
            };
            draft.publishing = true;
            let giveaway = draft.trade_type == TradeType::Giveaway;
            let request = PublishRequest {
                target: PublishTarget::Bulk(id),
                auth: auth.clone(),
                remote,
                category_id: draft.category.as_ref().map(|c| c.id.clone()),
                patch: FieldPatch {
                    title: Some(draft.title.clone()),
                    description: Some(draft.description.clone()),
                    price: Some(if giveaway { 0.0 } else { draft.price }),
                    giveaway: Some(giveaway),
                    ..FieldPatch::default()
                },
                delivery: Some(DeliveryOptions {
                    shipping: draft.shipping,
                    package_size: None,
                    postal_code: postal_code.clone(),
                }),
            };
            tasks::spawn_publish(self.ctx.clone(), self.session.mailbox.clone(), request);
            started += 1;
        }
        if started == 0 {
            self.reply("That item is not ready to publish yet.").await;
        }
        self.schedule_bulk_status();
    }

    pub(super) async fn on_bulk_published(
        &mut self,
        draft_id: DraftId,
        result: Result<String, PublishFailure>,
    ) -> StepResult {
        let Some(bulk) = self.session.bulk.as_mut() else {
            tracing::debug!("Bulk publish result after the session ended ignored");
            return Ok(());
        };
        let title = match result {
            Ok(listing_id) => {
                let Some(draft) = bulk.remove_published(draft_id) else {
                    return Ok(());
                };
                tracing::info!("Bulk draft {} published as {}", draft_id, listing_id);
                Ok(draft.title)
            }
            Err(failure) => {
                let Some(draft) = bulk.get_mut(draft_id) else {
                    return Ok(());
                };
                draft.publishing = false;
                if let (Some(remote), Some(etag)) = (draft.remote.as_mut(), failure.etag) {
                    remote.etag = etag;
                }
                Err(draft.title.clone())
            }
        };
        let finished = bulk.is_empty();

        match title {
            Ok(title) => self.reply(&format!("🎉 Published \"{title}\"")).await,
            Err(title) => {
                self.reply(&format!("Publishing \"{title}\" failed; it is kept so you can retry."))
                    .await
            }
        }
        if finished {
            self.session.bulk = None;
            self.reply("All items are published. Bulk session finished.")
                .await;
        } else {
            self.schedule_bulk_status();
        }
        Ok(())
    }

    /// Cancel every task, forget the session, delete remote drafts in the
    /// background.
    pub(super) fn cancel_bulk(&mut self) {
        let Some(mut bulk) = self.session.bulk.take() else {
            return;
        };
        let remotes: Vec<String> = bulk.cancel_all().into_iter().map(|r| r.id).collect();
        tracing::info!(
            "Bulk session of user {} cancelled ({} remote draft(s) to delete)",
            self.session.user_id,
            remotes.len()
        );
        let Some(auth) = self.credentials() else {
            return;
        };
        tasks::spawn_cleanup(
            self.ctx.clone(),
            self.session.mailbox.clone(),
            auth,
            remotes,
            true,
        );
    }

    pub(super) async fn on_bulk_cleanup_done(&mut self, deleted: usize, failed: usize) -> StepResult {
        tracing::debug!("Bulk cleanup: {} deleted, {} failed", deleted, failed);
        if failed > 0 {
            self.reply(&format!(
                "{failed} draft(s) could not be removed from the marketplace; delete them there if they show up."
            ))
            .await;
        }
        Ok(())
    }
}
