// src/bot/tasks.rs — Detached work that reports back through the mailbox
//
// Nothing here touches session state. Every task ends by enqueueing one
// event (or nothing, when it was cancelled and its draft is gone).

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::BotContext;
use crate::actor::Mailbox;
use crate::bulk::{estimate_price, AnalysisOutcome, DraftId};
use crate::flow::SelectedCategory;
use crate::infra::errors::{BotError, Result};
use crate::integrations::types::{
    CategoryPrediction, ChatTransport, Credentials, DeliveryOptions, FieldPatch, ListingService,
    PhotoRef, RemoteDraft, UserId, VisionAnalyzer,
};
use crate::session::{CreatedDraft, Event, PublishFailure, PublishTarget};

/// Download every photo, keeping whatever succeeded.
pub async fn download_photos(
    transport: &dyn ChatTransport,
    photos: &[PhotoRef],
) -> Result<Vec<Vec<u8>>> {
    let mut images = Vec::with_capacity(photos.len());
    for photo in photos {
        match transport.download_file(&photo.file_id).await {
            Ok(bytes) => images.push(bytes),
            Err(e) => tracing::warn!("Photo {} could not be downloaded: {}", photo.file_id, e),
        }
    }
    if images.is_empty() {
        return Err(BotError::BatchFailed {
            op: "download",
            count: photos.len(),
        });
    }
    Ok(images)
}

/// Upload images to a remote draft. Returns how many made it; only a total
/// failure is an error.
pub async fn upload_images(
    listing: &dyn ListingService,
    auth: &Credentials,
    draft_id: &str,
    images: Vec<Vec<u8>>,
) -> Result<usize> {
    let count = images.len();
    let mut uploaded = 0;
    for (i, image) in images.into_iter().enumerate() {
        match listing.upload_image(auth, draft_id, image).await {
            Ok(()) => uploaded += 1,
            Err(e) => tracing::warn!("Image {} of draft {} failed to upload: {}", i + 1, draft_id, e),
        }
    }
    if uploaded == 0 && count > 0 {
        return Err(BotError::BatchFailed { op: "upload", count });
    }
    Ok(uploaded)
}

fn with_template(description: String, template: Option<&str>) -> String {
    match template.map(str::trim).filter(|t| !t.is_empty()) {
        Some(t) => format!("{description}\n\n{t}"),
        None => description,
    }
}

/// Remote delete that treats "already gone" as success.
pub async fn delete_remote(listing: &dyn ListingService, auth: &Credentials, draft_id: &str) -> bool {
    match listing.delete_draft(auth, draft_id).await {
        Ok(()) => true,
        Err(e) if e.is_not_found() => {
            tracing::warn!("Draft {} was already deleted", draft_id);
            true
        }
        Err(e) => {
            tracing::warn!("Failed to delete draft {}: {}", draft_id, e);
            false
        }
    }
}

async fn report(mailbox: &Mailbox<Event>, event: Event) {
    let kind = event.kind();
    if mailbox.enqueue(event).await.is_err() {
        tracing::debug!("Session closed before '{}' could be reported", kind);
    }
}

// ─── Single listing ─────────────────────────────────────────────────────────

pub struct CreateRequest {
    pub user_id: UserId,
    pub request: u64,
    pub auth: Credentials,
    pub photos: Vec<PhotoRef>,
    pub template: Option<String>,
}

pub fn spawn_create_draft(ctx: Arc<BotContext>, mailbox: Mailbox<Event>, req: CreateRequest) {
    tokio::spawn(async move {
        let request = req.request;
        let event = match create_draft(&ctx, req).await {
            Ok(draft) => Event::DraftCreated {
                request,
                draft: Box::new(draft),
            },
            Err(e) => {
                tracing::error!("Draft creation failed: {}", e);
                Event::DraftCreateFailed {
                    request,
                    error: e.to_string(),
                }
            }
        };
        report(&mailbox, event).await;
    });
}

async fn create_draft(ctx: &BotContext, req: CreateRequest) -> Result<CreatedDraft> {
    let images = download_photos(ctx.transport.as_ref(), &req.photos).await?;
    let analysis = ctx.analyzer.analyze_images(&images).await?;
    ctx.log
        .record_usage(req.user_id, "analyze_images", &analysis.usage);

    let description = with_template(analysis.description, req.template.as_deref());
    let remote = ctx
        .listing
        .create_draft(&req.auth, &analysis.title, &description)
        .await?;
    let image_count = match upload_images(ctx.listing.as_ref(), &req.auth, &remote.id, images).await {
        Ok(count) => count,
        Err(e) => {
            delete_remote(ctx.listing.as_ref(), &req.auth, &remote.id).await;
            return Err(e);
        }
    };

    let predictions = ctx
        .listing
        .get_category_predictions(&req.auth, &remote.id)
        .await
        .unwrap_or_else(|e| {
            tracing::warn!("No category predictions for draft {}: {}", remote.id, e);
            Vec::new()
        });

    tracing::info!(
        "Draft {} created for user {} ({} image(s))",
        remote.id,
        req.user_id,
        image_count
    );
    Ok(CreatedDraft {
        remote,
        title: analysis.title,
        description,
        predictions,
        image_count,
    })
}

// ─── Bulk analysis ──────────────────────────────────────────────────────────

pub struct AnalysisRequest {
    pub user_id: UserId,
    pub draft_id: DraftId,
    pub auth: Credentials,
    pub photos: Vec<PhotoRef>,
    pub template: Option<String>,
    pub cancel: CancellationToken,
}

pub fn spawn_bulk_analysis(ctx: Arc<BotContext>, mailbox: Mailbox<Event>, req: AnalysisRequest) {
    tokio::spawn(async move {
        let draft_id = req.draft_id;
        let event = match analyze_bulk_draft(&ctx, req).await {
            Ok(outcome) => Event::BulkAnalysisComplete {
                draft_id,
                outcome: Box::new(outcome),
            },
            Err(BotError::Cancelled) => {
                tracing::debug!("Analysis of bulk draft {} cancelled", draft_id);
                return;
            }
            Err(e) => Event::BulkAnalysisError {
                draft_id,
                error: e.to_string(),
            },
        };
        report(&mailbox, event).await;
    });
}

fn checkpoint(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        Err(BotError::Cancelled)
    } else {
        Ok(())
    }
}

async fn analyze_bulk_draft(ctx: &BotContext, req: AnalysisRequest) -> Result<AnalysisOutcome> {
    let AnalysisRequest {
        user_id,
        draft_id,
        auth,
        photos,
        template,
        cancel,
    } = req;

    let images = download_photos(ctx.transport.as_ref(), &photos).await?;
    checkpoint(&cancel)?;
    let analysis = ctx.analyzer.analyze_images(&images).await?;
    ctx.log.record_usage(user_id, "analyze_images", &analysis.usage);
    checkpoint(&cancel)?;

    let description = with_template(analysis.description, template.as_deref());
    let remote = ctx
        .listing
        .create_draft(&auth, &analysis.title, &description)
        .await?;

    // From here on a cancellation must not leave the remote draft behind.
    let rest = async {
        checkpoint(&cancel)?;
        upload_images(ctx.listing.as_ref(), &auth, &remote.id, images).await?;
        checkpoint(&cancel)?;
        let predictions = ctx
            .listing
            .get_category_predictions(&auth, &remote.id)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!("No category predictions for bulk draft {}: {}", draft_id, e);
                Vec::new()
            });
        let category = choose_category(
            ctx.analyzer.as_ref(),
            &analysis.title,
            &description,
            &predictions,
        )
        .await;
        checkpoint(&cancel)?;

        let estimated_price = match ctx
            .listing
            .search_prices(&auth, &analysis.title, category.as_ref().map(|c| c.id.as_str()))
            .await
        {
            Ok(prices) => estimate_price(&prices, ctx.config.bulk.min_comparables),
            Err(e) => {
                tracing::warn!("Price search failed for bulk draft {}: {}", draft_id, e);
                None
            }
        };
        checkpoint(&cancel)?;
        Ok::<_, BotError>((predictions, category, estimated_price))
    }
    .await;

    match rest {
        Ok((predictions, category, estimated_price)) => Ok(AnalysisOutcome {
            remote,
            title: analysis.title,
            description,
            predictions,
            category,
            estimated_price,
        }),
        Err(e) => {
            delete_remote(ctx.listing.as_ref(), &auth, &remote.id).await;
            Err(e)
        }
    }
}

/// The selector's pick when it names one of the candidates, else the top
/// prediction.
async fn choose_category(
    analyzer: &dyn VisionAnalyzer,
    title: &str,
    description: &str,
    predictions: &[CategoryPrediction],
) -> Option<SelectedCategory> {
    let picked = match analyzer.select_category(title, description, predictions).await {
        Ok(picked) => picked,
        Err(e) => {
            tracing::warn!("Category selection failed, using top prediction: {}", e);
            None
        }
    };
    let chosen = picked
        .and_then(|id| predictions.iter().find(|p| p.category_id == id))
        .or_else(|| predictions.first())?;
    Some(SelectedCategory {
        id: chosen.category_id.clone(),
        name: chosen.name.clone(),
    })
}

// ─── Publishing and cleanup ─────────────────────────────────────────────────

pub struct PublishRequest {
    pub target: PublishTarget,
    pub auth: Credentials,
    pub remote: RemoteDraft,
    /// Set remotely before patching (bulk drafts choose it locally).
    pub category_id: Option<String>,
    pub patch: FieldPatch,
    pub delivery: Option<DeliveryOptions>,
}

pub fn spawn_publish(ctx: Arc<BotContext>, mailbox: Mailbox<Event>, req: PublishRequest) {
    tokio::spawn(async move {
        let target = req.target;
        let mut etag = None;
        let result = publish(ctx.listing.as_ref(), &req, &mut etag)
            .await
            .map_err(|e| PublishFailure {
                conflict: matches!(e, BotError::VersionConflict { .. }),
                message: e.to_string(),
                etag,
            });
        match &result {
            Ok(listing_id) => tracing::info!("Published listing {}", listing_id),
            Err(f) => tracing::error!("Publishing draft {} failed: {}", req.remote.id, f.message),
        }
        report(&mailbox, Event::PublishComplete { target, result }).await;
    });
}

/// Push the collected fields and publish. `etag` tracks the latest version
/// token so a failed attempt can be retried from it.
async fn publish(
    listing: &dyn ListingService,
    req: &PublishRequest,
    etag: &mut Option<String>,
) -> Result<String> {
    let mut remote = req.remote.clone();
    if let Some(category_id) = &req.category_id {
        remote.etag = listing.set_category(&req.auth, &remote, category_id).await?;
        *etag = Some(remote.etag.clone());
    }
    remote.etag = listing.patch_fields(&req.auth, &remote, &req.patch).await?;
    *etag = Some(remote.etag.clone());
    if let Some(delivery) = &req.delivery {
        remote.etag = listing
            .set_delivery_options(&req.auth, &remote, delivery)
            .await?;
        *etag = Some(remote.etag.clone());
    }
    listing.publish(&req.auth, &remote).await
}

/// Delete remote drafts in the background. With `report_back` the session
/// receives a `BulkCleanupDone`.
pub fn spawn_cleanup(
    ctx: Arc<BotContext>,
    mailbox: Mailbox<Event>,
    auth: Credentials,
    draft_ids: Vec<String>,
    report_back: bool,
) {
    if draft_ids.is_empty() && !report_back {
        return;
    }
    tokio::spawn(async move {
        let mut deleted = 0;
        let mut failed = 0;
        for id in &draft_ids {
            if delete_remote(ctx.listing.as_ref(), &auth, id).await {
                deleted += 1;
            } else {
                failed += 1;
            }
        }
        tracing::info!("Cleanup removed {} remote draft(s), {} failed", deleted, failed);
        if report_back {
            report(&mailbox, Event::BulkCleanupDone { deleted, failed }).await;
        }
    });
}
