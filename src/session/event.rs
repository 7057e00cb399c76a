// src/session/event.rs — Everything a session worker can be asked to do

use crate::bulk::{AnalysisOutcome, DraftId};
use crate::integrations::types::{
    CallbackQuery, CategoryPrediction, InboundMessage, RemoteDraft, Update,
};

/// Mailbox message. Transport updates, timer firings and background task
/// results all arrive through this one closed type.
#[derive(Debug)]
pub enum Event {
    Message(InboundMessage),
    Callback(CallbackQuery),

    /// Quiet period of the single-listing album buffer elapsed.
    AlbumFlush { generation: u64 },
    DraftExpired { generation: u64 },
    LoginExpired { generation: u64 },

    /// Result of the detached draft-creation round trip. `request` names the
    /// creation attempt; a cancelled attempt no longer matches.
    DraftCreated {
        request: u64,
        draft: Box<CreatedDraft>,
    },
    DraftCreateFailed { request: u64, error: String },

    BulkAlbumFlush { generation: u64 },
    BulkAnalysisComplete {
        draft_id: DraftId,
        outcome: Box<AnalysisOutcome>,
    },
    BulkAnalysisError { draft_id: DraftId, error: String },
    BulkStatusDebounce { generation: u64 },
    BulkCleanupDone { deleted: usize, failed: usize },

    PublishComplete {
        target: PublishTarget,
        result: Result<String, PublishFailure>,
    },
}

impl Event {
    pub fn kind(&self) -> &'static str {
        match self {
            Event::Message(_) => "message",
            Event::Callback(_) => "callback",
            Event::AlbumFlush { .. } => "album_flush",
            Event::DraftExpired { .. } => "draft_expired",
            Event::LoginExpired { .. } => "login_expired",
            Event::DraftCreated { .. } => "draft_created",
            Event::DraftCreateFailed { .. } => "draft_create_failed",
            Event::BulkAlbumFlush { .. } => "bulk_album_flush",
            Event::BulkAnalysisComplete { .. } => "bulk_analysis_complete",
            Event::BulkAnalysisError { .. } => "bulk_analysis_error",
            Event::BulkStatusDebounce { .. } => "bulk_status_debounce",
            Event::BulkCleanupDone { .. } => "bulk_cleanup_done",
            Event::PublishComplete { .. } => "publish_complete",
        }
    }
}

impl From<Update> for Event {
    fn from(update: Update) -> Self {
        match update {
            Update::Message(m) => Event::Message(m),
            Update::Callback(c) => Event::Callback(c),
        }
    }
}

/// A remote draft built from the user's photos, ready for category choice.
#[derive(Debug, Clone, PartialEq)]
pub struct CreatedDraft {
    pub remote: RemoteDraft,
    pub title: String,
    pub description: String,
    pub predictions: Vec<CategoryPrediction>,
    pub image_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishTarget {
    Single,
    Bulk(DraftId),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PublishFailure {
    pub message: String,
    /// Version token after the last successful remote update, so the next
    /// attempt does not start from a stale one.
    pub etag: Option<String>,
    pub conflict: bool,
}
