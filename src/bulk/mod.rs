// src/bulk/mod.rs — Bulk session: many drafts analysed concurrently
//
// Each draft carries a stable id that background tasks use to report back.
// Display indices are recomputed after every deletion and must never leave
// the worker.

pub mod pricing;

use tokio_util::sync::CancellationToken;

use crate::flow::input;
use crate::flow::SelectedCategory;
use crate::infra::errors::InputError;
use crate::integrations::types::{CategoryPrediction, MessageId, PhotoRef, RemoteDraft};
use crate::timer::CoalescingBuffer;

pub use pricing::estimate_price;

pub type DraftId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisStatus {
    Pending,
    Analyzing,
    Done,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeType {
    Sell,
    Giveaway,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditField {
    Title,
    Description,
    Price,
    Category,
    Shipping,
}

impl EditField {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "title" => Some(EditField::Title),
            "desc" | "description" => Some(EditField::Description),
            "price" => Some(EditField::Price),
            "cat" | "category" => Some(EditField::Category),
            "ship" | "shipping" => Some(EditField::Shipping),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EditField::Title => "title",
            EditField::Description => "desc",
            EditField::Price => "price",
            EditField::Category => "cat",
            EditField::Shipping => "ship",
        }
    }
}

/// The one `(draft, field)` pair currently waiting for a typed answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EditTarget {
    pub draft_id: DraftId,
    pub field: EditField,
}

/// What a finished analysis task hands back to the worker.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisOutcome {
    pub remote: RemoteDraft,
    pub title: String,
    pub description: String,
    pub predictions: Vec<CategoryPrediction>,
    pub category: Option<SelectedCategory>,
    pub estimated_price: Option<f64>,
}

#[derive(Debug)]
pub struct BulkDraft {
    pub id: DraftId,
    pub index: usize,
    pub status: AnalysisStatus,
    pub cancel: CancellationToken,
    pub photos: Vec<PhotoRef>,
    pub title: String,
    pub description: String,
    pub price: f64,
    pub trade_type: TradeType,
    pub category: Option<SelectedCategory>,
    pub predictions: Vec<CategoryPrediction>,
    pub shipping: bool,
    pub remote: Option<RemoteDraft>,
    pub estimated_price: Option<f64>,
    pub error: Option<String>,
    pub publishing: bool,
}

impl BulkDraft {
    fn new(id: DraftId, index: usize, photos: Vec<PhotoRef>) -> Self {
        Self {
            id,
            index,
            status: AnalysisStatus::Pending,
            cancel: CancellationToken::new(),
            photos,
            title: String::new(),
            description: String::new(),
            price: 0.0,
            trade_type: TradeType::Sell,
            category: None,
            predictions: Vec::new(),
            shipping: true,
            remote: None,
            estimated_price: None,
            error: None,
            publishing: false,
        }
    }

    /// Complete enough to publish.
    pub fn is_ready(&self) -> bool {
        self.status == AnalysisStatus::Done
            && !self.title.trim().is_empty()
            && self.category.is_some()
            && (self.trade_type == TradeType::Giveaway || self.price > 0.0)
    }

    fn set_price(&mut self, price: f64) {
        self.price = price;
        self.trade_type = if price == 0.0 {
            TradeType::Giveaway
        } else {
            TradeType::Sell
        };
    }
}

/// Per-status counts for the status message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BulkCounts {
    pub total: usize,
    pub pending: usize,
    pub analyzing: usize,
    pub done: usize,
    pub failed: usize,
    pub ready: usize,
}

#[derive(Debug, Default)]
pub struct BulkSession {
    drafts: Vec<BulkDraft>,
    next_id: DraftId,
    editing: Option<EditTarget>,
    pub status_buffer: Option<CoalescingBuffer<(), ()>>,
    pub album_buffer: Option<CoalescingBuffer<String, PhotoRef>>,
    pub status_message_id: Option<MessageId>,
}

impl BulkSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn drafts(&self) -> &[BulkDraft] {
        &self.drafts
    }

    pub fn len(&self) -> usize {
        self.drafts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drafts.is_empty()
    }

    pub fn get(&self, id: DraftId) -> Option<&BulkDraft> {
        self.drafts.iter().find(|d| d.id == id)
    }

    pub fn get_mut(&mut self, id: DraftId) -> Option<&mut BulkDraft> {
        self.drafts.iter_mut().find(|d| d.id == id)
    }

    /// Append a draft for a photo group. Ids are never reused.
    pub fn add_draft(&mut self, photos: Vec<PhotoRef>) -> DraftId {
        let id = self.next_id;
        self.next_id += 1;
        let index = self.drafts.len();
        self.drafts.push(BulkDraft::new(id, index, photos));
        id
    }

    /// Mark a pending draft as analysing and hand out its cancel token.
    pub fn start_analysis(&mut self, id: DraftId) -> Option<CancellationToken> {
        let draft = self.get_mut(id)?;
        if draft.status != AnalysisStatus::Pending {
            return None;
        }
        draft.status = AnalysisStatus::Analyzing;
        Some(draft.cancel.clone())
    }

    /// Store an analysis result. `false` if the draft is gone.
    pub fn complete_analysis(&mut self, id: DraftId, outcome: AnalysisOutcome) -> bool {
        let Some(draft) = self.get_mut(id) else {
            return false;
        };
        draft.status = AnalysisStatus::Done;
        draft.remote = Some(outcome.remote);
        draft.title = outcome.title;
        draft.description = outcome.description;
        draft.predictions = outcome.predictions;
        draft.category = outcome.category;
        draft.estimated_price = outcome.estimated_price;
        if let Some(price) = outcome.estimated_price.filter(|p| *p > 0.0) {
            draft.set_price(price);
        }
        draft.error = None;
        true
    }

    /// Record a failed analysis. `false` if the draft is gone.
    pub fn fail_analysis(&mut self, id: DraftId, error: String) -> bool {
        let Some(draft) = self.get_mut(id) else {
            return false;
        };
        draft.status = AnalysisStatus::Error;
        draft.error = Some(error);
        true
    }

    /// Cancel the draft's task, remove it and renumber the rest from 0.
    /// A draft that is being published stays put.
    pub fn delete(&mut self, id: DraftId) -> Option<BulkDraft> {
        let pos = self
            .drafts
            .iter()
            .position(|d| d.id == id && !d.publishing)?;
        let removed = self.drafts.remove(pos);
        removed.cancel.cancel();
        self.renumber();
        if self.editing.is_some_and(|t| t.draft_id == id) {
            self.editing = None;
        }
        Some(removed)
    }

    fn renumber(&mut self) {
        for (index, draft) in self.drafts.iter_mut().enumerate() {
            draft.index = index;
        }
    }

    pub fn editing(&self) -> Option<EditTarget> {
        self.editing
    }

    /// Enter the editing sub-mode for one field of one draft. Only analysed
    /// drafts can be edited; the analysis result would overwrite earlier edits.
    pub fn begin_edit(&mut self, draft_id: DraftId, field: EditField) -> bool {
        let editable = self
            .get(draft_id)
            .is_some_and(|d| d.status == AnalysisStatus::Done && !d.publishing);
        if !editable {
            return false;
        }
        self.editing = Some(EditTarget { draft_id, field });
        true
    }

    pub fn clear_edit(&mut self) {
        self.editing = None;
    }

    /// Apply typed text to the field being edited.
    ///
    /// `Ok(None)` when nothing is being edited or the draft has gone away.
    /// Invalid input keeps the editing mode so the user can retry.
    pub fn apply_text_edit(&mut self, text: &str) -> Result<Option<DraftId>, InputError> {
        let Some(target) = self.editing else {
            return Ok(None);
        };
        let Some(draft) = self.get_mut(target.draft_id) else {
            self.editing = None;
            return Ok(None);
        };
        match target.field {
            EditField::Title => draft.title = input::non_empty(text)?,
            EditField::Description => draft.description = input::non_empty(text)?,
            EditField::Price => draft.set_price(input::parse_price(text)?),
            EditField::Shipping => draft.shipping = input::parse_yes_no(text)?,
            EditField::Category => {
                return Err(InputError::Choice {
                    field: "category".into(),
                    value: text.trim().to_string(),
                })
            }
        }
        self.editing = None;
        Ok(Some(target.draft_id))
    }

    /// Category chosen from the prediction keyboard.
    pub fn set_category(&mut self, draft_id: DraftId, category: SelectedCategory) -> bool {
        let Some(draft) = self.get_mut(draft_id) else {
            return false;
        };
        draft.category = Some(category);
        if self
            .editing
            .is_some_and(|t| t.draft_id == draft_id && t.field == EditField::Category)
        {
            self.editing = None;
        }
        true
    }

    pub fn ready_ids(&self) -> Vec<DraftId> {
        self.drafts
            .iter()
            .filter(|d| d.is_ready() && !d.publishing)
            .map(|d| d.id)
            .collect()
    }

    /// Remove a draft after it was published; its task already finished.
    pub fn remove_published(&mut self, id: DraftId) -> Option<BulkDraft> {
        let pos = self.drafts.iter().position(|d| d.id == id)?;
        let removed = self.drafts.remove(pos);
        self.renumber();
        Some(removed)
    }

    pub fn counts(&self) -> BulkCounts {
        let mut counts = BulkCounts {
            total: self.drafts.len(),
            ..BulkCounts::default()
        };
        for draft in &self.drafts {
            match draft.status {
                AnalysisStatus::Pending => counts.pending += 1,
                AnalysisStatus::Analyzing => counts.analyzing += 1,
                AnalysisStatus::Done => counts.done += 1,
                AnalysisStatus::Error => counts.failed += 1,
            }
            if draft.is_ready() {
                counts.ready += 1;
            }
        }
        counts
    }

    /// Cancel every task and empty the session. Returns remote drafts that
    /// still need deleting; drafts being published keep theirs.
    pub fn cancel_all(&mut self) -> Vec<RemoteDraft> {
        self.editing = None;
        self.album_buffer = None;
        self.status_buffer = None;
        self.drafts
            .drain(..)
            .filter_map(|draft| {
                draft.cancel.cancel();
                if draft.publishing {
                    None
                } else {
                    draft.remote
                }
            })
            .collect()
    }
}
