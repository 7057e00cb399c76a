// src/session/mod.rs — Per-user session state and its registry
//
// A `Session` is owned by exactly one worker task. Only the auth slice and
// the `SessionView` snapshot are shared, each behind its own mutex.

pub mod event;
pub mod registry;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::Serialize;

use crate::actor::Mailbox;
use crate::auth::{self, LoginFlow, LoginState, SharedAuth};
use crate::bulk::{AnalysisStatus, BulkCounts, BulkSession, DraftId};
use crate::flow::{Draft, FlowState};
use crate::integrations::types::{ChatId, ListingSummary, MessageId, PhotoRef, UserId};
use crate::timer::CoalescingBuffer;

pub use event::{CreatedDraft, Event, PublishFailure, PublishTarget};
pub use registry::SessionRegistry;

/// Pages of the user's remote listings, keyed by page number.
#[derive(Debug, Default)]
pub struct ListingsCache {
    /// `cursors[n]` fetches page `n`; page 0 has no cursor.
    cursors: Vec<Option<String>>,
    pages: HashMap<usize, Vec<ListingSummary>>,
    pub message_id: Option<MessageId>,
}

impl ListingsCache {
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Cursor for page `n`, if that page is reachable.
    pub fn cursor(&self, page: usize) -> Option<Option<&str>> {
        if page == 0 {
            return Some(None);
        }
        self.cursors.get(page).map(|c| c.as_deref())
    }

    pub fn page(&self, page: usize) -> Option<&[ListingSummary]> {
        self.pages.get(&page).map(Vec::as_slice)
    }

    pub fn has_next(&self, page: usize) -> bool {
        self.cursors.get(page + 1).is_some_and(Option::is_some)
    }

    pub fn store(&mut self, page: usize, items: Vec<ListingSummary>, next: Option<String>) {
        if self.cursors.is_empty() {
            self.cursors.push(None);
        }
        if next.is_some() {
            if self.cursors.len() <= page + 1 {
                self.cursors.resize(page + 2, None);
            }
            self.cursors[page + 1] = next;
        }
        self.pages.insert(page, items);
    }
}

/// Read-only copy of a session's state, refreshed after every event.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionView {
    pub user_id: UserId,
    pub logged_in: bool,
    pub flow_state: Option<String>,
    pub creating: bool,
    pub login_state: String,
    pub bulk: Option<BulkView>,
    pub events_handled: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BulkView {
    pub total: usize,
    pub ready: usize,
    pub analyzing: usize,
    pub failed: usize,
    /// `(stable id, display index, status)` in display order.
    pub drafts: Vec<(DraftId, usize, String)>,
}

pub type SharedView = Arc<Mutex<SessionView>>;

pub struct Session {
    pub user_id: UserId,
    pub chat_id: ChatId,
    pub auth: SharedAuth,
    pub draft: Option<Draft>,
    pub bulk: Option<BulkSession>,
    pub login: LoginFlow,
    pub album_buffer: Option<CoalescingBuffer<String, PhotoRef>>,
    /// Pending draft-creation attempt; photos are refused while set.
    pub creating: Option<u64>,
    pub listings: ListingsCache,
    pub mailbox: Mailbox<Event>,
    view: SharedView,
    events_handled: u64,
}

impl Session {
    pub fn new(user_id: UserId, auth: SharedAuth, mailbox: Mailbox<Event>) -> Self {
        Self {
            user_id,
            // Private chats share the user's id until a message says otherwise.
            chat_id: user_id,
            auth,
            draft: None,
            bulk: None,
            login: LoginFlow::new(),
            album_buffer: None,
            creating: None,
            listings: ListingsCache::default(),
            mailbox,
            view: Arc::new(Mutex::new(SessionView {
                user_id,
                login_state: login_state_name(&LoginState::None).into(),
                ..SessionView::default()
            })),
            events_handled: 0,
        }
    }

    pub fn view_handle(&self) -> SharedView {
        self.view.clone()
    }

    pub fn is_logged_in(&self) -> bool {
        auth::lock(&self.auth).is_logged_in()
    }

    /// A single-listing draft or its creation is in progress.
    pub fn has_single_flow(&self) -> bool {
        self.draft.is_some() || self.creating.is_some()
    }

    pub fn flow_state(&self) -> Option<&FlowState> {
        self.draft.as_ref().map(Draft::state)
    }

    /// Publish the current state to the shared snapshot.
    pub fn refresh_view(&mut self) {
        self.events_handled += 1;
        let bulk = self.bulk.as_ref().map(|b| {
            let BulkCounts {
                total,
                ready,
                analyzing,
                failed,
                ..
            } = b.counts();
            BulkView {
                total,
                ready,
                analyzing,
                failed,
                drafts: b
                    .drafts()
                    .iter()
                    .map(|d| (d.id, d.index, status_name(d.status).to_string()))
                    .collect(),
            }
        });
        let view = SessionView {
            user_id: self.user_id,
            logged_in: self.is_logged_in(),
            flow_state: self.flow_state().map(|s| s.name().to_string()),
            creating: self.creating.is_some(),
            login_state: login_state_name(self.login.state()).into(),
            bulk,
            events_handled: self.events_handled,
        };
        *self.view.lock().unwrap_or_else(|e| e.into_inner()) = view;
    }
}

fn status_name(status: AnalysisStatus) -> &'static str {
    match status {
        AnalysisStatus::Pending => "pending",
        AnalysisStatus::Analyzing => "analyzing",
        AnalysisStatus::Done => "done",
        AnalysisStatus::Error => "error",
    }
}

fn login_state_name(state: &LoginState) -> &'static str {
    match state {
        LoginState::None => "none",
        LoginState::AwaitingEmail => "awaiting_email",
        LoginState::AwaitingEmailCode { .. } => "awaiting_email_code",
        LoginState::AwaitingSmsCode { .. } => "awaiting_sms_code",
    }
}
