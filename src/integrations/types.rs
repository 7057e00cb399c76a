// src/integrations/types.rs — Collaborator traits and the values they exchange
//
// The actor core only talks to the outside world through these traits.
// Wire formats live in the adapters (telegram.rs, marketplace.rs, vision.rs,
// store.rs).

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::infra::errors::Result;

pub type UserId = i64;
pub type ChatId = i64;
pub type MessageId = i64;

// ─── Chat transport ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct PhotoRef {
    pub file_id: String,
}

/// A chat message as delivered by the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub message_id: MessageId,
    pub chat_id: ChatId,
    pub user_id: UserId,
    pub text: Option<String>,
    /// Largest size of the attached photo, if any.
    pub photo: Option<PhotoRef>,
    /// Transport-level album id shared by photos sent together.
    pub media_group_id: Option<String>,
}

impl InboundMessage {
    pub fn text(chat_id: ChatId, user_id: UserId, message_id: MessageId, text: &str) -> Self {
        Self {
            message_id,
            chat_id,
            user_id,
            text: Some(text.to_string()),
            photo: None,
            media_group_id: None,
        }
    }

    pub fn photo(
        chat_id: ChatId,
        user_id: UserId,
        message_id: MessageId,
        file_id: &str,
        media_group_id: Option<&str>,
    ) -> Self {
        Self {
            message_id,
            chat_id,
            user_id,
            text: None,
            photo: Some(PhotoRef {
                file_id: file_id.to_string(),
            }),
            media_group_id: media_group_id.map(String::from),
        }
    }
}

/// A button press on an inline keyboard.
#[derive(Debug, Clone, PartialEq)]
pub struct CallbackQuery {
    pub id: String,
    pub chat_id: ChatId,
    pub user_id: UserId,
    /// Message the pressed keyboard is attached to.
    pub message_id: MessageId,
    pub data: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Update {
    Message(InboundMessage),
    Callback(CallbackQuery),
}

impl Update {
    pub fn user_id(&self) -> UserId {
        match self {
            Update::Message(m) => m.user_id,
            Update::Callback(c) => c.user_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Button {
    pub label: String,
    pub data: String,
}

/// Inline keyboard, rows of buttons.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Keyboard {
    pub rows: Vec<Vec<Button>>,
}

impl Keyboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: append a row.
    pub fn row<I, L, D>(mut self, buttons: I) -> Self
    where
        I: IntoIterator<Item = (L, D)>,
        L: Into<String>,
        D: Into<String>,
    {
        let row: Vec<Button> = buttons
            .into_iter()
            .map(|(label, data)| Button {
                label: label.into(),
                data: data.into(),
            })
            .collect();
        if !row.is_empty() {
            self.rows.push(row);
        }
        self
    }

    /// Builder: append a one-button row.
    pub fn button(self, label: impl Into<String>, data: impl Into<String>) -> Self {
        self.row([(label.into(), data.into())])
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Outbound side of the chat platform.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send_message(
        &self,
        chat_id: ChatId,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<MessageId>;

    async fn edit_message(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<()>;

    async fn answer_callback(&self, callback_id: &str, text: Option<&str>) -> Result<()>;

    async fn download_file(&self, file_id: &str) -> Result<Vec<u8>>;
}

// ─── Marketplace ────────────────────────────────────────────────────────────

/// Marketplace credentials for one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credentials {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
    pub device_id: String,
}

impl Credentials {
    /// Whether the access token expires within `margin` from now.
    pub fn expires_within(&self, margin: chrono::Duration) -> bool {
        Utc::now() + margin >= self.expires_at
    }
}

/// A draft created on the marketplace plus its current version token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteDraft {
    pub id: String,
    pub etag: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CategoryPrediction {
    pub category_id: String,
    pub name: String,
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldOption {
    pub id: String,
    pub label: String,
}

/// A category-specific attribute the listing must carry.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub id: String,
    pub label: String,
    pub required: bool,
    /// Empty means free text.
    pub options: Vec<FieldOption>,
}

impl FieldSpec {
    /// Resolve a user answer to the stored value (option id or free text).
    pub fn resolve(&self, answer: &str) -> Option<String> {
        let answer = answer.trim();
        if answer.is_empty() {
            return None;
        }
        if self.options.is_empty() {
            return Some(answer.to_string());
        }
        self.options
            .iter()
            .find(|o| o.id == answer || o.label.eq_ignore_ascii_case(answer))
            .map(|o| o.id.clone())
    }

    pub fn option_label(&self, value: &str) -> Option<&str> {
        self.options
            .iter()
            .find(|o| o.id == value)
            .map(|o| o.label.as_str())
    }
}

/// What a category requires before a listing can be published.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CategoryFields {
    pub fields: Vec<FieldSpec>,
    pub shipping_allowed: bool,
    pub package_sizes: Vec<FieldOption>,
}

impl CategoryFields {
    pub fn field(&self, id: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.id == id)
    }
}

/// Partial update of a remote draft. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FieldPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub giveaway: Option<bool>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeliveryOptions {
    pub shipping: bool,
    pub package_size: Option<String>,
    pub postal_code: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListingSummary {
    pub id: String,
    pub title: String,
    pub price: f64,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<String>,
}

/// Flat category record; assembled into a `CategoryTree`.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryEntry {
    pub id: String,
    pub name: String,
    pub parent_id: Option<String>,
}

/// Ad/listing service. Version-token mismatches come back as
/// `BotError::VersionConflict` and are not retried.
#[async_trait]
pub trait ListingService: Send + Sync {
    async fn create_draft(
        &self,
        auth: &Credentials,
        title: &str,
        description: &str,
    ) -> Result<RemoteDraft>;

    async fn upload_image(&self, auth: &Credentials, draft_id: &str, image: Vec<u8>)
        -> Result<()>;

    /// Returns the new version token.
    async fn patch_fields(
        &self,
        auth: &Credentials,
        draft: &RemoteDraft,
        patch: &FieldPatch,
    ) -> Result<String>;

    async fn set_category(
        &self,
        auth: &Credentials,
        draft: &RemoteDraft,
        category_id: &str,
    ) -> Result<String>;

    async fn get_field_options(
        &self,
        auth: &Credentials,
        category_id: &str,
    ) -> Result<CategoryFields>;

    async fn get_category_predictions(
        &self,
        auth: &Credentials,
        draft_id: &str,
    ) -> Result<Vec<CategoryPrediction>>;

    async fn set_delivery_options(
        &self,
        auth: &Credentials,
        draft: &RemoteDraft,
        options: &DeliveryOptions,
    ) -> Result<String>;

    /// Returns the id of the published listing.
    async fn publish(&self, auth: &Credentials, draft: &RemoteDraft) -> Result<String>;

    async fn delete_draft(&self, auth: &Credentials, draft_id: &str) -> Result<()>;

    async fn list_summaries(
        &self,
        auth: &Credentials,
        cursor: Option<&str>,
    ) -> Result<Page<ListingSummary>>;

    /// Asking prices of comparable live listings.
    async fn search_prices(
        &self,
        auth: &Credentials,
        query: &str,
        category_id: Option<&str>,
    ) -> Result<Vec<f64>>;

    async fn get_categories(&self) -> Result<Vec<CategoryEntry>>;
}

/// Result of the marketplace's email-code verification.
#[derive(Debug, Clone, PartialEq)]
pub enum LoginStep {
    Done(Credentials),
    SmsRequired,
}

#[async_trait]
pub trait AuthService: Send + Sync {
    async fn request_email_code(&self, email: &str, device_id: &str) -> Result<()>;

    async fn verify_email_code(&self, email: &str, code: &str, device_id: &str)
        -> Result<LoginStep>;

    async fn verify_sms_code(&self, email: &str, code: &str, device_id: &str)
        -> Result<Credentials>;

    async fn refresh(&self, credentials: &Credentials) -> Result<Credentials>;
}

// ─── Vision / LLM ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageAnalysis {
    pub title: String,
    pub description: String,
    pub usage: TokenUsage,
}

/// A free-text change request for a ready listing.
#[derive(Debug, Clone, PartialEq)]
pub enum EditIntent {
    Title(String),
    Description(String),
    Price(f64),
    Unknown,
}

#[async_trait]
pub trait VisionAnalyzer: Send + Sync {
    async fn analyze_images(&self, images: &[Vec<u8>]) -> Result<ImageAnalysis>;

    /// Pick one of the candidates, or `None` when unsure.
    async fn select_category(
        &self,
        title: &str,
        description: &str,
        candidates: &[CategoryPrediction],
    ) -> Result<Option<String>>;

    /// Fill whatever fields can be inferred. Keys are field ids.
    async fn select_attributes(
        &self,
        title: &str,
        description: &str,
        fields: &[FieldSpec],
    ) -> Result<BTreeMap<String, String>>;

    async fn parse_edit_intent(&self, text: &str) -> Result<EditIntent>;
}

// ─── Persistence ────────────────────────────────────────────────────────────

/// Synchronous key-value persistence. Callers hold it as
/// `Option<Arc<dyn SessionStore>>`; `None` disables the features it backs.
#[cfg_attr(test, mockall::automock)]
pub trait SessionStore: Send + Sync {
    fn get_credentials(&self, user_id: UserId) -> Result<Option<Credentials>>;
    /// `None` forgets the stored credentials.
    fn save_credentials(&self, user_id: UserId, credentials: Option<Credentials>) -> Result<()>;

    fn get_template(&self, user_id: UserId) -> Result<Option<String>>;
    fn set_template(&self, user_id: UserId, template: Option<String>) -> Result<()>;

    fn get_postal_code(&self, user_id: UserId) -> Result<Option<String>>;
    fn set_postal_code(&self, user_id: UserId, postal_code: String) -> Result<()>;

    fn get_installation_id(&self, user_id: UserId) -> Result<Option<String>>;
    fn set_installation_id(&self, user_id: UserId, installation_id: String) -> Result<()>;

    fn is_user_allowed(&self, user_id: UserId) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn condition_field() -> FieldSpec {
        FieldSpec {
            id: "condition".into(),
            label: "Condition".into(),
            required: true,
            options: vec![
                FieldOption {
                    id: "new".into(),
                    label: "New".into(),
                },
                FieldOption {
                    id: "used".into(),
                    label: "Used".into(),
                },
            ],
        }
    }

    #[test]
    fn test_field_resolves_id_and_label() {
        let field = condition_field();
        assert_eq!(field.resolve("used"), Some("used".into()));
        assert_eq!(field.resolve("NEW"), Some("new".into()));
        assert_eq!(field.resolve("broken"), None);
        assert_eq!(field.option_label("new"), Some("New"));
    }

    #[test]
    fn test_free_text_field_accepts_anything_non_empty() {
        let field = FieldSpec {
            id: "brand".into(),
            label: "Brand".into(),
            required: false,
            options: vec![],
        };
        assert_eq!(field.resolve("  Ikea "), Some("Ikea".into()));
        assert_eq!(field.resolve("   "), None);
    }

    #[test]
    fn test_keyboard_builder_skips_empty_rows() {
        let kb = Keyboard::new()
            .button("Yes", "ship:yes")
            .row(Vec::<(String, String)>::new())
            .row([("A", "a"), ("B", "b")]);
        assert_eq!(kb.rows.len(), 2);
        assert_eq!(kb.rows[1][1].data, "b");
    }

    #[test]
    fn test_credentials_expiry_window() {
        let creds = Credentials {
            access_token: "a".into(),
            refresh_token: "r".into(),
            expires_at: Utc::now() + chrono::Duration::minutes(5),
            device_id: "d".into(),
        };
        assert!(creds.expires_within(chrono::Duration::minutes(10)));
        assert!(!creds.expires_within(chrono::Duration::minutes(1)));
    }
}
