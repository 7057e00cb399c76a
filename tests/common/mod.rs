// tests/common/mod.rs — Hand-written collaborators and a session harness
#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use listbot::bot::BotContext;
use listbot::flow::CategoryTree;
use listbot::infra::config::Config;
use listbot::infra::errors::{BotError, Result};
use listbot::infra::logger::LogContext;
use listbot::integrations::types::*;
use listbot::session::{SessionRegistry, SessionView};

pub const USER: UserId = 42;

pub fn credentials() -> Credentials {
    Credentials {
        access_token: "access".into(),
        refresh_token: "refresh".into(),
        expires_at: Utc::now() + chrono::Duration::hours(2),
        device_id: "device".into(),
    }
}

// ─── Chat transport ─────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MockTransport {
    next_id: AtomicI64,
    /// `(message id, text)` of every sent or edited message, in order.
    pub messages: Mutex<Vec<(MessageId, String)>>,
    /// Last keyboard sent with each message id.
    pub keyboards: Mutex<HashMap<MessageId, Keyboard>>,
}

impl MockTransport {
    pub fn texts(&self) -> Vec<String> {
        self.messages.lock().unwrap().iter().map(|(_, t)| t.clone()).collect()
    }

    pub fn last_text(&self) -> Option<String> {
        self.messages.lock().unwrap().last().map(|(_, t)| t.clone())
    }

    /// Id of the most recent message whose keyboard carries `data`.
    pub fn message_with_button(&self, data: &str) -> Option<MessageId> {
        let keyboards = self.keyboards.lock().unwrap();
        keyboards
            .iter()
            .filter(|(_, kb)| kb.rows.iter().flatten().any(|b| b.data == data))
            .map(|(id, _)| *id)
            .max()
    }
}

#[async_trait]
impl ChatTransport for MockTransport {
    async fn send_message(
        &self,
        _chat_id: ChatId,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<MessageId> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1000;
        self.messages.lock().unwrap().push((id, text.to_string()));
        if let Some(kb) = keyboard {
            self.keyboards.lock().unwrap().insert(id, kb.clone());
        }
        Ok(id)
    }

    async fn edit_message(
        &self,
        _chat_id: ChatId,
        message_id: MessageId,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<()> {
        self.messages.lock().unwrap().push((message_id, text.to_string()));
        let mut keyboards = self.keyboards.lock().unwrap();
        match keyboard {
            Some(kb) => keyboards.insert(message_id, kb.clone()),
            None => keyboards.remove(&message_id),
        };
        Ok(())
    }

    async fn answer_callback(&self, _callback_id: &str, _text: Option<&str>) -> Result<()> {
        Ok(())
    }

    async fn download_file(&self, file_id: &str) -> Result<Vec<u8>> {
        if file_id.starts_with("broken") {
            return Err(BotError::Transport(format!("no such file {file_id}")));
        }
        Ok(file_id.as_bytes().to_vec())
    }
}

// ─── Listing service ────────────────────────────────────────────────────────

pub struct MockListing {
    next_draft: AtomicU64,
    pub predictions: Vec<CategoryPrediction>,
    pub fields: HashMap<String, CategoryFields>,
    pub prices: Vec<f64>,
    pub created: Mutex<Vec<String>>,
    pub deleted: Mutex<Vec<String>>,
    pub published: Mutex<Vec<RemoteDraft>>,
    pub patches: Mutex<Vec<FieldPatch>>,
    /// Publishing fails with a version conflict while set.
    pub conflict_on_publish: Mutex<bool>,
    /// Every image upload is rejected while set.
    pub reject_uploads: Mutex<bool>,
}

impl Default for MockListing {
    fn default() -> Self {
        let mut fields = HashMap::new();
        fields.insert(
            "chairs".to_string(),
            CategoryFields {
                fields: Vec::new(),
                shipping_allowed: true,
                package_sizes: Vec::new(),
            },
        );
        fields.insert(
            "phones".to_string(),
            CategoryFields {
                fields: vec![FieldSpec {
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
                }],
                shipping_allowed: false,
                package_sizes: Vec::new(),
            },
        );
        Self {
            next_draft: AtomicU64::new(0),
            predictions: vec![
                CategoryPrediction {
                    category_id: "chairs".into(),
                    name: "Chairs".into(),
                    score: 0.9,
                },
                CategoryPrediction {
                    category_id: "phones".into(),
                    name: "Phones".into(),
                    score: 0.1,
                },
            ],
            fields,
            prices: vec![30.0, 40.0, 50.0],
            created: Mutex::new(Vec::new()),
            deleted: Mutex::new(Vec::new()),
            published: Mutex::new(Vec::new()),
            patches: Mutex::new(Vec::new()),
            conflict_on_publish: Mutex::new(false),
            reject_uploads: Mutex::new(false),
        }
    }
}

impl MockListing {
    pub fn created_count(&self) -> usize {
        self.created.lock().unwrap().len()
    }

    pub fn deleted_ids(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }

    pub fn published_count(&self) -> usize {
        self.published.lock().unwrap().len()
    }
}

fn bump(etag: &str) -> String {
    let n: u32 = etag.trim_start_matches('v').parse().unwrap_or(0);
    format!("v{}", n + 1)
}

#[async_trait]
impl ListingService for MockListing {
    async fn create_draft(
        &self,
        _auth: &Credentials,
        _title: &str,
        _description: &str,
    ) -> Result<RemoteDraft> {
        let id = format!("draft-{}", self.next_draft.fetch_add(1, Ordering::SeqCst) + 1);
        self.created.lock().unwrap().push(id.clone());
        Ok(RemoteDraft {
            id,
            etag: "v1".into(),
        })
    }

    async fn upload_image(&self, _auth: &Credentials, draft_id: &str, _image: Vec<u8>) -> Result<()> {
        if *self.reject_uploads.lock().unwrap() {
            return Err(BotError::Transport(format!("upload to {draft_id} rejected")));
        }
        Ok(())
    }

    async fn patch_fields(
        &self,
        _auth: &Credentials,
        draft: &RemoteDraft,
        patch: &FieldPatch,
    ) -> Result<String> {
        self.patches.lock().unwrap().push(patch.clone());
        Ok(bump(&draft.etag))
    }

    async fn set_category(
        &self,
        _auth: &Credentials,
        draft: &RemoteDraft,
        _category_id: &str,
    ) -> Result<String> {
        Ok(bump(&draft.etag))
    }

    async fn get_field_options(
        &self,
        _auth: &Credentials,
        category_id: &str,
    ) -> Result<CategoryFields> {
        Ok(self.fields.get(category_id).cloned().unwrap_or_default())
    }

    async fn get_category_predictions(
        &self,
        _auth: &Credentials,
        _draft_id: &str,
    ) -> Result<Vec<CategoryPrediction>> {
        Ok(self.predictions.clone())
    }

    async fn set_delivery_options(
        &self,
        _auth: &Credentials,
        draft: &RemoteDraft,
        _options: &DeliveryOptions,
    ) -> Result<String> {
        Ok(bump(&draft.etag))
    }

    async fn publish(&self, _auth: &Credentials, draft: &RemoteDraft) -> Result<String> {
        if *self.conflict_on_publish.lock().unwrap() {
            return Err(BotError::VersionConflict { op: "publish" });
        }
        self.published.lock().unwrap().push(draft.clone());
        Ok(format!("listing-{}", draft.id))
    }

    async fn delete_draft(&self, _auth: &Credentials, draft_id: &str) -> Result<()> {
        self.deleted.lock().unwrap().push(draft_id.to_string());
        Ok(())
    }

    async fn list_summaries(
        &self,
        _auth: &Credentials,
        cursor: Option<&str>,
    ) -> Result<Page<ListingSummary>> {
        let (first, next) = match cursor {
            None => (1, Some("p2".to_string())),
            Some(_) => (3, None),
        };
        Ok(Page {
            items: (first..first + 2)
                .map(|i| ListingSummary {
                    id: format!("l{i}"),
                    title: format!("Listing {i}"),
                    price: 10.0 * i as f64,
                    status: "published".into(),
                })
                .collect(),
            next_cursor: next,
        })
    }

    async fn search_prices(
        &self,
        _auth: &Credentials,
        _query: &str,
        _category_id: Option<&str>,
    ) -> Result<Vec<f64>> {
        Ok(self.prices.clone())
    }

    async fn get_categories(&self) -> Result<Vec<CategoryEntry>> {
        Ok(Vec::new())
    }
}

// ─── Auth service ───────────────────────────────────────────────────────────

/// Email code "111111" logs in directly, "222222" asks for SMS code
/// "333333". Anything else is rejected.
#[derive(Default)]
pub struct MockAuth {
    pub codes_requested: Mutex<Vec<String>>,
}

#[async_trait]
impl AuthService for MockAuth {
    async fn request_email_code(&self, email: &str, _device_id: &str) -> Result<()> {
        self.codes_requested.lock().unwrap().push(email.to_string());
        Ok(())
    }

    async fn verify_email_code(&self, _email: &str, code: &str, _device_id: &str) -> Result<LoginStep> {
        match code {
            "111111" => Ok(LoginStep::Done(credentials())),
            "222222" => Ok(LoginStep::SmsRequired),
            _ => Err(BotError::Auth("bad code".into())),
        }
    }

    async fn verify_sms_code(&self, _email: &str, code: &str, _device_id: &str) -> Result<Credentials> {
        match code {
            "333333" => Ok(credentials()),
            _ => Err(BotError::Auth("bad sms code".into())),
        }
    }

    async fn refresh(&self, credentials: &Credentials) -> Result<Credentials> {
        Ok(Credentials {
            access_token: format!("{}-refreshed", credentials.access_token),
            expires_at: Utc::now() + chrono::Duration::hours(2),
            ..credentials.clone()
        })
    }
}

// ─── Vision analyzer ────────────────────────────────────────────────────────

pub struct MockAnalyzer {
    /// Each analysis sleeps this long first (virtual time in paused tests).
    pub delay: Duration,
}

impl Default for MockAnalyzer {
    fn default() -> Self {
        Self {
            delay: Duration::ZERO,
        }
    }
}

#[async_trait]
impl VisionAnalyzer for MockAnalyzer {
    async fn analyze_images(&self, images: &[Vec<u8>]) -> Result<ImageAnalysis> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(ImageAnalysis {
            title: "Oak chair".into(),
            description: format!("A sturdy oak chair ({} photo(s)).", images.len()),
            usage: TokenUsage {
                input_tokens: 100,
                output_tokens: 20,
            },
        })
    }

    async fn select_category(
        &self,
        _title: &str,
        _description: &str,
        _candidates: &[CategoryPrediction],
    ) -> Result<Option<String>> {
        Ok(None)
    }

    async fn select_attributes(
        &self,
        _title: &str,
        _description: &str,
        _fields: &[FieldSpec],
    ) -> Result<BTreeMap<String, String>> {
        Ok(BTreeMap::new())
    }

    async fn parse_edit_intent(&self, text: &str) -> Result<EditIntent> {
        Ok(match text.split_once(' ') {
            Some(("price", v)) => v.parse().map(EditIntent::Price).unwrap_or(EditIntent::Unknown),
            Some(("title", v)) => EditIntent::Title(v.to_string()),
            _ => EditIntent::Unknown,
        })
    }
}

// ─── Session store ──────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryStore {
    pub credentials: Mutex<HashMap<UserId, Credentials>>,
    pub templates: Mutex<HashMap<UserId, String>>,
    pub postal_codes: Mutex<HashMap<UserId, String>>,
    pub installations: Mutex<HashMap<UserId, String>>,
    pub allowed: Vec<UserId>,
}

impl MemoryStore {
    pub fn logged_in(user_id: UserId) -> Self {
        let store = Self::default();
        store.credentials.lock().unwrap().insert(user_id, credentials());
        store
    }
}

impl SessionStore for MemoryStore {
    fn get_credentials(&self, user_id: UserId) -> Result<Option<Credentials>> {
        Ok(self.credentials.lock().unwrap().get(&user_id).cloned())
    }

    fn save_credentials(&self, user_id: UserId, credentials: Option<Credentials>) -> Result<()> {
        let mut map = self.credentials.lock().unwrap();
        match credentials {
            Some(c) => map.insert(user_id, c),
            None => map.remove(&user_id),
        };
        Ok(())
    }

    fn get_template(&self, user_id: UserId) -> Result<Option<String>> {
        Ok(self.templates.lock().unwrap().get(&user_id).cloned())
    }

    fn set_template(&self, user_id: UserId, template: Option<String>) -> Result<()> {
        let mut map = self.templates.lock().unwrap();
        match template {
            Some(t) => map.insert(user_id, t),
            None => map.remove(&user_id),
        };
        Ok(())
    }

    fn get_postal_code(&self, user_id: UserId) -> Result<Option<String>> {
        Ok(self.postal_codes.lock().unwrap().get(&user_id).cloned())
    }

    fn set_postal_code(&self, user_id: UserId, postal_code: String) -> Result<()> {
        self.postal_codes.lock().unwrap().insert(user_id, postal_code);
        Ok(())
    }

    fn get_installation_id(&self, user_id: UserId) -> Result<Option<String>> {
        Ok(self.installations.lock().unwrap().get(&user_id).cloned())
    }

    fn set_installation_id(&self, user_id: UserId, installation_id: String) -> Result<()> {
        self.installations.lock().unwrap().insert(user_id, installation_id);
        Ok(())
    }

    fn is_user_allowed(&self, user_id: UserId) -> bool {
        self.allowed.is_empty() || self.allowed.contains(&user_id)
    }
}

// ─── Harness ────────────────────────────────────────────────────────────────

pub struct Harness {
    pub registry: Arc<SessionRegistry>,
    pub transport: Arc<MockTransport>,
    pub listing: Arc<MockListing>,
    pub auth: Arc<MockAuth>,
    pub store: Arc<MemoryStore>,
    next_message: AtomicI64,
}

impl Harness {
    pub fn new(store: MemoryStore) -> Self {
        Self::with(store, MockListing::default(), MockAnalyzer::default(), Config::default())
    }

    pub fn with(store: MemoryStore, listing: MockListing, analyzer: MockAnalyzer, config: Config) -> Self {
        let transport = Arc::new(MockTransport::default());
        let listing = Arc::new(listing);
        let auth = Arc::new(MockAuth::default());
        let store = Arc::new(store);
        let ctx = Arc::new(BotContext {
            transport: transport.clone(),
            listing: listing.clone(),
            analyzer: Arc::new(analyzer),
            auth: auth.clone(),
            store: Some(store.clone()),
            categories: Arc::new(CategoryTree::default()),
            config,
            log: LogContext::disabled(),
        });
        Self {
            registry: Arc::new(SessionRegistry::new(ctx)),
            transport,
            listing,
            auth,
            store,
            next_message: AtomicI64::new(1),
        }
    }

    fn message_id(&self) -> MessageId {
        self.next_message.fetch_add(1, Ordering::SeqCst)
    }

    pub async fn text(&self, text: &str) {
        let msg = InboundMessage::text(USER, USER, self.message_id(), text);
        self.registry
            .dispatch_and_wait(Update::Message(msg))
            .await
            .unwrap();
    }

    pub async fn photo(&self, file_id: &str, album: Option<&str>) {
        let msg = InboundMessage::photo(USER, USER, self.message_id(), file_id, album);
        self.registry
            .dispatch_and_wait(Update::Message(msg))
            .await
            .unwrap();
    }

    pub async fn press(&self, message_id: MessageId, data: &str) {
        let cb = CallbackQuery {
            id: format!("cb-{}", self.message_id()),
            chat_id: USER,
            user_id: USER,
            message_id,
            data: data.to_string(),
        };
        self.registry
            .dispatch_and_wait(Update::Callback(cb))
            .await
            .unwrap();
    }

    pub fn view(&self) -> SessionView {
        self.registry.view(USER).unwrap_or_default()
    }

    pub fn flow_state(&self) -> Option<String> {
        self.view().flow_state
    }

    /// Let timers and detached tasks run until `done` holds.
    pub async fn settle(&self, mut done: impl FnMut(&Self) -> bool) -> bool {
        for _ in 0..200 {
            if done(self) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        done(self)
    }
}
