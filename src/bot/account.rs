// src/bot/account.rs — Login, logout, per-user preferences and listings

use super::render;
use super::{SessionActor, StepResult};
use crate::auth::{self, LoginState};
use crate::flow::input;
use crate::infra::errors::BotError;
use crate::integrations::types::{Credentials, LoginStep};
use crate::session::Event;

impl SessionActor {
    pub(super) async fn start_login(&mut self) {
        if self.session.is_logged_in() {
            self.reply("You are already logged in. Use /logout first to switch accounts.")
                .await;
            return;
        }
        self.session.login.begin();
        self.touch_login_expiry();
        self.reply("What is the email address of your marketplace account?")
            .await;
    }

    pub(super) async fn login_text(&mut self, text: &str) -> StepResult {
        let device_id = auth::lock(&self.session.auth).device_id().to_string();
        match self.session.login.state().clone() {
            LoginState::None => Ok(()),
            LoginState::AwaitingEmail => {
                let email = match input::validate_email(text) {
                    Ok(email) => email,
                    Err(e) => {
                        self.reply(&format!("{e}. Try again or /cancel.")).await;
                        return Ok(());
                    }
                };
                self.ctx.auth.request_email_code(&email, &device_id).await?;
                self.session.login.email_sent(email.clone());
                self.touch_login_expiry();
                self.reply(&format!("I sent a code to {email}. Send it here."))
                    .await;
                Ok(())
            }
            LoginState::AwaitingEmailCode { email } => {
                let code = text.trim();
                match self.ctx.auth.verify_email_code(&email, code, &device_id).await {
                    Ok(LoginStep::Done(credentials)) => self.finish_login(credentials).await,
                    Ok(LoginStep::SmsRequired) => {
                        self.session.login.sms_required();
                        self.touch_login_expiry();
                        self.reply("The marketplace sent an SMS code to your phone. Send it here.")
                            .await;
                    }
                    Err(BotError::Auth(reason)) => self.code_rejected(&reason).await,
                    Err(e) => return Err(e),
                }
                Ok(())
            }
            LoginState::AwaitingSmsCode { email } => {
                let code = text.trim();
                match self.ctx.auth.verify_sms_code(&email, code, &device_id).await {
                    Ok(credentials) => self.finish_login(credentials).await,
                    Err(BotError::Auth(reason)) => self.code_rejected(&reason).await,
                    Err(e) => return Err(e),
                }
                Ok(())
            }
        }
    }

    async fn code_rejected(&mut self, reason: &str) {
        tracing::info!("Login code rejected for user {}: {}", self.session.user_id, reason);
        self.touch_login_expiry();
        self.reply("That code was not accepted. Check it and send it again, or /cancel.")
            .await;
    }

    async fn finish_login(&mut self, credentials: Credentials) {
        auth::lock(&self.session.auth).set_credentials(credentials.clone());
        self.session.login.reset();
        if let Some(store) = &self.ctx.store {
            if let Err(e) = store.save_credentials(self.session.user_id, Some(credentials)) {
                tracing::warn!("Could not persist login of user {}: {}", self.session.user_id, e);
            }
        }
        tracing::info!("User {} logged in", self.session.user_id);
        self.reply("✅ Logged in. Send me photos to create a listing.")
            .await;
    }

    fn touch_login_expiry(&mut self) {
        let after = self.ctx.config.timers.login_expiry();
        self.session
            .login
            .expiry
            .touch(after, &self.session.mailbox, |generation| Event::LoginExpired {
                generation,
            });
    }

    pub(super) async fn on_login_expired(&mut self, generation: u64) -> StepResult {
        let login = &self.session.login;
        if !login.is_active() || !login.expiry.is_current(generation) {
            tracing::debug!("Stale login expiry (generation {}) ignored", generation);
            return Ok(());
        }
        self.session.login.reset();
        self.reply("The login timed out. Send /login to start again.")
            .await;
        Ok(())
    }

    pub(super) async fn logout(&mut self) {
        self.session.login.reset();
        let was_logged_in = {
            let mut state = auth::lock(&self.session.auth);
            let was = state.is_logged_in();
            state.clear();
            was
        };
        if let Some(store) = &self.ctx.store {
            if let Err(e) = store.save_credentials(self.session.user_id, None) {
                tracing::warn!("Could not forget login of user {}: {}", self.session.user_id, e);
            }
        }
        self.session.listings.clear();
        let text = if was_logged_in {
            "Logged out."
        } else {
            "You were not logged in."
        };
        self.reply(text).await;
    }

    pub(super) fn stored_template(&self) -> Option<String> {
        let store = self.ctx.store.as_ref()?;
        match store.get_template(self.session.user_id) {
            Ok(template) => template.filter(|t| !t.trim().is_empty()),
            Err(e) => {
                tracing::warn!("Could not read template of user {}: {}", self.session.user_id, e);
                None
            }
        }
    }

    pub(super) fn stored_postal_code(&self) -> Option<String> {
        let store = self.ctx.store.as_ref()?;
        store
            .get_postal_code(self.session.user_id)
            .unwrap_or_else(|e| {
                tracing::warn!("Could not read postal code of user {}: {}", self.session.user_id, e);
                None
            })
    }

    /// Keep a postal code the user typed as the default for later drafts.
    pub(super) fn remember_postal_code(&self, code: String) {
        let Some(store) = &self.ctx.store else {
            return;
        };
        if let Err(e) = store.set_postal_code(self.session.user_id, code) {
            tracing::warn!("Could not save postal code of user {}: {}", self.session.user_id, e);
        }
    }

    pub(super) async fn set_template(&mut self, text: Option<String>) {
        let Some(store) = self.ctx.store.clone() else {
            self.reply("Templates need persistent storage, which is not configured.")
                .await;
            return;
        };
        let user_id = self.session.user_id;
        let (result, confirmation) = match text.as_deref() {
            None => {
                let current = self
                    .stored_template()
                    .map(|t| format!("Current template:\n{t}"))
                    .unwrap_or_else(|| "No template set. Use /template <text>.".into());
                self.reply(&current).await;
                return;
            }
            Some("off") | Some("clear") => (store.set_template(user_id, None), "Template cleared."),
            Some(t) => (
                store.set_template(user_id, Some(t.to_string())),
                "Template saved; it is appended to new descriptions.",
            ),
        };
        match result {
            Ok(()) => self.reply(confirmation).await,
            Err(e) => self.report_failure("set_template", &e).await,
        }
    }

    pub(super) async fn set_postal_code(&mut self, code: Option<String>) {
        let Some(code) = code else {
            let text = match self.stored_postal_code() {
                Some(code) => format!("Default postal code: {code}"),
                None => "No default postal code. Use /postal <code>.".into(),
            };
            self.reply(&text).await;
            return;
        };
        let Some(store) = self.ctx.store.clone() else {
            self.reply("Default postal codes need persistent storage, which is not configured.")
                .await;
            return;
        };
        let code = match input::validate_postal_code(&code) {
            Ok(code) => code,
            Err(e) => {
                self.reply(&format!("{e}.")).await;
                return;
            }
        };
        match store.set_postal_code(self.session.user_id, code.clone()) {
            Ok(()) => self.reply(&format!("Default postal code set to {code}.")).await,
            Err(e) => self.report_failure("set_postal_code", &e).await,
        }
    }

    /// Show one page of the user's listings. Pages already fetched are
    /// served from the session's cache.
    pub(super) async fn show_listings(&mut self, page: usize) -> StepResult {
        let Some(auth) = self.require_login().await else {
            return Ok(());
        };
        if self.session.listings.page(page).is_none() {
            let Some(cursor) = self.session.listings.cursor(page).map(|c| c.map(str::to_string))
            else {
                tracing::debug!("Listings page {} is not reachable yet", page);
                return Ok(());
            };
            let fetched = self
                .ctx
                .listing
                .list_summaries(&auth, cursor.as_deref())
                .await?;
            self.session
                .listings
                .store(page, fetched.items, fetched.next_cursor);
        }

        let items = self.session.listings.page(page).unwrap_or_default();
        let (text, keyboard) =
            render::listings_page(items, page, self.session.listings.has_next(page));
        let previous = self.session.listings.message_id;
        let sent = self.edit_or_send(previous, &text, Some(&keyboard)).await;
        self.session.listings.message_id = sent.or(previous);
        Ok(())
    }
}
