// src/auth/mod.rs — Marketplace credentials and the login flow
//
// `SharedAuth` is the only piece of session state that code outside the
// session worker may touch (the scheduled token refresher). Everything else
// in a session is owned by its worker.

pub mod login;

use std::sync::{Arc, Mutex, MutexGuard};

use crate::infra::errors::Result;
use crate::integrations::types::{AuthService, Credentials};

pub use login::{LoginFlow, LoginState};

/// Credentials slice of a session.
#[derive(Debug, Clone, Default)]
pub struct AuthState {
    credentials: Option<Credentials>,
    /// Installation id presented to the marketplace on login.
    device_id: String,
}

pub type SharedAuth = Arc<Mutex<AuthState>>;

impl AuthState {
    pub fn new(device_id: impl Into<String>, credentials: Option<Credentials>) -> Self {
        Self {
            credentials,
            device_id: device_id.into(),
        }
    }

    pub fn shared(self) -> SharedAuth {
        Arc::new(Mutex::new(self))
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    pub fn is_logged_in(&self) -> bool {
        self.credentials.is_some()
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn set_credentials(&mut self, credentials: Credentials) {
        self.credentials = Some(credentials);
    }

    pub fn clear(&mut self) {
        self.credentials = None;
    }
}

/// Lock the auth slice. A poisoned lock still holds valid credentials.
pub fn lock(shared: &SharedAuth) -> MutexGuard<'_, AuthState> {
    shared.lock().unwrap_or_else(|e| e.into_inner())
}

/// Copy of the current credentials, taken without holding the lock across
/// any await.
pub fn snapshot(shared: &SharedAuth) -> Option<Credentials> {
    lock(shared).credentials().cloned()
}

/// Refresh the credentials if they expire within `margin`.
///
/// The network call runs without the lock. The result is only written back
/// if the session still holds the credentials that were refreshed; a logout
/// or a fresh login in the meantime wins. Returns the new credentials when
/// they were stored.
pub async fn refresh_if_expiring(
    shared: &SharedAuth,
    service: &dyn AuthService,
    margin: chrono::Duration,
) -> Result<Option<Credentials>> {
    let Some(current) = snapshot(shared) else {
        return Ok(None);
    };
    if !current.expires_within(margin) {
        return Ok(None);
    }

    let refreshed = service.refresh(&current).await?;

    let mut state = lock(shared);
    let unchanged = state
        .credentials()
        .is_some_and(|c| c.access_token == current.access_token);
    if !unchanged {
        tracing::debug!("Credentials changed during refresh; keeping the newer ones");
        return Ok(None);
    }
    state.set_credentials(refreshed.clone());
    Ok(Some(refreshed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrations::types::LoginStep;
    use async_trait::async_trait;
    use chrono::Utc;

    fn creds(token: &str, minutes: i64) -> Credentials {
        Credentials {
            access_token: token.into(),
            refresh_token: format!("r-{token}"),
            expires_at: Utc::now() + chrono::Duration::minutes(minutes),
            device_id: "dev".into(),
        }
    }

    struct Refresher;

    #[async_trait]
    impl AuthService for Refresher {
        async fn request_email_code(&self, _email: &str, _device_id: &str) -> Result<()> {
            Ok(())
        }

        async fn verify_email_code(
            &self,
            _email: &str,
            _code: &str,
            _device_id: &str,
        ) -> Result<LoginStep> {
            Ok(LoginStep::SmsRequired)
        }

        async fn verify_sms_code(
            &self,
            _email: &str,
            _code: &str,
            _device_id: &str,
        ) -> Result<Credentials> {
            Ok(creds("sms", 60))
        }

        async fn refresh(&self, credentials: &Credentials) -> Result<Credentials> {
            Ok(creds(&format!("{}+", credentials.access_token), 60))
        }
    }

    #[tokio::test]
    async fn test_refresh_only_when_expiring() {
        let shared = AuthState::new("dev", Some(creds("a", 120))).shared();
        let margin = chrono::Duration::minutes(10);

        let none = refresh_if_expiring(&shared, &Refresher, margin).await.unwrap();
        assert!(none.is_none());

        lock(&shared).set_credentials(creds("b", 5));
        let refreshed = refresh_if_expiring(&shared, &Refresher, margin)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(refreshed.access_token, "b+");
        assert_eq!(snapshot(&shared).unwrap().access_token, "b+");
    }

    #[tokio::test]
    async fn test_refresh_without_credentials_is_noop() {
        let shared = AuthState::new("dev", None).shared();
        let result = refresh_if_expiring(&shared, &Refresher, chrono::Duration::minutes(10))
            .await
            .unwrap();
        assert!(result.is_none());
        assert!(!lock(&shared).is_logged_in());
    }
}
