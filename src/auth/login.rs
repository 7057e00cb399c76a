// src/auth/login.rs — Email / code / SMS login state machine

use tokio::time::Instant;

use crate::timer::ExpiryTimer;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LoginState {
    #[default]
    None,
    AwaitingEmail,
    AwaitingEmailCode {
        email: String,
    },
    AwaitingSmsCode {
        email: String,
    },
}

/// Linear login flow. Network calls are made by the caller; this type only
/// records where the user is and when they last answered.
#[derive(Debug, Default)]
pub struct LoginFlow {
    state: LoginState,
    last_interaction: Option<Instant>,
    pub expiry: ExpiryTimer,
}

impl LoginFlow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &LoginState {
        &self.state
    }

    pub fn is_active(&self) -> bool {
        self.state != LoginState::None
    }

    pub fn last_interaction(&self) -> Option<Instant> {
        self.last_interaction
    }

    /// Email the code was sent to, while a code is awaited.
    pub fn pending_email(&self) -> Option<&str> {
        match &self.state {
            LoginState::AwaitingEmailCode { email } | LoginState::AwaitingSmsCode { email } => {
                Some(email)
            }
            _ => None,
        }
    }

    pub fn begin(&mut self) {
        self.transition(LoginState::AwaitingEmail);
    }

    /// The email code was requested successfully.
    pub fn email_sent(&mut self, email: String) -> bool {
        if self.state != LoginState::AwaitingEmail {
            return false;
        }
        self.transition(LoginState::AwaitingEmailCode { email });
        true
    }

    /// The marketplace asked for a second factor.
    pub fn sms_required(&mut self) -> bool {
        let LoginState::AwaitingEmailCode { email } = &self.state else {
            return false;
        };
        let email = email.clone();
        self.transition(LoginState::AwaitingSmsCode { email });
        true
    }

    /// Login finished or abandoned.
    pub fn reset(&mut self) {
        self.state = LoginState::None;
        self.last_interaction = None;
        self.expiry.cancel();
    }

    fn transition(&mut self, next: LoginState) {
        self.state = next;
        self.last_interaction = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_happy_path_with_sms() {
        let mut flow = LoginFlow::new();
        assert!(!flow.is_active());

        flow.begin();
        assert_eq!(flow.state(), &LoginState::AwaitingEmail);
        assert!(flow.last_interaction().is_some());

        assert!(flow.email_sent("me@example.com".into()));
        assert_eq!(flow.pending_email(), Some("me@example.com"));

        assert!(flow.sms_required());
        assert_eq!(
            flow.state(),
            &LoginState::AwaitingSmsCode {
                email: "me@example.com".into()
            }
        );

        flow.reset();
        assert!(!flow.is_active());
        assert!(flow.pending_email().is_none());
    }

    #[test]
    fn test_out_of_order_steps_are_refused() {
        let mut flow = LoginFlow::new();
        assert!(!flow.email_sent("me@example.com".into()));
        assert!(!flow.sms_required());
        flow.begin();
        assert!(!flow.sms_required());
        assert_eq!(flow.state(), &LoginState::AwaitingEmail);
    }
}
