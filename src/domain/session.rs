use serde::{Deserialize, Serialize};

use crate::domain::user::LoginResponse;

/// The authenticated session, persisted as one record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Session {
    pub token: String,
    pub user_id: i64,
    pub username: String,
    pub email: String,
}

/// What the reminder poller needs to run: a numeric user id and an address
/// to send reminder emails to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity {
    pub user_id: i64,
    pub email: String,
}

impl Session {
    pub fn new(token: String, user_id: i64, username: String, email: String) -> Self {
        Self {
            token,
            user_id,
            username,
            email,
        }
    }

    pub fn identity(&self) -> Option<Identity> {
        let email = self.email.trim();
        if self.user_id <= 0 || email.is_empty() {
            return None;
        }
        Some(Identity {
            user_id: self.user_id,
            email: email.to_string(),
        })
    }

    pub fn has_token(&self) -> bool {
        !self.token.trim().is_empty()
    }
}

impl From<LoginResponse> for Session {
    fn from(response: LoginResponse) -> Self {
        Self::new(
            response.token,
            response.user_id,
            response.username,
            response.email,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(user_id: i64, email: &str) -> Session {
        Session::new("tok".into(), user_id, "ada".into(), email.into())
    }

    #[test]
    fn test_identity_requires_positive_id_and_email() {
        assert_eq!(
            session(7, "ada@example.com").identity(),
            Some(Identity {
                user_id: 7,
                email: "ada@example.com".into()
            })
        );
        assert!(session(0, "ada@example.com").identity().is_none());
        assert!(session(7, "   ").identity().is_none());
    }

    #[test]
    fn test_identity_trims_email() {
        let identity = session(3, "  ada@example.com ").identity().unwrap();
        assert_eq!(identity.email, "ada@example.com");
    }

    #[test]
    fn test_from_login_response() {
        let response = LoginResponse {
            message: "ok".into(),
            token: "jwt".into(),
            user_id: 42,
            username: "ada".into(),
            email: "ada@example.com".into(),
        };
        let session = Session::from(response);
        assert_eq!(session.user_id, 42);
        assert_eq!(session.token, "jwt");
        assert!(session.has_token());
    }
}
