use anyhow::Result;
use std::sync::Arc;

use crate::repository::Repository;
use crate::services::error_handling::TicklerError;

#[derive(Clone)]
pub struct EmailService {
    pub repository: Arc<Repository>,
}

impl EmailService {
    pub fn new(repository: Arc<Repository>) -> Self {
        Self { repository }
    }

    /// Sends a one-off email through the backend on behalf of the
    /// logged-in user.
    pub async fn send(&self, to: &str, subject: &str, message: &str) -> Result<()> {
        for (field, value) in [("recipient", to), ("subject", subject), ("message", message)] {
            if value.trim().is_empty() {
                return Err(TicklerError::validation(field, "must not be empty").into());
            }
        }
        let identity = self
            .repository
            .session()
            .current()
            .and_then(|session| session.identity())
            .ok_or(TicklerError::NotAuthenticated)?;

        self.repository
            .email
            .send(identity.user_id, to.trim(), subject, message)
            .await
    }
}
