use anyhow::{Context, Result};
use std::sync::Arc;

use crate::domain::session::Session;
use crate::domain::user::{LoginRequest, RegisterRequest, User};
use crate::repository::Repository;
use crate::services::error_handling::TicklerError;

#[derive(Clone)]
pub struct AuthService {
    pub repository: Arc<Repository>,
}

impl AuthService {
    pub fn new(repository: Arc<Repository>) -> Self {
        Self { repository }
    }

    pub async fn login(&self, username_or_email: &str, password: &str) -> Result<Session> {
        if username_or_email.trim().is_empty() {
            return Err(TicklerError::validation("username", "must not be empty").into());
        }
        let request = LoginRequest {
            username_or_email: username_or_email.trim().to_string(),
            password: password.to_string(),
        };
        let response = self
            .repository
            .auth
            .login(&request)
            .await
            .context("Login failed")?;

        let session = Session::from(response);
        self.repository.session().login(session.clone())?;
        Ok(session)
    }

    pub async fn register(&self, username: &str, email: &str, password: &str) -> Result<User> {
        if username.trim().is_empty() {
            return Err(TicklerError::validation("username", "must not be empty").into());
        }
        if !email.contains('@') {
            return Err(TicklerError::validation("email", "must be an email address").into());
        }
        if password.is_empty() {
            return Err(TicklerError::validation("password", "must not be empty").into());
        }
        let request = RegisterRequest {
            username: username.trim().to_string(),
            email: email.trim().to_string(),
            password: password.to_string(),
        };
        self.repository
            .auth
            .register(&request)
            .await
            .context("Registration failed")
    }

    /// Creates the account and logs straight into it.
    pub async fn register_and_login(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<Session> {
        self.register(username, email, password).await?;
        self.login(username, password).await
    }

    pub fn logout(&self) -> Result<()> {
        self.repository.session().logout()
    }

    pub fn current_session(&self) -> Result<Session> {
        self.repository
            .session()
            .current()
            .ok_or_else(|| TicklerError::NotAuthenticated.into())
    }

    /// Fetches the profile of the logged-in user.
    pub async fn current_user(&self) -> Result<User> {
        let session = self.current_session()?;
        self.repository.users.get(session.user_id).await
    }
}
