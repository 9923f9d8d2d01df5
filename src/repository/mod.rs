pub mod auth_repository;
pub mod email_repository;
pub mod http_client;
pub mod reminder_repository;
pub mod session_store;
pub mod todo_repository;
pub mod user_repository;

use anyhow::Result;
use std::sync::Arc;

use crate::config::AppConfig;
use http_client::HttpClient;
use session_store::SessionStore;

pub use http_client::ApiError;

#[derive(Clone)]
pub struct Repository {
    pub http: Arc<HttpClient>,
    pub auth: auth_repository::AuthRepository,
    pub todos: todo_repository::TodoRepository,
    pub reminders: reminder_repository::ReminderRepository,
    pub users: user_repository::UserRepository,
    pub email: email_repository::EmailRepository,
}

impl Repository {
    pub fn new(http: HttpClient) -> Self {
        let http = Arc::new(http);
        Self {
            auth: auth_repository::AuthRepository::new(http.clone()),
            todos: todo_repository::TodoRepository::new(http.clone()),
            reminders: reminder_repository::ReminderRepository::new(http.clone()),
            users: user_repository::UserRepository::new(http.clone()),
            email: email_repository::EmailRepository::new(http.clone()),
            http,
        }
    }

    pub fn from_config(config: &AppConfig, session: Arc<SessionStore>) -> Result<Self> {
        let http = HttpClient::new(config.base_url(), config.request_timeout(), session)?;
        Ok(Self::new(http))
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        self.http.session()
    }
}
