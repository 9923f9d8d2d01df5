use anyhow::Result;
use std::sync::Arc;

use crate::domain::user::User;
use crate::repository::http_client::HttpClient;

#[derive(Clone)]
pub struct UserRepository {
    http: Arc<HttpClient>,
}

impl UserRepository {
    pub fn new(http: Arc<HttpClient>) -> Self {
        Self { http }
    }

    pub async fn get(&self, id: i64) -> Result<User> {
        let user = self.http.get_json(&format!("/api/users/{}", id)).await?;
        Ok(user)
    }
}
