use anyhow::Result;
use reqwest::Method;
use std::sync::Arc;
use tracing::debug;

use crate::repository::http_client::HttpClient;

#[derive(Clone)]
pub struct EmailRepository {
    http: Arc<HttpClient>,
}

impl EmailRepository {
    pub fn new(http: Arc<HttpClient>) -> Self {
        Self { http }
    }

    /// Asks the backend to send an email on behalf of `user_id`. The
    /// response body is not used.
    pub async fn send(&self, user_id: i64, to: &str, subject: &str, message: &str) -> Result<()> {
        debug!(user_id, to, subject, "Dispatching email");
        let builder = self
            .http
            .request(Method::POST, &format!("/api/email/send/{}", user_id))
            .query(&[("to", to), ("subject", subject), ("message", message)]);
        self.http.execute(builder).await?;
        Ok(())
    }
}
