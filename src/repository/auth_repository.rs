use anyhow::Result;
use reqwest::Method;
use std::sync::Arc;

use crate::domain::user::{LoginRequest, LoginResponse, RegisterRequest, User};
use crate::repository::http_client::HttpClient;

#[derive(Clone)]
pub struct AuthRepository {
    http: Arc<HttpClient>,
}

impl AuthRepository {
    pub fn new(http: Arc<HttpClient>) -> Self {
        Self { http }
    }

    pub async fn login(&self, request: &LoginRequest) -> Result<LoginResponse> {
        let response = self
            .http
            .send_json(Method::POST, "/api/auth/login", request)
            .await?;
        Ok(response)
    }

    pub async fn register(&self, request: &RegisterRequest) -> Result<User> {
        let user = self
            .http
            .send_json(Method::POST, "/api/auth/register", request)
            .await?;
        Ok(user)
    }
}
