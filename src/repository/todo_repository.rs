use anyhow::Result;
use reqwest::Method;
use std::sync::Arc;

use crate::domain::todo::{Todo, TodoRequest, TodoUpdate};
use crate::repository::http_client::HttpClient;

#[derive(Clone)]
pub struct TodoRepository {
    http: Arc<HttpClient>,
}

impl TodoRepository {
    pub fn new(http: Arc<HttpClient>) -> Self {
        Self { http }
    }

    /// Lists the user's todos. The backend answers 404 for a user without
    /// any todos, which is reported as an empty list.
    pub async fn list_by_user(&self, user_id: i64) -> Result<Vec<Todo>> {
        match self
            .http
            .get_json(&format!("/api/todos/user/{}", user_id))
            .await
        {
            Ok(todos) => Ok(todos),
            Err(e) if e.is_not_found() => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn get(&self, id: i64) -> Result<Todo> {
        let todo = self.http.get_json(&format!("/api/todos/{}", id)).await?;
        Ok(todo)
    }

    pub async fn create(&self, user_id: i64, request: &TodoRequest) -> Result<Todo> {
        let todo = self
            .http
            .send_json(Method::POST, &format!("/api/todos/{}", user_id), request)
            .await?;
        Ok(todo)
    }

    pub async fn update(&self, id: i64, update: &TodoUpdate) -> Result<Todo> {
        let todo = self
            .http
            .send_json(Method::PUT, &format!("/api/todos/{}", id), update)
            .await?;
        Ok(todo)
    }

    pub async fn delete(&self, id: i64) -> Result<()> {
        self.http.delete(&format!("/api/todos/{}", id)).await?;
        Ok(())
    }
}
