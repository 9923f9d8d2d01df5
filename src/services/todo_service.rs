use anyhow::Result;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::domain::todo::{Todo, TodoRequest, TodoUpdate};
use crate::repository::Repository;
use crate::services::error_handling::TicklerError;

#[derive(Clone)]
pub struct TodoService {
    pub repository: Arc<Repository>,
}

impl TodoService {
    pub fn new(repository: Arc<Repository>) -> Self {
        Self { repository }
    }

    fn user_id(&self) -> Result<i64> {
        self.repository
            .session()
            .current()
            .and_then(|session| session.identity())
            .map(|identity| identity.user_id)
            .ok_or_else(|| TicklerError::NotAuthenticated.into())
    }

    pub async fn list(&self) -> Result<Vec<Todo>> {
        let user_id = self.user_id()?;
        self.repository.todos.list_by_user(user_id).await
    }

    pub async fn get(&self, id: i64) -> Result<Todo> {
        self.repository.todos.get(id).await
    }

    pub async fn create(
        &self,
        title: &str,
        description: Option<String>,
        due_date: Option<DateTime<Utc>>,
    ) -> Result<Todo> {
        let title = title.trim();
        if title.is_empty() {
            return Err(TicklerError::validation("title", "must not be empty").into());
        }
        let user_id = self.user_id()?;

        let mut request = TodoRequest::new(title);
        if let Some(description) = description.filter(|d| !d.trim().is_empty()) {
            request = request.with_description(description);
        }
        if let Some(due_date) = due_date {
            request = request.with_due_date(due_date);
        }
        self.repository.todos.create(user_id, &request).await
    }

    pub async fn update(&self, id: i64, update: TodoUpdate) -> Result<Todo> {
        if update.is_empty() {
            return Err(TicklerError::validation("update", "nothing to change").into());
        }
        if update.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
            return Err(TicklerError::validation("title", "must not be empty").into());
        }
        self.repository.todos.update(id, &update).await
    }

    pub async fn toggle_completed(&self, id: i64) -> Result<Todo> {
        let todo = self.repository.todos.get(id).await?;
        self.repository
            .todos
            .update(id, &TodoUpdate::completed(!todo.completed))
            .await
    }

    pub async fn delete(&self, id: i64) -> Result<()> {
        self.repository.todos.delete(id).await
    }
}
