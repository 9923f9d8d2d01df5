use anyhow::Result;
use chrono::{DateTime, Utc};
use reqwest::Method;
use std::sync::Arc;
use tracing::debug;

use crate::domain::reminder::{Reminder, ReminderRequest, ReminderType};
use crate::repository::http_client::HttpClient;

#[derive(Clone)]
pub struct ReminderRepository {
    http: Arc<HttpClient>,
}

impl ReminderRepository {
    pub fn new(http: Arc<HttpClient>) -> Self {
        Self { http }
    }

    pub async fn list_by_todo(&self, todo_id: i64) -> Result<Vec<Reminder>> {
        let reminders = self
            .http
            .get_json(&format!("/api/reminders/todo/{}", todo_id))
            .await?;
        Ok(reminders)
    }

    /// Creates one record per concrete type of `reminder_type`, so `Both`
    /// is stored as an email and a desktop reminder.
    pub async fn create(
        &self,
        todo_id: i64,
        remind_at: DateTime<Utc>,
        reminder_type: ReminderType,
    ) -> Result<Vec<Reminder>> {
        let mut created = Vec::new();
        for concrete in reminder_type.expand() {
            created.push(self.create_one(todo_id, remind_at, concrete).await?);
        }
        Ok(created)
    }

    async fn create_one(
        &self,
        todo_id: i64,
        remind_at: DateTime<Utc>,
        reminder_type: ReminderType,
    ) -> Result<Reminder> {
        debug_assert!(reminder_type.is_concrete());
        let request = ReminderRequest::new(todo_id, remind_at, reminder_type);
        let reminder = self
            .http
            .send_json(Method::POST, &format!("/api/reminders/{}", todo_id), &request)
            .await?;
        Ok(reminder)
    }

    pub async fn update(&self, id: i64, request: &ReminderRequest) -> Result<Reminder> {
        let reminder = self
            .http
            .send_json(Method::PUT, &format!("/api/reminders/{}", id), request)
            .await?;
        Ok(reminder)
    }

    /// Flags a reminder as handled on the backend. Any response body is
    /// ignored.
    pub async fn mark_triggered(&self, reminder: &Reminder) -> Result<()> {
        debug!(reminder_id = reminder.id, "Marking reminder as triggered");
        let builder = self
            .http
            .request(Method::PUT, &format!("/api/reminders/{}", reminder.id))
            .json(&reminder.mark_triggered_request());
        self.http.execute(builder).await?;
        Ok(())
    }

    pub async fn delete(&self, id: i64) -> Result<()> {
        self.http.delete(&format!("/api/reminders/{}", id)).await?;
        Ok(())
    }
}
