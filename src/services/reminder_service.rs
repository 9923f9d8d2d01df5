use anyhow::Result;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::domain::reminder::{Reminder, ReminderRequest, ReminderType};
use crate::repository::Repository;
use crate::services::error_handling::TicklerError;

#[derive(Clone)]
pub struct ReminderService {
    pub repository: Arc<Repository>,
}

impl ReminderService {
    pub fn new(repository: Arc<Repository>) -> Self {
        Self { repository }
    }

    /// Schedules a reminder. `remind_at` must not lie before `now`.
    pub async fn create(
        &self,
        todo_id: i64,
        remind_at: DateTime<Utc>,
        reminder_type: ReminderType,
        now: DateTime<Utc>,
    ) -> Result<Vec<Reminder>> {
        if remind_at < now {
            return Err(
                TicklerError::validation("remind_at", "remind time must be in the future").into(),
            );
        }
        if !self.repository.session().is_authenticated() {
            return Err(TicklerError::NotAuthenticated.into());
        }
        self.repository
            .reminders
            .create(todo_id, remind_at, reminder_type)
            .await
    }

    /// Reschedules an existing reminder. A stored reminder has one channel,
    /// so `Both` is rejected here.
    pub async fn update(
        &self,
        todo_id: i64,
        id: i64,
        remind_at: DateTime<Utc>,
        reminder_type: ReminderType,
        now: DateTime<Utc>,
    ) -> Result<Reminder> {
        if remind_at < now {
            return Err(
                TicklerError::validation("remind_at", "remind time must be in the future").into(),
            );
        }
        if !reminder_type.is_concrete() {
            return Err(TicklerError::validation(
                "type",
                "an existing reminder is either email or desktop",
            )
            .into());
        }
        if !self.repository.session().is_authenticated() {
            return Err(TicklerError::NotAuthenticated.into());
        }
        let request = ReminderRequest::new(todo_id, remind_at, reminder_type);
        self.repository.reminders.update(id, &request).await
    }

    pub async fn list(&self, todo_id: i64) -> Result<Vec<Reminder>> {
        self.repository.reminders.list_by_todo(todo_id).await
    }

    pub async fn delete(&self, id: i64) -> Result<()> {
        self.repository.reminders.delete(id).await
    }
}
