use anyhow::Result;
use async_trait::async_trait;

use crate::domain::reminder::Reminder;
use crate::domain::todo::Todo;
use crate::repository::Repository;

/// The backend calls the reminder poller depends on.
#[async_trait]
pub trait ReminderBackend: Send + Sync {
    async fn list_todos(&self, user_id: i64) -> Result<Vec<Todo>>;

    async fn list_reminders(&self, todo_id: i64) -> Result<Vec<Reminder>>;

    async fn send_email(&self, user_id: i64, to: &str, subject: &str, message: &str)
    -> Result<()>;

    async fn mark_triggered(&self, reminder: &Reminder) -> Result<()>;
}

#[async_trait]
impl ReminderBackend for Repository {
    async fn list_todos(&self, user_id: i64) -> Result<Vec<Todo>> {
        self.todos.list_by_user(user_id).await
    }

    async fn list_reminders(&self, todo_id: i64) -> Result<Vec<Reminder>> {
        self.reminders.list_by_todo(todo_id).await
    }

    async fn send_email(
        &self,
        user_id: i64,
        to: &str,
        subject: &str,
        message: &str,
    ) -> Result<()> {
        self.email.send(user_id, to, subject, message).await
    }

    async fn mark_triggered(&self, reminder: &Reminder) -> Result<()> {
        self.reminders.mark_triggered(reminder).await
    }
}

pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum BackendCall {
        ListTodos {
            user_id: i64,
        },
        ListReminders {
            todo_id: i64,
        },
        SendEmail {
            user_id: i64,
            to: String,
            subject: String,
            message: String,
        },
        MarkTriggered {
            reminder_id: i64,
        },
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub enum MockOperation {
        ListTodos,
        ListReminders,
        SendEmail,
        MarkTriggered,
    }

    /// In-memory backend that records every call.
    ///
    /// Marking a reminder triggered updates the stored record, like the real
    /// backend does, unless `keep_reminders_untriggered` is set.
    #[derive(Default)]
    pub struct MockReminderBackend {
        todos: Mutex<Vec<Todo>>,
        reminders: Mutex<HashMap<i64, Vec<Reminder>>>,
        calls: Mutex<Vec<BackendCall>>,
        failures: Mutex<HashMap<MockOperation, usize>>,
        keep_untriggered: bool,
    }

    impl MockReminderBackend {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_todo(self, todo: Todo, reminders: Vec<Reminder>) -> Self {
            self.add_todo(todo, reminders);
            self
        }

        pub fn keep_reminders_untriggered(mut self) -> Self {
            self.keep_untriggered = true;
            self
        }

        pub fn add_todo(&self, todo: Todo, reminders: Vec<Reminder>) {
            self.reminders.lock().unwrap().insert(todo.id, reminders);
            self.todos.lock().unwrap().push(todo);
        }

        /// The next `times` calls of `operation` fail.
        pub fn fail_next(&self, operation: MockOperation, times: usize) {
            *self.failures.lock().unwrap().entry(operation).or_default() += times;
        }

        pub fn calls(&self) -> Vec<BackendCall> {
            self.calls.lock().unwrap().clone()
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }

        pub fn count(&self, operation: MockOperation) -> usize {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|call| Self::operation_of(call) == operation)
                .count()
        }

        pub fn emails(&self) -> Vec<BackendCall> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|call| matches!(call, BackendCall::SendEmail { .. }))
                .cloned()
                .collect()
        }

        pub fn marked_ids(&self) -> Vec<i64> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter_map(|call| match call {
                    BackendCall::MarkTriggered { reminder_id } => Some(*reminder_id),
                    _ => None,
                })
                .collect()
        }

        fn operation_of(call: &BackendCall) -> MockOperation {
            match call {
                BackendCall::ListTodos { .. } => MockOperation::ListTodos,
                BackendCall::ListReminders { .. } => MockOperation::ListReminders,
                BackendCall::SendEmail { .. } => MockOperation::SendEmail,
                BackendCall::MarkTriggered { .. } => MockOperation::MarkTriggered,
            }
        }

        fn record(&self, call: BackendCall) -> Result<()> {
            let operation = Self::operation_of(&call);
            self.calls.lock().unwrap().push(call);

            let mut failures = self.failures.lock().unwrap();
            if let Some(remaining) = failures.get_mut(&operation) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(anyhow::anyhow!("simulated {:?} failure", operation));
                }
            }
            Ok(())
        }
    }

    #[async_trait]
    impl ReminderBackend for MockReminderBackend {
        async fn list_todos(&self, user_id: i64) -> Result<Vec<Todo>> {
            self.record(BackendCall::ListTodos { user_id })?;
            Ok(self.todos.lock().unwrap().clone())
        }

        async fn list_reminders(&self, todo_id: i64) -> Result<Vec<Reminder>> {
            self.record(BackendCall::ListReminders { todo_id })?;
            Ok(self
                .reminders
                .lock()
                .unwrap()
                .get(&todo_id)
                .cloned()
                .unwrap_or_default())
        }

        async fn send_email(
            &self,
            user_id: i64,
            to: &str,
            subject: &str,
            message: &str,
        ) -> Result<()> {
            self.record(BackendCall::SendEmail {
                user_id,
                to: to.to_string(),
                subject: subject.to_string(),
                message: message.to_string(),
            })
        }

        async fn mark_triggered(&self, reminder: &Reminder) -> Result<()> {
            self.record(BackendCall::MarkTriggered {
                reminder_id: reminder.id,
            })?;
            if !self.keep_untriggered {
                if let Some(stored) = self
                    .reminders
                    .lock()
                    .unwrap()
                    .get_mut(&reminder.todo_id)
                    .and_then(|list| list.iter_mut().find(|r| r.id == reminder.id))
                {
                    stored.triggered = true;
                }
            }
            Ok(())
        }
    }
}
