// Test helpers for integration testing

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

use crate::domain::reminder::{Reminder, ReminderType};
use crate::domain::session::{Identity, Session};
use crate::domain::todo::Todo;
use crate::services::notifier::mock::RecordingNotifier;
use crate::services::reminder_backend::mock::MockReminderBackend;
use crate::services::reminder_poller::{PollerSettings, ReminderPoller};

pub fn todo(id: i64, title: &str) -> Todo {
    let created = Utc::now() - Duration::days(1);
    Todo {
        id,
        title: title.to_string(),
        description: String::new(),
        due_date: None,
        completed: false,
        created_at: created,
        updated_at: created,
    }
}

/// An untriggered reminder firing at `remind_at`.
pub fn reminder_at(
    id: i64,
    todo_id: i64,
    remind_at: DateTime<Utc>,
    reminder_type: ReminderType,
) -> Reminder {
    Reminder {
        id,
        remind_at,
        reminder_type,
        triggered: false,
        todo_id,
    }
}

pub fn session() -> Session {
    Session::new(
        "test-token".to_string(),
        1,
        "ada".to_string(),
        "ada@example.com".to_string(),
    )
}

pub fn identity() -> Identity {
    session()
        .identity()
        .unwrap_or_else(|| panic!("test session has no identity"))
}

pub struct TestContext {
    pub backend: Arc<MockReminderBackend>,
    pub notifier: Arc<RecordingNotifier>,
    pub poller: Arc<ReminderPoller>,
}

impl TestContext {
    pub fn new(backend: MockReminderBackend, notifier: RecordingNotifier) -> Self {
        Self::with_settings(backend, notifier, PollerSettings::default())
    }

    pub fn with_settings(
        backend: MockReminderBackend,
        notifier: RecordingNotifier,
        settings: PollerSettings,
    ) -> Self {
        let backend = Arc::new(backend);
        let notifier = Arc::new(notifier);
        let poller = Arc::new(ReminderPoller::new(
            backend.clone(),
            notifier.clone(),
            settings,
        ));
        Self {
            backend,
            notifier,
            poller,
        }
    }
}
