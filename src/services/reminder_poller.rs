//! Background reminder delivery.
//!
//! While a user with a usable identity is logged in, the poller scans that
//! user's todos and reminders on a fixed interval and delivers every
//! reminder that has come due: a desktop notification, an email, or both.
//! Each delivered reminder is then flagged as triggered on the backend.
//!
//! A per-activation set of fired reminder ids guards against delivering the
//! same reminder twice while the poller stays active, even when the backend
//! update fails. The set starts empty on every activation, so a reminder
//! fired before a restart or a re-login can fire once more afterwards.

use anyhow::Result;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, error, info};

use crate::config::AppConfig;
use crate::domain::reminder::Reminder;
use crate::domain::session::{Identity, Session};
use crate::domain::timestamp;
use crate::domain::todo::Todo;
use crate::services::error_handling::{ErrorContext, LogHelper, PerformanceMonitor};
use crate::services::notifier::{NotificationPermission, Notifier};
use crate::services::reminder_backend::ReminderBackend;

/// Ids of reminders already delivered during the current activation.
#[derive(Debug, Default, Clone)]
pub struct FiredReminders {
    ids: HashSet<i64>,
}

impl FiredReminders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` if the id was already recorded.
    pub fn insert(&mut self, reminder_id: i64) -> bool {
        self.ids.insert(reminder_id)
    }

    pub fn contains(&self, reminder_id: i64) -> bool {
        self.ids.contains(&reminder_id)
    }

    pub fn ids(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self.ids.iter().copied().collect();
        ids.sort_unstable();
        ids
    }
}

/// Reminders that should be delivered at `now`, in their original order.
pub fn due_reminders<'a>(
    reminders: &'a [Reminder],
    fired: &FiredReminders,
    now: DateTime<Utc>,
) -> Vec<&'a Reminder> {
    reminders
        .iter()
        .filter(|reminder| reminder.is_due(now) && !fired.contains(reminder.id))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollerSettings {
    pub interval: Duration,
    pub notification_title: String,
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            notification_title: "Reminder".to_string(),
        }
    }
}

impl From<&AppConfig> for PollerSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            interval: config.poll_interval(),
            notification_title: config.notification_title.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollerState {
    Inactive,
    Active { user_id: i64 },
}

/// What one scan did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub todos_scanned: usize,
    pub reminders_checked: usize,
    pub fired: Vec<i64>,
    pub notifications_sent: usize,
    pub emails_sent: usize,
    pub marked: usize,
    pub delivery_failures: usize,
    pub mark_failures: usize,
}

enum Exit {
    SessionChanged,
    Shutdown,
}

pub struct ReminderPoller {
    backend: Arc<dyn ReminderBackend>,
    notifier: Arc<dyn Notifier>,
    settings: PollerSettings,
    fired: Mutex<FiredReminders>,
    state: watch::Sender<PollerState>,
}

impl ReminderPoller {
    pub fn new(
        backend: Arc<dyn ReminderBackend>,
        notifier: Arc<dyn Notifier>,
        settings: PollerSettings,
    ) -> Self {
        let (state, _rx) = watch::channel(PollerState::Inactive);
        Self {
            backend,
            notifier,
            settings,
            fired: Mutex::new(FiredReminders::new()),
            state,
        }
    }

    pub fn settings(&self) -> &PollerSettings {
        &self.settings
    }

    pub fn state(&self) -> PollerState {
        self.state.borrow().clone()
    }

    pub async fn fired_ids(&self) -> Vec<i64> {
        self.fired.lock().await.ids()
    }

    /// Starts a fresh activation for `identity`: empties the fired set and
    /// asks for desktop permission if nobody has decided yet. The answer
    /// only matters for desktop reminders; email reminders go out either way.
    pub async fn activate(&self, identity: &Identity) {
        *self.fired.lock().await = FiredReminders::new();

        if self.notifier.permission() == NotificationPermission::Default {
            let permission = self.notifier.request_permission().await;
            debug!(?permission, "Desktop notification permission decided");
        }

        info!(user_id = identity.user_id, "Reminder poller active");
        self.state.send_replace(PollerState::Active {
            user_id: identity.user_id,
        });
    }

    pub async fn deactivate(&self) {
        *self.fired.lock().await = FiredReminders::new();
        if self.state.send_replace(PollerState::Inactive) != PollerState::Inactive {
            info!("Reminder poller inactive");
        }
    }

    /// Scans every todo of the user once and delivers what is due.
    ///
    /// A failed todo or reminder fetch aborts the scan; the next tick starts
    /// over. Delivery and mark failures are logged, counted and not retried.
    pub async fn run_cycle(&self, identity: &Identity, now: DateTime<Utc>) -> Result<CycleReport> {
        let _monitor = PerformanceMonitor::new(
            "reminder_cycle",
            self.settings.interval.as_millis() as u64,
        );
        let mut report = CycleReport::default();

        let todos = ErrorContext::new("fetch_todos")
            .with_detail("user_id", identity.user_id)
            .wrap(self.backend.list_todos(identity.user_id).await)?;
        if todos.is_empty() {
            debug!(user_id = identity.user_id, "No todos, nothing to check");
            return Ok(report);
        }

        for todo in &todos {
            report.todos_scanned += 1;

            let reminders = ErrorContext::new("fetch_reminders")
                .with_detail("todo_id", todo.id)
                .wrap(self.backend.list_reminders(todo.id).await)?;
            if reminders.is_empty() {
                continue;
            }
            report.reminders_checked += reminders.len();

            let due: Vec<Reminder> = {
                let fired = self.fired.lock().await;
                due_reminders(&reminders, &fired, now)
                    .into_iter()
                    .cloned()
                    .collect()
            };

            for reminder in due {
                // Recorded before delivery so an overlapping scan can never
                // pick the same reminder up again.
                if !self.fired.lock().await.insert(reminder.id) {
                    continue;
                }
                self.deliver(identity, todo, &reminder, &mut report).await;
            }
        }

        if !report.fired.is_empty() {
            info!(
                fired = report.fired.len(),
                delivery_failures = report.delivery_failures,
                mark_failures = report.mark_failures,
                "Reminder cycle delivered reminders"
            );
        }
        Ok(report)
    }

    async fn deliver(
        &self,
        identity: &Identity,
        todo: &Todo,
        reminder: &Reminder,
        report: &mut CycleReport,
    ) {
        report.fired.push(reminder.id);

        if reminder.reminder_type.wants_desktop() {
            let body = format!("Task: {}", todo.title);
            match self
                .notifier
                .notify(&self.settings.notification_title, &body)
                .await
            {
                Ok(()) => {
                    report.notifications_sent += 1;
                    LogHelper::log_delivery(reminder.id, "desktop", None);
                }
                Err(e) => {
                    report.delivery_failures += 1;
                    LogHelper::log_delivery(reminder.id, "desktop", Some(&e));
                }
            }
        }

        if reminder.reminder_type.wants_email() {
            let subject = format!("Reminder: {}", todo.title);
            let message = email_message(todo, reminder);
            match self
                .backend
                .send_email(identity.user_id, &identity.email, &subject, &message)
                .await
            {
                Ok(()) => {
                    report.emails_sent += 1;
                    LogHelper::log_delivery(reminder.id, "email", None);
                }
                Err(e) => {
                    report.delivery_failures += 1;
                    LogHelper::log_delivery(reminder.id, "email", Some(&e));
                }
            }
        }

        match self.backend.mark_triggered(reminder).await {
            Ok(()) => report.marked += 1,
            Err(e) => {
                report.mark_failures += 1;
                LogHelper::log_error_with_context("mark_reminder_triggered", &e);
            }
        }
    }

    /// Runs the poller in the background, following `session` for
    /// activation and deactivation. Dropping the returned handle stops it.
    pub fn start(self: Arc<Self>, session: watch::Receiver<Option<Session>>) -> PollerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(async move {
            self.supervise(session, shutdown_rx).await;
        });
        PollerHandle {
            shutdown: shutdown_tx,
            task,
        }
    }

    async fn supervise(
        &self,
        mut session: watch::Receiver<Option<Session>>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            let identity = session
                .borrow_and_update()
                .as_ref()
                .and_then(Session::identity);

            let exit = match identity {
                Some(identity) => {
                    self.activate(&identity).await;
                    let exit = self
                        .run_active(&identity, &mut session, &mut shutdown)
                        .await;
                    self.deactivate().await;
                    exit
                }
                None => {
                    debug!("No usable identity, reminder poller idle");
                    tokio::select! {
                        biased;
                        _ = shutdown.changed() => Exit::Shutdown,
                        changed = session.changed() => match changed {
                            Ok(()) => Exit::SessionChanged,
                            Err(_) => Exit::Shutdown,
                        },
                    }
                }
            };

            if let Exit::Shutdown = exit {
                self.deactivate().await;
                debug!("Reminder poller stopped");
                return;
            }
        }
    }

    async fn run_active(
        &self,
        identity: &Identity,
        session: &mut watch::Receiver<Option<Session>>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Exit {
        let period = self.settings.interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                exit = Self::identity_lost(identity, session, shutdown) => return exit,
                _ = ticker.tick() => {}
            }

            // Losing the session mid-scan drops the scan, so no further
            // backend calls are made on behalf of the old identity.
            tokio::select! {
                biased;
                exit = Self::identity_lost(identity, session, shutdown) => return exit,
                result = self.run_cycle(identity, Utc::now()) => {
                    if let Err(e) = result {
                        LogHelper::log_error_with_context("reminder_cycle", &e);
                    }
                }
            }
        }
    }

    /// Resolves once shutdown is requested or the session no longer carries
    /// `identity`.
    async fn identity_lost(
        identity: &Identity,
        session: &mut watch::Receiver<Option<Session>>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Exit {
        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => return Exit::Shutdown,
                changed = session.changed() => {
                    if changed.is_err() {
                        error!("Session store dropped, stopping reminder poller");
                        return Exit::Shutdown;
                    }
                    let current = session
                        .borrow_and_update()
                        .as_ref()
                        .and_then(Session::identity);
                    if current.as_ref() != Some(identity) {
                        return Exit::SessionChanged;
                    }
                }
            }
        }
    }
}

fn email_message(todo: &Todo, reminder: &Reminder) -> String {
    let mut message = format!(
        "This is your reminder for \"{}\" (scheduled for {}).",
        todo.title,
        timestamp::format(&reminder.remind_at)
    );
    if let Some(due) = todo.due_date {
        message.push_str(&format!("\nDue: {}", timestamp::format(&due)));
    }
    if !todo.description.trim().is_empty() {
        message.push_str(&format!("\n\n{}", todo.description.trim()));
    }
    message
}

/// Owner handle for a started poller.
pub struct PollerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl PollerHandle {
    /// Stops the poller and waits for it to wind down.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            error!(error = %e, "Reminder poller task failed");
        }
    }
}
