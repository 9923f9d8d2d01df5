#[cfg(test)]
mod tests {
    use crate::domain::reminder::ReminderType;
    use crate::services::notifier::mock::RecordingNotifier;
    use crate::services::notifier::{MockNotifier, NotificationPermission, Notifier};
    use crate::services::reminder_backend::mock::{BackendCall, MockOperation, MockReminderBackend};
    use crate::services::reminder_poller::*;
    use crate::test_helpers::{TestContext, identity, reminder_at, todo};
    use async_trait::async_trait;
    use chrono::{Duration, Utc};
    use std::sync::{Arc, Mutex, OnceLock, Weak};

    /// What the poller had done at the moment a desktop notification went out.
    #[derive(Debug, Clone, PartialEq)]
    struct NotifySnapshot {
        fired: Vec<i64>,
        marked: Vec<i64>,
    }

    /// Notifier that looks back into the poller and backend while notifying.
    #[derive(Default)]
    struct SnapshotNotifier {
        poller: OnceLock<Weak<ReminderPoller>>,
        backend: OnceLock<Arc<MockReminderBackend>>,
        snapshots: Mutex<Vec<NotifySnapshot>>,
    }

    #[async_trait]
    impl Notifier for SnapshotNotifier {
        fn permission(&self) -> NotificationPermission {
            NotificationPermission::Granted
        }

        async fn request_permission(&self) -> NotificationPermission {
            NotificationPermission::Granted
        }

        async fn notify(&self, _title: &str, _body: &str) -> anyhow::Result<()> {
            let poller = self.poller.get().and_then(Weak::upgrade).unwrap();
            let fired = poller.fired_ids().await;
            let marked = self.backend.get().unwrap().marked_ids();
            self.snapshots
                .lock()
                .unwrap()
                .push(NotifySnapshot { fired, marked });
            Ok(())
        }
    }

    #[test]
    fn test_due_reminders_filters_and_keeps_order() {
        let now = Utc::now();
        let reminders = vec![
            reminder_at(1, 10, now - Duration::minutes(5), ReminderType::Email),
            reminder_at(2, 10, now + Duration::minutes(5), ReminderType::Email),
            reminder_at(3, 10, now, ReminderType::DesktopNotification),
            reminder_at(4, 10, now - Duration::minutes(1), ReminderType::Email),
        ];
        let mut fired = FiredReminders::new();
        fired.insert(4);

        let due: Vec<i64> = due_reminders(&reminders, &fired, now)
            .iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(due, vec![1, 3]);
    }

    #[test]
    fn test_due_reminders_skips_backend_triggered() {
        let now = Utc::now();
        let mut reminder = reminder_at(1, 10, now - Duration::minutes(5), ReminderType::Email);
        reminder.triggered = true;

        assert!(due_reminders(&[reminder], &FiredReminders::new(), now).is_empty());
    }

    #[tokio::test]
    async fn test_future_reminders_are_not_delivered() {
        let now = Utc::now();
        let backend = MockReminderBackend::new().with_todo(
            todo(10, "Later"),
            vec![reminder_at(1, 10, now + Duration::minutes(1), ReminderType::Both)],
        );
        let ctx = TestContext::new(backend, RecordingNotifier::granted());

        let report = ctx.poller.run_cycle(&identity(), now).await.unwrap();

        assert!(report.fired.is_empty());
        assert!(ctx.notifier.notifications().is_empty());
        assert!(ctx.backend.emails().is_empty());
        assert!(ctx.backend.marked_ids().is_empty());
        assert!(ctx.poller.fired_ids().await.is_empty());
    }

    #[tokio::test]
    async fn test_both_reminder_scenario() {
        let now = Utc::now();
        let backend = MockReminderBackend::new().with_todo(
            todo(10, "Submit taxes"),
            vec![reminder_at(7, 10, now - Duration::minutes(1), ReminderType::Both)],
        );
        let ctx = TestContext::new(
            backend,
            RecordingNotifier::undecided(NotificationPermission::Granted),
        );
        let identity = identity();

        ctx.poller.activate(&identity).await;
        let report = ctx.poller.run_cycle(&identity, now).await.unwrap();

        assert_eq!(ctx.notifier.permission_requests(), 1);
        assert_eq!(
            ctx.notifier.notifications(),
            vec![("Reminder".to_string(), "Task: Submit taxes".to_string())]
        );

        let emails = ctx.backend.emails();
        assert_eq!(emails.len(), 1);
        match &emails[0] {
            BackendCall::SendEmail {
                user_id,
                to,
                subject,
                ..
            } => {
                assert_eq!(*user_id, identity.user_id);
                assert_eq!(to, "ada@example.com");
                assert_eq!(subject, "Reminder: Submit taxes");
            }
            other => panic!("unexpected call {:?}", other),
        }

        assert_eq!(ctx.backend.marked_ids(), vec![7]);
        assert_eq!(ctx.poller.fired_ids().await, vec![7]);
        assert_eq!(report.fired, vec![7]);

        // Marked only after the email went out
        let calls = ctx.backend.calls();
        let email_at = calls
            .iter()
            .position(|c| matches!(c, BackendCall::SendEmail { .. }))
            .unwrap();
        let mark_at = calls
            .iter()
            .position(|c| matches!(c, BackendCall::MarkTriggered { reminder_id: 7 }))
            .unwrap();
        assert!(email_at < mark_at);
        assert_eq!(mark_at, calls.len() - 1);
        assert_eq!(report.notifications_sent, 1);
        assert_eq!(report.emails_sent, 1);
        assert_eq!(report.marked, 1);
    }

    #[tokio::test]
    async fn test_reminder_recorded_before_delivery_and_marked_after() {
        let now = Utc::now();
        let backend = Arc::new(MockReminderBackend::new().with_todo(
            todo(10, "Book flights"),
            vec![
                reminder_at(1, 10, now - Duration::minutes(2), ReminderType::DesktopNotification),
                reminder_at(2, 10, now - Duration::minutes(1), ReminderType::Both),
            ],
        ));
        let notifier = Arc::new(SnapshotNotifier::default());
        let poller = Arc::new(ReminderPoller::new(
            backend.clone(),
            notifier.clone(),
            PollerSettings::default(),
        ));
        assert!(notifier.poller.set(Arc::downgrade(&poller)).is_ok());
        assert!(notifier.backend.set(backend.clone()).is_ok());

        poller.run_cycle(&identity(), now).await.unwrap();

        let snapshots = notifier.snapshots.lock().unwrap().clone();
        assert_eq!(
            snapshots,
            vec![
                NotifySnapshot {
                    fired: vec![1],
                    marked: vec![],
                },
                NotifySnapshot {
                    fired: vec![1, 2],
                    marked: vec![1],
                },
            ]
        );
        assert_eq!(backend.marked_ids(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_fired_reminder_never_repeats_within_activation() {
        let now = Utc::now();
        let backend = MockReminderBackend::new()
            .keep_reminders_untriggered()
            .with_todo(
                todo(10, "Call mom"),
                vec![reminder_at(1, 10, now - Duration::minutes(2), ReminderType::Email)],
            );
        let ctx = TestContext::new(backend, RecordingNotifier::granted());
        let identity = identity();
        ctx.poller.activate(&identity).await;

        for tick in 0..3 {
            ctx.poller
                .run_cycle(&identity, now + Duration::minutes(tick))
                .await
                .unwrap();
        }

        assert_eq!(ctx.backend.emails().len(), 1);
        assert_eq!(ctx.backend.marked_ids(), vec![1]);
        // Reminders were still fetched on every tick
        assert_eq!(ctx.backend.count(MockOperation::ListReminders), 3);
    }

    #[tokio::test]
    async fn test_reactivation_starts_with_empty_fired_set() {
        let now = Utc::now();
        let backend = MockReminderBackend::new()
            .keep_reminders_untriggered()
            .with_todo(
                todo(10, "Stretch"),
                vec![reminder_at(1, 10, now - Duration::minutes(2), ReminderType::Email)],
            );
        let ctx = TestContext::new(backend, RecordingNotifier::granted());
        let identity = identity();

        ctx.poller.activate(&identity).await;
        ctx.poller.run_cycle(&identity, now).await.unwrap();
        ctx.poller.deactivate().await;
        assert!(ctx.poller.fired_ids().await.is_empty());

        ctx.poller.activate(&identity).await;
        ctx.poller.run_cycle(&identity, now).await.unwrap();

        assert_eq!(ctx.backend.emails().len(), 2);
    }

    #[tokio::test]
    async fn test_no_todos_means_no_reminder_fetches() {
        let ctx = TestContext::new(MockReminderBackend::new(), RecordingNotifier::granted());

        let report = ctx.poller.run_cycle(&identity(), Utc::now()).await.unwrap();

        assert_eq!(report, CycleReport::default());
        assert_eq!(ctx.backend.calls(), vec![BackendCall::ListTodos { user_id: 1 }]);
        assert_eq!(ctx.backend.count(MockOperation::ListReminders), 0);
    }

    #[tokio::test]
    async fn test_todos_and_reminders_processed_in_order() {
        let now = Utc::now();
        let past = now - Duration::minutes(1);
        let backend = MockReminderBackend::new()
            .with_todo(
                todo(10, "First"),
                vec![
                    reminder_at(2, 10, past, ReminderType::Email),
                    reminder_at(1, 10, past, ReminderType::Email),
                ],
            )
            .with_todo(todo(20, "Empty"), vec![])
            .with_todo(
                todo(30, "Third"),
                vec![reminder_at(3, 30, past, ReminderType::Email)],
            );
        let ctx = TestContext::new(backend, RecordingNotifier::granted());

        let report = ctx.poller.run_cycle(&identity(), now).await.unwrap();

        assert_eq!(report.todos_scanned, 3);
        assert_eq!(report.fired, vec![2, 1, 3]);
        assert_eq!(ctx.backend.marked_ids(), vec![2, 1, 3]);
    }

    #[tokio::test]
    async fn test_fetch_failure_aborts_cycle() {
        let now = Utc::now();
        let past = now - Duration::minutes(1);
        let backend = MockReminderBackend::new()
            .with_todo(todo(10, "A"), vec![reminder_at(1, 10, past, ReminderType::Email)])
            .with_todo(todo(20, "B"), vec![reminder_at(2, 20, past, ReminderType::Email)]);
        backend.fail_next(MockOperation::ListReminders, 1);
        let ctx = TestContext::new(backend, RecordingNotifier::granted());

        let err = ctx.poller.run_cycle(&identity(), now).await.unwrap_err();
        assert!(format!("{:#}", err).contains("fetch_reminders"));
        assert_eq!(ctx.backend.count(MockOperation::ListReminders), 1);
        assert!(ctx.backend.emails().is_empty());

        // The next cycle starts over and delivers everything
        let report = ctx.poller.run_cycle(&identity(), now).await.unwrap();
        assert_eq!(report.fired, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_failed_email_is_still_marked_and_not_retried() {
        let now = Utc::now();
        let backend = MockReminderBackend::new()
            .keep_reminders_untriggered()
            .with_todo(
                todo(10, "Renew passport"),
                vec![reminder_at(1, 10, now - Duration::minutes(1), ReminderType::Email)],
            );
        backend.fail_next(MockOperation::SendEmail, 1);
        let ctx = TestContext::new(backend, RecordingNotifier::granted());

        let first = ctx.poller.run_cycle(&identity(), now).await.unwrap();
        let second = ctx.poller.run_cycle(&identity(), now).await.unwrap();

        assert_eq!(first.delivery_failures, 1);
        assert_eq!(first.marked, 1);
        assert!(second.fired.is_empty());
        assert_eq!(ctx.backend.count(MockOperation::SendEmail), 1);
    }

    #[tokio::test]
    async fn test_mark_failure_keeps_reminder_in_fired_set() {
        let now = Utc::now();
        let backend = MockReminderBackend::new().with_todo(
            todo(10, "Water plants"),
            vec![reminder_at(1, 10, now - Duration::minutes(1), ReminderType::Email)],
        );
        backend.fail_next(MockOperation::MarkTriggered, 1);
        let ctx = TestContext::new(backend, RecordingNotifier::granted());

        let first = ctx.poller.run_cycle(&identity(), now).await.unwrap();
        assert_eq!(first.mark_failures, 1);

        let second = ctx.poller.run_cycle(&identity(), now).await.unwrap();
        assert!(second.fired.is_empty());
        assert_eq!(ctx.backend.emails().len(), 1);
        assert_eq!(ctx.poller.fired_ids().await, vec![1]);
    }

    #[tokio::test]
    async fn test_denied_permission_does_not_block_email() {
        let now = Utc::now();
        let past = now - Duration::minutes(1);
        let backend = MockReminderBackend::new().with_todo(
            todo(10, "Dentist"),
            vec![
                reminder_at(1, 10, past, ReminderType::DesktopNotification),
                reminder_at(2, 10, past, ReminderType::Email),
            ],
        );
        let ctx = TestContext::new(
            backend,
            RecordingNotifier::undecided(NotificationPermission::Denied),
        );
        let identity = identity();

        ctx.poller.activate(&identity).await;
        let report = ctx.poller.run_cycle(&identity, now).await.unwrap();

        assert!(ctx.notifier.notifications().is_empty());
        assert_eq!(report.delivery_failures, 1);
        assert_eq!(report.emails_sent, 1);
        assert_eq!(ctx.backend.marked_ids(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_permission_requested_only_when_undecided() {
        let mut notifier = MockNotifier::new();
        notifier
            .expect_permission()
            .return_const(NotificationPermission::Granted);
        notifier.expect_request_permission().never();

        let poller = ReminderPoller::new(
            Arc::new(MockReminderBackend::new()),
            Arc::new(notifier),
            PollerSettings::default(),
        );
        poller.activate(&identity()).await;

        assert_eq!(poller.state(), PollerState::Active { user_id: 1 });
    }

    #[tokio::test]
    async fn test_desktop_notification_uses_configured_title() {
        let now = Utc::now();
        let mut notifier = MockNotifier::new();
        notifier
            .expect_permission()
            .return_const(NotificationPermission::Granted);
        notifier
            .expect_notify()
            .withf(|title, body| title == "Heads up" && body == "Task: Standup")
            .times(1)
            .returning(|_, _| Ok(()));

        let backend = MockReminderBackend::new().with_todo(
            todo(10, "Standup"),
            vec![reminder_at(
                1,
                10,
                now - Duration::minutes(1),
                ReminderType::DesktopNotification,
            )],
        );
        let poller = ReminderPoller::new(
            Arc::new(backend),
            Arc::new(notifier),
            PollerSettings {
                notification_title: "Heads up".to_string(),
                ..PollerSettings::default()
            },
        );

        let report = poller.run_cycle(&identity(), now).await.unwrap();
        assert_eq!(report.notifications_sent, 1);
    }
}
