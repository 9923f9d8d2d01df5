use anyhow::Result;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use crate::services::command_executor::CommandExecutor;
use crate::services::error_handling::TicklerError;

/// Outcome of asking the user's desktop for permission to notify.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationPermission {
    /// Not asked yet.
    Default,
    Granted,
    Denied,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    fn permission(&self) -> NotificationPermission;

    async fn request_permission(&self) -> NotificationPermission;

    async fn notify(&self, title: &str, body: &str) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifierProgram {
    /// freedesktop `notify-send`
    NotifySend,
    /// macOS `osascript -e 'display notification ...'`
    AppleScript,
}

impl NotifierProgram {
    pub fn for_current_platform() -> Self {
        if cfg!(target_os = "macos") {
            NotifierProgram::AppleScript
        } else {
            NotifierProgram::NotifySend
        }
    }

    pub fn binary(self) -> &'static str {
        match self {
            NotifierProgram::NotifySend => "notify-send",
            NotifierProgram::AppleScript => "osascript",
        }
    }

    fn args(self, title: &str, body: &str) -> Vec<String> {
        match self {
            NotifierProgram::NotifySend => vec![
                "--app-name=tickler".to_string(),
                title.to_string(),
                body.to_string(),
            ],
            NotifierProgram::AppleScript => vec![
                "-e".to_string(),
                format!(
                    "display notification {} with title {}",
                    applescript_quote(body),
                    applescript_quote(title)
                ),
            ],
        }
    }
}

fn applescript_quote(text: &str) -> String {
    format!("\"{}\"", text.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Desktop notifications through the platform's notifier program.
///
/// Permission is probed once: if the notifier program can be located the
/// permission is `Granted`, otherwise `Denied`. The answer is cached for the
/// lifetime of the notifier.
pub struct DesktopNotifier {
    executor: Arc<dyn CommandExecutor>,
    program: NotifierProgram,
    permission: Mutex<NotificationPermission>,
}

impl DesktopNotifier {
    pub fn new(executor: Arc<dyn CommandExecutor>, program: NotifierProgram) -> Self {
        Self {
            executor,
            program,
            permission: Mutex::new(NotificationPermission::Default),
        }
    }

    fn set_permission(&self, permission: NotificationPermission) {
        if let Ok(mut current) = self.permission.lock() {
            *current = permission;
        }
    }
}

#[async_trait]
impl Notifier for DesktopNotifier {
    fn permission(&self) -> NotificationPermission {
        self.permission
            .lock()
            .map(|p| *p)
            .unwrap_or(NotificationPermission::Denied)
    }

    async fn request_permission(&self) -> NotificationPermission {
        let current = self.permission();
        if current != NotificationPermission::Default {
            return current;
        }

        let binary = self.program.binary();
        let decided = match self.executor.execute("which", &[binary]).await {
            Ok(output) if output.success => NotificationPermission::Granted,
            Ok(_) => NotificationPermission::Denied,
            Err(e) => {
                debug!(error = %e, "Could not probe for notifier program");
                NotificationPermission::Denied
            }
        };

        if decided == NotificationPermission::Granted {
            info!(program = binary, "Desktop notifications enabled");
        } else {
            warn!(program = binary, "Desktop notifications unavailable");
        }
        self.set_permission(decided);
        decided
    }

    async fn notify(&self, title: &str, body: &str) -> Result<()> {
        if self.permission() != NotificationPermission::Granted {
            return Err(TicklerError::NotificationPermissionDenied.into());
        }

        let args = self.program.args(title, body);
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        let output = self.executor.execute(self.program.binary(), &args).await?;

        if !output.success {
            return Err(TicklerError::NotificationFailed {
                reason: output.stderr.trim().to_string(),
            }
            .into());
        }
        Ok(())
    }
}

/// Writes notifications to the log instead of the desktop. Used for
/// headless runs.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn permission(&self) -> NotificationPermission {
        NotificationPermission::Granted
    }

    async fn request_permission(&self) -> NotificationPermission {
        NotificationPermission::Granted
    }

    async fn notify(&self, title: &str, body: &str) -> Result<()> {
        info!(title = %title, body = %body, "Notification");
        Ok(())
    }
}

pub mod mock {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Records every notification and permission request.
    pub struct RecordingNotifier {
        permission: Mutex<NotificationPermission>,
        answer: NotificationPermission,
        permission_requests: AtomicUsize,
        notifications: Mutex<Vec<(String, String)>>,
    }

    impl RecordingNotifier {
        /// Starts undecided; a permission request resolves to `answer`.
        pub fn undecided(answer: NotificationPermission) -> Self {
            Self {
                permission: Mutex::new(NotificationPermission::Default),
                answer,
                permission_requests: AtomicUsize::new(0),
                notifications: Mutex::new(Vec::new()),
            }
        }

        pub fn granted() -> Self {
            let notifier = Self::undecided(NotificationPermission::Granted);
            *notifier.permission.lock().unwrap() = NotificationPermission::Granted;
            notifier
        }

        pub fn permission_requests(&self) -> usize {
            self.permission_requests.load(Ordering::SeqCst)
        }

        pub fn notifications(&self) -> Vec<(String, String)> {
            self.notifications.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        fn permission(&self) -> NotificationPermission {
            *self.permission.lock().unwrap()
        }

        async fn request_permission(&self) -> NotificationPermission {
            self.permission_requests.fetch_add(1, Ordering::SeqCst);
            *self.permission.lock().unwrap() = self.answer;
            self.answer
        }

        async fn notify(&self, title: &str, body: &str) -> Result<()> {
            if self.permission() != NotificationPermission::Granted {
                return Err(TicklerError::NotificationPermissionDenied.into());
            }
            self.notifications
                .lock()
                .unwrap()
                .push((title.to_string(), body.to_string()));
            Ok(())
        }
    }
}
