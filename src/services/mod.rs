pub mod auth_service;
pub mod command_executor;
pub mod email_service;
pub mod error_handling;
pub mod notifier;
pub mod reminder_backend;
pub mod reminder_poller;
pub mod reminder_service;
pub mod todo_service;

#[cfg(test)]
mod reminder_poller_tests;

pub use auth_service::AuthService;
pub use email_service::EmailService;
pub use reminder_poller::{PollerHandle, PollerSettings, ReminderPoller};
pub use reminder_service::ReminderService;
pub use todo_service::TodoService;
