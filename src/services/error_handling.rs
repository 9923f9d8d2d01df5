use anyhow::{Context, Result};
use std::fmt;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

use crate::repository::ApiError;

/// Domain errors raised by the client before or around backend calls.
#[derive(Error, Debug)]
pub enum TicklerError {
    #[error("Not logged in")]
    NotAuthenticated,

    #[error("Validation failed for {field}: {reason}")]
    ValidationError { field: String, reason: String },

    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    #[error("Desktop notifications are not permitted")]
    NotificationPermissionDenied,

    #[error("Notification delivery failed: {reason}")]
    NotificationFailed { reason: String },
}

impl TicklerError {
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ValidationError {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Error context wrapper for better debugging
pub struct ErrorContext {
    operation: String,
    details: Vec<(String, String)>,
}

impl ErrorContext {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            details: Vec::new(),
        }
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl fmt::Display) -> Self {
        self.details.push((key.into(), value.to_string()));
        self
    }

    pub fn wrap<T>(self, result: Result<T>) -> Result<T> {
        result.with_context(|| {
            let mut msg = format!("Operation '{}' failed", self.operation);
            if !self.details.is_empty() {
                msg.push_str(" with context:");
                for (key, value) in self.details {
                    msg.push_str(&format!("\n  {}: {}", key, value));
                }
            }
            msg
        })
    }
}

/// Structured logging helpers
pub struct LogHelper;

impl LogHelper {
    #[instrument(skip(error))]
    pub fn log_error_with_context(context: &str, error: &anyhow::Error) {
        error!(
            context = %context,
            error = %error,
            error_chain = ?error.chain().map(|e| e.to_string()).collect::<Vec<_>>(),
            "Error occurred"
        );
    }

    pub fn log_delivery(reminder_id: i64, channel: &str, error: Option<&anyhow::Error>) {
        match error {
            None => info!(
                reminder_id = reminder_id,
                channel = %channel,
                "Reminder delivered"
            ),
            Some(error) => warn!(
                reminder_id = reminder_id,
                channel = %channel,
                error = %error,
                "Reminder delivery failed"
            ),
        }
    }

    pub fn log_performance_warning(operation: &str, duration_ms: u64, threshold_ms: u64) {
        if duration_ms > threshold_ms {
            warn!(
                operation = %operation,
                duration_ms = duration_ms,
                threshold_ms = threshold_ms,
                "Operation exceeded performance threshold"
            );
        }
    }
}

/// User-friendly error messages
pub struct UserErrorFormatter;

impl UserErrorFormatter {
    pub fn format_for_ui(error: &anyhow::Error) -> String {
        for cause in error.chain() {
            if let Some(tickler_error) = cause.downcast_ref::<TicklerError>() {
                return Self::format_tickler_error(tickler_error);
            }
            if let Some(api_error) = cause.downcast_ref::<ApiError>() {
                return Self::format_api_error(api_error);
            }
        }

        let error_str = error.to_string().to_lowercase();

        if error_str.contains("config") {
            return format!("Configuration problem: {}", error);
        }

        if error_str.contains("timeout") {
            return "The operation timed out. Please try again.".to_string();
        }

        // Generic fallback
        format!("Something went wrong: {}", error)
    }

    fn format_tickler_error(error: &TicklerError) -> String {
        match error {
            TicklerError::NotAuthenticated => {
                "You are not logged in. Run `tickler login` first.".to_string()
            }
            TicklerError::ValidationError { field, reason } => {
                format!("Invalid {}: {}", field, reason)
            }
            TicklerError::ConfigurationError { message } => {
                format!("Configuration error: {}", message)
            }
            _ => error.to_string(),
        }
    }

    fn format_api_error(error: &ApiError) -> String {
        match error {
            ApiError::Unauthorized { .. } => {
                "Your session is no longer valid. Please log in again.".to_string()
            }
            ApiError::NotFound { .. } => "The requested item could not be found.".to_string(),
            ApiError::Transport(_) => {
                "Could not reach the server. Check your connection and the configured API URL."
                    .to_string()
            }
            ApiError::Status { detail: Some(detail), .. } => {
                format!("The server rejected the request: {}", detail)
            }
            _ => error.to_string(),
        }
    }
}

/// Warns when the guarded operation outlives its threshold.
pub struct PerformanceMonitor {
    operation: String,
    start: Instant,
    threshold_ms: u64,
}

impl PerformanceMonitor {
    pub fn new(operation: impl Into<String>, threshold_ms: u64) -> Self {
        Self {
            operation: operation.into(),
            start: Instant::now(),
            threshold_ms,
        }
    }
}

impl Drop for PerformanceMonitor {
    fn drop(&mut self) {
        let duration_ms = self.start.elapsed().as_millis() as u64;
        LogHelper::log_performance_warning(&self.operation, duration_ms, self.threshold_ms);

        debug!(
            operation = %self.operation,
            duration_ms = duration_ms,
            "Operation completed"
        );
    }
}
