use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Reminder {
    pub id: i64,
    #[serde(with = "crate::domain::timestamp")]
    pub remind_at: DateTime<Utc>,
    #[serde(rename = "type")]
    pub reminder_type: ReminderType,
    #[serde(default)]
    pub triggered: bool,
    pub todo_id: i64,
}

/// Delivery channel(s) of a reminder.
///
/// `Both` only exists on the client. Creating a `Both` reminder stores two
/// records, one per concrete channel, so the backend never returns it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ReminderType {
    #[serde(rename = "EMAIL")]
    Email,
    #[serde(rename = "DESKTOP_NOTIFICATION", alias = "PUSH")]
    DesktopNotification,
    #[serde(rename = "BOTH")]
    Both,
}

/// Body for creating or updating a reminder.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReminderRequest {
    #[serde(with = "crate::domain::timestamp")]
    pub remind_at: DateTime<Utc>,
    #[serde(rename = "type")]
    pub reminder_type: ReminderType,
    pub todo_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub triggered: Option<bool>,
}

impl Reminder {
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        !self.triggered && self.remind_at <= now
    }

    /// Update body that flags this reminder as handled while keeping the
    /// rest of the record intact.
    pub fn mark_triggered_request(&self) -> ReminderRequest {
        ReminderRequest {
            remind_at: self.remind_at,
            reminder_type: self.reminder_type,
            todo_id: self.todo_id,
            triggered: Some(true),
        }
    }
}

impl ReminderType {
    /// Concrete types to persist for this choice.
    pub fn expand(self) -> Vec<ReminderType> {
        match self {
            ReminderType::Both => vec![ReminderType::Email, ReminderType::DesktopNotification],
            concrete => vec![concrete],
        }
    }

    pub fn is_concrete(self) -> bool {
        self != ReminderType::Both
    }

    pub fn wants_desktop(self) -> bool {
        matches!(self, ReminderType::DesktopNotification | ReminderType::Both)
    }

    pub fn wants_email(self) -> bool {
        matches!(self, ReminderType::Email | ReminderType::Both)
    }

    pub fn label(self) -> &'static str {
        match self {
            ReminderType::Email => "email",
            ReminderType::DesktopNotification => "desktop",
            ReminderType::Both => "email + desktop",
        }
    }
}

impl fmt::Display for ReminderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ReminderType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "email" => Ok(ReminderType::Email),
            "desktop" | "desktop_notification" | "notification" | "push" => {
                Ok(ReminderType::DesktopNotification)
            }
            "both" => Ok(ReminderType::Both),
            other => Err(format!(
                "unknown reminder type '{}' (expected email, desktop or both)",
                other
            )),
        }
    }
}

impl ReminderRequest {
    pub fn new(todo_id: i64, remind_at: DateTime<Utc>, reminder_type: ReminderType) -> Self {
        Self {
            remind_at,
            reminder_type,
            todo_id,
            triggered: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rstest::rstest;

    fn reminder(offset_minutes: i64, triggered: bool) -> (Reminder, DateTime<Utc>) {
        let now = Utc::now();
        let reminder = Reminder {
            id: 1,
            remind_at: now + Duration::minutes(offset_minutes),
            reminder_type: ReminderType::Email,
            triggered,
            todo_id: 10,
        };
        (reminder, now)
    }

    #[test]
    fn test_due_boundaries() {
        let (past, now) = reminder(-1, false);
        assert!(past.is_due(now));

        let (future, now) = reminder(5, false);
        assert!(!future.is_due(now));

        let (exact, _) = reminder(0, false);
        assert!(exact.is_due(exact.remind_at));

        let (already, now) = reminder(-1, true);
        assert!(!already.is_due(now));
    }

    #[test]
    fn test_both_expands_to_two_concrete_types() {
        let expanded = ReminderType::Both.expand();
        assert_eq!(
            expanded,
            vec![ReminderType::Email, ReminderType::DesktopNotification]
        );
        assert!(expanded.iter().all(|t| t.is_concrete()));
        assert_eq!(ReminderType::Email.expand(), vec![ReminderType::Email]);
    }

    #[rstest]
    #[case(ReminderType::Email, true, false)]
    #[case(ReminderType::DesktopNotification, false, true)]
    #[case(ReminderType::Both, true, true)]
    fn test_channels(#[case] ty: ReminderType, #[case] email: bool, #[case] desktop: bool) {
        assert_eq!(ty.wants_email(), email);
        assert_eq!(ty.wants_desktop(), desktop);
    }

    #[rstest]
    #[case("email", ReminderType::Email)]
    #[case("Desktop", ReminderType::DesktopNotification)]
    #[case("DESKTOP_NOTIFICATION", ReminderType::DesktopNotification)]
    #[case("push", ReminderType::DesktopNotification)]
    #[case("both", ReminderType::Both)]
    fn test_parse_type(#[case] raw: &str, #[case] expected: ReminderType) {
        assert_eq!(raw.parse::<ReminderType>().unwrap(), expected);
    }

    #[test]
    fn test_parse_unknown_type() {
        assert!("sms".parse::<ReminderType>().is_err());
    }

    #[test]
    fn test_backend_push_alias() {
        let reminder: Reminder = serde_json::from_str(
            r#"{"id":3,"remindAt":"2024-01-01T10:00:00Z","type":"PUSH","triggered":false,"todoId":9}"#,
        )
        .unwrap();
        assert_eq!(reminder.reminder_type, ReminderType::DesktopNotification);
    }

    #[test]
    fn test_mark_triggered_request_echoes_record() {
        let (reminder, _) = reminder(-1, false);
        let json = serde_json::to_value(reminder.mark_triggered_request()).unwrap();
        assert_eq!(json["type"], "EMAIL");
        assert_eq!(json["todoId"], 10);
        assert_eq!(json["triggered"], true);
        assert!(json["remindAt"].as_str().unwrap().ends_with('Z'));
    }
}
