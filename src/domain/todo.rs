use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Todo {
    pub id: i64,
    pub title: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub description: String,
    #[serde(default, with = "crate::domain::timestamp::option")]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed: bool,
    #[serde(with = "crate::domain::timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "crate::domain::timestamp")]
    pub updated_at: DateTime<Utc>,
}

/// Body for creating a todo.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TodoRequest {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        with = "crate::domain::timestamp::option"
    )]
    pub due_date: Option<DateTime<Utc>>,
}

/// Partial update; only the fields that are set are sent.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TodoUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        with = "crate::domain::timestamp::option"
    )]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

impl Todo {
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        !self.completed && self.due_date.is_some_and(|due| due < now)
    }
}

impl TodoRequest {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: None,
            due_date: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_due_date(mut self, due_date: DateTime<Utc>) -> Self {
        self.due_date = Some(due_date);
        self
    }
}

impl TodoUpdate {
    pub fn completed(completed: bool) -> Self {
        Self {
            completed: Some(completed),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.due_date.is_none()
            && self.completed.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample(completed: bool, due_date: Option<DateTime<Utc>>) -> Todo {
        let now = Utc::now();
        Todo {
            id: 1,
            title: "Write report".into(),
            description: String::new(),
            due_date,
            completed,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_deserialize_backend_todo() {
        let todo: Todo = serde_json::from_str(
            r#"{
                "id": 5,
                "title": "Pay rent",
                "description": null,
                "dueDate": null,
                "completed": false,
                "createdAt": "2024-03-01T08:00:00",
                "updatedAt": "2024-03-01T08:00:00Z"
            }"#,
        )
        .unwrap();
        assert_eq!(todo.id, 5);
        assert_eq!(todo.title, "Pay rent");
        assert!(todo.description.is_empty());
        assert!(todo.due_date.is_none());
        assert_eq!(todo.created_at, todo.updated_at);
    }

    #[test]
    fn test_is_overdue() {
        let now = Utc::now();
        assert!(sample(false, Some(now - Duration::hours(1))).is_overdue(now));
        assert!(!sample(true, Some(now - Duration::hours(1))).is_overdue(now));
        assert!(!sample(false, Some(now + Duration::hours(1))).is_overdue(now));
        assert!(!sample(false, None).is_overdue(now));
    }

    #[test]
    fn test_update_only_sends_set_fields() {
        let json = serde_json::to_value(TodoUpdate::completed(true)).unwrap();
        assert_eq!(json, serde_json::json!({ "completed": true }));
        assert!(TodoUpdate::default().is_empty());
    }

    #[test]
    fn test_request_builder() {
        let req = TodoRequest::new("Title").with_description("Body");
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["title"], "Title");
        assert_eq!(json["description"], "Body");
        assert!(json.get("dueDate").is_none());
    }
}
