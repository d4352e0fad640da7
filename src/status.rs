//! Lifecycle status shared by projects and tasks.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    NotStarted,
    InProgress,
    OnHold,
    Completed,
    Canceled,
    Overdue,
}

impl Status {
    pub const ALL: [Status; 6] = [
        Status::NotStarted,
        Status::InProgress,
        Status::OnHold,
        Status::Completed,
        Status::Canceled,
        Status::Overdue,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Status::NotStarted => "NOT_STARTED",
            Status::InProgress => "IN_PROGRESS",
            Status::OnHold => "ON_HOLD",
            Status::Completed => "COMPLETED",
            Status::Canceled => "CANCELED",
            Status::Overdue => "OVERDUE",
        }
    }

    /// Statuses the overdue sentinel never overrides.
    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Completed | Status::Overdue | Status::Canceled)
    }

    /// Statuses the completion cascade leaves untouched.
    pub fn is_settled(self) -> bool {
        matches!(self, Status::Completed | Status::Overdue)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = Error;

    /// Accepts `IN_PROGRESS`, `in_progress`, `in-progress` and `in progress`.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_uppercase().replace([' ', '-'], "_");
        Status::ALL
            .into_iter()
            .find(|status| status.as_str() == normalized)
            .ok_or_else(|| {
                Error::InvalidArgument(format!(
                    "unknown status '{}' (expected one of: {})",
                    raw.trim(),
                    Status::ALL.map(Status::as_str).join(", ")
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_loose_spellings() {
        assert_eq!("in progress".parse::<Status>().expect("parse status"), Status::InProgress);
        assert_eq!("on-hold".parse::<Status>().expect("parse status"), Status::OnHold);
        assert_eq!("COMPLETED".parse::<Status>().expect("parse status"), Status::Completed);
        assert!("finished".parse::<Status>().is_err());
    }

    #[test]
    fn serializes_screaming_case() {
        let json = serde_json::to_string(&Status::NotStarted).expect("serialize");
        assert_eq!(json, "\"NOT_STARTED\"");
    }

    #[test]
    fn terminal_set_includes_canceled_but_settled_does_not() {
        assert!(Status::Canceled.is_terminal());
        assert!(!Status::Canceled.is_settled());
        assert!(Status::Overdue.is_settled());
        assert!(!Status::InProgress.is_terminal());
    }
}
