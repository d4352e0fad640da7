//! Notification and activity effects.
//!
//! Core operations never deliver anything themselves. Each one returns an
//! [`Outcome`] carrying the value plus the [`Effects`] it produced; the caller
//! dispatches those after its transaction commits. Delivery is fire-and-forget:
//! a failing sink is logged and skipped, never surfaced to the caller.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{Error, Result};

pub const NOTIFICATION_SCHEMA_VERSION: &str = "teamwork.notification.v1";
pub const ACTIVITY_SCHEMA_VERSION: &str = "teamwork.activity.v1";

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    TaskAssigned,
    TaskUpdated,
    TaskDeleted,
    TaskApproved,
    TaskRejected,
    TaskSubmitted,
    ProjectUpdated,
    ProjectDeleted,
}

/// Entity type a notification or activity points at.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub enum EntityType {
    Task,
    Project,
    TaskApprovalLog,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Notification {
    pub message: String,
    pub kind: NotificationKind,
    pub target_user: String,
    pub related_id: String,
    pub related_type: EntityType,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActivityKind {
    CreatedTask,
    UpdatedTask,
    DeletedTask,
    CreatedProject,
    UpdatedProject,
    DeletedProject,
    UpdatedProjectMember,
    SubmittedTask,
    ApprovedTask,
    RejectedTask,
}

/// Audit trail entry describing what a user did.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Activity {
    pub user_id: String,
    pub action: String,
    pub target_type: EntityType,
    pub target_id: String,
    pub kind: ActivityKind,
    pub timestamp: DateTime<Utc>,
}

/// Outbound events produced by one core operation.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Effects {
    pub notifications: Vec<Notification>,
    pub activities: Vec<Activity>,
}

impl Effects {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notify(
        &mut self,
        message: impl Into<String>,
        kind: NotificationKind,
        target_user: &str,
        related_id: &str,
        related_type: EntityType,
    ) {
        self.notifications.push(Notification {
            message: message.into(),
            kind,
            target_user: target_user.to_string(),
            related_id: related_id.to_string(),
            related_type,
            created_at: Utc::now(),
        });
    }

    pub fn record(
        &mut self,
        user_id: &str,
        action: impl Into<String>,
        target_type: EntityType,
        target_id: &str,
        kind: ActivityKind,
    ) {
        self.activities.push(Activity {
            user_id: user_id.to_string(),
            action: action.into(),
            target_type,
            target_id: target_id.to_string(),
            kind,
            timestamp: Utc::now(),
        });
    }

    pub fn extend(&mut self, other: Effects) {
        self.notifications.extend(other.notifications);
        self.activities.extend(other.activities);
    }

    pub fn is_empty(&self) -> bool {
        self.notifications.is_empty() && self.activities.is_empty()
    }

    pub fn notifications_for<'a>(&'a self, user: &'a str) -> impl Iterator<Item = &'a Notification> {
        self.notifications
            .iter()
            .filter(move |notification| notification.target_user == user)
    }
}

/// Result of a core operation together with the effects it produced.
#[derive(Debug, Clone)]
pub struct Outcome<T> {
    pub value: T,
    pub effects: Effects,
}

impl<T> Outcome<T> {
    pub fn new(value: T, effects: Effects) -> Self {
        Self { value, effects }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        Outcome {
            value: f(self.value),
            effects: self.effects,
        }
    }
}

/// Delivery contract for the external notification collaborator.
pub trait Notifier {
    fn notify(&mut self, notification: &Notification) -> Result<()>;

    fn record(&mut self, activity: &Activity) -> Result<()>;
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    pub recorded: usize,
    pub failed: usize,
}

/// Hand every effect to `notifier`. Failures are logged and counted.
pub fn dispatch(effects: &Effects, notifier: &mut dyn Notifier) -> DispatchReport {
    let mut report = DispatchReport::default();
    for notification in &effects.notifications {
        match notifier.notify(notification) {
            Ok(()) => report.delivered += 1,
            Err(err) => {
                report.failed += 1;
                tracing::warn!(
                    user = %notification.target_user,
                    kind = ?notification.kind,
                    error = %err,
                    "notification delivery failed"
                );
            }
        }
    }
    for activity in &effects.activities {
        match notifier.record(activity) {
            Ok(()) => report.recorded += 1,
            Err(err) => {
                report.failed += 1;
                tracing::warn!(
                    user = %activity.user_id,
                    kind = ?activity.kind,
                    error = %err,
                    "activity record failed"
                );
            }
        }
    }
    report
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    /// Standard error, so JSON lines never mix with `--json` output.
    Stderr,
    File(PathBuf),
    Off,
}

impl Destination {
    /// `-` is stderr, `off` disables the sink, anything else is a path
    /// resolved against `base`.
    pub fn parse(raw: &str, base: &Path) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("off") {
            return Destination::Off;
        }
        if trimmed == "-" {
            return Destination::Stderr;
        }
        let path = PathBuf::from(trimmed);
        if path.is_absolute() {
            Destination::File(path)
        } else {
            Destination::File(base.join(path))
        }
    }

    pub fn open(&self) -> Result<Option<JsonlSink>> {
        match self {
            Destination::Stderr => Ok(Some(JsonlSink::stderr())),
            Destination::File(path) => JsonlSink::file(path).map(Some),
            Destination::Off => Ok(None),
        }
    }
}

/// Sink that writes JSONL output to a destination.
pub struct JsonlSink {
    writer: Box<dyn Write + Send>,
}

impl JsonlSink {
    pub fn stderr() -> Self {
        Self {
            writer: Box::new(std::io::stderr()),
        }
    }

    /// Append to a file, creating it if necessary.
    pub fn file(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        Ok(Self {
            writer: Box::new(file),
        })
    }

    pub fn emit<T: Serialize>(&mut self, schema_version: &'static str, record: &T) -> Result<()> {
        #[derive(Serialize)]
        struct Line<'a, T: Serialize> {
            schema_version: &'static str,
            #[serde(flatten)]
            record: &'a T,
        }

        let serialized = serde_json::to_vec(&Line {
            schema_version,
            record,
        })?;
        self.writer.write_all(&serialized)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush().map_err(Error::Io)?;
        Ok(())
    }
}

/// Notifier that appends notifications and activities as JSON lines.
#[derive(Default)]
pub struct JsonlNotifier {
    notifications: Option<JsonlSink>,
    activities: Option<JsonlSink>,
}

impl JsonlNotifier {
    pub fn new(notifications: Option<JsonlSink>, activities: Option<JsonlSink>) -> Self {
        Self {
            notifications,
            activities,
        }
    }

    pub fn open(notifications: &Destination, activities: &Destination) -> Result<Self> {
        Ok(Self::new(notifications.open()?, activities.open()?))
    }
}

impl Notifier for JsonlNotifier {
    fn notify(&mut self, notification: &Notification) -> Result<()> {
        match self.notifications.as_mut() {
            Some(sink) => sink.emit(NOTIFICATION_SCHEMA_VERSION, notification),
            None => Ok(()),
        }
    }

    fn record(&mut self, activity: &Activity) -> Result<()> {
        match self.activities.as_mut() {
            Some(sink) => sink.emit(ACTIVITY_SCHEMA_VERSION, activity),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingNotifier;

    impl Notifier for FailingNotifier {
        fn notify(&mut self, _notification: &Notification) -> Result<()> {
            Err(Error::State("transport down".to_string()))
        }

        fn record(&mut self, _activity: &Activity) -> Result<()> {
            Ok(())
        }
    }

    fn sample_effects() -> Effects {
        let mut effects = Effects::new();
        effects.notify(
            "Task Draft is overdue",
            NotificationKind::TaskUpdated,
            "alice",
            "tsk-1",
            EntityType::Task,
        );
        effects.record(
            "bob",
            "Created task: Draft",
            EntityType::Task,
            "tsk-1",
            ActivityKind::CreatedTask,
        );
        effects
    }

    #[test]
    fn dispatch_counts_failures_without_erroring() {
        let report = dispatch(&sample_effects(), &mut FailingNotifier);
        assert_eq!(report.failed, 1);
        assert_eq!(report.recorded, 1);
        assert_eq!(report.delivered, 0);
    }

    #[test]
    fn jsonl_notifier_appends_lines() {
        let dir = tempfile::tempdir().expect("tempdir");
        let notifications = dir.path().join("notifications.jsonl");
        let activities = dir.path().join("activity.jsonl");
        let mut notifier = JsonlNotifier::open(
            &Destination::File(notifications.clone()),
            &Destination::File(activities.clone()),
        )
        .expect("open");

        let report = dispatch(&sample_effects(), &mut notifier);
        assert_eq!(report.failed, 0);

        let written = std::fs::read_to_string(&notifications).expect("read");
        let line: serde_json::Value = serde_json::from_str(written.trim()).expect("json");
        assert_eq!(line["schema_version"], NOTIFICATION_SCHEMA_VERSION);
        assert_eq!(line["kind"], "TASK_UPDATED");
        assert_eq!(line["related_type"], "Task");
        assert!(std::fs::read_to_string(&activities)
            .expect("read")
            .contains("CREATED_TASK"));
    }

    #[test]
    fn destination_parse_handles_special_values() {
        let base = Path::new("/tmp/root");
        assert_eq!(Destination::parse("-", base), Destination::Stderr);
        assert_eq!(Destination::parse("off", base), Destination::Off);
        assert_eq!(
            Destination::parse("out.jsonl", base),
            Destination::File(base.join("out.jsonl"))
        );
    }
}
