//! Configuration loading and management
//!
//! Handles parsing of `.teamwork.toml` configuration files.

use std::path::Path;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const CONFIG_FILE: &str = ".teamwork.toml";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Actor configuration
    #[serde(default)]
    pub actor: ActorConfig,

    /// Task defaults
    #[serde(default)]
    pub tasks: TasksConfig,

    /// Notification and activity sinks
    #[serde(default)]
    pub notifications: NotificationsConfig,
}

/// Actor-related configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActorConfig {
    /// Default actor name when none specified
    #[serde(default = "default_actor")]
    pub default: String,
}

fn default_actor() -> String {
    "unknown".to_string()
}

impl Default for ActorConfig {
    fn default() -> Self {
        Self {
            default: default_actor(),
        }
    }
}

/// Tasks configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TasksConfig {
    /// Priority given to new tasks that do not specify one
    #[serde(default = "default_task_priority")]
    pub default_priority: u32,

    /// Look-ahead window for `tw task due`
    #[serde(default = "default_due_soon_window")]
    pub due_soon_window: String,
}

fn default_task_priority() -> u32 {
    1
}

fn default_due_soon_window() -> String {
    "12h".to_string()
}

impl Default for TasksConfig {
    fn default() -> Self {
        Self {
            default_priority: default_task_priority(),
            due_soon_window: default_due_soon_window(),
        }
    }
}

impl TasksConfig {
    pub fn due_soon_window(&self) -> Result<Duration> {
        parse_duration(&self.due_soon_window)
    }

    fn validate(&self) -> Result<()> {
        if self.default_priority == 0 {
            return Err(Error::InvalidConfig(
                "tasks.default_priority must be > 0".to_string(),
            ));
        }
        let window = parse_duration(&self.due_soon_window)
            .map_err(|err| Error::InvalidConfig(format!("tasks.due_soon_window: {err}")))?;
        if window <= Duration::zero() {
            return Err(Error::InvalidConfig(
                "tasks.due_soon_window must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Where dispatched notifications and activity records go.
///
/// Values are `-` for stderr, `off` to disable, or a path relative to the
/// workspace root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationsConfig {
    #[serde(default = "default_notification_destination")]
    pub destination: String,

    #[serde(default = "default_activity_destination")]
    pub activity_destination: String,
}

fn default_notification_destination() -> String {
    ".teamwork/notifications.jsonl".to_string()
}

fn default_activity_destination() -> String {
    ".teamwork/activity.jsonl".to_string()
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            destination: default_notification_destination(),
            activity_destination: default_activity_destination(),
        }
    }
}

impl NotificationsConfig {
    fn validate(&self) -> Result<()> {
        if self.destination.trim().is_empty() {
            return Err(Error::InvalidConfig(
                "notifications.destination cannot be empty (use \"off\" to disable)".to_string(),
            ));
        }
        if self.activity_destination.trim().is_empty() {
            return Err(Error::InvalidConfig(
                "notifications.activity_destination cannot be empty (use \"off\" to disable)"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

impl Config {
    /// Load configuration from a `.teamwork.toml` file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from the workspace root, or return defaults
    pub fn load_from_root(root: &Path) -> Result<Self> {
        let config_path = root.join(CONFIG_FILE);
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        self.tasks.validate()?;
        self.notifications.validate()?;
        Ok(())
    }
}

/// Parse a duration string like "30s", "15m", "12h", "2d" or "1w".
/// A bare number is read as minutes.
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();

    if s.is_empty() {
        return Err(Error::InvalidArgument("Duration cannot be empty".to_string()));
    }

    let (num_str, unit) = match s.find(|c: char| !c.is_ascii_digit()) {
        Some(pos) => (&s[..pos], &s[pos..]),
        None => (s, "m"),
    };

    let num: i64 = num_str
        .parse()
        .map_err(|_| Error::InvalidArgument(format!("Invalid duration number: {num_str}")))?;

    let duration = match unit.trim().to_lowercase().as_str() {
        "s" | "sec" | "second" | "seconds" => Duration::seconds(num),
        "m" | "min" | "minute" | "minutes" => Duration::minutes(num),
        "h" | "hr" | "hour" | "hours" => Duration::hours(num),
        "d" | "day" | "days" => Duration::days(num),
        "w" | "week" | "weeks" => Duration::weeks(num),
        _ => {
            return Err(Error::InvalidArgument(format!(
                "Invalid duration unit '{unit}'. Expected: s, m, h, d, w"
            )));
        }
    };

    Ok(duration)
}
