//! Actor identity.
//!
//! The core never looks up a "current user" on its own: every operation takes
//! a [`Caller`] naming the acting user and the instant it acts at.
//!
//! Actor resolution order for the CLI:
//! 1) CLI --actor (explicit)
//! 2) TEAMWORK_ACTOR environment variable
//! 3) Persisted value in .teamwork/actor
//! 4) Config default (actor.default) or "unknown"

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::storage::STATE_DIR;

const ACTOR_FILENAME: &str = "actor";
pub const ACTOR_ENV: &str = "TEAMWORK_ACTOR";

/// Identity and clock for one core call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub user: String,
    pub now: DateTime<Utc>,
}

impl Caller {
    pub fn new(user: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            user: user.into(),
            now,
        }
    }

    /// Caller acting at the current wall-clock time.
    pub fn now(user: impl Into<String>) -> Self {
        Self::new(user, Utc::now())
    }
}

/// Resolve the current actor using CLI, environment, persisted value, and config.
pub fn resolve_actor(root: Option<&Path>, cli_actor: Option<&str>) -> Result<String> {
    if let Some(actor) = non_empty(cli_actor) {
        return Ok(actor.to_string());
    }

    if let Ok(env_actor) = std::env::var(ACTOR_ENV) {
        if let Some(actor) = non_empty(Some(env_actor.as_str())) {
            return Ok(actor.to_string());
        }
    }

    if let Some(root) = root {
        if let Some(actor) = load_persisted_actor(root)? {
            return Ok(actor);
        }

        let config = Config::load_from_root(root)?;
        return Ok(config.actor.default);
    }

    Ok("unknown".to_string())
}

/// Persist the actor identity in `.teamwork/actor`.
pub fn persist_actor(root: &Path, actor: &str) -> Result<()> {
    let actor = non_empty(Some(actor))
        .ok_or_else(|| Error::InvalidArgument("actor name cannot be empty".to_string()))?;

    std::fs::create_dir_all(root.join(STATE_DIR))?;
    std::fs::write(actor_path(root), format!("{actor}\n"))?;
    Ok(())
}

/// Load the actor identity from `.teamwork/actor`, if present.
pub fn load_persisted_actor(root: &Path) -> Result<Option<String>> {
    let path = actor_path(root);
    if !path.exists() {
        return Ok(None);
    }

    let raw = std::fs::read_to_string(path)?;
    Ok(non_empty(Some(raw.as_str())).map(str::to_string))
}

fn actor_path(root: &Path) -> PathBuf {
    root.join(STATE_DIR).join(ACTOR_FILENAME)
}

fn non_empty(input: Option<&str>) -> Option<&str> {
    input.and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed)
        }
    })
}
