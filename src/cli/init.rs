//! tw init command implementation
//!
//! Creates the `.teamwork/` state directory and a default `.teamwork.toml`.

use std::path::{Path, PathBuf};

use crate::cli::Context;
use crate::config::{Config, CONFIG_FILE};
use crate::error::Result;
use crate::output::{emit_success, HumanOutput};
use crate::storage::STATE_DIR;

#[derive(serde::Serialize)]
struct InitReport {
    root: PathBuf,
    created: InitCreated,
}

#[derive(serde::Serialize)]
struct InitCreated {
    config: bool,
    state: bool,
}

pub fn run(ctx: &Context) -> Result<()> {
    std::fs::create_dir_all(&ctx.root)?;
    let created_state = ctx.storage().init()?;
    let created_config = ensure_config(&ctx.root)?;

    let report = InitReport {
        root: ctx.root.clone(),
        created: InitCreated {
            config: created_config,
            state: created_state,
        },
    };

    let mut created_items = Vec::new();
    if created_config {
        created_items.push(CONFIG_FILE.to_string());
    }
    if created_state {
        created_items.push(format!("{STATE_DIR}/"));
    }

    let header = if created_items.is_empty() {
        "tw init: nothing to do".to_string()
    } else {
        "tw init: initialized workspace".to_string()
    };

    let mut human = HumanOutput::new(header);
    human.push_summary("root", ctx.root.display().to_string());
    human.push_summary(
        "created",
        if created_items.is_empty() {
            "none".to_string()
        } else {
            created_items.join(", ")
        },
    );
    human.push_next_step("tw actor set <name>");
    human.push_next_step("tw project create <name> --start <date> --end <date>");

    emit_success(ctx.output, "init", &report, Some(&human))
}

fn ensure_config(root: &Path) -> Result<bool> {
    let path = root.join(CONFIG_FILE);
    if path.exists() {
        return Ok(false);
    }
    Config::default().save(&path)?;
    Ok(true)
}
