//! tw actor command implementation
//!
//! Provides actor identity helpers (set/show).

use std::path::PathBuf;

use crate::actor;
use crate::cli::Context;
use crate::error::Result;
use crate::output::{emit_success, HumanOutput};
use crate::storage::STATE_DIR;

#[derive(serde::Serialize)]
struct ActorSetReport {
    actor: String,
    path: PathBuf,
}

#[derive(serde::Serialize)]
struct ActorShowReport {
    actor: String,
}

pub fn run_set(ctx: &Context, name: &str) -> Result<()> {
    actor::persist_actor(&ctx.root, name)?;

    let actor_name = actor::resolve_actor(Some(&ctx.root), Some(name))?;
    let actor_path = ctx.root.join(STATE_DIR).join("actor");

    let report = ActorSetReport {
        actor: actor_name.clone(),
        path: actor_path.clone(),
    };

    let mut human = HumanOutput::new(format!("tw actor set: {actor_name}"));
    human.push_summary("actor", actor_name);
    human.push_summary("path", actor_path.display().to_string());
    human.push_next_step("tw project list");

    emit_success(ctx.output, "actor set", &report, Some(&human))
}

pub fn run_show(ctx: &Context) -> Result<()> {
    let actor_name = actor::resolve_actor(Some(&ctx.root), ctx.actor.as_deref())?;

    let report = ActorShowReport {
        actor: actor_name.clone(),
    };

    let header = if actor_name == "unknown" {
        "tw actor: not set".to_string()
    } else {
        format!("tw actor: {actor_name}")
    };

    let mut human = HumanOutput::new(header);
    human.push_summary("actor", actor_name.clone());

    if actor_name == "unknown" {
        human.push_warning("actor not set; commands that touch projects will fail");
        human.push_next_step("tw actor set <name>");
    }

    emit_success(ctx.output, "actor show", &report, Some(&human))
}
