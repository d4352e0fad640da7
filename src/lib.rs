//! teamwork - task-tree progress engine and approval workflow
//!
//! Projects own trees of tasks. Progress rolls up from leaves to roots and
//! projects, deadlines turn tasks overdue lazily on read, and an append-only
//! approval log drives submit/approve/reject reviews that cascade completion
//! through a subtree.
//!
//! # Module Organization
//!
//! - `store`: repository trait, in-memory arena and state snapshot
//! - `storage`: `.teamwork/` files and locked transactions
//! - `progress`: weighted progress aggregation
//! - `overdue`: lazy deadline checks
//! - `approval`: approval log and completion cascade
//! - `permission`: role-based permission gate
//! - `notify`: notification/activity effects and JSONL delivery
//! - `task` / `project`: services built on the above
//! - `cli`: command-line interface using clap

pub mod actor;
pub mod approval;
pub mod cli;
pub mod config;
pub mod error;
pub mod lock;
pub mod notify;
pub mod output;
pub mod overdue;
pub mod permission;
pub mod progress;
pub mod project;
pub mod role;
pub mod status;
pub mod storage;
pub mod store;
pub mod task;

pub use actor::Caller;
pub use error::{Error, Result};
pub use notify::{Effects, Outcome};
pub use store::{MemoryStore, Repository};
