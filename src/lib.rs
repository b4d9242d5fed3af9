//! # bizbot (library root)
//!
//! A multi-tenant chatbot backend. Each tenant (a *business*, keyed by its
//! `business_type`) owns a set of canned responses indexed by intent name. A user
//! message that the dialogue engine classified confidently gets the canned
//! response; anything else falls back to a large language model, prompted with a
//! business-specific system prompt and the recent history of the session.
//!
//! ## Modules
//! - [`dispatcher`]: per-message pipeline (canned response, static fallback or LLM).
//! - [`fallback`], [`llm`], [`prompt`], [`context`]: the LLM fallback path.
//! - [`store`], [`models`], [`schema`], [`seed`]: SQLite persistence through Diesel.
//! - [`nlu`]: export of training data for the dialogue engine.
//! - [`config`], [`commands`]: configuration and the CLI surface.
//!
//! ## Quick start
//! ```no_run
//! use bizbot::{config, seed, store};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut conn = config::establish_connection("bizbot.db")?;
//! store::initialize_schema(&mut conn)?;
//! seed::seed_sample_data(&mut conn)?;
//! assert!(store::lookup_response(&mut conn, "retail", "greet")?.is_some());
//! # Ok(()) }
//! ```

use directories::ProjectDirs;
use std::{error::Error, path::PathBuf};

pub mod commands;
pub mod config;
pub mod context;
pub mod dispatcher;
pub mod fallback;
pub mod llm;
pub mod models;
pub mod nlu;
pub mod prompt;
pub mod schema;
pub mod seed;
pub mod store;

/// Return the per-platform configuration directory used by bizbot.
///
/// This uses [`directories::ProjectDirs`] with the application triple
/// `("com", "bizbot", "bizbot")`, e.g. `~/.config/bizbot` on Linux.
///
/// The directory is **not** created by this function.
///
/// # Errors
/// Returns an error if the platform configuration directory cannot be determined.
pub fn config_dir() -> Result<PathBuf, Box<dyn Error>> {
    let proj_dirs = ProjectDirs::from("com", "bizbot", "bizbot")
        .ok_or("Unable to determine config directory")?;
    Ok(proj_dirs.config_dir().to_path_buf())
}
