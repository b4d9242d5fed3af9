//! Command-line interface for `bizbot`, defined with `clap` derive.
//!
//! ```no_run
//! use clap::Parser;
//! use bizbot::commands::{Cli, Commands};
//!
//! let cli = Cli::parse();
//! if let Commands::Stats = cli.command {
//!     // print dashboard figures
//! }
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Multi-tenant chatbot backend: canned intent responses with LLM fallback.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None, propagate_version = true, color = clap::ColorChoice::Always)]
pub struct Cli {
    /// Config file. Defaults to `config.yaml` in the per-platform config directory.
    #[arg(short = 'c', long, global = true, env = "BIZBOT_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write a default config, create the database and load the sample tenants.
    Init {
        /// Overwrite an existing config file.
        #[arg(long)]
        force: bool,
    },

    /// Load the sample tenants into the database. Existing rows are kept.
    Seed,

    /// Answer a single message and exit.
    #[clap(name = "chat", alias = "ask")]
    Chat {
        message: String,

        #[arg(short = 'b', long = "business")]
        business_type: Option<String>,

        /// Intent detected by the dialogue engine. Without one, the LLM answers.
        #[arg(short = 'i', long)]
        intent: Option<String>,

        #[arg(long, default_value_t = 1.0)]
        confidence: f32,

        #[arg(short = 's', long, default_value = "cli")]
        session: String,
    },

    /// Chat on the console. `/intent_name` triggers an intent directly.
    #[clap(name = "interactive", alias = "i")]
    Interactive {
        #[arg(short = 'b', long = "business")]
        business_type: Option<String>,

        #[arg(short = 's', long)]
        session: Option<String>,
    },

    /// Manage tenants.
    Business {
        #[command(subcommand)]
        command: BusinessCommand,
    },

    /// Manage canned responses.
    Intent {
        #[command(subcommand)]
        command: IntentCommand,
    },

    /// Manage per-tenant greeting, fallback text and feature flags.
    BotConfig {
        #[command(subcommand)]
        command: BotConfigCommand,
    },

    /// Manage operator accounts.
    Admin {
        #[command(subcommand)]
        command: AdminCommand,
    },

    /// Show recent exchanges, newest first.
    Logs {
        #[arg(short = 'b', long = "business")]
        business_type: Option<String>,

        #[arg(short = 'n', long, default_value_t = 20)]
        limit: i64,
    },

    /// Show row counts.
    Stats,

    /// Export the active intents as Rasa NLU training data.
    Nlu {
        #[arg(short = 'o', long, default_value = "data/nlu.yml")]
        output: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
pub enum BusinessCommand {
    List,
    /// Add a tenant together with its default bot configuration.
    Add {
        name: String,
        business_type: String,
        #[arg(long)]
        email: Option<String>,
    },
    Update {
        id: i32,
        #[arg(long)]
        name: Option<String>,
        #[arg(long, conflicts_with = "clear_email")]
        email: Option<String>,
        #[arg(long)]
        clear_email: bool,
        #[arg(long)]
        active: Option<bool>,
    },
    /// Remove a tenant with its intents and bot configuration.
    Remove { id: i32 },
}

#[derive(Subcommand, Debug)]
pub enum IntentCommand {
    List {
        #[arg(short = 'b', long = "business")]
        business_type: Option<String>,
    },
    Add {
        business_type: String,
        intent_name: String,
        response: String,
        /// Training phrases separated by `;`.
        #[arg(short = 'e', long, default_value = "")]
        examples: String,
        #[arg(short = 'p', long, default_value_t = 0)]
        priority: i32,
    },
    Update {
        id: i32,
        #[arg(long)]
        response: Option<String>,
        #[arg(short = 'e', long)]
        examples: Option<String>,
        #[arg(short = 'p', long)]
        priority: Option<i32>,
        #[arg(long)]
        active: Option<bool>,
    },
    Remove { id: i32 },
}

#[derive(Subcommand, Debug)]
pub enum BotConfigCommand {
    List,
    Show {
        business_type: String,
    },
    /// Update a bot configuration, creating it if missing.
    Set {
        business_type: String,
        #[arg(long)]
        greeting: Option<String>,
        #[arg(long)]
        fallback: Option<String>,
        #[arg(long)]
        voice: Option<bool>,
        #[arg(long)]
        multilingual: Option<bool>,
        #[arg(long)]
        llm_fallback: Option<bool>,
    },
}

#[derive(Subcommand, Debug)]
pub enum AdminCommand {
    Create {
        name: String,
        email: String,
        #[arg(long, env = "BIZBOT_ADMIN_PASSWORD", hide_env_values = true)]
        password: String,
        /// Grant access to every tenant.
        #[arg(long)]
        admin: bool,
        /// Tenant the account is scoped to.
        #[arg(long)]
        business_id: Option<i32>,
    },
    List,
}
