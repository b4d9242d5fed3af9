//! Entry point of the `bizbot` CLI.
//!
//! ```sh
//! bizbot init
//! bizbot chat "where is my order?" --business retail --intent track_order
//! bizbot interactive --business healthcare
//! bizbot intent list --business retail
//! ```

use bizbot::{
    commands::{AdminCommand, BotConfigCommand, BusinessCommand, Cli, Commands, IntentCommand},
    config::{self, BizbotConfig, establish_connection},
    config_dir,
    dispatcher::{self, Dispatcher, IncomingMessage},
    models::{BotConfigChanges, BusinessChanges, BusinessIntent, IntentChanges},
    nlu,
    prompt::PromptBook,
    seed, store,
};
use chrono::Utc;
use clap::Parser;
use diesel::sqlite::SqliteConnection;
use once_cell::sync::OnceCell;
use std::{
    error::Error,
    fs,
    path::{Path, PathBuf},
};
use tracing::{debug, info, warn};

static TRACING: OnceCell<()> = OnceCell::new();

fn main() -> Result<(), Box<dyn Error>> {
    TRACING.get_or_init(|| {
        tracing_subscriber::fmt::init();
    });
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(run())
}

async fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let config_path = match cli.config {
        Some(path) => path,
        None => config_dir()?.join("config.yaml"),
    };

    let load = || load_runtime_config(&config_path);

    match cli.command {
        Commands::Init { force } => init(&config_path, force)?,
        Commands::Seed => {
            let mut conn = open_store(&load()?)?;
            let report = seed::seed_sample_data(&mut conn)?;
            println!(
                "Seeded {} businesses, {} bot configs, {} intents.",
                report.businesses, report.bot_configs, report.intents
            );
        }
        Commands::Chat {
            message,
            business_type,
            intent,
            confidence,
            session,
        } => {
            let mut dispatcher = open_dispatcher(&load()?)?;
            let mut incoming = IncomingMessage::new(session, message);
            incoming.business_type = business_type;
            if let Some(intent) = intent {
                incoming = incoming.with_intent(intent, confidence);
            }
            let reply = dispatcher.handle(&incoming).await?;
            debug!("Reply source: {:?}", reply.source);
            println!("{}", reply.text);
        }
        Commands::Interactive {
            business_type,
            session,
        } => {
            let mut dispatcher = open_dispatcher(&load()?)?;
            let session =
                session.unwrap_or_else(|| format!("cli-{}", Utc::now().timestamp_millis()));
            let business_type = business_type.map(|bt| store::normalize_business_type(&bt));
            println!("Session: {session} (type 'exit' to quit)");
            dispatcher::interactive_mode(&mut dispatcher, &session, business_type.as_deref())
                .await?;
        }
        Commands::Business { command } => business(&mut open_store(&load()?)?, command)?,
        Commands::Intent { command } => intent(&mut open_store(&load()?)?, command)?,
        Commands::BotConfig { command } => bot_config(&mut open_store(&load()?)?, command)?,
        Commands::Admin { command } => admin(&mut open_store(&load()?)?, command)?,
        Commands::Logs {
            business_type,
            limit,
        } => {
            let mut conn = open_store(&load()?)?;
            let business_id = match business_type {
                Some(bt) => Some(
                    store::find_business_by_type(&mut conn, &bt)?
                        .and_then(|b| b.id)
                        .ok_or_else(|| format!("Unknown business type: {bt}"))?,
                ),
                None => None,
            };
            for log in store::recent_logs(&mut conn, business_id, limit)? {
                println!(
                    "[{}] ({}) {:?} -> {:?}",
                    log.created_at,
                    log.intent_detected.as_deref().unwrap_or("-"),
                    log.user_message,
                    log.bot_response
                );
            }
        }
        Commands::Stats => {
            let stats = store::stats(&mut open_store(&load()?)?)?;
            println!("Businesses:  {}", stats.businesses);
            println!("Intents:     {}", stats.intents);
            println!("Admin users: {}", stats.admin_users);
            println!("Logs:        {}", stats.logs);
        }
        Commands::Nlu { output } => {
            let mut conn = open_store(&load()?)?;
            let intents: Vec<BusinessIntent> = store::list_intents(&mut conn, None)?
                .into_iter()
                .filter(|i| i.is_active)
                .collect();
            let document = nlu::build_nlu_document(&intents);
            nlu::write_nlu_file(&output, &document)?;
            println!("Wrote {} intents to {}", document.nlu.len(), output.display());
        }
    }

    Ok(())
}

/// The config file if present (defaults otherwise), with environment overrides.
fn load_runtime_config(config_path: &Path) -> Result<BizbotConfig, Box<dyn Error>> {
    let mut config = if config_path.exists() {
        config::load_config(config_path)?
    } else {
        warn!(
            "No config file at {}, using defaults. Run `bizbot init` to create one.",
            config_path.display()
        );
        BizbotConfig::default()
    };
    config.apply_process_env();
    debug!("Using database {}", config.database_url);
    Ok(config)
}

fn open_store(config: &BizbotConfig) -> Result<SqliteConnection, Box<dyn Error>> {
    let mut conn = establish_connection(&config.database_url)?;
    store::initialize_schema(&mut conn)?;
    Ok(conn)
}

fn open_dispatcher(config: &BizbotConfig) -> Result<Dispatcher, Box<dyn Error>> {
    let mut dispatcher = Dispatcher::from_config(config, load_prompts(config)?)?;
    store::initialize_schema(dispatcher.connection())?;
    Ok(dispatcher)
}

fn load_prompts(config: &BizbotConfig) -> Result<PromptBook, Box<dyn Error>> {
    match &config.prompts_dir {
        Some(dir) if dir.is_dir() => PromptBook::load_dir(dir),
        Some(dir) => {
            debug!("Prompts directory {} not found, using built-ins", dir.display());
            Ok(PromptBook::builtin())
        }
        None => Ok(PromptBook::builtin()),
    }
}

/// Write the config (unless one exists and `force` is off), then create and seed
/// the database it points to.
fn init(config_path: &Path, force: bool) -> Result<(), Box<dyn Error>> {
    let base_dir = config_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    let config = if config_path.exists() && !force {
        info!("Keeping existing config file: {}", config_path.display());
        config::load_config(config_path)?
    } else {
        let prompts_dir = base_dir.join("prompts");
        info!("Creating prompts directory: {}", prompts_dir.display());
        fs::create_dir_all(&prompts_dir)?;
        let config = BizbotConfig {
            database_url: base_dir.join("bizbot.db").to_string_lossy().into_owned(),
            prompts_dir: Some(prompts_dir),
            ..BizbotConfig::default()
        };
        config::save_config(&config, config_path)?;
        config
    };

    let mut runtime_config = config;
    runtime_config.apply_process_env();
    let mut conn = open_store(&runtime_config)?;
    let report = seed::seed_sample_data(&mut conn)?;

    println!("Config:   {}", config_path.display());
    println!("Database: {}", runtime_config.database_url);
    println!(
        "Seeded {} businesses, {} bot configs, {} intents.",
        report.businesses, report.bot_configs, report.intents
    );
    Ok(())
}

fn business(conn: &mut SqliteConnection, command: BusinessCommand) -> Result<(), Box<dyn Error>> {
    match command {
        BusinessCommand::List => {
            for b in store::list_businesses(conn)? {
                println!(
                    "{:>4}  {:<12} {:<24} {:<28} {}",
                    b.id.unwrap_or_default(),
                    b.business_type,
                    b.name,
                    b.contact_email.as_deref().unwrap_or("-"),
                    if b.is_active { "active" } else { "inactive" }
                );
            }
        }
        BusinessCommand::Add {
            name,
            business_type,
            email,
        } => {
            let business = store::create_business(conn, &name, &business_type, email.as_deref())?;
            println!(
                "Created business {} ({}).",
                business.id.unwrap_or_default(),
                business.business_type
            );
        }
        BusinessCommand::Update {
            id,
            name,
            email,
            clear_email,
            active,
        } => {
            let changes = BusinessChanges {
                name,
                contact_email: if clear_email { Some(None) } else { email.map(Some) },
                is_active: active,
            };
            let business = store::update_business(conn, id, &changes)?
                .ok_or_else(|| format!("No business with id {id}"))?;
            println!("Updated business {id}: {business:?}");
        }
        BusinessCommand::Remove { id } => {
            if !store::delete_business(conn, id)? {
                return Err(format!("No business with id {id}").into());
            }
            println!("Removed business {id}.");
        }
    }
    Ok(())
}

fn intent(conn: &mut SqliteConnection, command: IntentCommand) -> Result<(), Box<dyn Error>> {
    match command {
        IntentCommand::List { business_type } => {
            for i in store::list_intents(conn, business_type.as_deref())? {
                println!(
                    "{:>4}  {:<12} {:<24} p={:<3} {}  {}",
                    i.id.unwrap_or_default(),
                    i.business_type,
                    i.intent_name,
                    i.priority,
                    if i.is_active { " " } else { "x" },
                    i.response_text
                );
            }
        }
        IntentCommand::Add {
            business_type,
            intent_name,
            response,
            examples,
            priority,
        } => {
            let mut new_intent =
                BusinessIntent::new(&business_type, &intent_name, &response)
                    .with_training_examples(&examples);
            new_intent.priority = priority;
            let created = store::create_intent(conn, &new_intent)?;
            println!(
                "Created intent {} ({}/{}).",
                created.id.unwrap_or_default(),
                created.business_type,
                created.intent_name
            );
        }
        IntentCommand::Update {
            id,
            response,
            examples,
            priority,
            active,
        } => {
            let changes = IntentChanges {
                response_text: response,
                training_examples: examples,
                priority,
                is_active: active,
            };
            store::update_intent(conn, id, &changes)?
                .ok_or_else(|| format!("No intent with id {id}"))?;
            println!("Updated intent {id}.");
        }
        IntentCommand::Remove { id } => {
            if !store::delete_intent(conn, id)? {
                return Err(format!("No intent with id {id}").into());
            }
            println!("Removed intent {id}.");
        }
    }
    Ok(())
}

fn bot_config(conn: &mut SqliteConnection, command: BotConfigCommand) -> Result<(), Box<dyn Error>> {
    match command {
        BotConfigCommand::List => {
            for c in store::list_bot_configs(conn)? {
                println!(
                    "{:<12} llm_fallback={:<5} greeting={:?}",
                    c.business_type, c.enable_llm_fallback, c.default_greeting
                );
            }
        }
        BotConfigCommand::Show { business_type } => {
            let c = store::bot_config_for(conn, &business_type)?
                .ok_or_else(|| format!("No bot config for {business_type}"))?;
            println!("Business type:   {}", c.business_type);
            println!("Greeting:        {}", c.default_greeting);
            println!("Fallback:        {}", c.default_fallback);
            println!("Voice support:   {}", c.enable_voice_support);
            println!("Multilingual:    {}", c.enable_multilingual);
            println!("LLM fallback:    {}", c.enable_llm_fallback);
        }
        BotConfigCommand::Set {
            business_type,
            greeting,
            fallback,
            voice,
            multilingual,
            llm_fallback,
        } => {
            let changes = BotConfigChanges {
                default_greeting: greeting,
                default_fallback: fallback,
                enable_voice_support: voice,
                enable_multilingual: multilingual,
                enable_llm_fallback: llm_fallback,
            };
            let config = store::upsert_bot_config(conn, &business_type, &changes)?;
            println!("Saved bot config for {}.", config.business_type);
        }
    }
    Ok(())
}

fn admin(conn: &mut SqliteConnection, command: AdminCommand) -> Result<(), Box<dyn Error>> {
    match command {
        AdminCommand::Create {
            name,
            email,
            password,
            admin,
            business_id,
        } => {
            let user = store::create_admin_user(conn, &name, &email, &password, admin, business_id)?;
            println!(
                "Created {} account {} ({}).",
                if user.is_admin { "admin" } else { "operator" },
                user.id.unwrap_or_default(),
                user.email
            );
        }
        AdminCommand::List => {
            for u in store::list_admin_users(conn)? {
                println!(
                    "{:>4}  {:<28} {:<24} {:<8} {}",
                    u.id.unwrap_or_default(),
                    u.email,
                    u.name,
                    if u.is_admin { "admin" } else { "operator" },
                    u.business_id
                        .map(|id| format!("business {id}"))
                        .unwrap_or_else(|| "-".to_string())
                );
            }
        }
    }
    Ok(())
}
