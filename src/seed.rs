//! Sample tenants for a fresh database: a retail shop, a clinic and a financial
//! services firm, each with a bot configuration and a handful of intents.
//!
//! Every row is inserted with `INSERT OR IGNORE`, so seeding twice (or seeding
//! over operator edits) changes nothing that already exists.

use diesel::prelude::*;
use tracing::info;

use crate::models::{BotConfig, Business, BusinessIntent};
use crate::schema::{bot_configs, business_intents, businesses};
use crate::store::DEFAULT_FALLBACK;

const SAMPLE_BUSINESSES: &[(&str, &str, &str)] = &[
    ("ABC Retail", "retail", "retail@example.com"),
    ("HealthCare Plus", "healthcare", "healthcare@example.com"),
    ("Finance Solutions", "finance", "finance@example.com"),
];

const GREET_PHRASES: &str = "hi;hello;hey;good morning";
const GOODBYE_PHRASES: &str = "bye;goodbye;see you;later";
const BOT_CHALLENGE_PHRASES: &str = "are you a bot;are you human";

/// `(business_type, intent_name, response_text, training_examples)`
const SAMPLE_INTENTS: &[(&str, &str, &str, &str)] = &[
    (
        "retail",
        "greet",
        "Hello! Welcome to our retail store. How can I assist you today?",
        GREET_PHRASES,
    ),
    (
        "retail",
        "goodbye",
        "Thank you for shopping with us. Have a great day!",
        GOODBYE_PHRASES,
    ),
    (
        "retail",
        "bot_challenge",
        "I'm a bot designed to help with retail inquiries.",
        BOT_CHALLENGE_PHRASES,
    ),
    (
        "retail",
        "track_order",
        "I can help you track your order. Please provide your order number.",
        "where is my order;track order;order status",
    ),
    (
        "retail",
        "return_policy",
        "Our return policy allows returns within 30 days of purchase with receipt.",
        "can I return;what's your return policy;how to return",
    ),
    (
        "healthcare",
        "greet",
        "Hello! Welcome to our healthcare service. How can I assist you today?",
        GREET_PHRASES,
    ),
    (
        "healthcare",
        "goodbye",
        "Take care and stay healthy!",
        GOODBYE_PHRASES,
    ),
    (
        "healthcare",
        "bot_challenge",
        "I'm a virtual assistant designed to help with healthcare inquiries.",
        BOT_CHALLENGE_PHRASES,
    ),
    (
        "healthcare",
        "schedule_appointment",
        "I'd be happy to help you schedule an appointment. What type of specialist do you need to see?",
        "book appointment;schedule appointment;see a doctor",
    ),
    (
        "finance",
        "greet",
        "Hello! Welcome to our financial services. How can I help you today?",
        GREET_PHRASES,
    ),
    (
        "finance",
        "goodbye",
        "Thank you for using our financial services. Have a great day!",
        GOODBYE_PHRASES,
    ),
    (
        "finance",
        "bot_challenge",
        "I'm a virtual assistant designed to help with financial inquiries.",
        BOT_CHALLENGE_PHRASES,
    ),
    (
        "finance",
        "open_account",
        "I can help you open a new account. Would you prefer a checking or savings account?",
        "open account;new account;create account",
    ),
];

/// Rows actually inserted by [`seed_sample_data`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SeedReport {
    pub businesses: usize,
    pub bot_configs: usize,
    pub intents: usize,
}

/// Insert the sample tenants, skipping rows that already exist.
pub fn seed_sample_data(conn: &mut SqliteConnection) -> QueryResult<SeedReport> {
    conn.transaction(|conn| {
        let mut report = SeedReport::default();

        for (name, business_type, email) in SAMPLE_BUSINESSES {
            report.businesses += diesel::insert_or_ignore_into(businesses::table)
                .values(&Business {
                    id: None,
                    name: name.to_string(),
                    business_type: business_type.to_string(),
                    contact_email: Some(email.to_string()),
                    is_active: true,
                })
                .execute(conn)?;

            report.bot_configs += diesel::insert_or_ignore_into(bot_configs::table)
                .values(&BotConfig {
                    id: None,
                    business_type: business_type.to_string(),
                    default_greeting: format!(
                        "Welcome to our {business_type} service! How can I help you today?"
                    ),
                    default_fallback: DEFAULT_FALLBACK.to_string(),
                    enable_voice_support: true,
                    enable_multilingual: true,
                    enable_llm_fallback: true,
                })
                .execute(conn)?;
        }

        for (business_type, intent_name, response_text, training_examples) in SAMPLE_INTENTS {
            let intent = BusinessIntent::new(business_type, intent_name, response_text)
                .with_training_examples(training_examples);
            report.intents += diesel::insert_or_ignore_into(business_intents::table)
                .values(&intent)
                .execute(conn)?;
        }

        info!(
            "Seeded {} businesses, {} bot configs, {} intents",
            report.businesses, report.bot_configs, report.intents
        );
        Ok(report)
    })
}
