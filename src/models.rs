//! # Database models
//!
//! Data structures that map to the SQLite schema via **Diesel**.
//!
//! - [`Business`]: a tenant, identified by its unique `business_type`.
//! - [`BusinessIntent`]: a canned response for one `(business_type, intent_name)` pair.
//! - [`BotConfig`]: per-tenant greeting/fallback text and feature flags.
//! - [`AdminUser`]: an operator account with a bcrypt password hash.
//! - [`ChatbotLog`]: an append-only record of one bot exchange.
//!
//! Row structs double as insert payloads: `id` is optional so Diesel leaves it to
//! the database on insert. The `*Changes` structs are partial updates; a `None`
//! field is left untouched.
//!
//! ```no_run
//! use diesel::prelude::*;
//! use bizbot::models::BusinessIntent;
//! use bizbot::schema::business_intents;
//!
//! # fn demo(conn: &mut SqliteConnection) -> Result<(), Box<dyn std::error::Error>> {
//! let intent: BusinessIntent = diesel::insert_into(business_intents::table)
//!     .values(&BusinessIntent::new("retail", "greet", "Hello!"))
//!     .returning(BusinessIntent::as_returning())
//!     .get_result(conn)?;
//! assert!(intent.id.is_some());
//! # Ok(()) }
//! ```
use diesel::prelude::*;

/// A tenant of the chatbot.
///
/// ### Table
/// - `businesses`
///
/// `business_type` is unique and is the join key used by intents, bot configs and
/// the dialogue pipeline. It is stored lower-cased.
#[derive(Queryable, Selectable, Insertable, Debug, Clone, PartialEq)]
#[diesel(table_name = crate::schema::businesses)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Business {
    /// Auto-increment primary key (set by the DB on insert).
    #[diesel(deserialize_as = i32)]
    pub id: Option<i32>,
    /// Display name, e.g. `ABC Retail`.
    pub name: String,
    /// Tenant discriminator, e.g. `retail`.
    pub business_type: String,
    pub contact_email: Option<String>,
    pub is_active: bool,
}

/// Partial update for a [`Business`].
#[derive(AsChangeset, Debug, Default, Clone)]
#[diesel(table_name = crate::schema::businesses)]
pub struct BusinessChanges {
    pub name: Option<String>,
    pub contact_email: Option<Option<String>>,
    pub is_active: Option<bool>,
}

impl BusinessChanges {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.contact_email.is_none() && self.is_active.is_none()
    }
}

/// One canned response.
///
/// ### Table
/// - `business_intents`
///
/// ### Notes
/// - `(business_type, intent_name)` is unique.
/// - `training_examples` is a `;`-separated list of example utterances used when
///   exporting NLU training data. It may be empty.
/// - Higher `priority` sorts first in listings.
#[derive(Queryable, Selectable, Insertable, Debug, Clone, PartialEq)]
#[diesel(table_name = crate::schema::business_intents)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct BusinessIntent {
    /// Auto-increment primary key (set by the DB on insert).
    #[diesel(deserialize_as = i32)]
    pub id: Option<i32>,
    pub business_type: String,
    pub intent_name: String,
    pub response_text: String,
    pub training_examples: String,
    pub priority: i32,
    pub is_active: bool,
}

impl BusinessIntent {
    /// An active, priority-0 intent without training phrases.
    pub fn new(business_type: &str, intent_name: &str, response_text: &str) -> Self {
        Self {
            id: None,
            business_type: business_type.to_string(),
            intent_name: intent_name.to_string(),
            response_text: response_text.to_string(),
            training_examples: String::new(),
            priority: 0,
            is_active: true,
        }
    }

    /// Builder-style setter for the `;`-separated training phrases.
    pub fn with_training_examples(mut self, training_examples: &str) -> Self {
        self.training_examples = training_examples.to_string();
        self
    }

    /// Split `training_examples` on `;`, trimming and dropping empty phrases.
    pub fn training_phrases(&self) -> Vec<&str> {
        self.training_examples
            .split(';')
            .map(str::trim)
            .filter(|phrase| !phrase.is_empty())
            .collect()
    }
}

/// Partial update for a [`BusinessIntent`].
#[derive(AsChangeset, Debug, Default, Clone)]
#[diesel(table_name = crate::schema::business_intents)]
pub struct IntentChanges {
    pub response_text: Option<String>,
    pub training_examples: Option<String>,
    pub priority: Option<i32>,
    pub is_active: Option<bool>,
}

impl IntentChanges {
    pub fn is_empty(&self) -> bool {
        self.response_text.is_none()
            && self.training_examples.is_none()
            && self.priority.is_none()
            && self.is_active.is_none()
    }
}

/// Per-tenant bot configuration. One row per `business_type`.
///
/// ### Table
/// - `bot_configs`
#[derive(Queryable, Selectable, Insertable, Debug, Clone, PartialEq)]
#[diesel(table_name = crate::schema::bot_configs)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct BotConfig {
    /// Auto-increment primary key (set by the DB on insert).
    #[diesel(deserialize_as = i32)]
    pub id: Option<i32>,
    pub business_type: String,
    /// Sent when a conversation opens.
    pub default_greeting: String,
    /// Sent when no canned response matches and the LLM is not used.
    pub default_fallback: String,
    pub enable_voice_support: bool,
    pub enable_multilingual: bool,
    /// When `false`, low-confidence messages get `default_fallback` instead of an LLM reply.
    pub enable_llm_fallback: bool,
}

/// Partial update for a [`BotConfig`].
#[derive(AsChangeset, Debug, Default, Clone)]
#[diesel(table_name = crate::schema::bot_configs)]
pub struct BotConfigChanges {
    pub default_greeting: Option<String>,
    pub default_fallback: Option<String>,
    pub enable_voice_support: Option<bool>,
    pub enable_multilingual: Option<bool>,
    pub enable_llm_fallback: Option<bool>,
}

impl BotConfigChanges {
    pub fn is_empty(&self) -> bool {
        self.default_greeting.is_none()
            && self.default_fallback.is_none()
            && self.enable_voice_support.is_none()
            && self.enable_multilingual.is_none()
            && self.enable_llm_fallback.is_none()
    }
}

/// An operator account.
///
/// ### Table
/// - `admin_users`
///
/// `password_hash` is a bcrypt hash; plain passwords never reach the database.
/// Non-admin users are scoped to `business_id`.
#[derive(Queryable, Selectable, Insertable, Debug, Clone, PartialEq)]
#[diesel(table_name = crate::schema::admin_users)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct AdminUser {
    /// Auto-increment primary key (set by the DB on insert).
    #[diesel(deserialize_as = i32)]
    pub id: Option<i32>,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub is_admin: bool,
    pub business_id: Option<i32>,
}

/// One logged exchange between a user and the bot.
///
/// ### Table
/// - `chatbot_logs`
///
/// `created_at` is an RFC 3339 UTC timestamp. `business_id` is `NULL` when the
/// message arrived for a business type with no `businesses` row.
#[derive(Queryable, Selectable, Insertable, Debug, Clone, PartialEq)]
#[diesel(table_name = crate::schema::chatbot_logs)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ChatbotLog {
    /// Auto-increment primary key (set by the DB on insert).
    #[diesel(deserialize_as = i32)]
    pub id: Option<i32>,
    pub business_id: Option<i32>,
    pub user_message: String,
    pub bot_response: String,
    pub intent_detected: Option<String>,
    pub created_at: String,
}
