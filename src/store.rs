//! # Store
//!
//! All database access for bizbot: schema creation, response lookup, tenant and
//! intent administration, bot configuration, exchange logging and operator
//! accounts.
//!
//! Functions take a `&mut SqliteConnection` so callers decide the connection's
//! lifetime (one per command, or one per dispatcher). Business types and e-mail
//! addresses are normalised (trimmed, lower-cased) on every write and lookup.
//!
//! Multi-row writes run inside a transaction.

use chrono::{SecondsFormat, Utc};
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use std::error::Error;
use tracing::{debug, info};

use crate::models::*;
use crate::schema::{admin_users, bot_configs, business_intents, businesses, chatbot_logs};

/// Idempotent DDL for the whole store. Mirrors `crate::schema`.
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS businesses (
    id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
    name TEXT NOT NULL,
    business_type TEXT NOT NULL UNIQUE,
    contact_email TEXT,
    is_active BOOLEAN NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS business_intents (
    id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
    business_type TEXT NOT NULL,
    intent_name TEXT NOT NULL,
    response_text TEXT NOT NULL,
    training_examples TEXT NOT NULL DEFAULT '',
    priority INTEGER NOT NULL DEFAULT 0,
    is_active BOOLEAN NOT NULL DEFAULT 1,
    UNIQUE (business_type, intent_name)
);

CREATE TABLE IF NOT EXISTS bot_configs (
    id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
    business_type TEXT NOT NULL UNIQUE,
    default_greeting TEXT NOT NULL,
    default_fallback TEXT NOT NULL,
    enable_voice_support BOOLEAN NOT NULL DEFAULT 1,
    enable_multilingual BOOLEAN NOT NULL DEFAULT 1,
    enable_llm_fallback BOOLEAN NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS admin_users (
    id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
    name TEXT NOT NULL,
    email TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,
    is_admin BOOLEAN NOT NULL DEFAULT 0,
    business_id INTEGER REFERENCES businesses (id) ON DELETE SET NULL
);

CREATE TABLE IF NOT EXISTS chatbot_logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
    business_id INTEGER REFERENCES businesses (id) ON DELETE SET NULL,
    user_message TEXT NOT NULL,
    bot_response TEXT NOT NULL,
    intent_detected TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_chatbot_logs_business ON chatbot_logs (business_id);
"#;

/// Used when a business has no bot configuration.
pub const DEFAULT_FALLBACK: &str =
    "I'm not sure I understand. Could you please rephrase your question?";

/// Used when a business has no bot configuration.
pub const DEFAULT_GREETING: &str = "Hello! How can I help you today?";

#[cfg(not(test))]
const PASSWORD_HASH_COST: u32 = bcrypt::DEFAULT_COST;
#[cfg(test)]
const PASSWORD_HASH_COST: u32 = 4;

pub fn normalize_business_type(business_type: &str) -> String {
    business_type.trim().to_lowercase()
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Create every table that does not exist yet.
pub fn initialize_schema(conn: &mut SqliteConnection) -> QueryResult<()> {
    conn.batch_execute(SCHEMA_SQL)
}

/// Dashboard figures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
    pub businesses: i64,
    pub intents: i64,
    pub admin_users: i64,
    pub logs: i64,
}

pub fn stats(conn: &mut SqliteConnection) -> QueryResult<Stats> {
    Ok(Stats {
        businesses: businesses::table.count().get_result(conn)?,
        intents: business_intents::table.count().get_result(conn)?,
        admin_users: admin_users::table.count().get_result(conn)?,
        logs: chatbot_logs::table.count().get_result(conn)?,
    })
}

// --- Businesses --------------------------------------------------------------------------------

/// The bot configuration a new business starts with.
pub fn default_bot_config(business_type: &str, business_name: Option<&str>) -> BotConfig {
    let default_greeting = match business_name {
        Some(name) => format!("Welcome to {name}! How can I help you today?"),
        None => format!("Welcome to our {business_type} service! How can I help you today?"),
    };
    BotConfig {
        id: None,
        business_type: business_type.to_string(),
        default_greeting,
        default_fallback: "I'm not sure I understand. Could you rephrase that?".to_string(),
        enable_voice_support: true,
        enable_multilingual: true,
        enable_llm_fallback: true,
    }
}

/// Insert a business together with its default bot configuration.
///
/// An existing bot configuration for the same business type is kept.
pub fn create_business(
    conn: &mut SqliteConnection,
    name: &str,
    business_type: &str,
    contact_email: Option<&str>,
) -> QueryResult<Business> {
    let business_type = normalize_business_type(business_type);
    conn.transaction(|conn| {
        let business = diesel::insert_into(businesses::table)
            .values(&Business {
                id: None,
                name: name.to_string(),
                business_type: business_type.clone(),
                contact_email: contact_email.map(str::to_string),
                is_active: true,
            })
            .returning(Business::as_returning())
            .get_result(conn)?;

        diesel::insert_or_ignore_into(bot_configs::table)
            .values(&default_bot_config(&business_type, Some(name)))
            .execute(conn)?;

        info!("Created business {:?} ({})", business.name, business.business_type);
        Ok(business)
    })
}

pub fn list_businesses(conn: &mut SqliteConnection) -> QueryResult<Vec<Business>> {
    businesses::table
        .order(businesses::business_type.asc())
        .select(Business::as_select())
        .load(conn)
}

pub fn find_business_by_type(
    conn: &mut SqliteConnection,
    business_type: &str,
) -> QueryResult<Option<Business>> {
    businesses::table
        .filter(businesses::business_type.eq(normalize_business_type(business_type)))
        .select(Business::as_select())
        .first(conn)
        .optional()
}

pub fn get_business(conn: &mut SqliteConnection, id: i32) -> QueryResult<Option<Business>> {
    businesses::table
        .find(id)
        .select(Business::as_select())
        .first(conn)
        .optional()
}

/// Apply `changes`; `Ok(None)` when no business has `id`.
pub fn update_business(
    conn: &mut SqliteConnection,
    id: i32,
    changes: &BusinessChanges,
) -> QueryResult<Option<Business>> {
    if changes.is_empty() {
        return get_business(conn, id);
    }
    diesel::update(businesses::table.find(id))
        .set(changes)
        .returning(Business::as_returning())
        .get_result(conn)
        .optional()
}

/// Remove a business with its bot configuration and intents.
///
/// Logs and operator accounts that referenced it keep their rows with a `NULL`
/// business. Returns whether the business existed.
pub fn delete_business(conn: &mut SqliteConnection, id: i32) -> QueryResult<bool> {
    conn.transaction(|conn| {
        let Some(business) = get_business(conn, id)? else {
            return Ok(false);
        };
        diesel::delete(
            business_intents::table
                .filter(business_intents::business_type.eq(&business.business_type)),
        )
        .execute(conn)?;
        diesel::delete(
            bot_configs::table.filter(bot_configs::business_type.eq(&business.business_type)),
        )
        .execute(conn)?;
        diesel::delete(businesses::table.find(id)).execute(conn)?;
        info!("Deleted business {:?} ({})", business.name, business.business_type);
        Ok(true)
    })
}

// --- Intents -----------------------------------------------------------------------------------

/// Insert a canned response. A second row for the same `(business_type, intent_name)`
/// fails with a unique-violation error.
pub fn create_intent(
    conn: &mut SqliteConnection,
    intent: &BusinessIntent,
) -> QueryResult<BusinessIntent> {
    let intent = BusinessIntent {
        id: None,
        business_type: normalize_business_type(&intent.business_type),
        intent_name: intent.intent_name.trim().to_string(),
        ..intent.clone()
    };
    diesel::insert_into(business_intents::table)
        .values(&intent)
        .returning(BusinessIntent::as_returning())
        .get_result(conn)
}

/// Intents ordered by business type, then priority (highest first), then name.
pub fn list_intents(
    conn: &mut SqliteConnection,
    business_type: Option<&str>,
) -> QueryResult<Vec<BusinessIntent>> {
    let mut query = business_intents::table.into_boxed();
    if let Some(business_type) = business_type {
        query = query
            .filter(business_intents::business_type.eq(normalize_business_type(business_type)));
    }
    query
        .order((
            business_intents::business_type.asc(),
            business_intents::priority.desc(),
            business_intents::intent_name.asc(),
        ))
        .select(BusinessIntent::as_select())
        .load(conn)
}

pub fn get_intent(conn: &mut SqliteConnection, id: i32) -> QueryResult<Option<BusinessIntent>> {
    business_intents::table
        .find(id)
        .select(BusinessIntent::as_select())
        .first(conn)
        .optional()
}

/// Apply `changes`; `Ok(None)` when no intent has `id`.
pub fn update_intent(
    conn: &mut SqliteConnection,
    id: i32,
    changes: &IntentChanges,
) -> QueryResult<Option<BusinessIntent>> {
    if changes.is_empty() {
        return get_intent(conn, id);
    }
    diesel::update(business_intents::table.find(id))
        .set(changes)
        .returning(BusinessIntent::as_returning())
        .get_result(conn)
        .optional()
}

pub fn delete_intent(conn: &mut SqliteConnection, id: i32) -> QueryResult<bool> {
    let deleted = diesel::delete(business_intents::table.find(id)).execute(conn)?;
    Ok(deleted > 0)
}

/// The active canned response for `(business_type, intent_name)`, if any.
pub fn lookup_response(
    conn: &mut SqliteConnection,
    business_type: &str,
    intent_name: &str,
) -> QueryResult<Option<String>> {
    let response = business_intents::table
        .filter(business_intents::business_type.eq(normalize_business_type(business_type)))
        .filter(business_intents::intent_name.eq(intent_name.trim()))
        .filter(business_intents::is_active.eq(true))
        .select(business_intents::response_text)
        .first::<String>(conn)
        .optional()?;
    debug!("Lookup ({business_type}, {intent_name}) -> {:?}", response);
    Ok(response)
}

// --- Bot configuration -------------------------------------------------------------------------

pub fn bot_config_for(
    conn: &mut SqliteConnection,
    business_type: &str,
) -> QueryResult<Option<BotConfig>> {
    bot_configs::table
        .filter(bot_configs::business_type.eq(normalize_business_type(business_type)))
        .select(BotConfig::as_select())
        .first(conn)
        .optional()
}

pub fn list_bot_configs(conn: &mut SqliteConnection) -> QueryResult<Vec<BotConfig>> {
    bot_configs::table
        .order(bot_configs::business_type.asc())
        .select(BotConfig::as_select())
        .load(conn)
}

/// Update the configuration of `business_type`, creating it from
/// [`default_bot_config`] first when missing.
pub fn upsert_bot_config(
    conn: &mut SqliteConnection,
    business_type: &str,
    changes: &BotConfigChanges,
) -> QueryResult<BotConfig> {
    let business_type = normalize_business_type(business_type);
    conn.transaction(|conn| {
        let existing = bot_config_for(conn, &business_type)?;
        let config = match existing {
            Some(config) => config,
            None => diesel::insert_into(bot_configs::table)
                .values(&default_bot_config(&business_type, None))
                .returning(BotConfig::as_returning())
                .get_result(conn)?,
        };
        if changes.is_empty() {
            return Ok(config);
        }
        diesel::update(bot_configs::table.filter(bot_configs::business_type.eq(&business_type)))
            .set(changes)
            .returning(BotConfig::as_returning())
            .get_result(conn)
    })
}

/// The static fallback text for `business_type`.
pub fn fallback_text(
    conn: &mut SqliteConnection,
    business_type: Option<&str>,
) -> QueryResult<String> {
    let config = match business_type {
        Some(business_type) => bot_config_for(conn, business_type)?,
        None => None,
    };
    Ok(config
        .map(|c| c.default_fallback)
        .unwrap_or_else(|| DEFAULT_FALLBACK.to_string()))
}

/// The greeting for `business_type`.
pub fn greeting_text(
    conn: &mut SqliteConnection,
    business_type: Option<&str>,
) -> QueryResult<String> {
    let config = match business_type {
        Some(business_type) => bot_config_for(conn, business_type)?,
        None => None,
    };
    Ok(config
        .map(|c| c.default_greeting)
        .unwrap_or_else(|| DEFAULT_GREETING.to_string()))
}

// --- Logs --------------------------------------------------------------------------------------

/// Append one exchange to `chatbot_logs`.
pub fn log_exchange(
    conn: &mut SqliteConnection,
    business_type: Option<&str>,
    user_message: &str,
    bot_response: &str,
    intent_detected: Option<&str>,
) -> QueryResult<ChatbotLog> {
    let business_id = match business_type {
        Some(business_type) => find_business_by_type(conn, business_type)?.and_then(|b| b.id),
        None => None,
    };
    diesel::insert_into(chatbot_logs::table)
        .values(&ChatbotLog {
            id: None,
            business_id,
            user_message: user_message.to_string(),
            bot_response: bot_response.to_string(),
            intent_detected: intent_detected.map(str::to_string),
            created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        })
        .returning(ChatbotLog::as_returning())
        .get_result(conn)
}

/// Newest logs first, optionally for one business.
pub fn recent_logs(
    conn: &mut SqliteConnection,
    business_id: Option<i32>,
    limit: i64,
) -> QueryResult<Vec<ChatbotLog>> {
    let mut query = chatbot_logs::table.into_boxed();
    if let Some(business_id) = business_id {
        query = query.filter(chatbot_logs::business_id.eq(business_id));
    }
    query
        .order(chatbot_logs::id.desc())
        .limit(limit)
        .select(ChatbotLog::as_select())
        .load(conn)
}

// --- Operator accounts -------------------------------------------------------------------------

/// Create an operator account with a bcrypt-hashed password.
pub fn create_admin_user(
    conn: &mut SqliteConnection,
    name: &str,
    email: &str,
    password: &str,
    is_admin: bool,
    business_id: Option<i32>,
) -> Result<AdminUser, Box<dyn Error>> {
    let password_hash = bcrypt::hash(password, PASSWORD_HASH_COST)?;
    let user = diesel::insert_into(admin_users::table)
        .values(&AdminUser {
            id: None,
            name: name.to_string(),
            email: normalize_email(email),
            password_hash,
            is_admin,
            business_id,
        })
        .returning(AdminUser::as_returning())
        .get_result(conn)?;
    info!("Created operator account {}", user.email);
    Ok(user)
}

pub fn list_admin_users(conn: &mut SqliteConnection) -> QueryResult<Vec<AdminUser>> {
    admin_users::table
        .order(admin_users::email.asc())
        .select(AdminUser::as_select())
        .load(conn)
}

/// The account for `email` if `password` matches its hash.
pub fn verify_admin_credentials(
    conn: &mut SqliteConnection,
    email: &str,
    password: &str,
) -> Result<Option<AdminUser>, Box<dyn Error>> {
    let user = admin_users::table
        .filter(admin_users::email.eq(normalize_email(email)))
        .select(AdminUser::as_select())
        .first(conn)
        .optional()?;
    match user {
        Some(user) if bcrypt::verify(password, &user.password_hash)? => Ok(Some(user)),
        _ => Ok(None),
    }
}

/// A fresh in-memory database with the schema applied.
#[cfg(test)]
pub(crate) fn test_connection() -> SqliteConnection {
    let mut conn = crate::config::establish_connection(":memory:").expect("in-memory sqlite");
    initialize_schema(&mut conn).expect("schema");
    conn
}

#[cfg(test)]
mod tests {
    use super::*;
    use diesel::result::{DatabaseErrorKind, Error as DieselError};

    #[test]
    fn test_initialize_schema_is_idempotent() {
        let mut conn = test_connection();
        assert!(initialize_schema(&mut conn).is_ok());
        assert_eq!(
            stats(&mut conn).unwrap(),
            Stats {
                businesses: 0,
                intents: 0,
                admin_users: 0,
                logs: 0
            }
        );
    }

    #[test]
    fn test_create_business_adds_default_bot_config() {
        let mut conn = test_connection();

        let business =
            create_business(&mut conn, "ABC Retail", " Retail ", Some("shop@example.com")).unwrap();

        assert_eq!(business.business_type, "retail");
        let config = bot_config_for(&mut conn, "retail").unwrap().unwrap();
        assert_eq!(
            config.default_greeting,
            "Welcome to ABC Retail! How can I help you today?"
        );
        assert_eq!(
            config.default_fallback,
            "I'm not sure I understand. Could you rephrase that?"
        );
    }

    #[test]
    fn test_duplicate_business_type_rolls_back() {
        let mut conn = test_connection();
        create_business(&mut conn, "ABC Retail", "retail", None).unwrap();

        let err = create_business(&mut conn, "Other Retail", "retail", None).unwrap_err();

        assert!(matches!(
            err,
            DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)
        ));
        assert_eq!(list_businesses(&mut conn).unwrap().len(), 1);
    }

    #[test]
    fn test_lookup_response_respects_tenant_and_active_flag() {
        let mut conn = test_connection();
        create_intent(
            &mut conn,
            &BusinessIntent::new("retail", "greet", "Welcome to the store!"),
        )
        .unwrap();
        let clinic_greet = create_intent(
            &mut conn,
            &BusinessIntent::new("healthcare", "greet", "Welcome to the clinic!"),
        )
        .unwrap();

        assert_eq!(
            lookup_response(&mut conn, "RETAIL", "greet").unwrap().as_deref(),
            Some("Welcome to the store!")
        );
        assert_eq!(lookup_response(&mut conn, "finance", "greet").unwrap(), None);

        update_intent(
            &mut conn,
            clinic_greet.id.unwrap(),
            &IntentChanges {
                is_active: Some(false),
                ..IntentChanges::default()
            },
        )
        .unwrap();
        assert_eq!(lookup_response(&mut conn, "healthcare", "greet").unwrap(), None);
    }

    #[test]
    fn test_duplicate_intent_is_rejected() {
        let mut conn = test_connection();
        create_intent(&mut conn, &BusinessIntent::new("retail", "greet", "Hi")).unwrap();

        let err =
            create_intent(&mut conn, &BusinessIntent::new("retail", "greet", "Hello")).unwrap_err();

        assert!(matches!(
            err,
            DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)
        ));
    }

    #[test]
    fn test_list_intents_orders_by_priority() {
        let mut conn = test_connection();
        let mut urgent = BusinessIntent::new("retail", "track_order", "Order number?");
        urgent.priority = 10;
        create_intent(&mut conn, &BusinessIntent::new("retail", "greet", "Hi")).unwrap();
        create_intent(&mut conn, &urgent).unwrap();
        create_intent(&mut conn, &BusinessIntent::new("finance", "greet", "Hello")).unwrap();

        let names: Vec<String> = list_intents(&mut conn, Some("retail"))
            .unwrap()
            .into_iter()
            .map(|i| i.intent_name)
            .collect();

        assert_eq!(names, vec!["track_order", "greet"]);
        assert_eq!(list_intents(&mut conn, None).unwrap().len(), 3);
    }

    #[test]
    fn test_update_and_delete_missing_rows() {
        let mut conn = test_connection();
        let changes = IntentChanges {
            response_text: Some("x".to_string()),
            ..IntentChanges::default()
        };

        assert_eq!(update_intent(&mut conn, 42, &changes).unwrap(), None);
        assert!(!delete_intent(&mut conn, 42).unwrap());
        assert!(!delete_business(&mut conn, 42).unwrap());
    }

    #[test]
    fn test_delete_business_removes_tenant_rows_and_keeps_logs() {
        let mut conn = test_connection();
        let business = create_business(&mut conn, "ABC Retail", "retail", None).unwrap();
        create_intent(&mut conn, &BusinessIntent::new("retail", "greet", "Hi")).unwrap();
        log_exchange(&mut conn, Some("retail"), "hi", "Hi", Some("greet")).unwrap();

        assert!(delete_business(&mut conn, business.id.unwrap()).unwrap());

        assert!(list_intents(&mut conn, Some("retail")).unwrap().is_empty());
        assert!(bot_config_for(&mut conn, "retail").unwrap().is_none());
        let logs = recent_logs(&mut conn, None, 10).unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].business_id, None);
    }

    #[test]
    fn test_upsert_bot_config_creates_then_updates() {
        let mut conn = test_connection();

        let created = upsert_bot_config(&mut conn, "bakery", &BotConfigChanges::default()).unwrap();
        assert_eq!(
            created.default_greeting,
            "Welcome to our bakery service! How can I help you today?"
        );

        let updated = upsert_bot_config(
            &mut conn,
            "bakery",
            &BotConfigChanges {
                default_fallback: Some("Sorry, ask me about bread.".to_string()),
                enable_llm_fallback: Some(false),
                ..BotConfigChanges::default()
            },
        )
        .unwrap();

        assert_eq!(updated.id, created.id);
        assert_eq!(updated.default_fallback, "Sorry, ask me about bread.");
        assert!(!updated.enable_llm_fallback);
        assert_eq!(list_bot_configs(&mut conn).unwrap().len(), 1);
    }

    #[test]
    fn test_fallback_and_greeting_defaults() {
        let mut conn = test_connection();
        create_business(&mut conn, "ABC Retail", "retail", None).unwrap();

        assert_eq!(
            fallback_text(&mut conn, Some("retail")).unwrap(),
            "I'm not sure I understand. Could you rephrase that?"
        );
        assert_eq!(fallback_text(&mut conn, Some("unknown")).unwrap(), DEFAULT_FALLBACK);
        assert_eq!(fallback_text(&mut conn, None).unwrap(), DEFAULT_FALLBACK);
        assert_eq!(greeting_text(&mut conn, None).unwrap(), DEFAULT_GREETING);
    }

    #[test]
    fn test_logs_newest_first_and_filtered_by_business() {
        let mut conn = test_connection();
        let retail = create_business(&mut conn, "ABC Retail", "retail", None).unwrap();
        create_business(&mut conn, "HealthCare Plus", "healthcare", None).unwrap();

        log_exchange(&mut conn, Some("retail"), "first", "a", None).unwrap();
        log_exchange(&mut conn, Some("healthcare"), "second", "b", None).unwrap();
        log_exchange(&mut conn, Some("retail"), "third", "c", Some("greet")).unwrap();
        log_exchange(&mut conn, Some("nobody"), "fourth", "d", None).unwrap();

        let retail_logs = recent_logs(&mut conn, retail.id, 10).unwrap();
        let messages: Vec<&str> = retail_logs.iter().map(|l| l.user_message.as_str()).collect();
        assert_eq!(messages, vec!["third", "first"]);
        assert_eq!(retail_logs[0].intent_detected.as_deref(), Some("greet"));

        let latest = recent_logs(&mut conn, None, 2).unwrap();
        assert_eq!(latest[0].user_message, "fourth");
        assert_eq!(latest[0].business_id, None);
        assert_eq!(latest.len(), 2);
    }

    #[test]
    fn test_admin_credentials() {
        let mut conn = test_connection();
        let user = create_admin_user(
            &mut conn,
            "Admin User",
            "Admin@Example.com",
            "admin123",
            true,
            None,
        )
        .unwrap();

        assert_eq!(user.email, "admin@example.com");
        assert_ne!(user.password_hash, "admin123");

        let verified = verify_admin_credentials(&mut conn, "admin@example.com", "admin123").unwrap();
        assert_eq!(verified.map(|u| u.id), Some(user.id));
        assert!(
            verify_admin_credentials(&mut conn, "admin@example.com", "wrong")
                .unwrap()
                .is_none()
        );
        assert!(
            verify_admin_credentials(&mut conn, "ghost@example.com", "admin123")
                .unwrap()
                .is_none()
        );
        assert_eq!(list_admin_users(&mut conn).unwrap().len(), 1);
    }
}
