//! # Dispatcher
//!
//! The per-message pipeline. Given what the dialogue engine detected for a user
//! message, the dispatcher picks one of three answers:
//!
//! - **canned**: the tenant's stored response for the detected intent;
//! - **LLM**: a generated reply, when no intent was detected, the intent is
//!   `nlu_fallback`, or the confidence is under `fallback_threshold`;
//! - **static fallback**: the tenant's `default_fallback` text, when the canned
//!   response is missing or the tenant disabled LLM fallback.
//!
//! A message's `business_type` selects the tenant and is remembered by the
//! session; messages without one reuse the session's tenant.
//!
//! Every exchange is appended to the session context and, when `log_exchanges`
//! is on, to `chatbot_logs`.
//!
//! ```no_run
//! use bizbot::config::BizbotConfig;
//! use bizbot::dispatcher::{Dispatcher, IncomingMessage};
//! use bizbot::prompt::PromptBook;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let config = BizbotConfig::default();
//! let mut dispatcher = Dispatcher::from_config(&config, PromptBook::builtin())?;
//! let reply = dispatcher
//!     .handle(&IncomingMessage::new("session-1", "where is my order?")
//!         .with_business_type("retail")
//!         .with_intent("track_order", 0.92))
//!     .await?;
//! println!("{}", reply.text);
//! # Ok(()) }
//! ```

use crossterm::{
    ExecutableCommand,
    style::{Attribute, Color, Print, SetAttribute, SetForegroundColor},
};
use diesel::prelude::*;
use std::{
    error::Error,
    io::{BufRead, Write, stdin, stdout},
};
use tracing::{debug, warn};

use crate::config::{BizbotConfig, establish_connection};
use crate::fallback::LlmFallback;
use crate::llm::get_llm_client;
use crate::prompt::PromptBook;
use crate::store::{self, DEFAULT_FALLBACK, normalize_business_type};

/// Intent name the dialogue engine uses for "no match".
pub const NLU_FALLBACK_INTENT: &str = "nlu_fallback";

/// One user message, as classified by the dialogue engine.
#[derive(Debug, Clone, PartialEq)]
pub struct IncomingMessage {
    pub session_id: String,
    pub business_type: Option<String>,
    pub text: String,
    pub intent: Option<String>,
    pub confidence: f32,
}

impl IncomingMessage {
    /// A message with no detected intent.
    pub fn new(session_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            business_type: None,
            text: text.into(),
            intent: None,
            confidence: 0.0,
        }
    }

    pub fn with_business_type(mut self, business_type: impl Into<String>) -> Self {
        self.business_type = Some(business_type.into());
        self
    }

    pub fn with_intent(mut self, intent: impl Into<String>, confidence: f32) -> Self {
        self.intent = Some(intent.into());
        self.confidence = confidence;
        self
    }

    /// Parse console input. `/name` triggers intent `name` with full confidence;
    /// anything else carries no intent.
    pub fn from_console(session_id: &str, business_type: Option<&str>, line: &str) -> Self {
        let line = line.trim();
        let mut message = Self::new(session_id, line);
        message.business_type = business_type.map(str::to_string);
        if let Some(command) = line.strip_prefix('/') {
            if let Some(intent) = command.split_whitespace().next() {
                message = message.with_intent(intent, 1.0);
            }
        }
        message
    }
}

/// Which path produced a [`BotReply`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplySource {
    Intent,
    StaticFallback,
    Llm,
    /// The LLM call failed and the user was asked to rephrase.
    LlmUnavailable,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BotReply {
    pub text: String,
    pub source: ReplySource,
    /// Business type the message was answered for, if known.
    pub business_type: Option<String>,
}

pub struct Dispatcher {
    conn: SqliteConnection,
    fallback: LlmFallback,
    fallback_threshold: f32,
    log_exchanges: bool,
}

impl Dispatcher {
    pub fn new(conn: SqliteConnection, fallback: LlmFallback, config: &BizbotConfig) -> Self {
        Self {
            conn,
            fallback,
            fallback_threshold: config.llm.fallback_threshold,
            log_exchanges: config.log_exchanges,
        }
    }

    /// Open the configured database and LLM provider.
    pub fn from_config(config: &BizbotConfig, prompts: PromptBook) -> Result<Self, Box<dyn Error>> {
        let conn = establish_connection(&config.database_url)?;
        let client = get_llm_client(&config.llm, None);
        let fallback = LlmFallback::new(client, prompts, &config.llm);
        Ok(Self::new(conn, fallback, config))
    }

    pub fn fallback(&self) -> &LlmFallback {
        &self.fallback
    }

    pub fn connection(&mut self) -> &mut SqliteConnection {
        &mut self.conn
    }

    fn wants_llm(&self, message: &IncomingMessage) -> bool {
        match message.intent.as_deref() {
            None | Some(NLU_FALLBACK_INTENT) => true,
            Some(_) => message.confidence < self.fallback_threshold,
        }
    }

    fn llm_enabled_for(&mut self, business_type: Option<&str>) -> QueryResult<bool> {
        let Some(business_type) = business_type else {
            return Ok(true);
        };
        Ok(store::bot_config_for(&mut self.conn, business_type)?
            .is_none_or(|config| config.enable_llm_fallback))
    }

    /// Answer one message.
    ///
    /// # Errors
    /// Only database errors. LLM failures become a rephrase request.
    pub async fn handle(&mut self, message: &IncomingMessage) -> Result<BotReply, Box<dyn Error>> {
        let slot = message
            .business_type
            .as_deref()
            .map(normalize_business_type)
            .filter(|bt| !bt.is_empty());
        // A business type on the message switches the session to that tenant.
        let contexts = self.fallback.contexts_mut();
        let business_type = match slot {
            Some(slot) => {
                contexts.set_business_type(&message.session_id, slot.clone());
                Some(slot)
            }
            None => contexts.get_business_type(&message.session_id),
        };
        let bt = business_type.as_deref();
        debug!(
            "Handling message for session {} (business type {:?}, intent {:?}, confidence {})",
            message.session_id, bt, message.intent, message.confidence
        );

        let (text, source) = if self.wants_llm(message) {
            if self.llm_enabled_for(bt)? {
                let reply = self
                    .fallback
                    .run(&message.session_id, &message.text, bt)
                    .await;
                let source = if reply.generated {
                    ReplySource::Llm
                } else {
                    ReplySource::LlmUnavailable
                };
                (reply.text, source)
            } else {
                let text = store::fallback_text(&mut self.conn, bt)?;
                self.fallback
                    .record_exchange(&message.session_id, &message.text, &text);
                (text, ReplySource::StaticFallback)
            }
        } else {
            let intent = message.intent.as_deref().unwrap_or_default();
            let (text, source) = match bt {
                None => (DEFAULT_FALLBACK.to_string(), ReplySource::StaticFallback),
                Some(bt) => match store::lookup_response(&mut self.conn, bt, intent)? {
                    Some(response) => (response, ReplySource::Intent),
                    None => (
                        store::fallback_text(&mut self.conn, Some(bt))?,
                        ReplySource::StaticFallback,
                    ),
                },
            };
            self.fallback
                .record_exchange(&message.session_id, &message.text, &text);
            (text, source)
        };

        if self.log_exchanges {
            if let Err(err) = store::log_exchange(
                &mut self.conn,
                bt,
                &message.text,
                &text,
                message.intent.as_deref(),
            ) {
                warn!("Failed to log exchange: {err}");
            }
        }

        Ok(BotReply {
            text,
            source,
            business_type,
        })
    }

    /// The greeting for `business_type`, or the built-in default.
    pub fn greeting(&mut self, business_type: Option<&str>) -> QueryResult<String> {
        store::greeting_text(&mut self.conn, business_type)
    }
}

/// Chat on the console until the user types `exit` or `quit`, or closes stdin.
pub async fn interactive_mode(
    dispatcher: &mut Dispatcher,
    session_id: &str,
    business_type: Option<&str>,
) -> Result<(), Box<dyn Error>> {
    let mut stdout = stdout();
    print_bot_line(&mut stdout, &dispatcher.greeting(business_type)?)?;

    let mut lines = stdin().lock().lines();
    loop {
        stdout.execute(SetForegroundColor(Color::Green))?;
        stdout.execute(Print("\nYou: "))?;
        stdout.execute(SetForegroundColor(Color::Reset))?;
        stdout.flush()?;

        let Some(line) = lines.next().transpose()? else {
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if matches!(input.to_lowercase().as_str(), "exit" | "quit") {
            break;
        }

        let message = IncomingMessage::from_console(session_id, business_type, input);
        let reply = dispatcher.handle(&message).await?;
        print_bot_line(&mut stdout, &reply.text)?;
    }
    Ok(())
}

fn print_bot_line(stdout: &mut std::io::Stdout, text: &str) -> Result<(), Box<dyn Error>> {
    stdout.execute(SetForegroundColor(Color::Blue))?;
    stdout.execute(SetAttribute(Attribute::Bold))?;
    stdout.execute(Print(format!("Bot: {text}\n")))?;
    stdout.execute(SetAttribute(Attribute::Reset))?;
    stdout.execute(SetForegroundColor(Color::Reset))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Turn;
    use crate::fallback::REPHRASE_REPLY;
    use crate::llm::testing::{RecordedRequests, ScriptedClient};
    use crate::models::BotConfigChanges;
    use crate::prompt::builtin_prompt;
    use crate::seed::seed_sample_data;
    use crate::store::test_connection;

    fn dispatcher_with(replies: Vec<Result<&str, &str>>) -> (Dispatcher, RecordedRequests) {
        let config = BizbotConfig::default();
        let mut conn = test_connection();
        seed_sample_data(&mut conn).unwrap();
        let (client, requests) = ScriptedClient::new(replies);
        let fallback = LlmFallback::new(Box::new(client), PromptBook::builtin(), &config.llm);
        (Dispatcher::new(conn, fallback, &config), requests)
    }

    #[tokio::test]
    async fn test_confident_intent_gets_canned_response() {
        let (mut dispatcher, requests) = dispatcher_with(vec![]);

        let reply = dispatcher
            .handle(
                &IncomingMessage::new("s1", "where is my order")
                    .with_business_type("Retail")
                    .with_intent("track_order", 0.95),
            )
            .await
            .unwrap();

        assert_eq!(reply.source, ReplySource::Intent);
        assert_eq!(
            reply.text,
            "I can help you track your order. Please provide your order number."
        );
        assert_eq!(reply.business_type.as_deref(), Some("retail"));
        assert!(requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_intent_gets_tenant_fallback_text() {
        let (mut dispatcher, _requests) = dispatcher_with(vec![]);

        let reply = dispatcher
            .handle(
                &IncomingMessage::new("s1", "open an account")
                    .with_business_type("retail")
                    .with_intent("open_account", 0.9),
            )
            .await
            .unwrap();

        assert_eq!(reply.source, ReplySource::StaticFallback);
        assert_eq!(reply.text, DEFAULT_FALLBACK);
    }

    #[tokio::test]
    async fn test_canned_lookup_without_business_type() {
        let (mut dispatcher, _requests) = dispatcher_with(vec![]);

        let reply = dispatcher
            .handle(&IncomingMessage::new("s1", "hi").with_intent("greet", 0.99))
            .await
            .unwrap();

        assert_eq!(reply.source, ReplySource::StaticFallback);
        assert_eq!(reply.text, DEFAULT_FALLBACK);
        assert_eq!(reply.business_type, None);
    }

    #[tokio::test]
    async fn test_low_confidence_and_nlu_fallback_go_to_llm() {
        let (mut dispatcher, requests) =
            dispatcher_with(vec![Ok("We have red ones."), Ok("Yes, in blue too.")]);

        let first = dispatcher
            .handle(
                &IncomingMessage::new("s1", "do you sell red shoes?")
                    .with_business_type("retail")
                    .with_intent("track_order", 0.1),
            )
            .await
            .unwrap();
        let second = dispatcher
            .handle(
                &IncomingMessage::new("s1", "and blue?").with_intent(NLU_FALLBACK_INTENT, 0.8),
            )
            .await
            .unwrap();

        assert_eq!(first.source, ReplySource::Llm);
        assert_eq!(first.text, "We have red ones.");
        assert_eq!(second.text, "Yes, in blue too.");
        assert_eq!(second.business_type.as_deref(), Some("retail"));
        assert_eq!(requests.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_message_business_type_switches_session_tenant() {
        let (mut dispatcher, requests) = dispatcher_with(vec![Ok("Our fees are listed online.")]);

        let retail = dispatcher
            .handle(
                &IncomingMessage::new("s1", "hi")
                    .with_business_type("retail")
                    .with_intent("greet", 0.9),
            )
            .await
            .unwrap();
        let finance = dispatcher
            .handle(
                &IncomingMessage::new("s1", "hi")
                    .with_business_type("finance")
                    .with_intent("greet", 0.9),
            )
            .await
            .unwrap();
        let follow_up = dispatcher
            .handle(&IncomingMessage::new("s1", "what are your fees?"))
            .await
            .unwrap();

        assert_eq!(retail.business_type.as_deref(), Some("retail"));
        assert_eq!(finance.business_type.as_deref(), Some("finance"));
        assert_eq!(
            finance.text,
            "Hello! Welcome to our financial services. How can I help you today?"
        );
        assert_eq!(follow_up.business_type.as_deref(), Some("finance"));
        assert_eq!(
            requests.lock().unwrap()[0].1[0],
            Turn::system(builtin_prompt(Some("finance")))
        );
        let logs = store::recent_logs(dispatcher.connection(), None, 5).unwrap();
        let finance_id = store::find_business_by_type(dispatcher.connection(), "finance")
            .unwrap()
            .and_then(|b| b.id);
        assert_eq!(logs[1].business_id, finance_id);
    }

    #[tokio::test]
    async fn test_canned_exchange_is_visible_to_later_llm_call() {
        let (mut dispatcher, requests) = dispatcher_with(vec![Ok("Any other questions?")]);

        dispatcher
            .handle(
                &IncomingMessage::new("s1", "hello")
                    .with_business_type("finance")
                    .with_intent("greet", 0.97),
            )
            .await
            .unwrap();
        dispatcher
            .handle(&IncomingMessage::new("s1", "what are your fees?"))
            .await
            .unwrap();

        let requests = requests.lock().unwrap();
        let (_, context) = &requests[0];
        assert_eq!(
            &context[1..],
            &[
                Turn::user("hello"),
                Turn::assistant(
                    "Hello! Welcome to our financial services. How can I help you today?"
                ),
            ]
        );
    }

    #[tokio::test]
    async fn test_disabled_llm_fallback_uses_static_text() {
        let (mut dispatcher, requests) = dispatcher_with(vec![]);
        store::upsert_bot_config(
            dispatcher.connection(),
            "healthcare",
            &BotConfigChanges {
                enable_llm_fallback: Some(false),
                default_fallback: Some("Please call the front desk.".to_string()),
                ..BotConfigChanges::default()
            },
        )
        .unwrap();

        let reply = dispatcher
            .handle(&IncomingMessage::new("s1", "my knee hurts").with_business_type("healthcare"))
            .await
            .unwrap();

        assert_eq!(reply.source, ReplySource::StaticFallback);
        assert_eq!(reply.text, "Please call the front desk.");
        assert!(requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_llm_error_becomes_rephrase_and_is_logged() {
        let (mut dispatcher, _requests) = dispatcher_with(vec![Err("connection reset")]);

        let reply = dispatcher
            .handle(&IncomingMessage::new("s1", "???").with_business_type("retail"))
            .await
            .unwrap();

        assert_eq!(reply.source, ReplySource::LlmUnavailable);
        assert_eq!(reply.text, REPHRASE_REPLY);
        let logs = store::recent_logs(dispatcher.connection(), None, 5).unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].bot_response, REPHRASE_REPLY);
        assert!(logs[0].business_id.is_some());
    }

    #[tokio::test]
    async fn test_logging_can_be_disabled() {
        let config = BizbotConfig {
            log_exchanges: false,
            ..BizbotConfig::default()
        };
        let mut conn = test_connection();
        seed_sample_data(&mut conn).unwrap();
        let (client, _requests) = ScriptedClient::new(vec![]);
        let fallback = LlmFallback::new(Box::new(client), PromptBook::builtin(), &config.llm);
        let mut dispatcher = Dispatcher::new(conn, fallback, &config);

        dispatcher
            .handle(
                &IncomingMessage::new("s1", "bye")
                    .with_business_type("retail")
                    .with_intent("goodbye", 0.9),
            )
            .await
            .unwrap();

        assert!(store::recent_logs(dispatcher.connection(), None, 5).unwrap().is_empty());
    }

    #[test]
    fn test_console_shorthand() {
        let message = IncomingMessage::from_console("s1", Some("retail"), "  /track_order now ");
        assert_eq!(message.intent.as_deref(), Some("track_order"));
        assert_eq!(message.confidence, 1.0);
        assert_eq!(message.business_type.as_deref(), Some("retail"));

        let plain = IncomingMessage::from_console("s1", None, "hello there");
        assert_eq!(plain.intent, None);
        assert_eq!(plain.text, "hello there");

        assert_eq!(IncomingMessage::from_console("s1", None, "/").intent, None);
    }

    #[test]
    fn test_greeting_uses_bot_config() {
        let (mut dispatcher, _requests) = dispatcher_with(vec![]);

        assert_eq!(
            dispatcher.greeting(Some("retail")).unwrap(),
            "Welcome to our retail service! How can I help you today?"
        );
        assert_eq!(dispatcher.greeting(None).unwrap(), store::DEFAULT_GREETING);
    }
}
