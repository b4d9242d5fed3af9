//! # LLM fallback
//!
//! Answers messages that no canned intent response covers by asking a language
//! model. For each message the fallback:
//!
//! 1. resolves the session's business type (context metadata first, then the
//!    caller-supplied slot value, which is remembered for later turns);
//! 2. builds the request context: the business system prompt followed by the
//!    session history (history only when context is enabled);
//! 3. calls the client; with context enabled, the user message and the reply
//!    are appended to the session history.
//!
//! The system prompt is sent with every request but never stored in the session
//! history. When the client fails, the user gets [`REPHRASE_REPLY`] and no
//! assistant turn is recorded.

use tracing::{error, info};

use crate::config::LlmSettings;
use crate::context::{ContextManager, Turn};
use crate::llm::LlmClient;
use crate::prompt::PromptBook;

/// Sent to the user when the language model could not be reached.
pub const REPHRASE_REPLY: &str =
    "I'm having trouble understanding. Could you rephrase your question?";

/// Outcome of one fallback call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackReply {
    pub text: String,
    /// `false` when the client failed and [`REPHRASE_REPLY`] was used.
    pub generated: bool,
}

pub struct LlmFallback {
    client: Box<dyn LlmClient>,
    contexts: ContextManager,
    prompts: PromptBook,
    enable_context: bool,
}

impl LlmFallback {
    pub fn new(client: Box<dyn LlmClient>, prompts: PromptBook, settings: &LlmSettings) -> Self {
        Self {
            client,
            contexts: ContextManager::new(settings.max_context_turns),
            prompts,
            enable_context: settings.enable_context,
        }
    }

    pub fn contexts(&self) -> &ContextManager {
        &self.contexts
    }

    pub fn contexts_mut(&mut self) -> &mut ContextManager {
        &mut self.contexts
    }

    /// Resolve and remember the business type of `session_id`.
    pub fn resolve_business_type(
        &mut self,
        session_id: &str,
        slot_business_type: Option<&str>,
    ) -> Option<String> {
        if let Some(known) = self.contexts.get_business_type(session_id) {
            return Some(known);
        }
        let slot = slot_business_type?;
        self.contexts.set_business_type(session_id, slot);
        Some(slot.to_string())
    }

    /// Append an exchange answered elsewhere (a canned response) to the session
    /// history, so a later fallback call sees it. No-op with context disabled.
    pub fn record_exchange(&mut self, session_id: &str, user_message: &str, reply: &str) {
        if self.enable_context {
            self.contexts.add_user_message(session_id, user_message);
            self.contexts.add_assistant_message(session_id, reply);
        }
    }

    pub async fn run(
        &mut self,
        session_id: &str,
        user_message: &str,
        slot_business_type: Option<&str>,
    ) -> FallbackReply {
        let business_type = self.resolve_business_type(session_id, slot_business_type);
        let system_prompt = self.prompts.system_prompt_for(business_type.as_deref());

        let mut request_context = vec![Turn::system(system_prompt)];
        if self.enable_context {
            request_context.extend(self.contexts.get_context_for_llm(session_id));
            self.contexts.add_user_message(session_id, user_message);
        }

        match self
            .client
            .generate_response(user_message, &request_context)
            .await
        {
            Ok(reply) => {
                if self.enable_context {
                    self.contexts.add_assistant_message(session_id, reply.clone());
                }
                info!(
                    "LLM fallback ({}): user message: {:?}, response: {:?}",
                    self.client.provider(),
                    user_message,
                    reply
                );
                FallbackReply {
                    text: reply,
                    generated: true,
                }
            }
            Err(err) => {
                error!("Error using LLM fallback: {err}");
                FallbackReply {
                    text: REPHRASE_REPLY.to_string(),
                    generated: false,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Role;
    use crate::llm::testing::ScriptedClient;
    use crate::prompt::builtin_prompt;

    fn fallback_with(
        replies: Vec<Result<&str, &str>>,
        settings: &LlmSettings,
    ) -> (LlmFallback, crate::llm::testing::RecordedRequests) {
        let (client, requests) = ScriptedClient::new(replies);
        (
            LlmFallback::new(Box::new(client), PromptBook::builtin(), settings),
            requests,
        )
    }

    #[tokio::test]
    async fn test_system_prompt_leads_and_history_excludes_current_message() {
        let settings = LlmSettings::default();
        let (mut fallback, requests) =
            fallback_with(vec![Ok("first reply"), Ok("second reply")], &settings);

        fallback.run("s1", "first question", Some("retail")).await;
        let reply = fallback.run("s1", "second question", None).await;

        assert_eq!(reply.text, "second reply");
        assert!(reply.generated);

        let requests = requests.lock().unwrap();
        let (prompt, context) = &requests[1];
        assert_eq!(prompt, "second question");
        assert_eq!(context[0], Turn::system(builtin_prompt(Some("retail"))));
        assert_eq!(
            &context[1..],
            &[Turn::user("first question"), Turn::assistant("first reply")]
        );
    }

    #[tokio::test]
    async fn test_stored_history_never_contains_system_prompt() {
        let settings = LlmSettings::default();
        let (mut fallback, _requests) = fallback_with(vec![Ok("hi"), Ok("again")], &settings);

        fallback.run("s1", "hello", Some("finance")).await;
        fallback.run("s1", "hello again", None).await;

        let history = fallback.contexts_mut().get_context_for_llm("s1");
        assert_eq!(history.len(), 4);
        assert!(history.iter().all(|turn| turn.role != Role::System));
    }

    #[tokio::test]
    async fn test_session_business_type_wins_over_slot() {
        let settings = LlmSettings::default();
        let (mut fallback, requests) = fallback_with(vec![Ok("a"), Ok("b")], &settings);

        fallback.run("s1", "hi", Some("healthcare")).await;
        fallback.run("s1", "hi", Some("retail")).await;

        let requests = requests.lock().unwrap();
        assert_eq!(
            requests[1].1[0],
            Turn::system(builtin_prompt(Some("healthcare")))
        );
    }

    #[tokio::test]
    async fn test_client_error_yields_rephrase_without_assistant_turn() {
        let settings = LlmSettings::default();
        let (mut fallback, _requests) = fallback_with(vec![Err("timeout")], &settings);

        let reply = fallback.run("s1", "what?", None).await;

        assert_eq!(reply.text, REPHRASE_REPLY);
        assert!(!reply.generated);
        assert_eq!(
            fallback.contexts_mut().get_context_for_llm("s1"),
            vec![Turn::user("what?")]
        );
    }

    #[tokio::test]
    async fn test_context_disabled_sends_only_system_prompt() {
        let settings = LlmSettings {
            enable_context: false,
            ..LlmSettings::default()
        };
        let (mut fallback, requests) = fallback_with(vec![Ok("a"), Ok("b")], &settings);

        fallback.run("s1", "one", None).await;
        fallback.run("s1", "two", None).await;

        let requests = requests.lock().unwrap();
        assert_eq!(requests[1].1, vec![Turn::system(builtin_prompt(None))]);
    }

    #[tokio::test]
    async fn test_history_is_bounded_by_max_context_turns() {
        let settings = LlmSettings {
            max_context_turns: 1,
            ..LlmSettings::default()
        };
        let (mut fallback, requests) =
            fallback_with(vec![Ok("r1"), Ok("r2"), Ok("r3")], &settings);

        for question in ["q1", "q2", "q3"] {
            fallback.run("s1", question, None).await;
        }

        let requests = requests.lock().unwrap();
        assert_eq!(
            &requests[2].1[1..],
            &[Turn::user("q2"), Turn::assistant("r2")]
        );
    }
}
