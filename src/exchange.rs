use crate::reply::{ReplyError, ReplyGenerator};
use crate::session::{
    ConversationId, ExchangeFailure, Message, Role, Session, SessionError, SessionSnapshot,
    SharedSession,
};
use crate::title::{derive_title, DEFAULT_TITLE_MARKER, DEFAULT_TITLE_MAX_CHARS};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::timeout;

/// Default time allowed for a reply before the exchange is marked failed
pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(30);

/// Tunables for a message exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeSettings {
    pub title_max_chars: usize,
    pub title_marker: String,
    pub reply_timeout: Duration,
}

impl Default for ExchangeSettings {
    fn default() -> Self {
        Self {
            title_max_chars: DEFAULT_TITLE_MAX_CHARS,
            title_marker: DEFAULT_TITLE_MARKER.to_string(),
            reply_timeout: DEFAULT_REPLY_TIMEOUT,
        }
    }
}

/// How a submission ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExchangeOutcome {
    /// Nothing but whitespace was submitted
    Ignored,
    /// The reply was appended; `title` is set when this exchange named the conversation
    Completed {
        conversation_id: ConversationId,
        title: Option<String>,
    },
    /// No reply arrived; the failure is kept on the session for a retry
    Failed {
        conversation_id: ConversationId,
        error: ReplyError,
    },
}

/// Drives a user submission through to its committed reply.
///
/// The controller is the only writer of the session. One exchange runs at a
/// time: each `submit` holds the exchange gate from appending the user message
/// until the reply is committed, so overlapping calls are handled in call order.
/// Navigation (`create_conversation`, `select_*`) only takes the session lock and
/// stays available while a reply is pending.
pub struct ExchangeController<G: ?Sized> {
    session: SharedSession,
    generator: Arc<G>,
    settings: ExchangeSettings,
    gate: Arc<Mutex<()>>,
}

impl<G: ?Sized> Clone for ExchangeController<G> {
    fn clone(&self) -> Self {
        Self {
            session: self.session.clone(),
            generator: self.generator.clone(),
            settings: self.settings.clone(),
            gate: self.gate.clone(),
        }
    }
}

impl<G: ReplyGenerator + ?Sized> ExchangeController<G> {
    pub fn new(session: SharedSession, generator: Arc<G>, settings: ExchangeSettings) -> Self {
        Self {
            session,
            generator,
            settings,
            gate: Arc::new(Mutex::new(())),
        }
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        self.session.lock().await.snapshot()
    }

    pub async fn active_id(&self) -> ConversationId {
        self.session.lock().await.store.active_id()
    }

    /// Submit user text to the active conversation and wait for the reply.
    ///
    /// The target is the conversation active when this is called. If another
    /// exchange is still running, the message waits its turn but keeps that
    /// target, and the reply lands there even if another conversation is
    /// selected in the meantime.
    pub async fn submit(&self, raw: &str) -> ExchangeOutcome {
        let conversation_id = self.active_id().await;
        self.submit_to(conversation_id, raw).await
    }

    /// Submit user text to `conversation_id` and wait for the reply
    pub async fn submit_to(&self, conversation_id: ConversationId, raw: &str) -> ExchangeOutcome {
        if raw.trim().is_empty() {
            tracing::debug!("Ignoring empty submission");
            return ExchangeOutcome::Ignored;
        }

        let _turn = self.gate.lock().await;

        let history = {
            let mut session = self.session.lock().await;
            let Some(history) = session
                .store
                .conversation(conversation_id)
                .map(|conversation| conversation.messages.clone())
            else {
                tracing::warn!(conversation = %conversation_id, "Submission to a missing conversation");
                return ExchangeOutcome::Ignored;
            };
            if let Some(stale) = session.take_failure() {
                tracing::debug!(conversation = %stale.conversation_id, "Discarding failed exchange");
            }

            if let Err(error) = session.store.append_message(conversation_id, Message::user(raw)) {
                tracing::error!(%error, "Could not append user message");
                return ExchangeOutcome::Ignored;
            }
            session.begin_pending(conversation_id);
            history
        };

        tracing::info!(
            conversation = %conversation_id,
            chars = raw.chars().count(),
            generator = self.generator.name(),
            "Submitted message"
        );

        self.await_reply(conversation_id, history, raw.to_string())
            .await
    }

    /// Ask again for the reply of the last failed exchange.
    ///
    /// The user message is already in the conversation, so only the reply is
    /// requested. Returns `None` when there is no failure to retry.
    pub async fn retry(&self) -> Option<ExchangeOutcome> {
        let _turn = self.gate.lock().await;

        let (failure, history) = {
            let mut session = self.session.lock().await;
            let failure = session.take_failure()?;
            let Some(conversation) = session.store.conversation(failure.conversation_id) else {
                tracing::warn!(conversation = %failure.conversation_id, "Failed exchange refers to a missing conversation");
                return None;
            };

            let mut history = conversation.messages.clone();
            if history
                .last()
                .is_some_and(|m| m.role == Role::User && m.content == failure.text)
            {
                history.pop();
            }
            session.begin_pending(failure.conversation_id);
            (failure, history)
        };

        tracing::info!(conversation = %failure.conversation_id, "Retrying reply");
        Some(
            self.await_reply(failure.conversation_id, history, failure.text)
                .await,
        )
    }

    /// Drop the recorded failure without retrying
    pub async fn dismiss_failure(&self) -> bool {
        self.session.lock().await.take_failure().is_some()
    }

    pub async fn create_conversation(&self) -> ConversationId {
        self.session.lock().await.store.create_conversation()
    }

    pub async fn select_conversation(&self, id: ConversationId) -> Result<(), SessionError> {
        self.session.lock().await.store.select_conversation(id)
    }

    pub async fn select_next(&self) -> ConversationId {
        self.session.lock().await.store.select_next()
    }

    pub async fn select_previous(&self) -> ConversationId {
        self.session.lock().await.store.select_previous()
    }

    async fn await_reply(
        &self,
        conversation_id: ConversationId,
        history: Vec<Message>,
        text: String,
    ) -> ExchangeOutcome {
        let limit = self.settings.reply_timeout;
        let result = match timeout(limit, self.generator.generate_reply(&history, &text)).await {
            Ok(result) => result,
            Err(_) => Err(ReplyError::TimedOut(limit)),
        };

        let mut session = self.session.lock().await;
        let outcome = match result {
            Ok(reply) => self.commit_reply(&mut session, conversation_id, &text, reply),
            Err(error) => {
                tracing::warn!(conversation = %conversation_id, %error, "Reply generation failed");
                session.record_failure(ExchangeFailure {
                    conversation_id,
                    text,
                    message: error.to_string(),
                });
                ExchangeOutcome::Failed {
                    conversation_id,
                    error,
                }
            }
        };
        session.clear_pending();
        outcome
    }

    fn commit_reply(
        &self,
        session: &mut Session,
        conversation_id: ConversationId,
        text: &str,
        reply: String,
    ) -> ExchangeOutcome {
        if let Err(error) = session
            .store
            .append_message(conversation_id, Message::assistant(reply))
        {
            tracing::error!(%error, "Could not append reply");
        }

        let needs_title = session
            .store
            .conversation(conversation_id)
            .is_some_and(|c| c.is_placeholder_title());

        let title = if needs_title {
            let title = derive_title(text, self.settings.title_max_chars, &self.settings.title_marker);
            match session.store.set_title(conversation_id, title.clone()) {
                Ok(()) => {
                    tracing::info!(conversation = %conversation_id, title = %title, "Named conversation");
                    Some(title)
                }
                Err(error) => {
                    tracing::error!(%error, "Could not set title");
                    None
                }
            }
        } else {
            None
        };

        tracing::info!(conversation = %conversation_id, "Reply committed");
        ExchangeOutcome::Completed {
            conversation_id,
            title,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reply::testing::{GatedReply, ScriptedReply, SilentReply};
    use crate::session::ConversationDefaults;

    fn controller<G: ReplyGenerator>(generator: Arc<G>) -> ExchangeController<G> {
        ExchangeController::new(
            Session::shared(ConversationDefaults::default()),
            generator,
            ExchangeSettings::default(),
        )
    }

    fn roles(messages: &[Message]) -> Vec<Role> {
        messages.iter().map(|m| m.role).collect()
    }

    #[tokio::test]
    async fn test_whitespace_submission_is_ignored() {
        let generator = Arc::new(ScriptedReply::new());
        let controller = controller(generator.clone());

        let outcome = controller.submit("   \n\t ").await;

        assert_eq!(outcome, ExchangeOutcome::Ignored);
        let snapshot = controller.snapshot().await;
        assert_eq!(snapshot.active_conversation().messages.len(), 1);
        assert!(!snapshot.pending);
        assert!(generator.recorded_calls().is_empty());
    }

    #[tokio::test]
    async fn test_submit_appends_user_then_assistant_and_names_conversation() {
        let generator = Arc::new(ScriptedReply::new());
        generator.queue_reply("Why did the crab cross the road?");
        let controller = controller(generator.clone());

        let outcome = controller.submit("Tell me a joke").await;

        let snapshot = controller.snapshot().await;
        let conversation = snapshot.active_conversation();
        assert_eq!(
            outcome,
            ExchangeOutcome::Completed {
                conversation_id: conversation.id,
                title: Some("Tell me a joke".to_string()),
            }
        );
        assert_eq!(
            roles(&conversation.messages),
            [Role::Assistant, Role::User, Role::Assistant]
        );
        assert_eq!(conversation.messages[1].content, "Tell me a joke");
        assert_eq!(conversation.messages[2].content, "Why did the crab cross the road?");
        assert_eq!(conversation.title, "Tell me a joke");
        assert!(!snapshot.pending);

        let calls = generator.recorded_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].history_len, 1);
        assert_eq!(calls[0].text, "Tell me a joke");
    }

    #[tokio::test]
    async fn test_user_content_keeps_surrounding_whitespace() {
        let controller = controller(Arc::new(ScriptedReply::new()));

        controller.submit("  padded\nsecond line ").await;

        let snapshot = controller.snapshot().await;
        assert_eq!(
            snapshot.active_conversation().messages[1].content,
            "  padded\nsecond line "
        );
    }

    #[tokio::test]
    async fn test_title_is_only_derived_once() {
        let controller = controller(Arc::new(ScriptedReply::new()));

        controller.submit("Tell me a joke").await;
        let outcome = controller.submit("Now tell me a much longer story please").await;

        assert!(matches!(outcome, ExchangeOutcome::Completed { title: None, .. }));
        let snapshot = controller.snapshot().await;
        assert_eq!(snapshot.active_conversation().title, "Tell me a joke");
        assert_eq!(snapshot.active_conversation().messages.len(), 5);
    }

    #[tokio::test]
    async fn test_long_first_message_is_truncated_in_title() {
        let controller = controller(Arc::new(ScriptedReply::new()));
        let text = "What is the capital of Mongolia";
        assert_eq!(text.chars().count(), 31);

        controller.submit(text).await;

        let snapshot = controller.snapshot().await;
        let title = &snapshot.active_conversation().title;
        assert_eq!(title, "What is the capital ...");
        assert_eq!(title.chars().count(), 23);
    }

    #[tokio::test]
    async fn test_reply_lands_in_conversation_it_was_asked_in() {
        let generator = Arc::new(GatedReply::new());
        let controller = controller(generator.clone());
        let asked_in = controller.snapshot().await.active_id;

        let task = tokio::spawn({
            let controller = controller.clone();
            async move { controller.submit("first question").await }
        });
        generator.started.notified().await;

        let pending = controller.snapshot().await;
        assert!(pending.pending);
        assert_eq!(pending.active_conversation().messages.len(), 2);

        let switched_to = controller.create_conversation().await;
        generator.release();
        let outcome = task.await.unwrap();

        assert!(matches!(
            outcome,
            ExchangeOutcome::Completed { conversation_id, .. } if conversation_id == asked_in
        ));

        let snapshot = controller.snapshot().await;
        assert_eq!(snapshot.active_id, switched_to);
        assert!(!snapshot.pending);

        let original = snapshot.conversations.iter().find(|c| c.id == asked_in).unwrap();
        assert_eq!(roles(&original.messages), [Role::Assistant, Role::User, Role::Assistant]);
        assert_eq!(original.messages[2].content, "reply to first question");
        assert_eq!(original.title, "first question");

        let fresh = snapshot.active_conversation();
        assert_eq!(fresh.messages.len(), 1);
        assert!(fresh.is_placeholder_title());
    }

    #[tokio::test]
    async fn test_queued_submit_keeps_the_conversation_it_was_called_in() {
        let generator = Arc::new(GatedReply::new());
        let controller = controller(generator.clone());
        let asked_in = controller.snapshot().await.active_id;

        let first = tokio::spawn({
            let controller = controller.clone();
            async move { controller.submit("first").await }
        });
        generator.started.notified().await;

        // The second submit captures its target, then queues behind the first
        let (second, switched_to) = tokio::join!(controller.submit("second"), async {
            let switched_to = controller.create_conversation().await;
            generator.release();
            generator.started.notified().await;
            generator.release();
            switched_to
        });

        assert!(matches!(
            first.await.unwrap(),
            ExchangeOutcome::Completed { conversation_id, .. } if conversation_id == asked_in
        ));
        assert_eq!(
            second,
            ExchangeOutcome::Completed {
                conversation_id: asked_in,
                title: None,
            }
        );

        let snapshot = controller.snapshot().await;
        assert_eq!(snapshot.active_id, switched_to);
        let original = snapshot.conversations.iter().find(|c| c.id == asked_in).unwrap();
        let contents: Vec<_> = original.messages.iter().skip(1).map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["first", "reply to first", "second", "reply to second"]);
        assert_eq!(snapshot.active_conversation().messages.len(), 1);
    }

    #[tokio::test]
    async fn test_submit_to_missing_conversation_is_ignored() {
        let generator = Arc::new(ScriptedReply::new());
        let controller = controller(generator.clone());

        let outcome = controller.submit_to(ConversationId::new(), "hello").await;

        assert_eq!(outcome, ExchangeOutcome::Ignored);
        assert!(generator.recorded_calls().is_empty());
        assert_eq!(controller.snapshot().await.active_conversation().messages.len(), 1);
    }

    #[tokio::test]
    async fn test_overlapping_submissions_are_serialized() {
        let controller = controller(Arc::new(ScriptedReply::new()));

        let (first, second) = tokio::join!(controller.submit("a"), controller.submit("b"));

        assert!(matches!(first, ExchangeOutcome::Completed { title: Some(_), .. }));
        assert!(matches!(second, ExchangeOutcome::Completed { title: None, .. }));

        let snapshot = controller.snapshot().await;
        let contents: Vec<_> = snapshot
            .active_conversation()
            .messages
            .iter()
            .skip(1)
            .map(|m| m.content.as_str())
            .collect();
        assert_eq!(contents, ["a", "echo: a", "b", "echo: b"]);
    }

    #[tokio::test]
    async fn test_failed_reply_clears_pending_and_can_be_retried() {
        let generator = Arc::new(ScriptedReply::new());
        generator.queue_error(ReplyError::Backend("model unavailable".to_string()));
        generator.queue_reply("second time lucky");
        let controller = controller(generator.clone());

        let outcome = controller.submit("hello?").await;

        assert!(matches!(
            outcome,
            ExchangeOutcome::Failed { error: ReplyError::Backend(_), .. }
        ));
        let snapshot = controller.snapshot().await;
        assert!(!snapshot.pending);
        assert_eq!(roles(&snapshot.active_conversation().messages), [Role::Assistant, Role::User]);
        assert!(snapshot.active_conversation().is_placeholder_title());
        let failure = snapshot.failure.expect("failure recorded");
        assert_eq!(failure.text, "hello?");
        assert!(failure.message.contains("model unavailable"));

        let retried = controller.retry().await;

        assert!(matches!(
            retried,
            Some(ExchangeOutcome::Completed { title: Some(ref t), .. }) if t == "hello?"
        ));
        let snapshot = controller.snapshot().await;
        assert!(snapshot.failure.is_none());
        assert_eq!(
            roles(&snapshot.active_conversation().messages),
            [Role::Assistant, Role::User, Role::Assistant]
        );

        let calls = generator.recorded_calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].history_len, 1);
        assert_eq!(calls[1].text, "hello?");
    }

    #[tokio::test]
    async fn test_retry_without_failure_does_nothing() {
        let generator = Arc::new(ScriptedReply::new());
        let controller = controller(generator.clone());

        assert_eq!(controller.retry().await, None);
        assert!(generator.recorded_calls().is_empty());
        assert!(!controller.dismiss_failure().await);
    }

    #[tokio::test]
    async fn test_new_submission_discards_failure() {
        let generator = Arc::new(ScriptedReply::new());
        generator.queue_error(ReplyError::Backend("flaky".to_string()));
        let controller = controller(generator);

        controller.submit("one").await;
        assert!(controller.snapshot().await.failure.is_some());

        controller.submit("two").await;
        assert!(controller.snapshot().await.failure.is_none());
        assert_eq!(controller.retry().await, None);
    }

    #[tokio::test]
    async fn test_dismiss_failure() {
        let generator = Arc::new(ScriptedReply::new());
        generator.queue_error(ReplyError::Backend("flaky".to_string()));
        let controller = controller(generator);

        controller.submit("one").await;

        assert!(controller.dismiss_failure().await);
        assert!(controller.snapshot().await.failure.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unanswered_reply_times_out() {
        let settings = ExchangeSettings {
            reply_timeout: Duration::from_secs(5),
            ..ExchangeSettings::default()
        };
        let controller = ExchangeController::new(
            Session::shared(ConversationDefaults::default()),
            Arc::new(SilentReply),
            settings,
        );

        let outcome = controller.submit("anyone there?").await;

        assert!(matches!(
            outcome,
            ExchangeOutcome::Failed { error: ReplyError::TimedOut(d), .. } if d == Duration::from_secs(5)
        ));
        let snapshot = controller.snapshot().await;
        assert!(!snapshot.pending);
        assert!(snapshot.failure.is_some());
    }

    #[tokio::test]
    async fn test_navigation_through_controller() {
        let controller = controller(Arc::new(ScriptedReply::new()));
        let first = controller.snapshot().await.active_id;
        let second = controller.create_conversation().await;

        assert_eq!(controller.select_previous().await, first);
        assert_eq!(controller.select_next().await, second);
        controller.select_conversation(first).await.unwrap();
        assert!(controller.select_conversation(ConversationId::new()).await.is_err());
        assert_eq!(controller.snapshot().await.active_id, first);
    }

    #[tokio::test]
    async fn test_every_submission_gets_exactly_one_reply() {
        let controller = controller(Arc::new(ScriptedReply::new()));
        let inputs = ["one", "   ", "two", "", "three"];

        for input in inputs {
            controller.submit(input).await;
        }

        let snapshot = controller.snapshot().await;
        let messages = &snapshot.active_conversation().messages;
        assert_eq!(messages.len(), 1 + 2 * 3);
        for pair in messages[1..].chunks(2) {
            assert_eq!(pair[0].role, Role::User);
            assert_eq!(pair[1].role, Role::Assistant);
            assert_eq!(pair[1].content, format!("echo: {}", pair[0].content));
        }
    }
}
