use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::core::{Conversation, PendingReply};
use super::error::Rejection;
use super::models::{Message, MessageId};
use crate::gateway::CompletionGateway;

/// Resolves the system prompt at the moment a request is issued, so a
/// character change mid conversation only affects later requests.
#[async_trait]
pub trait SystemPromptSource: Send + Sync {
    async fn current_system_prompt(&self) -> String;
}

/// Releases the request guard when a `send` or `reroll` future is
/// dropped before its reply settles, e.g. by a timeout around it.
struct ReleaseOnDrop {
    conversation: Arc<Mutex<Conversation>>,
    seq: u64,
    armed: bool,
}

impl Drop for ReleaseOnDrop {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let seq = self.seq;
        if let Ok(mut conversation) = self.conversation.try_lock() {
            conversation.abandon(seq);
            return;
        }
        // Someone else holds the lock, release it once they are done
        let conversation = self.conversation.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    conversation.lock().await.abandon(seq);
                });
            }
            Err(_) => tracing::warn!("Request {} dropped outside a runtime, guard kept", seq),
        }
    }
}

/// A conversation wired to a gateway and a prompt source.
///
/// Cloning shares the same conversation. The lock is only held while
/// state changes, never across the network call, so edits, deletes and
/// clears from another task go through while a reply is pending.
#[derive(Clone)]
pub struct ChatSession {
    conversation: Arc<Mutex<Conversation>>,
    gateway: Arc<dyn CompletionGateway>,
    prompts: Arc<dyn SystemPromptSource>,
}

impl ChatSession {
    pub fn new(gateway: Arc<dyn CompletionGateway>, prompts: Arc<dyn SystemPromptSource>) -> Self {
        Self {
            conversation: Arc::new(Mutex::new(Conversation::new())),
            gateway,
            prompts,
        }
    }

    /// Sends a user message and waits for the reply. Failed requests
    /// still produce a reply (the failure text).
    pub async fn send(&self, user_text: &str) -> Result<MessageId, Rejection> {
        let system_prompt = self.prompts.current_system_prompt().await;
        let pending = self
            .conversation
            .lock()
            .await
            .begin_send(user_text, &system_prompt)?;
        self.complete(pending).await
    }

    pub async fn reroll(&self, id: MessageId) -> Result<MessageId, Rejection> {
        let system_prompt = self.prompts.current_system_prompt().await;
        let pending = self
            .conversation
            .lock()
            .await
            .begin_reroll(id, &system_prompt)?;
        self.complete(pending).await
    }

    /// Rerolls whatever the newest assistant reply is right now.
    pub async fn reroll_latest(&self) -> Result<MessageId, Rejection> {
        let latest = self.conversation.lock().await.latest_assistant_id();
        match latest {
            Some(id) => self.reroll(id).await,
            None => Err(Rejection::NothingToReroll),
        }
    }

    async fn complete(&self, mut pending: PendingReply) -> Result<MessageId, Rejection> {
        let mut guard = ReleaseOnDrop {
            conversation: self.conversation.clone(),
            seq: pending.seq(),
            armed: true,
        };
        let request = pending.request.clone();
        let reply = tokio::select! {
            _ = pending.aborted() => None,
            reply = self.gateway.complete(&request.message, &request.system_prompt) => Some(reply),
        };

        let result = match reply {
            Some(reply) => self.conversation.lock().await.settle(pending, &reply),
            None => {
                tracing::debug!("Request aborted before the reply arrived");
                Err(Rejection::Superseded)
            }
        };
        guard.armed = false;
        result
    }

    pub async fn edit(&self, id: MessageId, new_text: &str) -> Result<(), Rejection> {
        self.conversation.lock().await.edit(id, new_text)
    }

    pub async fn delete(&self, id: MessageId) -> Result<Message, Rejection> {
        self.conversation.lock().await.delete(id)
    }

    pub async fn clear(&self) {
        self.conversation.lock().await.clear()
    }

    /// Runs `f` against the current state, e.g. to project it into a
    /// view.
    pub async fn read<R>(&self, f: impl FnOnce(&Conversation) -> R) -> R {
        f(&*self.conversation.lock().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::models::Role;
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;
    use tokio::sync::Notify;

    struct FixedPrompt(StdMutex<String>);

    impl FixedPrompt {
        fn new(prompt: &str) -> Arc<Self> {
            Arc::new(Self(StdMutex::new(prompt.to_string())))
        }

        fn set(&self, prompt: &str) {
            *self.0.lock().unwrap() = prompt.to_string();
        }
    }

    #[async_trait]
    impl SystemPromptSource for FixedPrompt {
        async fn current_system_prompt(&self) -> String {
            self.0.lock().unwrap().clone()
        }
    }

    /// Echoes the request and records what it was called with.
    #[derive(Default)]
    struct EchoGateway {
        calls: StdMutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl CompletionGateway for EchoGateway {
        async fn complete(&self, message: &str, system_prompt: &str) -> String {
            let mut calls = self.calls.lock().unwrap();
            calls.push((message.to_string(), system_prompt.to_string()));
            format!("echo #{}: {}", calls.len(), message)
        }
    }

    /// Holds every reply until released.
    #[derive(Default)]
    struct GatedGateway {
        release: Notify,
    }

    #[async_trait]
    impl CompletionGateway for GatedGateway {
        async fn complete(&self, message: &str, _system_prompt: &str) -> String {
            self.release.notified().await;
            format!("late: {}", message)
        }
    }

    /// Never answers the first request, echoes after that.
    #[derive(Default)]
    struct StallFirstGateway {
        stalled: AtomicBool,
    }

    #[async_trait]
    impl CompletionGateway for StallFirstGateway {
        async fn complete(&self, message: &str, _system_prompt: &str) -> String {
            if !self.stalled.swap(true, Ordering::SeqCst) {
                std::future::pending::<()>().await;
            }
            format!("reply: {}", message)
        }
    }

    async fn wait_until_busy(session: &ChatSession) {
        tokio::time::timeout(Duration::from_secs(1), async {
            while !session.read(|c| c.is_busy()).await {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("request never started");
    }

    #[tokio::test]
    async fn test_send_appends_reply() {
        let gateway = Arc::new(EchoGateway::default());
        let session = ChatSession::new(gateway.clone(), FixedPrompt::new("be brief"));

        let id = session.send("hello").await.unwrap();
        assert_eq!(id, MessageId(1));

        let (roles, texts) = session
            .read(|c| {
                let roles: Vec<Role> = c.log().iter().map(|m| m.role).collect();
                let texts: Vec<String> = c.log().iter().map(|m| m.text.clone()).collect();
                (roles, texts)
            })
            .await;
        assert_eq!(roles, vec![Role::User, Role::Assistant]);
        assert_eq!(texts, vec!["hello", "echo #1: hello"]);
        assert_eq!(
            gateway.calls.lock().unwrap().clone(),
            vec![("hello".to_string(), "be brief".to_string())]
        );
    }

    #[tokio::test]
    async fn test_prompt_read_at_request_time() {
        let gateway = Arc::new(EchoGateway::default());
        let prompts = FixedPrompt::new("pirate");
        let session = ChatSession::new(gateway.clone(), prompts.clone());

        session.send("one").await.unwrap();
        prompts.set("robot");
        session.send("two").await.unwrap();
        session.reroll_latest().await.unwrap();

        let calls = gateway.calls.lock().unwrap().clone();
        assert_eq!(calls[0].1, "pirate");
        assert_eq!(calls[1].1, "robot");
        // Reroll resends the last user text with the current prompt
        assert_eq!(calls[2], ("two".to_string(), "robot".to_string()));
    }

    #[tokio::test]
    async fn test_reroll_swaps_latest_reply() {
        let session = ChatSession::new(Arc::new(EchoGateway::default()), FixedPrompt::new(""));
        let first = session.send("hi").await.unwrap();
        let second = session.reroll(first).await.unwrap();

        assert!(second > first);
        let (ids, stats) = session
            .read(|c| (c.log().iter().map(|m| m.id).collect::<Vec<_>>(), c.stats()))
            .await;
        assert_eq!(ids, vec![MessageId(0), second]);
        assert_eq!(stats.turn_count, 1);
        assert_eq!(stats.reroll_count, 1);
    }

    #[tokio::test]
    async fn test_reroll_latest_with_empty_log() {
        let session = ChatSession::new(Arc::new(EchoGateway::default()), FixedPrompt::new(""));
        assert_eq!(
            session.reroll_latest().await.unwrap_err(),
            Rejection::NothingToReroll
        );
    }

    #[tokio::test]
    async fn test_send_rejected_while_reply_pending() {
        let gateway = Arc::new(GatedGateway::default());
        let session = ChatSession::new(gateway.clone(), FixedPrompt::new(""));

        let background = session.clone();
        let handle = tokio::spawn(async move { background.send("first").await });
        wait_until_busy(&session).await;

        assert_eq!(session.send("second").await.unwrap_err(), Rejection::Busy);
        assert_eq!(
            session.reroll(MessageId(0)).await.unwrap_err(),
            Rejection::Busy
        );

        gateway.release.notify_one();
        let id = handle.await.unwrap().unwrap();
        assert_eq!(id, MessageId(1));
        assert_eq!(session.read(|c| c.log().len()).await, 2);
    }

    #[tokio::test]
    async fn test_delete_while_pending_then_reply_lands() {
        let gateway = Arc::new(GatedGateway::default());
        let session = ChatSession::new(gateway.clone(), FixedPrompt::new(""));

        let background = session.clone();
        let handle = tokio::spawn(async move { background.send("question").await });
        wait_until_busy(&session).await;

        session.delete(MessageId(0)).await.unwrap();
        gateway.release.notify_one();
        handle.await.unwrap().unwrap();

        let texts = session
            .read(|c| c.log().iter().map(|m| m.text.clone()).collect::<Vec<_>>())
            .await;
        assert_eq!(texts, vec!["late: question"]);
    }

    #[tokio::test]
    async fn test_clear_while_pending_drops_reply() {
        let gateway = Arc::new(GatedGateway::default());
        let session = ChatSession::new(gateway.clone(), FixedPrompt::new(""));

        let background = session.clone();
        let handle = tokio::spawn(async move { background.send("question").await });
        wait_until_busy(&session).await;

        session.clear().await;
        let result = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("send should return once aborted")
            .unwrap();
        assert_eq!(result.unwrap_err(), Rejection::Superseded);

        assert!(session.read(|c| c.log().is_empty() && !c.is_busy()).await);
    }

    #[tokio::test]
    async fn test_timed_out_send_releases_guard() {
        let session = ChatSession::new(
            Arc::new(StallFirstGateway::default()),
            FixedPrompt::new(""),
        );

        let timed_out = tokio::time::timeout(Duration::from_millis(50), session.send("hi")).await;
        assert!(timed_out.is_err());
        assert!(!session.read(|c| c.is_busy()).await);

        let id = session.send("again").await.unwrap();
        assert_eq!(id, MessageId(2));
        let texts = session
            .read(|c| c.log().iter().map(|m| m.text.clone()).collect::<Vec<_>>())
            .await;
        assert_eq!(texts, vec!["hi", "again", "reply: again"]);
    }

    #[tokio::test]
    async fn test_timed_out_reroll_releases_guard() {
        let gateway = Arc::new(StallFirstGateway::default());
        gateway.stalled.store(true, Ordering::SeqCst);
        let session = ChatSession::new(gateway.clone(), FixedPrompt::new(""));
        let first = session.send("hi").await.unwrap();

        gateway.stalled.store(false, Ordering::SeqCst);
        let timed_out =
            tokio::time::timeout(Duration::from_millis(50), session.reroll(first)).await;
        assert!(timed_out.is_err());
        assert!(!session.read(|c| c.is_busy()).await);

        assert!(session.send("again").await.is_ok());
    }
}
