use serde::Serialize;
use tokio::sync::oneshot;

use super::error::Rejection;
use super::models::{Message, MessageId, Role, Transcript, latest_assistant_id};

/// What gets sent to the backend for one completion attempt.
#[derive(Clone, Debug, PartialEq)]
pub struct CompletionRequest {
    pub message: String,
    pub system_prompt: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestKind {
    Send,
    Reroll,
}

/// A reply the conversation is waiting on. Hand the request to a
/// gateway and pass the result back through `Conversation::settle`.
#[derive(Debug)]
pub struct PendingReply {
    pub request: CompletionRequest,
    pub kind: RequestKind,
    seq: u64,
    aborted: oneshot::Receiver<()>,
}

impl PendingReply {
    pub(crate) fn seq(&self) -> u64 {
        self.seq
    }

    /// Resolves once the conversation gives up on this reply, either
    /// because it was cleared or because it was dropped.
    pub async fn aborted(&mut self) {
        let _ = (&mut self.aborted).await;
    }
}

#[derive(Debug)]
struct InFlight {
    seq: u64,
    abort: oneshot::Sender<()>,
}

#[derive(Default, Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    /// One per user initiated send, rerolls excluded
    pub turn_count: u64,
    pub reroll_count: u64,
    /// Length in chars of the most recently appended message
    pub last_reply_length: usize,
}

/// The conversation state machine.
///
/// Owns the message log, the id counter and the single-flight request
/// guard. Sending and rerolling are split into a `begin_*` step that
/// mutates the log and arms the guard, and `settle` which appends the
/// reply and releases it. Everything in between is the caller's
/// network call, which is the only point where other actions (edit,
/// delete, clear) can interleave.
#[derive(Debug, Default)]
pub struct Conversation {
    log: Transcript,
    next_id: u64,
    in_flight: Option<InFlight>,
    last_user_text: Option<String>,
    stats: SessionStats,
    request_seq: u64,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&self) -> &Transcript {
        &self.log
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn last_user_text(&self) -> Option<&str> {
        self.last_user_text.as_deref()
    }

    pub fn latest_assistant_id(&self) -> Option<MessageId> {
        latest_assistant_id(&self.log)
    }

    fn append(&mut self, role: Role, text: &str) -> MessageId {
        let id = MessageId(self.next_id);
        self.next_id += 1;
        self.stats.last_reply_length = text.chars().count();
        self.log.push(Message::new(id, role, text));
        id
    }

    fn arm(&mut self, kind: RequestKind, request: CompletionRequest) -> PendingReply {
        self.request_seq += 1;
        let (abort, aborted) = oneshot::channel();
        self.in_flight = Some(InFlight {
            seq: self.request_seq,
            abort,
        });
        PendingReply {
            request,
            kind,
            seq: self.request_seq,
            aborted,
        }
    }

    /// Appends the user's message and arms the request guard.
    pub fn begin_send(
        &mut self,
        user_text: &str,
        system_prompt: &str,
    ) -> Result<PendingReply, Rejection> {
        let text = user_text.trim();
        if text.is_empty() {
            return Err(Rejection::EmptyText);
        }
        if self.is_busy() {
            tracing::debug!("Ignoring send while a reply is in flight");
            return Err(Rejection::Busy);
        }

        let id = self.append(Role::User, text);
        self.last_user_text = Some(text.to_string());
        self.stats.turn_count += 1;
        tracing::debug!("Sending message {} (turn {})", id, self.stats.turn_count);

        Ok(self.arm(
            RequestKind::Send,
            CompletionRequest {
                message: text.to_string(),
                system_prompt: system_prompt.to_string(),
            },
        ))
    }

    /// Drops the latest assistant reply and asks for a new one to the
    /// last thing the user sent. Only the newest assistant message can
    /// be rerolled.
    pub fn begin_reroll(
        &mut self,
        id: MessageId,
        system_prompt: &str,
    ) -> Result<PendingReply, Rejection> {
        if self.is_busy() {
            tracing::debug!("Ignoring reroll while a reply is in flight");
            return Err(Rejection::Busy);
        }
        let Some(user_text) = self.last_user_text.clone() else {
            return Err(Rejection::NothingToReroll);
        };
        if self.latest_assistant_id() != Some(id) {
            tracing::debug!("Ignoring reroll of stale message {}", id);
            return Err(Rejection::NotLatestAssistant(id));
        }

        self.log.remove(id);
        self.stats.reroll_count += 1;
        tracing::debug!("Rerolling message {} (reroll {})", id, self.stats.reroll_count);

        Ok(self.arm(
            RequestKind::Reroll,
            CompletionRequest {
                message: user_text,
                system_prompt: system_prompt.to_string(),
            },
        ))
    }

    /// Appends the assistant reply for `pending` and releases the
    /// guard. Replies for requests that were aborted by `clear` are
    /// dropped.
    pub fn settle(&mut self, pending: PendingReply, reply: &str) -> Result<MessageId, Rejection> {
        match &self.in_flight {
            Some(in_flight) if in_flight.seq == pending.seq => {}
            _ => {
                tracing::debug!("Dropping reply for a cleared conversation");
                return Err(Rejection::Superseded);
            }
        }
        self.in_flight = None;
        let id = self.append(Role::Assistant, reply);
        tracing::debug!("Appended reply {} ({:?})", id, pending.kind);
        Ok(id)
    }

    /// Releases the guard for a request whose caller went away before
    /// the reply arrived. The user message stays in the log. Returns
    /// false when `seq` is no longer the request in flight.
    pub(crate) fn abandon(&mut self, seq: u64) -> bool {
        match &self.in_flight {
            Some(in_flight) if in_flight.seq == seq => {
                tracing::debug!("Releasing abandoned request {}", seq);
                self.in_flight = None;
                true
            }
            _ => false,
        }
    }

    /// Replaces the text of a message in place. Role and position are
    /// untouched and no request is made.
    pub fn edit(&mut self, id: MessageId, new_text: &str) -> Result<(), Rejection> {
        let text = new_text.trim();
        if text.is_empty() {
            return Err(Rejection::EmptyText);
        }
        let msg = self.log.get_mut(id).ok_or(Rejection::UnknownMessage(id))?;
        msg.text = text.to_string();
        Ok(())
    }

    /// Removes a message regardless of its role or position.
    pub fn delete(&mut self, id: MessageId) -> Result<Message, Rejection> {
        self.log.remove(id).ok_or(Rejection::UnknownMessage(id))
    }

    /// Resets the conversation. A reply still in flight is aborted and
    /// will not be appended when it arrives.
    pub fn clear(&mut self) {
        if let Some(in_flight) = self.in_flight.take() {
            tracing::debug!("Aborting in flight request on clear");
            let _ = in_flight.abort.send(());
        }
        self.log.clear();
        self.next_id = 0;
        self.last_user_text = None;
        self.stats = SessionStats::default();
    }
}
