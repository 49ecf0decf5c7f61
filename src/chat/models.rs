//! The core models for a conversation with a persona.
use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub enum Role {
    #[serde(rename = "user")]
    User,
    #[serde(rename = "assistant")]
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a message within one conversation. Issued by a counter
/// that only moves forward until the conversation is cleared.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MessageId(pub u64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct Message {
    pub id: MessageId,
    pub role: Role,
    pub text: String,
}

impl Message {
    pub fn new(id: MessageId, role: Role, text: &str) -> Self {
        Message {
            id,
            role,
            text: text.to_string(),
        }
    }
}

/// Ordered log of messages. Array order always equals id order since
/// messages are only ever appended or removed.
#[derive(Default, Clone, Debug)]
pub struct Transcript(Vec<Message>);

impl Transcript {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn messages(&self) -> &[Message] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub(crate) fn push(&mut self, msg: Message) {
        self.0.push(msg)
    }

    pub fn get(&self, id: MessageId) -> Option<&Message> {
        self.0.iter().find(|m| m.id == id)
    }

    pub(crate) fn get_mut(&mut self, id: MessageId) -> Option<&mut Message> {
        self.0.iter_mut().find(|m| m.id == id)
    }

    pub(crate) fn remove(&mut self, id: MessageId) -> Option<Message> {
        let idx = self.0.iter().position(|m| m.id == id)?;
        Some(self.0.remove(idx))
    }

    pub(crate) fn clear(&mut self) {
        self.0.clear()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Message> {
        self.0.iter()
    }

    pub fn last(&self) -> Option<&Message> {
        self.0.last()
    }
}

/// The newest assistant message by log position, scanning from the
/// tail. This is the only message a reroll may target.
pub fn latest_assistant_id(log: &Transcript) -> Option<MessageId> {
    log.iter()
        .rev()
        .find(|m| m.role == Role::Assistant)
        .map(|m| m.id)
}
