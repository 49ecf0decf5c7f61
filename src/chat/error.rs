use thiserror::Error;

use super::models::MessageId;

/// Reasons an action against the conversation was ignored. None of
/// these change state; they exist so callers can tell an ignored
/// action from an applied one.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    #[error("message text is empty")]
    EmptyText,

    #[error("a reply is already in flight")]
    Busy,

    #[error("no message with id {0}")]
    UnknownMessage(MessageId),

    #[error("nothing to reroll yet")]
    NothingToReroll,

    #[error("message {0} is not the latest assistant reply")]
    NotLatestAssistant(MessageId),

    /// The conversation was cleared while the reply was in flight.
    #[error("reply arrived after the conversation was cleared")]
    Superseded,
}
