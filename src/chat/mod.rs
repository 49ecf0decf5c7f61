pub mod core;
pub mod error;
pub mod models;
pub mod session;

pub use self::core::{CompletionRequest, Conversation, PendingReply, RequestKind, SessionStats};
pub use error::Rejection;
pub use models::{Message, MessageId, Role, Transcript, latest_assistant_id};
pub use session::{ChatSession, SystemPromptSource};
