pub mod conversation;
pub mod event;
pub mod message;

pub use conversation::{Conversation, ConversationSummary, MarkReadOutcome, Participant, Profile, SearchResult};
pub use event::{EventKind, MESSAGES_TABLE, PushEvent};
pub use message::{AttachmentRef, MediaKind, Message};
