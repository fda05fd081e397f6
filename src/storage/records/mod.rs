pub mod conversation;
pub mod message;
pub mod profile;

pub use conversation::{ConversationRecord, SummaryRecord};
pub use message::MessageRecord;
pub use profile::ProfileRecord;
