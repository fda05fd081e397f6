use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use time::OffsetDateTime;
use uuid::Uuid;

/// Coarse classification of an attachment, inferred from its MIME type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Document,
}

impl MediaKind {
    #[must_use]
    pub fn from_mime(content_type: &str) -> Self {
        if content_type.starts_with("image/") { Self::Image } else { Self::Document }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Document => "document",
        }
    }
}

impl std::str::FromStr for MediaKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "image" => Ok(Self::Image),
            "document" => Ok(Self::Document),
            other => Err(format!("unknown media kind: {other}")),
        }
    }
}

/// Public reference to an uploaded blob. The blob store owns the bytes;
/// a message only carries this handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentRef {
    pub url: String,
    pub kind: MediaKind,
}

/// A single direct message. Immutable once created except for `is_read`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    /// Nullable for media-only messages.
    pub content: Option<String>,
    pub media_url: Option<String>,
    pub media_kind: Option<MediaKind>,
    #[serde(with = "time::serde::rfc3339")]
    pub sent_at: OffsetDateTime,
    pub is_read: bool,
}

impl Message {
    /// Canonical history order: `sent_at` ascending, ties broken by id.
    #[must_use]
    pub fn history_order(&self, other: &Self) -> Ordering {
        self.sent_at.cmp(&other.sent_at).then_with(|| self.id.cmp(&other.id))
    }

    #[must_use]
    pub fn preview(&self) -> &str {
        self.content.as_deref().unwrap_or("[attachment]")
    }
}
