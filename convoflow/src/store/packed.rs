//! The persisted row shape.

use crate::conversation::ConversationId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifies the payload format written by this crate.
pub const PAYLOAD_ENCODING: &str = "structured";

/// One conversation as a flat record.
///
/// Cursor fields are stored both here and inside `payload` so that rows can be
/// queried by action or step without deserializing payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackedConversation {
    /// Primary key assigned by the record store; 0 until inserted.
    #[serde(default)]
    pub id: i64,
    /// Unique conversation id.
    pub conversation_id: ConversationId,
    /// Step cursor.
    pub step: u32,
    /// Owning action, if any.
    pub active_action: Option<String>,
    /// Payload format.
    pub encoding: String,
    /// Concrete conversation type.
    pub type_tag: String,
    /// Serialized conversation object.
    pub payload: String,
    /// When the row was first written.
    pub created_at: DateTime<Utc>,
    /// When the row was last written.
    pub updated_at: DateTime<Utc>,
}

impl PackedConversation {
    /// Returns true if the row has been assigned a key.
    #[must_use]
    pub fn is_persisted(&self) -> bool {
        self.id != 0
    }
}
