//! Persistence: packed rows, the record-store seam, the per-id lock table and
//! the conversation store built on top of them.

mod conversation_store;
mod lock;
mod packed;
mod packer;
mod record;


pub use conversation_store::{ConversationStore, FetchOutcome};
pub use lock::{ConversationLease, LockTable};
pub use packed::{PackedConversation, PAYLOAD_ENCODING};
pub use packer::ContextPacker;
#[cfg(test)]
pub use record::MockRecordStore;
pub use record::{InMemoryRecordStore, RecordStore};
