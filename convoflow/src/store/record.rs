//! Record-store abstraction over the packed-row table.

use super::PackedConversation;
use crate::conversation::ConversationId;
use crate::errors::StoreError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Backend holding packed conversation rows.
///
/// Implementations need not be safe against concurrent writers on the same
/// conversation: the conversation store serializes those with its lock table.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Finds the row for a conversation.
    async fn find(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Option<PackedConversation>, StoreError>;

    /// Inserts a new row and returns its assigned key.
    async fn add(&self, row: PackedConversation) -> Result<i64, StoreError>;

    /// Replaces the row with the same key.
    async fn update(&self, row: PackedConversation) -> Result<(), StoreError>;

    /// Removes the row with key `id`.
    async fn remove(&self, id: i64) -> Result<(), StoreError>;

    /// Makes the preceding writes durable.
    async fn commit(&self) -> Result<(), StoreError>;
}

#[derive(Debug, Default)]
struct Table {
    next_id: i64,
    rows: HashMap<i64, PackedConversation>,
    by_conversation: HashMap<ConversationId, i64>,
}

/// In-memory record store.
///
/// Writes are visible immediately; `commit` only counts flush points.
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    table: Mutex<Table>,
    commits: AtomicU64,
}

impl InMemoryRecordStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.table.lock().rows.len()
    }

    /// Returns true if the store holds no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.table.lock().rows.is_empty()
    }

    /// Returns how many times `commit` was called.
    #[must_use]
    pub fn commits(&self) -> u64 {
        self.commits.load(Ordering::SeqCst)
    }

    /// Returns a copy of every row, ordered by key.
    #[must_use]
    pub fn rows(&self) -> Vec<PackedConversation> {
        let table = self.table.lock();
        let mut rows: Vec<_> = table.rows.values().cloned().collect();
        rows.sort_by_key(|r| r.id);
        rows
    }

    /// Returns the rows owned by `action`.
    #[must_use]
    pub fn rows_for_action(&self, action: &str) -> Vec<PackedConversation> {
        self.rows()
            .into_iter()
            .filter(|r| r.active_action.as_deref() == Some(action))
            .collect()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn find(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Option<PackedConversation>, StoreError> {
        let table = self.table.lock();
        Ok(table
            .by_conversation
            .get(&conversation_id)
            .and_then(|id| table.rows.get(id))
            .cloned())
    }

    async fn add(&self, mut row: PackedConversation) -> Result<i64, StoreError> {
        let mut table = self.table.lock();
        if table.by_conversation.contains_key(&row.conversation_id) {
            return Err(StoreError::Duplicate {
                conversation_id: row.conversation_id,
            });
        }
        table.next_id += 1;
        let id = table.next_id;
        row.id = id;
        table.by_conversation.insert(row.conversation_id, id);
        table.rows.insert(id, row);
        Ok(id)
    }

    async fn update(&self, row: PackedConversation) -> Result<(), StoreError> {
        let mut table = self.table.lock();
        let Some(existing) = table.rows.get(&row.id) else {
            return Err(StoreError::MissingRow { id: row.id });
        };
        if existing.conversation_id != row.conversation_id {
            return Err(StoreError::backend(format!(
                "Row {} belongs to conversation {}",
                row.id, existing.conversation_id
            )));
        }
        table.rows.insert(row.id, row);
        Ok(())
    }

    async fn remove(&self, id: i64) -> Result<(), StoreError> {
        let mut table = self.table.lock();
        let row = table.rows.remove(&id).ok_or(StoreError::MissingRow { id })?;
        table.by_conversation.remove(&row.conversation_id);
        Ok(())
    }

    async fn commit(&self) -> Result<(), StoreError> {
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::PAYLOAD_ENCODING;
    use chrono::Utc;

    fn row(conversation_id: ConversationId) -> PackedConversation {
        let now = Utc::now();
        PackedConversation {
            id: 0,
            conversation_id,
            step: 0,
            active_action: Some("Checkout".to_string()),
            encoding: PAYLOAD_ENCODING.to_string(),
            type_tag: "ConversationContext".to_string(),
            payload: "{}".to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_add_assigns_increasing_ids() {
        let store = InMemoryRecordStore::new();
        let a = store.add(row(ConversationId::new())).await.unwrap();
        let b = store.add(row(ConversationId::new())).await.unwrap();

        assert_eq!((a, b), (1, 2));
        assert_eq!(store.len(), 2);
        assert_eq!(store.rows_for_action("Checkout").len(), 2);
    }

    #[tokio::test]
    async fn test_conversation_id_is_unique() {
        let store = InMemoryRecordStore::new();
        let id = ConversationId::new();
        store.add(row(id)).await.unwrap();

        let err = store.add(row(id)).await.unwrap_err();
        assert_eq!(err, StoreError::Duplicate { conversation_id: id });
    }

    #[tokio::test]
    async fn test_update_and_remove() {
        let store = InMemoryRecordStore::new();
        let conversation_id = ConversationId::new();
        let key = store.add(row(conversation_id)).await.unwrap();

        let mut stored = store.find(conversation_id).await.unwrap().unwrap();
        stored.step = 2;
        store.update(stored).await.unwrap();
        assert_eq!(store.find(conversation_id).await.unwrap().unwrap().step, 2);

        store.remove(key).await.unwrap();
        assert!(store.find(conversation_id).await.unwrap().is_none());
        assert_eq!(store.remove(key).await.unwrap_err(), StoreError::MissingRow { id: key });
    }

    #[tokio::test]
    async fn test_update_unknown_row() {
        let store = InMemoryRecordStore::new();
        let mut missing = row(ConversationId::new());
        missing.id = 42;

        assert_eq!(store.update(missing).await.unwrap_err(), StoreError::MissingRow { id: 42 });
    }

    #[tokio::test]
    async fn test_commit_counter() {
        let store = InMemoryRecordStore::new();
        store.commit().await.unwrap();
        store.commit().await.unwrap();
        assert_eq!(store.commits(), 2);
    }
}
