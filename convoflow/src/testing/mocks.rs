//! Test doubles for the bot client and the record store.

use crate::conversation::ConversationId;
use crate::errors::StoreError;
use crate::pipeline::BotClient;
use crate::store::{InMemoryRecordStore, PackedConversation, RecordStore};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// A reply captured by [`RecordingBot`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentReply {
    /// Target conversation.
    pub conversation_id: ConversationId,
    /// The event replied to.
    pub reply_to: Option<String>,
    /// Reply text.
    pub text: String,
}

/// A bot client that records every reply instead of sending it.
#[derive(Debug, Default)]
pub struct RecordingBot {
    sent: Mutex<Vec<SentReply>>,
}

impl RecordingBot {
    /// Creates a recording bot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every reply so far.
    #[must_use]
    pub fn sent(&self) -> Vec<SentReply> {
        self.sent.lock().clone()
    }

    /// Returns the reply texts so far.
    #[must_use]
    pub fn texts(&self) -> Vec<String> {
        self.sent.lock().iter().map(|r| r.text.clone()).collect()
    }
}

#[async_trait]
impl BotClient for RecordingBot {
    fn platform(&self) -> &'static str {
        "recording"
    }

    async fn send_text(
        &self,
        conversation_id: ConversationId,
        reply_to: Option<String>,
        text: String,
    ) -> anyhow::Result<()> {
        self.sent.lock().push(SentReply {
            conversation_id,
            reply_to,
            text,
        });
        Ok(())
    }
}

/// Wraps an in-memory store, sleeping before every write and logging the
/// order in which rows were written.
#[derive(Debug)]
pub struct SlowRecordStore {
    inner: InMemoryRecordStore,
    delay: Duration,
    writes: Mutex<Vec<PackedConversation>>,
}

impl SlowRecordStore {
    /// Creates a store that delays each `add` and `update` by `delay`.
    #[must_use]
    pub fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            inner: InMemoryRecordStore::new(),
            delay,
            writes: Mutex::new(Vec::new()),
        })
    }

    /// The wrapped store.
    #[must_use]
    pub fn inner(&self) -> &InMemoryRecordStore {
        &self.inner
    }

    /// Every row written, in write order.
    #[must_use]
    pub fn writes(&self) -> Vec<PackedConversation> {
        self.writes.lock().clone()
    }
}

#[async_trait]
impl RecordStore for SlowRecordStore {
    async fn find(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Option<PackedConversation>, StoreError> {
        self.inner.find(conversation_id).await
    }

    async fn add(&self, row: PackedConversation) -> Result<i64, StoreError> {
        tokio::time::sleep(self.delay).await;
        self.writes.lock().push(row.clone());
        self.inner.add(row).await
    }

    async fn update(&self, row: PackedConversation) -> Result<(), StoreError> {
        tokio::time::sleep(self.delay).await;
        self.writes.lock().push(row.clone());
        self.inner.update(row).await
    }

    async fn remove(&self, id: i64) -> Result<(), StoreError> {
        self.inner.remove(id).await
    }

    async fn commit(&self) -> Result<(), StoreError> {
        self.inner.commit().await
    }
}
