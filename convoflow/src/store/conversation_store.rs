//! Locked load/save/delete of conversations.

use super::{ContextPacker, ConversationLease, LockTable, RecordStore};
use crate::config::{CorruptRowPolicy, EngineConfig};
use crate::conversation::{ConversationId, ConversationState};
use crate::data::TypeRegistry;
use crate::errors::{ContentionError, NotFoundError, Result, StoreError};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Result of a bounded fetch.
pub enum FetchOutcome {
    /// The conversation was loaded.
    Found(Box<dyn ConversationState>),
    /// No row exists for the id.
    NotFound(NotFoundError),
    /// The id's lock was not acquired in time.
    Contended(ContentionError),
}

impl FetchOutcome {
    /// Returns true for `Found`.
    #[must_use]
    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }

    /// Returns true for `NotFound`.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Returns true for `Contended`.
    #[must_use]
    pub fn is_contended(&self) -> bool {
        matches!(self, Self::Contended(_))
    }

    /// The loaded conversation, if any.
    #[must_use]
    pub fn into_found(self) -> Option<Box<dyn ConversationState>> {
        match self {
            Self::Found(state) => Some(state),
            Self::NotFound(_) | Self::Contended(_) => None,
        }
    }
}

impl fmt::Debug for FetchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Found(state) => f
                .debug_tuple("Found")
                .field(&state.context().conversation_id())
                .finish(),
            Self::NotFound(err) => f.debug_tuple("NotFound").field(err).finish(),
            Self::Contended(err) => f.debug_tuple("Contended").field(err).finish(),
        }
    }
}

/// Loads and persists conversations, one id at a time.
///
/// Every operation on an id runs under that id's lock. The lease-taking
/// variants let a caller hold one lock across several operations.
#[derive(Clone)]
pub struct ConversationStore {
    records: Arc<dyn RecordStore>,
    packer: ContextPacker,
    locks: LockTable,
    fetch_timeout: Duration,
    corrupt_rows: CorruptRowPolicy,
}

impl ConversationStore {
    /// Creates a store with default settings.
    #[must_use]
    pub fn new(records: Arc<dyn RecordStore>, registry: Arc<TypeRegistry>) -> Self {
        Self::with_config(records, registry, &EngineConfig::default())
    }

    /// Creates a store configured from `config`.
    #[must_use]
    pub fn with_config(
        records: Arc<dyn RecordStore>,
        registry: Arc<TypeRegistry>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            records,
            packer: ContextPacker::new(registry),
            locks: LockTable::new(config.lock_idle_ttl(), config.lock_sweep_threshold),
            fetch_timeout: config.fetch_timeout(),
            corrupt_rows: config.corrupt_rows,
        }
    }

    /// The packer.
    #[must_use]
    pub fn packer(&self) -> &ContextPacker {
        &self.packer
    }

    /// The lock table.
    #[must_use]
    pub fn locks(&self) -> &LockTable {
        &self.locks
    }

    /// The default fetch timeout.
    #[must_use]
    pub fn fetch_timeout(&self) -> Duration {
        self.fetch_timeout
    }

    /// Locks `conversation_id`, waiting at most `timeout` when one is given.
    pub async fn lease(
        &self,
        conversation_id: ConversationId,
        timeout: Option<Duration>,
    ) -> Result<ConversationLease, ContentionError> {
        self.locks.acquire(conversation_id, timeout).await
    }

    /// Removes idle lock slots. Returns how many were removed.
    pub fn evict_idle(&self) -> usize {
        self.locks.evict_idle()
    }

    /// Loads a conversation, waiting at most `timeout` for its lock (the
    /// configured default when `None`).
    ///
    /// Contention and absence are outcomes, not errors.
    ///
    /// # Errors
    ///
    /// Record-store failures, and unpack failures under
    /// [`CorruptRowPolicy::Fail`].
    pub async fn fetch(
        &self,
        conversation_id: ConversationId,
        timeout: Option<Duration>,
    ) -> Result<FetchOutcome> {
        let timeout = timeout.unwrap_or(self.fetch_timeout);
        let lease = match self.locks.lock_for(conversation_id, timeout).await {
            Ok(lease) => lease,
            Err(contended) => return Ok(FetchOutcome::Contended(contended)),
        };
        Ok(match self.fetch_locked(&lease).await? {
            Some(state) => FetchOutcome::Found(state),
            None => FetchOutcome::NotFound(NotFoundError { conversation_id }),
        })
    }

    /// Persists a conversation, waiting for its lock without bound.
    pub async fn save(&self, state: &dyn ConversationState) -> Result<()> {
        let lease = self.locks.lock(state.context().conversation_id()).await;
        self.save_locked(&lease, state).await
    }

    /// Deletes a conversation, waiting for its lock without bound.
    ///
    /// Returns whether a row existed.
    pub async fn delete(&self, conversation_id: ConversationId) -> Result<bool> {
        let lease = self.locks.lock(conversation_id).await;
        self.delete_locked(&lease).await
    }

    /// Loads the leased conversation.
    pub async fn fetch_locked(
        &self,
        lease: &ConversationLease,
    ) -> Result<Option<Box<dyn ConversationState>>> {
        let conversation_id = lease.conversation_id();
        let Some(row) = self.records.find(conversation_id).await? else {
            debug!(conversation_id = %conversation_id, "No stored conversation");
            return Ok(None);
        };
        match self.corrupt_rows {
            CorruptRowPolicy::Fail => self.packer.unpack(&row).map(Some),
            CorruptRowPolicy::TreatAsMissing => self.packer.unpack_lenient(&row),
        }
    }

    /// Persists the leased conversation: inserts a row when none exists,
    /// otherwise updates it in place, then commits.
    pub async fn save_locked(
        &self,
        lease: &ConversationLease,
        state: &dyn ConversationState,
    ) -> Result<()> {
        let conversation_id = state.context().conversation_id();
        check_lease(lease, conversation_id)?;

        match self.records.find(conversation_id).await? {
            Some(mut row) => {
                self.packer.repack(&mut row, state)?;
                let id = row.id;
                self.records.update(row).await?;
                debug!(conversation_id = %conversation_id, row_id = id, "Conversation updated");
            }
            None => {
                let row = self.packer.pack(state)?;
                let id = self.records.add(row).await?;
                info!(conversation_id = %conversation_id, row_id = id, type_tag = state.type_tag(), "Conversation created");
            }
        }
        self.records.commit().await?;
        Ok(())
    }

    /// Deletes the leased conversation. Returns whether a row existed.
    pub async fn delete_locked(&self, lease: &ConversationLease) -> Result<bool> {
        let conversation_id = lease.conversation_id();
        let Some(row) = self.records.find(conversation_id).await? else {
            return Ok(false);
        };
        self.records.remove(row.id).await?;
        self.records.commit().await?;
        info!(conversation_id = %conversation_id, row_id = row.id, "Conversation deleted");
        Ok(true)
    }
}

impl fmt::Debug for ConversationStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversationStore")
            .field("locks", &self.locks.len())
            .field("fetch_timeout", &self.fetch_timeout)
            .field("corrupt_rows", &self.corrupt_rows)
            .finish_non_exhaustive()
    }
}

fn check_lease(lease: &ConversationLease, requested: ConversationId) -> Result<(), StoreError> {
    if lease.conversation_id() == requested {
        Ok(())
    } else {
        Err(StoreError::LeaseMismatch {
            leased: lease.conversation_id(),
            requested,
        })
    }
}
