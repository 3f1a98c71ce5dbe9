//! Per-conversation lock table.

use crate::conversation::ConversationId;
use crate::errors::ContentionError;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, warn};

#[derive(Debug)]
struct LockSlot {
    mutex: Arc<AsyncMutex<()>>,
    last_used: Mutex<Instant>,
}

impl LockSlot {
    fn new() -> Self {
        Self {
            mutex: Arc::new(AsyncMutex::new(())),
            last_used: Mutex::new(Instant::now()),
        }
    }

    fn touch(&self) {
        *self.last_used.lock() = Instant::now();
    }

    /// Idle and not referenced by any holder or waiter.
    fn is_evictable(&self, ttl: Duration) -> bool {
        Arc::strong_count(&self.mutex) == 1 && self.last_used.lock().elapsed() >= ttl
    }
}

/// Exclusive hold on one conversation id.
///
/// Released on drop.
#[derive(Debug)]
pub struct ConversationLease {
    conversation_id: ConversationId,
    slots: Arc<DashMap<ConversationId, LockSlot>>,
    _guard: OwnedMutexGuard<()>,
}

impl ConversationLease {
    /// The locked conversation.
    #[must_use]
    pub fn conversation_id(&self) -> ConversationId {
        self.conversation_id
    }
}

impl Drop for ConversationLease {
    fn drop(&mut self) {
        if let Some(slot) = self.slots.get(&self.conversation_id) {
            slot.touch();
        }
    }
}

/// Lazily populated map from conversation id to an async mutex.
///
/// Slots that sit unused for longer than the idle TTL are swept once the table
/// grows past its sweep trigger. The trigger starts at the threshold and after
/// each sweep moves to twice the surviving size, so live slots are rescanned
/// only when the table doubles. A slot that is held or awaited is never removed.
#[derive(Debug, Clone)]
pub struct LockTable {
    slots: Arc<DashMap<ConversationId, LockSlot>>,
    idle_ttl: Duration,
    sweep_threshold: usize,
    sweep_at: Arc<AtomicUsize>,
    sweeps: Arc<AtomicU64>,
}

impl LockTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new(idle_ttl: Duration, sweep_threshold: usize) -> Self {
        Self {
            slots: Arc::new(DashMap::new()),
            idle_ttl,
            sweep_threshold,
            sweep_at: Arc::new(AtomicUsize::new(sweep_threshold)),
            sweeps: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Number of automatic sweeps run so far.
    #[must_use]
    pub fn sweeps(&self) -> u64 {
        self.sweeps.load(Ordering::Relaxed)
    }

    /// Number of live slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns true if no slot exists.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Returns true if `conversation_id` is currently held.
    #[must_use]
    pub fn is_locked(&self, conversation_id: ConversationId) -> bool {
        self.slots
            .get(&conversation_id)
            .is_some_and(|slot| slot.mutex.try_lock().is_err())
    }

    /// Locks `conversation_id`, waiting at most `timeout` when one is given.
    ///
    /// # Errors
    ///
    /// `ContentionError` when the wait expires.
    pub async fn acquire(
        &self,
        conversation_id: ConversationId,
        timeout: Option<Duration>,
    ) -> Result<ConversationLease, ContentionError> {
        match timeout {
            Some(limit) => self.lock_for(conversation_id, limit).await,
            None => Ok(self.lock(conversation_id).await),
        }
    }

    /// Locks `conversation_id`, waiting without bound.
    pub async fn lock(&self, conversation_id: ConversationId) -> ConversationLease {
        let mutex = self.slot(conversation_id);
        let started = Instant::now();
        let guard = mutex.lock_owned().await;
        self.lease(conversation_id, guard, started)
    }

    /// Locks `conversation_id`, waiting at most `limit`.
    ///
    /// # Errors
    ///
    /// `ContentionError` when the wait expires.
    pub async fn lock_for(
        &self,
        conversation_id: ConversationId,
        limit: Duration,
    ) -> Result<ConversationLease, ContentionError> {
        let mutex = self.slot(conversation_id);
        let started = Instant::now();
        match tokio::time::timeout(limit, mutex.lock_owned()).await {
            Ok(guard) => Ok(self.lease(conversation_id, guard, started)),
            Err(_) => {
                let waited = started.elapsed();
                warn!(conversation_id = %conversation_id, ?waited, "Conversation lock contended");
                Err(ContentionError {
                    conversation_id,
                    waited,
                })
            }
        }
    }

    fn slot(&self, conversation_id: ConversationId) -> Arc<AsyncMutex<()>> {
        let mutex = {
            let slot = self.slots.entry(conversation_id).or_insert_with(LockSlot::new);
            slot.touch();
            Arc::clone(&slot.mutex)
        };
        if self.slots.len() > self.sweep_at.load(Ordering::Relaxed) {
            self.sweep();
        }
        mutex
    }

    fn sweep(&self) {
        self.evict_idle();
        let next = self.sweep_threshold.max(self.slots.len().saturating_mul(2));
        self.sweep_at.store(next, Ordering::Relaxed);
        self.sweeps.fetch_add(1, Ordering::Relaxed);
    }

    fn lease(
        &self,
        conversation_id: ConversationId,
        guard: OwnedMutexGuard<()>,
        started: Instant,
    ) -> ConversationLease {
        debug!(
            conversation_id = %conversation_id,
            waited = ?started.elapsed(),
            "Conversation lock acquired"
        );
        ConversationLease {
            conversation_id,
            slots: Arc::clone(&self.slots),
            _guard: guard,
        }
    }

    /// Removes every slot idle for at least the TTL and not held or awaited.
    ///
    /// Returns how many slots were removed.
    pub fn evict_idle(&self) -> usize {
        let before = self.slots.len();
        self.slots.retain(|_, slot| !slot.is_evictable(self.idle_ttl));
        let evicted = before.saturating_sub(self.slots.len());
        if evicted > 0 {
            debug!(evicted, remaining = self.slots.len(), "Evicted idle conversation locks");
        }
        evicted
    }
}

impl Default for LockTable {
    fn default() -> Self {
        Self::new(Duration::from_secs(600), 1024)
    }
}
