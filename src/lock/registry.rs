//! Concurrency safe registry of locked UTXOs

use super::{LockKey, UnlockCondition};
use crate::error::{LockError, LockResult};

use chrono::{DateTime, Utc};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

/// A locked UTXO
struct LockEntry {
    condition: UnlockCondition,
    /// Changes whenever the entry is created or its condition replaced
    generation: u64,
    locked_at: DateTime<Utc>,
}

struct RegistryState {
    entries: HashMap<LockKey, LockEntry>,
    next_generation: u64,
}

impl RegistryState {
    fn bump_generation(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }
}

/// Point in time copy of one entry, evaluated by the monitor without holding the lock
#[derive(Debug, Clone)]
pub struct SweepCandidate {
    pub key: LockKey,
    pub condition: UnlockCondition,
    pub generation: u64,
}

/// Maps each locked UTXO to its unlock condition
///
/// A key is present if and only if the UTXO is locked. Every mutation runs in a
/// single write critical section, so a claim can never interleave with another
/// claim or release of the same key.
pub struct LockRegistry {
    state: RwLock<RegistryState>,
}

impl LockRegistry {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(RegistryState {
                entries: HashMap::new(),
                next_generation: 0,
            }),
        }
    }

    /// Lock `key` unless it is already locked
    ///
    /// On conflict the existing entry and its condition are left untouched.
    pub async fn claim(&self, key: LockKey, condition: UnlockCondition) -> LockResult<()> {
        let mut state = self.state.write().await;
        let generation = state.bump_generation();

        match state.entries.entry(key) {
            Entry::Occupied(occupied) => Err(LockError::AlreadyLocked {
                key: occupied.key().clone(),
            }),
            Entry::Vacant(vacant) => {
                debug!(
                    "Locked UTXO {} until {} condition fires",
                    vacant.key(),
                    condition.kind()
                );
                vacant.insert(LockEntry {
                    condition,
                    generation,
                    locked_at: Utc::now(),
                });
                Ok(())
            }
        }
    }

    /// Unlock `key`, returning whether it was locked
    pub async fn release(&self, key: &LockKey) -> bool {
        let removed = self.state.write().await.entries.remove(key).is_some();
        if removed {
            debug!("Unlocked UTXO {}", key);
        }
        removed
    }

    /// Unlock `key` only if its entry still has `generation`
    ///
    /// Used by sweeps so a verdict computed on a stale snapshot never releases a
    /// lock that was re-claimed or given a new condition in the meantime.
    pub async fn release_if_current(&self, key: &LockKey, generation: u64) -> bool {
        let mut state = self.state.write().await;
        let current = state
            .entries
            .get(key)
            .is_some_and(|entry| entry.generation == generation);
        if current {
            state.entries.remove(key);
        }
        current
    }

    pub async fn is_locked(&self, key: &LockKey) -> bool {
        self.state.read().await.entries.contains_key(key)
    }

    /// Replace the condition of a locked UTXO
    pub async fn update_condition(&self, key: &LockKey, condition: UnlockCondition) -> LockResult<()> {
        let mut state = self.state.write().await;
        let generation = state.bump_generation();

        let entry = state
            .entries
            .get_mut(key)
            .ok_or_else(|| LockError::NotLocked { key: key.clone() })?;
        debug!(
            "Unlock condition of UTXO {} changed from {} to {}",
            key,
            entry.condition.kind(),
            condition.kind()
        );
        entry.condition = condition;
        entry.generation = generation;
        Ok(())
    }

    /// Copy every entry for evaluation, ordered by key
    pub async fn snapshot(&self) -> Vec<SweepCandidate> {
        let mut candidates: Vec<_> = self
            .state
            .read()
            .await
            .entries
            .iter()
            .map(|(key, entry)| SweepCandidate {
                key: key.clone(),
                condition: entry.condition.clone(),
                generation: entry.generation,
            })
            .collect();
        candidates.sort_by(|a, b| a.key.cmp(&b.key));
        candidates
    }

    /// When `key` was locked, if it is
    pub async fn locked_at(&self, key: &LockKey) -> Option<DateTime<Utc>> {
        self.state.read().await.entries.get(key).map(|e| e.locked_at)
    }

    pub async fn locked_keys(&self) -> Vec<LockKey> {
        let mut keys: Vec<_> = self.state.read().await.entries.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for LockRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn key(vout: u32) -> LockKey {
        LockKey::new("AB12", vout)
    }

    #[tokio::test]
    async fn test_claim_then_locked() {
        let registry = LockRegistry::new();
        registry.claim(key(0), UnlockCondition::never()).await.unwrap();
        assert!(registry.is_locked(&key(0)).await);
        assert!(!registry.is_locked(&key(1)).await);
        assert!(registry.locked_at(&key(0)).await.is_some());
    }

    #[tokio::test]
    async fn test_second_claim_keeps_first_condition() {
        let registry = LockRegistry::new();
        registry.claim(key(0), UnlockCondition::never()).await.unwrap();

        let err = registry
            .claim(key(0), UnlockCondition::at(Utc::now()))
            .await
            .unwrap_err();
        assert_eq!(err, LockError::AlreadyLocked { key: key(0) });

        let snapshot = registry.snapshot().await;
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].condition.kind(), "never");
    }

    #[tokio::test]
    async fn test_release_is_idempotent() {
        let registry = LockRegistry::new();
        assert!(!registry.release(&key(0)).await);

        registry.claim(key(0), UnlockCondition::never()).await.unwrap();
        assert!(registry.release(&key(0)).await);
        assert!(!registry.release(&key(0)).await);
        assert!(!registry.is_locked(&key(0)).await);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_update_condition_requires_lock() {
        let registry = LockRegistry::new();
        let err = registry
            .update_condition(&key(0), UnlockCondition::never())
            .await
            .unwrap_err();
        assert_eq!(err, LockError::NotLocked { key: key(0) });
        assert!(!registry.is_locked(&key(0)).await);
        assert_eq!(registry.len().await, 0);
    }

    #[tokio::test]
    async fn test_update_condition_replaces_and_bumps_generation() {
        let registry = LockRegistry::new();
        registry.claim(key(0), UnlockCondition::never()).await.unwrap();
        let before = registry.snapshot().await.remove(0);

        registry
            .update_condition(&key(0), UnlockCondition::at(Utc::now()))
            .await
            .unwrap();
        let after = registry.snapshot().await.remove(0);

        assert_eq!(after.condition.kind(), "deadline");
        assert_ne!(before.generation, after.generation);
    }

    #[tokio::test]
    async fn test_release_if_current_ignores_stale_generation() {
        let registry = LockRegistry::new();
        registry.claim(key(0), UnlockCondition::never()).await.unwrap();
        let stale = registry.snapshot().await.remove(0);

        registry.release(&key(0)).await;
        registry.claim(key(0), UnlockCondition::never()).await.unwrap();

        assert!(!registry.release_if_current(&key(0), stale.generation).await);
        assert!(registry.is_locked(&key(0)).await);

        let current = registry.snapshot().await.remove(0);
        assert!(registry.release_if_current(&key(0), current.generation).await);
        assert!(!registry.is_locked(&key(0)).await);
    }

    #[tokio::test]
    async fn test_snapshot_is_ordered() {
        let registry = LockRegistry::new();
        for vout in [3, 1, 2] {
            registry.claim(key(vout), UnlockCondition::never()).await.unwrap();
        }
        let vouts: Vec<_> = registry.snapshot().await.iter().map(|c| c.key.vout()).collect();
        assert_eq!(vouts, vec![1, 2, 3]);
        assert_eq!(registry.locked_keys().await, vec![key(1), key(2), key(3)]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_claims_have_one_winner() {
        let registry = Arc::new(LockRegistry::new());
        let mut handles = Vec::new();
        for _ in 0..32 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                registry.claim(key(7), UnlockCondition::never()).await
            }));
        }

        let mut won = 0;
        let mut lost = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(()) => won += 1,
                Err(LockError::AlreadyLocked { .. }) => lost += 1,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!(won, 1);
        assert_eq!(lost, 31);
    }
}
