//! Per-bridge entry point used by the swap pipeline
//!
//! Normalizes transaction hashes before touching the registry, so callers may
//! pass hashes in any casing and still observe one consistent lock state.

use crate::config::{BridgeConfig, LockerConfig};
use crate::error::{LockError, LockResult};
use crate::lock::{
    LockKey, LockMonitor, LockRegistry, MonitorHandle, UnlockCondition, DEFAULT_LOCK_TTL,
    DEFAULT_MONITOR_INTERVAL,
};
use crate::metrics::{self, ReleaseReason};

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Guards the UTXOs of one bridged token against concurrent double spends
pub struct UtxoLocker {
    bridge: String,
    registry: Arc<LockRegistry>,
    default_ttl: Duration,
    monitor_interval: Duration,
    normalize_case: bool,
}

impl UtxoLocker {
    /// Create a locker with the default 5 day TTL and 60s sweep cadence
    pub fn new(bridge: impl Into<String>) -> Self {
        Self {
            bridge: bridge.into(),
            registry: Arc::new(LockRegistry::new()),
            default_ttl: DEFAULT_LOCK_TTL,
            monitor_interval: DEFAULT_MONITOR_INTERVAL,
            normalize_case: true,
        }
    }

    /// Create a locker for a configured bridge
    pub fn from_config(name: &str, config: &BridgeConfig, defaults: &LockerConfig) -> Self {
        Self::new(name)
            .with_default_ttl(Duration::from_secs(
                config.default_ttl_secs.unwrap_or(defaults.default_ttl_secs),
            ))
            .with_monitor_interval(Duration::from_secs(
                config
                    .monitor_interval_secs
                    .unwrap_or(defaults.monitor_interval_secs),
            ))
            .with_case_normalization(config.normalize_case)
    }

    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn with_monitor_interval(mut self, interval: Duration) -> Self {
        self.monitor_interval = interval;
        self
    }

    /// Chains with case sensitive hash encodings must opt out of upper casing
    pub fn with_case_normalization(mut self, enabled: bool) -> Self {
        self.normalize_case = enabled;
        self
    }

    pub fn bridge(&self) -> &str {
        &self.bridge
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    pub fn registry(&self) -> &Arc<LockRegistry> {
        &self.registry
    }

    fn key(&self, tx_hash: &str, vout: u32) -> LockKey {
        if self.normalize_case {
            LockKey::canonical(tx_hash, vout)
        } else {
            LockKey::new(tx_hash, vout)
        }
    }

    /// Lock a UTXO until the default TTL expires
    pub async fn lock_utxo(&self, tx_hash: &str, vout: u32) -> LockResult<()> {
        self.lock_utxo_with_condition(tx_hash, vout, UnlockCondition::after(self.default_ttl))
            .await
    }

    /// Lock a UTXO until `condition` fires or it is unlocked explicitly
    pub async fn lock_utxo_with_condition(
        &self,
        tx_hash: &str,
        vout: u32,
        condition: UnlockCondition,
    ) -> LockResult<()> {
        let key = self.key(tx_hash, vout);
        let result = self.registry.claim(key, condition).await;

        metrics::record_claim(&self.bridge, result.is_ok());
        match &result {
            Ok(()) => metrics::record_locked_utxos(&self.bridge, self.registry.len().await),
            Err(e) => debug!("Lock conflict on bridge {}: {}", self.bridge, e),
        }
        result
    }

    /// Release a UTXO; unlocking an unlocked UTXO is a no-op
    pub async fn unlock_utxo(&self, tx_hash: &str, vout: u32) {
        let key = self.key(tx_hash, vout);
        if self.registry.release(&key).await {
            metrics::record_release(&self.bridge, ReleaseReason::Explicit);
            metrics::record_locked_utxos(&self.bridge, self.registry.len().await);
        }
    }

    pub async fn is_utxo_locked(&self, tx_hash: &str, vout: u32) -> bool {
        self.registry.is_locked(&self.key(tx_hash, vout)).await
    }

    /// Replace the unlock condition of a locked UTXO
    pub async fn set_unlock_condition(
        &self,
        tx_hash: &str,
        vout: u32,
        condition: UnlockCondition,
    ) -> LockResult<()> {
        let key = self.key(tx_hash, vout);
        self.registry
            .update_condition(&key, condition)
            .await
            .inspect_err(|e: &LockError| debug!("Bridge {}: {}", self.bridge, e))
    }

    pub async fn locked_count(&self) -> usize {
        self.registry.len().await
    }

    /// Spawn the reconciliation monitor for this bridge
    pub fn start_monitor(&self) -> MonitorHandle {
        info!("Start monitoring locked UTXOs for bridge {}", self.bridge);
        self.monitor().spawn()
    }

    /// A monitor bound to this locker, without spawning it
    pub fn monitor(&self) -> LockMonitor {
        LockMonitor::new(
            self.bridge.clone(),
            self.registry.clone(),
            self.monitor_interval,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn test_hash_casing_is_irrelevant() {
        let locker = UtxoLocker::new("colx");
        locker.lock_utxo("deadbeef", 1).await.unwrap();

        assert!(locker.is_utxo_locked("DEADBEEF", 1).await);
        assert!(locker.is_utxo_locked("DeadBeef", 1).await);
        assert!(!locker.is_utxo_locked("deadbeef", 2).await);

        let err = locker.lock_utxo("DEADBEEF", 1).await.unwrap_err();
        assert_eq!(err, LockError::AlreadyLocked { key: LockKey::new("DEADBEEF", 1) });

        locker.unlock_utxo("DeAdBeEf", 1).await;
        assert!(!locker.is_utxo_locked("deadbeef", 1).await);
    }

    #[tokio::test]
    async fn test_case_normalization_can_be_disabled() {
        let locker = UtxoLocker::new("case-sensitive").with_case_normalization(false);
        locker.lock_utxo("abCD", 0).await.unwrap();
        assert!(locker.is_utxo_locked("abCD", 0).await);
        assert!(!locker.is_utxo_locked("ABCD", 0).await);
    }

    #[tokio::test]
    async fn test_default_lock_uses_ttl_deadline() {
        let locker = UtxoLocker::new("colx").with_default_ttl(Duration::from_secs(90));
        let before = Utc::now();
        locker.lock_utxo("ab12", 0).await.unwrap();

        let candidate = locker.registry().snapshot().await.remove(0);
        let deadline = candidate.condition.deadline().unwrap();
        assert!(deadline >= before + chrono::Duration::seconds(90));
        assert!(deadline <= Utc::now() + chrono::Duration::seconds(90));
    }

    #[tokio::test]
    async fn test_set_unlock_condition() {
        let locker = UtxoLocker::new("colx");
        let err = locker
            .set_unlock_condition("ab12", 0, UnlockCondition::never())
            .await
            .unwrap_err();
        assert_eq!(err, LockError::NotLocked { key: LockKey::new("AB12", 0) });
        assert!(!locker.is_utxo_locked("ab12", 0).await);

        locker.lock_utxo("ab12", 0).await.unwrap();
        locker
            .set_unlock_condition("AB12", 0, UnlockCondition::custom(|| true))
            .await
            .unwrap();

        let report = locker.monitor().sweep_once().await;
        assert_eq!(report.released, 1);
        assert!(!locker.is_utxo_locked("ab12", 0).await);
    }

    #[tokio::test]
    async fn test_lockers_are_independent() {
        let colx = UtxoLocker::new("colx");
        let btc = UtxoLocker::new("btc");

        colx.lock_utxo("ab12", 0).await.unwrap();
        assert!(!btc.is_utxo_locked("ab12", 0).await);
        btc.lock_utxo("ab12", 0).await.unwrap();

        assert_eq!(colx.locked_count().await, 1);
        assert_eq!(btc.locked_count().await, 1);
    }
}
