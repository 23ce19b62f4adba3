//! Unlock conditions deciding when a locked UTXO may be released automatically
//!
//! A panicking custom condition is contained by `catch_unwind`, but the
//! process panic hook still runs first. The daemon installs
//! [`crate::logging::install_panic_hook`] so those panics are reported through
//! `tracing` instead of stderr.

use chrono::{DateTime, Utc};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Default lifetime of a lock taken without an explicit condition (5 days)
pub const DEFAULT_LOCK_TTL: Duration = Duration::from_secs(3600 * 120);

/// When a lock becomes eligible for release by the monitor
///
/// Conditions are evaluated during every sweep, outside the registry lock.
/// They must be cheap, must not block, and must not touch the registry.
#[derive(Clone)]
pub enum UnlockCondition {
    /// Release once the wall clock reaches the deadline
    Deadline(DateTime<Utc>),
    /// Only an explicit unlock releases the UTXO
    Never,
    /// Caller supplied predicate
    Custom(Arc<dyn Fn() -> bool + Send + Sync>),
}

/// A custom condition panicked while being evaluated
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unlock condition panicked: {message}")]
pub struct ConditionFault {
    pub message: String,
}

impl UnlockCondition {
    /// Deadline `ttl` from now
    pub fn after(ttl: Duration) -> Self {
        let deadline = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| Utc::now().checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        UnlockCondition::Deadline(deadline)
    }

    pub fn at(deadline: DateTime<Utc>) -> Self {
        UnlockCondition::Deadline(deadline)
    }

    pub fn never() -> Self {
        UnlockCondition::Never
    }

    pub fn custom<F>(f: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        UnlockCondition::Custom(Arc::new(f))
    }

    /// Deadline of a time based condition
    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        match self {
            UnlockCondition::Deadline(deadline) => Some(*deadline),
            _ => None,
        }
    }

    /// Short label for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            UnlockCondition::Deadline(_) => "deadline",
            UnlockCondition::Never => "never",
            UnlockCondition::Custom(_) => "custom",
        }
    }

    /// Whether the lock may be released at `now`
    ///
    /// A panicking custom predicate is contained and reported as a fault.
    pub fn evaluate_at(&self, now: DateTime<Utc>) -> Result<bool, ConditionFault> {
        match self {
            UnlockCondition::Deadline(deadline) => Ok(now >= *deadline),
            UnlockCondition::Never => Ok(false),
            UnlockCondition::Custom(f) => {
                panic::catch_unwind(AssertUnwindSafe(|| f())).map_err(|payload| {
                    let message = payload
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| payload.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "non-string panic payload".to_string());
                    ConditionFault { message }
                })
            }
        }
    }

    pub fn evaluate(&self) -> Result<bool, ConditionFault> {
        self.evaluate_at(Utc::now())
    }
}

impl Default for UnlockCondition {
    fn default() -> Self {
        Self::after(DEFAULT_LOCK_TTL)
    }
}

impl fmt::Debug for UnlockCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnlockCondition::Deadline(deadline) => f.debug_tuple("Deadline").field(deadline).finish(),
            UnlockCondition::Never => f.write_str("Never"),
            UnlockCondition::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}
