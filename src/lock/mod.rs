//! UTXO lock coordination
//!
//! Provides:
//! - Atomic claim/release of individual transaction outputs
//! - Unlock conditions (deadline, never, custom predicate)
//! - A background monitor that releases locks whose condition fired

pub mod condition;
pub mod key;
pub mod monitor;
pub mod registry;

pub use condition::{ConditionFault, UnlockCondition, DEFAULT_LOCK_TTL};
pub use key::LockKey;
pub use monitor::{LockMonitor, MonitorHandle, SweepReport, DEFAULT_MONITOR_INTERVAL};
pub use registry::{LockRegistry, SweepCandidate};
