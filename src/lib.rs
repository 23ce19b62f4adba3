//! UTXO Locker - double spend protection for in-flight cross-chain swaps
//!
//! Each bridged token owns a [`UtxoLocker`]. Swap workers lock a UTXO before
//! spending it in an outbound transfer and unlock it once the swap settles or
//! fails. A background [`LockMonitor`] releases locks whose unlock condition
//! fired (by default a 5 day deadline) so a crashed swap cannot pin a UTXO
//! forever.

pub mod config;
pub mod error;
pub mod lock;
pub mod locker;
pub mod logging;
pub mod metrics;

pub use error::{LockError, LockResult};
pub use lock::{LockKey, LockMonitor, LockRegistry, MonitorHandle, SweepReport, UnlockCondition};
pub use locker::UtxoLocker;
