//! Identity of a lockable unspent output

use std::fmt;

/// A transaction output reference: `(tx_hash, vout)`
///
/// Equality and hashing are structural, so two keys only collide when the hash
/// strings match byte for byte. Use [`LockKey::canonical`] for hashes coming
/// from outside the process.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LockKey {
    tx_hash: String,
    vout: u32,
}

impl LockKey {
    /// Build a key from an already canonical hash
    pub fn new(tx_hash: impl Into<String>, vout: u32) -> Self {
        Self {
            tx_hash: tx_hash.into(),
            vout,
        }
    }

    /// Build a key from an arbitrarily cased hash, folding it to upper case
    pub fn canonical(tx_hash: &str, vout: u32) -> Self {
        Self::new(tx_hash.to_ascii_uppercase(), vout)
    }

    pub fn tx_hash(&self) -> &str {
        &self.tx_hash
    }

    pub fn vout(&self) -> u32 {
        self.vout
    }
}

impl fmt::Display for LockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.tx_hash, self.vout)
    }
}
