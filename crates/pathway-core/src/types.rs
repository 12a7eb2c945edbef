use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::CoreError;

/// An amount in thousandths of a satoshi, the unit HTLCs are denominated in.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct MilliSatoshi(pub u64);

impl MilliSatoshi {
    pub const ZERO: MilliSatoshi = MilliSatoshi(0);

    /// Convert a whole-satoshi amount.
    pub const fn from_satoshis(sat: Satoshi) -> Self {
        Self(sat.0.saturating_mul(1000))
    }

    /// Truncate to whole satoshis.
    pub const fn to_satoshis(self) -> Satoshi {
        Satoshi(self.0 / 1000)
    }

    /// Half of this amount, rounded down.
    pub const fn halved(self) -> Self {
        Self(self.0 / 2)
    }

    pub const fn saturating_sub(self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }

    pub const fn saturating_add(self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for MilliSatoshi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} mSAT", self.0)
    }
}

impl From<u64> for MilliSatoshi {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// An on-chain amount in satoshis. Used for channel capacities.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Satoshi(pub u64);

impl fmt::Display for Satoshi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} sat", self.0)
    }
}

/// A node in the channel graph, identified by the raw bytes of its
/// Ed25519 public key.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Vertex(pub [u8; 32]);

impl Vertex {
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Create from a byte slice, which must be exactly 32 bytes long.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CoreError> {
        let arr: [u8; 32] = bytes.try_into().map_err(|_| {
            CoreError::InvalidVertex(format!("vertex must be 32 bytes, got {}", bytes.len()))
        })?;
        Ok(Self(arr))
    }

    /// Decode from a hex string.
    pub fn from_hex(hex_str: &str) -> Result<Self, CoreError> {
        let bytes = hex::decode(hex_str)
            .map_err(|e| CoreError::InvalidVertex(format!("invalid hex: {}", e)))?;
        Self::from_slice(&bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Vertex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Vertex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Vertex({})", self.to_hex())
    }
}

/// The 32-byte secret a receiver includes in its invoice so that payers can
/// prove they saw it. Required for multi-part payments.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PaymentAddr(pub [u8; 32]);

impl fmt::Debug for PaymentAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PaymentAddr({})", hex::encode(self.0))
    }
}

/// Application-defined TLV records keyed by type number.
pub type CustomRecords = BTreeMap<u64, Vec<u8>>;
