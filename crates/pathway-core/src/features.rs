//! Feature bits advertised by nodes.
//!
//! Features come in pairs: the even bit marks the feature as required, the
//! odd bit as optional. A node that sets either bit supports the feature.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// A single feature bit position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FeatureBit(pub u16);

impl FeatureBit {
    pub const TLV_ONION_REQUIRED: FeatureBit = FeatureBit(8);
    pub const TLV_ONION_OPTIONAL: FeatureBit = FeatureBit(9);
    pub const PAYMENT_ADDR_REQUIRED: FeatureBit = FeatureBit(14);
    pub const PAYMENT_ADDR_OPTIONAL: FeatureBit = FeatureBit(15);
    pub const MPP_REQUIRED: FeatureBit = FeatureBit(16);
    pub const MPP_OPTIONAL: FeatureBit = FeatureBit(17);
    pub const AMP_REQUIRED: FeatureBit = FeatureBit(30);
    pub const AMP_OPTIONAL: FeatureBit = FeatureBit(31);

    /// The other half of this bit's required/optional pair.
    pub const fn pair(self) -> FeatureBit {
        FeatureBit(self.0 ^ 1)
    }

    pub const fn is_required(self) -> bool {
        self.0 % 2 == 0
    }

    /// Human-readable name for the bits this crate knows about.
    pub fn name(self) -> Option<&'static str> {
        match self.0 {
            8 | 9 => Some("tlv-onion"),
            14 | 15 => Some("payment-addr"),
            16 | 17 => Some("multi-path-payments"),
            30 | 31 => Some("amp"),
            _ => None,
        }
    }
}

impl fmt::Display for FeatureBit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{}({})", name, self.0),
            None => write!(f, "unknown({})", self.0),
        }
    }
}

/// The set of feature bits a node advertises.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureVector {
    bits: BTreeSet<FeatureBit>,
}

impl FeatureVector {
    /// An empty feature vector.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_bits<I: IntoIterator<Item = FeatureBit>>(bits: I) -> Self {
        Self {
            bits: bits.into_iter().collect(),
        }
    }

    pub fn set(&mut self, bit: FeatureBit) {
        self.bits.insert(bit);
    }

    pub fn unset(&mut self, bit: FeatureBit) {
        self.bits.remove(&bit);
    }

    /// Whether exactly this bit is set.
    pub fn is_set(&self, bit: FeatureBit) -> bool {
        self.bits.contains(&bit)
    }

    /// Whether the feature is supported, through either bit of its pair.
    pub fn has_feature(&self, bit: FeatureBit) -> bool {
        self.is_set(bit) || self.is_set(bit.pair())
    }

    /// Required bits this crate does not recognise.
    pub fn unknown_required(&self) -> Vec<FeatureBit> {
        self.bits
            .iter()
            .copied()
            .filter(|b| b.is_required() && b.name().is_none())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = FeatureBit> + '_ {
        self.bits.iter().copied()
    }
}
