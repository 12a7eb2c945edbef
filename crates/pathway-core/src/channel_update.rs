use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::MilliSatoshi;

/// Bit of `channel_flags` selecting which end of the channel the update is for.
pub const CHAN_FLAG_DIRECTION: u8 = 0b0000_0001;
/// Bit of `channel_flags` marking the channel as disabled.
pub const CHAN_FLAG_DISABLED: u8 = 0b0000_0010;

/// A decoded `channel_update` gossip message.
///
/// The forwarding node signs every field except `signature`; see
/// [`ChannelUpdate::signing_payload`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelUpdate {
    /// Genesis hash of the chain the channel lives on.
    pub chain_hash: [u8; 32],
    pub short_channel_id: u64,
    /// Seconds since the UNIX epoch; newer updates supersede older ones.
    pub timestamp: u32,
    pub message_flags: u8,
    pub channel_flags: u8,
    /// Blocks the forwarding node subtracts from the incoming HTLC's expiry.
    pub time_lock_delta: u16,
    pub htlc_minimum_msat: MilliSatoshi,
    /// Flat fee in millisatoshi.
    pub base_fee: u32,
    /// Proportional fee in millionths of the forwarded amount.
    pub fee_rate: u32,
    pub htlc_maximum_msat: MilliSatoshi,
    /// Ed25519 signature over the signing payload (64 bytes).
    pub signature: Vec<u8>,
}

impl ChannelUpdate {
    /// Canonical byte encoding of all signed fields, big-endian, in wire
    /// order.
    pub fn signing_payload(&self) -> Vec<u8> {
        let mut payload = Vec::with_capacity(32 + 8 + 4 + 2 + 2 + 8 + 4 + 4 + 8);
        payload.extend_from_slice(&self.chain_hash);
        payload.extend_from_slice(&self.short_channel_id.to_be_bytes());
        payload.extend_from_slice(&self.timestamp.to_be_bytes());
        payload.push(self.message_flags);
        payload.push(self.channel_flags);
        payload.extend_from_slice(&self.time_lock_delta.to_be_bytes());
        payload.extend_from_slice(&self.htlc_minimum_msat.0.to_be_bytes());
        payload.extend_from_slice(&self.base_fee.to_be_bytes());
        payload.extend_from_slice(&self.fee_rate.to_be_bytes());
        payload.extend_from_slice(&self.htlc_maximum_msat.0.to_be_bytes());
        payload
    }

    /// Direction of the update: 0 when sent by the first node of the
    /// channel, 1 otherwise.
    pub fn direction(&self) -> u8 {
        self.channel_flags & CHAN_FLAG_DIRECTION
    }

    pub fn is_disabled(&self) -> bool {
        self.channel_flags & CHAN_FLAG_DISABLED != 0
    }

    /// Structural checks that do not need the signer's key.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.signature.len() != 64 {
            return Err(CoreError::InvalidChannelUpdate(format!(
                "signature must be 64 bytes, got {}",
                self.signature.len()
            )));
        }
        if !self.htlc_maximum_msat.is_zero() && self.htlc_maximum_msat < self.htlc_minimum_msat {
            return Err(CoreError::InvalidChannelUpdate(format!(
                "htlc maximum {} below minimum {}",
                self.htlc_maximum_msat, self.htlc_minimum_msat
            )));
        }
        Ok(())
    }
}
