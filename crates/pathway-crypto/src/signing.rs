use ed25519_dalek::Signer;
use ed25519_dalek::Verifier;
use pathway_core::ChannelUpdate;

use crate::error::CryptoError;
use crate::keys::{KeyPair, PublicKey};

/// Ed25519 signature (64 bytes).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    inner: ed25519_dalek::Signature,
}

impl Signature {
    pub fn to_bytes(&self) -> [u8; 64] {
        self.inner.to_bytes()
    }

    /// Create from raw bytes (64 bytes).
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let bytes_arr: [u8; 64] = bytes.try_into().map_err(|_| {
            CryptoError::InvalidInput(format!("signature must be 64 bytes, got {}", bytes.len()))
        })?;
        let inner = ed25519_dalek::Signature::from_bytes(&bytes_arr);
        Ok(Self { inner })
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }
}

pub fn sign(message: &[u8], keypair: &KeyPair) -> Signature {
    let sig = keypair.signing_key().sign(message);
    Signature { inner: sig }
}

pub fn verify(
    message: &[u8],
    signature: &Signature,
    pubkey: &PublicKey,
) -> Result<(), CryptoError> {
    pubkey
        .verifying_key()
        .verify(message, &signature.inner)
        .map_err(|_| CryptoError::SignatureVerificationFailed)
}

/// BLAKE3 digest of a channel update's signed fields. This is what the
/// forwarding node signs.
pub fn channel_update_digest(update: &ChannelUpdate) -> [u8; 32] {
    *blake3::hash(&update.signing_payload()).as_bytes()
}

/// Sign a channel update and store the signature in it.
pub fn sign_channel_update(update: &mut ChannelUpdate, keypair: &KeyPair) {
    let sig = sign(&channel_update_digest(update), keypair);
    update.signature = sig.to_bytes().to_vec();
}

/// Check that `update` was signed by `pubkey`.
pub fn verify_channel_update_signature(
    update: &ChannelUpdate,
    pubkey: &PublicKey,
) -> Result<(), CryptoError> {
    let sig = Signature::from_bytes(&update.signature)?;
    verify(&channel_update_digest(update), &sig, pubkey)
}
