pub mod error;
pub mod keys;
pub mod signing;

pub use error::CryptoError;
pub use keys::{KeyPair, PublicKey};
pub use signing::{
    channel_update_digest, sign, sign_channel_update, verify, verify_channel_update_signature,
    Signature,
};
