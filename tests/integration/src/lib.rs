//! Shared fixtures for the cross-crate payment session scenarios.

use pathway_core::{ChannelUpdate, MilliSatoshi, Vertex};
use pathway_crypto::{sign_channel_update, KeyPair};
use std::sync::Once;

static TRACING: Once = Once::new();

/// Install a test-writer fmt subscriber once per test binary.
///
/// Honors `RUST_LOG`, defaulting to debug output for the routing crate.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("pathway_routing=debug"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// A deterministic node identity.
pub fn node(seed: u8) -> KeyPair {
    KeyPair::from_seed(&[seed; 32])
}

pub fn vertex(seed: u8) -> Vertex {
    node(seed).vertex()
}

/// A channel update for `short_channel_id` signed by `signer`.
pub fn signed_update(
    signer: &KeyPair,
    short_channel_id: u64,
    base_fee: u32,
    fee_rate: u32,
    time_lock_delta: u16,
) -> ChannelUpdate {
    let mut msg = ChannelUpdate {
        chain_hash: [0x6f; 32],
        short_channel_id,
        timestamp: 1_700_000_000,
        message_flags: 1,
        channel_flags: 0,
        time_lock_delta,
        htlc_minimum_msat: MilliSatoshi(1_000),
        base_fee,
        fee_rate,
        htlc_maximum_msat: MilliSatoshi(100_000_000),
        signature: Vec::new(),
    };
    sign_channel_update(&mut msg, signer);
    msg
}
