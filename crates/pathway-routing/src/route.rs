use pathway_core::{CustomRecords, MilliSatoshi, PaymentAddr, Vertex};
use serde::{Deserialize, Serialize};

use crate::blinded::BlindedPaymentPathSet;
use crate::error::RoutingError;
use crate::pathfind::PathEdge;

/// Multi-path record attached to the final hop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MppRecord {
    pub payment_addr: PaymentAddr,
    /// Amount of the whole payment, over all shards.
    pub total_msat: MilliSatoshi,
}

/// A single hop in a [`Route`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hop {
    /// The node receiving the HTLC at this hop.
    pub pub_key: Vertex,
    pub channel_id: u64,
    pub outgoing_time_lock: u32,
    pub amt_to_forward: MilliSatoshi,
    pub mpp: Option<MppRecord>,
    pub custom_records: CustomRecords,
    pub metadata: Option<Vec<u8>>,
    /// Encrypted recipient data for hops inside a blinded path.
    pub encrypted_data: Option<Vec<u8>>,
}

/// A fully specified route, ready to be dispatched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    pub total_time_lock: u32,
    /// Amount sent from the source, fees included.
    pub total_amount: MilliSatoshi,
    pub source_pub_key: Vertex,
    pub hops: Vec<Hop>,
}

impl Route {
    /// Amount delivered to the final hop.
    pub fn receiver_amt(&self) -> MilliSatoshi {
        self.hops
            .last()
            .map_or(MilliSatoshi::ZERO, |h| h.amt_to_forward)
    }

    pub fn total_fees(&self) -> MilliSatoshi {
        self.total_amount.saturating_sub(self.receiver_amt())
    }

    pub fn hop_count(&self) -> usize {
        self.hops.len()
    }
}

/// Values for the final hop's payload.
#[derive(Debug, Clone, PartialEq)]
pub struct FinalHopParams {
    pub amt: MilliSatoshi,
    pub total_amt: MilliSatoshi,
    /// Final CLTV delta including block padding.
    pub cltv_delta: u16,
    pub records: CustomRecords,
    pub payment_addr: Option<PaymentAddr>,
    pub metadata: Option<Vec<u8>>,
}

/// Turns a found path into a [`Route`], propagating fees and time locks
/// backwards from the final hop.
pub trait RouteBuilder: Send + Sync {
    fn new_route(
        &self,
        source: Vertex,
        path: &[PathEdge],
        height: u32,
        final_hop: FinalHopParams,
        blinded: Option<&BlindedPaymentPathSet>,
    ) -> Result<Route, RoutingError>;
}
