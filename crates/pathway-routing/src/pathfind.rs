//! The seam between a payment session and the path-finding algorithm.

use async_trait::async_trait;
use pathway_core::{
    CustomRecords, FeatureVector, MilliSatoshi, PathFindingConfig, PaymentAddr, Satoshi, Vertex,
};
use std::fmt;
use std::sync::Arc;

use crate::additional_edge::{AdditionalEdges, CachedEdgePolicy};
use crate::error::PathFindingError;
use crate::graph::{BandwidthHints, Graph};
use crate::payment::AmpOptions;

/// Estimates the success probability of forwarding over a channel.
pub trait MissionControlQuerier: Send + Sync {
    fn get_probability(&self, from: &Vertex, to: &Vertex, amt: MilliSatoshi, capacity: Satoshi)
        -> f64;
}

/// Constraints a single path-finding call must respect.
#[derive(Clone)]
pub struct RestrictParams {
    pub probability_source: Arc<dyn MissionControlQuerier>,
    pub fee_limit: MilliSatoshi,
    /// Allowed first-hop channels. Empty allows all.
    pub outgoing_channel_ids: Vec<u64>,
    pub last_hop: Option<Vertex>,
    /// Maximum total time lock, already reduced by the padded final delta.
    pub cltv_limit: u32,
    pub dest_custom_records: CustomRecords,
    pub dest_features: Option<FeatureVector>,
    pub payment_addr: Option<PaymentAddr>,
    pub amp: Option<AmpOptions>,
    pub metadata: Option<Vec<u8>>,
    pub first_hop_custom_records: CustomRecords,
}

impl RestrictParams {
    pub fn probability(
        &self,
        from: &Vertex,
        to: &Vertex,
        amt: MilliSatoshi,
        capacity: Satoshi,
    ) -> f64 {
        self.probability_source.get_probability(from, to, amt, capacity)
    }
}

impl fmt::Debug for RestrictParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestrictParams")
            .field("fee_limit", &self.fee_limit)
            .field("outgoing_channel_ids", &self.outgoing_channel_ids)
            .field("last_hop", &self.last_hop)
            .field("cltv_limit", &self.cltv_limit)
            .field("dest_features", &self.dest_features)
            .field("payment_addr", &self.payment_addr.is_some())
            .field("amp", &self.amp.is_some())
            .finish_non_exhaustive()
    }
}

/// Graph data visible to one path-finding call.
#[derive(Clone, Copy)]
pub struct GraphParams<'a> {
    pub additional_edges: &'a AdditionalEdges,
    pub bandwidth_hints: &'a BandwidthHints,
    pub graph: &'a dyn Graph,
}

/// Endpoints and amount of one path-finding call.
#[derive(Debug, Clone, PartialEq)]
pub struct PathRequest {
    pub self_node: Vertex,
    pub source: Vertex,
    pub target: Vertex,
    /// Amount the target should receive.
    pub amount: MilliSatoshi,
    pub time_pref: f64,
    /// Absolute expiry height of the HTLC at the final hop.
    pub final_htlc_expiry: u32,
}

/// One edge of a found path, in order from source to target.
#[derive(Debug, Clone, PartialEq)]
pub struct PathEdge {
    /// Policy snapshot taken when the path was found.
    pub policy: CachedEdgePolicy,
    pub capacity: Satoshi,
    /// `(path_index, hop_index)` for edges inside a blinded path.
    pub blinded: Option<(usize, usize)>,
}

impl PathEdge {
    pub fn to_node(&self) -> Vertex {
        self.policy.to_node
    }
}

/// Finds a single path for an amount.
#[async_trait]
pub trait PathFinder: Send + Sync {
    async fn find_path(
        &self,
        graph: GraphParams<'_>,
        restrictions: &RestrictParams,
        config: &PathFindingConfig,
        request: &PathRequest,
    ) -> Result<Vec<PathEdge>, PathFindingError>;
}
