//! Access to the public channel graph and to local channel bandwidth.

use async_trait::async_trait;
use pathway_core::{FeatureVector, MilliSatoshi, Satoshi, Vertex};
use std::collections::HashMap;

use crate::additional_edge::CachedEdgePolicy;
use crate::error::RoutingError;

/// A channel seen from one of its endpoints.
#[derive(Debug, Clone)]
pub struct DirectedChannel {
    pub channel_id: u64,
    /// The peer at the other end.
    pub other_node: Vertex,
    pub capacity: Satoshi,
    /// Whether the outgoing direction has a known policy.
    pub out_policy_set: bool,
    /// Policy for forwarding from `other_node` towards the node being
    /// iterated.
    pub in_policy: Option<CachedEdgePolicy>,
}

/// A consistent read view of the channel graph.
///
/// A view is obtained from a [`GraphSessionFactory`] and released when
/// dropped.
pub trait Graph: Send + Sync {
    /// Call `cb` for every channel of `node`. An error from the callback
    /// stops the iteration and is returned.
    fn for_each_node_directed_channel(
        &self,
        node: &Vertex,
        cb: &mut dyn FnMut(&DirectedChannel) -> Result<(), RoutingError>,
    ) -> Result<(), RoutingError>;

    /// Features advertised by `node`; empty when the node is unknown.
    fn fetch_node_features(&self, node: &Vertex) -> Result<FeatureVector, RoutingError>;
}

/// Opens scoped graph views.
#[async_trait]
pub trait GraphSessionFactory: Send + Sync {
    async fn graph_session(&self) -> Result<Box<dyn Graph>, RoutingError>;
}

/// Spendable balance of our own channels, by channel id.
#[derive(Debug, Clone, Default)]
pub struct BandwidthHints {
    local: HashMap<u64, MilliSatoshi>,
}

impl BandwidthHints {
    pub fn new(local: HashMap<u64, MilliSatoshi>) -> Self {
        Self { local }
    }

    /// `None` for channels that are not ours.
    pub fn available_chan_bandwidth(&self, channel_id: u64) -> Option<MilliSatoshi> {
        self.local.get(&channel_id).copied()
    }

    pub fn len(&self) -> usize {
        self.local.len()
    }

    pub fn is_empty(&self) -> bool {
        self.local.is_empty()
    }
}

/// Computes bandwidth hints against a graph view.
#[async_trait]
pub trait BandwidthHintProvider: Send + Sync {
    async fn bandwidth_hints(&self, graph: &dyn Graph) -> Result<BandwidthHints, RoutingError>;
}
