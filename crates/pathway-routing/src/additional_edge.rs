//! Edges that are not part of the public channel graph.
//!
//! Private channels reach the session as route hints and blinded paths as
//! aggregate relay parameters. Both become [`AdditionalEdge`]s stored under
//! the vertex of the node that forwards over them, which is also the node
//! whose signed channel updates may later replace their policy.

use pathway_core::{ChannelUpdate, FeatureVector, MilliSatoshi, Vertex};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Forwarding policy of one direction of a channel, as path finding sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedEdgePolicy {
    pub channel_id: u64,
    pub time_lock_delta: u16,
    pub min_htlc: MilliSatoshi,
    /// Zero when the channel advertises no maximum.
    pub max_htlc: MilliSatoshi,
    pub fee_base_msat: MilliSatoshi,
    pub fee_proportional_millionths: MilliSatoshi,
    /// The node this edge leads to.
    pub to_node: Vertex,
    pub to_node_features: FeatureVector,
}

impl CachedEdgePolicy {
    /// Fee charged for forwarding `amt` over this edge.
    pub fn compute_fee(&self, amt: MilliSatoshi) -> MilliSatoshi {
        let proportional =
            u128::from(amt.0) * u128::from(self.fee_proportional_millionths.0) / 1_000_000;
        let proportional = u64::try_from(proportional).unwrap_or(u64::MAX);
        self.fee_base_msat.saturating_add(MilliSatoshi(proportional))
    }
}

/// Handle to a policy shared between the session's edge store and any
/// in-flight path finding.
///
/// Updates replace the fee and delta fields under one write lock, so
/// readers taking a [`snapshot`](Self::snapshot) see either the old or the
/// new policy, never a mix of both.
#[derive(Debug, Clone)]
pub struct SharedEdgePolicy(Arc<RwLock<CachedEdgePolicy>>);

impl SharedEdgePolicy {
    pub fn new(policy: CachedEdgePolicy) -> Self {
        Self(Arc::new(RwLock::new(policy)))
    }

    /// A consistent copy of the current policy.
    pub fn snapshot(&self) -> CachedEdgePolicy {
        self.0.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn channel_id(&self) -> u64 {
        self.0.read().unwrap_or_else(PoisonError::into_inner).channel_id
    }

    /// Whether both handles refer to the same stored policy.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Overwrite time-lock delta, base fee and proportional fee from an
    /// already verified update. The channel id and target are untouched.
    pub(crate) fn apply_channel_update(&self, msg: &ChannelUpdate) {
        let mut policy = self.0.write().unwrap_or_else(PoisonError::into_inner);
        policy.time_lock_delta = msg.time_lock_delta;
        policy.fee_base_msat = MilliSatoshi(u64::from(msg.base_fee));
        policy.fee_proportional_millionths = MilliSatoshi(u64::from(msg.fee_rate));
    }
}

/// An edge supplied outside the public graph.
#[derive(Debug, Clone)]
pub enum AdditionalEdge {
    /// A private channel announced through a route hint.
    Private { policy: SharedEdgePolicy },
    /// A hop inside a blinded path.
    Blinded {
        policy: SharedEdgePolicy,
        /// Index of the path within the blinded path set.
        path_index: usize,
        /// Index of the hop this edge starts from within that path.
        hop_index: usize,
    },
}

impl AdditionalEdge {
    pub fn private(policy: CachedEdgePolicy) -> Self {
        Self::Private {
            policy: SharedEdgePolicy::new(policy),
        }
    }

    pub fn policy(&self) -> &SharedEdgePolicy {
        match self {
            Self::Private { policy } | Self::Blinded { policy, .. } => policy,
        }
    }

    pub fn is_blinded(&self) -> bool {
        matches!(self, Self::Blinded { .. })
    }
}

/// Additional edges keyed by the vertex they start from.
pub type AdditionalEdges = HashMap<Vertex, Vec<AdditionalEdge>>;

/// One hop of a private route hint taken from an invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HopHint {
    /// The node forwarding over the hinted channel.
    pub node_id: Vertex,
    pub channel_id: u64,
    pub fee_base_msat: u32,
    pub fee_proportional_millionths: u32,
    pub cltv_expiry_delta: u16,
}

/// A chain of hop hints ending at the payment target.
pub type RouteHint = Vec<HopHint>;

/// Convert route hints into additional edges.
///
/// Hop `i` of a hint leads to hop `i + 1`, and the final hop leads to
/// `target`. Empty hints are skipped.
pub fn route_hints_to_edges(route_hints: &[RouteHint], target: Vertex) -> AdditionalEdges {
    let mut edges = AdditionalEdges::new();

    for route_hint in route_hints.iter().filter(|h| !h.is_empty()) {
        for (i, hop_hint) in route_hint.iter().enumerate() {
            let to_node = route_hint
                .get(i + 1)
                .map(|next| next.node_id)
                .unwrap_or(target);

            let policy = CachedEdgePolicy {
                channel_id: hop_hint.channel_id,
                time_lock_delta: hop_hint.cltv_expiry_delta,
                min_htlc: MilliSatoshi::ZERO,
                max_htlc: MilliSatoshi::ZERO,
                fee_base_msat: MilliSatoshi(u64::from(hop_hint.fee_base_msat)),
                fee_proportional_millionths: MilliSatoshi(u64::from(
                    hop_hint.fee_proportional_millionths,
                )),
                to_node,
                to_node_features: FeatureVector::new(),
            };

            edges
                .entry(hop_hint.node_id)
                .or_default()
                .push(AdditionalEdge::private(policy));
        }
    }

    edges
}
