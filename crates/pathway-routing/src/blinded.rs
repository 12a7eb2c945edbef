use pathway_core::{FeatureVector, MilliSatoshi, Vertex};
use serde::{Deserialize, Serialize};

use crate::additional_edge::{AdditionalEdge, AdditionalEdges, CachedEdgePolicy, SharedEdgePolicy};
use crate::error::RoutingError;

/// One hop of a blinded path: a blinded node key and the encrypted data
/// only that node can read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlindedHop {
    pub blinded_node_pub: Vertex,
    pub cipher_text: Vec<u8>,
}

/// A route to the recipient whose hops after the introduction node are
/// hidden from the sender.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlindedPath {
    /// The unblinded first node, which must be found in the public graph.
    pub introduction_point: Vertex,
    pub blinding_point: Vertex,
    /// Hops including the introduction node at index 0.
    pub blinded_hops: Vec<BlindedHop>,
}

/// A blinded path together with the aggregate relay parameters the
/// recipient published for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlindedPayment {
    pub blinded_path: BlindedPath,
    pub base_fee: u32,
    pub proportional_fee_rate: u32,
    pub cltv_expiry_delta: u16,
    pub htlc_minimum: u64,
    pub htlc_maximum: u64,
    pub features: Option<FeatureVector>,
}

impl BlindedPayment {
    pub fn validate(&self) -> Result<(), RoutingError> {
        if self.blinded_path.blinded_hops.is_empty() {
            return Err(RoutingError::InvalidBlindedPath(
                "at least 1 blinded hop required".into(),
            ));
        }
        if self.htlc_maximum != 0 && self.htlc_maximum < self.htlc_minimum {
            return Err(RoutingError::InvalidBlindedPath(format!(
                "htlc maximum {} below minimum {}",
                self.htlc_maximum, self.htlc_minimum
            )));
        }
        Ok(())
    }

    /// Number of hops after the introduction node.
    pub fn blinded_hop_count(&self) -> usize {
        self.blinded_path.blinded_hops.len().saturating_sub(1)
    }

    /// Convert this path into additional edges.
    ///
    /// The first edge starts at the introduction node and carries the
    /// aggregate policy of the whole blinded portion, so path finding
    /// budgets enough fees and delay for it. Following edges link the
    /// blinded hops with zero policies. When `target_override` is set, the
    /// last edge points at it instead of the final blinded key.
    fn to_route_hints(
        &self,
        path_index: usize,
        target_override: Option<Vertex>,
    ) -> AdditionalEdges {
        let hops = &self.blinded_path.blinded_hops;
        let hint_count = self.blinded_hop_count();
        let mut hints = AdditionalEdges::new();
        if hint_count == 0 {
            return hints;
        }

        let features = self.features.clone().unwrap_or_default();
        let mut policies = Vec::with_capacity(hint_count);

        policies.push((
            self.blinded_path.introduction_point,
            CachedEdgePolicy {
                channel_id: 0,
                time_lock_delta: self.cltv_expiry_delta,
                min_htlc: MilliSatoshi(self.htlc_minimum),
                max_htlc: MilliSatoshi(self.htlc_maximum),
                fee_base_msat: MilliSatoshi(u64::from(self.base_fee)),
                fee_proportional_millionths: MilliSatoshi(u64::from(self.proportional_fee_rate)),
                to_node: hops[1].blinded_node_pub,
                to_node_features: features.clone(),
            },
        ));

        for i in 1..hint_count {
            policies.push((
                hops[i].blinded_node_pub,
                CachedEdgePolicy {
                    channel_id: 0,
                    time_lock_delta: 0,
                    min_htlc: MilliSatoshi::ZERO,
                    max_htlc: MilliSatoshi::ZERO,
                    fee_base_msat: MilliSatoshi::ZERO,
                    fee_proportional_millionths: MilliSatoshi::ZERO,
                    to_node: hops[i + 1].blinded_node_pub,
                    to_node_features: features.clone(),
                },
            ));
        }

        if let (Some(target), Some((_, last))) = (target_override, policies.last_mut()) {
            last.to_node = target;
        }

        for (hop_index, (from_node, policy)) in policies.into_iter().enumerate() {
            hints.insert(
                from_node,
                vec![AdditionalEdge::Blinded {
                    policy: SharedEdgePolicy::new(policy),
                    path_index,
                    hop_index,
                }],
            );
        }

        hints
    }
}

/// The blinded paths of one payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlindedPaymentPathSet {
    paths: Vec<BlindedPayment>,
    /// The vertex every path converges on during path finding.
    target_pub_key: Vertex,
}

impl BlindedPaymentPathSet {
    /// Build a path set from at least one path.
    ///
    /// If a path consists of the introduction node alone, the recipient is
    /// known: that path is kept on its own and the introduction node
    /// becomes the target. Otherwise all paths share a pseudo target
    /// derived from their final blinded hops.
    pub fn new(paths: Vec<BlindedPayment>) -> Result<Self, RoutingError> {
        if paths.is_empty() {
            return Err(RoutingError::InvalidBlindedPath(
                "at least one blinded path required".into(),
            ));
        }
        for path in &paths {
            path.validate()?;
        }

        if let Some(direct) = paths.iter().find(|p| p.blinded_hop_count() == 0) {
            let target_pub_key = direct.blinded_path.introduction_point;
            return Ok(Self {
                paths: vec![direct.clone()],
                target_pub_key,
            });
        }

        let mut hasher = blake3::Hasher::new();
        hasher.update(b"pathway/blinded-target");
        for path in &paths {
            if let Some(last) = path.blinded_path.blinded_hops.last() {
                hasher.update(last.blinded_node_pub.as_bytes());
            }
        }
        let target_pub_key = Vertex::new(*hasher.finalize().as_bytes());

        Ok(Self {
            paths,
            target_pub_key,
        })
    }

    pub fn paths(&self) -> &[BlindedPayment] {
        &self.paths
    }

    pub fn target_pub_key(&self) -> Vertex {
        self.target_pub_key
    }

    /// Whether the introduction node is the recipient itself.
    pub fn is_introduction_target(&self) -> bool {
        self.paths.len() == 1 && self.paths[0].blinded_hop_count() == 0
    }

    /// Additional edges for every path, all ending at the set's target.
    pub fn to_route_hints(&self) -> AdditionalEdges {
        let mut hints = AdditionalEdges::new();
        for (path_index, path) in self.paths.iter().enumerate() {
            for (from, edges) in path.to_route_hints(path_index, Some(self.target_pub_key)) {
                hints.entry(from).or_default().extend(edges);
            }
        }
        hints
    }
}
