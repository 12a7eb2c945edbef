//! Deterministic collaborator doubles for session tests.
//!
//! Compiled for unit tests and behind the `test-utils` feature so the
//! integration tests can drive a session without a real graph.

use async_trait::async_trait;
use pathway_core::{FeatureVector, MilliSatoshi, PathFindingConfig, Satoshi, Vertex};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::additional_edge::{AdditionalEdge, CachedEdgePolicy};
use crate::blinded::BlindedPaymentPathSet;
use crate::error::{NoRouteError, PathFindingError, RoutingError};
use crate::graph::{
    BandwidthHintProvider, BandwidthHints, DirectedChannel, Graph, GraphSessionFactory,
};
use crate::pathfind::{
    GraphParams, MissionControlQuerier, PathEdge, PathFinder, PathRequest, RestrictParams,
};
use crate::route::{FinalHopParams, Hop, MppRecord, Route, RouteBuilder};
use crate::session::Collaborators;

/// A policy with the given channel, fees and delta leading to `to_node`.
pub fn policy(
    channel_id: u64,
    to_node: Vertex,
    fee_base_msat: u64,
    time_lock_delta: u16,
) -> CachedEdgePolicy {
    CachedEdgePolicy {
        channel_id,
        time_lock_delta,
        min_htlc: MilliSatoshi::ZERO,
        max_htlc: MilliSatoshi::ZERO,
        fee_base_msat: MilliSatoshi(fee_base_msat),
        fee_proportional_millionths: MilliSatoshi::ZERO,
        to_node,
        to_node_features: FeatureVector::new(),
    }
}

/// A one-edge path straight to `target`.
pub fn direct_path(target: Vertex, channel_id: u64) -> Vec<PathEdge> {
    vec![PathEdge {
        policy: policy(channel_id, target, 0, 0),
        capacity: Satoshi(1_000_000),
        blinded: None,
    }]
}

/// An in-memory channel graph.
#[derive(Debug, Clone, Default)]
pub struct StaticGraph {
    channels: HashMap<Vertex, Vec<DirectedChannel>>,
    features: HashMap<Vertex, FeatureVector>,
}

impl StaticGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a channel usable in both directions with the same fee and delta.
    pub fn add_channel(
        &mut self,
        a: Vertex,
        b: Vertex,
        channel_id: u64,
        capacity: Satoshi,
        fee_base_msat: u64,
        time_lock_delta: u16,
    ) {
        self.channels.entry(a).or_default().push(DirectedChannel {
            channel_id,
            other_node: b,
            capacity,
            out_policy_set: true,
            in_policy: Some(policy(channel_id, a, fee_base_msat, time_lock_delta)),
        });
        self.channels.entry(b).or_default().push(DirectedChannel {
            channel_id,
            other_node: a,
            capacity,
            out_policy_set: true,
            in_policy: Some(policy(channel_id, b, fee_base_msat, time_lock_delta)),
        });
    }

    pub fn set_features(&mut self, node: Vertex, features: FeatureVector) {
        self.features.insert(node, features);
    }
}

impl Graph for StaticGraph {
    fn for_each_node_directed_channel(
        &self,
        node: &Vertex,
        cb: &mut dyn FnMut(&DirectedChannel) -> Result<(), RoutingError>,
    ) -> Result<(), RoutingError> {
        for channel in self.channels.get(node).into_iter().flatten() {
            cb(channel)?;
        }
        Ok(())
    }

    fn fetch_node_features(&self, node: &Vertex) -> Result<FeatureVector, RoutingError> {
        Ok(self.features.get(node).cloned().unwrap_or_default())
    }
}

struct ScopedGraph {
    graph: Arc<StaticGraph>,
    open: Arc<AtomicUsize>,
}

impl Graph for ScopedGraph {
    fn for_each_node_directed_channel(
        &self,
        node: &Vertex,
        cb: &mut dyn FnMut(&DirectedChannel) -> Result<(), RoutingError>,
    ) -> Result<(), RoutingError> {
        self.graph.for_each_node_directed_channel(node, cb)
    }

    fn fetch_node_features(&self, node: &Vertex) -> Result<FeatureVector, RoutingError> {
        self.graph.fetch_node_features(node)
    }
}

impl Drop for ScopedGraph {
    fn drop(&mut self) {
        self.open.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Hands out views of a [`StaticGraph`] and counts them.
pub struct CountingGraphFactory {
    graph: Arc<StaticGraph>,
    opened: AtomicUsize,
    open: Arc<AtomicUsize>,
    fail: bool,
}

impl CountingGraphFactory {
    pub fn new(graph: StaticGraph) -> Self {
        Self {
            graph: Arc::new(graph),
            opened: AtomicUsize::new(0),
            open: Arc::new(AtomicUsize::new(0)),
            fail: false,
        }
    }

    /// A factory whose every session fails to open.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(StaticGraph::new())
        }
    }

    /// Number of `graph_session` calls so far.
    pub fn sessions_opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Number of views not yet dropped.
    pub fn sessions_open(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GraphSessionFactory for CountingGraphFactory {
    async fn graph_session(&self) -> Result<Box<dyn Graph>, RoutingError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(RoutingError::Graph("graph unavailable".into()));
        }
        self.open.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScopedGraph {
            graph: Arc::clone(&self.graph),
            open: Arc::clone(&self.open),
        }))
    }
}

/// Returns the same bandwidth hints on every call.
pub struct StaticBandwidthProvider {
    hints: HashMap<u64, MilliSatoshi>,
    calls: AtomicUsize,
    fail: bool,
}

impl StaticBandwidthProvider {
    pub fn new(hints: HashMap<u64, MilliSatoshi>) -> Self {
        Self {
            hints,
            calls: AtomicUsize::new(0),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(HashMap::new())
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for StaticBandwidthProvider {
    fn default() -> Self {
        Self::new(HashMap::new())
    }
}

#[async_trait]
impl BandwidthHintProvider for StaticBandwidthProvider {
    async fn bandwidth_hints(&self, _graph: &dyn Graph) -> Result<BandwidthHints, RoutingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(RoutingError::BandwidthHints("link layer unavailable".into()));
        }
        Ok(BandwidthHints::new(self.hints.clone()))
    }
}

/// Same probability for every channel.
pub struct FixedMissionControl(pub f64);

impl MissionControlQuerier for FixedMissionControl {
    fn get_probability(&self, _: &Vertex, _: &Vertex, _: MilliSatoshi, _: Satoshi) -> f64 {
        self.0
    }
}

/// Knows an upper liquidity bound for some node pairs.
///
/// Amounts within a bound succeed with `success`, amounts above it never.
/// Unknown pairs get `success` as well.
pub struct PairLimitMissionControl {
    limits: HashMap<(Vertex, Vertex), MilliSatoshi>,
    success: f64,
}

impl PairLimitMissionControl {
    pub fn new(success: f64) -> Self {
        Self {
            limits: HashMap::new(),
            success,
        }
    }

    pub fn with_limit(mut self, from: Vertex, to: Vertex, max: MilliSatoshi) -> Self {
        self.limits.insert((from, to), max);
        self
    }
}

impl MissionControlQuerier for PairLimitMissionControl {
    fn get_probability(&self, from: &Vertex, to: &Vertex, amt: MilliSatoshi, _: Satoshi) -> f64 {
        match self.limits.get(&(*from, *to)) {
            Some(max) if amt > *max => 0.0,
            _ => self.success,
        }
    }
}

/// What a [`ScriptedPathFinder`] was asked.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub request: PathRequest,
    pub restrictions: RestrictParams,
    pub additional_edge_count: usize,
    pub bandwidth_hint_count: usize,
}

/// Replays queued results, then a fallback path if one is set.
pub struct ScriptedPathFinder {
    script: Mutex<VecDeque<Result<Vec<PathEdge>, PathFindingError>>>,
    fallback: Option<Vec<PathEdge>>,
    calls: Mutex<Vec<RecordedCall>>,
    yielding: bool,
}

impl ScriptedPathFinder {
    pub fn new(script: Vec<Result<Vec<PathEdge>, PathFindingError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback: None,
            calls: Mutex::new(Vec::new()),
            yielding: false,
        }
    }

    /// Yield to the runtime after recording a call and before answering it.
    pub fn yielding(mut self) -> Self {
        self.yielding = true;
        self
    }

    /// Always succeed with `path` once the script is used up.
    pub fn with_fallback(mut self, path: Vec<PathEdge>) -> Self {
        self.fallback = Some(path);
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Requested amounts, in call order.
    pub fn amounts(&self) -> Vec<MilliSatoshi> {
        self.calls().iter().map(|c| c.request.amount).collect()
    }
}

#[async_trait]
impl PathFinder for ScriptedPathFinder {
    async fn find_path(
        &self,
        graph: GraphParams<'_>,
        restrictions: &RestrictParams,
        _config: &PathFindingConfig,
        request: &PathRequest,
    ) -> Result<Vec<PathEdge>, PathFindingError> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RecordedCall {
                request: request.clone(),
                restrictions: restrictions.clone(),
                additional_edge_count: graph.additional_edges.values().map(Vec::len).sum(),
                bandwidth_hint_count: graph.bandwidth_hints.len(),
            });

        if self.yielding {
            tokio::task::yield_now().await;
        }

        let next = self
            .script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        match (next, &self.fallback) {
            (Some(result), _) => result,
            (None, Some(path)) => Ok(path.clone()),
            (None, None) => Err(PathFindingError::Internal("script exhausted".into())),
        }
    }
}

/// Breadth-first search backwards from the target over the public graph
/// and the additional edges.
///
/// Local channels are filtered by bandwidth hints, all other edges by the
/// restriction's probability source against `min_probability`. Fees are
/// not accounted for while searching.
#[derive(Debug, Default)]
pub struct BfsPathFinder;

#[async_trait]
impl PathFinder for BfsPathFinder {
    async fn find_path(
        &self,
        graph: GraphParams<'_>,
        restrictions: &RestrictParams,
        config: &PathFindingConfig,
        request: &PathRequest,
    ) -> Result<Vec<PathEdge>, PathFindingError> {
        if let Some(features) = &restrictions.dest_features {
            if !features.unknown_required().is_empty() {
                return Err(NoRouteError::UnknownRequiredFeature.into());
            }
        }

        let amount = request.amount;
        let mut toward_target: HashMap<Vertex, (Vertex, PathEdge)> = HashMap::new();
        let mut visited = HashSet::from([request.target]);
        let mut queue = VecDeque::from([request.target]);
        let mut local_shortfall = false;

        while let Some(node) = queue.pop_front() {
            if node == request.source {
                break;
            }

            let mut incoming: Vec<(Vertex, PathEdge)> = Vec::new();
            graph
                .graph
                .for_each_node_directed_channel(&node, &mut |channel: &DirectedChannel| {
                    if let Some(policy) = &channel.in_policy {
                        incoming.push((
                            channel.other_node,
                            PathEdge {
                                policy: policy.clone(),
                                capacity: channel.capacity,
                                blinded: None,
                            },
                        ));
                    }
                    Ok(())
                })
                .map_err(|e| PathFindingError::Internal(e.to_string()))?;

            for (from, edges) in graph.additional_edges {
                for edge in edges {
                    let policy = edge.policy().snapshot();
                    if policy.to_node != node {
                        continue;
                    }
                    let blinded = match edge {
                        AdditionalEdge::Blinded {
                            path_index,
                            hop_index,
                            ..
                        } => Some((*path_index, *hop_index)),
                        AdditionalEdge::Private { .. } => None,
                    };
                    incoming.push((
                        *from,
                        PathEdge {
                            policy,
                            capacity: Satoshi(0),
                            blinded,
                        },
                    ));
                }
            }

            for (from, edge) in incoming {
                if visited.contains(&from) {
                    continue;
                }
                if node == request.target {
                    if let Some(last_hop) = restrictions.last_hop {
                        if from != last_hop {
                            continue;
                        }
                    }
                }

                let channel_id = edge.policy.channel_id;
                if from == request.source {
                    if !restrictions.outgoing_channel_ids.is_empty()
                        && !restrictions.outgoing_channel_ids.contains(&channel_id)
                    {
                        continue;
                    }
                    let hint = graph.bandwidth_hints.available_chan_bandwidth(channel_id);
                    if let Some(bandwidth) = hint {
                        if bandwidth < amount {
                            local_shortfall = true;
                            continue;
                        }
                    }
                } else {
                    let probability = restrictions.probability(&from, &node, amount, edge.capacity);
                    if probability < config.min_probability {
                        continue;
                    }
                }

                visited.insert(from);
                toward_target.insert(from, (node, edge));
                queue.push_back(from);
            }
        }

        if !toward_target.contains_key(&request.source) {
            return Err(if local_shortfall {
                NoRouteError::InsufficientBalance.into()
            } else {
                NoRouteError::NoPathFound.into()
            });
        }

        let mut path = Vec::new();
        let mut current = request.source;
        while current != request.target {
            let (next, edge) = toward_target
                .get(&current)
                .ok_or(PathFindingError::NoRoute(NoRouteError::NoPathFound))?;
            path.push(edge.clone());
            current = *next;
        }
        Ok(path)
    }
}

/// Builds routes backwards from the final hop, adding each forwarding
/// node's fee and time-lock delta.
///
/// Hops inside a blinded path are addressed by their blinded key and carry
/// that hop's encrypted data.
#[derive(Debug, Default)]
pub struct SimpleRouteBuilder;

impl RouteBuilder for SimpleRouteBuilder {
    fn new_route(
        &self,
        source: Vertex,
        path: &[PathEdge],
        height: u32,
        final_hop: FinalHopParams,
        blinded: Option<&BlindedPaymentPathSet>,
    ) -> Result<Route, RoutingError> {
        if path.is_empty() {
            return Err(RoutingError::RouteConstruction("empty path".into()));
        }

        let last = path.len() - 1;
        let mut amt = final_hop.amt;
        let mut time_lock = height.saturating_add(u32::from(final_hop.cltv_delta));
        let mut hops = Vec::with_capacity(path.len());

        for (i, edge) in path.iter().enumerate().rev() {
            let (pub_key, encrypted_data) = match (edge.blinded, blinded) {
                (Some((path_index, hop_index)), Some(set)) => {
                    let hop = set
                        .paths()
                        .get(path_index)
                        .and_then(|p| p.blinded_path.blinded_hops.get(hop_index + 1))
                        .ok_or_else(|| {
                            RoutingError::RouteConstruction(format!(
                                "unknown blinded hop {}/{}",
                                path_index, hop_index
                            ))
                        })?;
                    (hop.blinded_node_pub, Some(hop.cipher_text.clone()))
                }
                _ => (edge.to_node(), None),
            };

            let is_final = i == last;
            hops.push(Hop {
                pub_key,
                channel_id: edge.policy.channel_id,
                outgoing_time_lock: time_lock,
                amt_to_forward: amt,
                mpp: final_hop
                    .payment_addr
                    .filter(|_| is_final)
                    .map(|payment_addr| MppRecord {
                        payment_addr,
                        total_msat: final_hop.total_amt,
                    }),
                custom_records: if is_final {
                    final_hop.records.clone()
                } else {
                    Default::default()
                },
                metadata: final_hop.metadata.clone().filter(|_| is_final),
                encrypted_data,
            });

            if i > 0 {
                amt = amt.saturating_add(edge.policy.compute_fee(amt));
                time_lock = time_lock.saturating_add(u32::from(edge.policy.time_lock_delta));
            }
        }

        hops.reverse();
        Ok(Route {
            total_time_lock: time_lock,
            total_amount: amt,
            source_pub_key: source,
            hops,
        })
    }
}

/// Collaborators around a scripted path finder, with handles kept for
/// assertions.
pub struct Harness {
    pub graph_factory: Arc<CountingGraphFactory>,
    pub bandwidth: Arc<StaticBandwidthProvider>,
    pub path_finder: Arc<ScriptedPathFinder>,
}

impl Harness {
    pub fn new(path_finder: ScriptedPathFinder) -> Self {
        Self {
            graph_factory: Arc::new(CountingGraphFactory::new(StaticGraph::new())),
            bandwidth: Arc::new(StaticBandwidthProvider::default()),
            path_finder: Arc::new(path_finder),
        }
    }

    pub fn with_graph_factory(mut self, factory: CountingGraphFactory) -> Self {
        self.graph_factory = Arc::new(factory);
        self
    }

    pub fn with_bandwidth(mut self, provider: StaticBandwidthProvider) -> Self {
        self.bandwidth = Arc::new(provider);
        self
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            graph_sessions: self.graph_factory.clone(),
            bandwidth_hints: self.bandwidth.clone(),
            mission_control: Arc::new(FixedMissionControl(1.0)),
            path_finder: self.path_finder.clone(),
            route_builder: Arc::new(SimpleRouteBuilder),
        }
    }
}
