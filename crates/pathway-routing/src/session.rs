//! The per-payment route request engine.

use async_trait::async_trait;
use pathway_core::{
    ChannelUpdate, CustomRecords, FeatureBit, MilliSatoshi, PathFindingConfig, SessionConfig,
    Vertex,
};
use pathway_crypto::{verify_channel_update_signature, PublicKey};
use std::sync::Arc;
use tracing::Instrument;

use crate::additional_edge::{route_hints_to_edges, AdditionalEdges, SharedEdgePolicy};
use crate::cltv::BLOCK_PADDING;
use crate::error::{NoRouteError, PathFindingError, RoutingError};
use crate::graph::{BandwidthHintProvider, GraphSessionFactory};
use crate::pathfind::{
    GraphParams, MissionControlQuerier, PathEdge, PathFinder, PathRequest, RestrictParams,
};
use crate::payment::LightningPayment;
use crate::route::{FinalHopParams, Route, RouteBuilder};

/// Route selection for the shards of one payment.
#[async_trait]
pub trait PaymentSession: Send + Sync {
    /// Find a route for at most `max_amt`.
    ///
    /// The returned route may carry less than `max_amt` when the payment
    /// could only be routed in smaller parts. `active_shards` is the number
    /// of shards of this payment currently in flight.
    async fn request_route(
        &self,
        max_amt: MilliSatoshi,
        fee_limit: MilliSatoshi,
        active_shards: u32,
        height: u32,
        first_hop_custom_records: CustomRecords,
    ) -> Result<Route, RoutingError>;

    /// Apply a channel update to a private edge policy after checking its
    /// signature against `pub_key`. Returns false if the update was rejected.
    fn update_additional_edge(
        &self,
        msg: &ChannelUpdate,
        pub_key: &PublicKey,
        policy: &SharedEdgePolicy,
    ) -> bool;

    /// The policy of the additional edge from `pub_key` with the given
    /// channel id.
    fn get_additional_edge_policy(
        &self,
        pub_key: &PublicKey,
        channel_id: u64,
    ) -> Option<SharedEdgePolicy>;
}

/// Shared services a session depends on.
#[derive(Clone)]
pub struct Collaborators {
    pub graph_sessions: Arc<dyn GraphSessionFactory>,
    pub bandwidth_hints: Arc<dyn BandwidthHintProvider>,
    pub mission_control: Arc<dyn MissionControlQuerier>,
    pub path_finder: Arc<dyn PathFinder>,
    pub route_builder: Arc<dyn RouteBuilder>,
}

/// Outcome of one path-finding attempt inside a graph scope.
enum PathAttempt {
    Found(Vec<PathEdge>),
    PathFinding(PathFindingError),
}

/// [`PaymentSession`] backed by a [`PathFinder`].
pub struct PathfindingSession {
    self_node: Vertex,
    additional_edges: AdditionalEdges,
    payment: LightningPayment,
    /// Every request fails with [`NoRouteError::EmptyPaySession`].
    empty: bool,
    collaborators: Collaborators,
    path_finding_config: PathFindingConfig,
    /// Splitting stops below this amount.
    min_shard_amt: MilliSatoshi,
    span: tracing::Span,
}

impl PathfindingSession {
    /// Create a session for `payment`.
    ///
    /// Route hints and blinded paths are converted into additional edges
    /// here. A payment may not carry both. An invalid `config` is rejected
    /// because a zero shard floor would never stop the halving loop.
    pub fn new(
        payment: LightningPayment,
        self_node: Vertex,
        collaborators: Collaborators,
        config: &SessionConfig,
    ) -> Result<Self, RoutingError> {
        config.validate()?;

        let mut additional_edges = route_hints_to_edges(&payment.route_hints, payment.target);

        if let Some(blinded) = &payment.blinded_path_set {
            if !additional_edges.is_empty() {
                return Err(RoutingError::ConflictingPathHints);
            }
            additional_edges = blinded.to_route_hints();
        }

        let span = session_span(&payment);
        span.in_scope(|| {
            tracing::debug!(
                target_node = %payment.target,
                amount = %payment.amount,
                additional_edges = additional_edges.len(),
                introduction_target = payment
                    .blinded_path_set
                    .as_ref()
                    .is_some_and(|set| set.is_introduction_target()),
                "Created payment session"
            );
        });

        Ok(Self {
            self_node,
            additional_edges,
            payment,
            empty: false,
            collaborators,
            path_finding_config: config.path_finding.clone(),
            min_shard_amt: config.min_shard_amt(),
            span,
        })
    }

    /// Create a session that refuses every route request.
    ///
    /// The session never searches, so `config` is stored but not checked.
    pub fn new_empty(
        payment: LightningPayment,
        self_node: Vertex,
        collaborators: Collaborators,
        config: &SessionConfig,
    ) -> Self {
        let span = session_span(&payment);
        Self {
            self_node,
            additional_edges: AdditionalEdges::new(),
            payment,
            empty: true,
            collaborators,
            path_finding_config: config.path_finding.clone(),
            min_shard_amt: config.min_shard_amt(),
            span,
        }
    }

    pub fn payment(&self) -> &LightningPayment {
        &self.payment
    }

    pub fn additional_edges(&self) -> &AdditionalEdges {
        &self.additional_edges
    }

    pub fn is_empty(&self) -> bool {
        self.empty
    }

    pub fn min_shard_amt(&self) -> MilliSatoshi {
        self.min_shard_amt
    }

    fn restrictions(
        &self,
        fee_limit: MilliSatoshi,
        cltv_limit: u32,
        first_hop_custom_records: CustomRecords,
    ) -> RestrictParams {
        RestrictParams {
            probability_source: Arc::clone(&self.collaborators.mission_control),
            fee_limit,
            outgoing_channel_ids: self.payment.outgoing_channel_ids.clone(),
            last_hop: self.payment.last_hop,
            cltv_limit,
            dest_custom_records: self.payment.dest_custom_records.clone(),
            dest_features: self.payment.dest_features.clone(),
            payment_addr: self.payment.payment_addr,
            amp: self.payment.amp.clone(),
            metadata: self.payment.metadata.clone(),
            first_hop_custom_records,
        }
    }

    /// Run one path-finding attempt against a fresh graph view.
    ///
    /// Failing to open the view or to fetch bandwidth hints is returned as
    /// an error; whatever the path finder reports is returned as the
    /// attempt's outcome. The view is released before returning.
    async fn find_path(
        &self,
        restrictions: &RestrictParams,
        amount: MilliSatoshi,
        final_htlc_expiry: u32,
    ) -> Result<PathAttempt, RoutingError> {
        let graph = self.collaborators.graph_sessions.graph_session().await?;

        // Balances change with concurrent payments, so hints are fetched
        // for every attempt.
        let bandwidth_hints = self
            .collaborators
            .bandwidth_hints
            .bandwidth_hints(graph.as_ref())
            .await?;

        tracing::debug!(amt = %amount, "Pathfinding");

        let request = PathRequest {
            self_node: self.self_node,
            source: self.self_node,
            target: self.payment.target,
            amount,
            time_pref: self.payment.time_pref,
            final_htlc_expiry,
        };
        let params = GraphParams {
            additional_edges: &self.additional_edges,
            bandwidth_hints: &bandwidth_hints,
            graph: graph.as_ref(),
        };

        let attempt = match self
            .collaborators
            .path_finder
            .find_path(params, restrictions, &self.path_finding_config, &request)
            .await
        {
            Ok(path) => PathAttempt::Found(path),
            Err(err) => PathAttempt::PathFinding(err),
        };
        Ok(attempt)
    }

    /// Whether a payment that found no path may be split further, logging
    /// the reason when it may not.
    fn may_split(&self, active_shards: u32) -> bool {
        if !self.payment.supports_split() {
            tracing::debug!("Not splitting because payment address is unspecified");
            return false;
        }

        let Some(dest_features) = &self.payment.dest_features else {
            tracing::debug!("Not splitting because destination features are unknown");
            return false;
        };

        if !dest_features.has_feature(FeatureBit::MPP_OPTIONAL)
            && !dest_features.has_feature(FeatureBit::AMP_OPTIONAL)
        {
            tracing::debug!("Not splitting because destination doesn't declare MPP or AMP");
            return false;
        }

        if active_shards.saturating_add(1) >= self.payment.max_parts {
            tracing::debug!(
                max_parts = self.payment.max_parts,
                "Not splitting because shard limit has been reached"
            );
            return false;
        }

        true
    }

    async fn request_route_in_span(
        &self,
        mut max_amt: MilliSatoshi,
        fee_limit: MilliSatoshi,
        active_shards: u32,
        height: u32,
        first_hop_custom_records: CustomRecords,
    ) -> Result<Route, RoutingError> {
        if self.empty {
            return Err(NoRouteError::EmptyPaySession.into());
        }

        // Padding keeps the receiver from rejecting the HTLC if blocks are
        // mined while it is in flight.
        let final_cltv_delta = self.payment.final_cltv_delta.saturating_add(BLOCK_PADDING);

        // Path finding works on the budget left after the final delta.
        let cltv_limit = self
            .payment
            .cltv_limit
            .saturating_sub(u32::from(final_cltv_delta));

        let restrictions = self.restrictions(fee_limit, cltv_limit, first_hop_custom_records);
        let final_htlc_expiry = height.saturating_add(u32::from(final_cltv_delta));

        if let Some(max_shard) = self.payment.max_shard_amt {
            if max_amt > max_shard {
                tracing::debug!(
                    from = %max_amt,
                    to = %max_shard,
                    "Clamping payment attempt due to max shard size"
                );
                max_amt = max_shard;
            }
        }

        loop {
            let path = match self
                .find_path(&restrictions, max_amt, final_htlc_expiry)
                .await?
            {
                PathAttempt::Found(path) => path,
                PathAttempt::PathFinding(PathFindingError::NoRoute(
                    NoRouteError::NoPathFound,
                )) => {
                    if !self.may_split(active_shards) {
                        return Err(NoRouteError::NoPathFound.into());
                    }

                    max_amt = max_amt.halved();
                    if max_amt < self.min_shard_amt {
                        tracing::debug!(
                            min_shard_amt = %self.min_shard_amt,
                            "Not splitting because minimum shard amount has been reached"
                        );
                        return Err(NoRouteError::NoPathFound.into());
                    }
                    continue;
                }
                // Partial shards would only be held by the receiver until
                // the MPP timeout, so never split on local balance.
                PathAttempt::PathFinding(PathFindingError::NoRoute(
                    NoRouteError::InsufficientBalance,
                )) => {
                    tracing::debug!("Not splitting because local balance is insufficient");
                    return Err(NoRouteError::InsufficientBalance.into());
                }
                PathAttempt::PathFinding(err) => return Err(err.into()),
            };

            let final_hop = FinalHopParams {
                amt: max_amt,
                total_amt: self.payment.amount,
                cltv_delta: final_cltv_delta,
                records: self.payment.dest_custom_records.clone(),
                payment_addr: self.payment.payment_addr,
                metadata: self.payment.metadata.clone(),
            };

            return self.collaborators.route_builder.new_route(
                self.self_node,
                &path,
                height,
                final_hop,
                self.payment.blinded_path_set.as_ref(),
            );
        }
    }
}

fn session_span(payment: &LightningPayment) -> tracing::Span {
    tracing::info_span!(
        "payment_session",
        payment_id = %hex::encode(payment.identifier())
    )
}

/// Structural checks, then the signature against `pub_key`.
fn check_channel_update(msg: &ChannelUpdate, pub_key: &PublicKey) -> Result<(), RoutingError> {
    msg.validate()?;
    verify_channel_update_signature(msg, pub_key)?;
    Ok(())
}

#[async_trait]
impl PaymentSession for PathfindingSession {
    async fn request_route(
        &self,
        max_amt: MilliSatoshi,
        fee_limit: MilliSatoshi,
        active_shards: u32,
        height: u32,
        first_hop_custom_records: CustomRecords,
    ) -> Result<Route, RoutingError> {
        self.request_route_in_span(
            max_amt,
            fee_limit,
            active_shards,
            height,
            first_hop_custom_records,
        )
        .instrument(self.span.clone())
        .await
    }

    fn update_additional_edge(
        &self,
        msg: &ChannelUpdate,
        pub_key: &PublicKey,
        policy: &SharedEdgePolicy,
    ) -> bool {
        let _enter = self.span.enter();

        if let Err(e) = check_channel_update(msg, pub_key) {
            tracing::error!(error = %e, "Unable to validate channel update");
            return false;
        }

        policy.apply_channel_update(msg);

        tracing::debug!(
            short_channel_id = msg.short_channel_id,
            direction = msg.direction(),
            disabled = msg.is_disabled(),
            time_lock_delta = msg.time_lock_delta,
            base_fee = msg.base_fee,
            fee_rate = msg.fee_rate,
            "New private channel update applied"
        );

        true
    }

    fn get_additional_edge_policy(
        &self,
        pub_key: &PublicKey,
        channel_id: u64,
    ) -> Option<SharedEdgePolicy> {
        self.additional_edges
            .get(&pub_key.vertex())?
            .iter()
            .map(|edge| edge.policy())
            .find(|policy| policy.channel_id() == channel_id)
            .cloned()
    }
}
