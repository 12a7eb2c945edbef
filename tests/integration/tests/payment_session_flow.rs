//! Integration test: payment sessions over an in-memory graph.
//!
//! Drives `PathfindingSession` through `SessionSource` with the backwards
//! search path finder, the fee-propagating route builder and signed channel
//! updates from pathway-crypto.

use std::collections::HashMap;
use std::sync::Arc;

use pathway_core::{
    CoreError, CustomRecords, FeatureBit, FeatureVector, MilliSatoshi, PaymentAddr, Satoshi,
    SessionConfig, Vertex,
};
use pathway_integration_tests::{init_tracing, node, signed_update, vertex};
use pathway_routing::test_utils::{
    BfsPathFinder, CountingGraphFactory, FixedMissionControl, PairLimitMissionControl,
    SimpleRouteBuilder, StaticBandwidthProvider, StaticGraph,
};
use pathway_routing::{
    AmpOptions, BlindedHop, BlindedPath, BlindedPayment, BlindedPaymentPathSet, Collaborators,
    FailureReason, HopHint, LightningPayment, MissionControlQuerier, NoRouteError, PaymentSession,
    SessionSource,
};

const SELF: u8 = 0;
const HINT_A: u8 = 1;
const HINT_B: u8 = 2;
const INTRO: u8 = 5;
const TARGET: u8 = 9;

const HEIGHT: u32 = 100;

/// Self has public channels to both hint nodes (ids 1 and 2) and to the
/// introduction node (id 3).
fn graph() -> StaticGraph {
    let mut graph = StaticGraph::new();
    graph.add_channel(vertex(SELF), vertex(HINT_A), 1, Satoshi(1_000_000), 0, 40);
    graph.add_channel(vertex(SELF), vertex(HINT_B), 2, Satoshi(1_000_000), 0, 40);
    graph.add_channel(vertex(SELF), vertex(INTRO), 3, Satoshi(1_000_000), 0, 40);
    graph
}

struct Network {
    source: SessionSource,
    graph_factory: Arc<CountingGraphFactory>,
}

fn collaborators(
    graph_factory: Arc<CountingGraphFactory>,
    mission_control: Arc<dyn MissionControlQuerier>,
    bandwidth: StaticBandwidthProvider,
) -> Collaborators {
    Collaborators {
        graph_sessions: graph_factory,
        bandwidth_hints: Arc::new(bandwidth),
        mission_control,
        path_finder: Arc::new(BfsPathFinder),
        route_builder: Arc::new(SimpleRouteBuilder),
    }
}

fn network(
    mission_control: Arc<dyn MissionControlQuerier>,
    bandwidth: StaticBandwidthProvider,
    config: SessionConfig,
) -> Network {
    init_tracing();
    let graph_factory = Arc::new(CountingGraphFactory::new(graph()));
    let collaborators = collaborators(graph_factory.clone(), mission_control, bandwidth);
    Network {
        source: SessionSource::new(vertex(SELF), collaborators, config).expect("valid config"),
        graph_factory,
    }
}

fn hop_hint(node_seed: u8, channel_id: u64) -> HopHint {
    HopHint {
        node_id: vertex(node_seed),
        channel_id,
        fee_base_msat: 1_000,
        fee_proportional_millionths: 0,
        cltv_expiry_delta: 40,
    }
}

/// Hint A cannot carry more than 10 000 msat to the target.
fn limited_hint_a() -> Arc<dyn MissionControlQuerier> {
    Arc::new(PairLimitMissionControl::new(0.9).with_limit(
        vertex(HINT_A),
        vertex(TARGET),
        MilliSatoshi(10_000),
    ))
}

fn two_hint_payment(amount: u64) -> LightningPayment {
    LightningPayment::builder()
        .target(vertex(TARGET))
        .amount(MilliSatoshi(amount))
        .payment_hash([0x11; 32])
        .final_cltv_delta(40)
        .route_hint(vec![hop_hint(HINT_A, 11)])
        .route_hint(vec![hop_hint(HINT_B, 22)])
        .build()
        .expect("valid payment")
}

async fn request(
    session: &dyn PaymentSession,
    amt: u64,
) -> Result<pathway_routing::Route, pathway_routing::RoutingError> {
    session
        .request_route(
            MilliSatoshi(amt),
            MilliSatoshi(1_000_000),
            0,
            HEIGHT,
            CustomRecords::new(),
        )
        .await
}

// =========================================================================
// Route hints
// =========================================================================

#[tokio::test]
async fn test_route_uses_hint_with_enough_liquidity() {
    let net = network(
        limited_hint_a(),
        StaticBandwidthProvider::default(),
        SessionConfig::default(),
    );
    let session = net
        .source
        .new_payment_session(two_hint_payment(50_000))
        .expect("session");

    let route = request(&session, 50_000).await.expect("route via hint B");

    let channels: Vec<u64> = route.hops.iter().map(|h| h.channel_id).collect();
    assert_eq!(channels, vec![2, 22]);
    assert_eq!(route.hops[0].pub_key, vertex(HINT_B));
    assert_eq!(route.hops[1].pub_key, vertex(TARGET));
    assert_eq!(route.receiver_amt(), MilliSatoshi(50_000));
    // Hint B charges a 1000 msat base fee and a 40 block delta.
    assert_eq!(route.total_amount, MilliSatoshi(51_000));
    assert_eq!(route.total_time_lock, HEIGHT + 43 + 40);
    assert_eq!(net.graph_factory.sessions_open(), 0);
}

#[tokio::test]
async fn test_small_amount_may_use_either_hint() {
    let net = network(
        limited_hint_a(),
        StaticBandwidthProvider::default(),
        SessionConfig::default(),
    );
    let session = net
        .source
        .new_payment_session(two_hint_payment(5_000))
        .expect("session");

    let route = request(&session, 5_000).await.expect("route");
    let last = route.hops.last().expect("hops");
    assert!(last.channel_id == 11 || last.channel_id == 22);
    assert_eq!(last.pub_key, vertex(TARGET));
}

#[tokio::test]
async fn test_signed_update_changes_private_policy() {
    let net = network(
        limited_hint_a(),
        StaticBandwidthProvider::default(),
        SessionConfig::default(),
    );
    let session = net
        .source
        .new_payment_session(two_hint_payment(50_000))
        .expect("session");
    let hint_b = node(HINT_B);

    let policy = session
        .get_additional_edge_policy(&hint_b.public_key(), 22)
        .expect("hint B policy");

    // An update signed by someone else is ignored.
    let forged = signed_update(&node(HINT_A), 22, 0, 0, 10);
    assert!(!session.update_additional_edge(&forged, &hint_b.public_key(), &policy));
    assert_eq!(policy.snapshot().fee_base_msat, MilliSatoshi(1_000));

    let msg = signed_update(&hint_b, 22, 5_000, 0, 80);
    assert!(session.update_additional_edge(&msg, &hint_b.public_key(), &policy));

    let route = request(&session, 50_000).await.expect("route");
    assert_eq!(route.hops[1].channel_id, 22);
    assert_eq!(route.total_amount, MilliSatoshi(55_000));
    assert_eq!(route.total_time_lock, HEIGHT + 43 + 80);
}

#[tokio::test]
async fn test_unknown_edge_policy_is_none() {
    let net = network(
        limited_hint_a(),
        StaticBandwidthProvider::default(),
        SessionConfig::default(),
    );
    let session = net
        .source
        .new_payment_session(two_hint_payment(50_000))
        .expect("session");

    assert!(session
        .get_additional_edge_policy(&node(HINT_B).public_key(), 11)
        .is_none());
    assert!(session
        .get_additional_edge_policy(&node(INTRO).public_key(), 22)
        .is_none());
}

// =========================================================================
// Splitting
// =========================================================================

#[tokio::test]
async fn test_amp_payment_splits_until_liquidity_fits() {
    let config = SessionConfig::from_toml_str(
        r#"
min_shard_amt_msat = 10000

[path_finding]
min_probability = 0.05
"#,
    )
    .expect("config");
    let net = network(limited_hint_a(), StaticBandwidthProvider::default(), config);

    let payment = LightningPayment::builder()
        .target(vertex(TARGET))
        .amount(MilliSatoshi(40_000))
        .amp(AmpOptions {
            set_id: [0x22; 32],
            root_share: [0x33; 32],
        })
        .payment_addr(PaymentAddr([0x44; 32]))
        .dest_features(FeatureVector::from_bits([
            FeatureBit::TLV_ONION_OPTIONAL,
            FeatureBit::PAYMENT_ADDR_OPTIONAL,
            FeatureBit::AMP_OPTIONAL,
        ]))
        .route_hint(vec![hop_hint(HINT_A, 11)])
        .build()
        .expect("valid payment");
    let session = net.source.new_payment_session(payment).expect("session");

    let route = request(&session, 40_000).await.expect("split route");
    assert_eq!(route.receiver_amt(), MilliSatoshi(10_000));
    assert_eq!(route.hops[1].channel_id, 11);
    let mpp = route.hops[1].mpp.as_ref().expect("mpp record");
    assert_eq!(mpp.total_msat, MilliSatoshi(40_000));
    // 40 000 and 20 000 failed before 10 000 succeeded.
    assert_eq!(net.graph_factory.sessions_opened(), 3);
}

#[tokio::test]
async fn test_legacy_payment_is_not_split() {
    let net = network(
        limited_hint_a(),
        StaticBandwidthProvider::default(),
        SessionConfig::default(),
    );
    let payment = LightningPayment::builder()
        .target(vertex(TARGET))
        .amount(MilliSatoshi(40_000))
        .payment_hash([0x11; 32])
        .route_hint(vec![hop_hint(HINT_A, 11)])
        .build()
        .expect("valid payment");
    let session = net.source.new_payment_session(payment).expect("session");

    let err = request(&session, 40_000).await.unwrap_err();
    assert_eq!(err.no_route(), Some(NoRouteError::NoPathFound));
    assert_eq!(err.failure_reason(), Some(FailureReason::NoRoute));
    assert_eq!(net.graph_factory.sessions_opened(), 1);
}

#[tokio::test]
async fn test_insufficient_local_balance() {
    let bandwidth = StaticBandwidthProvider::new(HashMap::from([(1u64, MilliSatoshi(1_000))]));
    let net = network(Arc::new(FixedMissionControl(1.0)), bandwidth, SessionConfig::default());
    let payment = LightningPayment::builder()
        .target(vertex(TARGET))
        .amount(MilliSatoshi(40_000))
        .payment_hash([0x11; 32])
        .payment_addr(PaymentAddr([0x44; 32]))
        .dest_features(FeatureVector::from_bits([FeatureBit::MPP_OPTIONAL]))
        .route_hint(vec![hop_hint(HINT_A, 11)])
        .build()
        .expect("valid payment");
    let session = net.source.new_payment_session(payment).expect("session");

    let err = request(&session, 40_000).await.unwrap_err();
    assert_eq!(err.no_route(), Some(NoRouteError::InsufficientBalance));
    assert_eq!(err.failure_reason(), Some(FailureReason::InsufficientBalance));
    assert_eq!(net.graph_factory.sessions_opened(), 1);
}

// =========================================================================
// Blinded paths
// =========================================================================

fn blinded_hop(seed: u8) -> BlindedHop {
    BlindedHop {
        blinded_node_pub: Vertex::new([seed; 32]),
        cipher_text: vec![seed; 4],
    }
}

fn blinded_payment(amount: u64) -> LightningPayment {
    let path = BlindedPayment {
        blinded_path: BlindedPath {
            introduction_point: vertex(INTRO),
            blinding_point: Vertex::new([0xB0; 32]),
            blinded_hops: vec![
                BlindedHop {
                    blinded_node_pub: vertex(INTRO),
                    cipher_text: vec![INTRO; 4],
                },
                blinded_hop(0x70),
                blinded_hop(0x80),
            ],
        },
        base_fee: 100,
        proportional_fee_rate: 0,
        cltv_expiry_delta: 80,
        htlc_minimum: 1,
        htlc_maximum: 0,
        features: None,
    };
    let set = BlindedPaymentPathSet::new(vec![path]).expect("path set");

    // The target is taken from the path set.
    LightningPayment::builder()
        .amount(MilliSatoshi(amount))
        .payment_hash([0x55; 32])
        .final_cltv_delta(40)
        .blinded_path_set(set)
        .build()
        .expect("valid payment")
}

#[tokio::test]
async fn test_route_through_blinded_path() {
    let net = network(
        Arc::new(FixedMissionControl(1.0)),
        StaticBandwidthProvider::default(),
        SessionConfig::default(),
    );
    let session = net
        .source
        .new_payment_session(blinded_payment(30_000))
        .expect("session");

    let route = request(&session, 30_000).await.expect("blinded route");

    let keys: Vec<Vertex> = route.hops.iter().map(|h| h.pub_key).collect();
    assert_eq!(
        keys,
        vec![vertex(INTRO), Vertex::new([0x70; 32]), Vertex::new([0x80; 32])]
    );
    assert_eq!(route.hops[0].encrypted_data, None);
    assert_eq!(route.hops[1].encrypted_data, Some(vec![0x70; 4]));
    assert_eq!(route.hops[2].encrypted_data, Some(vec![0x80; 4]));
    // The aggregate fee and delta are charged once, at the introduction node.
    assert_eq!(route.total_amount, MilliSatoshi(30_100));
    assert_eq!(route.total_time_lock, HEIGHT + 43 + 80);
}

#[tokio::test]
async fn test_route_hints_and_blinded_path_conflict() {
    let net = network(
        Arc::new(FixedMissionControl(1.0)),
        StaticBandwidthProvider::default(),
        SessionConfig::default(),
    );
    let mut payment = blinded_payment(30_000);
    payment.route_hints = vec![vec![hop_hint(HINT_A, 11)]];

    assert!(matches!(
        net.source.new_payment_session(payment),
        Err(pathway_routing::RoutingError::ConflictingPathHints)
    ));
}

#[tokio::test]
async fn test_empty_session_fails_without_graph_access() {
    let net = network(
        Arc::new(FixedMissionControl(1.0)),
        StaticBandwidthProvider::default(),
        SessionConfig::default(),
    );
    let session = net.source.new_payment_session_empty(two_hint_payment(50_000));

    let err = request(&session, 50_000).await.unwrap_err();
    assert_eq!(err.no_route(), Some(NoRouteError::EmptyPaySession));
    assert_eq!(err.failure_reason(), Some(FailureReason::NoRoute));
    assert_eq!(net.graph_factory.sessions_opened(), 0);
}

#[test]
fn test_source_rejects_zero_min_shard() {
    init_tracing();
    let graph_factory = Arc::new(CountingGraphFactory::new(graph()));
    let config = SessionConfig {
        min_shard_amt_msat: 0,
        ..SessionConfig::default()
    };
    let result = SessionSource::new(
        vertex(SELF),
        collaborators(
            graph_factory,
            Arc::new(FixedMissionControl(1.0)),
            StaticBandwidthProvider::default(),
        ),
        config,
    );
    assert!(matches!(
        result,
        Err(pathway_routing::RoutingError::Core(CoreError::InvalidConfig(_)))
    ));
}
