//! Pathway Routing: per-payment route selection.
//!
//! This crate provides:
//! - [`PaymentSession`]: the route-request interface one payment uses for
//!   every shard it dispatches, implemented by [`PathfindingSession`].
//! - [`SessionSource`]: creates sessions from shared collaborators.
//! - [`NoRouteError`] and [`FailureReason`]: the non-fatal path-finding
//!   outcomes and their payment-level meaning.
//! - [`AdditionalEdge`]: private and blinded edges that are not part of the
//!   public graph, derived from route hints or blinded paths.
//! - The collaborator seams ([`GraphSessionFactory`], [`BandwidthHintProvider`],
//!   [`PathFinder`], [`MissionControlQuerier`], [`RouteBuilder`]).

pub mod additional_edge;
pub mod blinded;
pub mod cltv;
pub mod error;
pub mod graph;
pub mod pathfind;
pub mod payment;
pub mod route;
pub mod session;
pub mod session_source;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

// Re-exports for convenience.
pub use additional_edge::{
    route_hints_to_edges, AdditionalEdge, AdditionalEdges, CachedEdgePolicy, HopHint, RouteHint,
    SharedEdgePolicy,
};
pub use blinded::{BlindedHop, BlindedPath, BlindedPayment, BlindedPaymentPathSet};
pub use cltv::{validate_cltv_limit, BLOCK_PADDING};
pub use error::{FailureReason, NoRouteError, PathFindingError, RoutingError};
pub use graph::{BandwidthHintProvider, BandwidthHints, DirectedChannel, Graph, GraphSessionFactory};
pub use pathfind::{
    GraphParams, MissionControlQuerier, PathEdge, PathFinder, PathRequest, RestrictParams,
};
pub use payment::{AmpOptions, LightningPayment, LightningPaymentBuilder, DEFAULT_MAX_PARTS};
pub use route::{FinalHopParams, Hop, MppRecord, Route, RouteBuilder};
pub use session::{Collaborators, PathfindingSession, PaymentSession};
pub use session_source::SessionSource;
