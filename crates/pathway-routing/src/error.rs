use serde::{Deserialize, Serialize};
use std::fmt;

/// Payment-level outcome recorded when a payment stops being retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureReason {
    /// No route to the destination could be found.
    NoRoute,
    /// Our own channels cannot carry the amount.
    InsufficientBalance,
    /// Anything else.
    Error,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoRoute => write!(f, "no_route"),
            Self::InsufficientBalance => write!(f, "insufficient_balance"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// A non-critical outcome of path finding.
///
/// These never abort the payment outright; they drive the splitting
/// decisions inside a session and are reported to the caller with a
/// [`FailureReason`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum NoRouteError {
    /// The destination hop does not support TLV payloads.
    NoTlvPayload = 0,
    /// The destination hop does not support payment addresses.
    NoPaymentAddr = 1,
    /// No path to the destination exists in the graph.
    NoPathFound = 2,
    /// None of the local channels have enough balance.
    InsufficientBalance = 3,
    /// The session was created empty.
    EmptyPaySession = 4,
    /// The destination requires a feature we do not know.
    UnknownRequiredFeature = 5,
    /// The destination lacks a feature that a required feature depends on.
    MissingDependentFeature = 6,
}

const UNKNOWN_NO_ROUTE_MESSAGE: &str = "unknown no-route error";

impl NoRouteError {
    /// Every member, in code order.
    pub const ALL: [NoRouteError; 7] = [
        NoRouteError::NoTlvPayload,
        NoRouteError::NoPaymentAddr,
        NoRouteError::NoPathFound,
        NoRouteError::InsufficientBalance,
        NoRouteError::EmptyPaySession,
        NoRouteError::UnknownRequiredFeature,
        NoRouteError::MissingDependentFeature,
    ];

    pub const fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get(usize::from(code)).copied()
    }

    pub const fn message(self) -> &'static str {
        match self {
            Self::NoTlvPayload => "destination hop doesn't understand new TLV payloads",
            Self::NoPaymentAddr => "destination hop doesn't understand payment addresses",
            Self::NoPathFound => "unable to find a path to destination",
            Self::InsufficientBalance => "insufficient local balance",
            Self::EmptyPaySession => "empty payment session",
            Self::UnknownRequiredFeature => "unknown required feature",
            Self::MissingDependentFeature => "missing dependent feature",
        }
    }

    /// The payment-level failure this outcome resolves to.
    pub const fn failure_reason(self) -> FailureReason {
        match self {
            Self::NoTlvPayload
            | Self::NoPaymentAddr
            | Self::NoPathFound
            | Self::EmptyPaySession
            | Self::UnknownRequiredFeature
            | Self::MissingDependentFeature => FailureReason::NoRoute,
            Self::InsufficientBalance => FailureReason::InsufficientBalance,
        }
    }

    /// Message for a raw code, including codes outside the set.
    pub fn message_for_code(code: u8) -> &'static str {
        Self::from_code(code).map_or(UNKNOWN_NO_ROUTE_MESSAGE, Self::message)
    }

    /// Failure reason for a raw code. Unknown codes are generic errors.
    pub fn failure_reason_for_code(code: u8) -> FailureReason {
        Self::from_code(code).map_or(FailureReason::Error, Self::failure_reason)
    }
}

impl fmt::Display for NoRouteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

impl std::error::Error for NoRouteError {}

impl TryFrom<u8> for NoRouteError {
    type Error = u8;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Self::from_code(code).ok_or(code)
    }
}

/// What a [`PathFinder`](crate::PathFinder) reports when it cannot return a path.
#[derive(Debug, thiserror::Error)]
pub enum PathFindingError {
    /// An expected outcome the session may react to by splitting.
    #[error(transparent)]
    NoRoute(#[from] NoRouteError),

    /// Anything else; fatal for the current request.
    #[error("{0}")]
    Internal(String),
}

/// Errors surfaced by the routing layer.
#[derive(Debug, thiserror::Error)]
pub enum RoutingError {
    #[error(transparent)]
    NoRoute(#[from] NoRouteError),

    #[error("cannot have both route hints and blinded path")]
    ConflictingPathHints,

    #[error("invalid blinded path: {0}")]
    InvalidBlindedPath(String),

    #[error("invalid payment: {0}")]
    InvalidPayment(String),

    #[error("cltv limit {limit} should be greater than {delta}")]
    CltvLimitTooLow { limit: u32, delta: u32 },

    #[error("graph error: {0}")]
    Graph(String),

    #[error("bandwidth hints unavailable: {0}")]
    BandwidthHints(String),

    #[error("path finding failed: {0}")]
    PathFinding(String),

    #[error("route construction failed: {0}")]
    RouteConstruction(String),

    #[error("crypto error: {0}")]
    Crypto(#[from] pathway_crypto::CryptoError),

    #[error("core error: {0}")]
    Core(#[from] pathway_core::CoreError),
}

impl RoutingError {
    /// The non-fatal outcome behind this error, if it is one.
    pub fn no_route(&self) -> Option<NoRouteError> {
        match self {
            Self::NoRoute(e) => Some(*e),
            _ => None,
        }
    }

    /// Payment-level failure for non-fatal outcomes. Fatal errors have none
    /// and are handed back to the caller unchanged.
    pub fn failure_reason(&self) -> Option<FailureReason> {
        self.no_route().map(NoRouteError::failure_reason)
    }
}

impl From<PathFindingError> for RoutingError {
    fn from(err: PathFindingError) -> Self {
        match err {
            PathFindingError::NoRoute(e) => RoutingError::NoRoute(e),
            PathFindingError::Internal(msg) => RoutingError::PathFinding(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_code_maps_to_a_reason() {
        for err in NoRouteError::ALL {
            let expected = if err == NoRouteError::InsufficientBalance {
                FailureReason::InsufficientBalance
            } else {
                FailureReason::NoRoute
            };
            assert_eq!(err.failure_reason(), expected, "{:?}", err);
            assert_eq!(NoRouteError::failure_reason_for_code(err.code()), expected);
        }
    }

    #[test]
    fn test_all_is_exhaustive_and_ordered() {
        // A new variant must be listed here too, or this match stops compiling.
        fn index(err: NoRouteError) -> usize {
            match err {
                NoRouteError::NoTlvPayload => 0,
                NoRouteError::NoPaymentAddr => 1,
                NoRouteError::NoPathFound => 2,
                NoRouteError::InsufficientBalance => 3,
                NoRouteError::EmptyPaySession => 4,
                NoRouteError::UnknownRequiredFeature => 5,
                NoRouteError::MissingDependentFeature => 6,
            }
        }
        for (i, err) in NoRouteError::ALL.iter().enumerate() {
            assert_eq!(index(*err), i);
            assert_eq!(usize::from(err.code()), i);
            assert_eq!(NoRouteError::from_code(err.code()), Some(*err));
        }
    }

    #[test]
    fn test_unknown_code_defaults_to_generic_error() {
        assert_eq!(NoRouteError::from_code(7), None);
        assert_eq!(NoRouteError::failure_reason_for_code(7), FailureReason::Error);
        assert_eq!(NoRouteError::failure_reason_for_code(255), FailureReason::Error);
        assert_eq!(NoRouteError::message_for_code(200), "unknown no-route error");
        assert_eq!(NoRouteError::try_from(9u8), Err(9));
    }

    #[test]
    fn test_messages() {
        assert_eq!(
            NoRouteError::NoPathFound.to_string(),
            "unable to find a path to destination"
        );
        assert_eq!(
            NoRouteError::InsufficientBalance.to_string(),
            "insufficient local balance"
        );
        assert_eq!(NoRouteError::EmptyPaySession.to_string(), "empty payment session");
        assert_eq!(
            NoRouteError::message_for_code(0),
            "destination hop doesn't understand new TLV payloads"
        );
    }

    #[test]
    fn test_routing_error_failure_reason() {
        let err: RoutingError = NoRouteError::InsufficientBalance.into();
        assert_eq!(err.failure_reason(), Some(FailureReason::InsufficientBalance));
        assert_eq!(err.to_string(), "insufficient local balance");

        let fatal = RoutingError::Graph("db closed".into());
        assert_eq!(fatal.no_route(), None);
        assert_eq!(fatal.failure_reason(), None);
    }

    #[test]
    fn test_path_finding_error_conversion() {
        let err: RoutingError = PathFindingError::NoRoute(NoRouteError::NoPathFound).into();
        assert_eq!(err.no_route(), Some(NoRouteError::NoPathFound));

        let err: RoutingError = PathFindingError::Internal("boom".into()).into();
        assert!(matches!(err, RoutingError::PathFinding(ref m) if m == "boom"));
    }
}
