use pathway_core::{CustomRecords, FeatureVector, MilliSatoshi, PaymentAddr, Vertex};
use serde::{Deserialize, Serialize};

use crate::additional_edge::RouteHint;
use crate::blinded::BlindedPaymentPathSet;
use crate::cltv::validate_cltv_limit;
use crate::error::RoutingError;

/// Default upper bound on the number of shards a payment is split into.
pub const DEFAULT_MAX_PARTS: u32 = 16;

/// Options of an atomic multi-path payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmpOptions {
    /// Identifier shared by every shard of the payment.
    pub set_id: [u8; 32],
    pub root_share: [u8; 32],
}

/// Everything the payer knows about a payment. Immutable once a session is
/// created for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LightningPayment {
    pub target: Vertex,
    /// Total amount the receiver should get.
    pub amount: MilliSatoshi,
    pub fee_limit: MilliSatoshi,
    /// CLTV delta the receiver requires for the final hop.
    pub final_cltv_delta: u16,
    /// Maximum total time lock of any route, in blocks relative to now.
    pub cltv_limit: u32,
    pub payment_hash: Option<[u8; 32]>,
    pub route_hints: Vec<RouteHint>,
    pub blinded_path_set: Option<BlindedPaymentPathSet>,
    /// Largest amount a single shard may carry.
    pub max_shard_amt: Option<MilliSatoshi>,
    pub max_parts: u32,
    /// Required last node before the target.
    pub last_hop: Option<Vertex>,
    /// Restrict the first hop to these channels. Empty means any.
    pub outgoing_channel_ids: Vec<u64>,
    /// Features of the destination; `None` when unknown.
    pub dest_features: Option<FeatureVector>,
    pub payment_addr: Option<PaymentAddr>,
    pub dest_custom_records: CustomRecords,
    pub amp: Option<AmpOptions>,
    pub metadata: Option<Vec<u8>>,
    /// Preference between fees (-1) and reliability (1).
    pub time_pref: f64,
}

impl LightningPayment {
    pub fn builder() -> LightningPaymentBuilder {
        LightningPaymentBuilder::default()
    }

    /// Identifier used for logging: the AMP set id, or the payment hash.
    pub fn identifier(&self) -> [u8; 32] {
        match (&self.amp, self.payment_hash) {
            (Some(amp), _) => amp.set_id,
            (None, Some(hash)) => hash,
            (None, None) => [0u8; 32],
        }
    }

    /// Whether shards of this payment can be told apart by the receiver.
    pub fn supports_split(&self) -> bool {
        self.payment_addr.is_some() || self.blinded_path_set.is_some()
    }

    pub fn validate(&self) -> Result<(), RoutingError> {
        if self.amount.is_zero() {
            return Err(RoutingError::InvalidPayment(
                "amount must be greater than zero".into(),
            ));
        }
        if self.max_parts == 0 {
            return Err(RoutingError::InvalidPayment(
                "max parts must be at least 1".into(),
            ));
        }
        if !(-1.0..=1.0).contains(&self.time_pref) {
            return Err(RoutingError::InvalidPayment(format!(
                "time preference must be within [-1, 1], got {}",
                self.time_pref
            )));
        }
        if matches!(self.max_shard_amt, Some(amt) if amt.is_zero()) {
            return Err(RoutingError::InvalidPayment(
                "max shard amount must be greater than zero".into(),
            ));
        }
        if self.payment_hash.is_none() && self.amp.is_none() {
            return Err(RoutingError::InvalidPayment(
                "payment hash or AMP options required".into(),
            ));
        }
        if let Some(set) = &self.blinded_path_set {
            if self.target != set.target_pub_key() {
                return Err(RoutingError::InvalidPayment(format!(
                    "target {} does not match blinded path target {}",
                    self.target,
                    set.target_pub_key()
                )));
            }
        }
        validate_cltv_limit(self.cltv_limit, self.final_cltv_delta, true)
    }
}

/// Builder for [`LightningPayment`].
#[derive(Debug, Default)]
pub struct LightningPaymentBuilder {
    target: Option<Vertex>,
    amount: Option<MilliSatoshi>,
    fee_limit: MilliSatoshi,
    final_cltv_delta: u16,
    cltv_limit: Option<u32>,
    payment_hash: Option<[u8; 32]>,
    route_hints: Vec<RouteHint>,
    blinded_path_set: Option<BlindedPaymentPathSet>,
    max_shard_amt: Option<MilliSatoshi>,
    max_parts: Option<u32>,
    last_hop: Option<Vertex>,
    outgoing_channel_ids: Vec<u64>,
    dest_features: Option<FeatureVector>,
    payment_addr: Option<PaymentAddr>,
    dest_custom_records: CustomRecords,
    amp: Option<AmpOptions>,
    metadata: Option<Vec<u8>>,
    time_pref: f64,
}

impl LightningPaymentBuilder {
    pub fn target(mut self, target: Vertex) -> Self {
        self.target = Some(target);
        self
    }

    pub fn amount(mut self, amount: MilliSatoshi) -> Self {
        self.amount = Some(amount);
        self
    }

    pub fn fee_limit(mut self, fee_limit: MilliSatoshi) -> Self {
        self.fee_limit = fee_limit;
        self
    }

    pub fn final_cltv_delta(mut self, delta: u16) -> Self {
        self.final_cltv_delta = delta;
        self
    }

    /// Defaults to no limit.
    pub fn cltv_limit(mut self, limit: u32) -> Self {
        self.cltv_limit = Some(limit);
        self
    }

    pub fn payment_hash(mut self, hash: [u8; 32]) -> Self {
        self.payment_hash = Some(hash);
        self
    }

    /// Add a private route hint.
    pub fn route_hint(mut self, hint: RouteHint) -> Self {
        self.route_hints.push(hint);
        self
    }

    pub fn blinded_path_set(mut self, set: BlindedPaymentPathSet) -> Self {
        self.blinded_path_set = Some(set);
        self
    }

    pub fn max_shard_amt(mut self, amt: MilliSatoshi) -> Self {
        self.max_shard_amt = Some(amt);
        self
    }

    /// Defaults to [`DEFAULT_MAX_PARTS`].
    pub fn max_parts(mut self, parts: u32) -> Self {
        self.max_parts = Some(parts);
        self
    }

    pub fn last_hop(mut self, node: Vertex) -> Self {
        self.last_hop = Some(node);
        self
    }

    pub fn outgoing_channel_id(mut self, channel_id: u64) -> Self {
        self.outgoing_channel_ids.push(channel_id);
        self
    }

    pub fn dest_features(mut self, features: FeatureVector) -> Self {
        self.dest_features = Some(features);
        self
    }

    pub fn payment_addr(mut self, addr: PaymentAddr) -> Self {
        self.payment_addr = Some(addr);
        self
    }

    pub fn dest_custom_record(mut self, key: u64, value: Vec<u8>) -> Self {
        self.dest_custom_records.insert(key, value);
        self
    }

    pub fn amp(mut self, amp: AmpOptions) -> Self {
        self.amp = Some(amp);
        self
    }

    pub fn metadata(mut self, metadata: Vec<u8>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn time_pref(mut self, time_pref: f64) -> Self {
        self.time_pref = time_pref;
        self
    }

    /// Build and validate the payment.
    /// Build and validate the payment.
    ///
    /// With a blinded path set and no explicit target, the target is the
    /// set's target key.
    pub fn build(self) -> Result<LightningPayment, RoutingError> {
        let target = self
            .target
            .or_else(|| self.blinded_path_set.as_ref().map(|set| set.target_pub_key()))
            .ok_or_else(|| RoutingError::InvalidPayment("missing target".into()))?;
        let amount = self
            .amount
            .ok_or_else(|| RoutingError::InvalidPayment("missing amount".into()))?;

        let payment = LightningPayment {
            target,
            amount,
            fee_limit: self.fee_limit,
            final_cltv_delta: self.final_cltv_delta,
            cltv_limit: self.cltv_limit.unwrap_or(u32::MAX),
            payment_hash: self.payment_hash,
            route_hints: self.route_hints,
            blinded_path_set: self.blinded_path_set,
            max_shard_amt: self.max_shard_amt,
            max_parts: self.max_parts.unwrap_or(DEFAULT_MAX_PARTS),
            last_hop: self.last_hop,
            outgoing_channel_ids: self.outgoing_channel_ids,
            dest_features: self.dest_features,
            payment_addr: self.payment_addr,
            dest_custom_records: self.dest_custom_records,
            amp: self.amp,
            metadata: self.metadata,
            time_pref: self.time_pref,
        };

        payment.validate()?;
        Ok(payment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> LightningPaymentBuilder {
        LightningPayment::builder()
            .target(Vertex::new([9u8; 32]))
            .amount(MilliSatoshi(100_000))
            .payment_hash([1u8; 32])
    }

    #[test]
    fn test_build_with_defaults() {
        let p = base().build().unwrap();
        assert_eq!(p.max_parts, DEFAULT_MAX_PARTS);
        assert_eq!(p.cltv_limit, u32::MAX);
        assert!(p.dest_features.is_none());
        assert!(!p.supports_split());
        assert_eq!(p.identifier(), [1u8; 32]);
    }

    #[test]
    fn test_missing_required_fields() {
        assert!(LightningPayment::builder().amount(MilliSatoshi(1)).build().is_err());
        assert!(LightningPayment::builder()
            .target(Vertex::new([9u8; 32]))
            .build()
            .is_err());
        assert!(LightningPayment::builder()
            .target(Vertex::new([9u8; 32]))
            .amount(MilliSatoshi(1))
            .build()
            .is_err());
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(base().amount(MilliSatoshi(0)).build().is_err());
        assert!(base().max_parts(0).build().is_err());
        assert!(base().time_pref(1.5).build().is_err());
        assert!(base().max_shard_amt(MilliSatoshi(0)).build().is_err());
    }

    #[test]
    fn test_cltv_limit_checked_with_padding() {
        assert!(base().final_cltv_delta(40).cltv_limit(44).build().is_ok());
        assert!(matches!(
            base().final_cltv_delta(40).cltv_limit(43).build(),
            Err(RoutingError::CltvLimitTooLow { limit: 43, delta: 43 })
        ));
    }

    #[test]
    fn test_identifier_prefers_amp_set_id() {
        let p = base()
            .amp(AmpOptions {
                set_id: [7u8; 32],
                root_share: [8u8; 32],
            })
            .build()
            .unwrap();
        assert_eq!(p.identifier(), [7u8; 32]);
    }

    fn blinded_set() -> BlindedPaymentPathSet {
        use crate::blinded::{BlindedHop, BlindedPath, BlindedPayment};

        BlindedPaymentPathSet::new(vec![BlindedPayment {
            blinded_path: BlindedPath {
                introduction_point: Vertex::new([5u8; 32]),
                blinding_point: Vertex::new([6u8; 32]),
                blinded_hops: vec![
                    BlindedHop {
                        blinded_node_pub: Vertex::new([5u8; 32]),
                        cipher_text: vec![1],
                    },
                    BlindedHop {
                        blinded_node_pub: Vertex::new([7u8; 32]),
                        cipher_text: vec![2],
                    },
                ],
            },
            base_fee: 0,
            proportional_fee_rate: 0,
            cltv_expiry_delta: 40,
            htlc_minimum: 1,
            htlc_maximum: 0,
            features: None,
        }])
        .unwrap()
    }

    #[test]
    fn test_blinded_target_defaults_to_set_target() {
        let set = blinded_set();
        let expected = set.target_pub_key();
        let p = LightningPayment::builder()
            .amount(MilliSatoshi(100_000))
            .payment_hash([1u8; 32])
            .blinded_path_set(set)
            .build()
            .unwrap();
        assert_eq!(p.target, expected);
        assert!(p.supports_split());
    }

    #[test]
    fn test_blinded_target_mismatch_rejected() {
        let result = base().blinded_path_set(blinded_set()).build();
        assert!(matches!(result, Err(RoutingError::InvalidPayment(_))));

        let set = blinded_set();
        let target = set.target_pub_key();
        assert!(base().target(target).blinded_path_set(set).build().is_ok());
    }

    #[test]
    fn test_supports_split_with_payment_addr() {
        let p = base().payment_addr(PaymentAddr([3u8; 32])).build().unwrap();
        assert!(p.supports_split());
    }
}
