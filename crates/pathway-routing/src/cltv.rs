use crate::error::RoutingError;

/// Blocks added to the final hop's CLTV delta so that an HTLC is not
/// rejected by the receiver when blocks are mined while it is in flight.
pub const BLOCK_PADDING: u16 = 3;

/// Check that `limit` is strictly greater than `delta`, optionally after
/// adding [`BLOCK_PADDING`] to `delta`.
pub fn validate_cltv_limit(limit: u32, delta: u16, include_pad: bool) -> Result<(), RoutingError> {
    let mut delta = u32::from(delta);
    if include_pad {
        delta += u32::from(BLOCK_PADDING);
    }

    if limit <= delta {
        return Err(RoutingError::CltvLimitTooLow { limit, delta });
    }

    Ok(())
}
