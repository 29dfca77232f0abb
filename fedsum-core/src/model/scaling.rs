//! Fixed-point scaling between floating point weights and the non-negative
//! integer plaintext domain of the cryptosystem.

use num::{bigint::BigUint, traits::ToPrimitive};
use thiserror::Error;

/// The fixed-point resolution: three decimal places survive the round trip.
pub const BASIS_POINT: u64 = 1000;

/// The additive shift that maps the supported weight domain into the
/// non-negative integers. Weights below `-OFFSET` are not representable.
pub const OFFSET: u64 = 10;

/// Errors related to scaling weights for encryption.
#[derive(Debug, Error, PartialEq)]
pub enum ScalingError {
    #[error("weight {0} is not finite")]
    NotFinite(f64),

    #[error("weight {0} is below the supported domain")]
    BelowDomain(f64),
}

/// Scales a weight into the integer plaintext domain:
/// `round((weight + OFFSET) * BASIS_POINT)`.
///
/// # Errors
/// Fails if the weight is not finite or falls below `-OFFSET` after
/// shifting.
pub fn scale_weight(weight: f64) -> Result<BigUint, ScalingError> {
    if !weight.is_finite() {
        return Err(ScalingError::NotFinite(weight));
    }
    let shifted = (weight + OFFSET as f64) * BASIS_POINT as f64;
    if shifted < 0.0 {
        return Err(ScalingError::BelowDomain(weight));
    }
    Ok(BigUint::from(shifted.round() as u64))
}

/// Scales a flat weight vector for encryption.
///
/// # Errors
/// Fails on the first weight that cannot be scaled.
pub fn scale_model(weights: &[f64]) -> Result<Vec<BigUint>, ScalingError> {
    weights.iter().copied().map(scale_weight).collect()
}

/// Unscales a decrypted integer back into a weight:
/// `value / BASIS_POINT - OFFSET`.
///
/// The offset is subtracted exactly once, even when `value` is the decrypted
/// sum of several scaled weights. This matches the published pipeline, which
/// republishes aggregates without unscaling them; see [`unscale_sum`] for
/// the per-participant compensated form.
pub fn unscale_weight(value: &BigUint) -> f64 {
    // large aggregates saturate to f64::MAX rather than failing
    let value = value.to_f64().unwrap_or(f64::MAX);
    value / BASIS_POINT as f64 - OFFSET as f64
}

/// Unscales the decrypted sum of `participants` scaled weights,
/// compensating for the offset having been added once per participant:
/// `value / BASIS_POINT - OFFSET * participants`.
pub fn unscale_sum(value: &BigUint, participants: usize) -> f64 {
    let value = value.to_f64().unwrap_or(f64::MAX);
    value / BASIS_POINT as f64 - (OFFSET * participants as u64) as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scale_weight() {
        assert_eq!(scale_weight(0.0).unwrap(), BigUint::from(10_000_u64));
        assert_eq!(scale_weight(1.5).unwrap(), BigUint::from(11_500_u64));
        assert_eq!(scale_weight(-10.0).unwrap(), BigUint::from(0_u64));
        assert_eq!(scale_weight(0.0004).unwrap(), BigUint::from(10_000_u64));
        assert_eq!(scale_weight(0.0006).unwrap(), BigUint::from(10_001_u64));
    }

    #[test]
    fn test_scale_weight_out_of_domain() {
        assert_eq!(
            scale_weight(-10.001),
            Err(ScalingError::BelowDomain(-10.001))
        );
        assert_eq!(
            scale_weight(f64::INFINITY),
            Err(ScalingError::NotFinite(f64::INFINITY))
        );
        assert!(scale_weight(f64::NAN).is_err());
    }

    #[test]
    #[allow(clippy::float_cmp)]
    fn test_unscale_round_trip() {
        for &weight in &[0.0, 0.125, -3.5, 7.25] {
            let scaled = scale_weight(weight).unwrap();
            assert_eq!(unscale_weight(&scaled), weight);
        }
    }

    #[test]
    #[allow(clippy::float_cmp)]
    fn test_unscale_weight_single_offset_on_sums() {
        // two participants submitting 1.0 each: the decrypted sum carries
        // the offset twice, but only one offset is subtracted
        let sum = scale_weight(1.0).unwrap() + scale_weight(1.0).unwrap();
        assert_eq!(unscale_weight(&sum), 12.0);
        // the compensated form recovers the true sum
        assert_eq!(unscale_sum(&sum, 2), 2.0);
    }

    #[test]
    #[allow(clippy::float_cmp)]
    fn test_scale_model() {
        let scaled = scale_model(&[1.0, 2.0, 3.0]).unwrap();
        let unscaled: Vec<f64> = scaled.iter().map(unscale_weight).collect();
        assert_eq!(unscaled, vec![1.0, 2.0, 3.0]);
    }
}
