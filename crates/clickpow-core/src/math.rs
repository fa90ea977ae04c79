//! Bounded integer arithmetic for payouts (floor division, checked add/sub, bps).

use crate::limits::BPS_DENOMINATOR;
use crate::{Amount, ClickpowError, Result, U256};
use serde::{Deserialize, Serialize};

/// Basis points in `[0, 10_000]` (correct-by-construction).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct Bps(u16);

impl Bps {
    pub const ZERO: Bps = Bps(0);
    pub const MAX: Bps = Bps(BPS_DENOMINATOR as u16);

    /// Constructs a bounded bps value; `v > 10_000` is rejected.
    pub fn new(v: u16) -> Result<Bps> {
        if v as u64 <= BPS_DENOMINATOR {
            Ok(Bps(v))
        } else {
            Err(ClickpowError::InvalidInput(format!(
                "bps out of range: {v} > {BPS_DENOMINATOR}"
            )))
        }
    }

    pub fn get(self) -> u16 {
        self.0
    }

    pub fn as_u128(self) -> u128 {
        self.0 as u128
    }
}

impl TryFrom<u16> for Bps {
    type Error = ClickpowError;
    fn try_from(value: u16) -> std::result::Result<Self, Self::Error> {
        Bps::new(value)
    }
}

impl From<Bps> for u16 {
    fn from(value: Bps) -> u16 {
        value.0
    }
}

fn to_amount(v: U256) -> Result<Amount> {
    if v > U256::from(u128::MAX) {
        return Err(ClickpowError::BoundedValueExceeded(
            "u128 overflow in div".into(),
        ));
    }
    Ok(v.low_u128())
}

/// `floor(a * b / denom)` with a 256-bit intermediate.
pub fn mul_div_floor(a: Amount, b: u128, denom: u128) -> Result<Amount> {
    if denom == 0 {
        return Err(ClickpowError::InvalidInput("division by zero".into()));
    }
    let num = U256::from(a)
        .checked_mul(U256::from(b))
        .ok_or_else(|| ClickpowError::BoundedValueExceeded("u256 overflow in mul".into()))?;
    to_amount(num / U256::from(denom))
}

/// `floor(a * b * c / denom)` with a 256-bit intermediate.
pub fn mul_mul_div_floor(a: Amount, b: u128, c: u128, denom: u128) -> Result<Amount> {
    if denom == 0 {
        return Err(ClickpowError::InvalidInput("division by zero".into()));
    }
    let num = U256::from(a)
        .checked_mul(U256::from(b))
        .and_then(|x| x.checked_mul(U256::from(c)))
        .ok_or_else(|| ClickpowError::BoundedValueExceeded("u256 overflow in mul".into()))?;
    to_amount(num / U256::from(denom))
}

pub fn add(a: Amount, b: Amount) -> Result<Amount> {
    a.checked_add(b)
        .ok_or_else(|| ClickpowError::BoundedValueExceeded("u128 overflow in add".into()))
}

pub fn sub(a: Amount, b: Amount) -> Result<Amount> {
    a.checked_sub(b)
        .ok_or_else(|| ClickpowError::InvalidInput("u128 underflow in sub".into()))
}

pub fn floor_bps(amount: Amount, bps: Bps) -> Result<Amount> {
    mul_div_floor(amount, bps.as_u128(), BPS_DENOMINATOR as u128)
}

/// Split `gross` into `(half, gross - half)`; the burn side absorbs the odd unit.
pub fn split_half(gross: Amount) -> (Amount, Amount) {
    let half = gross / 2;
    (half, gross - half)
}

/// Scale `(a, b)` down so that `a + b <= limit`, preserving their proportion.
///
/// Returns the inputs unchanged when already within the limit. Otherwise
/// `a' = floor(a * limit / (a + b))` and `b' = limit - a'`.
pub fn clamp_pair(a: Amount, b: Amount, limit: Amount) -> Result<(Amount, Amount)> {
    let total = add(a, b)?;
    if total <= limit {
        return Ok((a, b));
    }
    let a_scaled = mul_div_floor(a, limit, total)?;
    Ok((a_scaled, limit - a_scaled))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn bps_rejects_out_of_range() {
        assert!(Bps::new(10_000).is_ok());
        assert!(Bps::new(10_001).is_err());
    }

    #[test]
    fn split_gives_odd_unit_to_burn() {
        assert_eq!(split_half(101), (50, 51));
        assert_eq!(split_half(0), (0, 0));
    }

    #[test]
    fn mul_div_handles_large_products() {
        let pool = 100_000_000u128 * 10u128.pow(18);
        let out = mul_mul_div_floor(pool, 200, 604_800, 86_400 * 10_000).unwrap();
        assert_eq!(out, pool / 50 * 7);
    }

    #[test]
    fn division_by_zero_is_an_error() {
        assert!(mul_div_floor(1, 1, 0).is_err());
    }

    proptest! {
        #[test]
        fn clamp_pair_never_exceeds_limit(a in 0u128..1u128 << 100, b in 0u128..1u128 << 100, limit in 0u128..1u128 << 100) {
            let (x, y) = clamp_pair(a, b, limit).unwrap();
            prop_assert!(x + y <= limit.max(a + b));
            if a + b > limit {
                prop_assert_eq!(x + y, limit);
                prop_assert!(x <= a);
            } else {
                prop_assert_eq!((x, y), (a, b));
            }
        }

        #[test]
        fn floor_bps_is_bounded(amount in 0u128..u128::MAX / 2, bps in 0u16..=10_000u16) {
            let out = floor_bps(amount, Bps::new(bps).unwrap()).unwrap();
            prop_assert!(out <= amount);
        }
    }
}
