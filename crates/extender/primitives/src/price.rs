//! Bonding-curve pricing.
//!
//! A coin with supply `s`, reserve `r` and constant reserve ratio `crr` (percent) charges
//! `r * ((1 + w / s) ^ (100 / crr) - 1)` reserve units for `w` freshly minted coins. Prices
//! are quoted for one whole coin and scaled by `10^18`, truncated toward zero.
//!
//! The exponent is reduced to `p / q` and the root is taken over integers at a scale wide
//! enough that truncation only ever removes the fractional part of the final value.

use num_bigint::BigUint;
use num_integer::Integer;
use num_traits::{One, Zero};
use std::str::FromStr;

/// Decimal digits carried by prices.
pub const PRECISION: u32 = 18;

/// Extra decimal digits carried through the root extraction.
const GUARD_DIGITS: u32 = 30;

/// Significant decimal digits kept in a capitalization.
pub const CAPITALIZATION_DIGITS: u32 = 10;

/// Errors raised by the pricing functions.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PriceError {
    /// An amount is not a non-negative decimal integer.
    #[error("invalid integer amount {0:?}")]
    InvalidAmount(String),
    /// The reserve ratio is outside `1..=100`.
    #[error("reserve ratio {0} outside 1..=100")]
    InvalidCrr(u64),
}

fn parse_amount(value: &str) -> Result<BigUint, PriceError> {
    BigUint::from_str(value.trim()).map_err(|_| PriceError::InvalidAmount(value.to_string()))
}

fn pow10(exp: u32) -> BigUint {
    BigUint::from(10u32).pow(exp)
}

/// Reserve needed to mint `want` coins, scaled by `10^18`.
///
/// Returns zero when `want` or `supply` is zero.
pub fn purchase_cost(
    supply: &BigUint,
    reserve: &BigUint,
    crr: u64,
    want: &BigUint,
) -> Result<BigUint, PriceError> {
    if crr == 0 || crr > 100 {
        return Err(PriceError::InvalidCrr(crr));
    }
    if want.is_zero() || supply.is_zero() {
        return Ok(BigUint::zero());
    }

    let unit = pow10(PRECISION);
    if crr == 100 {
        return Ok(reserve * want * unit / supply);
    }

    let gcd = 100u64.gcd(&crr);
    let p = (100 / gcd) as u32;
    let q = (crr / gcd) as u32;

    let digits = reserve.to_str_radix(10).len() as u32;
    let scale = pow10(digits + PRECISION + GUARD_DIGITS);

    // root ~= ((s + w) / s) ^ (p / q) * scale
    let radicand = (supply + want).pow(p) * scale.pow(q) / supply.pow(p);
    let root = if q == 1 { radicand } else { radicand.nth_root(q) };
    if root <= scale {
        return Ok(BigUint::zero());
    }

    Ok(reserve * unit * (root - &scale) / scale)
}

/// Price of one whole coin, as a decimal integer string scaled by `10^18`.
pub fn token_price(volume: &str, reserve: &str, crr: u64) -> Result<String, PriceError> {
    let supply = parse_amount(volume)?;
    let reserve = parse_amount(reserve)?;
    Ok(purchase_cost(&supply, &reserve, crr, &BigUint::one())?.to_string())
}

/// Rounds `value` half-to-even to `digits` significant decimal digits.
fn round_significant(value: BigUint, digits: u32) -> BigUint {
    let len = value.to_str_radix(10).len() as u32;
    if len <= digits {
        return value;
    }
    let unit = pow10(len - digits);
    let half = &unit / 2u32;
    let (quotient, remainder) = value.div_rem(&unit);
    let round_up = remainder > half || (remainder == half && quotient.is_odd());
    let quotient = if round_up { quotient + 1u32 } else { quotient };
    quotient * unit
}

/// Market capitalization, `volume * price`, rendered as an integer string.
///
/// The exact product is rounded half-to-even to [`CAPITALIZATION_DIGITS`] significant
/// digits and printed in full, without an exponent.
pub fn capitalization(volume: &str, price: &str) -> Result<String, PriceError> {
    let product = parse_amount(volume)? * parse_amount(price)?;
    Ok(round_significant(product, CAPITALIZATION_DIGITS).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::full_reserve("600", "10000", 100, "16666666666666666666")]
    #[case::ten_percent("600", "10000", 10, "167922238458378386515")]
    #[case::scaled_supply(
        "1799000000000000000000",
        "29983333333333333333333",
        100,
        "16666666666666666666"
    )]
    fn prices_match_known_values(
        #[case] volume: &str,
        #[case] reserve: &str,
        #[case] crr: u64,
        #[case] expected: &str,
    ) {
        assert_eq!(token_price(volume, reserve, crr).unwrap(), expected);
    }

    #[test]
    fn zero_supply_is_free() {
        assert_eq!(token_price("0", "10000", 10).unwrap(), "0");
    }

    #[test]
    fn zero_want_is_free() {
        let cost =
            purchase_cost(&BigUint::from(600u32), &BigUint::from(10000u32), 50, &BigUint::zero())
                .unwrap();
        assert!(cost.is_zero());
    }

    #[test]
    fn half_reserve_squares_the_ratio() {
        // (1 + 1/1) ^ 2 - 1 = 3
        let cost =
            purchase_cost(&BigUint::from(1u32), &BigUint::from(1u32), 50, &BigUint::one()).unwrap();
        assert_eq!(cost, BigUint::from(3u32) * pow10(PRECISION));
    }

    #[test]
    fn lower_ratio_costs_more() {
        let full = token_price("600", "10000", 100).unwrap().parse::<BigUint>().unwrap();
        let half = token_price("600", "10000", 50).unwrap().parse::<BigUint>().unwrap();
        let tenth = token_price("600", "10000", 10).unwrap().parse::<BigUint>().unwrap();
        assert!(full < half);
        assert!(half < tenth);
    }

    #[rstest]
    #[case(0)]
    #[case(101)]
    fn rejects_out_of_range_ratio(#[case] crr: u64) {
        assert_eq!(token_price("600", "10000", crr), Err(PriceError::InvalidCrr(crr)));
    }

    #[test]
    fn rejects_malformed_amounts() {
        assert!(matches!(token_price("6e2", "10000", 10), Err(PriceError::InvalidAmount(_))));
        assert!(matches!(token_price("600", "-1", 10), Err(PriceError::InvalidAmount(_))));
    }

    #[rstest]
    #[case("600", "16666666666666666666", "10000000000000000000000")]
    #[case("600", "167922238458378386515", "100753343100000000000000")]
    #[case("666000000000000000000", "1", "666000000000000000000")]
    #[case("0", "16666666666666666666", "0")]
    #[case(
        "1000000000000000000000000",
        "16666666666666666666",
        "16666666670000000000000000000000000000000000"
    )]
    #[case::tie_rounds_down_to_even("12345678905", "1", "12345678900")]
    #[case::tie_rounds_up_to_even("12345678915", "1", "12345678920")]
    #[case::carry_adds_a_digit("99999999996", "1", "100000000000")]
    fn capitalization_matches_known_values(
        #[case] volume: &str,
        #[case] price: &str,
        #[case] expected: &str,
    ) {
        assert_eq!(capitalization(volume, price).unwrap(), expected);
    }

    #[test]
    fn capitalization_rejects_garbage() {
        assert!(matches!(capitalization("abc", "1"), Err(PriceError::InvalidAmount(_))));
        assert!(matches!(capitalization("600", "1.5"), Err(PriceError::InvalidAmount(_))));
    }
}
