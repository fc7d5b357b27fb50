//! Exact order amounts.
//!
//! An [`Amount`] is an arbitrary-precision rational, so cross-rate products and residual orders
//! never round. Amounts serialize as strings: a plain decimal (`"0.25"`, `"20"`) when the value
//! has a finite decimal expansion, otherwise a reduced fraction (`"4/3"`). Parsing accepts both
//! forms plus scientific notation.

use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::{CheckedDiv, One, Signed, Zero};
use rust_decimal::Decimal;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::ops::{Add, Mul, Sub};
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
#[error("not an amount: {0}")]
pub struct AmountParseError(String);

/// Exact, non-rounding quantity of a currency.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount(BigRational);

impl Amount {
    pub fn zero() -> Self {
        Amount(BigRational::zero())
    }

    pub fn is_positive(&self) -> bool {
        self.0.is_positive()
    }

    /// `None` when `rhs` is zero.
    pub fn checked_div(&self, rhs: &Amount) -> Option<Amount> {
        self.0.checked_div(&rhs.0).map(Amount)
    }

    /// Finite decimal expansion, if the reduced denominator only has factors 2 and 5.
    fn decimal_text(&self) -> Option<String> {
        let two = BigInt::from(2);
        let five = BigInt::from(5);
        let mut denom = self.0.denom().clone();
        let (mut twos, mut fives) = (0usize, 0usize);
        while (&denom % &two).is_zero() {
            denom /= &two;
            twos += 1;
        }
        while (&denom % &five).is_zero() {
            denom /= &five;
            fives += 1;
        }
        if !denom.is_one() {
            return None;
        }
        let places = twos.max(fives);
        let scaled = self.0.numer()
            * num_traits::pow(two, places - twos)
            * num_traits::pow(five, places - fives);
        if places == 0 {
            return Some(scaled.to_string());
        }
        let digits = scaled.magnitude().to_string();
        let digits = format!("{:0>width$}", digits, width = places + 1);
        let (int, frac) = digits.split_at(digits.len() - places);
        let sign = if scaled.is_negative() { "-" } else { "" };
        Some(format!("{}{}.{}", sign, int, frac))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.decimal_text() {
            Some(text) => f.write_str(&text),
            None => write!(f, "{}/{}", self.0.numer(), self.0.denom()),
        }
    }
}

impl FromStr for Amount {
    type Err = AmountParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim();
        let invalid = || AmountParseError(text.to_string());
        if let Some((numer, denom)) = text.split_once('/') {
            let numer: BigInt = numer.trim().parse().map_err(|_| invalid())?;
            let denom: BigInt = denom.trim().parse().map_err(|_| invalid())?;
            if denom.is_zero() {
                return Err(invalid());
            }
            return Ok(Amount(BigRational::new(numer, denom)));
        }
        if let Some(amount) = parse_plain_decimal(text) {
            return Ok(amount);
        }
        Decimal::from_scientific(text)
            .map(Amount::from)
            .map_err(|_| invalid())
    }
}

/// `[-+]digits[.digits]` of any length.
fn parse_plain_decimal(text: &str) -> Option<Amount> {
    let unsigned = text.strip_prefix(['-', '+']).unwrap_or(text);
    let (int, frac) = unsigned.split_once('.').unwrap_or((unsigned, ""));
    let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if int.len() + frac.len() == 0 || !all_digits(int) || !all_digits(frac) {
        return None;
    }
    let mut numer: BigInt = format!("{}{}", int, frac).parse().ok()?;
    if text.starts_with('-') {
        numer = -numer;
    }
    let denom = num_traits::pow(BigInt::from(10), frac.len());
    Some(Amount(BigRational::new(numer, denom)))
}

impl From<Decimal> for Amount {
    fn from(d: Decimal) -> Self {
        let denom = num_traits::pow(BigInt::from(10), d.scale() as usize);
        Amount(BigRational::new(BigInt::from(d.mantissa()), denom))
    }
}

impl From<i64> for Amount {
    fn from(n: i64) -> Self {
        Amount(BigRational::from_integer(BigInt::from(n)))
    }
}

impl Add for &Amount {
    type Output = Amount;

    fn add(self, rhs: &Amount) -> Amount {
        Amount(&self.0 + &rhs.0)
    }
}

impl Sub for &Amount {
    type Output = Amount;

    fn sub(self, rhs: &Amount) -> Amount {
        Amount(&self.0 - &rhs.0)
    }
}

impl Mul for &Amount {
    type Output = Amount;

    fn mul(self, rhs: &Amount) -> Amount {
        Amount(&self.0 * &rhs.0)
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

struct AmountVisitor;

impl<'de> Visitor<'de> for AmountVisitor {
    type Value = Amount;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a decimal or fraction string, or a number")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Amount, E> {
        v.parse().map_err(E::custom)
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Amount, E> {
        Ok(Amount::from(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Amount, E> {
        Ok(Amount(BigRational::from_integer(BigInt::from(v))))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Amount, E> {
        v.to_string().parse().map_err(E::custom)
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(AmountVisitor)
    }
}
