//! Fixed-point money arithmetic
//!
//! Every amount in the ledger is an integer number of cents wrapped in
//! [`Cents`]. The decimal wire format (`"120.00"`, `"-5.5"`) is converted at
//! the boundary by [`Cents::parse`]; nothing in the crate touches floating
//! point.

use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};

use serde::{Deserialize, Serialize};

use crate::types::{LedgerError, LedgerResult};

/// A signed amount in minor currency units (cents).
///
/// Wraps an `i64`, so the representable range is roughly ±92 quadrillion
/// dollars. Arithmetic that could overflow goes through the checked helpers.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Cents(i64);

impl Cents {
    pub const ZERO: Cents = Cents(0);

    /// Wrap a raw cent count.
    pub const fn new(cents: i64) -> Self {
        Cents(cents)
    }

    /// The raw cent count.
    pub const fn value(&self) -> i64 {
        self.0
    }

    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    pub const fn abs(&self) -> Cents {
        Cents(self.0.abs())
    }

    pub fn checked_add(self, other: Cents) -> Option<Cents> {
        self.0.checked_add(other.0).map(Cents)
    }

    pub fn checked_sub(self, other: Cents) -> Option<Cents> {
        self.0.checked_sub(other.0).map(Cents)
    }

    /// Parse the decimal wire format: an optional leading `-`, one or more
    /// integer digits, and at most two fractional digits.
    ///
    /// Anything else (`"1,00"`, `".5"`, `"1.234"`, `"12e3"`, `""`) fails with
    /// [`LedgerError::MalformedAmount`].
    pub fn parse(input: &str) -> LedgerResult<Cents> {
        let malformed = |reason: &str| LedgerError::MalformedAmount {
            input: input.to_string(),
            reason: reason.to_string(),
        };

        let (negative, body) = match input.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, input),
        };

        let (int_part, frac_part) = match body.split_once('.') {
            Some((int_part, frac_part)) => (int_part, Some(frac_part)),
            None => (body, None),
        };

        if int_part.is_empty() || !int_part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(malformed("expected decimal digits"));
        }

        let frac_cents: i64 = match frac_part {
            None => 0,
            Some(frac) => {
                if frac.is_empty() || frac.len() > 2 || !frac.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(malformed("expected 1-2 fractional digits"));
                }
                let digits: i64 = frac.parse().expect("checked ascii digits");
                if frac.len() == 1 {
                    digits * 10
                } else {
                    digits
                }
            }
        };

        let units: i64 = int_part
            .parse()
            .map_err(|_| malformed("integer part out of range"))?;
        let magnitude = units
            .checked_mul(100)
            .and_then(|v| v.checked_add(frac_cents))
            .ok_or_else(|| malformed("amount out of range"))?;

        Ok(Cents(if negative { -magnitude } else { magnitude }))
    }
}

/// Cents render with exactly two fractional digits, matching the wire format.
impl fmt::Display for Cents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let magnitude = self.0.unsigned_abs();
        write!(f, "{}{}.{:02}", sign, magnitude / 100, magnitude % 100)
    }
}

impl Add for Cents {
    type Output = Cents;

    fn add(self, other: Cents) -> Cents {
        Cents(self.0 + other.0)
    }
}

impl Sub for Cents {
    type Output = Cents;

    fn sub(self, other: Cents) -> Cents {
        Cents(self.0 - other.0)
    }
}

impl Neg for Cents {
    type Output = Cents;

    fn neg(self) -> Cents {
        Cents(-self.0)
    }
}

impl AddAssign for Cents {
    fn add_assign(&mut self, other: Cents) {
        self.0 += other.0;
    }
}

impl SubAssign for Cents {
    fn sub_assign(&mut self, other: Cents) {
        self.0 -= other.0;
    }
}

impl Sum for Cents {
    fn sum<I: Iterator<Item = Cents>>(iter: I) -> Cents {
        iter.fold(Cents::ZERO, |acc, c| acc + c)
    }
}
