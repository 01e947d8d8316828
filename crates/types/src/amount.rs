//! Amounts in the smallest on-chain unit and the asset that gives them meaning.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Result, TypesError};

/// Largest decimal exponent representable by a `u128` unit.
const MAX_DECIMALS: u8 = 38;

/// A non-negative amount expressed in the smallest unit of an asset
/// (e.g. shannons for CKB).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Amount(pub u128);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    pub fn new(value: u128) -> Self {
        Amount(value)
    }

    pub fn value(self) -> u128 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: Amount) -> Option<Amount> {
        self.0.checked_add(other.0).map(Amount)
    }

    pub fn checked_sub(self, other: Amount) -> Option<Amount> {
        self.0.checked_sub(other.0).map(Amount)
    }

    pub fn saturating_add(self, other: Amount) -> Amount {
        Amount(self.0.saturating_add(other.0))
    }

    pub fn saturating_sub(self, other: Amount) -> Amount {
        Amount(self.0.saturating_sub(other.0))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Amount {
    fn from(value: u64) -> Self {
        Amount(u128::from(value))
    }
}

impl From<u128> for Amount {
    fn from(value: u128) -> Self {
        Amount(value)
    }
}

/// The currency a channel allocation is denominated in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Asset {
    /// Ticker shown to users (e.g. "CKB").
    pub symbol: String,
    /// Number of decimal places between the whole unit and the smallest unit.
    pub decimals: u8,
}

impl Asset {
    pub fn new(symbol: impl Into<String>, decimals: u8) -> Self {
        Self {
            symbol: symbol.into(),
            decimals: decimals.min(MAX_DECIMALS),
        }
    }

    /// Native CKB: 1 CKB = 10^8 shannons.
    pub fn ckb() -> Self {
        Self::new("CKB", 8)
    }

    /// Number of smallest units in one whole unit.
    pub fn unit(&self) -> u128 {
        10u128.pow(u32::from(self.decimals.min(MAX_DECIMALS)))
    }

    /// Convert a whole-unit count into an amount.
    pub fn whole(&self, units: u64) -> Result<Amount> {
        u128::from(units)
            .checked_mul(self.unit())
            .map(Amount)
            .ok_or(TypesError::AmountOverflow)
    }

    /// Parse a decimal string in whole units ("1.5") into the smallest unit
    /// using exact fixed-point arithmetic.
    pub fn parse_amount(&self, input: &str) -> Result<Amount> {
        let s = input.trim();
        let (whole, frac) = s.split_once('.').unwrap_or((s, ""));

        if whole.is_empty() && frac.is_empty() {
            return Err(TypesError::InvalidAmount(format!("'{}' is empty", input)));
        }
        let all_digits = |part: &str| part.chars().all(|c| c.is_ascii_digit());
        if !all_digits(whole) || !all_digits(frac) {
            return Err(TypesError::InvalidAmount(format!(
                "'{}' is not a non-negative decimal number",
                input
            )));
        }
        let decimals = usize::from(self.decimals);
        if frac.len() > decimals {
            return Err(TypesError::InvalidAmount(format!(
                "'{}' has more than {} decimal places",
                input, decimals
            )));
        }

        let whole_value: u128 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| TypesError::AmountOverflow)?
        };
        let frac_value: u128 = if frac.is_empty() {
            0
        } else {
            format!("{:0<width$}", frac, width = decimals)
                .parse()
                .map_err(|_| TypesError::AmountOverflow)?
        };

        whole_value
            .checked_mul(self.unit())
            .and_then(|v| v.checked_add(frac_value))
            .map(Amount)
            .ok_or(TypesError::AmountOverflow)
    }

    /// Render an amount in whole units with `precision` decimal places.
    /// Extra digits are truncated, never rounded up.
    pub fn format_amount(&self, amount: Amount, precision: usize) -> String {
        let unit = self.unit();
        let whole = amount.0 / unit;
        if precision == 0 {
            return whole.to_string();
        }

        let frac = amount.0 % unit;
        let digits = if self.decimals == 0 {
            String::new()
        } else {
            format!("{:0width$}", frac, width = usize::from(self.decimals))
        };
        let mut shown: String = digits.chars().take(precision).collect();
        while shown.len() < precision {
            shown.push('0');
        }
        format!("{}.{}", whole, shown)
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol)
    }
}
