//! Exact-decimal helpers for money and percentage arithmetic.
//!
//! Every helper converts its operands to [`Decimal`], performs the operation
//! there and hands back a plain `f64` so callers can keep working with native
//! numbers. Missing, empty and NaN operands count as zero (a missing divisor
//! counts as one). When an operand cannot be represented as a decimal the
//! helpers log the failure and fall back to native floating point.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use std::str::FromStr;
use tracing::error;

/// A numeric or numeric-string operand.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Operand<'a> {
    Number(f64),
    Text(&'a str),
    Missing,
}

impl From<f64> for Operand<'_> {
    fn from(value: f64) -> Self {
        Operand::Number(value)
    }
}

impl From<i64> for Operand<'_> {
    fn from(value: i64) -> Self {
        Operand::Number(value as f64)
    }
}

impl From<Option<f64>> for Operand<'_> {
    fn from(value: Option<f64>) -> Self {
        value.map_or(Operand::Missing, Operand::Number)
    }
}

impl<'a> From<&'a str> for Operand<'a> {
    fn from(value: &'a str) -> Self {
        Operand::Text(value)
    }
}

impl<'a> From<&'a String> for Operand<'a> {
    fn from(value: &'a String) -> Self {
        Operand::Text(value.as_str())
    }
}

impl<'a> From<Option<&'a str>> for Operand<'a> {
    fn from(value: Option<&'a str>) -> Self {
        value.map_or(Operand::Missing, Operand::Text)
    }
}

impl Operand<'_> {
    /// Mirrors `value || fallback`: zero, NaN, empty text and missing values
    /// are replaced by the fallback.
    fn is_falsy(&self) -> bool {
        match self {
            Operand::Number(n) => *n == 0.0 || n.is_nan(),
            Operand::Text(s) => s.is_empty(),
            Operand::Missing => true,
        }
    }

    fn to_decimal(self, fallback: i64) -> Result<Decimal, String> {
        if self.is_falsy() {
            return Ok(Decimal::from(fallback));
        }
        match self {
            Operand::Number(n) => {
                if !n.is_finite() {
                    return Err(format!("non-finite operand: {n}"));
                }
                // `{}` prints the shortest representation that round-trips, so
                // 0.1 becomes exactly 0.1 rather than its binary expansion.
                let text = n.to_string();
                Decimal::from_str(&text)
                    .or_else(|_| Decimal::from_scientific(&text))
                    .map_err(|e| format!("{text}: {e}"))
            }
            Operand::Text(s) => {
                let trimmed = s.trim();
                Decimal::from_str(trimmed)
                    .or_else(|_| Decimal::from_scientific(trimmed))
                    .map_err(|e| format!("{s:?}: {e}"))
            }
            Operand::Missing => Ok(Decimal::from(fallback)),
        }
    }

    /// Native conversion used when the decimal path fails (`Number(x) || fallback`).
    fn to_native(self, fallback: f64) -> f64 {
        let value = match self {
            Operand::Number(n) => n,
            Operand::Text(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    0.0
                } else {
                    trimmed.parse::<f64>().unwrap_or(f64::NAN)
                }
            }
            Operand::Missing => f64::NAN,
        };
        if value == 0.0 || value.is_nan() {
            fallback
        } else {
            value
        }
    }
}

fn binary<'a, 'b>(
    op_name: &str,
    a: Operand<'a>,
    b: Operand<'b>,
    b_fallback: i64,
    exact: impl FnOnce(Decimal, Decimal) -> Option<Decimal>,
    native: impl FnOnce(f64, f64) -> f64,
) -> f64 {
    let result = a
        .to_decimal(0)
        .and_then(|da| b.to_decimal(b_fallback).map(|db| (da, db)))
        .and_then(|(da, db)| exact(da, db).ok_or_else(|| "decimal overflow".to_string()))
        .and_then(|d| {
            d.to_f64()
                .ok_or_else(|| format!("{d} is not representable as f64"))
        });

    match result {
        Ok(value) => value,
        Err(reason) => {
            error!(operation = op_name, %reason, "Decimal arithmetic failed, using native floats");
            native(a.to_native(0.0), b.to_native(b_fallback as f64))
        }
    }
}

pub fn add<'a, 'b>(a: impl Into<Operand<'a>>, b: impl Into<Operand<'b>>) -> f64 {
    binary("add", a.into(), b.into(), 0, |x, y| x.checked_add(y), |x, y| x + y)
}

pub fn subtract<'a, 'b>(a: impl Into<Operand<'a>>, b: impl Into<Operand<'b>>) -> f64 {
    binary("subtract", a.into(), b.into(), 0, |x, y| x.checked_sub(y), |x, y| x - y)
}

pub fn multiply<'a, 'b>(a: impl Into<Operand<'a>>, b: impl Into<Operand<'b>>) -> f64 {
    binary("multiply", a.into(), b.into(), 0, |x, y| x.checked_mul(y), |x, y| x * y)
}

/// Divides `a` by `b`. A missing or zero divisor is treated as one.
pub fn divide<'a, 'b>(a: impl Into<Operand<'a>>, b: impl Into<Operand<'b>>) -> f64 {
    binary(
        "divide",
        a.into(),
        b.into(),
        1,
        |x, y| if y.is_zero() { None } else { x.checked_div(y) },
        |x, y| x / y,
    )
}

/// Sums the values left to right with [`add`]. An empty input sums to zero.
pub fn sum<'a, I, T>(values: I) -> f64
where
    I: IntoIterator<Item = T>,
    T: Into<Operand<'a>>,
{
    values
        .into_iter()
        .fold(0.0, |acc, value| add(acc, value))
}

fn fixed_two<'a>(value: impl Into<Operand<'a>>, what: &str) -> String {
    let operand = value.into();
    match operand.to_decimal(0) {
        Ok(d) => {
            let rounded = d.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
            format!("{rounded:.2}")
        }
        Err(reason) => {
            error!(%reason, "Failed to format {what}");
            format!("{:.2}", operand.to_native(0.0))
        }
    }
}

/// Formats an amount of money with two decimals.
pub fn format_money<'a>(value: impl Into<Operand<'a>>) -> String {
    fixed_two(value, "money")
}

/// Formats a percentage value with two decimals (no `%` suffix).
pub fn format_percent<'a>(value: impl Into<Operand<'a>>) -> String {
    fixed_two(value, "percent")
}
