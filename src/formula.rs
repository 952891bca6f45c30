//! Numeric helpers shared by every worksheet pipeline.
//!
//! Cell values travel as strings, exactly as the user typed them or as a
//! previous pass formatted them. Everything here is total: garbage parses to
//! zero, division by zero yields `None`, and zero formats as the empty string
//! so "not applicable" stays visually distinct from a real amount.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref NUMBER_PREFIX: Regex =
        Regex::new(r"^\s*[+-]?(?:\d+(?:\.\d*)?|\.\d+)(?:[eE][+-]?\d+)?").unwrap();
}

/// Parses the leading numeric part of `text`, returning `None` when there is
/// none. `"12.5 ft"` parses as `12.5`, `"$5"` and `""` do not parse.
pub fn parse_optional(text: &str) -> Option<f64> {
    let matched = NUMBER_PREFIX.find(text)?;
    matched
        .as_str()
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}

/// Parses `text` leniently; anything that is not a number counts as zero.
pub fn parse_number(text: &str) -> f64 {
    parse_optional(text).unwrap_or(0.0)
}

/// Rounds half away from zero to `digits` decimal places.
pub fn round_to(value: f64, digits: u32) -> f64 {
    let factor = 10f64.powi(digits as i32);
    (value * factor).round() / factor
}

/// Fixed-point rendering with `digits` decimals; zero and non-finite values
/// render as the empty string.
pub fn format_fixed(value: f64, digits: u32) -> String {
    if !value.is_finite() {
        return String::new();
    }
    let rounded = round_to(value, digits);
    if rounded == 0.0 {
        return String::new();
    }
    format!("{:.*}", digits as usize, rounded)
}

/// Currency-style two decimal rendering (`10` → `"10.00"`, `0` → `""`).
pub fn format_money(value: f64) -> String {
    format_fixed(value, 2)
}

/// Like [`format_money`] but for an optional operand.
pub fn format_money_opt(value: Option<f64>) -> String {
    value.map(format_money).unwrap_or_default()
}

/// Integer rendering used by whole-number presentation fields.
pub fn format_whole(value: f64) -> String {
    if !value.is_finite() {
        return String::new();
    }
    let rounded = value.round();
    if rounded == 0.0 {
        return String::new();
    }
    format!("{}", rounded as i64)
}

/// `numerator / denominator`, or `None` when the denominator is zero.
pub fn divide(numerator: f64, denominator: f64) -> Option<f64> {
    if denominator == 0.0 || !denominator.is_finite() || !numerator.is_finite() {
        return None;
    }
    Some(numerator / denominator)
}

/// A rate that falls back to a fixed constant when its cell holds no number.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DefaultRate {
    pub name: &'static str,
    pub value: f64,
}

impl DefaultRate {
    pub const fn new(name: &'static str, value: f64) -> Self {
        Self { name, value }
    }

    /// The cell's value when present, otherwise the default.
    pub fn resolve(&self, cell_text: &str) -> f64 {
        parse_optional(cell_text).unwrap_or(self.value)
    }
}

/// True when `value` is a fraction between 0 and 1 inclusive.
pub fn is_fraction(value: f64) -> bool {
    (0.0..=1.0).contains(&value)
}

pub const PERCENT_WARNING: &str = "Percentage must be between 0 and 1 (e.g., 0.15 = 15%)";
pub const NEGATIVE_WARNING: &str = "Negative values not allowed";
