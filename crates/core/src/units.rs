//! Integer base-unit arithmetic for token amounts.
//!
//! Operator-entered amounts ("1.5") are scaled by the token's decimal count
//! into the smallest indivisible unit without ever passing through floating
//! point. All downstream totals are computed on these integers.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UnitsError {
    #[error("amount is empty")]
    Empty,

    #[error("amount '{0}' is not a decimal number")]
    Invalid(String),

    #[error("amount '{amount}' has more than {decimals} fractional digits")]
    TooPrecise { amount: String, decimals: u8 },

    #[error("amount does not fit in 128 bits")]
    Overflow,
}

/// Largest decimal count whose scale factor fits in u128.
const MAX_DECIMALS: u8 = 38;

fn scale_factor(decimals: u8) -> Result<u128, UnitsError> {
    if decimals > MAX_DECIMALS {
        return Err(UnitsError::Overflow);
    }
    Ok(10u128.pow(decimals as u32))
}

/// Parse a human-unit decimal string into base units.
///
/// Fractional digits beyond the token's decimal count are rejected rather
/// than rounded: silently dropping precision on a money amount is worse
/// than asking the operator to re-enter it.
pub fn parse_units(amount: &str, decimals: u8) -> Result<u128, UnitsError> {
    let amount = amount.trim();
    if amount.is_empty() {
        return Err(UnitsError::Empty);
    }

    let (whole, frac) = match amount.split_once('.') {
        Some((w, f)) => (w, f),
        None => (amount, ""),
    };
    if whole.is_empty() && frac.is_empty() {
        return Err(UnitsError::Invalid(amount.to_string()));
    }
    if !whole.bytes().all(|b| b.is_ascii_digit()) || !frac.bytes().all(|b| b.is_ascii_digit()) {
        return Err(UnitsError::Invalid(amount.to_string()));
    }
    if frac.len() > decimals as usize {
        return Err(UnitsError::TooPrecise {
            amount: amount.to_string(),
            decimals,
        });
    }

    let scale = scale_factor(decimals)?;
    let whole: u128 = if whole.is_empty() {
        0
    } else {
        whole.parse().map_err(|_| UnitsError::Overflow)?
    };
    let frac_units: u128 = if frac.is_empty() {
        0
    } else {
        let digits: u128 = frac.parse().map_err(|_| UnitsError::Overflow)?;
        digits * 10u128.pow((decimals as usize - frac.len()) as u32)
    };

    whole
        .checked_mul(scale)
        .and_then(|base| base.checked_add(frac_units))
        .ok_or(UnitsError::Overflow)
}

/// Render base units back into a human-unit decimal string.
pub fn format_units(base: u128, decimals: u8) -> String {
    let scale = match scale_factor(decimals) {
        Ok(s) => s,
        Err(_) => return base.to_string(),
    };
    let whole = base / scale;
    let frac = base % scale;
    if frac == 0 {
        return whole.to_string();
    }
    let frac = format!("{frac:0width$}", width = decimals as usize);
    format!("{whole}.{}", frac.trim_end_matches('0'))
}
