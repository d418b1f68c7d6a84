// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Fixed-point money helpers. Currency carries 2 fractional digits, fund
//! units and NAV carry 4; all rounding is half-up (away from zero).

use crate::error::{LedgerError, Result};
use rusqlite::Row;
use rusqlite::types::Type;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;

pub const CURRENCY_DP: u32 = 2;
pub const UNIT_DP: u32 = 4;

/// Ceiling for any stored money value: NUMERIC(14, 2).
pub const MAX_AMOUNT: Decimal = dec!(999999999999.99);

fn quantize(value: Decimal, dp: u32) -> Decimal {
    let mut out = value.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero);
    out.rescale(dp);
    out
}

/// Round to currency precision, padding to exactly two places.
pub fn round_currency(value: Decimal) -> Decimal {
    quantize(value, CURRENCY_DP)
}

/// Round to unit/NAV precision, padding to exactly four places.
pub fn round_units(value: Decimal) -> Decimal {
    quantize(value, UNIT_DP)
}

/// Reject a requested amount above [`MAX_AMOUNT`] before any arithmetic.
pub fn ensure_within_limit(value: Decimal, what: &str) -> Result<()> {
    if value > MAX_AMOUNT {
        return Err(LedgerError::InvalidRequest(format!(
            "{} exceeds the maximum of {}",
            what, MAX_AMOUNT
        )));
    }
    Ok(())
}

/// `balance + amount`, refused when the result would pass [`MAX_AMOUNT`].
pub fn credited(balance: Decimal, amount: Decimal) -> Result<Decimal> {
    balance
        .checked_add(amount)
        .filter(|total| *total <= MAX_AMOUNT)
        .ok_or_else(|| {
            LedgerError::InvalidRequest(format!(
                "crediting {} would take the balance past {}",
                amount, MAX_AMOUNT
            ))
        })
}

/// Read a TEXT decimal column. Stored values are always canonical decimal
/// strings; anything else is a conversion failure, never a silent zero.
pub fn decimal_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Decimal> {
    let raw: String = row.get(idx)?;
    Decimal::from_str_exact(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}
