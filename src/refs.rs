// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Human-readable identifiers drawn from a cryptographically secure source.
//!
//! Candidate functions are pure over the RNG; uniqueness is checked by the
//! caller-supplied `is_taken` callback, usually a lookup on the open
//! transaction, and bounded by an explicit attempt budget.

use crate::error::{LedgerError, Result};
use rand::{CryptoRng, Rng, RngCore};

const CARD_PREFIX: &str = "521234";

fn digits<R: RngCore>(rng: &mut R, width: u32) -> String {
    let n = rng.gen_range(0..10u64.pow(width));
    format!("{:0width$}", n, width = width as usize)
}

pub fn account_number<R: RngCore + CryptoRng>(rng: &mut R) -> String {
    digits(rng, 12)
}

pub fn card_number<R: RngCore + CryptoRng>(rng: &mut R) -> String {
    format!("{}{}", CARD_PREFIX, digits(rng, 9))
}

pub fn transaction_reference<R: RngCore + CryptoRng>(rng: &mut R) -> String {
    format!("TXN{}", digits(rng, 12))
}

pub fn otp<R: RngCore + CryptoRng>(rng: &mut R) -> String {
    digits(rng, 6)
}

/// Draw candidates until `is_taken` reports a free one or the budget runs out.
pub fn generate_unique<R, C, T>(
    rng: &mut R,
    what: &'static str,
    attempts: u32,
    mut candidate: C,
    mut is_taken: T,
) -> Result<String>
where
    R: RngCore + CryptoRng,
    C: FnMut(&mut R) -> String,
    T: FnMut(&str) -> Result<bool>,
{
    for attempt in 1..=attempts {
        let value = candidate(rng);
        if !is_taken(&value)? {
            return Ok(value);
        }
        tracing::debug!(what, attempt, "identifier collision, regenerating");
    }
    Err(LedgerError::GenerationExhausted { what, attempts })
}
