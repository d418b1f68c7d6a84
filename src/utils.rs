// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::models::Caller;
use anyhow::{Context, Result, anyhow};
use chrono::NaiveDate;
use comfy_table::{Cell, Table, presets::UTF8_FULL};
use rust_decimal::Decimal;

pub fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .with_context(|| format!("Invalid date '{}', expected YYYY-MM-DD", s))
}

/// Exact base-10 parse. Exponent and float spellings are refused so a typo
/// can never smuggle binary rounding into a balance.
pub fn parse_decimal(s: &str) -> Result<Decimal> {
    Decimal::from_str_exact(s.trim()).with_context(|| format!("Invalid decimal '{}'", s))
}

pub fn parse_positive(s: &str, what: &str) -> Result<Decimal> {
    let d = parse_decimal(s)?;
    if d <= Decimal::ZERO {
        return Err(anyhow!("{} must be greater than zero, got {}", what, d));
    }
    Ok(d)
}

pub fn pretty_table(headers: &[&str], rows: Vec<Vec<String>>) -> Table {
    let mut t = Table::new();
    t.load_preset(UTF8_FULL);
    t.set_header(headers.iter().map(|h| Cell::new(*h)));
    for r in rows {
        t.add_row(r.into_iter().map(Cell::new));
    }
    t
}

pub fn maybe_print_json<T: serde::Serialize>(json_flag: bool, v: &T) -> Result<bool> {
    if json_flag {
        println!("{}", serde_json::to_string_pretty(v)?);
        return Ok(true);
    }
    Ok(false)
}

/// Resolve the acting identity from the global `--user` / `--admin` flags.
pub fn caller_from(m: &clap::ArgMatches) -> Result<Caller> {
    let user_id = *m
        .get_one::<i64>("user")
        .context("--user <ID> is required for this command")?;
    Ok(Caller {
        user_id,
        is_admin: m.get_flag("admin"),
    })
}
