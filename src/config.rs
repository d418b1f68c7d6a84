// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::{Context, Result, bail};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_ENV: &str = "LEDGERCORE_CONFIG";
pub const DB_ENV: &str = "LEDGERCORE_DB";

/// Hard bounds for deposit terms; configuration may only narrow them.
pub const TERM_MONTHS_LIMIT: u32 = 360;
pub const INTEREST_RATE_LIMIT: Decimal = dec!(100);

/// Process-wide settings. Built once at start-up and handed to every
/// operation by reference; nothing mutates it afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub database_path: Option<PathBuf>,
    pub busy_timeout_ms: u64,
    pub reference_attempts: u32,
    pub account_number_attempts: u32,
    pub early_withdrawal_penalty_rate: Decimal,
    pub max_term_months: u32,
    pub max_interest_rate: Decimal,
    pub max_description_len: usize,
    pub bank_name: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            busy_timeout_ms: 5_000,
            reference_attempts: 6,
            account_number_attempts: 5,
            early_withdrawal_penalty_rate: dec!(0.01),
            max_term_months: TERM_MONTHS_LIMIT,
            max_interest_rate: INTEREST_RATE_LIMIT,
            max_description_len: 255,
            bank_name: "Demo Bank".to_string(),
        }
    }
}

impl LedgerConfig {
    /// Load from an explicit JSON file, else from `LEDGERCORE_CONFIG`, else
    /// defaults. `LEDGERCORE_DB` overrides the database path either way.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let from_env = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
        let mut cfg = match path.map(Path::to_path_buf).or(from_env) {
            Some(p) => Self::from_file(&p)?,
            None => Self::default(),
        };
        if let Some(db) = std::env::var_os(DB_ENV) {
            cfg.database_path = Some(PathBuf::from(db));
        }
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Read config {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("Parse config {}", path.display()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.reference_attempts == 0 || self.account_number_attempts == 0 {
            bail!("retry budgets must be at least 1");
        }
        if self.early_withdrawal_penalty_rate < Decimal::ZERO
            || self.early_withdrawal_penalty_rate >= Decimal::ONE
        {
            bail!(
                "early_withdrawal_penalty_rate must be in [0, 1), got {}",
                self.early_withdrawal_penalty_rate
            );
        }
        if self.max_term_months == 0 || self.max_term_months > TERM_MONTHS_LIMIT {
            bail!(
                "max_term_months must be in [1, {}], got {}",
                TERM_MONTHS_LIMIT,
                self.max_term_months
            );
        }
        if self.max_interest_rate <= Decimal::ZERO || self.max_interest_rate > INTEREST_RATE_LIMIT {
            bail!(
                "max_interest_rate must be in (0, {}], got {}",
                INTEREST_RATE_LIMIT,
                self.max_interest_rate
            );
        }
        Ok(())
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"busy_timeout_ms": 250, "early_withdrawal_penalty_rate": "0.02"}}"#)
            .unwrap();

        let cfg = LedgerConfig::from_file(file.path()).unwrap();
        assert_eq!(cfg.busy_timeout_ms, 250);
        assert_eq!(cfg.early_withdrawal_penalty_rate, dec!(0.02));
        assert_eq!(cfg.reference_attempts, 6);
        assert_eq!(cfg.max_term_months, 360);
        cfg.validate().unwrap();
    }

    #[test]
    fn rejects_zero_retry_budget() {
        let cfg = LedgerConfig {
            reference_attempts: 0,
            ..LedgerConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_penalty_rate_of_one() {
        let cfg = LedgerConfig {
            early_withdrawal_penalty_rate: Decimal::ONE,
            ..LedgerConfig::default()
        };
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("early_withdrawal_penalty_rate"));
    }

    #[test]
    fn deposit_bounds_can_only_narrow() {
        let wide_term = LedgerConfig {
            max_term_months: 100_000,
            ..LedgerConfig::default()
        };
        assert!(wide_term.validate().is_err());

        let wide_rate = LedgerConfig {
            max_interest_rate: dec!(250),
            ..LedgerConfig::default()
        };
        assert!(wide_rate.validate().is_err());

        let narrow = LedgerConfig {
            max_term_months: 120,
            max_interest_rate: dec!(12.5),
            ..LedgerConfig::default()
        };
        narrow.validate().unwrap();
    }
}
