// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Balance transfer between two ledger accounts, or out to an external rail.

use crate::audit::{self, AuditEntry};
use crate::commands::accounts::{authorize, lock_account, set_balance};
use crate::commands::transactions::{NewTransaction, insert_transaction};
use crate::config::LedgerConfig;
use crate::error::{LedgerError, Result};
use crate::models::{Caller, TransactionType};
use crate::money::{credited, ensure_within_limit, round_currency};
use crate::utils::{caller_from, parse_positive};
use rusqlite::{Connection, TransactionBehavior};
use rust_decimal::Decimal;
use serde_json::json;

#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub from_account_id: i64,
    pub to_account_id: Option<i64>,
    pub external_bank_name: Option<String>,
    pub amount: Decimal,
    pub description: String,
}

impl TransferRequest {
    fn external_bank(&self) -> Option<&str> {
        self.external_bank_name
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Shape checks that need no store access.
    fn validate(&self, cfg: &LedgerConfig) -> Result<()> {
        match (self.to_account_id, self.external_bank()) {
            (None, None) => {
                return Err(LedgerError::InvalidRequest(
                    "external_bank_name is required for inter-bank transfer".into(),
                ));
            }
            (Some(_), Some(_)) => {
                return Err(LedgerError::InvalidRequest(
                    "to_account_id and external_bank_name are mutually exclusive".into(),
                ));
            }
            _ => {}
        }
        if self.to_account_id == Some(self.from_account_id) {
            return Err(LedgerError::Forbidden(
                "from_account_id and to_account_id cannot be same".into(),
            ));
        }
        if self.amount <= Decimal::ZERO {
            return Err(LedgerError::InvalidRequest("amount must be positive".into()));
        }
        ensure_within_limit(self.amount, "amount")?;
        if round_currency(self.amount) != self.amount {
            return Err(LedgerError::InvalidRequest(
                "amount carries more than 2 decimal places".into(),
            ));
        }
        if self.description.chars().count() > cfg.max_description_len {
            return Err(LedgerError::InvalidRequest(format!(
                "description longer than {} characters",
                cfg.max_description_len
            )));
        }
        Ok(())
    }
}

/// Move `amount` out of the source account, and into the destination when it
/// is internal. Returns the id of the recorded transaction.
pub fn transfer(
    conn: &mut Connection,
    cfg: &LedgerConfig,
    caller: &Caller,
    req: &TransferRequest,
) -> Result<i64> {
    transfer_inner(conn, cfg, caller, req).inspect_err(|e| e.log("transfer"))
}

fn transfer_inner(
    conn: &mut Connection,
    cfg: &LedgerConfig,
    caller: &Caller,
    req: &TransferRequest,
) -> Result<i64> {
    req.validate(cfg)?;
    let amount = round_currency(req.amount);

    // IMMEDIATE takes the write lock up front; both legs are read and written
    // under it, so no other writer can observe a half-applied transfer.
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let source = lock_account(&tx, req.from_account_id, "source account")?;
    authorize(caller, &source)?;
    let destination = match req.to_account_id {
        Some(id) => Some(lock_account(&tx, id, "destination account")?),
        None => None,
    };

    if source.balance < amount {
        return Err(LedgerError::InsufficientFunds);
    }

    set_balance(&tx, source.id, source.balance - amount)?;
    if let Some(dest) = &destination {
        set_balance(&tx, dest.id, credited(dest.balance, amount)?)?;
    }

    let (transaction_id, reference) = insert_transaction(
        &tx,
        cfg,
        &NewTransaction {
            from_account_id: Some(source.id),
            to_account_id: destination.as_ref().map(|d| d.id),
            transaction_type: TransactionType::Transfer,
            amount,
            description: req.description.clone(),
            external_bank_name: req.external_bank().map(str::to_string),
        },
    )?;
    audit::record(
        &tx,
        &AuditEntry::new("transfer", "transaction", transaction_id, caller.user_id).details(json!({
            "from_account_id": source.id,
            "to_account_id": destination.as_ref().map(|d| d.id),
            "external_bank_name": req.external_bank(),
            "amount": amount.to_string(),
        })),
    )?;
    tx.commit()?;

    tracing::info!(
        transaction_id,
        %reference,
        from = source.id,
        to = ?destination.as_ref().map(|d| d.id),
        amount = %amount,
        "transfer committed"
    );
    Ok(transaction_id)
}

pub fn handle(conn: &mut Connection, cfg: &LedgerConfig, m: &clap::ArgMatches) -> anyhow::Result<()> {
    let caller = caller_from(m)?;
    let req = TransferRequest {
        from_account_id: *m.get_one::<i64>("from").unwrap(),
        to_account_id: m.get_one::<i64>("to").copied(),
        external_bank_name: m.get_one::<String>("external-bank").cloned(),
        amount: parse_positive(m.get_one::<String>("amount").unwrap(), "amount")?,
        description: m
            .get_one::<String>("description")
            .map(|s| s.trim().to_string())
            .unwrap_or_default(),
    };
    let id = transfer(conn, cfg, &caller, &req)?;
    println!("Transaction successful (id {})", id);
    Ok(())
}
