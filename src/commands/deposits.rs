// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::audit::{self, AuditEntry};
use crate::commands::accounts::{authorize, find_account, lock_account, set_balance};
use crate::commands::transactions::{NewTransaction, insert_transaction};
use crate::config::LedgerConfig;
use crate::error::{LedgerError, Result};
use crate::models::{Caller, Deposit, DepositStatus, DepositType, TransactionType};
use crate::money::{credited, decimal_at, ensure_within_limit, round_currency};
use crate::utils::{caller_from, maybe_print_json, parse_positive, pretty_table};
use chrono::{Datelike, Local, NaiveDate, Utc};
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior, params};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::json;

/// Advance `start` by `months` calendar months. The day of month is clamped
/// to at most 28, so a deposit opened on the 29th-31st matures on the 28th
/// of the target month. This is intended: every target month has a 28th.
pub fn maturity_date(start: NaiveDate, months: u32) -> Option<NaiveDate> {
    let total = start.month0() + months;
    let year = start.year() + i32::try_from(total / 12).ok()?;
    let month = total % 12 + 1;
    NaiveDate::from_ymd_opt(year, month, start.day().min(28))
}

/// Early-withdrawal penalty: `rate` of principal when cancelled strictly
/// before maturity, nothing on or after it.
pub fn penalty_for(principal: Decimal, maturity: NaiveDate, today: NaiveDate, rate: Decimal) -> Decimal {
    if today < maturity {
        round_currency(principal * rate)
    } else {
        round_currency(Decimal::ZERO)
    }
}

#[derive(Debug, Clone)]
pub struct NewDeposit {
    pub account_id: i64,
    pub deposit_type: DepositType,
    pub term_months: u32,
    pub amount: Decimal,
    pub interest_rate: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct Cancellation {
    pub deposit_id: i64,
    pub penalty: Decimal,
    pub credit_amount: Decimal,
}

const DEPOSIT_COLUMNS: &str = "id, account_id, deposit_type, term_months, amount, interest_rate, status, \
                               start_date, maturity_date, penalty_amount, cancelled_at";

fn deposit_from_row(r: &Row<'_>) -> rusqlite::Result<Deposit> {
    Ok(Deposit {
        id: r.get(0)?,
        account_id: r.get(1)?,
        deposit_type: r.get(2)?,
        term_months: r.get(3)?,
        amount: decimal_at(r, 4)?,
        interest_rate: decimal_at(r, 5)?,
        status: r.get(6)?,
        start_date: r.get(7)?,
        maturity_date: r.get(8)?,
        penalty_amount: decimal_at(r, 9)?,
        cancelled_at: r.get(10)?,
    })
}

fn find_deposit(conn: &Connection, id: i64) -> Result<Option<Deposit>> {
    let sql = format!("SELECT {} FROM deposits WHERE id=?1", DEPOSIT_COLUMNS);
    Ok(conn
        .query_row(&sql, params![id], deposit_from_row)
        .optional()?)
}

/// Fetch a deposit and check the caller may act on its funding account.
fn owned_deposit(conn: &Connection, caller: &Caller, id: i64) -> Result<Deposit> {
    let deposit = find_deposit(conn, id)?.ok_or_else(|| LedgerError::NotFound("deposit".into()))?;
    let account = find_account(conn, deposit.account_id)?
        .ok_or_else(|| LedgerError::Forbidden("deposit has no funding account".into()))?;
    authorize(caller, &account)?;
    Ok(deposit)
}

pub fn create(conn: &mut Connection, cfg: &LedgerConfig, caller: &Caller, req: &NewDeposit) -> Result<i64> {
    create_on(conn, cfg, caller, req, Local::now().date_naive())
}

/// Lock `amount` from the account into a new active deposit starting `today`.
pub fn create_on(
    conn: &mut Connection,
    cfg: &LedgerConfig,
    caller: &Caller,
    req: &NewDeposit,
    today: NaiveDate,
) -> Result<i64> {
    create_inner(conn, cfg, caller, req, today).inspect_err(|e| e.log("deposit.create"))
}

fn create_inner(
    conn: &mut Connection,
    cfg: &LedgerConfig,
    caller: &Caller,
    req: &NewDeposit,
    today: NaiveDate,
) -> Result<i64> {
    if req.term_months < 1 || req.term_months > cfg.max_term_months {
        return Err(LedgerError::InvalidRequest(format!(
            "term_months must be between 1 and {}",
            cfg.max_term_months
        )));
    }
    // Rates are kept to two places; the stored value is what must be in range.
    let interest_rate = round_currency(req.interest_rate);
    if interest_rate <= Decimal::ZERO || interest_rate > cfg.max_interest_rate {
        return Err(LedgerError::InvalidRequest(format!(
            "interest_rate must be in (0, {}] at two decimal places",
            cfg.max_interest_rate
        )));
    }
    ensure_within_limit(req.amount, "amount")?;
    let amount = round_currency(req.amount);
    if amount <= Decimal::ZERO {
        return Err(LedgerError::InvalidRequest("amount must be positive".into()));
    }
    let maturity = maturity_date(today, req.term_months)
        .ok_or_else(|| LedgerError::Internal(format!("maturity out of range for {}", today)))?;

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let account = lock_account(&tx, req.account_id, "account")?;
    authorize(caller, &account)?;
    if account.balance < amount {
        return Err(LedgerError::InsufficientFunds);
    }

    set_balance(&tx, account.id, account.balance - amount)?;
    tx.execute(
        "INSERT INTO deposits(account_id, deposit_type, term_months, amount, interest_rate, status,
                              start_date, maturity_date)
         VALUES (?1,?2,?3,?4,?5,?6,?7,?8)",
        params![
            account.id,
            req.deposit_type,
            req.term_months,
            amount.to_string(),
            interest_rate.to_string(),
            DepositStatus::Active,
            today,
            maturity
        ],
    )?;
    let deposit_id = tx.last_insert_rowid();

    insert_transaction(
        &tx,
        cfg,
        &NewTransaction {
            from_account_id: Some(account.id),
            to_account_id: None,
            transaction_type: TransactionType::DepositCreate,
            amount,
            description: format!("Deposit created: {}", req.deposit_type),
            external_bank_name: None,
        },
    )?;
    audit::record(
        &tx,
        &AuditEntry::new("create", "deposit", deposit_id, caller.user_id).details(json!({
            "account_id": account.id,
            "amount": amount.to_string(),
            "deposit_type": req.deposit_type.as_str(),
            "maturity_date": maturity.to_string(),
        })),
    )?;
    tx.commit()?;

    tracing::info!(deposit_id, account_id = account.id, amount = %amount, %maturity, "deposit created");
    Ok(deposit_id)
}

pub fn cancel(conn: &mut Connection, cfg: &LedgerConfig, caller: &Caller, deposit_id: i64) -> Result<Cancellation> {
    cancel_on(conn, cfg, caller, deposit_id, Local::now().date_naive())
}

/// Break an active deposit on `today`, crediting principal less any penalty.
pub fn cancel_on(
    conn: &mut Connection,
    cfg: &LedgerConfig,
    caller: &Caller,
    deposit_id: i64,
    today: NaiveDate,
) -> Result<Cancellation> {
    cancel_inner(conn, cfg, caller, deposit_id, today).inspect_err(|e| e.log("deposit.cancel"))
}

fn cancel_inner(
    conn: &mut Connection,
    cfg: &LedgerConfig,
    caller: &Caller,
    deposit_id: i64,
    today: NaiveDate,
) -> Result<Cancellation> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let deposit = find_deposit(&tx, deposit_id)?.ok_or_else(|| LedgerError::NotFound("deposit".into()))?;
    if deposit.status != DepositStatus::Active {
        return Err(LedgerError::InvalidState(format!(
            "only active deposits can be cancelled (deposit {} is {})",
            deposit.id, deposit.status
        )));
    }
    let account = lock_account(&tx, deposit.account_id, "funding account")?;
    authorize(caller, &account)?;

    let penalty = penalty_for(
        deposit.amount,
        deposit.maturity_date,
        today,
        cfg.early_withdrawal_penalty_rate,
    );
    let credit_amount = round_currency(deposit.amount - penalty);

    set_balance(&tx, account.id, credited(account.balance, credit_amount)?)?;
    tx.execute(
        "UPDATE deposits SET status=?1, penalty_amount=?2, cancelled_at=?3 WHERE id=?4",
        params![DepositStatus::Cancelled, penalty.to_string(), Utc::now(), deposit.id],
    )?;
    insert_transaction(
        &tx,
        cfg,
        &NewTransaction {
            from_account_id: None,
            to_account_id: Some(account.id),
            transaction_type: TransactionType::DepositCancel,
            amount: credit_amount,
            description: format!("Deposit cancelled (penalty: {})", penalty),
            external_bank_name: None,
        },
    )?;
    audit::record(
        &tx,
        &AuditEntry::new("cancel", "deposit", deposit.id, caller.user_id).details(json!({
            "penalty": penalty.to_string(),
            "credit_amount": credit_amount.to_string(),
        })),
    )?;
    tx.commit()?;

    tracing::info!(deposit_id, account_id = account.id, penalty = %penalty, credit = %credit_amount, "deposit cancelled");
    Ok(Cancellation {
        deposit_id,
        penalty,
        credit_amount,
    })
}

/// Mark an active deposit as matured. No money moves here; payout is
/// handled outside the core.
pub fn mature(conn: &mut Connection, caller: &Caller, deposit_id: i64) -> Result<()> {
    if !caller.is_admin {
        return Err(LedgerError::Forbidden("maturing a deposit requires an administrator".into()));
    }
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let deposit = find_deposit(&tx, deposit_id)?.ok_or_else(|| LedgerError::NotFound("deposit".into()))?;
    if deposit.status != DepositStatus::Active {
        return Err(LedgerError::InvalidState(format!(
            "deposit {} is {}, not active",
            deposit.id, deposit.status
        )));
    }
    tx.execute(
        "UPDATE deposits SET status=?1 WHERE id=?2",
        params![DepositStatus::Matured, deposit.id],
    )?;
    audit::record(
        &tx,
        &AuditEntry::new("mature", "deposit", deposit.id, caller.user_id)
            .details(json!({ "maturity_date": deposit.maturity_date.to_string() })),
    )?;
    tx.commit()?;
    tracing::info!(deposit_id, "deposit matured");
    Ok(())
}

/// Remove a deposit record. Active deposits are live commitments and must be
/// cancelled first.
pub fn delete(conn: &mut Connection, caller: &Caller, deposit_id: i64) -> Result<()> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let deposit = owned_deposit(&tx, caller, deposit_id)?;
    if deposit.status == DepositStatus::Active {
        return Err(LedgerError::InvalidState(
            "cancel an active deposit before deleting".into(),
        ));
    }
    tx.execute("DELETE FROM deposits WHERE id=?1", params![deposit.id])?;
    audit::record(&tx, &AuditEntry::new("delete", "deposit", deposit.id, caller.user_id))?;
    tx.commit()?;
    tracing::info!(deposit_id, "deposit removed");
    Ok(())
}

pub fn get(conn: &Connection, caller: &Caller, deposit_id: i64) -> Result<Deposit> {
    owned_deposit(conn, caller, deposit_id)
}

pub fn list(conn: &Connection, caller: &Caller, status: Option<DepositStatus>) -> Result<Vec<Deposit>> {
    let sql = format!(
        "SELECT {} FROM deposits
         WHERE (?1 OR account_id IN (SELECT id FROM accounts WHERE user_id=?2))
           AND (?3 IS NULL OR status=?3)
         ORDER BY id DESC",
        DEPOSIT_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![caller.is_admin, caller.user_id, status], deposit_from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn handle(conn: &mut Connection, cfg: &LedgerConfig, m: &clap::ArgMatches) -> anyhow::Result<()> {
    let caller = caller_from(m)?;
    match m.subcommand() {
        Some(("create", sub)) => {
            let req = NewDeposit {
                account_id: *sub.get_one::<i64>("account").unwrap(),
                deposit_type: sub.get_one::<String>("type").unwrap().parse()?,
                term_months: *sub.get_one::<u32>("term").unwrap(),
                amount: parse_positive(sub.get_one::<String>("amount").unwrap(), "amount")?,
                interest_rate: parse_positive(sub.get_one::<String>("rate").unwrap(), "rate")?,
            };
            let id = create(conn, cfg, &caller, &req)?;
            let deposit = get(conn, &caller, id)?;
            println!(
                "Deposit {} created, matures on {}",
                id, deposit.maturity_date
            );
        }
        Some(("list", sub)) => {
            let status = sub
                .get_one::<String>("status")
                .map(|s| s.parse::<DepositStatus>())
                .transpose()?;
            let data = list(conn, &caller, status)?;
            if !maybe_print_json(sub.get_flag("json"), &data)? {
                let rows = data
                    .iter()
                    .map(|d| {
                        vec![
                            d.id.to_string(),
                            d.account_id.to_string(),
                            d.deposit_type.to_string(),
                            format!("{:.2}", d.amount),
                            format!("{:.2}%", d.interest_rate),
                            d.start_date.to_string(),
                            d.maturity_date.to_string(),
                            d.status.to_string(),
                        ]
                    })
                    .collect();
                println!(
                    "{}",
                    pretty_table(
                        &["ID", "Account", "Type", "Amount", "Rate", "Start", "Maturity", "Status"],
                        rows
                    )
                );
            }
        }
        Some(("show", sub)) => {
            let d = get(conn, &caller, *sub.get_one::<i64>("id").unwrap())?;
            if !maybe_print_json(sub.get_flag("json"), &d)? {
                let cancelled = d.cancelled_at.map(|t| t.to_rfc3339()).unwrap_or_default();
                println!(
                    "{}",
                    pretty_table(
                        &["Field", "Value"],
                        vec![
                            vec!["Account".into(), d.account_id.to_string()],
                            vec!["Type".into(), d.deposit_type.to_string()],
                            vec!["Term".into(), format!("{} months", d.term_months)],
                            vec!["Amount".into(), format!("{:.2}", d.amount)],
                            vec!["Rate".into(), format!("{:.2}%", d.interest_rate)],
                            vec!["Start".into(), d.start_date.to_string()],
                            vec!["Maturity".into(), d.maturity_date.to_string()],
                            vec!["Status".into(), d.status.to_string()],
                            vec!["Penalty".into(), format!("{:.2}", d.penalty_amount)],
                            vec!["Cancelled".into(), cancelled],
                        ],
                    )
                );
            }
        }
        Some(("cancel", sub)) => {
            let out = cancel(conn, cfg, &caller, *sub.get_one::<i64>("id").unwrap())?;
            if !maybe_print_json(sub.get_flag("json"), &out)? {
                println!(
                    "Deposit {} cancelled: credited {} (penalty {})",
                    out.deposit_id, out.credit_amount, out.penalty
                );
            }
        }
        Some(("mature", sub)) => {
            let id = *sub.get_one::<i64>("id").unwrap();
            mature(conn, &caller, id)?;
            println!("Deposit {} marked matured", id);
        }
        Some(("rm", sub)) => {
            let id = *sub.get_one::<i64>("id").unwrap();
            delete(conn, &caller, id)?;
            println!("Deposit {} removed", id);
        }
        _ => {}
    }
    Ok(())
}
