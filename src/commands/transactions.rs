// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::config::LedgerConfig;
use crate::error::{LedgerError, Result};
use crate::models::{Caller, Transaction, TransactionStatus, TransactionType};
use crate::money::decimal_at;
use crate::refs;
use crate::utils::{caller_from, maybe_print_json, parse_date, parse_decimal, pretty_table};
use chrono::NaiveDate;
use rand::rngs::OsRng;
use rusqlite::{Connection, OptionalExtension, Row, params};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::json;

#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub from_account_id: Option<i64>,
    pub to_account_id: Option<i64>,
    pub transaction_type: TransactionType,
    pub amount: Decimal,
    pub description: String,
    pub external_bank_name: Option<String>,
}

/// Draw a reference that is free in both the ledger and the trade book.
pub(crate) fn unique_reference(conn: &Connection, cfg: &LedgerConfig) -> Result<String> {
    refs::generate_unique(
        &mut OsRng,
        "transaction reference",
        cfg.reference_attempts,
        refs::transaction_reference,
        |candidate| {
            let hit: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM transactions WHERE reference=?1
                     UNION ALL SELECT 1 FROM mutual_fund_trades WHERE reference=?1
                     LIMIT 1",
                    params![candidate],
                    |r| r.get(0),
                )
                .optional()?;
            Ok(hit.is_some())
        },
    )
}

/// Append one successful ledger row with a fresh reference. Returns
/// `(id, reference)`. Runs on the caller's open transaction.
pub(crate) fn insert_transaction(
    conn: &Connection,
    cfg: &LedgerConfig,
    new: &NewTransaction,
) -> Result<(i64, String)> {
    let reference = unique_reference(conn, cfg)?;
    let id = insert_with_reference(conn, new, &reference)?;
    Ok((id, reference))
}

pub(crate) fn insert_with_reference(
    conn: &Connection,
    new: &NewTransaction,
    reference: &str,
) -> Result<i64> {
    if new.amount <= Decimal::ZERO {
        return Err(LedgerError::Internal(format!(
            "refusing to record non-positive amount {}",
            new.amount
        )));
    }
    conn.execute(
        "INSERT INTO transactions(from_account_id, to_account_id, transaction_type, amount,
                                  description, external_bank_name, status, reference)
         VALUES (?1,?2,?3,?4,?5,?6,?7,?8)",
        params![
            new.from_account_id,
            new.to_account_id,
            new.transaction_type,
            new.amount.to_string(),
            new.description,
            new.external_bank_name,
            TransactionStatus::Success,
            reference
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

const TXN_COLUMNS: &str = "t.id, t.from_account_id, t.to_account_id, t.transaction_type, t.amount, \
                           t.description, t.external_bank_name, t.status, t.reference, t.created_at";

fn transaction_from_row(r: &Row<'_>) -> rusqlite::Result<Transaction> {
    Ok(Transaction {
        id: r.get(0)?,
        from_account_id: r.get(1)?,
        to_account_id: r.get(2)?,
        transaction_type: r.get(3)?,
        amount: decimal_at(r, 4)?,
        description: r.get(5)?,
        external_bank_name: r.get(6)?,
        status: r.get(7)?,
        reference: r.get(8)?,
        created_at: r.get(9)?,
    })
}

#[derive(Debug, Clone, Default)]
pub struct TransactionFilter {
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub transaction_type: Option<TransactionType>,
    pub min_amount: Option<Decimal>,
    pub max_amount: Option<Decimal>,
    pub limit: Option<usize>,
}

/// Newest first. Non-admins only see rows touching an account they own
/// (deleted accounts excluded). Amount bounds are applied on the decoded
/// decimals, not on the stored text.
pub fn list(conn: &Connection, caller: &Caller, filter: &TransactionFilter) -> Result<Vec<Transaction>> {
    let mut sql = format!("SELECT {} FROM transactions t WHERE 1=1", TXN_COLUMNS);
    let mut args: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

    if !caller.is_admin {
        sql.push_str(
            " AND (t.from_account_id IN (SELECT id FROM accounts WHERE user_id=? AND is_deleted=0)
               OR t.to_account_id IN (SELECT id FROM accounts WHERE user_id=? AND is_deleted=0))",
        );
        args.push(Box::new(caller.user_id));
        args.push(Box::new(caller.user_id));
    }
    if let Some(from) = filter.date_from {
        sql.push_str(" AND substr(t.created_at,1,10)>=?");
        args.push(Box::new(from.to_string()));
    }
    if let Some(to) = filter.date_to {
        sql.push_str(" AND substr(t.created_at,1,10)<=?");
        args.push(Box::new(to.to_string()));
    }
    if let Some(kind) = filter.transaction_type {
        sql.push_str(" AND t.transaction_type=?");
        args.push(Box::new(kind));
    }
    sql.push_str(" ORDER BY t.created_at DESC, t.id DESC");

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(
        rusqlite::params_from_iter(args.iter().map(|a| a.as_ref())),
        transaction_from_row,
    )?;

    let mut out = Vec::new();
    for row in rows {
        let txn = row?;
        if filter.min_amount.is_some_and(|min| txn.amount < min) {
            continue;
        }
        if filter.max_amount.is_some_and(|max| txn.amount > max) {
            continue;
        }
        out.push(txn);
        if filter.limit.is_some_and(|n| out.len() >= n) {
            break;
        }
    }
    Ok(out)
}

pub fn get(conn: &Connection, caller: &Caller, id: i64) -> Result<Transaction> {
    let sql = format!("SELECT {} FROM transactions t WHERE t.id=?1", TXN_COLUMNS);
    let txn = conn
        .query_row(&sql, params![id], transaction_from_row)
        .optional()?
        .ok_or_else(|| LedgerError::NotFound("transaction".into()))?;
    if caller.is_admin {
        return Ok(txn);
    }
    let owned: i64 = conn.query_row(
        "SELECT COUNT(*) FROM accounts WHERE user_id=?1 AND is_deleted=0 AND id IN (?2, ?3)",
        params![caller.user_id, txn.from_account_id, txn.to_account_id],
        |r| r.get(0),
    )?;
    if owned == 0 {
        return Err(LedgerError::Forbidden(format!(
            "transaction {} does not touch an account of user {}",
            id, caller.user_id
        )));
    }
    Ok(txn)
}

#[derive(Serialize)]
pub struct TransactionRow {
    pub id: i64,
    pub created_at: String,
    pub reference: String,
    pub transaction_type: String,
    pub from: String,
    pub to: String,
    pub amount: String,
    pub status: String,
    pub description: String,
}

impl From<&Transaction> for TransactionRow {
    fn from(t: &Transaction) -> Self {
        let to = match (t.to_account_id, &t.external_bank_name) {
            (Some(id), _) => id.to_string(),
            (None, Some(bank)) => format!("ext:{}", bank),
            (None, None) => String::new(),
        };
        Self {
            id: t.id,
            created_at: t.created_at.clone(),
            reference: t.reference.clone(),
            transaction_type: t.transaction_type.to_string(),
            from: t.from_account_id.map(|v| v.to_string()).unwrap_or_default(),
            to,
            amount: format!("{:.2}", t.amount),
            status: t.status.to_string(),
            description: t.description.clone(),
        }
    }
}

pub fn filter_from(sub: &clap::ArgMatches) -> anyhow::Result<TransactionFilter> {
    Ok(TransactionFilter {
        date_from: sub.get_one::<String>("from").map(|s| parse_date(s)).transpose()?,
        date_to: sub.get_one::<String>("to").map(|s| parse_date(s)).transpose()?,
        transaction_type: sub
            .get_one::<String>("type")
            .map(|s| s.parse::<TransactionType>())
            .transpose()?,
        min_amount: sub.get_one::<String>("min").map(|s| parse_decimal(s)).transpose()?,
        max_amount: sub.get_one::<String>("max").map(|s| parse_decimal(s)).transpose()?,
        limit: sub.get_one::<usize>("limit").copied(),
    })
}

pub fn handle(conn: &Connection, m: &clap::ArgMatches) -> anyhow::Result<()> {
    let caller = caller_from(m)?;
    match m.subcommand() {
        Some(("list", sub)) => {
            let data = list(conn, &caller, &filter_from(sub)?)?;
            let rows: Vec<TransactionRow> = data.iter().map(TransactionRow::from).collect();
            if !maybe_print_json(sub.get_flag("json"), &rows)? {
                let table = rows
                    .into_iter()
                    .map(|r| {
                        vec![
                            r.id.to_string(),
                            r.created_at,
                            r.reference,
                            r.transaction_type,
                            r.from,
                            r.to,
                            r.amount,
                            r.description,
                        ]
                    })
                    .collect();
                println!(
                    "{}",
                    pretty_table(
                        &["ID", "When", "Reference", "Type", "From", "To", "Amount", "Description"],
                        table
                    )
                );
            }
        }
        Some(("show", sub)) => {
            let txn = get(conn, &caller, *sub.get_one::<i64>("id").unwrap())?;
            if !maybe_print_json(sub.get_flag("json"), &txn)? {
                let r = TransactionRow::from(&txn);
                println!(
                    "{}",
                    pretty_table(
                        &["Field", "Value"],
                        vec![
                            vec!["Reference".into(), r.reference],
                            vec!["Type".into(), r.transaction_type],
                            vec!["From".into(), r.from],
                            vec!["To".into(), r.to],
                            vec!["Amount".into(), r.amount],
                            vec!["Status".into(), r.status],
                            vec!["Description".into(), r.description],
                            vec!["When".into(), r.created_at],
                        ],
                    )
                );
            }
        }
        Some(("export", sub)) => export(conn, &caller, sub)?,
        _ => {}
    }
    Ok(())
}

fn export(conn: &Connection, caller: &Caller, sub: &clap::ArgMatches) -> anyhow::Result<()> {
    let fmt = sub.get_one::<String>("format").unwrap().to_lowercase();
    let out = sub.get_one::<String>("out").unwrap();
    let data = list(conn, caller, &filter_from(sub)?)?;

    match fmt.as_str() {
        "csv" => {
            let mut wtr = csv::Writer::from_path(out)?;
            for txn in &data {
                wtr.serialize(TransactionRow::from(txn))?;
            }
            wtr.flush()?;
        }
        "json" => {
            let items: Vec<_> = data
                .iter()
                .map(|t| {
                    json!({
                        "id": t.id,
                        "reference": t.reference,
                        "type": t.transaction_type,
                        "from_account_id": t.from_account_id,
                        "to_account_id": t.to_account_id,
                        "external_bank_name": t.external_bank_name,
                        "amount": t.amount.to_string(),
                        "status": t.status,
                        "description": t.description,
                        "created_at": t.created_at,
                    })
                })
                .collect();
            std::fs::write(out, serde_json::to_string_pretty(&items)?)?;
        }
        other => anyhow::bail!("Unknown format: {} (use csv|json)", other),
    }
    println!("Exported {} transactions to {}", data.len(), out);
    Ok(())
}
