// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::audit::{self, AuditEntry};
use crate::commands::transactions::{NewTransaction, insert_transaction};
use crate::config::LedgerConfig;
use crate::error::{LedgerError, Result};
use crate::models::{Account, AccountType, Caller, TransactionType};
use crate::money::{decimal_at, ensure_within_limit, round_currency};
use crate::refs;
use crate::utils::{caller_from, maybe_print_json, parse_decimal, pretty_table};
use rand::rngs::OsRng;
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior, params};
use rust_decimal::Decimal;
use serde_json::json;

const ACCOUNT_COLUMNS: &str = "id, account_number, user_id, account_type, bank_name, balance, \
                               is_active, is_deleted, created_at";

fn account_from_row(r: &Row<'_>) -> rusqlite::Result<Account> {
    Ok(Account {
        id: r.get(0)?,
        account_number: r.get(1)?,
        user_id: r.get(2)?,
        account_type: r.get(3)?,
        bank_name: r.get(4)?,
        balance: decimal_at(r, 5)?,
        is_active: r.get(6)?,
        is_deleted: r.get(7)?,
        created_at: r.get(8)?,
    })
}

pub(crate) fn find_account(conn: &Connection, id: i64) -> Result<Option<Account>> {
    let sql = format!("SELECT {} FROM accounts WHERE id=?1", ACCOUNT_COLUMNS);
    Ok(conn
        .query_row(&sql, params![id], account_from_row)
        .optional()?)
}

/// Load an account for mutation. Must be called on an IMMEDIATE transaction:
/// the store's write lock is already held, so the balance read here cannot
/// move until the caller commits or rolls back. Deleted and inactive accounts
/// are reported as missing.
pub(crate) fn lock_account(conn: &Connection, id: i64, label: &str) -> Result<Account> {
    match find_account(conn, id)? {
        Some(acct) if acct.is_open() => Ok(acct),
        _ => Err(LedgerError::NotFound(label.to_string())),
    }
}

pub(crate) fn authorize(caller: &Caller, account: &Account) -> Result<()> {
    if caller.can_access(account.user_id) {
        Ok(())
    } else {
        Err(LedgerError::Forbidden(format!(
            "user {} cannot operate on account {}",
            caller.user_id, account.id
        )))
    }
}

/// Write a new balance, rounded to cents. Negative balances and balances
/// past the column limit are refused.
pub(crate) fn set_balance(conn: &Connection, id: i64, balance: Decimal) -> Result<()> {
    if balance < Decimal::ZERO {
        return Err(LedgerError::InsufficientFunds);
    }
    ensure_within_limit(balance, "balance")?;
    let balance = round_currency(balance);
    conn.execute(
        "UPDATE accounts SET balance=?1, updated_at=strftime('%Y-%m-%dT%H:%M:%fZ','now') WHERE id=?2",
        params![balance.to_string(), id],
    )?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct NewAccount {
    pub user_id: i64,
    pub account_type: AccountType,
    pub initial_deposit: Decimal,
}

/// Field-by-field patch; absent fields are left as stored.
#[derive(Debug, Clone, Default)]
pub struct AccountPatch {
    pub account_type: Option<AccountType>,
    pub is_active: Option<bool>,
}

impl AccountPatch {
    pub fn is_empty(&self) -> bool {
        self.account_type.is_none() && self.is_active.is_none()
    }
}

/// Open an account with a fresh unique number. A non-zero opening balance
/// enters the ledger as an `adjustment` credit.
pub fn open(
    conn: &mut Connection,
    cfg: &LedgerConfig,
    caller: &Caller,
    req: &NewAccount,
) -> Result<i64> {
    open_inner(conn, cfg, caller, req).inspect_err(|e| e.log("account.open"))
}

fn open_inner(
    conn: &mut Connection,
    cfg: &LedgerConfig,
    caller: &Caller,
    req: &NewAccount,
) -> Result<i64> {
    if !caller.can_access(req.user_id) {
        return Err(LedgerError::Forbidden(format!(
            "user {} cannot open accounts for user {}",
            caller.user_id, req.user_id
        )));
    }
    if req.initial_deposit < Decimal::ZERO {
        return Err(LedgerError::InvalidRequest(
            "initial deposit cannot be negative".into(),
        ));
    }
    ensure_within_limit(req.initial_deposit, "initial deposit")?;
    let opening = round_currency(req.initial_deposit);

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let number = refs::generate_unique(
        &mut OsRng,
        "account number",
        cfg.account_number_attempts,
        refs::account_number,
        |candidate| {
            let hit: Option<i64> = tx
                .query_row(
                    "SELECT id FROM accounts WHERE account_number=?1",
                    params![candidate],
                    |r| r.get(0),
                )
                .optional()?;
            Ok(hit.is_some())
        },
    )?;
    tx.execute(
        "INSERT INTO accounts(account_number, user_id, account_type, bank_name, balance)
         VALUES (?1,?2,?3,?4,?5)",
        params![number, req.user_id, req.account_type, cfg.bank_name, opening.to_string()],
    )?;
    let account_id = tx.last_insert_rowid();

    if opening > Decimal::ZERO {
        insert_transaction(
            &tx,
            cfg,
            &NewTransaction {
                from_account_id: None,
                to_account_id: Some(account_id),
                transaction_type: TransactionType::Adjustment,
                amount: opening,
                description: "Opening deposit".to_string(),
                external_bank_name: None,
            },
        )?;
    }
    audit::record(
        &tx,
        &AuditEntry::new("create", "account", account_id, caller.user_id).details(json!({
            "user_id": req.user_id,
            "account_type": req.account_type.as_str(),
            "initial_deposit": opening.to_string(),
        })),
    )?;
    tx.commit()?;
    tracing::info!(account_id, user_id = req.user_id, opening = %opening, "account opened");
    Ok(account_id)
}

/// Visible accounts for the caller: admins see everything, users their own.
pub fn list(conn: &Connection, caller: &Caller, include_deleted: bool) -> Result<Vec<Account>> {
    let mut sql = format!("SELECT {} FROM accounts WHERE 1=1", ACCOUNT_COLUMNS);
    if !include_deleted {
        sql.push_str(" AND is_deleted=0");
    }
    if !caller.is_admin {
        sql.push_str(" AND user_id=?1");
    }
    sql.push_str(" ORDER BY id DESC");
    let mut stmt = conn.prepare(&sql)?;
    let rows = if caller.is_admin {
        stmt.query_map([], account_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?
    } else {
        stmt.query_map(params![caller.user_id], account_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?
    };
    Ok(rows)
}

pub fn get(conn: &Connection, caller: &Caller, id: i64) -> Result<Account> {
    let acct = find_account(conn, id)?
        .filter(|a| !a.is_deleted)
        .ok_or_else(|| LedgerError::NotFound("account".into()))?;
    authorize(caller, &acct)?;
    Ok(acct)
}

/// Apply a patch under the write lock, auditing the names of changed fields.
pub fn update(conn: &mut Connection, caller: &Caller, id: i64, patch: &AccountPatch) -> Result<()> {
    update_inner(conn, caller, id, patch).inspect_err(|e| e.log("account.update"))
}

fn update_inner(conn: &mut Connection, caller: &Caller, id: i64, patch: &AccountPatch) -> Result<()> {
    if patch.is_empty() {
        return Err(LedgerError::InvalidRequest("no fields to update".into()));
    }
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let acct = find_account(&tx, id)?
        .filter(|a| !a.is_deleted)
        .ok_or_else(|| LedgerError::NotFound("account".into()))?;
    authorize(caller, &acct)?;

    let mut fields = Vec::new();
    if let Some(kind) = patch.account_type {
        tx.execute(
            "UPDATE accounts SET account_type=?1 WHERE id=?2",
            params![kind, id],
        )?;
        fields.push("account_type");
    }
    if let Some(active) = patch.is_active {
        tx.execute(
            "UPDATE accounts SET is_active=?1 WHERE id=?2",
            params![active, id],
        )?;
        fields.push("is_active");
    }
    tx.execute(
        "UPDATE accounts SET updated_at=strftime('%Y-%m-%dT%H:%M:%fZ','now') WHERE id=?1",
        params![id],
    )?;
    audit::record(
        &tx,
        &AuditEntry::new("update", "account", id, caller.user_id).details(json!({ "fields": fields })),
    )?;
    tx.commit()?;
    tracing::info!(account_id = id, ?fields, "account updated");
    Ok(())
}

/// Soft delete: the row stays for history but no operation will touch it again.
pub fn soft_delete(conn: &mut Connection, caller: &Caller, id: i64) -> Result<()> {
    soft_delete_inner(conn, caller, id).inspect_err(|e| e.log("account.delete"))
}

fn soft_delete_inner(conn: &mut Connection, caller: &Caller, id: i64) -> Result<()> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let acct = find_account(&tx, id)?
        .filter(|a| !a.is_deleted)
        .ok_or_else(|| LedgerError::NotFound("account".into()))?;
    authorize(caller, &acct)?;
    tx.execute(
        "UPDATE accounts SET is_deleted=1, is_active=0,
             updated_at=strftime('%Y-%m-%dT%H:%M:%fZ','now') WHERE id=?1",
        params![id],
    )?;
    audit::record(&tx, &AuditEntry::new("delete", "account", id, caller.user_id))?;
    tx.commit()?;
    tracing::info!(account_id = id, "account soft-deleted");
    Ok(())
}

pub fn handle(conn: &mut Connection, cfg: &LedgerConfig, m: &clap::ArgMatches) -> anyhow::Result<()> {
    let caller = caller_from(m)?;
    match m.subcommand() {
        Some(("open", sub)) => {
            let user_id = sub
                .get_one::<i64>("owner")
                .copied()
                .unwrap_or(caller.user_id);
            let account_type = sub.get_one::<String>("type").unwrap().parse::<AccountType>()?;
            let initial_deposit = match sub.get_one::<String>("initial-deposit") {
                Some(raw) => parse_decimal(raw)?,
                None => Decimal::ZERO,
            };
            let id = open(
                conn,
                cfg,
                &caller,
                &NewAccount {
                    user_id,
                    account_type,
                    initial_deposit,
                },
            )?;
            let acct = get(conn, &caller, id)?;
            println!(
                "Opened {} account {} (id {}) for user {}",
                acct.account_type, acct.account_number, id, user_id
            );
        }
        Some(("list", sub)) => {
            let data = list(conn, &caller, sub.get_flag("include-deleted"))?;
            if !maybe_print_json(sub.get_flag("json"), &data)? {
                let rows = data
                    .iter()
                    .map(|a| {
                        vec![
                            a.id.to_string(),
                            a.account_number.clone(),
                            a.user_id.to_string(),
                            a.account_type.to_string(),
                            format!("{:.2}", a.balance),
                            status_label(a).to_string(),
                        ]
                    })
                    .collect();
                println!(
                    "{}",
                    pretty_table(&["ID", "Number", "User", "Type", "Balance", "Status"], rows)
                );
            }
        }
        Some(("show", sub)) => {
            let acct = get(conn, &caller, *sub.get_one::<i64>("id").unwrap())?;
            if !maybe_print_json(sub.get_flag("json"), &acct)? {
                println!(
                    "{}",
                    pretty_table(
                        &["Field", "Value"],
                        vec![
                            vec!["Number".into(), acct.account_number.clone()],
                            vec!["Type".into(), acct.account_type.to_string()],
                            vec!["Bank".into(), acct.bank_name.clone()],
                            vec!["Balance".into(), format!("{:.2}", acct.balance)],
                            vec!["Status".into(), status_label(&acct).to_string()],
                            vec!["Opened".into(), acct.created_at.clone()],
                        ],
                    )
                );
            }
        }
        Some(("update", sub)) => {
            let id = *sub.get_one::<i64>("id").unwrap();
            let patch = AccountPatch {
                account_type: sub
                    .get_one::<String>("type")
                    .map(|s| s.parse::<AccountType>())
                    .transpose()?,
                is_active: if sub.get_flag("activate") {
                    Some(true)
                } else if sub.get_flag("deactivate") {
                    Some(false)
                } else {
                    None
                },
            };
            update(conn, &caller, id, &patch)?;
            println!("Updated account {}", id);
        }
        Some(("rm", sub)) => {
            let id = *sub.get_one::<i64>("id").unwrap();
            soft_delete(conn, &caller, id)?;
            println!("Removed account {}", id);
        }
        _ => {}
    }
    Ok(())
}

fn status_label(a: &Account) -> &'static str {
    if a.is_deleted {
        "deleted"
    } else if a.is_active {
        "active"
    } else {
        "inactive"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;
    use rust_decimal_macros::dec;

    fn setup() -> (Connection, LedgerConfig) {
        let cfg = LedgerConfig::default();
        (open_in_memory(&cfg).unwrap(), cfg)
    }

    fn new_account(user_id: i64, initial: Decimal) -> NewAccount {
        NewAccount {
            user_id,
            account_type: AccountType::Savings,
            initial_deposit: initial,
        }
    }

    #[test]
    fn open_credits_opening_balance_as_adjustment() {
        let (mut conn, cfg) = setup();
        let id = open(&mut conn, &cfg, &Caller::user(4), &new_account(4, dec!(250.5))).unwrap();

        let acct = get(&conn, &Caller::user(4), id).unwrap();
        assert_eq!(acct.balance, dec!(250.50));
        assert_eq!(acct.account_number.len(), 12);
        assert_eq!(acct.bank_name, "Demo Bank");

        let (kind, amount, to): (String, String, i64) = conn
            .query_row(
                "SELECT transaction_type, amount, to_account_id FROM transactions",
                [],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )
            .unwrap();
        assert_eq!(kind, "adjustment");
        assert_eq!(amount, "250.50");
        assert_eq!(to, id);
    }

    #[test]
    fn open_without_deposit_writes_no_transaction() {
        let (mut conn, cfg) = setup();
        open(&mut conn, &cfg, &Caller::user(4), &new_account(4, Decimal::ZERO)).unwrap();
        let n: i64 = conn
            .query_row("SELECT COUNT(*) FROM transactions", [], |r| r.get(0))
            .unwrap();
        assert_eq!(n, 0);
        let audits: i64 = conn
            .query_row("SELECT COUNT(*) FROM audit_logs WHERE action='create'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(audits, 1);
    }

    #[test]
    fn users_cannot_open_for_others() {
        let (mut conn, cfg) = setup();
        let err = open(&mut conn, &cfg, &Caller::user(1), &new_account(2, dec!(5))).unwrap_err();
        assert!(matches!(err, LedgerError::Forbidden(_)));
        assert!(open(&mut conn, &cfg, &Caller::admin(1), &new_account(2, dec!(5))).is_ok());
    }

    #[test]
    fn soft_deleted_accounts_disappear_and_refuse_locking() {
        let (mut conn, cfg) = setup();
        let id = open(&mut conn, &cfg, &Caller::user(3), &new_account(3, dec!(10))).unwrap();
        soft_delete(&mut conn, &Caller::user(3), id).unwrap();

        assert!(list(&conn, &Caller::user(3), false).unwrap().is_empty());
        assert_eq!(list(&conn, &Caller::user(3), true).unwrap().len(), 1);
        assert!(matches!(
            get(&conn, &Caller::user(3), id),
            Err(LedgerError::NotFound(_))
        ));
        assert!(matches!(
            lock_account(&conn, id, "account"),
            Err(LedgerError::NotFound(_))
        ));
    }

    #[test]
    fn patch_applies_only_present_fields() {
        let (mut conn, cfg) = setup();
        let id = open(&mut conn, &cfg, &Caller::user(3), &new_account(3, dec!(10))).unwrap();
        let patch = AccountPatch {
            is_active: Some(false),
            ..AccountPatch::default()
        };
        update(&mut conn, &Caller::user(3), id, &patch).unwrap();

        let acct = get(&conn, &Caller::user(3), id).unwrap();
        assert!(!acct.is_active);
        assert_eq!(acct.account_type, AccountType::Savings);

        let details: String = conn
            .query_row(
                "SELECT details FROM audit_logs WHERE action='update'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(details, r#"{"fields":["is_active"]}"#);

        let empty = update(&mut conn, &Caller::user(3), id, &AccountPatch::default()).unwrap_err();
        assert!(matches!(empty, LedgerError::InvalidRequest(_)));
    }

    #[test]
    fn list_scopes_to_owner() {
        let (mut conn, cfg) = setup();
        open(&mut conn, &cfg, &Caller::user(1), &new_account(1, dec!(1))).unwrap();
        open(&mut conn, &cfg, &Caller::user(2), &new_account(2, dec!(1))).unwrap();
        assert_eq!(list(&conn, &Caller::user(1), false).unwrap().len(), 1);
        assert_eq!(list(&conn, &Caller::admin(9), false).unwrap().len(), 2);
    }
}
