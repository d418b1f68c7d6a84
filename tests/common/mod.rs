// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

#![allow(dead_code)]

use ledgercore::commands::{accounts, funds};
use ledgercore::config::LedgerConfig;
use ledgercore::db;
use ledgercore::models::{AccountType, Caller};
use rusqlite::{Connection, params};
use rust_decimal::Decimal;

pub const ADMIN: Caller = Caller {
    user_id: 1,
    is_admin: true,
};

pub fn cfg() -> LedgerConfig {
    LedgerConfig::default()
}

pub fn base_conn() -> Connection {
    db::open_in_memory(&cfg()).unwrap()
}

/// Open a savings account for `user_id` holding `balance`.
pub fn account(conn: &mut Connection, user_id: i64, balance: Decimal) -> i64 {
    accounts::open(
        conn,
        &cfg(),
        &Caller::user(user_id),
        &accounts::NewAccount {
            user_id,
            account_type: AccountType::Savings,
            initial_deposit: balance,
        },
    )
    .unwrap()
}

pub fn fund(conn: &mut Connection, symbol: &str, nav: Decimal) -> i64 {
    funds::create_fund(conn, &ADMIN, &format!("{} Growth", symbol), symbol, nav).unwrap()
}

pub fn balance(conn: &Connection, account_id: i64) -> Decimal {
    let raw: String = conn
        .query_row(
            "SELECT balance FROM accounts WHERE id=?1",
            params![account_id],
            |r| r.get(0),
        )
        .unwrap();
    raw.parse().unwrap()
}

pub fn count(conn: &Connection, table: &str) -> i64 {
    conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| r.get(0))
        .unwrap()
}

pub fn audit_actions(conn: &Connection) -> Vec<String> {
    let mut stmt = conn
        .prepare("SELECT action FROM audit_logs ORDER BY id")
        .unwrap();
    stmt.query_map([], |r| r.get(0))
        .unwrap()
        .collect::<rusqlite::Result<Vec<String>>>()
        .unwrap()
}

/// Make every further audit write fail.
pub fn break_audit_sink(conn: &Connection) {
    conn.execute_batch(
        "CREATE TRIGGER audit_down BEFORE INSERT ON audit_logs
         BEGIN SELECT RAISE(ABORT, 'audit sink unavailable'); END;",
    )
    .unwrap();
}
