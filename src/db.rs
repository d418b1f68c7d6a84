// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::config::LedgerConfig;
use anyhow::{Context, Result};
use directories::ProjectDirs;
use once_cell::sync::Lazy;
use rusqlite::Connection;
use std::fs;
use std::path::{Path, PathBuf};

static APP: Lazy<(&str, &str, &str)> =
    Lazy::new(|| ("com.alphavelocity", "Ledgercore", "ledgercore"));

pub fn db_path(cfg: &LedgerConfig) -> Result<PathBuf> {
    if let Some(p) = &cfg.database_path {
        return Ok(p.clone());
    }
    let proj = ProjectDirs::from(APP.0, APP.1, APP.2)
        .context("Could not determine platform-specific data dir")?;
    let data_dir = proj.data_dir();
    fs::create_dir_all(data_dir).context("Failed to create data dir")?;
    Ok(data_dir.join("ledgercore.sqlite"))
}

pub fn open_or_init(cfg: &LedgerConfig) -> Result<Connection> {
    let path = db_path(cfg)?;
    open_at(&path, cfg)
}

/// Open a file-backed store. WAL keeps readers off the writer's back; every
/// mutating operation still serialises on SQLite's single write lock.
pub fn open_at(path: &Path, cfg: &LedgerConfig) -> Result<Connection> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Create data dir {}", parent.display()))?;
    }
    let mut conn =
        Connection::open(path).with_context(|| format!("Open DB at {}", path.display()))?;
    configure(&conn, cfg)?;
    let mode: String = conn.pragma_update_and_check(None, "journal_mode", "WAL", |r| r.get(0))?;
    tracing::debug!(path = %path.display(), journal_mode = %mode, "opened ledger store");
    init_schema(&mut conn)?;
    Ok(conn)
}

pub fn open_in_memory(cfg: &LedgerConfig) -> Result<Connection> {
    let mut conn = Connection::open_in_memory()?;
    configure(&conn, cfg)?;
    init_schema(&mut conn)?;
    Ok(conn)
}

fn configure(conn: &Connection, cfg: &LedgerConfig) -> Result<()> {
    conn.busy_timeout(cfg.busy_timeout())?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    Ok(())
}

pub fn init_schema(conn: &mut Connection) -> Result<()> {
    conn.execute_batch(
        r#"
    CREATE TABLE IF NOT EXISTS accounts(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        account_number TEXT NOT NULL UNIQUE,
        user_id INTEGER NOT NULL,
        account_type TEXT NOT NULL
            CHECK(account_type IN ('savings','current','fixed_deposit')),
        bank_name TEXT NOT NULL,
        balance TEXT NOT NULL DEFAULT '0.00', -- 2dp decimal text
        is_active INTEGER NOT NULL DEFAULT 1,
        is_deleted INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now')),
        updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now'))
    );
    CREATE INDEX IF NOT EXISTS idx_accounts_user ON accounts(user_id);

    CREATE TABLE IF NOT EXISTS transactions(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        from_account_id INTEGER,
        to_account_id INTEGER,
        transaction_type TEXT NOT NULL CHECK(transaction_type IN
            ('transfer','mutual_fund_buy','mutual_fund_sell','deposit_create','deposit_cancel','adjustment')),
        amount TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        external_bank_name TEXT,
        status TEXT NOT NULL DEFAULT 'success' CHECK(status IN ('success','failed','pending')),
        reference TEXT NOT NULL UNIQUE,
        created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now')),
        FOREIGN KEY(from_account_id) REFERENCES accounts(id) ON DELETE SET NULL,
        FOREIGN KEY(to_account_id) REFERENCES accounts(id) ON DELETE SET NULL
    );
    CREATE INDEX IF NOT EXISTS idx_transactions_created ON transactions(created_at);

    CREATE TABLE IF NOT EXISTS mutual_funds(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        symbol TEXT NOT NULL UNIQUE,
        nav TEXT NOT NULL, -- 4dp
        is_active INTEGER NOT NULL DEFAULT 1,
        created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now')),
        updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now'))
    );

    CREATE TABLE IF NOT EXISTS mutual_fund_holdings(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL,
        account_id INTEGER NOT NULL,
        fund_id INTEGER NOT NULL,
        units TEXT NOT NULL,
        average_nav TEXT NOT NULL,
        updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now')),
        UNIQUE(user_id, account_id, fund_id),
        FOREIGN KEY(account_id) REFERENCES accounts(id) ON DELETE RESTRICT,
        FOREIGN KEY(fund_id) REFERENCES mutual_funds(id) ON DELETE RESTRICT
    );

    CREATE TABLE IF NOT EXISTS mutual_fund_trades(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL,
        account_id INTEGER NOT NULL,
        fund_id INTEGER NOT NULL,
        trade_type TEXT NOT NULL CHECK(trade_type IN ('buy','sell')),
        nav TEXT NOT NULL,
        units TEXT NOT NULL,
        amount TEXT NOT NULL,
        reference TEXT NOT NULL UNIQUE,
        created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now')),
        FOREIGN KEY(account_id) REFERENCES accounts(id) ON DELETE RESTRICT,
        FOREIGN KEY(fund_id) REFERENCES mutual_funds(id) ON DELETE RESTRICT
    );
    CREATE INDEX IF NOT EXISTS idx_trades_user ON mutual_fund_trades(user_id);

    CREATE TABLE IF NOT EXISTS deposits(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        account_id INTEGER NOT NULL,
        deposit_type TEXT NOT NULL CHECK(deposit_type IN ('fixed','recurring')),
        term_months INTEGER NOT NULL CHECK(term_months >= 1),
        amount TEXT NOT NULL,
        interest_rate TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'active' CHECK(status IN ('active','cancelled','matured')),
        start_date TEXT NOT NULL,
        maturity_date TEXT NOT NULL,
        penalty_amount TEXT NOT NULL DEFAULT '0.00',
        cancelled_at TEXT,
        FOREIGN KEY(account_id) REFERENCES accounts(id) ON DELETE RESTRICT
    );
    CREATE INDEX IF NOT EXISTS idx_deposits_account ON deposits(account_id);

    CREATE TABLE IF NOT EXISTS audit_logs(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER,
        action TEXT NOT NULL,
        entity TEXT NOT NULL,
        entity_id INTEGER,
        details TEXT NOT NULL DEFAULT '{}',
        created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now'))
    );
    "#,
    )?;
    Ok(())
}
