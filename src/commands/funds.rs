// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::audit::{self, AuditEntry};
use crate::commands::accounts::{authorize, lock_account, set_balance};
use crate::commands::transactions::{NewTransaction, insert_with_reference, unique_reference};
use crate::config::LedgerConfig;
use crate::error::{LedgerError, Result};
use crate::models::{Caller, FundTrade, Holding, MutualFund, TradeSide, TransactionType};
use crate::money::{credited, decimal_at, ensure_within_limit, round_currency, round_units};
use crate::utils::{caller_from, maybe_print_json, parse_positive, pretty_table};
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior, params};
use rust_decimal::Decimal;
use serde_json::json;

fn fund_from_row(r: &Row<'_>) -> rusqlite::Result<MutualFund> {
    Ok(MutualFund {
        id: r.get(0)?,
        name: r.get(1)?,
        symbol: r.get(2)?,
        nav: decimal_at(r, 3)?,
        is_active: r.get(4)?,
    })
}

fn holding_from_row(r: &Row<'_>) -> rusqlite::Result<Holding> {
    Ok(Holding {
        id: r.get(0)?,
        user_id: r.get(1)?,
        account_id: r.get(2)?,
        fund_id: r.get(3)?,
        units: decimal_at(r, 4)?,
        average_nav: decimal_at(r, 5)?,
    })
}

fn trade_from_row(r: &Row<'_>) -> rusqlite::Result<FundTrade> {
    Ok(FundTrade {
        id: r.get(0)?,
        user_id: r.get(1)?,
        account_id: r.get(2)?,
        fund_id: r.get(3)?,
        side: r.get(4)?,
        nav: decimal_at(r, 5)?,
        units: decimal_at(r, 6)?,
        amount: decimal_at(r, 7)?,
        reference: r.get(8)?,
        created_at: r.get(9)?,
    })
}

pub fn find_fund(conn: &Connection, id: i64) -> Result<Option<MutualFund>> {
    Ok(conn
        .query_row(
            "SELECT id, name, symbol, nav, is_active FROM mutual_funds WHERE id=?1",
            params![id],
            fund_from_row,
        )
        .optional()?)
}

/// Any fund by id, deactivated ones included.
pub fn get_fund(conn: &Connection, fund_id: i64) -> Result<MutualFund> {
    find_fund(conn, fund_id)?.ok_or_else(|| LedgerError::NotFound("mutual fund".into()))
}

pub fn find_holding(
    conn: &Connection,
    user_id: i64,
    account_id: i64,
    fund_id: i64,
) -> Result<Option<Holding>> {
    Ok(conn
        .query_row(
            "SELECT id, user_id, account_id, fund_id, units, average_nav FROM mutual_fund_holdings
             WHERE user_id=?1 AND account_id=?2 AND fund_id=?3",
            params![user_id, account_id, fund_id],
            holding_from_row,
        )
        .optional()?)
}

fn require_admin(caller: &Caller, what: &str) -> Result<()> {
    if caller.is_admin {
        Ok(())
    } else {
        Err(LedgerError::Forbidden(format!("{} requires an administrator", what)))
    }
}

// ---- fund catalogue (administrative) ----

/// NAV at 4dp, still positive after rounding.
fn checked_nav(nav: Decimal) -> Result<Decimal> {
    ensure_within_limit(nav, "nav")?;
    let nav = round_units(nav);
    if nav <= Decimal::ZERO {
        return Err(LedgerError::InvalidRequest("nav must be at least 0.0001".into()));
    }
    Ok(nav)
}

pub fn create_fund(conn: &mut Connection, caller: &Caller, name: &str, symbol: &str, nav: Decimal) -> Result<i64> {
    require_admin(caller, "creating a fund")?;
    let name = name.trim();
    let symbol = symbol.trim().to_uppercase();
    if name.len() < 2 || symbol.len() < 2 {
        return Err(LedgerError::InvalidRequest(
            "fund name and symbol need at least 2 characters".into(),
        ));
    }
    let nav = checked_nav(nav)?;

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let exists: Option<i64> = tx
        .query_row(
            "SELECT id FROM mutual_funds WHERE symbol=?1",
            params![symbol],
            |r| r.get(0),
        )
        .optional()?;
    if exists.is_some() {
        return Err(LedgerError::InvalidRequest(format!(
            "fund symbol {} already exists",
            symbol
        )));
    }
    tx.execute(
        "INSERT INTO mutual_funds(name, symbol, nav) VALUES (?1,?2,?3)",
        params![name, symbol, nav.to_string()],
    )?;
    let fund_id = tx.last_insert_rowid();
    audit::record(
        &tx,
        &AuditEntry::new("create", "mutual_fund", fund_id, caller.user_id)
            .details(json!({ "symbol": symbol })),
    )?;
    tx.commit()?;
    tracing::info!(fund_id, %symbol, nav = %nav, "fund created");
    Ok(fund_id)
}

pub fn set_nav(conn: &mut Connection, caller: &Caller, fund_id: i64, nav: Decimal) -> Result<()> {
    require_admin(caller, "updating NAV")?;
    let nav = checked_nav(nav)?;
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    if find_fund(&tx, fund_id)?.is_none() {
        return Err(LedgerError::NotFound("fund".into()));
    }
    tx.execute(
        "UPDATE mutual_funds SET nav=?1, updated_at=strftime('%Y-%m-%dT%H:%M:%fZ','now') WHERE id=?2",
        params![nav.to_string(), fund_id],
    )?;
    audit::record(
        &tx,
        &AuditEntry::new("update", "mutual_fund", fund_id, caller.user_id)
            .details(json!({ "nav": nav.to_string() })),
    )?;
    tx.commit()?;
    tracing::info!(fund_id, nav = %nav, "fund NAV updated");
    Ok(())
}

pub fn deactivate_fund(conn: &mut Connection, caller: &Caller, fund_id: i64) -> Result<()> {
    require_admin(caller, "deactivating a fund")?;
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    if find_fund(&tx, fund_id)?.is_none() {
        return Err(LedgerError::NotFound("fund".into()));
    }
    tx.execute(
        "UPDATE mutual_funds SET is_active=0, updated_at=strftime('%Y-%m-%dT%H:%M:%fZ','now') WHERE id=?1",
        params![fund_id],
    )?;
    audit::record(&tx, &AuditEntry::new("delete", "mutual_fund", fund_id, caller.user_id))?;
    tx.commit()?;
    tracing::info!(fund_id, "fund deactivated");
    Ok(())
}

pub fn list_funds(conn: &Connection) -> Result<Vec<MutualFund>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, symbol, nav, is_active FROM mutual_funds WHERE is_active=1 ORDER BY id",
    )?;
    let rows = stmt.query_map([], fund_from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn list_holdings(conn: &Connection, caller: &Caller) -> Result<Vec<Holding>> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, account_id, fund_id, units, average_nav FROM mutual_fund_holdings
         WHERE ?1 OR user_id=?2 ORDER BY id DESC",
    )?;
    let rows = stmt.query_map(params![caller.is_admin, caller.user_id], holding_from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn list_trades(conn: &Connection, caller: &Caller) -> Result<Vec<FundTrade>> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, account_id, fund_id, trade_type, nav, units, amount, reference, created_at
         FROM mutual_fund_trades WHERE ?1 OR user_id=?2 ORDER BY created_at DESC, id DESC",
    )?;
    let rows = stmt.query_map(params![caller.is_admin, caller.user_id], trade_from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

// ---- trading ----

/// Holding after buying `units` for `amount`: cost-weighted average NAV.
/// `new_total_cost = old_units*old_avg + amount`, units and average rounded
/// to 4dp half-up. A fresh position takes the execution NAV as its average.
pub fn blend_average(existing: Option<(Decimal, Decimal)>, units: Decimal, amount: Decimal, nav: Decimal) -> (Decimal, Decimal) {
    match existing {
        None => (units, round_units(nav)),
        Some((old_units, old_avg)) => {
            let total_cost = old_units * old_avg + amount;
            let new_units = round_units(old_units + units);
            let new_avg = round_units(total_cost / new_units);
            (new_units, new_avg)
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn insert_trade(
    conn: &Connection,
    user_id: i64,
    account_id: i64,
    fund: &MutualFund,
    side: TradeSide,
    units: Decimal,
    amount: Decimal,
    reference: &str,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO mutual_fund_trades(user_id, account_id, fund_id, trade_type, nav, units, amount, reference)
         VALUES (?1,?2,?3,?4,?5,?6,?7,?8)",
        params![
            user_id,
            account_id,
            fund.id,
            side,
            fund.nav.to_string(),
            units.to_string(),
            amount.to_string(),
            reference
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Spend `amount` of the account's balance on units at the current NAV.
/// Returns the trade id.
pub fn buy(
    conn: &mut Connection,
    cfg: &LedgerConfig,
    caller: &Caller,
    account_id: i64,
    fund_id: i64,
    amount: Decimal,
) -> Result<i64> {
    buy_inner(conn, cfg, caller, account_id, fund_id, amount).inspect_err(|e| e.log("fund.buy"))
}

fn buy_inner(
    conn: &mut Connection,
    cfg: &LedgerConfig,
    caller: &Caller,
    account_id: i64,
    fund_id: i64,
    amount: Decimal,
) -> Result<i64> {
    ensure_within_limit(amount, "amount")?;
    let amount = round_currency(amount);
    if amount <= Decimal::ZERO {
        return Err(LedgerError::InvalidRequest("amount must be positive".into()));
    }

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let account = lock_account(&tx, account_id, "account")?;
    authorize(caller, &account)?;
    let fund = find_fund(&tx, fund_id)?
        .filter(|f| f.is_active)
        .ok_or_else(|| LedgerError::NotFound("mutual fund".into()))?;
    if account.balance < amount {
        return Err(LedgerError::InsufficientFunds);
    }

    let units = round_units(amount / fund.nav);
    if units <= Decimal::ZERO {
        return Err(LedgerError::InvalidRequest(format!(
            "amount {} buys no units at NAV {}",
            amount, fund.nav
        )));
    }

    set_balance(&tx, account.id, account.balance - amount)?;

    let existing = find_holding(&tx, account.user_id, account.id, fund.id)?;
    let (new_units, new_avg) = blend_average(
        existing.as_ref().map(|h| (h.units, h.average_nav)),
        units,
        amount,
        fund.nav,
    );
    match &existing {
        None => {
            tx.execute(
                "INSERT INTO mutual_fund_holdings(user_id, account_id, fund_id, units, average_nav)
                 VALUES (?1,?2,?3,?4,?5)",
                params![
                    account.user_id,
                    account.id,
                    fund.id,
                    new_units.to_string(),
                    new_avg.to_string()
                ],
            )?;
        }
        Some(h) => {
            tx.execute(
                "UPDATE mutual_fund_holdings SET units=?1, average_nav=?2,
                     updated_at=strftime('%Y-%m-%dT%H:%M:%fZ','now') WHERE id=?3",
                params![new_units.to_string(), new_avg.to_string(), h.id],
            )?;
        }
    }

    let reference = unique_reference(&tx, cfg)?;
    let trade_id = insert_trade(
        &tx,
        account.user_id,
        account.id,
        &fund,
        TradeSide::Buy,
        units,
        amount,
        &reference,
    )?;
    insert_with_reference(
        &tx,
        &NewTransaction {
            from_account_id: Some(account.id),
            to_account_id: None,
            transaction_type: TransactionType::MutualFundBuy,
            amount,
            description: format!("Mutual fund buy: {}", fund.symbol),
            external_bank_name: None,
        },
        &reference,
    )?;
    audit::record(
        &tx,
        &AuditEntry::new("buy", "mutual_fund", fund.id, caller.user_id).details(json!({
            "account_id": account.id,
            "trade_id": trade_id,
            "amount": amount.to_string(),
            "units": units.to_string(),
        })),
    )?;
    tx.commit()?;

    tracing::info!(
        trade_id,
        %reference,
        account_id = account.id,
        symbol = %fund.symbol,
        amount = %amount,
        units = %units,
        average_nav = %new_avg,
        "fund buy committed"
    );
    Ok(trade_id)
}

/// Redeem `units` at the current NAV into the account. Average NAV is left
/// untouched; a holding that reaches zero units is removed. Returns the trade id.
pub fn sell(
    conn: &mut Connection,
    cfg: &LedgerConfig,
    caller: &Caller,
    account_id: i64,
    fund_id: i64,
    units: Decimal,
) -> Result<i64> {
    sell_inner(conn, cfg, caller, account_id, fund_id, units).inspect_err(|e| e.log("fund.sell"))
}

fn sell_inner(
    conn: &mut Connection,
    cfg: &LedgerConfig,
    caller: &Caller,
    account_id: i64,
    fund_id: i64,
    units: Decimal,
) -> Result<i64> {
    if units <= Decimal::ZERO {
        return Err(LedgerError::InvalidRequest("units must be positive".into()));
    }

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let account = lock_account(&tx, account_id, "account")?;
    authorize(caller, &account)?;
    // Inactive funds remain sellable.
    let fund = find_fund(&tx, fund_id)?.ok_or_else(|| LedgerError::NotFound("mutual fund".into()))?;

    let holding = match find_holding(&tx, account.user_id, account.id, fund.id)? {
        Some(h) if h.units >= units => h,
        _ => return Err(LedgerError::InsufficientHolding),
    };

    let units = round_units(units);
    let amount = units
        .checked_mul(fund.nav)
        .map(round_currency)
        .ok_or_else(|| LedgerError::InvalidRequest("sale proceeds out of range".into()))?;
    if amount <= Decimal::ZERO {
        return Err(LedgerError::InvalidRequest(format!(
            "{} units at NAV {} realise nothing",
            units, fund.nav
        )));
    }

    let remaining = round_units(holding.units - units);
    if remaining <= Decimal::ZERO {
        tx.execute(
            "DELETE FROM mutual_fund_holdings WHERE id=?1",
            params![holding.id],
        )?;
    } else {
        tx.execute(
            "UPDATE mutual_fund_holdings SET units=?1,
                 updated_at=strftime('%Y-%m-%dT%H:%M:%fZ','now') WHERE id=?2",
            params![remaining.to_string(), holding.id],
        )?;
    }

    set_balance(&tx, account.id, credited(account.balance, amount)?)?;

    let reference = unique_reference(&tx, cfg)?;
    let trade_id = insert_trade(
        &tx,
        account.user_id,
        account.id,
        &fund,
        TradeSide::Sell,
        units,
        amount,
        &reference,
    )?;
    insert_with_reference(
        &tx,
        &NewTransaction {
            from_account_id: None,
            to_account_id: Some(account.id),
            transaction_type: TransactionType::MutualFundSell,
            amount,
            description: format!("Mutual fund sell: {}", fund.symbol),
            external_bank_name: None,
        },
        &reference,
    )?;
    audit::record(
        &tx,
        &AuditEntry::new("sell", "mutual_fund", fund.id, caller.user_id).details(json!({
            "account_id": account.id,
            "trade_id": trade_id,
            "amount": amount.to_string(),
            "units": units.to_string(),
        })),
    )?;
    tx.commit()?;

    tracing::info!(
        trade_id,
        %reference,
        account_id = account.id,
        symbol = %fund.symbol,
        amount = %amount,
        units = %units,
        remaining = %remaining.max(Decimal::ZERO),
        "fund sell committed"
    );
    Ok(trade_id)
}

pub fn handle(conn: &mut Connection, cfg: &LedgerConfig, m: &clap::ArgMatches) -> anyhow::Result<()> {
    let caller = caller_from(m)?;
    match m.subcommand() {
        Some(("add", sub)) => {
            let symbol = sub.get_one::<String>("symbol").unwrap();
            let nav = parse_positive(sub.get_one::<String>("nav").unwrap(), "nav")?;
            let id = create_fund(conn, &caller, sub.get_one::<String>("name").unwrap(), symbol, nav)?;
            println!("Added fund {} (id {}) at NAV {}", symbol.trim().to_uppercase(), id, nav);
        }
        Some(("list", sub)) => {
            let funds = list_funds(conn)?;
            if !maybe_print_json(sub.get_flag("json"), &funds)? {
                let rows = funds
                    .iter()
                    .map(|f| vec![f.id.to_string(), f.symbol.clone(), f.name.clone(), format!("{:.4}", f.nav)])
                    .collect();
                println!("{}", pretty_table(&["ID", "Symbol", "Name", "NAV"], rows));
            }
        }
        Some(("show", sub)) => {
            let fund = get_fund(conn, *sub.get_one::<i64>("id").unwrap())?;
            if !maybe_print_json(sub.get_flag("json"), &fund)? {
                println!(
                    "{}",
                    pretty_table(
                        &["Field", "Value"],
                        vec![
                            vec!["Symbol".into(), fund.symbol.clone()],
                            vec!["Name".into(), fund.name.clone()],
                            vec!["NAV".into(), format!("{:.4}", fund.nav)],
                            vec![
                                "Status".into(),
                                (if fund.is_active { "active" } else { "inactive" }).into(),
                            ],
                        ],
                    )
                );
            }
        }
        Some(("set-nav", sub)) => {
            let id = *sub.get_one::<i64>("id").unwrap();
            let nav = parse_positive(sub.get_one::<String>("nav").unwrap(), "nav")?;
            set_nav(conn, &caller, id, nav)?;
            println!("Fund {} NAV set to {}", id, round_units(nav));
        }
        Some(("deactivate", sub)) => {
            let id = *sub.get_one::<i64>("id").unwrap();
            deactivate_fund(conn, &caller, id)?;
            println!("Fund {} deactivated", id);
        }
        Some(("buy", sub)) => {
            let amount = parse_positive(sub.get_one::<String>("amount").unwrap(), "amount")?;
            let trade_id = buy(
                conn,
                cfg,
                &caller,
                *sub.get_one::<i64>("account").unwrap(),
                *sub.get_one::<i64>("fund").unwrap(),
                amount,
            )?;
            println!("Mutual fund purchased (trade {})", trade_id);
        }
        Some(("sell", sub)) => {
            let units = parse_positive(sub.get_one::<String>("units").unwrap(), "units")?;
            let trade_id = sell(
                conn,
                cfg,
                &caller,
                *sub.get_one::<i64>("account").unwrap(),
                *sub.get_one::<i64>("fund").unwrap(),
                units,
            )?;
            println!("Mutual fund sold (trade {})", trade_id);
        }
        Some(("holdings", sub)) => {
            let data = list_holdings(conn, &caller)?;
            if !maybe_print_json(sub.get_flag("json"), &data)? {
                let rows = data
                    .iter()
                    .map(|h| {
                        vec![
                            h.account_id.to_string(),
                            h.fund_id.to_string(),
                            format!("{:.4}", h.units),
                            format!("{:.4}", h.average_nav),
                            format!("{:.2}", h.units * h.average_nav),
                        ]
                    })
                    .collect();
                println!(
                    "{}",
                    pretty_table(&["Account", "Fund", "Units", "Avg NAV", "Cost"], rows)
                );
            }
        }
        Some(("trades", sub)) => {
            let data = list_trades(conn, &caller)?;
            if !maybe_print_json(sub.get_flag("json"), &data)? {
                let rows = data
                    .iter()
                    .map(|t| {
                        vec![
                            t.created_at.clone(),
                            t.reference.clone(),
                            t.side.to_string(),
                            t.account_id.to_string(),
                            t.fund_id.to_string(),
                            format!("{:.4}", t.units),
                            format!("{:.4}", t.nav),
                            format!("{:.2}", t.amount),
                        ]
                    })
                    .collect();
                println!(
                    "{}",
                    pretty_table(
                        &["When", "Reference", "Side", "Account", "Fund", "Units", "NAV", "Amount"],
                        rows
                    )
                );
            }
        }
        _ => {}
    }
    Ok(())
}
