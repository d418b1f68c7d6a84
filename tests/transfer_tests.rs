// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

mod common;

use common::*;
use ledgercore::commands::accounts;
use ledgercore::commands::transactions::{self, TransactionFilter};
use ledgercore::commands::transfers::{TransferRequest, transfer};
use ledgercore::config::LedgerConfig;
use ledgercore::error::LedgerError;
use ledgercore::models::{AccountType, Caller, TransactionType};
use ledgercore::money::MAX_AMOUNT;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn internal(from: i64, to: i64, amount: Decimal) -> TransferRequest {
    TransferRequest {
        from_account_id: from,
        to_account_id: Some(to),
        external_bank_name: None,
        amount,
        description: "rent".into(),
    }
}

#[test]
fn internal_transfer_moves_money_and_records_everything() {
    let mut conn = base_conn();
    let a = account(&mut conn, 10, dec!(5000.00));
    let b = account(&mut conn, 20, dec!(1000.00));

    let id = transfer(&mut conn, &cfg(), &Caller::user(10), &internal(a, b, dec!(500.00))).unwrap();

    assert_eq!(balance(&conn, a), dec!(4500.00));
    assert_eq!(balance(&conn, b), dec!(1500.00));

    let txn = transactions::get(&conn, &Caller::user(20), id).unwrap();
    assert_eq!(txn.transaction_type, TransactionType::Transfer);
    assert_eq!(txn.amount, dec!(500.00));
    assert_eq!(txn.from_account_id, Some(a));
    assert_eq!(txn.to_account_id, Some(b));
    assert!(txn.reference.starts_with("TXN"));
    assert_eq!(txn.reference.len(), 15);
    assert_eq!(audit_actions(&conn).last().map(String::as_str), Some("transfer"));
}

#[test]
fn external_transfer_only_debits() {
    let mut conn = base_conn();
    let a = account(&mut conn, 10, dec!(300.00));
    let req = TransferRequest {
        from_account_id: a,
        to_account_id: None,
        external_bank_name: Some(" Other Bank ".into()),
        amount: dec!(120.50),
        description: String::new(),
    };
    let id = transfer(&mut conn, &cfg(), &Caller::user(10), &req).unwrap();

    assert_eq!(balance(&conn, a), dec!(179.50));
    let txn = transactions::get(&conn, &Caller::user(10), id).unwrap();
    assert_eq!(txn.to_account_id, None);
    assert_eq!(txn.external_bank_name.as_deref(), Some("Other Bank"));
}

#[test]
fn transfer_can_drain_to_exactly_zero() {
    let mut conn = base_conn();
    let a = account(&mut conn, 10, dec!(75.25));
    let b = account(&mut conn, 10, dec!(0));
    transfer(&mut conn, &cfg(), &Caller::user(10), &internal(a, b, dec!(75.25))).unwrap();
    assert_eq!(balance(&conn, a), dec!(0));
    assert_eq!(balance(&conn, b), dec!(75.25));
}

#[test]
fn overdraft_is_rejected_without_side_effects() {
    let mut conn = base_conn();
    let a = account(&mut conn, 10, dec!(100.00));
    let b = account(&mut conn, 20, dec!(0));
    let txns = count(&conn, "transactions");
    let audits = count(&conn, "audit_logs");

    let err = transfer(&mut conn, &cfg(), &Caller::user(10), &internal(a, b, dec!(100.01))).unwrap_err();
    assert!(matches!(err, LedgerError::InsufficientFunds));
    assert_eq!(balance(&conn, a), dec!(100.00));
    assert_eq!(balance(&conn, b), dec!(0));
    assert_eq!(count(&conn, "transactions"), txns);
    assert_eq!(count(&conn, "audit_logs"), audits);
}

#[test]
fn foreign_source_account_is_forbidden() {
    let mut conn = base_conn();
    let a = account(&mut conn, 10, dec!(100.00));
    let b = account(&mut conn, 20, dec!(100.00));
    let err = transfer(&mut conn, &cfg(), &Caller::user(20), &internal(a, b, dec!(1))).unwrap_err();
    assert!(matches!(err, LedgerError::Forbidden(_)));
    assert_eq!(err.status_code(), 403);

    // administrators act on any account
    transfer(&mut conn, &cfg(), &ADMIN, &internal(a, b, dec!(1))).unwrap();
    assert_eq!(balance(&conn, b), dec!(101.00));
}

#[test]
fn closed_accounts_are_not_found() {
    let mut conn = base_conn();
    let a = account(&mut conn, 10, dec!(100.00));
    let b = account(&mut conn, 20, dec!(100.00));
    let c = account(&mut conn, 20, dec!(100.00));

    accounts::soft_delete(&mut conn, &Caller::user(20), b).unwrap();
    let err = transfer(&mut conn, &cfg(), &Caller::user(10), &internal(a, b, dec!(1))).unwrap_err();
    assert!(matches!(err, LedgerError::NotFound(_)));

    accounts::update(
        &mut conn,
        &Caller::user(20),
        c,
        &accounts::AccountPatch {
            is_active: Some(false),
            ..Default::default()
        },
    )
    .unwrap();
    let err = transfer(&mut conn, &cfg(), &Caller::user(10), &internal(a, c, dec!(1))).unwrap_err();
    assert!(matches!(err, LedgerError::NotFound(_)));
    assert_eq!(balance(&conn, a), dec!(100.00));
}

#[test]
fn audit_failure_rolls_back_the_transfer() {
    let mut conn = base_conn();
    let a = account(&mut conn, 10, dec!(500.00));
    let b = account(&mut conn, 20, dec!(0));
    let txns = count(&conn, "transactions");
    break_audit_sink(&conn);

    let err = transfer(&mut conn, &cfg(), &Caller::user(10), &internal(a, b, dec!(200))).unwrap_err();
    assert!(err.is_internal());
    assert_eq!(err.public_message(), "internal error");
    assert_eq!(balance(&conn, a), dec!(500.00));
    assert_eq!(balance(&conn, b), dec!(0));
    assert_eq!(count(&conn, "transactions"), txns);
}

#[test]
fn exhausted_reference_budget_rolls_back() {
    let mut conn = base_conn();
    let a = account(&mut conn, 10, dec!(500.00));
    let b = account(&mut conn, 20, dec!(0));
    let starved = LedgerConfig {
        reference_attempts: 0,
        ..cfg()
    };

    let err = transfer(&mut conn, &starved, &Caller::user(10), &internal(a, b, dec!(50))).unwrap_err();
    assert!(matches!(err, LedgerError::GenerationExhausted { .. }));
    assert_eq!(balance(&conn, a), dec!(500.00));
    assert_eq!(balance(&conn, b), dec!(0));
}

#[test]
fn ledger_listing_is_scoped_to_the_caller() {
    let mut conn = base_conn();
    let a = account(&mut conn, 10, dec!(500.00));
    let b = account(&mut conn, 20, dec!(0));
    let c = account(&mut conn, 30, dec!(50.00));
    transfer(&mut conn, &cfg(), &Caller::user(10), &internal(a, b, dec!(10))).unwrap();
    transfer(&mut conn, &cfg(), &Caller::user(10), &internal(a, b, dec!(250))).unwrap();

    let mine = transactions::list(&conn, &Caller::user(20), &TransactionFilter::default()).unwrap();
    assert_eq!(mine.len(), 2);

    let big = transactions::list(
        &conn,
        &Caller::user(20),
        &TransactionFilter {
            min_amount: Some(dec!(100)),
            ..Default::default()
        },
    )
    .unwrap();
    assert_eq!(big.len(), 1);
    assert_eq!(big[0].amount, dec!(250.00));

    let theirs = transactions::list(&conn, &Caller::user(30), &TransactionFilter::default()).unwrap();
    assert!(theirs.iter().all(|t| t.to_account_id == Some(c)));
    let first = mine[0].id;
    assert!(matches!(
        transactions::get(&conn, &Caller::user(30), first),
        Err(LedgerError::Forbidden(_))
    ));
}

#[test]
fn amounts_past_the_column_limit_are_refused() {
    let mut conn = base_conn();
    let huge = dec!(40000000000000000000000000000);

    let err = accounts::open(
        &mut conn,
        &cfg(),
        &Caller::user(10),
        &accounts::NewAccount {
            user_id: 10,
            account_type: AccountType::Savings,
            initial_deposit: huge,
        },
    )
    .unwrap_err();
    assert!(matches!(err, LedgerError::InvalidRequest(_)));

    let a = account(&mut conn, 10, dec!(100.00));
    let b = account(&mut conn, 20, dec!(100.00));
    let err = transfer(&mut conn, &cfg(), &Caller::user(10), &internal(a, b, huge)).unwrap_err();
    assert!(matches!(err, LedgerError::InvalidRequest(_)));
    assert_eq!(balance(&conn, a), dec!(100.00));
    assert_eq!(balance(&conn, b), dec!(100.00));
}

#[test]
fn credit_past_the_limit_leaves_both_sides_untouched() {
    let mut conn = base_conn();
    let a = account(&mut conn, 10, MAX_AMOUNT);
    let b = account(&mut conn, 20, MAX_AMOUNT);
    let before = count(&conn, "transactions");

    let err = transfer(&mut conn, &cfg(), &Caller::user(10), &internal(a, b, MAX_AMOUNT)).unwrap_err();

    assert!(matches!(err, LedgerError::InvalidRequest(_)));
    assert_eq!(balance(&conn, a), MAX_AMOUNT);
    assert_eq!(balance(&conn, b), MAX_AMOUNT);
    assert_eq!(count(&conn, "transactions"), before);
}
