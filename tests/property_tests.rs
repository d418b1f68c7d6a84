// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

mod common;

use chrono::NaiveDate;
use common::*;
use ledgercore::commands::deposits::{self, NewDeposit};
use ledgercore::commands::funds;
use ledgercore::commands::transfers::{TransferRequest, transfer};
use ledgercore::error::LedgerError;
use ledgercore::models::{Caller, DepositType};
use proptest::prelude::*;
use rust_decimal::Decimal;

fn cents(v: i64) -> Decimal {
    Decimal::new(v, 2)
}

#[derive(Debug, Clone)]
enum Op {
    Transfer { from: usize, to: usize, amount: i64 },
    Buy { account: usize, amount: i64 },
    Deposit { account: usize, amount: i64 },
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0usize..3, 0usize..3, 1i64..30_000).prop_map(|(from, to, amount)| Op::Transfer { from, to, amount }),
        (0usize..3, 1i64..30_000).prop_map(|(account, amount)| Op::Buy { account, amount }),
        (0usize..3, 1i64..30_000).prop_map(|(account, amount)| Op::Deposit { account, amount }),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 64,
        ..ProptestConfig::default()
    })]

    /// Internal transfers never create or destroy money and never leave a
    /// balance below zero, whatever mix of them succeeds.
    #[test]
    fn internal_transfers_conserve_money(
        opening in prop::collection::vec(0i64..500_000, 3),
        moves in prop::collection::vec((0usize..3, 0usize..3, 1i64..300_000), 1..25)
    ) {
        let mut conn = base_conn();
        let ids: Vec<i64> = opening
            .iter()
            .map(|c| account(&mut conn, 10, cents(*c)))
            .collect();
        let total: Decimal = opening.iter().map(|c| cents(*c)).sum();

        for (from, to, amount) in moves {
            let before: Vec<Decimal> = ids.iter().map(|id| balance(&conn, *id)).collect();
            let res = transfer(&mut conn, &cfg(), &Caller::user(10), &TransferRequest {
                from_account_id: ids[from],
                to_account_id: Some(ids[to]),
                external_bank_name: None,
                amount: cents(amount),
                description: String::new(),
            });
            match res {
                Ok(_) => {
                    prop_assert_ne!(from, to);
                    prop_assert_eq!(balance(&conn, ids[from]), before[from] - cents(amount));
                }
                Err(LedgerError::Forbidden(_)) => {
                    prop_assert_eq!(from, to);
                }
                Err(LedgerError::InsufficientFunds) => {
                    prop_assert!(before[from] < cents(amount));
                }
                Err(other) => {
                    prop_assert!(false, "unexpected error: {}", other);
                }
            }
            for id in &ids {
                prop_assert!(balance(&conn, *id) >= Decimal::ZERO);
            }
        }

        let after: Decimal = ids.iter().map(|id| balance(&conn, *id)).sum();
        prop_assert_eq!(after, total);
    }

    /// Held units track bought minus sold units exactly and never go negative.
    #[test]
    fn holdings_follow_trades(
        trades in prop::collection::vec((any::<bool>(), 1i64..50_000), 1..20)
    ) {
        let mut conn = base_conn();
        let acct = account(&mut conn, 10, cents(10_000_000));
        let f = fund(&mut conn, "PRP", Decimal::new(125, 1));
        let me = Caller::user(10);
        let mut held = Decimal::ZERO;

        for (is_buy, raw) in trades {
            if is_buy {
                let trade = funds::buy(&mut conn, &cfg(), &me, acct, f, cents(raw)).unwrap();
                let units = funds::list_trades(&conn, &me)
                    .unwrap()
                    .into_iter()
                    .find(|t| t.id == trade)
                    .map(|t| t.units)
                    .unwrap();
                held += units;
            } else {
                let units = Decimal::new(raw, 3);
                match funds::sell(&mut conn, &cfg(), &me, acct, f, units) {
                    Ok(_) => held -= units,
                    Err(LedgerError::InsufficientHolding) => {
                        prop_assert!(held < units);
                    }
                    Err(other) => {
                        prop_assert!(false, "unexpected error: {}", other);
                    }
                }
            }
            let stored = funds::find_holding(&conn, 10, acct, f)
                .unwrap()
                .map(|h| h.units)
                .unwrap_or(Decimal::ZERO);
            prop_assert_eq!(stored, held);
            prop_assert!(stored >= Decimal::ZERO);
            prop_assert!(balance(&conn, acct) >= Decimal::ZERO);
        }
    }

    /// Money leaving an account through transfers, fund purchases or new
    /// deposits is always accounted for elsewhere, and no balance dips
    /// below zero however the operations interleave.
    #[test]
    fn mixed_operations_account_for_every_cent(
        opening in prop::collection::vec(0i64..50_000, 3),
        ops in prop::collection::vec(op(), 1..30)
    ) {
        let mut conn = base_conn();
        let ids: Vec<i64> = opening
            .iter()
            .map(|c| account(&mut conn, 10, cents(*c)))
            .collect();
        let f = fund(&mut conn, "MIX", Decimal::new(125, 1));
        let me = Caller::user(10);
        let today = NaiveDate::from_ymd_opt(2025, 5, 1).unwrap();
        let total: Decimal = opening.iter().map(|c| cents(*c)).sum();

        for op in ops {
            let (source, amount, res) = match op {
                Op::Transfer { from, to, amount } => {
                    let res = transfer(&mut conn, &cfg(), &me, &TransferRequest {
                        from_account_id: ids[from],
                        to_account_id: Some(ids[to]),
                        external_bank_name: None,
                        amount: cents(amount),
                        description: String::new(),
                    }).map(|_| ());
                    if from == to {
                        prop_assert!(matches!(res, Err(LedgerError::Forbidden(_))));
                        continue;
                    }
                    (from, amount, res)
                }
                Op::Buy { account, amount } => {
                    let res = funds::buy(&mut conn, &cfg(), &me, ids[account], f, cents(amount)).map(|_| ());
                    (account, amount, res)
                }
                Op::Deposit { account, amount } => {
                    let res = deposits::create_on(&mut conn, &cfg(), &me, &NewDeposit {
                        account_id: ids[account],
                        deposit_type: DepositType::Fixed,
                        term_months: 12,
                        amount: cents(amount),
                        interest_rate: Decimal::new(5, 0),
                    }, today).map(|_| ());
                    (account, amount, res)
                }
            };
            match res {
                Ok(()) => {}
                Err(LedgerError::InsufficientFunds) => {
                    prop_assert!(balance(&conn, ids[source]) < cents(amount));
                }
                Err(other) => {
                    prop_assert!(false, "unexpected error: {}", other);
                }
            }

            let balances: Decimal = ids.iter().map(|id| balance(&conn, *id)).sum();
            let locked: Decimal = deposits::list(&conn, &ADMIN, None)
                .unwrap()
                .iter()
                .map(|d| d.amount)
                .sum();
            let invested: Decimal = funds::list_trades(&conn, &ADMIN)
                .unwrap()
                .iter()
                .map(|t| t.amount)
                .sum();
            for id in &ids {
                prop_assert!(balance(&conn, *id) >= Decimal::ZERO);
            }
            prop_assert_eq!(balances + locked + invested, total);
        }
    }
}
