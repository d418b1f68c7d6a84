// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::ToSql;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("unknown {kind} '{value}'")]
pub struct ParseKindError {
    kind: &'static str,
    value: String,
}

/// Text-backed enums: one spelling shared by serde, SQLite and the CLI.
macro_rules! text_enum {
    ($name:ident, $label:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ParseKindError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $($text => Ok($name::$variant),)+
                    other => Err(ParseKindError { kind: $label, value: other.to_string() }),
                }
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse()
                    .map_err(|e| FromSqlError::Other(Box::new(e)))
            }
        }
    };
}

text_enum!(AccountType, "account type", {
    Savings => "savings",
    Current => "current",
    FixedDeposit => "fixed_deposit",
});

text_enum!(TransactionType, "transaction type", {
    Transfer => "transfer",
    MutualFundBuy => "mutual_fund_buy",
    MutualFundSell => "mutual_fund_sell",
    DepositCreate => "deposit_create",
    DepositCancel => "deposit_cancel",
    Adjustment => "adjustment",
});

text_enum!(TransactionStatus, "transaction status", {
    Success => "success",
    Failed => "failed",
    Pending => "pending",
});

text_enum!(TradeSide, "trade side", {
    Buy => "buy",
    Sell => "sell",
});

text_enum!(DepositType, "deposit type", {
    Fixed => "fixed",
    Recurring => "recurring",
});

text_enum!(DepositStatus, "deposit status", {
    Active => "active",
    Cancelled => "cancelled",
    Matured => "matured",
});

/// Identity resolved by the session layer in front of the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub user_id: i64,
    pub is_admin: bool,
}

impl Caller {
    pub fn user(user_id: i64) -> Self {
        Self {
            user_id,
            is_admin: false,
        }
    }

    pub fn admin(user_id: i64) -> Self {
        Self {
            user_id,
            is_admin: true,
        }
    }

    pub fn can_access(&self, owner_id: i64) -> bool {
        self.is_admin || self.user_id == owner_id
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: i64,
    pub account_number: String,
    pub user_id: i64,
    pub account_type: AccountType,
    pub bank_name: String,
    pub balance: Decimal,
    pub is_active: bool,
    pub is_deleted: bool,
    pub created_at: String,
}

impl Account {
    /// Open for mutation: not soft-deleted and not deactivated.
    pub fn is_open(&self) -> bool {
        self.is_active && !self.is_deleted
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: i64,
    pub from_account_id: Option<i64>,
    pub to_account_id: Option<i64>,
    pub transaction_type: TransactionType,
    pub amount: Decimal,
    pub description: String,
    pub external_bank_name: Option<String>,
    pub status: TransactionStatus,
    pub reference: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MutualFund {
    pub id: i64,
    pub name: String,
    pub symbol: String,
    pub nav: Decimal,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Holding {
    pub id: i64,
    pub user_id: i64,
    pub account_id: i64,
    pub fund_id: i64,
    pub units: Decimal,
    pub average_nav: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundTrade {
    pub id: i64,
    pub user_id: i64,
    pub account_id: i64,
    pub fund_id: i64,
    pub side: TradeSide,
    pub nav: Decimal,
    pub units: Decimal,
    pub amount: Decimal,
    pub reference: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deposit {
    pub id: i64,
    pub account_id: i64,
    pub deposit_type: DepositType,
    pub term_months: u32,
    pub amount: Decimal,
    pub interest_rate: Decimal,
    pub status: DepositStatus,
    pub start_date: NaiveDate,
    pub maturity_date: NaiveDate,
    pub penalty_amount: Decimal,
    pub cancelled_at: Option<DateTime<Utc>>,
}
