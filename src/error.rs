// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Error taxonomy shared by every ledger operation.

use rusqlite::ErrorCode;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, LedgerError>;

#[derive(Error, Debug)]
pub enum LedgerError {
    /// Missing, soft-deleted or inactive entity
    #[error("{0} not found")]
    NotFound(String),

    #[error("insufficient permissions: {0}")]
    Forbidden(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("insufficient account balance")]
    InsufficientFunds,

    #[error("insufficient holding units")]
    InsufficientHolding,

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("failed to generate a unique {what} after {attempts} attempts")]
    GenerationExhausted { what: &'static str, attempts: u32 },

    /// The write lock could not be taken within the configured busy timeout.
    #[error("store is busy, retry the operation")]
    Busy,

    #[error("internal error: {0}")]
    Internal(String),

    #[error("database error: {0}")]
    Database(rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<rusqlite::Error> for LedgerError {
    fn from(err: rusqlite::Error) -> Self {
        match err.sqlite_error_code() {
            Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked) => LedgerError::Busy,
            _ => LedgerError::Database(err),
        }
    }
}

impl LedgerError {
    /// Stable machine-readable kind.
    pub fn kind(&self) -> &'static str {
        match self {
            LedgerError::NotFound(_) => "not_found",
            LedgerError::Forbidden(_) => "forbidden",
            LedgerError::InvalidRequest(_) => "invalid_request",
            LedgerError::InsufficientFunds => "insufficient_funds",
            LedgerError::InsufficientHolding => "insufficient_holding",
            LedgerError::InvalidState(_) => "invalid_state",
            LedgerError::GenerationExhausted { .. } => "generation_exhausted",
            LedgerError::Busy => "busy",
            LedgerError::Internal(_)
            | LedgerError::Database(_)
            | LedgerError::Serialization(_) => "internal",
        }
    }

    /// HTTP-style status a request layer should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            LedgerError::NotFound(_) => 404,
            LedgerError::Forbidden(_) => 403,
            LedgerError::InvalidRequest(_)
            | LedgerError::InsufficientFunds
            | LedgerError::InsufficientHolding => 400,
            LedgerError::InvalidState(_) => 409,
            LedgerError::Busy => 503,
            _ => 500,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::Busy)
    }

    pub fn is_internal(&self) -> bool {
        self.kind() == "internal" || matches!(self, LedgerError::GenerationExhausted { .. })
    }

    /// Message safe to hand back to a caller. Internal faults never leak
    /// statement text or store details.
    pub fn public_message(&self) -> String {
        if self.is_internal() {
            "internal error".to_string()
        } else {
            self.to_string()
        }
    }

    /// Log a failed operation. Business rejections are warnings; faults carry
    /// their full detail at error level.
    pub fn log(&self, operation: &str) {
        if self.is_internal() {
            tracing::error!(operation, kind = self.kind(), error = %self, "operation failed");
        } else {
            tracing::warn!(operation, kind = self.kind(), reason = %self, "operation rejected");
        }
    }
}
