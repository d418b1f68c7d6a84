// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Append-only audit trail. Rows are written on the same connection (and
//! therefore the same open transaction) as the mutation they document. There
//! is no update or delete path.

use crate::error::Result;
use rusqlite::{Connection, params};
use serde_json::Value;

#[derive(Debug, Clone)]
pub struct AuditEntry<'a> {
    pub action: &'a str,
    pub entity: &'a str,
    pub entity_id: Option<i64>,
    pub user_id: Option<i64>,
    pub details: Value,
}

impl<'a> AuditEntry<'a> {
    pub fn new(action: &'a str, entity: &'a str, entity_id: i64, user_id: i64) -> Self {
        Self {
            action,
            entity,
            entity_id: Some(entity_id),
            user_id: Some(user_id),
            details: Value::Object(Default::default()),
        }
    }

    pub fn details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }
}

pub fn record(conn: &Connection, entry: &AuditEntry<'_>) -> Result<i64> {
    let details = serde_json::to_string(&entry.details)?;
    conn.execute(
        "INSERT INTO audit_logs(user_id, action, entity, entity_id, details) VALUES (?1,?2,?3,?4,?5)",
        params![entry.user_id, entry.action, entry.entity, entry.entity_id, details],
    )?;
    Ok(conn.last_insert_rowid())
}
