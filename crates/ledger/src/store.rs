//! Signature rows

use std::str::FromStr;

use chrono::{DateTime, Utc};
use esign_core::{
    Invalidation, OriginMeta, Signature, SignatureId, SignatureMethod, SignerSnapshot, UserId,
};
use esign_store::time::{from_db, opt_from_db, to_db};
use esign_store::StoreError;
use rusqlite::types::ValueRef;
use rusqlite::{params, Connection, OptionalExtension, Row};

const TABLE: &str = "signatures";

const COLUMNS: &str = "id, digest, entity_type, entity_id, action, signer_id, signer_full_name,
    signer_role, meaning, reason, method, ip_address, user_agent, signed_at, is_valid,
    invalidated_by, invalidated_at, invalidation_reason";

/// Raw column values, decoded outside the rusqlite row callback
struct SignatureRow {
    id: i64,
    digest: String,
    entity_type: String,
    entity_id: i64,
    action: String,
    signer_id: i64,
    signer_full_name: String,
    signer_role: String,
    meaning: String,
    reason: Option<String>,
    method: String,
    ip_address: Option<String>,
    user_agent: Option<String>,
    signed_at: String,
    is_valid: bool,
    invalidated_by: Option<i64>,
    invalidated_at: Option<String>,
    invalidation_reason: Option<String>,
}

impl SignatureRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            digest: row.get(1)?,
            entity_type: row.get(2)?,
            entity_id: row.get(3)?,
            action: row.get(4)?,
            signer_id: row.get(5)?,
            signer_full_name: row.get(6)?,
            signer_role: row.get(7)?,
            meaning: row.get(8)?,
            reason: row.get(9)?,
            method: row.get(10)?,
            ip_address: row.get(11)?,
            user_agent: row.get(12)?,
            signed_at: row.get(13)?,
            is_valid: row.get(14)?,
            invalidated_by: row.get(15)?,
            invalidated_at: row.get(16)?,
            invalidation_reason: row.get(17)?,
        })
    }

    fn decode(self) -> Result<Signature, StoreError> {
        let method = SignatureMethod::from_str(&self.method)
            .map_err(|_| StoreError::corrupt(TABLE, format!("unknown method {}", self.method)))?;
        let signed_at = from_db(TABLE, &self.signed_at)?;
        let invalidated_at = opt_from_db(TABLE, self.invalidated_at)?;

        let invalidation = match (self.invalidated_by, invalidated_at) {
            (Some(by), Some(at)) => Some(Invalidation {
                invalidated_by: by,
                invalidated_at: at,
                reason: self.invalidation_reason.unwrap_or_default(),
            }),
            _ => None,
        };

        Ok(Signature {
            id: self.id,
            digest: self.digest,
            entity_type: self.entity_type,
            entity_id: self.entity_id,
            action: self.action,
            signer_id: self.signer_id,
            signer: SignerSnapshot {
                full_name: self.signer_full_name,
                role: self.signer_role,
            },
            meaning: self.meaning,
            reason: self.reason,
            method,
            origin: OriginMeta {
                ip_address: self.ip_address,
                user_agent: self.user_agent,
            },
            signed_at,
            is_valid: self.is_valid,
            invalidation,
        })
    }
}

/// The signed columns of a row, read without any decoding that could fail
///
/// Used by verification, which has to report on rows that no longer decode
/// into a `Signature`.
#[derive(Debug, Clone)]
pub struct IntegrityRow {
    pub digest: String,
    pub entity_type: String,
    /// `None` when the column no longer holds an integer
    pub entity_id: Option<i64>,
    pub action: String,
    pub signer_id: Option<i64>,
    pub signed_at: String,
    pub is_valid: bool,
}

fn lenient_text(row: &Row<'_>, idx: usize) -> rusqlite::Result<String> {
    Ok(match row.get_ref(idx)? {
        ValueRef::Null => String::new(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) => f.to_string(),
        ValueRef::Text(t) => String::from_utf8_lossy(t).into_owned(),
        ValueRef::Blob(b) => hex::encode(b),
    })
}

fn lenient_integer(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<i64>> {
    Ok(match row.get_ref(idx)? {
        ValueRef::Integer(i) => Some(i),
        _ => None,
    })
}

pub fn get_integrity(
    conn: &Connection,
    id: SignatureId,
) -> Result<Option<IntegrityRow>, StoreError> {
    let row = conn
        .query_row(
            "SELECT digest, entity_type, entity_id, action, signer_id, signed_at, is_valid
             FROM signatures WHERE id = ?1",
            params![id],
            |row| {
                Ok(IntegrityRow {
                    digest: lenient_text(row, 0)?,
                    entity_type: lenient_text(row, 1)?,
                    entity_id: lenient_integer(row, 2)?,
                    action: lenient_text(row, 3)?,
                    signer_id: lenient_integer(row, 4)?,
                    signed_at: lenient_text(row, 5)?,
                    is_valid: lenient_integer(row, 6)? == Some(1),
                })
            },
        )
        .optional()?;
    Ok(row)
}

/// Insert a fully-formed signature (id ignored) and return its row id
pub fn insert(conn: &Connection, sig: &Signature) -> Result<SignatureId, StoreError> {
    conn.execute(
        "INSERT INTO signatures (digest, entity_type, entity_id, action, signer_id,
            signer_full_name, signer_role, meaning, reason, method, ip_address, user_agent,
            signed_at, is_valid)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, 1)",
        params![
            sig.digest,
            sig.entity_type,
            sig.entity_id,
            sig.action,
            sig.signer_id,
            sig.signer.full_name,
            sig.signer.role,
            sig.meaning,
            sig.reason,
            sig.method.to_string(),
            sig.origin.ip_address,
            sig.origin.user_agent,
            to_db(&sig.signed_at),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn digest_exists(conn: &Connection, digest: &str) -> Result<bool, StoreError> {
    let found = conn
        .query_row(
            "SELECT 1 FROM signatures WHERE digest = ?1",
            params![digest],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

pub fn get(conn: &Connection, id: SignatureId) -> Result<Option<Signature>, StoreError> {
    let sql = format!("SELECT {} FROM signatures WHERE id = ?1", COLUMNS);
    let row = conn
        .query_row(&sql, params![id], SignatureRow::from_row)
        .optional()?;
    row.map(SignatureRow::decode).transpose()
}

/// All signatures on an entity, newest first
pub fn list_for_entity(
    conn: &Connection,
    entity_type: &str,
    entity_id: i64,
) -> Result<Vec<Signature>, StoreError> {
    let sql = format!(
        "SELECT {} FROM signatures WHERE entity_type = ?1 AND entity_id = ?2
         ORDER BY signed_at DESC, id DESC",
        COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![entity_type, entity_id], SignatureRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(SignatureRow::decode).collect()
}

/// Flip a still-valid signature to invalid; returns rows affected (0 or 1)
pub fn mark_invalid(
    conn: &Connection,
    id: SignatureId,
    invalidated_by: UserId,
    invalidated_at: &DateTime<Utc>,
    reason: &str,
) -> Result<usize, StoreError> {
    let rows = conn.execute(
        "UPDATE signatures
         SET is_valid = 0, invalidated_by = ?1, invalidated_at = ?2, invalidation_reason = ?3
         WHERE id = ?4 AND is_valid = 1",
        params![invalidated_by, to_db(invalidated_at), reason, id],
    )?;
    Ok(rows)
}
