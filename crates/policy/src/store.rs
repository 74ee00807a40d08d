//! Policy rows

use chrono::{DateTime, Utc};
use esign_core::{NewPolicy, Policy, PolicyId, UserId};
use esign_store::time::{from_db, to_db};
use esign_store::StoreError;
use rusqlite::{params, Connection, OptionalExtension, Row};

const TABLE: &str = "policies";

const COLUMNS: &str = "id, entity_type, action, required_signatures, required_roles, sequential,
    expiration_hours, is_active, created_by, created_at";

struct PolicyRow {
    id: i64,
    entity_type: String,
    action: String,
    required_signatures: u32,
    required_roles: String,
    sequential: bool,
    expiration_hours: Option<u32>,
    is_active: bool,
    created_by: i64,
    created_at: String,
}

impl PolicyRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            entity_type: row.get(1)?,
            action: row.get(2)?,
            required_signatures: row.get(3)?,
            required_roles: row.get(4)?,
            sequential: row.get(5)?,
            expiration_hours: row.get(6)?,
            is_active: row.get(7)?,
            created_by: row.get(8)?,
            created_at: row.get(9)?,
        })
    }

    fn decode(self) -> Result<Policy, StoreError> {
        Ok(Policy {
            id: self.id,
            entity_type: self.entity_type,
            action: self.action,
            required_signatures: self.required_signatures,
            required_roles: serde_json::from_str(&self.required_roles)?,
            sequential: self.sequential,
            expiration_hours: self.expiration_hours,
            is_active: self.is_active,
            created_by: self.created_by,
            created_at: from_db(TABLE, &self.created_at)?,
        })
    }
}

pub fn find_active(
    conn: &Connection,
    entity_type: &str,
    action: &str,
) -> Result<Option<Policy>, StoreError> {
    let sql = format!(
        "SELECT {} FROM policies WHERE entity_type = ?1 AND action = ?2 AND is_active = 1",
        COLUMNS
    );
    let row = conn
        .query_row(&sql, params![entity_type, action], PolicyRow::from_row)
        .optional()?;
    row.map(PolicyRow::decode).transpose()
}

pub fn get(conn: &Connection, id: PolicyId) -> Result<Option<Policy>, StoreError> {
    let sql = format!("SELECT {} FROM policies WHERE id = ?1", COLUMNS);
    let row = conn
        .query_row(&sql, params![id], PolicyRow::from_row)
        .optional()?;
    row.map(PolicyRow::decode).transpose()
}

/// Active policies ordered by entity type, then action
pub fn list_active(conn: &Connection) -> Result<Vec<Policy>, StoreError> {
    let sql = format!(
        "SELECT {} FROM policies WHERE is_active = 1 ORDER BY entity_type ASC, action ASC",
        COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], PolicyRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(PolicyRow::decode).collect()
}

pub fn insert(
    conn: &Connection,
    new: &NewPolicy,
    created_by: UserId,
    created_at: &DateTime<Utc>,
) -> Result<PolicyId, StoreError> {
    conn.execute(
        "INSERT INTO policies (entity_type, action, required_signatures, required_roles,
            sequential, expiration_hours, is_active, created_by, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7, ?8)",
        params![
            new.entity_type,
            new.action,
            new.required_signatures,
            serde_json::to_string(&new.required_roles)?,
            new.sequential,
            new.expiration_hours,
            created_by,
            to_db(created_at),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Persist the mutable fields of a policy
pub fn update(conn: &Connection, policy: &Policy) -> Result<(), StoreError> {
    conn.execute(
        "UPDATE policies
         SET required_signatures = ?1, required_roles = ?2, sequential = ?3,
             expiration_hours = ?4, is_active = ?5
         WHERE id = ?6",
        params![
            policy.required_signatures,
            serde_json::to_string(&policy.required_roles)?,
            policy.sequential,
            policy.expiration_hours,
            policy.is_active,
            policy.id,
        ],
    )?;
    Ok(())
}

/// Counter advanced by every committed policy write
pub fn generation(conn: &Connection) -> Result<i64, StoreError> {
    let value = conn.query_row(
        "SELECT value FROM policy_generation WHERE id = 1",
        [],
        |row| row.get(0),
    )?;
    Ok(value)
}
