//! Approval request and signer slot rows

use std::str::FromStr;

use chrono::{DateTime, Utc};
use esign_core::{
    ApprovalRequest, RequestDetail, RequestFilter, RequestId, RequestStatus, SignerSlot, SlotId,
    SlotStatus,
};
use esign_store::time::{from_db, opt_from_db, opt_to_db, to_db};
use esign_store::StoreError;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

const REQUESTS: &str = "approval_requests";
const SLOTS: &str = "signer_slots";

const REQUEST_COLUMNS: &str = "id, request_number, entity_type, entity_id, action, title,
    description, required_signatures, current_signatures, sequential, status, requested_by,
    created_at, expires_at, completed_at, metadata";

const SLOT_COLUMNS: &str = "id, request_id, signer_id, ordinal, status, signature_id,
    decline_reason, signed_at, declined_at";

struct RequestRow {
    id: i64,
    request_number: String,
    entity_type: String,
    entity_id: i64,
    action: String,
    title: String,
    description: Option<String>,
    required_signatures: u32,
    current_signatures: u32,
    sequential: bool,
    status: String,
    requested_by: i64,
    created_at: String,
    expires_at: Option<String>,
    completed_at: Option<String>,
    metadata: String,
}

impl RequestRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            request_number: row.get(1)?,
            entity_type: row.get(2)?,
            entity_id: row.get(3)?,
            action: row.get(4)?,
            title: row.get(5)?,
            description: row.get(6)?,
            required_signatures: row.get(7)?,
            current_signatures: row.get(8)?,
            sequential: row.get(9)?,
            status: row.get(10)?,
            requested_by: row.get(11)?,
            created_at: row.get(12)?,
            expires_at: row.get(13)?,
            completed_at: row.get(14)?,
            metadata: row.get(15)?,
        })
    }

    fn decode(self) -> Result<ApprovalRequest, StoreError> {
        let status = RequestStatus::from_str(&self.status)
            .map_err(|_| StoreError::corrupt(REQUESTS, format!("unknown status {}", self.status)))?;

        Ok(ApprovalRequest {
            id: self.id,
            request_number: self.request_number,
            entity_type: self.entity_type,
            entity_id: self.entity_id,
            action: self.action,
            title: self.title,
            description: self.description,
            required_signatures: self.required_signatures,
            current_signatures: self.current_signatures,
            sequential: self.sequential,
            status,
            requested_by: self.requested_by,
            created_at: from_db(REQUESTS, &self.created_at)?,
            expires_at: opt_from_db(REQUESTS, self.expires_at)?,
            completed_at: opt_from_db(REQUESTS, self.completed_at)?,
            metadata: serde_json::from_str(&self.metadata)?,
        })
    }
}

struct SlotRow {
    id: i64,
    request_id: i64,
    signer_id: i64,
    ordinal: i64,
    status: String,
    signature_id: Option<i64>,
    decline_reason: Option<String>,
    signed_at: Option<String>,
    declined_at: Option<String>,
}

impl SlotRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            request_id: row.get(1)?,
            signer_id: row.get(2)?,
            ordinal: row.get(3)?,
            status: row.get(4)?,
            signature_id: row.get(5)?,
            decline_reason: row.get(6)?,
            signed_at: row.get(7)?,
            declined_at: row.get(8)?,
        })
    }

    fn decode(self) -> Result<SignerSlot, StoreError> {
        let status = SlotStatus::from_str(&self.status)
            .map_err(|_| StoreError::corrupt(SLOTS, format!("unknown status {}", self.status)))?;

        Ok(SignerSlot {
            id: self.id,
            request_id: self.request_id,
            signer_id: self.signer_id,
            ordinal: self.ordinal,
            status,
            signature_id: self.signature_id,
            decline_reason: self.decline_reason,
            signed_at: opt_from_db(SLOTS, self.signed_at)?,
            declined_at: opt_from_db(SLOTS, self.declined_at)?,
        })
    }
}

/// Next request sequence number
///
/// Only meaningful inside a write transaction, which holds the writer lock
/// between this read and the insert that consumes the number.
pub fn next_sequence(conn: &Connection) -> Result<i64, StoreError> {
    let next = conn.query_row(
        "SELECT COALESCE(MAX(sequence_no), 0) + 1 FROM approval_requests",
        [],
        |row| row.get(0),
    )?;
    Ok(next)
}

/// Insert a request row (id ignored) and return its id
pub fn insert_request(
    conn: &Connection,
    request: &ApprovalRequest,
    sequence_no: i64,
) -> Result<RequestId, StoreError> {
    conn.execute(
        "INSERT INTO approval_requests (sequence_no, request_number, entity_type, entity_id,
            action, title, description, required_signatures, current_signatures, sequential,
            status, requested_by, created_at, expires_at, completed_at, metadata)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
        params![
            sequence_no,
            request.request_number,
            request.entity_type,
            request.entity_id,
            request.action,
            request.title,
            request.description,
            request.required_signatures,
            request.current_signatures,
            request.sequential,
            request.status.to_string(),
            request.requested_by,
            to_db(&request.created_at),
            opt_to_db(&request.expires_at),
            opt_to_db(&request.completed_at),
            serde_json::to_string(&request.metadata)?,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Insert a slot row (id ignored) and return its id
pub fn insert_slot(conn: &Connection, slot: &SignerSlot) -> Result<SlotId, StoreError> {
    conn.execute(
        "INSERT INTO signer_slots (request_id, signer_id, ordinal, status)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            slot.request_id,
            slot.signer_id,
            slot.ordinal,
            slot.status.to_string()
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_request(conn: &Connection, id: RequestId) -> Result<Option<ApprovalRequest>, StoreError> {
    let sql = format!("SELECT {} FROM approval_requests WHERE id = ?1", REQUEST_COLUMNS);
    let row = conn
        .query_row(&sql, params![id], RequestRow::from_row)
        .optional()?;
    row.map(RequestRow::decode).transpose()
}

/// Slots of a request, ordered by ordinal
pub fn slots_for(conn: &Connection, request_id: RequestId) -> Result<Vec<SignerSlot>, StoreError> {
    let sql = format!(
        "SELECT {} FROM signer_slots WHERE request_id = ?1 ORDER BY ordinal ASC, id ASC",
        SLOT_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![request_id], SlotRow::from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    rows.into_iter().map(SlotRow::decode).collect()
}

pub fn load(conn: &Connection, id: RequestId) -> Result<Option<RequestDetail>, StoreError> {
    match get_request(conn, id)? {
        Some(request) => {
            let slots = slots_for(conn, request.id)?;
            Ok(Some(RequestDetail { request, slots }))
        }
        None => Ok(None),
    }
}

pub fn request_id_for_slot(conn: &Connection, slot_id: SlotId) -> Result<Option<RequestId>, StoreError> {
    let id = conn
        .query_row(
            "SELECT request_id FROM signer_slots WHERE id = ?1",
            params![slot_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(id)
}

/// Write back the mutable request fields
pub fn update_request(conn: &Connection, request: &ApprovalRequest) -> Result<usize, StoreError> {
    let changed = conn.execute(
        "UPDATE approval_requests
         SET current_signatures = ?1, status = ?2, completed_at = ?3
         WHERE id = ?4",
        params![
            request.current_signatures,
            request.status.to_string(),
            opt_to_db(&request.completed_at),
            request.id
        ],
    )?;
    Ok(changed)
}

/// Move a slot out of PENDING
///
/// Guarded on the stored status, so a slot that already left PENDING
/// reports zero changed rows instead of being overwritten.
pub fn transition_slot(conn: &Connection, slot: &SignerSlot) -> Result<usize, StoreError> {
    let changed = conn.execute(
        "UPDATE signer_slots
         SET status = ?1, signature_id = ?2, decline_reason = ?3, signed_at = ?4, declined_at = ?5
         WHERE id = ?6 AND status = 'PENDING'",
        params![
            slot.status.to_string(),
            slot.signature_id,
            slot.decline_reason,
            opt_to_db(&slot.signed_at),
            opt_to_db(&slot.declined_at),
            slot.id
        ],
    )?;
    Ok(changed)
}

fn filter_clause(filter: &RequestFilter) -> (String, Vec<Value>) {
    let mut conditions = Vec::new();
    let mut args = Vec::new();

    if let Some(status) = filter.status {
        args.push(Value::Text(status.to_string()));
        conditions.push(format!("status = ?{}", args.len()));
    }
    if let Some(ref entity_type) = filter.entity_type {
        args.push(Value::Text(entity_type.clone()));
        conditions.push(format!("entity_type = ?{}", args.len()));
    }
    if let Some(ref action) = filter.action {
        args.push(Value::Text(action.clone()));
        conditions.push(format!("action = ?{}", args.len()));
    }
    if let Some(requested_by) = filter.requested_by {
        args.push(Value::Integer(requested_by));
        conditions.push(format!("requested_by = ?{}", args.len()));
    }
    if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        args.push(Value::Text(format!("%{}%", search.to_lowercase())));
        let n = args.len();
        conditions.push(format!(
            "(LOWER(request_number) LIKE ?{n} OR LOWER(title) LIKE ?{n})"
        ));
    }

    let clause = if conditions.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", conditions.join(" AND "))
    };
    (clause, args)
}

/// One page of matching requests, newest first, plus the total match count
pub fn list(
    conn: &Connection,
    filter: &RequestFilter,
    page: u32,
    limit: u32,
) -> Result<(u64, Vec<RequestDetail>), StoreError> {
    let (clause, mut args) = filter_clause(filter);

    let count_sql = format!("SELECT COUNT(*) FROM approval_requests{}", clause);
    let total: i64 = conn.query_row(&count_sql, params_from_iter(args.iter()), |row| row.get(0))?;

    let offset = i64::from(page.saturating_sub(1)) * i64::from(limit);
    args.push(Value::Integer(i64::from(limit)));
    let limit_idx = args.len();
    args.push(Value::Integer(offset));
    let offset_idx = args.len();

    let sql = format!(
        "SELECT {} FROM approval_requests{} ORDER BY created_at DESC, id DESC LIMIT ?{} OFFSET ?{}",
        REQUEST_COLUMNS, clause, limit_idx, offset_idx
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(args.iter()), RequestRow::from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut items = Vec::with_capacity(rows.len());
    for row in rows {
        let request = row.decode()?;
        let slots = slots_for(conn, request.id)?;
        items.push(RequestDetail { request, slots });
    }
    Ok((total as u64, items))
}

/// Ids of open requests whose expiry has passed
pub fn overdue_ids(conn: &Connection, now: &DateTime<Utc>) -> Result<Vec<RequestId>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT id FROM approval_requests
         WHERE status IN ('PENDING', 'PARTIALLY_SIGNED')
           AND expires_at IS NOT NULL AND expires_at <= ?1
         ORDER BY id",
    )?;
    let ids = stmt
        .query_map(params![to_db(now)], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(ids)
}

pub fn count_by_status(conn: &Connection, status: RequestStatus) -> Result<u64, StoreError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM approval_requests WHERE status = ?1",
        params![status.to_string()],
        |row| row.get(0),
    )?;
    Ok(count as u64)
}
