//! Database schema
//!
//! Invariants that the storage layer can hold on its own are enforced here:
//! one allocated sequence number per request, one active policy per key,
//! signatures never deleted and their signed fields never rewritten. Policy
//! writes also advance a generation counter that caches compare against.

pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS signatures (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    digest TEXT NOT NULL UNIQUE,
    entity_type TEXT NOT NULL,
    entity_id INTEGER NOT NULL,
    action TEXT NOT NULL,
    signer_id INTEGER NOT NULL,
    signer_full_name TEXT NOT NULL,
    signer_role TEXT NOT NULL,
    meaning TEXT NOT NULL,
    reason TEXT,
    method TEXT NOT NULL,
    ip_address TEXT,
    user_agent TEXT,
    signed_at TEXT NOT NULL,
    is_valid INTEGER NOT NULL DEFAULT 1,
    invalidated_by INTEGER,
    invalidated_at TEXT,
    invalidation_reason TEXT
);

CREATE INDEX IF NOT EXISTS idx_signatures_entity
    ON signatures(entity_type, entity_id);

CREATE TRIGGER IF NOT EXISTS signatures_no_delete
BEFORE DELETE ON signatures
BEGIN
    SELECT RAISE(ABORT, 'signatures are permanent');
END;

CREATE TRIGGER IF NOT EXISTS signatures_immutable
BEFORE UPDATE OF digest, entity_type, entity_id, action, signer_id,
    signer_full_name, signer_role, meaning, reason, method,
    ip_address, user_agent, signed_at ON signatures
BEGIN
    SELECT RAISE(ABORT, 'signed fields are immutable');
END;

CREATE TRIGGER IF NOT EXISTS signatures_no_revalidate
BEFORE UPDATE OF is_valid ON signatures
WHEN OLD.is_valid = 0 AND NEW.is_valid = 1
BEGIN
    SELECT RAISE(ABORT, 'invalidation is irreversible');
END;

CREATE TABLE IF NOT EXISTS approval_requests (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    sequence_no INTEGER NOT NULL UNIQUE,
    request_number TEXT NOT NULL UNIQUE,
    entity_type TEXT NOT NULL,
    entity_id INTEGER NOT NULL,
    action TEXT NOT NULL,
    title TEXT NOT NULL,
    description TEXT,
    required_signatures INTEGER NOT NULL CHECK (required_signatures >= 1),
    current_signatures INTEGER NOT NULL DEFAULT 0
        CHECK (current_signatures >= 0 AND current_signatures <= required_signatures),
    sequential INTEGER NOT NULL DEFAULT 0,
    status TEXT NOT NULL,
    requested_by INTEGER NOT NULL,
    created_at TEXT NOT NULL,
    expires_at TEXT,
    completed_at TEXT,
    metadata TEXT NOT NULL DEFAULT '{}'
);

CREATE INDEX IF NOT EXISTS idx_approval_requests_status
    ON approval_requests(status);

CREATE TABLE IF NOT EXISTS signer_slots (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    request_id INTEGER NOT NULL REFERENCES approval_requests(id),
    signer_id INTEGER NOT NULL,
    ordinal INTEGER NOT NULL,
    status TEXT NOT NULL,
    signature_id INTEGER REFERENCES signatures(id),
    decline_reason TEXT,
    signed_at TEXT,
    declined_at TEXT,
    UNIQUE (request_id, signer_id)
);

CREATE INDEX IF NOT EXISTS idx_signer_slots_request
    ON signer_slots(request_id);

CREATE TABLE IF NOT EXISTS policies (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    entity_type TEXT NOT NULL,
    action TEXT NOT NULL,
    required_signatures INTEGER NOT NULL DEFAULT 1 CHECK (required_signatures >= 1),
    required_roles TEXT NOT NULL DEFAULT '[]',
    sequential INTEGER NOT NULL DEFAULT 0,
    expiration_hours INTEGER,
    is_active INTEGER NOT NULL DEFAULT 1,
    created_by INTEGER NOT NULL,
    created_at TEXT NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_policies_active_key
    ON policies(entity_type, action) WHERE is_active = 1;

-- Bumped on every policy write, from any connection; resolver caches key on it
CREATE TABLE IF NOT EXISTS policy_generation (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    value INTEGER NOT NULL
);

INSERT OR IGNORE INTO policy_generation (id, value) VALUES (1, 0);

CREATE TRIGGER IF NOT EXISTS policies_generation_insert
AFTER INSERT ON policies
BEGIN
    UPDATE policy_generation SET value = value + 1 WHERE id = 1;
END;

CREATE TRIGGER IF NOT EXISTS policies_generation_update
AFTER UPDATE ON policies
BEGIN
    UPDATE policy_generation SET value = value + 1 WHERE id = 1;
END;

CREATE TRIGGER IF NOT EXISTS policies_generation_delete
AFTER DELETE ON policies
BEGIN
    UPDATE policy_generation SET value = value + 1 WHERE id = 1;
END;
"#;
