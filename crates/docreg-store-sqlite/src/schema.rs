//! SQL schema for the registry's SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- The logical document. The business key mirrors the current revision so
-- its uniqueness holds across identities.
CREATE TABLE IF NOT EXISTS identities (
    identity_id         TEXT PRIMARY KEY,
    lock_token          TEXT,            -- NULL when unlocked
    created_at          TEXT NOT NULL,
    source_organization TEXT NOT NULL,
    business_id         TEXT NOT NULL,
    UNIQUE (source_organization, business_id)
);

-- Revisions are never deleted except with their identity. Only the current
-- revision (the working copy, while locked) is ever updated.
CREATE TABLE IF NOT EXISTS revisions (
    revision_id     TEXT PRIMARY KEY,
    identity_id     TEXT NOT NULL REFERENCES identities(identity_id),
    version         INTEGER NOT NULL CHECK (version >= 1),
    registered_at   TEXT NOT NULL,   -- RFC 3339, microseconds, UTC
    document_type   TEXT NOT NULL,
    confidentiality INTEGER NOT NULL, -- rank; PUBLIC = 0
    status          TEXT,
    metadata_json   TEXT NOT NULL,
    size            INTEGER,
    content_key     TEXT,
    UNIQUE (identity_id, version)
);

CREATE TABLE IF NOT EXISTS parts (
    part_id       TEXT PRIMARY KEY,
    identity_id   TEXT NOT NULL REFERENCES identities(identity_id),
    ordinal       INTEGER NOT NULL CHECK (ordinal >= 1),
    expected_size INTEGER NOT NULL,
    blob_key      TEXT,
    UNIQUE (identity_id, ordinal)
);

-- Parts dropped by a commit, a forced unlock or a reallocation. A late write
-- to one of them reports the lock state of its identity.
CREATE TABLE IF NOT EXISTS retired_parts (
    part_id     TEXT PRIMARY KEY,
    identity_id TEXT NOT NULL REFERENCES identities(identity_id)
);

CREATE TABLE IF NOT EXISTS usage_rights (
    usage_right_id TEXT PRIMARY KEY,
    identity_id    TEXT NOT NULL REFERENCES identities(identity_id),
    description    TEXT NOT NULL,
    start_at       TEXT NOT NULL,
    end_at         TEXT
);

CREATE TABLE IF NOT EXISTS object_links (
    object_link_id TEXT PRIMARY KEY,
    identity_id    TEXT NOT NULL REFERENCES identities(identity_id),
    object_url     TEXT NOT NULL,
    object_kind    TEXT NOT NULL,
    UNIQUE (identity_id, object_url)
);

CREATE TABLE IF NOT EXISTS sendings (
    sending_id   TEXT PRIMARY KEY,
    identity_id  TEXT NOT NULL REFERENCES identities(identity_id),
    addressee    TEXT NOT NULL,
    role         TEXT NOT NULL,
    note         TEXT NOT NULL,
    received_on  TEXT,
    sent_on      TEXT,
    contact      TEXT,
    contact_name TEXT NOT NULL,
    -- tagged: {\"kind\": \"domestic\" | \"foreign\" | \"postal\", ...}
    address_json TEXT NOT NULL
);

-- Exactly one row per identity: the revision with the greatest version.
CREATE VIEW IF NOT EXISTS current_revisions AS
    SELECT r.* FROM revisions r
    WHERE r.version = (
        SELECT MAX(version) FROM revisions WHERE identity_id = r.identity_id
    );

CREATE INDEX IF NOT EXISTS revisions_registered_idx ON revisions(identity_id, registered_at);
CREATE INDEX IF NOT EXISTS revisions_content_idx    ON revisions(content_key);
CREATE INDEX IF NOT EXISTS parts_blob_idx           ON parts(blob_key);
CREATE INDEX IF NOT EXISTS usage_rights_identity_idx ON usage_rights(identity_id);
CREATE INDEX IF NOT EXISTS sendings_identity_idx    ON sendings(identity_id);

PRAGMA user_version = 1;
";
