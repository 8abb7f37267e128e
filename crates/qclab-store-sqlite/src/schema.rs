//! SQL schema for the qclab SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE ... IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS control_limits (
    analyte_id         TEXT NOT NULL,
    lot_id             TEXT NOT NULL,
    instrument_id      TEXT NOT NULL,
    level_id           TEXT NOT NULL,
    mean               REAL NOT NULL,
    standard_deviation REAL NOT NULL,
    updated_at         TEXT NOT NULL,
    PRIMARY KEY (analyte_id, lot_id, instrument_id, level_id)
);

-- rule_id preserves catalog order across upserts.
CREATE TABLE IF NOT EXISTS control_rules (
    rule_id                INTEGER PRIMARY KEY AUTOINCREMENT,
    code                   TEXT NOT NULL UNIQUE,
    severity               TEXT NOT NULL,   -- 'warning' | 'error' | 'critical'
    window_size            INTEGER NOT NULL,
    threshold_sd           REAL,
    consecutive_points     INTEGER,
    same_side              INTEGER NOT NULL DEFAULT 0,
    opposite_sides         INTEGER NOT NULL DEFAULT 0,
    sum_abs_z_greater_than REAL,
    active                 INTEGER NOT NULL DEFAULT 1,
    applies_to_levels      TEXT NOT NULL DEFAULT '[]',  -- JSON array
    updated_at             TEXT NOT NULL
);

-- Single row; bumped on every catalog write.
CREATE TABLE IF NOT EXISTS catalog_meta (
    id      INTEGER PRIMARY KEY CHECK (id = 1),
    version INTEGER NOT NULL
);
INSERT OR IGNORE INTO catalog_meta (id, version) VALUES (1, 0);

-- Append-only. seq is the insertion-order tie-break for run ordering.
CREATE TABLE IF NOT EXISTS measurements (
    seq            INTEGER PRIMARY KEY AUTOINCREMENT,
    measurement_id TEXT NOT NULL UNIQUE,
    analyte_id     TEXT NOT NULL,
    lot_id         TEXT NOT NULL,
    instrument_id  TEXT NOT NULL,
    level_id       TEXT NOT NULL,
    value          REAL NOT NULL,
    measured_on    TEXT NOT NULL,   -- YYYY-MM-DD
    recorded_at    TEXT NOT NULL    -- fixed-width RFC 3339 UTC
);

CREATE INDEX IF NOT EXISTS measurements_run_idx ON measurements (
    analyte_id, lot_id, instrument_id, level_id, measured_on, recorded_at, seq
);

-- Only the disposition columns are ever updated.
CREATE TABLE IF NOT EXISTS violations (
    violation_id   TEXT PRIMARY KEY,   -- SHA-256 of the unique key
    lot_id         TEXT NOT NULL,
    instrument_id  TEXT NOT NULL,
    level_id       TEXT NOT NULL,
    analyte_id     TEXT NOT NULL,
    measured_on    TEXT NOT NULL,
    rule_code      TEXT NOT NULL,
    severity       TEXT NOT NULL,
    content        TEXT NOT NULL,
    z_score        REAL,
    recorded_at    TEXT NOT NULL,
    action         TEXT,
    assigned_staff TEXT,
    status         TEXT NOT NULL DEFAULT 'pending',
    UNIQUE (lot_id, instrument_id, level_id, analyte_id, measured_on, rule_code)
);

CREATE INDEX IF NOT EXISTS violations_status_idx ON violations(status);

PRAGMA user_version = 1;
";
