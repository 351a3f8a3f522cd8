/// Schema for the booked-session cache.
pub const SCHEMA: &str = r#"
-- One row per remote session, grouped by tutor for bulk replacement
CREATE TABLE IF NOT EXISTS booked_sessions (
    id INTEGER PRIMARY KEY,
    partition_key TEXT NOT NULL,
    position INTEGER NOT NULL,
    student_label TEXT,
    course_name TEXT NOT NULL,
    location_name TEXT NOT NULL,
    scheduled_at TEXT NOT NULL,
    cost REAL NOT NULL,
    contact_info TEXT NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_booked_sessions_partition
    ON booked_sessions(partition_key, position);
"#;
