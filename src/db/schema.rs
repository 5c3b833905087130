pub const LIBRARY_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS assets (
    id INTEGER PRIMARY KEY,
    file_path TEXT NOT NULL UNIQUE,
    mime_type TEXT NOT NULL,
    registered_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_assets_mime_type ON assets(mime_type);

CREATE TABLE IF NOT EXISTS asset_meta (
    asset_id INTEGER NOT NULL REFERENCES assets(id),
    key TEXT NOT NULL,
    value TEXT NOT NULL,
    PRIMARY KEY (asset_id, key)
);

CREATE TABLE IF NOT EXISTS library_config (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS audit_log (
    id INTEGER PRIMARY KEY,
    timestamp TEXT NOT NULL,
    operation TEXT NOT NULL,
    asset_id INTEGER REFERENCES assets(id),
    user TEXT,
    detail TEXT
);
";
