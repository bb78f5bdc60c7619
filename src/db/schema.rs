/// Schema for the local persisted store and the asset cache.
pub const SCHEMA: &str = r#"
-- Origin-scoped key-value store (session, incidents, notifications)
CREATE TABLE IF NOT EXISTS kv_store (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Named asset caches, one per manifest generation
CREATE TABLE IF NOT EXISTS asset_caches (
    name TEXT PRIMARY KEY,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Cached responses keyed by exact request URL
CREATE TABLE IF NOT EXISTS asset_entries (
    cache_name TEXT NOT NULL,
    url TEXT NOT NULL,
    status INTEGER NOT NULL,
    headers TEXT NOT NULL,
    body BLOB NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (cache_name, url)
);

CREATE INDEX IF NOT EXISTS idx_asset_entries_url ON asset_entries(url);
"#;
