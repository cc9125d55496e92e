use rusqlite::Connection;

pub mod tables {
    pub const KV_STORE: &str = "kv_store";

    pub const ALL_TABLES: &[&str] = &[KV_STORE];
}

pub mod columns {
    pub const KEY: &str = "key";
    pub const VALUE: &str = "value";
}

pub use columns::*;
pub use tables::*;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS kv_store (
    key TEXT PRIMARY KEY NOT NULL,
    value TEXT NOT NULL
);
"#;

pub fn init(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA)
}
