//! Whole-document key/value storage

use rusqlite::{OptionalExtension, params};

use crate::storage::{
    error::StorageError,
    schema::{columns::*, tables::*},
};

/// Durable map from a fixed key to a whole document.
///
/// Writes replace the stored document entirely.
pub trait KeyValueStore: Send {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError>;

    fn remove(&mut self, key: &str) -> Result<(), StorageError>;
}

pub struct SqliteStore {
    pub(crate) db: rusqlite::Connection,
}

impl SqliteStore {
    /// expects the schema to be initialized, see `storage::db::open`
    pub fn from_existing_conn(db: rusqlite::Connection) -> Self {
        Self { db }
    }
}

impl KeyValueStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self
            .db
            .query_row(
                &format!("SELECT {VALUE} FROM {KV_STORE} WHERE {KEY} = ?1"),
                params![key],
                |row| row.get(0),
            )
            .optional()?)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        self.db.execute(
            &format!(
                "INSERT INTO {KV_STORE} ({KEY}, {VALUE}) VALUES (?1, ?2)
                 ON CONFLICT({KEY}) DO UPDATE SET {VALUE} = excluded.{VALUE}"
            ),
            params![key, value],
        )?;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        self.db.execute(
            &format!("DELETE FROM {KV_STORE} WHERE {KEY} = ?1"),
            params![key],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rusqlite::Connection;

    use super::*;
    use crate::storage::schema;

    fn setup_store() -> anyhow::Result<SqliteStore> {
        let conn = Connection::open_in_memory()?;
        schema::init(&conn)?;
        Ok(SqliteStore::from_existing_conn(conn))
    }

    #[test]
    fn test_missing_key_is_none() -> anyhow::Result<()> {
        let store = setup_store()?;
        assert_eq!(store.get("@nothing")?, None);
        Ok(())
    }

    #[test]
    fn test_set_overwrites_whole_value() -> anyhow::Result<()> {
        let mut store = setup_store()?;

        store.set("k", "[1,2,3]")?;
        store.set("k", "[4]")?;

        assert_eq!(store.get("k")?, Some("[4]".to_string()));

        let rows: i64 = store
            .db
            .query_row(&format!("SELECT COUNT(*) FROM {KV_STORE}"), [], |row| {
                row.get(0)
            })?;
        assert_eq!(rows, 1);
        Ok(())
    }

    #[test]
    fn test_remove() -> anyhow::Result<()> {
        let mut store = setup_store()?;

        store.set("a", "1")?;
        store.set("b", "2")?;
        store.remove("a")?;
        store.remove("never-set")?;

        assert_eq!(store.get("a")?, None);
        assert_eq!(store.get("b")?, Some("2".to_string()));
        Ok(())
    }
}
