use crate::{
    config::Database,
    storage::{error::StorageError, kv::SqliteStore, ledger::DropLedger},
};

pub mod db;
pub mod error;
pub mod kv;
pub mod ledger;
pub(crate) mod schema;

/// Opens the configured database and loads the drop ledger from it
pub fn open_ledger(config: &Database) -> Result<DropLedger, StorageError> {
    let conn = db::open(config)?;
    Ok(DropLedger::open(Box::new(SqliteStore::from_existing_conn(
        conn,
    ))))
}
