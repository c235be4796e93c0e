//! Read-only access to the relational source system.
//!
//! Connections are scoped: a stage opens its own `SourceSystem` at the start
//! of `run()` and drops it on every exit path. Nothing here mutates the
//! source database.

use std::path::Path;

use rusqlite::{Connection, OpenFlags};
use stageflow_utils::{FlowResult, TableStream};

use crate::sql;

pub struct SourceSystem {
    conn: Connection,
}

impl SourceSystem {
    /// Open the source database read-only.
    pub fn open(path: impl AsRef<Path>) -> FlowResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(Self { conn })
    }

    /// Query the source metadata for tables present in `allow_list`. The
    /// result preserves the allow-list order so a run's catalog is
    /// deterministic regardless of how the metadata query returns rows.
    pub fn table_names(&self, allow_list: &[String]) -> FlowResult<Vec<String>> {
        let placeholders = vec!["?"; allow_list.len()].join(", ");
        let sql = format!(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name IN ({placeholders})"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let found: Vec<String> = stmt
            .query_map(rusqlite::params_from_iter(allow_list.iter()), |row| {
                row.get::<_, String>(0)
            })?
            .collect::<Result<_, _>>()?;

        Ok(allow_list
            .iter()
            .filter(|name| found.iter().any(|f| f == *name))
            .cloned()
            .collect())
    }

    /// Fetch all rows and columns of one source table.
    pub fn fetch_table(&self, name: &str) -> FlowResult<TableStream> {
        let sql = format!("SELECT * FROM {}", sql::quote_ident(name));
        sql::query_to_stream(&self.conn, &sql)
    }
}
