//! The staging datastore: raw (`src_*`), normalized (`stg_*`), and model
//! (`prd_*`) tables all live here.
//!
//! Writes are full replaces executed inside one transaction: drop, recreate,
//! bulk insert, commit. A failed write rolls back and leaves the prior run's
//! table untouched; no table is ever observable half-written.

use std::path::Path;
use std::time::Duration;

use arrow::array::{Array, StringArray};
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;
use rusqlite::Connection;
use stageflow_utils::{Error, FlowResult, TableStream};

use crate::sql;

pub struct Staging {
    conn: Connection,
}

impl Staging {
    /// Open or create the staging database at the given path.
    pub fn open(path: impl AsRef<Path>) -> FlowResult<Self> {
        let conn = Connection::open(path)?;
        // Normalize stages run concurrently on separate connections.
        conn.busy_timeout(Duration::from_secs(10))?;
        Ok(Self { conn })
    }

    /// In-memory staging store (for testing).
    pub fn in_memory() -> FlowResult<Self> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
        })
    }

    /// Replace the whole contents of `name` with `batch`. Returns the number
    /// of rows written.
    pub fn replace_table(&mut self, name: &str, batch: &RecordBatch) -> FlowResult<u64> {
        let columns: Vec<Vec<&str>> = (0..batch.num_columns())
            .map(|i| {
                batch
                    .column(i)
                    .as_any()
                    .downcast_ref::<StringArray>()
                    .map(|a| a.iter().map(|v| v.unwrap_or_default()).collect())
                    .ok_or_else(|| {
                        Error::Arrow(ArrowError::CastError(format!(
                            "column '{}' is not utf8",
                            batch.schema().field(i).name()
                        )))
                    })
            })
            .collect::<FlowResult<_>>()?;
        let nulls: Vec<&arrow::array::ArrayRef> = batch.columns().iter().collect();

        let quoted = sql::quote_ident(name);
        let col_defs: Vec<String> = batch
            .schema()
            .fields()
            .iter()
            .map(|f| format!("{} TEXT", sql::quote_ident(f.name())))
            .collect();
        let placeholders = vec!["?"; batch.num_columns()].join(", ");

        let tx = self.conn.transaction()?;
        tx.execute(&format!("DROP TABLE IF EXISTS {quoted}"), [])?;
        tx.execute(
            &format!("CREATE TABLE {quoted} ({})", col_defs.join(", ")),
            [],
        )?;
        {
            let mut insert = tx.prepare(&format!(
                "INSERT INTO {quoted} VALUES ({placeholders})"
            ))?;
            for row in 0..batch.num_rows() {
                let values: Vec<Option<&str>> = columns
                    .iter()
                    .zip(&nulls)
                    .map(|(col, array)| (!array.is_null(row)).then(|| col[row]))
                    .collect();
                insert.execute(rusqlite::params_from_iter(values))?;
            }
        }
        tx.commit()?;

        Ok(batch.num_rows() as u64)
    }

    /// Read the whole contents of a staged table.
    pub fn read_table(&self, name: &str) -> FlowResult<TableStream> {
        let sql = format!("SELECT * FROM {}", sql::quote_ident(name));
        sql::query_to_stream(&self.conn, &sql)
    }

    pub fn row_count(&self, name: &str) -> FlowResult<u64> {
        let sql = format!("SELECT COUNT(*) FROM {}", sql::quote_ident(name));
        let count: i64 = self.conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(count as u64)
    }

    pub fn has_table(&self, name: &str) -> FlowResult<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [name],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::datatypes::{DataType, Field, Schema};
    use std::sync::Arc;

    fn batch(names: &[&str], columns: Vec<Vec<Option<&str>>>) -> RecordBatch {
        let fields: Vec<Field> = names
            .iter()
            .map(|n| Field::new(*n, DataType::Utf8, true))
            .collect();
        let arrays = columns
            .into_iter()
            .map(|c| Arc::new(StringArray::from(c)) as arrow::array::ArrayRef)
            .collect();
        RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays).unwrap()
    }

    #[test]
    fn replace_then_read_round_trips_nulls() {
        let mut staging = Staging::in_memory().unwrap();
        let written = staging
            .replace_table(
                "src_DimProduct",
                &batch(
                    &["ProductKey", "Color"],
                    vec![
                        vec![Some("1"), Some("2")],
                        vec![Some("Black"), None],
                    ],
                ),
            )
            .unwrap();
        assert_eq!(written, 2);

        let stream = staging.read_table("src_DimProduct").unwrap();
        let read = stream.concat().unwrap();
        let colors = read
            .column(1)
            .as_any()
            .downcast_ref::<StringArray>()
            .unwrap();
        assert_eq!(colors.value(0), "Black");
        assert!(colors.is_null(1));
    }

    #[test]
    fn second_replace_discards_prior_contents() {
        let mut staging = Staging::in_memory().unwrap();
        staging
            .replace_table(
                "stg_DimProductCategory",
                &batch(&["k"], vec![vec![Some("1"), Some("2"), Some("3")]]),
            )
            .unwrap();
        staging
            .replace_table(
                "stg_DimProductCategory",
                &batch(&["k"], vec![vec![Some("9")]]),
            )
            .unwrap();

        assert_eq!(staging.row_count("stg_DimProductCategory").unwrap(), 1);
    }

    #[test]
    fn has_table_reports_existence() {
        let mut staging = Staging::in_memory().unwrap();
        assert!(!staging.has_table("prd_ProductModel").unwrap());
        staging
            .replace_table("prd_ProductModel", &batch(&["k"], vec![vec![Some("1")]]))
            .unwrap();
        assert!(staging.has_table("prd_ProductModel").unwrap());
    }

    #[test]
    fn read_missing_table_errors() {
        let staging = Staging::in_memory().unwrap();
        assert!(staging.read_table("src_Nothing").is_err());
    }
}
