//! Low-level glue between SQLite result sets and Arrow record batches.
//!
//! Every staged column is nullable Utf8: SQLite is dynamically typed and the
//! pipeline's fill values ("0" / "NA") are textual, so rendering each cell to
//! text keeps the whole extract/normalize/merge chain uniform. SQL NULL stays
//! a null slot in the array.

use std::sync::Arc;

use arrow::array::{ArrayRef, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use rusqlite::types::ValueRef;
use rusqlite::Connection;
use stageflow_utils::{FlowResult, TableStream};

/// Render a single SQLite cell to its text form, preserving NULL.
fn cell_to_text(value: ValueRef<'_>) -> Option<String> {
    match value {
        ValueRef::Null => None,
        ValueRef::Integer(i) => Some(i.to_string()),
        ValueRef::Real(f) => Some(f.to_string()),
        ValueRef::Text(t) => Some(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Some(String::from_utf8_lossy(b).into_owned()),
    }
}

/// Run an arbitrary SELECT and materialize the full result set as one batch.
pub fn query_to_stream(conn: &Connection, sql: &str) -> FlowResult<TableStream> {
    let mut stmt = conn.prepare(sql)?;
    let names: Vec<String> = stmt
        .column_names()
        .iter()
        .map(|n| n.to_string())
        .collect();

    let mut columns: Vec<Vec<Option<String>>> = vec![Vec::new(); names.len()];
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        for (i, column) in columns.iter_mut().enumerate() {
            column.push(cell_to_text(row.get_ref(i)?));
        }
    }

    let fields: Vec<Field> = names
        .iter()
        .map(|n| Field::new(n, DataType::Utf8, true))
        .collect();
    let arrays: Vec<ArrayRef> = columns
        .into_iter()
        .map(|c| Arc::new(StringArray::from(c)) as ArrayRef)
        .collect();

    let batch = RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays)?;
    Ok(TableStream::new(vec![batch]))
}

/// Quote an identifier for use in generated SQL.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
