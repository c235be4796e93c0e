//! The normalize stage: one data-driven cleaner shared by every dimension
//! table, parameterized by a `NormalizeSpec`.
//!
//! Order of operations is fixed: project onto the retained columns, fill
//! nulls, rename. The result replaces `stg_<table>` in one transactional
//! write, so the table is never visible half-normalized.

use std::path::PathBuf;
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use stageflow_utils::{Error, FlowResult};

use crate::stage::{Stage, StageReport};
use crate::staging::Staging;

/// Column-level normalization rules for one table.
#[derive(Debug, Clone)]
pub struct NormalizeSpec {
    /// Raw staged table to read (`src_*`).
    pub raw_table: String,
    /// Normalized table to write (`stg_*`).
    pub staged_table: String,
    /// Ordered list of columns to retain.
    pub columns: Vec<String>,
    /// Null replacement per column, applied after selection.
    pub fills: Vec<(String, String)>,
    /// Rename mapping (old -> new), applied last.
    pub renames: Vec<(String, String)>,
}

pub struct NormalizeStage {
    spec: NormalizeSpec,
    staging_db: PathBuf,
    stage_name: String,
}

impl NormalizeStage {
    pub fn new(spec: NormalizeSpec, staging_db: impl Into<PathBuf>) -> Self {
        let stage_name = format!(
            "normalize_{}",
            spec.raw_table.trim_start_matches("src_")
        );
        Self {
            spec,
            staging_db: staging_db.into(),
            stage_name,
        }
    }

    /// Apply the full rule set to one raw batch.
    fn apply(&self, raw: &RecordBatch) -> FlowResult<RecordBatch> {
        let schema = raw.schema();

        // Projection; a column the spec names but the raw table lacks is a
        // hard error, not something to paper over.
        let mut arrays: Vec<ArrayRef> = Vec::with_capacity(self.spec.columns.len());
        for column in &self.spec.columns {
            let idx = schema
                .index_of(column)
                .map_err(|_| Error::MissingColumn {
                    table: self.spec.raw_table.clone(),
                    column: column.clone(),
                })?;
            arrays.push(raw.column(idx).clone());
        }

        // Null substitution.
        for (column, fill) in &self.spec.fills {
            let Some(pos) = self.spec.columns.iter().position(|c| c == column) else {
                return Err(Error::MissingColumn {
                    table: self.spec.raw_table.clone(),
                    column: column.clone(),
                });
            };
            let values = arrays[pos]
                .as_any()
                .downcast_ref::<StringArray>()
                .ok_or_else(|| Error::Normalization {
                    table: self.spec.raw_table.clone(),
                    reason: format!("column '{column}' is not utf8"),
                })?;
            let filled: StringArray = values
                .iter()
                .map(|v| Some(v.unwrap_or(fill.as_str())))
                .collect();
            arrays[pos] = Arc::new(filled);
        }

        // Rename.
        let fields: Vec<Field> = self
            .spec
            .columns
            .iter()
            .map(|column| {
                let name = self
                    .spec
                    .renames
                    .iter()
                    .find(|(old, _)| old == column)
                    .map(|(_, new)| new.as_str())
                    .unwrap_or(column.as_str());
                Field::new(name, DataType::Utf8, true)
            })
            .collect();

        Ok(RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays)?)
    }
}

#[async_trait]
impl Stage for NormalizeStage {
    fn name(&self) -> &str {
        &self.stage_name
    }

    fn produces(&self) -> Vec<&str> {
        vec![&self.spec.staged_table]
    }

    fn consumes(&self) -> Vec<&str> {
        vec![&self.spec.raw_table]
    }

    async fn run(&self) -> FlowResult<StageReport> {
        let mut staging = Staging::open(&self.staging_db).map_err(|e| Error::Normalization {
            table: self.spec.raw_table.clone(),
            reason: e.to_string(),
        })?;

        let raw = staging
            .read_table(&self.spec.raw_table)
            .and_then(|s| s.concat())
            .map_err(|e| Error::Normalization {
                table: self.spec.raw_table.clone(),
                reason: e.to_string(),
            })?;

        let cleaned = self.apply(&raw)?;

        let rows = staging
            .replace_table(&self.spec.staged_table, &cleaned)
            .map_err(|e| Error::Normalization {
                table: self.spec.staged_table.clone(),
                reason: e.to_string(),
            })?;

        tracing::info!(
            table = %self.spec.staged_table,
            rows,
            columns = self.spec.columns.len(),
            "normalized"
        );
        Ok(StageReport { rows })
    }
}
