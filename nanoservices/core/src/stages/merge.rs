//! The merge stage: inner-join the normalized tables into the model table.
//!
//! Joins run in a fixed order (product ⋈ subcategory, then ⋈ category). Rows
//! without a matching key on either side are dropped; row-count drift against
//! the driving side is logged as a warning and counted, never raised.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use arrow::array::{Array, StringArray, UInt32Array};
use arrow::compute::take;
use arrow::datatypes::{Field, Schema};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use stageflow_utils::{Error, FlowResult};

use crate::metrics;
use crate::stage::{Stage, StageReport};
use crate::staging::Staging;

/// One pairwise join: the table joined in and the shared key column.
#[derive(Debug, Clone)]
pub struct JoinStep {
    pub table: String,
    pub key: String,
}

#[derive(Debug, Clone)]
pub struct JoinSpec {
    /// The driving table; drift is measured against it at each step.
    pub driving: String,
    pub steps: Vec<JoinStep>,
    /// The model table to write (`prd_*`).
    pub model_table: String,
}

impl JoinSpec {
    /// The canonical product-model join.
    pub fn product_model() -> Self {
        Self {
            driving: "stg_DimProduct".to_string(),
            steps: vec![
                JoinStep {
                    table: "stg_DimProductSubcategory".to_string(),
                    key: "ProductSubcategoryKey".to_string(),
                },
                JoinStep {
                    table: "stg_DimProductCategory".to_string(),
                    key: "ProductCategoryKey".to_string(),
                },
            ],
            model_table: "prd_ProductModel".to_string(),
        }
    }
}

pub struct MergeStage {
    spec: JoinSpec,
    staging_db: PathBuf,
    consumed: Vec<String>,
}

impl MergeStage {
    pub fn new(spec: JoinSpec, staging_db: impl Into<PathBuf>) -> Self {
        let mut consumed = vec![spec.driving.clone()];
        consumed.extend(spec.steps.iter().map(|s| s.table.clone()));
        Self {
            spec,
            staging_db: staging_db.into(),
            consumed,
        }
    }
}

fn key_column<'a>(
    batch: &'a RecordBatch,
    table: &str,
    key: &str,
) -> FlowResult<&'a StringArray> {
    let idx = batch
        .schema()
        .index_of(key)
        .map_err(|_| Error::MissingColumn {
            table: table.to_string(),
            column: key.to_string(),
        })?;
    batch
        .column(idx)
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| Error::Merge {
            table: table.to_string(),
            reason: format!("key column '{key}' is not utf8"),
        })
}

/// Inner join of `left` and `right` on `key`. The key column is kept once,
/// from the left side; all other right-side columns are appended.
fn inner_join(
    left: &RecordBatch,
    left_name: &str,
    right: &RecordBatch,
    right_name: &str,
    key: &str,
) -> FlowResult<RecordBatch> {
    let left_keys = key_column(left, left_name, key)?;
    let right_keys = key_column(right, right_name, key)?;

    // Hash the right side: key value -> row indices.
    let mut index: HashMap<&str, Vec<u32>> = HashMap::new();
    for (i, value) in right_keys.iter().enumerate() {
        if let Some(v) = value {
            index.entry(v).or_default().push(i as u32);
        }
    }

    // Probe with the left side in order, so output order is deterministic.
    let mut left_take: Vec<u32> = Vec::new();
    let mut right_take: Vec<u32> = Vec::new();
    for (i, value) in left_keys.iter().enumerate() {
        let Some(v) = value else { continue };
        if let Some(matches) = index.get(v) {
            for &ri in matches {
                left_take.push(i as u32);
                right_take.push(ri);
            }
        }
    }
    let left_indices = UInt32Array::from(left_take);
    let right_indices = UInt32Array::from(right_take);

    let right_schema = right.schema();
    let key_idx = right_schema.index_of(key).expect("checked above");

    let mut fields: Vec<Field> = Vec::new();
    let mut arrays: Vec<arrow::array::ArrayRef> = Vec::new();
    for (i, field) in left.schema().fields().iter().enumerate() {
        fields.push(field.as_ref().clone());
        arrays.push(take(left.column(i).as_ref(), &left_indices, None)?);
    }
    for (i, field) in right_schema.fields().iter().enumerate() {
        if i == key_idx {
            continue;
        }
        fields.push(field.as_ref().clone());
        arrays.push(take(right.column(i).as_ref(), &right_indices, None)?);
    }

    Ok(RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays)?)
}

#[async_trait]
impl Stage for MergeStage {
    fn name(&self) -> &str {
        "merge_product_model"
    }

    fn produces(&self) -> Vec<&str> {
        vec![&self.spec.model_table]
    }

    fn consumes(&self) -> Vec<&str> {
        self.consumed.iter().map(String::as_str).collect()
    }

    async fn run(&self) -> FlowResult<StageReport> {
        let mut staging = Staging::open(&self.staging_db).map_err(|e| Error::Merge {
            table: self.spec.model_table.clone(),
            reason: e.to_string(),
        })?;

        let read = |staging: &Staging, table: &str| -> FlowResult<RecordBatch> {
            staging
                .read_table(table)
                .and_then(|s| s.concat())
                .map_err(|e| Error::Merge {
                    table: table.to_string(),
                    reason: e.to_string(),
                })
        };

        let mut merged = read(&staging, &self.spec.driving)?;
        // After the first join the left side is a combined batch, not any one
        // staged table; errors on it are attributed to "merged".
        let mut merged_name = self.spec.driving.as_str();
        for step in &self.spec.steps {
            let right = read(&staging, &step.table)?;
            let before = merged.num_rows();
            merged = inner_join(&merged, merged_name, &right, &step.table, &step.key)?;

            // Data-quality signal only; an inner join legitimately drops or
            // multiplies rows, so drift is a warning, never an error.
            if merged.num_rows() != before {
                tracing::warn!(
                    table = %step.table,
                    key = %step.key,
                    driving_rows = before,
                    joined_rows = merged.num_rows(),
                    "join cardinality drift"
                );
                metrics::inc_join_drift(&step.table);
            }
            merged_name = "merged";
        }

        let rows = staging
            .replace_table(&self.spec.model_table, &merged)
            .map_err(|e| Error::Merge {
                table: self.spec.model_table.clone(),
                reason: e.to_string(),
            })?;

        tracing::info!(table = %self.spec.model_table, rows, "model table written");
        Ok(StageReport { rows })
    }
}
