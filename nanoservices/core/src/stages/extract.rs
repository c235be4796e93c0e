//! The extract stage: copy every catalog table verbatim into `src_*`.

use std::path::PathBuf;
use std::time::Instant;

use async_trait::async_trait;
use stageflow_utils::{Error, FlowResult};

use crate::catalog::TableCatalog;
use crate::source::SourceSystem;
use crate::stage::{Stage, StageReport};
use crate::staging::Staging;

/// Staged name of the raw copy of a source table.
pub fn raw_table_name(source_table: &str) -> String {
    format!("src_{source_table}")
}

/// One logical stage covering the whole catalog: all tables are copied inside
/// a single `run`, and downstream stages only start once every copy
/// succeeded. If a table fails mid-way the stage aborts; tables already
/// copied remain in staging until the next successful run overwrites them.
pub struct ExtractStage {
    catalog: TableCatalog,
    source_db: PathBuf,
    staging_db: PathBuf,
    raw_tables: Vec<String>,
}

impl ExtractStage {
    pub fn new(
        catalog: TableCatalog,
        source_db: impl Into<PathBuf>,
        staging_db: impl Into<PathBuf>,
    ) -> Self {
        let raw_tables = catalog
            .allow_list()
            .iter()
            .map(|t| raw_table_name(t))
            .collect();
        Self {
            catalog,
            source_db: source_db.into(),
            staging_db: staging_db.into(),
            raw_tables,
        }
    }
}

#[async_trait]
impl Stage for ExtractStage {
    fn name(&self) -> &str {
        "extract_dims"
    }

    fn produces(&self) -> Vec<&str> {
        self.raw_tables.iter().map(String::as_str).collect()
    }

    fn consumes(&self) -> Vec<&str> {
        Vec::new()
    }

    async fn run(&self) -> FlowResult<StageReport> {
        let source = SourceSystem::open(&self.source_db).map_err(|e| Error::Extraction {
            table: "<source>".to_string(),
            reason: e.to_string(),
        })?;
        let mut staging = Staging::open(&self.staging_db).map_err(|e| Error::Extraction {
            table: "<staging>".to_string(),
            reason: e.to_string(),
        })?;

        let tables = self.catalog.list_tables(&source)?;

        let started = Instant::now();
        let mut rows_imported: u64 = 0;
        for table in &tables {
            let stream = source.fetch_table(table).map_err(|e| Error::Extraction {
                table: table.clone(),
                reason: e.to_string(),
            })?;
            let batch = stream.concat().map_err(|e| Error::Extraction {
                table: table.clone(),
                reason: e.to_string(),
            })?;

            tracing::info!(
                table = %table,
                from = rows_imported,
                to = rows_imported + batch.num_rows() as u64,
                "importing rows"
            );
            let written = staging
                .replace_table(&raw_table_name(table), &batch)
                .map_err(|e| Error::Extraction {
                    table: table.clone(),
                    reason: e.to_string(),
                })?;
            rows_imported += written;
        }
        tracing::info!(
            tables = tables.len(),
            rows = rows_imported,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "extract complete"
        );

        Ok(StageReport {
            rows: rows_imported,
        })
    }
}
