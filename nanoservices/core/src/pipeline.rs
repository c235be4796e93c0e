//! The product-model pipeline definition.

use crate::builder::{BuildError, PipelineBuilder};
use crate::catalog::TableCatalog;
use crate::config::types::FlowConfig;
use crate::events::trigger::Trigger;
use crate::scheduler::runner::PipelineDef;
use crate::stages::extract::ExtractStage;
use crate::stages::merge::{JoinSpec, MergeStage};
use crate::stages::normalize::NormalizeStage;
use crate::stages::specs;

/// Assemble the extract → normalize → merge pipeline from a config.
///
/// The DAG shape falls out of the stage contracts: the extract stage
/// produces the three `src_*` tables, each normalizer consumes one of them
/// and produces its `stg_*` table, and the merge stage consumes all three
/// staged tables. The three normalizers share no contract, so the scheduler
/// is free to run them concurrently.
pub fn product_model_pipeline(cfg: &FlowConfig) -> Result<(Trigger, PipelineDef), BuildError> {
    let trigger = cfg.trigger.to_trigger()?;
    let catalog = TableCatalog::product_dims();

    let (trigger, def) = PipelineBuilder::new(&cfg.pipeline)
        .trigger(trigger)
        .stage(ExtractStage::new(catalog, &cfg.source_db, &cfg.staging_db))
        .stage(NormalizeStage::new(specs::product_spec(), &cfg.staging_db))
        .stage(NormalizeStage::new(specs::subcategory_spec(), &cfg.staging_db))
        .stage(NormalizeStage::new(specs::category_spec(), &cfg.staging_db))
        .stage(MergeStage::new(JoinSpec::product_model(), &cfg.staging_db))
        .build()?;

    Ok((trigger, def))
}
