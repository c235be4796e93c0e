use async_trait::async_trait;
use stageflow_utils::FlowResult;

/// What a finished stage reports back to the scheduler.
#[derive(Debug, Clone, Copy, Default)]
pub struct StageReport {
    /// Rows written by this stage (logging and metrics only; correctness
    /// never depends on this number).
    pub rows: u64,
}

/// A pipeline stage with its data contracts.
///
/// Contract names are staging table names (`src_*`, `stg_*`, `prd_*`): a
/// stage declares which staged tables it writes and which it reads, and the
/// DAG resolver orders stages so that every table is written before anything
/// reads it. Stages open their own database connections inside `run` and
/// release them on every exit path.
#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> &str;

    /// Staged tables this stage writes.
    fn produces(&self) -> Vec<&str>;

    /// Staged tables this stage reads.
    fn consumes(&self) -> Vec<&str>;

    async fn run(&self) -> FlowResult<StageReport>;
}
