pub use stageflow_core as core;
pub use stageflow_utils as utils;

// Convenience re-exports for common usage
pub use stageflow_core::builder::PipelineBuilder;
pub use stageflow_core::config::loader::load_config;
pub use stageflow_core::config::types::FlowConfig;
pub use stageflow_core::engine::FlowEngine;
pub use stageflow_core::events::trigger::Trigger;
pub use stageflow_core::pipeline::product_model_pipeline;
pub use stageflow_core::stage::{Stage, StageReport};
pub use stageflow_utils::{FlowResult, TableStream};
