use std::collections::HashMap;
use std::sync::Arc;

use crate::config::loader::ConfigError;
use crate::dag::node::StageNode;
use crate::dag::resolver::{self, DagError};
use crate::events::trigger::Trigger;
use crate::scheduler::runner::PipelineDef;
use crate::stage::Stage;

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("pipeline name is required")]
    NoName,
    #[error("trigger is required")]
    NoTrigger,
    #[error("at least one stage is required")]
    NoStages,
    #[error("DAG resolution failed: {0}")]
    Dag(#[from] DagError),
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

/// Assembles a [`PipelineDef`] from stage implementations. The DAG shape is
/// taken from each stage's `produces`/`consumes` metadata, never declared by
/// hand, so the wiring and the code cannot drift apart.
pub struct PipelineBuilder {
    name: Option<String>,
    trigger: Option<Trigger>,
    stages: Vec<(String, Arc<dyn Stage>)>,
}

impl PipelineBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            trigger: None,
            stages: Vec::new(),
        }
    }

    pub fn trigger(mut self, trigger: Trigger) -> Self {
        self.trigger = Some(trigger);
        self
    }

    pub fn stage(mut self, stage: impl Stage + 'static) -> Self {
        let name = stage.name().to_string();
        self.stages.push((name, Arc::new(stage)));
        self
    }

    pub fn build(self) -> Result<(Trigger, PipelineDef), BuildError> {
        let name = self.name.ok_or(BuildError::NoName)?;
        let trigger = self.trigger.ok_or(BuildError::NoTrigger)?;

        if self.stages.is_empty() {
            return Err(BuildError::NoStages);
        }

        let mut nodes = Vec::new();
        let mut stage_map: HashMap<String, Arc<dyn Stage>> = HashMap::new();

        for (stage_name, stage) in self.stages {
            nodes.push(StageNode::new(
                &stage_name,
                stage.produces(),
                stage.consumes(),
            ));
            stage_map.insert(stage_name, stage);
        }

        let dag = resolver::resolve(nodes.clone())?;

        let node_map: HashMap<String, StageNode> =
            nodes.into_iter().map(|n| (n.name.clone(), n)).collect();

        Ok((
            trigger,
            PipelineDef {
                name,
                dag,
                nodes: node_map,
                stages: stage_map,
            },
        ))
    }
}
