use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};

use crate::events::bus::EventBus;
use crate::events::clock::{spawn_daily_trigger, spawn_interval_trigger};
use crate::events::trigger::Trigger;
use crate::scheduler::runner::{self, PipelineDef};
use crate::store::db::RunLog;
use stageflow_utils::FlowResult;

/// Top-level orchestrator. Users register pipelines and call run().
pub struct FlowEngine {
    pipelines: Vec<(Trigger, PipelineDef)>,
    run_log_path: Option<PathBuf>,
}

impl Default for FlowEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl FlowEngine {
    pub fn new() -> Self {
        Self {
            pipelines: Vec::new(),
            run_log_path: None,
        }
    }

    /// Set the path for the run history database. Defaults to in-memory.
    pub fn run_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.run_log_path = Some(path.into());
        self
    }

    /// Add a pipeline (trigger + definition).
    pub fn add_pipeline(mut self, trigger: Trigger, def: PipelineDef) -> Self {
        self.pipelines.push((trigger, def));
        self
    }

    /// Run the orchestrator until Ctrl-C.
    pub async fn run(self) -> FlowResult<()> {
        let shutdown = tokio::signal::ctrl_c();
        self.run_with_shutdown(async {
            let _ = shutdown.await;
        })
        .await
    }

    /// Run with a custom shutdown signal (useful for testing).
    pub async fn run_with_shutdown<F: std::future::Future>(self, shutdown: F) -> FlowResult<()> {
        let run_log = match &self.run_log_path {
            Some(path) => RunLog::open(path)?,
            None => RunLog::in_memory()?,
        };

        // Crash recovery: runs left 'running' by a previous process did not
        // finish.
        let crashed = run_log.recover_crashed_runs().unwrap_or(0);
        if crashed > 0 {
            tracing::warn!(count = crashed, "marked in-flight runs as crashed from previous session");
        }

        let run_log = Arc::new(Mutex::new(run_log));

        let bus = EventBus::new(256);
        let (event_tx, event_rx) = bus.split();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut trigger_handles = Vec::new();
        let mut pipeline_defs = HashMap::new();

        for (trigger, def) in self.pipelines {
            let pipeline_name = def.name.clone();
            let handle = match trigger {
                Trigger::Interval(duration) => {
                    spawn_interval_trigger(pipeline_name.clone(), duration, event_tx.clone())
                }
                Trigger::Daily { hour, minute } => {
                    spawn_daily_trigger(pipeline_name.clone(), hour, minute, event_tx.clone())
                }
            };
            trigger_handles.push(handle);
            pipeline_defs.insert(pipeline_name, def);
        }

        // Drop our copy of the sender so the scheduler sees the channel close
        // on shutdown.
        drop(event_tx);

        let scheduler_handle = tokio::spawn(runner::run_scheduler(
            event_rx,
            pipeline_defs,
            run_log,
            shutdown_rx,
        ));

        shutdown.await;

        let _ = shutdown_tx.send(true);

        for handle in trigger_handles {
            handle.abort();
        }

        let _ = scheduler_handle.await;

        tracing::info!("stageflow shutdown complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::PipelineBuilder;
    use crate::stage::{Stage, StageReport};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct CountingStage {
        count: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl Stage for CountingStage {
        fn name(&self) -> &str {
            "count"
        }
        fn produces(&self) -> Vec<&str> {
            vec!["counts"]
        }
        fn consumes(&self) -> Vec<&str> {
            vec![]
        }
        async fn run(&self) -> FlowResult<StageReport> {
            self.count.fetch_add(1, Ordering::SeqCst);
            Ok(StageReport { rows: 1 })
        }
    }

    #[tokio::test]
    async fn engine_runs_and_shuts_down() {
        let run_count = Arc::new(AtomicUsize::new(0));

        let (trigger, def) = PipelineBuilder::new("test")
            .trigger(Trigger::Interval(Duration::from_millis(50)))
            .stage(CountingStage {
                count: run_count.clone(),
            })
            .build()
            .unwrap();

        let engine = FlowEngine::new().add_pipeline(trigger, def);

        engine
            .run_with_shutdown(async {
                tokio::time::sleep(Duration::from_millis(300)).await;
            })
            .await
            .unwrap();

        let count = run_count.load(Ordering::SeqCst);
        assert!(count >= 2, "expected at least 2 runs, got {count}");
    }
}
