use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

use crate::dag::node::StageNode;
use crate::dag::resolver::ResolvedDag;
use crate::events::trigger::TriggerEvent;
use crate::scheduler::state::{RunState, RunStatus, StageStatus};
use crate::stage::{Stage, StageReport};
use crate::store::db::{RunLog, RunOutcome, StageOutcome, StageRecord};
use stageflow_utils::FlowResult;

/// A registered pipeline with its resolved DAG and stage implementations.
pub struct PipelineDef {
    pub name: String,
    pub dag: ResolvedDag,
    pub nodes: HashMap<String, StageNode>,
    pub stages: HashMap<String, Arc<dyn Stage>>,
}

/// Result of a single stage execution, sent back to the scheduler.
struct StageResult {
    run_id: String,
    stage_name: String,
    produced: HashSet<String>,
    result: FlowResult<StageReport>,
    duration_ms: u64,
}

fn now_iso() -> String {
    Utc::now().to_rfc3339()
}

/// The scheduler loop. Receives trigger events and orchestrates pipeline
/// runs. Overlapping firings for the same pipeline are queued, never run
/// concurrently: two full-replace writers racing on the same staging tables
/// is exactly the situation this loop exists to rule out.
pub async fn run_scheduler(
    mut event_rx: mpsc::Receiver<TriggerEvent>,
    pipelines: HashMap<String, PipelineDef>,
    run_log: Arc<Mutex<RunLog>>,
    mut shutdown_rx: tokio::sync::watch::Receiver<bool>,
) {
    let (result_tx, mut result_rx) = mpsc::channel::<StageResult>(256);
    let mut active_runs: HashMap<String, RunState> = HashMap::new();
    // Pipeline name -> run id of its active run.
    let mut active_by_pipeline: HashMap<String, String> = HashMap::new();
    let mut deferred: HashMap<String, VecDeque<TriggerEvent>> = HashMap::new();

    loop {
        tokio::select! {
            Some(event) = event_rx.recv() => {
                let Some(pipeline) = pipelines.get(&event.pipeline) else {
                    tracing::warn!(pipeline = %event.pipeline, "received trigger for unknown pipeline");
                    continue;
                };

                if active_by_pipeline.contains_key(&event.pipeline) {
                    tracing::warn!(
                        pipeline = %event.pipeline,
                        "trigger fired while a run is active; deferring"
                    );
                    deferred.entry(event.pipeline.clone()).or_default().push_back(event);
                    continue;
                }

                let run_id = start_run(pipeline, &event, &run_log, &result_tx, &mut active_runs).await;
                active_by_pipeline.insert(event.pipeline.clone(), run_id);
            }

            Some(stage_result) = result_rx.recv() => {
                let Some(run_state) = active_runs.get_mut(&stage_result.run_id) else {
                    continue;
                };

                let now = now_iso();
                let pipeline_name = run_state.pipeline.clone();
                let Some(pipeline) = pipelines.get(&pipeline_name) else { continue; };

                match &stage_result.result {
                    Ok(report) => {
                        {
                            let run_log = run_log.lock().await;
                            let _ = run_log.record_stage(&StageRecord {
                                id: &Uuid::new_v4().to_string(),
                                run_id: &stage_result.run_id,
                                stage_name: &stage_result.stage_name,
                                outcome: StageOutcome::Completed,
                                rows: Some(report.rows as i64),
                                started_at: &now,
                                finished_at: Some(&now),
                                duration_ms: Some(stage_result.duration_ms as i64),
                                error: None,
                            });
                        }
                        tracing::info!(
                            run = %stage_result.run_id,
                            stage = %stage_result.stage_name,
                            rows = report.rows,
                            duration_ms = stage_result.duration_ms,
                            "stage completed"
                        );
                        crate::metrics::add_rows(&pipeline_name, &stage_result.stage_name, report.rows);

                        let newly_ready = run_state.stage_completed(
                            &stage_result.stage_name,
                            &stage_result.produced,
                        );
                        for stage_name in &newly_ready {
                            run_state.stage_statuses.insert(stage_name.clone(), StageStatus::Running);
                            dispatch_stage(&stage_result.run_id, stage_name, pipeline, result_tx.clone());
                        }
                    }
                    Err(e) => {
                        tracing::error!(
                            run = %stage_result.run_id,
                            stage = %stage_result.stage_name,
                            error = %e,
                            "stage failed"
                        );
                        {
                            let run_log = run_log.lock().await;
                            let _ = run_log.record_stage(&StageRecord {
                                id: &Uuid::new_v4().to_string(),
                                run_id: &stage_result.run_id,
                                stage_name: &stage_result.stage_name,
                                outcome: StageOutcome::Failed,
                                rows: None,
                                started_at: &now,
                                finished_at: Some(&now),
                                duration_ms: Some(stage_result.duration_ms as i64),
                                error: Some(&e.to_string()),
                            });
                        }
                        run_state.stage_failed(&stage_result.stage_name);
                    }
                }

                if matches!(run_state.status, RunStatus::Completed | RunStatus::Failed) {
                    let duration = run_state.started_at.elapsed().as_millis() as i64;
                    let outcome = match run_state.status {
                        RunStatus::Completed => RunOutcome::Completed,
                        _ => RunOutcome::Failed,
                    };
                    {
                        let run_log = run_log.lock().await;
                        let _ = run_log.run_finished(
                            &stage_result.run_id, outcome, &now, duration,
                        );
                    }

                    if run_state.status == RunStatus::Completed {
                        crate::metrics::inc_run(&pipeline_name);
                    } else {
                        crate::metrics::inc_failure(&pipeline_name);
                    }
                    crate::metrics::observe_duration(&pipeline_name, duration as f64);
                    tracing::info!(
                        run = %stage_result.run_id,
                        pipeline = %pipeline_name,
                        status = %outcome,
                        duration_ms = duration,
                        "pipeline run finished"
                    );

                    active_runs.remove(&stage_result.run_id);
                    active_by_pipeline.remove(&pipeline_name);

                    // A deferred firing starts now that the pipeline is free.
                    if let Some(event) = deferred.get_mut(&pipeline_name).and_then(VecDeque::pop_front) {
                        let run_id = start_run(pipeline, &event, &run_log, &result_tx, &mut active_runs).await;
                        active_by_pipeline.insert(pipeline_name, run_id);
                    }
                }
            }

            _ = shutdown_rx.changed() => {
                tracing::info!("scheduler shutting down");
                break;
            }
        }
    }
}

/// Persist the run start and dispatch its root stages.
async fn start_run(
    pipeline: &PipelineDef,
    event: &TriggerEvent,
    run_log: &Arc<Mutex<RunLog>>,
    result_tx: &mpsc::Sender<StageResult>,
    active_runs: &mut HashMap<String, RunState>,
) -> String {
    let run_id = Uuid::new_v4().to_string();

    {
        let run_log = run_log.lock().await;
        let trigger_type = match &event.trigger {
            crate::events::trigger::Trigger::Interval(_) => "interval",
            crate::events::trigger::Trigger::Daily { .. } => "daily",
        };
        let _ = run_log.run_started(&run_id, &event.pipeline, trigger_type, &now_iso());
    }

    let stage_consumes: HashMap<String, HashSet<String>> = pipeline
        .nodes
        .iter()
        .map(|(name, node)| (name.clone(), node.consumes.clone()))
        .collect();

    let mut run_state = RunState::new(run_id.clone(), event.pipeline.clone(), stage_consumes);

    let ready = run_state.ready_stages();
    for stage_name in &ready {
        run_state
            .stage_statuses
            .insert(stage_name.clone(), StageStatus::Running);
        dispatch_stage(&run_id, stage_name, pipeline, result_tx.clone());
    }

    active_runs.insert(run_id.clone(), run_state);
    run_id
}

/// Dispatch a single stage for async execution.
fn dispatch_stage(
    run_id: &str,
    stage_name: &str,
    pipeline: &PipelineDef,
    result_tx: mpsc::Sender<StageResult>,
) {
    let run_id = run_id.to_string();
    let stage_name = stage_name.to_string();
    let produced = pipeline
        .nodes
        .get(&stage_name)
        .map(|n| n.produces.clone())
        .unwrap_or_default();
    let Some(stage) = pipeline.stages.get(&stage_name).cloned() else {
        tracing::error!(stage = %stage_name, "no implementation registered for stage");
        return;
    };

    tokio::spawn(async move {
        let start = std::time::Instant::now();
        let result = stage.run().await;
        let duration_ms = start.elapsed().as_millis() as u64;
        let _ = result_tx
            .send(StageResult {
                run_id,
                stage_name,
                produced,
                result,
                duration_ms,
            })
            .await;
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::{node::StageNode, resolver};
    use crate::events::trigger::Trigger;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct RecordingStage {
        name: String,
        produces: Vec<String>,
        consumes: Vec<String>,
        runs: Arc<AtomicUsize>,
        fail: bool,
    }

    #[async_trait]
    impl Stage for RecordingStage {
        fn name(&self) -> &str {
            &self.name
        }
        fn produces(&self) -> Vec<&str> {
            self.produces.iter().map(String::as_str).collect()
        }
        fn consumes(&self) -> Vec<&str> {
            self.consumes.iter().map(String::as_str).collect()
        }
        async fn run(&self) -> FlowResult<StageReport> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(stageflow_utils::Error::Extraction {
                    table: "DimProduct".to_string(),
                    reason: "source unreachable".to_string(),
                });
            }
            Ok(StageReport { rows: 1 })
        }
    }

    fn pipeline_def(stages: Vec<RecordingStage>) -> PipelineDef {
        let nodes: Vec<StageNode> = stages
            .iter()
            .map(|s| {
                StageNode::new(
                    s.name.clone(),
                    s.produces.clone(),
                    s.consumes.clone(),
                )
            })
            .collect();
        let dag = resolver::resolve(nodes.clone()).unwrap();
        let node_map: HashMap<String, StageNode> =
            nodes.into_iter().map(|n| (n.name.clone(), n)).collect();
        let stage_map: HashMap<String, Arc<dyn Stage>> = stages
            .into_iter()
            .map(|s| (s.name.clone(), Arc::new(s) as Arc<dyn Stage>))
            .collect();
        PipelineDef {
            name: "product_model".to_string(),
            dag,
            nodes: node_map,
            stages: stage_map,
        }
    }

    fn stage(
        name: &str,
        produces: &[&str],
        consumes: &[&str],
        runs: &Arc<AtomicUsize>,
        fail: bool,
    ) -> RecordingStage {
        RecordingStage {
            name: name.to_string(),
            produces: produces.iter().map(|s| s.to_string()).collect(),
            consumes: consumes.iter().map(|s| s.to_string()).collect(),
            runs: runs.clone(),
            fail,
        }
    }

    async fn run_once(def: PipelineDef, log: Arc<Mutex<RunLog>>) {
        let mut pipelines = HashMap::new();
        pipelines.insert("product_model".to_string(), def);

        let (event_tx, event_rx) = mpsc::channel(16);
        let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

        let handle = tokio::spawn(run_scheduler(event_rx, pipelines, log, shutdown_rx));

        event_tx
            .send(TriggerEvent {
                pipeline: "product_model".to_string(),
                trigger: Trigger::Daily { hour: 9, minute: 0 },
            })
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(300)).await;
        shutdown_tx.send(true).unwrap();
        let _ = tokio::time::timeout(Duration::from_secs(1), handle).await;
    }

    #[tokio::test]
    async fn scheduler_runs_all_phases_in_order() {
        let extract = Arc::new(AtomicUsize::new(0));
        let normalize = Arc::new(AtomicUsize::new(0));
        let merge = Arc::new(AtomicUsize::new(0));

        let def = pipeline_def(vec![
            stage("extract_dims", &["src_DimProduct"], &[], &extract, false),
            stage(
                "normalize_product",
                &["stg_DimProduct"],
                &["src_DimProduct"],
                &normalize,
                false,
            ),
            stage(
                "merge_product_model",
                &["prd_ProductModel"],
                &["stg_DimProduct"],
                &merge,
                false,
            ),
        ]);

        let log = Arc::new(Mutex::new(RunLog::in_memory().unwrap()));
        run_once(def, log.clone()).await;

        assert_eq!(extract.load(Ordering::SeqCst), 1);
        assert_eq!(normalize.load(Ordering::SeqCst), 1);
        assert_eq!(merge.load(Ordering::SeqCst), 1);

        let log = log.lock().await;
        let runs = log.recent_runs(10).unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, RunOutcome::Completed);
        let stages = log.stage_runs_for(&runs[0].id).unwrap();
        assert_eq!(stages.len(), 3);
    }

    #[tokio::test]
    async fn failed_extract_prevents_downstream_stages() {
        let extract = Arc::new(AtomicUsize::new(0));
        let normalize = Arc::new(AtomicUsize::new(0));

        let def = pipeline_def(vec![
            stage("extract_dims", &["src_DimProduct"], &[], &extract, true),
            stage(
                "normalize_product",
                &["stg_DimProduct"],
                &["src_DimProduct"],
                &normalize,
                false,
            ),
        ]);

        let log = Arc::new(Mutex::new(RunLog::in_memory().unwrap()));
        run_once(def, log.clone()).await;

        assert_eq!(extract.load(Ordering::SeqCst), 1);
        assert_eq!(normalize.load(Ordering::SeqCst), 0, "downstream must not run");

        let log = log.lock().await;
        let runs = log.recent_runs(10).unwrap();
        assert_eq!(runs[0].status, RunOutcome::Failed);
        let stages = log.stage_runs_for(&runs[0].id).unwrap();
        assert_eq!(stages.len(), 1);
        assert_eq!(stages[0].status, StageOutcome::Failed);
        assert!(stages[0].error.as_deref().unwrap().contains("DimProduct"));
    }

    #[tokio::test]
    async fn overlapping_triggers_are_serialized() {
        let extract = Arc::new(AtomicUsize::new(0));

        let def = pipeline_def(vec![stage(
            "extract_dims",
            &["src_DimProduct"],
            &[],
            &extract,
            false,
        )]);

        let mut pipelines = HashMap::new();
        pipelines.insert("product_model".to_string(), def);
        let log = Arc::new(Mutex::new(RunLog::in_memory().unwrap()));

        let (event_tx, event_rx) = mpsc::channel(16);
        let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
        let handle = tokio::spawn(run_scheduler(event_rx, pipelines, log.clone(), shutdown_rx));

        // Two firings back to back; the second must still run, after the
        // first finishes.
        for _ in 0..2 {
            event_tx
                .send(TriggerEvent {
                    pipeline: "product_model".to_string(),
                    trigger: Trigger::Daily { hour: 9, minute: 0 },
                })
                .await
                .unwrap();
        }

        tokio::time::sleep(Duration::from_millis(400)).await;
        shutdown_tx.send(true).unwrap();
        let _ = tokio::time::timeout(Duration::from_secs(1), handle).await;

        assert_eq!(extract.load(Ordering::SeqCst), 2);
        let log = log.lock().await;
        assert_eq!(log.recent_runs(10).unwrap().len(), 2);
    }
}
