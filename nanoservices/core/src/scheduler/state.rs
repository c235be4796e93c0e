use std::collections::{HashMap, HashSet};

/// Status of a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    Triggered,
    Running,
    Completed,
    Failed,
}

/// Status of an individual stage within a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageStatus {
    Waiting,
    Ready,
    Running,
    Completed,
    Failed,
    Skipped,
}

/// In-memory state for a single pipeline run.
///
/// Unlike a dataflow engine, stages here exchange data through the staging
/// database, so the run state only needs to know *which* staged tables have
/// been produced, not hold their contents.
#[derive(Debug)]
pub struct RunState {
    pub id: String,
    pub pipeline: String,
    pub status: RunStatus,
    pub stage_statuses: HashMap<String, StageStatus>,
    /// Staged tables written so far in this run.
    pub available: HashSet<String>,
    /// Stage name -> staged tables it needs.
    pub stage_consumes: HashMap<String, HashSet<String>>,
    pub started_at: std::time::Instant,
}

impl RunState {
    pub fn new(
        id: String,
        pipeline: String,
        stage_consumes: HashMap<String, HashSet<String>>,
    ) -> Self {
        let mut stage_statuses = HashMap::new();
        for (stage, deps) in &stage_consumes {
            if deps.is_empty() {
                stage_statuses.insert(stage.clone(), StageStatus::Ready);
            } else {
                stage_statuses.insert(stage.clone(), StageStatus::Waiting);
            }
        }
        Self {
            id,
            pipeline,
            status: RunStatus::Triggered,
            stage_statuses,
            available: HashSet::new(),
            stage_consumes,
            started_at: std::time::Instant::now(),
        }
    }

    /// Record that a stage completed and its tables are now available.
    /// Returns the stages that became ready.
    pub fn stage_completed(
        &mut self,
        stage_name: &str,
        produced: &HashSet<String>,
    ) -> Vec<String> {
        self.stage_statuses
            .insert(stage_name.to_string(), StageStatus::Completed);
        self.available.extend(produced.iter().cloned());

        let mut newly_ready = Vec::new();
        for (name, status) in &self.stage_statuses {
            if *status != StageStatus::Waiting {
                continue;
            }
            if let Some(deps) = self.stage_consumes.get(name) {
                if deps.iter().all(|d| self.available.contains(d)) {
                    newly_ready.push(name.clone());
                }
            }
        }

        for name in &newly_ready {
            self.stage_statuses.insert(name.clone(), StageStatus::Ready);
        }

        let in_flight = self
            .stage_statuses
            .values()
            .any(|s| matches!(s, StageStatus::Ready | StageStatus::Running));
        if in_flight {
            self.status = RunStatus::Running;
        } else if self
            .stage_statuses
            .values()
            .any(|s| *s == StageStatus::Failed)
        {
            // A sibling failed earlier while this stage was still running;
            // now that nothing is in flight, sweep the stragglers.
            self.skip_waiting();
            self.status = RunStatus::Failed;
        } else {
            self.status = RunStatus::Completed;
        }

        newly_ready
    }

    fn skip_waiting(&mut self) {
        let waiting: Vec<String> = self
            .stage_statuses
            .iter()
            .filter(|(_, s)| **s == StageStatus::Waiting)
            .map(|(n, _)| n.clone())
            .collect();
        for name in waiting {
            self.stage_statuses.insert(name, StageStatus::Skipped);
        }
    }

    /// Mark a stage as failed. Once nothing is still in flight, all waiting
    /// stages are skipped and the run is failed. Returns true when the run is
    /// complete.
    pub fn stage_failed(&mut self, stage_name: &str) -> bool {
        self.stage_statuses
            .insert(stage_name.to_string(), StageStatus::Failed);

        let all_done = self
            .stage_statuses
            .values()
            .all(|s| !matches!(s, StageStatus::Ready | StageStatus::Running));

        if all_done {
            self.skip_waiting();
            self.status = RunStatus::Failed;
            true
        } else {
            false
        }
    }

    /// All stages currently in Ready status.
    pub fn ready_stages(&self) -> Vec<String> {
        self.stage_statuses
            .iter()
            .filter(|(_, s)| **s == StageStatus::Ready)
            .map(|(n, _)| n.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product_consumes() -> HashMap<String, HashSet<String>> {
        let mut consumes = HashMap::new();
        consumes.insert("extract_dims".to_string(), HashSet::new());
        consumes.insert(
            "normalize_product".to_string(),
            ["src_DimProduct".to_string()].into(),
        );
        consumes.insert(
            "normalize_category".to_string(),
            ["src_DimProductCategory".to_string()].into(),
        );
        consumes.insert(
            "merge_product_model".to_string(),
            [
                "stg_DimProduct".to_string(),
                "stg_DimProductCategory".to_string(),
            ]
            .into(),
        );
        consumes
    }

    fn extract_produced() -> HashSet<String> {
        [
            "src_DimProduct".to_string(),
            "src_DimProductCategory".to_string(),
        ]
        .into()
    }

    #[test]
    fn extract_starts_ready_everything_else_waits() {
        let state = RunState::new(
            "run-1".to_string(),
            "product_model".to_string(),
            product_consumes(),
        );

        assert_eq!(state.stage_statuses["extract_dims"], StageStatus::Ready);
        assert_eq!(
            state.stage_statuses["normalize_product"],
            StageStatus::Waiting
        );
        assert_eq!(
            state.stage_statuses["merge_product_model"],
            StageStatus::Waiting
        );
    }

    #[test]
    fn extract_completion_readies_all_normalizers() {
        let mut state = RunState::new(
            "run-1".to_string(),
            "product_model".to_string(),
            product_consumes(),
        );

        let mut newly_ready = state.stage_completed("extract_dims", &extract_produced());
        newly_ready.sort();
        assert_eq!(newly_ready, vec!["normalize_category", "normalize_product"]);
        assert_eq!(
            state.stage_statuses["merge_product_model"],
            StageStatus::Waiting
        );
    }

    #[test]
    fn merge_waits_for_every_normalizer() {
        let mut state = RunState::new(
            "run-1".to_string(),
            "product_model".to_string(),
            product_consumes(),
        );

        state.stage_completed("extract_dims", &extract_produced());
        let ready = state.stage_completed(
            "normalize_product",
            &["stg_DimProduct".to_string()].into(),
        );
        assert!(ready.is_empty(), "merge must not start on a partial phase");

        let ready = state.stage_completed(
            "normalize_category",
            &["stg_DimProductCategory".to_string()].into(),
        );
        assert_eq!(ready, vec!["merge_product_model"]);
    }

    #[test]
    fn run_completes_when_all_stages_done() {
        let mut state = RunState::new(
            "run-1".to_string(),
            "product_model".to_string(),
            product_consumes(),
        );

        state.stage_completed("extract_dims", &extract_produced());
        state.stage_completed("normalize_product", &["stg_DimProduct".to_string()].into());
        state.stage_completed(
            "normalize_category",
            &["stg_DimProductCategory".to_string()].into(),
        );
        state.stage_completed(
            "merge_product_model",
            &["prd_ProductModel".to_string()].into(),
        );

        assert_eq!(state.status, RunStatus::Completed);
    }

    #[test]
    fn failure_skips_downstream_and_fails_run() {
        let mut state = RunState::new(
            "run-1".to_string(),
            "product_model".to_string(),
            product_consumes(),
        );

        let complete = state.stage_failed("extract_dims");
        assert!(complete);
        assert_eq!(state.status, RunStatus::Failed);
        assert_eq!(
            state.stage_statuses["normalize_product"],
            StageStatus::Skipped
        );
        assert_eq!(
            state.stage_statuses["merge_product_model"],
            StageStatus::Skipped
        );
    }

    #[test]
    fn failure_waits_for_inflight_siblings() {
        let mut state = RunState::new(
            "run-1".to_string(),
            "product_model".to_string(),
            product_consumes(),
        );

        state.stage_completed("extract_dims", &extract_produced());
        state
            .stage_statuses
            .insert("normalize_product".to_string(), StageStatus::Running);
        state
            .stage_statuses
            .insert("normalize_category".to_string(), StageStatus::Running);

        // One normalizer fails while its sibling is still running; the run
        // is not finished yet.
        let complete = state.stage_failed("normalize_product");
        assert!(!complete);

        // The sibling lands afterwards; merge can never become ready, so the
        // run sweeps to failed and merge is skipped.
        state.stage_completed(
            "normalize_category",
            &["stg_DimProductCategory".to_string()].into(),
        );
        assert_eq!(state.status, RunStatus::Failed);
        assert_eq!(
            state.stage_statuses["merge_product_model"],
            StageStatus::Skipped
        );
    }
}
