pub mod db;

pub use db::{RunLog, RunOutcome, StageOutcome, StageRecord};
