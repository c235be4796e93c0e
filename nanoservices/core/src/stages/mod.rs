pub mod extract;
pub mod merge;
pub mod normalize;
pub mod specs;

pub use extract::ExtractStage;
pub use merge::{JoinSpec, JoinStep, MergeStage};
pub use normalize::{NormalizeSpec, NormalizeStage};
