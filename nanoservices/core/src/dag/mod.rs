pub mod node;
pub mod resolver;

pub use node::StageNode;
pub use resolver::{resolve, DagError, ResolvedDag};
