use std::collections::HashSet;

/// A single stage in the DAG with its table contracts.
///
/// A stage may write several staged tables (the extract stage writes one raw
/// table per catalog entry), so `produces` is a set rather than a single
/// name.
#[derive(Debug, Clone)]
pub struct StageNode {
    pub name: String,
    pub produces: HashSet<String>,
    pub consumes: HashSet<String>,
}

impl StageNode {
    pub fn new(
        name: impl Into<String>,
        produces: impl IntoIterator<Item = impl Into<String>>,
        consumes: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            name: name.into(),
            produces: produces.into_iter().map(Into::into).collect(),
            consumes: consumes.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.consumes.is_empty()
    }

    pub fn is_terminal(&self) -> bool {
        self.produces.is_empty()
    }
}
