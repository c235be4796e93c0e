use std::collections::{HashMap, HashSet, VecDeque};

use crate::dag::node::StageNode;

/// Errors that can occur while resolving stage contracts into a DAG.
#[derive(Debug, thiserror::Error)]
pub enum DagError {
    #[error("no stage produces staged table: {0}")]
    MissingProducer(String),

    #[error("multiple stages produce staged table '{0}': {1:?}")]
    AmbiguousProducer(String, Vec<String>),

    #[error("cycle detected involving stages: {0:?}")]
    CycleDetected(Vec<String>),
}

/// A resolved DAG with a safe execution order.
#[derive(Debug)]
pub struct ResolvedDag {
    /// Stages in topological order.
    pub order: Vec<String>,
    /// Stage name -> stages it must wait for.
    pub dependencies: HashMap<String, HashSet<String>>,
    /// Stage name -> stages that depend on it.
    pub dependents: HashMap<String, HashSet<String>>,
}

/// Resolve stage nodes into an execution DAG based on their table contracts.
/// The only edge semantic is "every producer of a table I read must succeed
/// before I start".
pub fn resolve(nodes: Vec<StageNode>) -> Result<ResolvedDag, DagError> {
    // Producer index: staged table -> stage name, unique by construction.
    let mut producers: HashMap<String, String> = HashMap::new();
    for node in &nodes {
        for table in &node.produces {
            if let Some(existing) = producers.get(table) {
                return Err(DagError::AmbiguousProducer(
                    table.clone(),
                    vec![existing.clone(), node.name.clone()],
                ));
            }
            producers.insert(table.clone(), node.name.clone());
        }
    }

    let mut dependencies: HashMap<String, HashSet<String>> = HashMap::new();
    let mut dependents: HashMap<String, HashSet<String>> = HashMap::new();

    for node in &nodes {
        let deps: HashSet<String> = node
            .consumes
            .iter()
            .map(|table| {
                producers
                    .get(table)
                    .cloned()
                    .ok_or_else(|| DagError::MissingProducer(table.clone()))
            })
            .collect::<Result<HashSet<_>, _>>()?;

        for dep in &deps {
            dependents
                .entry(dep.clone())
                .or_default()
                .insert(node.name.clone());
        }

        dependencies.insert(node.name.clone(), deps);
    }

    for node in &nodes {
        dependencies.entry(node.name.clone()).or_default();
        dependents.entry(node.name.clone()).or_default();
    }

    // Kahn's algorithm.
    let mut in_degree: HashMap<String, usize> = HashMap::new();
    for node in &nodes {
        in_degree.insert(node.name.clone(), dependencies[&node.name].len());
    }

    let mut queue: VecDeque<String> = nodes
        .iter()
        .filter(|n| in_degree[&n.name] == 0)
        .map(|n| n.name.clone())
        .collect();

    let mut order: Vec<String> = Vec::new();
    while let Some(stage) = queue.pop_front() {
        order.push(stage.clone());
        for dependent in dependents.get(&stage).cloned().unwrap_or_default() {
            let deg = in_degree.get_mut(&dependent).unwrap();
            *deg -= 1;
            if *deg == 0 {
                queue.push_back(dependent);
            }
        }
    }

    if order.len() != nodes.len() {
        let remaining: Vec<String> = in_degree
            .into_iter()
            .filter(|(_, deg)| *deg > 0)
            .map(|(name, _)| name)
            .collect();
        return Err(DagError::CycleDetected(remaining));
    }

    Ok(ResolvedDag {
        order,
        dependencies,
        dependents,
    })
}
