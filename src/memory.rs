// incident_ingestor/src/memory.rs
// In-process graph store with the same merge semantics as the Neo4j backend.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use tracing::{debug, info};

use crate::error::{IngestorError, Result};
use crate::plan::{NodeRef, Operation, Properties};
use crate::schema::{Label, validate_identifier};
use crate::store::GraphStore;

/// A stored relationship: (type, start, end).
pub type Edge = (String, NodeRef, NodeRef);

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphSnapshot {
    pub nodes: BTreeMap<NodeRef, Properties>,
    pub edges: BTreeSet<Edge>,
}

#[derive(Debug, Default)]
struct State {
    graph:       GraphSnapshot,
    batch_sizes: Vec<usize>,
    constraints: BTreeSet<Label>,
}

/// Graph kept in memory. Used for dry runs and tests.
#[derive(Debug, Default)]
pub struct MemoryGraph {
    state:         Mutex<State>,
    /// 1-based index of a batch that should fail instead of committing.
    fail_on_batch: Option<usize>,
}

impl MemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose `n`-th batch (1-based) fails; earlier batches commit normally.
    pub fn failing_on_batch(n: usize) -> Self {
        Self { fail_on_batch: Some(n), ..Self::default() }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn snapshot(&self) -> GraphSnapshot {
        self.lock().graph.clone()
    }

    pub fn node_count(&self, label: Label) -> usize {
        self.lock().graph.nodes.keys().filter(|n| n.label == label).count()
    }

    pub fn node(&self, node: &NodeRef) -> Option<Properties> {
        self.lock().graph.nodes.get(node).cloned()
    }

    pub fn edge_count(&self, rel_type: &str) -> usize {
        self.lock().graph.edges.iter().filter(|(t, _, _)| t == rel_type).count()
    }

    pub fn total_nodes(&self) -> usize {
        self.lock().graph.nodes.len()
    }

    pub fn total_edges(&self) -> usize {
        self.lock().graph.edges.len()
    }

    /// Sizes of all committed batches, in commit order.
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.lock().batch_sizes.clone()
    }

    pub fn constrained_labels(&self) -> Vec<Label> {
        self.lock().constraints.iter().copied().collect()
    }
}

fn apply(graph: &mut GraphSnapshot, op: &Operation) -> Result<()> {
    match op {
        Operation::Node(upsert) => {
            let props = graph.nodes.entry(upsert.node.clone()).or_default();
            for (k, v) in &upsert.props {
                props.insert(k.clone(), v.clone());
            }
        },
        Operation::Relationship(rel) => {
            validate_identifier(&rel.rel_type)?;
            if graph.nodes.contains_key(&rel.from) && graph.nodes.contains_key(&rel.to) {
                graph.edges.insert((rel.rel_type.clone(), rel.from.clone(), rel.to.clone()));
            } else {
                debug!("Skipping {} {} -> {}: endpoint missing", rel.rel_type, rel.from, rel.to);
            }
        },
    }
    Ok(())
}

#[async_trait]
impl GraphStore for MemoryGraph {
    async fn apply_batch(&self, batch: &[Operation]) -> Result<()> {
        let mut state = self.lock();
        if self.fail_on_batch == Some(state.batch_sizes.len() + 1) {
            return Err(IngestorError::DatabaseError("injected batch failure".into()));
        }

        // Work on a copy so a failing operation leaves the committed graph untouched.
        let mut graph = state.graph.clone();
        let (nodes, rels): (Vec<&Operation>, Vec<&Operation>) = batch.iter().partition(|op| op.is_node());
        for op in nodes.into_iter().chain(rels) {
            apply(&mut graph, op)?;
        }
        state.graph = graph;
        state.batch_sizes.push(batch.len());
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        let mut state = self.lock();
        state.graph = GraphSnapshot::default();
        info!("In-memory graph cleared");
        Ok(())
    }

    async fn ensure_constraints(&self, labels: &[Label]) -> Result<()> {
        self.lock().constraints.extend(labels.iter().copied());
        Ok(())
    }

    async fn close(self) -> Result<()> {
        let state = self.lock();
        info!(
            "In-memory graph closed with {} nodes and {} relationships",
            state.graph.nodes.len(),
            state.graph.edges.len()
        );
        Ok(())
    }
}
