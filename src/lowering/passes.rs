// This module defines the graph-transform seam used by the generic lowering backend. The
// GraphTransform trait is the collaborator interface: it receives the partition graph and the
// compile spec (read-only) and returns the graph that is actually walked. PassManager is the
// shipped implementation and runs an ordered list of GraphPass values over a copy of the
// graph. Two structural passes are provided: EliminateDeadNodes drops call_function nodes
// whose results nobody reads, and AnnotateDimOrder records a channels-last dimension order
// on rank-4 values when the compile spec requests NHWC permutation. Passes may drop or annotate
// nodes but never rename them, so metadata lookups by node name keep working.

//! Graph transforms applied before lowering.

use std::collections::HashSet;

use crate::core::DelegateResult;
use crate::graph::{Graph, NodeKind};
use crate::spec::{is_layout_permuted, CompileSpec};

/// Annotation key holding a comma separated physical dimension order.
pub const DIM_ORDER: &str = "dim_order";

/// Channels-last order for rank-4 tensors.
pub const NHWC_ORDER: &str = "0,2,3,1";

/// Rewrites a graph before it is lowered.
pub trait GraphTransform: Send + Sync {
    fn transform(&self, graph: &Graph, compile_spec: &[CompileSpec]) -> DelegateResult<Graph>;
}

/// One step of a [`PassManager`] pipeline.
pub trait GraphPass: Send + Sync {
    fn name(&self) -> &'static str;

    fn run(&self, graph: &mut Graph, compile_spec: &[CompileSpec]) -> DelegateResult<()>;
}

/// Runs passes in registration order.
pub struct PassManager {
    passes: Vec<Box<dyn GraphPass>>,
}

impl PassManager {
    /// A pipeline without passes; transforming returns an unchanged copy.
    pub fn new() -> Self {
        Self { passes: Vec::new() }
    }

    /// The pipeline run in front of the generic lowering.
    pub fn backend_pipeline() -> Self {
        Self::new()
            .with_pass(Box::new(EliminateDeadNodes))
            .with_pass(Box::new(AnnotateDimOrder))
    }

    pub fn with_pass(mut self, pass: Box<dyn GraphPass>) -> Self {
        self.passes.push(pass);
        self
    }

    pub fn pass_names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|pass| pass.name()).collect()
    }
}

impl Default for PassManager {
    fn default() -> Self {
        Self::backend_pipeline()
    }
}

impl GraphTransform for PassManager {
    fn transform(&self, graph: &Graph, compile_spec: &[CompileSpec]) -> DelegateResult<Graph> {
        let mut transformed = graph.clone();
        for pass in &self.passes {
            log::debug!("Running pass {}", pass.name());
            pass.run(&mut transformed, compile_spec)?;
        }
        Ok(transformed)
    }
}

/// Removes `call_function` nodes whose values are never used.
pub struct EliminateDeadNodes;

impl GraphPass for EliminateDeadNodes {
    fn name(&self) -> &'static str {
        "eliminate_dead_nodes"
    }

    fn run(&self, graph: &mut Graph, _compile_spec: &[CompileSpec]) -> DelegateResult<()> {
        let mut used: HashSet<String> = HashSet::new();
        let mut live: HashSet<String> = HashSet::new();

        for node in graph.nodes.iter().rev() {
            if node.kind == NodeKind::CallFunction && !used.contains(&node.name) {
                continue;
            }
            live.insert(node.name.clone());
            used.extend(node.input_nodes().map(str::to_string));
        }

        let before = graph.nodes.len();
        graph.nodes.retain(|node| live.contains(&node.name));
        if graph.nodes.len() != before {
            log::debug!("Removed {} dead nodes", before - graph.nodes.len());
        }
        Ok(())
    }
}

/// Marks rank-4 values channels-last when NHWC permutation is requested.
pub struct AnnotateDimOrder;

impl GraphPass for AnnotateDimOrder {
    fn name(&self) -> &'static str {
        "annotate_dim_order"
    }

    fn run(&self, graph: &mut Graph, compile_spec: &[CompileSpec]) -> DelegateResult<()> {
        if !is_layout_permuted(compile_spec) {
            return Ok(());
        }
        for node in &mut graph.nodes {
            if node.meta.tensor.as_ref().is_some_and(|meta| meta.rank() == 4) {
                node.meta
                    .annotations
                    .insert(DIM_ORDER.to_string(), NHWC_ORDER.to_string());
            }
        }
        Ok(())
    }
}
