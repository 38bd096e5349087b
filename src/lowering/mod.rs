// This module implements the generic lowering backend, which turns a partition graph into the
// hardware-independent tensor-operator artifact. GenericLoweringBackend checks that the
// compile spec targets the generic format, runs the graph transform, resolves the operator
// visitors the graph needs and then walks the transformed nodes exactly once: call_function
// nodes go to their visitor, placeholders become input bindings taken from the original
// graph's signature, the output node becomes an output binding, and any other node kind
// aborts the walk. The artifact under construction lives in a DumpScope, which writes the
// success dump (artifact plus descriptor) or, on any early exit, a single failure
// diagnostic. The backend also exposes filter_relevant_spec so the hardware backend can
// reuse the generic subset of its own configuration.

//! Generic lowering backend.
//!
//! ```text
//! check output_format=generic
//! graph' = transform(graph, spec)
//! visitors = registry.resolve(graph')
//! for node in graph'.nodes {
//!     call_function -> visitors[node.target].define_node(..)
//!     placeholder   -> input binding from graph.signature
//!     output        -> output binding
//!     _             -> UnsupportedNodeKind
//! }
//! dump (optional), serialize
//! ```

use hashbrown::HashMap;

pub mod artifact;
pub mod dump;
pub mod passes;
pub mod visitors;

pub use artifact::{Artifact, ArtifactBuilder, AttrValue, Attribute, Record, TensorDesc};
pub use dump::DumpScope;
pub use passes::{GraphPass, GraphTransform, PassManager};
pub use visitors::{NodeVisitor, VisitorRegistry};

use crate::core::{DelegateError, DelegateResult, LoweringSession};
use crate::graph::{Graph, Node, NodeKind};
use crate::spec::{
    intermediate_dump_path, is_generic_format, keys, CompileSpec, OutputFormat,
};

/// Bytes produced by a backend for one partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreprocessResult {
    pub processed_bytes: Vec<u8>,
}

/// Keys the generic backend understands besides `output_format`.
const GENERIC_SPEC_KEYS: [&str; 2] = [keys::DEBUG_ARTIFACT_PATH, keys::PERMUTE_MEMORY_FORMAT];

/// Lowers graphs to the generic tensor-operator artifact.
///
/// Used on its own to obtain the generic representation, or composed into
/// [`ChainedHardwareBackend`](crate::hardware::ChainedHardwareBackend) as the
/// first step towards an accelerator binary.
pub struct GenericLoweringBackend {
    transform: Box<dyn GraphTransform>,
    visitors: VisitorRegistry,
}

impl GenericLoweringBackend {
    pub const NAME: &'static str = "GenericLoweringBackend";

    pub fn new(transform: Box<dyn GraphTransform>, visitors: VisitorRegistry) -> Self {
        Self {
            transform,
            visitors,
        }
    }

    pub fn visitors(&self) -> &VisitorRegistry {
        &self.visitors
    }

    /// Lower `graph` according to `compile_spec`.
    pub fn preprocess(
        &self,
        graph: &Graph,
        compile_spec: &[CompileSpec],
    ) -> DelegateResult<PreprocessResult> {
        log::info!("{} preprocess", Self::NAME);

        if !is_generic_format(compile_spec) {
            return Err(DelegateError::MissingFormatSpec {
                backend: Self::NAME,
                expected: OutputFormat::Generic,
            });
        }

        let transformed = self.transform.transform(graph, compile_spec)?;
        let visitors = self.visitors.resolve(&transformed);

        let mut session = LoweringSession::new(transformed.delegation_tag());
        let mut scope = DumpScope::new(intermediate_dump_path(compile_spec), session.dump_suffix());

        for node in &transformed.nodes {
            scope.enter(node);
            session.record_node(node.kind);
            log::debug!("Lowering {} node {}", node.kind, node.name);

            match node.kind {
                NodeKind::CallFunction => {
                    let target = process_call_function(node, &transformed, &visitors, &mut scope)?;
                    session.record_operator(target);
                }
                NodeKind::Placeholder => process_placeholder(node, graph, &mut scope)?,
                NodeKind::Output => process_output(node, &mut scope),
                // Only reachable when an unpartitioned graph is passed in unchecked.
                other => {
                    return Err(DelegateError::UnsupportedNodeKind {
                        node: node.name.clone(),
                        kind: other.to_string(),
                    });
                }
            }
        }

        session.record_emitted(scope.builder().len());
        let processed_bytes = scope.finish()?;
        session.record_artifact_size(processed_bytes.len());
        log::debug!(
            "Partition {}: {}",
            session.partition().unwrap_or("<untagged>"),
            session.stats()
        );

        Ok(PreprocessResult { processed_bytes })
    }

    /// Project a spec onto the entries relevant to this backend.
    ///
    /// The result always starts with a fresh `output_format=generic` entry,
    /// followed by the input's `debug_artifact_path` and
    /// `permute_memory_format` entries in their original order.
    pub fn filter_relevant_spec(compile_spec: &[CompileSpec]) -> Vec<CompileSpec> {
        let mut filtered = vec![OutputFormat::Generic.spec_entry()];
        filtered.extend(
            compile_spec
                .iter()
                .filter(|spec| GENERIC_SPEC_KEYS.contains(&spec.key.as_str()))
                .cloned(),
        );
        filtered
    }
}

impl Default for GenericLoweringBackend {
    fn default() -> Self {
        Self::new(Box::new(PassManager::default()), VisitorRegistry::default())
    }
}

fn process_call_function<'n>(
    node: &'n Node,
    graph: &Graph,
    visitors: &HashMap<&str, &dyn NodeVisitor>,
    scope: &mut DumpScope,
) -> DelegateResult<&'n str> {
    let target = node.target.as_deref().unwrap_or_default();
    let visitor = visitors
        .get(target)
        .ok_or_else(|| DelegateError::UnsupportedOperator {
            node: node.name.clone(),
            target: target.to_string(),
        })?;
    visitor.define_node(node, graph, scope.builder_mut())?;
    Ok(target)
}

fn process_placeholder(node: &Node, original: &Graph, scope: &mut DumpScope) -> DelegateResult<()> {
    let (index, input) = original
        .signature
        .input(&node.name)
        .ok_or_else(|| DelegateError::UnknownPlaceholder {
            node: node.name.clone(),
        })?;

    let tensor = visitors::node_tensor_desc(node)?;
    scope
        .builder_mut()
        .add_input(index as u32, input.kind, tensor);
    Ok(())
}

fn process_output(node: &Node, scope: &mut DumpScope) {
    let names = node.input_nodes().map(str::to_string).collect();
    scope.builder_mut().add_output(names);
}
