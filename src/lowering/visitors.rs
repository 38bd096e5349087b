//! Operator visitors.
//!
//! A [`NodeVisitor`] serializes one `call_function` node into records of the
//! artifact. The [`VisitorRegistry`] maps operator identities (the node's
//! `target`) to visitors; the lowering backend resolves the subset a graph
//! needs before walking it.

use hashbrown::HashMap;

use super::artifact::{ArtifactBuilder, AttrValue, Attribute, TensorDesc};
use super::passes::DIM_ORDER;
use crate::core::VisitorError;
use crate::graph::{Argument, Graph, Node};

/// Serializes nodes of one operator identity.
pub trait NodeVisitor: Send + Sync {
    /// Operator identity handled by this visitor, e.g. `aten.add.Tensor`.
    fn target(&self) -> &str;

    /// Append the records for `node` to `builder`.
    fn define_node(
        &self,
        node: &Node,
        graph: &Graph,
        builder: &mut ArtifactBuilder,
    ) -> Result<(), VisitorError>;
}

/// Operator identity to visitor mapping.
pub struct VisitorRegistry {
    visitors: HashMap<String, Box<dyn NodeVisitor>>,
}

impl VisitorRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            visitors: HashMap::new(),
        }
    }

    /// Registry with every visitor shipped in this crate.
    pub fn with_default_visitors() -> Self {
        let mut registry = Self::new();
        for (target, op) in [
            ("aten.add.Tensor", "ADD"),
            ("aten.sub.Tensor", "SUB"),
            ("aten.mul.Tensor", "MUL"),
        ] {
            registry.register(Box::new(BinaryVisitor { target, op }));
        }
        for (target, op) in [
            ("aten.sigmoid.default", "SIGMOID"),
            ("aten.tanh.default", "TANH"),
        ] {
            registry.register(Box::new(UnaryVisitor { target, op }));
        }
        registry.register(Box::new(ReluVisitor));
        registry.register(Box::new(ViewVisitor));
        registry.register(Box::new(PermuteVisitor));
        registry.register(Box::new(MatmulVisitor));
        registry
    }

    /// Register a visitor, replacing any visitor for the same target.
    pub fn register(&mut self, visitor: Box<dyn NodeVisitor>) {
        let target = visitor.target().to_string();
        if self.visitors.insert(target.clone(), visitor).is_some() {
            log::debug!("Replaced visitor for {}", target);
        }
    }

    pub fn get(&self, target: &str) -> Option<&dyn NodeVisitor> {
        self.visitors.get(target).map(|visitor| visitor.as_ref())
    }

    pub fn len(&self) -> usize {
        self.visitors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.visitors.is_empty()
    }

    /// Visitors for the operator identities that occur in `graph`.
    ///
    /// Targets without a registered visitor are left out; the lowering
    /// reports them when it reaches the node.
    pub fn resolve(&self, graph: &Graph) -> HashMap<&str, &dyn NodeVisitor> {
        let mut resolved = HashMap::new();
        for node in &graph.nodes {
            let Some(target) = node.target.as_deref() else {
                continue;
            };
            if let Some((key, visitor)) = self.visitors.get_key_value(target) {
                resolved.insert(key.as_str(), visitor.as_ref());
            }
        }
        resolved
    }
}

impl Default for VisitorRegistry {
    fn default() -> Self {
        Self::with_default_visitors()
    }
}

fn expect_arity(target: &str, node: &Node, expected: usize) -> Result<(), VisitorError> {
    if node.args.len() != expected {
        return Err(VisitorError::Arity {
            target: target.to_string(),
            node: node.name.clone(),
            expected,
            found: node.args.len(),
        });
    }
    Ok(())
}

fn tensor_input(target: &str, node: &Node, index: usize) -> Result<String, VisitorError> {
    node.args[index]
        .as_node()
        .map(str::to_string)
        .ok_or_else(|| VisitorError::InvalidArgument {
            target: target.to_string(),
            node: node.name.clone(),
            index,
            reason: "must be a tensor".to_string(),
        })
}

fn int_list(target: &str, node: &Node, index: usize) -> Result<Vec<i64>, VisitorError> {
    match &node.args[index] {
        Argument::Ints(values) => Ok(values.clone()),
        _ => Err(VisitorError::InvalidArgument {
            target: target.to_string(),
            node: node.name.clone(),
            index,
            reason: "must be an integer list".to_string(),
        }),
    }
}

/// Tensor produced by `node`, carrying the dim order chosen by graph passes.
pub(crate) fn node_tensor_desc(node: &Node) -> Result<TensorDesc, VisitorError> {
    let meta = node
        .meta
        .tensor
        .as_ref()
        .ok_or_else(|| VisitorError::MissingTensorMeta {
            node: node.name.clone(),
        })?;
    let mut desc = TensorDesc::new(node.name.clone(), meta);
    if let Some(order) = node.meta.annotations.get(DIM_ORDER) {
        desc.dim_order = order.split(',').filter_map(|d| d.parse().ok()).collect();
    }
    Ok(desc)
}

/// Elementwise binary operators.
struct BinaryVisitor {
    target: &'static str,
    op: &'static str,
}

impl NodeVisitor for BinaryVisitor {
    fn target(&self) -> &str {
        self.target
    }

    fn define_node(
        &self,
        node: &Node,
        _graph: &Graph,
        builder: &mut ArtifactBuilder,
    ) -> Result<(), VisitorError> {
        expect_arity(self.target, node, 2)?;
        let inputs = vec![
            tensor_input(self.target, node, 0)?,
            tensor_input(self.target, node, 1)?,
        ];
        builder.add_operator(self.op, inputs, vec![node_tensor_desc(node)?], Vec::new());
        Ok(())
    }
}

/// Elementwise unary operators without attributes.
struct UnaryVisitor {
    target: &'static str,
    op: &'static str,
}

impl NodeVisitor for UnaryVisitor {
    fn target(&self) -> &str {
        self.target
    }

    fn define_node(
        &self,
        node: &Node,
        _graph: &Graph,
        builder: &mut ArtifactBuilder,
    ) -> Result<(), VisitorError> {
        expect_arity(self.target, node, 1)?;
        let input = tensor_input(self.target, node, 0)?;
        builder.add_operator(self.op, vec![input], vec![node_tensor_desc(node)?], Vec::new());
        Ok(())
    }
}

/// `relu` lowers to a clamp with an open upper bound.
struct ReluVisitor;

impl NodeVisitor for ReluVisitor {
    fn target(&self) -> &str {
        "aten.relu.default"
    }

    fn define_node(
        &self,
        node: &Node,
        _graph: &Graph,
        builder: &mut ArtifactBuilder,
    ) -> Result<(), VisitorError> {
        expect_arity(self.target(), node, 1)?;
        let input = tensor_input(self.target(), node, 0)?;
        builder.add_operator(
            "CLAMP",
            vec![input],
            vec![node_tensor_desc(node)?],
            vec![
                Attribute::new("min", AttrValue::Float(0.0)),
                Attribute::new("max", AttrValue::Float(f64::MAX)),
            ],
        );
        Ok(())
    }
}

struct ViewVisitor;

impl NodeVisitor for ViewVisitor {
    fn target(&self) -> &str {
        "aten.view_copy.default"
    }

    fn define_node(
        &self,
        node: &Node,
        _graph: &Graph,
        builder: &mut ArtifactBuilder,
    ) -> Result<(), VisitorError> {
        expect_arity(self.target(), node, 2)?;
        let input = tensor_input(self.target(), node, 0)?;
        let new_shape = int_list(self.target(), node, 1)?;
        if new_shape.iter().filter(|dim| **dim == -1).count() > 1 {
            return Err(VisitorError::InvalidArgument {
                target: self.target().to_string(),
                node: node.name.clone(),
                index: 1,
                reason: "may infer at most one dimension".to_string(),
            });
        }
        builder.add_operator(
            "RESHAPE",
            vec![input],
            vec![node_tensor_desc(node)?],
            vec![Attribute::new("new_shape", AttrValue::Ints(new_shape))],
        );
        Ok(())
    }
}

struct PermuteVisitor;

impl NodeVisitor for PermuteVisitor {
    fn target(&self) -> &str {
        "aten.permute_copy.default"
    }

    fn define_node(
        &self,
        node: &Node,
        graph: &Graph,
        builder: &mut ArtifactBuilder,
    ) -> Result<(), VisitorError> {
        expect_arity(self.target(), node, 2)?;
        let input = tensor_input(self.target(), node, 0)?;
        let perms = int_list(self.target(), node, 1)?;

        let mut seen = perms.clone();
        seen.sort_unstable();
        let is_permutation = seen.iter().enumerate().all(|(i, d)| *d == i as i64);
        let rank_matches = graph
            .node(&input)
            .and_then(|producer| producer.meta.tensor.as_ref())
            .map_or(true, |meta| meta.rank() == perms.len());
        if !is_permutation || !rank_matches {
            return Err(VisitorError::InvalidArgument {
                target: self.target().to_string(),
                node: node.name.clone(),
                index: 1,
                reason: format!("{perms:?} is not a permutation of the input dimensions"),
            });
        }

        builder.add_operator(
            "TRANSPOSE",
            vec![input],
            vec![node_tensor_desc(node)?],
            vec![Attribute::new("perms", AttrValue::Ints(perms))],
        );
        Ok(())
    }
}

struct MatmulVisitor;

impl NodeVisitor for MatmulVisitor {
    fn target(&self) -> &str {
        "aten.mm.default"
    }

    fn define_node(
        &self,
        node: &Node,
        _graph: &Graph,
        builder: &mut ArtifactBuilder,
    ) -> Result<(), VisitorError> {
        expect_arity(self.target(), node, 2)?;
        let inputs = vec![
            tensor_input(self.target(), node, 0)?,
            tensor_input(self.target(), node, 1)?,
        ];
        builder.add_operator("MATMUL", inputs, vec![node_tensor_desc(node)?], Vec::new());
        Ok(())
    }
}
