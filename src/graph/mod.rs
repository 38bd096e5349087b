//! Computation graph consumed by the lowering backends.
//!
//! A graph is an ordered list of nodes plus the signature of the exported
//! program it was partitioned from. Nodes refer to each other by name. The
//! graph can be written in a small line-oriented text format:
//!
//! ```text
//! ; Comments start with semicolon
//! %x = placeholder input : f32[1,3,8,8]
//! %w = placeholder parameter : f32[8]
//! %y = call_function aten.add.Tensor(%x, %w) : f32[1,3,8,8] @A
//! %z = call_function aten.permute_copy.default(%y, [0, 2, 3, 1]) : f32[1,8,8,3] @A
//! output(%z) @A
//! ```
//!
//! `@tag` sets the delegation tag of a node. Placeholders name their role in
//! the signature (`input`, `parameter`, `buffer` or `constant`).

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

pub mod parser;

pub use parser::GraphParseError;

/// Operation kind of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Placeholder,
    CallFunction,
    Output,
    GetAttr,
    CallModule,
    CallMethod,
}

impl NodeKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            NodeKind::Placeholder => "placeholder",
            NodeKind::CallFunction => "call_function",
            NodeKind::Output => "output",
            NodeKind::GetAttr => "get_attr",
            NodeKind::CallModule => "call_module",
            NodeKind::CallMethod => "call_method",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "placeholder" => Some(NodeKind::Placeholder),
            "call_function" => Some(NodeKind::CallFunction),
            "output" => Some(NodeKind::Output),
            "get_attr" => Some(NodeKind::GetAttr),
            "call_module" => Some(NodeKind::CallModule),
            "call_method" => Some(NodeKind::CallMethod),
            _ => None,
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Element type of a tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    F32,
    F16,
    I32,
    I8,
    Bool,
}

impl DType {
    pub const fn as_str(self) -> &'static str {
        match self {
            DType::F32 => "f32",
            DType::F16 => "f16",
            DType::I32 => "i32",
            DType::I8 => "i8",
            DType::Bool => "bool",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "f32" => Some(DType::F32),
            "f16" => Some(DType::F16),
            "i32" => Some(DType::I32),
            "i8" => Some(DType::I8),
            "bool" => Some(DType::Bool),
            _ => None,
        }
    }

    /// Stable numeric tag used in the serialized artifact.
    pub const fn tag(self) -> u8 {
        match self {
            DType::F32 => 0,
            DType::F16 => 1,
            DType::I32 => 2,
            DType::I8 => 3,
            DType::Bool => 4,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(DType::F32),
            1 => Some(DType::F16),
            2 => Some(DType::I32),
            3 => Some(DType::I8),
            4 => Some(DType::Bool),
            _ => None,
        }
    }
}

/// Shape and element type of the value a node produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TensorMeta {
    pub dtype: DType,
    pub shape: Vec<u64>,
}

impl TensorMeta {
    pub fn new(dtype: DType, shape: impl Into<Vec<u64>>) -> Self {
        Self {
            dtype,
            shape: shape.into(),
        }
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }
}

impl fmt::Display for TensorMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dims: Vec<String> = self.shape.iter().map(u64::to_string).collect();
        write!(f, "{}[{}]", self.dtype.as_str(), dims.join(","))
    }
}

/// Metadata attached to a node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeMeta {
    /// Partition this node was assigned to.
    pub delegation_tag: Option<String>,
    pub tensor: Option<TensorMeta>,
    /// Free-form annotations added by graph passes.
    pub annotations: BTreeMap<String, String>,
}

/// Argument of a node.
#[derive(Debug, Clone, PartialEq)]
pub enum Argument {
    /// Reference to another node by name.
    Node(String),
    Int(i64),
    Float(f64),
    Ints(Vec<i64>),
}

impl Argument {
    pub fn as_node(&self) -> Option<&str> {
        match self {
            Argument::Node(name) => Some(name),
            _ => None,
        }
    }
}

/// A single graph node.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub name: String,
    pub kind: NodeKind,
    /// Operator identity for `call_function`, attribute or module path for
    /// the other callable kinds.
    pub target: Option<String>,
    pub args: Vec<Argument>,
    pub meta: NodeMeta,
}

impl Node {
    pub fn new(name: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            name: name.into(),
            kind,
            target: None,
            args: Vec::new(),
            meta: NodeMeta::default(),
        }
    }

    /// Names of the nodes this node reads.
    pub fn input_nodes(&self) -> impl Iterator<Item = &str> {
        self.args.iter().filter_map(Argument::as_node)
    }
}

/// Role of a placeholder in the exported program signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InputKind {
    UserInput,
    Parameter,
    Buffer,
    Constant,
}

impl InputKind {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "input" => Some(InputKind::UserInput),
            "parameter" => Some(InputKind::Parameter),
            "buffer" => Some(InputKind::Buffer),
            "constant" => Some(InputKind::Constant),
            _ => None,
        }
    }

    pub const fn tag(self) -> u8 {
        match self {
            InputKind::UserInput => 0,
            InputKind::Parameter => 1,
            InputKind::Buffer => 2,
            InputKind::Constant => 3,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(InputKind::UserInput),
            1 => Some(InputKind::Parameter),
            2 => Some(InputKind::Buffer),
            3 => Some(InputKind::Constant),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputSpec {
    pub name: String,
    pub kind: InputKind,
}

/// Signature of the program the graph was exported from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Signature {
    pub inputs: Vec<InputSpec>,
    pub outputs: Vec<String>,
}

impl Signature {
    /// Position and role of the placeholder `name` among the inputs.
    pub fn input(&self, name: &str) -> Option<(usize, &InputSpec)> {
        self.inputs
            .iter()
            .enumerate()
            .find(|(_, input)| input.name == name)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Graph {
    pub nodes: Vec<Node>,
    pub signature: Signature,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(text: &str) -> Result<Self, GraphParseError> {
        parser::parse_graph(text)
    }

    pub fn node(&self, name: &str) -> Option<&Node> {
        self.nodes.iter().find(|node| node.name == name)
    }

    /// First delegation tag found in node order.
    pub fn delegation_tag(&self) -> Option<&str> {
        self.nodes
            .iter()
            .filter_map(|node| node.meta.delegation_tag.as_deref())
            .find(|tag| !tag.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delegation_tag_is_first_non_empty() {
        let mut graph = Graph::new();
        graph.nodes.push(Node::new("x", NodeKind::Placeholder));
        let mut tagged = Node::new("y", NodeKind::CallFunction);
        tagged.meta.delegation_tag = Some("B".to_string());
        graph.nodes.push(tagged);
        assert_eq!(graph.delegation_tag(), Some("B"));

        graph.nodes[1].meta.delegation_tag = Some(String::new());
        assert_eq!(graph.delegation_tag(), None);
    }

    #[test]
    fn test_input_position_counts_every_role() {
        let signature = Signature {
            inputs: vec![
                InputSpec { name: "w".into(), kind: InputKind::Parameter },
                InputSpec { name: "x".into(), kind: InputKind::UserInput },
                InputSpec { name: "y".into(), kind: InputKind::UserInput },
            ],
            outputs: vec![],
        };
        let (index, input) = signature.input("y").unwrap();
        assert_eq!((index, input.kind), (2, InputKind::UserInput));
        assert!(signature.input("z").is_none());
    }

    #[test]
    fn test_tag_round_trip() {
        for dtype in [DType::F32, DType::F16, DType::I32, DType::I8, DType::Bool] {
            assert_eq!(DType::from_tag(dtype.tag()), Some(dtype));
        }
        assert_eq!(DType::from_tag(42), None);
    }
}
