// This module defines error types for the delegation pipeline using the thiserror crate for
// idiomatic Rust error handling. DelegateError is the main error enum covering every way a
// partition can fail to lower: builder misuse (a second output format), a backend receiving
// a spec without its output-format marker, a spec no registered backend accepts, graph nodes
// or operators the lowering cannot handle, operator-visitor failures, transform failures,
// downstream native compiler failures, malformed artifacts and I/O while writing debug
// dumps. Each variant carries the context a caller needs to present backend-specific
// remediation. The module also provides DelegateResult<T> as a convenience alias.

//! Error types for the delegation pipeline.
//!
//! Every failure is a distinct variant so tooling above the pipeline can
//! match on it; nothing is retried internally.

use std::path::PathBuf;

use thiserror::Error;

use crate::spec::OutputFormat;

/// Main error type for spec building, backend selection and lowering.
#[derive(Error, Debug)]
pub enum DelegateError {
    #[error("Output format already set to {current}")]
    DuplicateOutputFormat { current: OutputFormat },

    #[error("{backend} requires a compile spec with output_format={expected}")]
    MissingFormatSpec {
        backend: &'static str,
        expected: OutputFormat,
    },

    #[error("Compile spec does not target any registered backend")]
    UnresolvedBackend,

    #[error("Unsupported node kind {kind} for node {node}")]
    UnsupportedNodeKind { node: String, kind: String },

    #[error("No visitor registered for operator {target} (node {node})")]
    UnsupportedOperator { node: String, target: String },

    #[error("Placeholder {node} is not part of the graph signature")]
    UnknownPlaceholder { node: String },

    #[error(transparent)]
    Visitor(#[from] VisitorError),

    #[error("Graph transform {pass} failed: {reason}")]
    Transform { pass: &'static str, reason: String },

    #[error("Downstream compilation failed: {0}")]
    DownstreamCompile(#[from] NativeCompileError),

    #[error("Malformed artifact: {reason}")]
    MalformedArtifact { reason: String },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to render artifact descriptor: {0}")]
    Descriptor(#[from] serde_json::Error),
}

impl DelegateError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Failure reported by an operator visitor while serializing a node.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VisitorError {
    #[error("{target} expects {expected} arguments, node {node} has {found}")]
    Arity {
        target: String,
        node: String,
        expected: usize,
        found: usize,
    },

    #[error("{target}: argument {index} of node {node} {reason}")]
    InvalidArgument {
        target: String,
        node: String,
        index: usize,
        reason: String,
    },

    #[error("Node {node} carries no tensor metadata")]
    MissingTensorMeta { node: String },
}

/// Diagnostic produced by the downstream native compiler.
///
/// The message is kept verbatim so the user sees exactly what the compiler
/// printed.
#[derive(Error, Debug)]
pub enum NativeCompileError {
    #[error("{program} exited with {status}: {diagnostic}")]
    Failed {
        program: String,
        status: String,
        diagnostic: String,
    },

    #[error("failed to launch {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} produced no output at {}", path.display())]
    MissingOutput { program: String, path: PathBuf },

    #[error("{0}")]
    Other(String),
}

/// Result type alias for pipeline operations.
pub type DelegateResult<T> = Result<T, DelegateError>;
