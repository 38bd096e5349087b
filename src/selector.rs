// This module routes a compile spec sequence to the backend that accepts it. BackendSelector
// holds an ordered table of (predicate, backend kind) pairs; resolution asks each predicate
// in registration order and the first one that accepts the sequence wins, so the same
// sequence always resolves to the same backend. The result is a DelegationRequest that pairs
// the chosen backend with the unchanged sequence. Delegator owns one instance of each
// backend and dispatches a request to the matching one with a plain match on the closed
// BackendKind enum.

//! Backend selection and dispatch.

use std::fmt;

use crate::core::{DelegateError, DelegateResult};
use crate::graph::Graph;
use crate::hardware::{ChainedHardwareBackend, CommandCompiler};
use crate::lowering::{GenericLoweringBackend, PreprocessResult};
use crate::spec::{is_generic_format, is_hardware_format, CompileSpec};

/// Backends a compile spec can be delegated to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    GenericLowering,
    ChainedHardware,
}

impl BackendKind {
    /// Identifier handed to the delegation framework.
    pub const fn identifier(self) -> &'static str {
        match self {
            BackendKind::GenericLowering => GenericLoweringBackend::NAME,
            BackendKind::ChainedHardware => ChainedHardwareBackend::NAME,
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.identifier())
    }
}

/// Predicate deciding whether a backend accepts a sequence.
pub type SpecPredicate = fn(&[CompileSpec]) -> bool;

/// A resolved backend together with the sequence it will receive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelegationRequest {
    pub backend: BackendKind,
    pub compile_spec: Vec<CompileSpec>,
}

impl DelegationRequest {
    pub fn backend_identifier(&self) -> &'static str {
        self.backend.identifier()
    }
}

/// Ordered predicate table; first match wins.
#[derive(Clone)]
pub struct BackendSelector {
    table: Vec<(SpecPredicate, BackendKind)>,
}

impl BackendSelector {
    /// A selector without registrations. Every sequence is unresolved.
    pub fn empty() -> Self {
        Self { table: Vec::new() }
    }

    /// Append a predicate. Earlier registrations take precedence.
    pub fn register(&mut self, predicate: SpecPredicate, backend: BackendKind) {
        self.table.push((predicate, backend));
    }

    pub fn resolve(&self, compile_spec: Vec<CompileSpec>) -> DelegateResult<DelegationRequest> {
        let backend = self
            .table
            .iter()
            .find(|(predicate, _)| predicate(&compile_spec))
            .map(|(_, backend)| *backend)
            .ok_or(DelegateError::UnresolvedBackend)?;

        log::debug!("Compile spec resolved to {}", backend);
        Ok(DelegationRequest {
            backend,
            compile_spec,
        })
    }

    /// Every registered backend whose predicate accepts the sequence, in
    /// registration order.
    pub fn matching(&self, compile_spec: &[CompileSpec]) -> Vec<BackendKind> {
        self.table
            .iter()
            .filter(|(predicate, _)| predicate(compile_spec))
            .map(|(_, backend)| *backend)
            .collect()
    }
}

impl Default for BackendSelector {
    fn default() -> Self {
        let mut selector = Self::empty();
        selector.register(is_generic_format, BackendKind::GenericLowering);
        selector.register(is_hardware_format, BackendKind::ChainedHardware);
        selector
    }
}

/// Owns the backends and runs resolved requests.
pub struct Delegator {
    generic: GenericLoweringBackend,
    hardware: ChainedHardwareBackend,
}

impl Delegator {
    pub fn new(generic: GenericLoweringBackend, hardware: ChainedHardwareBackend) -> Self {
        Self { generic, hardware }
    }

    pub fn generic(&self) -> &GenericLoweringBackend {
        &self.generic
    }

    pub fn hardware(&self) -> &ChainedHardwareBackend {
        &self.hardware
    }

    pub fn preprocess(
        &self,
        request: &DelegationRequest,
        graph: &Graph,
    ) -> DelegateResult<PreprocessResult> {
        match request.backend {
            BackendKind::GenericLowering => self.generic.preprocess(graph, &request.compile_spec),
            BackendKind::ChainedHardware => self.hardware.preprocess(graph, &request.compile_spec),
        }
    }
}

impl Default for Delegator {
    /// Default passes and visitors, with [`CommandCompiler::default`] as the
    /// downstream compiler.
    fn default() -> Self {
        Self::new(
            GenericLoweringBackend::default(),
            ChainedHardwareBackend::with_compiler(Box::new(CommandCompiler::default())),
        )
    }
}
