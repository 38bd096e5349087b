// This module implements the chained hardware backend. It produces an accelerator binary in
// two steps: the generic lowering backend (held by value) lowers the partition to the
// intermediate artifact using only the generic subset of the caller's compile spec, and the
// downstream NativeCompiler turns that artifact into the executable form using every
// compile_flags entry in order. Debug dumps happen only in the generic step; this layer adds
// none. Compiler diagnostics are passed through unchanged inside DownstreamCompile.

//! Hardware backend chained on top of the generic lowering.

pub mod compiler;

pub use compiler::{CommandCompiler, NativeCompiler, DEFAULT_PROGRAM};

use crate::core::{DelegateError, DelegateResult};
use crate::graph::Graph;
use crate::lowering::{GenericLoweringBackend, PreprocessResult};
use crate::spec::{compile_flags, is_hardware_format, CompileSpec, OutputFormat};

/// Lowers through the generic artifact and compiles it for the accelerator.
pub struct ChainedHardwareBackend {
    generic: GenericLoweringBackend,
    compiler: Box<dyn NativeCompiler>,
}

impl ChainedHardwareBackend {
    pub const NAME: &'static str = "ChainedHardwareBackend";

    pub fn new(generic: GenericLoweringBackend, compiler: Box<dyn NativeCompiler>) -> Self {
        Self { generic, compiler }
    }

    /// Default generic lowering feeding `compiler`.
    pub fn with_compiler(compiler: Box<dyn NativeCompiler>) -> Self {
        Self::new(GenericLoweringBackend::default(), compiler)
    }

    pub fn preprocess(
        &self,
        graph: &Graph,
        compile_spec: &[CompileSpec],
    ) -> DelegateResult<PreprocessResult> {
        Ok(self.preprocess_stages(graph, compile_spec)?.binary)
    }

    /// Like [`preprocess`](Self::preprocess), but also hands back the generic
    /// artifact the native compiler was fed.
    pub fn preprocess_stages(
        &self,
        graph: &Graph,
        compile_spec: &[CompileSpec],
    ) -> DelegateResult<HardwareStages> {
        log::info!("{} preprocess", Self::NAME);

        if !is_hardware_format(compile_spec) {
            return Err(DelegateError::MissingFormatSpec {
                backend: Self::NAME,
                expected: OutputFormat::Hardware,
            });
        }

        let generic_spec = GenericLoweringBackend::filter_relevant_spec(compile_spec);
        let intermediate = self.generic.preprocess(graph, &generic_spec)?;

        let flags = compile_flags(compile_spec);
        log::debug!("Invoking native compiler with flags {:?}", flags);
        let processed_bytes = self
            .compiler
            .compile(&intermediate.processed_bytes, &flags)?;

        Ok(HardwareStages {
            intermediate,
            binary: PreprocessResult { processed_bytes },
        })
    }
}

/// Output of both steps of the chained backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HardwareStages {
    /// Generic artifact handed to the native compiler.
    pub intermediate: PreprocessResult,
    /// Accelerator binary returned by the native compiler.
    pub binary: PreprocessResult,
}
