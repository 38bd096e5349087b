//! npu-delegate - backend dispatch and graph lowering for NPU delegation.
//!
//! A partitioned computation graph is lowered to a hardware-independent
//! tensor-operator artifact, and optionally compiled further by a downstream
//! native compiler into an accelerator binary. Which of the two happens is
//! decided by the compile spec sequence handed to the pipeline.
//!
//! # Primary Usage
//!
//! ```no_run
//! use npu_delegate::{BackendSelector, CompileSpecBuilder, Delegator, Graph};
//!
//! let graph = Graph::parse(
//!     "%x = placeholder input : f32[1,4]\n\
//!      %y = call_function aten.relu.default(%x) : f32[1,4]\n\
//!      output(%y)",
//! )?;
//! let compile_spec = CompileSpecBuilder::new().generic_output()?.build();
//!
//! let request = BackendSelector::default().resolve(compile_spec)?;
//! let result = Delegator::default().preprocess(&request, &graph)?;
//! println!("{} bytes for {}", result.processed_bytes.len(), request.backend_identifier());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Architecture
//!
//! - [`spec`] - Compile spec entries, builder and predicates
//! - [`selector`] - Backend resolution and dispatch
//! - [`lowering`] - Generic lowering backend, passes, visitors, artifact format
//! - [`hardware`] - Chained hardware backend and native compiler seam
//! - [`graph`] - Graph model and text format
//! - [`core`] - Errors and lowering session

pub mod core;
pub mod graph;
pub mod hardware;
pub mod lowering;
pub mod selector;
pub mod spec;

pub use core::{DelegateError, DelegateResult, NativeCompileError, VisitorError};
pub use graph::{Graph, Node, NodeKind};
pub use hardware::{ChainedHardwareBackend, CommandCompiler, HardwareStages, NativeCompiler};
pub use lowering::{
    Artifact, GenericLoweringBackend, GraphTransform, NodeVisitor, PassManager, PreprocessResult,
    VisitorRegistry,
};
pub use selector::{BackendKind, BackendSelector, DelegationRequest, Delegator};
pub use spec::{CompileSpec, CompileSpecBuilder, HardwareTarget, OutputFormat};
