// This module collects the infrastructure shared by every backend in the crate: the error
// taxonomy (DelegateError and the collaborator error types) and the per-partition lowering
// session that tracks statistics while a graph is walked.

//! Core infrastructure shared across backends.
//!
//! ## Errors (`error`)
//! - [`DelegateError`] covers builder misuse, backend selection and lowering
//! - [`VisitorError`] is reported by operator visitors and surfaced unchanged
//! - [`NativeCompileError`] wraps the downstream compiler's diagnostic
//!
//! ## Session (`session`)
//! - Partition tag and dump suffix for the graph being lowered
//! - Lowering statistics logged once the artifact is serialized

pub mod error;
pub mod session;

pub use error::{DelegateError, DelegateResult, NativeCompileError, VisitorError};
pub use session::{LoweringSession, SessionStats};
