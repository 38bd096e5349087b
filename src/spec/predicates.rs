//! Queries over a compile spec sequence.
//!
//! Every query scans in order and answers from the first entry whose key
//! matches. A sequence without any recognised key is legal: the queries
//! return `false` or `None`, never an error.

use std::path::PathBuf;

use super::{keys, CompileSpec, OutputFormat, NHWC};

fn first_value<'a>(compile_spec: &'a [CompileSpec], key: &str) -> Option<&'a [u8]> {
    compile_spec
        .iter()
        .find(|spec| spec.key == key)
        .map(|spec| spec.value.as_slice())
}

/// Output format named by the first `output_format` entry.
pub fn output_format(compile_spec: &[CompileSpec]) -> Option<OutputFormat> {
    first_value(compile_spec, keys::OUTPUT_FORMAT).and_then(OutputFormat::from_bytes)
}

/// Whether channels-last permutation was requested.
pub fn is_layout_permuted(compile_spec: &[CompileSpec]) -> bool {
    first_value(compile_spec, keys::PERMUTE_MEMORY_FORMAT) == Some(NHWC.as_bytes())
}

pub fn is_generic_format(compile_spec: &[CompileSpec]) -> bool {
    output_format(compile_spec) == Some(OutputFormat::Generic)
}

pub fn is_hardware_format(compile_spec: &[CompileSpec]) -> bool {
    output_format(compile_spec) == Some(OutputFormat::Hardware)
}

/// Whether the sequence targets either backend in this crate.
pub fn is_targeted_compile(compile_spec: &[CompileSpec]) -> bool {
    output_format(compile_spec).is_some()
}

/// Directory requested for debug dumps.
pub fn intermediate_dump_path(compile_spec: &[CompileSpec]) -> Option<PathBuf> {
    first_value(compile_spec, keys::DEBUG_ARTIFACT_PATH)
        .map(|value| PathBuf::from(String::from_utf8_lossy(value).into_owned()))
}

/// All `compile_flags` values, in sequence order.
///
/// Unlike the other queries this collects every matching entry, since flags
/// accumulate.
pub fn compile_flags(compile_spec: &[CompileSpec]) -> Vec<String> {
    compile_spec
        .iter()
        .filter(|spec| spec.key == keys::COMPILE_FLAGS)
        .map(|spec| String::from_utf8_lossy(&spec.value).into_owned())
        .collect()
}
