//! Compile specs: the ordered key/value configuration exchanged between the
//! builder, the backend selector and the backends.
//!
//! A compile spec sequence is self-describing. The `output_format` entry says
//! which backend it targets and the remaining entries carry that backend's
//! options as opaque bytes:
//!
//! ```text
//! output_format          = hardware
//! compile_flags          = --accelerator-config=npu-128 --config=config/npu.ini
//! debug_artifact_path    = /tmp/dump
//! permute_memory_format  = nhwc
//! quantize_io            = true
//! ```

use std::fmt;

pub mod builder;
pub mod predicates;

pub use builder::{CompileSpecBuilder, HardwareTarget, DEFAULT_CONFIG_PATH};
pub use predicates::{
    compile_flags, intermediate_dump_path, is_generic_format, is_hardware_format,
    is_layout_permuted, is_targeted_compile, output_format,
};

/// Keys understood by the backends in this crate.
pub mod keys {
    pub const OUTPUT_FORMAT: &str = "output_format";
    pub const COMPILE_FLAGS: &str = "compile_flags";
    pub const DEBUG_ARTIFACT_PATH: &str = "debug_artifact_path";
    pub const PERMUTE_MEMORY_FORMAT: &str = "permute_memory_format";
    pub const QUANTIZE_IO: &str = "quantize_io";
}

/// Value of `permute_memory_format` requesting channels-last layout.
pub const NHWC: &str = "nhwc";

/// One key/value configuration entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CompileSpec {
    pub key: String,
    pub value: Vec<u8>,
}

impl CompileSpec {
    pub fn new(key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// The value as UTF-8, if it is valid UTF-8.
    pub fn value_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.value).ok()
    }
}

impl fmt::Display for CompileSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.key, String::from_utf8_lossy(&self.value))
    }
}

/// Output format a compile spec sequence targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputFormat {
    /// Hardware-independent tensor-operator artifact.
    Generic,
    /// Accelerator binary produced by the downstream native compiler.
    Hardware,
}

impl OutputFormat {
    pub const fn as_str(self) -> &'static str {
        match self {
            OutputFormat::Generic => "generic",
            OutputFormat::Hardware => "hardware",
        }
    }

    pub fn from_bytes(value: &[u8]) -> Option<Self> {
        match value {
            b"generic" => Some(OutputFormat::Generic),
            b"hardware" => Some(OutputFormat::Hardware),
            _ => None,
        }
    }

    /// The `output_format` entry announcing this format.
    pub fn spec_entry(self) -> CompileSpec {
        CompileSpec::new(keys::OUTPUT_FORMAT, self.as_str())
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_format_wire_values() {
        assert_eq!(OutputFormat::from_bytes(b"generic"), Some(OutputFormat::Generic));
        assert_eq!(OutputFormat::from_bytes(b"hardware"), Some(OutputFormat::Hardware));
        assert_eq!(OutputFormat::from_bytes(b"tflite"), None);
        assert_eq!(
            OutputFormat::Hardware.spec_entry(),
            CompileSpec::new("output_format", "hardware")
        );
    }

    #[test]
    fn test_display_is_lossy_for_binary_values() {
        let spec = CompileSpec::new("blob", vec![0x66, 0xff]);
        assert_eq!(spec.value_str(), None);
        assert_eq!(spec.to_string(), "blob=f\u{fffd}");
    }
}
