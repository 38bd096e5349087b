//! Consuming builder for compile spec sequences.
//!
//! Each configuration step takes the builder by value and hands it back, and
//! [`CompileSpecBuilder::build`] consumes it. A finished spec can therefore
//! never be changed behind the caller's back by a later builder call.
//!
//! ```
//! use npu_delegate::spec::{CompileSpecBuilder, HardwareTarget};
//!
//! let spec = CompileSpecBuilder::new()
//!     .hardware_output(
//!         HardwareTarget::new("npu-128")
//!             .system_config("sys")
//!             .memory_mode("shared"),
//!     )?
//!     .quantize_io(true)
//!     .build();
//! assert_eq!(spec[0].key, "output_format");
//! # Ok::<(), npu_delegate::DelegateError>(())
//! ```

use std::path::PathBuf;

use super::{keys, CompileSpec, OutputFormat, NHWC};
use crate::core::{DelegateError, DelegateResult};

/// Configuration file handed to the native compiler when none is given.
pub const DEFAULT_CONFIG_PATH: &str = "config/npu.ini";

/// Accelerator parameters for [`CompileSpecBuilder::hardware_output`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HardwareTarget {
    pub accelerator_config: String,
    pub config_path: String,
    pub system_config: Option<String>,
    pub memory_mode: Option<String>,
    pub extra_flags: Option<String>,
}

impl HardwareTarget {
    /// Target the given accelerator configuration, e.g. `npu-128`.
    pub fn new(accelerator_config: impl Into<String>) -> Self {
        Self {
            accelerator_config: accelerator_config.into(),
            config_path: DEFAULT_CONFIG_PATH.to_string(),
            system_config: None,
            memory_mode: None,
            extra_flags: None,
        }
    }

    pub fn config_path(mut self, path: impl Into<String>) -> Self {
        self.config_path = path.into();
        self
    }

    pub fn system_config(mut self, system_config: impl Into<String>) -> Self {
        self.system_config = Some(system_config.into());
        self
    }

    pub fn memory_mode(mut self, memory_mode: impl Into<String>) -> Self {
        self.memory_mode = Some(memory_mode.into());
        self
    }

    /// Flags appended verbatim after the generated ones.
    pub fn extra_flags(mut self, flags: impl Into<String>) -> Self {
        self.extra_flags = Some(flags.into());
        self
    }

    /// Native compiler flags, in the order the compiler expects them.
    pub fn compiler_flags(&self) -> Vec<String> {
        let mut flags = vec![
            format!("--accelerator-config={}", self.accelerator_config),
            format!("--config={}", self.config_path),
        ];
        if let Some(system_config) = &self.system_config {
            flags.push(format!("--system-config={system_config}"));
        }
        if let Some(memory_mode) = &self.memory_mode {
            flags.push(format!("--memory-mode={memory_mode}"));
        }
        if let Some(extra) = &self.extra_flags {
            flags.push(extra.clone());
        }
        flags
    }
}

/// Accumulates typed configuration and materializes it as compile specs.
#[derive(Debug, Clone, Default)]
pub struct CompileSpecBuilder {
    output: Option<OutputFormat>,
    compiler_flags: Vec<String>,
    intermediate_path: Option<PathBuf>,
    layout_permute: bool,
    quantize_io: bool,
}

impl CompileSpecBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn claim_output(&mut self, format: OutputFormat) -> DelegateResult<()> {
        if let Some(current) = self.output {
            return Err(DelegateError::DuplicateOutputFormat { current });
        }
        self.output = Some(format);
        Ok(())
    }

    /// Target the generic tensor-operator artifact.
    pub fn generic_output(mut self) -> DelegateResult<Self> {
        self.claim_output(OutputFormat::Generic)?;
        Ok(self)
    }

    /// Target an accelerator through the downstream native compiler.
    pub fn hardware_output(mut self, target: HardwareTarget) -> DelegateResult<Self> {
        self.claim_output(OutputFormat::Hardware)?;
        self.compiler_flags = target.compiler_flags();
        Ok(self)
    }

    /// Directory for intermediate artifacts and failure diagnostics.
    pub fn intermediate_dump_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.intermediate_path = Some(path.into());
        self
    }

    /// Convert rank-4 tensors to channels-last in compiler and runtime.
    pub fn layout_permute(mut self, enabled: bool) -> Self {
        self.layout_permute = enabled;
        self
    }

    /// Quantize inputs and dequantize outputs at the partition boundary.
    pub fn quantize_io(mut self, enabled: bool) -> Self {
        self.quantize_io = enabled;
        self
    }

    /// Materialize the configuration.
    pub fn build(self) -> Vec<CompileSpec> {
        let mut compile_spec = Vec::new();

        match self.output {
            Some(OutputFormat::Hardware) => {
                compile_spec.push(OutputFormat::Hardware.spec_entry());
                compile_spec.push(CompileSpec::new(
                    keys::COMPILE_FLAGS,
                    self.compiler_flags.join(" "),
                ));
            }
            Some(OutputFormat::Generic) => {
                compile_spec.push(OutputFormat::Generic.spec_entry());
            }
            None => {}
        }

        if let Some(path) = &self.intermediate_path {
            compile_spec.push(CompileSpec::new(
                keys::DEBUG_ARTIFACT_PATH,
                path.to_string_lossy().into_owned(),
            ));
        }

        if self.layout_permute {
            compile_spec.push(CompileSpec::new(keys::PERMUTE_MEMORY_FORMAT, NHWC));
        }

        if self.quantize_io {
            compile_spec.push(CompileSpec::new(keys::QUANTIZE_IO, "true"));
        }

        compile_spec
    }
}
