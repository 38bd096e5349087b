//! Downstream native compiler seam.
//!
//! [`NativeCompiler`] turns the generic intermediate binary into the
//! accelerator's executable form. [`CommandCompiler`] drives an external
//! compiler executable:
//!
//! ```text
//! <program> [leading args] <flags...> --output-dir <tmp>/out <tmp>/graph.glir
//! ```
//!
//! and reads the result back from `<tmp>/out/graph.bin`. Flag values are
//! split on whitespace, so one `compile_flags` entry may carry several
//! switches.

use std::ffi::OsString;
use std::fs;
use std::path::Path;
use std::process::Command;

use crate::core::NativeCompileError;

/// Executable invoked when no program is configured.
pub const DEFAULT_PROGRAM: &str = "npu-compiler";

const INPUT_FILE: &str = "graph.glir";
const OUTPUT_DIR: &str = "out";
const OUTPUT_FILE: &str = "graph.bin";

/// Compiles the generic intermediate binary for a concrete accelerator.
pub trait NativeCompiler: Send + Sync {
    fn compile(&self, intermediate: &[u8], flags: &[String]) -> Result<Vec<u8>, NativeCompileError>;
}

/// Runs an external compiler in a scratch directory.
#[derive(Debug, Clone)]
pub struct CommandCompiler {
    program: OsString,
    leading_args: Vec<OsString>,
}

impl CommandCompiler {
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            leading_args: Vec::new(),
        }
    }

    /// Arguments placed before the compile flags, e.g. a driver subcommand.
    pub fn with_leading_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.leading_args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn program(&self) -> &Path {
        Path::new(&self.program)
    }

    fn program_name(&self) -> String {
        self.program.to_string_lossy().into_owned()
    }

    fn launch_error(&self, source: std::io::Error) -> NativeCompileError {
        NativeCompileError::Launch {
            program: self.program_name(),
            source,
        }
    }
}

impl Default for CommandCompiler {
    fn default() -> Self {
        Self::new(DEFAULT_PROGRAM)
    }
}

impl NativeCompiler for CommandCompiler {
    fn compile(&self, intermediate: &[u8], flags: &[String]) -> Result<Vec<u8>, NativeCompileError> {
        let scratch = tempfile::tempdir().map_err(|e| self.launch_error(e))?;
        let input = scratch.path().join(INPUT_FILE);
        let output_dir = scratch.path().join(OUTPUT_DIR);
        fs::write(&input, intermediate).map_err(|e| self.launch_error(e))?;
        fs::create_dir_all(&output_dir).map_err(|e| self.launch_error(e))?;

        let mut command = Command::new(&self.program);
        command
            .args(&self.leading_args)
            .args(flags.iter().flat_map(|flag| flag.split_whitespace()))
            .arg("--output-dir")
            .arg(&output_dir)
            .arg(&input);
        log::debug!("Running {:?}", command);

        let output = command.output().map_err(|e| self.launch_error(e))?;
        if !output.status.success() {
            return Err(NativeCompileError::Failed {
                program: self.program_name(),
                status: output.status.to_string(),
                diagnostic: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        let result = output_dir.join(OUTPUT_FILE);
        fs::read(&result).map_err(|_| NativeCompileError::MissingOutput {
            program: self.program_name(),
            path: result,
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn script(body: &str) -> CommandCompiler {
        CommandCompiler::new("sh").with_leading_args(["-c", body, "npu-compiler"])
    }

    const ECHO_ARGS: &str = r#"
out=""; prev=""
for a in "$@"; do
  if [ "$prev" = "--output-dir" ]; then out="$a"; fi
  prev="$a"
done
printf '%s\n' "$@" > "$out/graph.bin"
"#;

    #[test]
    fn test_copies_intermediate_through_compiler() {
        let body = r#"
out=""; prev=""
for a in "$@"; do
  if [ "$prev" = "--output-dir" ]; then out="$a"; fi
  prev="$a"
done
cp "$prev" "$out/graph.bin"
"#;
        let bytes = script(body).compile(b"GLIR-payload", &[]).unwrap();
        assert_eq!(bytes, b"GLIR-payload");
    }

    #[test]
    fn test_flags_split_on_whitespace() {
        let flags = vec![
            "--accelerator-config=npu-128".to_string(),
            "--system-config=A  --memory-mode=B".to_string(),
        ];
        let bytes = script(ECHO_ARGS).compile(b"x", &flags).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let args: Vec<&str> = text.lines().collect();
        assert_eq!(
            &args[..4],
            &[
                "--accelerator-config=npu-128",
                "--system-config=A",
                "--memory-mode=B",
                "--output-dir",
            ]
        );
        assert!(args[5].ends_with("graph.glir"));
    }

    #[test]
    fn test_failure_keeps_stderr() {
        let err = script("echo 'bad config' >&2; exit 3")
            .compile(b"x", &[])
            .unwrap_err();
        match err {
            NativeCompileError::Failed { diagnostic, .. } => {
                assert_eq!(diagnostic.trim_end(), "bad config")
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_output() {
        let err = script("exit 0").compile(b"x", &[]).unwrap_err();
        assert!(matches!(err, NativeCompileError::MissingOutput { .. }));
    }

    #[test]
    fn test_launch_failure() {
        let err = CommandCompiler::new("/nonexistent/npu-compiler")
            .compile(b"x", &[])
            .unwrap_err();
        assert!(matches!(err, NativeCompileError::Launch { .. }));
    }
}
