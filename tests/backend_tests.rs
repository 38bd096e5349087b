//! Tests of the backends with custom collaborators.
//!
//! Covers user supplied graph transforms and visitors, the chained hardware
//! backend driving an external compiler, sharing one backend between
//! partitions lowered on separate threads, and the command line driver.

use std::fs;
use std::process::Command;

use npu_delegate::graph::{Graph, Node};
use npu_delegate::lowering::{ArtifactBuilder, Record, TensorDesc};
use npu_delegate::{
    Artifact, BackendSelector, ChainedHardwareBackend, CommandCompiler, CompileSpec,
    CompileSpecBuilder, DelegateError, DelegateResult, Delegator, GenericLoweringBackend,
    GraphTransform, HardwareTarget, NativeCompileError, NodeVisitor, PassManager, VisitorError,
    VisitorRegistry,
};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn generic_spec() -> Vec<CompileSpec> {
    CompileSpecBuilder::new().generic_output().unwrap().build()
}

/// Transform that always fails.
struct RejectingTransform;

impl GraphTransform for RejectingTransform {
    fn transform(&self, _graph: &Graph, _compile_spec: &[CompileSpec]) -> DelegateResult<Graph> {
        Err(DelegateError::Transform {
            pass: "fold_batch_norm",
            reason: "running_var is not a constant".to_string(),
        })
    }
}

/// Lowers a vendor activation to a single GELU operator.
struct GeluVisitor;

impl NodeVisitor for GeluVisitor {
    fn target(&self) -> &str {
        "vendor.gelu"
    }

    fn define_node(
        &self,
        node: &Node,
        _graph: &Graph,
        builder: &mut ArtifactBuilder,
    ) -> Result<(), VisitorError> {
        let meta = node
            .meta
            .tensor
            .as_ref()
            .ok_or_else(|| VisitorError::MissingTensorMeta {
                node: node.name.clone(),
            })?;
        builder.add_operator(
            "GELU",
            node.input_nodes().map(str::to_string).collect(),
            vec![TensorDesc::new(node.name.clone(), meta)],
            Vec::new(),
        );
        Ok(())
    }
}

#[test]
fn test_transform_failure_propagates_without_dump() {
    init_logging();

    let dump = tempfile::tempdir().unwrap();
    let compile_spec = CompileSpecBuilder::new()
        .generic_output()
        .unwrap()
        .intermediate_dump_path(dump.path())
        .build();
    let graph = Graph::parse(
        "%x = placeholder input : f32[2]\n\
         output(%x)",
    )
    .unwrap();

    let backend =
        GenericLoweringBackend::new(Box::new(RejectingTransform), VisitorRegistry::default());
    let err = backend.preprocess(&graph, &compile_spec).unwrap_err();
    assert!(matches!(
        err,
        DelegateError::Transform {
            pass: "fold_batch_norm",
            ..
        }
    ));
    assert_eq!(fs::read_dir(dump.path()).unwrap().count(), 0);
}

#[test]
fn test_visitor_error_surfaces_unchanged() {
    init_logging();

    let graph = Graph::parse(
        "%x = placeholder input : f32[2,3]\n\
         %y = call_function aten.view_copy.default(%x) : f32[6]\n\
         output(%y)",
    )
    .unwrap();
    let err = GenericLoweringBackend::default()
        .preprocess(&graph, &generic_spec())
        .unwrap_err();
    match err {
        DelegateError::Visitor(VisitorError::Arity {
            target,
            node,
            expected,
            found,
        }) => {
            assert_eq!(target, "aten.view_copy.default");
            assert_eq!(node, "y");
            assert_eq!((expected, found), (2, 1));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_custom_visitor_and_identity_transform() {
    init_logging();

    let mut visitors = VisitorRegistry::default();
    visitors.register(Box::new(GeluVisitor));
    let backend = GenericLoweringBackend::new(Box::new(PassManager::new()), visitors);

    // The identity transform keeps the unused sigmoid.
    let graph = Graph::parse(
        "%x = placeholder input : f32[8]\n\
         %unused = call_function aten.sigmoid.default(%x) : f32[8]\n\
         %y = call_function vendor.gelu(%x) : f32[8]\n\
         output(%y)",
    )
    .unwrap();
    let result = backend.preprocess(&graph, &generic_spec()).unwrap();
    let artifact = Artifact::decode(&result.processed_bytes).unwrap();

    let ops: Vec<&str> = artifact
        .records
        .iter()
        .filter_map(|record| match record {
            Record::Operator { op, .. } => Some(op.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(ops, vec!["SIGMOID", "GELU"]);
}

#[test]
fn test_partitions_lowered_concurrently() {
    init_logging();

    let partitions: Vec<Graph> = ["A", "B", "C", "D"]
        .iter()
        .map(|tag| {
            Graph::parse(&format!(
                "%x = placeholder input : f32[2,2] @{tag}\n\
                 %w = placeholder parameter : f32[2,2] @{tag}\n\
                 %y = call_function aten.mm.default(%x, %w) : f32[2,2] @{tag}\n\
                 output(%y) @{tag}"
            ))
            .unwrap()
        })
        .collect();

    let dump = tempfile::tempdir().unwrap();
    let compile_spec = CompileSpecBuilder::new()
        .generic_output()
        .unwrap()
        .intermediate_dump_path(dump.path())
        .build();
    let backend = GenericLoweringBackend::default();

    let sequential: Vec<Vec<u8>> = partitions
        .iter()
        .map(|graph| backend.preprocess(graph, &compile_spec).unwrap().processed_bytes)
        .collect();

    let concurrent: Vec<Vec<u8>> = std::thread::scope(|scope| {
        let handles: Vec<_> = partitions
            .iter()
            .map(|graph| {
                let backend = &backend;
                let compile_spec = &compile_spec;
                scope.spawn(move || backend.preprocess(graph, compile_spec).unwrap())
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().unwrap().processed_bytes)
            .collect()
    });

    assert_eq!(sequential, concurrent);
    assert_eq!(fs::read_dir(dump.path()).unwrap().count(), 8);
}

#[cfg(unix)]
mod native {
    use super::*;

    /// Shell script standing in for the native compiler: copies its input
    /// behind a fixed header into `<output-dir>/graph.bin`.
    const FAKE_COMPILER: &str = r#"
out=""; prev=""
for a in "$@"; do
  if [ "$prev" = "--output-dir" ]; then out="$a"; fi
  prev="$a"
done
printf 'NPU0' > "$out/graph.bin"
cat "$prev" >> "$out/graph.bin"
"#;

    fn fake_compiler(script: &str) -> CommandCompiler {
        CommandCompiler::new("sh").with_leading_args(["-c", script, "npu-compiler"])
    }

    fn hardware_spec() -> Vec<CompileSpec> {
        CompileSpecBuilder::new()
            .hardware_output(HardwareTarget::new("npu-128").memory_mode("shared"))
            .unwrap()
            .build()
    }

    const GRAPH: &str = "\
%x = placeholder input : f32[4]
%y = call_function aten.relu.default(%x) : f32[4]
output(%y)
";

    #[test]
    fn test_hardware_backend_wraps_generic_artifact() {
        init_logging();

        let graph = Graph::parse(GRAPH).unwrap();
        let request = BackendSelector::default().resolve(hardware_spec()).unwrap();
        let delegator = Delegator::new(
            GenericLoweringBackend::default(),
            ChainedHardwareBackend::with_compiler(Box::new(fake_compiler(FAKE_COMPILER))),
        );
        let binary = delegator.preprocess(&request, &graph).unwrap();

        let generic = GenericLoweringBackend::default()
            .preprocess(&graph, &generic_spec())
            .unwrap();
        assert_eq!(&binary.processed_bytes[..4], b"NPU0");
        assert_eq!(&binary.processed_bytes[4..], generic.processed_bytes.as_slice());
    }

    #[test]
    fn test_hardware_request_keeps_generic_dumps() {
        init_logging();

        let dump = tempfile::tempdir().unwrap();
        let compile_spec = CompileSpecBuilder::new()
            .hardware_output(HardwareTarget::new("npu-128").memory_mode("shared"))
            .unwrap()
            .intermediate_dump_path(dump.path())
            .build();
        let graph = Graph::parse(GRAPH).unwrap();

        let backend =
            ChainedHardwareBackend::with_compiler(Box::new(fake_compiler(FAKE_COMPILER)));
        let binary = backend.preprocess(&graph, &compile_spec).unwrap();

        let mut names: Vec<String> = fs::read_dir(dump.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec!["desc.json", "output.glir"]);

        let dumped = fs::read(dump.path().join("output.glir")).unwrap();
        assert_eq!(dumped.as_slice(), &binary.processed_bytes[4..]);
        let descriptor: serde_json::Value =
            serde_json::from_slice(&fs::read(dump.path().join("desc.json")).unwrap()).unwrap();
        assert!(descriptor.is_object());
    }

    #[test]
    fn test_cli_describes_hardware_intermediate() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let compiler = dir.path().join("npu-compiler");
        fs::write(&compiler, format!("#!/bin/sh{FAKE_COMPILER}")).unwrap();
        fs::set_permissions(&compiler, fs::Permissions::from_mode(0o755)).unwrap();

        let graph_path = dir.path().join("relu.graph");
        let output_path = dir.path().join("relu.bin");
        fs::write(&graph_path, GRAPH).unwrap();

        let output = Command::new(env!("CARGO_BIN_EXE_npu-delegate"))
            .arg(&graph_path)
            .args(["--target", "hardware", "--describe", "--compiler"])
            .arg(&compiler)
            .arg("-o")
            .arg(&output_path)
            .output()
            .unwrap();
        assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("ChainedHardwareBackend"));
        assert!(stdout.contains("CLAMP"));

        let binary = fs::read(&output_path).unwrap();
        assert_eq!(&binary[..4], b"NPU0");
        assert_eq!(Artifact::decode(&binary[4..]).unwrap().records.len(), 3);
    }

    #[test]
    fn test_native_compiler_diagnostic_is_verbatim() {
        init_logging();

        let graph = Graph::parse(GRAPH).unwrap();
        let backend = ChainedHardwareBackend::with_compiler(Box::new(fake_compiler(
            "echo 'npu-128: unknown memory mode shared' >&2; exit 1",
        )));
        let err = backend.preprocess(&graph, &hardware_spec()).unwrap_err();
        match err {
            DelegateError::DownstreamCompile(NativeCompileError::Failed { diagnostic, .. }) => {
                assert_eq!(diagnostic, "npu-128: unknown memory mode shared\n");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}

#[test]
fn test_cli_lowers_graph_file() {
    let dir = tempfile::tempdir().unwrap();
    let graph_path = dir.path().join("chain.graph");
    let output_path = dir.path().join("chain.glir");
    fs::write(
        &graph_path,
        "%x = placeholder input : f32[1,4]\n\
         %y = call_function aten.sigmoid.default(%x) : f32[1,4]\n\
         output(%y)\n",
    )
    .unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_npu-delegate"))
        .arg(&graph_path)
        .arg("--describe")
        .arg("-o")
        .arg(&output_path)
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("GenericLoweringBackend"));
    assert!(stdout.contains("SIGMOID"));
    let bytes = fs::read(&output_path).unwrap();
    assert_eq!(Artifact::decode(&bytes).unwrap().records.len(), 3);
}

#[test]
fn test_cli_reports_parse_errors() {
    let dir = tempfile::tempdir().unwrap();
    let graph_path = dir.path().join("broken.graph");
    fs::write(&graph_path, "%y = call_function aten.relu.default(%x) : f32[4]\n").unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_npu-delegate"))
        .arg(&graph_path)
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("undefined value"));
}
