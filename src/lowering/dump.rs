//! Debug dumps of the in-progress artifact.
//!
//! [`DumpScope`] owns the artifact while the graph is walked. Finishing the
//! scope serializes the artifact and, if a dump directory was configured,
//! writes the artifact plus its JSON descriptor. Dropping an unfinished scope
//! writes a single diagnostic file with whatever records exist, so every
//! early exit from the walk leaves a trace on disk.
//!
//! File names carry the partition suffix (`_<tag>` or empty):
//!
//! ```text
//! output_A.glir      serialized artifact
//! desc_A.json        descriptor of the artifact
//! debug_fail_A.json  partial state after a failed walk
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use super::artifact::{ArtifactBuilder, ArtifactDescriptor};
use crate::core::{DelegateError, DelegateResult};
use crate::graph::Node;

pub fn artifact_path(dir: &Path, suffix: &str) -> PathBuf {
    dir.join(format!("output{suffix}.glir"))
}

pub fn descriptor_path(dir: &Path, suffix: &str) -> PathBuf {
    dir.join(format!("desc{suffix}.json"))
}

pub fn failure_path(dir: &Path, suffix: &str) -> PathBuf {
    dir.join(format!("debug_fail{suffix}.json"))
}

fn write_file(path: &Path, contents: &[u8]) -> DelegateResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| DelegateError::io(parent, e))?;
    }
    fs::write(path, contents).map_err(|e| DelegateError::io(path, e))
}

#[derive(Serialize)]
struct FailureReport<'a> {
    failed_node: Option<&'a str>,
    node_kind: Option<&'static str>,
    partial: ArtifactDescriptor<'a>,
}

/// Scoped owner of the artifact under construction.
pub struct DumpScope {
    builder: ArtifactBuilder,
    dir: Option<PathBuf>,
    suffix: String,
    /// Node being lowered, reported if the scope is dropped unfinished.
    current: Option<(String, &'static str)>,
    finished: bool,
}

impl DumpScope {
    pub fn new(dir: Option<PathBuf>, suffix: String) -> Self {
        Self {
            builder: ArtifactBuilder::new(),
            dir,
            suffix,
            current: None,
            finished: false,
        }
    }

    pub fn builder(&self) -> &ArtifactBuilder {
        &self.builder
    }

    pub fn builder_mut(&mut self) -> &mut ArtifactBuilder {
        &mut self.builder
    }

    /// Note the node about to be lowered.
    pub fn enter(&mut self, node: &Node) {
        self.current = Some((node.name.clone(), node.kind.as_str()));
    }

    /// Serialize the artifact and write the success dump.
    pub fn finish(&mut self) -> DelegateResult<Vec<u8>> {
        self.finished = true;
        let bytes = self.builder.serialize();

        if let Some(dir) = &self.dir {
            let descriptor = self.builder.descriptor().to_json()?;
            write_file(&artifact_path(dir, &self.suffix), &bytes)?;
            write_file(&descriptor_path(dir, &self.suffix), descriptor.as_bytes())?;
            log::info!(
                "Dumped artifact to {}",
                artifact_path(dir, &self.suffix).display()
            );
        }
        Ok(bytes)
    }

    fn write_failure(&self, dir: &Path) -> DelegateResult<PathBuf> {
        let report = FailureReport {
            failed_node: self.current.as_ref().map(|(node, _)| node.as_str()),
            node_kind: self.current.as_ref().map(|(_, kind)| *kind),
            partial: self.builder.descriptor(),
        };
        let path = failure_path(dir, &self.suffix);
        write_file(&path, serde_json::to_string_pretty(&report)?.as_bytes())?;
        Ok(path)
    }
}

impl Drop for DumpScope {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let Some(dir) = &self.dir else {
            return;
        };
        match self.write_failure(dir) {
            Ok(path) => log::info!("Wrote lowering failure dump to {}", path.display()),
            Err(e) => log::warn!("Could not write lowering failure dump: {}", e),
        }
    }
}
