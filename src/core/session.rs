// This module tracks per-partition lowering state. LoweringSession is created by the generic
// backend for every preprocess call and records which partition is being lowered and how
// the walk progressed: nodes visited per kind, records emitted into the artifact and a
// breakdown of operator targets dispatched to visitors. SessionStats is a plain snapshot of
// those counters with a Display implementation used for debug logging once a partition has
// been serialized.

//! Per-partition lowering session and statistics.

use std::fmt;

use hashbrown::HashMap;

use crate::graph::NodeKind;

/// State for lowering one graph partition.
#[derive(Debug, Default)]
pub struct LoweringSession {
    /// Delegation tag of the partition, if the graph carried one.
    partition: Option<String>,

    stats: SessionStats,
}

impl LoweringSession {
    /// Create a session for the partition with the given delegation tag.
    pub fn new(partition: Option<&str>) -> Self {
        Self {
            partition: partition.map(str::to_string),
            stats: SessionStats::default(),
        }
    }

    /// Delegation tag of the partition being lowered.
    pub fn partition(&self) -> Option<&str> {
        self.partition.as_deref()
    }

    /// File name suffix used to keep debug dumps of different partitions apart.
    pub fn dump_suffix(&self) -> String {
        match &self.partition {
            Some(tag) => format!("_{tag}"),
            None => String::new(),
        }
    }

    /// Record that a node of the given kind was visited.
    pub fn record_node(&mut self, kind: NodeKind) {
        self.stats.nodes_visited += 1;
        match kind {
            NodeKind::Placeholder => self.stats.placeholders += 1,
            NodeKind::Output => self.stats.outputs += 1,
            _ => {}
        }
    }

    /// Record a dispatch of `target` to its visitor.
    pub fn record_operator(&mut self, target: &str) {
        *self
            .stats
            .operator_counts
            .entry(target.to_string())
            .or_insert(0) += 1;
    }

    /// Record the number of artifact records emitted so far.
    pub fn record_emitted(&mut self, total_records: usize) {
        self.stats.records_emitted = total_records;
    }

    /// Record the size of the serialized artifact.
    pub fn record_artifact_size(&mut self, bytes: usize) {
        self.stats.artifact_size = bytes;
    }

    /// Get lowering statistics.
    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }
}

/// Lowering statistics for one partition.
#[derive(Debug, Default, Clone)]
pub struct SessionStats {
    /// Number of graph nodes visited.
    pub nodes_visited: usize,

    /// Placeholder nodes turned into input bindings.
    pub placeholders: usize,

    /// Output nodes turned into output bindings.
    pub outputs: usize,

    /// Records in the artifact.
    pub records_emitted: usize,

    /// Serialized artifact size in bytes.
    pub artifact_size: usize,

    /// Count of each operator target dispatched.
    pub operator_counts: HashMap<String, usize>,
}

impl fmt::Display for SessionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Lowering Session Statistics:")?;
        writeln!(f, "  Nodes visited: {}", self.nodes_visited)?;
        writeln!(f, "  Input bindings: {}", self.placeholders)?;
        writeln!(f, "  Output bindings: {}", self.outputs)?;
        writeln!(f, "  Records emitted: {}", self.records_emitted)?;
        writeln!(f, "  Artifact size: {} bytes", self.artifact_size)?;

        if !self.operator_counts.is_empty() {
            writeln!(f, "  Operator breakdown:")?;
            let mut sorted: Vec<_> = self.operator_counts.iter().collect();
            sorted.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));

            for (target, count) in sorted.into_iter().take(10) {
                writeln!(f, "    {}: {}", target, count)?;
            }
        }

        Ok(())
    }
}
