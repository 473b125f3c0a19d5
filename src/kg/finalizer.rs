//! Commit of a chunk's active nodes

use crate::graph::{GraphResult, GraphStore};

/// Width of permanent node ids
pub const ID_WIDTH: usize = 9;

/// Permanent id of the `n`-th committed node
pub fn format_id(n: u64) -> String {
    format!("{n:0width$x}", width = ID_WIDTH)
}

/// What one finalization committed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FinalizeReport {
    /// Committed nodes before this pass
    pub committed_before: u64,
    /// Active nodes given a permanent id
    pub assigned: u64,
}

/// Number every active node after the committed ones, link it to the file
/// and clear the provisional markers
pub async fn finalize(graph: &dyn GraphStore, file_id: &str) -> GraphResult<FinalizeReport> {
    let committed_before = graph.count_committed().await?;
    let active = graph.active_nodes().await?;

    let mut n = committed_before;
    for node in &active {
        n += 1;
        graph.assign_id(node.handle, &format_id(n)).await?;
    }

    graph.link_active_to_file(file_id).await?;
    graph.clear_provisional().await?;

    let report = FinalizeReport {
        committed_before,
        assigned: n - committed_before,
    };
    tracing::debug!(file_id, ?report, "Chunk finalized");
    Ok(report)
}
