use std::collections::BTreeMap;

use crate::types::{EdgeKind, EdgeTally, GraphStats, NodeKey, Properties, SchemaStatement};

/// The graph store abstraction. Every write is a merge by unique key, so
/// replaying any operation leaves the graph unchanged.
#[async_trait::async_trait]
pub trait GraphStore: Send + Sync {
    // ── Node operations ────────────────────────────────────────────

    /// Create the node if absent, then merge `properties` into it.
    async fn merge_node(&self, node: &NodeKey, properties: &Properties)
    -> crate::error::Result<()>;

    /// Merge `properties` into an existing node; keys not listed are left
    /// untouched and `Null` values remove a key. Returns `false` without
    /// writing anything when the node does not exist.
    async fn update_node(
        &self,
        node: &NodeKey,
        properties: &Properties,
    ) -> crate::error::Result<bool>;

    /// Read back a node's properties as JSON values.
    async fn node_properties(
        &self,
        node: &NodeKey,
    ) -> crate::error::Result<Option<BTreeMap<String, serde_json::Value>>>;

    // ── Edge operations ────────────────────────────────────────────

    /// Merge one directed edge between two existing nodes. Never creates an
    /// endpoint: returns `false` when either end is missing.
    async fn merge_edge(
        &self,
        kind: EdgeKind,
        from: &NodeKey,
        to: &NodeKey,
    ) -> crate::error::Result<bool>;

    /// Merge a batch of edges out of `from`. Backends with transactions write
    /// the whole batch atomically.
    async fn merge_edges(
        &self,
        from: &NodeKey,
        edges: &[(EdgeKind, NodeKey)],
    ) -> crate::error::Result<EdgeTally> {
        let mut tally = EdgeTally::default();
        for (kind, to) in edges {
            if self.merge_edge(*kind, from, to).await? {
                tally.written += 1;
            } else {
                tally.skipped += 1;
            }
        }
        Ok(tally)
    }

    // ── Schema ─────────────────────────────────────────────────────

    /// Run a schema statement (constraint setup or teardown).
    async fn run_write(&self, statement: SchemaStatement) -> crate::error::Result<()>;

    /// Names of the uniqueness constraints currently defined.
    async fn constraints(&self) -> crate::error::Result<Vec<String>>;

    /// Delete every node and relationship.
    async fn clear_all(&self) -> crate::error::Result<()>;

    // ── Metrics ────────────────────────────────────────────────────

    /// Get summary statistics about the store.
    async fn stats(&self) -> crate::error::Result<GraphStats>;
}
