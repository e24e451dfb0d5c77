//! Neo4j backend over Bolt.
//!
//! Labels, relationship types and property keys come from the closed
//! vocabularies in [`crate::types`], so they are interpolated into Cypher;
//! every value travels as a query parameter.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use chrono::{DateTime, FixedOffset, Utc};
use neo4rs::{BoltType, ConfigBuilder, Graph, Query, query};
use tracing::{debug, info};

use crate::config::Neo4jSection;
use crate::error::WriteError;
use crate::types::{
    EdgeKind, EdgeTally, GraphStats, NodeKey, NodeLabel, Properties, PropertyValue,
    SchemaStatement,
};

use super::GraphStore;

/// Graph store backed by a Neo4j server.
pub struct Neo4jStore {
    graph: Graph,
}

impl std::fmt::Debug for Neo4jStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Neo4jStore").finish_non_exhaustive()
    }
}

impl Neo4jStore {
    /// Connect and verify the server answers.
    pub async fn connect(config: &Neo4jSection) -> crate::error::Result<Self> {
        let password = config.resolve_password()?;

        let mut builder = ConfigBuilder::new()
            .uri(config.uri.as_str())
            .user(config.user.as_str())
            .password(password.as_str());
        if let Some(db) = config.database.as_deref() {
            builder = builder.db(db);
        }
        let neo_config = builder.build().map_err(WriteError::Neo4j)?;

        let graph = Graph::connect(neo_config)
            .await
            .map_err(WriteError::Neo4j)?;
        info!(uri = %config.uri, "Connected to Neo4j");

        let store = Self { graph };
        let version = store.server_version().await?;
        info!(version = %version, "Neo4j server version");
        Ok(store)
    }

    async fn server_version(&self) -> crate::error::Result<String> {
        let mut rows = self
            .graph
            .execute(query(
                "CALL dbms.components() YIELD versions RETURN versions",
            ))
            .await
            .map_err(WriteError::Neo4j)?;
        if let Some(row) = rows.next().await.map_err(WriteError::Neo4j)? {
            let versions: Vec<String> = row.get("versions").map_err(decode_error)?;
            if let Some(version) = versions.into_iter().next() {
                return Ok(version);
            }
        }
        Err(WriteError::Decode("dbms.components() returned no version".to_string()).into())
    }

    /// Run a query expected to yield a single integer column.
    async fn fetch_count(&self, q: Query, column: &str) -> crate::error::Result<i64> {
        let mut rows = self.graph.execute(q).await.map_err(WriteError::Neo4j)?;
        let Some(row) = rows.next().await.map_err(WriteError::Neo4j)? else {
            return Ok(0);
        };
        let count = row.get::<i64>(column).map_err(decode_error)?;
        Ok(count)
    }

    async fn count_by(&self, cypher: &str) -> crate::error::Result<BTreeMap<String, u64>> {
        let mut rows = self
            .graph
            .execute(query(cypher))
            .await
            .map_err(WriteError::Neo4j)?;
        let mut counts = BTreeMap::new();
        while let Some(row) = rows.next().await.map_err(WriteError::Neo4j)? {
            let name: String = row.get("name").map_err(decode_error)?;
            let count: i64 = row.get("count").map_err(decode_error)?;
            counts.insert(name, u64::try_from(count).unwrap_or(0));
        }
        Ok(counts)
    }
}

fn decode_error(e: neo4rs::DeError) -> WriteError {
    WriteError::Decode(e.to_string())
}

/// `(n:Label {key_property: $key})`
fn node_pattern(var: &str, label: NodeLabel, param: &str) -> String {
    format!(
        "({var}:{} {{{}: ${param}}})",
        label.as_str(),
        label.key_property()
    )
}

/// Render a `SET` clause with `+=` semantics. `Null` removes the property;
/// timestamps are stored as native `datetime` values.
fn set_clause(var: &str, properties: &Properties) -> (String, Vec<(String, BoltType)>) {
    let mut assignments = Vec::with_capacity(properties.len());
    let mut params = Vec::new();

    for (i, (key, value)) in properties.iter().enumerate() {
        let param = format!("p{i}");
        let target = format!("{var}.`{}`", key.replace('`', "``"));
        let bolt: Option<BoltType> = match value {
            PropertyValue::Null => None,
            PropertyValue::Bool(b) => Some((*b).into()),
            PropertyValue::Integer(n) => Some((*n).into()),
            PropertyValue::Text(s) => Some(s.clone().into()),
            PropertyValue::List(items) => Some(items.clone().into()),
            PropertyValue::Timestamp(ts) => Some(ts.to_rfc3339().into()),
        };
        match (value, bolt) {
            (_, None) => assignments.push(format!("{target} = null")),
            (PropertyValue::Timestamp(_), Some(bolt)) => {
                assignments.push(format!("{target} = datetime(${param})"));
                params.push((param, bolt));
            }
            (_, Some(bolt)) => {
                assignments.push(format!("{target} = ${param}"));
                params.push((param, bolt));
            }
        }
    }

    if assignments.is_empty() {
        return (String::new(), params);
    }
    (format!("SET {}", assignments.join(", ")), params)
}

fn with_params(mut q: Query, params: Vec<(String, BoltType)>) -> Query {
    for (name, value) in params {
        q = q.param(&name, value);
    }
    q
}

fn merge_node_cypher(node: &NodeKey, properties: &Properties) -> (String, Vec<(String, BoltType)>) {
    let (set, params) = set_clause("n", properties);
    let mut cypher = format!("MERGE {}", node_pattern("n", node.label, "key"));
    if !set.is_empty() {
        let _ = write!(cypher, " {set}");
    }
    (cypher, params)
}

fn update_node_cypher(node: &NodeKey, properties: &Properties) -> (String, Vec<(String, BoltType)>) {
    let (set, params) = set_clause("n", properties);
    let mut cypher = format!("MATCH {}", node_pattern("n", node.label, "key"));
    if !set.is_empty() {
        let _ = write!(cypher, " {set}");
    }
    cypher.push_str(" RETURN count(n) AS matched");
    (cypher, params)
}

/// Match-both-ends edge merge over a list of target keys sharing one label.
fn merge_edges_cypher(from: NodeLabel, kind: EdgeKind, to: NodeLabel) -> String {
    format!(
        "MATCH {source} \
         UNWIND $targets AS target \
         MATCH (b:{to_label} {{{to_key}: target}}) \
         MERGE (a)-[:{kind}]->(b) \
         RETURN count(b) AS matched",
        source = node_pattern("a", from, "source"),
        to_label = to.as_str(),
        to_key = to.key_property(),
        kind = kind.as_str(),
    )
}

fn schema_cypher(statement: SchemaStatement) -> String {
    match statement {
        SchemaStatement::CreateUniqueConstraint(c) => format!(
            "CREATE CONSTRAINT {} IF NOT EXISTS FOR (n:{}) REQUIRE n.{} IS UNIQUE",
            c.name(),
            c.label.as_str(),
            c.property()
        ),
        SchemaStatement::DropUniqueConstraint(c) => {
            format!("DROP CONSTRAINT {} IF EXISTS", c.name())
        }
    }
}

#[async_trait::async_trait]
impl GraphStore for Neo4jStore {
    async fn merge_node(
        &self,
        node: &NodeKey,
        properties: &Properties,
    ) -> crate::error::Result<()> {
        let (cypher, params) = merge_node_cypher(node, properties);
        let q = with_params(query(&cypher).param("key", node.key.as_str()), params);
        self.graph.run(q).await.map_err(WriteError::Neo4j)?;
        Ok(())
    }

    async fn update_node(
        &self,
        node: &NodeKey,
        properties: &Properties,
    ) -> crate::error::Result<bool> {
        let (cypher, params) = update_node_cypher(node, properties);
        let q = with_params(query(&cypher).param("key", node.key.as_str()), params);
        Ok(self.fetch_count(q, "matched").await? > 0)
    }

    async fn node_properties(
        &self,
        node: &NodeKey,
    ) -> crate::error::Result<Option<BTreeMap<String, serde_json::Value>>> {
        let cypher = format!(
            "MATCH {} UNWIND keys(n) AS k RETURN k, n[k] AS v",
            node_pattern("n", node.label, "key")
        );
        let mut rows = self
            .graph
            .execute(query(&cypher).param("key", node.key.as_str()))
            .await
            .map_err(WriteError::Neo4j)?;

        let mut properties = BTreeMap::new();
        while let Some(row) = rows.next().await.map_err(WriteError::Neo4j)? {
            let key: String = row.get("k").map_err(decode_error)?;
            // Temporal values have no JSON form; render them as RFC 3339.
            let value = match row.get::<serde_json::Value>("v") {
                Ok(value) => value,
                Err(_) => {
                    let ts: DateTime<FixedOffset> = row.get("v").map_err(decode_error)?;
                    serde_json::Value::String(ts.with_timezone(&Utc).to_rfc3339())
                }
            };
            properties.insert(key, value);
        }

        // Every stored node carries its key property, so no rows means no node.
        Ok((!properties.is_empty()).then_some(properties))
    }

    async fn merge_edge(
        &self,
        kind: EdgeKind,
        from: &NodeKey,
        to: &NodeKey,
    ) -> crate::error::Result<bool> {
        let q = query(&merge_edges_cypher(from.label, kind, to.label))
            .param("source", from.key.as_str())
            .param("targets", vec![to.key.clone()]);
        Ok(self.fetch_count(q, "matched").await? > 0)
    }

    async fn merge_edges(
        &self,
        from: &NodeKey,
        edges: &[(EdgeKind, NodeKey)],
    ) -> crate::error::Result<EdgeTally> {
        let mut grouped: BTreeMap<(EdgeKind, NodeLabel), Vec<String>> = BTreeMap::new();
        for (kind, to) in edges {
            grouped
                .entry((*kind, to.label))
                .or_default()
                .push(to.key.clone());
        }

        let mut tally = EdgeTally::default();
        let mut txn = self.graph.start_txn().await.map_err(WriteError::Neo4j)?;
        for ((kind, to_label), targets) in grouped {
            let requested = u64::try_from(targets.len()).unwrap_or(u64::MAX);
            let q = query(&merge_edges_cypher(from.label, kind, to_label))
                .param("source", from.key.as_str())
                .param("targets", targets);

            let mut rows = txn.execute(q).await.map_err(WriteError::Neo4j)?;
            let matched = match rows.next(txn.handle()).await.map_err(WriteError::Neo4j)? {
                Some(row) => row.get::<i64>("matched").map_err(decode_error)?,
                None => 0,
            };
            let matched = u64::try_from(matched).unwrap_or(0);
            debug!(source = %from, kind = %kind, requested, matched, "Merged edges");
            tally.written += matched;
            tally.skipped += requested.saturating_sub(matched);
        }
        txn.commit().await.map_err(WriteError::Neo4j)?;
        Ok(tally)
    }

    async fn run_write(&self, statement: SchemaStatement) -> crate::error::Result<()> {
        self.graph
            .run(query(&schema_cypher(statement)))
            .await
            .map_err(WriteError::Neo4j)?;
        Ok(())
    }

    async fn constraints(&self) -> crate::error::Result<Vec<String>> {
        let mut rows = self
            .graph
            .execute(query(
                "SHOW CONSTRAINTS YIELD name, type WHERE type = 'UNIQUENESS' RETURN name ORDER BY name",
            ))
            .await
            .map_err(WriteError::Neo4j)?;
        let mut names = Vec::new();
        while let Some(row) = rows.next().await.map_err(WriteError::Neo4j)? {
            names.push(row.get::<String>("name").map_err(decode_error)?);
        }
        Ok(names)
    }

    async fn clear_all(&self) -> crate::error::Result<()> {
        self.graph
            .run(query("MATCH (n) DETACH DELETE n"))
            .await
            .map_err(WriteError::Neo4j)?;
        Ok(())
    }

    async fn stats(&self) -> crate::error::Result<GraphStats> {
        let nodes_by_label = self
            .count_by("MATCH (n) UNWIND labels(n) AS name RETURN name, count(*) AS count")
            .await?;
        let edges_by_kind = self
            .count_by("MATCH ()-[r]->() RETURN type(r) AS name, count(*) AS count")
            .await?;
        Ok(GraphStats {
            total_nodes: nodes_by_label.values().sum(),
            total_edges: edges_by_kind.values().sum(),
            nodes_by_label,
            edges_by_kind,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::types::UniqueConstraint;

    #[test]
    fn merge_node_sets_properties_in_key_order() {
        let mut properties = Properties::new();
        properties.insert("type".into(), "library".into());
        properties.insert("name".into(), "widget".into());

        let (cypher, params) = merge_node_cypher(&NodeKey::package("acme/widget"), &properties);
        assert_eq!(
            cypher,
            "MERGE (n:Package {full_name: $key}) SET n.`name` = $p0, n.`type` = $p1"
        );
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn merge_node_without_properties_has_no_set() {
        let (cypher, params) = merge_node_cypher(&NodeKey::vendor("acme"), &Properties::new());
        assert_eq!(cypher, "MERGE (n:Vendor {name: $key})");
        assert!(params.is_empty());
    }

    #[test]
    fn update_clears_null_and_wraps_timestamps() {
        let mut properties = Properties::new();
        properties.insert("abandoned".into(), PropertyValue::Null);
        properties.insert(
            "updated_at".into(),
            Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap().into(),
        );

        let (cypher, params) = update_node_cypher(&NodeKey::package("acme/widget"), &properties);
        assert_eq!(
            cypher,
            "MATCH (n:Package {full_name: $key}) SET n.`abandoned` = null, \
             n.`updated_at` = datetime($p1) RETURN count(n) AS matched"
        );
        assert_eq!(params.len(), 1);
        assert_eq!(params[0].0, "p1");
    }

    #[test]
    fn edge_merge_matches_both_ends() {
        let cypher = merge_edges_cypher(NodeLabel::Package, EdgeKind::DevRequires, NodeLabel::Package);
        assert!(cypher.starts_with("MATCH (a:Package {full_name: $source})"));
        assert!(cypher.contains("MATCH (b:Package {full_name: target})"));
        assert!(cypher.contains("MERGE (a)-[:DEV_REQUIRES]->(b)"));
        assert!(!cypher.contains("CREATE"));
    }

    #[test]
    fn constraint_statements_are_conditional() {
        let c = UniqueConstraint {
            label: NodeLabel::Package,
        };
        assert_eq!(
            schema_cypher(SchemaStatement::CreateUniqueConstraint(c)),
            "CREATE CONSTRAINT package_full_name IF NOT EXISTS FOR (n:Package) REQUIRE n.full_name IS UNIQUE"
        );
        assert_eq!(
            schema_cypher(SchemaStatement::DropUniqueConstraint(c)),
            "DROP CONSTRAINT package_full_name IF EXISTS"
        );
    }
}
