//! Uniqueness constraints and the destructive reset.

use tracing::{info, instrument, warn};

use crate::types::{NodeLabel, SchemaStatement, UniqueConstraint};

use super::GraphStore;

/// One uniqueness constraint per node label, on its key property.
pub fn unique_constraints() -> impl Iterator<Item = UniqueConstraint> {
    NodeLabel::ALL
        .into_iter()
        .map(|label| UniqueConstraint { label })
}

/// Applies schema statements against any [`GraphStore`].
pub struct SchemaManager<'a> {
    store: &'a dyn GraphStore,
}

impl std::fmt::Debug for SchemaManager<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaManager").finish_non_exhaustive()
    }
}

impl<'a> SchemaManager<'a> {
    pub fn new(store: &'a dyn GraphStore) -> Self {
        Self { store }
    }

    /// Ensure the uniqueness constraints exist. Safe to call repeatedly.
    #[instrument(skip_all, name = "setup_constraints")]
    pub async fn setup_constraints(&self) -> crate::error::Result<()> {
        for constraint in unique_constraints() {
            self.store
                .run_write(SchemaStatement::CreateUniqueConstraint(constraint))
                .await?;
            info!(
                constraint = constraint.name(),
                label = %constraint.label,
                property = constraint.property(),
                "Unique constraint ensured"
            );
        }
        Ok(())
    }

    /// Delete every node and relationship, then drop the constraints.
    #[instrument(skip_all, name = "reset")]
    pub async fn reset(&self) -> crate::error::Result<()> {
        warn!("Deleting all nodes and relationships");
        self.store.clear_all().await?;
        for constraint in unique_constraints() {
            self.store
                .run_write(SchemaStatement::DropUniqueConstraint(constraint))
                .await?;
        }
        info!("Graph reset");
        Ok(())
    }

    /// Names of the uniqueness constraints currently present.
    pub async fn constraints(&self) -> crate::error::Result<Vec<String>> {
        self.store.constraints().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::GraphStore;
    use crate::store::sqlite::SqliteStore;
    use crate::types::{NodeKey, Properties};

    #[tokio::test]
    async fn setup_is_idempotent() {
        let store = SqliteStore::in_memory().unwrap();
        let schema = SchemaManager::new(&store);

        schema.setup_constraints().await.unwrap();
        schema.setup_constraints().await.unwrap();

        let names = schema.constraints().await.unwrap();
        assert_eq!(names, vec!["package_full_name", "vendor_name"]);
    }

    #[tokio::test]
    async fn reset_clears_graph_and_constraints() {
        let store = SqliteStore::in_memory().unwrap();
        let schema = SchemaManager::new(&store);
        schema.setup_constraints().await.unwrap();
        store
            .merge_node(&NodeKey::vendor("acme"), &Properties::new())
            .await
            .unwrap();

        schema.reset().await.unwrap();

        assert!(schema.constraints().await.unwrap().is_empty());
        assert_eq!(store.stats().await.unwrap().total_nodes, 0);

        // Reset on an empty graph is fine too.
        schema.reset().await.unwrap();
    }
}
