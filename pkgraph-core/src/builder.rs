//! Turns packages into nodes, properties and typed edges.

use chrono::Utc;
use tracing::debug;

use crate::error::{ValidationError, WriteError};
use crate::normalize::split_full_name;
use crate::store::GraphStore;
use crate::types::{EdgeKind, EdgeTally, NodeKey, Package, PackageType, Properties, PropertyValue};

/// Writes one package at a time into a [`GraphStore`].
pub struct GraphBuilder<'a> {
    store: &'a dyn GraphStore,
}

impl std::fmt::Debug for GraphBuilder<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphBuilder").finish_non_exhaustive()
    }
}

impl<'a> GraphBuilder<'a> {
    pub fn new(store: &'a dyn GraphStore) -> Self {
        Self { store }
    }

    /// Merge the Vendor and Package nodes for `full_name` and the `OWNS`
    /// edge between them.
    pub async fn materialize_package(
        &self,
        full_name: &str,
        category: &PackageType,
    ) -> crate::error::Result<()> {
        let (vendor, name) = split_full_name(full_name)?;

        let vendor_key = NodeKey::vendor(vendor);
        let mut vendor_props = Properties::new();
        vendor_props.insert("name".into(), vendor.into());
        self.store.merge_node(&vendor_key, &vendor_props).await?;

        let package_key = NodeKey::package(full_name);
        let mut package_props = Properties::new();
        package_props.insert("name".into(), name.into());
        package_props.insert("full_name".into(), full_name.into());
        package_props.insert("type".into(), category.as_str().into());
        package_props.insert("vendor".into(), vendor.into());
        self.store.merge_node(&package_key, &package_props).await?;

        self.store
            .merge_edge(EdgeKind::Owns, &vendor_key, &package_key)
            .await?;
        Ok(())
    }

    /// Merge-update the Package node listed as `full_name` with the
    /// aggregated properties. The node must already exist.
    pub async fn write_info(&self, full_name: &str, package: &Package) -> crate::error::Result<()> {
        let properties = package_properties(package)?;
        let key = NodeKey::package(full_name);
        if !self.store.update_node(&key, &properties).await? {
            return Err(WriteError::NodeMissing {
                label: key.label.to_string(),
                key: key.key,
            }
            .into());
        }
        Ok(())
    }

    /// Merge one edge per (kind, target) pair out of the node listed as
    /// `full_name`. Targets absent from the graph are skipped and counted.
    pub async fn write_dependencies(
        &self,
        full_name: &str,
        package: &Package,
    ) -> crate::error::Result<EdgeTally> {
        let source = NodeKey::package(full_name);
        let edges: Vec<(EdgeKind, NodeKey)> = EdgeKind::DEPENDENCIES
            .into_iter()
            .flat_map(|kind| {
                package
                    .dependencies(kind)
                    .into_iter()
                    .map(move |target| (kind, NodeKey::package(target)))
            })
            .collect();

        if edges.is_empty() {
            return Ok(EdgeTally::default());
        }

        let tally = self.store.merge_edges(&source, &edges).await?;
        if tally.skipped > 0 {
            debug!(
                package = %full_name,
                written = tally.written,
                skipped = tally.skipped,
                "Skipped edges to packages not in the graph"
            );
        }
        Ok(tally)
    }
}

/// The full property set written by [`GraphBuilder::write_info`].
pub fn package_properties(package: &Package) -> Result<Properties, ValidationError> {
    let mut props = Properties::new();
    let mut set = |key: &str, value: PropertyValue| {
        props.insert(key.to_string(), value);
    };

    set("description", package.description.clone().into());
    set("published_at", package.time.with_timezone(&Utc).into());
    set("updated_at", package.last_updated_time()?.into());
    set("type", package.declared_type().as_str().into());
    set("licenses", package.aggregate_licenses().into());
    set("versions", package.aggregate_versions().into());
    set("authors", package.aggregate_authors().into());
    set("maintainers", package.aggregate_maintainers().into());
    set("repository", package.repository.clone().into());
    set("github_stars", package.github_stars.into());
    set("github_watchers", package.github_watchers.into());
    set("github_forks", package.github_forks.into());
    set("github_open_issues", package.github_open_issues.into());
    set("language", package.language.clone().into());
    set("abandoned", package.abandoned.as_ref().into());
    set("dependents", package.dependents.into());
    set("suggesters", package.suggesters.into());
    set("downloads_total", package.downloads.total.into());
    set("downloads_monthly", package.downloads.monthly.into());
    set("downloads_daily", package.downloads.daily.into());
    set("has_stable_release", package.has_stable_release().into());
    set("is_custom_type", package.is_custom_type().into());
    Ok(props)
}
