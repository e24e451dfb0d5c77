use crate::types::PackageType;

/// Read-only access to the harvested registry dataset.
///
/// The fetch layer owns writing this data; the import only reads it.
#[async_trait::async_trait]
pub trait RawStore: Send + Sync {
    /// Package names (`vendor/package`) published under a category.
    async fn package_names(&self, category: &PackageType) -> crate::error::Result<Vec<String>>;

    /// The raw JSON document for one package.
    async fn package_document(&self, full_name: &str) -> crate::error::Result<String>;
}
