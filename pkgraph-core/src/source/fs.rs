//! Filesystem dataset: `<category>.json` lists plus `packages/<vendor>/<package>.json`.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::SourceError;
use crate::normalize::split_full_name;
use crate::types::PackageType;

use super::RawStore;

#[derive(Deserialize)]
struct PackageList {
    #[serde(rename = "packageNames")]
    package_names: Vec<String>,
}

/// Raw store backed by the fetch layer's on-disk dataset.
#[derive(Debug, Clone)]
pub struct FsRawStore {
    root: PathBuf,
}

impl FsRawStore {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn category_path(&self, category: &PackageType) -> PathBuf {
        self.root.join(format!("{}.json", category.as_str()))
    }

    pub fn document_path(&self, vendor: &str, package: &str) -> PathBuf {
        self.root
            .join("packages")
            .join(vendor)
            .join(format!("{package}.json"))
    }
}

#[async_trait::async_trait]
impl RawStore for FsRawStore {
    async fn package_names(&self, category: &PackageType) -> crate::error::Result<Vec<String>> {
        let path = self.category_path(category);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!(category = %category, path = %path.display(), "Package list not found");
                return Ok(Vec::new());
            }
            Err(e) => return Err(SourceError::Io(e).into()),
        };

        let list: PackageList =
            serde_json::from_str(&content).map_err(|e| SourceError::MalformedList {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
        debug!(category = %category, count = list.package_names.len(), "Loaded package list");
        Ok(list.package_names)
    }

    async fn package_document(&self, full_name: &str) -> crate::error::Result<String> {
        let (vendor, package) = split_full_name(full_name)?;
        let path = self.document_path(vendor, package);
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(SourceError::NotFound(full_name.to_string()).into())
            }
            Err(e) => Err(SourceError::Io(e).into()),
        }
    }
}
