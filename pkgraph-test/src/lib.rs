//! Dataset fixtures for pkgraph integration tests.

use std::collections::BTreeMap;
use std::path::Path;

use pkgraph_core::pipeline::{ImportOptions, ImportPipeline, RunReport};
use pkgraph_core::progress::NoopReporter;
use pkgraph_core::source::FsRawStore;
use pkgraph_core::store::sqlite::SqliteStore;
use serde_json::{Value, json};

/// A temporary on-disk dataset laid out the way `FsRawStore` reads it.
#[derive(Debug)]
pub struct Dataset {
    pub dir: tempfile::TempDir,
    lists: BTreeMap<String, Vec<String>>,
}

impl Dataset {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("create tempdir"),
            lists: BTreeMap::new(),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// List `name` under `category` and write its document.
    pub fn add(&mut self, category: &str, package: &PackageDoc) -> &mut Self {
        self.list(category, &package.name);
        self.write_document(&package.name, &package.to_json().to_string());
        self
    }

    /// List `name` under `category` without writing a document.
    pub fn list(&mut self, category: &str, name: &str) -> &mut Self {
        let names = self.lists.entry(category.to_string()).or_default();
        names.push(name.to_string());
        let body = json!({ "packageNames": names });
        std::fs::write(
            self.dir.path().join(format!("{category}.json")),
            body.to_string(),
        )
        .expect("write package list");
        self
    }

    /// Write a raw document verbatim, valid or not.
    pub fn write_document(&mut self, name: &str, body: &str) -> &mut Self {
        let (vendor, package) = name.split_once('/').expect("vendor/package name");
        let dir = self.dir.path().join("packages").join(vendor);
        std::fs::create_dir_all(&dir).expect("create vendor dir");
        std::fs::write(dir.join(format!("{package}.json")), body).expect("write document");
        self
    }

    /// A `pkgraph.toml` pointing at this dataset and a SQLite file inside it.
    pub fn write_sqlite_config(&self) -> std::path::PathBuf {
        let config = format!(
            "[dataset]\nroot = {root:?}\n\n[store]\nbackend = \"sqlite\"\n\n[sqlite]\npath = {db:?}\n",
            root = self.path().display().to_string(),
            db = self.path().join("graph.db").display().to_string(),
        );
        let path = self.path().join("pkgraph.toml");
        std::fs::write(&path, config).expect("write config");
        path
    }
}

impl Default for Dataset {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for one registry document.
#[derive(Debug, Clone)]
pub struct PackageDoc {
    pub name: String,
    package_type: Option<String>,
    abandoned: Option<Value>,
    versions: Vec<Value>,
}

impl PackageDoc {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            package_type: None,
            abandoned: None,
            versions: Vec::new(),
        }
    }

    pub fn package_type(mut self, package_type: &str) -> Self {
        self.package_type = Some(package_type.to_string());
        self
    }

    pub fn abandoned(mut self, value: Value) -> Self {
        self.abandoned = Some(value);
        self
    }

    /// Add a release with a timestamp and `require` links.
    pub fn version(self, version: &str, time: &str, require: &[&str]) -> Self {
        let require: serde_json::Map<String, Value> = require
            .iter()
            .map(|name| ((*name).to_string(), json!("*")))
            .collect();
        self.raw_version(json!({
            "version": version,
            "version_normalized": normalized(version),
            "license": ["MIT"],
            "authors": [{"name": "Jane Doe"}],
            "time": time,
            "require": require,
        }))
    }

    /// Add a release verbatim.
    pub fn raw_version(mut self, version: Value) -> Self {
        self.versions.push(version);
        self
    }

    pub fn to_json(&self) -> Value {
        let versions: serde_json::Map<String, Value> = self
            .versions
            .iter()
            .map(|v| {
                let key = v["version"].as_str().unwrap_or_default().to_string();
                (key, v.clone())
            })
            .collect();

        let mut package = json!({
            "name": self.name,
            "description": format!("{} package", self.name),
            "time": "2019-03-01T10:00:00+00:00",
            "maintainers": [{"name": "jane"}],
            "repository": format!("https://github.com/{}", self.name),
            "github_stars": 5,
            "downloads": {"total": 1000, "monthly": 100, "daily": 3},
            "versions": versions,
        });
        if let Some(package_type) = &self.package_type {
            package["type"] = json!(package_type);
        }
        if let Some(abandoned) = &self.abandoned {
            package["abandoned"] = abandoned.clone();
        }
        json!({ "package": package })
    }
}

/// Run every phase over `dataset` into a fresh in-memory store.
pub async fn import_dataset(dataset: &Dataset) -> (RunReport, SqliteStore) {
    let store = SqliteStore::in_memory().expect("open in-memory store");
    let report = import_into(dataset, &store).await;
    (report, store)
}

/// Run every phase over `dataset` into an existing store.
pub async fn import_into(dataset: &Dataset, store: &SqliteStore) -> RunReport {
    let raw = FsRawStore::new(dataset.path());
    let options = ImportOptions {
        category: None,
        write_info: true,
        write_dependencies: true,
    };
    ImportPipeline::new(&raw, store, &NoopReporter)
        .run_full(&options)
        .await
        .expect("pipeline run")
}

/// `1.2.3` → `1.2.3.0`; branch names and pre-release suffixes pass through.
fn normalized(version: &str) -> String {
    if version.starts_with("dev-") {
        return version.to_string();
    }
    let (numbers, suffix) = version.split_once('-').unwrap_or((version, ""));
    let mut parts: Vec<&str> = numbers.split('.').collect();
    while parts.len() < 4 {
        parts.push("0");
    }
    let base = parts.join(".");
    if suffix.is_empty() {
        base
    } else {
        format!("{base}-{suffix}")
    }
}
