//! Batch orchestration over the package universe.
//!
//! Phase 1 materializes Vendor/Package nodes for every listed name. The
//! enrichment pass then fetches and normalizes each package and writes its
//! properties (phase 2) and dependency edges (phase 3). Every package is
//! processed independently: a failure is recorded in the [`PhaseReport`]
//! and the batch moves on.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::time::{Duration, Instant};

use tracing::{debug, info, instrument, trace, warn};

use crate::builder::GraphBuilder;
use crate::error::PkgraphError;
use crate::normalize::decode_document;
use crate::progress::ProgressReporter;
use crate::source::RawStore;
use crate::store::{GraphStore, SchemaManager};
use crate::types::{EdgeTally, PackageType};

/// What a pipeline run covers.
#[derive(Debug, Clone, Default)]
pub struct ImportOptions {
    /// Restrict the universe to one category. `None` means every known type.
    pub category: Option<PackageType>,
    /// Phase 2: merge aggregated properties onto Package nodes.
    pub write_info: bool,
    /// Phase 3: merge dependency edges.
    pub write_dependencies: bool,
}

impl ImportOptions {
    pub fn categories(&self) -> Vec<PackageType> {
        match &self.category {
            Some(category) => vec![category.clone()],
            None => PackageType::KNOWN.to_vec(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Import,
    Map,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Import => "import",
            Self::Map => "map",
        })
    }
}

/// Where a package is in its lifecycle within one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageStage {
    Pending,
    Fetched,
    Normalized,
    InfoWritten,
    EdgesWritten,
    Done,
}

/// The step a failed package stopped at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureStage {
    Fetch,
    Normalize,
    Write,
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Fetch => "fetch",
            Self::Normalize => "normalize",
            Self::Write => "write",
        })
    }
}

impl From<PackageStage> for FailureStage {
    /// The step that was running when a package last reached `reached`.
    fn from(reached: PackageStage) -> Self {
        match reached {
            PackageStage::Pending => Self::Fetch,
            PackageStage::Fetched => Self::Normalize,
            PackageStage::Normalized
            | PackageStage::InfoWritten
            | PackageStage::EdgesWritten
            | PackageStage::Done => Self::Write,
        }
    }
}

#[derive(Debug)]
pub struct PackageFailure {
    pub package: String,
    pub stage: FailureStage,
    pub error: PkgraphError,
}

/// Outcome of one phase over one category.
#[derive(Debug)]
pub struct PhaseReport {
    pub phase: Phase,
    pub category: PackageType,
    pub total: u64,
    pub succeeded: u64,
    pub failures: Vec<PackageFailure>,
    pub edges: EdgeTally,
    pub duration: Duration,
}

impl PhaseReport {
    fn new(phase: Phase, category: PackageType, total: usize) -> Self {
        Self {
            phase,
            category,
            total: u64::try_from(total).unwrap_or(u64::MAX),
            succeeded: 0,
            failures: Vec::new(),
            edges: EdgeTally::default(),
            duration: Duration::ZERO,
        }
    }

    pub fn failed(&self) -> u64 {
        u64::try_from(self.failures.len()).unwrap_or(u64::MAX)
    }

    pub fn summary(&self) -> String {
        format!(
            "Processed {}/{} {} packages successfully ({} failed).",
            self.succeeded,
            self.total,
            self.category,
            self.failed()
        )
    }
}

/// All phase reports of one invocation.
#[derive(Debug, Default)]
pub struct RunReport {
    pub phases: Vec<PhaseReport>,
}

impl RunReport {
    /// Distinct packages covered: each category counts once, however many
    /// phases ran over it.
    pub fn packages(&self) -> u64 {
        let mut per_category: BTreeMap<&str, u64> = BTreeMap::new();
        for phase in &self.phases {
            let total = per_category.entry(phase.category.as_str()).or_default();
            *total = (*total).max(phase.total);
        }
        per_category.values().sum()
    }

    /// Distinct packages with at least one failure in any phase.
    pub fn failed_packages(&self) -> BTreeSet<&str> {
        self.failures().map(|f| f.package.as_str()).collect()
    }

    pub fn failed(&self) -> u64 {
        self.phases.iter().map(PhaseReport::failed).sum()
    }

    pub fn edges(&self) -> EdgeTally {
        let mut tally = EdgeTally::default();
        for phase in &self.phases {
            tally += phase.edges;
        }
        tally
    }

    pub fn failures(&self) -> impl Iterator<Item = &PackageFailure> {
        self.phases.iter().flat_map(|p| p.failures.iter())
    }

    pub fn has_failures(&self) -> bool {
        self.failed() > 0
    }

    fn extend(&mut self, other: RunReport) {
        self.phases.extend(other.phases);
    }
}

/// Phase 1 has no fetch: a rejected name fails before any write.
fn materialize_stage(error: &PkgraphError) -> FailureStage {
    match error {
        PkgraphError::Validation(_) => FailureStage::Normalize,
        _ => FailureStage::Write,
    }
}

/// Drives the builder over every package of the selected categories.
pub struct ImportPipeline<'a> {
    raw: &'a dyn RawStore,
    store: &'a dyn GraphStore,
    reporter: &'a dyn ProgressReporter,
}

impl std::fmt::Debug for ImportPipeline<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImportPipeline").finish_non_exhaustive()
    }
}

impl<'a> ImportPipeline<'a> {
    pub fn new(
        raw: &'a dyn RawStore,
        store: &'a dyn GraphStore,
        reporter: &'a dyn ProgressReporter,
    ) -> Self {
        Self {
            raw,
            store,
            reporter,
        }
    }

    /// Phase 1 over every category in `options`.
    ///
    /// Only an unreadable category list aborts the run; per-package
    /// failures are recorded.
    #[instrument(skip_all, name = "materialize_nodes")]
    pub async fn materialize_nodes(&self, options: &ImportOptions) -> crate::error::Result<RunReport> {
        let builder = GraphBuilder::new(self.store);
        let mut run = RunReport::default();

        for category in options.categories() {
            let names = self.raw.package_names(&category).await?;
            let started = Instant::now();
            let mut report = PhaseReport::new(Phase::Import, category.clone(), names.len());
            self.reporter
                .start(&Phase::Import.to_string(), &category, report.total);

            for name in &names {
                match builder.materialize_package(name, &category).await {
                    Ok(()) => {
                        trace!(package = %name, "Materialized");
                        report.succeeded += 1;
                        self.reporter.package_done(name, true);
                    }
                    Err(error) => {
                        warn!(package = %name, error = %error, "Failed to import package");
                        report.failures.push(PackageFailure {
                            package: name.clone(),
                            stage: materialize_stage(&error),
                            error,
                        });
                        self.reporter.package_done(name, false);
                    }
                }
            }

            report.duration = started.elapsed();
            self.finish_phase(&report);
            run.phases.push(report);
        }
        Ok(run)
    }

    /// Phases 2 and 3 over every category in `options`.
    #[instrument(skip_all, name = "enrich")]
    pub async fn enrich(&self, options: &ImportOptions) -> crate::error::Result<RunReport> {
        let builder = GraphBuilder::new(self.store);
        let mut run = RunReport::default();

        for category in options.categories() {
            let names = self.raw.package_names(&category).await?;
            let started = Instant::now();
            let mut report = PhaseReport::new(Phase::Map, category.clone(), names.len());
            self.reporter
                .start(&Phase::Map.to_string(), &category, report.total);

            for name in &names {
                let mut stage = PackageStage::Pending;
                match self
                    .map_package(&builder, name, options, &mut stage)
                    .await
                {
                    Ok(edges) => {
                        report.succeeded += 1;
                        report.edges += edges;
                        self.reporter.package_done(name, true);
                    }
                    Err(error) => {
                        warn!(
                            package = %name,
                            reached = ?stage,
                            error = %error,
                            "Failed to map package"
                        );
                        report.failures.push(PackageFailure {
                            package: name.clone(),
                            stage: stage.into(),
                            error,
                        });
                        self.reporter.package_done(name, false);
                    }
                }
            }

            report.duration = started.elapsed();
            self.finish_phase(&report);
            run.phases.push(report);
        }
        Ok(run)
    }

    /// Constraints, phase 1, then phases 2 and 3. The caller decides
    /// whether to reset first.
    #[instrument(skip_all, name = "run_full")]
    pub async fn run_full(&self, options: &ImportOptions) -> crate::error::Result<RunReport> {
        SchemaManager::new(self.store).setup_constraints().await?;
        let mut run = self.materialize_nodes(options).await?;
        run.extend(self.enrich(options).await?);
        Ok(run)
    }

    async fn map_package(
        &self,
        builder: &GraphBuilder<'_>,
        name: &str,
        options: &ImportOptions,
        stage: &mut PackageStage,
    ) -> crate::error::Result<EdgeTally> {
        let raw = self.raw.package_document(name).await?;
        *stage = PackageStage::Fetched;

        let package = decode_document(name, &raw)?;
        *stage = PackageStage::Normalized;

        if options.write_info {
            builder.write_info(name, &package).await?;
            *stage = PackageStage::InfoWritten;
        }

        let mut edges = EdgeTally::default();
        if options.write_dependencies {
            edges = builder.write_dependencies(name, &package).await?;
            *stage = PackageStage::EdgesWritten;
        }

        *stage = PackageStage::Done;
        debug!(package = %name, written = edges.written, skipped = edges.skipped, "Mapped");
        Ok(edges)
    }

    fn finish_phase(&self, report: &PhaseReport) {
        let summary = report.summary();
        info!(
            phase = %report.phase,
            category = %report.category,
            total = report.total,
            succeeded = report.succeeded,
            failed = report.failed(),
            edges_written = report.edges.written,
            edges_skipped = report.edges.skipped,
            elapsed_ms = u64::try_from(report.duration.as_millis()).unwrap_or(u64::MAX),
            "{summary}"
        );
        self.reporter.finish();
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use serde_json::json;

    use super::*;
    use crate::error::SourceError;
    use crate::normalize::split_full_name;
    use crate::progress::NoopReporter;
    use crate::store::sqlite::SqliteStore;
    use crate::types::{EdgeKind, NodeKey};

    /// In-memory raw store keyed by category and package name.
    #[derive(Default)]
    struct MemoryRaw {
        lists: HashMap<String, Vec<String>>,
        documents: HashMap<String, String>,
    }

    impl MemoryRaw {
        fn with_package(mut self, category: &str, name: &str, document: Option<String>) -> Self {
            self.lists
                .entry(category.to_string())
                .or_default()
                .push(name.to_string());
            if let Some(document) = document {
                self.documents.insert(name.to_string(), document);
            }
            self
        }
    }

    #[async_trait::async_trait]
    impl RawStore for MemoryRaw {
        async fn package_names(&self, category: &PackageType) -> crate::error::Result<Vec<String>> {
            Ok(self.lists.get(category.as_str()).cloned().unwrap_or_default())
        }

        async fn package_document(&self, full_name: &str) -> crate::error::Result<String> {
            split_full_name(full_name)?;
            self.documents
                .get(full_name)
                .cloned()
                .ok_or_else(|| SourceError::NotFound(full_name.to_string()).into())
        }
    }

    fn document(name: &str, require: serde_json::Value) -> String {
        json!({
            "package": {
                "name": name,
                "time": "2020-01-01T00:00:00+00:00",
                "maintainers": [],
                "downloads": {"total": 0, "monthly": 0, "daily": 0},
                "versions": {
                    "1.0.0": {
                        "version": "1.0.0",
                        "version_normalized": "1.0.0.0",
                        "license": ["MIT"],
                        "authors": [],
                        "time": "2021-01-01T00:00:00+00:00",
                        "require": require
                    }
                }
            }
        })
        .to_string()
    }

    fn all_phases() -> ImportOptions {
        ImportOptions {
            category: None,
            write_info: true,
            write_dependencies: true,
        }
    }

    #[test]
    fn summary_line_format() {
        let mut report = PhaseReport::new(Phase::Map, PackageType::Library, 3);
        report.succeeded = 2;
        report.failures.push(PackageFailure {
            package: "acme/broken".into(),
            stage: FailureStage::Fetch,
            error: SourceError::NotFound("acme/broken".into()).into(),
        });
        assert_eq!(
            report.summary(),
            "Processed 2/3 library packages successfully (1 failed)."
        );
    }

    #[test]
    fn no_filter_covers_every_known_category() {
        let options = ImportOptions::default();
        assert_eq!(options.categories().len(), 7);

        let filtered = ImportOptions {
            category: Some(PackageType::Project),
            ..ImportOptions::default()
        };
        assert_eq!(filtered.categories(), vec![PackageType::Project]);
    }

    #[tokio::test]
    async fn full_run_builds_graph() {
        let raw = MemoryRaw::default()
            .with_package(
                "library",
                "acme/widget",
                Some(document("acme/widget", json!({"acme/bolt": "^1.0", "php": ">=8.1"}))),
            )
            .with_package("library", "acme/bolt", Some(document("acme/bolt", json!([]))));
        let store = SqliteStore::in_memory().unwrap();
        let pipeline = ImportPipeline::new(&raw, &store, &NoopReporter);

        let report = pipeline.run_full(&all_phases()).await.unwrap();

        assert!(!report.has_failures());
        assert_eq!(report.edges(), EdgeTally { written: 1, skipped: 1 });

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.nodes(crate::types::NodeLabel::Vendor), 1);
        assert_eq!(stats.nodes(crate::types::NodeLabel::Package), 2);
        assert_eq!(stats.edges(EdgeKind::Owns), 2);
        assert_eq!(stats.edges(EdgeKind::Requires), 1);
    }

    #[tokio::test]
    async fn failures_are_isolated_and_classified() {
        let raw = MemoryRaw::default()
            .with_package("library", "acme/good", Some(document("acme/good", json!([]))))
            .with_package("library", "acme/missing", None)
            .with_package("library", "acme/broken", Some("{\"package\": 42}".to_string()));
        let store = SqliteStore::in_memory().unwrap();
        let pipeline = ImportPipeline::new(&raw, &store, &NoopReporter);

        let report = pipeline.run_full(&all_phases()).await.unwrap();

        let map = report
            .phases
            .iter()
            .find(|p| p.phase == Phase::Map && p.category == PackageType::Library)
            .unwrap();
        assert_eq!(map.total, 3);
        assert_eq!(map.succeeded, 1);

        let stages: HashMap<_, _> = map
            .failures
            .iter()
            .map(|f| (f.package.as_str(), f.stage))
            .collect();
        assert_eq!(stages["acme/missing"], FailureStage::Fetch);
        assert_eq!(stages["acme/broken"], FailureStage::Normalize);
        assert!(map.failures.iter().any(|f| matches!(
            f.error,
            PkgraphError::Source(SourceError::NotFound(_))
        )));

        let good = store
            .node_properties(&NodeKey::package("acme/good"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(good["licenses"], json!(["MIT"]));
    }

    #[tokio::test]
    async fn enrich_without_nodes_fails_on_write() {
        let raw = MemoryRaw::default().with_package(
            "project",
            "acme/site",
            Some(document("acme/site", json!([]))),
        );
        let store = SqliteStore::in_memory().unwrap();
        let pipeline = ImportPipeline::new(&raw, &store, &NoopReporter);

        let options = ImportOptions {
            category: Some(PackageType::Project),
            write_info: true,
            write_dependencies: false,
        };
        let report = pipeline.enrich(&options).await.unwrap();

        assert_eq!(report.failed(), 1);
        let failure = report.failures().next().unwrap();
        assert_eq!(failure.stage, FailureStage::Write);
        assert_eq!(store.stats().await.unwrap().total_nodes, 0);
    }

    #[tokio::test]
    async fn malformed_name_fails_only_itself_in_phase_one() {
        let raw = MemoryRaw::default()
            .with_package("library", "acme/widget", None)
            .with_package("library", "widget", None)
            .with_package("library", "acme/bolt", None);
        let store = SqliteStore::in_memory().unwrap();
        let pipeline = ImportPipeline::new(&raw, &store, &NoopReporter);

        let options = ImportOptions {
            category: Some(PackageType::Library),
            ..ImportOptions::default()
        };
        let report = pipeline.materialize_nodes(&options).await.unwrap();

        let import = &report.phases[0];
        assert_eq!(import.phase, Phase::Import);
        assert_eq!(import.total, 3);
        assert_eq!(import.succeeded, 2);
        assert_eq!(import.failures.len(), 1);
        assert_eq!(import.failures[0].package, "widget");
        assert_eq!(import.failures[0].stage, FailureStage::Normalize);
        assert!(matches!(import.failures[0].error, PkgraphError::Validation(_)));

        for name in ["acme/widget", "acme/bolt"] {
            assert!(store
                .node_properties(&NodeKey::package(name))
                .await
                .unwrap()
                .is_some());
        }
        let stats = store.stats().await.unwrap();
        assert_eq!(stats.nodes(crate::types::NodeLabel::Package), 2);
        assert_eq!(stats.edges(EdgeKind::Owns), 2);
    }

    #[tokio::test]
    async fn malformed_name_in_map_fails_at_fetch() {
        let raw = MemoryRaw::default().with_package("library", "widget", None);
        let store = SqliteStore::in_memory().unwrap();
        let pipeline = ImportPipeline::new(&raw, &store, &NoopReporter);

        let options = ImportOptions {
            category: Some(PackageType::Library),
            write_info: true,
            write_dependencies: true,
        };
        let report = pipeline.enrich(&options).await.unwrap();

        let failure = report.failures().next().unwrap();
        assert_eq!(failure.stage, FailureStage::Fetch);
        assert!(matches!(failure.error, PkgraphError::Validation(_)));
    }

    #[tokio::test]
    async fn document_name_casing_keeps_listed_key() {
        let raw = MemoryRaw::default()
            .with_package(
                "library",
                "Acme/Widget",
                Some(document("acme/widget", json!({"acme/bolt": "^1.0"}))),
            )
            .with_package("library", "acme/bolt", Some(document("acme/bolt", json!([]))));
        let store = SqliteStore::in_memory().unwrap();
        let pipeline = ImportPipeline::new(&raw, &store, &NoopReporter);

        let report = pipeline.run_full(&all_phases()).await.unwrap();

        assert!(!report.has_failures());
        let widget = store
            .node_properties(&NodeKey::package("Acme/Widget"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(widget["licenses"], json!(["MIT"]));
        assert_eq!(store.stats().await.unwrap().edges(EdgeKind::Requires), 1);
    }

    #[tokio::test]
    async fn run_report_counts_distinct_packages() {
        let raw = MemoryRaw::default()
            .with_package("library", "acme/good", Some(document("acme/good", json!([]))))
            .with_package("library", "acme/missing", None)
            .with_package("project", "acme/site", Some(document("acme/site", json!([]))));
        let store = SqliteStore::in_memory().unwrap();
        let pipeline = ImportPipeline::new(&raw, &store, &NoopReporter);

        let report = pipeline.run_full(&all_phases()).await.unwrap();

        assert_eq!(report.packages(), 3);
        let failed: Vec<_> = report.failed_packages().into_iter().collect();
        assert_eq!(failed, vec!["acme/missing"]);
    }
}
