//! Normalizer: decodes raw registry documents into [`Package`] values and
//! computes the cross-version aggregates persisted on Package nodes.
//!
//! Everything here is pure: no I/O, no store access. Aggregates are sets, so
//! every `aggregate_*` method returns a [`BTreeSet`] unioned over all versions.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::ValidationError;
use crate::types::{EdgeKind, LinkMap, Package, PackageType, Version};

/// Top-level shape of a per-package registry document.
#[derive(Deserialize)]
struct RawDocument {
    package: Package,
}

/// Decode the raw document stored for `requested` into a validated [`Package`].
pub fn decode_document(requested: &str, raw: &str) -> Result<Package, ValidationError> {
    let document: RawDocument =
        serde_json::from_str(raw).map_err(|source| ValidationError::Decode {
            package: requested.to_string(),
            source,
        })?;
    let package = document.package;

    split_full_name(&package.name)?;
    if !package.name.eq_ignore_ascii_case(requested) {
        return Err(ValidationError::NameMismatch {
            requested: requested.to_string(),
            found: package.name,
        });
    }

    for (key, version) in &package.versions {
        if version.version.is_empty() {
            return Err(empty_field(&package.name, key, "version"));
        }
        if version.version_normalized.is_empty() {
            return Err(empty_field(&package.name, key, "version_normalized"));
        }
    }

    Ok(package)
}

fn empty_field(package: &str, version: &str, field: &'static str) -> ValidationError {
    ValidationError::EmptyField {
        package: package.to_string(),
        version: version.to_string(),
        field,
    }
}

/// Split `vendor/package` into its two segments.
///
/// Each segment must be non-blank, must not be `.` or `..`, and must not
/// contain a path separator, since the pair also addresses a file on disk.
pub fn split_full_name(full_name: &str) -> Result<(&str, &str), ValidationError> {
    match full_name.split_once('/') {
        Some((vendor, name)) if valid_segment(vendor) && valid_segment(name) => Ok((vendor, name)),
        _ => Err(ValidationError::PackageName(full_name.to_string())),
    }
}

fn valid_segment(segment: &str) -> bool {
    !segment.trim().is_empty()
        && segment != "."
        && segment != ".."
        && !segment.contains(['/', '\\', '\0'])
}

impl Version {
    /// The link map backing a dependency edge kind. `OWNS` has none.
    pub fn links(&self, kind: EdgeKind) -> Option<&LinkMap> {
        match kind {
            EdgeKind::Owns => None,
            EdgeKind::Requires => self.require.as_ref(),
            EdgeKind::DevRequires => self.require_dev.as_ref(),
            EdgeKind::Suggests => self.suggest.as_ref(),
            EdgeKind::Conflicts => self.conflict.as_ref(),
            EdgeKind::Provides => self.provide.as_ref(),
            EdgeKind::Replaces => self.replace.as_ref(),
        }
    }
}

impl Package {
    /// Names referenced by `kind` in any version.
    pub fn dependencies(&self, kind: EdgeKind) -> BTreeSet<String> {
        self.versions
            .values()
            .filter_map(|v| v.links(kind))
            .flat_map(|links| links.keys().cloned())
            .collect()
    }

    pub fn aggregate_require(&self) -> BTreeSet<String> {
        self.dependencies(EdgeKind::Requires)
    }

    pub fn aggregate_require_dev(&self) -> BTreeSet<String> {
        self.dependencies(EdgeKind::DevRequires)
    }

    pub fn aggregate_suggest(&self) -> BTreeSet<String> {
        self.dependencies(EdgeKind::Suggests)
    }

    pub fn aggregate_conflict(&self) -> BTreeSet<String> {
        self.dependencies(EdgeKind::Conflicts)
    }

    pub fn aggregate_provide(&self) -> BTreeSet<String> {
        self.dependencies(EdgeKind::Provides)
    }

    pub fn aggregate_replace(&self) -> BTreeSet<String> {
        self.dependencies(EdgeKind::Replaces)
    }

    pub fn aggregate_licenses(&self) -> BTreeSet<String> {
        self.versions
            .values()
            .flat_map(|v| v.license.iter().cloned())
            .collect()
    }

    /// Author names across all versions. Authors without a name are dropped.
    pub fn aggregate_authors(&self) -> BTreeSet<String> {
        self.versions
            .values()
            .flat_map(|v| v.authors.iter())
            .filter_map(|a| a.name.as_deref())
            .filter(|name| !name.trim().is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn aggregate_versions(&self) -> BTreeSet<String> {
        self.versions
            .values()
            .map(|v| v.version_normalized.clone())
            .collect()
    }

    pub fn aggregate_maintainers(&self) -> BTreeSet<String> {
        self.maintainers.iter().map(|m| m.name.clone()).collect()
    }

    /// Latest release time across versions.
    ///
    /// Every version must carry a time; one missing timestamp (or no versions
    /// at all) fails the whole package.
    pub fn last_updated_time(&self) -> Result<DateTime<Utc>, ValidationError> {
        let mut latest: Option<DateTime<Utc>> = None;
        for (key, version) in &self.versions {
            let time = version.time.ok_or_else(|| ValidationError::MissingTime {
                package: self.name.clone(),
                version: key.clone(),
            })?;
            let time = time.with_timezone(&Utc);
            latest = Some(latest.map_or(time, |l| l.max(time)));
        }
        latest.ok_or_else(|| ValidationError::NoVersions(self.name.clone()))
    }

    /// Declared type, falling back to Composer's default of `library`.
    pub fn declared_type(&self) -> PackageType {
        self.package_type.clone().unwrap_or(PackageType::Library)
    }

    pub fn is_custom_type(&self) -> bool {
        self.declared_type().is_custom()
    }

    /// Whether any version resolves to Composer stability `stable`.
    pub fn has_stable_release(&self) -> bool {
        self.versions
            .values()
            .any(|v| stability(&v.version_normalized) == Stability::Stable)
    }
}

/// Composer stability flags, least to most stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stability {
    Dev,
    Alpha,
    Beta,
    Rc,
    Stable,
}

/// Classify a normalized version string the way Composer's version parser does.
pub fn stability(version_normalized: &str) -> Stability {
    let version = version_normalized
        .split('#')
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();

    if version.starts_with("dev-") || version.ends_with("-dev") {
        return Stability::Dev;
    }

    let version = version.split('+').next().unwrap_or_default();
    let Some((_, modifier)) = version.split_once('-') else {
        return Stability::Stable;
    };
    let modifier = modifier.trim_start_matches(['.', '_', '-']);
    if modifier.ends_with("dev") {
        return Stability::Dev;
    }

    let word: String = modifier
        .chars()
        .take_while(char::is_ascii_alphabetic)
        .collect();
    match word.as_str() {
        "alpha" | "a" => Stability::Alpha,
        "beta" | "b" => Stability::Beta,
        "rc" => Stability::Rc,
        _ => Stability::Stable,
    }
}


#[cfg(test)]
mod prop_tests {
    use std::collections::BTreeMap;

    use proptest::prelude::*;

    use super::*;
    use crate::types::Downloads;

    fn arb_links() -> impl Strategy<Value = BTreeMap<String, String>> {
        prop::collection::btree_map("[a-z]{1,4}/[a-z]{1,4}", "[0-9]\\.[0-9]", 0..5)
    }

    fn package_with(links: Vec<BTreeMap<String, String>>) -> Package {
        let versions = links
            .into_iter()
            .enumerate()
            .map(|(i, require)| {
                let version = Version {
                    name: None,
                    description: None,
                    version: format!("{i}.0.0"),
                    version_normalized: format!("{i}.0.0.0"),
                    license: vec!["MIT".into()],
                    authors: Vec::new(),
                    package_type: None,
                    time: None,
                    default_branch: None,
                    require: Some(require),
                    require_dev: None,
                    suggest: None,
                    conflict: None,
                    provide: None,
                    replace: None,
                    abandoned: None,
                };
                (format!("{i}.0.0"), version)
            })
            .collect();
        Package {
            name: "acme/widget".into(),
            description: None,
            time: "2020-01-01T00:00:00+00:00".parse().unwrap(),
            maintainers: Vec::new(),
            package_type: None,
            repository: None,
            github_stars: None,
            github_watchers: None,
            github_forks: None,
            github_open_issues: None,
            language: None,
            abandoned: None,
            dependents: None,
            suggesters: None,
            downloads: Downloads {
                total: 0,
                monthly: 0,
                daily: 0,
            },
            versions,
        }
    }

    proptest! {
        #[test]
        fn require_aggregate_is_union_of_version_keys(links in prop::collection::vec(arb_links(), 0..6)) {
            let expected: BTreeSet<String> = links
                .iter()
                .flat_map(|l| l.keys().cloned())
                .collect();
            let package = package_with(links);
            prop_assert_eq!(package.aggregate_require(), expected);
        }

        #[test]
        fn version_aggregate_has_one_entry_per_version(count in 0usize..8) {
            let package = package_with(vec![BTreeMap::new(); count]);
            prop_assert_eq!(package.aggregate_versions().len(), count);
        }
    }
}
