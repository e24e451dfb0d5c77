use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Deserializer, Serialize};

// ── Registry model ─────────────────────────────────────────────────

/// Composer package type. Anything outside the seven known types is kept
/// verbatim as [`PackageType::Custom`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PackageType {
    Metapackage,
    ComposerPlugin,
    Plugin,
    PhpExt,
    PhpExtZend,
    Project,
    Library,
    /// A type string the registry accepted but Composer does not define.
    Custom(String),
}

impl PackageType {
    /// The known categories, in the order the registry publishes their lists.
    pub const KNOWN: [PackageType; 7] = [
        Self::Metapackage,
        Self::ComposerPlugin,
        Self::Plugin,
        Self::PhpExt,
        Self::PhpExtZend,
        Self::Project,
        Self::Library,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            Self::Metapackage => "metapackage",
            Self::ComposerPlugin => "composer-plugin",
            Self::Plugin => "plugin",
            Self::PhpExt => "php-ext",
            Self::PhpExtZend => "php-ext-zend",
            Self::Project => "project",
            Self::Library => "library",
            Self::Custom(other) => other,
        }
    }

    /// Parse a known category name. Custom types are not categories.
    pub fn from_category(name: &str) -> Option<Self> {
        Self::KNOWN.into_iter().find(|t| t.as_str() == name)
    }

    pub fn is_custom(&self) -> bool {
        matches!(self, Self::Custom(_))
    }
}

impl From<String> for PackageType {
    fn from(value: String) -> Self {
        Self::from_category(&value).unwrap_or(Self::Custom(value))
    }
}

impl From<PackageType> for String {
    fn from(value: PackageType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for PackageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `abandoned` is either a flag or the name of the suggested replacement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Abandoned {
    Flag(bool),
    Replacement(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Maintainer {
    pub name: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Downloads {
    pub total: i64,
    pub monthly: i64,
    pub daily: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub homepage: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

/// Package name → version constraint.
pub type LinkMap = BTreeMap<String, String>;

/// One published release of a package.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Version {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub version: String,
    pub version_normalized: String,
    pub license: Vec<String>,
    pub authors: Vec<Author>,
    #[serde(default, rename = "type")]
    pub package_type: Option<PackageType>,
    #[serde(default)]
    pub time: Option<DateTime<FixedOffset>>,
    #[serde(default)]
    pub default_branch: Option<bool>,
    #[serde(default, deserialize_with = "optional_php_map")]
    pub require: Option<LinkMap>,
    #[serde(
        default,
        rename = "require-dev",
        alias = "require_dev",
        deserialize_with = "optional_php_map"
    )]
    pub require_dev: Option<LinkMap>,
    #[serde(default, deserialize_with = "optional_php_map")]
    pub suggest: Option<LinkMap>,
    #[serde(default, deserialize_with = "optional_php_map")]
    pub conflict: Option<LinkMap>,
    #[serde(default, deserialize_with = "optional_php_map")]
    pub provide: Option<LinkMap>,
    #[serde(default, deserialize_with = "optional_php_map")]
    pub replace: Option<LinkMap>,
    #[serde(default)]
    pub abandoned: Option<Abandoned>,
}

/// A package as published by the registry, with every version it carries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Package {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub time: DateTime<FixedOffset>,
    pub maintainers: Vec<Maintainer>,
    #[serde(default, rename = "type")]
    pub package_type: Option<PackageType>,
    #[serde(default)]
    pub repository: Option<String>,
    #[serde(default)]
    pub github_stars: Option<i64>,
    #[serde(default)]
    pub github_watchers: Option<i64>,
    #[serde(default)]
    pub github_forks: Option<i64>,
    #[serde(default)]
    pub github_open_issues: Option<i64>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub abandoned: Option<Abandoned>,
    #[serde(default)]
    pub dependents: Option<i64>,
    #[serde(default)]
    pub suggesters: Option<i64>,
    pub downloads: Downloads,
    #[serde(deserialize_with = "php_map")]
    pub versions: BTreeMap<String, Version>,
}

/// PHP encodes an empty associative array as `[]`, so a map field may arrive
/// as an empty JSON list.
#[derive(Deserialize)]
#[serde(untagged)]
enum PhpMap<V> {
    Map(BTreeMap<String, V>),
    List(Vec<serde_json::Value>),
}

fn php_map<'de, D, V>(deserializer: D) -> Result<BTreeMap<String, V>, D::Error>
where
    D: Deserializer<'de>,
    V: Deserialize<'de>,
{
    match PhpMap::deserialize(deserializer)? {
        PhpMap::Map(map) => Ok(map),
        PhpMap::List(list) if list.is_empty() => Ok(BTreeMap::new()),
        PhpMap::List(_) => Err(serde::de::Error::custom(
            "expected an object or an empty array",
        )),
    }
}

fn optional_php_map<'de, D, V>(deserializer: D) -> Result<Option<BTreeMap<String, V>>, D::Error>
where
    D: Deserializer<'de>,
    V: Deserialize<'de>,
{
    match Option::<PhpMap<V>>::deserialize(deserializer)? {
        None => Ok(None),
        Some(PhpMap::Map(map)) => Ok(Some(map)),
        Some(PhpMap::List(list)) if list.is_empty() => Ok(Some(BTreeMap::new())),
        Some(PhpMap::List(_)) => Err(serde::de::Error::custom(
            "expected an object or an empty array",
        )),
    }
}

// ── Graph vocabulary ───────────────────────────────────────────────

/// Node labels in the package graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeLabel {
    Vendor,
    Package,
}

impl NodeLabel {
    pub const ALL: [NodeLabel; 2] = [Self::Vendor, Self::Package];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Vendor => "Vendor",
            Self::Package => "Package",
        }
    }

    /// The property that uniquely identifies a node of this label.
    pub fn key_property(self) -> &'static str {
        match self {
            Self::Vendor => "name",
            Self::Package => "full_name",
        }
    }
}

impl fmt::Display for NodeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Directed relationship types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EdgeKind {
    /// Vendor → Package.
    Owns,
    /// Package → Package: runtime requirement.
    Requires,
    /// Package → Package: development requirement.
    DevRequires,
    Suggests,
    Conflicts,
    Provides,
    Replaces,
}

impl EdgeKind {
    /// The six kinds derived from version link maps.
    pub const DEPENDENCIES: [EdgeKind; 6] = [
        Self::Requires,
        Self::DevRequires,
        Self::Conflicts,
        Self::Provides,
        Self::Replaces,
        Self::Suggests,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Owns => "OWNS",
            Self::Requires => "REQUIRES",
            Self::DevRequires => "DEV_REQUIRES",
            Self::Suggests => "SUGGESTS",
            Self::Conflicts => "CONFLICTS",
            Self::Provides => "PROVIDES",
            Self::Replaces => "REPLACES",
        }
    }
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a node: its label plus the value of the label's key property.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeKey {
    pub label: NodeLabel,
    pub key: String,
}

impl NodeKey {
    pub fn vendor(name: impl Into<String>) -> Self {
        Self {
            label: NodeLabel::Vendor,
            key: name.into(),
        }
    }

    pub fn package(full_name: impl Into<String>) -> Self {
        Self {
            label: NodeLabel::Package,
            key: full_name.into(),
        }
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.label, self.key)
    }
}

/// A property value as stored on a node.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    /// Clears the property on merge.
    Null,
    Bool(bool),
    Integer(i64),
    Text(String),
    List(Vec<String>),
    Timestamp(DateTime<Utc>),
}

impl PropertyValue {
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Bool(b) => serde_json::json!(b),
            Self::Integer(i) => serde_json::json!(i),
            Self::Text(s) => serde_json::json!(s),
            Self::List(items) => serde_json::json!(items),
            Self::Timestamp(ts) => serde_json::json!(ts.to_rfc3339()),
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<BTreeSet<String>> for PropertyValue {
    fn from(value: BTreeSet<String>) -> Self {
        Self::List(value.into_iter().collect())
    }
}

impl From<DateTime<Utc>> for PropertyValue {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Timestamp(value)
    }
}

impl From<&Abandoned> for PropertyValue {
    fn from(value: &Abandoned) -> Self {
        match value {
            Abandoned::Flag(flag) => Self::Bool(*flag),
            Abandoned::Replacement(name) => Self::Text(name.clone()),
        }
    }
}

impl<T: Into<PropertyValue>> From<Option<T>> for PropertyValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// Property map written to a node. Ordered so generated statements are stable.
pub type Properties = BTreeMap<String, PropertyValue>;

/// Result of a batch of edge merges.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EdgeTally {
    /// Edges merged (created or already present).
    pub written: u64,
    /// Edges omitted because an endpoint was not in the graph.
    pub skipped: u64,
}

impl std::ops::AddAssign for EdgeTally {
    fn add_assign(&mut self, rhs: Self) {
        self.written += rhs.written;
        self.skipped += rhs.skipped;
    }
}

/// A uniqueness constraint on a label's key property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UniqueConstraint {
    pub label: NodeLabel,
}

impl UniqueConstraint {
    pub fn name(self) -> &'static str {
        match self.label {
            NodeLabel::Vendor => "vendor_name",
            NodeLabel::Package => "package_full_name",
        }
    }

    pub fn property(self) -> &'static str {
        self.label.key_property()
    }
}

/// Schema statements the store must be able to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaStatement {
    CreateUniqueConstraint(UniqueConstraint),
    DropUniqueConstraint(UniqueConstraint),
}

/// Summary statistics about the graph store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphStats {
    pub total_nodes: u64,
    pub total_edges: u64,
    pub nodes_by_label: BTreeMap<String, u64>,
    pub edges_by_kind: BTreeMap<String, u64>,
}

impl GraphStats {
    pub fn nodes(&self, label: NodeLabel) -> u64 {
        self.nodes_by_label
            .get(label.as_str())
            .copied()
            .unwrap_or(0)
    }

    pub fn edges(&self, kind: EdgeKind) -> u64 {
        self.edges_by_kind.get(kind.as_str()).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn package_type_roundtrips_known_and_custom() {
        for known in PackageType::KNOWN {
            assert_eq!(PackageType::from(known.as_str().to_string()), known);
            assert!(!known.is_custom());
        }
        let custom = PackageType::from("wordpress-plugin".to_string());
        assert_eq!(custom, PackageType::Custom("wordpress-plugin".into()));
        assert!(custom.is_custom());
        assert_eq!(custom.to_string(), "wordpress-plugin");
    }

    #[test]
    fn categories_exclude_custom_types() {
        assert_eq!(
            PackageType::from_category("php-ext-zend"),
            Some(PackageType::PhpExtZend)
        );
        assert_eq!(PackageType::from_category("drupal-module"), None);
    }

    #[test]
    fn abandoned_decodes_flag_or_replacement() {
        let flag: Abandoned = serde_json::from_str("true").unwrap();
        assert_eq!(flag, Abandoned::Flag(true));
        let replacement: Abandoned = serde_json::from_str("\"acme/new\"").unwrap();
        assert_eq!(replacement, Abandoned::Replacement("acme/new".into()));
        assert_eq!(
            PropertyValue::from(&replacement),
            PropertyValue::Text("acme/new".into())
        );
    }

    #[test]
    fn option_property_maps_none_to_null() {
        assert_eq!(PropertyValue::from(None::<i64>), PropertyValue::Null);
        assert_eq!(PropertyValue::from(Some(3_i64)), PropertyValue::Integer(3));
    }

    #[test]
    fn constraint_names_follow_labels() {
        let vendor = UniqueConstraint {
            label: NodeLabel::Vendor,
        };
        assert_eq!(vendor.name(), "vendor_name");
        assert_eq!(vendor.property(), "name");
        let package = UniqueConstraint {
            label: NodeLabel::Package,
        };
        assert_eq!(package.name(), "package_full_name");
        assert_eq!(package.property(), "full_name");
    }

    #[test]
    fn edge_tally_accumulates() {
        let mut total = EdgeTally::default();
        total += EdgeTally {
            written: 2,
            skipped: 1,
        };
        total += EdgeTally {
            written: 3,
            skipped: 0,
        };
        assert_eq!(
            total,
            EdgeTally {
                written: 5,
                skipped: 1
            }
        );
    }
}
