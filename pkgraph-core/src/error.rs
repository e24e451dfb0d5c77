/// Top-level pkgraph error type.
///
/// All fallible operations in `pkgraph-core` return [`Result<T, PkgraphError>`](Result).
/// Each variant wraps a domain-specific error enum so the batch orchestrator can
/// tell a bad document apart from a failed store round trip.
#[derive(thiserror::Error, Debug)]
pub enum PkgraphError {
    /// Reading from the raw metadata store failed.
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// A raw document could not be decoded into the canonical model.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// A graph store round trip failed.
    #[error("Write error: {0}")]
    Write(#[from] WriteError),

    /// Error in configuration parsing or validation.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Errors reading the raw metadata dataset.
#[derive(thiserror::Error, Debug)]
pub enum SourceError {
    /// No document exists for the requested package.
    #[error("No metadata document for {0}")]
    NotFound(String),

    /// A category list exists but is not a `packageNames` document.
    #[error("Malformed package list {path}: {message}")]
    MalformedList {
        /// Path of the list document.
        path: String,
        /// Description of the decode failure.
        message: String,
    },

    /// Filesystem I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A raw package document failed to decode into a [`Package`](crate::types::Package).
#[derive(thiserror::Error, Debug)]
pub enum ValidationError {
    /// The document is not valid JSON or is missing a required field.
    #[error("Cannot decode {package}: {source}")]
    Decode {
        package: String,
        #[source]
        source: serde_json::Error,
    },

    /// A package name that is not of the form `vendor/package`.
    #[error("Invalid package name `{0}` (expected vendor/package)")]
    PackageName(String),

    /// The document describes a different package than the one requested.
    #[error("Document for {requested} describes {found}")]
    NameMismatch { requested: String, found: String },

    /// A required string field is present but empty.
    #[error("{package}: version {version} has an empty `{field}`")]
    EmptyField {
        package: String,
        version: String,
        field: &'static str,
    },

    /// A version carries no release time, so `updated_at` cannot be derived.
    #[error("{package}: version {version} has no release time")]
    MissingTime { package: String, version: String },

    /// The package has no versions at all.
    #[error("{0} has no versions")]
    NoVersions(String),
}

/// Errors from the graph store backends.
#[derive(thiserror::Error, Debug)]
pub enum WriteError {
    /// Underlying `SQLite` operation failed.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Underlying Neo4j (Bolt) operation failed.
    #[error("Neo4j error: {0}")]
    Neo4j(#[from] neo4rs::Error),

    /// A row returned by the store did not have the expected shape.
    #[error("Unexpected store response: {0}")]
    Decode(String),

    /// JSON serialization/deserialization of node properties failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A merge-update targeted a node that does not exist.
    #[error("{label} node not found: {key}")]
    NodeMissing { label: String, key: String },
}

/// Errors in pkgraph configuration parsing and validation.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// The configuration file exists but could not be read.
    #[error("Cannot read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Configuration values are present but semantically invalid.
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// Configuration file syntax could not be parsed (TOML error).
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Convenience alias for `Result<T, PkgraphError>`.
pub type Result<T> = std::result::Result<T, PkgraphError>;
