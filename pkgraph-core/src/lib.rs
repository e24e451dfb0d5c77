//! pkgraph core library: registry metadata normalization and dependency
//! graph import.
//!
//! The main entry point is [`pipeline::ImportPipeline`], which reads raw
//! documents from a [`source::RawStore`], normalizes them and writes Vendor
//! and Package nodes plus typed edges into a [`store::GraphStore`].

pub mod builder;
pub mod config;
pub mod error;
pub mod normalize;
pub mod pipeline;
pub mod progress;
pub mod source;
pub mod store;
pub mod types;
