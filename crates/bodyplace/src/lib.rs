#![warn(missing_docs)]

//! bodyplace: body placement normalization for feature trees.
//!
//! Older documents let a body carry its own placement on top of its
//! feature chain. Current documents keep bodies at the identity and place
//! geometry through the features themselves. This crate migrates the former
//! to the latter without moving anything in world space: the body placement
//! is baked into the features placed in the body frame, and the relative
//! binders the body owns are rebased onto its new frame.
//!
//! # Example
//!
//! ```rust,no_run
//! use bodyplace::{normalize_body_placements, MigrationConfig};
//! use bodyplace_ir::Document;
//! use bodyplace_kernel::SampledKernel;
//!
//! let json = std::fs::read_to_string("legacy.json").unwrap();
//! let mut doc = Document::from_json(&json).unwrap();
//! let report =
//!     normalize_body_placements(&mut doc, &SampledKernel::default(), &MigrationConfig::default())
//!         .unwrap();
//! print!("{report}");
//! ```

pub mod config;
pub mod convert;
pub mod error;
pub mod graph;
pub mod normalize;
pub mod recompute;
pub mod report;
pub mod resolver;
pub mod session;
pub mod transaction;
mod topo;

pub use config::MigrationConfig;
pub use error::{
    ConfigError, GraphError, MigrationError, ReferenceRole, ResolveError, Result, StructuralError,
};
pub use graph::{
    Attachment, Binder, BinderId, BinderOffset, Body, BodyId, Feature, FeatureGraph, FeatureId,
    Part, PartId, PlacementKey, Reference,
};
pub use normalize::{BodyTransition, NormalizationEngine};
pub use recompute::{recompute, BoundsSnapshot, RecomputeTrigger, Recomputed};
pub use report::{BodyReport, BodyStatus, MigrationReport};
pub use resolver::ReferenceResolver;
pub use session::SessionMigrator;
pub use transaction::{BodyTransaction, PlacementState};

use bodyplace_ir::Document;
use bodyplace_kernel::GeometryKernel;

/// Migrate every legacy body of a document.
///
/// The document is rewritten only when at least one body was normalized;
/// on error it is left exactly as it was. Running it again on the result
/// returns an empty report.
pub fn normalize_body_placements<K: GeometryKernel>(
    doc: &mut Document,
    kernel: &K,
    config: &MigrationConfig,
) -> Result<MigrationReport> {
    let mut graph = FeatureGraph::from_document(doc)?;
    let report = NormalizationEngine::new(kernel, *config).run(&mut graph)?;
    if report.changed().next().is_some() {
        *doc = graph.to_document();
    }
    Ok(report)
}

/// Whether a document still has bodies with a placement.
pub fn needs_migration(doc: &Document, config: &MigrationConfig) -> Result<bool> {
    let graph = FeatureGraph::from_document(doc)?;
    Ok(graph.needs_migration(&config.tolerance()))
}
