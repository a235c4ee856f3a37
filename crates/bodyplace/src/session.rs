//! Migration on document open.
//!
//! A session migrates each document at most once, and only when it still
//! has legacy bodies. A document that failed to migrate is not retried
//! within the same session.

use crate::config::MigrationConfig;
use crate::error::Result;
use crate::graph::FeatureGraph;
use crate::normalize_body_placements;
use crate::report::MigrationReport;
use bodyplace_ir::Document;
use bodyplace_kernel::GeometryKernel;
use log::{debug, info};
use std::collections::{BTreeMap, HashSet};

/// Runs the migration once per document name.
#[derive(Debug)]
pub struct SessionMigrator<K> {
    kernel: K,
    config: MigrationConfig,
    seen: HashSet<String>,
    reports: BTreeMap<String, MigrationReport>,
}

impl<K: GeometryKernel> SessionMigrator<K> {
    /// New session with nothing migrated yet.
    pub fn new(kernel: K, config: MigrationConfig) -> Self {
        Self {
            kernel,
            config,
            seen: HashSet::new(),
            reports: BTreeMap::new(),
        }
    }

    /// Hook for a freshly opened document.
    ///
    /// Returns the report when a pass ran, `Ok(None)` when the document was
    /// already handled in this session or has nothing to migrate.
    pub fn on_document_opened(
        &mut self,
        name: &str,
        doc: &mut Document,
    ) -> Result<Option<MigrationReport>> {
        if !self.seen.insert(name.to_string()) {
            debug!("document {name} already handled this session");
            return Ok(None);
        }
        let graph = FeatureGraph::from_document(doc)?;
        if !graph.needs_migration(&self.config.tolerance()) {
            debug!("document {name} has no legacy bodies");
            return Ok(None);
        }

        info!("migrating legacy body placements in {name}");
        let report = normalize_body_placements(doc, &self.kernel, &self.config)?;
        self.reports.insert(name.to_string(), report.clone());
        Ok(Some(report))
    }

    /// Whether a document was already seen.
    pub fn is_handled(&self, name: &str) -> bool {
        self.seen.contains(name)
    }

    /// Report of a migrated document.
    pub fn report(&self, name: &str) -> Option<&MigrationReport> {
        self.reports.get(name)
    }

    /// All reports, by document name.
    pub fn reports(&self) -> impl Iterator<Item = (&str, &MigrationReport)> {
        self.reports.iter().map(|(k, v)| (k.as_str(), v))
    }
}
