//! Body placement normalization.
//!
//! A legacy body carries a non-identity placement on top of its contents.
//! Normalizing it moves that placement into the contents and resets the body
//! to the identity, so that every feature and every bound shape stays where
//! it was in world space:
//!
//! 1. every feature placed directly in the body frame (the chain root and any
//!    other `Free` feature) and the body origin are pre-multiplied by the
//!    removed placement; attached features follow their supports;
//! 2. the body placement is set to the identity;
//! 3. relative binders owned by the body are rebased onto the new owner frame,
//!    so `OwnerFrame ∘ S` does not change;
//! 4. relative binders targeting the body keep their offset, since the
//!    target's world placement did not move; their owners must still resolve.
//!
//! Each body transition is atomic. The whole pass is atomic with respect to
//! recompute: a kernel failure or a bound that moved restores every slot.

use crate::config::MigrationConfig;
use crate::convert::placement_to_ir;
use crate::error::{MigrationError, Result};
use crate::graph::{Attachment, BodyId, FeatureGraph, PlacementKey};
use crate::recompute::RecomputeTrigger;
use crate::report::{BodyReport, BodyStatus, MigrationReport};
use crate::resolver::{rebase_for_body_placement_change, rebased_for_owner_change};
use crate::transaction::{BodyTransaction, PlacementState};
use bodyplace_kernel::GeometryKernel;
use bodyplace_math::{compose, Placement};
use log::{debug, info, warn};
use std::collections::BTreeMap;

/// Slot counts of one body transition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BodyTransition {
    /// Feature placements rewritten.
    pub baked_features: usize,
    /// Owned relative binder offsets rebased.
    pub rebased_binders: usize,
}

/// Runs migration passes over a feature graph.
#[derive(Debug, Clone, Copy)]
pub struct NormalizationEngine<'k, K> {
    kernel: &'k K,
    config: MigrationConfig,
}

impl<'k, K: GeometryKernel> NormalizationEngine<'k, K> {
    /// Engine validating through `kernel`.
    pub fn new(kernel: &'k K, config: MigrationConfig) -> Self {
        Self { kernel, config }
    }

    /// Settings in use.
    pub fn config(&self) -> &MigrationConfig {
        &self.config
    }

    /// Normalize every legacy body of the graph.
    ///
    /// Structural cycles abort before anything is written. A body whose
    /// binders cannot be resolved is rolled back and reported, and legacy
    /// bodies depending on it are skipped. The graph is recomputed before and
    /// after the transitions; a feature that newly fails, or with
    /// `validate` set a bound that moved, restores the whole graph and is
    /// returned as an error.
    pub fn run(&self, graph: &mut FeatureGraph) -> Result<MigrationReport> {
        let tol = self.config.tolerance();
        let legacy = graph.legacy_bodies(&tol);
        if legacy.is_empty() {
            debug!("no legacy bodies, nothing to migrate");
            return Ok(MigrationReport::default());
        }

        graph.validate_structure()?;
        let order = graph.binder_dependency_order()?;
        let dependencies = graph.body_dependencies();

        let trigger = RecomputeTrigger::new(
            self.kernel,
            self.config.bbox_tolerance,
            self.config.validate_binders,
        );
        let before = trigger.snapshot(graph)?;
        let saved = PlacementState::capture_all(graph);

        let mut report = MigrationReport::default();
        // failed body each body is blocked by
        let mut blocked_by: BTreeMap<BodyId, String> = BTreeMap::new();

        for body in order {
            let is_legacy = legacy.contains(&body);
            let blocker = dependencies
                .get(&body)
                .into_iter()
                .flatten()
                .find_map(|dep| blocked_by.get(dep).cloned());

            if let Some(by) = blocker {
                if is_legacy {
                    warn!(
                        "skipping body {}: depends on failed body {by}",
                        graph.body(body).name
                    );
                    let placement = placement_to_ir(&graph.body(body).placement);
                    report.bodies.push(BodyReport {
                        body: graph.body(body).name.clone(),
                        previous: placement,
                        new: placement,
                        baked_features: 0,
                        rebased_binders: 0,
                        status: BodyStatus::Blocked { by: by.clone() },
                    });
                }
                blocked_by.insert(body, by);
                continue;
            }
            if !is_legacy {
                continue;
            }

            let name = graph.body(body).name.clone();
            let previous = graph.body(body).placement;
            match self.transition_body(graph, body) {
                Ok(t) => report.bodies.push(BodyReport {
                    body: name,
                    previous: placement_to_ir(&previous),
                    new: placement_to_ir(&graph.body(body).placement),
                    baked_features: t.baked_features,
                    rebased_binders: t.rebased_binders,
                    status: BodyStatus::Normalized,
                }),
                Err(e) => {
                    warn!("body {name} rolled back: {e}");
                    report.bodies.push(BodyReport {
                        body: name.clone(),
                        previous: placement_to_ir(&previous),
                        new: placement_to_ir(&previous),
                        baked_features: 0,
                        rebased_binders: 0,
                        status: BodyStatus::Failed {
                            error: e.to_string(),
                            binder: e.binder().map(str::to_string),
                        },
                    });
                    blocked_by.insert(body, name);
                }
            }
        }

        let checked = if self.config.validate {
            trigger.validate(graph, &before).map(Some)
        } else {
            trigger.recompute_checked(graph, &before).map(|_| None)
        };
        match checked {
            Ok(Some(deviation)) => {
                report.validated = true;
                report.max_deviation = deviation;
            }
            Ok(None) => debug!("bounds comparison disabled"),
            Err(e) => {
                warn!("migration rolled back: {e}");
                saved.restore(graph);
                return Err(e);
            }
        }

        info!(
            "migrated {} of {} legacy bodies, {} binder offsets rewritten",
            report.changed().count(),
            report.bodies.len(),
            report.binder_edits()
        );
        Ok(report)
    }

    /// Normalize one body, rolling it back on failure.
    ///
    /// A body already at the identity is left alone.
    pub fn transition_body(&self, graph: &mut FeatureGraph, body: BodyId) -> Result<BodyTransition> {
        let old = graph.body(body).placement;
        if old.is_identity(&self.config.tolerance()) {
            return Ok(BodyTransition::default());
        }
        let new = Placement::identity();

        let mut tx = BodyTransaction::new();
        match apply_transition(graph, body, &old, &new, &mut tx) {
            Ok(t) => {
                debug!(
                    "body {} normalized: {} features baked, {} binders rebased",
                    graph.body(body).name,
                    t.baked_features,
                    t.rebased_binders
                );
                tx.commit();
                Ok(t)
            }
            Err(e) => {
                tx.rollback(graph);
                Err(e)
            }
        }
    }
}

fn apply_transition(
    graph: &mut FeatureGraph,
    body: BodyId,
    old: &Placement,
    new: &Placement,
    tx: &mut BodyTransaction,
) -> Result<BodyTransition> {
    let name = graph.body(body).name.clone();
    let delta = compose(&new.inverse(), old);
    let mut counts = BodyTransition::default();

    let free: Vec<_> = graph
        .body(body)
        .features
        .iter()
        .copied()
        .filter(|&f| graph.feature(f).attachment == Attachment::Free)
        .collect();
    for f in free {
        let local = graph.feature(f).local_placement;
        tx.set(graph, PlacementKey::Feature(f), compose(&delta, &local));
        counts.baked_features += 1;
    }
    let origin = graph.body(body).origin;
    tx.set(graph, PlacementKey::Origin(body), compose(&delta, &origin));
    tx.set(graph, PlacementKey::Body(body), *new);

    for binder in graph.outbound_binders(body) {
        let rebased = rebased_for_owner_change(graph, binder, body, old, new)
            .map_err(|e| MigrationError::from_resolve(&name, e))?;
        if let Some(s) = rebased {
            debug!("binder {} rebased onto owner {name}", graph.binder(binder).name);
            tx.set(graph, PlacementKey::Binder(binder), s);
            counts.rebased_binders += 1;
        }
    }
    for binder in graph.inbound_binders(body) {
        rebase_for_body_placement_change(graph, binder, body)
            .map_err(|e| MigrationError::from_resolve(&name, e))?;
    }

    Ok(counts)
}
