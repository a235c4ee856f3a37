//! Recompute adapter and bounds validation.
//!
//! [`recompute`] evaluates every feature through a [`GeometryKernel`] at its
//! resolved world placement. Bodies go bound-from first, features in
//! predecessor order, and every binder's bound shape is handed to its owner
//! feature next to the predecessor shapes. [`RecomputeTrigger`] turns two
//! such runs into a before/after comparison of world bounding boxes.

use crate::error::{MigrationError, Result};
use crate::graph::{BinderId, BodyId, FeatureGraph, FeatureId};
use crate::resolver::ReferenceResolver;
use bodyplace_kernel::{BoundedShape, GeometryKernel, KernelError};
use bodyplace_math::Aabb3;
use log::{debug, warn};
use std::collections::{BTreeMap, BTreeSet, HashMap};

type FeatureResults<S> = HashMap<FeatureId, std::result::Result<S, KernelError>>;

/// Result of evaluating the whole graph.
#[derive(Debug, Clone)]
pub struct Recomputed<S> {
    /// Every feature's result.
    pub features: FeatureResults<S>,
    /// Bound shapes of binders whose ends resolve and whose target evaluated.
    pub binders: BTreeMap<BinderId, S>,
    /// Features in the order they were evaluated.
    pub order: Vec<FeatureId>,
}

impl<S> Recomputed<S> {
    /// Result for a body's tip, `None` when the body has no tip.
    pub fn tip<'a>(
        &'a self,
        graph: &FeatureGraph,
        body: BodyId,
    ) -> Option<&'a std::result::Result<S, KernelError>> {
        graph.tip(body).and_then(|t| self.features.get(&t))
    }

    /// Features whose evaluation failed, in evaluation order.
    pub fn failures(&self) -> impl Iterator<Item = (FeatureId, &KernelError)> + '_ {
        self.order
            .iter()
            .filter_map(|id| match self.features.get(id) {
                Some(Err(e)) => Some((*id, e)),
                _ => None,
            })
    }
}

/// Evaluate every feature and binder of the graph.
///
/// A feature whose predecessor failed fails too, naming the predecessor. So
/// does a feature owning a binder that cannot be placed.
pub fn recompute<K: GeometryKernel>(
    graph: &FeatureGraph,
    kernel: &K,
) -> std::result::Result<Recomputed<K::Shape>, MigrationError> {
    let resolver = ReferenceResolver::new(graph);
    let mut owned: HashMap<FeatureId, Vec<BinderId>> = HashMap::new();
    for id in graph.binder_ids() {
        if let Some(owner) = graph.binder(id).owner.feature() {
            owned.entry(owner).or_default().push(id);
        }
    }

    let mut features = HashMap::new();
    let mut binders = BTreeMap::new();
    let mut order = Vec::new();

    for body in graph.binder_dependency_order()? {
        for id in graph.evaluation_order(body)? {
            let bound = owned.get(&id).map(Vec::as_slice).unwrap_or_default();
            let result = match place_binders(graph, &resolver, bound, &features) {
                Ok(shapes) => {
                    let inputs: Vec<&K::Shape> = shapes.iter().map(|(_, s)| s).collect();
                    let result = evaluate(graph, kernel, id, &features, &inputs)?;
                    binders.extend(shapes);
                    result
                }
                Err(e) => Err(e),
            };
            features.insert(id, result);
            order.push(id);
        }
    }

    // binders with no owner to feed still get placed for comparison
    for id in graph.binder_ids() {
        if binders.contains_key(&id) {
            continue;
        }
        if let Ok(mut shapes) = place_binders(graph, &resolver, &[id], &features) {
            binders.extend(shapes.pop());
        }
    }

    Ok(Recomputed {
        features,
        binders,
        order,
    })
}

/// Bound shapes of `ids`, or the reason the first one cannot be placed.
fn place_binders<S: BoundedShape>(
    graph: &FeatureGraph,
    resolver: &ReferenceResolver<'_>,
    ids: &[BinderId],
    done: &FeatureResults<S>,
) -> std::result::Result<Vec<(BinderId, S)>, KernelError> {
    let mut shapes = Vec::with_capacity(ids.len());
    for &id in ids {
        let name = &graph.binder(id).name;
        let target = resolver
            .target_feature(id)
            .map_err(|e| KernelError::Other(e.to_string()))?;
        let shape = match done.get(&target) {
            Some(Ok(shape)) => shape,
            Some(Err(_)) => {
                return Err(KernelError::Other(format!(
                    "binder {name}: target {} failed",
                    graph.feature(target).name
                )))
            }
            None => {
                return Err(KernelError::Other(format!(
                    "binder {name}: target {} not evaluated before its owner",
                    graph.feature(target).name
                )))
            }
        };
        let xf = resolver
            .shape_transform(id)
            .map_err(|e| KernelError::Other(e.to_string()))?;
        shapes.push((id, shape.transformed(&xf)));
    }
    Ok(shapes)
}

fn evaluate<K: GeometryKernel>(
    graph: &FeatureGraph,
    kernel: &K,
    id: FeatureId,
    done: &FeatureResults<K::Shape>,
    bound: &[&K::Shape],
) -> std::result::Result<std::result::Result<K::Shape, KernelError>, MigrationError> {
    let feature = graph.feature(id);
    let placement = graph.feature_world_placement(id)?;

    let mut inputs = Vec::with_capacity(feature.predecessors.len() + bound.len());
    for pred in &feature.predecessors {
        match done.get(pred) {
            Some(Ok(shape)) => inputs.push(shape),
            _ => {
                return Ok(Err(KernelError::Other(format!(
                    "predecessor {} failed",
                    graph.feature(*pred).name
                ))))
            }
        }
    }
    inputs.extend_from_slice(bound);

    Ok(kernel.evaluate_feature(&feature.op, &placement, &inputs))
}

/// World bounding boxes of body tips and bound binder shapes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoundsSnapshot {
    /// Tip bounds per body.
    pub bodies: BTreeMap<BodyId, Aabb3>,
    /// Bound-shape bounds per binder.
    pub binders: BTreeMap<BinderId, Aabb3>,
    /// Features failing when the snapshot was taken.
    pub failed: BTreeSet<FeatureId>,
}

/// Recomputes through a kernel and compares bounds.
#[derive(Debug, Clone, Copy)]
pub struct RecomputeTrigger<'k, K> {
    kernel: &'k K,
    tolerance: f64,
    include_binders: bool,
}

impl<'k, K: GeometryKernel> RecomputeTrigger<'k, K> {
    /// Trigger allowing `tolerance` of bound change.
    pub fn new(kernel: &'k K, tolerance: f64, include_binders: bool) -> Self {
        Self {
            kernel,
            tolerance,
            include_binders,
        }
    }

    /// Recompute and record bounds.
    ///
    /// Features already failing are logged and left out of later
    /// comparisons, along with anything computed from them.
    pub fn snapshot(&self, graph: &FeatureGraph) -> Result<BoundsSnapshot> {
        let computed = recompute(graph, self.kernel)?;
        let mut snapshot = BoundsSnapshot::default();

        for (id, err) in computed.failures() {
            let feature = graph.feature(id);
            warn!(
                "feature {} in body {} already fails before migration: {}",
                feature.name,
                graph.body(feature.body).name,
                err
            );
            snapshot.failed.insert(id);
        }

        for body in graph.body_ids() {
            if let Some(Ok(shape)) = computed.tip(graph, body) {
                snapshot.bodies.insert(body, shape.bounding_box());
            }
        }
        if self.include_binders {
            for (id, shape) in &computed.binders {
                snapshot.binders.insert(*id, shape.bounding_box());
            }
        }
        Ok(snapshot)
    }

    /// Recompute and fail on any feature that did not fail in `before`.
    ///
    /// The first such feature, in evaluation order, is a
    /// [`MigrationError::RecomputeFailure`] carrying the kernel's diagnostic.
    pub fn recompute_checked(
        &self,
        graph: &FeatureGraph,
        before: &BoundsSnapshot,
    ) -> Result<Recomputed<K::Shape>> {
        let computed = recompute(graph, self.kernel)?;
        if let Some((id, err)) = computed
            .failures()
            .find(|(id, _)| !before.failed.contains(id))
        {
            let feature = graph.feature(id);
            return Err(MigrationError::RecomputeFailure {
                feature: feature.name.clone(),
                body: graph.body(feature.body).name.clone(),
                diagnostic: err.to_string(),
            });
        }
        Ok(computed)
    }

    /// Recompute and compare against `before`.
    ///
    /// Returns the largest deviation seen. A feature that newly fails is a
    /// [`MigrationError::RecomputeFailure`]; a bound that moved beyond the
    /// tolerance is a [`MigrationError::GeometryDrift`].
    pub fn validate(&self, graph: &FeatureGraph, before: &BoundsSnapshot) -> Result<f64> {
        let computed = self.recompute_checked(graph, before)?;

        let mut max_deviation = 0.0f64;
        for (body, old) in &before.bodies {
            let new = match computed.tip(graph, *body) {
                Some(Ok(shape)) => shape.bounding_box(),
                _ => Aabb3::empty(),
            };
            let deviation = old.max_deviation(&new);
            debug!("body {} bounds deviation {deviation:e}", graph.body(*body).name);
            self.check(&graph.body(*body).name, deviation)?;
            max_deviation = max_deviation.max(deviation);
        }

        if self.include_binders {
            for (binder, old) in &before.binders {
                let new = computed
                    .binders
                    .get(binder)
                    .map(|s| s.bounding_box())
                    .unwrap_or_else(Aabb3::empty);
                let deviation = old.max_deviation(&new);
                debug!(
                    "binder {} bounds deviation {deviation:e}",
                    graph.binder(*binder).name
                );
                self.check(&graph.binder(*binder).name, deviation)?;
                max_deviation = max_deviation.max(deviation);
            }
        }

        Ok(max_deviation)
    }

    fn check(&self, object: &str, deviation: f64) -> Result<()> {
        if deviation > self.tolerance {
            return Err(MigrationError::GeometryDrift {
                object: object.to_string(),
                deviation,
                tolerance: self.tolerance,
            });
        }
        Ok(())
    }
}
