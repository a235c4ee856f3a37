//! End-to-end migration of a legacy two-body part.
//!
//! `MainPart` sits at (10, 20, 0) turned 12° about Z. Inside it:
//!
//! - `B1` at (80, 0, 0) turned 45°, a 20 × 12 × 8 box;
//! - `B2` at (-40, 25, 0) turned -30°, a cylinder r6 h15 at (10, 0, 0);
//! - `B3` lifted by 30, a datum.
//!
//! `Ref` is a relative binder in `B1` bound to `B2`'s tip, `AbsRef` an
//! absolute binder in `B3` bound to `B1`'s box. Both feed their owner's
//! shape.

use approx::assert_relative_eq;
use bodyplace::resolver::bind;
use bodyplace::{
    normalize_body_placements, recompute, BodyStatus, FeatureGraph, MigrationConfig,
    MigrationError, NormalizationEngine, ReferenceResolver, StructuralError,
};
use bodyplace_ir::{
    AttachmentDef, BinderDef, BodyDef, Document, FeatureDef, FeatureOp, PartDef, Transform3D,
    Vec3,
};
use bodyplace_kernel::{BoundedShape, GeometryKernel, KernelError, SampledKernel, SampledShape};
use bodyplace_math::{Aabb3, Placement, Tolerance};
use std::cell::Cell;
use std::collections::BTreeMap;

const Z: Vec3 = Vec3 {
    x: 0.0,
    y: 0.0,
    z: 1.0,
};

fn feature(name: &str, op: FeatureOp, placement: Transform3D) -> FeatureDef {
    FeatureDef {
        name: name.into(),
        op,
        placement,
        attachment: AttachmentDef::Free,
        predecessors: Vec::new(),
    }
}

fn body(name: &str, placement: Transform3D, features: &[&str]) -> BodyDef {
    BodyDef {
        name: name.into(),
        part: Some("MainPart".into()),
        placement,
        origin: Transform3D::identity(),
        features: features.iter().map(|f| f.to_string()).collect(),
        tip: features.last().map(|f| f.to_string()),
    }
}

fn legacy_document() -> Document {
    let mut doc = Document::new();
    doc.parts.push(PartDef {
        name: "MainPart".into(),
        parent: None,
        placement: Transform3D::axis_angle_deg(Vec3::new(10.0, 20.0, 0.0), Z, 12.0),
    });
    doc.bodies.push(body(
        "B1",
        Transform3D::axis_angle_deg(Vec3::new(80.0, 0.0, 0.0), Z, 45.0),
        &["Box1"],
    ));
    doc.bodies.push(body(
        "B2",
        Transform3D::axis_angle_deg(Vec3::new(-40.0, 25.0, 0.0), Z, -30.0),
        &["Cyl2"],
    ));
    doc.bodies.push(body(
        "B3",
        Transform3D::translation(0.0, 0.0, 30.0),
        &["Datum3"],
    ));
    doc.features.push(feature(
        "Box1",
        FeatureOp::AdditiveBox {
            length: 20.0,
            width: 12.0,
            height: 8.0,
        },
        Transform3D::identity(),
    ));
    doc.features.push(feature(
        "Cyl2",
        FeatureOp::AdditiveCylinder {
            radius: 6.0,
            height: 15.0,
        },
        Transform3D::translation(10.0, 0.0, 0.0),
    ));
    doc.features.push(feature(
        "Datum3",
        FeatureOp::DatumPlane,
        Transform3D::identity(),
    ));

    // capture the relative offset the way binding does
    let mut graph = FeatureGraph::from_document(&doc).unwrap();
    let box1 = graph.feature_by_name("Box1").unwrap();
    let cyl2 = graph.feature_by_name("Cyl2").unwrap();
    bind(&mut graph, "Ref", box1, cyl2, true).unwrap();
    let mut doc = graph.to_document();

    doc.binders.push(BinderDef {
        name: "AbsRef".into(),
        owner: "Datum3".into(),
        target: "Box1".into(),
        relative: false,
        offset: Transform3D::axis_angle_deg(Vec3::new(0.0, 0.0, 5.0), Z, 7.5),
    });
    doc
}

/// Tip bounds per body and bound-shape bounds per binder, by name.
fn world_bounds(doc: &Document) -> BTreeMap<String, Aabb3> {
    let graph = FeatureGraph::from_document(doc).unwrap();
    let computed = recompute(&graph, &SampledKernel::default()).unwrap();
    let mut out = BTreeMap::new();
    for b in graph.body_ids() {
        if let Some(Ok(shape)) = computed.tip(&graph, b) {
            out.insert(graph.body(b).name.clone(), shape.bounding_box());
        }
    }
    for (id, shape) in &computed.binders {
        out.insert(graph.binder(*id).name.clone(), shape.bounding_box());
    }
    out
}

fn assert_same_bounds(a: &BTreeMap<String, Aabb3>, b: &BTreeMap<String, Aabb3>) {
    assert_eq!(a.keys().collect::<Vec<_>>(), b.keys().collect::<Vec<_>>());
    for (name, before) in a {
        let after = &b[name];
        assert!(
            before.approx_eq(after, 1e-6),
            "{name} moved: {before:?} -> {after:?}"
        );
    }
}

fn migrate(doc: &mut Document) -> Result<bodyplace::MigrationReport, MigrationError> {
    normalize_body_placements(doc, &SampledKernel::default(), &MigrationConfig::default())
}

#[test]
fn legacy_part_keeps_world_geometry() {
    let mut doc = legacy_document();
    let before = world_bounds(&doc);
    assert_eq!(before.len(), 5);

    let report = migrate(&mut doc).unwrap();
    assert_eq!(report.bodies.len(), 3);
    assert_eq!(report.changed().count(), 3);
    assert!(report.validated);
    assert!(report.max_deviation < 1e-6);
    // B2 is bound from, so it goes before B1
    let order: Vec<_> = report.bodies.iter().map(|b| b.body.as_str()).collect();
    let pos = |n: &str| order.iter().position(|b| *b == n).unwrap();
    assert!(pos("B2") < pos("B1"));
    assert!(pos("B1") < pos("B3"));

    // only the owner of Ref rewrites it
    let b1 = report.bodies.iter().find(|b| b.body == "B1").unwrap();
    assert_eq!((b1.baked_features, b1.rebased_binders), (1, 1));
    let b2 = report.bodies.iter().find(|b| b.body == "B2").unwrap();
    assert_eq!((b2.baked_features, b2.rebased_binders), (1, 0));

    for b in &doc.bodies {
        assert!(b.placement.is_exact_identity(), "{} not reset", b.name);
    }
    assert_same_bounds(&before, &world_bounds(&doc));
}

#[test]
fn second_pass_is_a_no_op() {
    let mut doc = legacy_document();
    migrate(&mut doc).unwrap();
    let migrated = doc.clone();

    let report = migrate(&mut doc).unwrap();
    assert!(report.is_empty());
    assert!(!report.validated);
    assert_eq!(doc, migrated);
    assert_eq!(doc.to_json().unwrap(), migrated.to_json().unwrap());
}

#[test]
fn absolute_binders_are_written_back_unchanged() {
    let original = legacy_document();
    let mut doc = original.clone();
    migrate(&mut doc).unwrap();
    let before = serde_json::to_string(original.binder("AbsRef").unwrap()).unwrap();
    let after = serde_json::to_string(doc.binder("AbsRef").unwrap()).unwrap();
    assert_eq!(before, after);
    assert_ne!(original.binder("Ref"), doc.binder("Ref"));
}

#[test]
fn relative_binder_follows_target() {
    let doc = legacy_document();
    let mut graph = FeatureGraph::from_document(&doc).unwrap();
    let binder = graph.binder_by_name("Ref").unwrap();
    let r = ReferenceResolver::new(&graph);
    let before = r.bound_world_placement(binder).unwrap();
    let world = r.world_offset(binder).unwrap();

    let kernel = SampledKernel::default();
    NormalizationEngine::new(&kernel, MigrationConfig::default())
        .run(&mut graph)
        .unwrap();

    let r = ReferenceResolver::new(&graph);
    let after = r.bound_world_placement(binder).unwrap();
    assert!(after.approx_eq(&before, &Tolerance::DEFAULT));
    assert!(r.world_offset(binder).unwrap().approx_eq(&world, &Tolerance::DEFAULT));
    // captured at bind time, so the copy still sits on the target
    let target = graph.feature_world_placement(r.target_feature(binder).unwrap()).unwrap();
    assert!(after.approx_eq(&target, &Tolerance::DEFAULT));
}

#[test]
fn normalizing_the_target_alone_keeps_world_offset() {
    let doc = legacy_document();
    let mut graph = FeatureGraph::from_document(&doc).unwrap();
    let binder = graph.binder_by_name("Ref").unwrap();
    let b2 = graph.body_by_name("B2").unwrap();
    let offset = graph.binder(binder).offset;
    let world = ReferenceResolver::new(&graph).world_offset(binder).unwrap();

    let kernel = SampledKernel::default();
    NormalizationEngine::new(&kernel, MigrationConfig::default())
        .transition_body(&mut graph, b2)
        .unwrap();

    assert_eq!(graph.binder(binder).offset, offset);
    let after = ReferenceResolver::new(&graph).world_offset(binder).unwrap();
    assert!(after.approx_eq(&world, &Tolerance::DEFAULT));
}

#[test]
fn body_order_does_not_matter() {
    let doc = legacy_document();
    let kernel = SampledKernel::default();
    let engine = NormalizationEngine::new(&kernel, MigrationConfig::default());

    let run = |names: &[&str]| {
        let mut graph = FeatureGraph::from_document(&doc).unwrap();
        for n in names {
            let b = graph.body_by_name(n).unwrap();
            engine.transition_body(&mut graph, b).unwrap();
        }
        graph
    };
    let owner_first = run(&["B1", "B2", "B3"]);
    let target_first = run(&["B3", "B2", "B1"]);

    let tol = Tolerance::DEFAULT;
    for key in owner_first.placement_keys() {
        assert!(
            owner_first
                .placement(key)
                .approx_eq(&target_first.placement(key), &tol),
            "{key:?} differs"
        );
    }
}

#[test]
fn empty_body_is_reset() {
    let mut doc = legacy_document();
    doc.bodies.push(BodyDef {
        name: "Empty".into(),
        part: None,
        placement: Transform3D::translation(1.0, 2.0, 3.0),
        origin: Transform3D::identity(),
        features: Vec::new(),
        tip: None,
    });
    let report = migrate(&mut doc).unwrap();
    let empty = report.bodies.iter().find(|b| b.body == "Empty").unwrap();
    assert_eq!(empty.status, BodyStatus::Normalized);
    assert_eq!(empty.baked_features, 0);
    let body = doc.body("Empty").unwrap();
    assert!(body.placement.is_exact_identity());
    assert_relative_eq!(body.origin.translation.z, 3.0);
}

#[test]
fn unresolved_reference_rolls_back_body_and_blocks_dependents() {
    let mut doc = legacy_document();
    doc.binders.push(BinderDef {
        name: "Stale".into(),
        owner: "Cyl2".into(),
        target: "DeletedFeature".into(),
        relative: true,
        offset: Transform3D::identity(),
    });
    doc.bodies.push(BodyDef {
        name: "Loose".into(),
        part: None,
        placement: Transform3D::translation(0.0, -7.0, 0.0),
        origin: Transform3D::identity(),
        features: vec!["Ball".into()],
        tip: Some("Ball".into()),
    });
    doc.features.push(feature(
        "Ball",
        FeatureOp::AdditiveSphere { radius: 2.0 },
        Transform3D::identity(),
    ));
    let original = doc.clone();

    let report = migrate(&mut doc).unwrap();
    let status: BTreeMap<_, _> = report
        .bodies
        .iter()
        .map(|b| (b.body.as_str(), b.status.clone()))
        .collect();
    match &status["B2"] {
        BodyStatus::Failed { error, binder } => {
            assert_eq!(binder.as_deref(), Some("Stale"));
            assert!(error.contains("DeletedFeature"));
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(status["B1"], BodyStatus::Blocked { by: "B2".into() });
    assert_eq!(status["B3"], BodyStatus::Blocked { by: "B2".into() });
    assert_eq!(status["Loose"], BodyStatus::Normalized);

    // only the independent body moved
    for name in ["B1", "B2", "B3"] {
        assert_eq!(doc.body(name), original.body(name));
    }
    for name in ["Box1", "Cyl2", "Datum3"] {
        assert_eq!(doc.feature(name), original.feature(name));
    }
    assert_eq!(doc.binders, original.binders);
    assert!(doc.body("Loose").unwrap().placement.is_exact_identity());
}

#[test]
fn cyclic_binders_are_fatal() {
    let mut doc = legacy_document();
    doc.binders.push(BinderDef {
        name: "Back".into(),
        owner: "Cyl2".into(),
        target: "Box1".into(),
        relative: true,
        offset: Transform3D::identity(),
    });
    let original = doc.clone();
    let err = migrate(&mut doc).unwrap_err();
    match err {
        MigrationError::Structural(StructuralError::CyclicBinders { cycle }) => {
            assert!(cycle.contains(&"B1".to_string()));
            assert!(cycle.contains(&"B2".to_string()));
        }
        other => panic!("unexpected {other}"),
    }
    assert_eq!(doc, original);
}

#[test]
fn cyclic_chain_is_fatal() {
    let mut doc = legacy_document();
    doc.bodies[0].features.push("Box1b".into());
    let mut extra = feature(
        "Box1b",
        FeatureOp::AdditiveSphere { radius: 1.0 },
        Transform3D::identity(),
    );
    extra.predecessors = vec!["Box1".into()];
    doc.features.push(extra);
    doc.features[0].predecessors = vec!["Box1b".into()];
    let original = doc.clone();
    assert!(matches!(
        migrate(&mut doc),
        Err(MigrationError::Structural(StructuralError::CyclicChain { .. }))
    ));
    assert_eq!(doc, original);
}

/// Wraps the sampled kernel and misbehaves after a number of calls.
struct FaultyKernel {
    inner: SampledKernel,
    calls: Cell<usize>,
    healthy_calls: usize,
    fault: Fault,
}

enum Fault {
    Reject,
    Shift,
}

impl FaultyKernel {
    fn new(healthy_calls: usize, fault: Fault) -> Self {
        Self {
            inner: SampledKernel::default(),
            calls: Cell::new(0),
            healthy_calls,
            fault,
        }
    }
}

impl GeometryKernel for FaultyKernel {
    type Shape = SampledShape;

    fn evaluate_feature(
        &self,
        op: &FeatureOp,
        placement: &Placement,
        inputs: &[&SampledShape],
    ) -> Result<SampledShape, KernelError> {
        let n = self.calls.get() + 1;
        self.calls.set(n);
        let shape = self.inner.evaluate_feature(op, placement, inputs)?;
        if n <= self.healthy_calls {
            return Ok(shape);
        }
        match self.fault {
            Fault::Reject => Err(KernelError::Other("kernel gave up".into())),
            Fault::Shift => Ok(shape.transformed(&Placement::from_translation(0.0, 0.0, 0.01))),
        }
    }
}

#[test]
fn recompute_failure_restores_everything() {
    let mut doc = legacy_document();
    let original = doc.clone();
    // three features: the snapshot succeeds, validation does not
    let kernel = FaultyKernel::new(3, Fault::Reject);
    let err = normalize_body_placements(&mut doc, &kernel, &MigrationConfig::default()).unwrap_err();
    // B2 is bound from, so its cylinder is evaluated first
    assert_eq!(
        err,
        MigrationError::RecomputeFailure {
            feature: "Cyl2".into(),
            body: "B2".into(),
            diagnostic: "kernel gave up".into(),
        }
    );
    assert_eq!(doc, original);
}

#[test]
fn recompute_failure_rolls_back_without_bounds_check() {
    let config = MigrationConfig {
        validate: false,
        ..MigrationConfig::default()
    };

    let mut doc = legacy_document();
    let original = doc.clone();
    let kernel = FaultyKernel::new(3, Fault::Reject);
    assert!(matches!(
        normalize_body_placements(&mut doc, &kernel, &config),
        Err(MigrationError::RecomputeFailure { .. })
    ));
    assert_eq!(doc, original);

    // moved bounds are not compared
    let kernel = FaultyKernel::new(3, Fault::Shift);
    let report = normalize_body_placements(&mut doc, &kernel, &config).unwrap();
    assert!(!report.validated);
    assert_eq!(report.changed().count(), 3);
}

#[test]
fn geometry_drift_restores_everything() {
    let mut doc = legacy_document();
    let original = doc.clone();
    let kernel = FaultyKernel::new(3, Fault::Shift);
    match normalize_body_placements(&mut doc, &kernel, &MigrationConfig::default()) {
        Err(MigrationError::GeometryDrift {
            object,
            deviation,
            tolerance,
        }) => {
            // Box1 unions the shifted copy of Cyl2 and is shifted once more
            assert_eq!(object, "B1");
            assert_relative_eq!(deviation, 0.02, epsilon = 1e-9);
            assert_eq!(tolerance, 1e-6);
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(doc, original);
}

#[test]
fn failing_features_before_migration_are_ignored() {
    let mut doc = legacy_document();
    doc.bodies[1].features.push("BadPocket".into());
    doc.bodies[1].tip = Some("BadPocket".into());
    let mut pocket = feature(
        "BadPocket",
        FeatureOp::SubtractiveBox {
            length: -1.0,
            width: 1.0,
            height: 1.0,
        },
        Transform3D::identity(),
    );
    pocket.predecessors = vec!["Cyl2".into()];
    doc.features.push(pocket);

    let report = migrate(&mut doc).unwrap();
    assert_eq!(report.changed().count(), 3);
    assert!(report.validated);
}
