//! In-memory feature graph.
//!
//! Parts, bodies with their ordered feature chains, and cross-body binders,
//! addressed by typed indices. The graph is built once from a persisted
//! [`Document`] and written back with [`FeatureGraph::to_document`].
//!
//! The only mutable state is the placement held in each [`PlacementKey`]
//! slot; topology, operations and references are fixed once built.

use crate::convert::{placement_from_ir, placement_to_ir};
use crate::error::{GraphError, StructuralError};
use crate::topo::topological_order;
use bodyplace_ir::{
    AttachmentDef, BinderDef, BodyDef, Document, FeatureDef, FeatureOp, PartDef, FORMAT_VERSION,
};
use bodyplace_math::{compose, Placement, Tolerance};
use std::collections::{BTreeMap, BTreeSet, HashMap};

macro_rules! graph_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(usize);

        impl $name {
            /// Position in creation order.
            pub fn index(self) -> usize {
                self.0
            }
        }
    };
}

graph_id!(
    /// Index of a [`Part`].
    PartId
);
graph_id!(
    /// Index of a [`Body`].
    BodyId
);
graph_id!(
    /// Index of a [`Feature`].
    FeatureId
);
graph_id!(
    /// Index of a [`Binder`].
    BinderId
);

/// An assembly container.
#[derive(Debug, Clone, PartialEq)]
pub struct Part {
    /// Unique name.
    pub name: String,
    /// Enclosing part.
    pub parent: Option<PartId>,
    /// Placement relative to the parent (or world).
    pub placement: Placement,
}

/// A body: an ordered feature chain under one placement.
#[derive(Debug, Clone, PartialEq)]
pub struct Body {
    /// Unique name.
    pub name: String,
    /// Enclosing part.
    pub part: Option<PartId>,
    /// Placement relative to the container frame.
    pub placement: Placement,
    /// Datum origin placement, in the body frame.
    pub origin: Placement,
    /// Features in chain order.
    pub features: Vec<FeatureId>,
    /// Feature whose shape is the body's output.
    pub tip: Option<FeatureId>,
}

/// Frame a feature's local placement is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attachment {
    /// Body frame.
    Free,
    /// Resolved placement of another feature of the same body.
    Attached(FeatureId),
}

/// One parametric step of a body.
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    /// Unique name.
    pub name: String,
    /// Owning body.
    pub body: BodyId,
    /// Operation and parameters, passed through untouched.
    pub op: FeatureOp,
    /// Placement in the frame given by `attachment`.
    pub local_placement: Placement,
    /// Placement frame.
    pub attachment: Attachment,
    /// Features whose shapes this one consumes.
    pub predecessors: Vec<FeatureId>,
}

/// One end of a binder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference {
    /// A feature of this graph.
    Resolved(FeatureId),
    /// A name with no feature behind it.
    Missing(String),
}

impl Reference {
    /// The feature, when resolved.
    pub fn feature(&self) -> Option<FeatureId> {
        match self {
            Reference::Resolved(id) => Some(*id),
            Reference::Missing(_) => None,
        }
    }
}

/// Stored offset of a binder, tagged by the frame it is expressed in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BinderOffset {
    /// World frame.
    Absolute(Placement),
    /// Frame of the owner body at bind time.
    Relative(Placement),
}

impl BinderOffset {
    /// The stored placement, whatever its frame.
    pub fn placement(&self) -> Placement {
        match self {
            BinderOffset::Absolute(p) | BinderOffset::Relative(p) => *p,
        }
    }

    /// Same frame kind, new value.
    pub fn with_placement(&self, p: Placement) -> Self {
        match self {
            BinderOffset::Absolute(_) => BinderOffset::Absolute(p),
            BinderOffset::Relative(_) => BinderOffset::Relative(p),
        }
    }

    /// True for [`BinderOffset::Relative`].
    pub fn is_relative(&self) -> bool {
        matches!(self, BinderOffset::Relative(_))
    }
}

/// A cross-body shape reference.
#[derive(Debug, Clone, PartialEq)]
pub struct Binder {
    /// Unique name.
    pub name: String,
    /// Feature owning the binder.
    pub owner: Reference,
    /// Feature whose shape is bound.
    pub target: Reference,
    /// Stored offset.
    pub offset: BinderOffset,
}

/// A mutable placement slot of the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PlacementKey {
    /// Part placement.
    Part(PartId),
    /// Body placement.
    Body(BodyId),
    /// Body datum origin.
    Origin(BodyId),
    /// Feature local placement.
    Feature(FeatureId),
    /// Binder stored offset.
    Binder(BinderId),
}

/// The feature graph.
#[derive(Debug, Clone, Default)]
pub struct FeatureGraph {
    version: String,
    parts: Vec<Part>,
    bodies: Vec<Body>,
    features: Vec<Feature>,
    binders: Vec<Binder>,
    names: HashMap<String, ObjectRef>,
    /// Placements as loaded, with their persisted form, so untouched slots
    /// are written back bit-for-bit.
    persisted: HashMap<PlacementKey, (Placement, bodyplace_ir::Transform3D)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ObjectRef {
    Part(PartId),
    Body(BodyId),
    Feature(FeatureId),
    Binder(BinderId),
}

impl FeatureGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self {
            version: FORMAT_VERSION.to_string(),
            ..Self::default()
        }
    }

    // =========================================================================
    // Construction
    // =========================================================================

    fn claim_name(&mut self, name: &str, obj: ObjectRef) -> Result<(), GraphError> {
        if self.names.contains_key(name) {
            return Err(GraphError::DuplicateName(name.to_string()));
        }
        self.names.insert(name.to_string(), obj);
        Ok(())
    }

    /// Add a part.
    pub fn add_part(
        &mut self,
        name: &str,
        parent: Option<PartId>,
        placement: Placement,
    ) -> Result<PartId, GraphError> {
        let id = PartId(self.parts.len());
        self.claim_name(name, ObjectRef::Part(id))?;
        self.parts.push(Part {
            name: name.to_string(),
            parent,
            placement,
        });
        Ok(id)
    }

    /// Add an empty body.
    pub fn add_body(
        &mut self,
        name: &str,
        part: Option<PartId>,
        placement: Placement,
    ) -> Result<BodyId, GraphError> {
        let id = BodyId(self.bodies.len());
        self.claim_name(name, ObjectRef::Body(id))?;
        self.bodies.push(Body {
            name: name.to_string(),
            part,
            placement,
            origin: Placement::identity(),
            features: Vec::new(),
            tip: None,
        });
        Ok(id)
    }

    fn push_feature(
        &mut self,
        body: BodyId,
        name: &str,
        op: FeatureOp,
        local_placement: Placement,
    ) -> Result<FeatureId, GraphError> {
        let id = FeatureId(self.features.len());
        self.claim_name(name, ObjectRef::Feature(id))?;
        self.features.push(Feature {
            name: name.to_string(),
            body,
            op,
            local_placement,
            attachment: Attachment::Free,
            predecessors: Vec::new(),
        });
        Ok(id)
    }

    /// Append a feature to the end of a body's chain.
    ///
    /// The previous last feature becomes its predecessor and the new
    /// feature becomes the tip.
    pub fn add_feature(
        &mut self,
        body: BodyId,
        name: &str,
        op: FeatureOp,
        local_placement: Placement,
    ) -> Result<FeatureId, GraphError> {
        let previous = self.bodies[body.0].features.last().copied();
        let id = self.push_feature(body, name, op, local_placement)?;
        if let Some(prev) = previous {
            self.features[id.0].predecessors.push(prev);
        }
        let b = &mut self.bodies[body.0];
        b.features.push(id);
        b.tip = Some(id);
        Ok(id)
    }

    /// Anchor a feature's placement to another feature of the same body.
    pub fn attach(&mut self, feature: FeatureId, support: FeatureId) -> Result<(), GraphError> {
        self.check_same_body(feature, support)?;
        self.features[feature.0].attachment = Attachment::Attached(support);
        Ok(())
    }

    /// Replace a feature's predecessors.
    pub fn set_predecessors(
        &mut self,
        feature: FeatureId,
        predecessors: Vec<FeatureId>,
    ) -> Result<(), GraphError> {
        for &p in &predecessors {
            self.check_same_body(feature, p)?;
        }
        self.features[feature.0].predecessors = predecessors;
        Ok(())
    }

    /// Set the body's output feature.
    pub fn set_tip(&mut self, body: BodyId, tip: Option<FeatureId>) -> Result<(), GraphError> {
        if let Some(t) = tip {
            if self.features[t.0].body != body {
                return Err(GraphError::TipNotInBody {
                    body: self.bodies[body.0].name.clone(),
                    tip: self.features[t.0].name.clone(),
                });
            }
        }
        self.bodies[body.0].tip = tip;
        Ok(())
    }

    /// Add a binder with an explicit offset.
    pub fn add_binder(
        &mut self,
        name: &str,
        owner: Reference,
        target: Reference,
        offset: BinderOffset,
    ) -> Result<BinderId, GraphError> {
        let id = BinderId(self.binders.len());
        self.claim_name(name, ObjectRef::Binder(id))?;
        self.binders.push(Binder {
            name: name.to_string(),
            owner,
            target,
            offset,
        });
        Ok(id)
    }

    fn check_same_body(&self, feature: FeatureId, other: FeatureId) -> Result<(), GraphError> {
        if self.features[feature.0].body != self.features[other.0].body {
            return Err(GraphError::CrossBodyLink {
                feature: self.features[feature.0].name.clone(),
                other: self.features[other.0].name.clone(),
            });
        }
        Ok(())
    }

    /// Build the graph from a persisted document.
    ///
    /// Dangling binder ends are kept as [`Reference::Missing`]; every other
    /// dangling name is an error.
    pub fn from_document(doc: &Document) -> Result<Self, GraphError> {
        let mut graph = Self::new();
        graph.version = doc.version.clone();

        let load = |name: &str, t: &bodyplace_ir::Transform3D| {
            placement_from_ir(t).ok_or_else(|| GraphError::InvalidPlacement(name.to_string()))
        };

        for p in &doc.parts {
            let id = graph.add_part(&p.name, None, load(&p.name, &p.placement)?)?;
            graph.remember(PlacementKey::Part(id), p.placement);
        }
        for (i, p) in doc.parts.iter().enumerate() {
            if let Some(parent) = &p.parent {
                let parent_id = graph.part_by_name(parent)?;
                graph.parts[i].parent = Some(parent_id);
            }
        }
        graph.check_containers()?;

        for b in &doc.bodies {
            let part = b.part.as_deref().map(|n| graph.part_by_name(n)).transpose()?;
            let id = graph.add_body(&b.name, part, load(&b.name, &b.placement)?)?;
            graph.bodies[id.0].origin = load(&b.name, &b.origin)?;
            graph.remember(PlacementKey::Body(id), b.placement);
            graph.remember(PlacementKey::Origin(id), b.origin);
        }

        let mut membership: HashMap<&str, BodyId> = HashMap::new();
        for (i, b) in doc.bodies.iter().enumerate() {
            for f in &b.features {
                if doc.feature(f).is_none() {
                    return Err(GraphError::FeatureNotFound(f.clone()));
                }
                if let Some(first) = membership.insert(f.as_str(), BodyId(i)) {
                    return Err(GraphError::FeatureInMultipleBodies {
                        feature: f.clone(),
                        first: graph.bodies[first.0].name.clone(),
                        second: b.name.clone(),
                    });
                }
            }
        }

        for f in &doc.features {
            let body = *membership
                .get(f.name.as_str())
                .ok_or_else(|| GraphError::OrphanFeature(f.name.clone()))?;
            let id = graph.push_feature(body, &f.name, f.op.clone(), load(&f.name, &f.placement)?)?;
            graph.remember(PlacementKey::Feature(id), f.placement);
        }

        for (i, b) in doc.bodies.iter().enumerate() {
            let chain = b
                .features
                .iter()
                .map(|f| graph.feature_by_name(f))
                .collect::<Result<Vec<_>, _>>()?;
            graph.bodies[i].features = chain;
            let tip = b.tip.as_deref().map(|t| graph.feature_by_name(t)).transpose()?;
            graph.set_tip(BodyId(i), tip)?;
        }

        for f in &doc.features {
            let id = graph.feature_by_name(&f.name)?;
            let preds = f
                .predecessors
                .iter()
                .map(|p| graph.feature_by_name(p))
                .collect::<Result<Vec<_>, _>>()?;
            graph.set_predecessors(id, preds)?;
            if let AttachmentDef::Attached { support } = &f.attachment {
                let support = graph.feature_by_name(support)?;
                graph.attach(id, support)?;
            }
        }

        for b in &doc.binders {
            let resolve = |name: &str| match graph.names.get(name) {
                Some(ObjectRef::Feature(id)) => Reference::Resolved(*id),
                _ => Reference::Missing(name.to_string()),
            };
            let owner = resolve(&b.owner);
            let target = resolve(&b.target);
            let offset = load(&b.name, &b.offset)?;
            let offset = if b.relative {
                BinderOffset::Relative(offset)
            } else {
                BinderOffset::Absolute(offset)
            };
            let id = graph.add_binder(&b.name, owner, target, offset)?;
            graph.remember(PlacementKey::Binder(id), b.offset);
        }

        Ok(graph)
    }

    fn remember(&mut self, key: PlacementKey, persisted: bodyplace_ir::Transform3D) {
        let value = self.placement(key);
        self.persisted.insert(key, (value, persisted));
    }

    fn check_containers(&self) -> Result<(), GraphError> {
        let ids: Vec<PartId> = (0..self.parts.len()).map(PartId).collect();
        topological_order(&ids, |p| self.parts[p.0].parent.into_iter().collect())
            .map(|_| ())
            .map_err(|cycle| {
                GraphError::CyclicContainer(
                    cycle.iter().map(|p| self.parts[p.0].name.clone()).collect(),
                )
            })
    }

    /// Write the graph back to the persisted form.
    ///
    /// Slots whose placement is unchanged since loading keep their
    /// persisted value exactly.
    pub fn to_document(&self) -> Document {
        let store = |key: PlacementKey| {
            let current = self.placement(key);
            match self.persisted.get(&key) {
                Some((loaded, persisted)) if *loaded == current => *persisted,
                _ => placement_to_ir(&current),
            }
        };
        let feature_name = |id: &FeatureId| self.features[id.0].name.clone();
        let reference_name = |r: &Reference| match r {
            Reference::Resolved(id) => self.features[id.0].name.clone(),
            Reference::Missing(name) => name.clone(),
        };

        Document {
            version: self.version.clone(),
            parts: self
                .part_ids()
                .map(|id| {
                    let p = &self.parts[id.0];
                    PartDef {
                        name: p.name.clone(),
                        parent: p.parent.map(|q| self.parts[q.0].name.clone()),
                        placement: store(PlacementKey::Part(id)),
                    }
                })
                .collect(),
            bodies: self
                .body_ids()
                .map(|id| {
                    let b = &self.bodies[id.0];
                    BodyDef {
                        name: b.name.clone(),
                        part: b.part.map(|p| self.parts[p.0].name.clone()),
                        placement: store(PlacementKey::Body(id)),
                        origin: store(PlacementKey::Origin(id)),
                        features: b.features.iter().map(feature_name).collect(),
                        tip: b.tip.as_ref().map(feature_name),
                    }
                })
                .collect(),
            features: self
                .feature_ids()
                .map(|id| {
                    let f = &self.features[id.0];
                    FeatureDef {
                        name: f.name.clone(),
                        op: f.op.clone(),
                        placement: store(PlacementKey::Feature(id)),
                        attachment: match f.attachment {
                            Attachment::Free => AttachmentDef::Free,
                            Attachment::Attached(s) => AttachmentDef::Attached {
                                support: feature_name(&s),
                            },
                        },
                        predecessors: f.predecessors.iter().map(feature_name).collect(),
                    }
                })
                .collect(),
            binders: self
                .binder_ids()
                .map(|id| {
                    let b = &self.binders[id.0];
                    BinderDef {
                        name: b.name.clone(),
                        owner: reference_name(&b.owner),
                        target: reference_name(&b.target),
                        relative: b.offset.is_relative(),
                        offset: store(PlacementKey::Binder(id)),
                    }
                })
                .collect(),
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// All part ids in creation order.
    pub fn part_ids(&self) -> impl Iterator<Item = PartId> {
        (0..self.parts.len()).map(PartId)
    }

    /// All body ids in creation order.
    pub fn body_ids(&self) -> impl Iterator<Item = BodyId> {
        (0..self.bodies.len()).map(BodyId)
    }

    /// All feature ids in creation order.
    pub fn feature_ids(&self) -> impl Iterator<Item = FeatureId> {
        (0..self.features.len()).map(FeatureId)
    }

    /// All binder ids in creation order.
    pub fn binder_ids(&self) -> impl Iterator<Item = BinderId> {
        (0..self.binders.len()).map(BinderId)
    }

    /// Part by id.
    pub fn part(&self, id: PartId) -> &Part {
        &self.parts[id.0]
    }

    /// Body by id.
    pub fn body(&self, id: BodyId) -> &Body {
        &self.bodies[id.0]
    }

    /// Feature by id.
    pub fn feature(&self, id: FeatureId) -> &Feature {
        &self.features[id.0]
    }

    /// Binder by id.
    pub fn binder(&self, id: BinderId) -> &Binder {
        &self.binders[id.0]
    }

    /// Part by name.
    pub fn part_by_name(&self, name: &str) -> Result<PartId, GraphError> {
        match self.names.get(name) {
            Some(ObjectRef::Part(id)) => Ok(*id),
            _ => Err(GraphError::PartNotFound(name.to_string())),
        }
    }

    /// Body by name.
    pub fn body_by_name(&self, name: &str) -> Result<BodyId, GraphError> {
        match self.names.get(name) {
            Some(ObjectRef::Body(id)) => Ok(*id),
            _ => Err(GraphError::BodyNotFound(name.to_string())),
        }
    }

    /// Feature by name.
    pub fn feature_by_name(&self, name: &str) -> Result<FeatureId, GraphError> {
        match self.names.get(name) {
            Some(ObjectRef::Feature(id)) => Ok(*id),
            _ => Err(GraphError::FeatureNotFound(name.to_string())),
        }
    }

    /// Binder by name.
    pub fn binder_by_name(&self, name: &str) -> Result<BinderId, GraphError> {
        match self.names.get(name) {
            Some(ObjectRef::Binder(id)) => Ok(*id),
            _ => Err(GraphError::BinderNotFound(name.to_string())),
        }
    }

    /// The body's output feature, if it has one.
    pub fn tip(&self, body: BodyId) -> Option<FeatureId> {
        self.bodies[body.0].tip
    }

    /// First feature of the body's chain, if the body is not empty.
    pub fn chain_root(&self, body: BodyId) -> Option<FeatureId> {
        self.bodies[body.0].features.first().copied()
    }

    /// Predecessors of a feature, in order.
    pub fn predecessors(&self, feature: FeatureId) -> &[FeatureId] {
        &self.features[feature.0].predecessors
    }

    /// Body owning a feature.
    pub fn body_of(&self, feature: FeatureId) -> BodyId {
        self.features[feature.0].body
    }

    /// Binders owned by a feature of `body`.
    pub fn outbound_binders(&self, body: BodyId) -> Vec<BinderId> {
        self.binder_ids()
            .filter(|&b| {
                self.binders[b.0]
                    .owner
                    .feature()
                    .is_some_and(|f| self.body_of(f) == body)
            })
            .collect()
    }

    /// Binders anywhere in the graph whose target is a feature of `body`.
    pub fn inbound_binders(&self, body: BodyId) -> Vec<BinderId> {
        self.binder_ids()
            .filter(|&b| {
                self.binders[b.0]
                    .target
                    .feature()
                    .is_some_and(|f| self.body_of(f) == body)
            })
            .collect()
    }

    /// Bodies whose placement is not the identity.
    pub fn legacy_bodies(&self, tol: &Tolerance) -> Vec<BodyId> {
        self.body_ids()
            .filter(|&b| !self.bodies[b.0].placement.is_identity(tol))
            .collect()
    }

    /// Whether any body still carries a placement.
    pub fn needs_migration(&self, tol: &Tolerance) -> bool {
        !self.legacy_bodies(tol).is_empty()
    }

    // =========================================================================
    // Placement slots
    // =========================================================================

    /// Every mutable placement slot.
    pub fn placement_keys(&self) -> Vec<PlacementKey> {
        let mut keys = Vec::new();
        keys.extend(self.part_ids().map(PlacementKey::Part));
        for b in self.body_ids() {
            keys.push(PlacementKey::Body(b));
            keys.push(PlacementKey::Origin(b));
        }
        keys.extend(self.feature_ids().map(PlacementKey::Feature));
        keys.extend(self.binder_ids().map(PlacementKey::Binder));
        keys
    }

    /// Current value of a slot.
    pub fn placement(&self, key: PlacementKey) -> Placement {
        match key {
            PlacementKey::Part(id) => self.parts[id.0].placement,
            PlacementKey::Body(id) => self.bodies[id.0].placement,
            PlacementKey::Origin(id) => self.bodies[id.0].origin,
            PlacementKey::Feature(id) => self.features[id.0].local_placement,
            PlacementKey::Binder(id) => self.binders[id.0].offset.placement(),
        }
    }

    /// Overwrite a slot. Binder offsets keep their frame kind.
    pub fn set_placement(&mut self, key: PlacementKey, p: Placement) {
        match key {
            PlacementKey::Part(id) => self.parts[id.0].placement = p,
            PlacementKey::Body(id) => self.bodies[id.0].placement = p,
            PlacementKey::Origin(id) => self.bodies[id.0].origin = p,
            PlacementKey::Feature(id) => self.features[id.0].local_placement = p,
            PlacementKey::Binder(id) => {
                let b = &mut self.binders[id.0];
                b.offset = b.offset.with_placement(p);
            }
        }
    }

    /// Set a body's placement.
    pub fn set_body_placement(&mut self, body: BodyId, p: Placement) {
        self.set_placement(PlacementKey::Body(body), p);
    }

    /// Set a feature's local placement.
    pub fn set_local_placement(&mut self, feature: FeatureId, p: Placement) {
        self.set_placement(PlacementKey::Feature(feature), p);
    }

    /// Set a body's datum origin placement.
    pub fn set_origin_placement(&mut self, body: BodyId, p: Placement) {
        self.set_placement(PlacementKey::Origin(body), p);
    }

    /// Set a binder's stored offset, keeping its frame kind.
    pub fn set_binder_offset(&mut self, binder: BinderId, p: Placement) {
        self.set_placement(PlacementKey::Binder(binder), p);
    }

    // =========================================================================
    // Frames
    // =========================================================================

    /// World frame of the container a body sits in (its part chain).
    pub fn container_frame(&self, body: BodyId) -> Placement {
        let mut chain = Vec::new();
        let mut part = self.bodies[body.0].part;
        while let Some(p) = part {
            chain.push(p);
            part = self.parts[p.0].parent;
        }
        chain
            .iter()
            .rev()
            .fold(Placement::identity(), |acc, p| {
                compose(&acc, &self.parts[p.0].placement)
            })
    }

    /// World frame of a body: `container ∘ body.placement`.
    pub fn body_frame(&self, body: BodyId) -> Placement {
        compose(&self.container_frame(body), &self.bodies[body.0].placement)
    }

    /// Placement of a feature in its body's frame, following attachments.
    pub fn placement_in_body(&self, feature: FeatureId) -> Result<Placement, GraphError> {
        let mut chain = vec![feature];
        let mut current = feature;
        while let Attachment::Attached(support) = self.features[current.0].attachment {
            if let Some(pos) = chain.iter().position(|&f| f == support) {
                let mut cycle: Vec<String> = chain[pos..]
                    .iter()
                    .map(|f| self.features[f.0].name.clone())
                    .collect();
                cycle.push(self.features[support.0].name.clone());
                return Err(StructuralError::CyclicAttachment {
                    body: self.bodies[self.body_of(feature).0].name.clone(),
                    cycle,
                }
                .into());
            }
            chain.push(support);
            current = support;
        }
        Ok(chain
            .iter()
            .rev()
            .fold(Placement::identity(), |acc, f| {
                compose(&acc, &self.features[f.0].local_placement)
            }))
    }

    /// World placement of a feature: `body_frame ∘ placement_in_body`.
    pub fn feature_world_placement(&self, feature: FeatureId) -> Result<Placement, GraphError> {
        let in_body = self.placement_in_body(feature)?;
        Ok(compose(&self.body_frame(self.body_of(feature)), &in_body))
    }

    // =========================================================================
    // Ordering and structure
    // =========================================================================

    /// Features of a body ordered so predecessors come first.
    pub fn evaluation_order(&self, body: BodyId) -> Result<Vec<FeatureId>, StructuralError> {
        let b = &self.bodies[body.0];
        topological_order(&b.features, |f| self.features[f.0].predecessors.clone()).map_err(
            |cycle| StructuralError::CyclicChain {
                body: b.name.clone(),
                cycle: cycle
                    .iter()
                    .map(|f| self.features[f.0].name.clone())
                    .collect(),
            },
        )
    }

    /// For each body, the other bodies it binds shapes from.
    pub fn body_dependencies(&self) -> BTreeMap<BodyId, BTreeSet<BodyId>> {
        let mut deps: BTreeMap<BodyId, BTreeSet<BodyId>> =
            self.body_ids().map(|b| (b, BTreeSet::new())).collect();
        for b in &self.binders {
            if let (Some(owner), Some(target)) = (b.owner.feature(), b.target.feature()) {
                let (ob, tb) = (self.body_of(owner), self.body_of(target));
                if ob != tb {
                    deps.entry(ob).or_default().insert(tb);
                }
            }
        }
        deps
    }

    /// All bodies, bound-from bodies before the bodies binding them.
    pub fn binder_dependency_order(&self) -> Result<Vec<BodyId>, StructuralError> {
        let deps = self.body_dependencies();
        let ids: Vec<BodyId> = self.body_ids().collect();
        topological_order(&ids, |b| {
            deps.get(&b)
                .map(|s| s.iter().copied().collect())
                .unwrap_or_default()
        })
        .map_err(|cycle| StructuralError::CyclicBinders {
            cycle: cycle
                .iter()
                .map(|b| self.bodies[b.0].name.clone())
                .collect(),
        })
    }

    /// Check every chain, attachment and binder loop.
    pub fn validate_structure(&self) -> Result<(), StructuralError> {
        for body in self.body_ids() {
            self.evaluation_order(body)?;
            for &f in &self.bodies[body.0].features {
                match self.placement_in_body(f) {
                    Ok(_) => {}
                    Err(GraphError::Structural(e)) => return Err(e),
                    Err(_) => {}
                }
            }
        }
        self.binder_dependency_order()?;
        Ok(())
    }
}
