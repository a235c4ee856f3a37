//! Binder resolution and rebasing.
//!
//! A binder shows a copy of its target's shape inside the owner's body. How
//! that copy is positioned depends on the offset kind:
//!
//! - [`BinderOffset::Relative`]: the offset `S` is the target's world
//!   placement expressed in the owner body frame. The bound shape sits at
//!   `OwnerFrame ∘ S` in world. Binding captures
//!   `S = OwnerFrame⁻¹ ∘ TargetWorldPlacement`, so the copy starts on top of
//!   the target.
//! - [`BinderOffset::Absolute`]: the offset is a world transform applied to
//!   the target's world shape. It does not depend on any body frame.
//!
//! Normalizing a body keeps every feature of it in place, so a binder
//! targeting the body needs no edit. A relative binder owned by the body
//! reads its offset through the owner frame, which does change, and is
//! rebased onto the new frame.

use crate::error::{GraphError, ReferenceRole, ResolveError};
use crate::graph::{BinderId, BinderOffset, BodyId, FeatureGraph, FeatureId, Reference};
use bodyplace_math::{compose, Placement};

/// Read-only view resolving binders against a graph.
#[derive(Debug, Clone, Copy)]
pub struct ReferenceResolver<'g> {
    graph: &'g FeatureGraph,
}

impl<'g> ReferenceResolver<'g> {
    /// Resolver over `graph`.
    pub fn new(graph: &'g FeatureGraph) -> Self {
        Self { graph }
    }

    fn resolve(
        &self,
        binder: BinderId,
        role: ReferenceRole,
        reference: &Reference,
    ) -> Result<FeatureId, ResolveError> {
        match reference {
            Reference::Resolved(id) => Ok(*id),
            Reference::Missing(name) => Err(ResolveError::Unresolved {
                binder: self.graph.binder(binder).name.clone(),
                role,
                reference: name.clone(),
            }),
        }
    }

    /// Feature owning the binder.
    pub fn owner_feature(&self, binder: BinderId) -> Result<FeatureId, ResolveError> {
        let b = self.graph.binder(binder);
        self.resolve(binder, ReferenceRole::Owner, &b.owner)
    }

    /// Feature whose shape is bound.
    pub fn target_feature(&self, binder: BinderId) -> Result<FeatureId, ResolveError> {
        let b = self.graph.binder(binder);
        self.resolve(binder, ReferenceRole::Target, &b.target)
    }

    /// Body of the owning feature.
    pub fn owner_body(&self, binder: BinderId) -> Result<BodyId, ResolveError> {
        Ok(self.graph.body_of(self.owner_feature(binder)?))
    }

    /// Body of the target feature.
    pub fn target_body(&self, binder: BinderId) -> Result<BodyId, ResolveError> {
        Ok(self.graph.body_of(self.target_feature(binder)?))
    }

    /// World frame of the owner body.
    pub fn owner_frame(&self, binder: BinderId) -> Result<Placement, ResolveError> {
        Ok(self.graph.body_frame(self.owner_body(binder)?))
    }

    /// The stored offset expressed in world: `S` if absolute,
    /// `OwnerFrame ∘ S` if relative.
    pub fn world_offset(&self, binder: BinderId) -> Result<Placement, ResolveError> {
        match self.graph.binder(binder).offset {
            BinderOffset::Absolute(s) => Ok(s),
            BinderOffset::Relative(s) => Ok(compose(&self.owner_frame(binder)?, &s)),
        }
    }

    /// Transform taking the target's world shape onto the bound shape.
    pub fn shape_transform(&self, binder: BinderId) -> Result<Placement, ResolveError> {
        match self.graph.binder(binder).offset {
            BinderOffset::Absolute(s) => Ok(s),
            BinderOffset::Relative(_) => {
                let target = self
                    .graph
                    .feature_world_placement(self.target_feature(binder)?)?;
                Ok(compose(&self.world_offset(binder)?, &target.inverse()))
            }
        }
    }

    /// World placement of the target feature as seen through the binder.
    pub fn bound_world_placement(&self, binder: BinderId) -> Result<Placement, ResolveError> {
        let target = self.target_feature(binder)?;
        let world = self.graph.feature_world_placement(target)?;
        Ok(compose(&self.shape_transform(binder)?, &world))
    }
}

/// Offset a new binder from `owner` to `target` stores at bind time.
pub fn capture_offset(
    graph: &FeatureGraph,
    owner: FeatureId,
    target: FeatureId,
    relative: bool,
) -> Result<BinderOffset, GraphError> {
    if relative {
        let owner_frame = graph.body_frame(graph.body_of(owner));
        let target_world = graph.feature_world_placement(target)?;
        Ok(BinderOffset::Relative(compose(
            &owner_frame.inverse(),
            &target_world,
        )))
    } else {
        Ok(BinderOffset::Absolute(Placement::identity()))
    }
}

/// Add a binder whose bound shape coincides with its target right now.
pub fn bind(
    graph: &mut FeatureGraph,
    name: &str,
    owner: FeatureId,
    target: FeatureId,
    relative: bool,
) -> Result<BinderId, GraphError> {
    let offset = capture_offset(graph, owner, target, relative)?;
    graph.add_binder(
        name,
        Reference::Resolved(owner),
        Reference::Resolved(target),
        offset,
    )
}

/// New offset for `binder` after its owner body's placement goes from `old`
/// to `new`.
///
/// `None` when the binder is absolute or not owned by `owner_body`. The
/// target must resolve whatever the offset kind.
pub fn rebased_for_owner_change(
    graph: &FeatureGraph,
    binder: BinderId,
    owner_body: BodyId,
    old: &Placement,
    new: &Placement,
) -> Result<Option<Placement>, ResolveError> {
    let resolver = ReferenceResolver::new(graph);
    if resolver.owner_body(binder)? != owner_body {
        return Ok(None);
    }
    resolver.target_feature(binder)?;
    match graph.binder(binder).offset {
        BinderOffset::Absolute(_) => Ok(None),
        // OwnerFrame' ∘ S' = OwnerFrame ∘ S within the same container.
        BinderOffset::Relative(s) => Ok(Some(compose(&compose(&new.inverse(), old), &s))),
    }
}

/// Check an inbound binder of `target_body` once the body placement has
/// been baked into its features.
///
/// The target keeps its world placement through the bake, so the stored
/// offset already points at the same place and is left alone. A relative
/// binder still needs its owner to resolve for the bound shape to be placed
/// at all; absolute binders and binders targeting other bodies pass.
pub fn rebase_for_body_placement_change(
    graph: &FeatureGraph,
    binder: BinderId,
    target_body: BodyId,
) -> Result<(), ResolveError> {
    let resolver = ReferenceResolver::new(graph);
    let relative = graph.binder(binder).offset.is_relative();
    if relative && resolver.target_body(binder)? == target_body {
        resolver.owner_feature(binder)?;
    }
    Ok(())
}

/// Rebase an outbound binder in place. Returns whether the offset changed.
pub fn rebase_for_owner_placement_change(
    graph: &mut FeatureGraph,
    binder: BinderId,
    owner_body: BodyId,
    old: &Placement,
    new: &Placement,
) -> Result<bool, ResolveError> {
    match rebased_for_owner_change(graph, binder, owner_body, old, new)? {
        Some(s) => {
            graph.set_binder_offset(binder, s);
            Ok(true)
        }
        None => Ok(false),
    }
}
