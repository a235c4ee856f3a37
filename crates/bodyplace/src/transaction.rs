//! Placement snapshots and rollback.
//!
//! A migration only ever writes placement slots, so restoring the slots it
//! touched restores the document.

use crate::graph::{FeatureGraph, PlacementKey};
use bodyplace_math::Placement;
use std::collections::BTreeMap;

/// Saved values of a set of placement slots.
#[derive(Debug, Clone, Default)]
pub struct PlacementState {
    saved: BTreeMap<PlacementKey, Placement>,
}

impl PlacementState {
    /// Snapshot the given slots.
    pub fn capture(graph: &FeatureGraph, keys: impl IntoIterator<Item = PlacementKey>) -> Self {
        Self {
            saved: keys
                .into_iter()
                .map(|k| (k, graph.placement(k)))
                .collect(),
        }
    }

    /// Snapshot every slot of the graph.
    pub fn capture_all(graph: &FeatureGraph) -> Self {
        Self::capture(graph, graph.placement_keys())
    }

    /// Number of saved slots.
    pub fn len(&self) -> usize {
        self.saved.len()
    }

    /// True when nothing was saved.
    pub fn is_empty(&self) -> bool {
        self.saved.is_empty()
    }

    /// Saved value of a slot.
    pub fn get(&self, key: PlacementKey) -> Option<Placement> {
        self.saved.get(&key).copied()
    }

    /// Slots whose current value differs from the saved one.
    pub fn changed_keys(&self, graph: &FeatureGraph) -> Vec<PlacementKey> {
        self.saved
            .iter()
            .filter(|(k, p)| graph.placement(**k) != **p)
            .map(|(k, _)| *k)
            .collect()
    }

    /// Write every saved value back.
    pub fn restore(&self, graph: &mut FeatureGraph) {
        for (key, p) in &self.saved {
            graph.set_placement(*key, *p);
        }
    }
}

/// Undo log for one body's transition.
///
/// Each slot is saved the first time it is written through the transaction;
/// [`rollback`](Self::rollback) restores exactly those slots.
#[derive(Debug, Default)]
pub struct BodyTransaction {
    state: PlacementState,
}

impl BodyTransaction {
    /// Start an empty transaction.
    pub fn new() -> Self {
        Self::default()
    }

    /// Write a slot, saving its previous value first.
    pub fn set(&mut self, graph: &mut FeatureGraph, key: PlacementKey, p: Placement) {
        self.state
            .saved
            .entry(key)
            .or_insert_with(|| graph.placement(key));
        graph.set_placement(key, p);
    }

    /// Slots written so far.
    pub fn touched(&self) -> impl Iterator<Item = PlacementKey> + '_ {
        self.state.saved.keys().copied()
    }

    /// Restore every written slot.
    pub fn rollback(self, graph: &mut FeatureGraph) {
        self.state.restore(graph);
    }

    /// Keep the writes.
    pub fn commit(self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::BinderOffset;
    use crate::graph::Reference;
    use bodyplace_ir::FeatureOp;

    fn graph() -> FeatureGraph {
        let mut g = FeatureGraph::new();
        let b = g
            .add_body("Body", None, Placement::from_translation(1.0, 2.0, 3.0))
            .unwrap();
        let f = g
            .add_feature(b, "Pad", FeatureOp::DatumPlane, Placement::identity())
            .unwrap();
        g.add_binder(
            "Ref",
            Reference::Resolved(f),
            Reference::Resolved(f),
            BinderOffset::Relative(Placement::rotation_x(0.3)),
        )
        .unwrap();
        g
    }

    #[test]
    fn state_restores_all_slots() {
        let mut g = graph();
        let state = PlacementState::capture_all(&g);
        assert_eq!(state.len(), 4);
        let body = g.body_by_name("Body").unwrap();
        let binder = g.binder_by_name("Ref").unwrap();
        g.set_body_placement(body, Placement::identity());
        g.set_binder_offset(binder, Placement::identity());
        assert_eq!(
            state.changed_keys(&g),
            vec![PlacementKey::Body(body), PlacementKey::Binder(binder)]
        );
        state.restore(&mut g);
        assert!(state.changed_keys(&g).is_empty());
        assert!(g.binder(binder).offset.is_relative());
    }

    #[test]
    fn transaction_keeps_first_value() {
        let mut g = graph();
        let body = g.body_by_name("Body").unwrap();
        let key = PlacementKey::Body(body);
        let original = g.placement(key);

        let mut tx = BodyTransaction::new();
        tx.set(&mut g, key, Placement::rotation_z(1.0));
        tx.set(&mut g, key, Placement::identity());
        assert_eq!(tx.touched().collect::<Vec<_>>(), vec![key]);
        tx.rollback(&mut g);
        assert_eq!(g.placement(key), original);
    }
}
