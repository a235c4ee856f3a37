//! Outcome of a migration pass.

use bodyplace_ir::Transform3D;
use serde::Serialize;
use std::fmt;

/// What happened to one legacy body.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BodyStatus {
    /// Placement moved into the body's contents.
    Normalized,
    /// The transition failed and was rolled back.
    Failed {
        /// Error message.
        error: String,
        /// Binder that caused the failure, if any.
        #[serde(skip_serializing_if = "Option::is_none")]
        binder: Option<String>,
    },
    /// Skipped because a body it binds from failed.
    Blocked {
        /// The failed body.
        by: String,
    },
}

/// Per-body entry of a [`MigrationReport`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BodyReport {
    /// Body name.
    pub body: String,
    /// Placement before the pass.
    pub previous: Transform3D,
    /// Placement after the pass.
    pub new: Transform3D,
    /// Feature placements rewritten (chain root and other body-frame features).
    pub baked_features: usize,
    /// Relative binders owned by the body whose offset was rebased.
    pub rebased_binders: usize,
    /// Outcome.
    #[serde(flatten)]
    pub status: BodyStatus,
}

impl BodyReport {
    /// True when the body was normalized.
    pub fn is_normalized(&self) -> bool {
        self.status == BodyStatus::Normalized
    }
}

/// Result of a migration pass, one entry per legacy body.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MigrationReport {
    /// Legacy bodies in processing order.
    pub bodies: Vec<BodyReport>,
    /// Whether bounds were compared after recompute.
    pub validated: bool,
    /// Largest bound deviation measured, when validated.
    pub max_deviation: f64,
}

impl MigrationReport {
    /// True when there was nothing to migrate.
    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }

    /// Bodies that were normalized.
    pub fn changed(&self) -> impl Iterator<Item = &BodyReport> {
        self.bodies.iter().filter(|b| b.is_normalized())
    }

    /// Bodies that failed or were blocked.
    pub fn failures(&self) -> impl Iterator<Item = &BodyReport> {
        self.bodies.iter().filter(|b| !b.is_normalized())
    }

    /// Total binder offsets rewritten.
    pub fn binder_edits(&self) -> usize {
        self.bodies
            .iter()
            .map(|b| b.rebased_binders)
            .sum()
    }
}

fn fmt_transform(t: &Transform3D) -> String {
    let v = t.translation;
    let q = t.rotation;
    format!(
        "({:.6}, {:.6}, {:.6}) q[{:.6}, {:.6}, {:.6}, {:.6}]",
        v.x, v.y, v.z, q.x, q.y, q.z, q.w
    )
}

impl fmt::Display for MigrationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return writeln!(f, "no legacy bodies");
        }
        for b in &self.bodies {
            match &b.status {
                BodyStatus::Normalized => writeln!(
                    f,
                    "{}: normalized from {} ({} features, {} binders rebased)",
                    b.body,
                    fmt_transform(&b.previous),
                    b.baked_features,
                    b.rebased_binders
                )?,
                BodyStatus::Failed { error, .. } => writeln!(f, "{}: FAILED: {}", b.body, error)?,
                BodyStatus::Blocked { by } => {
                    writeln!(f, "{}: blocked by failed body {}", b.body, by)?
                }
            }
        }
        if self.validated {
            writeln!(f, "max bounds deviation: {:e}", self.max_deviation)?;
        }
        Ok(())
    }
}
