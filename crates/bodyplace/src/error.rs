//! Error types for the migration core.

use std::fmt;
use thiserror::Error;

/// A cycle that makes the document impossible to migrate safely.
///
/// Detected before any mutation; fatal for the whole pass.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StructuralError {
    /// Predecessor chain of a body loops back on itself.
    #[error("cyclic predecessor chain in body {body}: {}", .cycle.join(" -> "))]
    CyclicChain {
        /// Body name.
        body: String,
        /// Feature names along the cycle.
        cycle: Vec<String>,
    },
    /// Attachment supports of a body loop back on themselves.
    #[error("cyclic attachment in body {body}: {}", .cycle.join(" -> "))]
    CyclicAttachment {
        /// Body name.
        body: String,
        /// Feature names along the cycle.
        cycle: Vec<String>,
    },
    /// Cross-body binders reference each other in a loop.
    #[error("cyclic binder references between bodies: {}", .cycle.join(" -> "))]
    CyclicBinders {
        /// Body names along the cycle.
        cycle: Vec<String>,
    },
}

/// Errors building or querying the feature graph.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    /// No body with this name.
    #[error("body not found: {0}")]
    BodyNotFound(String),
    /// No feature with this name.
    #[error("feature not found: {0}")]
    FeatureNotFound(String),
    /// No binder with this name.
    #[error("binder not found: {0}")]
    BinderNotFound(String),
    /// No part with this name.
    #[error("part not found: {0}")]
    PartNotFound(String),
    /// Two objects share a name.
    #[error("duplicate object name: {0}")]
    DuplicateName(String),
    /// A feature is not listed in any body.
    #[error("feature {0} does not belong to any body")]
    OrphanFeature(String),
    /// A feature is listed in more than one body.
    #[error("feature {feature} is listed in both {first} and {second}")]
    FeatureInMultipleBodies {
        /// Feature name.
        feature: String,
        /// Body that listed it first.
        first: String,
        /// Body that listed it again.
        second: String,
    },
    /// A predecessor or attachment support lives in another body.
    #[error("feature {feature} links to {other}, which is outside its body")]
    CrossBodyLink {
        /// Feature name.
        feature: String,
        /// Linked feature name.
        other: String,
    },
    /// A body's tip is not one of its features.
    #[error("tip {tip} of body {body} is not in that body")]
    TipNotInBody {
        /// Body name.
        body: String,
        /// Tip feature name.
        tip: String,
    },
    /// A persisted rotation cannot be normalized.
    #[error("invalid placement on {0}")]
    InvalidPlacement(String),
    /// Parts contain each other in a loop.
    #[error("cyclic part containment: {}", .0.join(" -> "))]
    CyclicContainer(Vec<String>),
    /// A cycle in the feature or binder structure.
    #[error(transparent)]
    Structural(#[from] StructuralError),
}

/// Which end of a binder failed to resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceRole {
    /// The feature owning the binder.
    Owner,
    /// The feature whose shape is bound.
    Target,
}

impl fmt::Display for ReferenceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReferenceRole::Owner => f.write_str("owner"),
            ReferenceRole::Target => f.write_str("target"),
        }
    }
}

/// Errors resolving a binder.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResolveError {
    /// One end of the binder names a feature that does not exist.
    #[error("binder {binder}: {role} {reference} not found")]
    Unresolved {
        /// Binder name.
        binder: String,
        /// Which end is missing.
        role: ReferenceRole,
        /// The dangling feature name.
        reference: String,
    },
    /// Graph query failed while resolving.
    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// Errors loading a migration configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    /// The file is not valid TOML for this schema.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    /// A value is out of range.
    #[error("invalid config value for {key}: {message}")]
    Invalid {
        /// Offending key.
        key: &'static str,
        /// What is wrong with it.
        message: String,
    },
}

/// Errors of a migration pass.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MigrationError {
    /// Cyclic structure; nothing was changed.
    #[error(transparent)]
    Structural(#[from] StructuralError),
    /// The document does not form a valid graph.
    #[error(transparent)]
    Graph(#[from] GraphError),
    /// A binder of this body cannot be resolved; the body was rolled back.
    #[error("body {body}: binder {binder} references missing {reference}")]
    UnresolvedReference {
        /// Body whose transition failed.
        body: String,
        /// Binder that failed to resolve.
        binder: String,
        /// The dangling feature name.
        reference: String,
    },
    /// The kernel rejected the migrated geometry; the pass was rolled back.
    #[error("recompute failed for feature {feature} in body {body}: {diagnostic}")]
    RecomputeFailure {
        /// Feature the kernel rejected.
        feature: String,
        /// Its body.
        body: String,
        /// Kernel diagnostic, verbatim.
        diagnostic: String,
    },
    /// World geometry moved; the pass was rolled back.
    #[error("{object} moved by {deviation:e} (tolerance {tolerance:e})")]
    GeometryDrift {
        /// Body or binder whose bounds changed.
        object: String,
        /// Largest bound difference.
        deviation: f64,
        /// Allowed difference.
        tolerance: f64,
    },
}

impl MigrationError {
    /// Attach the failing body to a resolver error.
    pub(crate) fn from_resolve(body: &str, err: ResolveError) -> Self {
        match err {
            ResolveError::Unresolved {
                binder, reference, ..
            } => MigrationError::UnresolvedReference {
                body: body.to_string(),
                binder,
                reference,
            },
            ResolveError::Graph(e) => MigrationError::Graph(e),
        }
    }

    /// Name of the binder involved, if any.
    pub fn binder(&self) -> Option<&str> {
        match self {
            MigrationError::UnresolvedReference { binder, .. } => Some(binder),
            _ => None,
        }
    }
}

/// Result type for migration operations.
pub type Result<T> = std::result::Result<T, MigrationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structural_messages_show_cycle() {
        let err = StructuralError::CyclicBinders {
            cycle: vec!["B1".into(), "B2".into(), "B1".into()],
        };
        assert_eq!(
            err.to_string(),
            "cyclic binder references between bodies: B1 -> B2 -> B1"
        );
    }

    #[test]
    fn resolve_error_maps_to_body_failure() {
        let err = ResolveError::Unresolved {
            binder: "Ref".into(),
            role: ReferenceRole::Target,
            reference: "Gone".into(),
        };
        assert_eq!(err.to_string(), "binder Ref: target Gone not found");
        let mig = MigrationError::from_resolve("B1", err);
        assert_eq!(mig.binder(), Some("Ref"));
        assert_eq!(
            mig.to_string(),
            "body B1: binder Ref references missing Gone"
        );
    }
}
