//! Persisted document format for bodyplace.
//!
//! This crate defines the serialized form of a body-centric feature tree:
//! assembly parts, bodies with their ordered feature chains, and cross-body
//! binders. It is what the persistence layer loads and saves.
//!
//! The format is purely declarative: no shapes, only placements,
//! parameters and references by name. The in-memory graph used during
//! migration is built from it by the `bodyplace` crate.

use serde::{Deserialize, Serialize};

/// Current document format version.
pub const FORMAT_VERSION: &str = "0.1";

/// 3D vector with f64 components (conventionally millimeters).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    /// X component.
    pub x: f64,
    /// Y component.
    pub y: f64,
    /// Z component.
    pub z: f64,
}

impl Vec3 {
    /// Create a new Vec3.
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// The zero vector.
    pub fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }
}

/// Rotation quaternion, stored `x, y, z, w`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quat {
    /// X (i) component.
    pub x: f64,
    /// Y (j) component.
    pub y: f64,
    /// Z (k) component.
    pub z: f64,
    /// Scalar component.
    pub w: f64,
}

impl Quat {
    /// The identity rotation.
    pub fn identity() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            z: 0.0,
            w: 1.0,
        }
    }

    /// Rotation about `axis` by `degrees`. A zero axis gives the identity.
    pub fn from_axis_angle_deg(axis: Vec3, degrees: f64) -> Self {
        let len = (axis.x * axis.x + axis.y * axis.y + axis.z * axis.z).sqrt();
        if len == 0.0 {
            return Self::identity();
        }
        let (s, c) = (degrees.to_radians() / 2.0).sin_cos();
        Self {
            x: s * axis.x / len,
            y: s * axis.y / len,
            z: s * axis.z / len,
            w: c,
        }
    }
}

impl Default for Quat {
    fn default() -> Self {
        Self::identity()
    }
}

/// A rigid placement as persisted: rotation then translation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform3D {
    /// Translation vector.
    pub translation: Vec3,
    /// Rotation quaternion.
    #[serde(default)]
    pub rotation: Quat,
}

impl Transform3D {
    /// The identity placement.
    pub fn identity() -> Self {
        Self {
            translation: Vec3::zero(),
            rotation: Quat::identity(),
        }
    }

    /// Placement with both parts given.
    pub fn new(translation: Vec3, rotation: Quat) -> Self {
        Self {
            translation,
            rotation,
        }
    }

    /// Pure translation.
    pub fn translation(x: f64, y: f64, z: f64) -> Self {
        Self::new(Vec3::new(x, y, z), Quat::identity())
    }

    /// Translation plus a rotation about `axis` by `degrees`.
    pub fn axis_angle_deg(translation: Vec3, axis: Vec3, degrees: f64) -> Self {
        Self::new(translation, Quat::from_axis_angle_deg(axis, degrees))
    }

    /// True when this is exactly the identity (no tolerance).
    pub fn is_exact_identity(&self) -> bool {
        *self == Self::identity()
    }
}

impl Default for Transform3D {
    fn default() -> Self {
        Self::identity()
    }
}

/// Parametric operation of a feature.
///
/// Parameters are passed through the migration untouched; only the
/// feature's placement is ever rewritten.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum FeatureOp {
    /// Box added to the body, one corner at the feature origin.
    AdditiveBox {
        /// Extent along X.
        length: f64,
        /// Extent along Y.
        width: f64,
        /// Extent along Z.
        height: f64,
    },
    /// Box removed from the body.
    SubtractiveBox {
        /// Extent along X.
        length: f64,
        /// Extent along Y.
        width: f64,
        /// Extent along Z.
        height: f64,
    },
    /// Cylinder added to the body, base centered at the feature origin, along +Z.
    AdditiveCylinder {
        /// Radius of the cylinder.
        radius: f64,
        /// Height of the cylinder.
        height: f64,
    },
    /// Cylinder removed from the body.
    SubtractiveCylinder {
        /// Radius of the cylinder.
        radius: f64,
        /// Height of the cylinder.
        height: f64,
    },
    /// Sphere added to the body, centered at the feature origin.
    AdditiveSphere {
        /// Radius of the sphere.
        radius: f64,
    },
    /// Reference plane; contributes no solid.
    DatumPlane,
}

impl FeatureOp {
    /// Short operation name used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            FeatureOp::AdditiveBox { .. } => "AdditiveBox",
            FeatureOp::SubtractiveBox { .. } => "SubtractiveBox",
            FeatureOp::AdditiveCylinder { .. } => "AdditiveCylinder",
            FeatureOp::SubtractiveCylinder { .. } => "SubtractiveCylinder",
            FeatureOp::AdditiveSphere { .. } => "AdditiveSphere",
            FeatureOp::DatumPlane => "DatumPlane",
        }
    }
}

/// How a feature's placement is anchored.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode")]
pub enum AttachmentDef {
    /// Placement is expressed in the body frame.
    #[default]
    Free,
    /// Placement is expressed relative to another feature of the same body.
    Attached {
        /// Name of the support feature.
        support: String,
    },
}

/// An assembly container. Parts nest; a body inside a part inherits the
/// composed placement of its part chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartDef {
    /// Unique name.
    pub name: String,
    /// Enclosing part, if any.
    #[serde(default)]
    pub parent: Option<String>,
    /// Placement relative to the parent (or world).
    #[serde(default)]
    pub placement: Transform3D,
}

/// A body: an ordered feature chain under one placement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BodyDef {
    /// Unique name.
    pub name: String,
    /// Enclosing part, if any.
    #[serde(default)]
    pub part: Option<String>,
    /// Body placement relative to its container.
    #[serde(default)]
    pub placement: Transform3D,
    /// Placement of the body's datum origin, in the body frame.
    #[serde(default)]
    pub origin: Transform3D,
    /// Feature names in chain order; the first one is the chain root.
    #[serde(default)]
    pub features: Vec<String>,
    /// Feature whose shape is the body's output.
    #[serde(default)]
    pub tip: Option<String>,
}

/// One parametric step of a body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureDef {
    /// Unique name.
    pub name: String,
    /// The operation and its parameters.
    pub op: FeatureOp,
    /// Local placement, interpreted according to `attachment`.
    #[serde(default)]
    pub placement: Transform3D,
    /// Frame the placement is expressed in.
    #[serde(default)]
    pub attachment: AttachmentDef,
    /// Features whose shapes this one consumes.
    #[serde(default)]
    pub predecessors: Vec<String>,
}

/// A cross-body shape reference as persisted by legacy documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinderDef {
    /// Unique name.
    pub name: String,
    /// Feature that owns the binder.
    pub owner: String,
    /// Feature whose shape is bound.
    pub target: String,
    /// Whether `offset` is expressed in the owner body's frame.
    #[serde(default)]
    pub relative: bool,
    /// Stored offset.
    #[serde(default)]
    pub offset: Transform3D,
}

/// A bodyplace document.
///
/// Vectors keep insertion order, which is the default evaluation order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Format version string (e.g. "0.1").
    pub version: String,
    /// Assembly containers.
    #[serde(default)]
    pub parts: Vec<PartDef>,
    /// Bodies.
    #[serde(default)]
    pub bodies: Vec<BodyDef>,
    /// Features of all bodies.
    #[serde(default)]
    pub features: Vec<FeatureDef>,
    /// Cross-body binders.
    #[serde(default)]
    pub binders: Vec<BinderDef>,
}

impl Default for Document {
    fn default() -> Self {
        Self {
            version: FORMAT_VERSION.to_string(),
            parts: Vec::new(),
            bodies: Vec::new(),
            features: Vec::new(),
            binders: Vec::new(),
        }
    }
}

impl Document {
    /// Create a new empty document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Look up a body by name.
    pub fn body(&self, name: &str) -> Option<&BodyDef> {
        self.bodies.iter().find(|b| b.name == name)
    }

    /// Look up a feature by name.
    pub fn feature(&self, name: &str) -> Option<&FeatureDef> {
        self.features.iter().find(|f| f.name == name)
    }

    /// Look up a binder by name.
    pub fn binder(&self, name: &str) -> Option<&BinderDef> {
        self.binders.iter().find(|b| b.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn legacy_document() -> Document {
        let mut doc = Document::new();
        doc.parts.push(PartDef {
            name: "MainPart".to_string(),
            parent: None,
            placement: Transform3D::axis_angle_deg(
                Vec3::new(10.0, 20.0, 0.0),
                Vec3::new(0.0, 0.0, 1.0),
                12.0,
            ),
        });
        doc.bodies.push(BodyDef {
            name: "B1".to_string(),
            part: Some("MainPart".to_string()),
            placement: Transform3D::axis_angle_deg(
                Vec3::new(80.0, 0.0, 0.0),
                Vec3::new(0.0, 0.0, 1.0),
                45.0,
            ),
            origin: Transform3D::identity(),
            features: vec!["Box1".to_string()],
            tip: Some("Box1".to_string()),
        });
        doc.features.push(FeatureDef {
            name: "Box1".to_string(),
            op: FeatureOp::AdditiveBox {
                length: 20.0,
                width: 12.0,
                height: 8.0,
            },
            placement: Transform3D::identity(),
            attachment: AttachmentDef::Free,
            predecessors: Vec::new(),
        });
        doc.binders.push(BinderDef {
            name: "Ref".to_string(),
            owner: "Box1".to_string(),
            target: "Box1".to_string(),
            relative: true,
            offset: Transform3D::translation(1.0, 2.0, 3.0),
        });
        doc
    }

    #[test]
    fn roundtrip_document() {
        let doc = legacy_document();
        let json = doc.to_json().expect("serialize");
        let restored = Document::from_json(&json).expect("deserialize");
        assert_eq!(doc, restored);
        assert_eq!(restored.bodies.len(), 1);
        assert_eq!(restored.features.len(), 1);
        assert_eq!(restored.binders.len(), 1);
    }

    #[test]
    fn empty_document() {
        let doc = Document::new();
        assert_eq!(doc.version, FORMAT_VERSION);
        assert!(doc.parts.is_empty());
        assert!(doc.bodies.is_empty());
        assert!(doc.features.is_empty());
        assert!(doc.binders.is_empty());
    }

    #[test]
    fn serde_tagged_enums() {
        let op = FeatureOp::AdditiveCylinder {
            radius: 6.0,
            height: 15.0,
        };
        let json = serde_json::to_string(&op).unwrap();
        assert!(json.contains(r#""type":"AdditiveCylinder""#));
        let restored: FeatureOp = serde_json::from_str(&json).unwrap();
        assert_eq!(op, restored);

        let att = AttachmentDef::Attached {
            support: "Pad".to_string(),
        };
        let json = serde_json::to_string(&att).unwrap();
        assert!(json.contains(r#""mode":"Attached""#));
    }

    #[test]
    fn missing_fields_take_defaults() {
        let json = r#"{
            "version": "0.1",
            "bodies": [{ "name": "Body" }],
            "features": [{ "name": "Plane", "op": { "type": "DatumPlane" } }]
        }"#;
        let doc = Document::from_json(json).unwrap();
        let body = doc.body("Body").unwrap();
        assert!(body.placement.is_exact_identity());
        assert!(body.features.is_empty());
        assert!(body.tip.is_none());
        let plane = doc.feature("Plane").unwrap();
        assert_eq!(plane.attachment, AttachmentDef::Free);
        assert!(plane.predecessors.is_empty());
        assert!(doc.binders.is_empty());
    }

    #[test]
    fn axis_angle_quaternion() {
        let q = Quat::from_axis_angle_deg(Vec3::new(0.0, 0.0, 2.0), 180.0);
        assert!(q.x.abs() < 1e-12 && q.y.abs() < 1e-12);
        assert!((q.z - 1.0).abs() < 1e-12);
        assert!(q.w.abs() < 1e-12);
        assert_eq!(
            Quat::from_axis_angle_deg(Vec3::zero(), 30.0),
            Quat::identity()
        );
    }
}
