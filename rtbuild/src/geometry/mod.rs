//! Uniform per-kind access to build geometry.
//!
//! The build pipeline never matches on geometry kinds itself: each geometry is
//! turned into a [`GeometryAdapter`] once, and bounds computation and primitive
//! extraction go through that interface. All kind-specific defensive checks
//! live in the adapter for that kind.
//!
//! # Example
//!
//! ```
//! use rtbuild::desc::{GeometryDesc, TrianglesGeometryDesc};
//! use rtbuild::geometry::adapter_for;
//!
//! let geom: GeometryDesc = TrianglesGeometryDesc::new(
//!     &[[0, 1, 2], [0, 2, 9]],
//!     &[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
//! )
//! .into();
//! let adapter = adapter_for(&geom)?;
//!
//! assert_eq!(adapter.primitive_count(), 2);
//! assert!(adapter.compute_bounds(0, None).is_some());
//! // vertex index 9 is out of range, so the second triangle is skipped
//! assert!(adapter.compute_bounds(1, None).is_none());
//! # Ok::<(), rtbuild::RtasError>(())
//! ```

mod instance;
mod procedural;
mod quads;
mod triangles;

pub use instance::{InstanceAdapter, TransformEncoding};
pub use procedural::ProceduralAdapter;
pub use quads::QuadsAdapter;
pub use triangles::TrianglesAdapter;

use crate::desc::{GeometryDesc, GeometryFlags, GeometryKind, InstanceFlags, RtasAddress};
use crate::error::Result;
use crate::math::{Aabb, Affine3A, Vec3};
use std::any::Any;

/// Resolved data of one triangle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrianglePrimitive {
    pub indices: [u32; 3],
    pub positions: [Vec3; 3],
    pub geometry_flags: GeometryFlags,
    pub geometry_mask: u8,
}

/// Resolved data of one quad.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuadPrimitive {
    pub indices: [u32; 4],
    pub positions: [Vec3; 4],
    pub geometry_flags: GeometryFlags,
    pub geometry_mask: u8,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProceduralPrimitive {
    pub geometry_mask: u8,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InstancePrimitive {
    pub local_to_world: Affine3A,
    pub acceleration_structure: RtasAddress,
    pub geometry_mask: u8,
    pub instance_user_id: u32,
    pub instance_flags: InstanceFlags,
}

/// Kind-specific payload handed to the spatial builder engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PrimitivePayload {
    Triangle(TrianglePrimitive),
    Quad(QuadPrimitive),
    Procedural(ProceduralPrimitive),
    Instance(InstancePrimitive),
}

/// Per-kind operations over one geometry.
pub trait GeometryAdapter: Send + Sync {
    fn kind(&self) -> GeometryKind;

    /// Declared number of primitives.
    fn primitive_count(&self) -> u32;

    /// Bounds of primitive `prim_id`, or `None` when the primitive is out of
    /// range or its data is unusable (bad indices, non-finite or empty bounds).
    fn compute_bounds(&self, prim_id: u32, user_data: Option<&(dyn Any + Send + Sync)>)
    -> Option<Aabb>;

    /// Payload of primitive `prim_id`; `None` under the same conditions that
    /// make `compute_bounds` fail for mesh data.
    fn extract_primitive(&self, prim_id: u32) -> Option<PrimitivePayload>;
}

/// Creates the adapter for one validated geometry.
pub fn adapter_for(geom: &GeometryDesc) -> Result<Box<dyn GeometryAdapter + '_>> {
    Ok(match geom {
        GeometryDesc::Triangles(g) => Box::new(TrianglesAdapter::new(g)),
        GeometryDesc::Quads(g) => Box::new(QuadsAdapter::new(g)),
        GeometryDesc::Procedural(g) => Box::new(ProceduralAdapter::new(g)),
        GeometryDesc::Instance(g) => Box::new(InstanceAdapter::new(g)?),
    })
}

/// Reads a vertex position, rejecting out-of-range indices and non-finite data.
pub(crate) fn read_vertex(
    vertices: Option<&crate::desc::BufferView>,
    vertex_count: u32,
    vertex_id: u32,
) -> Option<Vec3> {
    if vertex_id >= vertex_count {
        return None;
    }
    let p = Vec3::from_array(vertices?.read::<[f32; 3]>(vertex_id)?);
    p.is_finite().then_some(p)
}
