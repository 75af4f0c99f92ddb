//! The spatial builder engine seam.
//!
//! The engine owns the hierarchy algorithm and the output encoding. It sees the
//! scene only through [`GeometryCounts`] when sizing and through [`BuildInput`]
//! when building, so it never matches on geometry descriptors itself.
//!
//! # Example
//!
//! ```
//! use rtbuild::desc::{BuildOpFlags, BuildQuality, GeometryKind};
//! use rtbuild::engine::{GeometryCounts, ReferenceEngine, SpatialBuilderEngine};
//!
//! struct TwoTriangles;
//!
//! impl GeometryCounts for TwoTriangles {
//!     fn geometry_count(&self) -> usize {
//!         1
//!     }
//!     fn primitive_count(&self, _geom_id: u32) -> u32 {
//!         2
//!     }
//!     fn geometry_kind(&self, _geom_id: u32) -> Option<GeometryKind> {
//!         Some(GeometryKind::Triangles)
//!     }
//! }
//!
//! let estimate = ReferenceEngine::new().estimate_size(
//!     &TwoTriangles,
//!     BuildQuality::MEDIUM,
//!     BuildOpFlags::empty(),
//! );
//! assert!(estimate.worst_case_bytes >= estimate.expected_bytes);
//! ```

mod reference;

pub use reference::ReferenceEngine;

use crate::desc::{BuildOpFlags, BuildQuality, GeometryKind};
use crate::geometry::PrimitivePayload;
use crate::math::Aabb;
use crate::primref::{PrimInfo, PrimRef};
use std::ops::Range;

/// Per-geometry counts and kinds, readable without touching any buffer.
pub trait GeometryCounts {
    fn geometry_count(&self) -> usize;

    /// Declared primitive count; absent geometries report 0.
    fn primitive_count(&self, geom_id: u32) -> u32;

    /// Kind of geometry `geom_id`, `None` if absent.
    fn geometry_kind(&self, geom_id: u32) -> Option<GeometryKind>;
}

/// Everything an engine needs to build from a validated scene.
pub trait BuildInput: GeometryCounts + Sync {
    /// Writes references for `range` of geometry `geom_id` into `out`, skipping
    /// primitives without usable bounds. See
    /// [`create_geometry_prim_refs`](crate::primref::create_geometry_prim_refs).
    fn create_prim_refs(&self, geom_id: u32, range: Range<u32>, out: &mut [PrimRef]) -> PrimInfo;

    /// Kind-specific payload of one primitive.
    fn primitive(&self, geom_id: u32, prim_id: u32) -> Option<PrimitivePayload>;
}

/// Buffer sizes a build needs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SizeEstimate {
    /// Typical-case output size
    pub expected_bytes: usize,
    /// Upper bound of every legal output for the same quality and flags
    pub worst_case_bytes: usize,
    /// Temporary workspace required during the build
    pub scratch_bytes: usize,
}

/// What a successful engine build reports back.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineOutput {
    pub bounds: Aabb,
    pub bytes_used: usize,
    /// Number of primitives that made it into the structure.
    pub primitive_count: usize,
}

/// Builds acceleration structures into caller memory.
///
/// `build` returns `None` when the structure does not fit into `rtas` or the
/// engine runs out of `scratch`.
pub trait SpatialBuilderEngine: Send + Sync {
    fn estimate_size(
        &self,
        input: &dyn GeometryCounts,
        quality: BuildQuality,
        flags: BuildOpFlags,
    ) -> SizeEstimate;

    fn build(
        &self,
        input: &dyn BuildInput,
        rtas: &mut [u8],
        scratch: &mut [u8],
        quality: BuildQuality,
        flags: BuildOpFlags,
    ) -> Option<EngineOutput>;
}
