//! Buffer-size estimation.
//!
//! Estimation reads only declared counts and kinds. Buffers are never
//! dereferenced, so it works for geometries whose data is not yet populated.

use crate::desc::{BuildOpDesc, GeometryDesc, GeometryKind};
use crate::engine::{GeometryCounts, SizeEstimate, SpatialBuilderEngine};

/// Counts and kinds of a descriptor list, straight from the descriptors.
///
/// Absent geometries report zero primitives and no kind. Descriptors are not
/// validated here; a build of the same list may still fail validation.
pub struct DescriptorCounts<'a> {
    geometries: &'a [Option<GeometryDesc>],
}

impl<'a> DescriptorCounts<'a> {
    pub fn new(geometries: &'a [Option<GeometryDesc>]) -> Self {
        Self { geometries }
    }

    fn geometry(&self, geom_id: u32) -> Option<&GeometryDesc> {
        self.geometries.get(geom_id as usize)?.as_ref()
    }
}

impl GeometryCounts for DescriptorCounts<'_> {
    fn geometry_count(&self) -> usize {
        self.geometries.len()
    }

    fn primitive_count(&self, geom_id: u32) -> u32 {
        self.geometry(geom_id).map_or(0, GeometryDesc::primitive_count)
    }

    fn geometry_kind(&self, geom_id: u32) -> Option<GeometryKind> {
        self.geometry(geom_id).map(GeometryDesc::kind)
    }
}

/// Asks `engine` how large a build of `op` can get.
pub fn estimate_build_size(engine: &dyn SpatialBuilderEngine, op: &BuildOpDesc) -> SizeEstimate {
    let counts = DescriptorCounts::new(&op.geometries);
    let estimate = engine.estimate_size(&counts, op.build_quality, op.build_flags);
    log::debug!(
        "estimated {} geometries: expected {} bytes, worst case {} bytes, scratch {} bytes",
        op.geometry_count(),
        estimate.expected_bytes,
        estimate.worst_case_bytes,
        estimate.scratch_bytes
    );
    estimate
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::desc::{BuildQuality, TrianglesGeometryDesc};
    use crate::engine::ReferenceEngine;

    fn unpopulated_triangles(count: u32) -> GeometryDesc {
        let mut geom = TrianglesGeometryDesc::new(&[], &[]);
        geom.triangle_count = count;
        geom.vertex_count = 3 * count;
        geom.triangles = None;
        geom.vertices = None;
        geom.into()
    }

    #[test]
    fn test_counts_without_buffers() {
        let geometries = vec![Some(unpopulated_triangles(7)), None];
        let counts = DescriptorCounts::new(&geometries);
        assert_eq!(counts.geometry_count(), 2);
        assert_eq!(counts.primitive_count(0), 7);
        assert_eq!(counts.primitive_count(1), 0);
        assert_eq!(counts.geometry_kind(1), None);
        assert_eq!(counts.primitive_count(9), 0);
    }

    #[test]
    fn test_quality_monotonic() {
        let op = BuildOpDesc::new(vec![Some(unpopulated_triangles(100))]);
        let engine = ReferenceEngine::new();
        let low = estimate_build_size(&engine, &op.clone().build_quality(BuildQuality::LOW));
        let medium = estimate_build_size(&engine, &op.clone().build_quality(BuildQuality::MEDIUM));
        let high = estimate_build_size(&engine, &op.build_quality(BuildQuality::HIGH));

        assert!(low.expected_bytes > 0);
        assert!(medium.worst_case_bytes >= low.worst_case_bytes);
        assert!(high.worst_case_bytes >= medium.worst_case_bytes);
        assert!(high.worst_case_bytes >= high.expected_bytes);
    }
}
