use super::{GeometryAdapter, PrimitivePayload, QuadPrimitive, read_vertex};
use crate::desc::{GeometryKind, QuadsGeometryDesc};
use crate::math::{Aabb, Vec3};
use std::any::Any;

pub struct QuadsAdapter<'a> {
    geom: &'a QuadsGeometryDesc,
}

impl<'a> QuadsAdapter<'a> {
    pub fn new(geom: &'a QuadsGeometryDesc) -> Self {
        Self { geom }
    }

    fn resolve(&self, prim_id: u32) -> Option<([u32; 4], [Vec3; 4])> {
        if prim_id >= self.geom.quad_count {
            return None;
        }
        let indices = self.geom.quads.as_ref()?.read::<[u32; 4]>(prim_id)?;
        let vertex = |v| read_vertex(self.geom.vertices.as_ref(), self.geom.vertex_count, v);
        let positions = [
            vertex(indices[0])?,
            vertex(indices[1])?,
            vertex(indices[2])?,
            vertex(indices[3])?,
        ];
        Some((indices, positions))
    }
}

impl GeometryAdapter for QuadsAdapter<'_> {
    fn kind(&self) -> GeometryKind {
        GeometryKind::Quads
    }

    fn primitive_count(&self) -> u32 {
        self.geom.quad_count
    }

    fn compute_bounds(
        &self,
        prim_id: u32,
        _user_data: Option<&(dyn Any + Send + Sync)>,
    ) -> Option<Aabb> {
        let (_, positions) = self.resolve(prim_id)?;
        Some(Aabb::from_points(&positions))
    }

    fn extract_primitive(&self, prim_id: u32) -> Option<PrimitivePayload> {
        let (indices, positions) = self.resolve(prim_id)?;
        Some(PrimitivePayload::Quad(QuadPrimitive {
            indices,
            positions,
            geometry_flags: self.geom.geometry_flags,
            geometry_mask: self.geom.geometry_mask,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quad_bounds_and_skips() {
        let vertices = [
            [0.0, 0.0, 0.0],
            [2.0, 0.0, 0.0],
            [2.0, 3.0, 0.0],
            [0.0, 3.0, 1.0],
            [f32::NAN, 0.0, 0.0],
        ];
        let geom = QuadsGeometryDesc::new(&[[0, 1, 2, 3], [0, 1, 2, 4], [0, 1, 2, 5]], &vertices);
        let adapter = QuadsAdapter::new(&geom);

        let bounds = adapter.compute_bounds(0, None).unwrap();
        assert_eq!(bounds.upper, Vec3::new(2.0, 3.0, 1.0));
        // NaN position
        assert!(adapter.compute_bounds(1, None).is_none());
        // index past vertex count
        assert!(adapter.compute_bounds(2, None).is_none());
        assert_eq!(adapter.kind(), GeometryKind::Quads);
    }

    #[test]
    fn test_missing_vertex_buffer() {
        let mut geom = QuadsGeometryDesc::new(&[[0, 1, 2, 3]], &[[0.0; 3]; 4]);
        geom.vertices = None;
        let adapter = QuadsAdapter::new(&geom);
        assert!(adapter.compute_bounds(0, None).is_none());
        assert!(adapter.extract_primitive(0).is_none());
    }
}
