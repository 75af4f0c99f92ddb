use super::{GeometryAdapter, PrimitivePayload, TrianglePrimitive, read_vertex};
use crate::desc::{GeometryKind, TrianglesGeometryDesc};
use crate::math::{Aabb, Vec3};
use std::any::Any;

pub struct TrianglesAdapter<'a> {
    geom: &'a TrianglesGeometryDesc,
}

impl<'a> TrianglesAdapter<'a> {
    pub fn new(geom: &'a TrianglesGeometryDesc) -> Self {
        Self { geom }
    }

    fn resolve(&self, prim_id: u32) -> Option<([u32; 3], [Vec3; 3])> {
        if prim_id >= self.geom.triangle_count {
            return None;
        }
        let indices = self.geom.triangles.as_ref()?.read::<[u32; 3]>(prim_id)?;
        let vertex = |v| read_vertex(self.geom.vertices.as_ref(), self.geom.vertex_count, v);
        let positions = [vertex(indices[0])?, vertex(indices[1])?, vertex(indices[2])?];
        Some((indices, positions))
    }
}

impl GeometryAdapter for TrianglesAdapter<'_> {
    fn kind(&self) -> GeometryKind {
        GeometryKind::Triangles
    }

    fn primitive_count(&self) -> u32 {
        self.geom.triangle_count
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
        Some(PrimitivePayload::Triangle(TrianglePrimitive {
            indices,
            positions,
            geometry_flags: self.geom.geometry_flags,
            geometry_mask: self.geom.geometry_mask,
        }))
    }
}
