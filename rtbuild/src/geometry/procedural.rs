use super::{GeometryAdapter, PrimitivePayload, ProceduralPrimitive};
use crate::desc::{GeometryKind, ProceduralGeometryDesc};
use crate::math::Aabb;
use std::any::Any;

pub struct ProceduralAdapter<'a> {
    geom: &'a ProceduralGeometryDesc,
}

impl<'a> ProceduralAdapter<'a> {
    pub fn new(geom: &'a ProceduralGeometryDesc) -> Self {
        Self { geom }
    }
}

impl GeometryAdapter for ProceduralAdapter<'_> {
    fn kind(&self) -> GeometryKind {
        GeometryKind::Procedural
    }

    fn primitive_count(&self) -> u32 {
        self.geom.prim_count
    }

    fn compute_bounds(
        &self,
        prim_id: u32,
        user_data: Option<&(dyn Any + Send + Sync)>,
    ) -> Option<Aabb> {
        if prim_id >= self.geom.prim_count {
            return None;
        }
        let bounds_fn = self.geom.bounds_fn.as_ref()?;
        let bounds = bounds_fn(prim_id, user_data);
        (bounds.is_finite() && !bounds.is_empty()).then_some(bounds)
    }

    fn extract_primitive(&self, prim_id: u32) -> Option<PrimitivePayload> {
        // geometry flags are not forwarded for procedurals
        (prim_id < self.geom.prim_count).then_some(PrimitivePayload::Procedural(
            ProceduralPrimitive {
                geometry_mask: self.geom.geometry_mask,
            },
        ))
    }
}
