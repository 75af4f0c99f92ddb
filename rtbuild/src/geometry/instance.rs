use super::{GeometryAdapter, InstancePrimitive, PrimitivePayload};
use crate::desc::{DataBufferFormat, GeometryKind, InstanceGeometryDesc, RtasAddress};
use crate::error::{Result, RtasError};
use crate::math::{Aabb, Affine3A, Vec3};
use std::any::Any;

/// Supported memory layouts of a 3x4 instance transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformEncoding {
    /// `vx, vy, vz, p` columns, 12 floats
    ColumnMajor,
    /// `vx, vy, vz, p` columns each padded to 4 floats, 16 floats
    AlignedColumnMajor,
    /// Three rows `[vx_i, vy_i, vz_i, p_i]`, 12 floats
    RowMajor,
}

impl TransformEncoding {
    pub fn from_format(format: DataBufferFormat) -> Option<Self> {
        match format {
            DataBufferFormat::FLOAT3X4_COLUMN_MAJOR => Some(Self::ColumnMajor),
            DataBufferFormat::FLOAT3X4_ALIGNED_COLUMN_MAJOR => Some(Self::AlignedColumnMajor),
            DataBufferFormat::FLOAT3X4_ROW_MAJOR => Some(Self::RowMajor),
            _ => None,
        }
    }

    pub fn float_count(self) -> usize {
        match self {
            Self::ColumnMajor | Self::RowMajor => 12,
            Self::AlignedColumnMajor => 16,
        }
    }

    /// Decodes `data` into an affine transform; `None` if `data` is too short.
    pub fn decode(self, data: &[f32]) -> Option<Affine3A> {
        let d = data.get(..self.float_count())?;
        let col = |x: f32, y: f32, z: f32| Vec3::new(x, y, z);
        let [vx, vy, vz, p] = match self {
            Self::ColumnMajor => [
                col(d[0], d[1], d[2]),
                col(d[3], d[4], d[5]),
                col(d[6], d[7], d[8]),
                col(d[9], d[10], d[11]),
            ],
            Self::AlignedColumnMajor => [
                col(d[0], d[1], d[2]),
                col(d[4], d[5], d[6]),
                col(d[8], d[9], d[10]),
                col(d[12], d[13], d[14]),
            ],
            Self::RowMajor => [
                col(d[0], d[4], d[8]),
                col(d[1], d[5], d[9]),
                col(d[2], d[6], d[10]),
                col(d[3], d[7], d[11]),
            ],
        };
        Some(Affine3A::from_cols(vx.into(), vy.into(), vz.into(), p.into()))
    }
}

/// Adapter for one instance; the transform is decoded once at construction.
pub struct InstanceAdapter<'a> {
    geom: &'a InstanceGeometryDesc,
    local_to_world: Affine3A,
    acceleration_structure: RtasAddress,
    child_bounds: Aabb,
}

impl<'a> InstanceAdapter<'a> {
    /// Decodes the instance transform.
    ///
    /// An unrecognized transform encoding is a structural error of the whole
    /// geometry, not a per-primitive skip.
    pub fn new(geom: &'a InstanceGeometryDesc) -> Result<Self> {
        let encoding = TransformEncoding::from_format(geom.transform_format).ok_or_else(|| {
            RtasError::enumeration(format!(
                "invalid transform format {}",
                geom.transform_format.0
            ))
        })?;
        let transform = geom
            .transform
            .as_deref()
            .ok_or_else(|| RtasError::null_pointer("no instance transformation specified"))?;
        let local_to_world = encoding.decode(transform).ok_or_else(|| {
            RtasError::argument(format!(
                "instance transform holds {} floats, {:?} requires {}",
                transform.len(),
                encoding,
                encoding.float_count()
            ))
        })?;
        let acceleration_structure = geom.acceleration_structure.ok_or_else(|| {
            RtasError::null_pointer("no acceleration structure to instantiate specified")
        })?;
        let child_bounds = geom.bounds.ok_or_else(|| {
            RtasError::null_pointer("no acceleration structure bounds specified")
        })?;

        Ok(Self {
            geom,
            local_to_world,
            acceleration_structure,
            child_bounds,
        })
    }
}

impl GeometryAdapter for InstanceAdapter<'_> {
    fn kind(&self) -> GeometryKind {
        GeometryKind::Instance
    }

    fn primitive_count(&self) -> u32 {
        1
    }

    fn compute_bounds(
        &self,
        prim_id: u32,
        _user_data: Option<&(dyn Any + Send + Sync)>,
    ) -> Option<Aabb> {
        if prim_id >= 1 {
            return None;
        }
        if !self.local_to_world.is_finite()
            || !self.child_bounds.is_finite()
            || self.child_bounds.is_empty()
        {
            return None;
        }
        let world = self.child_bounds.transformed(&self.local_to_world);
        (world.is_finite() && !world.is_empty()).then_some(world)
    }

    fn extract_primitive(&self, prim_id: u32) -> Option<PrimitivePayload> {
        (prim_id < 1).then_some(PrimitivePayload::Instance(InstancePrimitive {
            local_to_world: self.local_to_world,
            acceleration_structure: self.acceleration_structure,
            geometry_mask: self.geom.geometry_mask,
            instance_user_id: self.geom.instance_user_id,
            instance_flags: self.geom.instance_flags,
        }))
    }
}
