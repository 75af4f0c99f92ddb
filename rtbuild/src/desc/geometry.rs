use super::{DataBufferFormat, GeometryFlags, InstanceFlags};
use crate::math::{Aabb, Affine3A};
use bytemuck::Pod;
use std::any::Any;
use std::num::NonZeroU64;
use std::sync::Arc;

/// Opaque value passed through a build to procedural bounds callbacks.
pub type BuildUserData = Arc<dyn Any + Send + Sync>;

/// Reports the bounds of one procedural primitive.
///
/// Receives the primitive index and the build's user data, if any. Returning an
/// empty or non-finite box excludes the primitive from the build.
pub type BoundsCallback = Arc<dyn Fn(u32, Option<&(dyn Any + Send + Sync)>) -> Aabb + Send + Sync>;

/// Shared, strided view over caller-supplied bytes.
///
/// Element `i` starts at byte `i * stride`. Reads past the end of the data
/// yield `None` rather than panicking, so a short buffer degrades to skipped
/// primitives.
#[derive(Clone)]
pub struct BufferView {
    data: Arc<[u8]>,
    stride: usize,
}

impl BufferView {
    pub fn new(data: impl Into<Arc<[u8]>>, stride: usize) -> Self {
        Self {
            data: data.into(),
            stride,
        }
    }

    /// Tightly packed copy of `items`.
    pub fn from_slice<T: Pod>(items: &[T]) -> Self {
        Self::new(
            bytemuck::cast_slice::<T, u8>(items).to_vec(),
            std::mem::size_of::<T>(),
        )
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub(crate) fn read<T: Pod>(&self, index: u32) -> Option<T> {
        let start = (index as usize).checked_mul(self.stride)?;
        let end = start.checked_add(std::mem::size_of::<T>())?;
        self.data.get(start..end).map(bytemuck::pod_read_unaligned)
    }
}

impl std::fmt::Debug for BufferView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferView")
            .field("len_bytes", &self.data.len())
            .field("stride", &self.stride)
            .finish()
    }
}

/// Device address of a previously built acceleration structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RtasAddress(NonZeroU64);

impl RtasAddress {
    pub fn new(address: u64) -> Option<Self> {
        NonZeroU64::new(address).map(Self)
    }

    pub fn get(&self) -> u64 {
        self.0.get()
    }
}

#[derive(Debug, Clone)]
pub struct TrianglesGeometryDesc {
    pub geometry_flags: GeometryFlags,
    pub geometry_mask: u8,
    pub triangle_format: DataBufferFormat,
    pub vertex_format: DataBufferFormat,
    pub triangle_count: u32,
    pub vertex_count: u32,
    pub triangles: Option<BufferView>,
    pub vertices: Option<BufferView>,
    pub reserved: [u32; 3],
}

impl TrianglesGeometryDesc {
    pub fn new(indices: &[[u32; 3]], positions: &[[f32; 3]]) -> Self {
        Self {
            geometry_flags: GeometryFlags::empty(),
            geometry_mask: 0xFF,
            triangle_format: DataBufferFormat::TRIANGLE_INDICES_UINT32,
            vertex_format: DataBufferFormat::FLOAT3,
            triangle_count: indices.len() as u32,
            vertex_count: positions.len() as u32,
            triangles: Some(BufferView::from_slice(indices)),
            vertices: Some(BufferView::from_slice(positions)),
            reserved: [0; 3],
        }
    }
}

#[derive(Debug, Clone)]
pub struct QuadsGeometryDesc {
    pub geometry_flags: GeometryFlags,
    pub geometry_mask: u8,
    pub quad_format: DataBufferFormat,
    pub vertex_format: DataBufferFormat,
    pub quad_count: u32,
    pub vertex_count: u32,
    pub quads: Option<BufferView>,
    pub vertices: Option<BufferView>,
    pub reserved: [u32; 3],
}

impl QuadsGeometryDesc {
    pub fn new(indices: &[[u32; 4]], positions: &[[f32; 3]]) -> Self {
        Self {
            geometry_flags: GeometryFlags::empty(),
            geometry_mask: 0xFF,
            quad_format: DataBufferFormat::QUAD_INDICES_UINT32,
            vertex_format: DataBufferFormat::FLOAT3,
            quad_count: indices.len() as u32,
            vertex_count: positions.len() as u32,
            quads: Some(BufferView::from_slice(indices)),
            vertices: Some(BufferView::from_slice(positions)),
            reserved: [0; 3],
        }
    }
}

#[derive(Clone)]
pub struct ProceduralGeometryDesc {
    pub geometry_flags: GeometryFlags,
    pub geometry_mask: u8,
    pub reserved: u32,
    pub prim_count: u32,
    pub bounds_fn: Option<BoundsCallback>,
}

impl ProceduralGeometryDesc {
    pub fn new<F>(prim_count: u32, bounds_fn: F) -> Self
    where
        F: Fn(u32, Option<&(dyn Any + Send + Sync)>) -> Aabb + Send + Sync + 'static,
    {
        Self {
            geometry_flags: GeometryFlags::empty(),
            geometry_mask: 0xFF,
            reserved: 0,
            prim_count,
            bounds_fn: Some(Arc::new(bounds_fn)),
        }
    }
}

impl std::fmt::Debug for ProceduralGeometryDesc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProceduralGeometryDesc")
            .field("geometry_flags", &self.geometry_flags)
            .field("geometry_mask", &self.geometry_mask)
            .field("reserved", &self.reserved)
            .field("prim_count", &self.prim_count)
            .field("bounds_fn", &self.bounds_fn.is_some())
            .finish()
    }
}

/// One instance of a previously built acceleration structure.
///
/// `transform` holds raw floats laid out as `transform_format` describes;
/// `bounds` are the child structure's object-space bounds.
#[derive(Debug, Clone)]
pub struct InstanceGeometryDesc {
    pub instance_flags: InstanceFlags,
    pub geometry_mask: u8,
    pub transform_format: DataBufferFormat,
    pub instance_user_id: u32,
    pub transform: Option<Arc<[f32]>>,
    pub bounds: Option<Aabb>,
    pub acceleration_structure: Option<RtasAddress>,
}

impl InstanceGeometryDesc {
    /// Instance with a column-major encoded `local_to_world` transform.
    pub fn new(local_to_world: &Affine3A, bounds: Aabb, acceleration_structure: RtasAddress) -> Self {
        let m = local_to_world.matrix3;
        let p = local_to_world.translation;
        let transform: Vec<f32> = vec![
            m.x_axis.x, m.x_axis.y, m.x_axis.z, //
            m.y_axis.x, m.y_axis.y, m.y_axis.z, //
            m.z_axis.x, m.z_axis.y, m.z_axis.z, //
            p.x, p.y, p.z,
        ];
        Self {
            instance_flags: InstanceFlags::empty(),
            geometry_mask: 0xFF,
            transform_format: DataBufferFormat::FLOAT3X4_COLUMN_MAJOR,
            instance_user_id: 0,
            transform: Some(transform.into()),
            bounds: Some(bounds),
            acceleration_structure: Some(acceleration_structure),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeometryKind {
    Triangles,
    Quads,
    Procedural,
    Instance,
}

/// One entry of a build's geometry list.
#[derive(Debug, Clone)]
pub enum GeometryDesc {
    Triangles(TrianglesGeometryDesc),
    Quads(QuadsGeometryDesc),
    Procedural(ProceduralGeometryDesc),
    Instance(InstanceGeometryDesc),
}

impl GeometryDesc {
    pub fn kind(&self) -> GeometryKind {
        match self {
            Self::Triangles(_) => GeometryKind::Triangles,
            Self::Quads(_) => GeometryKind::Quads,
            Self::Procedural(_) => GeometryKind::Procedural,
            Self::Instance(_) => GeometryKind::Instance,
        }
    }

    /// Declared primitive count, read from the descriptor alone without
    /// touching any buffer. Instances always count as one primitive.
    pub fn primitive_count(&self) -> u32 {
        match self {
            Self::Triangles(g) => g.triangle_count,
            Self::Quads(g) => g.quad_count,
            Self::Procedural(g) => g.prim_count,
            Self::Instance(_) => 1,
        }
    }
}

impl From<TrianglesGeometryDesc> for GeometryDesc {
    fn from(desc: TrianglesGeometryDesc) -> Self {
        Self::Triangles(desc)
    }
}

impl From<QuadsGeometryDesc> for GeometryDesc {
    fn from(desc: QuadsGeometryDesc) -> Self {
        Self::Quads(desc)
    }
}

impl From<ProceduralGeometryDesc> for GeometryDesc {
    fn from(desc: ProceduralGeometryDesc) -> Self {
        Self::Procedural(desc)
    }
}

impl From<InstanceGeometryDesc> for GeometryDesc {
    fn from(desc: InstanceGeometryDesc) -> Self {
        Self::Instance(desc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_view_strided_read() {
        let view = BufferView::from_slice(&[[1u32, 2, 3], [4, 5, 6]]);
        assert_eq!(view.stride(), 12);
        assert_eq!(view.read::<[u32; 3]>(1), Some([4, 5, 6]));
        assert_eq!(view.read::<[u32; 3]>(2), None);
    }

    #[test]
    fn test_buffer_view_padded_stride() {
        let mut bytes = Vec::new();
        for v in [[0.0f32, 1.0, 2.0], [3.0, 4.0, 5.0]] {
            bytes.extend_from_slice(bytemuck::cast_slice(&v));
            bytes.extend_from_slice(&[0u8; 4]);
        }
        let view = BufferView::new(bytes, 16);
        assert_eq!(view.read::<[f32; 3]>(1), Some([3.0, 4.0, 5.0]));
    }

    #[test]
    fn test_buffer_view_overflowing_index() {
        let view = BufferView::new(vec![0u8; 8], usize::MAX);
        assert_eq!(view.read::<u32>(2), None);
    }

    #[test]
    fn test_instance_always_one_primitive() {
        let addr = RtasAddress::new(0x1000).unwrap();
        let geom: GeometryDesc =
            InstanceGeometryDesc::new(&Affine3A::IDENTITY, Aabb::EMPTY, addr).into();
        assert_eq!(geom.kind(), GeometryKind::Instance);
        assert_eq!(geom.primitive_count(), 1);
        assert!(RtasAddress::new(0).is_none());
    }
}
