//! Caller-facing descriptors and enumerations.
//!
//! Every descriptor starts with a structure-type tag and an optional link to an
//! extension structure. Enumerations are thin `u32` wrappers rather than Rust
//! enums so that out-of-range values supplied by a caller stay representable
//! and can be rejected by the validator instead of being ruled out by
//! construction.

mod geometry;

pub use geometry::{
    BoundsCallback, BufferView, BuildUserData, GeometryDesc, GeometryKind,
    InstanceGeometryDesc, ProceduralGeometryDesc, QuadsGeometryDesc, RtasAddress,
    TrianglesGeometryDesc,
};

use std::sync::{Arc, OnceLock};

/// Maximum number of structures (head included) an extension chain may contain.
///
/// Traversal stops after this many nodes, which also bounds the walk over a
/// cyclic chain.
pub const MAX_CHAIN_LENGTH: usize = 1024;

/// Required byte alignment of the output acceleration-structure buffer.
pub const RTAS_BUFFER_ALIGNMENT: u32 = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StructureType(pub u32);

impl StructureType {
    pub const BUILDER_EXP_DESC: Self = Self(0x0002_0001);
    pub const BUILDER_BUILD_OP_EXP_DESC: Self = Self(0x0002_0002);
    pub const BUILDER_EXP_PROPERTIES: Self = Self(0x0002_0003);
    pub const DEVICE_EXP_PROPERTIES: Self = Self(0x0002_0004);
    pub const PARALLEL_OPERATION_EXP_PROPERTIES: Self = Self(0x0002_0005);
}

/// One link of an extension chain.
///
/// The `next` link can be set once after construction, which is what allows a
/// caller to hand over a malformed (cyclic) chain.
#[derive(Debug)]
pub struct ExtensionDesc {
    pub stype: StructureType,
    next: OnceLock<Arc<ExtensionDesc>>,
}

impl ExtensionDesc {
    pub fn new(stype: StructureType) -> Arc<Self> {
        Arc::new(Self {
            stype,
            next: OnceLock::new(),
        })
    }

    pub fn with_next(stype: StructureType, next: Arc<ExtensionDesc>) -> Arc<Self> {
        let desc = Self::new(stype);
        desc.link(next);
        desc
    }

    /// Sets the `next` link. Returns `false` when it was already set.
    pub fn link(&self, next: Arc<ExtensionDesc>) -> bool {
        self.next.set(next).is_ok()
    }

    pub fn next(&self) -> Option<&Arc<ExtensionDesc>> {
        self.next.get()
    }
}

/// Descriptors that carry a structure type and an extension chain.
pub trait ChainedDesc {
    fn stype(&self) -> StructureType;
    fn next(&self) -> Option<&Arc<ExtensionDesc>>;
}

macro_rules! impl_chained {
    ($($ty:ty),* $(,)?) => {
        $(impl ChainedDesc for $ty {
            fn stype(&self) -> StructureType {
                self.stype
            }

            fn next(&self) -> Option<&Arc<ExtensionDesc>> {
                self.next.as_ref()
            }
        })*
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BuilderVersion(pub u32);

impl BuilderVersion {
    pub const EXP_1_0: Self = Self(1);
    pub const CURRENT: Self = Self::EXP_1_0;
}

/// Acceleration-structure format version reported by a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RtasFormat(pub u32);

impl RtasFormat {
    pub const INVALID: Self = Self(0);
    pub const VERSION_1: Self = Self(1);
    pub const VERSION_2: Self = Self(2);
    pub const MAX: Self = Self::VERSION_2;
}

/// Build-quality hint, ordered `LOW < MEDIUM < HIGH`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BuildQuality(pub u32);

impl BuildQuality {
    pub const LOW: Self = Self(0);
    pub const MEDIUM: Self = Self(1);
    pub const HIGH: Self = Self(2);
}

impl Default for BuildQuality {
    fn default() -> Self {
        Self::MEDIUM
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DataBufferFormat(pub u32);

impl DataBufferFormat {
    pub const FLOAT3: Self = Self(0);
    pub const FLOAT3X4_COLUMN_MAJOR: Self = Self(1);
    pub const FLOAT3X4_ALIGNED_COLUMN_MAJOR: Self = Self(2);
    pub const FLOAT3X4_ROW_MAJOR: Self = Self(3);
    pub const AABB: Self = Self(4);
    pub const TRIANGLE_INDICES_UINT32: Self = Self(5);
    pub const QUAD_INDICES_UINT32: Self = Self(6);
}

bitflags::bitflags! {
    /// Build operation flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct BuildOpFlags: u32 {
        /// Build a more compact structure at the cost of build time
        const COMPACT = 1 << 0;
        /// Guarantee single any-hit invocation per primitive
        const NO_DUPLICATE_ANYHIT_INVOCATION = 1 << 1;
    }
}

bitflags::bitflags! {
    /// Per-geometry flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct GeometryFlags: u8 {
        /// Geometry requires any-hit shader invocation
        const NON_OPAQUE = 1 << 0;
    }
}

bitflags::bitflags! {
    /// Per-instance flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct InstanceFlags: u32 {
        const TRIANGLE_CULL_DISABLE = 1 << 0;
        const TRIANGLE_FRONT_COUNTERCLOCKWISE = 1 << 1;
        const TRIANGLE_FORCE_OPAQUE = 1 << 2;
        const TRIANGLE_FORCE_NON_OPAQUE = 1 << 3;
    }
}

/// Creation parameters of a builder.
#[derive(Debug, Clone)]
pub struct BuilderDesc {
    pub stype: StructureType,
    pub next: Option<Arc<ExtensionDesc>>,
    pub builder_version: BuilderVersion,
}

impl Default for BuilderDesc {
    fn default() -> Self {
        Self {
            stype: StructureType::BUILDER_EXP_DESC,
            next: None,
            builder_version: BuilderVersion::CURRENT,
        }
    }
}

/// Description of one build: the geometry list and how to build it.
///
/// `None` entries in `geometries` are absent geometries and contribute no
/// primitives; their index is still reserved.
#[derive(Debug, Clone)]
pub struct BuildOpDesc {
    pub stype: StructureType,
    pub next: Option<Arc<ExtensionDesc>>,
    pub rtas_format: RtasFormat,
    pub build_quality: BuildQuality,
    pub build_flags: BuildOpFlags,
    pub geometries: Vec<Option<GeometryDesc>>,
}

impl Default for BuildOpDesc {
    fn default() -> Self {
        Self {
            stype: StructureType::BUILDER_BUILD_OP_EXP_DESC,
            next: None,
            rtas_format: RtasFormat::VERSION_1,
            build_quality: BuildQuality::MEDIUM,
            build_flags: BuildOpFlags::empty(),
            geometries: Vec::new(),
        }
    }
}

impl BuildOpDesc {
    pub fn new(geometries: Vec<Option<GeometryDesc>>) -> Self {
        Self {
            geometries,
            ..Default::default()
        }
    }

    pub fn build_quality(mut self, quality: BuildQuality) -> Self {
        self.build_quality = quality;
        self
    }

    pub fn build_flags(mut self, flags: BuildOpFlags) -> Self {
        self.build_flags = flags;
        self
    }

    pub fn rtas_format(mut self, format: RtasFormat) -> Self {
        self.rtas_format = format;
        self
    }

    pub fn geometry_count(&self) -> usize {
        self.geometries.len()
    }
}

/// Buffer sizes required for a build, filled by `get_build_properties`.
#[derive(Debug, Clone)]
pub struct BuilderProperties {
    pub stype: StructureType,
    pub next: Option<Arc<ExtensionDesc>>,
    pub flags: u32,
    pub rtas_buffer_size_bytes_expected: usize,
    pub rtas_buffer_size_bytes_max_required: usize,
    pub scratch_buffer_size_bytes: usize,
}

impl Default for BuilderProperties {
    fn default() -> Self {
        Self {
            stype: StructureType::BUILDER_EXP_PROPERTIES,
            next: None,
            flags: 0,
            rtas_buffer_size_bytes_expected: 0,
            rtas_buffer_size_bytes_max_required: 0,
            scratch_buffer_size_bytes: 0,
        }
    }
}

/// Acceleration-structure capabilities of a device.
#[derive(Debug, Clone)]
pub struct DeviceRtasProperties {
    pub stype: StructureType,
    pub next: Option<Arc<ExtensionDesc>>,
    pub flags: u32,
    pub rtas_format: RtasFormat,
    pub rtas_buffer_alignment: u32,
}

impl Default for DeviceRtasProperties {
    fn default() -> Self {
        Self {
            stype: StructureType::DEVICE_EXP_PROPERTIES,
            next: None,
            flags: 0,
            rtas_format: RtasFormat::INVALID,
            rtas_buffer_alignment: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ParallelOperationProperties {
    pub stype: StructureType,
    pub next: Option<Arc<ExtensionDesc>>,
    pub flags: u32,
    pub max_concurrency: u32,
}

impl Default for ParallelOperationProperties {
    fn default() -> Self {
        Self {
            stype: StructureType::PARALLEL_OPERATION_EXP_PROPERTIES,
            next: None,
            flags: 0,
            max_concurrency: 0,
        }
    }
}

impl_chained!(
    BuilderDesc,
    BuildOpDesc,
    BuilderProperties,
    DeviceRtasProperties,
    ParallelOperationProperties,
);

/// Identity of a device as reported by its driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceDesc {
    pub vendor_id: u32,
    pub device_id: u32,
}

impl DeviceDesc {
    pub fn new(vendor_id: u32, device_id: u32) -> Self {
        Self {
            vendor_id,
            device_id,
        }
    }
}
