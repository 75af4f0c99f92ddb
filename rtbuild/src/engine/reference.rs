use super::{BuildInput, EngineOutput, GeometryCounts, SizeEstimate, SpatialBuilderEngine};
use crate::desc::{BuildOpFlags, BuildQuality, GeometryKind};
use crate::geometry::PrimitivePayload;
use crate::math::Aabb;
use crate::primref::{PrimRef, build_prim_ref_array};
use bytemuck::{Pod, Zeroable};

const HEADER_SIZE: usize = 128;
const NODE_SIZE: usize = 64;
const LEAF_SIZE: usize = 64;
const INSTANCE_LEAF_SIZE: usize = 128;

const LAYOUT_VERSION: u32 = 1;
const MAGIC: [u8; 4] = *b"RTAS";

const CHILD_NONE: u32 = 0;
const CHILD_INNER: u32 = 1;
const CHILD_LEAF: u32 = 2;

const LEAF_TRIANGLE: u32 = 1;
const LEAF_QUAD: u32 = 2;
const LEAF_PROCEDURAL: u32 = 3;
const LEAF_INSTANCE: u32 = 4;

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct RtasHeader {
    magic: [u8; 4],
    version: u32,
    build_quality: u32,
    build_flags: u32,
    root_offset: u32,
    root_kind: u32,
    inner_count: u32,
    leaf_count: u32,
    bounds: [f32; 6],
    reserved: [u32; 18],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct InnerNode {
    child_bounds: [[f32; 6]; 2],
    child_offsets: [u32; 2],
    child_kinds: [u32; 2],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct TriangleLeaf {
    kind: u32,
    geom_id: u32,
    prim_id: u32,
    mask_flags: u32,
    positions: [[f32; 3]; 3],
    reserved: [u32; 3],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct QuadLeaf {
    kind: u32,
    geom_id: u32,
    prim_id: u32,
    mask_flags: u32,
    positions: [[f32; 3]; 4],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct ProceduralLeaf {
    kind: u32,
    geom_id: u32,
    prim_id: u32,
    mask_flags: u32,
    bounds: [f32; 6],
    reserved: [u32; 6],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct InstanceLeaf {
    kind: u32,
    geom_id: u32,
    prim_id: u32,
    mask_flags: u32,
    instance_user_id: u32,
    instance_flags: u32,
    acceleration_structure: [u32; 2],
    transform: [f32; 12],
    bounds: [f32; 6],
    reserved: [u32; 6],
}

/// Primitive reference as staged in scratch memory.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct StagedPrimRef {
    bounds: [f32; 6],
    geom_id: u32,
    prim_id: u32,
}

const _: () = {
    assert!(std::mem::size_of::<RtasHeader>() == HEADER_SIZE);
    assert!(std::mem::size_of::<InnerNode>() == NODE_SIZE);
    assert!(std::mem::size_of::<TriangleLeaf>() == LEAF_SIZE);
    assert!(std::mem::size_of::<QuadLeaf>() == LEAF_SIZE);
    assert!(std::mem::size_of::<ProceduralLeaf>() == LEAF_SIZE);
    assert!(std::mem::size_of::<InstanceLeaf>() == INSTANCE_LEAF_SIZE);
};

const STAGED_REF_SIZE: usize = std::mem::size_of::<StagedPrimRef>();

fn aabb_array(b: &Aabb) -> [f32; 6] {
    [b.lower.x, b.lower.y, b.lower.z, b.upper.x, b.upper.y, b.upper.z]
}

fn leaf_size(kind: GeometryKind) -> usize {
    match kind {
        GeometryKind::Instance => INSTANCE_LEAF_SIZE,
        _ => LEAF_SIZE,
    }
}

fn encoded_size(leaf_count: usize, leaf_bytes: usize) -> usize {
    HEADER_SIZE + leaf_count.saturating_sub(1) * NODE_SIZE + leaf_bytes
}

enum BuildNode {
    Inner {
        bounds: [Aabb; 2],
        children: [usize; 2],
    },
    Leaf(PrimRef),
}

impl BuildNode {
    fn child_kind(&self) -> u32 {
        match self {
            Self::Inner { .. } => CHILD_INNER,
            Self::Leaf(_) => CHILD_LEAF,
        }
    }
}

fn bounds_of(prims: &[PrimRef]) -> Aabb {
    prims
        .iter()
        .fold(Aabb::EMPTY, |acc, prim| acc.merge(&prim.bounds))
}

/// Median split on the axis of largest centroid extent; one primitive per leaf.
fn subdivide(prims: &mut [PrimRef], nodes: &mut Vec<BuildNode>) -> usize {
    let index = nodes.len();
    if let [prim] = prims {
        nodes.push(BuildNode::Leaf(*prim));
        return index;
    }

    let centroids = prims
        .iter()
        .fold(Aabb::EMPTY, |acc, prim| acc.merge(&Aabb::from_point(prim.center2())));
    let extent = centroids.size();
    let axis = if extent.x >= extent.y && extent.x >= extent.z {
        0
    } else if extent.y >= extent.z {
        1
    } else {
        2
    };

    let mid = prims.len() / 2;
    prims.select_nth_unstable_by(mid, |a, b| a.center2()[axis].total_cmp(&b.center2()[axis]));

    nodes.push(BuildNode::Inner {
        bounds: [Aabb::EMPTY; 2],
        children: [0; 2],
    });
    let (left, right) = prims.split_at_mut(mid);
    let bounds = [bounds_of(left), bounds_of(right)];
    let children = [subdivide(left, nodes), subdivide(right, nodes)];
    nodes[index] = BuildNode::Inner { bounds, children };
    index
}

fn encode_leaf(prim: &PrimRef, payload: Option<PrimitivePayload>) -> Vec<u8> {
    let (geom_id, prim_id) = (prim.geom_id, prim.prim_id);
    match payload {
        Some(PrimitivePayload::Triangle(tri)) => bytemuck::bytes_of(&TriangleLeaf {
            kind: LEAF_TRIANGLE,
            geom_id,
            prim_id,
            mask_flags: u32::from(tri.geometry_mask) | (u32::from(tri.geometry_flags.bits()) << 8),
            positions: tri.positions.map(|p| p.to_array()),
            reserved: [0; 3],
        })
        .to_vec(),
        Some(PrimitivePayload::Quad(quad)) => bytemuck::bytes_of(&QuadLeaf {
            kind: LEAF_QUAD,
            geom_id,
            prim_id,
            mask_flags: u32::from(quad.geometry_mask) | (u32::from(quad.geometry_flags.bits()) << 8),
            positions: quad.positions.map(|p| p.to_array()),
        })
        .to_vec(),
        Some(PrimitivePayload::Instance(inst)) => {
            let address = inst.acceleration_structure.get();
            bytemuck::bytes_of(&InstanceLeaf {
                kind: LEAF_INSTANCE,
                geom_id,
                prim_id,
                mask_flags: u32::from(inst.geometry_mask),
                instance_user_id: inst.instance_user_id,
                instance_flags: inst.instance_flags.bits(),
                acceleration_structure: [address as u32, (address >> 32) as u32],
                transform: inst.local_to_world.to_cols_array(),
                bounds: aabb_array(&prim.bounds),
                reserved: [0; 6],
            })
            .to_vec()
        }
        Some(PrimitivePayload::Procedural(procedural)) => bytemuck::bytes_of(&ProceduralLeaf {
            kind: LEAF_PROCEDURAL,
            geom_id,
            prim_id,
            mask_flags: u32::from(procedural.geometry_mask),
            bounds: aabb_array(&prim.bounds),
            reserved: [0; 6],
        })
        .to_vec(),
        None => bytemuck::bytes_of(&ProceduralLeaf {
            kind: LEAF_PROCEDURAL,
            geom_id,
            prim_id,
            mask_flags: 0,
            bounds: aabb_array(&prim.bounds),
            reserved: [0; 6],
        })
        .to_vec(),
    }
}

/// Copies the retained references into `scratch` in leaf order.
fn stage_prim_refs(prims: &[PrimRef], scratch: &mut [u8]) -> Option<()> {
    let staged = scratch.get_mut(..prims.len() * STAGED_REF_SIZE)?;
    for (chunk, prim) in staged.chunks_exact_mut(STAGED_REF_SIZE).zip(prims) {
        chunk.copy_from_slice(bytemuck::bytes_of(&StagedPrimRef {
            bounds: aabb_array(&prim.bounds),
            geom_id: prim.geom_id,
            prim_id: prim.prim_id,
        }));
    }
    Some(())
}

/// Builtin engine producing a binary BVH with one primitive per leaf.
///
/// Output layout: a 128-byte header, then all nodes in depth-first order.
/// Inner nodes take 64 bytes; triangle, quad, and procedural leaves take 64
/// bytes; instance leaves take 128 bytes. All offsets are relative to the
/// start of the output buffer.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReferenceEngine;

impl ReferenceEngine {
    pub fn new() -> Self {
        Self
    }
}

impl SpatialBuilderEngine for ReferenceEngine {
    fn estimate_size(
        &self,
        input: &dyn GeometryCounts,
        quality: BuildQuality,
        _flags: BuildOpFlags,
    ) -> SizeEstimate {
        let mut leaf_count = 0usize;
        let mut leaf_bytes = 0usize;
        for geom_id in 0..input.geometry_count() as u32 {
            let Some(kind) = input.geometry_kind(geom_id) else {
                continue;
            };
            let count = input.primitive_count(geom_id) as usize;
            leaf_count += count;
            leaf_bytes += count * leaf_size(kind);
        }

        let expected_bytes = encoded_size(leaf_count, leaf_bytes);
        // high quality may duplicate primitives across splits
        let worst_case_bytes = if quality >= BuildQuality::HIGH {
            encoded_size(leaf_count + leaf_count / 2, leaf_bytes + leaf_bytes / 2)
        } else {
            expected_bytes
        };

        SizeEstimate {
            expected_bytes,
            worst_case_bytes,
            scratch_bytes: leaf_count * STAGED_REF_SIZE,
        }
    }

    fn build(
        &self,
        input: &dyn BuildInput,
        rtas: &mut [u8],
        scratch: &mut [u8],
        quality: BuildQuality,
        flags: BuildOpFlags,
    ) -> Option<EngineOutput> {
        // the sweep allocates one reference per declared primitive, so the
        // caller's scratch has to cover the declared total before it starts
        let staged_bytes = (0..input.geometry_count() as u32)
            .try_fold(0usize, |total, geom_id| {
                total.checked_add(input.primitive_count(geom_id) as usize)
            })
            .and_then(|total| total.checked_mul(STAGED_REF_SIZE));
        if staged_bytes.is_none_or(|bytes| bytes > scratch.len()) {
            log::warn!(
                "scratch buffer of {} bytes cannot back the declared primitive counts",
                scratch.len()
            );
            return None;
        }

        let array = build_prim_ref_array(input);
        let scene_bounds = array.info().geom_bounds;
        let mut prims = array.into_compact();
        let primitive_count = prims.len();

        let mut nodes = Vec::with_capacity(primitive_count.saturating_mul(2));
        if !prims.is_empty() {
            subdivide(&mut prims, &mut nodes);
        }
        if stage_prim_refs(&prims, scratch).is_none() {
            log::warn!(
                "scratch buffer of {} bytes cannot stage {} primitive references",
                scratch.len(),
                primitive_count
            );
            return None;
        }

        let mut offsets = Vec::with_capacity(nodes.len());
        let mut cursor = HEADER_SIZE;
        for node in &nodes {
            offsets.push(u32::try_from(cursor).ok()?);
            cursor += match node {
                BuildNode::Inner { .. } => NODE_SIZE,
                BuildNode::Leaf(prim) => input
                    .geometry_kind(prim.geom_id)
                    .map_or(LEAF_SIZE, leaf_size),
            };
        }
        let bytes_used = cursor;
        if rtas.len() < bytes_used {
            log::warn!(
                "output buffer of {} bytes is too small, {} bytes required",
                rtas.len(),
                bytes_used
            );
            return None;
        }

        let output = &mut rtas[..bytes_used];
        output.fill(0);

        let inner_count = nodes
            .iter()
            .filter(|node| matches!(node, BuildNode::Inner { .. }))
            .count();
        let header = RtasHeader {
            magic: MAGIC,
            version: LAYOUT_VERSION,
            build_quality: quality.0,
            build_flags: flags.bits(),
            root_offset: offsets.first().copied().unwrap_or(0),
            root_kind: nodes.first().map_or(CHILD_NONE, BuildNode::child_kind),
            inner_count: inner_count as u32,
            leaf_count: (nodes.len() - inner_count) as u32,
            bounds: aabb_array(&scene_bounds),
            reserved: [0; 18],
        };
        output[..HEADER_SIZE].copy_from_slice(bytemuck::bytes_of(&header));

        for (node, &offset) in nodes.iter().zip(&offsets) {
            let record = match node {
                BuildNode::Inner { bounds, children } => bytemuck::bytes_of(&InnerNode {
                    child_bounds: [aabb_array(&bounds[0]), aabb_array(&bounds[1])],
                    child_offsets: children.map(|child| offsets[child]),
                    child_kinds: children.map(|child| nodes[child].child_kind()),
                })
                .to_vec(),
                BuildNode::Leaf(prim) => {
                    encode_leaf(prim, input.primitive(prim.geom_id, prim.prim_id))
                }
            };
            let start = offset as usize;
            output[start..start + record.len()].copy_from_slice(&record);
        }

        Some(EngineOutput {
            bounds: scene_bounds,
            bytes_used,
            primitive_count,
        })
    }
}
