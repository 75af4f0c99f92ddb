//! Primitive references: the flat, kind-agnostic build input.
//!
//! Each geometry is swept independently and in parallel into its own slice of
//! one shared array. A geometry's slice starts at the exclusive prefix sum of
//! the declared primitive counts before it, so slices never overlap; primitives
//! whose bounds cannot be computed are skipped and leave unused slack at the
//! end of their geometry's slice.

use crate::engine::BuildInput;
use crate::geometry::GeometryAdapter;
use crate::math::Aabb;
use rayon::prelude::*;
use std::any::Any;
use std::ops::Range;

/// Bounds of one primitive plus its `(geometry, primitive)` back-reference.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PrimRef {
    pub bounds: Aabb,
    pub geom_id: u32,
    pub prim_id: u32,
}

impl PrimRef {
    pub fn new(bounds: Aabb, geom_id: u32, prim_id: u32) -> Self {
        Self {
            bounds,
            geom_id,
            prim_id,
        }
    }

    pub fn center2(&self) -> crate::math::Vec3 {
        self.bounds.center2()
    }
}

impl Default for PrimRef {
    fn default() -> Self {
        Self::new(Aabb::EMPTY, u32::MAX, u32::MAX)
    }
}

/// Aggregate over a set of primitive references.
///
/// `cent_bounds` bounds the doubled centers (`lower + upper`) and is what an
/// engine bins on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PrimInfo {
    pub geom_bounds: Aabb,
    pub cent_bounds: Aabb,
    pub count: usize,
}

impl PrimInfo {
    pub const EMPTY: Self = Self {
        geom_bounds: Aabb::EMPTY,
        cent_bounds: Aabb::EMPTY,
        count: 0,
    };

    pub fn add_center2(&mut self, prim: &PrimRef) {
        self.geom_bounds.extend(&prim.bounds);
        self.cent_bounds.extend(&Aabb::from_point(prim.center2()));
        self.count += 1;
    }

    pub fn merge(&self, other: &Self) -> Self {
        Self {
            geom_bounds: self.geom_bounds.merge(&other.geom_bounds),
            cent_bounds: self.cent_bounds.merge(&other.cent_bounds),
            count: self.count + other.count,
        }
    }
}

impl Default for PrimInfo {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// Writes references for `range` of one geometry into `out`, in ascending
/// primitive order, skipping primitives without usable bounds.
///
/// Stops early if `out` is full.
pub fn create_geometry_prim_refs(
    adapter: &dyn GeometryAdapter,
    geom_id: u32,
    range: Range<u32>,
    out: &mut [PrimRef],
    user_data: Option<&(dyn Any + Send + Sync)>,
) -> PrimInfo {
    let mut info = PrimInfo::EMPTY;
    let mut slots = out.iter_mut();

    for prim_id in range {
        let Some(bounds) = adapter.compute_bounds(prim_id, user_data) else {
            continue;
        };
        let Some(slot) = slots.next() else {
            break;
        };
        let prim = PrimRef::new(bounds, geom_id, prim_id);
        info.add_center2(&prim);
        *slot = prim;
    }
    info
}

/// The swept primitive-reference array of a whole scene.
#[derive(Debug, Clone)]
pub struct PrimRefArray {
    prims: Vec<PrimRef>,
    ranges: Vec<Range<usize>>,
    info: PrimInfo,
}

impl PrimRefArray {
    pub fn info(&self) -> &PrimInfo {
        &self.info
    }

    /// Number of retained references.
    pub fn len(&self) -> usize {
        self.info.count
    }

    pub fn is_empty(&self) -> bool {
        self.info.count == 0
    }

    /// Size of the underlying array including slack.
    pub fn capacity(&self) -> usize {
        self.prims.len()
    }

    /// Retained references of geometry `geom_id`, in primitive order.
    pub fn geometry(&self, geom_id: usize) -> &[PrimRef] {
        self.ranges
            .get(geom_id)
            .map_or(&[], |range| &self.prims[range.clone()])
    }

    pub fn iter(&self) -> impl Iterator<Item = &PrimRef> + '_ {
        self.ranges
            .iter()
            .flat_map(move |range| self.prims[range.clone()].iter())
    }

    /// Drops the slack, keeping geometry order and per-geometry primitive order.
    pub fn into_compact(self) -> Vec<PrimRef> {
        if self.prims.len() == self.info.count {
            return self.prims;
        }
        self.iter().copied().collect()
    }
}

/// Sweeps every geometry of `input` in parallel into one reference array.
pub fn build_prim_ref_array(input: &dyn BuildInput) -> PrimRefArray {
    let counts: Vec<usize> = (0..input.geometry_count())
        .map(|geom_id| input.primitive_count(geom_id as u32) as usize)
        .collect();
    let total: usize = counts.iter().sum();
    let mut prims = vec![PrimRef::default(); total];

    let mut offsets = Vec::with_capacity(counts.len());
    let mut slices = Vec::with_capacity(counts.len());
    let mut rest = prims.as_mut_slice();
    let mut offset = 0;
    for &count in &counts {
        let (head, tail) = std::mem::take(&mut rest).split_at_mut(count);
        offsets.push(offset);
        slices.push(head);
        rest = tail;
        offset += count;
    }

    let infos: Vec<PrimInfo> = slices
        .into_par_iter()
        .enumerate()
        .map(|(geom_id, slice)| {
            let declared = slice.len() as u32;
            input.create_prim_refs(geom_id as u32, 0..declared, slice)
        })
        .collect();

    let ranges = offsets
        .iter()
        .zip(&infos)
        .map(|(&offset, info)| offset..offset + info.count)
        .collect();
    let info = infos
        .iter()
        .fold(PrimInfo::EMPTY, |acc, info| acc.merge(info));

    PrimRefArray {
        prims,
        ranges,
        info,
    }
}
