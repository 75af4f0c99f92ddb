//! Structural validation of caller-supplied descriptors.
//!
//! Validation is fail-fast: the first violated rule is reported. A malformed
//! geometry descriptor fails the whole build, while bad per-primitive data is
//! left for the geometry adapters to skip.

use crate::desc::{
    BuildOpDesc, BuildOpFlags, BuildQuality, BuilderDesc, BuilderProperties, BuilderVersion,
    ChainedDesc, DataBufferFormat, DeviceRtasProperties, GeometryDesc, InstanceGeometryDesc,
    MAX_CHAIN_LENGTH, ParallelOperationProperties, ProceduralGeometryDesc, QuadsGeometryDesc,
    RtasFormat, StructureType, TrianglesGeometryDesc,
};
use crate::error::{Result, RtasError};
use crate::geometry::TransformEncoding;
use rayon::prelude::*;

/// Returns `true` when the extension chain terminates within
/// [`MAX_CHAIN_LENGTH`] structures, head included.
pub(crate) fn chain_is_bounded(desc: &dyn ChainedDesc) -> bool {
    let mut next = desc.next();
    for _ in 1..MAX_CHAIN_LENGTH {
        match next {
            None => return true,
            Some(ext) => next = ext.next(),
        }
    }
    next.is_none()
}

fn validate_chain(desc: &dyn ChainedDesc, what: &str) -> Result<()> {
    if !chain_is_bounded(desc) {
        return Err(RtasError::argument(format!(
            "{what} extension chain is cyclic or longer than {MAX_CHAIN_LENGTH} structures"
        )));
    }
    Ok(())
}

fn validate_stype(desc: &dyn ChainedDesc, expected: StructureType, what: &str) -> Result<()> {
    if desc.stype() != expected {
        return Err(RtasError::argument(format!(
            "{what} has structure type {:#x}, expected {:#x}",
            desc.stype().0,
            expected.0
        )));
    }
    Ok(())
}

pub(crate) fn validate_builder_desc(desc: &BuilderDesc) -> Result<()> {
    validate_chain(desc, "builder descriptor")?;

    if desc.builder_version > BuilderVersion::CURRENT {
        return Err(RtasError::enumeration(format!(
            "builder version {} is newer than supported version {}",
            desc.builder_version.0,
            BuilderVersion::CURRENT.0
        )));
    }
    Ok(())
}

pub(crate) fn validate_rtas_format(format: RtasFormat) -> Result<()> {
    if format > RtasFormat::MAX {
        return Err(RtasError::enumeration(format!(
            "acceleration structure format {} is not supported",
            format.0
        )));
    }
    Ok(())
}

/// Validates the top-level build descriptor, not its geometries.
pub(crate) fn validate_build_op(desc: &BuildOpDesc) -> Result<()> {
    validate_stype(
        desc,
        StructureType::BUILDER_BUILD_OP_EXP_DESC,
        "build operation descriptor",
    )?;
    validate_chain(desc, "build operation descriptor")?;
    validate_rtas_format(desc.rtas_format)?;

    if desc.build_quality > BuildQuality::HIGH {
        return Err(RtasError::enumeration(format!(
            "build quality {} is out of range",
            desc.build_quality.0
        )));
    }

    if !BuildOpFlags::all().contains(desc.build_flags) {
        return Err(RtasError::enumeration(format!(
            "build flags {:#x} contain unsupported bits",
            desc.build_flags.bits()
        )));
    }
    Ok(())
}

pub(crate) fn validate_builder_properties(props: &BuilderProperties) -> Result<()> {
    validate_stype(
        props,
        StructureType::BUILDER_EXP_PROPERTIES,
        "builder properties",
    )?;
    validate_chain(props, "builder properties")
}

pub(crate) fn validate_device_properties(props: &DeviceRtasProperties) -> Result<()> {
    validate_chain(props, "device properties")?;
    validate_stype(props, StructureType::DEVICE_EXP_PROPERTIES, "device properties")
}

pub(crate) fn validate_parallel_operation_properties(
    props: &ParallelOperationProperties,
) -> Result<()> {
    validate_stype(
        props,
        StructureType::PARALLEL_OPERATION_EXP_PROPERTIES,
        "parallel operation properties",
    )?;
    validate_chain(props, "parallel operation properties")
}

fn check_format(
    actual: DataBufferFormat,
    expected: DataBufferFormat,
    geom_id: usize,
    field: &str,
) -> Result<()> {
    if actual != expected {
        return Err(RtasError::argument(format!(
            "geometry {geom_id}: {field} format {} is not supported, expected {}",
            actual.0, expected.0
        )));
    }
    Ok(())
}

fn check_reserved(reserved: &[u32], geom_id: usize) -> Result<()> {
    if reserved.iter().any(|&r| r != 0) {
        return Err(RtasError::argument(format!(
            "geometry {geom_id}: reserved member must be 0"
        )));
    }
    Ok(())
}

fn check_buffer<T>(count: u32, buffer: &Option<T>, geom_id: usize, what: &str) -> Result<()> {
    if count > 0 && buffer.is_none() {
        return Err(RtasError::null_pointer(format!(
            "geometry {geom_id}: no {what} specified"
        )));
    }
    Ok(())
}

fn validate_triangles(geom: &TrianglesGeometryDesc, geom_id: usize) -> Result<()> {
    check_format(
        geom.triangle_format,
        DataBufferFormat::TRIANGLE_INDICES_UINT32,
        geom_id,
        "triangle",
    )?;
    check_format(geom.vertex_format, DataBufferFormat::FLOAT3, geom_id, "vertex")?;
    check_reserved(&geom.reserved, geom_id)?;
    check_buffer(geom.triangle_count, &geom.triangles, geom_id, "triangle buffer")?;
    check_buffer(geom.vertex_count, &geom.vertices, geom_id, "vertex buffer")
}

fn validate_quads(geom: &QuadsGeometryDesc, geom_id: usize) -> Result<()> {
    check_format(
        geom.quad_format,
        DataBufferFormat::QUAD_INDICES_UINT32,
        geom_id,
        "quad",
    )?;
    check_format(geom.vertex_format, DataBufferFormat::FLOAT3, geom_id, "vertex")?;
    check_reserved(&geom.reserved, geom_id)?;
    check_buffer(geom.quad_count, &geom.quads, geom_id, "quad buffer")?;
    check_buffer(geom.vertex_count, &geom.vertices, geom_id, "vertex buffer")
}

fn validate_procedural(geom: &ProceduralGeometryDesc, geom_id: usize) -> Result<()> {
    check_reserved(&[geom.reserved], geom_id)?;
    check_buffer(geom.prim_count, &geom.bounds_fn, geom_id, "bounds function")
}

fn validate_instance(geom: &InstanceGeometryDesc, geom_id: usize) -> Result<()> {
    let transform = geom.transform.as_ref().ok_or_else(|| {
        RtasError::null_pointer(format!(
            "geometry {geom_id}: no instance transformation specified"
        ))
    })?;
    if geom.bounds.is_none() {
        return Err(RtasError::null_pointer(format!(
            "geometry {geom_id}: no acceleration structure bounds specified"
        )));
    }
    if geom.acceleration_structure.is_none() {
        return Err(RtasError::null_pointer(format!(
            "geometry {geom_id}: no acceleration structure to instantiate specified"
        )));
    }

    let encoding = TransformEncoding::from_format(geom.transform_format).ok_or_else(|| {
        RtasError::enumeration(format!(
            "geometry {geom_id}: transform format {} is not a transform encoding",
            geom.transform_format.0
        ))
    })?;
    if transform.len() < encoding.float_count() {
        return Err(RtasError::argument(format!(
            "geometry {geom_id}: transform holds {} floats, {:?} requires {}",
            transform.len(),
            encoding,
            encoding.float_count()
        )));
    }
    Ok(())
}

/// Validates one non-null geometry descriptor.
pub(crate) fn validate_geometry(geom: &GeometryDesc, geom_id: usize) -> Result<()> {
    match geom {
        GeometryDesc::Triangles(g) => validate_triangles(g, geom_id),
        GeometryDesc::Quads(g) => validate_quads(g, geom_id),
        GeometryDesc::Procedural(g) => validate_procedural(g, geom_id),
        GeometryDesc::Instance(g) => validate_instance(g, geom_id),
    }
}

/// Validates every geometry in parallel; absent entries are accepted.
///
/// Must run before any primitive extraction starts.
pub(crate) fn validate_geometries(geometries: &[Option<GeometryDesc>]) -> Result<()> {
    geometries
        .par_iter()
        .enumerate()
        .try_for_each(|(geom_id, geom)| match geom {
            Some(geom) => validate_geometry(geom, geom_id),
            None => Ok(()),
        })
}

/// Validates every geometry on the calling thread, without touching any pool.
pub(crate) fn validate_geometries_inline(geometries: &[Option<GeometryDesc>]) -> Result<()> {
    geometries
        .iter()
        .enumerate()
        .try_for_each(|(geom_id, geom)| match geom {
            Some(geom) => validate_geometry(geom, geom_id),
            None => Ok(()),
        })
}
