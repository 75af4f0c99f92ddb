use anyhow::{Context, Result};
use rtbuild::desc::{
    BuildOpDesc, BuildQuality, BuilderDesc, BuilderProperties, DeviceDesc, DeviceRtasProperties,
    GeometryDesc, InstanceGeometryDesc, ParallelOperationProperties, RtasAddress,
    TrianglesGeometryDesc,
};
use rtbuild::math::{Aabb, Affine3A, Vec3};
use rtbuild::{BuildBuffers, ResultCode, RtasContext, RtasContextDesc, RtasError};

/// DG2 device used when no real driver is queried.
const DEMO_DEVICE: DeviceDesc = DeviceDesc {
    vendor_id: 0x8086,
    device_id: 0x56A0,
};

fn demo_scene() -> Result<Vec<Option<GeometryDesc>>> {
    let quad = TrianglesGeometryDesc::new(
        &[[0, 1, 2], [1, 3, 2]],
        &[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [1.0, 1.0, 0.0]],
    );

    let child = RtasAddress::new(0x1000).context("instance address must be non-zero")?;
    let instance = InstanceGeometryDesc::new(
        &Affine3A::from_translation(Vec3::new(4.0, 0.0, 0.0)),
        Aabb::new(Vec3::ZERO, Vec3::ONE),
        child,
    );

    Ok(vec![Some(quad.into()), None, Some(instance.into())])
}

pub fn run_demo(emulate: bool) -> Result<()> {
    let ctx = RtasContext::new(RtasContextDesc::default().require_supported_device(!emulate))?;

    log::info!("=== Device query ===");
    let mut device_props = DeviceRtasProperties::default();
    ctx.get_device_rtas_properties(Some(&DEMO_DEVICE), &mut device_props)?;
    log::info!(
        "device {:#06x}:{:#06x} uses RTAS format {} with {}-byte alignment",
        DEMO_DEVICE.vendor_id,
        DEMO_DEVICE.device_id,
        device_props.rtas_format.0,
        device_props.rtas_buffer_alignment
    );

    let builder = ctx.create_builder(&BuilderDesc::default())?;
    ctx.check_format_compatibility(builder, device_props.rtas_format, device_props.rtas_format)?;

    log::info!("=== Size estimate ===");
    let op = BuildOpDesc::new(demo_scene()?).build_quality(BuildQuality::MEDIUM);
    let mut props = BuilderProperties::default();
    ctx.get_build_properties(builder, &op, &mut props)?;
    log::info!(
        "expected {} bytes, worst case {} bytes, scratch {} bytes",
        props.rtas_buffer_size_bytes_expected,
        props.rtas_buffer_size_bytes_max_required,
        props.scratch_buffer_size_bytes
    );

    log::info!("=== Synchronous build ===");
    let mut buffers = BuildBuffers::with_sizes(
        props.rtas_buffer_size_bytes_max_required,
        props.scratch_buffer_size_bytes,
    );
    let report = ctx.build(builder, &op, &mut buffers.scratch, &mut buffers.rtas, None)?;
    log::info!(
        "built {} of {} primitives into {} bytes, bounds {:?}",
        report.primitive_count,
        report.declared_primitive_count,
        report.rtas_bytes_used,
        report.bounds
    );

    log::info!("=== Parallel build ===");
    let parallel_op = ctx.create_parallel_operation(builder)?;
    let mut op_props = ParallelOperationProperties::default();
    ctx.get_parallel_operation_properties(parallel_op, &mut op_props)?;
    log::info!("parallel operations run on up to {} workers", op_props.max_concurrency);

    let queued = ctx.build_parallel(
        builder,
        &op,
        BuildBuffers::with_sizes(
            props.rtas_buffer_size_bytes_max_required,
            props.scratch_buffer_size_bytes,
        ),
        parallel_op,
        None,
    );
    match queued {
        Err(RtasError::HandleObjectInUse) => log::info!("build accepted, joining"),
        other => anyhow::bail!("parallel build was not accepted: {}", ResultCode::from(&other)),
    }

    let joined = ctx.join_parallel_operation(parallel_op)?;
    log::info!(
        "joined: {} primitives, {} bytes, matches synchronous build: {}",
        joined.primitive_count,
        joined.rtas_bytes_used,
        joined == report
    );

    ctx.destroy_parallel_operation(parallel_op)?;
    ctx.destroy_builder(builder)?;
    Ok(())
}
