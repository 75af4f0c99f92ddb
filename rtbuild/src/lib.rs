//! Ray-tracing acceleration structure (RTAS) build service.
//!
//! Turns scene descriptions made of triangle meshes, quad meshes, procedural
//! primitives, and instances into acceleration structures written to caller
//! memory. Builds run on a bounded worker pool owned by an [`RtasContext`],
//! either inline or as parallel operations joined later.

pub mod builder;
pub mod config;
pub mod context;
pub mod desc;
pub mod device;
pub mod engine;
pub mod error;
pub mod estimate;
pub mod geometry;
pub mod handle;
pub mod math;
pub mod primref;
mod validate;

pub use builder::{BuildBuffers, BuildReport, BuildStage};
pub use config::RtasContextDesc;
pub use context::RtasContext;
pub use engine::{ReferenceEngine, SizeEstimate, SpatialBuilderEngine};
pub use error::{Result, ResultCode, RtasError};
pub use handle::{BuilderHandle, ParallelOperationHandle};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::desc::{
        BuildOpDesc, BuildQuality, BuilderDesc, BuilderProperties, BuildUserData, DeviceDesc,
        DeviceRtasProperties, GeometryDesc, InstanceGeometryDesc, ParallelOperationProperties,
        ProceduralGeometryDesc, QuadsGeometryDesc, RtasAddress, RtasFormat,
        TrianglesGeometryDesc,
    };
    use crate::math::{Aabb, Affine3A, Vec3};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::{Duration, Instant};

    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn context() -> RtasContext {
        init();
        RtasContext::new(RtasContextDesc::default().max_concurrency(2)).unwrap()
    }

    fn two_triangles() -> GeometryDesc {
        TrianglesGeometryDesc::new(
            &[[0, 1, 2], [1, 3, 2]],
            &[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [1.0, 1.0, 0.0]],
        )
        .into()
    }

    fn properties(ctx: &RtasContext, builder: BuilderHandle, op: &BuildOpDesc) -> BuilderProperties {
        let mut props = BuilderProperties::default();
        ctx.get_build_properties(builder, op, &mut props).unwrap();
        props
    }

    fn buffers_for(props: &BuilderProperties) -> BuildBuffers {
        BuildBuffers::with_sizes(
            props.rtas_buffer_size_bytes_max_required,
            props.scratch_buffer_size_bytes,
        )
    }

    #[test]
    fn test_null_handles_rejected() {
        let ctx = context();
        let null = BuilderHandle::null();
        let null_op = ParallelOperationHandle::null();
        let builder = ctx.create_builder(&BuilderDesc::default()).unwrap();
        let op = BuildOpDesc::new(vec![Some(two_triangles())]);
        let code = |r: Result<()>| ResultCode::from(&r);

        assert_eq!(code(ctx.destroy_builder(null)), ResultCode::ErrorInvalidNullHandle);
        assert_eq!(
            code(ctx.check_format_compatibility(null, RtasFormat::VERSION_1, RtasFormat::VERSION_1)),
            ResultCode::ErrorInvalidNullHandle
        );
        assert_eq!(
            code(ctx.get_build_properties(null, &op, &mut BuilderProperties::default())),
            ResultCode::ErrorInvalidNullHandle
        );
        assert_eq!(
            ctx.build(null, &op, &mut [], &mut [], None),
            Err(RtasError::InvalidNullHandle)
        );
        assert_eq!(
            ctx.build_parallel(builder, &op, BuildBuffers::default(), null_op, None),
            Err(RtasError::InvalidNullHandle)
        );
        assert_eq!(ctx.create_parallel_operation(null), Err(RtasError::InvalidNullHandle));
        assert_eq!(code(ctx.destroy_parallel_operation(null_op)), ResultCode::ErrorInvalidNullHandle);
        assert_eq!(
            code(ctx.get_parallel_operation_properties(
                null_op,
                &mut ParallelOperationProperties::default()
            )),
            ResultCode::ErrorInvalidNullHandle
        );
        assert_eq!(ctx.join_parallel_operation(null_op), Err(RtasError::InvalidNullHandle));
        assert_eq!(
            code(ctx.get_device_rtas_properties(None, &mut DeviceRtasProperties::default())),
            ResultCode::ErrorInvalidNullHandle
        );
    }

    #[test]
    fn test_destroyed_builder_rejected() {
        let ctx = context();
        let builder = ctx.create_builder(&BuilderDesc::default()).unwrap();
        ctx.destroy_builder(builder).unwrap();

        assert!(matches!(
            ctx.destroy_builder(builder),
            Err(RtasError::InvalidArgument(_))
        ));
        assert!(matches!(
            ctx.create_parallel_operation(builder),
            Err(RtasError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_parallel_operation_from_other_builder() {
        let ctx = context();
        let builder_a = ctx.create_builder(&BuilderDesc::default()).unwrap();
        let builder_b = ctx.create_builder(&BuilderDesc::default()).unwrap();
        let parallel_op = ctx.create_parallel_operation(builder_a).unwrap();
        let op = BuildOpDesc::new(vec![Some(two_triangles())]);
        let props = properties(&ctx, builder_b, &op);

        let result = ctx.build_parallel(builder_b, &op, buffers_for(&props), parallel_op, None);
        assert_eq!(ResultCode::from(&result), ResultCode::ErrorInvalidArgument);
    }

    #[test]
    fn test_invalid_triangle_excluded() {
        let ctx = context();
        let builder = ctx.create_builder(&BuilderDesc::default()).unwrap();
        let op = BuildOpDesc::new(vec![Some(
            TrianglesGeometryDesc::new(
                &[[0, 1, 2], [1, 3, 2], [0, 4, 1], [2, 3, 0]],
                &[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [1.0, 1.0, 0.0]],
            )
            .into(),
        )]);
        let mut buffers = buffers_for(&properties(&ctx, builder, &op));

        let report = ctx
            .build(builder, &op, &mut buffers.scratch, &mut buffers.rtas, None)
            .unwrap();
        assert_eq!(report.declared_primitive_count, 4);
        assert_eq!(report.primitive_count, 3);
    }

    #[test]
    fn test_worst_case_monotonic_in_quality() {
        let ctx = context();
        let builder = ctx.create_builder(&BuilderDesc::default()).unwrap();
        let op = BuildOpDesc::new(vec![Some(two_triangles()), Some(two_triangles())]);

        let low = properties(&ctx, builder, &op.clone().build_quality(BuildQuality::LOW));
        let high = properties(&ctx, builder, &op.build_quality(BuildQuality::HIGH));
        assert!(
            high.rtas_buffer_size_bytes_max_required >= low.rtas_buffer_size_bytes_max_required
        );
    }

    #[test]
    fn test_format_compatibility_reflexive_and_symmetric() {
        let ctx = context();
        let builder = ctx.create_builder(&BuilderDesc::default()).unwrap();
        let formats = [RtasFormat::INVALID, RtasFormat::VERSION_1, RtasFormat::VERSION_2];

        for a in formats {
            assert_eq!(ctx.check_format_compatibility(builder, a, a), Ok(()));
            for b in formats {
                assert_eq!(
                    ResultCode::from(&ctx.check_format_compatibility(builder, a, b)),
                    ResultCode::from(&ctx.check_format_compatibility(builder, b, a))
                );
            }
        }
        assert!(matches!(
            ctx.check_format_compatibility(builder, RtasFormat::VERSION_1, RtasFormat::VERSION_2),
            Err(RtasError::OperandsIncompatible(_))
        ));
        assert!(matches!(
            ctx.check_format_compatibility(builder, RtasFormat(3), RtasFormat::VERSION_1),
            Err(RtasError::InvalidEnumeration(_))
        ));
    }

    #[test]
    fn test_parallel_build_matches_sync() {
        let ctx = context();
        let builder = ctx.create_builder(&BuilderDesc::default()).unwrap();
        let parallel_op = ctx.create_parallel_operation(builder).unwrap();
        let op = BuildOpDesc::new(vec![Some(two_triangles()), None, Some(two_triangles())]);
        let props = properties(&ctx, builder, &op);

        let mut sync_buffers = buffers_for(&props);
        let sync = ctx.build(
            builder,
            &op,
            &mut sync_buffers.scratch,
            &mut sync_buffers.rtas,
            None,
        );

        let queued = ctx.build_parallel(builder, &op, buffers_for(&props), parallel_op, None);
        assert_eq!(ResultCode::from(&queued), ResultCode::ErrorHandleObjectInUse);

        let joined = ctx.join_parallel_operation(parallel_op);
        assert_eq!(joined, sync);
        assert_eq!(ResultCode::from(&joined), ResultCode::Success);
        // a second join returns the stored result
        assert_eq!(ctx.join_parallel_operation(parallel_op), sync);

        let buffers = ctx
            .take_parallel_operation_buffers(parallel_op)
            .unwrap()
            .unwrap();
        assert_eq!(buffers.rtas, sync_buffers.rtas);
        ctx.destroy_parallel_operation(parallel_op).unwrap();
    }

    #[test]
    fn test_parallel_validation_is_immediate() {
        let ctx = context();
        let builder = ctx.create_builder(&BuilderDesc::default()).unwrap();
        let parallel_op = ctx.create_parallel_operation(builder).unwrap();
        let op = BuildOpDesc::new(vec![Some(two_triangles())]).build_quality(BuildQuality(7));

        let result = ctx.build_parallel(builder, &op, BuildBuffers::default(), parallel_op, None);
        assert!(matches!(result, Err(RtasError::InvalidEnumeration(_))));
        // nothing was queued, so join reports the default success
        assert_eq!(
            ctx.join_parallel_operation(parallel_op),
            Ok(BuildReport::default())
        );
    }

    #[test]
    fn test_two_triangle_scene() {
        let ctx = context();
        let builder = ctx.create_builder(&BuilderDesc::default()).unwrap();
        let op = BuildOpDesc::new(vec![Some(two_triangles())]).build_quality(BuildQuality::MEDIUM);
        let props = properties(&ctx, builder, &op);

        assert!(props.rtas_buffer_size_bytes_expected > 0);
        assert!(props.rtas_buffer_size_bytes_max_required >= props.rtas_buffer_size_bytes_expected);
        assert_eq!(props.flags, 0);

        let mut buffers = buffers_for(&props);
        let report = ctx
            .build(builder, &op, &mut buffers.scratch, &mut buffers.rtas, None)
            .unwrap();
        assert_eq!(report.bounds, Aabb::new(Vec3::ZERO, Vec3::new(1.0, 1.0, 0.0)));
        assert!(report.rtas_bytes_used <= props.rtas_buffer_size_bytes_max_required);
    }

    #[test]
    fn test_procedural_all_empty() {
        let ctx = context();
        let builder = ctx.create_builder(&BuilderDesc::default()).unwrap();
        let op = BuildOpDesc::new(vec![Some(
            ProceduralGeometryDesc::new(16, |_, _| Aabb::EMPTY).into(),
        )]);
        let mut buffers = buffers_for(&properties(&ctx, builder, &op));

        let report = ctx
            .build(builder, &op, &mut buffers.scratch, &mut buffers.rtas, None)
            .unwrap();
        assert_eq!(report.primitive_count, 0);
        assert!(report.bounds.is_empty());
    }

    #[test]
    fn test_user_data_reaches_callback() {
        let ctx = context();
        let builder = ctx.create_builder(&BuilderDesc::default()).unwrap();
        let parallel_op = ctx.create_parallel_operation(builder).unwrap();
        let op = BuildOpDesc::new(vec![Some(
            ProceduralGeometryDesc::new(3, |prim_id, user_data| {
                let scale = user_data
                    .and_then(|data| data.downcast_ref::<f32>())
                    .copied()
                    .unwrap_or(0.0);
                let lower = Vec3::splat(prim_id as f32 * scale);
                Aabb::new(lower, lower + Vec3::ONE)
            })
            .into(),
        )]);
        let user_data: BuildUserData = Arc::new(2.0f32);
        let props = properties(&ctx, builder, &op);

        let mut buffers = buffers_for(&props);
        let sync = ctx
            .build(
                builder,
                &op,
                &mut buffers.scratch,
                &mut buffers.rtas,
                Some(user_data.as_ref()),
            )
            .unwrap();
        assert_eq!(sync.bounds.upper, Vec3::splat(5.0));

        let _ = ctx.build_parallel(builder, &op, buffers_for(&props), parallel_op, Some(user_data));
        assert_eq!(ctx.join_parallel_operation(parallel_op), Ok(sync));
    }

    #[test]
    fn test_small_output_buffer() {
        let ctx = context();
        let builder = ctx.create_builder(&BuilderDesc::default()).unwrap();
        let op = BuildOpDesc::new(vec![Some(two_triangles())]);
        let props = properties(&ctx, builder, &op);

        let mut rtas = vec![0u8; props.rtas_buffer_size_bytes_expected / 2];
        let mut scratch = vec![0u8; props.scratch_buffer_size_bytes];
        let result = ctx.build(builder, &op, &mut scratch, &mut rtas, None);
        assert_eq!(ResultCode::from(&result), ResultCode::ErrorOutOfHostMemory);
    }

    #[test]
    fn test_callback_panic_is_unknown() {
        let ctx = context();
        let builder = ctx.create_builder(&BuilderDesc::default()).unwrap();
        let parallel_op = ctx.create_parallel_operation(builder).unwrap();
        let op = BuildOpDesc::new(vec![Some(
            ProceduralGeometryDesc::new(1, |_, _| panic!("callback failed")).into(),
        )]);

        let mut buffers = BuildBuffers::with_sizes(4096, 4096);
        let result = ctx.build(builder, &op, &mut buffers.scratch, &mut buffers.rtas, None);
        assert_eq!(ResultCode::from(&result), ResultCode::ErrorUnknown);

        let _ = ctx.build_parallel(
            builder,
            &op,
            BuildBuffers::with_sizes(4096, 4096),
            parallel_op,
            None,
        );
        assert!(matches!(
            ctx.join_parallel_operation(parallel_op),
            Err(RtasError::Unknown(_))
        ));
    }

    #[test]
    fn test_estimate_tolerates_unpopulated_buffers() {
        let ctx = context();
        let builder = ctx.create_builder(&BuilderDesc::default()).unwrap();
        let mut geom = TrianglesGeometryDesc::new(&[], &[]);
        geom.triangle_count = 10;
        geom.vertex_count = 30;
        geom.triangles = None;
        geom.vertices = None;
        let op = BuildOpDesc::new(vec![Some(geom.into())]);

        let props = properties(&ctx, builder, &op);
        assert!(props.scratch_buffer_size_bytes > 0);

        let mut buffers = buffers_for(&props);
        let result = ctx.build(builder, &op, &mut buffers.scratch, &mut buffers.rtas, None);
        assert!(matches!(result, Err(RtasError::InvalidNullPointer(_))));
    }

    #[test]
    fn test_mixed_geometry_scene() {
        let ctx = context();
        let builder = ctx.create_builder(&BuilderDesc::default()).unwrap();
        let op = BuildOpDesc::new(vec![
            Some(two_triangles()),
            Some(
                QuadsGeometryDesc::new(
                    &[[0, 1, 2, 3]],
                    &[[0.0, 0.0, 2.0], [1.0, 0.0, 2.0], [1.0, 1.0, 2.0], [0.0, 1.0, 2.0]],
                )
                .into(),
            ),
            None,
            Some(
                InstanceGeometryDesc::new(
                    &Affine3A::from_translation(Vec3::new(10.0, 0.0, 0.0)),
                    Aabb::new(Vec3::ZERO, Vec3::ONE),
                    RtasAddress::new(0x1000).unwrap(),
                )
                .into(),
            ),
        ]);
        let props = properties(&ctx, builder, &op);
        let mut buffers = buffers_for(&props);

        let report = ctx
            .build(builder, &op, &mut buffers.scratch, &mut buffers.rtas, None)
            .unwrap();
        assert_eq!(report.declared_primitive_count, 4);
        assert_eq!(report.primitive_count, 4);
        assert_eq!(report.bounds, Aabb::new(Vec3::ZERO, Vec3::new(11.0, 1.0, 2.0)));
        // header, 3 inner nodes, 3 leaves of 64 bytes and one 128 byte instance leaf
        assert_eq!(report.rtas_bytes_used, 128 + 3 * 64 + 3 * 64 + 128);
        assert_eq!(report.rtas_bytes_used, props.rtas_buffer_size_bytes_expected);
    }

    #[test]
    fn test_declared_count_beyond_buffers() {
        let ctx = context();
        let builder = ctx.create_builder(&BuilderDesc::default()).unwrap();
        let parallel_op = ctx.create_parallel_operation(builder).unwrap();
        let mut geom = TrianglesGeometryDesc::new(
            &[[0, 1, 2]],
            &[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
        );
        geom.triangle_count = 400_000_000;
        let op = BuildOpDesc::new(vec![Some(geom.into())]);

        let mut rtas = vec![0u8; 4096];
        let mut scratch = vec![0u8; 64];
        let result = ctx.build(builder, &op, &mut scratch, &mut rtas, None);
        assert_eq!(ResultCode::from(&result), ResultCode::ErrorOutOfHostMemory);

        let queued = ctx.build_parallel(
            builder,
            &op,
            BuildBuffers::with_sizes(4096, 64),
            parallel_op,
            None,
        );
        assert_eq!(ResultCode::from(&queued), ResultCode::ErrorHandleObjectInUse);
        assert!(matches!(
            ctx.join_parallel_operation(parallel_op),
            Err(RtasError::OutOfHostMemory(_))
        ));
    }

    #[test]
    fn test_parallel_build_returns_while_pool_busy() {
        init();
        let ctx = RtasContext::new(RtasContextDesc::default().max_concurrency(1)).unwrap();
        let builder = ctx.create_builder(&BuilderDesc::default()).unwrap();
        let slow_op = ctx.create_parallel_operation(builder).unwrap();
        let quick_op = ctx.create_parallel_operation(builder).unwrap();

        let started = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&started);
        let slow = BuildOpDesc::new(vec![Some(
            ProceduralGeometryDesc::new(1, move |_, _| {
                flag.store(true, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(1000));
                Aabb::new(Vec3::ZERO, Vec3::ONE)
            })
            .into(),
        )]);
        let quick = BuildOpDesc::new(vec![Some(two_triangles())]);

        let slow_buffers = buffers_for(&properties(&ctx, builder, &slow));
        let queued = ctx.build_parallel(builder, &slow, slow_buffers, slow_op, None);
        assert_eq!(ResultCode::from(&queued), ResultCode::ErrorHandleObjectInUse);
        while !started.load(Ordering::SeqCst) {
            std::thread::sleep(Duration::from_millis(1));
        }

        // the only worker is now inside the slow callback
        let quick_buffers = buffers_for(&properties(&ctx, builder, &quick));
        let start = Instant::now();
        let queued = ctx.build_parallel(builder, &quick, quick_buffers, quick_op, None);
        let elapsed = start.elapsed();
        assert_eq!(ResultCode::from(&queued), ResultCode::ErrorHandleObjectInUse);
        assert!(elapsed < Duration::from_millis(250), "blocked for {elapsed:?}");

        assert_eq!(ctx.join_parallel_operation(slow_op).unwrap().primitive_count, 1);
        assert_eq!(ctx.join_parallel_operation(quick_op).unwrap().primitive_count, 2);
    }

    #[test]
    fn test_device_properties() {
        let ctx = context();
        let mut props = DeviceRtasProperties::default();

        ctx.get_device_rtas_properties(Some(&DeviceDesc::new(0x8086, 0x56A0)), &mut props)
            .unwrap();
        assert_eq!(props.rtas_format, RtasFormat::VERSION_1);
        assert_eq!(props.rtas_buffer_alignment, 128);

        let unsupported = DeviceDesc::new(0x1002, 0x73BF);
        let result = ctx.get_device_rtas_properties(Some(&unsupported), &mut props);
        assert!(matches!(result, Err(RtasError::Unknown(_))));
        assert_eq!(props.rtas_format, RtasFormat::INVALID);

        let emulated = RtasContext::new(
            RtasContextDesc::default()
                .max_concurrency(1)
                .require_supported_device(false),
        )
        .unwrap();
        emulated
            .get_device_rtas_properties(Some(&unsupported), &mut props)
            .unwrap();
        assert_eq!(props.rtas_format, RtasFormat::VERSION_1);
    }

    #[test]
    fn test_parallel_operation_properties() {
        let ctx = context();
        let builder = ctx.create_builder(&BuilderDesc::default()).unwrap();
        let parallel_op = ctx.create_parallel_operation(builder).unwrap();

        let mut props = ParallelOperationProperties::default();
        ctx.get_parallel_operation_properties(parallel_op, &mut props)
            .unwrap();
        assert_eq!(props.max_concurrency, 2);
        assert_eq!(ctx.max_concurrency(), 2);
    }
}
