use crate::builder::{self, BuildBuffers, BuildJob, BuildReport, ParallelOperation};
use crate::config::RtasContextDesc;
use crate::desc::{
    BuildOpDesc, BuildUserData, BuilderDesc, BuilderProperties, BuilderVersion, DeviceDesc,
    DeviceRtasProperties, ParallelOperationProperties, RTAS_BUFFER_ALIGNMENT, RtasFormat,
};
use crate::device::supported_rtas_format;
use crate::engine::{ReferenceEngine, SpatialBuilderEngine};
use crate::error::{Result, RtasError};
use crate::estimate::estimate_build_size;
use crate::handle::{BuilderHandle, HandleRegistry, ParallelOperationHandle};
use crate::validate::{
    validate_build_op, validate_builder_desc, validate_builder_properties,
    validate_device_properties, validate_parallel_operation_properties, validate_rtas_format,
};
use std::any::Any;
use std::sync::Arc;

struct Builder {
    version: BuilderVersion,
}

/// Process-scoped state of the acceleration-structure builder.
///
/// `RtasContext` owns the bounded worker pool every build runs on, the live
/// builder and parallel-operation handles, and the spatial builder engine.
/// Creating it is the initialization step; dropping it shuts the pool down
/// once the builds still queued on it have finished.
///
/// # Architecture
///
/// - **Calling thread**: validates handles and descriptors, then either runs
///   the build inside the pool and waits, or validates the geometries itself,
///   queues the build and returns
/// - **Worker pool**: runs the per-geometry validation of synchronous builds,
///   the primitive sweeps, the engine, and every queued asynchronous build
///
/// # Example
///
/// ```
/// use rtbuild::desc::{BuildOpDesc, BuilderDesc, BuilderProperties, TrianglesGeometryDesc};
/// use rtbuild::{BuildBuffers, RtasContext, RtasContextDesc};
///
/// let ctx = RtasContext::new(RtasContextDesc::default().max_concurrency(2))?;
/// let builder = ctx.create_builder(&BuilderDesc::default())?;
///
/// let op = BuildOpDesc::new(vec![Some(
///     TrianglesGeometryDesc::new(
///         &[[0, 1, 2]],
///         &[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
///     )
///     .into(),
/// )]);
/// let mut props = BuilderProperties::default();
/// ctx.get_build_properties(builder, &op, &mut props)?;
///
/// let mut buffers = BuildBuffers::with_sizes(
///     props.rtas_buffer_size_bytes_max_required,
///     props.scratch_buffer_size_bytes,
/// );
/// let report = ctx.build(builder, &op, &mut buffers.scratch, &mut buffers.rtas, None)?;
/// assert_eq!(report.primitive_count, 1);
///
/// ctx.destroy_builder(builder)?;
/// # Ok::<(), rtbuild::RtasError>(())
/// ```
pub struct RtasContext {
    desc: RtasContextDesc,
    pool: rayon::ThreadPool,
    engine: Arc<dyn SpatialBuilderEngine>,
    builders: HandleRegistry<BuilderHandle, Builder>,
    operations: HandleRegistry<ParallelOperationHandle, ParallelOperation>,
}

impl RtasContext {
    /// Creates a context that builds with the [`ReferenceEngine`].
    pub fn new(desc: RtasContextDesc) -> Result<Self> {
        Self::with_engine(desc, Arc::new(ReferenceEngine::new()))
    }

    pub fn with_engine(desc: RtasContextDesc, engine: Arc<dyn SpatialBuilderEngine>) -> Result<Self> {
        let workers = desc.resolved_concurrency();
        let prefix = desc.thread_name_prefix.clone();

        let mut pool_builder = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(move |index| format!("{prefix}-{index}"));
        if let Some(stack_size) = desc.stack_size {
            pool_builder = pool_builder.stack_size(stack_size);
        }
        let pool = pool_builder
            .build()
            .map_err(|e| RtasError::Unknown(format!("failed to create worker pool: {e}")))?;

        log::info!("rtbuild context ready with {} workers", pool.current_num_threads());
        Ok(Self {
            desc,
            pool,
            engine,
            builders: HandleRegistry::new(),
            operations: HandleRegistry::new(),
        })
    }

    /// Number of worker threads builds run on.
    pub fn max_concurrency(&self) -> usize {
        self.pool.current_num_threads()
    }

    pub fn create_builder(&self, desc: &BuilderDesc) -> Result<BuilderHandle> {
        validate_builder_desc(desc)?;
        let handle = self.builders.insert(Builder {
            version: desc.builder_version,
        });
        log::debug!("created {} (version {})", handle, desc.builder_version.0);
        Ok(handle)
    }

    /// Destroys a builder. Parallel operations created from it must not be
    /// used for new builds afterwards.
    pub fn destroy_builder(&self, builder: BuilderHandle) -> Result<()> {
        let removed = self.builders.remove(builder)?;
        log::debug!("destroyed {} (version {})", builder, removed.version.0);
        Ok(())
    }

    /// Fills `props` with the acceleration-structure capabilities of `device`.
    ///
    /// `None` stands for a null device handle. Unsupported devices report
    /// [`RtasError::Unknown`] and leave the format at [`RtasFormat::INVALID`].
    pub fn get_device_rtas_properties(
        &self,
        device: Option<&DeviceDesc>,
        props: &mut DeviceRtasProperties,
    ) -> Result<()> {
        let device = device.ok_or(RtasError::InvalidNullHandle)?;
        validate_device_properties(props)?;

        props.flags = 0;
        props.rtas_format = RtasFormat::INVALID;
        props.rtas_buffer_alignment = RTAS_BUFFER_ALIGNMENT;

        let format = if self.desc.require_supported_device {
            supported_rtas_format(device)
        } else {
            Some(RtasFormat::VERSION_1)
        };
        match format {
            Some(format) => {
                props.rtas_format = format;
                Ok(())
            }
            None => Err(RtasError::Unknown(format!(
                "device {:#06x}:{:#06x} does not support acceleration structures",
                device.vendor_id, device.device_id
            ))),
        }
    }

    /// Succeeds when structures of `format_a` and `format_b` are interchangeable.
    pub fn check_format_compatibility(
        &self,
        builder: BuilderHandle,
        format_a: RtasFormat,
        format_b: RtasFormat,
    ) -> Result<()> {
        self.builders.get(builder)?;
        validate_rtas_format(format_a)?;
        validate_rtas_format(format_b)?;

        if format_a != format_b {
            return Err(RtasError::OperandsIncompatible(format!(
                "formats {} and {} differ",
                format_a.0, format_b.0
            )));
        }
        Ok(())
    }

    /// Fills `props` with the buffer sizes a build of `op` needs.
    ///
    /// Only declared counts and kinds are read; geometry buffers may still be
    /// unpopulated.
    pub fn get_build_properties(
        &self,
        builder: BuilderHandle,
        op: &BuildOpDesc,
        props: &mut BuilderProperties,
    ) -> Result<()> {
        self.builders.get(builder)?;
        validate_build_op(op)?;
        validate_builder_properties(props)?;

        let estimate = estimate_build_size(self.engine.as_ref(), op);
        props.flags = 0;
        props.rtas_buffer_size_bytes_expected = estimate.expected_bytes;
        props.rtas_buffer_size_bytes_max_required = estimate.worst_case_bytes;
        props.scratch_buffer_size_bytes = estimate.scratch_bytes;
        Ok(())
    }

    /// Builds `op` into `rtas` on the worker pool and waits for the result.
    ///
    /// `rtas` should be aligned to [`RTAS_BUFFER_ALIGNMENT`] bytes; this is not
    /// checked. `user_data` is forwarded to every procedural bounds callback.
    pub fn build(
        &self,
        builder: BuilderHandle,
        op: &BuildOpDesc,
        scratch: &mut [u8],
        rtas: &mut [u8],
        user_data: Option<&(dyn Any + Send + Sync)>,
    ) -> Result<BuildReport> {
        self.builders.get(builder)?;
        let engine = self.engine.as_ref();

        self.pool.install(|| {
            builder::guarded(|| {
                builder::validate(op)?;
                builder::execute(engine, op, rtas, scratch, user_data)
            })
        })
    }

    /// Queues a build of `op` on the worker pool and returns immediately.
    ///
    /// Handles and descriptors are validated on the calling thread before
    /// anything is queued, and failures are returned directly. On acceptance this returns
    /// [`RtasError::HandleObjectInUse`]; the build's own result is obtained
    /// with [`join_parallel_operation`](Self::join_parallel_operation), after
    /// which the buffers can be taken back with
    /// [`take_parallel_operation_buffers`](Self::take_parallel_operation_buffers).
    pub fn build_parallel(
        &self,
        builder: BuilderHandle,
        op: &BuildOpDesc,
        buffers: BuildBuffers,
        parallel_op: ParallelOperationHandle,
        user_data: Option<BuildUserData>,
    ) -> Result<BuildReport> {
        self.builders.get(builder)?;
        let operation = self.operations.get(parallel_op)?;
        if operation.builder() != builder {
            return Err(RtasError::argument(format!(
                "{} was created by {}, not {}",
                parallel_op,
                operation.builder(),
                builder
            )));
        }
        // validated here rather than on the pool, which may be busy with
        // earlier queued builds
        builder::validate_inline(op)?;

        let job = BuildJob {
            engine: Arc::clone(&self.engine),
            op: op.clone(),
            buffers,
            user_data,
        };
        let tx = operation.launch();
        self.pool.spawn(move || {
            // the operation may have been destroyed in the meantime
            let _ = tx.send(job.run());
        });

        log::debug!("queued build on {}", parallel_op);
        Err(RtasError::HandleObjectInUse)
    }

    /// Creates a parallel operation bound to `builder`.
    pub fn create_parallel_operation(&self, builder: BuilderHandle) -> Result<ParallelOperationHandle> {
        self.builders.get(builder)?;
        let handle = self.operations.insert(ParallelOperation::new(builder));
        log::debug!("created {} for {}", handle, builder);
        Ok(handle)
    }

    /// Destroys a parallel operation. A build still running on it completes,
    /// but its result is discarded.
    pub fn destroy_parallel_operation(&self, parallel_op: ParallelOperationHandle) -> Result<()> {
        self.operations.remove(parallel_op)?;
        log::debug!("destroyed {}", parallel_op);
        Ok(())
    }

    pub fn get_parallel_operation_properties(
        &self,
        parallel_op: ParallelOperationHandle,
        props: &mut ParallelOperationProperties,
    ) -> Result<()> {
        self.operations.get(parallel_op)?;
        validate_parallel_operation_properties(props)?;

        props.flags = 0;
        props.max_concurrency = u32::try_from(self.max_concurrency()).unwrap_or(u32::MAX);
        Ok(())
    }

    /// Blocks until the build queued on `parallel_op` has finished and returns
    /// its result.
    ///
    /// Joining again returns the same result without waiting. Joining an
    /// operation that never ran a build succeeds with an empty report. Must not
    /// be called from a worker of this context.
    pub fn join_parallel_operation(&self, parallel_op: ParallelOperationHandle) -> Result<BuildReport> {
        let operation = self.operations.get(parallel_op)?;
        operation.join()
    }

    /// Hands back the buffers of the last joined build on `parallel_op`.
    pub fn take_parallel_operation_buffers(
        &self,
        parallel_op: ParallelOperationHandle,
    ) -> Result<Option<BuildBuffers>> {
        Ok(self.operations.get(parallel_op)?.take_buffers())
    }
}

impl Drop for RtasContext {
    fn drop(&mut self) {
        log::debug!(
            "shutting down rtbuild context ({} builders, {} parallel operations still live)",
            self.builders.len(),
            self.operations.len()
        );
    }
}
