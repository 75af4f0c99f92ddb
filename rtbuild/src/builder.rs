//! Build orchestration: stages, the panic boundary, and parallel operations.

use crate::desc::{BuildOpDesc, BuildUserData, GeometryDesc, GeometryKind};
use crate::engine::{BuildInput, GeometryCounts, SpatialBuilderEngine};
use crate::error::{Result, RtasError};
use crate::geometry::{GeometryAdapter, PrimitivePayload, adapter_for};
use crate::handle::BuilderHandle;
use crate::math::Aabb;
use crate::primref::{PrimInfo, PrimRef, create_geometry_prim_refs};
use crate::validate::{validate_build_op, validate_geometries, validate_geometries_inline};
use crossbeam_channel::{Receiver, Sender};
use std::any::Any;
use std::ops::Range;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, MutexGuard};

/// Stages of one build, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStage {
    Validating,
    Extracting,
    Building,
    Done,
    Failed,
}

/// Outcome of a successful build.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BuildReport {
    /// Union of the bounds of all retained primitives
    pub bounds: Aabb,
    /// Bytes of the output buffer the structure occupies
    pub rtas_bytes_used: usize,
    /// Primitives that ended up in the structure
    pub primitive_count: usize,
    /// Sum of the declared primitive counts of all geometries
    pub declared_primitive_count: usize,
}

impl Default for BuildReport {
    fn default() -> Self {
        Self {
            bounds: Aabb::EMPTY,
            rtas_bytes_used: 0,
            primitive_count: 0,
            declared_primitive_count: 0,
        }
    }
}

/// Validated geometries with one adapter each, as seen by the engine.
pub(crate) struct SceneInput<'a> {
    adapters: Vec<Option<Box<dyn GeometryAdapter + 'a>>>,
    user_data: Option<&'a (dyn Any + Send + Sync)>,
}

impl<'a> SceneInput<'a> {
    pub(crate) fn new(
        geometries: &'a [Option<GeometryDesc>],
        user_data: Option<&'a (dyn Any + Send + Sync)>,
    ) -> Result<Self> {
        let adapters = geometries
            .iter()
            .map(|geom| geom.as_ref().map(adapter_for).transpose())
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            adapters,
            user_data,
        })
    }

    fn adapter(&self, geom_id: u32) -> Option<&(dyn GeometryAdapter + 'a)> {
        self.adapters.get(geom_id as usize)?.as_deref()
    }

    fn declared_primitive_count(&self) -> usize {
        (0..self.geometry_count() as u32)
            .map(|geom_id| self.primitive_count(geom_id) as usize)
            .sum()
    }
}

impl GeometryCounts for SceneInput<'_> {
    fn geometry_count(&self) -> usize {
        self.adapters.len()
    }

    fn primitive_count(&self, geom_id: u32) -> u32 {
        self.adapter(geom_id).map_or(0, |adapter| adapter.primitive_count())
    }

    fn geometry_kind(&self, geom_id: u32) -> Option<GeometryKind> {
        self.adapter(geom_id).map(|adapter| adapter.kind())
    }
}

impl BuildInput for SceneInput<'_> {
    fn create_prim_refs(&self, geom_id: u32, range: Range<u32>, out: &mut [PrimRef]) -> PrimInfo {
        match self.adapter(geom_id) {
            Some(adapter) => create_geometry_prim_refs(adapter, geom_id, range, out, self.user_data),
            None => PrimInfo::EMPTY,
        }
    }

    fn primitive(&self, geom_id: u32, prim_id: u32) -> Option<PrimitivePayload> {
        self.adapter(geom_id)?.extract_primitive(prim_id)
    }
}

/// Checks the build descriptor and every geometry in it.
///
/// Any structural problem fails the whole build before any primitive is
/// touched.
pub(crate) fn validate(op: &BuildOpDesc) -> Result<()> {
    log::debug!("build stage {:?}", BuildStage::Validating);
    validate_build_op(op)?;
    validate_geometries(&op.geometries)
}

/// Same checks as [`validate`], run sequentially on the calling thread.
///
/// Used where the caller must not wait for a pool worker to free up.
pub(crate) fn validate_inline(op: &BuildOpDesc) -> Result<()> {
    log::debug!("build stage {:?} (inline)", BuildStage::Validating);
    validate_build_op(op)?;
    validate_geometries_inline(&op.geometries)
}

/// Runs extraction and the engine over an already validated build.
pub(crate) fn execute(
    engine: &dyn SpatialBuilderEngine,
    op: &BuildOpDesc,
    rtas: &mut [u8],
    scratch: &mut [u8],
    user_data: Option<&(dyn Any + Send + Sync)>,
) -> Result<BuildReport> {
    log::debug!("build stage {:?}", BuildStage::Extracting);
    let input = SceneInput::new(&op.geometries, user_data)?;
    let declared_primitive_count = input.declared_primitive_count();

    log::debug!(
        "build stage {:?}: {} geometries, {} declared primitives",
        BuildStage::Building,
        input.geometry_count(),
        declared_primitive_count
    );
    let output = engine
        .build(&input, rtas, scratch, op.build_quality, op.build_flags)
        .ok_or_else(|| {
            RtasError::OutOfHostMemory(format!(
                "build needs more than {} output bytes or {} scratch bytes",
                rtas.len(),
                scratch.len()
            ))
        })?;

    log::debug!(
        "build stage {:?}: retained {} of {} primitives, {} bytes used",
        BuildStage::Done,
        output.primitive_count,
        declared_primitive_count,
        output.bytes_used
    );
    Ok(BuildReport {
        bounds: output.bounds,
        rtas_bytes_used: output.bytes_used,
        primitive_count: output.primitive_count,
        declared_primitive_count,
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Runs `pipeline` and turns a panic from anywhere inside it into
/// [`RtasError::Unknown`].
pub(crate) fn guarded<F>(pipeline: F) -> Result<BuildReport>
where
    F: FnOnce() -> Result<BuildReport>,
{
    let result = match catch_unwind(AssertUnwindSafe(pipeline)) {
        Ok(result) => result,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            log::error!("caught panic during BVH build: {}", message);
            Err(RtasError::Unknown(message))
        }
    };
    if let Err(err) = &result {
        log::debug!("build stage {:?}: {}", BuildStage::Failed, err);
    }
    result
}

/// Buffers handed to an asynchronous build, returned once it has been joined.
#[derive(Debug, Default)]
pub struct BuildBuffers {
    pub rtas: Vec<u8>,
    pub scratch: Vec<u8>,
}

impl BuildBuffers {
    pub fn new(rtas: Vec<u8>, scratch: Vec<u8>) -> Self {
        Self { rtas, scratch }
    }

    /// Zeroed buffers of the given sizes.
    pub fn with_sizes(rtas_bytes: usize, scratch_bytes: usize) -> Self {
        Self::new(vec![0; rtas_bytes], vec![0; scratch_bytes])
    }
}

/// Everything an asynchronous build owns while it runs.
pub(crate) struct BuildJob {
    pub engine: Arc<dyn SpatialBuilderEngine>,
    pub op: BuildOpDesc,
    pub buffers: BuildBuffers,
    pub user_data: Option<BuildUserData>,
}

impl BuildJob {
    pub(crate) fn run(self) -> AsyncOutcome {
        let Self {
            engine,
            op,
            mut buffers,
            user_data,
        } = self;
        let result = guarded(|| {
            execute(
                engine.as_ref(),
                &op,
                &mut buffers.rtas,
                &mut buffers.scratch,
                user_data.as_deref(),
            )
        });
        AsyncOutcome { result, buffers }
    }
}

pub(crate) struct AsyncOutcome {
    result: Result<BuildReport>,
    buffers: BuildBuffers,
}

struct TaskGroup {
    pending: Option<Receiver<AsyncOutcome>>,
    last: Result<BuildReport>,
    buffers: Option<BuildBuffers>,
}

/// State behind a parallel operation handle.
pub(crate) struct ParallelOperation {
    builder: BuilderHandle,
    group: Mutex<TaskGroup>,
}

impl ParallelOperation {
    pub(crate) fn new(builder: BuilderHandle) -> Self {
        Self {
            builder,
            group: Mutex::new(TaskGroup {
                pending: None,
                last: Ok(BuildReport::default()),
                buffers: None,
            }),
        }
    }

    pub(crate) fn builder(&self) -> BuilderHandle {
        self.builder
    }

    fn lock(&self) -> MutexGuard<'_, TaskGroup> {
        self.group.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Registers a new task and returns the sender its result goes to.
    ///
    /// Launching while a previous task is still pending drops that task's
    /// result.
    pub(crate) fn launch(&self) -> Sender<AsyncOutcome> {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let mut group = self.lock();
        group.pending = Some(rx);
        group.buffers = None;
        tx
    }

    /// Waits for the pending task, if any, and returns the stored result.
    pub(crate) fn join(&self) -> Result<BuildReport> {
        let mut group = self.lock();
        if let Some(rx) = group.pending.take() {
            match rx.recv() {
                Ok(outcome) => {
                    group.last = outcome.result;
                    group.buffers = Some(outcome.buffers);
                }
                Err(_) => {
                    group.last = Err(RtasError::Unknown(
                        "build task ended without reporting a result".to_string(),
                    ));
                }
            }
        }
        group.last.clone()
    }

    /// Buffers of the last joined build; `None` before a join or once taken.
    pub(crate) fn take_buffers(&self) -> Option<BuildBuffers> {
        self.lock().buffers.take()
    }
}
