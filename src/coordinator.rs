//! Per-rank driver of the distributed fade.
//!
//! Rank [`COORDINATOR_RANK`] loads nothing itself but is handed the decoded source and the frame
//! sink; every rank (the coordinator included) converts and blends only its own row range, and the
//! coordinator merges gathered rows at the offsets given by [`Partition`].

use std::time::{Duration, Instant};

use crate::blend::blend_region;
use crate::buffer::{Channels, PixelBuffer};
use crate::comm::Communicator;
use crate::foundation::core::{Dims, Exec, FrameIndex};
use crate::foundation::error::{GrayfadeError, GrayfadeResult};
use crate::luma::luma_region;
use crate::partition::Partition;
use crate::sequence::{DEFAULT_FRAME_COUNT, FrameDescriptor, FrameSequence};
use crate::sink::{FrameSink, SinkConfig};

/// Rank that owns the source, the canonical grayscale and the sink.
pub const COORDINATOR_RANK: usize = 0;

const RUN_HEADER_LEN: usize = Dims::WIRE_LEN + 8;

/// What to do when the sink fails to write a frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncodeErrorPolicy {
    /// Fail the run with the encode error.
    #[default]
    Abort,
    /// Log the failure, count the frame as skipped and keep going.
    Skip,
}

/// Options for a distributed run.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineOpts {
    /// Number of cooperating workers, the coordinator included.
    pub workers: usize,
    /// Rayon threads inside each worker. `None` runs each worker's rows on its own thread.
    pub threads_per_worker: Option<usize>,
    /// Number of frames in the fade.
    pub frame_count: u64,
    pub on_encode_error: EncodeErrorPolicy,
}

impl Default for PipelineOpts {
    fn default() -> Self {
        Self {
            workers: 4,
            threads_per_worker: None,
            frame_count: DEFAULT_FRAME_COUNT,
            on_encode_error: EncodeErrorPolicy::Abort,
        }
    }
}

impl PipelineOpts {
    pub fn validate(&self) -> GrayfadeResult<()> {
        if self.workers == 0 {
            return Err(GrayfadeError::configuration("workers must be >= 1"));
        }
        if self.threads_per_worker == Some(0) {
            return Err(GrayfadeError::configuration(
                "threads_per_worker must be >= 1 when set",
            ));
        }
        if self.frame_count == 0 {
            return Err(GrayfadeError::configuration("frame_count must be >= 1"));
        }
        Ok(())
    }
}

/// Outcome of a completed run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunReport {
    /// Frames accepted by the sink.
    pub frames_emitted: u64,
    /// Frames dropped under [`EncodeErrorPolicy::Skip`].
    pub frames_skipped: u64,
    pub workers: usize,
    /// Wall time of the grayscale and frame phases; loading and the initial broadcast are excluded.
    pub compute_elapsed: Duration,
}

/// Lifecycle of one rank.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Uninitialized,
    BufferBroadcast,
    GrayscaleReady,
    Blending(FrameIndex),
    Done,
}

impl Phase {
    /// Move to `next`, refusing skipped phases and out-of-order frames.
    pub fn advance(self, next: Phase, frame_count: u64) -> GrayfadeResult<Phase> {
        let ok = match (self, next) {
            (Phase::Uninitialized, Phase::BufferBroadcast) => true,
            (Phase::BufferBroadcast, Phase::GrayscaleReady) => true,
            (Phase::GrayscaleReady, Phase::Blending(FrameIndex(0))) => frame_count > 0,
            (Phase::Blending(cur), Phase::Blending(n)) => {
                n.0 == cur.0 + 1 && n.0 < frame_count
            }
            (Phase::Blending(cur), Phase::Done) => cur.0 + 1 == frame_count,
            _ => false,
        };
        if !ok {
            return Err(GrayfadeError::invalid_argument(format!(
                "illegal phase transition {self:?} -> {next:?} ({frame_count} frames)"
            )));
        }
        Ok(next)
    }
}

/// Place each rank's rows at its partition offset.
///
/// `contributions[k]` must hold exactly the rows of `partition.range(k)`.
pub fn merge_rows(
    partition: &Partition,
    contributions: Vec<Vec<u8>>,
    row_bytes: usize,
) -> GrayfadeResult<Vec<u8>> {
    if contributions.len() != partition.worker_count() {
        return Err(GrayfadeError::transport(format!(
            "gathered {} contributions for {} workers",
            contributions.len(),
            partition.worker_count()
        )));
    }
    let mut out = vec![0u8; partition.total_rows() * row_bytes];
    for (k, (range, bytes)) in partition.ranges().iter().zip(contributions).enumerate() {
        let span = range.byte_span(row_bytes);
        if bytes.len() != span.len() {
            return Err(GrayfadeError::transport(format!(
                "rank {k} contributed {} bytes for rows [{}, {}), expected {}",
                bytes.len(),
                range.start,
                range.end,
                span.len()
            )));
        }
        out[span].copy_from_slice(&bytes);
    }
    Ok(out)
}

/// Hand one frame to the sink, applying `policy` to encode failures.
pub(crate) fn deliver_frame(
    sink: &mut dyn FrameSink,
    frame: FrameDescriptor,
    buffer: &PixelBuffer,
    policy: EncodeErrorPolicy,
    report: &mut RunReport,
) -> GrayfadeResult<()> {
    match sink.push_frame(frame, buffer) {
        Ok(()) => {
            report.frames_emitted += 1;
            Ok(())
        }
        Err(GrayfadeError::Encode(msg)) if policy == EncodeErrorPolicy::Skip => {
            tracing::warn!(frame = frame.index.0, error = %msg, "skipping frame that failed to encode");
            report.frames_skipped += 1;
            Ok(())
        }
        Err(e) => {
            tracing::error!(frame = frame.index.0, error = %e, "frame delivery failed");
            Err(e)
        }
    }
}

pub(crate) fn build_thread_pool(threads: Option<usize>) -> GrayfadeResult<Option<rayon::ThreadPool>> {
    let Some(n) = threads else {
        return Ok(None);
    };
    if n == 0 {
        return Err(GrayfadeError::configuration(
            "thread count must be >= 1 when set",
        ));
    }
    rayon::ThreadPoolBuilder::new()
        .num_threads(n)
        .build()
        .map(Some)
        .map_err(|e| GrayfadeError::configuration(format!("failed to build rayon thread pool: {e}")))
}

/// Run `f` inside `pool` with parallel row kernels, or inline with sequential ones.
pub(crate) fn on_pool<T: Send>(
    pool: Option<&rayon::ThreadPool>,
    f: impl FnOnce(Exec) -> T + Send,
) -> T {
    match pool {
        Some(pool) => pool.install(|| f(Exec::Parallel)),
        None => f(Exec::Sequential),
    }
}

struct RankState {
    rank: usize,
    phase: Phase,
    frame_count: u64,
}

impl RankState {
    fn enter(&mut self, next: Phase) -> GrayfadeResult<()> {
        self.phase = self.phase.advance(next, self.frame_count)?;
        match next {
            Phase::Blending(_) => tracing::trace!(rank = self.rank, phase = ?next, "phase"),
            _ if self.rank == COORDINATOR_RANK => {
                tracing::info!(phase = ?next, "coordinator phase")
            }
            _ => tracing::debug!(rank = self.rank, phase = ?next, "phase"),
        }
        Ok(())
    }
}

/// Drive one rank through broadcast, grayscale and every frame.
///
/// The coordinator rank must pass `source` and `sink` and gets `Some(report)` back; every other
/// rank passes `None` for both and gets `None`. `opts.frame_count` is taken from the coordinator;
/// `opts.workers` is ignored in favor of `comm.size()`.
#[tracing::instrument(skip_all, fields(rank = comm.rank()))]
pub fn run_rank<C: Communicator + ?Sized>(
    comm: &mut C,
    source: Option<&PixelBuffer>,
    opts: &PipelineOpts,
    mut sink: Option<&mut dyn FrameSink>,
) -> GrayfadeResult<Option<RunReport>> {
    opts.validate()?;
    let rank = comm.rank();
    let is_coordinator = rank == COORDINATOR_RANK;
    if is_coordinator && (source.is_none() || sink.is_none()) {
        return Err(GrayfadeError::configuration(
            "the coordinator rank needs both the source image and a frame sink",
        ));
    }

    let mut state = RankState {
        rank,
        phase: Phase::Uninitialized,
        frame_count: opts.frame_count,
    };
    let pool = build_thread_pool(opts.threads_per_worker)?;

    // Load & broadcast: dimensions and frame count first, then the raw color bytes.
    state.enter(Phase::BufferBroadcast)?;
    let mut header = Vec::with_capacity(RUN_HEADER_LEN);
    let mut color_bytes = Vec::new();
    if let Some(src) = source.filter(|_| is_coordinator) {
        if src.channels() != Channels::Rgb {
            return Err(GrayfadeError::configuration(
                "source image must be a 3-channel buffer",
            ));
        }
        header.extend_from_slice(&src.dims().to_le_bytes()?);
        header.extend_from_slice(&opts.frame_count.to_le_bytes());
        color_bytes = src.as_bytes().to_vec();
    }
    comm.broadcast(COORDINATOR_RANK, &mut header)?;
    let (dims, frame_count) = parse_run_header(&header)?;
    state.frame_count = frame_count;

    comm.broadcast(COORDINATOR_RANK, &mut color_bytes)?;
    let color = PixelBuffer::from_raw(dims, Channels::Rgb, color_bytes).map_err(|_| {
        GrayfadeError::transport(format!(
            "rank {rank} received a color buffer that does not match {}x{}",
            dims.rows, dims.cols
        ))
    })?;
    let partition = Partition::new(dims.rows, comm.size())?;
    let range = partition
        .range(rank)
        .ok_or_else(|| GrayfadeError::transport(format!("rank {rank} has no row range")))?;

    if let Some(sink) = sink.as_deref_mut() {
        sink.begin(SinkConfig { dims, frame_count })?;
    }
    comm.barrier()?;
    let started = Instant::now();
    if is_coordinator {
        tracing::info!(
            rows = dims.rows,
            cols = dims.cols,
            workers = comm.size(),
            frames = frame_count,
            "source broadcast complete"
        );
    }

    // Grayscale: own rows, gathered and merged at the coordinator, then re-broadcast as RGB.
    let mut gray_rows = vec![0u8; range.len() * dims.cols];
    on_pool(pool.as_ref(), |exec| {
        luma_region(&color, range, &mut gray_rows, exec)
    })?;
    let gathered = comm.gather(COORDINATOR_RANK, gray_rows)?;
    let mut gray3_bytes = match gathered {
        Some(contributions) => {
            let gray = PixelBuffer::from_raw(
                dims,
                Channels::Gray,
                merge_rows(&partition, contributions, dims.cols)?,
            )?;
            gray.expand_gray_to_rgb()?.into_bytes()
        }
        None => Vec::new(),
    };
    comm.broadcast(COORDINATOR_RANK, &mut gray3_bytes)?;
    let gray3 = PixelBuffer::from_raw(dims, Channels::Rgb, gray3_bytes).map_err(|_| {
        GrayfadeError::transport(format!(
            "rank {rank} received a grayscale buffer that does not match {}x{}",
            dims.rows, dims.cols
        ))
    })?;
    state.enter(Phase::GrayscaleReady)?;

    // Frames: blend own rows, gather, merge, deliver in index order.
    let row_bytes = color.row_bytes();
    let mut report = RunReport {
        workers: comm.size(),
        ..RunReport::default()
    };
    for frame in FrameSequence::new(frame_count)? {
        state.enter(Phase::Blending(frame.index))?;
        let mut rows = vec![0u8; range.len() * row_bytes];
        on_pool(pool.as_ref(), |exec| {
            blend_region(&color, &gray3, frame.mix, range, &mut rows, exec)
        })?;

        let Some(contributions) = comm.gather(COORDINATOR_RANK, rows)? else {
            continue;
        };
        let buffer = PixelBuffer::from_raw(
            dims,
            Channels::Rgb,
            merge_rows(&partition, contributions, row_bytes)?,
        )?;
        tracing::debug!(frame = frame.index.0, mix = frame.mix, "frame gathered");
        if let Some(sink) = sink.as_deref_mut() {
            deliver_frame(sink, frame, &buffer, opts.on_encode_error, &mut report)?;
        }
    }
    state.enter(Phase::Done)?;

    if !is_coordinator {
        return Ok(None);
    }
    report.compute_elapsed = started.elapsed();
    if let Some(sink) = sink.as_deref_mut() {
        sink.end()?;
    }
    tracing::info!(
        frames = report.frames_emitted,
        skipped = report.frames_skipped,
        elapsed_ms = report.compute_elapsed.as_millis() as u64,
        "distributed run complete"
    );
    Ok(Some(report))
}

fn parse_run_header(header: &[u8]) -> GrayfadeResult<(Dims, u64)> {
    if header.len() != RUN_HEADER_LEN {
        return Err(GrayfadeError::transport(format!(
            "run header must be {RUN_HEADER_LEN} bytes, got {}",
            header.len()
        )));
    }
    let dims = Dims::from_le_bytes(&header[..Dims::WIRE_LEN])?;
    let mut count = [0u8; 8];
    count.copy_from_slice(&header[Dims::WIRE_LEN..]);
    let frame_count = u64::from_le_bytes(count);
    if frame_count == 0 {
        return Err(GrayfadeError::transport("run header carries zero frames"));
    }
    Ok((dims, frame_count))
}
