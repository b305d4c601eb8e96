use std::time::Instant;

use crate::blend::blend_rows;
use crate::buffer::{Channels, PixelBuffer};
use crate::comm::{Communicator, LocalCluster};
use crate::coordinator::{
    EncodeErrorPolicy, PipelineOpts, RunReport, build_thread_pool, deliver_frame, on_pool, run_rank,
};
use crate::foundation::core::RowRange;
use crate::foundation::error::{GrayfadeError, GrayfadeResult};
use crate::luma::to_grayscale;
use crate::partition::Partition;
use crate::sequence::{DEFAULT_FRAME_COUNT, FrameSequence};
use crate::sink::{FrameSink, SinkConfig};

/// Fade `source` with `opts.workers` cooperating worker threads.
///
/// The calling thread acts as the coordinator and is the only one that touches `sink`. Any worker
/// failure fails the whole run; when several ranks fail, the first error that is not a mere
/// consequence of a peer going away is returned.
#[tracing::instrument(skip(source, sink), fields(rows = source.rows(), cols = source.cols()))]
pub fn run_distributed(
    source: &PixelBuffer,
    opts: &PipelineOpts,
    sink: &mut dyn FrameSink,
) -> GrayfadeResult<RunReport> {
    opts.validate()?;
    Partition::new(source.rows(), opts.workers)?;

    let mut comms = LocalCluster::new(opts.workers)?.into_iter();
    let mut root = comms
        .next()
        .ok_or_else(|| GrayfadeError::configuration("workers must be >= 1"))?;

    std::thread::scope(|s| {
        let mut handles = Vec::with_capacity(opts.workers.saturating_sub(1));
        for mut comm in comms {
            let rank = comm.rank();
            let spawned = std::thread::Builder::new()
                .name(format!("grayfade-rank-{rank}"))
                .spawn_scoped(s, move || run_rank(&mut comm, None, opts, None));
            match spawned {
                Ok(h) => handles.push((rank, h)),
                Err(e) => {
                    // Dropping `root` unblocks the workers already started.
                    drop(root);
                    return Err(GrayfadeError::transport(format!(
                        "failed to spawn worker {rank}: {e}"
                    )));
                }
            }
        }

        let root_result = run_rank(&mut root, Some(source), opts, Some(sink));
        // Workers blocked on the coordinator see it go away instead of waiting forever.
        drop(root);

        let mut errors = Vec::new();
        for (rank, h) in handles {
            match h.join() {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => errors.push(e),
                Err(_) => errors.push(GrayfadeError::transport(format!("worker {rank} panicked"))),
            }
        }

        match root_result {
            Ok(Some(report)) if errors.is_empty() => Ok(report),
            Ok(Some(_)) => Err(pick_root_cause(errors)),
            Ok(None) => Err(GrayfadeError::transport(
                "coordinator finished without a report",
            )),
            Err(e) => {
                errors.insert(0, e);
                Err(pick_root_cause(errors))
            }
        }
    })
}

fn pick_root_cause(mut errors: Vec<GrayfadeError>) -> GrayfadeError {
    let idx = errors.iter().position(|e| !e.is_transport()).unwrap_or(0);
    errors.swap_remove(idx)
}

/// Options for the single-process variants.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalRunOpts {
    pub frame_count: u64,
    /// Rayon threads for the row loops; `None` is the plain sequential reference.
    pub threads: Option<usize>,
    pub on_encode_error: EncodeErrorPolicy,
}

impl Default for LocalRunOpts {
    fn default() -> Self {
        Self {
            frame_count: DEFAULT_FRAME_COUNT,
            threads: None,
            on_encode_error: EncodeErrorPolicy::Abort,
        }
    }
}

/// Fade `source` in this process, optionally spreading rows over a rayon pool.
///
/// One scratch frame is reused across frames; the sink sees each frame before it is overwritten.
#[tracing::instrument(skip(source, sink), fields(rows = source.rows(), cols = source.cols()))]
pub fn run_local(
    source: &PixelBuffer,
    opts: &LocalRunOpts,
    sink: &mut dyn FrameSink,
) -> GrayfadeResult<RunReport> {
    if source.channels() != Channels::Rgb {
        return Err(GrayfadeError::configuration(
            "source image must be a 3-channel buffer",
        ));
    }
    let frames = FrameSequence::new(opts.frame_count)?;
    let pool = build_thread_pool(opts.threads)?;
    let dims = source.dims();
    sink.begin(SinkConfig {
        dims,
        frame_count: opts.frame_count,
    })?;

    let started = Instant::now();
    let gray3 = on_pool(pool.as_ref(), |exec| to_grayscale(source, exec))?.expand_gray_to_rgb()?;

    let all = RowRange::new(0, dims.rows)?;
    let mut scratch = PixelBuffer::new(dims, Channels::Rgb);
    let mut report = RunReport {
        workers: opts.threads.unwrap_or(1),
        ..RunReport::default()
    };
    for frame in frames {
        on_pool(pool.as_ref(), |exec| {
            blend_rows(source, &gray3, frame.mix, all, &mut scratch, exec)
        })?;
        deliver_frame(sink, frame, &scratch, opts.on_encode_error, &mut report)?;
    }
    report.compute_elapsed = started.elapsed();
    sink.end()?;

    tracing::info!(
        frames = report.frames_emitted,
        skipped = report.frames_skipped,
        threads = report.workers,
        elapsed_ms = report.compute_elapsed.as_millis() as u64,
        "local run complete"
    );
    Ok(report)
}
