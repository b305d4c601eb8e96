//! Grayfade turns a color image into a cross-fade toward its own grayscale version.
//!
//! The work is split by rows across cooperating workers:
//!
//! - the coordinator broadcasts the decoded source to every worker
//! - each worker converts its rows to luma; the coordinator gathers and re-broadcasts them as RGB
//! - for every frame each worker blends its rows and the coordinator gathers a complete frame,
//!   handing it to a [`FrameSink`] in frame order
//!
//! [`run_distributed`] drives that protocol over in-process worker threads; [`run_local`] is the
//! single-process variant (sequential or rayon-parallel rows).
#![forbid(unsafe_code)]

mod foundation;

pub mod analysis;
pub mod blend;
pub mod buffer;
pub mod codec;
pub mod comm;
pub mod coordinator;
pub mod luma;
pub mod partition;
pub mod pipeline;
pub mod sequence;
pub mod sink;

pub use crate::foundation::core::{Dims, Exec, FrameIndex, RowRange};
pub use crate::foundation::error::{GrayfadeError, GrayfadeResult};

pub use crate::analysis::{PerformanceReport, measure_sequential};
pub use crate::buffer::{Channels, PixelBuffer};
pub use crate::comm::{Communicator, LocalCluster, ThreadComm};
pub use crate::coordinator::{
    COORDINATOR_RANK, EncodeErrorPolicy, Phase, PipelineOpts, RunReport, merge_rows, run_rank,
};
pub use crate::partition::{Partition, partition};
pub use crate::pipeline::{LocalRunOpts, run_distributed, run_local};
pub use crate::sequence::{DEFAULT_FRAME_COUNT, FrameDescriptor, FrameSequence, mix_factor};
pub use crate::sink::{
    FrameSink, InMemorySink, OutputOpts, PngSequenceSink, SinkConfig, frame_file_name,
};
