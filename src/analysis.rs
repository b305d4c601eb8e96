//! Speedup and efficiency of a parallel run against the sequential reference.

use std::time::Duration;

use crate::buffer::PixelBuffer;
use crate::foundation::error::{GrayfadeError, GrayfadeResult};
use crate::pipeline::{LocalRunOpts, run_local};
use crate::sink::InMemorySink;

/// Time the sequential reference: grayscale plus every frame, kept in memory and never encoded.
pub fn measure_sequential(source: &PixelBuffer, frame_count: u64) -> GrayfadeResult<Duration> {
    let mut frames = InMemorySink::new();
    let opts = LocalRunOpts {
        frame_count,
        ..LocalRunOpts::default()
    };
    let report = run_local(source, &opts, &mut frames)?;
    Ok(report.compute_elapsed)
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PerformanceReport {
    pub sequential_secs: f64,
    pub parallel_secs: f64,
    pub processors: usize,
    /// `sequential_secs / parallel_secs`.
    pub speedup: f64,
    /// `speedup / processors`.
    pub efficiency: f64,
}

impl PerformanceReport {
    pub fn new(
        sequential_secs: f64,
        parallel_secs: f64,
        processors: usize,
    ) -> GrayfadeResult<Self> {
        if !(sequential_secs.is_finite() && sequential_secs >= 0.0) {
            return Err(GrayfadeError::configuration(format!(
                "sequential time must be >= 0 seconds, got {sequential_secs}"
            )));
        }
        if !(parallel_secs.is_finite() && parallel_secs > 0.0) {
            return Err(GrayfadeError::configuration(format!(
                "parallel time must be > 0 seconds, got {parallel_secs}"
            )));
        }
        if processors == 0 {
            return Err(GrayfadeError::configuration("processor count must be >= 1"));
        }
        let speedup = sequential_secs / parallel_secs;
        Ok(Self {
            sequential_secs,
            parallel_secs,
            processors,
            speedup,
            efficiency: speedup / processors as f64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::Channels;
    use crate::foundation::core::Dims;

    #[test]
    fn speedup_and_efficiency() {
        let r = PerformanceReport::new(8.0, 2.0, 4).unwrap();
        assert_eq!(r.speedup, 4.0);
        assert_eq!(r.efficiency, 1.0);

        let r = PerformanceReport::new(3.0, 2.0, 2).unwrap();
        assert_eq!(r.speedup, 1.5);
        assert_eq!(r.efficiency, 0.75);
    }

    #[test]
    fn non_positive_inputs_are_rejected() {
        assert!(PerformanceReport::new(1.0, 0.0, 2).is_err());
        assert!(PerformanceReport::new(1.0, -1.0, 2).is_err());
        assert!(PerformanceReport::new(-0.5, 1.0, 2).is_err());
        assert!(PerformanceReport::new(1.0, 1.0, 0).is_err());
        assert!(PerformanceReport::new(1.0, f64::NAN, 1).is_err());
    }

    #[test]
    fn sequential_measurement_runs_every_frame() {
        let source = PixelBuffer::new(Dims::new(4, 4), Channels::Rgb);
        assert!(measure_sequential(&source, 3).is_ok());
        assert!(measure_sequential(&source, 0).is_err());
    }
}
