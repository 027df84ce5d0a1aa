use sweep_frame::Sample;
use tracing::{trace, warn};

use crate::scan::Scan;

/// Longest revolution kept while waiting for the next boundary. Slowest motor
/// at the fastest rate yields about 1100 samples.
pub const MAX_SCAN_SAMPLES: usize = 4096;

/// Where the accumulator is within the revolution stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccumulatorState {
    /// Dropping samples until the next sync-flagged one.
    AwaitingBoundary,
    /// Collecting the in-progress revolution.
    Accumulating,
}

/// Assembles a stream of samples into complete revolutions.
///
/// A sync-flagged sample both completes the in-progress scan and becomes the
/// first sample of the next one, so consecutive scans never lose or
/// duplicate a boundary sample.
#[derive(Debug)]
pub struct ScanAccumulator {
    state: AccumulatorState,
    current: Vec<Sample>,
    discarded: usize,
}

impl Default for ScanAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

impl ScanAccumulator {
    pub fn new() -> Self {
        Self {
            state: AccumulatorState::AwaitingBoundary,
            current: Vec::new(),
            discarded: 0,
        }
    }

    pub fn state(&self) -> AccumulatorState {
        self.state
    }

    /// Samples collected for the in-progress scan.
    pub fn pending(&self) -> usize {
        self.current.len()
    }

    /// Feed one sample. Returns the completed scan when `sample` closes a
    /// revolution.
    pub fn push(&mut self, sample: Sample) -> Option<Scan> {
        match (self.state, sample.sync) {
            (AccumulatorState::AwaitingBoundary, false) => {
                self.discarded += 1;
                None
            }
            (AccumulatorState::AwaitingBoundary, true) => {
                if self.discarded > 0 {
                    trace!(discarded = self.discarded, "dropped partial revolution");
                    self.discarded = 0;
                }
                self.current.push(sample);
                self.state = AccumulatorState::Accumulating;
                None
            }
            (AccumulatorState::Accumulating, false) => {
                if self.current.len() >= MAX_SCAN_SAMPLES {
                    warn!(
                        samples = self.current.len(),
                        "no revolution boundary; dropping oversized scan"
                    );
                    self.reset();
                    self.discarded = 1;
                    return None;
                }
                self.current.push(sample);
                None
            }
            (AccumulatorState::Accumulating, true) => {
                let capacity = self.current.len();
                let done = std::mem::replace(&mut self.current, Vec::with_capacity(capacity));
                self.current.push(sample);
                Some(Scan::from_samples(done))
            }
        }
    }

    /// Abandon the in-progress scan and wait for the next boundary.
    pub fn reset(&mut self) {
        self.current.clear();
        self.discarded = 0;
        self.state = AccumulatorState::AwaitingBoundary;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(angle: i32, sync: bool) -> Sample {
        Sample {
            angle,
            distance: 100,
            signal_strength: 1,
            sync,
        }
    }

    #[test]
    fn drops_partial_revolution_before_first_boundary() {
        let mut acc = ScanAccumulator::new();
        assert!(acc.push(sample(10, false)).is_none());
        assert!(acc.push(sample(20, false)).is_none());
        assert_eq!(acc.state(), AccumulatorState::AwaitingBoundary);
        assert_eq!(acc.pending(), 0);

        assert!(acc.push(sample(0, true)).is_none());
        assert_eq!(acc.state(), AccumulatorState::Accumulating);
        assert_eq!(acc.pending(), 1);
    }

    #[test]
    fn boundary_sample_starts_next_scan() {
        let mut acc = ScanAccumulator::new();
        acc.push(sample(0, true));
        acc.push(sample(1, false));
        acc.push(sample(2, false));

        let first = acc.push(sample(3, true)).unwrap();
        assert_eq!(first.len(), 3);
        assert!(first.samples()[0].sync);
        assert_eq!(acc.pending(), 1);

        acc.push(sample(4, false));
        let second = acc.push(sample(5, true)).unwrap();
        let angles: Vec<i32> = second.iter().map(|s| s.angle).collect();
        assert_eq!(angles, vec![3, 4]);
    }

    #[test]
    fn missing_boundary_is_bounded() {
        let mut acc = ScanAccumulator::new();
        acc.push(sample(0, true));
        for i in 1..MAX_SCAN_SAMPLES {
            assert!(acc.push(sample(i as i32, false)).is_none());
        }
        assert_eq!(acc.pending(), MAX_SCAN_SAMPLES);

        assert!(acc.push(sample(0, false)).is_none());
        assert_eq!(acc.state(), AccumulatorState::AwaitingBoundary);
        assert_eq!(acc.pending(), 0);

        acc.push(sample(0, true));
        acc.push(sample(1, false));
        let scan = acc.push(sample(2, true)).unwrap();
        assert_eq!(scan.len(), 2);
    }

    #[test]
    fn reset_discards_in_progress_scan() {
        let mut acc = ScanAccumulator::new();
        acc.push(sample(0, true));
        acc.push(sample(1, false));
        acc.reset();

        assert_eq!(acc.state(), AccumulatorState::AwaitingBoundary);
        assert_eq!(acc.pending(), 0);
        assert!(acc.push(sample(2, false)).is_none());
        assert_eq!(acc.pending(), 0);
    }
}
