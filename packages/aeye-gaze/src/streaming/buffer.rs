// Fixed-capacity gaze sample ring buffer
//
// Every operation takes the same mutex and holds it only for the operation
// itself. Exports swap the whole ring out with `snapshot_and_reset`, so file
// I/O never happens under the lock and `push` stays O(1).

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use crate::types::GazeSample;

/// Upper bound on the slots reserved up front for a fresh ring
const PREALLOC_LIMIT: usize = 4096;

/// Counters describing buffer usage since creation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferMetrics {
    pub total_pushed: u64,
    pub total_evicted: u64,
    pub total_snapshotted: u64,
    pub current_size: usize,
    pub peak_size: usize,
    pub capacity: usize,
}

/// Ring buffer of processed gaze samples, oldest evicted first
pub struct GazeSampleBuffer {
    samples: Mutex<VecDeque<GazeSample>>,
    capacity: usize,

    total_pushed: AtomicU64,
    total_evicted: AtomicU64,
    total_snapshotted: AtomicU64,
    peak_size: AtomicUsize,
}

impl GazeSampleBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = if capacity == 0 {
            log::warn!("Gaze buffer capacity of 0 requested, using 1");
            1
        } else {
            capacity
        };

        Self {
            samples: Mutex::new(Self::fresh_ring(capacity)),
            capacity,
            total_pushed: AtomicU64::new(0),
            total_evicted: AtomicU64::new(0),
            total_snapshotted: AtomicU64::new(0),
            peak_size: AtomicUsize::new(0),
        }
    }

    fn fresh_ring(capacity: usize) -> VecDeque<GazeSample> {
        VecDeque::with_capacity(capacity.min(PREALLOC_LIMIT))
    }

    /// Append a sample, evicting the oldest when full
    pub fn push(&self, sample: GazeSample) {
        let len = {
            let mut samples = self.samples.lock();
            if samples.len() == self.capacity {
                samples.pop_front();
                self.total_evicted.fetch_add(1, Ordering::Relaxed);
            }
            samples.push_back(sample);
            samples.len()
        };

        self.total_pushed.fetch_add(1, Ordering::Relaxed);
        self.peak_size.fetch_max(len, Ordering::Relaxed);
    }

    /// Current occupancy
    pub fn len(&self) -> usize {
        self.samples.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Take the current contents and leave an empty ring of the same
    /// capacity in their place.
    ///
    /// A sample pushed after this returns lands in the new ring only.
    pub fn snapshot_and_reset(&self) -> Vec<GazeSample> {
        let taken = {
            let mut samples = self.samples.lock();
            std::mem::replace(&mut *samples, Self::fresh_ring(self.capacity))
        };

        self.total_snapshotted
            .fetch_add(taken.len() as u64, Ordering::Relaxed);
        Vec::from(taken)
    }

    /// Sample at `index` in insertion order (0 is the oldest)
    pub fn at(&self, index: usize) -> Option<GazeSample> {
        self.samples.lock().get(index).cloned()
    }

    /// Up to `n` most recent samples, oldest first
    pub fn recent(&self, n: usize) -> Vec<GazeSample> {
        let samples = self.samples.lock();
        let skip = samples.len().saturating_sub(n);
        samples.iter().skip(skip).cloned().collect()
    }

    /// Timestamps of the oldest and newest buffered samples
    pub fn time_span_us(&self) -> Option<(i64, i64)> {
        let samples = self.samples.lock();
        match (samples.front(), samples.back()) {
            (Some(first), Some(last)) => Some((first.timestamp_us(), last.timestamp_us())),
            _ => None,
        }
    }

    pub fn metrics(&self) -> BufferMetrics {
        BufferMetrics {
            total_pushed: self.total_pushed.load(Ordering::Relaxed),
            total_evicted: self.total_evicted.load(Ordering::Relaxed),
            total_snapshotted: self.total_snapshotted.load(Ordering::Relaxed),
            current_size: self.len(),
            peak_size: self.peak_size.load(Ordering::Relaxed),
            capacity: self.capacity,
        }
    }
}
