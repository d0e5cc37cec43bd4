//! Staged state with atomic commit.
//!
//! The writer owns a staging [`StateFrame`] and updates it freely between
//! commits. [`StateWriter::commit`] copies the staged frame into the shared
//! published frame while holding a `parking_lot::Mutex`, then bumps the
//! generation. Readers copy the published frame under the same lock. Both
//! copies reuse existing storage, so steady-state operation does not
//! allocate.

use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use trackwire_types::TrackerSample;

/// Complete published state of one device.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StateFrame {
    pub trackers: Vec<TrackerSample>,
    pub buttons: Vec<bool>,
    pub valuators: Vec<f64>,
    /// Commit that produced this frame; 0 before the first commit.
    pub generation: u64,
}

impl StateFrame {
    pub fn new(trackers: usize, buttons: usize, valuators: usize) -> Self {
        Self {
            trackers: vec![TrackerSample::default(); trackers],
            buttons: vec![false; buttons],
            valuators: vec![0.0; valuators],
            generation: 0,
        }
    }

    /// Overwrite `self` with `other`, reusing allocations when sizes match.
    pub fn copy_from(&mut self, other: &StateFrame) {
        self.trackers.clone_from(&other.trackers);
        self.buttons.clone_from(&other.buttons);
        self.valuators.clone_from(&other.valuators);
        self.generation = other.generation;
    }
}

#[derive(Debug)]
struct Shared {
    published: Mutex<StateFrame>,
    generation: AtomicU64,
}

/// Create a connected writer/reader pair with preallocated storage.
pub fn state_sink(trackers: usize, buttons: usize, valuators: usize) -> (StateWriter, StateReader) {
    let staging = StateFrame::new(trackers, buttons, valuators);
    let shared = Arc::new(Shared {
        published: Mutex::new(staging.clone()),
        generation: AtomicU64::new(0),
    });
    (
        StateWriter {
            staging,
            shared: Arc::clone(&shared),
            dirty: false,
        },
        StateReader { shared },
    )
}

/// The single producer side of a sink.
#[derive(Debug)]
pub struct StateWriter {
    staging: StateFrame,
    shared: Arc<Shared>,
    dirty: bool,
}

impl StateWriter {
    /// Stage a tracker sample; `false` when `index` is out of range.
    pub fn set_tracker_state(&mut self, index: usize, sample: TrackerSample) -> bool {
        match self.staging.trackers.get_mut(index) {
            Some(slot) => {
                *slot = sample;
                self.dirty = true;
                true
            }
            None => false,
        }
    }

    pub fn set_button_state(&mut self, index: usize, pressed: bool) -> bool {
        match self.staging.buttons.get_mut(index) {
            Some(slot) => {
                *slot = pressed;
                self.dirty = true;
                true
            }
            None => false,
        }
    }

    pub fn set_valuator_state(&mut self, index: usize, value: f64) -> bool {
        match self.staging.valuators.get_mut(index) {
            Some(slot) => {
                *slot = value;
                self.dirty = true;
                true
            }
            None => false,
        }
    }

    /// Staged (not necessarily committed) tracker sample.
    pub fn tracker(&self, index: usize) -> Option<&TrackerSample> {
        self.staging.trackers.get(index)
    }

    pub fn staged(&self) -> &StateFrame {
        &self.staging
    }

    /// Whether anything was staged since the last commit.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Publish the staged frame as a new generation and return it.
    pub fn commit(&mut self) -> u64 {
        let generation = self.staging.generation + 1;
        self.staging.generation = generation;
        {
            let mut published = self.shared.published.lock();
            published.copy_from(&self.staging);
        }
        self.shared.generation.store(generation, Ordering::Release);
        self.dirty = false;
        generation
    }

    pub fn reader(&self) -> StateReader {
        StateReader {
            shared: Arc::clone(&self.shared),
        }
    }
}

/// Consumer side of a sink; cheap to clone.
#[derive(Debug, Clone)]
pub struct StateReader {
    shared: Arc<Shared>,
}

impl StateReader {
    /// Copy the latest committed frame into `out`.
    pub fn snapshot_into(&self, out: &mut StateFrame) {
        let published = self.shared.published.lock();
        out.copy_from(&published);
    }

    pub fn snapshot(&self) -> StateFrame {
        self.shared.published.lock().clone()
    }

    /// Latest committed generation, without taking the lock.
    pub fn generation(&self) -> u64 {
        self.shared.generation.load(Ordering::Acquire)
    }

    pub fn tracker(&self, index: usize) -> Option<TrackerSample> {
        self.shared.published.lock().trackers.get(index).copied()
    }

    pub fn button(&self, index: usize) -> Option<bool> {
        self.shared.published.lock().buttons.get(index).copied()
    }

    pub fn valuator(&self, index: usize) -> Option<f64> {
        self.shared.published.lock().valuators.get(index).copied()
    }
}
