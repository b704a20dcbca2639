// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use parking_lot::Mutex;

/// A progress handle is passed to every long running edit. Edits report their
/// progress after each block and stop at the next block boundary once the
/// handle has been cancelled.
///
/// Clones share state, so a UI thread can hold one clone to cancel or watch
/// progress while a worker runs the edit with another.
#[derive(Clone)]
pub struct ProgressHandle {
    cancelled: Arc<AtomicBool>,
    /// Overall progress in `[0, 1]`. Never decreases.
    progress: Arc<Mutex<f32>>,
    /// The part of the overall range this handle reports into.
    base: f32,
    weight: f32,
}

impl Default for ProgressHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressHandle {
    /// Creates a new progress handle covering the whole range.
    pub fn new() -> ProgressHandle {
        ProgressHandle {
            cancelled: Arc::new(AtomicBool::new(false)),
            progress: Arc::new(Mutex::new(0.0)),
            base: 0.0,
            weight: 1.0,
        }
    }

    /// Returns a handle that maps its own `[0, 1]` range onto
    /// `[base, base + weight]` of this handle's range. Used when one operation
    /// runs several dependent passes.
    pub fn stage(&self, base: f32, weight: f32) -> ProgressHandle {
        ProgressHandle {
            cancelled: self.cancelled.clone(),
            progress: self.progress.clone(),
            base: self.base + base.clamp(0.0, 1.0) * self.weight,
            weight: weight.clamp(0.0, 1.0) * self.weight,
        }
    }

    /// Records the fraction of this handle's range that is done. Returns false
    /// if the operation should stop.
    pub fn report_progress(&self, fraction: f32) -> bool {
        let overall = self.base + fraction.clamp(0.0, 1.0) * self.weight;
        {
            let mut progress = self.progress.lock();
            if overall > *progress {
                *progress = overall;
            }
        }
        !self.is_cancelled()
    }

    /// The overall progress reported so far.
    pub fn progress(&self) -> f32 {
        *self.progress.lock()
    }

    /// Returns true if the operation has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Cancels the operation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }
}
