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
use crate::error::StoreError;

/// A destination that accepts planar frames strictly in order.
pub trait FrameSink {
    /// Number of channels the sink expects per frame.
    fn channels(&self) -> usize;

    /// Appends `len` frames taken from `buffers[c][buf_offset..]`.
    /// `buffers` must have exactly `channels()` elements.
    fn write_frames(
        &mut self,
        buffers: &[Vec<f32>],
        buf_offset: usize,
        len: usize,
    ) -> Result<(), StoreError>;
}

/// Collects everything written into memory. Useful for tests and for small
/// bounces that never touch the disk.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    /// One vector per channel.
    pub planar_samples: Vec<Vec<f32>>,
    /// Sizes of the individual writes, in frames.
    pub writes: Vec<usize>,
}

impl MemorySink {
    pub fn new(channels: usize) -> Self {
        Self {
            planar_samples: vec![Vec::new(); channels],
            writes: Vec::new(),
        }
    }

    pub fn total_frames(&self) -> usize {
        self.planar_samples.first().map(|c| c.len()).unwrap_or(0)
    }
}

impl FrameSink for MemorySink {
    fn channels(&self) -> usize {
        self.planar_samples.len()
    }

    fn write_frames(
        &mut self,
        buffers: &[Vec<f32>],
        buf_offset: usize,
        len: usize,
    ) -> Result<(), StoreError> {
        StoreError::check_channels(self.planar_samples.len(), buffers.len())?;
        for (out, input) in self.planar_samples.iter_mut().zip(buffers) {
            out.extend_from_slice(&input[buf_offset..buf_offset + len]);
        }
        self.writes.push(len);
        Ok(())
    }
}
