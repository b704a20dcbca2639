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
// Read descriptors for a streaming playback backend. The playback path never
// reads sample files itself: it collects what has to be read where, and the
// backend (usually a separate low latency renderer) executes the batch.
//

use std::path::PathBuf;

use crate::error::StoreError;
use crate::sample_file::SampleFile;

/// One read for the playback backend.
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackRead {
    /// Read `frames` frames at `frame_offset` of an interleaved f32 file.
    /// `route[c]` is the buffer channel that file channel `c` lands in.
    File {
        path: PathBuf,
        file_channels: usize,
        frame_offset: i64,
        frames: usize,
        route: Vec<Option<usize>>,
        buffer_offset: usize,
    },
    /// Fill `frames` frames of the first `channels` buffer channels with
    /// silence.
    Zero {
        channels: usize,
        frames: usize,
        buffer_offset: usize,
    },
}

/// The reads that fill one remote buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackBatch {
    buffer_id: i32,
    reads: Vec<PlaybackRead>,
}

impl PlaybackBatch {
    /// Creates an empty batch for the given remote buffer.
    pub fn new(buffer_id: i32) -> Self {
        Self {
            buffer_id,
            reads: Vec::new(),
        }
    }

    pub fn buffer_id(&self) -> i32 {
        self.buffer_id
    }

    pub fn push(&mut self, read: PlaybackRead) {
        self.reads.push(read);
    }

    pub fn reads(&self) -> &[PlaybackRead] {
        &self.reads
    }

    pub fn is_empty(&self) -> bool {
        self.reads.is_empty()
    }

    pub fn into_reads(self) -> Vec<PlaybackRead> {
        self.reads
    }

    /// Executes the batch in process into planar buffers. Backends running in
    /// the same process use this; it's also how batches are verified.
    pub fn execute_local(&self, buffers: &mut [Vec<f32>]) -> Result<(), StoreError> {
        for read in &self.reads {
            match read {
                PlaybackRead::File {
                    path,
                    file_channels,
                    frame_offset,
                    frames,
                    route,
                    buffer_offset,
                } => {
                    let file = SampleFile::open(path, *file_channels)?;
                    file.read_frames(*frame_offset, buffers, *buffer_offset, *frames, route)?;
                }
                PlaybackRead::Zero {
                    channels,
                    frames,
                    buffer_offset,
                } => {
                    for channel in buffers.iter_mut().take(*channels) {
                        channel[*buffer_offset..*buffer_offset + *frames].fill(0.0);
                    }
                }
            }
        }
        Ok(())
    }
}
