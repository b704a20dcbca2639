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
use std::sync::Arc;

use super::cache::CacheManager;
use super::playback::{PlaybackBatch, PlaybackRead};
use super::{check_access, Stake, StakeRef};
use crate::error::StoreError;
use crate::sample_file::SampleFile;
use crate::span::Span;

/// A stake backed by a contiguous region of one sample file. The file region
/// starts at `file_start` and has the same length as the stake span.
#[derive(Debug, Clone)]
pub struct SingleStake {
    span: Span,
    file: Arc<SampleFile>,
    file_start: i64,
}

impl SingleStake {
    pub fn new(span: Span, file: Arc<SampleFile>, file_start: i64) -> Self {
        Self {
            span,
            file,
            file_start,
        }
    }

    pub fn file(&self) -> &Arc<SampleFile> {
        &self.file
    }

    /// The region of the backing file covered by this stake.
    pub fn file_span(&self) -> Span {
        Span::with_length(self.file_start, self.span.length())
    }
}

impl Stake for SingleStake {
    fn span(&self) -> Span {
        self.span
    }

    fn channels(&self) -> usize {
        self.file.channels()
    }

    fn read_frames(
        &self,
        buffers: &mut [Vec<f32>],
        buf_offset: usize,
        span: Span,
    ) -> Result<usize, StoreError> {
        let offset = check_access(self.span, self.channels(), buffers.len(), span)?;
        let len = span.length() as usize;
        let route = self.file.identity_route();
        self.file
            .read_frames(self.file_start + offset, buffers, buf_offset, len, &route)?;
        Ok(len)
    }

    fn write_frames(
        &self,
        buffers: &[Vec<f32>],
        buf_offset: usize,
        span: Span,
    ) -> Result<usize, StoreError> {
        let offset = check_access(self.span, self.channels(), buffers.len(), span)?;
        let len = span.length() as usize;
        let route = self.file.identity_route();
        self.file
            .write_frames(self.file_start + offset, buffers, buf_offset, len, &route)?;
        Ok(len)
    }

    fn flush(&self) -> Result<(), StoreError> {
        self.file.flush()
    }

    fn enqueue_playback_read(
        &self,
        batch: &mut PlaybackBatch,
        span: Span,
        buf_offset: usize,
    ) -> Result<(), StoreError> {
        StoreError::check_range(span, self.span)?;
        batch.push(PlaybackRead::File {
            path: self.file.path().to_path_buf(),
            file_channels: self.file.channels(),
            frame_offset: self.file_start + (span.start - self.span.start),
            frames: span.length() as usize,
            route: self.file.identity_route(),
            buffer_offset: buf_offset,
        });
        Ok(())
    }

    fn register_with_cache(&self, cache: &dyn CacheManager) {
        cache.register(self.file.path());
    }

    fn replace_start(&self, start: i64) -> StakeRef {
        Arc::new(SingleStake {
            span: self.span.replace_start(start),
            file: self.file.clone(),
            file_start: self.file_start + (start - self.span.start),
        })
    }

    fn replace_stop(&self, stop: i64) -> StakeRef {
        Arc::new(SingleStake {
            span: self.span.replace_stop(stop),
            file: self.file.clone(),
            file_start: self.file_start,
        })
    }

    fn shift_virtual(&self, delta: i64) -> StakeRef {
        Arc::new(SingleStake {
            span: self.span.shift(delta),
            file: self.file.clone(),
            file_start: self.file_start,
        })
    }
}
