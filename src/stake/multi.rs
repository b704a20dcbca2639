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
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use super::cache::CacheManager;
use super::playback::{PlaybackBatch, PlaybackRead};
use super::{check_access, Stake, StakeRef};
use crate::error::StoreError;
use crate::sample_file::SampleFile;
use crate::span::Span;

/// A stake whose channels are spread over several sample files.
///
/// Track channels are numbered consecutively across the files: the channels of
/// file 0 come first, then those of file 1 and so on. `channel_maps[i][k]`
/// names the channel of file `i` that provides the `k`-th track channel taken
/// from that file, so a file may hold more channels than the stake uses.
pub struct MultiStake {
    span: Span,
    files: Vec<Arc<SampleFile>>,
    /// Region of each file covered by this stake. Always as long as `span`.
    file_spans: Vec<Span>,
    /// Region of each file this stake (and its resized descendants) may use.
    max_file_spans: Vec<Span>,
    channel_maps: Vec<Vec<usize>>,
    channels: usize,
    /// Serializes file cursors across all files of one call.
    io_lock: Mutex<()>,
}

impl MultiStake {
    /// Creates a new multi-file stake. Fails if the file spans don't match the
    /// stake span, or a channel map points past the channels of its file or
    /// names one file channel twice.
    pub fn new(
        span: Span,
        files: Vec<Arc<SampleFile>>,
        file_spans: Vec<Span>,
        max_file_spans: Vec<Span>,
        channel_maps: Vec<Vec<usize>>,
    ) -> Result<Self, StoreError> {
        StoreError::check_channels(files.len(), file_spans.len())?;
        StoreError::check_channels(files.len(), max_file_spans.len())?;
        StoreError::check_channels(files.len(), channel_maps.len())?;

        for ((file, file_span), (max_span, map)) in files
            .iter()
            .zip(&file_spans)
            .zip(max_file_spans.iter().zip(&channel_maps))
        {
            if file_span.length() != span.length() {
                return Err(StoreError::OutOfRange {
                    span: *file_span,
                    bounds: span,
                });
            }
            StoreError::check_range(*file_span, *max_span)?;
            if let Some(bad) = map.iter().find(|c| **c >= file.channels()) {
                return Err(StoreError::ChannelMismatch {
                    expected: file.channels(),
                    actual: *bad + 1,
                });
            }
            // Each file channel backs at most one track channel.
            let mut used = vec![false; file.channels()];
            for channel in map {
                if std::mem::replace(&mut used[*channel], true) {
                    return Err(StoreError::ChannelMismatch {
                        expected: file.channels(),
                        actual: map.len(),
                    });
                }
            }
        }

        let channels = channel_maps.iter().map(|m| m.len()).sum();
        Ok(Self {
            span,
            files,
            file_spans,
            max_file_spans,
            channel_maps,
            channels,
            io_lock: Mutex::new(()),
        })
    }

    pub fn file_spans(&self) -> &[Span] {
        &self.file_spans
    }

    /// The per-call view of file channels onto buffer slots for file `index`.
    fn route(&self, index: usize) -> Vec<Option<usize>> {
        let first_slot: usize = self.channel_maps[..index].iter().map(|m| m.len()).sum();
        let mut route = vec![None; self.files[index].channels()];
        for (k, file_channel) in self.channel_maps[index].iter().enumerate() {
            route[*file_channel] = Some(first_slot + k);
        }
        route
    }

    fn with_spans(&self, span: Span, file_spans: Vec<Span>) -> MultiStake {
        MultiStake {
            span,
            files: self.files.clone(),
            file_spans,
            max_file_spans: self.max_file_spans.clone(),
            channel_maps: self.channel_maps.clone(),
            channels: self.channels,
            io_lock: Mutex::new(()),
        }
    }
}

impl Stake for MultiStake {
    fn span(&self) -> Span {
        self.span
    }

    fn channels(&self) -> usize {
        self.channels
    }

    fn read_frames(
        &self,
        buffers: &mut [Vec<f32>],
        buf_offset: usize,
        span: Span,
    ) -> Result<usize, StoreError> {
        let offset = check_access(self.span, self.channels, buffers.len(), span)?;
        let len = span.length() as usize;

        let _guard = self.io_lock.lock();
        for (i, file) in self.files.iter().enumerate() {
            let route = self.route(i);
            file.read_frames(
                self.file_spans[i].start + offset,
                buffers,
                buf_offset,
                len,
                &route,
            )?;
        }
        Ok(len)
    }

    fn write_frames(
        &self,
        buffers: &[Vec<f32>],
        buf_offset: usize,
        span: Span,
    ) -> Result<usize, StoreError> {
        let offset = check_access(self.span, self.channels, buffers.len(), span)?;
        let len = span.length() as usize;

        let _guard = self.io_lock.lock();
        for (i, file) in self.files.iter().enumerate() {
            let route = self.route(i);
            file.write_frames(
                self.file_spans[i].start + offset,
                buffers,
                buf_offset,
                len,
                &route,
            )?;
        }
        Ok(len)
    }

    /// Leaves every file cursor at the end of this stake's region, where the
    /// next allocation continues.
    fn flush(&self) -> Result<(), StoreError> {
        let _guard = self.io_lock.lock();
        for (file, file_span) in self.files.iter().zip(&self.file_spans) {
            file.seek(file_span.stop)?;
            file.flush()?;
        }
        Ok(())
    }

    fn enqueue_playback_read(
        &self,
        batch: &mut PlaybackBatch,
        span: Span,
        buf_offset: usize,
    ) -> Result<(), StoreError> {
        StoreError::check_range(span, self.span)?;
        let offset = span.start - self.span.start;
        for (i, file) in self.files.iter().enumerate() {
            batch.push(PlaybackRead::File {
                path: file.path().to_path_buf(),
                file_channels: file.channels(),
                frame_offset: self.file_spans[i].start + offset,
                frames: span.length() as usize,
                route: self.route(i),
                buffer_offset: buf_offset,
            });
        }
        Ok(())
    }

    fn register_with_cache(&self, cache: &dyn CacheManager) {
        for file in &self.files {
            cache.register(file.path());
        }
    }

    fn replace_start(&self, start: i64) -> StakeRef {
        let delta = start - self.span.start;
        let file_spans = self
            .file_spans
            .iter()
            .map(|s| s.replace_start(s.start + delta))
            .collect();
        Arc::new(self.with_spans(self.span.replace_start(start), file_spans))
    }

    fn replace_stop(&self, stop: i64) -> StakeRef {
        let span = self.span.replace_stop(stop);
        let file_spans = self
            .file_spans
            .iter()
            .map(|s| Span::with_length(s.start, span.length()))
            .collect();
        Arc::new(self.with_spans(span, file_spans))
    }

    fn shift_virtual(&self, delta: i64) -> StakeRef {
        Arc::new(self.with_spans(self.span.shift(delta), self.file_spans.clone()))
    }
}

impl fmt::Debug for MultiStake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultiStake")
            .field("span", &self.span)
            .field("file_spans", &self.file_spans)
            .field("channel_maps", &self.channel_maps)
            .finish()
    }
}
