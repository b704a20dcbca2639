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

use super::descriptor::Decimation;
use super::summary::SUMMARY_VALUES;
use crate::error::StoreError;
use crate::sample_file::SampleFile;
use crate::span::Span;
use crate::stake::CacheManager;

/// Outcome of a decimated read. `ready` frames were read from disk, the `busy`
/// frames after them haven't been computed yet and were zeroed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LevelRead {
    pub ready: usize,
    pub busy: usize,
}

impl LevelRead {
    pub fn total(&self) -> usize {
        self.ready + self.busy
    }
}

#[derive(Debug, Clone)]
struct Level {
    decimation: Decimation,
    file: Arc<SampleFile>,
    /// Decimated frames of the file this level may use.
    file_span: Span,
    /// Full rate position summarized by the first frame of `file_span`.
    biased_start: i64,
    /// File frame the next summary is written to.
    cursor: i64,
}

impl Level {
    /// The file frame that summarizes the block nearest to full rate `pos`.
    fn locate(&self, pos: i64) -> i64 {
        let offset = self.decimation.align(pos - self.biased_start) >> self.decimation.shift;
        (self.file_span.start + offset).clamp(self.file_span.start, self.file_span.stop)
    }

    fn request(&self, span: Span) -> Span {
        Span::new(self.locate(span.start), self.locate(span.stop))
    }
}

/// A time span of the overview cache. Each level keeps its summaries in its
/// own file, written strictly forward through a per level cursor, so finer
/// levels can be read while coarser ones are still being computed.
pub struct DecimatedStake {
    span: Span,
    channels: usize,
    levels: Mutex<Vec<Level>>,
}

impl DecimatedStake {
    /// Creates a stake over `span` and reserves room for its summaries at the
    /// end of each level file. Level files hold `SUMMARY_VALUES` channels per
    /// track channel.
    pub fn new(
        span: Span,
        channels: usize,
        levels: Vec<(Decimation, Arc<SampleFile>)>,
    ) -> Result<DecimatedStake, StoreError> {
        let mut allotted = Vec::with_capacity(levels.len());
        for (decimation, file) in levels {
            StoreError::check_channels(channels * SUMMARY_VALUES, file.channels())?;
            let frames = (span.length() + decimation.factor - 1) >> decimation.shift;
            let file_start = file.allocate(frames);
            allotted.push(Level {
                decimation,
                file,
                file_span: Span::with_length(file_start, frames),
                biased_start: span.start,
                cursor: file_start,
            });
        }
        Ok(DecimatedStake {
            span,
            channels,
            levels: Mutex::new(allotted),
        })
    }

    pub fn span(&self) -> Span {
        self.span
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn level_count(&self) -> usize {
        self.levels.lock().len()
    }

    /// Number of decimated frames `read_frames` produces for `span`.
    pub fn clipped_length(&self, level: usize, span: Span) -> Result<usize, StoreError> {
        let levels = self.levels.lock();
        let level = get_level(&levels, level)?;
        Ok(level.request(span.intersection(&self.span)).length() as usize)
    }

    /// Frames of `level` written so far.
    pub fn written(&self, level: usize) -> Result<i64, StoreError> {
        let levels = self.levels.lock();
        let level = get_level(&levels, level)?;
        Ok((level.cursor - level.file_span.start).clamp(0, level.file_span.length()))
    }

    /// Reads the summaries of full rate `span` at `level` into `buffers`,
    /// starting at `buf_offset`. The span is clipped to the stake first.
    pub fn read_frames(
        &self,
        level: usize,
        buffers: &mut [Vec<f32>],
        buf_offset: usize,
        span: Span,
    ) -> Result<LevelRead, StoreError> {
        StoreError::check_channels(self.channels * SUMMARY_VALUES, buffers.len())?;
        let levels = self.levels.lock();
        let level = get_level(&levels, level)?;

        let request = level.request(span.intersection(&self.span));
        let requested = request.length();
        let ready = (level.cursor - request.start).clamp(0, requested);
        if ready > 0 {
            let route = level.file.identity_route();
            level
                .file
                .read_frames(request.start, buffers, buf_offset, ready as usize, &route)?;
        }
        let busy = (requested - ready) as usize;
        let ready = ready as usize;
        for channel in buffers.iter_mut() {
            channel[buf_offset + ready..buf_offset + ready + busy].fill(0.0);
        }
        Ok(LevelRead { ready, busy })
    }

    /// Appends `len` summary frames to `level` at its cursor.
    pub fn continue_write(
        &self,
        level: usize,
        buffers: &[Vec<f32>],
        buf_offset: usize,
        len: usize,
    ) -> Result<usize, StoreError> {
        StoreError::check_channels(self.channels * SUMMARY_VALUES, buffers.len())?;
        let mut levels = self.levels.lock();
        let count = levels.len();
        let level = levels.get_mut(level).ok_or(StoreError::NoSuchLevel {
            level,
            levels: count,
        })?;

        StoreError::check_range(Span::with_length(level.cursor, len as i64), level.file_span)?;
        let route = level.file.identity_route();
        level
            .file
            .write_frames(level.cursor, buffers, buf_offset, len, &route)?;
        level.cursor += len as i64;
        Ok(len)
    }

    pub fn flush(&self) -> Result<(), StoreError> {
        for level in self.levels.lock().iter() {
            level.file.flush()?;
        }
        Ok(())
    }

    /// Hands every level file to a disk cache manager.
    pub fn register_with_cache(&self, cache: &dyn CacheManager) {
        for level in self.levels.lock().iter() {
            cache.register(level.file.path());
        }
    }

    /// A stake covering `[start, self.stop)` over the same summaries. Each level
    /// moves its first frame to the block boundary nearest to `start`.
    pub fn replace_start(&self, start: i64) -> DecimatedStake {
        let span = self.span.replace_start(start);
        let levels = self
            .levels
            .lock()
            .iter()
            .map(|level| {
                let delta = level.decimation.align(span.start - level.biased_start);
                let file_start = (level.file_span.start + (delta >> level.decimation.shift))
                    .clamp(level.file_span.start, level.file_span.stop);
                Level {
                    biased_start: level.biased_start
                        + level
                            .decimation
                            .to_full_length(file_start - level.file_span.start),
                    file_span: Span::new(file_start, level.file_span.stop),
                    ..level.clone()
                }
            })
            .collect();
        DecimatedStake {
            span,
            channels: self.channels,
            levels: Mutex::new(levels),
        }
    }

    /// A stake covering `[self.start, stop)` over the same summaries. Each level
    /// keeps the frames that overlap the new span.
    pub fn replace_stop(&self, stop: i64) -> DecimatedStake {
        let span = self.span.replace_stop(stop);
        let levels = self
            .levels
            .lock()
            .iter()
            .map(|level| {
                let d = &level.decimation;
                let frames = (span.stop - level.biased_start + d.factor - 1) >> d.shift;
                let file_stop = (level.file_span.start + frames)
                    .clamp(level.file_span.start, level.file_span.stop);
                Level {
                    file_span: Span::new(level.file_span.start, file_stop),
                    ..level.clone()
                }
            })
            .collect();
        DecimatedStake {
            span,
            channels: self.channels,
            levels: Mutex::new(levels),
        }
    }

    /// A stake over the same summaries whose span is moved by `delta`.
    pub fn shift_virtual(&self, delta: i64) -> DecimatedStake {
        let levels = self
            .levels
            .lock()
            .iter()
            .map(|level| Level {
                biased_start: level.biased_start + delta,
                ..level.clone()
            })
            .collect();
        DecimatedStake {
            span: self.span.shift(delta),
            channels: self.channels,
            levels: Mutex::new(levels),
        }
    }
}

fn get_level(levels: &[Level], level: usize) -> Result<&Level, StoreError> {
    levels.get(level).ok_or(StoreError::NoSuchLevel {
        level,
        levels: levels.len(),
    })
}

impl fmt::Debug for DecimatedStake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecimatedStake")
            .field("span", &self.span)
            .field("channels", &self.channels)
            .field("levels", &self.levels.lock().len())
            .finish()
    }
}
