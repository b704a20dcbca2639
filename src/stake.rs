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

use crate::error::StoreError;
use crate::sink::FrameSink;
use crate::span::Span;

pub mod cache;
pub mod multi;
pub mod playback;
pub mod silent;
pub mod single;

pub use cache::CacheManager;
pub use multi::MultiStake;
pub use playback::{PlaybackBatch, PlaybackRead};
pub use silent::SilentStake;
pub use single::SingleStake;

/// Largest number of frames moved per block by copies, clears and bounces.
pub const BLOCK_FRAMES: usize = 8192;

/// Shared handle to a stake. Stakes are immutable apart from the bytes in their
/// backing files, so a trail snapshot is just a vector of these.
pub type StakeRef = Arc<dyn Stake>;

/// A view of a time span of sample storage.
///
/// All spans passed to a stake are in the stake's own (virtual) time frame and
/// must lie inside `span()`. Buffers are planar: `buffers[c][buf_offset..]`
/// holds channel `c`, and there must be exactly `channels()` of them.
pub trait Stake: fmt::Debug + Send + Sync {
    /// The span this stake covers.
    fn span(&self) -> Span;

    /// The number of channels the stake provides.
    fn channels(&self) -> usize;

    /// Reads the frames of `span` into the buffers and returns the number of
    /// frames read.
    fn read_frames(
        &self,
        buffers: &mut [Vec<f32>],
        buf_offset: usize,
        span: Span,
    ) -> Result<usize, StoreError>;

    /// Writes the frames of `span` from the buffers and returns the number of
    /// frames written.
    fn write_frames(
        &self,
        buffers: &[Vec<f32>],
        buf_offset: usize,
        span: Span,
    ) -> Result<usize, StoreError>;

    /// Streams the frames of `span` to a sink, block by block.
    fn copy_frames(&self, sink: &mut dyn FrameSink, span: Span) -> Result<i64, StoreError> {
        StoreError::check_range(span, self.span())?;
        StoreError::check_channels(self.channels(), sink.channels())?;

        let mut buffers = vec![vec![0.0f32; BLOCK_FRAMES]; self.channels()];
        let mut pos = span.start;
        while pos < span.stop {
            let len = (span.stop - pos).min(BLOCK_FRAMES as i64);
            let chunk = Span::with_length(pos, len);
            self.read_frames(&mut buffers, 0, chunk)?;
            sink.write_frames(&buffers, 0, len as usize)?;
            pos += len;
        }
        Ok(span.length())
    }

    /// Flushes any pending writes to disk.
    fn flush(&self) -> Result<(), StoreError>;

    /// Describes the read of `span` for a streaming backend instead of
    /// performing it.
    fn enqueue_playback_read(
        &self,
        batch: &mut PlaybackBatch,
        span: Span,
        buf_offset: usize,
    ) -> Result<(), StoreError>;

    /// Hands the backing files to a disk cache manager.
    fn register_with_cache(&self, cache: &dyn CacheManager);

    /// A new stake covering `[start, self.stop)` over the same storage.
    fn replace_start(&self, start: i64) -> StakeRef;

    /// A new stake covering `[self.start, stop)` over the same storage.
    fn replace_stop(&self, stop: i64) -> StakeRef;

    /// A new stake over the same storage whose span is moved by `delta`.
    fn shift_virtual(&self, delta: i64) -> StakeRef;

    /// True for stakes without storage.
    fn is_silent(&self) -> bool {
        false
    }
}

/// Checks the span and buffers of a read or write against a stake and returns
/// the offset of the span relative to the stake start.
pub(crate) fn check_access(
    stake: Span,
    channels: usize,
    buffers: usize,
    span: Span,
) -> Result<i64, StoreError> {
    StoreError::check_channels(channels, buffers)?;
    StoreError::check_range(span, stake)?;
    Ok(span.start - stake.start)
}
