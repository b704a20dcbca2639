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
use super::{check_access, Stake, StakeRef, BLOCK_FRAMES};
use crate::error::StoreError;
use crate::sink::FrameSink;
use crate::span::Span;

/// A read-only stake of digital silence. It owns no storage, which makes it
/// the cheap choice for long cleared regions.
#[derive(Debug, Clone)]
pub struct SilentStake {
    span: Span,
    channels: usize,
}

impl SilentStake {
    pub fn new(span: Span, channels: usize) -> Self {
        Self { span, channels }
    }
}

impl Stake for SilentStake {
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
        check_access(self.span, self.channels, buffers.len(), span)?;
        let len = span.length() as usize;
        for channel in buffers.iter_mut() {
            channel[buf_offset..buf_offset + len].fill(0.0);
        }
        Ok(len)
    }

    fn write_frames(
        &self,
        _buffers: &[Vec<f32>],
        _buf_offset: usize,
        _span: Span,
    ) -> Result<usize, StoreError> {
        Err(StoreError::read_only())
    }

    fn copy_frames(&self, sink: &mut dyn FrameSink, span: Span) -> Result<i64, StoreError> {
        StoreError::check_range(span, self.span)?;
        StoreError::check_channels(self.channels, sink.channels())?;

        let block = (span.length() as usize).min(BLOCK_FRAMES);
        let zeros = vec![vec![0.0f32; block]; self.channels];
        let mut remaining = span.length() as usize;
        while remaining > 0 {
            let len = remaining.min(BLOCK_FRAMES);
            sink.write_frames(&zeros, 0, len)?;
            remaining -= len;
        }
        Ok(span.length())
    }

    fn flush(&self) -> Result<(), StoreError> {
        Ok(())
    }

    fn enqueue_playback_read(
        &self,
        batch: &mut PlaybackBatch,
        span: Span,
        buf_offset: usize,
    ) -> Result<(), StoreError> {
        StoreError::check_range(span, self.span)?;
        batch.push(PlaybackRead::Zero {
            channels: self.channels,
            frames: span.length() as usize,
            buffer_offset: buf_offset,
        });
        Ok(())
    }

    fn register_with_cache(&self, _cache: &dyn CacheManager) {}

    fn replace_start(&self, start: i64) -> StakeRef {
        Arc::new(SilentStake::new(self.span.replace_start(start), self.channels))
    }

    fn replace_stop(&self, stop: i64) -> StakeRef {
        Arc::new(SilentStake::new(self.span.replace_stop(stop), self.channels))
    }

    fn shift_virtual(&self, delta: i64) -> StakeRef {
        Arc::new(SilentStake::new(self.span.shift(delta), self.channels))
    }

    fn is_silent(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::sink::MemorySink;

    #[test]
    fn test_reads_are_silent() -> Result<(), StoreError> {
        let stake = SilentStake::new(Span::new(0, 100), 2);
        let mut out = vec![vec![1.0; 120]; 2];
        assert_eq!(stake.read_frames(&mut out, 10, Span::new(0, 100))?, 100);
        for channel in &out {
            assert!(channel[..10].iter().all(|s| *s == 1.0));
            assert!(channel[10..110].iter().all(|s| *s == 0.0));
            assert!(channel[110..].iter().all(|s| *s == 1.0));
        }
        Ok(())
    }

    #[test]
    fn test_writes_fail() {
        let stake = SilentStake::new(Span::new(0, 100), 1);
        let err = stake
            .write_frames(&[vec![0.5; 100]], 0, Span::new(0, 100))
            .unwrap_err();
        assert!(err.is_io());
    }

    #[test]
    fn test_copy_writes_zero_blocks() -> Result<(), StoreError> {
        let stake = SilentStake::new(Span::new(0, 100), 2);
        let mut sink = MemorySink::new(2);
        assert_eq!(stake.copy_frames(&mut sink, Span::new(0, 100))?, 100);
        assert_eq!(sink.total_frames(), 100);
        assert!(sink.writes.iter().all(|w| *w <= BLOCK_FRAMES));
        for channel in &sink.planar_samples {
            assert!(channel.iter().all(|s| *s == 0.0));
        }

        let long = SilentStake::new(Span::new(0, 20_000), 1);
        let mut sink = MemorySink::new(1);
        long.copy_frames(&mut sink, Span::new(0, 20_000))?;
        assert_eq!(sink.writes, vec![8192, 8192, 3616]);
        Ok(())
    }

    #[test]
    fn test_enqueue_emits_zero_fill() -> Result<(), StoreError> {
        let stake = SilentStake::new(Span::new(50, 150), 2);
        let mut batch = PlaybackBatch::new(3);
        stake.enqueue_playback_read(&mut batch, Span::new(60, 90), 12)?;
        assert!(matches!(
            batch.reads()[0],
            PlaybackRead::Zero {
                channels: 2,
                frames: 30,
                buffer_offset: 12
            }
        ));
        assert!(stake.replace_start(100).is_silent());
        Ok(())
    }
}
