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
use tracing::{info, span, Level};

use super::Trail;
use crate::error::{EditStatus, StoreError};
use crate::progress::ProgressHandle;
use crate::sink::FrameSink;
use crate::span::Span;
use crate::stake::BLOCK_FRAMES;

impl Trail {
    /// Bakes `span` of the trail into one contiguous sink.
    ///
    /// `channel_map[i]` is the trail channel written to sink channel `i`. If
    /// the trail ends before `span` does, the rest is written as silence. A
    /// cancelled flatten leaves a partially written sink behind.
    pub fn flatten(
        &self,
        sink: &mut dyn FrameSink,
        span: Span,
        channel_map: &[usize],
        progress: &ProgressHandle,
    ) -> Result<EditStatus, StoreError> {
        StoreError::check_channels(sink.channels(), channel_map.len())?;
        if let Some(channel) = channel_map.iter().find(|c| **c >= self.channels) {
            return Err(StoreError::ChannelMismatch {
                expected: self.channels,
                actual: channel + 1,
            });
        }
        if span.start < 0 {
            return Err(StoreError::InvalidSpan {
                span,
                bounds: self.span(),
            });
        }
        if span.is_empty() {
            return Ok(EditStatus::Completed);
        }

        let flatten_span = span!(Level::INFO, "flatten", %span);
        let _enter = flatten_span.enter();

        let stakes = self.stakes();
        let identity = channel_map.len() == self.channels
            && channel_map.iter().enumerate().all(|(i, c)| i == *c);
        let len = span.length();

        let mut pos = span.start;
        if identity {
            // Stakes stream themselves into the sink.
            let mut index = stakes.partition_point(|s| s.span().stop <= span.start);
            while pos < span.stop && index < stakes.len() {
                let chunk = stakes[index].span().intersection(&Span::new(pos, span.stop));
                if chunk.is_empty() || chunk.start != pos {
                    break;
                }
                let mut block_pos = chunk.start;
                while block_pos < chunk.stop {
                    let n = (chunk.stop - block_pos).min(BLOCK_FRAMES as i64);
                    stakes[index].copy_frames(sink, Span::with_length(block_pos, n))?;
                    block_pos += n;
                    if !progress.report_progress((block_pos - span.start) as f32 / len as f32) {
                        info!(frames = block_pos - span.start, "Flatten cancelled");
                        return Ok(EditStatus::Cancelled);
                    }
                }
                pos = chunk.stop;
                index += 1;
            }
        }

        let block = (span.stop - pos).clamp(0, BLOCK_FRAMES as i64) as usize;
        let mut buffers = vec![vec![0.0f32; block]; self.channels];
        let mut out = vec![vec![0.0f32; block]; channel_map.len()];
        while pos < span.stop {
            let n = (span.stop - pos).min(BLOCK_FRAMES as i64);
            // Reads past the end of the trail come back as silence, with a
            // warning.
            Trail::read_stakes(&stakes, &mut buffers, 0, Span::with_length(pos, n))?;
            for (sink_channel, trail_channel) in channel_map.iter().enumerate() {
                out[sink_channel][..n as usize]
                    .copy_from_slice(&buffers[*trail_channel][..n as usize]);
            }
            sink.write_frames(&out, 0, n as usize)?;
            pos += n;
            if !progress.report_progress((pos - span.start) as f32 / len as f32) {
                info!(frames = pos - span.start, "Flatten cancelled");
                return Ok(EditStatus::Cancelled);
            }
        }
        Ok(EditStatus::Completed)
    }
}
