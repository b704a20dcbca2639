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

use clap::ValueEnum;
use serde::Deserialize;
use tracing::{debug, info, span, Level};

use super::{Trail, TrailEdit};
use crate::blend::BlendContext;
use crate::error::{EditStatus, StoreError};
use crate::progress::ProgressHandle;
use crate::span::Span;
use crate::stake::{SilentStake, StakeRef, BLOCK_FRAMES};

/// How a cleared region is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ClearMode {
    /// Prepare the region for removal by crossfading across it.
    Insert,
    /// Silence the region in place.
    Overwrite,
}

impl Trail {
    /// Clears `span` on the channels selected by `track_map`.
    ///
    /// In overwrite mode the selected channels fade out over the start of the
    /// span, stay silent and fade back in at its end. In insert mode the
    /// material around the span is crossfaded into both of its borders, which
    /// prepares a seamless cut; the trail length is unchanged either way.
    pub fn clear_range(
        &self,
        span: Span,
        mode: ClearMode,
        track_map: &[bool],
        blend: &BlendContext,
        progress: &ProgressHandle,
    ) -> Result<EditStatus, StoreError> {
        StoreError::check_channels(self.channels, track_map.len())?;
        self.check_inside(span)?;

        let clear_span = span!(Level::INFO, "clear range", ?mode, %span);
        let _enter = clear_span.enter();

        match mode {
            ClearMode::Insert => {
                if !self.all_selected(track_map)? || blend.is_empty() {
                    return Ok(EditStatus::Completed);
                }
                match self.build_cut(span, blend, progress)? {
                    Some(edit) => {
                        self.commit(edit)?;
                        Ok(EditStatus::Completed)
                    }
                    None => Ok(EditStatus::Cancelled),
                }
            }
            ClearMode::Overwrite => self.overwrite_clear(span, track_map, blend, progress),
        }
    }

    /// Deletes `span` from the trail, crossfading the material on both sides of
    /// the cut. The blend and the removal are published as one edit.
    pub fn remove_range(
        &self,
        span: Span,
        track_map: &[bool],
        blend: &BlendContext,
        progress: &ProgressHandle,
    ) -> Result<EditStatus, StoreError> {
        StoreError::check_channels(self.channels, track_map.len())?;
        self.check_inside(span)?;
        if span.is_empty() || !self.all_selected(track_map)? {
            return Ok(EditStatus::Completed);
        }

        let remove_span = span!(Level::INFO, "remove range", %span);
        let _enter = remove_span.enter();

        let edit = if blend.is_empty() {
            TrailEdit::new()
        } else {
            match self.build_cut(span, blend, progress)? {
                Some(edit) => edit,
                None => return Ok(EditStatus::Cancelled),
            }
        };
        self.commit(edit.remove(span))?;
        debug!(length = self.length(), "Range removed");
        Ok(EditStatus::Completed)
    }

    /// True if every channel is selected, false if none is. Anything else
    /// would change the length of some channels only.
    fn all_selected(&self, track_map: &[bool]) -> Result<bool, StoreError> {
        let selected = track_map.iter().filter(|s| **s).count();
        if selected == 0 {
            Ok(false)
        } else if selected == self.channels {
            Ok(true)
        } else {
            Err(StoreError::ChannelSyncLost)
        }
    }

    /// Writes the crossfade from the material before `span` into the material
    /// after it. The result covers `[start - left, start)` and
    /// `[stop, stop + right)`, which become adjacent once `span` is removed.
    /// Returns `None` if cancelled.
    fn build_cut(
        &self,
        span: Span,
        blend: &BlendContext,
        progress: &ProgressHandle,
    ) -> Result<Option<TrailEdit>, StoreError> {
        let left = blend.left_length().min(span.start);
        let right = blend.right_length().min(self.length() - span.stop);
        let total = left + right;
        if total == 0 {
            return Ok(Some(TrailEdit::new()));
        }
        let ctx = BlendContext::split(left, right, blend.curve());

        let stakes = self.stakes();
        let left_span = Span::new(span.start - left, span.start);
        let right_span = Span::with_length(span.stop, right);
        let left_stake = if left > 0 {
            Some(self.alloc(left_span)?)
        } else {
            None
        };
        let right_stake = if right > 0 {
            Some(self.alloc(right_span)?)
        } else {
            None
        };

        let block = (total as usize).min(BLOCK_FRAMES);
        let mut outgoing = vec![vec![0.0f32; block]; self.channels];
        let mut incoming = vec![vec![0.0f32; block]; self.channels];
        let mut out = vec![vec![0.0f32; block]; self.channels];

        let mut pos = 0i64;
        while pos < total {
            let n = (total - pos).min(BLOCK_FRAMES as i64);
            Trail::read_clamped(
                &stakes,
                &mut outgoing,
                0,
                Span::with_length(left_span.start + pos, n),
            )?;
            Trail::read_clamped(
                &stakes,
                &mut incoming,
                0,
                Span::with_length(span.stop - left + pos, n),
            )?;
            for channel in 0..self.channels {
                ctx.blend(
                    pos,
                    &outgoing[channel][..n as usize],
                    &incoming[channel][..n as usize],
                    &mut out[channel][..n as usize],
                );
            }

            // Frames before `left` belong in front of the cut.
            let in_left = (left - pos).clamp(0, n);
            if let Some(stake) = &left_stake {
                if in_left > 0 {
                    let chunk = Span::with_length(left_span.start + pos, in_left);
                    stake.write_frames(&out, 0, chunk)?;
                }
            }
            if let Some(stake) = &right_stake {
                if in_left < n {
                    let start = span.stop + (pos + in_left - left);
                    stake.write_frames(
                        &out,
                        in_left as usize,
                        Span::with_length(start, n - in_left),
                    )?;
                }
            }

            pos += n;
            if !progress.report_progress(pos as f32 / total as f32) {
                info!(frames = pos, "Clear cancelled");
                return Ok(None);
            }
        }

        let mut edit = TrailEdit::new();
        if let Some(stake) = left_stake {
            stake.flush()?;
            edit = edit.replace(left_span, vec![stake]);
        }
        if let Some(stake) = right_stake {
            stake.flush()?;
            edit = edit.replace(right_span, vec![stake]);
        }
        Ok(Some(edit))
    }

    fn overwrite_clear(
        &self,
        span: Span,
        track_map: &[bool],
        blend: &BlendContext,
        progress: &ProgressHandle,
    ) -> Result<EditStatus, StoreError> {
        if span.is_empty() || !track_map.iter().any(|s| *s) {
            return Ok(EditStatus::Completed);
        }

        let len = span.length();
        let lead = blend.length().min(len / 2);
        let tail = blend.length().min(len - lead);
        let fades = Fades {
            span,
            fade_out: BlendContext::new(lead, blend.curve()),
            fade_in: BlendContext::new(tail, blend.curve()),
        };
        let middle = len - lead - tail;
        let stakes = self.stakes();

        let replacement: Vec<StakeRef> =
            if track_map.iter().all(|s| *s) && middle > self.silent_threshold {
                debug!(middle, "Clearing with a silent stake");
                let lead_span = Span::with_length(span.start, lead);
                let silent_span = Span::with_length(span.start + lead, middle);
                let tail_span = Span::new(silent_span.stop, span.stop);
                let mut replacement: Vec<StakeRef> = Vec::with_capacity(3);
                if lead > 0 {
                    let stake = self.alloc(lead_span)?;
                    let stage = progress.stage(0.0, 0.5);
                    if !fades.render(&stakes, &stake, lead_span, track_map, &stage)? {
                        return Ok(EditStatus::Cancelled);
                    }
                    replacement.push(stake);
                }
                replacement.push(Arc::new(SilentStake::new(silent_span, self.channels)));
                if tail > 0 {
                    let stake = self.alloc(tail_span)?;
                    let stage = progress.stage(0.5, 0.5);
                    if !fades.render(&stakes, &stake, tail_span, track_map, &stage)? {
                        return Ok(EditStatus::Cancelled);
                    }
                    replacement.push(stake);
                }
                replacement
            } else {
                let stake = self.alloc(span)?;
                if !fades.render(&stakes, &stake, span, track_map, progress)? {
                    return Ok(EditStatus::Cancelled);
                }
                vec![stake]
            };

        for stake in &replacement {
            stake.flush()?;
        }
        self.commit(TrailEdit::new().replace(span, replacement))?;
        Ok(EditStatus::Completed)
    }
}

/// The gain envelope of an overwrite clear over `span`.
struct Fades {
    span: Span,
    fade_out: BlendContext,
    fade_in: BlendContext,
}

impl Fades {
    /// Writes `region` of the cleared span into `stake`. Selected channels get
    /// the envelope, the others pass through. Returns false if cancelled.
    fn render(
        &self,
        stakes: &[StakeRef],
        stake: &StakeRef,
        region: Span,
        track_map: &[bool],
        progress: &ProgressHandle,
    ) -> Result<bool, StoreError> {
        let len = region.length();
        let block = (len as usize).min(BLOCK_FRAMES);
        let mut buffers = vec![vec![0.0f32; block]; track_map.len()];
        let fade_in_start = self.span.stop - self.fade_in.length();

        let mut pos = region.start;
        while pos < region.stop {
            let n = (region.stop - pos).min(BLOCK_FRAMES as i64);
            let chunk = Span::with_length(pos, n);
            Trail::read_stakes(stakes, &mut buffers, 0, chunk)?;

            let fading_out =
                chunk.intersection(&Span::with_length(self.span.start, self.fade_out.length()));
            let fading_in = chunk.intersection(&Span::new(fade_in_start, self.span.stop));
            let silent = chunk.intersection(&Span::new(
                self.span.start + self.fade_out.length(),
                fade_in_start,
            ));
            for (channel, buffer) in buffers.iter_mut().enumerate() {
                if !track_map[channel] {
                    continue;
                }
                let buffer = &mut buffer[..n as usize];
                self.fade_out.fade_out(
                    fading_out.start - self.span.start,
                    &mut buffer[local(chunk, fading_out)],
                );
                self.fade_in.fade_in(
                    fading_in.start - fade_in_start,
                    &mut buffer[local(chunk, fading_in)],
                );
                buffer[local(chunk, silent)].fill(0.0);
            }

            stake.write_frames(&buffers, 0, chunk)?;
            pos += n;
            if !progress.report_progress((pos - region.start) as f32 / len as f32) {
                info!(frames = pos - region.start, "Clear cancelled");
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// The buffer range of `part` inside a block read for `chunk`.
fn local(chunk: Span, part: Span) -> std::ops::Range<usize> {
    if part.is_empty() {
        return 0..0;
    }
    (part.start - chunk.start) as usize..(part.stop - chunk.start) as usize
}
