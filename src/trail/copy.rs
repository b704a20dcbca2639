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
use std::ops::Range;

use clap::ValueEnum;
use serde::Deserialize;
use tracing::{debug, info, span, Level};

use super::{Trail, TrailEdit};
use crate::blend::BlendContext;
use crate::error::{EditStatus, StoreError};
use crate::progress::ProgressHandle;
use crate::span::Span;
use crate::stake::BLOCK_FRAMES;

/// How copied material is combined with the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum EditMode {
    /// Push the destination apart and place the material in between.
    Insert,
    /// Replace the destination samples.
    Overwrite,
    /// Add the material to the destination samples.
    Mix,
}

/// The blend windows at both ends of a copied region, clamped to its length.
#[derive(Debug)]
pub(super) struct Windows {
    pub(super) pre: BlendContext,
    pub(super) post: BlendContext,
    len: i64,
}

impl Windows {
    pub(super) fn new(len: i64, pre: &BlendContext, post: &BlendContext) -> Windows {
        let pre_len = pre.length().min(len);
        let post_len = post.length().min(len - pre_len);
        Windows {
            pre: BlendContext::new(pre_len, pre.curve()),
            post: BlendContext::new(post_len, post.curve()),
            len,
        }
    }

    pub(super) fn post_start(&self) -> i64 {
        self.len - self.post.length()
    }

    /// Splits the block `[start, start + n)` of the region into the buffer
    /// ranges falling into the leading window, the middle and the trailing
    /// window.
    pub(super) fn segments(
        &self,
        start: i64,
        n: usize,
    ) -> (Range<usize>, Range<usize>, Range<usize>) {
        let stop = start + n as i64;
        let pre_stop = self.pre.length().clamp(start, stop);
        let post_start = self.post_start().clamp(pre_stop, stop);
        let pre_stop = (pre_stop - start) as usize;
        let post_start = (post_start - start) as usize;
        (0..pre_stop, pre_stop..post_start, post_start..n)
    }
}

impl Trail {
    /// Copies `copy_span` of `source` into this trail at `insert_pos`.
    ///
    /// `track_map[i]` names the source channel feeding destination channel `i`,
    /// or `None` to bypass it. Bypassed channels receive silence when
    /// inserting and keep their samples when overwriting or mixing. The first
    /// `blend_pre` and last `blend_post` frames of the copied region are
    /// crossfaded with the destination so that no edit boundary jumps.
    ///
    /// Nothing becomes visible until the whole region has been written. When
    /// the edit is cancelled or fails the trail is left as it was.
    #[allow(clippy::too_many_arguments)]
    pub fn copy_range_from(
        &self,
        source: &Trail,
        copy_span: Span,
        insert_pos: i64,
        mode: EditMode,
        track_map: &[Option<usize>],
        blend_pre: &BlendContext,
        blend_post: &BlendContext,
        progress: &ProgressHandle,
    ) -> Result<EditStatus, StoreError> {
        StoreError::check_channels(self.channels, track_map.len())?;
        if let Some(channel) = track_map.iter().flatten().find(|c| **c >= source.channels()) {
            return Err(StoreError::ChannelMismatch {
                expected: source.channels(),
                actual: channel + 1,
            });
        }
        let source_bounds = source.span();
        if !source_bounds.contains_span(&copy_span) {
            return Err(StoreError::InvalidSpan {
                span: copy_span,
                bounds: source_bounds,
            });
        }
        let target = Span::with_length(insert_pos, copy_span.length());
        match mode {
            EditMode::Insert => self.check_inside(Span::new(insert_pos, insert_pos))?,
            EditMode::Overwrite | EditMode::Mix => self.check_inside(target)?,
        }
        if copy_span.is_empty() {
            return Ok(EditStatus::Completed);
        }

        let edit_span = span!(Level::INFO, "copy range", ?mode, %copy_span, insert_pos);
        let _enter = edit_span.enter();

        let source_stakes = source.stakes();
        let stakes = self.stakes();
        let len = copy_span.length();
        let windows = Windows::new(len, blend_pre, blend_post);
        let stake = self.alloc(target)?;

        let block = (len as usize).min(BLOCK_FRAMES);
        let mut source_buf = vec![vec![0.0f32; block]; source.channels()];
        let mut existing = vec![vec![0.0f32; block]; self.channels];
        let mut existing_post = vec![vec![0.0f32; block]; self.channels];
        let mut out = vec![vec![0.0f32; block]; self.channels];
        let mut scratch = vec![0.0f32; block];
        let silence = vec![0.0f32; block];

        let mut pos = 0i64;
        while pos < len {
            let n = (len - pos).min(BLOCK_FRAMES as i64) as usize;
            let (pre, mid, post) = windows.segments(pos, n);
            let post_offset = pos + post.start as i64 - windows.post_start();

            Trail::read_stakes(
                &source_stakes,
                &mut source_buf,
                0,
                Span::with_length(copy_span.start + pos, n as i64),
            )?;

            match mode {
                EditMode::Insert => {
                    // The leading window fades out of the material that used
                    // to follow the insert point, the trailing window fades
                    // back into the material that precedes it.
                    if !pre.is_empty() {
                        Trail::read_clamped(
                            &stakes,
                            &mut existing,
                            0,
                            Span::with_length(insert_pos + pos, pre.len() as i64),
                        )?;
                    }
                    if !post.is_empty() {
                        Trail::read_clamped(
                            &stakes,
                            &mut existing_post,
                            post.start,
                            Span::with_length(
                                insert_pos + pos + post.start as i64 - len,
                                post.len() as i64,
                            ),
                        )?;
                    }
                    for (channel, out) in out.iter_mut().enumerate() {
                        let src = match track_map[channel] {
                            Some(c) => &source_buf[c][..n],
                            None => &silence[..n],
                        };
                        let out = &mut out[..n];
                        out[mid.clone()].copy_from_slice(&src[mid.clone()]);
                        windows.pre.blend(
                            pos,
                            &existing[channel][pre.clone()],
                            &src[pre.clone()],
                            &mut out[pre.clone()],
                        );
                        windows.post.blend(
                            post_offset,
                            &src[post.clone()],
                            &existing_post[channel][post.clone()],
                            &mut out[post.clone()],
                        );
                    }
                }
                EditMode::Overwrite => {
                    Trail::read_stakes(
                        &stakes,
                        &mut existing,
                        0,
                        Span::with_length(insert_pos + pos, n as i64),
                    )?;
                    for (channel, out) in out.iter_mut().enumerate() {
                        let dry = &existing[channel][..n];
                        let out = &mut out[..n];
                        let Some(c) = track_map[channel] else {
                            out.copy_from_slice(dry);
                            continue;
                        };
                        let src = &source_buf[c][..n];
                        out[mid.clone()].copy_from_slice(&src[mid.clone()]);
                        windows.pre.blend(
                            pos,
                            &dry[pre.clone()],
                            &src[pre.clone()],
                            &mut out[pre.clone()],
                        );
                        windows.post.blend(
                            post_offset,
                            &src[post.clone()],
                            &dry[post.clone()],
                            &mut out[post.clone()],
                        );
                    }
                }
                EditMode::Mix => {
                    Trail::read_stakes(
                        &stakes,
                        &mut existing,
                        0,
                        Span::with_length(insert_pos + pos, n as i64),
                    )?;
                    for (channel, out) in out.iter_mut().enumerate() {
                        let dry = &existing[channel][..n];
                        let out = &mut out[..n];
                        out.copy_from_slice(dry);
                        let Some(c) = track_map[channel] else {
                            continue;
                        };
                        let wet = &mut scratch[..n];
                        wet.copy_from_slice(&source_buf[c][..n]);
                        windows.pre.fade_in(pos, &mut wet[pre.clone()]);
                        windows.post.fade_out(post_offset, &mut wet[post.clone()]);
                        for (o, w) in out.iter_mut().zip(wet.iter()) {
                            *o += w;
                        }
                    }
                }
            }

            stake.write_frames(&out, 0, Span::with_length(insert_pos + pos, n as i64))?;
            pos += n as i64;
            if !progress.report_progress(pos as f32 / len as f32) {
                info!(frames = pos, "Copy cancelled");
                return Ok(EditStatus::Cancelled);
            }
        }

        stake.flush()?;
        let edit = match mode {
            EditMode::Insert => TrailEdit::new().insert(insert_pos, vec![stake]),
            EditMode::Overwrite | EditMode::Mix => TrailEdit::new().replace(target, vec![stake]),
        };
        self.commit(edit)?;
        debug!(length = self.length(), "Copy committed");
        Ok(EditStatus::Completed)
    }
}
