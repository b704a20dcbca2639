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
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::error::StoreError;
use crate::sample_file::SampleFile;
use crate::span::Span;
use crate::stake::{MultiStake, PlaybackBatch, PlaybackRead, SingleStake, StakeRef};

mod clear;
mod copy;
mod edit;
mod flatten;

#[cfg(test)]
mod tests;

pub use clear::ClearMode;
pub use copy::EditMode;
pub use edit::{EditNotice, TrailDependant, TrailEdit};

/// The content of one track: an ordered, gapless list of stakes covering
/// `[0, length)`, plus the temp files new content is written to.
///
/// Readers work on snapshots of the stake list, so reads never block on edits
/// that are still being built. Edits become visible in one step through
/// `commit`.
pub struct Trail {
    channels: usize,
    /// Channel count of each temp file. One entry for single file trails.
    channel_groups: Vec<usize>,
    temp_dir: Option<PathBuf>,
    silent_threshold: i64,
    /// Temp files, created on the first allocation. Also the allocation lock.
    files: Mutex<Vec<Arc<SampleFile>>>,
    stakes: RwLock<Vec<StakeRef>>,
    dependants: RwLock<Vec<Arc<dyn TrailDependant>>>,
}

impl Trail {
    /// Creates an empty trail whose new content goes into one temp file.
    pub fn new(channels: usize, config: &EngineConfig) -> Trail {
        Trail {
            channels,
            channel_groups: vec![channels],
            temp_dir: config.temp_dir().map(|p| p.to_path_buf()),
            silent_threshold: config.silent_threshold(),
            files: Mutex::new(Vec::new()),
            stakes: RwLock::new(Vec::new()),
            dependants: RwLock::new(Vec::new()),
        }
    }

    /// Creates an empty trail that spreads its channels over one temp file per
    /// group, e.g. `[2, 1]` for a stereo pair plus a mono channel.
    pub fn with_channel_groups(
        channel_groups: Vec<usize>,
        config: &EngineConfig,
    ) -> Result<Trail, StoreError> {
        if channel_groups.is_empty() || channel_groups.contains(&0) {
            return Err(StoreError::ChannelMismatch {
                expected: 1,
                actual: 0,
            });
        }
        let channels = channel_groups.iter().sum();
        let mut trail = Trail::new(channels, config);
        trail.channel_groups = channel_groups;
        Ok(trail)
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn channel_groups(&self) -> &[usize] {
        &self.channel_groups
    }

    pub fn length(&self) -> i64 {
        edit::trail_length(&self.stakes.read())
    }

    pub fn span(&self) -> Span {
        Span::new(0, self.length())
    }

    /// Regions shorter than this are never replaced by silent stakes.
    pub fn silent_threshold(&self) -> i64 {
        self.silent_threshold
    }

    /// A snapshot of the current stake list.
    pub fn stakes(&self) -> Vec<StakeRef> {
        self.stakes.read().clone()
    }

    /// Registers a dependant that is told about every committed edit.
    pub fn add_dependant(&self, dependant: Arc<dyn TrailDependant>) {
        self.dependants.write().push(dependant);
    }

    /// Reserves storage for `span` at the end of the temp file(s) and returns
    /// a stake over it. The stake isn't part of the trail until committed.
    pub fn alloc(&self, span: Span) -> Result<StakeRef, StoreError> {
        let mut files = self.files.lock();
        if files.is_empty() {
            *files = self
                .channel_groups
                .iter()
                .map(|group| {
                    SampleFile::create_temp(self.temp_dir.as_deref(), *group).map(Arc::new)
                })
                .collect::<Result<_, _>>()?;
        }

        let len = span.length();
        if files.len() == 1 {
            let file_start = files[0].allocate(len);
            debug!(%span, file_start, "Allocated stake");
            return Ok(Arc::new(SingleStake::new(span, files[0].clone(), file_start)));
        }

        let file_spans: Vec<Span> = files
            .iter()
            .map(|f| Span::with_length(f.allocate(len), len))
            .collect();
        let channel_maps = files.iter().map(|f| (0..f.channels()).collect()).collect();
        debug!(%span, files = files.len(), "Allocated multi file stake");
        Ok(Arc::new(MultiStake::new(
            span,
            files.clone(),
            file_spans.clone(),
            file_spans,
            channel_maps,
        )?))
    }

    /// Publishes an edit. Either every primitive of the edit is applied or the
    /// trail stays as it was.
    pub fn commit(&self, edit: TrailEdit) -> Result<(), StoreError> {
        if edit.is_empty() {
            return Ok(());
        }
        let notices = {
            let mut stakes = self.stakes.write();
            let mut next = stakes.clone();
            let notices = edit.apply(&mut next, self.channels)?;
            edit::check_contiguous(&next, 0, self.channels)?;
            *stakes = next;
            notices
        };
        debug!(
            edits = notices.len(),
            length = self.length(),
            "Committed trail edit"
        );

        let dependants = self.dependants.read().clone();
        for dependant in dependants {
            for notice in &notices {
                dependant.trail_edited(notice);
            }
        }
        Ok(())
    }

    /// Appends already written stakes to the end of the trail. Their spans must
    /// start at the current length.
    pub fn append(&self, stakes: Vec<StakeRef>) -> Result<(), StoreError> {
        let pos = self.length();
        self.commit(TrailEdit::new().insert(pos, stakes))
    }

    /// Reads `span` of the trail into the buffers.
    pub fn read_frames(
        &self,
        buffers: &mut [Vec<f32>],
        buf_offset: usize,
        span: Span,
    ) -> Result<usize, StoreError> {
        let stakes = self.stakes();
        Trail::read_stakes(&stakes, buffers, buf_offset, span)
    }

    /// Reads `span` from an ordered stake list. Parts of `span` not covered by
    /// the list are filled with silence and reported as a warning.
    pub fn read_stakes(
        stakes: &[StakeRef],
        buffers: &mut [Vec<f32>],
        buf_offset: usize,
        span: Span,
    ) -> Result<usize, StoreError> {
        let mut pos = span.start;
        let mut index = stakes.partition_point(|s| s.span().stop <= span.start);

        while pos < span.stop && index < stakes.len() {
            let stake_span = stakes[index].span();
            if stake_span.start >= span.stop {
                break;
            }
            if stake_span.start > pos {
                warn!(%span, gap = %Span::new(pos, stake_span.start), "Gap in stake list");
                zero_fill(
                    buffers,
                    buf_offset + (pos - span.start) as usize,
                    (stake_span.start - pos) as usize,
                );
                pos = stake_span.start;
            }
            let chunk = stake_span.intersection(&Span::new(pos, span.stop));
            stakes[index].read_frames(
                buffers,
                buf_offset + (chunk.start - span.start) as usize,
                chunk,
            )?;
            pos = chunk.stop;
            index += 1;
        }

        if pos < span.stop {
            warn!(
                %span,
                missing = span.stop - pos,
                "Read past the end of the stake list"
            );
            zero_fill(
                buffers,
                buf_offset + (pos - span.start) as usize,
                (span.stop - pos) as usize,
            );
        }
        Ok(span.length() as usize)
    }

    /// Describes the reads needed to fill a remote buffer with `span`.
    pub fn enqueue_playback_read(
        &self,
        batch: &mut PlaybackBatch,
        span: Span,
        buf_offset: usize,
    ) -> Result<(), StoreError> {
        let stakes = self.stakes();
        let mut pos = span.start.max(0);
        let mut index = stakes.partition_point(|s| s.span().stop <= pos);
        while pos < span.stop && index < stakes.len() {
            let chunk = stakes[index].span().intersection(&Span::new(pos, span.stop));
            if chunk.is_empty() {
                break;
            }
            stakes[index].enqueue_playback_read(
                batch,
                chunk,
                buf_offset + (chunk.start - span.start) as usize,
            )?;
            pos = chunk.stop;
            index += 1;
        }
        if span.start < 0 {
            batch.push(PlaybackRead::Zero {
                channels: self.channels,
                frames: (span.stop.min(0) - span.start) as usize,
                buffer_offset: buf_offset,
            });
        }
        if pos < span.stop {
            batch.push(PlaybackRead::Zero {
                channels: self.channels,
                frames: (span.stop - pos) as usize,
                buffer_offset: buf_offset + (pos - span.start) as usize,
            });
        }
        Ok(())
    }

    /// Reads `span` from a snapshot, silently treating everything outside of
    /// `[0, length)` as silence. Edit algorithms read around splice points
    /// where running off either end of the trail is expected.
    pub(crate) fn read_clamped(
        stakes: &[StakeRef],
        buffers: &mut [Vec<f32>],
        buf_offset: usize,
        span: Span,
    ) -> Result<(), StoreError> {
        let covered = span.intersection(&Span::new(0, edit::trail_length(stakes)));
        if covered.is_empty() {
            zero_fill(buffers, buf_offset, span.length() as usize);
            return Ok(());
        }
        zero_fill(buffers, buf_offset, (covered.start - span.start) as usize);
        Trail::read_stakes(
            stakes,
            buffers,
            buf_offset + (covered.start - span.start) as usize,
            covered,
        )?;
        zero_fill(
            buffers,
            buf_offset + (covered.stop - span.start) as usize,
            (span.stop - covered.stop) as usize,
        );
        Ok(())
    }

    /// Fails unless `span` lies inside the trail.
    fn check_inside(&self, span: Span) -> Result<(), StoreError> {
        let bounds = self.span();
        if bounds.contains_span(&span) {
            Ok(())
        } else {
            Err(StoreError::InvalidSpan { span, bounds })
        }
    }
}

impl fmt::Debug for Trail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Trail")
            .field("channels", &self.channels)
            .field("channel_groups", &self.channel_groups)
            .field("stakes", &*self.stakes.read())
            .finish()
    }
}

/// Zeroes `len` frames of every buffer starting at `offset`.
pub(crate) fn zero_fill(buffers: &mut [Vec<f32>], offset: usize, len: usize) {
    if len == 0 {
        return;
    }
    for channel in buffers.iter_mut() {
        channel[offset..offset + len].fill(0.0);
    }
}
