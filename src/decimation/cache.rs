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
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, span, Level};

use super::descriptor::Decimation;
use super::stake::{DecimatedStake, LevelRead};
use super::summary::{self, SUMMARY_VALUES};
use crate::config::EngineConfig;
use crate::error::{EditStatus, StoreError};
use crate::progress::ProgressHandle;
use crate::sample_file::SampleFile;
use crate::span::Span;
use crate::stake::{CacheManager, StakeRef, BLOCK_FRAMES};
use crate::trail::{EditNotice, Trail, TrailDependant};

/// The summaries of one level over a span, as served to an overview renderer.
#[derive(Debug, Clone)]
pub struct Overview {
    pub decimation: Decimation,
    /// `SUMMARY_VALUES` planar buffers per track channel.
    pub summaries: Vec<Vec<f32>>,
    /// Frames that are not computed yet. They read as silence.
    pub busy: usize,
    pub ready: usize,
}

impl Overview {
    pub fn frames(&self) -> usize {
        self.summaries.first().map(|s| s.len()).unwrap_or(0)
    }

    /// Minimum and maximum of `channel` at decimated `frame`.
    pub fn peak(&self, channel: usize, frame: usize) -> (f32, f32) {
        (
            self.summaries[summary::min_index(channel)][frame],
            self.summaries[summary::max_index(channel)][frame],
        )
    }

    /// Root mean square of `channel` at decimated `frame`.
    pub fn rms(&self, channel: usize, frame: usize) -> f32 {
        self.summaries[summary::mean_square_index(channel)][frame].sqrt()
    }
}

#[derive(Debug, Default)]
struct CacheState {
    /// Ordered, non-overlapping. Regions between stakes are dirty.
    stakes: Vec<Arc<DecimatedStake>>,
    dirty: Vec<Span>,
    /// Length of the followed trail.
    length: i64,
    /// Bumped by every edit notice.
    generation: u64,
}

/// A multi level overview of a trail. The cache follows the trail's edits as a
/// dependant: summaries of unchanged material are kept (moved along with it),
/// edited regions are marked dirty until the next `refresh`.
pub struct DecimationCache {
    channels: usize,
    decimations: Vec<Decimation>,
    temp_dir: Option<PathBuf>,
    /// One file per level, created on the first refresh and only ever grown.
    files: Mutex<Vec<Arc<SampleFile>>>,
    state: Mutex<CacheState>,
    cache_manager: RwLock<Option<Arc<dyn CacheManager>>>,
}

impl DecimationCache {
    /// Creates an empty cache for a trail with `channels` channels at
    /// `sample_rate`. The levels come from the decimation config.
    pub fn new(channels: usize, sample_rate: f64, config: &EngineConfig) -> DecimationCache {
        DecimationCache {
            channels,
            decimations: config
                .decimation()
                .shifts()
                .into_iter()
                .map(|shift| Decimation::new(sample_rate, shift))
                .collect(),
            temp_dir: config.temp_dir().map(|p| p.to_path_buf()),
            files: Mutex::new(Vec::new()),
            state: Mutex::new(CacheState::default()),
            cache_manager: RwLock::new(None),
        }
    }

    /// Creates a cache following `trail`. All of the trail's current content
    /// starts out dirty.
    pub fn for_trail(trail: &Trail, sample_rate: f64, config: &EngineConfig) -> Arc<DecimationCache> {
        let cache = Arc::new(DecimationCache::new(trail.channels(), sample_rate, config));
        {
            let mut state = cache.state.lock();
            let length = trail.length();
            state.length = length;
            if length > 0 {
                state.dirty.push(Span::new(0, length));
            }
        }
        trail.add_dependant(cache.clone());
        cache
    }

    /// Attaches a disk cache manager. Level files created from now on are
    /// registered with it.
    pub fn set_cache_manager(&self, cache_manager: Arc<dyn CacheManager>) {
        for stake in self.state.lock().stakes.iter() {
            stake.register_with_cache(cache_manager.as_ref());
        }
        *self.cache_manager.write() = Some(cache_manager);
    }

    pub fn levels(&self) -> &[Decimation] {
        &self.decimations
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Regions that still need to be summarized.
    pub fn dirty(&self) -> Vec<Span> {
        self.state.lock().dirty.clone()
    }

    pub fn is_clean(&self) -> bool {
        self.state.lock().dirty.is_empty()
    }

    /// Spans of the summarized regions, in order.
    pub fn stake_spans(&self) -> Vec<Span> {
        self.state.lock().stakes.iter().map(|s| s.span()).collect()
    }

    /// Summarizes every dirty region from the trail's current content.
    ///
    /// Regions edited while the refresh runs stay dirty; call `refresh` again
    /// to pick them up.
    pub fn refresh(&self, trail: &Trail, progress: &ProgressHandle) -> Result<EditStatus, StoreError> {
        StoreError::check_channels(self.channels, trail.channels())?;
        let (dirty, generation) = {
            let state = self.state.lock();
            (state.dirty.clone(), state.generation)
        };
        if dirty.is_empty() || self.decimations.is_empty() {
            return Ok(EditStatus::Completed);
        }

        let refresh_span = span!(Level::INFO, "refresh overview", regions = dirty.len());
        let _enter = refresh_span.enter();

        let stakes = trail.stakes();
        let total: i64 = dirty.iter().map(|d| d.length()).sum();
        let mut done = 0i64;
        let mut built = Vec::with_capacity(dirty.len());
        for region in dirty {
            let stage = progress.stage(
                done as f32 / total as f32,
                region.length() as f32 / total as f32,
            );
            match self.build(&stakes, region, &stage)? {
                Some(stake) => built.push(Arc::new(stake)),
                None => {
                    info!("Overview refresh cancelled");
                    return Ok(EditStatus::Cancelled);
                }
            }
            done += region.length();
        }

        let mut state = self.state.lock();
        if state.generation != generation {
            debug!("Trail changed during refresh, keeping regions dirty");
            return Ok(EditStatus::Completed);
        }
        for stake in built {
            let position = state
                .stakes
                .partition_point(|s| s.span().start < stake.span().start);
            state.stakes.insert(position, stake);
        }
        state.dirty.clear();
        debug!(stakes = state.stakes.len(), "Overview refreshed");
        Ok(EditStatus::Completed)
    }

    /// Reads the summaries of full rate `span` at `level`. Dirty regions count
    /// as busy; nothing past the end of the trail is returned.
    pub fn read_frames(&self, level: usize, span: Span) -> Result<Overview, StoreError> {
        let decimation = *self.decimations.get(level).ok_or(StoreError::NoSuchLevel {
            level,
            levels: self.decimations.len(),
        })?;
        let (stakes, length) = {
            let state = self.state.lock();
            (state.stakes.clone(), state.length)
        };
        let span = span.intersection(&Span::new(0, length));

        let mut summaries = vec![Vec::new(); self.channels * SUMMARY_VALUES];
        let mut read = LevelRead::default();
        let mut pos = span.start;
        let first = stakes.partition_point(|s| s.span().stop <= span.start);
        for stake in &stakes[first..] {
            let stake_span = stake.span();
            if stake_span.start >= span.stop {
                break;
            }
            if stake_span.start > pos {
                let gap = decimation.to_subsample_length(stake_span.start - pos) as usize;
                grow(&mut summaries, gap);
                read.busy += gap;
            }
            let chunk = stake_span.intersection(&Span::new(pos, span.stop));
            let offset = summaries.first().map(|s| s.len()).unwrap_or(0);
            grow(&mut summaries, stake.clipped_length(level, chunk)?);
            let part = stake.read_frames(level, &mut summaries, offset, chunk)?;
            read.ready += part.ready;
            read.busy += part.busy;
            pos = chunk.stop;
        }
        if pos < span.stop {
            let gap = decimation.to_subsample_length(span.stop - pos) as usize;
            grow(&mut summaries, gap);
            read.busy += gap;
        }

        Ok(Overview {
            decimation,
            summaries,
            busy: read.busy,
            ready: read.ready,
        })
    }

    /// The level files, created on first use.
    fn level_files(&self) -> Result<Vec<Arc<SampleFile>>, StoreError> {
        let mut files = self.files.lock();
        if files.is_empty() {
            let created = self
                .decimations
                .iter()
                .map(|_| {
                    SampleFile::create_temp(self.temp_dir.as_deref(), self.channels * SUMMARY_VALUES)
                        .map(Arc::new)
                })
                .collect::<Result<Vec<_>, _>>()?;
            for (decimation, file) in self.decimations.iter().zip(&created) {
                debug!(
                    shift = decimation.shift,
                    path = %file.path().display(),
                    "Created level file"
                );
                if let Some(cache_manager) = self.cache_manager.read().as_ref() {
                    cache_manager.register(file.path());
                }
            }
            *files = created;
        }
        Ok(files.clone())
    }

    /// Summarizes `region` of the trail into a new stake. Returns `None` if
    /// cancelled.
    fn build(
        &self,
        stakes: &[StakeRef],
        region: Span,
        progress: &ProgressHandle,
    ) -> Result<Option<DecimatedStake>, StoreError> {
        let files = self.level_files()?;
        let stake = DecimatedStake::new(
            region,
            self.channels,
            self.decimations.iter().copied().zip(files).collect(),
        )?;

        // Blocks are a whole number of the coarsest factor, so every block
        // boundary is a summary boundary on every level.
        let coarsest = self.decimations.iter().map(|d| d.factor).max().unwrap_or(1);
        let block = (BLOCK_FRAMES as i64).max(coarsest);
        let mut full = vec![vec![0.0f32; block as usize]; self.channels];
        let mut levels: Vec<Vec<Vec<f32>>> = self
            .decimations
            .iter()
            .map(|d| vec![vec![0.0f32; (block >> d.shift) as usize]; self.channels * SUMMARY_VALUES])
            .collect();

        let mut pos = region.start;
        while pos < region.stop {
            let n = (region.stop - pos).min(block);
            Trail::read_stakes(stakes, &mut full, 0, Span::with_length(pos, n))?;

            let mut frames =
                summary::summarize(&full, n as usize, self.decimations[0].factor as usize, &mut levels[0]);
            stake.continue_write(0, &levels[0], 0, frames)?;
            for level in 1..levels.len() {
                let ratio = 1usize << (self.decimations[level].shift - self.decimations[level - 1].shift);
                let (finer, coarser) = levels.split_at_mut(level);
                frames = summary::reduce(&finer[level - 1], frames, ratio, &mut coarser[0]);
                stake.continue_write(level, &coarser[0], 0, frames)?;
            }

            pos += n;
            if !progress.report_progress((pos - region.start) as f32 / region.length() as f32) {
                return Ok(None);
            }
        }
        stake.flush()?;
        Ok(Some(stake))
    }
}

impl TrailDependant for DecimationCache {
    fn trail_edited(&self, notice: &EditNotice) {
        let mut state = self.state.lock();
        // Widen the edit to whole blocks of the coarsest level, so no kept
        // summary straddles an edit boundary.
        let block = self.decimations.iter().map(|d| d.factor).max().unwrap_or(1);
        let start = notice.span.start - notice.span.start.rem_euclid(block);
        let stop = notice.span.stop + (block - notice.span.stop.rem_euclid(block)) % block;
        let span = Span::new(start.max(0), stop.min(state.length.max(notice.span.stop)));
        let delta = notice.delta;

        let mut stakes = Vec::with_capacity(state.stakes.len() + 1);
        for stake in state.stakes.drain(..) {
            let s = stake.span();
            if s.stop <= span.start {
                stakes.push(stake);
            } else if s.start >= span.stop {
                stakes.push(Arc::new(stake.shift_virtual(delta)));
            } else {
                if s.start < span.start {
                    stakes.push(Arc::new(stake.replace_stop(span.start)));
                }
                if s.stop > span.stop {
                    stakes.push(Arc::new(stake.replace_start(span.stop).shift_virtual(delta)));
                }
            }
        }
        stakes.retain(|s| !s.span().is_empty());

        let mut dirty = Vec::with_capacity(state.dirty.len() + 1);
        for d in state.dirty.drain(..) {
            if d.stop <= span.start {
                dirty.push(d);
            } else if d.start >= span.stop {
                dirty.push(d.shift(delta));
            } else {
                dirty.push(Span::new(d.start, span.start));
                dirty.push(Span::new(span.stop, d.stop).shift(delta));
            }
        }
        dirty.push(Span::new(span.start, span.stop + delta));
        state.dirty = merge(dirty);
        state.stakes = stakes;
        state.length += delta;
        state.generation += 1;
        debug!(%span, delta, dirty = state.dirty.len(), "Overview invalidated");
    }
}

/// Sorts spans and joins the ones that touch, dropping empty ones.
fn merge(mut spans: Vec<Span>) -> Vec<Span> {
    spans.retain(|s| !s.is_empty());
    spans.sort_by_key(|s| s.start);
    let mut merged: Vec<Span> = Vec::with_capacity(spans.len());
    for span in spans {
        match merged.last_mut() {
            Some(last) if span.start <= last.stop => {
                last.stop = last.stop.max(span.stop);
            }
            _ => merged.push(span),
        }
    }
    merged
}

fn grow(buffers: &mut [Vec<f32>], frames: usize) {
    for buffer in buffers.iter_mut() {
        buffer.resize(buffer.len() + frames, 0.0);
    }
}
