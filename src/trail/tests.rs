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
use std::error::Error;
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;

use super::*;
use crate::blend::{BlendContext, FadeCurve};
use crate::error::EditStatus;
use crate::progress::ProgressHandle;
use crate::sink::{FrameSink, MemorySink};
use crate::stake::SilentStake;
use crate::testutil::{append, dc, filled_trail, max_step, noise, ramp, read_all};

fn no_blend() -> BlendContext {
    BlendContext::new(0, FadeCurve::Linear)
}

fn linear(len: i64) -> BlendContext {
    BlendContext::new(len, FadeCurve::Linear)
}

/// Every committed state must be a gapless partition of `[0, length)`.
fn assert_partition(trail: &Trail) {
    let mut pos = 0;
    for stake in trail.stakes() {
        assert_eq!(stake.span().start, pos, "gap or overlap in {:?}", trail);
        assert!(!stake.span().is_empty());
        assert_eq!(stake.channels(), trail.channels());
        pos = stake.span().stop;
    }
    assert_eq!(pos, trail.length());
}

#[derive(Default)]
struct RecordingDependant {
    notices: Mutex<Vec<EditNotice>>,
}

impl TrailDependant for RecordingDependant {
    fn trail_edited(&self, notice: &EditNotice) {
        self.notices.lock().push(*notice);
    }
}

/// Accepts one block, then fails every write.
struct FailingSink {
    writes: usize,
}

impl FrameSink for FailingSink {
    fn channels(&self) -> usize {
        1
    }

    fn write_frames(&mut self, _: &[Vec<f32>], _: usize, _: usize) -> Result<(), StoreError> {
        self.writes += 1;
        if self.writes > 1 {
            return Err(StoreError::read_only());
        }
        Ok(())
    }
}

#[test]
fn test_alloc_and_commit_appends_stake() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let trail = filled_trail(dir.path(), &[ramp(1000, 0.0)])?;

    let stake = trail.alloc(Span::new(1000, 1500))?;
    stake.write_frames(&[ramp(500, 1.0)], 0, Span::new(1000, 1500))?;
    stake.flush()?;
    trail.commit(TrailEdit::new().insert(1000, vec![stake]))?;

    let lengths: Vec<i64> = trail.stakes().iter().map(|s| s.span().length()).collect();
    assert_eq!(lengths, vec![1000, 500]);
    assert_eq!(trail.length(), 1500);
    assert_partition(&trail);

    let out = read_all(&trail, Span::new(0, 1500))?;
    assert_eq!(out[0][..1000], ramp(1000, 0.0)[..]);
    assert_eq!(out[0][1000..], ramp(500, 1.0)[..]);
    Ok(())
}

#[test]
fn test_concurrent_allocs_do_not_overlap() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let trail = Trail::new(2, &EngineConfig::default().with_temp_dir(dir.path()));

    let stakes = thread::scope(|scope| {
        let workers: Vec<_> = (0..8i64)
            .map(|i| {
                let trail = &trail;
                scope.spawn(move || -> Result<StakeRef, StoreError> {
                    let value = i as f32 / 8.0;
                    let stake = trail.alloc(Span::new(0, 1000 + i * 10))?;
                    let len = stake.span().length() as usize;
                    stake.write_frames(&[dc(len, value), dc(len, -value)], 0, stake.span())?;
                    stake.flush()?;
                    Ok(stake)
                })
            })
            .collect();
        workers
            .into_iter()
            .map(|w| w.join().map_err(|_| "alloc thread panicked"))
            .collect::<Result<Vec<_>, _>>()
    })?;

    let mut reserved = 0;
    for (i, stake) in stakes.into_iter().enumerate() {
        let stake = stake?;
        let len = stake.span().length() as usize;
        reserved += len as i64;
        let mut out = vec![vec![9.0; len]; 2];
        stake.read_frames(&mut out, 0, stake.span())?;
        let value = i as f32 / 8.0;
        assert!(out[0].iter().all(|s| *s == value), "stake {} was overwritten", i);
        assert!(out[1].iter().all(|s| *s == -value), "stake {} was overwritten", i);
    }
    assert_eq!(trail.files.lock()[0].frame_count(), reserved);
    Ok(())
}

#[test]
fn test_reads_past_the_end_are_silent() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let trail = filled_trail(dir.path(), &[ramp(100, 1.0)])?;
    let mut out = vec![vec![7.0; 150]];
    assert_eq!(trail.read_frames(&mut out, 0, Span::new(50, 200))?, 150);
    assert_eq!(out[0][..50], ramp(100, 1.0)[50..]);
    assert!(out[0][50..].iter().all(|s| *s == 0.0));
    Ok(())
}

#[test]
fn test_insert_grows_trail() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let dest = filled_trail(dir.path(), &[ramp(1000, 0.0)])?;
    let source = filled_trail(dir.path(), &[ramp(200, 5.0)])?;
    let dependant = Arc::new(RecordingDependant::default());
    dest.add_dependant(dependant.clone());

    let status = dest.copy_range_from(
        &source,
        Span::new(50, 150),
        300,
        EditMode::Insert,
        &[Some(0)],
        &no_blend(),
        &no_blend(),
        &ProgressHandle::new(),
    )?;
    assert_eq!(status, EditStatus::Completed);
    assert_eq!(dest.length(), 1100);
    assert_partition(&dest);

    let out = read_all(&dest, dest.span())?;
    let original = ramp(1000, 0.0);
    assert_eq!(out[0][..300], original[..300]);
    assert_eq!(out[0][300..400], ramp(200, 5.0)[50..150]);
    assert_eq!(out[0][400..], original[300..]);

    let notices = dependant.notices.lock();
    assert_eq!(
        *notices,
        vec![EditNotice {
            span: Span::new(300, 300),
            delta: 100
        }]
    );
    Ok(())
}

#[test]
fn test_insert_bypassed_channels_are_silent() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let dest = filled_trail(dir.path(), &[dc(100, 0.5), dc(100, 0.5)])?;
    let source = filled_trail(dir.path(), &[dc(50, 0.25)])?;

    dest.copy_range_from(
        &source,
        source.span(),
        100,
        EditMode::Insert,
        &[None, Some(0)],
        &no_blend(),
        &no_blend(),
        &ProgressHandle::new(),
    )?
    .is_completed()
    .then_some(())
    .ok_or("copy did not complete")?;

    let out = read_all(&dest, dest.span())?;
    assert!(out[0][100..].iter().all(|s| *s == 0.0));
    assert!(out[1][100..].iter().all(|s| *s == 0.25));
    Ok(())
}

#[test]
fn test_overwrite_keeps_length_and_bypassed_channels() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let dest = filled_trail(dir.path(), &[ramp(1000, 0.0), ramp(1000, 1.0)])?;
    let source = filled_trail(dir.path(), &[dc(100, 9.0)])?;

    let status = dest.copy_range_from(
        &source,
        source.span(),
        400,
        EditMode::Overwrite,
        &[Some(0), None],
        &no_blend(),
        &no_blend(),
        &ProgressHandle::new(),
    )?;
    assert!(status.is_completed());
    assert_eq!(dest.length(), 1000);
    assert_partition(&dest);

    let out = read_all(&dest, dest.span())?;
    assert_eq!(out[0][..400], ramp(1000, 0.0)[..400]);
    assert!(out[0][400..500].iter().all(|s| *s == 9.0));
    assert_eq!(out[0][500..], ramp(1000, 0.0)[500..]);
    assert_eq!(out[1], ramp(1000, 1.0));
    Ok(())
}

#[test]
fn test_overwrite_outside_trail_fails() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let dest = filled_trail(dir.path(), &[dc(100, 0.0)])?;
    let source = filled_trail(dir.path(), &[dc(50, 1.0)])?;

    let result = dest.copy_range_from(
        &source,
        source.span(),
        80,
        EditMode::Overwrite,
        &[Some(0)],
        &no_blend(),
        &no_blend(),
        &ProgressHandle::new(),
    );
    assert!(matches!(result, Err(StoreError::InvalidSpan { .. })));

    let result = dest.copy_range_from(
        &source,
        source.span(),
        0,
        EditMode::Overwrite,
        &[Some(1)],
        &no_blend(),
        &no_blend(),
        &ProgressHandle::new(),
    );
    assert!(matches!(result, Err(StoreError::ChannelMismatch { .. })));
    assert_eq!(dest.stakes().len(), 1);
    Ok(())
}

#[test]
fn test_mix_adds_weighted_source() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let dest = filled_trail(dir.path(), &[dc(1000, 0.25)])?;
    let source = filled_trail(dir.path(), &[dc(100, 0.5)])?;

    let status = dest.copy_range_from(
        &source,
        source.span(),
        100,
        EditMode::Mix,
        &[Some(0)],
        &linear(10),
        &no_blend(),
        &ProgressHandle::new(),
    )?;
    assert!(status.is_completed());
    assert_eq!(dest.length(), 1000);

    let out = read_all(&dest, dest.span())?;
    // The source fades in over the first ten frames.
    assert_eq!(out[0][100], 0.25);
    assert!(out[0][101] > 0.25 && out[0][101] < 0.75);
    assert!(out[0][110..200].iter().all(|s| *s == 0.75));
    assert!(out[0][200..].iter().all(|s| *s == 0.25));
    Ok(())
}

#[test]
fn test_insert_blends_are_continuous() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let dest = filled_trail(dir.path(), &[dc(2000, 0.5)])?;
    let source = filled_trail(dir.path(), &[dc(1000, -0.5)])?;

    dest.copy_range_from(
        &source,
        source.span(),
        1000,
        EditMode::Insert,
        &[Some(0)],
        &linear(100),
        &linear(100),
        &ProgressHandle::new(),
    )?
    .is_completed()
    .then_some(())
    .ok_or("copy did not complete")?;

    assert_eq!(dest.length(), 3000);
    let out = read_all(&dest, dest.span())?;
    // A hard cut would jump by a full unit.
    assert!(max_step(&out[0]) < 0.011);
    assert_eq!(out[0][1000], 0.5);
    assert_eq!(out[0][1500], -0.5);
    Ok(())
}

#[test]
fn test_overwrite_blends_are_continuous() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let dest = filled_trail(dir.path(), &[dc(3000, 0.5)])?;
    let source = filled_trail(dir.path(), &[dc(1000, -0.5)])?;

    dest.copy_range_from(
        &source,
        source.span(),
        1000,
        EditMode::Overwrite,
        &[Some(0)],
        &linear(200),
        &linear(200),
        &ProgressHandle::new(),
    )?
    .is_completed()
    .then_some(())
    .ok_or("copy did not complete")?;

    let out = read_all(&dest, dest.span())?;
    assert!(max_step(&out[0]) < 0.0051);
    assert_eq!(out[0][1500], -0.5);
    Ok(())
}

#[test]
fn test_overwrite_clear_is_exact_silence() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let original = vec![noise(1000, 1), noise(1000, 2)];
    let trail = filled_trail(dir.path(), &original)?;

    let status = trail.clear_range(
        Span::new(200, 700),
        ClearMode::Overwrite,
        &[true, true],
        &no_blend(),
        &ProgressHandle::new(),
    )?;
    assert!(status.is_completed());
    assert_eq!(trail.length(), 1000);
    assert_partition(&trail);

    let out = read_all(&trail, trail.span())?;
    for (channel, samples) in out.iter().enumerate() {
        assert_eq!(samples[..200], original[channel][..200]);
        assert!(samples[200..700].iter().all(|s| *s == 0.0));
        assert_eq!(samples[700..], original[channel][700..]);
    }
    Ok(())
}

#[test]
fn test_overwrite_clear_bypasses_channels() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let original = vec![noise(500, 3), noise(500, 4)];
    let trail = filled_trail(dir.path(), &original)?;

    trail
        .clear_range(
            Span::new(100, 400),
            ClearMode::Overwrite,
            &[false, true],
            &linear(20),
            &ProgressHandle::new(),
        )?
        .is_completed()
        .then_some(())
        .ok_or("clear did not complete")?;

    let out = read_all(&trail, trail.span())?;
    assert_eq!(out[0], original[0]);
    assert_eq!(out[1][100], original[1][100]);
    assert!(out[1][120..380].iter().all(|s| *s == 0.0));
    Ok(())
}

#[test]
fn test_long_overwrite_clear_uses_silent_stake() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let config = EngineConfig::default()
        .with_temp_dir(dir.path())
        .with_silent_threshold(100);
    let trail = Trail::new(1, &config);
    let original = ramp(1000, 0.0);
    append(&trail, &[original.clone()])?;

    trail
        .clear_range(
            Span::new(100, 900),
            ClearMode::Overwrite,
            &[true],
            &linear(20),
            &ProgressHandle::new(),
        )?
        .is_completed()
        .then_some(())
        .ok_or("clear did not complete")?;
    assert_partition(&trail);

    let silent: Vec<Span> = trail
        .stakes()
        .iter()
        .filter(|s| s.is_silent())
        .map(|s| s.span())
        .collect();
    assert_eq!(silent, vec![Span::new(120, 880)]);

    let out = read_all(&trail, trail.span())?;
    assert_eq!(out[0][..100], original[..100]);
    assert_eq!(out[0][100], original[100]);
    assert!(out[0][120..880].iter().all(|s| *s == 0.0));
    assert!((out[0][899] - original[899] * 0.95).abs() < 1e-5);
    assert_eq!(out[0][900..], original[900..]);
    Ok(())
}

#[test]
fn test_insert_clear_is_length_neutral() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let trail = filled_trail(dir.path(), &[dc(1000, 0.5)])?;
    append(&trail, &[dc(1000, -0.5)])?;

    trail
        .clear_range(
            Span::new(800, 1200),
            ClearMode::Insert,
            &[true],
            &linear(100),
            &ProgressHandle::new(),
        )?
        .is_completed()
        .then_some(())
        .ok_or("clear did not complete")?;
    assert_eq!(trail.length(), 2000);
    assert_partition(&trail);

    // Without a blend window there is nothing to do.
    let before = trail.stakes().len();
    trail
        .clear_range(
            Span::new(100, 200),
            ClearMode::Insert,
            &[true],
            &no_blend(),
            &ProgressHandle::new(),
        )?
        .is_completed()
        .then_some(())
        .ok_or("clear did not complete")?;
    assert_eq!(trail.stakes().len(), before);
    Ok(())
}

#[test]
fn test_remove_range_crossfades_the_cut() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let trail = filled_trail(dir.path(), &[dc(1000, 0.5)])?;
    append(&trail, &[dc(1000, -0.5)])?;
    let dependant = Arc::new(RecordingDependant::default());
    trail.add_dependant(dependant.clone());

    trail
        .remove_range(
            Span::new(800, 1200),
            &[true],
            &linear(100),
            &ProgressHandle::new(),
        )?
        .is_completed()
        .then_some(())
        .ok_or("remove did not complete")?;
    assert_eq!(trail.length(), 1600);
    assert_partition(&trail);

    let out = read_all(&trail, trail.span())?;
    assert_eq!(out[0][0], 0.5);
    assert_eq!(out[0][1599], -0.5);
    assert!(max_step(&out[0]) < 0.011);

    let notices = dependant.notices.lock();
    assert_eq!(notices.len(), 3);
    assert_eq!(
        notices[2],
        EditNotice {
            span: Span::new(800, 1200),
            delta: -400
        }
    );
    Ok(())
}

#[test]
fn test_remove_range_without_blend_is_a_plain_cut() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let original = ramp(1000, 0.0);
    let trail = filled_trail(dir.path(), &[original.clone()])?;

    trail
        .remove_range(
            Span::new(100, 300),
            &[true],
            &no_blend(),
            &ProgressHandle::new(),
        )?
        .is_completed()
        .then_some(())
        .ok_or("remove did not complete")?;

    let out = read_all(&trail, trail.span())?;
    assert_eq!(out[0][..100], original[..100]);
    assert_eq!(out[0][100..], original[300..]);
    assert_partition(&trail);
    Ok(())
}

#[test]
fn test_mixed_selection_loses_channel_sync() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let trail = filled_trail(dir.path(), &[dc(1000, 0.5), dc(1000, 0.5)])?;

    let result = trail.clear_range(
        Span::new(100, 200),
        ClearMode::Insert,
        &[true, false],
        &linear(10),
        &ProgressHandle::new(),
    );
    assert!(matches!(result, Err(StoreError::ChannelSyncLost)));

    let result = trail.remove_range(
        Span::new(100, 200),
        &[false, true],
        &linear(10),
        &ProgressHandle::new(),
    );
    assert!(matches!(result, Err(StoreError::ChannelSyncLost)));
    assert_eq!(trail.length(), 1000);
    assert_eq!(trail.stakes().len(), 1);

    // Without a blend there is nothing to write, but the selection is still checked.
    let result = trail.clear_range(
        Span::new(100, 200),
        ClearMode::Insert,
        &[true, false],
        &no_blend(),
        &ProgressHandle::new(),
    );
    assert!(matches!(result, Err(StoreError::ChannelSyncLost)));
    Ok(())
}

#[test]
fn test_cancelled_edits_leave_trail_untouched() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let original = noise(30_000, 5);
    let trail = filled_trail(dir.path(), &[original.clone()])?;
    let source = filled_trail(dir.path(), &[noise(20_000, 6)])?;

    let progress = ProgressHandle::new();
    progress.cancel();

    let status = trail.copy_range_from(
        &source,
        source.span(),
        1000,
        EditMode::Insert,
        &[Some(0)],
        &no_blend(),
        &no_blend(),
        &progress,
    )?;
    assert_eq!(status, EditStatus::Cancelled);

    let status = trail.clear_range(
        Span::new(0, 20_000),
        ClearMode::Overwrite,
        &[true],
        &linear(100),
        &progress,
    )?;
    assert_eq!(status, EditStatus::Cancelled);

    let status = trail.remove_range(Span::new(0, 20_000), &[true], &linear(100), &progress)?;
    assert_eq!(status, EditStatus::Cancelled);

    assert_eq!(trail.length(), 30_000);
    assert_eq!(trail.stakes().len(), 1);
    assert_eq!(read_all(&trail, trail.span())?[0], original);
    Ok(())
}

#[test]
fn test_failed_copy_leaves_trail_unchanged() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let temp_dir = dir.path().join("scratch");
    std::fs::create_dir(&temp_dir)?;
    let trail = Trail::new(1, &EngineConfig::default().with_temp_dir(&temp_dir));
    let silent: StakeRef = Arc::new(SilentStake::new(Span::new(0, 1000), 1));
    trail.append(vec![silent])?;
    let source = filled_trail(dir.path(), &[dc(200, 0.5)])?;
    let before = trail.stakes();

    std::fs::remove_dir(&temp_dir)?;
    let result = trail.copy_range_from(
        &source,
        source.span(),
        100,
        EditMode::Overwrite,
        &[Some(0)],
        &no_blend(),
        &no_blend(),
        &ProgressHandle::new(),
    );
    assert!(matches!(result, Err(StoreError::IoError(_))));

    let after = trail.stakes();
    assert_eq!(after.len(), before.len());
    assert!(after.iter().zip(&before).all(|(a, b)| Arc::ptr_eq(a, b)));
    assert_eq!(trail.length(), 1000);
    assert!(read_all(&trail, trail.span())?[0].iter().all(|s| *s == 0.0));
    Ok(())
}

#[test]
fn test_failed_flatten_reports_the_sink_error() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let original = noise(3 * crate::stake::BLOCK_FRAMES, 10);
    let trail = filled_trail(dir.path(), &[original.clone()])?;

    let mut sink = FailingSink { writes: 0 };
    let result = trail.flatten(&mut sink, trail.span(), &[0], &ProgressHandle::new());
    assert!(matches!(result, Err(StoreError::IoError(_))));
    assert_eq!(sink.writes, 2);

    assert_eq!(trail.stakes().len(), 1);
    assert_eq!(read_all(&trail, trail.span())?[0], original);
    Ok(())
}

#[test]
fn test_progress_reaches_the_end() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let trail = filled_trail(dir.path(), &[noise(20_000, 7)])?;
    let progress = ProgressHandle::new();
    trail
        .clear_range(
            Span::new(0, 20_000),
            ClearMode::Overwrite,
            &[true],
            &no_blend(),
            &progress,
        )?
        .is_completed()
        .then_some(())
        .ok_or("clear did not complete")?;
    assert_eq!(progress.progress(), 1.0);
    Ok(())
}

#[test]
fn test_invalid_commit_is_rejected() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let trail = filled_trail(dir.path(), &[dc(100, 1.0)])?;
    let stray = trail.alloc(Span::new(0, 10))?;

    let result = trail.commit(TrailEdit::new().insert(50, vec![stray.clone()]));
    assert!(matches!(result, Err(StoreError::OutOfRange { .. })));

    let result = trail.commit(TrailEdit::new().remove(Span::new(90, 120)));
    assert!(matches!(result, Err(StoreError::InvalidSpan { .. })));

    // The first primitive is fine but the second isn't: nothing is applied.
    let result = trail.commit(
        TrailEdit::new()
            .remove(Span::new(0, 10))
            .insert(50, vec![stray]),
    );
    assert!(result.is_err());
    assert_eq!(trail.length(), 100);
    assert_partition(&trail);
    Ok(())
}

#[test]
fn test_flatten_zero_fills_under_run() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let original = ramp(1000, 0.0);
    let trail = filled_trail(dir.path(), &[original.clone()])?;

    let mut sink = MemorySink::new(1);
    let status = trail.flatten(&mut sink, Span::new(900, 1100), &[0], &ProgressHandle::new())?;
    assert!(status.is_completed());
    assert_eq!(sink.total_frames(), 200);
    assert_eq!(sink.planar_samples[0][..100], original[900..]);
    assert!(sink.planar_samples[0][100..].iter().all(|s| *s == 0.0));
    Ok(())
}

#[test]
fn test_flatten_remaps_channels() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let left = noise(20_000, 8);
    let right = noise(20_000, 9);
    let trail = filled_trail(dir.path(), &[left.clone(), right.clone()])?;
    append(&trail, &[dc(100, 0.1), dc(100, 0.2)])?;

    let mut sink = MemorySink::new(2);
    trail
        .flatten(&mut sink, trail.span(), &[1, 0], &ProgressHandle::new())?
        .is_completed()
        .then_some(())
        .ok_or("flatten did not complete")?;
    assert_eq!(sink.planar_samples[0][..20_000], right[..]);
    assert_eq!(sink.planar_samples[1][..20_000], left[..]);
    assert!(sink.planar_samples[0][20_000..].iter().all(|s| *s == 0.2));
    assert!(sink.writes.iter().all(|w| *w <= crate::stake::BLOCK_FRAMES));

    let mut mono = MemorySink::new(1);
    trail
        .flatten(&mut mono, Span::new(0, 10), &[1], &ProgressHandle::new())?
        .is_completed()
        .then_some(())
        .ok_or("flatten did not complete")?;
    assert_eq!(mono.planar_samples[0], right[..10]);

    let result = trail.flatten(&mut mono, Span::new(0, 10), &[2], &ProgressHandle::new());
    assert!(matches!(result, Err(StoreError::ChannelMismatch { .. })));
    Ok(())
}

#[test]
fn test_playback_batch_matches_reads() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let config = EngineConfig::default()
        .with_temp_dir(dir.path())
        .with_silent_threshold(10);
    let trail = Trail::new(2, &config);
    append(&trail, &[ramp(500, 0.0), ramp(500, 1.0)])?;
    append(&trail, &[ramp(300, 2.0), ramp(300, 3.0)])?;
    trail
        .clear_range(
            Span::new(100, 400),
            ClearMode::Overwrite,
            &[true, true],
            &no_blend(),
            &ProgressHandle::new(),
        )?
        .is_completed()
        .then_some(())
        .ok_or("clear did not complete")?;

    let span = Span::new(-20, 850);
    let mut batch = PlaybackBatch::new(1);
    trail.enqueue_playback_read(&mut batch, span, 0)?;
    assert!(batch
        .reads()
        .iter()
        .any(|r| matches!(r, PlaybackRead::Zero { frames: 300, .. })));

    let mut played = vec![vec![9.0; 870]; 2];
    batch.execute_local(&mut played)?;
    let mut expected = vec![vec![0.0; 870]; 2];
    Trail::read_clamped(&trail.stakes(), &mut expected, 0, span)?;
    assert_eq!(played, expected);
    Ok(())
}

#[test]
fn test_channel_groups_spread_over_files() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let config = EngineConfig::default().with_temp_dir(dir.path());
    let trail = Trail::with_channel_groups(vec![2, 1], &config)?;
    assert_eq!(trail.channels(), 3);

    let data = vec![ramp(400, 0.0), ramp(400, 1.0), ramp(400, 2.0)];
    append(&trail, &data)?;
    let source = filled_trail(dir.path(), &[dc(100, 0.5)])?;
    trail
        .copy_range_from(
            &source,
            source.span(),
            200,
            EditMode::Overwrite,
            &[None, None, Some(0)],
            &no_blend(),
            &no_blend(),
            &ProgressHandle::new(),
        )?
        .is_completed()
        .then_some(())
        .ok_or("copy did not complete")?;

    let out = read_all(&trail, trail.span())?;
    assert_eq!(out[0], data[0]);
    assert_eq!(out[1], data[1]);
    assert_eq!(out[2][..200], data[2][..200]);
    assert!(out[2][200..300].iter().all(|s| *s == 0.5));
    assert_eq!(std::fs::read_dir(dir.path())?.count(), 3);

    assert!(Trail::with_channel_groups(vec![2, 0], &config).is_err());
    Ok(())
}
