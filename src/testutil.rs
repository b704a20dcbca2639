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
use std::{error::Error, f32::consts::PI, fs::File, path::Path};

use hound::{SampleFormat, WavSpec, WavWriter};
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::config::EngineConfig;
use crate::error::StoreError;
use crate::span::Span;
use crate::trail::Trail;

/// A rising ramp from `start` towards `start + 1`. Every sample is distinct,
/// which makes misplaced frames easy to spot.
pub fn ramp(len: usize, start: f32) -> Vec<f32> {
    (0..len).map(|i| start + i as f32 / len as f32).collect()
}

/// A constant signal.
pub fn dc(len: usize, value: f32) -> Vec<f32> {
    vec![value; len]
}

/// Uniform noise in `[-1, 1)`, reproducible through `seed`.
pub fn noise(len: usize, seed: u64) -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..len).map(|_| rng.gen_range(-1.0..1.0)).collect()
}

/// A sine wave.
pub fn sine(len: usize, frequency: f32, sample_rate: u32) -> Vec<f32> {
    (0..len)
        .map(|i| (2.0 * PI * frequency * i as f32 / sample_rate as f32).sin())
        .collect()
}

/// Calculate RMS (Root Mean Square) of a signal
pub fn calculate_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f32 = samples.iter().map(|&x| x * x).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

/// The largest difference between neighbouring samples.
pub fn max_step(samples: &[f32]) -> f32 {
    samples
        .windows(2)
        .map(|w| (w[1] - w[0]).abs())
        .fold(0.0, f32::max)
}

/// Asserts that two signals match within `tolerance`.
pub fn assert_close(actual: &[f32], expected: &[f32], tolerance: f32) {
    assert_eq!(actual.len(), expected.len(), "signal lengths differ");
    for (i, (a, e)) in actual.iter().zip(expected).enumerate() {
        assert!(
            (a - e).abs() <= tolerance,
            "sample {} differs: {} != {}",
            i,
            a,
            e
        );
    }
}

/// A trail writing into `dir`, filled with the given planar data.
pub fn filled_trail(dir: &Path, planar: &[Vec<f32>]) -> Result<Trail, StoreError> {
    let config = EngineConfig::default().with_temp_dir(dir);
    let trail = Trail::new(planar.len(), &config);
    append(&trail, planar)?;
    Ok(trail)
}

/// Appends planar data to the end of a trail.
pub fn append(trail: &Trail, planar: &[Vec<f32>]) -> Result<(), StoreError> {
    let len = planar.first().map(|c| c.len()).unwrap_or(0) as i64;
    let stake = trail.alloc(Span::with_length(trail.length(), len))?;
    stake.write_frames(planar, 0, stake.span())?;
    stake.flush()?;
    trail.append(vec![stake])
}

/// Reads a whole span of a trail into fresh planar buffers.
pub fn read_all(trail: &Trail, span: Span) -> Result<Vec<Vec<f32>>, StoreError> {
    let mut out = vec![vec![0.0; span.length() as usize]; trail.channels()];
    trail.read_frames(&mut out, 0, span)?;
    Ok(out)
}

/// Writes planar samples to a wav file.
pub fn write_wav(
    path: &Path,
    samples: &[Vec<f32>],
    sample_rate: u32,
    format: SampleFormat,
) -> Result<(), Box<dyn Error>> {
    let num_channels = samples.len();
    assert!(num_channels <= u16::MAX.into(), "Too many channels!");
    let bits_per_sample = match format {
        SampleFormat::Float => 32,
        SampleFormat::Int => 16,
    };
    let mut writer = WavWriter::new(
        File::create(path)?,
        WavSpec {
            channels: num_channels as u16,
            sample_rate,
            bits_per_sample,
            sample_format: format,
        },
    )?;

    let frames = samples.first().map(|c| c.len()).unwrap_or(0);
    for frame in 0..frames {
        for channel in samples {
            match format {
                SampleFormat::Float => writer.write_sample(channel[frame])?,
                SampleFormat::Int => {
                    writer.write_sample((channel[frame] * i16::MAX as f32) as i16)?
                }
            }
        }
    }
    writer.finalize()?;
    Ok(())
}
