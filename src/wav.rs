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
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use hound::{SampleFormat, WavReader, WavSamples, WavSpec, WavWriter};
use tracing::{debug, info};

use crate::error::{EditStatus, StoreError};
use crate::progress::ProgressHandle;
use crate::sink::FrameSink;
use crate::span::Span;
use crate::stake::BLOCK_FRAMES;
use crate::trail::Trail;

/// The layout of a WAV file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavInfo {
    pub channels: usize,
    pub sample_rate: u32,
    pub frames: i64,
}

/// Reads the layout of a WAV file without reading its samples.
pub fn probe<P: AsRef<Path>>(path: P) -> Result<WavInfo, StoreError> {
    let reader = WavReader::open(path)?;
    let spec = reader.spec();
    Ok(WavInfo {
        channels: spec.channels as usize,
        sample_rate: spec.sample_rate,
        frames: reader.duration() as i64,
    })
}

/// Appends the content of a WAV file to the end of `trail`. Integer samples are
/// scaled to `[-1, 1)`. The trail is only changed if the whole file was read.
pub fn import<P: AsRef<Path>>(
    path: P,
    trail: &Trail,
    progress: &ProgressHandle,
) -> Result<EditStatus, StoreError> {
    let mut reader: WavReader<BufReader<File>> = WavReader::open(path.as_ref())?;
    let spec = reader.spec();
    let channels = spec.channels as usize;
    StoreError::check_channels(trail.channels(), channels)?;

    let frames = reader.duration() as i64;
    if frames == 0 {
        return Ok(EditStatus::Completed);
    }
    debug!(
        path = %path.as_ref().display(),
        channels,
        sample_rate = spec.sample_rate,
        frames,
        "Importing WAV file"
    );

    let stake = trail.alloc(Span::with_length(trail.length(), frames))?;
    let mut samples = match spec.sample_format {
        SampleFormat::Float => Samples::Float(reader.samples::<f32>()),
        SampleFormat::Int => Samples::Int {
            samples: reader.samples::<i32>(),
            // Use i64 to avoid overflow for 32-bit samples
            scale_factor: 1.0 / (1i64 << (spec.bits_per_sample.max(1) - 1)) as f32,
        },
    };
    let mut buffers = vec![Vec::with_capacity(BLOCK_FRAMES); channels];
    let mut pos = stake.span().start;

    while pos < stake.span().stop {
        let len = (stake.span().stop - pos).min(BLOCK_FRAMES as i64) as usize;
        for channel in buffers.iter_mut() {
            channel.clear();
        }
        for i in 0..len * channels {
            match samples.next_sample()? {
                Some(sample) => buffers[i % channels].push(sample),
                None => break,
            }
        }
        // A truncated file ends in silence.
        for channel in buffers.iter_mut() {
            channel.resize(len, 0.0);
        }

        stake.write_frames(&buffers, 0, Span::with_length(pos, len as i64))?;
        pos += len as i64;
        if !progress.report_progress((pos - stake.span().start) as f32 / frames as f32) {
            info!("WAV import cancelled");
            return Ok(EditStatus::Cancelled);
        }
    }

    stake.flush()?;
    trail.append(vec![stake])?;
    Ok(EditStatus::Completed)
}

/// Interleaved samples of either format, as f32.
enum Samples<'a> {
    Float(WavSamples<'a, BufReader<File>, f32>),
    Int {
        samples: WavSamples<'a, BufReader<File>, i32>,
        scale_factor: f32,
    },
}

impl Samples<'_> {
    fn next_sample(&mut self) -> Result<Option<f32>, hound::Error> {
        match self {
            Samples::Float(samples) => samples.next().transpose(),
            Samples::Int {
                samples,
                scale_factor,
            } => Ok(samples.next().transpose()?.map(|s| s as f32 * *scale_factor)),
        }
    }
}

/// Writes frames into a 32 bit float WAV file.
pub struct WavSink {
    writer: WavWriter<BufWriter<File>>,
    channels: usize,
}

impl WavSink {
    pub fn create<P: AsRef<Path>>(
        path: P,
        channels: usize,
        sample_rate: u32,
    ) -> Result<WavSink, StoreError> {
        let writer = WavWriter::create(
            path,
            WavSpec {
                channels: channels as u16,
                sample_rate,
                bits_per_sample: 32,
                sample_format: SampleFormat::Float,
            },
        )?;
        Ok(WavSink { writer, channels })
    }

    /// Writes the header lengths and closes the file.
    pub fn finalize(self) -> Result<(), StoreError> {
        self.writer.finalize()?;
        Ok(())
    }
}

impl FrameSink for WavSink {
    fn channels(&self) -> usize {
        self.channels
    }

    fn write_frames(
        &mut self,
        buffers: &[Vec<f32>],
        buf_offset: usize,
        len: usize,
    ) -> Result<(), StoreError> {
        StoreError::check_channels(self.channels, buffers.len())?;
        for frame in buf_offset..buf_offset + len {
            for channel in buffers {
                self.writer.write_sample(channel[frame])?;
            }
        }
        Ok(())
    }
}
