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
// Overview summaries. Every decimated frame holds, per track channel, the
// maximum, the minimum and the mean square of the block it stands for, stored
// as three consecutive file channels.
//

/// File channels used per track channel.
pub const SUMMARY_VALUES: usize = 3;

const MAX: usize = 0;
const MIN: usize = 1;
const MEAN_SQUARE: usize = 2;

/// Index of the maximum of `channel` in a planar summary buffer.
pub fn max_index(channel: usize) -> usize {
    channel * SUMMARY_VALUES + MAX
}

/// Index of the minimum of `channel` in a planar summary buffer.
pub fn min_index(channel: usize) -> usize {
    channel * SUMMARY_VALUES + MIN
}

/// Index of the mean square of `channel` in a planar summary buffer.
pub fn mean_square_index(channel: usize) -> usize {
    channel * SUMMARY_VALUES + MEAN_SQUARE
}

/// Summarizes `len` full rate frames of planar `input` in blocks of `factor`
/// frames. A trailing partial block is summarized over the frames it has.
/// Returns the number of decimated frames written to `out`.
pub fn summarize(input: &[Vec<f32>], len: usize, factor: usize, out: &mut [Vec<f32>]) -> usize {
    let frames = len.div_ceil(factor);
    for (channel, samples) in input.iter().enumerate() {
        for (frame, block) in samples[..len].chunks(factor).enumerate() {
            let mut max = f32::MIN;
            let mut min = f32::MAX;
            let mut sum_squares = 0.0f32;
            for sample in block {
                max = max.max(*sample);
                min = min.min(*sample);
                sum_squares += sample * sample;
            }
            out[max_index(channel)][frame] = max;
            out[min_index(channel)][frame] = min;
            out[mean_square_index(channel)][frame] = sum_squares / block.len() as f32;
        }
    }
    frames
}

/// Combines `len` frames of a finer summary in groups of `ratio` into a
/// coarser one. Returns the number of frames written to `out`.
pub fn reduce(input: &[Vec<f32>], len: usize, ratio: usize, out: &mut [Vec<f32>]) -> usize {
    let frames = len.div_ceil(ratio);
    let channels = input.len() / SUMMARY_VALUES;
    for channel in 0..channels {
        let maxes = input[max_index(channel)][..len].chunks(ratio);
        let mins = input[min_index(channel)][..len].chunks(ratio);
        let squares = input[mean_square_index(channel)][..len].chunks(ratio);
        for (frame, ((max, min), squares)) in maxes.zip(mins).zip(squares).enumerate() {
            out[max_index(channel)][frame] = max.iter().copied().fold(f32::MIN, f32::max);
            out[min_index(channel)][frame] = min.iter().copied().fold(f32::MAX, f32::min);
            out[mean_square_index(channel)][frame] =
                squares.iter().sum::<f32>() / squares.len() as f32;
        }
    }
    frames
}
