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
use std::f64::consts::FRAC_PI_2;

use clap::ValueEnum;
use serde::Deserialize;

/// The shape of a fade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum FadeCurve {
    /// Gains sum to one at every point.
    #[default]
    Linear,
    /// Squared gains sum to one at every point, which keeps uncorrelated
    /// signals at constant loudness.
    EqualPower,
}

impl FadeCurve {
    /// Gain of the incoming signal at relative position `t` in `[0, 1]`.
    #[inline]
    fn fade_in_gain(&self, t: f64) -> f32 {
        match self {
            FadeCurve::Linear => t as f32,
            FadeCurve::EqualPower => (t * FRAC_PI_2).sin() as f32,
        }
    }

    /// Gain of the outgoing signal at relative position `t` in `[0, 1]`.
    #[inline]
    fn fade_out_gain(&self, t: f64) -> f32 {
        match self {
            FadeCurve::Linear => (1.0 - t) as f32,
            FadeCurve::EqualPower => (t * FRAC_PI_2).cos() as f32,
        }
    }
}

/// A crossfade window. The window may be split around a cut point into a part
/// left of the cut and a part right of it.
///
/// Offsets passed to the fade functions are relative to the start of the
/// window. At offset zero the outgoing signal has full gain and the incoming
/// signal none, so a window starting at a splice point never produces a jump.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlendContext {
    left_length: i64,
    right_length: i64,
    curve: FadeCurve,
}

impl BlendContext {
    /// A window of `length` frames centered on the cut point.
    pub fn new(length: i64, curve: FadeCurve) -> BlendContext {
        let length = length.max(0);
        let left_length = length / 2;
        BlendContext {
            left_length,
            right_length: length - left_length,
            curve,
        }
    }

    /// A window with explicit lengths on either side of the cut point.
    pub fn split(left_length: i64, right_length: i64, curve: FadeCurve) -> BlendContext {
        BlendContext {
            left_length: left_length.max(0),
            right_length: right_length.max(0),
            curve,
        }
    }

    pub fn length(&self) -> i64 {
        self.left_length + self.right_length
    }

    pub fn left_length(&self) -> i64 {
        self.left_length
    }

    pub fn right_length(&self) -> i64 {
        self.right_length
    }

    pub fn curve(&self) -> FadeCurve {
        self.curve
    }

    pub fn is_empty(&self) -> bool {
        self.length() == 0
    }

    #[inline]
    fn position(&self, offset: i64) -> f64 {
        let len = self.length();
        if len <= 0 {
            1.0
        } else {
            (offset as f64 / len as f64).clamp(0.0, 1.0)
        }
    }

    /// Scales `buf` in place by the fade in curve, starting at `offset`.
    pub fn fade_in(&self, offset: i64, buf: &mut [f32]) {
        for (i, sample) in buf.iter_mut().enumerate() {
            *sample *= self.curve.fade_in_gain(self.position(offset + i as i64));
        }
    }

    /// Scales `buf` in place by the fade out curve, starting at `offset`.
    pub fn fade_out(&self, offset: i64, buf: &mut [f32]) {
        for (i, sample) in buf.iter_mut().enumerate() {
            *sample *= self.curve.fade_out_gain(self.position(offset + i as i64));
        }
    }

    /// Crossfades from `outgoing` to `incoming` into `dst`. All three slices are
    /// processed up to the length of the shortest.
    pub fn blend(&self, offset: i64, outgoing: &[f32], incoming: &[f32], dst: &mut [f32]) {
        for (i, ((out, a), b)) in dst.iter_mut().zip(outgoing).zip(incoming).enumerate() {
            let t = self.position(offset + i as i64);
            *out = a * self.curve.fade_out_gain(t) + b * self.curve.fade_in_gain(t);
        }
    }
}
