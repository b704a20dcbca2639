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

/// Integer arithmetic for one power-of-two decimation level.
///
/// All conversions round to the nearest multiple of the factor rather than
/// truncating, and work for negative offsets (the mask is the two's complement
/// of the factor).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decimation {
    /// Decimated sample rate.
    pub rate: f64,
    pub shift: u32,
    pub factor: i64,
    pub round_add: i64,
    pub mask: i64,
}

impl Decimation {
    pub fn new(full_rate: f64, shift: u32) -> Decimation {
        let factor = 1i64 << shift;
        Decimation {
            rate: full_rate / factor as f64,
            shift,
            factor,
            round_add: factor >> 1,
            mask: -factor,
        }
    }

    /// Converts a full rate frame count into a decimated frame count, rounding to
    /// the nearest decimated frame.
    #[inline]
    pub fn to_subsample_length(&self, full: i64) -> i64 {
        (full + self.round_add) >> self.shift
    }

    /// Converts a decimated frame count back to full rate.
    #[inline]
    pub fn to_full_length(&self, sub: i64) -> i64 {
        sub << self.shift
    }

    /// Rounds a (possibly negative) full rate offset to the nearest multiple of
    /// the factor.
    #[inline]
    pub fn align(&self, full: i64) -> i64 {
        (full + self.round_add) & self.mask
    }
}
