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
use std::cmp;
use std::fmt;

/// A half-open interval of frame indices, `[start, stop)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Span {
    pub start: i64,
    pub stop: i64,
}

impl Span {
    /// Creates a new span. `stop` is clamped so that it's never before `start`.
    pub fn new(start: i64, stop: i64) -> Span {
        Span {
            start,
            stop: cmp::max(start, stop),
        }
    }

    /// Creates a span of the given length starting at `start`.
    pub fn with_length(start: i64, length: i64) -> Span {
        Span::new(start, start + length)
    }

    pub fn length(&self) -> i64 {
        self.stop - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.stop == self.start
    }

    /// True if the frame at `pos` lies inside the span.
    pub fn contains(&self, pos: i64) -> bool {
        pos >= self.start && pos < self.stop
    }

    /// True if `other` lies completely within this span.
    pub fn contains_span(&self, other: &Span) -> bool {
        other.start >= self.start && other.stop <= self.stop
    }

    /// True if the two spans share at least one frame.
    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.stop && other.start < self.stop
    }

    /// The common part of both spans. Empty (and anchored at the later start) if
    /// they don't overlap.
    pub fn intersection(&self, other: &Span) -> Span {
        let start = cmp::max(self.start, other.start);
        Span::new(start, cmp::min(self.stop, other.stop))
    }

    /// Moves the span by `delta` frames.
    pub fn shift(&self, delta: i64) -> Span {
        Span {
            start: self.start + delta,
            stop: self.stop + delta,
        }
    }

    /// Clamps a frame position into the span.
    pub fn clip(&self, pos: i64) -> i64 {
        pos.clamp(self.start, self.stop)
    }

    pub fn replace_start(&self, start: i64) -> Span {
        Span::new(start, self.stop)
    }

    pub fn replace_stop(&self, stop: i64) -> Span {
        Span::new(self.start, stop)
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.stop)
    }
}
