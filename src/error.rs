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
use std::io;

use crate::span::Span;

/// Error types for stake, trail and decimation operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Span {span} lies outside of {bounds}")]
    OutOfRange { span: Span, bounds: Span },

    #[error("Channel mismatch: expected {expected} channels, got {actual}")]
    ChannelMismatch { expected: usize, actual: usize },

    #[error("Edit would lose channel sync: insert mode requires all or no channels selected")]
    ChannelSyncLost,

    #[error("Span {span} is not covered by the trail {bounds}")]
    InvalidSpan { span: Span, bounds: Span },

    #[error("Decimation level {level} does not exist (levels: {levels})")]
    NoSuchLevel { level: usize, levels: usize },

    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    #[error("WAV error: {0}")]
    WavError(#[from] hound::Error),
}

impl StoreError {
    /// Error returned for any write attempt on a stake without storage.
    pub fn read_only() -> StoreError {
        StoreError::IoError(io::Error::new(
            io::ErrorKind::Unsupported,
            "silent stakes cannot be written to",
        ))
    }

    /// Checks that a span lies inside the given bounds.
    pub fn check_range(span: Span, bounds: Span) -> Result<(), StoreError> {
        if bounds.contains_span(&span) {
            Ok(())
        } else {
            Err(StoreError::OutOfRange { span, bounds })
        }
    }

    /// Checks a channel count before any I/O is attempted.
    pub fn check_channels(expected: usize, actual: usize) -> Result<(), StoreError> {
        if expected == actual {
            Ok(())
        } else {
            Err(StoreError::ChannelMismatch { expected, actual })
        }
    }

    /// True for the I/O class of failures.
    pub fn is_io(&self) -> bool {
        matches!(self, StoreError::IoError(_) | StoreError::WavError(_))
    }
}

/// Outcome of a long running edit that can be cancelled cooperatively.
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditStatus {
    Completed,
    Cancelled,
}

impl EditStatus {
    pub fn is_completed(&self) -> bool {
        *self == EditStatus::Completed
    }
}
