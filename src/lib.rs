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
//! Disk-backed multichannel audio storage with non-destructive editing.
//!
//! A [`Trail`] is the content of one track: a gapless list of stakes, each a
//! view onto a span of a sample file. Edits build new stakes next to the old
//! ones and swap the list in one commit, so the original audio is never
//! rewritten. A [`DecimationCache`] keeps min/max/RMS overviews of a trail up
//! to date as it is edited.
pub mod blend;
pub mod config;
pub mod decimation;
pub mod error;
pub mod progress;
pub mod sample_file;
pub mod sink;
pub mod span;
pub mod stake;
pub mod trail;
pub mod wav;

#[cfg(test)]
mod testutil;

pub use blend::{BlendContext, FadeCurve};
pub use config::{ConfigError, DecimationConfig, EngineConfig};
pub use decimation::{DecimationCache, Overview};
pub use error::{EditStatus, StoreError};
pub use progress::ProgressHandle;
pub use sink::{FrameSink, MemorySink};
pub use span::Span;
pub use stake::{Stake, StakeRef};
pub use trail::{ClearMode, EditMode, EditNotice, Trail, TrailDependant, TrailEdit};
