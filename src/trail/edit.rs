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
use crate::error::StoreError;
use crate::span::Span;
use crate::stake::StakeRef;

/// Describes one change to a trail, in the coordinates the trail had before
/// the change: `span` was replaced by `span.length() + delta` frames of new
/// content, and everything after `span.stop` moved by `delta`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EditNotice {
    pub span: Span,
    pub delta: i64,
}

impl EditNotice {
    /// The region holding new content after the edit.
    pub fn new_span(&self) -> Span {
        Span::new(self.span.start, self.span.stop + self.delta)
    }
}

/// Something that derives data from a trail and has to follow its edits, such
/// as a decimation cache.
pub trait TrailDependant: Send + Sync {
    fn trail_edited(&self, notice: &EditNotice);
}

#[derive(Debug)]
enum EditOp {
    Insert { pos: i64, stakes: Vec<StakeRef> },
    Replace { span: Span, stakes: Vec<StakeRef> },
    Remove { span: Span },
}

/// An ordered list of primitive changes, published by `Trail::commit` as one
/// atomic step. Each primitive is expressed in the coordinates left behind by
/// the previous one.
#[derive(Debug, Default)]
pub struct TrailEdit {
    ops: Vec<EditOp>,
}

impl TrailEdit {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts contiguous stakes starting at `pos`, moving everything from
    /// `pos` on back by their total length.
    pub fn insert(mut self, pos: i64, stakes: Vec<StakeRef>) -> Self {
        self.ops.push(EditOp::Insert { pos, stakes });
        self
    }

    /// Replaces the content of `span` with stakes covering exactly `span`.
    pub fn replace(mut self, span: Span, stakes: Vec<StakeRef>) -> Self {
        self.ops.push(EditOp::Replace { span, stakes });
        self
    }

    /// Cuts `span` out of the trail, moving everything after it forward.
    pub fn remove(mut self, span: Span) -> Self {
        self.ops.push(EditOp::Remove { span });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Applies every primitive to `stakes` and returns the notices for them.
    /// On error `stakes` may be partially modified, so callers work on a copy.
    pub(super) fn apply(
        self,
        stakes: &mut Vec<StakeRef>,
        channels: usize,
    ) -> Result<Vec<EditNotice>, StoreError> {
        let mut notices = Vec::with_capacity(self.ops.len());
        for op in self.ops {
            let (span, replacement) = match op {
                EditOp::Insert { pos, stakes } => (Span::new(pos, pos), stakes),
                EditOp::Replace { span, stakes } => (span, stakes),
                EditOp::Remove { span } => (span, Vec::new()),
            };
            let added: i64 = replacement.iter().map(|s| s.span().length()).sum();
            let notice = EditNotice {
                span,
                delta: added - span.length(),
            };

            let bounds = Span::new(0, trail_length(stakes));
            if !bounds.contains_span(&span) {
                return Err(StoreError::InvalidSpan { span, bounds });
            }
            check_contiguous(&replacement, span.start, channels)?;

            *stakes = splice(stakes, span, replacement, notice.delta);
            notices.push(notice);
        }
        Ok(notices)
    }
}

/// Length of a stake list that starts at zero.
pub(super) fn trail_length(stakes: &[StakeRef]) -> i64 {
    stakes.last().map(|s| s.span().stop).unwrap_or(0)
}

/// Verifies that `stakes` follow each other without gaps from `start` on.
pub(super) fn check_contiguous(
    stakes: &[StakeRef],
    start: i64,
    channels: usize,
) -> Result<(), StoreError> {
    let mut pos = start;
    for stake in stakes {
        let span = stake.span();
        if span.start != pos {
            return Err(StoreError::OutOfRange {
                span,
                bounds: Span::new(pos, pos),
            });
        }
        StoreError::check_channels(channels, stake.channels())?;
        pos = span.stop;
    }
    Ok(())
}

/// Replaces `span` of the list by `replacement` and moves everything after it
/// by `delta`. Stakes straddling the span borders are cut.
fn splice(
    stakes: &[StakeRef],
    span: Span,
    replacement: Vec<StakeRef>,
    delta: i64,
) -> Vec<StakeRef> {
    let mut before = Vec::with_capacity(stakes.len() + replacement.len() + 1);
    let mut after = Vec::new();

    for stake in stakes {
        let s = stake.span();
        if s.stop <= span.start {
            before.push(stake.clone());
        } else if s.start >= span.stop {
            after.push(if delta == 0 {
                stake.clone()
            } else {
                stake.shift_virtual(delta)
            });
        } else {
            if s.start < span.start {
                before.push(stake.replace_stop(span.start));
            }
            if s.stop > span.stop {
                let tail = stake.replace_start(span.stop);
                after.push(if delta == 0 {
                    tail
                } else {
                    tail.shift_virtual(delta)
                });
            }
        }
    }

    before.extend(replacement.into_iter().filter(|s| !s.span().is_empty()));
    before.extend(after);
    before
}
