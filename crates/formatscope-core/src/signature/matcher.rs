//! Byte-sequence matching against in-memory content.
//!
//! A prepared [`ByteSequence`] is a list of steps in match order, each a
//! gap followed by a fragment. BOF and Variable sequences walk the content
//! forwards; EOF sequences walk a mirrored view of it, with fragments
//! already reversed at preparation time.
//!
//! The search backtracks: when a fragment is found at one position but the
//! rest of the chain fails from there, later positions within the gap are
//! tried. Failed `(step, position)` pairs are remembered, which bounds the
//! work at roughly content length times step count.

use std::collections::HashSet;

use super::model::{Anchor, ByteFragment, ByteSequence, Step};

/// Read-only view of the content in match direction.
trait Haystack {
    fn len(&self) -> usize;
    fn byte(&self, index: usize) -> u8;
}

struct Forward<'a>(&'a [u8]);

impl Haystack for Forward<'_> {
    #[inline]
    fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    fn byte(&self, index: usize) -> u8 {
        self.0[index]
    }
}

struct Backward<'a>(&'a [u8]);

impl Haystack for Backward<'_> {
    #[inline]
    fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    fn byte(&self, index: usize) -> u8 {
        self.0[self.0.len() - 1 - index]
    }
}

/// Matches prepared byte sequences against content.
#[derive(Debug, Default, Clone, Copy)]
pub struct SequenceMatcher;

impl SequenceMatcher {
    /// Returns `true` if `sequence` is present in `content` according to
    /// its anchor.
    ///
    /// A sequence that was never prepared has no steps and never matches.
    pub fn matches(&self, sequence: &ByteSequence, content: &[u8]) -> bool {
        let steps = sequence.steps();
        if steps.is_empty() {
            return false;
        }
        let mut failed = HashSet::new();
        match sequence.anchor() {
            Anchor::Bof | Anchor::Variable => search(&Forward(content), steps, 0, 0, &mut failed),
            Anchor::Eof => search(&Backward(content), steps, 0, 0, &mut failed),
        }
    }
}

fn fragment_at<H: Haystack>(hay: &H, fragment: &ByteFragment, start: usize) -> bool {
    fragment
        .positions()
        .iter()
        .enumerate()
        .all(|(i, expected)| expected.is_none_or(|b| hay.byte(start + i) == b))
}

fn search<H: Haystack>(
    hay: &H,
    steps: &[Step],
    index: usize,
    pos: usize,
    failed: &mut HashSet<(usize, usize)>,
) -> bool {
    let Some(step) = steps.get(index) else {
        return true;
    };
    if failed.contains(&(index, pos)) {
        return false;
    }

    let len = step.fragment.len();
    let Some(last_start) = hay.len().checked_sub(len) else {
        failed.insert((index, pos));
        return false;
    };
    let first = pos.saturating_add(step.gap.min);
    let last = match step.gap.max {
        Some(max) => pos.saturating_add(max).min(last_start),
        None => last_start,
    };

    if first <= last {
        for start in first..=last {
            if fragment_at(hay, &step.fragment, start)
                && search(hay, steps, index + 1, start + len, failed)
            {
                return true;
            }
        }
    }
    failed.insert((index, pos));
    false
}
