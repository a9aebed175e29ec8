//! Per-axis selectors and their translation into start/count pairs.
//!
//! Only two kinds of selection are supported on each axis: a single index, which drops the axis
//! from the result, and a contiguous, non-empty slice with step 1, which keeps it. Anything else
//! is rejected before any I/O happens.
//!
use std::ops::{Range, RangeFrom, RangeFull, RangeTo};

use crate::{
    dtype::Block,
    errors::{Error, Result},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Selector {
    /// A single position. Negative values count back from the end of the axis.
    Index(isize),

    /// A contiguous range. Negative bounds count back from the end of the axis and are then
    /// clamped to it. Only a step of 1 is supported.
    Slice {
        start: Option<isize>,
        stop: Option<isize>,
        step: Option<isize>,
    },
}

impl Selector {
    /// The whole axis
    pub fn full() -> Self {
        Self::Slice {
            start: None,
            stop: None,
            step: None,
        }
    }

    pub fn range(start: isize, stop: isize) -> Self {
        Self::Slice {
            start: Some(start),
            stop: Some(stop),
            step: None,
        }
    }
}

impl From<isize> for Selector {
    fn from(index: isize) -> Self {
        Self::Index(index)
    }
}

impl From<Range<isize>> for Selector {
    fn from(range: Range<isize>) -> Self {
        Self::range(range.start, range.end)
    }
}

impl From<RangeFrom<isize>> for Selector {
    fn from(range: RangeFrom<isize>) -> Self {
        Self::Slice {
            start: Some(range.start),
            stop: None,
            step: None,
        }
    }
}

impl From<RangeTo<isize>> for Selector {
    fn from(range: RangeTo<isize>) -> Self {
        Self::Slice {
            start: None,
            stop: Some(range.end),
            step: None,
        }
    }
}

impl From<RangeFull> for Selector {
    fn from(_: RangeFull) -> Self {
        Self::full()
    }
}

/// A validated selection over every axis of an array, in logical axis order.
///
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Resolved {
    pub start: Vec<usize>,
    pub count: Vec<usize>,

    /// Axes selected with a single index, in increasing order
    pub squeeze: Vec<usize>,
}

impl Resolved {
    /// Shape of the array the selection produces, once index-selected axes are dropped
    pub fn shape(&self) -> Vec<usize> {
        self.count
            .iter()
            .enumerate()
            .filter(|(axis, _)| !self.squeeze.contains(axis))
            .map(|(_, count)| *count)
            .collect()
    }

    /// Drop the index-selected axes from a block read with this selection.
    pub fn squeeze(&self, block: Block) -> Block {
        // Highest axis first, so the remaining axis numbers stay valid
        self.squeeze
            .iter()
            .rev()
            .fold(block, |block, axis| block.index_axis_move(*axis, 0))
    }
}

/// Resolve `selectors` against an array of the given `shape`.
///
/// Axes past the end of `selectors` are selected in full.
///
pub(crate) fn resolve(selectors: &[Selector], shape: &[usize]) -> Result<Resolved> {
    if selectors.len() > shape.len() {
        return Err(Error::InvalidSelector(format!(
            "{} selectors for array with {} axes",
            selectors.len(),
            shape.len()
        )));
    }

    let mut start = Vec::with_capacity(shape.len());
    let mut count = Vec::with_capacity(shape.len());
    let mut squeeze = vec![];
    for (axis, &extent) in shape.iter().enumerate() {
        let selector = selectors.get(axis).copied().unwrap_or_else(Selector::full);
        match selector {
            Selector::Index(index) => {
                start.push(resolve_index(index, extent, axis)?);
                count.push(1);
                squeeze.push(axis);
            }
            Selector::Slice {
                start: slice_start,
                stop,
                step,
            } => {
                if let Some(step) = step {
                    if step != 1 {
                        return Err(Error::InvalidSelector(format!(
                            "step {step} on axis {axis}, only step 1 is supported"
                        )));
                    }
                }

                let slice_start = clamp_bound(slice_start, extent, 0);
                let stop = clamp_bound(stop, extent, extent);
                if stop <= slice_start {
                    return Err(Error::InvalidSelector(format!(
                        "empty slice {slice_start}..{stop} on axis {axis}"
                    )));
                }

                start.push(slice_start);
                count.push(stop - slice_start);
            }
        }
    }

    Ok(Resolved {
        start,
        count,
        squeeze,
    })
}

fn resolve_index(index: isize, extent: usize, axis: usize) -> Result<usize> {
    let resolved = if index < 0 {
        index + extent as isize
    } else {
        index
    };

    if resolved < 0 || resolved as usize >= extent {
        return Err(Error::InvalidSelector(format!(
            "index {index} is out of bounds for axis {axis} with extent {extent}"
        )));
    }

    Ok(resolved as usize)
}

/// Resolve a slice bound, counting negative bounds from the end and clamping to the axis
fn clamp_bound(bound: Option<isize>, extent: usize, default: usize) -> usize {
    match bound {
        None => default,
        Some(bound) if bound < 0 => (bound + extent as isize).max(0) as usize,
        Some(bound) => (bound as usize).min(extent),
    }
}
