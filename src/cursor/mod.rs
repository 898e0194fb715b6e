//! Resumable, copy-out cursors over the histogram iterators.
//!
//! The [iterator family](crate::iterators) is the idiomatic way to walk a histogram
//! from Rust. Host runtimes that pull one step at a time across a call boundary want
//! a different shape: create a cursor, call `advance` until it reports no more steps,
//! and read the current step as many times as needed between advances. Each flavor
//! has its own snapshot type carrying exactly the fields that flavor produces, and
//! every snapshot is a plain `Copy` struct: `current()` hands out values, never
//! references into the histogram, and repeated calls between advances return the
//! identical snapshot. Dropping a cursor releases it; there is nothing else to free.
//!
//! ```
//! use hdrange::Histogram;
//!
//! let mut hist = Histogram::<u64>::new_with_max(1000, 3).unwrap();
//! for v in &[100, 200, 200, 900] {
//!     hist.record(*v).unwrap();
//! }
//!
//! let mut cursor = hist.percentile_cursor(1);
//! while cursor.advance() {
//!     let step = cursor.current().unwrap();
//!     println!("{}'th percentile of data is {}", step.percentile, step.value);
//! }
//! ```

use crate::core::counter::Counter;
use crate::iterators::{self, HistogramIterator};
use crate::Histogram;

/// One step of a percentile (quantile) cursor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PercentileStep {
    /// Highest value equivalent to the slot iterated to.
    pub value: u64,
    /// Percentile this step iterated to.
    pub percentile: f64,
    /// Recorded count at this slot.
    pub count_at_value: u64,
    /// Samples at or below this step.
    pub cumulative_count: u64,
}

/// One step of a recorded-values cursor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecordedStep {
    /// Highest value equivalent to the slot iterated to.
    pub value: u64,
    /// Recorded count at this slot.
    pub count_at_value: u64,
    /// Samples at or below this step.
    pub cumulative_count: u64,
}

/// One step of an all-slots cursor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AllStep {
    /// Highest value equivalent to the slot iterated to.
    pub value: u64,
    /// Recorded count at this slot (possibly zero).
    pub count_at_value: u64,
    /// Samples at or below this step.
    pub cumulative_count: u64,
}

/// One step of a linear cursor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearStep {
    /// Highest value contained in the range this step covers.
    pub range_end: u64,
    /// Samples whose values fall in this range.
    pub count_in_range: u64,
    /// Samples at or below this range.
    pub cumulative_count: u64,
}

/// One step of a logarithmic cursor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogStep {
    /// Highest value contained in the range this step covers.
    pub range_end: u64,
    /// Samples whose values fall in this range.
    pub count_in_range: u64,
    /// Samples at or below this range.
    pub cumulative_count: u64,
}

macro_rules! cursor_advance {
    ($self:ident, $make:expr) => {{
        match $self.iter.next() {
            Some(v) => {
                $self.cumulative = $self
                    .cumulative
                    .saturating_add(v.count_since_last_iteration());
                $self.current = Some($make(&v, $self.cumulative));
                true
            }
            None => {
                $self.current = None;
                false
            }
        }
    }};
}

/// A cursor over quantile steps; see [`Histogram::percentile_cursor`].
pub struct PercentileCursor<'a, C: Counter> {
    iter: HistogramIterator<'a, C, iterators::quantile::Iter<'a, C>>,
    cumulative: u64,
    current: Option<PercentileStep>,
}

impl<'a, C: Counter> PercentileCursor<'a, C> {
    pub(crate) fn new(
        hist: &'a Histogram<C>,
        ticks_per_half_distance: u32,
    ) -> PercentileCursor<'a, C> {
        PercentileCursor {
            iter: hist.iter_quantiles(ticks_per_half_distance),
            cumulative: 0,
            current: None,
        }
    }

    /// Move to the next step. Returns false, and clears `current`, once the
    /// iteration is exhausted; further calls keep returning false.
    pub fn advance(&mut self) -> bool {
        cursor_advance!(self, |v: &iterators::IterationValue<C>, cumulative| {
            PercentileStep {
                value: v.value_iterated_to(),
                percentile: v.percentile_iterated_to(),
                count_at_value: v.count_at_value().as_u64(),
                cumulative_count: cumulative,
            }
        })
    }

    /// The step most recently advanced to, or `None` before the first `advance` and
    /// after exhaustion.
    pub fn current(&self) -> Option<PercentileStep> {
        self.current
    }
}

/// A cursor over recorded values; see [`Histogram::recorded_cursor`].
pub struct RecordedCursor<'a, C: Counter> {
    iter: HistogramIterator<'a, C, iterators::recorded::Iter>,
    cumulative: u64,
    current: Option<RecordedStep>,
}

impl<'a, C: Counter> RecordedCursor<'a, C> {
    pub(crate) fn new(hist: &'a Histogram<C>) -> RecordedCursor<'a, C> {
        RecordedCursor {
            iter: hist.iter_recorded(),
            cumulative: 0,
            current: None,
        }
    }

    /// Move to the next step. Returns false, and clears `current`, once the
    /// iteration is exhausted; further calls keep returning false.
    pub fn advance(&mut self) -> bool {
        cursor_advance!(self, |v: &iterators::IterationValue<C>, cumulative| {
            RecordedStep {
                value: v.value_iterated_to(),
                count_at_value: v.count_at_value().as_u64(),
                cumulative_count: cumulative,
            }
        })
    }

    /// The step most recently advanced to, or `None` before the first `advance` and
    /// after exhaustion.
    pub fn current(&self) -> Option<RecordedStep> {
        self.current
    }
}

/// A cursor over every slot; see [`Histogram::all_cursor`].
pub struct AllCursor<'a, C: Counter> {
    iter: HistogramIterator<'a, C, iterators::all::Iter>,
    cumulative: u64,
    current: Option<AllStep>,
}

impl<'a, C: Counter> AllCursor<'a, C> {
    pub(crate) fn new(hist: &'a Histogram<C>) -> AllCursor<'a, C> {
        AllCursor {
            iter: hist.iter_all(),
            cumulative: 0,
            current: None,
        }
    }

    /// Move to the next step. Returns false, and clears `current`, once the
    /// iteration is exhausted; further calls keep returning false.
    pub fn advance(&mut self) -> bool {
        cursor_advance!(self, |v: &iterators::IterationValue<C>, cumulative| {
            AllStep {
                value: v.value_iterated_to(),
                count_at_value: v.count_at_value().as_u64(),
                cumulative_count: cumulative,
            }
        })
    }

    /// The step most recently advanced to, or `None` before the first `advance` and
    /// after exhaustion.
    pub fn current(&self) -> Option<AllStep> {
        self.current
    }
}

/// A cursor over fixed-width value ranges; see [`Histogram::linear_cursor`].
pub struct LinearCursor<'a, C: Counter> {
    iter: HistogramIterator<'a, C, iterators::linear::Iter<'a, C>>,
    cumulative: u64,
    current: Option<LinearStep>,
}

impl<'a, C: Counter> LinearCursor<'a, C> {
    pub(crate) fn new(hist: &'a Histogram<C>, value_units_per_bucket: u64) -> LinearCursor<'a, C> {
        LinearCursor {
            iter: hist.iter_linear(value_units_per_bucket),
            cumulative: 0,
            current: None,
        }
    }

    /// Move to the next step. Returns false, and clears `current`, once the
    /// iteration is exhausted; further calls keep returning false.
    pub fn advance(&mut self) -> bool {
        cursor_advance!(self, |v: &iterators::IterationValue<C>, cumulative| {
            LinearStep {
                range_end: v.value_iterated_to(),
                count_in_range: v.count_since_last_iteration(),
                cumulative_count: cumulative,
            }
        })
    }

    /// The step most recently advanced to, or `None` before the first `advance` and
    /// after exhaustion.
    pub fn current(&self) -> Option<LinearStep> {
        self.current
    }
}

/// A cursor over geometrically growing value ranges; see [`Histogram::log_cursor`].
pub struct LogCursor<'a, C: Counter> {
    iter: HistogramIterator<'a, C, iterators::log::Iter<'a, C>>,
    cumulative: u64,
    current: Option<LogStep>,
}

impl<'a, C: Counter> LogCursor<'a, C> {
    pub(crate) fn new(
        hist: &'a Histogram<C>,
        value_units_in_first_bucket: u64,
        log_base: f64,
    ) -> LogCursor<'a, C> {
        LogCursor {
            iter: hist.iter_log(value_units_in_first_bucket, log_base),
            cumulative: 0,
            current: None,
        }
    }

    /// Move to the next step. Returns false, and clears `current`, once the
    /// iteration is exhausted; further calls keep returning false.
    pub fn advance(&mut self) -> bool {
        cursor_advance!(self, |v: &iterators::IterationValue<C>, cumulative| {
            LogStep {
                range_end: v.value_iterated_to(),
                count_in_range: v.count_since_last_iteration(),
                cumulative_count: cumulative,
            }
        })
    }

    /// The step most recently advanced to, or `None` before the first `advance` and
    /// after exhaustion.
    pub fn current(&self) -> Option<LogStep> {
        self.current
    }
}
