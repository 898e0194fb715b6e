//! Iterators over histogram slots: the shared driver plus the per-flavor pickers.

use crate::core::counter::Counter;
use crate::Histogram;

pub mod all;
pub mod linear;
pub mod log;
pub mod quantile;
pub mod recorded;

/// A trait for designing a subset iterator over values in a `Histogram`.
pub trait PickyIterator<T: Counter> {
    /// Return `Some` if an `IterationValue` should be emitted at this point.
    ///
    /// `index` is a valid index in the relevant histogram.
    ///
    /// This will be called with the same index until it returns `None`; a picker that
    /// emits several steps inside one slot does so by picking repeatedly.
    fn pick(&mut self, index: usize, total_count_to_index: u64, count_at_index: T)
        -> Option<PickMetadata>;

    /// Once the last non-zero count has been picked, should iteration keep going?
    ///
    /// Used by pickers that have close-out steps to emit: the exact 100% quantile
    /// tick, or the trailing (empty) ranges of a linear iteration.
    fn more(&mut self, index_to_pick: usize) -> bool;
}

/// Extra information about the picked point in the histogram provided by the picker.
pub struct PickMetadata {
    /// The quantile iterated to in the last `pick()`, if the picker has a more
    /// precise notion than the quantile of the current value (only the quantile
    /// picker does).
    quantile_iterated_to: Option<f64>,
    /// The value iterated to in the last `pick()`, if the picker has a more useful
    /// value than the highest value represented by the slot (the range-based pickers
    /// supply their range end).
    value_iterated_to: Option<u64>,
}

impl PickMetadata {
    fn new(quantile_iterated_to: Option<f64>, value_iterated_to: Option<u64>) -> PickMetadata {
        PickMetadata {
            quantile_iterated_to,
            value_iterated_to,
        }
    }
}

/// The value emitted at each step of iteration.
#[derive(Debug, PartialEq, Clone, Copy)]
pub struct IterationValue<T: Counter> {
    value_iterated_to: u64,
    quantile: f64,
    quantile_iterated_to: f64,
    count_at_value: T,
    count_since_last_iteration: u64,
}

impl<T: Counter> IterationValue<T> {
    /// Construct an `IterationValue`; mostly useful for writing assertions in tests.
    pub fn new(
        value_iterated_to: u64,
        quantile: f64,
        quantile_iterated_to: f64,
        count_at_value: T,
        count_since_last_iteration: u64,
    ) -> IterationValue<T> {
        IterationValue {
            value_iterated_to,
            quantile,
            quantile_iterated_to,
            count_at_value,
            count_since_last_iteration,
        }
    }

    /// The value iterated to: the highest value equivalent to the current slot's
    /// value, or the picker's own step value (range end, for linear/log iteration).
    pub fn value_iterated_to(&self) -> u64 {
        self.value_iterated_to
    }

    /// Percent of recorded values that are at or below the current slot. This is the
    /// quantile of the current value, not of the (possibly finer) iteration step.
    pub fn percentile(&self) -> f64 {
        self.quantile * 100.0
    }

    /// Quantile of recorded values that are at or below the current slot.
    pub fn quantile(&self) -> f64 {
        self.quantile
    }

    /// Quantile iterated to: the picker's target quantile for this step, which may be
    /// smaller than `quantile()` when a slot straddles several ticks.
    pub fn quantile_iterated_to(&self) -> f64 {
        self.quantile_iterated_to
    }

    /// Percentile iterated to; `quantile_iterated_to() * 100`.
    pub fn percentile_iterated_to(&self) -> f64 {
        self.quantile_iterated_to * 100.0
    }

    /// Recorded count at the current slot.
    pub fn count_at_value(&self) -> T {
        self.count_at_value
    }

    /// Number of samples accumulated since the previously emitted step.
    pub fn count_since_last_iteration(&self) -> u64 {
        self.count_since_last_iteration
    }
}

/// The shared iteration driver: walks the counts array in index order, maintaining
/// the running total, and emits a step whenever the picker says so.
pub struct HistogramIterator<'a, T: 'a + Counter, P: PickyIterator<T>> {
    hist: &'a Histogram<T>,
    total_count_to_index: u64,
    prev_total_count: u64,
    current_index: usize,
    fresh: bool,
    ended: bool,
    picker: P,
}

impl<'a, T: 'a + Counter, P: PickyIterator<T>> HistogramIterator<'a, T, P> {
    fn new(hist: &'a Histogram<T>, picker: P) -> HistogramIterator<'a, T, P> {
        HistogramIterator {
            hist,
            total_count_to_index: 0,
            prev_total_count: 0,
            current_index: 0,
            picker,
            fresh: true,
            ended: false,
        }
    }

    fn current(&self, metadata: PickMetadata) -> IterationValue<T> {
        let value_iterated_to = metadata.value_iterated_to.unwrap_or_else(|| {
            self.hist
                .highest_equivalent(self.hist.value_for(self.current_index))
        });
        let count_at_value = self
            .hist
            .count_at_index(self.current_index)
            .expect("current index must be in range");
        let quantile = self.total_count_to_index as f64 / self.hist.len() as f64;

        IterationValue {
            value_iterated_to,
            quantile,
            quantile_iterated_to: metadata.quantile_iterated_to.unwrap_or(quantile),
            count_at_value,
            count_since_last_iteration: self.total_count_to_index - self.prev_total_count,
        }
    }
}

impl<'a, T: 'a + Counter, P: PickyIterator<T>> Iterator for HistogramIterator<'a, T, P> {
    type Item = IterationValue<T>;

    fn next(&mut self) -> Option<Self::Item> {
        // We walk every index in the counts array, but most of them (especially
        // towards the end) hold zeros that nothing wants emitted. So: iterate indices
        // until the running total reaches the recorded total, then keep going only as
        // long as the picker's more() asks for close-out steps.

        // An empty histogram is exhausted from the start, for every flavor.
        if self.hist.is_empty() {
            self.ended = true;
        }

        while !self.ended {
            if self.current_index == self.hist.distinct_values() {
                self.ended = true;
                return None;
            }

            let total = self.hist.len();
            if self.prev_total_count == total {
                // all non-zero counts have been emitted; keep going only for the
                // picker's close-out steps
                if !self.picker.more(self.current_index) {
                    self.ended = true;
                    return None;
                }
            } else {
                debug_assert!(self.prev_total_count < total);

                if self.fresh {
                    let count = self
                        .hist
                        .count_at_index(self.current_index)
                        .expect("current index must be in range")
                        .as_u64();
                    self.total_count_to_index = self.total_count_to_index.saturating_add(count);
                    // don't add this index again
                    self.fresh = false;
                }
            }

            let count_at_index = self
                .hist
                .count_at_index(self.current_index)
                .expect("current index must be in range");
            if let Some(metadata) =
                self.picker
                    .pick(self.current_index, self.total_count_to_index, count_at_index)
            {
                let val = self.current(metadata);

                // The index is deliberately not advanced here: the picker sees the
                // same index again on the next call, and may emit several steps from
                // within a single slot (quantile ticks, sub-slot linear ranges).
                self.prev_total_count = self.total_count_to_index;
                return Some(val);
            }

            // check the next entry
            self.current_index += 1;
            self.fresh = true;
        }
        None
    }
}
