use crate::core::counter::Counter;
use crate::iterators::{HistogramIterator, PickMetadata, PickyIterator};
use crate::Histogram;

/// An iterator that will yield at geometrically growing steps through the histogram's
/// value range.
pub struct Iter<'a, T: 'a + Counter> {
    hist: &'a Histogram<T>,

    // End of the range after the current one, kept in floating point so that
    // repeated multiplication by the base does not accumulate truncation error.
    next_range_end: f64,
    base: f64,

    // Current range, tracked the same way the linear iterator tracks its step.
    range_end: u64,
    range_start: u64,
}

impl<'a, T: 'a + Counter> Iter<'a, T> {
    /// Construct a new logarithmic iterator. See `Histogram::iter_log` for details.
    pub fn new(
        hist: &'a Histogram<T>,
        value_units_in_first_bucket: u64,
        log_base: f64,
    ) -> HistogramIterator<'a, T, Iter<'a, T>> {
        assert!(
            value_units_in_first_bucket > 0,
            "value_units_in_first_bucket must be > 0"
        );
        assert!(log_base > 1.0, "log_base must be > 1.0");

        HistogramIterator::new(
            hist,
            Iter {
                hist,
                base: log_base,
                next_range_end: value_units_in_first_bucket as f64,
                range_end: value_units_in_first_bucket - 1,
                range_start: hist.lowest_equivalent(value_units_in_first_bucket - 1),
            },
        )
    }
}

impl<'a, T: 'a + Counter> PickyIterator<T> for Iter<'a, T> {
    fn pick(&mut self, index: usize, _: u64, _: T) -> Option<PickMetadata> {
        let val = self.hist.value_for(index);
        if val < self.range_start && index != self.hist.last_index() {
            return None;
        }

        let metadata = PickMetadata::new(None, Some(self.range_end));
        // strictly growing, since base > 1.0 and the starting level is >= 1
        self.next_range_end *= self.base;
        self.range_end = self.next_range_end as u64 - 1;
        self.range_start = self.hist.lowest_equivalent(self.range_end);
        Some(metadata)
    }

    fn more(&mut self, index_to_pick: usize) -> bool {
        // The slot holding the last recorded count may span several ranges; keep
        // stepping until the following range starts beyond that slot, not merely
        // once it reaches it.
        self.hist.lowest_equivalent(self.next_range_end as u64)
            < self.hist.value_for(index_to_pick)
    }
}
