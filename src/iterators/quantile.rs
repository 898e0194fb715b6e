use crate::core::counter::Counter;
use crate::iterators::{HistogramIterator, PickMetadata, PickyIterator};
use crate::Histogram;

/// An iterator that will yield at quantile steps through the histogram's value range.
pub struct Iter<'a, T: 'a + Counter> {
    hist: &'a Histogram<T>,

    ticks_per_half_distance: u32,
    quantile_to_iterate_to: f64,
    reached_last_recorded_value: bool,
}

impl<'a, T: 'a + Counter> Iter<'a, T> {
    /// Construct a new quantile iterator. See `Histogram::iter_quantiles` for details.
    pub fn new(
        hist: &'a Histogram<T>,
        ticks_per_half_distance: u32,
    ) -> HistogramIterator<'a, T, Iter<'a, T>> {
        assert!(
            ticks_per_half_distance > 0,
            "ticks per half distance must be > 0"
        );

        HistogramIterator::new(
            hist,
            Iter {
                hist,
                ticks_per_half_distance,
                quantile_to_iterate_to: 0.0,
                reached_last_recorded_value: false,
            },
        )
    }
}

impl<'a, T: 'a + Counter> PickyIterator<T> for Iter<'a, T> {
    fn pick(&mut self, _: usize, running_total: u64, count_at_index: T) -> Option<PickMetadata> {
        if count_at_index == T::zero() {
            return None;
        }

        // This calculation, combined with the `quantile * count` in `value_at_quantile`,
        // tends to produce a count_at_quantile that is 1 ulp off. That's just the way
        // IEEE754 works.
        let current_quantile = running_total as f64 / self.hist.len() as f64;
        if current_quantile < self.quantile_to_iterate_to {
            return None;
        }

        let metadata = PickMetadata::new(Some(self.quantile_to_iterate_to), None);

        // The "tick" size is fixed within each half-distance to 100% (starting from 0%)
        // and halves every time the remaining distance does, so the emitted quantile
        // steps stay easy to browse in a distribution output: equal steps within a
        // scale, a finer scale for every halving towards 100%.
        //
        // Number of times the distance to 100% has been halved: 1 at 50%, 2 at 75%,
        // 3 at 87.5%, etc. Minimum of 0 (1.0/1.0 = 1, log2 of which is 0), so the
        // unsigned cast is safe.
        let num_halvings = (1.0 / (1.0 - self.quantile_to_iterate_to)).log2() as u32;
        // Each of the 2^num_halvings slices has two half-distances to tick, hence the
        // extra power of two. u64 math so that large tick counts with data needing
        // many halvings don't overflow.
        let total_ticks = u64::from(self.ticks_per_half_distance)
            .checked_mul(1_u64.checked_shl(num_halvings + 1).expect("too many halvings"))
            .expect("too many total ticks");
        self.quantile_to_iterate_to += 1.0 / total_ticks as f64;
        Some(metadata)
    }

    fn more(&mut self, _: usize) -> bool {
        // one additional step to exactly 100%
        if !self.reached_last_recorded_value && self.hist.len() > 0 {
            self.quantile_to_iterate_to = 1.0;
            self.reached_last_recorded_value = true;
            true
        } else {
            false
        }
    }
}
