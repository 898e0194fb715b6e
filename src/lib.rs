//! hdrange is a high dynamic range histogram: it records integer samples (latencies,
//! sizes, anything non-negative) across a configurable value range while guaranteeing a
//! configurable number of significant decimal digits of precision at every scale in
//! that range. Memory use is fixed at construction time and recording a sample is a
//! constant-time index computation, which makes the histogram suitable for hot paths
//! in latency-sensitive services.
//!
//! # Layout
//!
//! Values are bucketed into power-of-two *buckets*, each split into a fixed number of
//! equal-width *sub-buckets*. Each successive bucket doubles its sub-bucket width, so
//! absolute resolution degrades as values grow while relative resolution stays within
//! `1 / (2 * 10^sigfig)`. A value maps to a slot in a single contiguous counts array
//! with a couple of shifts and masks; no per-slot allocation ever happens.
//!
//! # Recording and querying
//!
//! A histogram is created with [`Histogram::new_with_bounds`] (or `new` /
//! `new_with_max` for the common cases) and fed with [`Histogram::record`]:
//!
//! ```
//! use hdrange::Histogram;
//!
//! let mut hist = Histogram::<u64>::new_with_bounds(1, 60 * 60 * 1000, 2).unwrap();
//! hist.record(54_321).expect("value in range");
//! hist += 54_321; // operator sugar; panics on error
//!
//! assert_eq!(hist.len(), 2);
//! println!("p99.9 = {}", hist.value_at_percentile(99.9));
//! ```
//!
//! The counter type parameter (`u64` above) sets the per-slot counter width; `u8`,
//! `u16` and `u32` trade overflow headroom for memory.
//!
//! If the recording site is subject to coordinated omission (a stall suppresses the
//! samples that would have been taken during it), [`Histogram::record_correct`]
//! back-fills the gap with synthetic samples one expected interval apart.
//!
//! Distribution queries are answered by the iterator family ([`Histogram::iter_all`],
//! [`Histogram::iter_recorded`], [`Histogram::iter_quantiles`],
//! [`Histogram::iter_linear`], [`Histogram::iter_log`]) or, for host runtimes that
//! pull one step at a time across a call boundary, by the [`cursor`] module.
//!
//! # Errors
//!
//! Every fallible operation returns a per-operation error enum from [`errors`] and
//! leaves the histogram exactly as it was: a failed record or merge mutates nothing.
//! Out-of-range values are recoverable (enable auto-resize with [`Histogram::auto`]
//! or drop the sample); counter overflow is fatal for that operation only.

use std::borrow::Borrow;
use std::cmp;
use std::ops::{AddAssign, SubAssign};

use serde::{Deserialize, Serialize};

mod core;
pub mod cursor;
pub mod errors;
pub mod iterators;
#[cfg(feature = "sync")]
pub mod sync;

pub use crate::core::counter::Counter;
pub use crate::errors::{AdditionError, CreationError, RecordError, SubtractionError};

use crate::errors::UsizeTypeTooSmall;

/// A histogram of `u64` samples with per-slot counters of type `C`.
///
/// See the [crate docs](index.html) for an overview.
#[derive(Debug, Serialize)]
pub struct Histogram<C: Counter> {
    auto_resize: bool,

    // Configuration, immutable after creation (except `highest_trackable_value`,
    // which grows on auto-resize).
    lowest_discernible_value: u64,
    highest_trackable_value: u64,
    significant_value_digits: u8,

    // Derived geometry; invariant for a given configuration.
    bucket_count: u8,
    sub_bucket_count: u32,
    sub_bucket_half_count: u32,
    sub_bucket_half_count_magnitude: u8,
    sub_bucket_mask: u64,
    unit_magnitude: u8,
    unit_magnitude_mask: u64,
    leading_zero_count_base: u8,

    // Running totals. `max_value` and `min_non_zero_value` are stored
    // unit-magnitude-masked; use `max()` / `min_nz()` for external values.
    max_value: u64,
    min_non_zero_value: u64,
    total_count: u64,

    counts: Vec<C>,
}

// Construction.

impl<C: Counter> Histogram<C> {
    /// Construct an auto-resizing histogram with a lowest discernible value of 1 and
    /// an auto-adjusting highest trackable value.
    ///
    /// `sigfig` is the number of significant decimal digits of precision, in `[1, 5]`.
    pub fn new(sigfig: u8) -> Result<Histogram<C>, CreationError> {
        let mut h = Self::new_with_bounds(1, 2, sigfig)?;
        h.auto_resize = true;
        Ok(h)
    }

    /// Construct a histogram covering `[1, high]` with `sigfig` significant decimal
    /// digits. Auto-resize is disabled, so recording never reallocates.
    pub fn new_with_max(high: u64, sigfig: u8) -> Result<Histogram<C>, CreationError> {
        Self::new_with_bounds(1, high, sigfig)
    }

    /// Construct a histogram covering `[low, high]` with `sigfig` significant decimal
    /// digits.
    ///
    /// `low` is the lowest value that can be discerned from 0 and must be at least 1;
    /// raising it shrinks the counts array when the units recorded are much finer
    /// than the precision needed (e.g. nanosecond samples with microsecond accuracy,
    /// `low = 1000`). `high` must be at least `2 * low`.
    pub fn new_with_bounds(low: u64, high: u64, sigfig: u8) -> Result<Histogram<C>, CreationError> {
        if low < 1 {
            return Err(CreationError::LowIsZero);
        }
        if low > u64::max_value() / 2 {
            // high must be at least 2 * low; that would not fit in u64
            return Err(CreationError::LowExceedsMax);
        }
        if high < 2 * low {
            return Err(CreationError::HighLessThanTwiceLow);
        }
        if sigfig < 1 || sigfig > 5 {
            return Err(CreationError::SigFigOutOfRange);
        }

        // Given 3 decimal digits of accuracy, "+/- 1 unit at 1000" is expected, and
        // "+/- 2 units at 2000", but NOT +/- 2 units at 1999. Single-unit resolution
        // must therefore hold up to 2 * 10^sigfig.
        let largest_value_with_single_unit_resolution = 2 * 10_u64.pow(u32::from(sigfig));

        // Bits below the lowest discernible value carry no information and are
        // absorbed before sub-bucketing begins.
        let unit_magnitude = (63 - low.leading_zeros()) as u8;
        let unit_magnitude_mask = (1_u64 << unit_magnitude) - 1;

        // The sub-bucket count must be a power of two (for shift/mask indexing) at
        // least as large as largest_value_with_single_unit_resolution.
        let sub_bucket_count_magnitude =
            (64 - (largest_value_with_single_unit_resolution - 1).leading_zeros()) as u8;
        if unit_magnitude + sub_bucket_count_magnitude > 63 {
            // the highest sub-bucket's lowest value would not fit in a u64
            return Err(CreationError::CannotRepresentSigFigBeyondLow);
        }

        let sub_bucket_half_count_magnitude = sub_bucket_count_magnitude - 1;
        let sub_bucket_count = 1_u32 << sub_bucket_count_magnitude;
        let sub_bucket_half_count = sub_bucket_count / 2;
        let sub_bucket_mask = (u64::from(sub_bucket_count) - 1) << unit_magnitude;

        let mut h = Histogram {
            auto_resize: false,

            lowest_discernible_value: low,
            highest_trackable_value: high,
            significant_value_digits: sigfig,

            bucket_count: 0, // set by cover() below
            sub_bucket_count,
            sub_bucket_half_count,
            sub_bucket_half_count_magnitude,
            sub_bucket_mask,
            unit_magnitude,
            unit_magnitude_mask,
            // Subtract the bits used by the largest value in bucket 0.
            leading_zero_count_base: 64 - unit_magnitude - sub_bucket_count_magnitude,

            max_value: 0,
            min_non_zero_value: u64::max_value(),
            total_count: 0,
            counts: Vec::new(), // allocated below
        };

        let len = h.cover(high).map_err(|_| CreationError::UsizeTypeTooSmall)?;
        h.counts = vec![C::zero(); len];
        h.reset_max(0);
        h.reset_min(u64::max_value());
        Ok(h)
    }

    /// Construct a histogram with the same range and precision as `source`, but none
    /// of its contents. The counter type may differ.
    pub fn new_from<F: Counter>(source: &Histogram<F>) -> Histogram<C> {
        let mut h = Self::new_with_bounds(
            source.lowest_discernible_value,
            source.highest_trackable_value,
            source.significant_value_digits,
        )
        .expect("source histogram's configuration is valid by construction");

        h.auto_resize = source.auto_resize;
        h.counts.resize(source.counts.len(), C::zero());
        h
    }

    /// Establish `bucket_count` and `highest_trackable_value` for the given highest
    /// value, returning the counts array length that covers it.
    fn cover(&mut self, high: u64) -> Result<usize, UsizeTypeTooSmall> {
        let buckets = self.buckets_to_cover(high);
        let len = self.counts_len_for(buckets)?;
        self.bucket_count = buckets;
        self.highest_trackable_value = high;
        Ok(len)
    }

    /// Number of buckets needed so that the representable maximum reaches `value`.
    fn buckets_to_cover(&self, value: u64) -> u8 {
        // Bucket k spans [0, sub_bucket_count * 2^k) in units of 2^k.
        let mut smallest_untrackable = u64::from(self.sub_bucket_count) << self.unit_magnitude;
        let mut buckets = 1_u8;
        while smallest_untrackable <= value {
            if smallest_untrackable > u64::max_value() / 2 {
                // one more bucket covers values past u64::max_value()
                return buckets + 1;
            }
            smallest_untrackable <<= 1;
            buckets += 1;
        }
        buckets
    }

    /// Counts length for a bucket count: the full bucket 0 plus the upper half of
    /// each further bucket (their lower halves alias the preceding buckets).
    fn counts_len_for(&self, buckets: u8) -> Result<usize, UsizeTypeTooSmall> {
        (usize::from(buckets) + 1)
            .checked_mul(self.sub_bucket_half_count as usize)
            .ok_or(UsizeTypeTooSmall)
    }

    /// Grow the counts array in place to cover `high`. Existing slots keep their
    /// indices: expansion only ever appends higher buckets.
    fn resize(&mut self, high: u64) -> Result<(), UsizeTypeTooSmall> {
        let len = self.cover(high)?;
        self.counts.resize(len, C::zero());
        Ok(())
    }

    /// Resize for an out-of-range `value` and pin `highest_trackable_value` to the
    /// top of the (coarser) new top bucket.
    fn expand_to(&mut self, value: u64) -> Result<(), UsizeTypeTooSmall> {
        self.resize(value)?;
        self.highest_trackable_value = self.highest_equivalent(self.value_for(self.last_index()));
        Ok(())
    }

    /// Control whether out-of-range recorded values grow the histogram instead of
    /// failing with [`RecordError::ValueOutOfRange`].
    pub fn auto(&mut self, enabled: bool) {
        self.auto_resize = enabled;
    }
}

// Configuration accessors.

impl<C: Counter> Histogram<C> {
    /// Lowest discernible value.
    pub fn low(&self) -> u64 {
        self.lowest_discernible_value
    }

    /// Highest trackable value.
    pub fn high(&self) -> u64 {
        self.highest_trackable_value
    }

    /// Significant decimal digits of precision.
    pub fn sigfig(&self) -> u8 {
        self.significant_value_digits
    }

    /// Whether auto-resize is enabled.
    pub fn is_auto_resize(&self) -> bool {
        self.auto_resize
    }

    /// Total number of samples recorded.
    pub fn len(&self) -> u64 {
        self.total_count
    }

    /// True if no samples have been recorded.
    pub fn is_empty(&self) -> bool {
        self.total_count == 0
    }

    /// Number of distinct representable slots.
    pub fn distinct_values(&self) -> usize {
        self.counts.len()
    }

    /// Number of buckets.
    pub fn buckets(&self) -> u8 {
        self.bucket_count
    }
}

// Value <-> index encoding.

impl<C: Counter> Histogram<C> {
    /// Index of the finest-resolution bucket that can represent `value`.
    fn bucket_for(&self, value: u64) -> u8 {
        // Number of powers of two by which the value exceeds the largest value that
        // fits in bucket 0. The mask maps values within bucket 0's range to bucket 0.
        self.leading_zero_count_base - (value | self.sub_bucket_mask).leading_zeros() as u8
    }

    /// Sub-bucket of `value` within `bucket_index`. For bucket 0 this may fall
    /// anywhere in `[0, sub_bucket_count)`; for any other bucket it lands in the
    /// upper half, since a lower-half result was representable at finer resolution
    /// by an earlier bucket and `bucket_for` would have returned that one.
    fn sub_bucket_for(&self, value: u64, bucket_index: u8) -> u32 {
        (value >> (bucket_index + self.unit_magnitude)) as u32
    }

    fn index_of(&self, bucket_index: u8, sub_bucket_index: u32) -> usize {
        debug_assert!(sub_bucket_index < self.sub_bucket_count);
        debug_assert!(bucket_index == 0 || sub_bucket_index >= self.sub_bucket_half_count);

        // Bucket 0 owns [0, sub_bucket_count); every further bucket appends its upper
        // sub_bucket_half_count slots. The base index points at the middle of the
        // bucket; the offset is negative only within bucket 0.
        let bucket_base = (usize::from(bucket_index) + 1) << self.sub_bucket_half_count_magnitude;
        let offset = sub_bucket_index as isize - self.sub_bucket_half_count as isize;
        (bucket_base as isize + offset) as usize
    }

    /// Counts slot for `value`. Pure index arithmetic: may point past the allocated
    /// array for out-of-range values.
    fn index_for(&self, value: u64) -> usize {
        let bucket_index = self.bucket_for(value);
        let sub_bucket_index = self.sub_bucket_for(value, bucket_index);
        self.index_of(bucket_index, sub_bucket_index)
    }

    /// Counts slot for `value`, or `None` if the value is beyond the currently
    /// covered range.
    fn index_for_checked(&self, value: u64) -> Option<usize> {
        let index = self.index_for(value);
        if index < self.counts.len() {
            Some(index)
        } else {
            None
        }
    }

    /// Lowest value that maps to the slot at `index`.
    pub fn value_for(&self, index: usize) -> u64 {
        let mut bucket_index = (index >> self.sub_bucket_half_count_magnitude) as isize - 1;
        let mut sub_bucket_index = (index & (self.sub_bucket_half_count as usize - 1))
            + self.sub_bucket_half_count as usize;
        if bucket_index < 0 {
            // lower half of bucket 0
            sub_bucket_index -= self.sub_bucket_half_count as usize;
            bucket_index = 0;
        }
        self.value_from_loc(bucket_index as u8, sub_bucket_index as u32)
    }

    #[inline]
    fn value_from_loc(&self, bucket_index: u8, sub_bucket_index: u32) -> u64 {
        u64::from(sub_bucket_index) << (bucket_index + self.unit_magnitude)
    }

    fn last_index(&self) -> usize {
        self.counts.len() - 1
    }

    pub(crate) fn count_at_index(&self, index: usize) -> Option<C> {
        self.counts.get(index).copied()
    }

    /// Lowest value that encodes to the same slot as `value`.
    pub fn lowest_equivalent(&self, value: u64) -> u64 {
        let bucket_index = self.bucket_for(value);
        let sub_bucket_index = self.sub_bucket_for(value, bucket_index);
        self.value_from_loc(bucket_index, sub_bucket_index)
    }

    /// Highest value that encodes to the same slot as `value`.
    pub fn highest_equivalent(&self, value: u64) -> u64 {
        if value == u64::max_value() {
            u64::max_value()
        } else {
            self.next_non_equivalent(value) - 1
        }
    }

    /// A value in the middle (rounded up) of the slot `value` encodes to.
    pub fn median_equivalent(&self, value: u64) -> u64 {
        self.lowest_equivalent(value)
            .saturating_add(self.equivalent_range(value) >> 1)
    }

    /// Smallest value larger than `value` that encodes to a different slot.
    pub fn next_non_equivalent(&self, value: u64) -> u64 {
        self.lowest_equivalent(value)
            .saturating_add(self.equivalent_range(value))
    }

    /// Width, in value units, of the slot `value` encodes to.
    pub fn equivalent_range(&self, value: u64) -> u64 {
        1_u64 << (self.unit_magnitude + self.bucket_for(value))
    }

    /// True if `v1` and `v2` encode to the same slot.
    pub fn equivalent(&self, v1: u64, v2: u64) -> bool {
        self.lowest_equivalent(v1) == self.lowest_equivalent(v2)
    }
}

// Recording.

impl<C: Counter> Histogram<C> {
    /// Record a single sample.
    ///
    /// Fails with [`RecordError::ValueOutOfRange`] if `value` exceeds the covered
    /// range and auto-resize is disabled, or [`RecordError::CountOverflow`] if the
    /// slot counter or the total count would overflow. On error nothing is recorded,
    /// though an auto-resize triggered by an out-of-range value is kept even when a
    /// later check fails: the grown range is configuration, and affects no counts.
    pub fn record(&mut self, value: u64) -> Result<(), RecordError> {
        self.record_n(value, C::one())
    }

    /// Record `count` occurrences of `value`. Same failure modes as [`record`].
    ///
    /// [`record`]: Histogram::record
    pub fn record_n(&mut self, value: u64, count: C) -> Result<(), RecordError> {
        let index = match self.index_for_checked(value) {
            Some(i) => i,
            None => {
                if !self.auto_resize {
                    return Err(RecordError::ValueOutOfRange);
                }
                self.expand_to(value)
                    .map_err(|_| RecordError::ResizeFailedUsizeTypeTooSmall)?;
                self.index_for_checked(value)
                    .ok_or(RecordError::ValueOutOfRange)?
            }
        };

        // Validate both additions before applying either, so a failed record leaves
        // the counts untouched.
        let new_count = self.counts[index]
            .checked_add(&count)
            .ok_or(RecordError::CountOverflow)?;
        let new_total = self
            .total_count
            .checked_add(count.as_u64())
            .ok_or(RecordError::CountOverflow)?;

        self.counts[index] = new_count;
        self.total_count = new_total;
        self.update_min_max(value);
        Ok(())
    }

    /// Record a sample, clamping out-of-range values to the top slot and saturating
    /// counters instead of failing. With auto-resize enabled the histogram still
    /// grows to fit; clamping only happens if the resize itself cannot.
    pub fn saturating_record(&mut self, value: u64) {
        self.saturating_record_n(value, C::one())
    }

    /// Record `count` occurrences of `value`, clamping and saturating as
    /// [`saturating_record`] does.
    ///
    /// [`saturating_record`]: Histogram::saturating_record
    pub fn saturating_record_n(&mut self, value: u64, count: C) {
        if self.index_for_checked(value).is_none() && self.auto_resize {
            // on resize failure fall through to clamping
            let _ = self.expand_to(value);
        }

        let (index, effective_value) = match self.index_for_checked(value) {
            Some(i) => (i, value),
            None => {
                let top = self.last_index();
                (top, self.value_for(top))
            }
        };

        self.counts[index] = self.counts[index].saturating_add(count);
        self.total_count = self.total_count.saturating_add(count.as_u64());
        self.update_min_max(effective_value);
    }

    /// Record a sample, compensating for coordinated omission.
    ///
    /// When `value` exceeds `interval` (the expected interval between samples), the
    /// stall it represents suppressed samples that would otherwise have been taken;
    /// this records synthetic samples at `value - interval`, `value - 2 * interval`,
    /// ... down to, but excluding, the sample one interval above the previously
    /// recorded one. An `interval` of 0 disables correction.
    ///
    /// The real sample and all synthetic ones are staged together and recorded all
    /// or nothing; on error the histogram is left untouched.
    pub fn record_correct(&mut self, value: u64, interval: u64) -> Result<(), RecordError> {
        self.record_n_correct(value, C::one(), interval)
    }

    /// Record `count` occurrences of `value`, compensating for coordinated omission
    /// as [`record_correct`] does.
    ///
    /// [`record_correct`]: Histogram::record_correct
    pub fn record_n_correct(
        &mut self,
        value: u64,
        count: C,
        interval: u64,
    ) -> Result<(), RecordError> {
        if interval == 0 {
            return self.record_n(value, count);
        }

        if self.index_for_checked(value).is_none() {
            if !self.auto_resize {
                return Err(RecordError::ValueOutOfRange);
            }
            self.expand_to(value)
                .map_err(|_| RecordError::ResizeFailedUsizeTypeTooSmall)?;
        }

        let mut deltas = vec![C::zero(); self.counts.len()];
        let mut delta_total = 0_u64;
        let lowest = self.stage_corrected(&mut deltas, &mut delta_total, value, count, interval)?;
        self.apply_staged(deltas, delta_total)?;

        self.update_min_max(value);
        self.update_min_max(lowest);
        Ok(())
    }

    /// Stage `count` at `value` into `deltas`, failing if the value is out of range
    /// or the staged counter would overflow.
    fn stage_at(
        &self,
        deltas: &mut [C],
        delta_total: &mut u64,
        value: u64,
        count: C,
    ) -> Result<(), RecordError> {
        let index = self
            .index_for_checked(value)
            .ok_or(RecordError::ValueOutOfRange)?;
        deltas[index] = deltas[index]
            .checked_add(&count)
            .ok_or(RecordError::CountOverflow)?;
        *delta_total = delta_total
            .checked_add(count.as_u64())
            .ok_or(RecordError::CountOverflow)?;
        Ok(())
    }

    /// Stage `count` at `value` plus the coordinated-omission fill-in below it,
    /// returning the lowest value staged.
    fn stage_corrected(
        &self,
        deltas: &mut [C],
        delta_total: &mut u64,
        value: u64,
        count: C,
        interval: u64,
    ) -> Result<u64, RecordError> {
        self.stage_at(deltas, delta_total, value, count)?;
        let mut lowest = value;
        if interval > 0 {
            let mut missing = value.saturating_sub(interval);
            while missing > interval {
                self.stage_at(deltas, delta_total, missing, count)?;
                lowest = missing;
                missing -= interval;
            }
        }
        Ok(lowest)
    }

    /// Validate staged deltas against the live counters, then apply them. Nothing is
    /// modified unless every addition fits.
    fn apply_staged(&mut self, deltas: Vec<C>, delta_total: u64) -> Result<(), RecordError> {
        for (i, d) in deltas.iter().enumerate() {
            if *d != C::zero() {
                self.counts[i]
                    .checked_add(d)
                    .ok_or(RecordError::CountOverflow)?;
            }
        }
        let new_total = self
            .total_count
            .checked_add(delta_total)
            .ok_or(RecordError::CountOverflow)?;

        for (i, d) in deltas.into_iter().enumerate() {
            if d != C::zero() {
                self.counts[i] = self.counts[i] + d;
            }
        }
        self.total_count = new_total;
        Ok(())
    }
}

// `h += value` sugar; panics where `record` would fail.
impl<C: Counter> AddAssign<u64> for Histogram<C> {
    fn add_assign(&mut self, value: u64) {
        self.record(value).unwrap();
    }
}

// Aggregation: add, subtract, reset.

impl<C: Counter> Histogram<C> {
    fn same_dimensions<F: Counter>(&self, other: &Histogram<F>) -> bool {
        self.bucket_count == other.bucket_count
            && self.sub_bucket_count == other.sub_bucket_count
            && self.unit_magnitude == other.unit_magnitude
    }

    /// Add all samples recorded in `source` into this histogram.
    ///
    /// Values are re-encoded into this histogram's geometry, so the result carries
    /// this histogram's quantization even if `source` was finer-grained. Fails with
    /// [`AdditionError::IncompatibleRange`] if `source` holds values beyond this
    /// histogram's range and auto-resize is disabled, or
    /// [`AdditionError::CountOverflow`] if any counter or the total would overflow.
    /// Either the whole merge is applied or nothing is.
    pub fn add<B: Borrow<Histogram<C>>>(&mut self, source: B) -> Result<(), AdditionError> {
        let source = source.borrow();

        let top = self.highest_equivalent(self.value_for(self.last_index()));
        if top < source.max() {
            if !self.auto_resize {
                return Err(AdditionError::IncompatibleRange);
            }
            self.expand_to(source.max())
                .map_err(|_| AdditionError::ResizeFailedUsizeTypeTooSmall)?;
        }

        if self.same_dimensions(source) {
            // Slot-aligned fast path: validate every addition, then apply.
            let mut delta_total = 0_u64;
            for (i, sc) in source.counts.iter().enumerate() {
                if *sc == C::zero() {
                    continue;
                }
                self.counts[i]
                    .checked_add(sc)
                    .ok_or(AdditionError::CountOverflow)?;
                delta_total = delta_total
                    .checked_add(sc.as_u64())
                    .ok_or(AdditionError::CountOverflow)?;
            }
            let new_total = self
                .total_count
                .checked_add(delta_total)
                .ok_or(AdditionError::CountOverflow)?;

            for (i, sc) in source.counts.iter().enumerate() {
                if *sc != C::zero() {
                    self.counts[i] = self.counts[i] + *sc;
                }
            }
            self.total_count = new_total;
        } else {
            let (deltas, delta_total) = self.reencoded_deltas(source).map_err(|e| match e {
                ReencodeError::OutOfRange => AdditionError::IncompatibleRange,
                ReencodeError::Overflow => AdditionError::CountOverflow,
            })?;

            for (i, d) in deltas.iter().enumerate() {
                if *d != C::zero() {
                    self.counts[i]
                        .checked_add(d)
                        .ok_or(AdditionError::CountOverflow)?;
                }
            }
            let new_total = self
                .total_count
                .checked_add(delta_total)
                .ok_or(AdditionError::CountOverflow)?;

            for (i, d) in deltas.into_iter().enumerate() {
                if d != C::zero() {
                    self.counts[i] = self.counts[i] + d;
                }
            }
            self.total_count = new_total;
        }

        if source.max() > self.max() {
            self.update_max(source.max());
        }
        if source.min_nz() < self.min_nz() {
            self.update_min(source.min_nz());
        }
        Ok(())
    }

    /// Add all samples from `source`, applying coordinated-omission correction with
    /// the given expected `interval` to each recorded value as it is merged.
    ///
    /// Like [`record_correct`], the whole corrected merge is staged first and applied
    /// all or nothing; on error this histogram's counts are left untouched.
    ///
    /// [`record_correct`]: Histogram::record_correct
    pub fn add_correct<B: Borrow<Histogram<C>>>(
        &mut self,
        source: B,
        interval: u64,
    ) -> Result<(), RecordError> {
        let source = source.borrow();
        if source.is_empty() {
            return Ok(());
        }

        if self.index_for_checked(source.max()).is_none() {
            if !self.auto_resize {
                return Err(RecordError::ValueOutOfRange);
            }
            self.expand_to(source.max())
                .map_err(|_| RecordError::ResizeFailedUsizeTypeTooSmall)?;
        }

        let mut deltas = vec![C::zero(); self.counts.len()];
        let mut delta_total = 0_u64;
        let mut lowest = u64::max_value();
        let mut highest = 0_u64;
        for v in source.iter_recorded() {
            let value = v.value_iterated_to();
            let staged_lowest = self.stage_corrected(
                &mut deltas,
                &mut delta_total,
                value,
                v.count_at_value(),
                interval,
            )?;
            lowest = cmp::min(lowest, staged_lowest);
            highest = cmp::max(highest, value);
        }
        self.apply_staged(deltas, delta_total)?;

        self.update_min_max(highest);
        self.update_min_max(lowest);
        Ok(())
    }

    /// Subtract `subtrahend`'s samples from this histogram: the inverse of [`add`].
    ///
    /// Fails with [`SubtractionError::IncompatibleRange`] if `subtrahend` holds
    /// values beyond this histogram's range, or [`SubtractionError::CountUnderflow`]
    /// if any slot counter would go negative. Either the whole subtraction is applied
    /// or nothing is. Min/max are recomputed if the subtraction touched them.
    ///
    /// [`add`]: Histogram::add
    pub fn subtract<B: Borrow<Histogram<C>>>(
        &mut self,
        subtrahend: B,
    ) -> Result<(), SubtractionError> {
        let other = subtrahend.borrow();

        let top = self.highest_equivalent(self.value_for(self.last_index()));
        if top < other.max() {
            return Err(SubtractionError::IncompatibleRange);
        }

        if self.same_dimensions(other) {
            let mut delta_total = 0_u64;
            for (i, sc) in other.counts.iter().enumerate() {
                if *sc == C::zero() {
                    continue;
                }
                self.counts[i]
                    .checked_sub(sc)
                    .ok_or(SubtractionError::CountUnderflow)?;
                // cannot overflow: bounded by self.total_count once validated
                delta_total += sc.as_u64();
            }
            let new_total = self
                .total_count
                .checked_sub(delta_total)
                .ok_or(SubtractionError::CountUnderflow)?;

            for (i, sc) in other.counts.iter().enumerate() {
                if *sc != C::zero() {
                    self.counts[i] = self.counts[i] - *sc;
                }
            }
            self.total_count = new_total;
        } else {
            let (deltas, delta_total) = self.reencoded_deltas(other).map_err(|e| match e {
                ReencodeError::OutOfRange => SubtractionError::IncompatibleRange,
                ReencodeError::Overflow => SubtractionError::CountUnderflow,
            })?;

            for (i, d) in deltas.iter().enumerate() {
                if *d != C::zero() {
                    self.counts[i]
                        .checked_sub(d)
                        .ok_or(SubtractionError::CountUnderflow)?;
                }
            }
            let new_total = self
                .total_count
                .checked_sub(delta_total)
                .ok_or(SubtractionError::CountUnderflow)?;

            for (i, d) in deltas.into_iter().enumerate() {
                if d != C::zero() {
                    self.counts[i] = self.counts[i] - d;
                }
            }
            self.total_count = new_total;
        }

        // A subtraction at the recorded extremes invalidates the cached min/max.
        if self.total_count == 0 {
            self.reset_max(0);
            self.reset_min(u64::max_value());
        } else {
            let max_touched = self
                .index_for_checked(self.max_value)
                .map(|i| self.counts[i] == C::zero())
                .unwrap_or(false);
            let min_touched = self.min_non_zero_value != u64::max_value()
                && self
                    .index_for_checked(self.min_non_zero_value)
                    .map(|i| self.counts[i] == C::zero())
                    .unwrap_or(false);
            if max_touched || min_touched {
                self.restat_min_max();
            }
        }
        Ok(())
    }

    /// Accumulate `other`'s non-zero slots into per-slot deltas in this histogram's
    /// geometry. Used by `add`/`subtract` when the two geometries differ, so their
    /// validate-then-apply passes stay all-or-nothing.
    fn reencoded_deltas<F: Counter>(
        &self,
        other: &Histogram<F>,
    ) -> Result<(Vec<C>, u64), ReencodeError> {
        let mut deltas = vec![C::zero(); self.counts.len()];
        let mut delta_total = 0_u64;
        for (i, sc) in other.counts.iter().enumerate() {
            if *sc == F::zero() {
                continue;
            }
            let value = other.value_for(i);
            let index = self
                .index_for_checked(value)
                .ok_or(ReencodeError::OutOfRange)?;
            let count = C::from_u64(sc.as_u64()).ok_or(ReencodeError::Overflow)?;
            deltas[index] = deltas[index]
                .checked_add(&count)
                .ok_or(ReencodeError::Overflow)?;
            delta_total = delta_total
                .checked_add(sc.as_u64())
                .ok_or(ReencodeError::Overflow)?;
        }
        Ok((deltas, delta_total))
    }

    fn restat_min_max(&mut self) {
        self.reset_max(0);
        self.reset_min(u64::max_value());
        for i in 0..self.counts.len() {
            if self.counts[i] != C::zero() {
                let value = self.value_for(i);
                self.update_max(self.highest_equivalent(value));
                self.update_min(value);
            }
        }
    }

    /// Zero all counters and the total count, keeping min/max statistics.
    pub fn clear(&mut self) {
        for c in self.counts.iter_mut() {
            *c = C::zero();
        }
        self.total_count = 0;
    }

    /// Reset the histogram for reuse: zero all counters and statistics while keeping
    /// configuration, geometry and the existing allocation.
    pub fn reset(&mut self) {
        self.clear();
        self.reset_max(0);
        self.reset_min(u64::max_value());
    }

    /// A copy of this histogram, corrected for coordinated omission after the fact.
    ///
    /// This is the post-hoc alternative to recording with [`record_correct`]; using
    /// both on the same data set double-corrects.
    ///
    /// [`record_correct`]: Histogram::record_correct
    pub fn clone_correct(&self, interval: u64) -> Histogram<C> {
        let mut h = Self::new_from(self);
        for v in self.iter_recorded() {
            h.record_n_correct(v.value_iterated_to(), v.count_at_value(), interval)
                .expect("same dimensions and same counts cannot fail");
        }
        h
    }
}

enum ReencodeError {
    OutOfRange,
    Overflow,
}

impl<C: Counter> Clone for Histogram<C> {
    fn clone(&self) -> Self {
        let mut h = Histogram::new_from(self);
        h.add(self)
            .expect("same dimensions and same counts cannot fail");
        h
    }
}

impl<'a, C: Counter> AddAssign<&'a Histogram<C>> for Histogram<C> {
    fn add_assign(&mut self, source: &'a Histogram<C>) {
        self.add(source).unwrap();
    }
}

impl<'a, C: Counter> SubAssign<&'a Histogram<C>> for Histogram<C> {
    fn sub_assign(&mut self, other: &'a Histogram<C>) {
        self.subtract(other).unwrap();
    }
}

impl<C: Counter, F: Counter> PartialEq<Histogram<F>> for Histogram<C> {
    fn eq(&self, other: &Histogram<F>) -> bool {
        if self.lowest_discernible_value != other.lowest_discernible_value
            || self.significant_value_digits != other.significant_value_digits
        {
            return false;
        }
        if self.total_count != other.total_count
            || self.max() != other.max()
            || self.min_nz() != other.min_nz()
        {
            return false;
        }
        // Lengths may differ if one side auto-resized; any extra high slots must be
        // empty for the histograms to be equal.
        let shared = cmp::min(self.counts.len(), other.counts.len());
        (0..shared).all(|i| self.counts[i].as_u64() == other.counts[i].as_u64())
            && self.counts[shared..].iter().all(|c| *c == C::zero())
            && other.counts[shared..].iter().all(|c| *c == F::zero())
    }
}

// Serde seam. Serialization is derived; deserialization is validated by hand so a
// malformed payload cannot construct a histogram whose totals or geometry disagree
// with its counts.

#[derive(Deserialize)]
struct RawHistogram<C> {
    auto_resize: bool,
    lowest_discernible_value: u64,
    highest_trackable_value: u64,
    significant_value_digits: u8,
    bucket_count: u8,
    sub_bucket_count: u32,
    sub_bucket_half_count: u32,
    sub_bucket_half_count_magnitude: u8,
    sub_bucket_mask: u64,
    unit_magnitude: u8,
    unit_magnitude_mask: u64,
    leading_zero_count_base: u8,
    max_value: u64,
    min_non_zero_value: u64,
    total_count: u64,
    counts: Vec<C>,
}

impl<'de, C: Counter + Deserialize<'de>> Deserialize<'de> for Histogram<C> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::Error;

        let raw = RawHistogram::<C>::deserialize(deserializer)?;

        let mut h = Histogram::<C>::new_with_bounds(
            raw.lowest_discernible_value,
            raw.highest_trackable_value,
            raw.significant_value_digits,
        )
        .map_err(|e| D::Error::custom(format_args!("invalid configuration: {}", e)))?;

        // The derived geometry is a pure function of the configuration; a payload
        // that disagrees was not produced by serializing a histogram.
        if raw.bucket_count != h.bucket_count
            || raw.sub_bucket_count != h.sub_bucket_count
            || raw.sub_bucket_half_count != h.sub_bucket_half_count
            || raw.sub_bucket_half_count_magnitude != h.sub_bucket_half_count_magnitude
            || raw.sub_bucket_mask != h.sub_bucket_mask
            || raw.unit_magnitude != h.unit_magnitude
            || raw.unit_magnitude_mask != h.unit_magnitude_mask
            || raw.leading_zero_count_base != h.leading_zero_count_base
        {
            return Err(D::Error::custom("geometry does not match configuration"));
        }
        if raw.counts.len() != h.counts.len() {
            return Err(D::Error::custom(
                "counts length does not match configuration",
            ));
        }

        let mut total = 0_u64;
        for c in &raw.counts {
            total = total
                .checked_add(c.as_u64())
                .ok_or_else(|| D::Error::custom("counts sum overflows the total"))?;
        }
        if total != raw.total_count {
            return Err(D::Error::custom("total count does not match the counts"));
        }

        h.auto_resize = raw.auto_resize;
        h.counts = raw.counts;
        h.total_count = raw.total_count;
        h.max_value = if raw.max_value == 0 {
            0
        } else {
            raw.max_value | h.unit_magnitude_mask
        };
        h.min_non_zero_value = if raw.min_non_zero_value == u64::max_value() {
            u64::max_value()
        } else {
            raw.min_non_zero_value & !h.unit_magnitude_mask
        };
        Ok(h)
    }
}

// Min/max bookkeeping.

impl<C: Counter> Histogram<C> {
    fn update_min_max(&mut self, value: u64) {
        if value > self.max_value {
            self.update_max(value);
        }
        if value != 0 && value < self.min_non_zero_value {
            self.update_min(value);
        }
    }

    fn update_max(&mut self, value: u64) {
        let internal = value | self.unit_magnitude_mask; // max unit-equivalent value
        if internal > self.max_value {
            self.max_value = internal;
        }
    }

    fn update_min(&mut self, value: u64) {
        if value <= self.unit_magnitude_mask {
            return; // unit-equivalent to 0
        }
        let internal = value & !self.unit_magnitude_mask; // min unit-equivalent value
        if internal < self.min_non_zero_value {
            self.min_non_zero_value = internal;
        }
    }

    fn reset_max(&mut self, max: u64) {
        self.max_value = max | self.unit_magnitude_mask;
    }

    fn reset_min(&mut self, min: u64) {
        let internal = min & !self.unit_magnitude_mask;
        self.min_non_zero_value = if min == u64::max_value() { min } else { internal };
    }
}

// Statistics.

impl<C: Counter> Histogram<C> {
    /// Lowest recorded value, or 0 if no values were recorded (or any fell in the
    /// 0-equivalent slot).
    pub fn min(&self) -> u64 {
        if self.total_count == 0 || self.counts[0] != C::zero() {
            0
        } else {
            self.min_nz()
        }
    }

    /// Lowest recorded non-zero value, or `u64::max_value()` if none were recorded.
    pub fn min_nz(&self) -> u64 {
        if self.min_non_zero_value == u64::max_value() {
            u64::max_value()
        } else {
            self.lowest_equivalent(self.min_non_zero_value)
        }
    }

    /// Highest recorded value, or 0 if no values were recorded.
    pub fn max(&self) -> u64 {
        if self.max_value == self.unit_magnitude_mask {
            0
        } else {
            self.highest_equivalent(self.max_value)
        }
    }

    /// Mean of all recorded values, using each slot's median-equivalent value.
    pub fn mean(&self) -> f64 {
        if self.total_count == 0 {
            return 0.0;
        }
        let total = self.total_count as f64;
        self.iter_recorded().fold(0.0, |sum, v| {
            sum + self.median_equivalent(v.value_iterated_to()) as f64
                * v.count_at_value().as_f64()
                / total
        })
    }

    /// Standard deviation of all recorded values.
    pub fn stdev(&self) -> f64 {
        if self.total_count == 0 {
            return 0.0;
        }
        let mean = self.mean();
        let sq_dev_sum = self.iter_recorded().fold(0.0, |sum, v| {
            let dev = self.median_equivalent(v.value_iterated_to()) as f64 - mean;
            sum + dev * dev * v.count_at_value().as_f64()
        });
        (sq_dev_sum / self.total_count as f64).sqrt()
    }

    /// Value at the given quantile (in `[0.0, 1.0]`).
    ///
    /// For `quantile > 0.0` this is the value that the given fraction of recorded
    /// samples is smaller than or equivalent to; for 0.0 it is the value all samples
    /// are larger than or equivalent to. Returns 0 for an empty histogram.
    pub fn value_at_quantile(&self, quantile: f64) -> u64 {
        let quantile = if quantile > 1.0 { 1.0 } else { quantile };

        let mut count_at_quantile = (quantile * self.total_count as f64).ceil() as u64;
        // reach at least the first recorded entry
        if count_at_quantile < 1 {
            count_at_quantile = 1;
        }

        let mut total_to_index = 0_u64;
        for i in 0..self.counts.len() {
            total_to_index = total_to_index.saturating_add(self.counts[i].as_u64());
            if total_to_index >= count_at_quantile {
                let value = self.value_for(i);
                return if quantile == 0.0 {
                    self.lowest_equivalent(value)
                } else {
                    self.highest_equivalent(value)
                };
            }
        }
        0
    }

    /// Value at the given percentile (in `[0.0, 100.0]`); see
    /// [`value_at_quantile`](Histogram::value_at_quantile).
    pub fn value_at_percentile(&self, percentile: f64) -> u64 {
        self.value_at_quantile(percentile / 100.0)
    }

    /// Fraction of recorded samples that are smaller than or equivalent to `value`.
    /// Returns 1.0 for an empty histogram.
    pub fn quantile_below(&self, value: u64) -> f64 {
        if self.total_count == 0 {
            return 1.0;
        }
        let target = cmp::min(self.index_for(value), self.last_index());
        let total_to_index = (0..=target)
            .map(|i| self.counts[i].as_u64())
            .fold(0_u64, |t, c| t.saturating_add(c));
        total_to_index as f64 / self.total_count as f64
    }

    /// Percentage of recorded samples that are smaller than or equivalent to `value`.
    pub fn percentile_below(&self, value: u64) -> f64 {
        100.0 * self.quantile_below(value)
    }

    /// Count recorded at the slot `value` encodes to (clamped to the covered range).
    pub fn count_at(&self, value: u64) -> C {
        self.counts[cmp::min(self.index_for(value), self.last_index())]
    }

    /// Total count recorded in slots between `low` and `high` inclusive, rounded out
    /// to slot boundaries. Saturates at `u64::max_value()`.
    pub fn count_between(&self, low: u64, high: u64) -> u64 {
        let low_index = cmp::min(self.index_for(low), self.last_index());
        let high_index = cmp::min(self.index_for(high), self.last_index());
        (low_index..=high_index)
            .map(|i| self.counts[i].as_u64())
            .fold(0_u64, |t, c| t.saturating_add(c))
    }
}

// Iteration.

impl<C: Counter> Histogram<C> {
    /// Iterate values at quantile steps that tighten geometrically towards 1.0,
    /// taking `ticks_per_half_distance` equal steps per halving of the remaining
    /// distance. The final step always lands exactly on 1.0.
    pub fn iter_quantiles(
        &self,
        ticks_per_half_distance: u32,
    ) -> iterators::HistogramIterator<'_, C, iterators::quantile::Iter<'_, C>> {
        iterators::quantile::Iter::new(self, ticks_per_half_distance)
    }

    /// Iterate fixed-width value ranges of `value_units_per_bucket`, including empty
    /// ones, until the recorded maximum is passed.
    pub fn iter_linear(
        &self,
        value_units_per_bucket: u64,
    ) -> iterators::HistogramIterator<'_, C, iterators::linear::Iter<'_, C>> {
        iterators::linear::Iter::new(self, value_units_per_bucket)
    }

    /// Iterate geometrically growing value ranges, starting at
    /// `value_units_in_first_bucket` and multiplying by `log_base` each step.
    pub fn iter_log(
        &self,
        value_units_in_first_bucket: u64,
        log_base: f64,
    ) -> iterators::HistogramIterator<'_, C, iterators::log::Iter<'_, C>> {
        iterators::log::Iter::new(self, value_units_in_first_bucket, log_base)
    }

    /// Iterate every slot with a non-zero count, in value order.
    pub fn iter_recorded(
        &self,
    ) -> iterators::HistogramIterator<'_, C, iterators::recorded::Iter> {
        iterators::recorded::Iter::new(self)
    }

    /// Iterate every representable slot in value order, including empty ones.
    pub fn iter_all(&self) -> iterators::HistogramIterator<'_, C, iterators::all::Iter> {
        iterators::all::Iter::new(self)
    }
}

// Cursors (see the `cursor` module).

impl<C: Counter> Histogram<C> {
    /// A resumable cursor over the quantile iteration; see [`cursor`].
    pub fn percentile_cursor(
        &self,
        ticks_per_half_distance: u32,
    ) -> cursor::PercentileCursor<'_, C> {
        cursor::PercentileCursor::new(self, ticks_per_half_distance)
    }

    /// A resumable cursor over recorded values; see [`cursor`].
    pub fn recorded_cursor(&self) -> cursor::RecordedCursor<'_, C> {
        cursor::RecordedCursor::new(self)
    }

    /// A resumable cursor over fixed-width ranges; see [`cursor`].
    pub fn linear_cursor(&self, value_units_per_bucket: u64) -> cursor::LinearCursor<'_, C> {
        cursor::LinearCursor::new(self, value_units_per_bucket)
    }

    /// A resumable cursor over geometrically growing ranges; see [`cursor`].
    pub fn log_cursor(
        &self,
        value_units_in_first_bucket: u64,
        log_base: f64,
    ) -> cursor::LogCursor<'_, C> {
        cursor::LogCursor::new(self, value_units_in_first_bucket, log_base)
    }

    /// A resumable cursor over every representable slot; see [`cursor`].
    pub fn all_cursor(&self) -> cursor::AllCursor<'_, C> {
        cursor::AllCursor::new(self)
    }
}

#[cfg(test)]
mod tests;
