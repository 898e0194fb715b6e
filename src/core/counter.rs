use num_traits::{CheckedAdd, CheckedSub, FromPrimitive, Num, Saturating, ToPrimitive};

/// The types of counts a histogram's slots can hold. Implemented for the unsigned
/// integers up to `u64`; wider counters cost proportionally more memory.
pub trait Counter:
    Num + ToPrimitive + FromPrimitive + Saturating + CheckedAdd + CheckedSub + Copy + PartialOrd<Self>
{
    /// The count as an `f64`, for statistics.
    fn as_f64(&self) -> f64;
    /// The count as a `u64`, for totals.
    fn as_u64(&self) -> u64;
}

impl Counter for u8 {
    #[inline]
    fn as_f64(&self) -> f64 {
        f64::from(*self)
    }
    #[inline]
    fn as_u64(&self) -> u64 {
        u64::from(*self)
    }
}

impl Counter for u16 {
    #[inline]
    fn as_f64(&self) -> f64 {
        f64::from(*self)
    }
    #[inline]
    fn as_u64(&self) -> u64 {
        u64::from(*self)
    }
}

impl Counter for u32 {
    #[inline]
    fn as_f64(&self) -> f64 {
        f64::from(*self)
    }
    #[inline]
    fn as_u64(&self) -> u64 {
        u64::from(*self)
    }
}

impl Counter for u64 {
    #[inline]
    fn as_f64(&self) -> f64 {
        *self as f64
    }
    #[inline]
    fn as_u64(&self) -> u64 {
        *self
    }
}
