//! Error types used throughout the crate. Each fallible operation has its own enum,
//! and every failure leaves the histogram it was invoked on unmodified.

use std::error::Error;
use std::fmt;

/// Errors that can occur when creating a histogram.
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub enum CreationError {
    /// Lowest discernible value must be >= 1.
    LowIsZero,
    /// Lowest discernible value must be <= `u64::max_value() / 2` because the
    /// highest value must be at least twice the lowest.
    LowExceedsMax,
    /// Highest trackable value must be >= 2 * lowest discernible value for some
    /// internal calculations to work out. In practice, high is typically much higher.
    HighLessThanTwiceLow,
    /// Number of significant digits must be in the range `[1, 5]`. It is capped at 5
    /// because 5 digits already corresponds to a relative error smaller than 1/100_000.
    SigFigOutOfRange,
    /// Cannot represent sigfig worth of values beyond the lowest discernible value.
    /// Decrease the significant figures or the lowest discernible value.
    CannotRepresentSigFigBeyondLow,
    /// The `usize` type is too small to represent the needed counts array length.
    /// Use smaller bounds or fewer significant figures.
    UsizeTypeTooSmall,
}

impl fmt::Display for CreationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            CreationError::LowIsZero => "lowest discernible value must be >= 1",
            CreationError::LowExceedsMax => {
                "lowest discernible value must be <= u64::max_value() / 2"
            }
            CreationError::HighLessThanTwiceLow => {
                "highest trackable value must be >= 2 * lowest discernible value"
            }
            CreationError::SigFigOutOfRange => "significant figures must be in [1, 5]",
            CreationError::CannotRepresentSigFigBeyondLow => {
                "cannot represent sigfig worth of values beyond lowest discernible value"
            }
            CreationError::UsizeTypeTooSmall => {
                "usize cannot represent the needed counts array length"
            }
        };
        write!(f, "{}", msg)
    }
}

impl Error for CreationError {}

/// Errors that can occur when recording a value.
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub enum RecordError {
    /// The value exceeds the highest trackable value and auto-resize is disabled.
    /// Enable auto-resize, or create the histogram with a higher bound. Recoverable:
    /// the sample can be dropped or clamped and recording can continue.
    ValueOutOfRange,
    /// The slot counter or the total count would overflow. Use a wider counter type.
    CountOverflow,
    /// Auto-resize was attempted but `usize` cannot represent the grown counts
    /// array length.
    ResizeFailedUsizeTypeTooSmall,
}

impl fmt::Display for RecordError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            RecordError::ValueOutOfRange => {
                "value exceeds the highest trackable value and auto-resize is disabled"
            }
            RecordError::CountOverflow => "recording would overflow a counter",
            RecordError::ResizeFailedUsizeTypeTooSmall => {
                "auto-resize failed: usize cannot represent the grown counts array"
            }
        };
        write!(f, "{}", msg)
    }
}

impl Error for RecordError {}

/// Errors that can occur when adding another histogram.
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub enum AdditionError {
    /// The other histogram holds recorded values beyond this histogram's range and
    /// auto-resize is disabled.
    IncompatibleRange,
    /// Merging would overflow a slot counter or the total count. No counts were
    /// changed.
    CountOverflow,
    /// Auto-resize was attempted but `usize` cannot represent the grown counts
    /// array length.
    ResizeFailedUsizeTypeTooSmall,
}

impl fmt::Display for AdditionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            AdditionError::IncompatibleRange => {
                "other histogram holds values beyond this histogram's range"
            }
            AdditionError::CountOverflow => "merging would overflow a counter",
            AdditionError::ResizeFailedUsizeTypeTooSmall => {
                "auto-resize failed: usize cannot represent the grown counts array"
            }
        };
        write!(f, "{}", msg)
    }
}

impl Error for AdditionError {}

/// Errors that can occur when subtracting another histogram.
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub enum SubtractionError {
    /// The other histogram holds recorded values beyond this histogram's range.
    IncompatibleRange,
    /// The other histogram's count at some slot exceeds this histogram's: the
    /// subtrahend is not a subset. No counts were changed.
    CountUnderflow,
}

impl fmt::Display for SubtractionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            SubtractionError::IncompatibleRange => {
                "other histogram holds values beyond this histogram's range"
            }
            SubtractionError::CountUnderflow => {
                "subtracting would drive a counter below zero"
            }
        };
        write!(f, "{}", msg)
    }
}

impl Error for SubtractionError {}

/// Marker for `usize` being unable to represent a counts array length; mapped to the
/// appropriate per-operation variant at the call site.
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub(crate) struct UsizeTypeTooSmall;
