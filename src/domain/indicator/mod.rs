//! Technical indicator implementations over plain value series.
//!
//! Every indicator returns a [`Series`] the same length as its input, with
//! `None` wherever the value is not yet defined (warmup) or cannot be
//! computed. Inputs that are themselves indicator outputs are accepted as
//! `&[Option<f64>]`; leading `None`s are skipped before warmup starts.

pub mod dema;
pub mod ema;
pub mod rma;
pub mod rsi;

/// A same-length indicator output; `None` marks an undefined index.
pub type Series = Vec<Option<f64>>;

/// Lift a plain value slice into an all-defined series.
pub fn defined(values: &[f64]) -> Series {
    values.iter().copied().map(Some).collect()
}

/// Index of the first defined value, if any.
pub(crate) fn first_defined(values: &[Option<f64>]) -> Option<usize> {
    values.iter().position(Option::is_some)
}
