//! One-shot storage for a task outcome.

use crate::error::Error;

/// Holds the outcome of a task: nothing yet, a value, or a captured failure.
///
/// The slot is write-once. A second write is ignored so that racing
/// completions (a timeout firing in the same tick as the awaited task) cannot
/// clobber the outcome that was recorded first.
pub(crate) enum ResultSlot<R> {
    Empty,
    Value(R),
    Failed(Error),
}

impl<R> ResultSlot<R> {
    pub(crate) fn has_value(&self) -> bool {
        !matches!(self, ResultSlot::Empty)
    }

    pub(crate) fn set_value(&mut self, value: R) {
        if matches!(self, ResultSlot::Empty) {
            *self = ResultSlot::Value(value);
        }
    }

    pub(crate) fn set_failure(&mut self, error: Error) {
        if matches!(self, ResultSlot::Empty) {
            *self = ResultSlot::Failed(error);
        }
    }

    /// Moves the outcome out, leaving the slot empty. Reading an empty slot
    /// yields [`Error::NoResult`].
    pub(crate) fn take(&mut self) -> Result<R, Error> {
        match std::mem::replace(self, ResultSlot::Empty) {
            ResultSlot::Value(value) => Ok(value),
            ResultSlot::Failed(error) => Err(error),
            ResultSlot::Empty => Err(Error::NoResult),
        }
    }

    /// Reads the outcome by clone; idempotent, used by the by-reference await.
    pub(crate) fn peek(&self) -> Result<R, Error>
    where
        R: Clone,
    {
        match self {
            ResultSlot::Value(value) => Ok(value.clone()),
            ResultSlot::Failed(error) => Err(error.clone()),
            ResultSlot::Empty => Err(Error::NoResult),
        }
    }
}
