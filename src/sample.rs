//! Per-collector sampling outcome.

use serde::Serialize;

/// Result of one collector invocation in one round.
///
/// `NoData` is an explicit absence: it is stored as a gap in the time series,
/// never as zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum Sample<T> {
    Value(T),
    NoData,
}

impl<T> Sample<T> {
    pub fn value(self) -> Option<T> {
        match self {
            Sample::Value(v) => Some(v),
            Sample::NoData => None,
        }
    }

    pub fn as_ref(&self) -> Sample<&T> {
        match self {
            Sample::Value(v) => Sample::Value(v),
            Sample::NoData => Sample::NoData,
        }
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Sample<U> {
        match self {
            Sample::Value(v) => Sample::Value(f(v)),
            Sample::NoData => Sample::NoData,
        }
    }

    pub fn is_no_data(&self) -> bool {
        matches!(self, Sample::NoData)
    }
}

impl<T> From<Option<T>> for Sample<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => Sample::Value(v),
            None => Sample::NoData,
        }
    }
}

/// Rounds to two decimal places.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Rounds to one decimal place.
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
