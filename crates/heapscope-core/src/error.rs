//! Error types for object records, filters, and symbol tables.

use std::error::Error;
use std::fmt;

/// Errors from reading or writing an object's pointer slots.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RecordError {
    /// The slot index is not below the record's pointer count.
    PointerOutOfRange {
        /// Requested slot.
        index: usize,
        /// Number of slots the record has.
        count: usize,
    },
    /// More pointer values were supplied than the record has slots.
    TooManyPointers {
        /// Number of values supplied.
        given: usize,
        /// Number of slots the record has.
        count: usize,
    },
    /// The record's arity is unknown and no pointers have been filled yet.
    PointersUnset,
}

impl fmt::Display for RecordError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PointerOutOfRange { index, count } => {
                write!(f, "pointer index {index} out of range (pointer count {count})")
            }
            Self::TooManyPointers { given, count } => {
                write!(f, "{given} pointers given but object has only {count} slots")
            }
            Self::PointersUnset => {
                write!(f, "object of unknown pointer count has no pointers set")
            }
        }
    }
}

impl Error for RecordError {}

/// A failure inside an [`ObjectFilter`](crate::traits::ObjectFilter).
///
/// Heap walks treat a failing filter as a rejection of that object and
/// keep walking.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FilterError {
    /// Name of the filter that failed.
    pub filter: String,
    /// Human-readable description of the failure.
    pub reason: String,
}

impl fmt::Display for FilterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "filter '{}' failed: {}", self.filter, self.reason)
    }
}

impl Error for FilterError {}

/// Errors from building a [`Symbols`](crate::info::Symbols) table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SymbolsError {
    /// The heap word size is zero or not a power of two.
    InvalidHeapWordSize {
        /// The rejected value.
        value: u32,
    },
}

impl fmt::Display for SymbolsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidHeapWordSize { value } => {
                write!(f, "heap word size must be a power of two, got {value}")
            }
        }
    }
}

impl Error for SymbolsError {}
