//! Arena-specific error types.

use std::error::Error;
use std::fmt;

use heapscope_core::{Address, GcId, RecordError, SpaceId};

use crate::lab::LabKind;

/// Where a failing lab sits in the heap, for diagnostics.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LabContext {
    /// Owning thread.
    pub thread: String,
    /// Lab kind.
    pub kind: LabKind,
    /// Base address.
    pub bottom: Address,
    /// End of the lab's current extent.
    pub end: Address,
    /// Capacity in bytes, or the current position for extendable labs.
    pub capacity: u64,
}

impl fmt::Display for LabContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "lab of kind {:?} of thread {} (range {} - {}, size {})",
            self.kind, self.thread, self.bottom, self.end, self.capacity
        )
    }
}

/// Errors that can occur during lab and heap operations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ArenaError {
    /// The trace placed an object somewhere other than the lab's top.
    NotConsecutive {
        /// The lab that rejected the object.
        lab: LabContext,
        /// Address the trace reported.
        actual: Address,
        /// Address the lab expected (its current top).
        expected: Address,
        /// Size of the offending object.
        size: u64,
        /// Description of the offending object.
        object: String,
    },
    /// Placing the object would push the lab past its fixed capacity.
    CapacityExceeded {
        /// The lab that rejected the object.
        lab: LabContext,
        /// Address the object would have received.
        addr: Address,
        /// Size of the offending object.
        size: u64,
        /// Lab position before the rejected allocation.
        position: u64,
        /// Description of the offending object.
        object: String,
    },
    /// Address lookup in a lab that holds no objects.
    EmptyLab {
        /// Base address of the lab.
        bottom: Address,
    },
    /// No object starts exactly at the address.
    ObjectNotFound {
        /// The address looked up.
        addr: Address,
    },
    /// `reset_capacity` on a lab whose capacity is already fixed.
    CapacityAlreadyFixed {
        /// Base address of the lab.
        bottom: Address,
        /// The fixed capacity.
        capacity: u64,
    },
    /// A sublab range outside the lab or with `bottom > end`.
    InvalidSublab {
        /// Requested start.
        bottom: Address,
        /// Requested end.
        end: Address,
        /// The lab being sliced.
        lab: LabContext,
    },
    /// A lab overlaps or duplicates one already in the space.
    LabOverlap {
        /// Base address of the new lab.
        bottom: Address,
        /// Space the lab was added to.
        space: SpaceId,
    },
    /// No space covers the address.
    NoSpaceForAddress {
        /// The address.
        addr: Address,
    },
    /// The space id is not registered.
    UnknownSpace {
        /// The unregistered id.
        space: SpaceId,
    },
    /// A thread allocated without an address and owns no lab to bump into.
    NoLabForThread {
        /// The allocating thread.
        thread: String,
        /// Space searched.
        space: SpaceId,
    },
    /// Starting a space transition while a `ReplaceAll` one is in progress.
    TransitionInProgress {
        /// The space.
        space: SpaceId,
    },
    /// Committing a transition on a space that has none.
    NoTransition {
        /// The space.
        space: SpaceId,
    },
    /// `start_gc` for an epoch that is already running.
    GcAlreadyActive {
        /// The epoch.
        gc: GcId,
    },
    /// A full GC was started while another GC is still running.
    FullGcWhileActive {
        /// The full GC's epoch.
        gc: GcId,
    },
    /// An operation referenced a GC that is not running.
    NoActiveGc {
        /// The epoch.
        gc: GcId,
    },
    /// A space was marked for collection twice.
    SpaceAlreadyCollected {
        /// The space.
        space: SpaceId,
    },
    /// An object was moved out of a space that the running GC does not
    /// evacuate.
    SourceNotCollected {
        /// Address of the moved object.
        addr: Address,
        /// Its space.
        space: SpaceId,
    },
    /// A pointer slot operation failed.
    Record(RecordError),
    /// The walk was cancelled through its [`CancelFlag`](heapscope_core::CancelFlag).
    Cancelled,
}

impl fmt::Display for ArenaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConsecutive {
                lab,
                actual,
                expected,
                size,
                object,
            } => {
                let offset = actual.0 as i128 - expected.0 as i128;
                write!(
                    f,
                    "{lab} is not consecutive: object {object} at {actual} \
                     (range {actual} - {}, size {size}), expected {expected}, offset {offset}",
                    actual.add(*size)
                )
            }
            Self::CapacityExceeded {
                lab,
                addr,
                size,
                position,
                object,
            } => {
                write!(
                    f,
                    "lab capacity exceeded: object {object} at {addr} (size {size}) added to {lab}, \
                     position {position} + {size} > capacity {}",
                    lab.capacity
                )
            }
            Self::EmptyLab { bottom } => write!(f, "no object in lab at {bottom}"),
            Self::ObjectNotFound { addr } => write!(f, "no object found at address {addr}"),
            Self::CapacityAlreadyFixed { bottom, capacity } => {
                write!(f, "lab at {bottom} already has fixed capacity {capacity}")
            }
            Self::InvalidSublab { bottom, end, lab } => {
                write!(f, "sublab {bottom} - {end} is not within {lab}")
            }
            Self::LabOverlap { bottom, space } => {
                write!(f, "lab at {bottom} overlaps an existing lab in space {space}")
            }
            Self::NoSpaceForAddress { addr } => write!(f, "no space covers address {addr}"),
            Self::UnknownSpace { space } => write!(f, "unknown space {space}"),
            Self::NoLabForThread { thread, space } => {
                write!(f, "thread {thread} has no lab in space {space}")
            }
            Self::TransitionInProgress { space } => {
                write!(f, "transition already in progress in space {space}")
            }
            Self::NoTransition { space } => write!(f, "no transition in progress in space {space}"),
            Self::GcAlreadyActive { gc } => write!(f, "GC {gc} already active"),
            Self::FullGcWhileActive { gc } => {
                write!(f, "cannot start full GC {gc} while another GC is active")
            }
            Self::NoActiveGc { gc } => write!(f, "no GC active for id {gc}"),
            Self::SpaceAlreadyCollected { space } => {
                write!(f, "space {space} is already being collected")
            }
            Self::SourceNotCollected { addr, space } => {
                write!(f, "object at {addr} moved out of space {space}, which is not being collected")
            }
            Self::Record(e) => write!(f, "{e}"),
            Self::Cancelled => write!(f, "heap walk cancelled"),
        }
    }
}

impl Error for ArenaError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Record(e) => Some(e),
            _ => None,
        }
    }
}

impl From<RecordError> for ArenaError {
    fn from(e: RecordError) -> Self {
        Self::Record(e)
    }
}
