//! Consistency anomalies and the sink they are reported through.
//!
//! Anomalies are data problems a slightly malformed trace or dump can
//! cause. They never abort processing; the tracker and the resolver report
//! each one to an [`AnomalySink`] and keep it alongside their results.

use std::fmt;

use crate::id::{Address, DenseIndex, GcId, ObjectId};

/// A consistency problem detected while classifying or resolving objects.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Anomaly {
    /// An object died before it could have survived a single GC.
    ///
    /// Usually a filler object. The age is recorded as 0.
    NegativeAge {
        /// The object.
        object: ObjectId,
        /// Its birth epoch.
        born_at: GcId,
        /// The GC it died in.
        gc: GcId,
    },
    /// An object born before the window died but was not in the
    /// window-start snapshot.
    MissingPerm {
        /// The object.
        object: ObjectId,
        /// Its birth epoch.
        born_at: GcId,
    },
    /// A non-filler object born in the window's first GC was found in the
    /// window-start snapshot.
    UnexpectedStartObject {
        /// The object.
        object: ObjectId,
        /// Its birth epoch.
        born_at: GcId,
    },
    /// PERM and BORN objects do not add up to the end-of-window heap.
    CountMismatch {
        /// PERM objects at window end.
        perm: usize,
        /// BORN objects at window end.
        born: usize,
        /// Objects in the end-of-window heap.
        objects: usize,
    },
    /// A BORN object's forwarding address is not in the window-end heap.
    ///
    /// The object keeps its own address and index.
    UnresolvedForward {
        /// The object.
        object: ObjectId,
        /// The forwarding address it carried.
        forward: Address,
    },
    /// A heap-dump pointer names an object id that is not in the dump.
    UnresolvedPointer {
        /// Dense index of the object holding the pointer.
        from: DenseIndex,
        /// The raw object id.
        target: u64,
    },
    /// A heap-dump root names an object id that is not in the dump.
    UnresolvedRoot {
        /// The raw object id.
        target: u64,
    },
    /// An instance dump references a class that was never dumped.
    MissingClass {
        /// Raw id of the instance.
        object: u64,
        /// Raw id of the class.
        class: u64,
    },
}

impl fmt::Display for Anomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NegativeAge {
                object,
                born_at,
                gc,
            } => write!(
                f,
                "object {object} born at GC {born_at} died in GC {gc} with negative age (filler?)"
            ),
            Self::MissingPerm { object, born_at } => write!(
                f,
                "object {object} born at GC {born_at} died but was not in the window-start heap"
            ),
            Self::UnexpectedStartObject { object, born_at } => write!(
                f,
                "object {object} born at GC {born_at} is in the window-start heap but is not a filler"
            ),
            Self::CountMismatch {
                perm,
                born,
                objects,
            } => write!(
                f,
                "PERM ({perm}) and BORN ({born}) do not add up to the heap's {objects} objects"
            ),
            Self::UnresolvedForward { object, forward } => write!(
                f,
                "object {object} is forwarded to {forward}, which holds no object at window end"
            ),
            Self::UnresolvedPointer { from, target } => {
                write!(f, "object {from} points to unknown object id {target:#x}")
            }
            Self::UnresolvedRoot { target } => {
                write!(f, "root points to unknown object id {target:#x}")
            }
            Self::MissingClass { object, class } => {
                write!(f, "instance {object:#x} references unknown class {class:#x}")
            }
        }
    }
}

/// Receives anomalies as they are detected.
pub trait AnomalySink {
    /// Report one anomaly.
    fn report(&mut self, anomaly: &Anomaly);
}

/// Forwards anomalies to `log::warn!`.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogSink;

impl AnomalySink for LogSink {
    fn report(&mut self, anomaly: &Anomaly) {
        log::warn!("{anomaly}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_object() {
        let a = Anomaly::NegativeAge {
            object: ObjectId(7),
            born_at: GcId(4),
            gc: GcId(4),
        };
        assert!(a.to_string().contains("#7"));
        let u = Anomaly::UnresolvedPointer {
            from: DenseIndex(2),
            target: 0xdead,
        };
        assert!(u.to_string().contains("0xdead"));
    }
}
