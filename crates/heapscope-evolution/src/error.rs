//! Error types for the evolution tracker.

use std::error::Error;
use std::fmt;

use heapscope_arena::ArenaError;

use crate::config::ConfigError;

/// Errors that stop the tracker.
///
/// Every variant is fatal for the window: the heap may be half-updated,
/// so the tracker should be dropped. Recoverable consistency problems are
/// reported as [`Anomaly`](heapscope_core::Anomaly)s instead.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EvolutionError {
    /// The trace violated a heap invariant.
    Arena(ArenaError),
    /// The window configuration is invalid.
    Config(ConfigError),
    /// A GC boundary arrived with a time earlier than its predecessor.
    OutOfOrder {
        /// Time of the previous boundary.
        previous: i64,
        /// Time of the offending boundary.
        time: i64,
    },
    /// The trace ended before any boundary reached the window start.
    WindowNotOpened {
        /// Configured window start.
        start_time: i64,
    },
    /// Processing was cancelled through the tracker's
    /// [`CancelFlag`](heapscope_core::CancelFlag).
    Cancelled,
}

impl fmt::Display for EvolutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Arena(e) => write!(f, "heap error: {e}"),
            Self::Config(e) => write!(f, "invalid window configuration: {e}"),
            Self::OutOfOrder { previous, time } => {
                write!(f, "GC boundary at {time} arrived after boundary at {previous}")
            }
            Self::WindowNotOpened { start_time } => {
                write!(f, "trace ended before reaching window start {start_time}")
            }
            Self::Cancelled => write!(f, "heap evolution tracking cancelled"),
        }
    }
}

impl Error for EvolutionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Arena(e) => Some(e),
            Self::Config(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ArenaError> for EvolutionError {
    fn from(e: ArenaError) -> Self {
        match e {
            ArenaError::Cancelled => Self::Cancelled,
            other => Self::Arena(other),
        }
    }
}

impl From<ConfigError> for EvolutionError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}
