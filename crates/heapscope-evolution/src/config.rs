//! Window configuration and validation.

use std::error::Error;
use std::fmt;

// ── TrackingActions ────────────────────────────────────────────────

/// Which object classes the tracker computes.
///
/// PERM membership is always maintained internally because DIED
/// detection depends on it; `perm` only controls whether end positions
/// are back-filled at window end.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TrackingActions {
    /// Back-fill end address and index of PERM objects.
    pub perm: bool,
    /// Collect BORN objects at window end.
    pub born: bool,
    /// Record the ages of DIED objects. DIED counts are kept regardless.
    pub died: bool,
    /// Record the ages of TEMP objects. TEMP counts are kept regardless.
    pub temp: bool,
}

impl TrackingActions {
    /// Every class tracked.
    pub const ALL: TrackingActions = TrackingActions {
        perm: true,
        born: true,
        died: true,
        temp: true,
    };

    /// Whether at least one class is tracked.
    pub fn any(&self) -> bool {
        self.perm || self.born || self.died || self.temp
    }
}

impl Default for TrackingActions {
    fn default() -> Self {
        Self::ALL
    }
}

// ── WindowConfig ───────────────────────────────────────────────────

/// The time window the tracker classifies objects over.
///
/// The window opens at the first GC boundary whose time is at or after
/// `start_time` and closes at the first later boundary at or after
/// `end_time`. Times are in the trace's milliseconds.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WindowConfig {
    /// Earliest boundary time that may open the window. Default: 0.
    pub start_time: i64,
    /// Earliest boundary time that closes the window. Default: `i64::MAX`
    /// (the window stays open until [`finish`](crate::EvolutionTracker::finish)).
    pub end_time: i64,
    /// Classes to compute. Default: all.
    pub actions: TrackingActions,
}

impl WindowConfig {
    /// A window over `[start_time, end_time]` tracking every class.
    pub fn new(start_time: i64, end_time: i64) -> Self {
        Self {
            start_time,
            end_time,
            actions: TrackingActions::ALL,
        }
    }

    /// Check the configuration for invalid values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.start_time > self.end_time {
            return Err(ConfigError::InvertedWindow {
                start: self.start_time,
                end: self.end_time,
            });
        }
        if !self.actions.any() {
            return Err(ConfigError::NoActions);
        }
        Ok(())
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self::new(0, i64::MAX)
    }
}

// ── ConfigError ────────────────────────────────────────────────────

/// Errors detected by [`WindowConfig::validate`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// The window ends before it starts.
    InvertedWindow {
        /// Configured start time.
        start: i64,
        /// Configured end time.
        end: i64,
    },
    /// Every tracking action is disabled.
    NoActions,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvertedWindow { start, end } => {
                write!(f, "window start {start} is after window end {end}")
            }
            Self::NoActions => write!(f, "no tracking action enabled"),
        }
    }
}

impl Error for ConfigError {}
