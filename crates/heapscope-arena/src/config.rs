//! Arena configuration parameters.

use std::fmt;

/// Configuration for labs and heap snapshots.
///
/// Controls how much record storage a new lab reserves up front and the
/// object alignment used when padding sizes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArenaConfig {
    /// Expected object size in bytes, used to estimate how many records
    /// a fixed-capacity lab will hold.
    ///
    /// Default: 32. Must be non-zero.
    pub average_object_size: u32,

    /// Minimum number of record slots reserved for a new lab.
    ///
    /// Default: 4.
    pub min_initial_slots: usize,

    /// Object alignment in bytes. Must be a power of two.
    ///
    /// Default: 8.
    pub heap_word_size: u32,
}

impl ArenaConfig {
    /// Default expected object size.
    pub const DEFAULT_AVERAGE_OBJECT_SIZE: u32 = 32;

    /// Default minimum slot reservation.
    pub const DEFAULT_MIN_INITIAL_SLOTS: usize = 4;

    /// Default object alignment.
    pub const DEFAULT_HEAP_WORD_SIZE: u32 = 8;

    /// Record slots to reserve for a lab of `capacity` bytes.
    pub fn initial_slots(&self, capacity: Option<u64>) -> usize {
        let estimate = capacity
            .map(|c| (c / u64::from(self.average_object_size.max(1))) as usize)
            .unwrap_or(0);
        estimate.max(self.min_initial_slots)
    }

    /// Check the configuration for invalid values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.average_object_size == 0 {
            return Err(ConfigError::ZeroAverageObjectSize);
        }
        if !self.heap_word_size.is_power_of_two() {
            return Err(ConfigError::InvalidHeapWordSize {
                value: self.heap_word_size,
            });
        }
        Ok(())
    }
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            average_object_size: Self::DEFAULT_AVERAGE_OBJECT_SIZE,
            min_initial_slots: Self::DEFAULT_MIN_INITIAL_SLOTS,
            heap_word_size: Self::DEFAULT_HEAP_WORD_SIZE,
        }
    }
}

/// Errors detected by [`ArenaConfig::validate`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// `average_object_size` is zero.
    ZeroAverageObjectSize,
    /// `heap_word_size` is not a power of two.
    InvalidHeapWordSize {
        /// The rejected value.
        value: u32,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroAverageObjectSize => write!(f, "average object size must be non-zero"),
            Self::InvalidHeapWordSize { value } => {
                write!(f, "heap word size {value} is not a power of two")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        assert_eq!(ArenaConfig::default().validate(), Ok(()));
    }

    #[test]
    fn initial_slots_scale_with_capacity() {
        let config = ArenaConfig::default();
        assert_eq!(config.initial_slots(None), 4);
        assert_eq!(config.initial_slots(Some(64)), 4);
        assert_eq!(config.initial_slots(Some(32 * 100)), 100);
    }

    #[test]
    fn rejects_bad_word_size() {
        let config = ArenaConfig {
            heap_word_size: 12,
            ..ArenaConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidHeapWordSize { value: 12 })
        );
    }
}
