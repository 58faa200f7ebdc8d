//! Cross-field checks that `validator` field attributes cannot express.

use crate::{ConfigError, TrackerConfig};

/// The table must start at or above its floor.
pub fn check_initial_size(config: &TrackerConfig) -> Result<(), ConfigError> {
    if config.initial_table_size < config.min_table_size {
        return Err(ConfigError::Invariant(format!(
            "initial_table_size ({}) is below min_table_size ({})",
            config.initial_table_size, config.min_table_size
        )));
    }
    Ok(())
}

/// Shrinking must need more free slots than one growth step adds, otherwise
/// an allocate/free pair at the boundary grows and shrinks the table forever.
pub fn check_hysteresis(config: &TrackerConfig) -> Result<(), ConfigError> {
    if config.shrink_step <= config.grow_step {
        return Err(ConfigError::Invariant(format!(
            "shrink_step ({}) must exceed grow_step ({})",
            config.shrink_step, config.grow_step
        )));
    }
    Ok(())
}
