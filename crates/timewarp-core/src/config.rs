//! Configuration for a Time Warp run
//!
//! Read once before the LPs start; nothing here changes while the simulation
//! runs.

use serde::{Deserialize, Serialize};

use crate::channel::DEFAULT_MAILBOX_CAPACITY;
use crate::error::{TimeWarpError, TimeWarpResult};
use crate::heap::DEFAULT_HEAP_CAPACITY;
use crate::time::VirtualTime;

/// Log length above which an LP asks for a new GVT round.
pub const DEFAULT_GVT_THRESHOLD: usize = 500;

//-----------------------------------------------------------------------------
// Configuration Structures
//-----------------------------------------------------------------------------

/// Kernel configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Number of logical processes (one task each)
    pub lp_count: usize,
    /// Events at or after this time are never processed
    pub end_time: VirtualTime,
    /// History length that triggers a GVT round
    pub gvt_threshold: usize,
    /// Packets each mailbox can hold
    pub mailbox_capacity: usize,
    /// Distinct timestamps each event heap can hold
    pub heap_capacity: usize,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            lp_count: 1,
            end_time: VirtualTime::new(1_000),
            gvt_threshold: DEFAULT_GVT_THRESHOLD,
            mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
            heap_capacity: DEFAULT_HEAP_CAPACITY,
        }
    }
}

impl SimulationConfig {
    pub fn new(lp_count: usize, end_time: impl Into<VirtualTime>) -> Self {
        Self {
            lp_count,
            end_time: end_time.into(),
            ..Self::default()
        }
    }

    pub fn with_gvt_threshold(mut self, threshold: usize) -> Self {
        self.gvt_threshold = threshold;
        self
    }

    pub fn with_mailbox_capacity(mut self, capacity: usize) -> Self {
        self.mailbox_capacity = capacity;
        self
    }

    pub fn with_heap_capacity(mut self, capacity: usize) -> Self {
        self.heap_capacity = capacity;
        self
    }

    /// Reject settings the kernel cannot run with
    pub fn validate(&self) -> TimeWarpResult<()> {
        if self.lp_count == 0 {
            return Err(TimeWarpError::Configuration(
                "at least one LP is required".to_string(),
            ));
        }
        if self.lp_count > u32::MAX as usize {
            return Err(TimeWarpError::Configuration(format!(
                "too many LPs: {}",
                self.lp_count
            )));
        }
        if self.end_time <= VirtualTime::ZERO {
            return Err(TimeWarpError::Configuration(format!(
                "end time must be positive, got {}",
                self.end_time
            )));
        }
        if self.gvt_threshold == 0 {
            return Err(TimeWarpError::Configuration(
                "GVT threshold must be positive".to_string(),
            ));
        }
        if self.mailbox_capacity == 0 || self.heap_capacity == 0 {
            return Err(TimeWarpError::Configuration(
                "mailbox and heap capacities must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(SimulationConfig::default().validate().is_ok());
        assert!(SimulationConfig::new(4, 10).validate().is_ok());
    }

    #[test]
    fn test_invalid_settings_are_rejected() {
        assert!(SimulationConfig::new(0, 10).validate().is_err());
        assert!(SimulationConfig::new(2, 0).validate().is_err());
        assert!(SimulationConfig::new(2, 10).with_gvt_threshold(0).validate().is_err());
        assert!(SimulationConfig::new(2, 10).with_mailbox_capacity(0).validate().is_err());
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: SimulationConfig =
            serde_json::from_str(r#"{ "lp_count": 3, "end_time": 250 }"#).unwrap();
        assert_eq!(config.lp_count, 3);
        assert_eq!(config.end_time, VirtualTime::new(250));
        assert_eq!(config.gvt_threshold, DEFAULT_GVT_THRESHOLD);
        assert_eq!(config.mailbox_capacity, DEFAULT_MAILBOX_CAPACITY);
    }
}
