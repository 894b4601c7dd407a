//! Configuration for the scheduling engines.

use crate::priority::PriorityRule;

/// Knobs shared by RCPM, SSGS and local SSGS.
///
/// The engines hold no process-wide state; callers pass this by reference.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EngineConfig {
    /// Verbosity level: 0=silent, 1=changes, 2=checks, 3=debug.
    pub verbosity: u8,
    /// Order in which SSGS places operations.
    pub priority_rule: PriorityRule,
}

impl EngineConfig {
    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    pub fn with_priority_rule(mut self, priority_rule: PriorityRule) -> Self {
        self.priority_rule = priority_rule;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.verbosity, 0);
        assert_eq!(config.priority_rule, PriorityRule::EarliestStart);
    }

    #[test]
    fn test_builder() {
        let config = EngineConfig::default()
            .with_verbosity(2)
            .with_priority_rule(PriorityRule::MinSlack);
        assert_eq!(config.verbosity, 2);
        assert_eq!(config.priority_rule, PriorityRule::MinSlack);
    }
}
