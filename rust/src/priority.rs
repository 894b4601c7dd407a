//! Priority rules that order operations for serial schedule generation.
//!
//! Every rule ranks on a CPM-derived value and breaks ties by lowest
//! operation code, so a rule always yields one fixed order.

use std::fmt;
use std::str::FromStr;

use crate::error::ScheduleError;
use crate::interner::OpId;
use crate::models::{OperationTiming, Time};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PriorityRule {
    /// Non-decreasing CPM earliest start.
    #[default]
    EarliestStart,
    /// Non-decreasing CPM latest start.
    LatestStart,
    /// Least CPM slack first.
    MinSlack,
}

impl PriorityRule {
    /// Sort key for one operation; lower is scheduled first.
    pub fn key(self, id: OpId, timing: &OperationTiming) -> (Time, OpId) {
        let value = match self {
            Self::EarliestStart => timing.earliest_start,
            Self::LatestStart => timing.latest_start,
            Self::MinSlack => timing.slack,
        };
        (value, id)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::EarliestStart => "earliest_start",
            Self::LatestStart => "latest_start",
            Self::MinSlack => "min_slack",
        }
    }
}

impl FromStr for PriorityRule {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "earliest_start" => Ok(Self::EarliestStart),
            "latest_start" => Ok(Self::LatestStart),
            "min_slack" => Ok(Self::MinSlack),
            _ => Err(ScheduleError::UnknownPriorityRule(s.to_string())),
        }
    }
}

impl fmt::Display for PriorityRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
