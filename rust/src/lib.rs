//! Scheduling engine for construction-style projects.
//!
//! Builds a validated dependency graph from operation and resource rows and
//! computes schedules with four engines: unconstrained CPM, resource-
//! constrained CPM, the Serial Schedule Generation Scheme, and a localized
//! SSGS that re-plans a subset of operations around a fixed baseline. Every
//! engine re-validates its own output before returning it.
//!
//! Python bindings live behind the `python` feature.

// Allow clippy warning triggered by PyO3 macro expansion
#![cfg_attr(feature = "python", allow(clippy::useless_conversion))]

mod config;
mod cpm;
mod error;
mod graph;
mod interner;
pub mod logging;
mod models;
mod priority;
#[cfg(feature = "python")]
mod python;
mod rcpm;
mod resource_profile;
mod ssgs;
mod validation;

pub use config::EngineConfig;
pub use cpm::{analyze, cpm, CpmAnalysis};
pub use error::{GraphError, PrecedenceViolation, ResourceOverCommit, ScheduleError};
pub use graph::{ProjectGraph, ResourcePool};
pub use interner::OpId;
pub use models::{
    CalendarEntry, OperationRecord, OperationTiming, ResourceRecord, Schedule, ScheduledOperation,
    Time,
};
pub use priority::PriorityRule;
pub use rcpm::rcpm;
pub use resource_profile::ResourceProfile;
pub use ssgs::{local_ssgs, ssgs, LocalReschedule};
pub use validation::{check_precedence, check_resource_conflicts};
