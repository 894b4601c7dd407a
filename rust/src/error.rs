//! Error and violation types shared by the builder, validators and engines.

use std::fmt;
use thiserror::Error;

use crate::models::Time;

/// Errors raised while turning raw records into a project graph or pool.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("Duplicate operation code: {0}")]
    DuplicateOperation(String),
    #[error("Operation {operation} references unknown predecessor {predecessor}")]
    UnknownPredecessor {
        operation: String,
        predecessor: String,
    },
    #[error("Circular dependency detected: {}", .0.join(" -> "))]
    CycleDetected(Vec<String>),
    #[error("Operation {operation} has negative duration {duration}")]
    NegativeDuration { operation: String, duration: Time },
    #[error("Operation {operation} demands negative quantity {quantity} of {resource}")]
    NegativeDemand {
        operation: String,
        resource: String,
        quantity: i64,
    },
    #[error("Duplicate resource code: {0}")]
    DuplicateResource(String),
    #[error("Resource {resource} has negative capacity {capacity}")]
    NegativeCapacity { resource: String, capacity: i64 },
}

/// An operation that starts before one of its predecessors finishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrecedenceViolation {
    pub operation: String,
    pub predecessor: String,
    pub start: Time,
    pub predecessor_finish: Time,
}

impl fmt::Display for PrecedenceViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} starts at {} before predecessor {} finishes at {}",
            self.operation, self.start, self.predecessor, self.predecessor_finish
        )
    }
}

/// An instant at which concurrent demand for a resource exceeds its capacity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceOverCommit {
    pub resource: String,
    pub instant: Time,
    pub demanded: i64,
    pub capacity: i64,
}

impl fmt::Display for ResourceOverCommit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} over-committed at {}: {} demanded, capacity {}",
            self.resource, self.instant, self.demanded, self.capacity
        )
    }
}

/// Errors raised by the scheduling engines.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("Project has no operations to schedule")]
    EmptyProject,
    #[error("Unknown operation: {0}")]
    UnknownOperation(String),
    #[error("Operation {operation} demands unknown resource {resource}")]
    UnknownResource { operation: String, resource: String },
    #[error(
        "Operation {operation} demands {demand} of {resource}, which only has capacity {capacity}"
    )]
    DemandExceedsCapacity {
        operation: String,
        resource: String,
        demand: i64,
        capacity: i64,
    },
    #[error("Operation {0} is not selected and has no time in the baseline schedule")]
    MissingBaseline(String),
    #[error("Baseline schedule already over-commits resources: {}", join(.0))]
    InfeasibleBaseline(Vec<ResourceOverCommit>),
    #[error("Unknown priority rule: {0}")]
    UnknownPriorityRule(String),
    /// The engine's own output failed post-validation. Always a defect.
    #[error(
        "Engine produced an infeasible schedule ({} precedence, {} resource violations)",
        .precedence.len(),
        .resources.len()
    )]
    InfeasibleScheduleProduced {
        precedence: Vec<PrecedenceViolation>,
        resources: Vec<ResourceOverCommit>,
    },
}

fn join<T: fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
