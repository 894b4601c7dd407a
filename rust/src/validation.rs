//! Precedence and resource legality checks over a graph/schedule pair.
//!
//! Both validators are read-only and collect every finding rather than
//! stopping at the first. Engines run them on their own output before
//! returning (`post_validate`).

use crate::error::{PrecedenceViolation, ResourceOverCommit, ScheduleError};
use crate::graph::{ProjectGraph, ResourcePool};
use crate::interner::OpId;
use crate::models::{Schedule, Time};

/// `[start, finish)` per operation id; `None` when the schedule lacks it.
pub(crate) type Intervals = Vec<Option<(Time, Time)>>;

pub(crate) fn intervals_of(graph: &ProjectGraph, schedule: &Schedule) -> Intervals {
    graph
        .ids()
        .map(|id| schedule.get(graph.code(id)).map(|e| (e.start, e.finish)))
        .collect()
}

/// Check that no operation starts before all its predecessors finish.
///
/// Operations missing from the schedule are skipped. Violations are ordered
/// by (operation, predecessor) code.
pub fn check_precedence(
    graph: &ProjectGraph,
    schedule: &Schedule,
) -> Result<(), Vec<PrecedenceViolation>> {
    let violations = precedence_violations(graph, &intervals_of(graph, schedule));
    if violations.is_empty() {
        Ok(())
    } else {
        Err(violations)
    }
}

/// Check that no instant oversubscribes any resource.
///
/// Usage occupies `[start, finish)`, so back-to-back operations do not
/// overlap. Resources are checked independently, in code order. A demanded
/// resource missing from the pool counts as capacity 0.
pub fn check_resource_conflicts(
    graph: &ProjectGraph,
    schedule: &Schedule,
    pool: &ResourcePool,
) -> Result<(), Vec<ResourceOverCommit>> {
    let over_commits = resource_over_commits(graph, &intervals_of(graph, schedule), pool);
    if over_commits.is_empty() {
        Ok(())
    } else {
        Err(over_commits)
    }
}

pub(crate) fn precedence_violations(
    graph: &ProjectGraph,
    intervals: &[Option<(Time, Time)>],
) -> Vec<PrecedenceViolation> {
    let mut violations = Vec::new();
    for id in graph.ids() {
        let Some((start, _)) = intervals[id as usize] else {
            continue;
        };
        for &pred in graph.predecessors(id) {
            let Some((_, pred_finish)) = intervals[pred as usize] else {
                continue;
            };
            if start < pred_finish {
                violations.push(PrecedenceViolation {
                    operation: graph.code(id).to_string(),
                    predecessor: graph.code(pred).to_string(),
                    start,
                    predecessor_finish: pred_finish,
                });
            }
        }
    }
    violations
}

pub(crate) fn resource_over_commits(
    graph: &ProjectGraph,
    intervals: &[Option<(Time, Time)>],
    pool: &ResourcePool,
) -> Vec<ResourceOverCommit> {
    let mut over_commits = Vec::new();
    for resource in graph.demanded_resources() {
        let capacity = pool.capacity(resource).unwrap_or(0);
        let events = usage_events(graph, intervals, resource);
        sweep(&events, |instant, level| {
            if level > capacity {
                over_commits.push(ResourceOverCommit {
                    resource: resource.to_string(),
                    instant,
                    demanded: level,
                    capacity,
                });
            }
            true
        });
    }
    over_commits
}

/// Usage change events for one resource, sorted by time with releases
/// ahead of acquisitions at the same instant.
fn usage_events(
    graph: &ProjectGraph,
    intervals: &[Option<(Time, Time)>],
    resource: &str,
) -> Vec<(Time, i64)> {
    let mut events = Vec::new();
    for id in graph.ids() {
        let quantity = graph.demand_for(id, resource);
        if quantity == 0 {
            continue;
        }
        if let Some((start, finish)) = intervals[id as usize] {
            if start < finish {
                events.push((start, quantity));
                events.push((finish, -quantity));
            }
        }
    }
    events.sort_unstable();
    events
}

/// Walk sorted events, reporting the usage level holding from each distinct
/// instant onward. Stops early when `visit` returns false.
fn sweep(events: &[(Time, i64)], mut visit: impl FnMut(Time, i64) -> bool) {
    let mut level = 0;
    let mut i = 0;
    while i < events.len() {
        let instant = events[i].0;
        while i < events.len() && events[i].0 == instant {
            level += events[i].1;
            i += 1;
        }
        if !visit(instant, level) {
            return;
        }
    }
}

/// The first over-commit across all resources, with the operations holding
/// the resource at that instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Conflict {
    pub resource: String,
    pub instant: Time,
    pub demanded: i64,
    pub capacity: i64,
    /// Ascending ids.
    pub active: Vec<OpId>,
}

/// Find the earliest over-committed instant; ties go to the lowest resource
/// code.
pub(crate) fn earliest_conflict(
    graph: &ProjectGraph,
    intervals: &[Option<(Time, Time)>],
    pool: &ResourcePool,
) -> Option<Conflict> {
    let mut best: Option<(Time, i64, i64, &str)> = None;

    for resource in graph.demanded_resources() {
        let capacity = pool.capacity(resource).unwrap_or(0);
        let events = usage_events(graph, intervals, resource);
        let mut found = None;
        sweep(&events, |instant, level| {
            if level > capacity {
                found = Some((instant, level));
                false
            } else {
                true
            }
        });
        if let Some((instant, level)) = found {
            if best.map_or(true, |(t, _, _, _)| instant < t) {
                best = Some((instant, level, capacity, resource));
            }
        }
    }

    let (instant, demanded, capacity, resource) = best?;
    let active = graph
        .ids()
        .filter(|&id| graph.demand_for(id, resource) > 0)
        .filter(|&id| matches!(intervals[id as usize], Some((s, f)) if s <= instant && instant < f))
        .collect();

    Some(Conflict {
        resource: resource.to_string(),
        instant,
        demanded,
        capacity,
        active,
    })
}

/// Which precedence edges an engine promises to honour.
#[derive(Clone, Copy, Debug)]
pub(crate) enum PrecedenceScope<'a> {
    All,
    /// Only edges into operations flagged true.
    Selected(&'a [bool]),
    None,
}

/// Re-validate an engine's output before it leaves the engine.
///
/// Any finding here means the engine itself is broken, so it is reported as
/// `InfeasibleScheduleProduced` rather than as a user-facing violation.
pub(crate) fn post_validate(
    graph: &ProjectGraph,
    intervals: &[Option<(Time, Time)>],
    pool: &ResourcePool,
    scope: PrecedenceScope<'_>,
) -> Result<(), ScheduleError> {
    let precedence: Vec<PrecedenceViolation> = match scope {
        PrecedenceScope::All => precedence_violations(graph, intervals),
        PrecedenceScope::Selected(selected) => precedence_violations(graph, intervals)
            .into_iter()
            .filter(|v| {
                graph
                    .id(&v.operation)
                    .is_some_and(|id| selected[id as usize])
            })
            .collect(),
        PrecedenceScope::None => Vec::new(),
    };
    let resources = resource_over_commits(graph, intervals, pool);

    if precedence.is_empty() && resources.is_empty() {
        Ok(())
    } else {
        Err(ScheduleError::InfeasibleScheduleProduced {
            precedence,
            resources,
        })
    }
}
