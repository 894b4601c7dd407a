//! Resource-constrained CPM.
//!
//! Starts from the CPM earliest-start schedule and resolves over-commitment
//! one conflict at a time: at the earliest over-committed instant the active
//! operation with the most room (latest CPM latest-start, ties to the higher
//! code) yields until the first competitor releases the resource. That
//! competitor becomes its anchor. Whenever an operation moves, its
//! successors and the operations anchored to it are pushed forward behind
//! it, so every start stays 0, a predecessor's finish or an anchor's finish.

use crate::config::EngineConfig;
use crate::cpm::{analyze, assemble_schedule, backward_pass, CpmAnalysis};
use crate::error::ScheduleError;
use crate::graph::{ProjectGraph, ResourcePool};
use crate::interner::OpId;
use crate::models::{Schedule, Time};
use crate::validation::{earliest_conflict, post_validate, Conflict, PrecedenceScope};
use crate::{log_changes, log_checks, log_debug};

/// Resource-feasible schedule derived from CPM by serializing conflicts.
///
/// Fails with `EmptyProject`, `UnknownResource` or `DemandExceedsCapacity`
/// on bad input, and with `InfeasibleScheduleProduced` if its own result
/// fails validation.
pub fn rcpm(
    graph: &ProjectGraph,
    pool: &ResourcePool,
    config: &EngineConfig,
) -> Result<Schedule, ScheduleError> {
    let analysis = analyze(graph)?;
    graph.check_demands(pool)?;

    let verbosity = config.verbosity;
    let n = graph.len();
    let mut starts: Vec<Time> = analysis
        .timings()
        .iter()
        .map(|t| t.earliest_start)
        .collect();

    // anchored[x]: operations delayed until x releases a resource
    let mut anchored: Vec<Vec<OpId>> = vec![Vec::new(); n];
    let mut anchors: Vec<(OpId, OpId)> = Vec::new();

    // Starts only grow, and operations finishing before the earliest
    // conflict are never moved again. The budget is a backstop; an
    // unresolved conflict left behind by it fails post-validation.
    let budget = n.saturating_mul(n).saturating_mul(n + 1);
    let mut iterations = 0usize;

    while let Some(conflict) = earliest_conflict(graph, &intervals(graph, &starts), pool) {
        if iterations == budget {
            log_changes!(
                verbosity,
                "RCPM stopped after {} iterations with {} still over-committed",
                iterations,
                conflict.resource
            );
            break;
        }
        iterations += 1;

        log_checks!(
            verbosity,
            "Conflict on {} at {}: {} demanded, capacity {}",
            conflict.resource,
            conflict.instant,
            conflict.demanded,
            conflict.capacity
        );

        let Some((victim, anchor)) = pick_yielding(graph, &analysis, &starts, &conflict) else {
            break;
        };
        let release = starts[anchor as usize] + graph.duration(anchor);

        log_changes!(
            verbosity,
            "Delay {} from {} to {} behind {}",
            graph.code(victim),
            starts[victim as usize],
            release,
            graph.code(anchor)
        );
        starts[victim as usize] = release;
        if !anchored[anchor as usize].contains(&victim) {
            anchored[anchor as usize].push(victim);
            anchors.push((anchor, victim));
        }
        push_dependents(graph, &anchored, &mut starts, victim, verbosity);
    }

    let times = finish_times(graph, &starts);
    let timed: Vec<Option<(Time, Time)>> = times.iter().copied().map(Some).collect();
    post_validate(graph, &timed, pool, PrecedenceScope::All)?;

    let backward = backward_pass(graph, &times, true, &anchors, verbosity);
    log_changes!(
        verbosity,
        "RCPM finished: duration {} (CPM {}), {} delays",
        backward.duration,
        analysis.duration(),
        iterations
    );

    Ok(assemble_schedule(
        graph,
        &times,
        &backward.slack,
        &backward.critical_path,
        backward.duration,
    ))
}

/// The operation that yields at a conflict and the competitor it waits for.
///
/// The anchor is the other active operation finishing first, ties to the
/// lower code. Returns `None` only when fewer than two operations are
/// active, which cannot over-commit once demands are checked against
/// capacity.
fn pick_yielding(
    graph: &ProjectGraph,
    analysis: &CpmAnalysis,
    starts: &[Time],
    conflict: &Conflict,
) -> Option<(OpId, OpId)> {
    let victim = conflict
        .active
        .iter()
        .copied()
        .max_by_key(|&id| (analysis.timing(id).latest_start, id))?;

    let anchor = conflict
        .active
        .iter()
        .copied()
        .filter(|&id| id != victim)
        .min_by_key(|&id| (starts[id as usize] + graph.duration(id), id))?;

    Some((victim, anchor))
}

/// Push everything that must follow `moved` to no earlier than its finish.
///
/// Follows successor edges and anchor edges. Both point from an earlier
/// finish to a later start, so the walk cannot revisit a cycle. Starts are
/// only ever pushed later, never pulled back.
fn push_dependents(
    graph: &ProjectGraph,
    anchored: &[Vec<OpId>],
    starts: &mut [Time],
    moved: OpId,
    verbosity: u8,
) {
    let mut stack = vec![moved];
    while let Some(id) = stack.pop() {
        let finish = starts[id as usize] + graph.duration(id);
        for &next in graph.successors(id).iter().chain(&anchored[id as usize]) {
            if starts[next as usize] < finish {
                log_debug!(
                    verbosity,
                    "Push {} from {} to {}",
                    graph.code(next),
                    starts[next as usize],
                    finish
                );
                starts[next as usize] = finish;
                stack.push(next);
            }
        }
    }
}

fn finish_times(graph: &ProjectGraph, starts: &[Time]) -> Vec<(Time, Time)> {
    graph
        .ids()
        .map(|id| {
            let start = starts[id as usize];
            (start, start + graph.duration(id))
        })
        .collect()
}

fn intervals(graph: &ProjectGraph, starts: &[Time]) -> Vec<Option<(Time, Time)>> {
    finish_times(graph, starts).into_iter().map(Some).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpm::cpm;
    use crate::models::{OperationRecord, ResourceRecord};
    use crate::validation::{check_precedence, check_resource_conflicts};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn pool(resources: &[(&str, i64)]) -> ResourcePool {
        let records: Vec<ResourceRecord> = resources
            .iter()
            .map(|&(code, capacity)| ResourceRecord::new(code, capacity))
            .collect();
        ResourcePool::from_records(&records).unwrap()
    }

    fn run(records: &[OperationRecord], resources: &[(&str, i64)]) -> Schedule {
        let graph = ProjectGraph::build(records).unwrap();
        rcpm(&graph, &pool(resources), &EngineConfig::default()).unwrap()
    }

    #[test]
    fn test_parallel_pair_serialized() {
        let records = [
            OperationRecord::new("A", 4).demands("R", 5),
            OperationRecord::new("B", 4).demands("R", 5),
        ];
        let graph = ProjectGraph::build(&records).unwrap();
        assert_eq!(cpm(&graph).unwrap().duration, 4);

        let schedule = run(&records, &[("R", 8)]);
        assert_eq!(schedule.duration, 8);
        // Equal slack, so the higher code yields
        assert_eq!(schedule.start_of("A"), Some(0));
        assert_eq!(schedule.start_of("B"), Some(4));
        assert_eq!(schedule.critical_path, vec!["A", "B"]);
    }

    #[test]
    fn test_no_conflict_keeps_cpm_schedule() {
        let records = [
            OperationRecord::new("A", 4).demands("R", 4),
            OperationRecord::new("B", 4).demands("R", 4),
            OperationRecord::new("C", 2).after(["A"]),
        ];
        let graph = ProjectGraph::build(&records).unwrap();
        let baseline = cpm(&graph).unwrap();
        let schedule = run(&records, &[("R", 8)]);
        assert_eq!(schedule.entries, baseline.entries);
        assert_eq!(schedule.duration, 6);
    }

    #[test]
    fn test_operation_with_more_slack_yields() {
        // A has 2 units of slack via the short sink; B feeds C and has none
        let schedule = run(
            &[
                OperationRecord::new("A", 4).demands("R", 5),
                OperationRecord::new("B", 4).demands("R", 5),
                OperationRecord::new("C", 2).after(["B"]),
            ],
            &[("R", 8)],
        );
        assert_eq!(schedule.start_of("B"), Some(0));
        assert_eq!(schedule.start_of("A"), Some(4));
        assert_eq!(schedule.start_of("C"), Some(4));
        assert_eq!(schedule.duration, 8);
    }

    #[test]
    fn test_descendants_follow_delayed_operation() {
        let schedule = run(
            &[
                OperationRecord::new("A", 4).demands("R", 5),
                OperationRecord::new("B", 4).demands("R", 5),
                OperationRecord::new("C", 5).after(["A"]),
                OperationRecord::new("D", 1).after(["B"]),
            ],
            &[("R", 8)],
        );
        assert_eq!(schedule.start_of("B"), Some(4));
        assert_eq!(schedule.start_of("D"), Some(8));
        assert_eq!(schedule.duration, 9);
        // Both chains are critical; the resource hand-over A -> B wins on code
        assert_eq!(schedule.critical_path, vec!["A", "B", "D"]);
    }

    #[test]
    fn test_three_way_contention_fully_serialized() {
        let schedule = run(
            &[
                OperationRecord::new("A", 2).demands("R", 1),
                OperationRecord::new("B", 3).demands("R", 1),
                OperationRecord::new("C", 4).demands("R", 1),
            ],
            &[("R", 1)],
        );
        assert_eq!(schedule.start_of("C"), Some(0));
        assert_eq!(schedule.start_of("B"), Some(4));
        assert_eq!(schedule.start_of("A"), Some(7));
        assert_eq!(schedule.duration, 9);
        assert_eq!(schedule.critical_path, vec!["C", "B", "A"]);
    }

    #[test]
    fn test_unknown_resource_rejected() {
        let graph = ProjectGraph::build(&[OperationRecord::new("A", 1).demands("R", 1)]).unwrap();
        let err = rcpm(&graph, &ResourcePool::default(), &EngineConfig::default()).unwrap_err();
        assert!(matches!(err, ScheduleError::UnknownResource { .. }));
    }

    #[test]
    fn test_empty_project() {
        let graph = ProjectGraph::build(&[]).unwrap();
        let err = rcpm(&graph, &ResourcePool::default(), &EngineConfig::default()).unwrap_err();
        assert_eq!(err, ScheduleError::EmptyProject);
    }

    #[test]
    fn test_random_projects_feasible_and_never_shorter() {
        let mut rng = StdRng::seed_from_u64(11);
        let resources = pool(&[("R", 3), ("S", 2)]);

        for _ in 0..300 {
            let n = rng.random_range(1..16);
            let records: Vec<OperationRecord> = (0..n)
                .map(|i| {
                    let preds: Vec<String> = (0..i)
                        .filter(|_| rng.random_bool(0.25))
                        .map(|j| format!("op{j}"))
                        .collect();
                    OperationRecord::new(format!("op{i}"), rng.random_range(0..5))
                        .after(preds)
                        .demands("R", rng.random_range(0..=3))
                        .demands("S", rng.random_range(0..=2))
                })
                .collect();
            let graph = ProjectGraph::build(&records).unwrap();

            let schedule = rcpm(&graph, &resources, &EngineConfig::default()).unwrap();
            assert!(check_precedence(&graph, &schedule).is_ok());
            assert!(check_resource_conflicts(&graph, &schedule, &resources).is_ok());
            assert!(schedule.duration >= cpm(&graph).unwrap().duration);

            assert_path_spans_project(&graph, &schedule);
        }
    }

    #[test]
    fn test_moved_anchor_drags_waiting_operations() {
        // C and D first wait for A, then A itself yields to B
        let records = [
            OperationRecord::new("A", 2).demands("R", 2),
            OperationRecord::new("B", 3).demands("R", 2),
            OperationRecord::new("C", 2).demands("R", 1),
            OperationRecord::new("D", 2).demands("R", 1),
        ];
        let graph = ProjectGraph::build(&records).unwrap();
        let resources = pool(&[("R", 3)]);
        let schedule = rcpm(&graph, &resources, &EngineConfig::default()).unwrap();

        assert_eq!(schedule.start_of("B"), Some(0));
        assert_eq!(schedule.start_of("A"), Some(3));
        assert_eq!(schedule.start_of("C"), Some(5));
        assert_eq!(schedule.start_of("D"), Some(5));
        assert_eq!(schedule.duration, 7);
        assert_eq!(schedule.critical_path, vec!["B", "A", "C"]);
        assert!(check_resource_conflicts(&graph, &schedule, &resources).is_ok());
        assert_path_spans_project(&graph, &schedule);
    }

    /// The critical path is a gapless chain from a source at 0 to the
    /// project finish.
    fn assert_path_spans_project(graph: &ProjectGraph, schedule: &Schedule) {
        let path: Vec<_> = schedule
            .critical_path
            .iter()
            .map(|code| *schedule.get(code).unwrap())
            .collect();
        assert!(!path.is_empty());

        let first = graph.id(&schedule.critical_path[0]).unwrap();
        assert!(graph.predecessors(first).is_empty());
        assert_eq!(path[0].start, 0);
        assert_eq!(path[path.len() - 1].finish, schedule.duration);
        for pair in path.windows(2) {
            assert_eq!(pair[0].finish, pair[1].start);
        }
        for entry in &path {
            assert!(entry.is_critical());
        }

        let length: Time = path.iter().map(|e| e.finish - e.start).sum();
        assert_eq!(length, schedule.duration);
    }
}
