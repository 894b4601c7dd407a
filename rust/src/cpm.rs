//! Critical Path Method: forward and backward passes over the precedence DAG.
//!
//! The backward pass here is written against concrete intervals rather than
//! against the forward pass alone, so RCPM and SSGS reuse it to recover
//! slack and the critical path of a resource-extended schedule.

use rustc_hash::FxHashMap;

use crate::error::ScheduleError;
use crate::graph::ProjectGraph;
use crate::interner::OpId;
use crate::log_debug;
use crate::models::{OperationTiming, Schedule, ScheduledOperation, Time};

/// Full CPM result: per-operation timing plus the critical path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CpmAnalysis {
    timings: Vec<OperationTiming>,
    critical_path: Vec<OpId>,
    duration: Time,
}

impl CpmAnalysis {
    /// Timing indexed by operation id.
    pub fn timings(&self) -> &[OperationTiming] {
        &self.timings
    }

    pub fn timing(&self, id: OpId) -> &OperationTiming {
        &self.timings[id as usize]
    }

    pub fn critical_path(&self) -> &[OpId] {
        &self.critical_path
    }

    pub fn duration(&self) -> Time {
        self.duration
    }

    /// The earliest-start schedule.
    pub fn to_schedule(&self, graph: &ProjectGraph) -> Schedule {
        let times: Vec<(Time, Time)> = self
            .timings
            .iter()
            .map(|t| (t.earliest_start, t.earliest_finish))
            .collect();
        let slack: Vec<Time> = self.timings.iter().map(|t| t.slack).collect();
        assemble_schedule(graph, &times, &slack, &self.critical_path, self.duration)
    }
}

/// Run both passes and keep every intermediate timing.
pub fn analyze(graph: &ProjectGraph) -> Result<CpmAnalysis, ScheduleError> {
    if graph.is_empty() {
        return Err(ScheduleError::EmptyProject);
    }

    let n = graph.len();
    let mut earliest_start: Vec<Time> = vec![0; n];
    let mut earliest_finish: Vec<Time> = vec![0; n];

    for &id in graph.topo_order() {
        let idx = id as usize;
        let start = graph
            .predecessors(id)
            .iter()
            .map(|&p| earliest_finish[p as usize])
            .max()
            .unwrap_or(0);
        earliest_start[idx] = start;
        earliest_finish[idx] = start + graph.duration(id);
    }

    let times: Vec<(Time, Time)> = earliest_start
        .iter()
        .zip(&earliest_finish)
        .map(|(&s, &f)| (s, f))
        .collect();
    let backward = backward_pass(graph, &times, false, &[], 0);

    let timings = (0..n)
        .map(|idx| OperationTiming {
            earliest_start: earliest_start[idx],
            earliest_finish: earliest_finish[idx],
            latest_start: backward.latest_start[idx],
            latest_finish: backward.latest_finish[idx],
            slack: backward.slack[idx],
        })
        .collect();

    Ok(CpmAnalysis {
        timings,
        critical_path: backward.critical_path,
        duration: backward.duration,
    })
}

/// Shortest project duration ignoring resource limits.
///
/// Returns the earliest-start schedule, its critical path and duration.
pub fn cpm(graph: &ProjectGraph) -> Result<Schedule, ScheduleError> {
    Ok(analyze(graph)?.to_schedule(graph))
}

/// Latest times, slack and critical path of a concrete schedule.
#[derive(Clone, Debug)]
pub(crate) struct BackwardPass {
    pub latest_start: Vec<Time>,
    pub latest_finish: Vec<Time>,
    pub slack: Vec<Time>,
    pub critical_path: Vec<OpId>,
    pub duration: Time,
}

/// Backward pass over a fully timed schedule.
///
/// Edges are the binding ones: precedence edges the schedule honours, plus,
/// with `resource_links`, X→Y whenever both have positive duration, share a
/// resource, and Y starts exactly when X finishes. `extra_links` adds
/// caller-known X→Y dependencies, kept when X has positive duration and Y
/// starts no earlier than X finishes. Every such edge has
/// `start(head) >= finish(tail)`, which keeps slack non-negative and lets
/// (start, topological rank) serve as a topological order.
pub(crate) fn backward_pass(
    graph: &ProjectGraph,
    times: &[(Time, Time)],
    resource_links: bool,
    extra_links: &[(OpId, OpId)],
    verbosity: u8,
) -> BackwardPass {
    let n = graph.len();
    let duration = times.iter().map(|&(_, f)| f).max().unwrap_or(0);

    let successors = binding_successors(graph, times, resource_links, extra_links);
    let mut predecessors: Vec<Vec<OpId>> = vec![Vec::new(); n];
    for (id, succs) in successors.iter().enumerate() {
        for &s in succs {
            predecessors[s as usize].push(id as OpId);
        }
    }

    let mut rank = vec![0usize; n];
    for (pos, &id) in graph.topo_order().iter().enumerate() {
        rank[id as usize] = pos;
    }
    let mut order: Vec<OpId> = graph.ids().collect();
    order.sort_unstable_by_key(|&id| (times[id as usize].0, rank[id as usize]));

    let mut latest_start = vec![0; n];
    let mut latest_finish = vec![0; n];
    let mut slack = vec![0; n];

    for &id in order.iter().rev() {
        let idx = id as usize;
        let (start, finish) = times[idx];
        let lf = successors[idx]
            .iter()
            .map(|&s| latest_start[s as usize])
            .min()
            .unwrap_or(duration);
        latest_finish[idx] = lf;
        latest_start[idx] = lf - (finish - start);
        slack[idx] = latest_start[idx] - start;
        log_debug!(
            verbosity,
            "backward {}: lf={} ls={} slack={}",
            graph.code(id),
            lf,
            latest_start[idx],
            slack[idx]
        );
    }

    let critical_path = trace_critical_path(times, &slack, &predecessors, &successors);

    BackwardPass {
        latest_start,
        latest_finish,
        slack,
        critical_path,
        duration,
    }
}

/// Binding successor lists, each sorted by id.
fn binding_successors(
    graph: &ProjectGraph,
    times: &[(Time, Time)],
    resource_links: bool,
    extra_links: &[(OpId, OpId)],
) -> Vec<Vec<OpId>> {
    let mut starts_at: FxHashMap<Time, Vec<OpId>> = FxHashMap::default();
    if resource_links {
        for id in graph.ids() {
            let (start, finish) = times[id as usize];
            if finish > start && !graph.demands(id).is_empty() {
                starts_at.entry(start).or_default().push(id);
            }
        }
    }

    let mut extra: Vec<Vec<OpId>> = vec![Vec::new(); graph.len()];
    for &(from, to) in extra_links {
        let (start, finish) = times[from as usize];
        if finish > start && times[to as usize].0 >= finish {
            extra[from as usize].push(to);
        }
    }

    graph
        .ids()
        .map(|id| {
            let (start, finish) = times[id as usize];
            let mut succs: Vec<OpId> = graph
                .successors(id)
                .iter()
                .copied()
                .filter(|&s| times[s as usize].0 >= finish)
                .collect();
            succs.extend_from_slice(&extra[id as usize]);

            if finish > start {
                if let Some(candidates) = starts_at.get(&finish) {
                    succs.extend(
                        candidates
                            .iter()
                            .copied()
                            .filter(|&y| y != id && graph.shares_resource(id, y)),
                    );
                }
            }

            succs.sort_unstable();
            succs.dedup();
            succs
        })
        .collect()
}

/// Follow zero-slack operations from the earliest critical entry point.
///
/// The entry point is the critical operation, lowest (start, code) first,
/// with no critical binding predecessor handing over at its start. Each
/// step takes the lowest-code critical successor starting when the current
/// operation finishes.
fn trace_critical_path(
    times: &[(Time, Time)],
    slack: &[Time],
    predecessors: &[Vec<OpId>],
    successors: &[Vec<OpId>],
) -> Vec<OpId> {
    let critical = |id: OpId| slack[id as usize] == 0;
    let hands_over = |from: OpId, to: OpId| times[from as usize].1 == times[to as usize].0;

    let entry = (0..times.len() as OpId)
        .filter(|&id| critical(id))
        .filter(|&id| {
            !predecessors[id as usize]
                .iter()
                .any(|&p| critical(p) && hands_over(p, id))
        })
        .min_by_key(|&id| (times[id as usize].0, id));

    let mut path = Vec::new();
    let mut current = entry;
    while let Some(id) = current {
        path.push(id);
        current = successors[id as usize]
            .iter()
            .copied()
            .find(|&s| critical(s) && hands_over(id, s));
    }
    path
}

/// Turn per-id vectors into a code-keyed schedule.
pub(crate) fn assemble_schedule(
    graph: &ProjectGraph,
    times: &[(Time, Time)],
    slack: &[Time],
    critical_path: &[OpId],
    duration: Time,
) -> Schedule {
    let entries = graph
        .ids()
        .map(|id| {
            let (start, finish) = times[id as usize];
            (
                graph.code(id).to_string(),
                ScheduledOperation {
                    start,
                    finish,
                    slack: slack[id as usize],
                },
            )
        })
        .collect();

    Schedule {
        entries,
        critical_path: critical_path
            .iter()
            .map(|&id| graph.code(id).to_string())
            .collect(),
        duration,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OperationRecord;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn op(code: &str, duration: Time, preds: &[&str]) -> OperationRecord {
        OperationRecord::new(code, duration).after(preds.iter().copied())
    }

    fn build(records: &[OperationRecord]) -> ProjectGraph {
        ProjectGraph::build(records).unwrap()
    }

    /// Random DAG: each operation may depend on any earlier one.
    fn random_records(rng: &mut StdRng, n: usize) -> Vec<OperationRecord> {
        (0..n)
            .map(|i| {
                let preds: Vec<String> = (0..i)
                    .filter(|_| rng.random_bool(0.3))
                    .map(|j| format!("op{j:02}"))
                    .collect();
                OperationRecord::new(format!("op{i:02}"), rng.random_range(0..6)).after(preds)
            })
            .collect()
    }

    /// Longest path by exhaustive enumeration from every source.
    fn brute_force_longest(graph: &ProjectGraph) -> Time {
        fn walk(graph: &ProjectGraph, id: OpId) -> Time {
            graph.duration(id)
                + graph
                    .successors(id)
                    .iter()
                    .map(|&s| walk(graph, s))
                    .max()
                    .unwrap_or(0)
        }
        graph
            .ids()
            .filter(|&id| graph.predecessors(id).is_empty())
            .map(|id| walk(graph, id))
            .max()
            .unwrap_or(0)
    }

    #[test]
    fn test_fork_example() {
        let graph = build(&[op("A", 3, &[]), op("B", 2, &["A"]), op("C", 4, &["A"])]);
        let schedule = cpm(&graph).unwrap();

        assert_eq!(schedule.duration, 7);
        assert_eq!(schedule.critical_path, vec!["A", "C"]);
        assert_eq!(schedule.get("B").unwrap().slack, 2);
        assert_eq!(schedule.start_of("B"), Some(3));
        assert_eq!(schedule.finish_of("C"), Some(7));
    }

    #[test]
    fn test_timings_of_fork() {
        let graph = build(&[op("A", 3, &[]), op("B", 2, &["A"]), op("C", 4, &["A"])]);
        let analysis = analyze(&graph).unwrap();
        let b = analysis.timing(graph.id("B").unwrap());

        assert_eq!(b.earliest_start, 3);
        assert_eq!(b.earliest_finish, 5);
        assert_eq!(b.latest_start, 5);
        assert_eq!(b.latest_finish, 7);
        assert!(!b.is_critical());
        assert!(analysis.timing(graph.id("A").unwrap()).is_critical());
    }

    #[test]
    fn test_empty_project() {
        let graph = build(&[]);
        assert_eq!(cpm(&graph).unwrap_err(), ScheduleError::EmptyProject);
    }

    #[test]
    fn test_tie_break_lowest_code_at_branch() {
        // S fans out to two equally long branches that rejoin at T
        let graph = build(&[
            op("S", 1, &[]),
            op("Y", 2, &["S"]),
            op("X", 2, &["S"]),
            op("T", 1, &["X", "Y"]),
        ]);
        let schedule = cpm(&graph).unwrap();
        assert_eq!(schedule.duration, 4);
        assert_eq!(schedule.critical_path, vec!["S", "X", "T"]);
        assert!(schedule.get("Y").unwrap().is_critical());
    }

    #[test]
    fn test_tie_break_lowest_code_among_sources() {
        let graph = build(&[op("B", 3, &[]), op("A", 3, &[]), op("C", 1, &[])]);
        let schedule = cpm(&graph).unwrap();
        assert_eq!(schedule.critical_path, vec!["A"]);
    }

    #[test]
    fn test_zero_duration_milestones_on_path() {
        let graph = build(&[
            op("start", 0, &[]),
            op("dig", 5, &["start"]),
            op("paint", 1, &["start"]),
            op("done", 0, &["dig", "paint"]),
        ]);
        let schedule = cpm(&graph).unwrap();
        assert_eq!(schedule.duration, 5);
        assert_eq!(schedule.critical_path, vec!["start", "dig", "done"]);
    }

    #[test]
    fn test_multiple_sinks() {
        let graph = build(&[op("A", 2, &[]), op("B", 5, &["A"]), op("C", 1, &["A"])]);
        let analysis = analyze(&graph).unwrap();
        let c = analysis.timing(graph.id("C").unwrap());
        // C is a sink, so its latest finish is the project duration
        assert_eq!(c.latest_finish, 7);
        assert_eq!(c.slack, 4);
    }

    #[test]
    fn test_idempotent() {
        let graph = build(&[
            op("S", 1, &[]),
            op("Y", 2, &["S"]),
            op("X", 2, &["S"]),
            op("T", 1, &["X", "Y"]),
        ]);
        assert_eq!(cpm(&graph).unwrap(), cpm(&graph).unwrap());
    }

    #[test]
    fn test_duration_is_longest_path_on_random_dags() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let n = rng.random_range(1..10);
            let graph = build(&random_records(&mut rng, n));
            let analysis = analyze(&graph).unwrap();

            assert_eq!(analysis.duration(), brute_force_longest(&graph));

            for timing in analysis.timings() {
                assert!(timing.earliest_start <= timing.latest_start);
                assert!(timing.earliest_finish <= timing.latest_finish);
                assert!(timing.slack >= 0);
            }

            // The path is a precedence chain of critical operations covering
            // the whole project
            let path = analysis.critical_path();
            assert!(!path.is_empty());
            assert!(graph.predecessors(path[0]).is_empty());
            assert!(graph.successors(path[path.len() - 1]).is_empty());
            for pair in path.windows(2) {
                assert!(graph.successors(pair[0]).contains(&pair[1]));
            }
            let length: Time = path.iter().map(|&id| graph.duration(id)).sum();
            assert_eq!(length, analysis.duration());
        }
    }
}
