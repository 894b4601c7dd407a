//! Serial Schedule Generation Scheme, whole-project and localized.
//!
//! Operations are placed one at a time in priority order and never
//! revisited. Each goes to the earliest instant at or after its precedence
//! bound where every resource it demands has room for its whole duration.
//! Usage only drops when a reservation ends, so the candidate instants are
//! the bound itself and the release times of the resources involved.

use rustc_hash::FxHashMap;
use std::cmp::Reverse;
use std::collections::BinaryHeap;

use crate::config::EngineConfig;
use crate::cpm::{analyze, assemble_schedule, backward_pass, CpmAnalysis};
use crate::error::{PrecedenceViolation, ScheduleError};
use crate::graph::{ProjectGraph, ResourcePool};
use crate::interner::OpId;
use crate::models::{Schedule, Time};
use crate::resource_profile::ResourceProfile;
use crate::validation::{
    post_validate, precedence_violations, resource_over_commits, PrecedenceScope,
};
use crate::{log_changes, log_checks};

/// Result of a localized reschedule.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalReschedule {
    /// Full schedule: rescheduled operations plus the untouched ones.
    pub schedule: Schedule,
    /// Max finish over all operations.
    pub duration: Time,
    /// Every precedence violation in `schedule`. Only non-empty when
    /// precedence was not enforced, or when a rescheduled operation now
    /// finishes after a fixed successor starts.
    pub precedence_violations: Vec<PrecedenceViolation>,
}

impl LocalReschedule {
    pub fn violates_precedence(&self) -> bool {
        !self.precedence_violations.is_empty()
    }
}

/// Build a resource-feasible schedule with the serial heuristic.
///
/// Not guaranteed to be duration-minimal, always feasible.
pub fn ssgs(
    graph: &ProjectGraph,
    pool: &ResourcePool,
    config: &EngineConfig,
) -> Result<Schedule, ScheduleError> {
    let analysis = analyze(graph)?;
    graph.check_demands(pool)?;

    let selected = vec![true; graph.len()];
    let mut placement = Placement::new(graph, pool, config.verbosity);
    placement.serial_pass(&analysis, config, &selected, true);

    let times = placement.times;
    let timed: Vec<Option<(Time, Time)>> = times.iter().copied().map(Some).collect();
    post_validate(graph, &timed, pool, PrecedenceScope::All)?;

    let backward = backward_pass(graph, &times, true, &[], config.verbosity);
    log_changes!(
        config.verbosity,
        "SSGS ({}) finished: duration {} (CPM {})",
        config.priority_rule,
        backward.duration,
        analysis.duration()
    );

    Ok(assemble_schedule(
        graph,
        &times,
        &backward.slack,
        &backward.critical_path,
        backward.duration,
    ))
}

/// Reschedule only `selected`, holding every other operation at its time in
/// `baseline`.
///
/// Fixed operations act as obstacles for resources and, when
/// `enforce_precedence` is set, as predecessor bounds. With it unset the
/// selected operations may start at 0 regardless of predecessors; any
/// resulting violations are returned in `precedence_violations`.
pub fn local_ssgs<S: AsRef<str>>(
    graph: &ProjectGraph,
    pool: &ResourcePool,
    baseline: &Schedule,
    selected: &[S],
    enforce_precedence: bool,
    config: &EngineConfig,
) -> Result<LocalReschedule, ScheduleError> {
    let analysis = analyze(graph)?;
    graph.check_demands(pool)?;

    let mut mask = vec![false; graph.len()];
    for code in selected {
        let code = code.as_ref();
        let id = graph
            .id(code)
            .ok_or_else(|| ScheduleError::UnknownOperation(code.to_string()))?;
        mask[id as usize] = true;
    }

    let mut fixed: Vec<Option<(Time, Time)>> = vec![None; graph.len()];
    for id in graph.ids().filter(|&id| !mask[id as usize]) {
        let entry = baseline
            .get(graph.code(id))
            .ok_or_else(|| ScheduleError::MissingBaseline(graph.code(id).to_string()))?;
        fixed[id as usize] = Some((entry.start, entry.finish));
    }

    let over_commits = resource_over_commits(graph, &fixed, pool);
    if !over_commits.is_empty() {
        return Err(ScheduleError::InfeasibleBaseline(over_commits));
    }

    let mut placement = Placement::new(graph, pool, config.verbosity);
    for id in graph.ids() {
        if let Some((start, finish)) = fixed[id as usize] {
            placement.hold(id, start, finish);
        }
    }
    placement.serial_pass(&analysis, config, &mask, enforce_precedence);

    let times = placement.times;
    let timed: Vec<Option<(Time, Time)>> = times.iter().copied().map(Some).collect();
    let scope = if enforce_precedence {
        PrecedenceScope::Selected(&mask)
    } else {
        PrecedenceScope::None
    };
    post_validate(graph, &timed, pool, scope)?;

    let violations = precedence_violations(graph, &timed);
    for violation in &violations {
        log_changes!(config.verbosity, "Precedence violated: {}", violation);
    }

    let backward = backward_pass(graph, &times, true, &[], config.verbosity);
    log_changes!(
        config.verbosity,
        "Local SSGS rescheduled {} operations: duration {}",
        mask.iter().filter(|&&m| m).count(),
        backward.duration
    );

    Ok(LocalReschedule {
        schedule: assemble_schedule(
            graph,
            &times,
            &backward.slack,
            &backward.critical_path,
            backward.duration,
        ),
        duration: backward.duration,
        precedence_violations: violations,
    })
}

/// Working state of one serial pass: a profile per resource plus the
/// interval of every operation fixed or placed so far.
struct Placement<'a> {
    graph: &'a ProjectGraph,
    profiles: FxHashMap<&'a str, ResourceProfile>,
    times: Vec<(Time, Time)>,
    verbosity: u8,
}

impl<'a> Placement<'a> {
    fn new(graph: &'a ProjectGraph, pool: &'a ResourcePool, verbosity: u8) -> Self {
        let profiles = pool
            .iter()
            .map(|(code, capacity)| (code, ResourceProfile::new(code.to_string(), capacity)))
            .collect();
        Self {
            graph,
            profiles,
            times: vec![(0, 0); graph.len()],
            verbosity,
        }
    }

    /// Pin an operation to `[start, finish)` and reserve its demands.
    fn hold(&mut self, id: OpId, start: Time, finish: Time) {
        self.times[id as usize] = (start, finish);
        for (resource, quantity) in self.graph.demands(id) {
            if let Some(profile) = self.profiles.get_mut(resource.as_str()) {
                profile.reserve(start, finish, *quantity);
            }
        }
    }

    /// Place every selected operation in priority order.
    ///
    /// With `enforce_precedence`, an operation becomes eligible once its
    /// selected predecessors are placed and starts no earlier than every
    /// predecessor's finish. Without it, operations go in plain priority
    /// order with a lower bound of 0.
    fn serial_pass(
        &mut self,
        analysis: &CpmAnalysis,
        config: &EngineConfig,
        selected: &[bool],
        enforce_precedence: bool,
    ) {
        let graph = self.graph;
        let rule = config.priority_rule;
        let key = |id: OpId| rule.key(id, analysis.timing(id));

        if !enforce_precedence {
            let mut order: Vec<OpId> = graph.ids().filter(|&id| selected[id as usize]).collect();
            order.sort_unstable_by_key(|&id| key(id));
            for id in order {
                self.place(id, 0);
            }
            return;
        }

        let mut waiting: Vec<usize> = graph
            .ids()
            .map(|id| {
                graph
                    .predecessors(id)
                    .iter()
                    .filter(|&&p| selected[p as usize])
                    .count()
            })
            .collect();

        let mut eligible: BinaryHeap<Reverse<((Time, OpId), OpId)>> = graph
            .ids()
            .filter(|&id| selected[id as usize] && waiting[id as usize] == 0)
            .map(|id| Reverse((key(id), id)))
            .collect();

        while let Some(Reverse((_, id))) = eligible.pop() {
            let bound = graph
                .predecessors(id)
                .iter()
                .map(|&p| self.times[p as usize].1)
                .max()
                .unwrap_or(0);
            self.place(id, bound);

            for &succ in graph.successors(id) {
                if !selected[succ as usize] {
                    continue;
                }
                let count = &mut waiting[succ as usize];
                *count -= 1;
                if *count == 0 {
                    eligible.push(Reverse((key(succ), succ)));
                }
            }
        }
    }

    /// Put one operation at its earliest resource-feasible start at or
    /// after `bound`.
    fn place(&mut self, id: OpId, bound: Time) {
        let graph = self.graph;
        let duration = graph.duration(id);
        let demands = graph.demands(id);

        let mut candidates = vec![bound];
        for (resource, _) in demands {
            if let Some(profile) = self.profiles.get(resource.as_str()) {
                candidates.extend(profile.release_times_after(bound));
            }
        }
        candidates.sort_unstable();
        candidates.dedup();

        // Past the last release every profile is empty and, with demands
        // checked against capacity, the operation fits there.
        let last = candidates.last().copied().unwrap_or(bound);
        let start = candidates
            .into_iter()
            .find(|&t| {
                let blocked_on = demands.iter().find_map(|(resource, quantity)| {
                    let profile = self.profiles.get(resource.as_str())?;
                    (!profile.fits(t, duration, *quantity)).then_some(profile)
                });
                match blocked_on {
                    Some(profile) => {
                        log_checks!(
                            self.verbosity,
                            "{} at {}: blocked on {} (capacity {})",
                            graph.code(id),
                            t,
                            profile.resource_name,
                            profile.capacity
                        );
                        false
                    }
                    None => {
                        log_checks!(self.verbosity, "{} at {}: fits", graph.code(id), t);
                        true
                    }
                }
            })
            .unwrap_or(last);

        log_changes!(
            self.verbosity,
            "Place {} at [{}, {})",
            graph.code(id),
            start,
            start + duration
        );
        self.hold(id, start, start + duration);
    }
}
