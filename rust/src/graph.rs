//! Project graph construction and the resource pool.
//!
//! `ProjectGraph::build` turns raw operation records into an immutable DAG
//! with dense ids, adjacency in both directions, and a fixed topological
//! order. All later passes index into its arrays.

use rustc_hash::FxHashSet;
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap};

use crate::error::{GraphError, ScheduleError};
use crate::interner::{CodeInterner, OpId};
use crate::models::{OperationRecord, ResourceRecord, Time};

/// Validated precedence DAG over a project's operations.
#[derive(Debug, Clone)]
pub struct ProjectGraph {
    codes: CodeInterner,
    durations: Vec<Time>,
    /// Per operation, sorted by resource code, quantities > 0.
    demands: Vec<Vec<(String, i64)>>,
    predecessors: Vec<Vec<OpId>>,
    successors: Vec<Vec<OpId>>,
    topo_order: Vec<OpId>,
}

impl ProjectGraph {
    /// Build and validate the graph.
    ///
    /// Fails on duplicate codes, negative durations or demands, unknown
    /// predecessors, and cycles (including self-references).
    pub fn build(records: &[OperationRecord]) -> Result<Self, GraphError> {
        let mut seen: FxHashSet<&str> = FxHashSet::default();
        for record in records {
            if !seen.insert(record.code.as_str()) {
                return Err(GraphError::DuplicateOperation(record.code.clone()));
            }
            if record.duration < 0 {
                return Err(GraphError::NegativeDuration {
                    operation: record.code.clone(),
                    duration: record.duration,
                });
            }
            if let Some((resource, quantity)) = record.demands.iter().find(|(_, q)| *q < 0) {
                return Err(GraphError::NegativeDemand {
                    operation: record.code.clone(),
                    resource: resource.clone(),
                    quantity: *quantity,
                });
            }
        }

        let codes = CodeInterner::sorted(records.iter().map(|r| r.code.as_str()));
        let n = codes.len();

        let mut durations = vec![0; n];
        let mut demands = vec![Vec::new(); n];
        let mut predecessors: Vec<Vec<OpId>> = vec![Vec::new(); n];

        for record in records {
            let Some(id) = codes.get(&record.code) else {
                continue;
            };
            let idx = id as usize;
            durations[idx] = record.duration;
            demands[idx] = merge_demands(&record.demands);

            for pred in &record.predecessors {
                let pred_id = codes
                    .get(pred)
                    .ok_or_else(|| GraphError::UnknownPredecessor {
                        operation: record.code.clone(),
                        predecessor: pred.clone(),
                    })?;
                predecessors[idx].push(pred_id);
            }
            predecessors[idx].sort_unstable();
            predecessors[idx].dedup();
        }

        // Filled in id order, so every successor list comes out sorted
        let mut successors: Vec<Vec<OpId>> = vec![Vec::new(); n];
        for (id, preds) in predecessors.iter().enumerate() {
            for &pred in preds {
                successors[pred as usize].push(id as OpId);
            }
        }

        if let Some(cycle) = find_cycle(&successors) {
            return Err(GraphError::CycleDetected(
                cycle.into_iter().map(|id| codes.code(id).to_string()).collect(),
            ));
        }

        let topo_order = topological_sort(&predecessors, &successors);

        Ok(Self {
            codes,
            durations,
            demands,
            predecessors,
            successors,
            topo_order,
        })
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    pub fn id(&self, code: &str) -> Option<OpId> {
        self.codes.get(code)
    }

    pub fn code(&self, id: OpId) -> &str {
        self.codes.code(id)
    }

    /// All ids, in ascending code order.
    pub fn ids(&self) -> impl Iterator<Item = OpId> {
        self.codes.ids()
    }

    pub fn duration(&self, id: OpId) -> Time {
        self.durations[id as usize]
    }

    pub fn demands(&self, id: OpId) -> &[(String, i64)] {
        &self.demands[id as usize]
    }

    /// Quantity of `resource` held by the operation (0 when not demanded).
    pub fn demand_for(&self, id: OpId, resource: &str) -> i64 {
        self.demands[id as usize]
            .iter()
            .find(|(r, _)| r == resource)
            .map(|(_, q)| *q)
            .unwrap_or(0)
    }

    /// Whether two operations draw on at least one common resource.
    pub fn shares_resource(&self, a: OpId, b: OpId) -> bool {
        self.demands[a as usize]
            .iter()
            .any(|(r, _)| self.demand_for(b, r) > 0)
    }

    pub fn predecessors(&self, id: OpId) -> &[OpId] {
        &self.predecessors[id as usize]
    }

    pub fn successors(&self, id: OpId) -> &[OpId] {
        &self.successors[id as usize]
    }

    /// Topological order; among ready operations the lowest code comes first.
    pub fn topo_order(&self) -> &[OpId] {
        &self.topo_order
    }

    /// Sorted set of every resource code any operation demands.
    pub fn demanded_resources(&self) -> BTreeSet<&str> {
        self.demands
            .iter()
            .flat_map(|d| d.iter().map(|(r, _)| r.as_str()))
            .collect()
    }

    /// Check that every demand names a pooled resource and fits its capacity
    /// on its own. An operation failing this could never be placed.
    pub fn check_demands(&self, pool: &ResourcePool) -> Result<(), ScheduleError> {
        for id in self.ids() {
            for (resource, quantity) in self.demands(id) {
                let capacity =
                    pool.capacity(resource)
                        .ok_or_else(|| ScheduleError::UnknownResource {
                            operation: self.code(id).to_string(),
                            resource: resource.clone(),
                        })?;
                if *quantity > capacity {
                    return Err(ScheduleError::DemandExceedsCapacity {
                        operation: self.code(id).to_string(),
                        resource: resource.clone(),
                        demand: *quantity,
                        capacity,
                    });
                }
            }
        }
        Ok(())
    }
}

/// Sum repeated demands on one resource and drop zero quantities.
fn merge_demands(demands: &[(String, i64)]) -> Vec<(String, i64)> {
    let mut merged: BTreeMap<&str, i64> = BTreeMap::new();
    for (resource, quantity) in demands {
        *merged.entry(resource.as_str()).or_insert(0) += quantity;
    }
    merged
        .into_iter()
        .filter(|(_, q)| *q > 0)
        .map(|(r, q)| (r.to_string(), q))
        .collect()
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    OnStack,
    Done,
}

/// Depth-first search with an on-stack marker. Returns the first cycle found,
/// in edge order, rotated so the lowest id leads.
///
/// Iterative so deep chains cannot overflow the call stack.
fn find_cycle(successors: &[Vec<OpId>]) -> Option<Vec<OpId>> {
    let n = successors.len();
    let mut marks = vec![Mark::Unvisited; n];

    for root in 0..n {
        if marks[root] != Mark::Unvisited {
            continue;
        }

        // (node, index of next successor to visit)
        let mut stack: Vec<(OpId, usize)> = vec![(root as OpId, 0)];
        marks[root] = Mark::OnStack;

        while let Some(top) = stack.last_mut() {
            let node = top.0;
            let succs = &successors[node as usize];
            if top.1 == succs.len() {
                marks[node as usize] = Mark::Done;
                stack.pop();
                continue;
            }

            let child = succs[top.1];
            top.1 += 1;

            match marks[child as usize] {
                Mark::Unvisited => {
                    marks[child as usize] = Mark::OnStack;
                    stack.push((child, 0));
                }
                Mark::OnStack => {
                    let pos = stack.iter().position(|(id, _)| *id == child).unwrap_or(0);
                    let mut cycle: Vec<OpId> = stack[pos..].iter().map(|(id, _)| *id).collect();
                    let lowest = cycle
                        .iter()
                        .enumerate()
                        .min_by_key(|(_, id)| **id)
                        .map(|(i, _)| i)
                        .unwrap_or(0);
                    cycle.rotate_left(lowest);
                    return Some(cycle);
                }
                Mark::Done => {}
            }
        }
    }

    None
}

/// Kahn's algorithm with a min-heap so the order is fully deterministic.
///
/// Only called on graphs already known to be acyclic.
fn topological_sort(predecessors: &[Vec<OpId>], successors: &[Vec<OpId>]) -> Vec<OpId> {
    let mut in_degree: Vec<usize> = predecessors.iter().map(Vec::len).collect();

    let mut ready: BinaryHeap<Reverse<OpId>> = in_degree
        .iter()
        .enumerate()
        .filter(|(_, &degree)| degree == 0)
        .map(|(id, _)| Reverse(id as OpId))
        .collect();

    let mut order = Vec::with_capacity(predecessors.len());
    while let Some(Reverse(id)) = ready.pop() {
        order.push(id);
        for &succ in &successors[id as usize] {
            let degree = &mut in_degree[succ as usize];
            *degree -= 1;
            if *degree == 0 {
                ready.push(Reverse(succ));
            }
        }
    }
    order
}

/// Capacities of the shared resources, keyed by resource code.
///
/// Supplied alongside a graph for each computation; the graph never owns it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourcePool {
    capacities: BTreeMap<String, i64>,
}

impl ResourcePool {
    pub fn from_records(records: &[ResourceRecord]) -> Result<Self, GraphError> {
        let mut capacities = BTreeMap::new();
        for record in records {
            if record.capacity < 0 {
                return Err(GraphError::NegativeCapacity {
                    resource: record.code.clone(),
                    capacity: record.capacity,
                });
            }
            if capacities
                .insert(record.code.clone(), record.capacity)
                .is_some()
            {
                return Err(GraphError::DuplicateResource(record.code.clone()));
            }
        }
        Ok(Self { capacities })
    }

    pub fn capacity(&self, resource: &str) -> Option<i64> {
        self.capacities.get(resource).copied()
    }

    /// Resources in code order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, i64)> {
        self.capacities.iter().map(|(r, c)| (r.as_str(), *c))
    }

    pub fn len(&self) -> usize {
        self.capacities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.capacities.is_empty()
    }
}
