//! PyO3 bindings: the scheduling service calls the engines through these.

use chrono::NaiveDate;
use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use std::collections::BTreeMap;

use crate::config::EngineConfig;
use crate::cpm::cpm;
use crate::error::{GraphError, PrecedenceViolation, ResourceOverCommit, ScheduleError};
use crate::graph::{ProjectGraph, ResourcePool};
use crate::models::{OperationRecord, ResourceRecord, Schedule, ScheduledOperation, Time};
use crate::priority::PriorityRule;
use crate::rcpm::rcpm;
use crate::ssgs::{local_ssgs, ssgs};
use crate::validation;

fn graph_error(e: GraphError) -> PyErr {
    PyValueError::new_err(e.to_string())
}

/// Engine defects surface as RuntimeError, bad input as ValueError.
fn schedule_error(e: ScheduleError) -> PyErr {
    match &e {
        ScheduleError::InfeasibleScheduleProduced { .. } => PyRuntimeError::new_err(e.to_string()),
        _ => PyValueError::new_err(e.to_string()),
    }
}

/// One operation row.
#[pyclass(name = "Operation")]
#[derive(Clone, Debug)]
pub struct PyOperation {
    #[pyo3(get, set)]
    pub code: String,
    #[pyo3(get, set)]
    pub duration: Time,
    #[pyo3(get, set)]
    pub predecessors: Vec<String>,
    /// Resource code -> quantity held for the whole duration
    #[pyo3(get, set)]
    pub demands: BTreeMap<String, i64>,
}

#[pymethods]
impl PyOperation {
    #[new]
    #[pyo3(signature = (code, duration, predecessors=None, demands=None))]
    fn new(
        code: String,
        duration: Time,
        predecessors: Option<Vec<String>>,
        demands: Option<BTreeMap<String, i64>>,
    ) -> Self {
        Self {
            code,
            duration,
            predecessors: predecessors.unwrap_or_default(),
            demands: demands.unwrap_or_default(),
        }
    }

    fn __repr__(&self) -> String {
        format!(
            "Operation(code={:?}, duration={}, predecessors={:?}, demands={:?})",
            self.code, self.duration, self.predecessors, self.demands
        )
    }
}

impl PyOperation {
    fn to_record(&self) -> OperationRecord {
        self.demands.iter().fold(
            OperationRecord::new(self.code.clone(), self.duration)
                .after(self.predecessors.iter().cloned()),
            |record, (resource, &quantity)| record.demands(resource.clone(), quantity),
        )
    }
}

/// One shared resource and its capacity.
#[pyclass(name = "Resource")]
#[derive(Clone, Debug)]
pub struct PyResource {
    #[pyo3(get, set)]
    pub code: String,
    #[pyo3(get, set)]
    pub capacity: i64,
}

#[pymethods]
impl PyResource {
    #[new]
    fn new(code: String, capacity: i64) -> Self {
        Self { code, capacity }
    }

    fn __repr__(&self) -> String {
        format!("Resource(code={:?}, capacity={})", self.code, self.capacity)
    }
}

/// A computed (or caller-supplied) schedule.
#[pyclass(name = "Schedule")]
#[derive(Clone, Debug)]
pub struct PySchedule {
    inner: Schedule,
}

#[pymethods]
impl PySchedule {
    /// Build a schedule from `{code: (start, finish)}`, e.g. to validate
    /// edited times or to serve as a local rescheduling baseline.
    #[new]
    fn new(times: BTreeMap<String, (Time, Time)>) -> Self {
        let mut inner = Schedule::default();
        for (code, (start, finish)) in times {
            inner.duration = inner.duration.max(finish);
            inner.entries.insert(
                code,
                ScheduledOperation {
                    start,
                    finish,
                    slack: 0,
                },
            );
        }
        Self { inner }
    }

    /// `{code: (start, finish, slack)}`
    #[getter]
    fn entries(&self) -> BTreeMap<String, (Time, Time, Time)> {
        self.inner
            .entries
            .iter()
            .map(|(code, e)| (code.clone(), (e.start, e.finish, e.slack)))
            .collect()
    }

    #[getter]
    fn critical_path(&self) -> Vec<String> {
        self.inner.critical_path.clone()
    }

    #[getter]
    fn duration(&self) -> Time {
        self.inner.duration
    }

    fn start_of(&self, code: &str) -> Option<Time> {
        self.inner.start_of(code)
    }

    fn finish_of(&self, code: &str) -> Option<Time> {
        self.inner.finish_of(code)
    }

    /// Rows of `(code, start_date, finish_date)` counted from `project_start`.
    ///
    /// # Raises
    /// * ValueError if a date falls outside the representable range
    fn to_calendar(
        &self,
        project_start: NaiveDate,
    ) -> PyResult<Vec<(String, NaiveDate, NaiveDate)>> {
        let rows = self.inner.to_calendar(project_start).ok_or_else(|| {
            PyValueError::new_err(format!(
                "Schedule does not fit the calendar from {project_start}"
            ))
        })?;
        Ok(rows
            .into_iter()
            .map(|row| (row.code, row.start_date, row.finish_date))
            .collect())
    }

    fn __len__(&self) -> usize {
        self.inner.len()
    }

    fn __repr__(&self) -> String {
        format!(
            "Schedule(operations={}, duration={}, critical_path={:?})",
            self.inner.len(),
            self.inner.duration,
            self.inner.critical_path
        )
    }
}

impl From<Schedule> for PySchedule {
    fn from(inner: Schedule) -> Self {
        Self { inner }
    }
}

/// Outcome of `run_local_ssgs`.
#[pyclass(name = "LocalReschedule")]
#[derive(Clone, Debug)]
pub struct PyLocalReschedule {
    #[pyo3(get)]
    pub schedule: PySchedule,
    #[pyo3(get)]
    pub duration: Time,
    /// `(operation, predecessor, start, predecessor_finish)` rows
    #[pyo3(get)]
    pub precedence_violations: Vec<(String, String, Time, Time)>,
}

#[pymethods]
impl PyLocalReschedule {
    fn violates_precedence(&self) -> bool {
        !self.precedence_violations.is_empty()
    }

    fn __repr__(&self) -> String {
        format!(
            "LocalReschedule(duration={}, precedence_violations={})",
            self.duration,
            self.precedence_violations.len()
        )
    }
}

fn violation_row(v: PrecedenceViolation) -> (String, String, Time, Time) {
    (v.operation, v.predecessor, v.start, v.predecessor_finish)
}

fn over_commit_row(o: ResourceOverCommit) -> (String, Time, i64, i64) {
    (o.resource, o.instant, o.demanded, o.capacity)
}

fn build_graph(operations: &[PyOperation]) -> PyResult<ProjectGraph> {
    let records: Vec<OperationRecord> = operations.iter().map(PyOperation::to_record).collect();
    ProjectGraph::build(&records).map_err(graph_error)
}

fn build_pool(resources: &[PyResource]) -> PyResult<ResourcePool> {
    let records: Vec<ResourceRecord> = resources
        .iter()
        .map(|r| ResourceRecord::new(r.code.clone(), r.capacity))
        .collect();
    ResourcePool::from_records(&records).map_err(graph_error)
}

fn engine_config(verbosity: u8, priority_rule: &str) -> PyResult<EngineConfig> {
    let rule: PriorityRule = priority_rule.parse().map_err(schedule_error)?;
    Ok(EngineConfig::default()
        .with_verbosity(verbosity)
        .with_priority_rule(rule))
}

/// Unconstrained CPM schedule.
///
/// # Raises
/// * ValueError on invalid input (duplicate codes, unknown predecessors, cycles, empty project)
#[pyfunction]
fn run_cpm(operations: Vec<PyOperation>) -> PyResult<PySchedule> {
    let graph = build_graph(&operations)?;
    cpm(&graph).map(PySchedule::from).map_err(schedule_error)
}

/// Resource-constrained CPM.
///
/// # Raises
/// * ValueError on invalid input
/// * RuntimeError if the engine produced an infeasible schedule
#[pyfunction]
#[pyo3(signature = (operations, resources, verbosity=0))]
fn run_rcpm(
    operations: Vec<PyOperation>,
    resources: Vec<PyResource>,
    verbosity: u8,
) -> PyResult<PySchedule> {
    let graph = build_graph(&operations)?;
    let pool = build_pool(&resources)?;
    let config = EngineConfig::default().with_verbosity(verbosity);
    rcpm(&graph, &pool, &config)
        .map(PySchedule::from)
        .map_err(schedule_error)
}

/// Serial Schedule Generation Scheme over the whole project.
///
/// `priority_rule` is one of "earliest_start", "latest_start", "min_slack".
#[pyfunction]
#[pyo3(signature = (operations, resources, verbosity=0, priority_rule="earliest_start"))]
fn run_ssgs(
    operations: Vec<PyOperation>,
    resources: Vec<PyResource>,
    verbosity: u8,
    priority_rule: &str,
) -> PyResult<PySchedule> {
    let graph = build_graph(&operations)?;
    let pool = build_pool(&resources)?;
    let config = engine_config(verbosity, priority_rule)?;
    ssgs(&graph, &pool, &config)
        .map(PySchedule::from)
        .map_err(schedule_error)
}

/// Reschedule only `selected`, keeping every other operation at its
/// `baseline` time.
#[pyfunction]
#[pyo3(signature = (operations, resources, baseline, selected, enforce_precedence=true, verbosity=0, priority_rule="earliest_start"))]
#[allow(clippy::too_many_arguments)]
fn run_local_ssgs(
    operations: Vec<PyOperation>,
    resources: Vec<PyResource>,
    baseline: PySchedule,
    selected: Vec<String>,
    enforce_precedence: bool,
    verbosity: u8,
    priority_rule: &str,
) -> PyResult<PyLocalReschedule> {
    let graph = build_graph(&operations)?;
    let pool = build_pool(&resources)?;
    let config = engine_config(verbosity, priority_rule)?;
    let result = local_ssgs(
        &graph,
        &pool,
        &baseline.inner,
        &selected,
        enforce_precedence,
        &config,
    )
    .map_err(schedule_error)?;

    Ok(PyLocalReschedule {
        schedule: result.schedule.into(),
        duration: result.duration,
        precedence_violations: result
            .precedence_violations
            .into_iter()
            .map(violation_row)
            .collect(),
    })
}

/// Precedence violations of `schedule`; empty when it is consistent.
#[pyfunction(name = "check_precedence")]
fn py_check_precedence(
    operations: Vec<PyOperation>,
    schedule: PySchedule,
) -> PyResult<Vec<(String, String, Time, Time)>> {
    let graph = build_graph(&operations)?;
    Ok(match validation::check_precedence(&graph, &schedule.inner) {
        Ok(()) => Vec::new(),
        Err(violations) => violations.into_iter().map(violation_row).collect(),
    })
}

/// Resource over-commits of `schedule` as `(resource, instant, demanded,
/// capacity)` rows; empty when it is feasible.
#[pyfunction(name = "check_resource_conflicts")]
fn py_check_resource_conflicts(
    operations: Vec<PyOperation>,
    resources: Vec<PyResource>,
    schedule: PySchedule,
) -> PyResult<Vec<(String, Time, i64, i64)>> {
    let graph = build_graph(&operations)?;
    let pool = build_pool(&resources)?;
    Ok(
        match validation::check_resource_conflicts(&graph, &schedule.inner, &pool) {
            Ok(()) => Vec::new(),
            Err(over_commits) => over_commits.into_iter().map(over_commit_row).collect(),
        },
    )
}

/// The buildlogic_engine Python module.
#[pymodule]
fn buildlogic_engine(m: &Bound<'_, PyModule>) -> PyResult<()> {
    // Data types
    m.add_class::<PyOperation>()?;
    m.add_class::<PyResource>()?;
    m.add_class::<PySchedule>()?;
    m.add_class::<PyLocalReschedule>()?;

    // Engines
    m.add_function(wrap_pyfunction!(run_cpm, m)?)?;
    m.add_function(wrap_pyfunction!(run_rcpm, m)?)?;
    m.add_function(wrap_pyfunction!(run_ssgs, m)?)?;
    m.add_function(wrap_pyfunction!(run_local_ssgs, m)?)?;

    // Validators
    m.add_function(wrap_pyfunction!(py_check_precedence, m)?)?;
    m.add_function(wrap_pyfunction!(py_check_resource_conflicts, m)?)?;

    Ok(())
}
