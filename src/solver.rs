pub mod genetic_algorithm;
pub mod sequential;

use crate::data::{Job, JobId, Problem, Schedule, Scratch, Time};
use crate::error::SolveError;
use itertools::Itertools;
use std::cmp;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

pub trait Solver {
  /// Returns the best schedule found, with `evaluated_jobs` filled in.
  fn solve(&mut self) -> Result<Schedule, SolveError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverKind {
  Genetic,
  Sequential,
}

impl SolverKind {
  pub const NAMES: &'static [&'static str] = &["genetic", "sequential"];

  pub fn build(
    self,
    jobs: Vec<Job>,
    config: genetic_algorithm::Config,
  ) -> Result<Box<dyn Solver>, SolveError> {
    let solver: Box<dyn Solver> = match self {
      SolverKind::Genetic => Box::new(genetic_algorithm::GeneticAlgorithm::new(jobs, config)?),
      SolverKind::Sequential => Box::new(sequential::Sequential::new(jobs)?),
    };

    return Ok(solver);
  }

  /// Builds and runs the solver. The genetic algorithm keeps the best of `restarts` independent runs,
  /// the sequential baseline is deterministic and only accepts a single run.
  pub fn solve(
    self,
    jobs: &[Job],
    config: &genetic_algorithm::Config,
    restarts: usize,
  ) -> Result<Schedule, SolveError> {
    return match self {
      SolverKind::Genetic => genetic_algorithm::solve_multi_start(jobs, config, restarts),
      SolverKind::Sequential if restarts == 1 => {
        sequential::Sequential::new(jobs.to_vec())?.solve()
      }
      SolverKind::Sequential => Err(SolveError::InvalidConfig(format!(
        "the sequential solver runs once, got {} restarts",
        restarts
      ))),
    };
  }
}

impl FromStr for SolverKind {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "genetic" => Ok(SolverKind::Genetic),
      "sequential" => Ok(SolverKind::Sequential),
      _ => Err(format!("Unknown solver {:?}", s)),
    }
  }
}

impl fmt::Display for SolverKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      SolverKind::Genetic => write!(f, "genetic"),
      SolverKind::Sequential => write!(f, "sequential"),
    }
  }
}

/// Replays the job sequence against `jobs` and writes the start time of every operation it reaches.
///
/// Every operation starts as soon as both its job and its resource are free. Returns the makespan.
/// `jobs` is modified, pass a copy of the canonical job list.
pub fn evaluate(schedule: &Schedule, jobs: &mut [Job]) -> Result<Time, SolveError> {
  let mut job_positions: HashMap<JobId, usize> = HashMap::with_capacity(jobs.len());
  for (position, job) in jobs.iter_mut().enumerate() {
    job.reset();
    job_positions.insert(job.id, position);
  }

  let mut job_ready = vec![0; jobs.len()];
  let mut resource_available: HashMap<String, Time> = HashMap::new();
  let mut makespan = 0;

  for &job_id in &schedule.job_sequence {
    let position = *job_positions
      .get(&job_id)
      .ok_or(SolveError::UnknownJob { job_id: job_id })?;
    let op = jobs[position]
      .next_operation()
      .ok_or(SolveError::OperationsExhausted { job_id: job_id })?;

    let resource_ready = resource_available
      .get(&op.resource)
      .copied()
      .unwrap_or(0);
    op.start_time = cmp::max(job_ready[position], resource_ready);
    let end = op
      .start_time
      .checked_add(op.duration)
      .ok_or(SolveError::TimeOverflow { job_id: job_id })?;

    match resource_available.get_mut(&op.resource) {
      Some(available) => *available = end,
      None => {
        resource_available.insert(op.resource.clone(), end);
      }
    }
    job_ready[position] = end;
    makespan = cmp::max(makespan, end);
  }

  log::trace!("evaluate({:?}) = {}", schedule.job_sequence, makespan);

  return Ok(makespan);
}

/// Same decoder as `evaluate`, but on the flat problem view with reusable buffers.
///
/// Start times end up in `scratch.start_times`, indexed by flat operation id.
pub fn simulate(
  problem: &Problem,
  sequence: &[JobId],
  scratch: &mut Scratch,
) -> Result<Time, SolveError> {
  scratch.reset();
  let mut makespan = 0;

  for &job_id in sequence {
    let j = problem
      .job_index(job_id)
      .ok_or(SolveError::UnknownJob { job_id: job_id })?;
    let o = scratch.next_op[j];
    if o >= problem.op_count(j) {
      return Err(SolveError::OperationsExhausted { job_id: job_id });
    }
    scratch.next_op[j] += 1;

    let op = problem.op_to_id(j, o);
    let m = problem.resources[op];
    let release_time = cmp::max(scratch.job_ready[j], scratch.resource_available[m]);
    let finish_time = release_time
      .checked_add(problem.durations[op])
      .ok_or(SolveError::TimeOverflow { job_id: job_id })?;
    // Update the release time tracking arrays
    scratch.start_times[op] = release_time;
    scratch.resource_available[m] = finish_time;
    scratch.job_ready[j] = finish_time;

    makespan = cmp::max(makespan, finish_time);
  }

  return Ok(makespan);
}

pub fn makespan(jobs: &[Job]) -> Time {
  return jobs
    .iter()
    .flat_map(|job| job.operations.iter())
    .map(|op| op.end_time())
    .max()
    .unwrap_or(0);
}

pub fn total_duration(jobs: &[Job]) -> Time {
  return jobs
    .iter()
    .flat_map(|job| job.operations.iter())
    .fold(0, |total: Time, op| total.saturating_add(op.duration));
}

/// Checks a timed job set:
/// 1. For every job: operation i ends before operation i + 1 starts
/// 2. For every resource: no two operations overlap
pub fn verify_schedule(jobs: &[Job]) -> Result<(), SolveError> {
  for job in jobs {
    for (a, b) in job.operations.iter().tuple_windows() {
      if a.end_time() > b.start_time {
        return Err(SolveError::Infeasible(format!(
          "Precedence violation in job {} - op {}:[{}, {}] should be before op {}:[{}, {}]",
          job.id,
          a.operation_id,
          a.start_time,
          a.end_time(),
          b.operation_id,
          b.start_time,
          b.end_time()
        )));
      }
    }
  }

  let mut by_resource = HashMap::new();
  for op in jobs.iter().flat_map(|job| job.operations.iter()) {
    // Zero length operations do not occupy their resource
    if op.duration > 0 {
      by_resource
        .entry(op.resource.as_str())
        .or_insert_with(Vec::new)
        .push(op);
    }
  }

  for (resource, ops) in by_resource.iter_mut() {
    ops.sort_by_key(|op| (op.start_time, op.end_time()));
    for (a, b) in ops.iter().tuple_windows() {
      if a.end_time() > b.start_time {
        return Err(SolveError::Infeasible(format!(
          "Overlap on {} - job {} op {}:[{}, {}] overlaps with job {} op {}:[{}, {}]",
          resource,
          a.job_id,
          a.operation_id,
          a.start_time,
          a.end_time(),
          b.job_id,
          b.operation_id,
          b.start_time,
          b.end_time()
        )));
      }
    }
  }

  return Ok(());
}
