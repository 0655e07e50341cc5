use crate::error::SolveError;
use ndarray::Array1;
use std::collections::HashMap;

pub type JobId = u32;
pub type OperationId = u32;
pub type Duration = u32;
pub type Time = u32;

/// Fitness of a schedule that has not been evaluated yet. Any real makespan is better.
pub const UNEVALUATED: Time = Time::MAX;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
  pub job_id: JobId,
  /// Only used for ordering and display, it does not have to be contiguous.
  pub operation_id: OperationId,
  pub resource: String,
  pub duration: Duration,
  /// Assigned by `solver::evaluate`
  pub start_time: Time,
}

impl Operation {
  pub fn new(job_id: JobId, operation_id: OperationId, resource: &str, duration: Duration) -> Self {
    return Operation {
      job_id: job_id,
      operation_id: operation_id,
      resource: resource.to_string(),
      duration: duration,
      start_time: 0,
    };
  }

  /// Saturates at `Time::MAX`, `solver::evaluate` rejects schedules that get there.
  pub fn end_time(&self) -> Time {
    return self.start_time.saturating_add(self.duration);
  }
}

/// A job is an ordered list of operations, operation `i` has to finish before operation `i + 1` starts.
///
/// The cursor (`next_index`) tracks which operation is handed out next while a job sequence is replayed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
  pub id: JobId,
  pub operations: Vec<Operation>,
  next_index: usize,
}

impl Job {
  pub fn new(id: JobId, operations: Vec<Operation>) -> Self {
    return Job {
      id: id,
      operations: operations,
      next_index: 0,
    };
  }

  pub fn next_index(&self) -> usize {
    return self.next_index;
  }

  pub fn has_next(&self) -> bool {
    return self.next_index < self.operations.len();
  }

  /// Hands out the next operation and advances the cursor, `None` once all operations were handed out.
  pub fn next_operation(&mut self) -> Option<&mut Operation> {
    let operation = self.operations.get_mut(self.next_index)?;
    self.next_index += 1;
    return Some(operation);
  }

  pub fn reset(&mut self) {
    self.next_index = 0;
  }

  /// Copy of the job without any timing information, safe to hand to the simulator.
  pub fn blank_copy(&self) -> Job {
    let operations = self
      .operations
      .iter()
      .map(|op| Operation {
        start_time: 0,
        ..op.clone()
      })
      .collect();

    return Job::new(self.id, operations);
  }
}

pub fn blank_copies(jobs: &[Job]) -> Vec<Job> {
  return jobs.iter().map(|job| job.blank_copy()).collect();
}

/// A candidate solution.
///
/// The job sequence contains every job id once per operation of that job. The i-th occurrence of a job id
/// stands for the i-th operation of that job, e.g. `[1, 2, 1]` runs job 1 op 1, job 2 op 1, job 1 op 2.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
  pub job_sequence: Vec<JobId>,
  /// Makespan, lower is better. `UNEVALUATED` until the schedule was simulated.
  pub fitness: Time,
  /// Fully timed copy of the jobs, only set on the schedule a solver returns.
  pub evaluated_jobs: Option<Vec<Job>>,
}

impl Schedule {
  pub fn new(job_sequence: Vec<JobId>) -> Self {
    return Schedule {
      job_sequence: job_sequence,
      fitness: UNEVALUATED,
      evaluated_jobs: None,
    };
  }

  pub fn is_evaluated(&self) -> bool {
    return self.fitness != UNEVALUATED;
  }
}

/// Flat, index based view of a job set.
///
/// Operations are numbered job by job, the operations of job index `j` are `offsets[j]..offsets[j + 1]`.
/// Resource names are interned to `0..n_resources`.
#[derive(Debug, Clone)]
pub struct Problem {
  pub job_ids: Vec<JobId>,
  pub n_resources: usize,
  pub durations: Array1<Duration>,
  pub resources: Array1<usize>,
  offsets: Array1<usize>,
  job_index: HashMap<JobId, usize>,
}

impl Problem {
  pub fn new(jobs: &[Job]) -> Result<Self, SolveError> {
    if jobs.is_empty() {
      return Err(SolveError::NoJobs);
    }

    let n_ops = jobs.iter().map(|job| job.operations.len()).sum::<usize>();
    let mut durations = Array1::<Duration>::from_elem(n_ops, 0);
    let mut resources = Array1::<usize>::from_elem(n_ops, 0);
    let mut offsets = Array1::<usize>::from_elem(jobs.len() + 1, 0);
    let mut job_index = HashMap::with_capacity(jobs.len());
    let mut resource_index: HashMap<&str, usize> = HashMap::new();

    // Every decoded schedule ends by the sum of all durations, which has to stay below `UNEVALUATED`
    let mut horizon: Time = 0;
    let mut op_id = 0;
    for (j, job) in jobs.iter().enumerate() {
      if job.operations.is_empty() {
        return Err(SolveError::EmptyJob { job_id: job.id });
      }
      if job_index.insert(job.id, j).is_some() {
        return Err(SolveError::DuplicateJob { job_id: job.id });
      }

      offsets[j] = op_id;
      for op in &job.operations {
        let next_resource = resource_index.len();
        let resource = *resource_index
          .entry(op.resource.as_str())
          .or_insert(next_resource);

        horizon = horizon
          .checked_add(op.duration)
          .filter(|&h| h < UNEVALUATED)
          .ok_or(SolveError::TimeOverflow { job_id: job.id })?;
        durations[op_id] = op.duration;
        resources[op_id] = resource;
        op_id += 1;
      }
    }
    offsets[jobs.len()] = op_id;

    return Ok(Problem {
      job_ids: jobs.iter().map(|job| job.id).collect(),
      n_resources: resource_index.len(),
      durations: durations,
      resources: resources,
      offsets: offsets,
      job_index: job_index,
    });
  }

  pub fn n_jobs(&self) -> usize {
    return self.job_ids.len();
  }

  pub fn n_ops(&self) -> usize {
    return self.durations.len();
  }

  pub fn job_index(&self, job_id: JobId) -> Option<usize> {
    return self.job_index.get(&job_id).copied();
  }

  pub fn op_count(&self, job: usize) -> usize {
    return self.offsets[job + 1] - self.offsets[job];
  }

  /// Flat id of operation `o` of job index `j`
  pub fn op_to_id(&self, j: usize, o: usize) -> usize {
    return self.offsets[j] + o;
  }

  /// Every job id repeated once per operation of that job, in job order.
  pub fn gene_pool(&self) -> Vec<JobId> {
    let mut genes = Vec::with_capacity(self.n_ops());
    for (j, &job_id) in self.job_ids.iter().enumerate() {
      for _ in 0..self.op_count(j) {
        genes.push(job_id);
      }
    }

    return genes;
  }

  /// True if `sequence` contains every job id exactly as often as that job has operations.
  pub fn is_valid_sequence(&self, sequence: &[JobId]) -> bool {
    if sequence.len() != self.n_ops() {
      return false;
    }

    let mut counts = vec![0; self.n_jobs()];
    for &job_id in sequence {
      match self.job_index(job_id) {
        Some(j) => counts[j] += 1,
        None => return false,
      }
    }

    return counts
      .iter()
      .enumerate()
      .all(|(j, &count)| count == self.op_count(j));
  }
}

/// Reusable buffers for replaying job sequences against a `Problem`.
#[derive(Debug, Clone)]
pub struct Scratch {
  pub next_op: Vec<usize>,
  pub job_ready: Vec<Time>,
  pub resource_available: Vec<Time>,
  pub start_times: Array1<Time>,
}

impl Scratch {
  pub fn new(problem: &Problem) -> Self {
    return Scratch {
      next_op: vec![0; problem.n_jobs()],
      job_ready: vec![0; problem.n_jobs()],
      resource_available: vec![0; problem.n_resources],
      start_times: Array1::<Time>::from_elem(problem.n_ops(), 0),
    };
  }

  pub fn reset(&mut self) {
    self.next_op.iter_mut().for_each(|x| *x = 0);
    self.job_ready.iter_mut().for_each(|x| *x = 0);
    self.resource_available.iter_mut().for_each(|x| *x = 0);
    self.start_times.fill(0);
  }
}
