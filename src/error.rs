use crate::data::JobId;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SolveError {
  #[error("job list is empty, there is nothing to schedule")]
  NoJobs,

  #[error("job {job_id} has no operations")]
  EmptyJob { job_id: JobId },

  #[error("job id {job_id} appears more than once in the job list")]
  DuplicateJob { job_id: JobId },

  #[error("invalid solver configuration: {0}")]
  InvalidConfig(String),

  // Raised while replaying a job sequence
  #[error("job sequence references unknown job {job_id}")]
  UnknownJob { job_id: JobId },

  #[error("job sequence contains job {job_id} more often than it has operations")]
  OperationsExhausted { job_id: JobId },

  #[error("times of job {job_id} exceed the representable time range")]
  TimeOverflow { job_id: JobId },

  #[error("infeasible schedule: {0}")]
  Infeasible(String),
}
