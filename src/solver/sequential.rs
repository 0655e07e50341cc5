use crate::data::{blank_copies, Job, Problem, Schedule};
use crate::error::SolveError;
use crate::solver::{evaluate, Solver};

/// Baseline that schedules the jobs one after another in input order.
pub struct Sequential {
  jobs: Vec<Job>,
  problem: Problem,
}

impl Sequential {
  pub fn new(jobs: Vec<Job>) -> Result<Self, SolveError> {
    let problem = Problem::new(&jobs)?;
    return Ok(Sequential {
      jobs: jobs,
      problem: problem,
    });
  }
}

impl Solver for Sequential {
  fn solve(&mut self) -> Result<Schedule, SolveError> {
    let mut schedule = Schedule::new(self.problem.gene_pool());
    let mut evaluated_jobs = blank_copies(&self.jobs);
    schedule.fitness = evaluate(&schedule, &mut evaluated_jobs)?;
    schedule.evaluated_jobs = Some(evaluated_jobs);

    log::info!("Sequential schedule with makespan {}", schedule.fitness);

    return Ok(schedule);
  }
}
