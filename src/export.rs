use crate::data::{blank_copies, Job, Schedule};
use crate::solver::{evaluate, makespan};
use std::error::Error;
use std::fmt::{self, Write};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exporter {
  /// Boxed table of all operations ordered by start time
  Table,
  /// Makespan followed by one line of start times per job
  StartTimes,
}

impl Exporter {
  pub const NAMES: &'static [&'static str] = &["table", "starts"];

  /// Renders the evaluated jobs of `schedule`. A schedule without them is first replayed against a blank
  /// copy of `jobs`.
  pub fn render(self, schedule: &Schedule, jobs: &[Job]) -> Result<String, Box<dyn Error>> {
    let timed;
    let evaluated = match &schedule.evaluated_jobs {
      Some(evaluated) => evaluated.as_slice(),
      None => {
        let mut copies = blank_copies(jobs);
        evaluate(schedule, &mut copies)?;
        timed = copies;
        timed.as_slice()
      }
    };

    let rendered = match self {
      Exporter::Table => render_table(evaluated)?,
      Exporter::StartTimes => render_start_times(evaluated)?,
    };

    return Ok(rendered);
  }
}

impl FromStr for Exporter {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "table" => Ok(Exporter::Table),
      "starts" => Ok(Exporter::StartTimes),
      _ => Err(format!("Unknown format {:?}", s)),
    }
  }
}

const SEPARATOR: &str =
  "+--------+--------------+----------------------+------------+----------+----------+";

fn render_table(jobs: &[Job]) -> Result<String, fmt::Error> {
  let mut ops: Vec<_> = jobs.iter().flat_map(|job| job.operations.iter()).collect();
  // Stable, ties keep job order
  ops.sort_by_key(|op| op.start_time);

  let mut out = String::new();
  writeln!(out, "{}", SEPARATOR)?;
  writeln!(
    out,
    "| Job ID | Operation ID | Subdivision          | Start Hour | End Hour | Duration |"
  )?;
  writeln!(out, "{}", SEPARATOR)?;
  for op in ops {
    writeln!(
      out,
      "| {:>6} | {:>12} | {:<20} | {:>10} | {:>8} | {:>8} |",
      op.job_id,
      op.operation_id,
      op.resource,
      op.start_time,
      op.end_time(),
      op.duration
    )?;
  }
  writeln!(out, "{}", SEPARATOR)?;
  writeln!(out, "Makespan: {} hours", makespan(jobs))?;

  return Ok(out);
}

fn render_start_times(jobs: &[Job]) -> Result<String, fmt::Error> {
  let mut out = String::new();
  writeln!(out, "{}", makespan(jobs))?;
  for job in jobs {
    let starts: Vec<String> = job
      .operations
      .iter()
      .map(|op| op.start_time.to_string())
      .collect();
    writeln!(out, "{}", starts.join(" "))?;
  }

  return Ok(out);
}
