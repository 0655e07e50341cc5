use crate::data::{Duration, Job, JobId, Operation, OperationId};
use std::collections::HashMap;
use std::error::Error;

pub const HEADER: &str = "JobId,OperationId,Subdivision,ProcessingTime";

/// Parses comma separated job data into jobs.
///
/// Rows are grouped by job id, jobs keep the order in which they first appear and the operations of a job
/// are ordered by operation id.
pub fn parse_jobs(contents: &str) -> Result<Vec<Job>, Box<dyn Error>> {
  let mut lines = contents.lines();

  let header = lines.next().ok_or("Header missing")?;
  if header.trim() != HEADER {
    Err(format!("Invalid header {:?}, expected {:?}", header, HEADER))?;
  }

  let mut jobs: Vec<Job> = Vec::new();
  let mut job_positions: HashMap<JobId, usize> = HashMap::new();

  for (row, line) in lines.enumerate() {
    if line.trim().is_empty() {
      continue;
    }
    // Header is line 1
    let line_number = row + 2;

    let items: Vec<&str> = line.split(',').map(|item| item.trim()).collect();
    if items.len() != 4 {
      Err(format!(
        "Line {}: expected 4 columns but found {}",
        line_number,
        items.len()
      ))?;
    }

    let job_id = items[0]
      .parse::<JobId>()
      .map_err(|e| format!("Line {}: invalid job id {:?}: {}", line_number, items[0], e))?;
    let operation_id = items[1].parse::<OperationId>().map_err(|e| {
      format!(
        "Line {}: invalid operation id {:?}: {}",
        line_number, items[1], e
      )
    })?;
    let resource = items[2];
    if resource.is_empty() {
      Err(format!("Line {}: subdivision missing", line_number))?;
    }
    let duration = items[3].parse::<Duration>().map_err(|e| {
      format!(
        "Line {}: invalid processing time {:?}: {}",
        line_number, items[3], e
      )
    })?;

    let position = *job_positions.entry(job_id).or_insert_with(|| {
      jobs.push(Job::new(job_id, Vec::new()));
      jobs.len() - 1
    });
    jobs[position]
      .operations
      .push(Operation::new(job_id, operation_id, resource, duration));
  }

  for job in &mut jobs {
    job.operations.sort_by_key(|op| op.operation_id);
  }

  log::debug!(
    "Parsed {} jobs with {} operations",
    jobs.len(),
    jobs.iter().map(|job| job.operations.len()).sum::<usize>()
  );

  return Ok(jobs);
}
