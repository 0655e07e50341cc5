use crate::data::{blank_copies, Job, Problem, Schedule, Scratch};
use crate::error::SolveError;
use crate::solver::{evaluate, simulate, Solver};
use log::{debug, info, trace};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaChaRng;
use rayon::prelude::*;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
  /// Individuals per generation
  pub population_size: usize,
  pub generations: usize,
  /// Individuals drawn per tournament, higher means more selection pressure
  pub tournament_size: usize,
  pub seed: u64,
  /// Stop after this many generations without improving the best schedule
  pub stagnation_limit: Option<usize>,
}

impl Default for Config {
  fn default() -> Self {
    return Config {
      population_size: 50,
      generations: 50,
      tournament_size: 5,
      seed: 0,
      stagnation_limit: None,
    };
  }
}

impl Config {
  pub fn validate(&self) -> Result<(), SolveError> {
    if self.population_size == 0 {
      return Err(SolveError::InvalidConfig(
        "population size must be at least 1".to_string(),
      ));
    }
    if self.tournament_size == 0 {
      return Err(SolveError::InvalidConfig(
        "tournament size must be at least 1".to_string(),
      ));
    }
    if self.stagnation_limit == Some(0) {
      return Err(SolveError::InvalidConfig(
        "stagnation limit must be at least 1".to_string(),
      ));
    }

    return Ok(());
  }
}

pub struct GeneticAlgorithm {
  jobs: Vec<Job>,
  problem: Problem,
  config: Config,
  rng: ChaChaRng,
}

impl GeneticAlgorithm {
  pub fn new(jobs: Vec<Job>, config: Config) -> Result<Self, SolveError> {
    config.validate()?;
    let problem = Problem::new(&jobs)?;
    let rng = ChaChaRng::seed_from_u64(config.seed);

    return Ok(GeneticAlgorithm {
      jobs: jobs,
      problem: problem,
      config: config,
      rng: rng,
    });
  }

  pub fn problem(&self) -> &Problem {
    return &self.problem;
  }

  pub fn config(&self) -> &Config {
    return &self.config;
  }

  /// Random permutations of the gene pool, all unevaluated.
  pub fn initialise_population(&mut self) -> Vec<Schedule> {
    let gene_pool = self.problem.gene_pool();
    let mut population = Vec::with_capacity(self.config.population_size);

    for _ in 0..self.config.population_size {
      let mut genes = gene_pool.clone();
      genes.shuffle(&mut self.rng);
      population.push(Schedule::new(genes));
    }

    return population;
  }

  /// Writes the makespan of every individual into its fitness.
  pub fn evaluate_population(&self, population: &mut [Schedule]) -> Result<(), SolveError> {
    let problem = &self.problem;

    return population
      .par_iter_mut()
      .map_init(
        || Scratch::new(problem),
        |scratch, schedule| -> Result<(), SolveError> {
          schedule.fitness = simulate(problem, &schedule.job_sequence, scratch)?;
          Ok(())
        },
      )
      .collect();
  }

  /// Next generation: `best` in slot 0, bred children in the other slots.
  ///
  /// Each slot draws from its own ChaCha stream of a per generation seed, so the result does not depend on
  /// how rayon distributes the slots.
  pub fn breed_population(
    &mut self,
    population: &[Schedule],
    best: &Schedule,
  ) -> Result<Vec<Schedule>, SolveError> {
    let generation_seed: u64 = self.rng.gen();
    let problem = &self.problem;
    let tournament_size = self.config.tournament_size;

    let children: Vec<Schedule> = (1..self.config.population_size)
      .into_par_iter()
      .map(|slot| {
        let mut rng = ChaChaRng::seed_from_u64(generation_seed);
        rng.set_stream(slot as u64);
        breed(population, problem, tournament_size, &mut rng)
      })
      .collect::<Option<Vec<_>>>()
      .ok_or_else(|| {
        SolveError::InvalidConfig("cannot breed from an empty population".to_string())
      })?;

    let mut next_population = Vec::with_capacity(self.config.population_size);
    next_population.push(best.clone());
    next_population.extend(children);

    return Ok(next_population);
  }

  /// Like `solve`, calling `on_generation` with the generation number and the best schedule so far after
  /// every evaluated generation.
  pub fn solve_with_observer(
    &mut self,
    on_generation: &mut dyn FnMut(usize, &Schedule),
  ) -> Result<Schedule, SolveError> {
    info!(
      "Solving {} jobs with {} operations ({:?})",
      self.problem.n_jobs(),
      self.problem.n_ops(),
      self.config
    );

    let mut population = self.initialise_population();
    let mut best = population[0].clone();
    let mut generations_without_improvement = 0;

    for generation in 0..self.config.generations {
      self.evaluate_population(&mut population)?;
      population.sort_by_key(|schedule| schedule.fitness);

      let generation_best = &population[0];
      trace!(
        "Generation {} best {} worst {}",
        generation,
        generation_best.fitness,
        population[population.len() - 1].fitness
      );

      if generation_best.fitness < best.fitness {
        best = generation_best.clone();
        generations_without_improvement = 0;
        debug!("Improved best to {} ({})", best.fitness, generation);
      } else {
        generations_without_improvement += 1;
      }

      on_generation(generation, &best);

      if let Some(limit) = self.config.stagnation_limit {
        if generations_without_improvement >= limit {
          info!(
            "Stopping after {} generations without improvement at {} ({})",
            generations_without_improvement, best.fitness, generation
          );
          break;
        }
      }

      population = self.breed_population(&population, &best)?;
    }

    let mut evaluated_jobs = blank_copies(&self.jobs);
    best.fitness = evaluate(&best, &mut evaluated_jobs)?;
    best.evaluated_jobs = Some(evaluated_jobs);

    info!("Finished with makespan {}", best.fitness);

    return Ok(best);
  }
}

impl Solver for GeneticAlgorithm {
  fn solve(&mut self) -> Result<Schedule, SolveError> {
    return self.solve_with_observer(&mut |_, _| {});
  }
}

/// Runs `restarts` independent solvers in parallel, seeded `config.seed`, `config.seed + 1`, ..., and keeps
/// the best result.
pub fn solve_multi_start(
  jobs: &[Job],
  config: &Config,
  restarts: usize,
) -> Result<Schedule, SolveError> {
  if restarts == 0 {
    return Err(SolveError::InvalidConfig(
      "at least one restart is required".to_string(),
    ));
  }

  let results = (0..restarts)
    .into_par_iter()
    .map(|restart| {
      let config = Config {
        seed: config.seed.wrapping_add(restart as u64),
        ..config.clone()
      };
      GeneticAlgorithm::new(jobs.to_vec(), config)?.solve()
    })
    .collect::<Result<Vec<_>, _>>()?;

  for (restart, schedule) in results.iter().enumerate() {
    debug!("Restart {} finished at {}", restart, schedule.fitness);
  }

  return results
    .into_iter()
    .min_by_key(|schedule| schedule.fitness)
    .ok_or_else(|| SolveError::InvalidConfig("no restart produced a schedule".to_string()));
}

/// Tournament selection: the fittest of `tournament_size` distinct random individuals.
///
/// Draws the whole population if it is smaller than the tournament, `None` if it is empty.
pub fn select<'a, R: Rng>(
  population: &'a [Schedule],
  tournament_size: usize,
  rng: &mut R,
) -> Option<&'a Schedule> {
  return population
    .choose_multiple(rng, tournament_size)
    .min_by_key(|schedule| schedule.fitness);
}

/// Order preserving segment crossover.
///
/// Copies a random slice of `parent_a` into the child at the same positions, then fills the remaining
/// positions left to right with the genes of `parent_b` whose job is not yet saturated.
pub fn crossover<R: Rng>(
  parent_a: &Schedule,
  parent_b: &Schedule,
  problem: &Problem,
  rng: &mut R,
) -> Schedule {
  let size = parent_a.job_sequence.len();
  let mut genes = parent_a.job_sequence.clone();
  if size == 0 {
    return Schedule::new(genes);
  }

  let start = if size / 2 > 0 {
    rng.gen_range(0, size / 2)
  } else {
    0
  };
  let end = rng.gen_range(start + 1, size + 1);

  // Genes already placed per job index
  let mut placed = vec![0; problem.n_jobs()];
  for &gene in &parent_a.job_sequence[start..end] {
    if let Some(j) = problem.job_index(gene) {
      placed[j] += 1;
    }
  }

  let mut b_index = 0;
  for i in (0..start).chain(end..size) {
    while let Some(&gene) = parent_b.job_sequence.get(b_index) {
      b_index += 1;

      if let Some(j) = problem.job_index(gene) {
        if placed[j] < problem.op_count(j) {
          placed[j] += 1;
          genes[i] = gene;
          break;
        }
      }
    }
  }

  debug_assert!(
    problem.is_valid_sequence(&genes),
    "crossover broke the gene pool: {:?} x {:?} -> {:?}",
    parent_a.job_sequence,
    parent_b.job_sequence,
    genes
  );

  return Schedule::new(genes);
}

/// Swaps two random genes, possibly a gene with itself.
pub fn mutate<R: Rng>(schedule: &mut Schedule, rng: &mut R) {
  let size = schedule.job_sequence.len();
  if size == 0 {
    return;
  }

  let a = rng.gen_range(0, size);
  let b = rng.gen_range(0, size);
  schedule.job_sequence.swap(a, b);
}

/// Selects two parents, crosses them and mutates the child.
pub fn breed<R: Rng>(
  population: &[Schedule],
  problem: &Problem,
  tournament_size: usize,
  rng: &mut R,
) -> Option<Schedule> {
  let parent_a = select(population, tournament_size, rng)?;
  let parent_b = select(population, tournament_size, rng)?;

  let mut child = crossover(parent_a, parent_b, problem, rng);
  mutate(&mut child, rng);

  return Some(child);
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::data::{Operation, UNEVALUATED};
  use crate::solver::verify_schedule;
  use rand::rngs::mock::StepRng;

  fn jobs() -> Vec<Job> {
    vec![
      Job::new(
        1,
        vec![
          Operation::new(1, 1, "A", 3),
          Operation::new(1, 2, "B", 2),
          Operation::new(1, 3, "C", 2),
        ],
      ),
      Job::new(
        2,
        vec![
          Operation::new(2, 1, "A", 2),
          Operation::new(2, 2, "C", 1),
          Operation::new(2, 3, "B", 4),
        ],
      ),
      Job::new(
        3,
        vec![Operation::new(3, 1, "B", 4), Operation::new(3, 2, "C", 3)],
      ),
    ]
  }

  fn with_fitness(sequence: Vec<u32>, fitness: u32) -> Schedule {
    let mut schedule = Schedule::new(sequence);
    schedule.fitness = fitness;
    schedule
  }

  #[test]
  fn default_config_matches_reference_values() {
    let config = Config::default();
    assert_eq!(config.population_size, 50);
    assert_eq!(config.generations, 50);
    assert_eq!(config.tournament_size, 5);
    assert_eq!(config.stagnation_limit, None);
  }

  #[test]
  fn rejects_invalid_config() {
    for config in vec![
      Config {
        population_size: 0,
        ..Config::default()
      },
      Config {
        tournament_size: 0,
        ..Config::default()
      },
      Config {
        stagnation_limit: Some(0),
        ..Config::default()
      },
    ] {
      assert!(matches!(
        GeneticAlgorithm::new(jobs(), config),
        Err(SolveError::InvalidConfig(_))
      ));
    }
  }

  #[test]
  fn rejects_invalid_jobs() {
    assert!(matches!(
      GeneticAlgorithm::new(Vec::new(), Config::default()),
      Err(SolveError::NoJobs)
    ));
    assert!(matches!(
      GeneticAlgorithm::new(vec![Job::new(9, Vec::new())], Config::default()),
      Err(SolveError::EmptyJob { job_id: 9 })
    ));
  }

  #[test]
  fn initial_population_is_valid_and_unevaluated() {
    let mut ga = GeneticAlgorithm::new(jobs(), Config::default()).unwrap();
    let population = ga.initialise_population();

    assert_eq!(population.len(), 50);
    for schedule in &population {
      assert!(ga.problem().is_valid_sequence(&schedule.job_sequence));
      assert_eq!(schedule.fitness, UNEVALUATED);
    }
    assert!(population
      .iter()
      .any(|schedule| schedule.job_sequence != population[0].job_sequence));
  }

  #[test]
  fn evaluate_population_sets_fitness() {
    let mut ga = GeneticAlgorithm::new(jobs(), Config::default()).unwrap();
    let mut population = ga.initialise_population();
    ga.evaluate_population(&mut population).unwrap();

    for schedule in &population {
      let mut evaluated = blank_copies(&jobs());
      assert_eq!(
        schedule.fitness,
        evaluate(schedule, &mut evaluated).unwrap()
      );
    }
  }

  #[test]
  fn select_returns_fittest_when_tournament_covers_population() {
    let population = vec![
      with_fitness(vec![1], 30),
      with_fitness(vec![2], 10),
      with_fitness(vec![3], 20),
    ];
    let mut rng = ChaChaRng::seed_from_u64(1);
    for _ in 0..10 {
      let winner = select(&population, 5, &mut rng).unwrap();
      assert_eq!(winner.fitness, 10);
    }
    assert!(select(&[], 5, &mut rng).is_none());
  }

  #[test]
  fn select_with_single_candidate_is_uniform() {
    let population = vec![with_fitness(vec![1], 30), with_fitness(vec![2], 10)];
    let mut rng = ChaChaRng::seed_from_u64(2);
    let picks: Vec<u32> = (0..100)
      .map(|_| select(&population, 1, &mut rng).unwrap().fitness)
      .collect();
    assert!(picks.contains(&30));
    assert!(picks.contains(&10));
  }

  #[test]
  fn crossover_preserves_gene_pool() {
    let jobs = jobs();
    let problem = Problem::new(&jobs).unwrap();
    let mut rng = ChaChaRng::seed_from_u64(3);

    for _ in 0..200 {
      let mut a = problem.gene_pool();
      let mut b = problem.gene_pool();
      a.shuffle(&mut rng);
      b.shuffle(&mut rng);

      let child = crossover(&Schedule::new(a), &Schedule::new(b), &problem, &mut rng);
      assert!(problem.is_valid_sequence(&child.job_sequence));
      assert_eq!(child.fitness, UNEVALUATED);
    }
  }

  #[test]
  fn crossover_keeps_a_slice_of_the_first_parent() {
    let problem = Problem::new(&jobs()).unwrap();
    let a = Schedule::new(vec![1, 1, 1, 2, 2, 2, 3, 3]);
    let b = Schedule::new(vec![3, 3, 2, 2, 2, 1, 1, 1]);
    let mut rng = ChaChaRng::seed_from_u64(4);

    for _ in 0..50 {
      let child = crossover(&a, &b, &problem, &mut rng);
      // The slice always starts in the first half
      let shared = child
        .job_sequence
        .iter()
        .zip(a.job_sequence.iter())
        .filter(|(x, y)| x == y)
        .count();
      assert!(shared >= 1);
      assert!(problem.is_valid_sequence(&child.job_sequence));
    }
  }

  #[test]
  fn crossover_fills_around_the_slice_from_the_second_parent() {
    let problem = Problem::new(&jobs()).unwrap();
    let a = Schedule::new(vec![1, 1, 1, 2, 2, 2, 3, 3]);
    let b = Schedule::new(vec![3, 3, 2, 2, 2, 1, 1, 1]);
    // Always draws the lowest value, the slice is [0, 1)
    let mut rng = StepRng::new(0, 0);

    let child = crossover(&a, &b, &problem, &mut rng);
    assert_eq!(child.job_sequence, vec![1, 3, 3, 2, 2, 2, 1, 1]);
  }

  #[test]
  fn crossover_handles_single_gene() {
    let jobs = vec![Job::new(7, vec![Operation::new(7, 1, "A", 1)])];
    let problem = Problem::new(&jobs).unwrap();
    let mut rng = ChaChaRng::seed_from_u64(6);
    let parent = Schedule::new(vec![7]);
    let child = crossover(&parent, &parent, &problem, &mut rng);
    assert_eq!(child.job_sequence, vec![7]);
  }

  #[test]
  fn mutate_only_permutes() {
    let problem = Problem::new(&jobs()).unwrap();
    let mut schedule = Schedule::new(problem.gene_pool());
    let mut rng = ChaChaRng::seed_from_u64(7);
    let mut changed = false;

    for _ in 0..50 {
      let before = schedule.job_sequence.clone();
      mutate(&mut schedule, &mut rng);
      assert!(problem.is_valid_sequence(&schedule.job_sequence));
      let differences = before
        .iter()
        .zip(schedule.job_sequence.iter())
        .filter(|(x, y)| x != y)
        .count();
      assert!(differences == 0 || differences == 2);
      changed |= differences > 0;
    }
    assert!(changed);
  }

  #[test]
  fn breed_population_keeps_best_in_first_slot() {
    let mut ga = GeneticAlgorithm::new(jobs(), Config::default()).unwrap();
    let mut population = ga.initialise_population();
    ga.evaluate_population(&mut population).unwrap();
    population.sort_by_key(|schedule| schedule.fitness);
    let best = population[0].clone();

    let next = ga.breed_population(&population, &best).unwrap();
    assert_eq!(next.len(), 50);
    assert_eq!(next[0], best);
    for child in &next[1..] {
      assert!(ga.problem().is_valid_sequence(&child.job_sequence));
      assert_eq!(child.fitness, UNEVALUATED);
    }
  }

  #[test]
  fn best_never_regresses() {
    let config = Config {
      population_size: 20,
      generations: 30,
      seed: 11,
      ..Config::default()
    };
    let mut ga = GeneticAlgorithm::new(jobs(), config).unwrap();
    let mut history = Vec::new();
    let result = ga
      .solve_with_observer(&mut |generation, best| history.push((generation, best.fitness)))
      .unwrap();

    assert_eq!(history.len(), 30);
    for ((g1, f1), (g2, f2)) in history.iter().zip(history.iter().skip(1)) {
      assert_eq!(g1 + 1, *g2);
      assert!(f2 <= f1);
    }
    assert_eq!(result.fitness, history[history.len() - 1].1);
  }

  #[test]
  fn same_seed_same_result() {
    let config = Config {
      seed: 42,
      ..Config::default()
    };
    let a = GeneticAlgorithm::new(jobs(), config.clone())
      .unwrap()
      .solve()
      .unwrap();
    let b = GeneticAlgorithm::new(jobs(), config).unwrap().solve().unwrap();
    assert_eq!(a.job_sequence, b.job_sequence);
    assert_eq!(a.fitness, b.fitness);
  }

  #[test]
  fn result_carries_evaluated_jobs() {
    let mut ga = GeneticAlgorithm::new(jobs(), Config::default()).unwrap();
    let schedule = ga.solve().unwrap();

    let evaluated = schedule.evaluated_jobs.as_ref().unwrap();
    verify_schedule(evaluated).unwrap();
    assert_eq!(crate::solver::makespan(evaluated), schedule.fitness);
    // Resource B alone is busy for 10
    assert!(schedule.fitness >= 10);
  }

  #[test]
  fn stagnation_limit_stops_early() {
    let config = Config {
      generations: 1000,
      stagnation_limit: Some(3),
      ..Config::default()
    };
    let single = vec![Job::new(
      1,
      vec![Operation::new(1, 1, "A", 2), Operation::new(1, 2, "B", 3)],
    )];
    let mut ga = GeneticAlgorithm::new(single, config).unwrap();
    let mut generations = 0;
    let schedule = ga
      .solve_with_observer(&mut |_, _| generations += 1)
      .unwrap();

    // Improves once in generation 0, then stalls
    assert_eq!(generations, 4);
    assert_eq!(schedule.fitness, 5);
  }

  #[test]
  fn zero_generations_still_returns_evaluated_schedule() {
    let config = Config {
      generations: 0,
      ..Config::default()
    };
    let schedule = GeneticAlgorithm::new(jobs(), config)
      .unwrap()
      .solve()
      .unwrap();
    assert!(schedule.is_evaluated());
    assert!(schedule.evaluated_jobs.is_some());
  }

  #[test]
  fn multi_start_returns_best_of_restarts() {
    let config = Config {
      population_size: 10,
      generations: 10,
      seed: 3,
      ..Config::default()
    };
    let best = solve_multi_start(&jobs(), &config, 4).unwrap();
    for restart in 0..4 {
      let single = GeneticAlgorithm::new(
        jobs(),
        Config {
          seed: 3 + restart,
          ..config.clone()
        },
      )
      .unwrap()
      .solve()
      .unwrap();
      assert!(best.fitness <= single.fitness);
    }
    assert!(solve_multi_start(&jobs(), &config, 0).is_err());
  }
}
