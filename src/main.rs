#[macro_use]
extern crate log;

use clap::{App, Arg, ArgMatches};
use jobshop::export::Exporter;
use jobshop::parser::parse_jobs;
use jobshop::solver::genetic_algorithm;
use jobshop::solver::{verify_schedule, SolverKind};
use std::fs;
use std::str::FromStr;

fn parse_value<T: FromStr>(matches: &ArgMatches, name: &str) -> Option<T> {
  return matches.value_of(name).map(|value| {
    value
      .parse()
      .unwrap_or_else(|_| panic!("Invalid value {:?} for --{}", value, name))
  });
}

fn main() {
  env_logger::init();

  let matches = App::new("jobshop")
    .version("1.0")
    .about("Genetic algorithm for the job shop scheduling problem")
    .arg(
      Arg::with_name("instance")
        .long("instance")
        .help("CSV file with the columns JobId,OperationId,Subdivision,ProcessingTime")
        .takes_value(true)
        .required(true),
    )
    .arg(
      Arg::with_name("solver")
        .long("solver")
        .help("Solver to use")
        .possible_values(SolverKind::NAMES)
        .takes_value(true)
        .default_value("genetic"),
    )
    .arg(
      Arg::with_name("format")
        .long("format")
        .help("Output format")
        .possible_values(Exporter::NAMES)
        .takes_value(true)
        .default_value("table"),
    )
    .arg(
      Arg::with_name("seed")
        .long("seed")
        .help("Seed for rng")
        .takes_value(true)
        .default_value("0"),
    )
    .arg(
      Arg::with_name("population-size")
        .long("population-size")
        .help("Individuals per generation")
        .takes_value(true),
    )
    .arg(
      Arg::with_name("generations")
        .long("generations")
        .help("Number of generations to breed")
        .takes_value(true),
    )
    .arg(
      Arg::with_name("tournament-size")
        .long("tournament-size")
        .help("Candidates per selection tournament")
        .takes_value(true),
    )
    .arg(
      Arg::with_name("stagnation-limit")
        .long("stagnation-limit")
        .help("Stop after this many generations without improvement")
        .takes_value(true),
    )
    .arg(
      Arg::with_name("restarts")
        .long("restarts")
        .help("Independent genetic algorithm runs, the best one is kept (sequential accepts only 1)")
        .takes_value(true)
        .default_value("1"),
    )
    .get_matches();

  let file = matches.value_of("instance").expect("Missing instance file");
  let solver: SolverKind = parse_value(&matches, "solver").expect("Missing solver");
  let exporter: Exporter = parse_value(&matches, "format").expect("Missing format");
  let restarts: usize = parse_value(&matches, "restarts").expect("Missing restarts");

  let defaults = genetic_algorithm::Config::default();
  let config = genetic_algorithm::Config {
    population_size: parse_value(&matches, "population-size").unwrap_or(defaults.population_size),
    generations: parse_value(&matches, "generations").unwrap_or(defaults.generations),
    tournament_size: parse_value(&matches, "tournament-size").unwrap_or(defaults.tournament_size),
    seed: parse_value(&matches, "seed").expect("Missing seed"),
    stagnation_limit: parse_value(&matches, "stagnation-limit"),
  };

  let contents = fs::read_to_string(file).expect("Error reading file");
  let jobs = parse_jobs(&contents).expect("Error parsing file");
  info!("Read {} jobs from {}", jobs.len(), file);

  let schedule = solver
    .solve(&jobs, &config, restarts)
    .expect("Solver failed");

  if let Some(evaluated) = &schedule.evaluated_jobs {
    verify_schedule(evaluated).expect("Verification failed");
  }

  let rendered = exporter
    .render(&schedule, &jobs)
    .expect("Export failed");
  print!("{}", rendered);
}
