use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use racebots_core::{Course, RacebotsConfig, Simulation};
use rand::{SeedableRng, rngs::SmallRng};
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "racebots",
    version,
    about = "Evolve neural-network cars on procedurally generated courses"
)]
struct Cli {
    /// JSON configuration file; missing fields fall back to defaults.
    #[arg(short, long, env = "RACEBOTS_CONFIG")]
    config: Option<PathBuf>,

    /// Override the RNG seed from the configuration.
    #[arg(long, env = "RACEBOTS_SEED")]
    seed: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run generations headlessly and report their statistics.
    Run {
        /// Number of generations to complete.
        #[arg(short, long, default_value_t = 20)]
        generations: u32,
        /// Override the population size.
        #[arg(long)]
        population: Option<usize>,
        /// Genome batch to load before the first tick.
        #[arg(long)]
        genomes: Option<PathBuf>,
        /// Course JSON to drive on instead of a generated one.
        #[arg(long)]
        course: Option<PathBuf>,
        /// Write the final genomes here.
        #[arg(long)]
        export_genomes: Option<PathBuf>,
        /// Write the course JSON here.
        #[arg(long)]
        export_course: Option<PathBuf>,
    },
    /// Generate a course and print (or write) it as JSON.
    Course {
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print the effective configuration as JSON.
    Config,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let mut config = load_config(cli.config.as_deref())?;
    if let Some(seed) = cli.seed {
        config.rng_seed = Some(seed);
    }

    match cli.command {
        Command::Run {
            generations,
            population,
            genomes,
            course,
            export_genomes,
            export_course,
        } => {
            if let Some(population) = population {
                config.evolution.population_size = population;
            }
            let mut sim = match course {
                Some(path) => {
                    let text = read(&path)?;
                    let course = Course::from_json(&text)
                        .with_context(|| format!("invalid course in {}", path.display()))?;
                    Simulation::with_course(config, course)?
                }
                None => Simulation::new(config)?,
            };
            if let Some(path) = genomes {
                let text = read(&path)?;
                let applied = sim
                    .import_genomes(&text)
                    .with_context(|| format!("invalid genome batch in {}", path.display()))?;
                info!(applied, path = %path.display(), "loaded genomes");
            }

            run_generations(&mut sim, generations);

            if let Some(path) = export_genomes {
                write(&path, &sim.export_genomes())?;
            }
            if let Some(path) = export_course {
                write(&path, &sim.export_course()?)?;
            }
        }
        Command::Course { output } => {
            config.validate()?;
            let seed = config.rng_seed.unwrap_or_else(rand::random);
            let mut rng = SmallRng::seed_from_u64(seed);
            let course = Course::generate(&config.course, &mut rng)?;
            info!(seed, sections = course.len(), "generated course");
            let json = course.to_json()?;
            match output {
                Some(path) => write(&path, &json)?,
                None => println!("{json}"),
            }
        }
        Command::Config => {
            config.validate()?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn load_config(path: Option<&Path>) -> Result<RacebotsConfig> {
    let Some(path) = path else {
        return Ok(RacebotsConfig::default());
    };
    let text = read(path)?;
    let config: RacebotsConfig = serde_json::from_str(&text)
        .with_context(|| format!("failed to parse config {}", path.display()))?;
    if let Err(err) = config.validate() {
        bail!("config {} rejected: {err}", path.display());
    }
    Ok(config)
}

fn read(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

fn write(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents).with_context(|| format!("failed to write {}", path.display()))?;
    info!(path = %path.display(), bytes = contents.len(), "wrote file");
    Ok(())
}

fn run_generations(sim: &mut Simulation, generations: u32) {
    let target = sim.generation().0.saturating_add(generations);
    info!(
        target,
        population = sim.population_size(),
        sections = sim.course().len(),
        "starting run"
    );
    println!(
        "{:>5} {:>7} {:>10} {:>10} {:>9} {:>5}",
        "gen", "ticks", "best", "mean", "sections", "laps"
    );
    while sim.generation().0 < target {
        let events = sim.step();
        if let Some(summary) = events.generation_rolled {
            println!(
                "{:>5} {:>7} {:>10.3} {:>10.3} {:>9} {:>5}",
                summary.generation.0,
                summary.ticks.0,
                summary.best_fitness,
                summary.mean_fitness,
                summary.best_sections,
                summary.best_laps
            );
        }
    }
    info!(best = sim.best_fitness(), generations, "run complete");
}
