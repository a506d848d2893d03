use std::collections::VecDeque;

use racebots_brain::{Genome, NeuralNetwork, format_genomes, genome_len_for, parse_genomes};
use rand::rngs::SmallRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use slotmap::SlotMap;
use tracing::{debug, error, info, warn};

use crate::agent::{Car, DeathCause, JumpPhase, Lineage, SensorReading};
use crate::config::RacebotsConfig;
use crate::course::Course;
use crate::evolution::breed;
use crate::geometry::Vec2;
use crate::{AgentId, Generation, SimulationError, Tick};

/// Fixed-size car storage with stable handles.
///
/// The population never grows or shrinks after construction; generations
/// reuse the same slots.
#[derive(Debug, Default)]
pub struct AgentArena {
    slots: SlotMap<AgentId, usize>,
    handles: Vec<AgentId>,
    cars: Vec<Car>,
}

impl AgentArena {
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: SlotMap::with_capacity_and_key(capacity),
            handles: Vec::with_capacity(capacity),
            cars: Vec::with_capacity(capacity),
        }
    }

    fn insert(&mut self, car: Car) -> AgentId {
        let index = self.cars.len();
        self.cars.push(car);
        let id = self.slots.insert(index);
        self.handles.push(id);
        id
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cars.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cars.is_empty()
    }

    /// Handles in dense iteration order.
    pub fn iter_handles(&self) -> impl Iterator<Item = AgentId> + '_ {
        self.handles.iter().copied()
    }

    #[must_use]
    pub fn index_of(&self, id: AgentId) -> Option<usize> {
        self.slots.get(id).copied()
    }

    #[must_use]
    pub fn get(&self, id: AgentId) -> Option<&Car> {
        self.index_of(id).map(|index| &self.cars[index])
    }

    #[must_use]
    pub fn cars(&self) -> &[Car] {
        &self.cars
    }

    fn cars_mut(&mut self) -> &mut [Car] {
        &mut self.cars
    }

    fn alive(&self) -> usize {
        self.cars.iter().filter(|car| car.is_alive()).count()
    }
}

/// Statistics of a finished generation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerationSummary {
    pub generation: Generation,
    pub ticks: Tick,
    pub best_fitness: f64,
    pub mean_fitness: f64,
    pub best_sections: usize,
    pub best_laps: usize,
}

/// Changes produced by one [`Simulation::step`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TickEvents {
    /// Tick within the generation that was just simulated.
    pub tick: Tick,
    pub generation: Generation,
    pub alive: usize,
    pub alive_changed: bool,
    pub deaths: usize,
    /// Set when this tick retired the last car and a new generation began.
    pub generation_rolled: Option<GenerationSummary>,
}

/// Read-only snapshot of one car for renderers.
#[derive(Debug, Clone, Copy)]
pub struct AgentView<'a> {
    pub id: AgentId,
    pub position: Vec2,
    pub heading: f64,
    pub sensors: &'a [SensorReading],
    pub anticipation: Option<&'a SensorReading>,
    pub alive: bool,
    pub fitness: f64,
    pub section: usize,
    pub lap: usize,
    pub jump_phase: JumpPhase,
    pub lineage: Lineage,
}

/// Population, course and generation loop.
#[derive(Debug)]
pub struct Simulation {
    config: RacebotsConfig,
    rng: SmallRng,
    course: Course,
    agents: AgentArena,
    generation: Generation,
    tick: Tick,
    alive: usize,
    best_fitness: f64,
    history: VecDeque<GenerationSummary>,
}

impl Simulation {
    /// Build a simulation on a freshly generated course.
    pub fn new(config: RacebotsConfig) -> Result<Self, SimulationError> {
        config.validate()?;
        let mut rng = config.seeded_rng();
        let course = Course::generate(&config.course, &mut rng)?;
        Self::assemble(config, rng, course)
    }

    /// Build a simulation on a caller-provided course.
    pub fn with_course(config: RacebotsConfig, course: Course) -> Result<Self, SimulationError> {
        config.validate()?;
        let rng = config.seeded_rng();
        Self::assemble(config, rng, course)
    }

    fn assemble(
        config: RacebotsConfig,
        mut rng: SmallRng,
        course: Course,
    ) -> Result<Self, SimulationError> {
        let sizes = config.brain.layer_sizes(&config.agent);
        let population = config.evolution.population_size;
        let mut agents = AgentArena::with_capacity(population);
        for _ in 0..population {
            let brain = NeuralNetwork::new(
                &sizes,
                config.brain.activation,
                config.brain.init_range,
                &mut rng,
            )?;
            agents.insert(Car::new(brain, &course, &config.agent));
        }
        info!(
            population,
            sections = course.len(),
            genome_len = genome_len_for(&sizes),
            "simulation initialised"
        );
        let history = VecDeque::with_capacity(config.history_capacity.min(1_024));
        Ok(Self {
            alive: population,
            config,
            rng,
            course,
            agents,
            generation: Generation::default(),
            tick: Tick::zero(),
            best_fitness: 0.0,
            history,
        })
    }

    /// Advance every living car by one tick.
    ///
    /// When the last car dies (or the generation tick cap is reached) the
    /// population is bred and reset before returning.
    pub fn step(&mut self) -> TickEvents {
        let previous_alive = self.alive;
        self.tick = self.tick.next();

        let deaths = self.stage_drive();
        if self.tick.0 >= self.config.evolution.max_generation_ticks && self.alive > 0 {
            debug!(tick = self.tick.0, survivors = self.alive, "generation tick cap reached");
            self.kill_all();
        }

        let mut events = TickEvents {
            tick: self.tick,
            generation: self.generation,
            alive: self.alive,
            alive_changed: false,
            deaths,
            generation_rolled: None,
        };

        if self.alive == 0 {
            match self.evolve() {
                Ok(summary) => {
                    events.generation = self.generation;
                    events.alive = self.alive;
                    events.generation_rolled = Some(summary);
                }
                Err(err) => error!(%err, "failed to breed next generation"),
            }
        }
        events.alive_changed = self.alive != previous_alive || events.generation_rolled.is_some();
        events
    }

    fn stage_drive(&mut self) -> usize {
        let course = &self.course;
        let config = &self.config.agent;
        let deaths: Vec<(usize, DeathCause)> = self
            .agents
            .cars_mut()
            .par_iter_mut()
            .enumerate()
            .filter_map(|(index, car)| car.step(course, config).map(|cause| (index, cause)))
            .collect();
        for (index, cause) in &deaths {
            debug!(agent = index, ?cause, tick = self.tick.0, "car retired");
        }
        self.alive = self.agents.alive();
        deaths.len()
    }

    /// Retire every surviving car with [`DeathCause::TimeLimit`].
    pub fn kill_all(&mut self) {
        let config = &self.config.agent;
        for car in self.agents.cars_mut() {
            car.kill(DeathCause::TimeLimit, config);
        }
        self.alive = 0;
    }

    /// Retire any survivors, breed the next generation and reset every car.
    pub fn evolve(&mut self) -> Result<GenerationSummary, SimulationError> {
        self.kill_all();
        let cars = self.agents.cars();
        let fitness: Vec<f64> = cars.iter().map(Car::fitness).collect();
        let genomes: Vec<Genome> = cars.iter().map(Car::genome).collect();
        let summary = self.summarize(&fitness);

        let offspring = breed(
            &genomes,
            &fitness,
            &self.config.evolution,
            self.config.brain.init_range,
            &mut self.rng,
        )?;
        let course = &self.course;
        let config = &self.config.agent;
        for (car, child) in self.agents.cars_mut().iter_mut().zip(&offspring) {
            car.reset(course, config, &child.genome, child.lineage)?;
        }

        self.best_fitness = self.best_fitness.max(summary.best_fitness);
        if self.history.len() == self.config.history_capacity {
            self.history.pop_front();
        }
        self.history.push_back(summary.clone());
        self.generation = self.generation.next();
        self.tick = Tick::zero();
        self.alive = self.agents.len();
        info!(
            generation = summary.generation.0,
            ticks = summary.ticks.0,
            best = summary.best_fitness,
            mean = summary.mean_fitness,
            sections = summary.best_sections,
            "generation complete"
        );
        Ok(summary)
    }

    fn summarize(&self, fitness: &[f64]) -> GenerationSummary {
        let cars = self.agents.cars();
        let best_fitness = fitness.iter().copied().fold(0.0_f64, f64::max);
        let mean_fitness = if fitness.is_empty() {
            0.0
        } else {
            fitness.iter().sum::<f64>() / fitness.len() as f64
        };
        let best_sections = cars.iter().map(Car::sections_passed).max().unwrap_or(0);
        GenerationSummary {
            generation: self.generation,
            ticks: self.tick,
            best_fitness,
            mean_fitness,
            best_sections,
            best_laps: best_sections / self.course.len(),
        }
    }

    fn restart_all(&mut self) {
        let course = &self.course;
        let config = &self.config.agent;
        for car in self.agents.cars_mut() {
            car.restart(course, config);
        }
        self.tick = Tick::zero();
        self.alive = self.agents.len();
    }

    /// Current genomes, one per line, in slot order.
    #[must_use]
    pub fn export_genomes(&self) -> String {
        let genomes = self.genomes();
        format_genomes(&genomes)
    }

    /// Load a genome batch and restart the generation.
    ///
    /// The batch is validated as a whole before any car changes. Short batches
    /// are cycled to fill the population; long batches are truncated. Returns
    /// the number of distinct genomes applied.
    pub fn import_genomes(&mut self, text: &str) -> Result<usize, SimulationError> {
        let expected = genome_len_for(&self.config.brain.layer_sizes(&self.config.agent));
        let genomes = parse_genomes(text, expected)?;
        if genomes.is_empty() {
            return Err(SimulationError::MalformedImport(
                "genome batch contains no genomes".to_owned(),
            ));
        }
        let population = self.agents.len();
        if genomes.len() > population {
            warn!(
                supplied = genomes.len(),
                population, "genome batch larger than population; truncating"
            );
        }
        let course = &self.course;
        let config = &self.config.agent;
        for (car, genome) in self
            .agents
            .cars_mut()
            .iter_mut()
            .zip(genomes.iter().cycle())
        {
            car.reset(course, config, genome, Lineage::Imported)?;
        }
        self.tick = Tick::zero();
        self.alive = population;
        let applied = genomes.len().min(population);
        info!(applied, population, "genomes imported");
        Ok(applied)
    }

    pub fn export_course(&self) -> Result<String, SimulationError> {
        self.course.to_json()
    }

    /// Replace the course from JSON and restart every car on it.
    pub fn import_course(&mut self, text: &str) -> Result<(), SimulationError> {
        let course = Course::from_json(text)?;
        self.replace_course(course);
        Ok(())
    }

    /// Generate a new course from the configured pipeline and restart every car on it.
    pub fn regenerate_course(&mut self) -> Result<(), SimulationError> {
        let course = Course::generate(&self.config.course, &mut self.rng)?;
        self.replace_course(course);
        Ok(())
    }

    fn replace_course(&mut self, course: Course) {
        info!(sections = course.len(), "course replaced");
        self.course = course;
        self.restart_all();
    }

    #[must_use]
    pub fn config(&self) -> &RacebotsConfig {
        &self.config
    }

    #[must_use]
    pub fn course(&self) -> &Course {
        &self.course
    }

    #[must_use]
    pub fn agents(&self) -> &AgentArena {
        &self.agents
    }

    #[must_use]
    pub const fn generation(&self) -> Generation {
        self.generation
    }

    #[must_use]
    pub const fn tick(&self) -> Tick {
        self.tick
    }

    #[must_use]
    pub const fn alive_count(&self) -> usize {
        self.alive
    }

    #[must_use]
    pub fn population_size(&self) -> usize {
        self.agents.len()
    }

    /// Best fitness over all completed generations.
    #[must_use]
    pub const fn best_fitness(&self) -> f64 {
        self.best_fitness
    }

    /// Most recent generation summaries, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &GenerationSummary> + '_ {
        self.history.iter()
    }

    #[must_use]
    pub fn genomes(&self) -> Vec<Genome> {
        self.agents.cars().iter().map(Car::genome).collect()
    }

    /// Snapshot every car for drawing.
    pub fn agent_views(&self) -> impl Iterator<Item = AgentView<'_>> + '_ {
        let agent_config = &self.config.agent;
        self.agents.iter_handles().zip(self.agents.cars()).map(move |(id, car)| AgentView {
            id,
            position: car.position(),
            heading: car.heading(),
            sensors: car.sensors(),
            anticipation: car.anticipation(),
            alive: car.is_alive(),
            fitness: car.fitness(),
            section: car.section(&self.course),
            lap: car.lap(&self.course),
            jump_phase: car.jump_phase(agent_config),
            lineage: car.lineage(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config(seed: u64) -> RacebotsConfig {
        let mut config = RacebotsConfig {
            rng_seed: Some(seed),
            ..RacebotsConfig::default()
        };
        config.evolution.population_size = 12;
        config.evolution.max_generation_ticks = 150;
        config
    }

    #[test]
    fn new_simulation_fills_population() {
        let sim = Simulation::new(small_config(3)).expect("simulation");
        assert_eq!(sim.population_size(), 12);
        assert_eq!(sim.alive_count(), 12);
        assert_eq!(sim.generation(), Generation(0));
        assert_eq!(sim.agent_views().count(), 12);
        let handles: Vec<AgentId> = sim.agents().iter_handles().collect();
        assert_eq!(sim.agents().index_of(handles[5]), Some(5));
        assert!(sim.agents().get(handles[0]).is_some());
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut config = small_config(1);
        config.evolution.population_size = 0;
        assert!(matches!(
            Simulation::new(config),
            Err(SimulationError::InvalidConfig(_))
        ));
    }

    #[test]
    fn tick_cap_rolls_the_generation() {
        let mut sim = Simulation::new(small_config(9)).expect("simulation");
        let mut rolled = None;
        for _ in 0..150 {
            let events = sim.step();
            if events.generation_rolled.is_some() {
                rolled = Some(events);
                break;
            }
        }
        let events = rolled.expect("generation should end within the tick cap");
        assert_eq!(events.generation, Generation(1));
        assert_eq!(events.alive, 12);
        assert_eq!(sim.tick(), Tick::zero());
        assert_eq!(sim.alive_count(), 12);
        assert_eq!(sim.history().count(), 1);
        assert!(sim.agent_views().all(|view| view.alive));
    }

    #[test]
    fn history_is_bounded() {
        let mut config = small_config(4);
        config.history_capacity = 2;
        let mut sim = Simulation::new(config).expect("simulation");
        for _ in 0..3 {
            sim.evolve().expect("evolve");
        }
        let generations: Vec<u32> = sim.history().map(|s| s.generation.0).collect();
        assert_eq!(generations, vec![1, 2]);
        assert_eq!(sim.generation(), Generation(3));
    }

    #[test]
    fn genome_export_then_import_restores_population() {
        let mut sim = Simulation::new(small_config(5)).expect("simulation");
        let text = sim.export_genomes();
        let before = sim.genomes();
        for _ in 0..10 {
            sim.step();
        }
        sim.evolve().expect("evolve");
        assert_eq!(sim.import_genomes(&text).expect("import"), 12);
        assert_eq!(sim.genomes(), before);
        assert!(sim.agent_views().all(|view| view.lineage == Lineage::Imported));
    }

    #[test]
    fn short_genome_batches_cycle() {
        let mut sim = Simulation::new(small_config(6)).expect("simulation");
        let genomes = sim.genomes();
        let text = format_genomes(&genomes[..2]);
        assert_eq!(sim.import_genomes(&text).expect("import"), 2);
        let after = sim.genomes();
        for (index, genome) in after.iter().enumerate() {
            assert_eq!(genome, &genomes[index % 2]);
        }
    }

    #[test]
    fn empty_genome_batch_is_rejected() {
        let mut sim = Simulation::new(small_config(7)).expect("simulation");
        assert!(matches!(
            sim.import_genomes("\n\n"),
            Err(SimulationError::MalformedImport(_))
        ));
    }

    #[test]
    fn regenerating_the_course_restarts_cars() {
        let mut sim = Simulation::new(small_config(8)).expect("simulation");
        for _ in 0..5 {
            sim.step();
        }
        let before = sim.course().clone();
        sim.regenerate_course().expect("course");
        assert_ne!(sim.course(), &before);
        assert_eq!(sim.tick(), Tick::zero());
        let (start, _) = sim.course().start_pose();
        assert!(sim.agent_views().all(|view| view.position == start && view.section == 0));
    }
}
