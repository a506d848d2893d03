//! Static configuration for a RaceBots simulation.

use racebots_brain::{Activation, CrossoverKind};
use rand::{SeedableRng, rngs::SmallRng};
use serde::{Deserialize, Serialize};
use std::f64::consts::{FRAC_PI_2, FRAC_PI_4, PI};

use crate::{DECISION_COUNT, SimulationError};

/// Top-level configuration bundle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RacebotsConfig {
    /// Optional RNG seed for reproducible runs.
    pub rng_seed: Option<u64>,
    /// Maximum number of generation summaries retained in memory.
    pub history_capacity: usize,
    pub course: CourseConfig,
    pub agent: AgentConfig,
    pub brain: BrainConfig,
    pub evolution: EvolutionConfig,
}

impl Default for RacebotsConfig {
    fn default() -> Self {
        Self {
            rng_seed: None,
            history_capacity: 256,
            course: CourseConfig::default(),
            agent: AgentConfig::default(),
            brain: BrainConfig::default(),
            evolution: EvolutionConfig::default(),
        }
    }
}

/// Parameters of the procedural course pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CourseConfig {
    /// Number of random points sampled before taking the hull.
    pub point_count: usize,
    /// Width of the sampling field, centred on the origin.
    pub field_width: f64,
    /// Height of the sampling field, centred on the origin.
    pub field_height: f64,
    /// Maximum outward displacement of inserted edge midpoints, as a fraction of the edge length.
    pub midpoint_displacement: f64,
    /// Number of relaxation passes over the hull.
    pub relax_passes: usize,
    /// Minimum interior angle (radians) enforced at every hull vertex.
    pub min_angle: f64,
    /// Minimum distance enforced between any two hull vertices.
    pub min_spacing: f64,
    /// Spline samples emitted along the longest hull edge.
    pub resolution: usize,
    /// Distance from the centre line to each corridor wall.
    pub half_width: f64,
    /// Global scale applied to every emitted point.
    pub scale: f64,
    /// Probability that a gate carries an obstacle.
    pub obstacle_chance: f64,
    /// Fraction of the gate width an obstacle spans, measured from its anchored wall.
    pub obstacle_span: f64,
    /// Number of gates after the start that never carry obstacles.
    pub obstacle_clearance: usize,
    /// Resampling attempts before giving up on a degenerate hull.
    pub max_attempts: usize,
}

impl Default for CourseConfig {
    fn default() -> Self {
        Self {
            point_count: 12,
            field_width: 1_200.0,
            field_height: 800.0,
            midpoint_displacement: 0.2,
            relax_passes: 5,
            min_angle: 2.0 * PI / 3.0,
            min_spacing: 80.0,
            resolution: 40,
            half_width: 25.0,
            scale: 1.0,
            obstacle_chance: 0.03,
            obstacle_span: 0.5,
            obstacle_clearance: 8,
            max_attempts: 32,
        }
    }
}

/// Physical, sensing and decision parameters shared by every car.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AgentConfig {
    /// Collision radius.
    pub radius: f64,
    /// Maximum length of each sensor ray.
    pub sensor_range: f64,
    /// Sensor ray offsets from the heading, in radians.
    pub sensor_angles: Vec<f64>,
    /// Whether the forward anticipation ray feeds the controller.
    pub anticipation_ray: bool,
    /// Number of quads ahead (including the current one) whose walls are active.
    pub wall_lookahead: usize,
    /// Forward thrust applied while driving.
    pub acceleration: f64,
    /// Lateral force applied while turning.
    pub steer_acceleration: f64,
    /// Speed cap while driving.
    pub max_speed: f64,
    /// Speed cap while coasting.
    pub coast_max_speed: f64,
    /// Speed at the start gate.
    pub initial_speed: f64,
    /// Winning controller activations below this value coast instead.
    pub decision_threshold: f64,
    /// Ticks a jump lasts.
    pub jump_duration: u32,
    /// Jumps allowed per generation.
    pub jump_quota: u32,
    /// Consecutive ticks without a section advance before the car is retired.
    pub stall_limit: u32,
    /// Exponent applied to `sections + 1` in the fitness formula.
    pub progress_exponent: f64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            radius: 8.0,
            sensor_range: 120.0,
            sensor_angles: vec![-FRAC_PI_2, -FRAC_PI_4, 0.0, FRAC_PI_4, FRAC_PI_2],
            anticipation_ray: true,
            wall_lookahead: 1,
            acceleration: 0.2,
            steer_acceleration: 0.6,
            max_speed: 5.0,
            coast_max_speed: 2.5,
            initial_speed: 1.0,
            decision_threshold: 0.5,
            jump_duration: 20,
            jump_quota: 3,
            stall_limit: 90,
            progress_exponent: 2.0,
        }
    }
}

impl AgentConfig {
    /// Controller input width: one slot per sensor plus the anticipation ray.
    #[must_use]
    pub fn input_size(&self) -> usize {
        self.sensor_angles.len() + usize::from(self.anticipation_ray)
    }
}

/// Controller topology.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BrainConfig {
    /// Hidden layer sizes between the sensor inputs and the decision outputs.
    pub hidden_layers: Vec<usize>,
    pub activation: Activation,
    /// Genes are drawn from `[-init_range, init_range)`.
    pub init_range: f64,
}

impl Default for BrainConfig {
    fn default() -> Self {
        Self {
            hidden_layers: vec![6],
            activation: Activation::Sigmoid,
            init_range: 1.0,
        }
    }
}

impl BrainConfig {
    /// Full layer stack for a car using `agent`'s sensors.
    #[must_use]
    pub fn layer_sizes(&self, agent: &AgentConfig) -> Vec<usize> {
        let mut sizes = Vec::with_capacity(self.hidden_layers.len() + 2);
        sizes.push(agent.input_size());
        sizes.extend_from_slice(&self.hidden_layers);
        sizes.push(DECISION_COUNT);
        sizes
    }
}

/// Population size and genetic operator settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EvolutionConfig {
    pub population_size: usize,
    /// Tickets awarded to the fittest agent; others get a floored proportional share.
    pub tickets: u32,
    /// Share of the next generation copied verbatim from the fittest genomes.
    pub elite_fraction: f64,
    /// Share of the next generation drawn fresh at random.
    pub random_fraction: f64,
    /// Share of crossover offspring mutated with `hard_flip_probability`.
    pub hard_mutation_fraction: f64,
    /// Share of crossover offspring mutated with `soft_flip_probability`.
    pub soft_mutation_fraction: f64,
    pub hard_flip_probability: f64,
    pub soft_flip_probability: f64,
    pub crossover: CrossoverKind,
    /// Ticks after which surviving cars are retired and the generation ends.
    pub max_generation_ticks: u64,
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        Self {
            population_size: 100,
            tickets: 10,
            elite_fraction: 0.08,
            random_fraction: 0.12,
            hard_mutation_fraction: 0.2,
            soft_mutation_fraction: 0.2,
            hard_flip_probability: 0.1,
            soft_flip_probability: 0.02,
            crossover: CrossoverKind::SinglePoint,
            max_generation_ticks: 2_000,
        }
    }
}

fn is_probability(value: f64) -> bool {
    (0.0..=1.0).contains(&value)
}

impl RacebotsConfig {
    /// Reject configurations the simulation cannot run with.
    pub fn validate(&self) -> Result<(), SimulationError> {
        let course = &self.course;
        if course.point_count < 4 {
            return Err(SimulationError::InvalidConfig(
                "course.point_count must be at least 4",
            ));
        }
        if course.field_width <= 0.0 || course.field_height <= 0.0 || course.scale <= 0.0 {
            return Err(SimulationError::InvalidConfig(
                "course field dimensions and scale must be positive",
            ));
        }
        if course.resolution == 0 || course.half_width <= 0.0 || course.max_attempts == 0 {
            return Err(SimulationError::InvalidConfig(
                "course resolution, half_width and max_attempts must be positive",
            ));
        }
        if course.min_angle < 0.0 || course.min_angle >= PI || course.min_spacing < 0.0 {
            return Err(SimulationError::InvalidConfig(
                "course min_angle must be in [0, pi) and min_spacing non-negative",
            ));
        }
        if course.midpoint_displacement < 0.0
            || !is_probability(course.obstacle_chance)
            || !is_probability(course.obstacle_span)
        {
            return Err(SimulationError::InvalidConfig(
                "course displacement must be non-negative, obstacle chance and span in [0, 1]",
            ));
        }

        let agent = &self.agent;
        if agent.radius <= 0.0 || agent.sensor_range <= 0.0 {
            return Err(SimulationError::InvalidConfig(
                "agent radius and sensor_range must be positive",
            ));
        }
        if agent.sensor_angles.is_empty() {
            return Err(SimulationError::InvalidConfig(
                "agent needs at least one sensor ray",
            ));
        }
        if agent.wall_lookahead == 0 || agent.stall_limit == 0 {
            return Err(SimulationError::InvalidConfig(
                "agent wall_lookahead and stall_limit must be positive",
            ));
        }
        if agent.max_speed <= 0.0
            || agent.coast_max_speed < 0.0
            || agent.coast_max_speed > agent.max_speed
            || agent.acceleration < 0.0
            || agent.steer_acceleration < 0.0
            || agent.initial_speed < 0.0
        {
            return Err(SimulationError::InvalidConfig(
                "agent speeds and accelerations must be non-negative with coast_max_speed <= max_speed",
            ));
        }
        if agent.progress_exponent < 0.0 {
            return Err(SimulationError::InvalidConfig(
                "agent progress_exponent must be non-negative",
            ));
        }

        if self.brain.hidden_layers.contains(&0) {
            return Err(SimulationError::InvalidConfig(
                "brain hidden layers must be non-empty",
            ));
        }

        let evolution = &self.evolution;
        if evolution.population_size == 0 || evolution.tickets == 0 {
            return Err(SimulationError::InvalidConfig(
                "evolution population_size and tickets must be positive",
            ));
        }
        let fractions = [
            evolution.elite_fraction,
            evolution.random_fraction,
            evolution.hard_mutation_fraction,
            evolution.soft_mutation_fraction,
        ];
        if !fractions.iter().all(|f| is_probability(*f)) || fractions.iter().sum::<f64>() > 1.0 {
            return Err(SimulationError::InvalidConfig(
                "evolution fractions must be in [0, 1] and sum to at most 1",
            ));
        }
        if !is_probability(evolution.hard_flip_probability)
            || !is_probability(evolution.soft_flip_probability)
        {
            return Err(SimulationError::InvalidConfig(
                "evolution flip probabilities must be in [0, 1]",
            ));
        }
        if evolution.max_generation_ticks == 0 || self.history_capacity == 0 {
            return Err(SimulationError::InvalidConfig(
                "max_generation_ticks and history_capacity must be positive",
            ));
        }
        Ok(())
    }

    /// RNG seeded from `rng_seed`, or from entropy when absent.
    pub(crate) fn seeded_rng(&self) -> SmallRng {
        match self.rng_seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => {
                let seed: u64 = rand::random();
                SmallRng::seed_from_u64(seed)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(RacebotsConfig::default().validate().is_ok());
    }

    #[test]
    fn layer_sizes_follow_sensor_fan() {
        let config = RacebotsConfig::default();
        assert_eq!(config.brain.layer_sizes(&config.agent), vec![6, 6, DECISION_COUNT]);

        let agent = AgentConfig {
            anticipation_ray: false,
            ..AgentConfig::default()
        };
        assert_eq!(agent.input_size(), 5);
    }

    #[test]
    fn overlapping_partitions_are_rejected() {
        let mut config = RacebotsConfig::default();
        config.evolution.elite_fraction = 0.6;
        config.evolution.random_fraction = 0.6;
        assert!(matches!(
            config.validate(),
            Err(SimulationError::InvalidConfig(_))
        ));
    }

    #[test]
    fn coast_cap_cannot_exceed_drive_cap() {
        let mut config = RacebotsConfig::default();
        config.agent.coast_max_speed = config.agent.max_speed + 1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: RacebotsConfig = serde_json::from_str(
            r#"{ "rng_seed": 7, "evolution": { "population_size": 12 } }"#,
        )
        .expect("parse");
        assert_eq!(config.rng_seed, Some(7));
        assert_eq!(config.evolution.population_size, 12);
        assert_eq!(config.evolution.tickets, 10);
        assert_eq!(config.agent, AgentConfig::default());
    }
}
