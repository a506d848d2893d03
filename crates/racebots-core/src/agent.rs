//! Cars: sensing, control, motion and retirement.

use racebots_brain::{BrainError, Genome, NeuralNetwork};
use serde::{Deserialize, Serialize};

use crate::DECISION_COUNT;
use crate::config::AgentConfig;
use crate::course::Course;
use crate::geometry::{Boundary, QUAD_EPSILON, Ray, Vec2, quad_contains};

/// Action chosen by the controller for one tick.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Decision {
    TurnLeft,
    TurnRight,
    Coast,
    Jump,
}

impl Decision {
    /// Decisions in controller output order.
    pub const ALL: [Self; DECISION_COUNT] = [Self::TurnLeft, Self::TurnRight, Self::Coast, Self::Jump];
}

/// Pick the decision whose output is largest.
///
/// Ties go to the earliest output. A winner below `threshold` (or an output
/// vector of the wrong width) coasts.
#[must_use]
pub fn decide(outputs: &[f64], threshold: f64) -> Decision {
    if outputs.len() != DECISION_COUNT {
        return Decision::Coast;
    }
    let mut best = 0;
    for (index, value) in outputs.iter().enumerate().skip(1) {
        if *value > outputs[best] {
            best = index;
        }
    }
    if outputs[best] >= threshold {
        Decision::ALL[best]
    } else {
        Decision::Coast
    }
}

/// Why a car stopped.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum DeathCause {
    /// A sensor ray reported a wall closer than the car radius.
    SensorWall,
    /// The car body touched an active wall.
    WallContact,
    /// The car body touched the active obstacle while grounded.
    Obstacle,
    /// The car left the corridor.
    OffCourse,
    /// Too many ticks without passing a gate.
    Stalled,
    /// The generation ran out of ticks.
    TimeLimit,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AgentState {
    Driving,
    /// Airborne; `elapsed` ticks since takeoff.
    Jumping { elapsed: u32 },
    Dead { cause: DeathCause },
}

/// Coarse jump animation phase for renderers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum JumpPhase {
    #[default]
    Idle,
    Ascending,
    Descending,
}

/// How a car's current genome came to be.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum Lineage {
    /// Randomly initialised at construction.
    #[default]
    Founder,
    Elite,
    Random,
    HardMutated,
    SoftMutated,
    Offspring,
    Imported,
}

/// Fitness for a car that passed `sections` gates over `distance` units.
#[must_use]
pub fn fitness(sections: usize, distance: f64, exponent: f64) -> f64 {
    ((sections as f64 + 1.0).powf(exponent) * distance.max(0.0)).cbrt()
}

/// Last reading of one ray.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorReading {
    /// Distance to the hit, or the ray length when nothing was hit.
    pub distance: f64,
    pub endpoint: Vec2,
    pub hit: bool,
}

impl SensorReading {
    fn clear(origin: Vec2, range: f64) -> Self {
        Self {
            distance: range,
            endpoint: origin,
            hit: false,
        }
    }
}

/// One population member.
#[derive(Debug, Clone)]
pub struct Car {
    position: Vec2,
    velocity: Vec2,
    acceleration: Vec2,
    heading: f64,
    state: AgentState,
    sections_passed: usize,
    ticks_since_advance: u32,
    distance: f64,
    fitness: f64,
    jumps_used: u32,
    decision: Decision,
    sensors: Vec<SensorReading>,
    anticipation: Option<SensorReading>,
    inputs: Vec<f64>,
    walls: Vec<Boundary>,
    obstacle: Option<Boundary>,
    brain: NeuralNetwork,
    lineage: Lineage,
}

impl Car {
    /// Car at the start gate of `course`, driving with `brain`.
    #[must_use]
    pub fn new(brain: NeuralNetwork, course: &Course, config: &AgentConfig) -> Self {
        let mut car = Self {
            position: Vec2::ZERO,
            velocity: Vec2::ZERO,
            acceleration: Vec2::ZERO,
            heading: 0.0,
            state: AgentState::Driving,
            sections_passed: 0,
            ticks_since_advance: 0,
            distance: 0.0,
            fitness: 0.0,
            jumps_used: 0,
            decision: Decision::Coast,
            sensors: Vec::with_capacity(config.sensor_angles.len()),
            anticipation: None,
            inputs: Vec::with_capacity(config.input_size()),
            walls: Vec::with_capacity(config.wall_lookahead * 2),
            obstacle: None,
            brain,
            lineage: Lineage::Founder,
        };
        car.restart(course, config);
        car
    }

    /// Load `genome` and restart at the start gate.
    ///
    /// On a length mismatch the car is left untouched.
    pub fn reset(
        &mut self,
        course: &Course,
        config: &AgentConfig,
        genome: &[f64],
        lineage: Lineage,
    ) -> Result<(), BrainError> {
        self.brain.import_genes(genome)?;
        self.lineage = lineage;
        self.restart(course, config);
        Ok(())
    }

    /// Restart at the start gate, keeping the current brain.
    pub fn restart(&mut self, course: &Course, config: &AgentConfig) {
        let (position, direction) = course.start_pose();
        self.position = position;
        self.velocity = direction * config.initial_speed;
        self.acceleration = Vec2::ZERO;
        self.heading = direction.heading();
        self.state = AgentState::Driving;
        self.sections_passed = 0;
        self.ticks_since_advance = 0;
        self.distance = 0.0;
        self.fitness = 0.0;
        self.jumps_used = 0;
        self.decision = Decision::Coast;
        self.sensors.clear();
        self.sensors.extend(
            config
                .sensor_angles
                .iter()
                .map(|_| SensorReading::clear(position, config.sensor_range)),
        );
        self.anticipation = None;
        self.bind_section(course, config);
    }

    fn bind_section(&mut self, course: &Course, config: &AgentConfig) {
        self.walls.clear();
        for offset in 0..config.wall_lookahead {
            self.walls
                .extend_from_slice(&course.walls(self.sections_passed + offset));
        }
        self.obstacle = course.obstacle(self.sections_passed).copied();
    }

    /// Advance one tick. Returns the cause if the car died during this tick.
    pub fn step(&mut self, course: &Course, config: &AgentConfig) -> Option<DeathCause> {
        if !self.is_alive() {
            return None;
        }
        if let AgentState::Jumping { elapsed } = self.state {
            let elapsed = elapsed + 1;
            self.state = if elapsed > config.jump_duration {
                AgentState::Driving
            } else {
                AgentState::Jumping { elapsed }
            };
        }

        self.sense(course, config);
        if self.sensors.iter().any(|reading| reading.distance < config.radius) {
            return self.retire(DeathCause::SensorWall, config);
        }

        let decision = self.think(config);
        self.actuate(decision, config);
        self.check_progress(course, config)
            .and_then(|cause| self.retire(cause, config))
    }

    fn sense(&mut self, course: &Course, config: &AgentConfig) {
        for (reading, offset) in self.sensors.iter_mut().zip(&config.sensor_angles) {
            let ray = Ray::new(
                self.position,
                Vec2::from_angle(self.heading + offset),
                config.sensor_range,
            );
            *reading = match ray.cast_nearest(&self.walls) {
                Some(hit) => SensorReading {
                    distance: hit.distance,
                    endpoint: hit.point,
                    hit: true,
                },
                None => SensorReading {
                    distance: config.sensor_range,
                    endpoint: ray.end(),
                    hit: false,
                },
            };
        }

        self.anticipation = config.anticipation_ray.then(|| {
            let target = course.section(self.sections_passed + 2).mid;
            let ray = Ray::towards(self.position, target);
            let ahead = [
                course.obstacle(self.sections_passed + 1),
                course.obstacle(self.sections_passed + 2),
            ];
            match ray.cast_nearest(ahead.into_iter().flatten().chain(&self.walls)) {
                Some(hit) => SensorReading {
                    distance: hit.distance,
                    endpoint: hit.point,
                    hit: true,
                },
                None => SensorReading {
                    distance: ray.length,
                    endpoint: target,
                    hit: false,
                },
            }
        });
    }

    fn think(&mut self, config: &AgentConfig) -> Decision {
        self.inputs.clear();
        let range = config.sensor_range;
        self.inputs.extend(
            self.sensors
                .iter()
                .chain(self.anticipation.as_ref())
                .map(|reading| (reading.distance / range).clamp(0.0, 1.0)),
        );
        self.decision = self
            .brain
            .feedforward(&self.inputs)
            .map_or(Decision::Coast, |outputs| {
                decide(&outputs, config.decision_threshold)
            });
        self.decision
    }

    fn actuate(&mut self, decision: Decision, config: &AgentConfig) {
        if matches!(self.state, AgentState::Jumping { .. }) {
            // airborne cars keep their velocity
            self.acceleration = Vec2::ZERO;
        } else {
            let forward = if self.velocity == Vec2::ZERO {
                Vec2::from_angle(self.heading)
            } else {
                self.velocity.normalized()
            };
            let thrust = forward * config.acceleration;
            let lateral = forward.perpendicular() * config.steer_acceleration;
            self.acceleration = match decision {
                Decision::TurnLeft => thrust + lateral,
                Decision::TurnRight => thrust - lateral,
                Decision::Coast => Vec2::ZERO,
                Decision::Jump => {
                    if self.jumps_used < config.jump_quota {
                        self.jumps_used += 1;
                        self.state = AgentState::Jumping { elapsed: 0 };
                    }
                    thrust
                }
            };
            let cap = if decision == Decision::Coast {
                config.coast_max_speed
            } else {
                config.max_speed
            };
            self.velocity = (self.velocity + self.acceleration).limited(cap);
        }

        if self.velocity != Vec2::ZERO {
            self.heading = self.velocity.heading();
        }
        self.position += self.velocity;
        self.distance += self.velocity.length();
    }

    fn check_progress(&mut self, course: &Course, config: &AgentConfig) -> Option<DeathCause> {
        if self
            .walls
            .iter()
            .any(|wall| wall.distance_to(self.position) < config.radius)
        {
            return Some(DeathCause::WallContact);
        }

        let current = self.sections_passed;
        if quad_contains(&course.quad(current), self.position, QUAD_EPSILON) {
            self.ticks_since_advance += 1;
        } else if let Some(ahead) = (1..=2)
            .find(|offset| quad_contains(&course.quad(current + offset), self.position, QUAD_EPSILON))
        {
            self.sections_passed += ahead;
            self.ticks_since_advance = 0;
            self.bind_section(course, config);
        } else if current > 0
            && quad_contains(&course.quad(current - 1), self.position, QUAD_EPSILON)
        {
            self.ticks_since_advance += 1;
        } else {
            return Some(DeathCause::OffCourse);
        }

        if self.ticks_since_advance > config.stall_limit {
            return Some(DeathCause::Stalled);
        }

        let grounded = !matches!(self.state, AgentState::Jumping { .. });
        if grounded
            && self
                .obstacle
                .is_some_and(|obstacle| obstacle.distance_to(self.position) < config.radius)
        {
            return Some(DeathCause::Obstacle);
        }
        None
    }

    fn retire(&mut self, cause: DeathCause, config: &AgentConfig) -> Option<DeathCause> {
        self.kill(cause, config);
        Some(cause)
    }

    /// Stop the car and freeze its fitness. Dead cars are left as they are.
    pub fn kill(&mut self, cause: DeathCause, config: &AgentConfig) {
        if !self.is_alive() {
            return;
        }
        self.state = AgentState::Dead { cause };
        self.fitness = fitness(self.sections_passed, self.distance, config.progress_exponent);
        self.velocity = Vec2::ZERO;
        self.acceleration = Vec2::ZERO;
    }

    #[must_use]
    pub const fn is_alive(&self) -> bool {
        !matches!(self.state, AgentState::Dead { .. })
    }

    #[must_use]
    pub const fn state(&self) -> AgentState {
        self.state
    }

    #[must_use]
    pub const fn position(&self) -> Vec2 {
        self.position
    }

    #[must_use]
    pub const fn velocity(&self) -> Vec2 {
        self.velocity
    }

    #[must_use]
    pub const fn acceleration(&self) -> Vec2 {
        self.acceleration
    }

    /// Heading in radians.
    #[must_use]
    pub const fn heading(&self) -> f64 {
        self.heading
    }

    /// Fitness frozen at death; zero while alive.
    #[must_use]
    pub const fn fitness(&self) -> f64 {
        self.fitness
    }

    #[must_use]
    pub const fn sections_passed(&self) -> usize {
        self.sections_passed
    }

    /// Index of the gate the car last passed.
    #[must_use]
    pub fn section(&self, course: &Course) -> usize {
        self.sections_passed % course.len()
    }

    /// Completed laps.
    #[must_use]
    pub fn lap(&self, course: &Course) -> usize {
        self.sections_passed / course.len()
    }

    /// Total distance travelled.
    #[must_use]
    pub const fn distance(&self) -> f64 {
        self.distance
    }

    #[must_use]
    pub const fn jumps_used(&self) -> u32 {
        self.jumps_used
    }

    #[must_use]
    pub const fn decision(&self) -> Decision {
        self.decision
    }

    #[must_use]
    pub fn sensors(&self) -> &[SensorReading] {
        &self.sensors
    }

    #[must_use]
    pub const fn anticipation(&self) -> Option<&SensorReading> {
        self.anticipation.as_ref()
    }

    #[must_use]
    pub fn jump_phase(&self, config: &AgentConfig) -> JumpPhase {
        match self.state {
            AgentState::Jumping { elapsed } if elapsed * 2 < config.jump_duration => {
                JumpPhase::Ascending
            }
            AgentState::Jumping { .. } => JumpPhase::Descending,
            _ => JumpPhase::Idle,
        }
    }

    #[must_use]
    pub const fn lineage(&self) -> Lineage {
        self.lineage
    }

    #[must_use]
    pub const fn brain(&self) -> &NeuralNetwork {
        &self.brain
    }

    #[must_use]
    pub fn genome(&self) -> Genome {
        self.brain.export_genes()
    }
}
