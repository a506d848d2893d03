//! Core simulation for RaceBots.
//!
//! A population of cars, each steered by a small feed-forward controller,
//! drives a procedurally generated closed corridor. When every car has crashed
//! or stalled, the population is bred into the next generation and reset in
//! place. The crate performs no I/O: genomes and courses enter and leave as
//! strings.

use racebots_brain::BrainError;
use serde::{Deserialize, Serialize};
use slotmap::new_key_type;
use thiserror::Error;

pub mod agent;
pub mod config;
pub mod course;
pub mod evolution;
pub mod geometry;
mod world;

pub use agent::{
    AgentState, Car, DeathCause, Decision, JumpPhase, Lineage, SensorReading, decide, fitness,
};
pub use config::{AgentConfig, BrainConfig, CourseConfig, EvolutionConfig, RacebotsConfig};
pub use course::{Course, CourseLayout, CrossSection};
pub use evolution::{GenerationPlan, Offspring};
pub use geometry::{Boundary, Quad, Ray, RayHit, Vec2};
pub use world::{AgentArena, AgentView, GenerationSummary, Simulation, TickEvents};

new_key_type! {
    /// Stable handle for a car slot; slots are reused across generations.
    pub struct AgentId;
}

/// Number of controller outputs, one per [`Decision`].
pub const DECISION_COUNT: usize = 4;

/// Ticks elapsed within the current generation.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tick(pub u64);

impl Tick {
    /// Returns the next sequential tick.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    #[must_use]
    pub const fn zero() -> Self {
        Self(0)
    }
}

/// Generation counter.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Generation(pub u32);

impl Generation {
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

/// Errors surfaced by simulation construction, evolution and imports.
#[derive(Debug, Error)]
pub enum SimulationError {
    /// Matrix, controller or genome failure.
    #[error(transparent)]
    Brain(#[from] BrainError),
    /// Course or genome text failed validation.
    #[error("malformed import: {0}")]
    MalformedImport(String),
    /// Indicates an invalid configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
    /// Course export failed.
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}
