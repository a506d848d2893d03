//! Controllers and genome operators for RaceBots agents.
//!
//! The crate is a leaf: it knows nothing about courses or cars. It provides a
//! small dense [`Matrix`] engine, the fixed-topology [`NeuralNetwork`] built on
//! top of it, and the [`Genome`] operators (crossover, sign-flip mutation, text
//! interchange) that the evolution loop drives.

use thiserror::Error;

pub mod genome;
pub mod matrix;
pub mod network;

pub use genome::{
    CrossoverKind, Genome, crossover, crossover_at, flip_signs, format_genomes, parse_genomes,
};
pub use matrix::{Matrix, logistic};
pub use network::{Activation, NeuralNetwork, genome_len_for};

/// Errors raised by matrix arithmetic, controller evaluation and genome handling.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum BrainError {
    /// Operands of an arithmetic operation have incompatible dimensions.
    #[error("shape mismatch in {op}: {left:?} vs {right:?}")]
    ShapeMismatch {
        op: &'static str,
        left: (usize, usize),
        right: (usize, usize),
    },
    /// A buffer or input vector does not have the expected length.
    #[error("expected {expected} values but received {actual}")]
    ArityMismatch { expected: usize, actual: usize },
    /// The requested layer stack cannot form a network.
    #[error("invalid topology: {0}")]
    InvalidTopology(&'static str),
    /// Genome text could not be parsed.
    #[error("malformed genome on line {line}: {reason}")]
    MalformedImport { line: usize, reason: String },
}
