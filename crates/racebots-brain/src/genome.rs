//! Flat genomes and the genetic operators applied to them.

use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use std::ops::Deref;

use crate::BrainError;

/// Flat encoding of one controller's weights and biases.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Genome(Vec<f64>);

impl Genome {
    #[must_use]
    pub fn new(genes: Vec<f64>) -> Self {
        Self(genes)
    }

    /// Genome of `len` genes drawn uniformly from `[-range, range)`.
    #[must_use]
    pub fn random(len: usize, range: f64, rng: &mut dyn RngCore) -> Self {
        if range <= 0.0 {
            return Self(vec![0.0; len]);
        }
        Self((0..len).map(|_| rng.random_range(-range..range)).collect())
    }

    #[must_use]
    pub fn into_inner(self) -> Vec<f64> {
        self.0
    }
}

impl Deref for Genome {
    type Target = [f64];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<[f64]> for Genome {
    fn as_ref(&self) -> &[f64] {
        &self.0
    }
}

impl From<Vec<f64>> for Genome {
    fn from(genes: Vec<f64>) -> Self {
        Self(genes)
    }
}

/// Recombination scheme used when breeding two parents.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum CrossoverKind {
    /// One pivot; genes before it come from one parent, the rest from the other.
    #[default]
    SinglePoint,
    /// Two pivots; the slice between them is swapped.
    TwoPoint,
    /// Every gene picks its parent with a fair coin.
    Uniform,
}

fn ensure_compatible(first: &Genome, second: &Genome) -> Result<(), BrainError> {
    if first.len() != second.len() {
        return Err(BrainError::ArityMismatch {
            expected: first.len(),
            actual: second.len(),
        });
    }
    Ok(())
}

/// Single-point crossover at a fixed pivot.
///
/// The first child takes `first[..pivot]` and `second[pivot..]`; the second
/// child is the complement. Pivots past the end are clamped.
pub fn crossover_at(
    first: &Genome,
    second: &Genome,
    pivot: usize,
) -> Result<(Genome, Genome), BrainError> {
    ensure_compatible(first, second)?;
    let pivot = pivot.min(first.len());
    let mut child_a = Vec::with_capacity(first.len());
    child_a.extend_from_slice(&first[..pivot]);
    child_a.extend_from_slice(&second[pivot..]);
    let mut child_b = Vec::with_capacity(first.len());
    child_b.extend_from_slice(&second[..pivot]);
    child_b.extend_from_slice(&first[pivot..]);
    Ok((Genome(child_a), Genome(child_b)))
}

/// Recombine two equal-length parents into two complementary children.
pub fn crossover(
    first: &Genome,
    second: &Genome,
    kind: CrossoverKind,
    rng: &mut dyn RngCore,
) -> Result<(Genome, Genome), BrainError> {
    ensure_compatible(first, second)?;
    let len = first.len();
    if len == 0 {
        return Ok((first.clone(), second.clone()));
    }
    match kind {
        CrossoverKind::SinglePoint => crossover_at(first, second, rng.random_range(0..len)),
        CrossoverKind::TwoPoint => {
            let a = rng.random_range(0..len);
            let b = rng.random_range(0..len);
            let (lo, hi) = (a.min(b), a.max(b));
            let mut child_a = first.0.clone();
            let mut child_b = second.0.clone();
            child_a[lo..hi].copy_from_slice(&second[lo..hi]);
            child_b[lo..hi].copy_from_slice(&first[lo..hi]);
            Ok((Genome(child_a), Genome(child_b)))
        }
        CrossoverKind::Uniform => {
            let mut child_a = Vec::with_capacity(len);
            let mut child_b = Vec::with_capacity(len);
            for (&x, &y) in first.iter().zip(second.iter()) {
                if rng.random_bool(0.5) {
                    child_a.push(y);
                    child_b.push(x);
                } else {
                    child_a.push(x);
                    child_b.push(y);
                }
            }
            Ok((Genome(child_a), Genome(child_b)))
        }
    }
}

/// Negate each gene independently with `probability`; returns the number of flips.
pub fn flip_signs(genome: &mut Genome, probability: f64, rng: &mut dyn RngCore) -> usize {
    let probability = if probability.is_nan() {
        0.0
    } else {
        probability.clamp(0.0, 1.0)
    };
    let mut flipped = 0;
    for gene in &mut genome.0 {
        if rng.random_bool(probability) {
            *gene = -*gene;
            flipped += 1;
        }
    }
    flipped
}

/// Render genomes as text: one genome per line, genes separated by spaces.
pub fn format_genomes<'a>(genomes: impl IntoIterator<Item = &'a Genome>) -> String {
    let lines: Vec<String> = genomes
        .into_iter()
        .map(|genome| {
            genome
                .iter()
                .map(f64::to_string)
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect();
    lines.join("\n")
}

/// Parse a genome batch produced by [`format_genomes`].
///
/// Blank lines are skipped. Every remaining line must contain exactly
/// `expected_len` finite numbers, otherwise the whole batch is rejected.
pub fn parse_genomes(text: &str, expected_len: usize) -> Result<Vec<Genome>, BrainError> {
    let mut genomes = Vec::new();
    for (index, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let mut genes = Vec::with_capacity(expected_len);
        for token in line.split_whitespace() {
            let value: f64 = token.parse().map_err(|_| BrainError::MalformedImport {
                line: index + 1,
                reason: format!("`{token}` is not a number"),
            })?;
            if !value.is_finite() {
                return Err(BrainError::MalformedImport {
                    line: index + 1,
                    reason: format!("`{token}` is not finite"),
                });
            }
            genes.push(value);
        }
        if genes.len() != expected_len {
            return Err(BrainError::ArityMismatch {
                expected: expected_len,
                actual: genes.len(),
            });
        }
        genomes.push(Genome(genes));
    }
    Ok(genomes)
}
