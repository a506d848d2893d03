//! Breeding the next generation from a fully retired population.
//!
//! The next generation is laid out as consecutive slices: elites copied
//! verbatim, fresh random genomes, hard-mutated offspring, soft-mutated
//! offspring, and plain offspring filling the remainder. Offspring parents are
//! drawn from a ticket pool weighted by fitness.

use std::cmp::Reverse;

use ordered_float::OrderedFloat;
use racebots_brain::{BrainError, Genome, crossover, flip_signs};
use rand::{Rng, RngCore};

use crate::agent::Lineage;
use crate::config::EvolutionConfig;

/// Slice sizes of the next generation, in layout order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerationPlan {
    pub elites: usize,
    pub randoms: usize,
    pub hard_mutated: usize,
    pub soft_mutated: usize,
    pub offspring: usize,
}

impl GenerationPlan {
    /// Floor each configured fraction of `population`; plain offspring take the rest.
    #[must_use]
    pub fn new(population: usize, config: &EvolutionConfig) -> Self {
        let mut remaining = population;
        let mut take = |fraction: f64| {
            let count = ((population as f64 * fraction).floor() as usize).min(remaining);
            remaining -= count;
            count
        };
        let elites = take(config.elite_fraction);
        let randoms = take(config.random_fraction);
        let hard_mutated = take(config.hard_mutation_fraction);
        let soft_mutated = take(config.soft_mutation_fraction);
        Self {
            elites,
            randoms,
            hard_mutated,
            soft_mutated,
            offspring: remaining,
        }
    }

    #[must_use]
    pub const fn total(&self) -> usize {
        self.elites + self.randoms + self.hard_mutated + self.soft_mutated + self.offspring
    }

    /// Number of genomes produced by crossover.
    #[must_use]
    pub const fn bred(&self) -> usize {
        self.hard_mutated + self.soft_mutated + self.offspring
    }
}

/// A genome for the next generation and the slice it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct Offspring {
    pub genome: Genome,
    pub lineage: Lineage,
}

/// Indices of the `count` fittest agents, fittest first; ties keep index order.
#[must_use]
pub fn elite_indices(fitness: &[f64], count: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..fitness.len()).collect();
    order.sort_by_key(|&index| Reverse(OrderedFloat(fitness[index])));
    order.truncate(count);
    order
}

/// Ticket pool: each agent appears `floor(fitness / max * tickets)` times.
///
/// When no agent has positive fitness every agent gets a single ticket, so the
/// pool is never empty for a non-empty population.
#[must_use]
pub fn ticket_pool(fitness: &[f64], tickets: u32) -> Vec<usize> {
    let max = fitness
        .iter()
        .copied()
        .filter(|f| f.is_finite())
        .fold(0.0_f64, f64::max);
    if max <= 0.0 {
        return (0..fitness.len()).collect();
    }
    let mut pool = Vec::new();
    for (index, &value) in fitness.iter().enumerate() {
        let share = if value.is_finite() && value > 0.0 {
            (value / max * f64::from(tickets)).floor() as usize
        } else {
            0
        };
        pool.extend(std::iter::repeat_n(index, share));
    }
    pool
}

/// Draw two parents from the pool; they may coincide.
pub fn draw_parents(pool: &[usize], rng: &mut dyn RngCore) -> Option<(usize, usize)> {
    if pool.is_empty() {
        return None;
    }
    let first = pool[rng.random_range(0..pool.len())];
    let second = pool[rng.random_range(0..pool.len())];
    Some((first, second))
}

/// Breed a full replacement population.
///
/// `parents[i]` scored `fitness[i]`. The result has exactly `parents.len()`
/// entries laid out as described by [`GenerationPlan`].
pub fn breed(
    parents: &[Genome],
    fitness: &[f64],
    config: &EvolutionConfig,
    init_range: f64,
    rng: &mut dyn RngCore,
) -> Result<Vec<Offspring>, BrainError> {
    if parents.len() != fitness.len() {
        return Err(BrainError::ArityMismatch {
            expected: parents.len(),
            actual: fitness.len(),
        });
    }
    let Some(first) = parents.first() else {
        return Ok(Vec::new());
    };
    let genome_len = first.len();
    let plan = GenerationPlan::new(parents.len(), config);
    let mut next = Vec::with_capacity(parents.len());

    for index in elite_indices(fitness, plan.elites) {
        next.push(Offspring {
            genome: parents[index].clone(),
            lineage: Lineage::Elite,
        });
    }
    for _ in 0..plan.randoms {
        next.push(Offspring {
            genome: Genome::random(genome_len, init_range, rng),
            lineage: Lineage::Random,
        });
    }

    let pool = ticket_pool(fitness, config.tickets);
    let mut children = Vec::with_capacity(plan.bred() + 1);
    while children.len() < plan.bred() {
        let Some((a, b)) = draw_parents(&pool, rng) else {
            break;
        };
        let (left, right) = crossover(&parents[a], &parents[b], config.crossover, rng)?;
        children.push(left);
        children.push(right);
    }
    children.truncate(plan.bred());

    for (slot, mut genome) in children.into_iter().enumerate() {
        let lineage = if slot < plan.hard_mutated {
            flip_signs(&mut genome, config.hard_flip_probability, rng);
            Lineage::HardMutated
        } else if slot < plan.hard_mutated + plan.soft_mutated {
            flip_signs(&mut genome, config.soft_flip_probability, rng);
            Lineage::SoftMutated
        } else {
            Lineage::Offspring
        };
        next.push(Offspring { genome, lineage });
    }
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    fn population(n: usize, len: usize) -> Vec<Genome> {
        (0..n)
            .map(|i| Genome::new(vec![i as f64 + 1.0; len]))
            .collect()
    }

    #[test]
    fn plan_partitions_the_population() {
        let plan = GenerationPlan::new(100, &EvolutionConfig::default());
        assert_eq!(
            plan,
            GenerationPlan {
                elites: 8,
                randoms: 12,
                hard_mutated: 20,
                soft_mutated: 20,
                offspring: 40,
            }
        );
        assert_eq!(plan.total(), 100);

        let small = GenerationPlan::new(7, &EvolutionConfig::default());
        assert_eq!(small.total(), 7);
        assert_eq!(small.elites, 0);
        assert_eq!(small.offspring, 7 - small.randoms - small.hard_mutated - small.soft_mutated);
    }

    #[test]
    fn tickets_scale_with_fitness() {
        let pool = ticket_pool(&[10.0, 5.0, 0.0, 2.4], 10);
        let count = |i| pool.iter().filter(|&&p| p == i).count();
        assert_eq!(count(0), 10);
        assert_eq!(count(1), 5);
        assert_eq!(count(2), 0);
        assert_eq!(count(3), 2);
    }

    #[test]
    fn zero_fitness_population_gets_one_ticket_each() {
        assert_eq!(ticket_pool(&[0.0, 0.0, 0.0], 10), vec![0, 1, 2]);
        assert!(ticket_pool(&[], 10).is_empty());
        let mut rng = SmallRng::seed_from_u64(1);
        assert_eq!(draw_parents(&[], &mut rng), None);
    }

    #[test]
    fn elites_are_sorted_and_stable() {
        assert_eq!(elite_indices(&[1.0, 3.0, 2.0, 3.0], 3), vec![1, 3, 2]);
        assert_eq!(elite_indices(&[1.0], 5), vec![0]);
    }

    #[test]
    fn breeding_preserves_size_and_elites() {
        let mut rng = SmallRng::seed_from_u64(77);
        let parents = population(50, 12);
        let fitness: Vec<f64> = (0..50).map(|i| (i % 7) as f64).collect();
        let config = EvolutionConfig::default();
        let next = breed(&parents, &fitness, &config, 1.0, &mut rng).expect("same lengths");

        assert_eq!(next.len(), parents.len());
        assert!(next.iter().all(|child| child.genome.len() == 12));

        let plan = GenerationPlan::new(50, &config);
        let expected: Vec<&Genome> = elite_indices(&fitness, plan.elites)
            .into_iter()
            .map(|i| &parents[i])
            .collect();
        for (child, parent) in next.iter().zip(expected) {
            assert_eq!(child.lineage, Lineage::Elite);
            assert_eq!(&child.genome, parent);
        }

        let lineages: Vec<Lineage> = next.iter().map(|child| child.lineage).collect();
        let randoms = &lineages[plan.elites..plan.elites + plan.randoms];
        assert!(randoms.iter().all(|l| *l == Lineage::Random));
        assert_eq!(lineages.last(), Some(&Lineage::Offspring));
    }

    #[test]
    fn crossover_children_only_carry_parent_genes() {
        let mut rng = SmallRng::seed_from_u64(5);
        let parents = population(20, 6);
        let fitness = vec![1.0; 20];
        let config = EvolutionConfig {
            elite_fraction: 0.0,
            random_fraction: 0.0,
            hard_mutation_fraction: 0.0,
            soft_mutation_fraction: 0.0,
            ..EvolutionConfig::default()
        };
        let next = breed(&parents, &fitness, &config, 1.0, &mut rng).expect("same lengths");
        for child in &next {
            assert_eq!(child.lineage, Lineage::Offspring);
            assert!(child.genome.iter().all(|g| (1.0..=20.0).contains(g)));
        }
    }

    #[test]
    fn mismatched_inputs_are_rejected() {
        let mut rng = SmallRng::seed_from_u64(9);
        let parents = population(3, 4);
        assert!(breed(&parents, &[1.0, 2.0], &EvolutionConfig::default(), 1.0, &mut rng).is_err());
        assert_eq!(
            breed(&[], &[], &EvolutionConfig::default(), 1.0, &mut rng),
            Ok(Vec::new())
        );
    }
}
