//! Fixed-topology feed-forward controller.

use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::{BrainError, Genome, Matrix};

/// Activation applied after every layer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub enum Activation {
    /// Logistic sigmoid, outputs in `[0, 1]`.
    #[default]
    Sigmoid,
    /// Logistic sigmoid multiplied by a fixed amplitude.
    ScaledSigmoid { amplitude: f64 },
    /// Rectified linear unit.
    Relu,
}

impl Activation {
    fn apply(self, layer: &Matrix) -> Matrix {
        match self {
            Self::Sigmoid => layer.sigmoid(),
            Self::ScaledSigmoid { amplitude } => layer.scaled_sigmoid(amplitude),
            Self::Relu => layer.relu(),
        }
    }
}

/// Flat genome length for a layer stack: every weight entry plus every bias.
#[must_use]
pub fn genome_len_for(sizes: &[usize]) -> usize {
    sizes
        .windows(2)
        .map(|pair| pair[0] * pair[1] + pair[1])
        .sum()
}

/// Feed-forward network with weights `W_i` (`L_{i+1} x L_i`) and biases `b_i`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NeuralNetwork {
    sizes: Vec<usize>,
    weights: Vec<Matrix>,
    biases: Vec<Matrix>,
    activation: Activation,
    init_range: f64,
}

impl NeuralNetwork {
    /// Construct a network with weights and biases drawn from `[-init_range, init_range)`.
    pub fn new(
        sizes: &[usize],
        activation: Activation,
        init_range: f64,
        rng: &mut dyn RngCore,
    ) -> Result<Self, BrainError> {
        let mut network = Self::zeroed(sizes, activation)?;
        network.init_range = init_range;
        network.randomize(rng);
        Ok(network)
    }

    /// Construct a network whose genome is all zeros.
    pub fn zeroed(sizes: &[usize], activation: Activation) -> Result<Self, BrainError> {
        if sizes.len() < 2 {
            return Err(BrainError::InvalidTopology(
                "a network needs at least an input and an output layer",
            ));
        }
        if sizes.contains(&0) {
            return Err(BrainError::InvalidTopology("layers must be non-empty"));
        }
        let weights = sizes
            .windows(2)
            .map(|pair| Matrix::zeros(pair[1], pair[0]))
            .collect();
        let biases = sizes[1..].iter().map(|&rows| Matrix::zeros(rows, 1)).collect();
        Ok(Self {
            sizes: sizes.to_vec(),
            weights,
            biases,
            activation,
            init_range: 0.0,
        })
    }

    #[must_use]
    pub fn sizes(&self) -> &[usize] {
        &self.sizes
    }

    #[must_use]
    pub fn input_size(&self) -> usize {
        self.sizes[0]
    }

    #[must_use]
    pub fn output_size(&self) -> usize {
        self.sizes[self.sizes.len() - 1]
    }

    #[must_use]
    pub const fn activation(&self) -> Activation {
        self.activation
    }

    /// Number of genes needed to describe this network.
    #[must_use]
    pub fn genome_len(&self) -> usize {
        genome_len_for(&self.sizes)
    }

    /// Evaluate the network for one input vector.
    pub fn feedforward(&self, inputs: &[f64]) -> Result<Vec<f64>, BrainError> {
        if inputs.len() != self.input_size() {
            return Err(BrainError::ArityMismatch {
                expected: self.input_size(),
                actual: inputs.len(),
            });
        }
        let mut layer = Matrix::column(inputs);
        for (weights, bias) in self.weights.iter().zip(&self.biases) {
            let summed = weights.multiply(&layer)?.add(bias)?;
            layer = self.activation.apply(&summed);
        }
        Ok(layer.flatten())
    }

    /// Flatten all weights (layer order, row-major) followed by all biases.
    #[must_use]
    pub fn export_genes(&self) -> Genome {
        let mut genes = Vec::with_capacity(self.genome_len());
        for weights in &self.weights {
            genes.extend_from_slice(weights.as_slice());
        }
        for bias in &self.biases {
            genes.extend_from_slice(bias.as_slice());
        }
        Genome::new(genes)
    }

    /// Overwrite weights and biases from a flat genome in [`export_genes`](Self::export_genes) order.
    pub fn import_genes(&mut self, genes: &[f64]) -> Result<(), BrainError> {
        let expected = self.genome_len();
        if genes.len() != expected {
            return Err(BrainError::ArityMismatch {
                expected,
                actual: genes.len(),
            });
        }
        let mut offset = 0;
        for matrix in self.weights.iter_mut().chain(self.biases.iter_mut()) {
            let end = offset + matrix.len();
            matrix.reconstruct(&genes[offset..end])?;
            offset = end;
        }
        Ok(())
    }

    /// Redraw every gene from the configured initialisation range.
    pub fn randomize(&mut self, rng: &mut dyn RngCore) {
        let range = self.init_range;
        for matrix in self.weights.iter_mut().chain(self.biases.iter_mut()) {
            *matrix = Matrix::random(matrix.rows(), matrix.cols(), range, rng);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    #[test]
    fn genome_length_counts_weights_and_biases() {
        assert_eq!(genome_len_for(&[6, 4, 4]), 6 * 4 + 4 + 4 * 4 + 4);
        let net = NeuralNetwork::zeroed(&[6, 4, 4], Activation::Sigmoid).expect("valid");
        assert_eq!(net.genome_len(), 48);
        assert_eq!(net.export_genes().len(), 48);
    }

    #[test]
    fn invalid_topologies_are_rejected() {
        assert!(matches!(
            NeuralNetwork::zeroed(&[3], Activation::Sigmoid),
            Err(BrainError::InvalidTopology(_))
        ));
        assert!(matches!(
            NeuralNetwork::zeroed(&[3, 0, 2], Activation::Relu),
            Err(BrainError::InvalidTopology(_))
        ));
    }

    #[test]
    fn import_then_export_round_trips() {
        let mut rng = SmallRng::seed_from_u64(11);
        let source = NeuralNetwork::new(&[5, 3, 4], Activation::Sigmoid, 2.0, &mut rng)
            .expect("valid");
        let genes = source.export_genes();

        let mut target = NeuralNetwork::zeroed(&[5, 3, 4], Activation::Sigmoid).expect("valid");
        target.import_genes(&genes).expect("matching length");
        assert_eq!(target.export_genes(), genes);
    }

    #[test]
    fn import_rejects_wrong_length_without_writing() {
        let mut rng = SmallRng::seed_from_u64(12);
        let mut net = NeuralNetwork::new(&[2, 2], Activation::Sigmoid, 1.0, &mut rng)
            .expect("valid");
        let before = net.export_genes();
        assert_eq!(
            net.import_genes(&[1.0; 5]),
            Err(BrainError::ArityMismatch {
                expected: 6,
                actual: 5
            })
        );
        assert_eq!(net.export_genes(), before);
    }

    #[test]
    fn randomize_redraws_every_gene_within_range() {
        let mut rng = SmallRng::seed_from_u64(21);
        let mut net = NeuralNetwork::new(&[4, 3, 2], Activation::Sigmoid, 0.75, &mut rng)
            .expect("valid");
        let before = net.export_genes();
        net.randomize(&mut rng);
        let after = net.export_genes();

        assert_eq!(after.len(), before.len());
        assert_eq!(net.sizes(), &[4, 3, 2]);
        assert!(after.iter().all(|g| (-0.75..0.75).contains(g)));
        assert!(before.iter().zip(after.iter()).any(|(a, b)| a != b));

        let mut flat = NeuralNetwork::zeroed(&[2, 2], Activation::Relu).expect("valid");
        flat.randomize(&mut rng);
        assert!(flat.export_genes().iter().all(|g| *g == 0.0));
    }

    #[test]
    fn sigmoid_outputs_have_output_arity_and_unit_range() {
        let mut rng = SmallRng::seed_from_u64(99);
        let net = NeuralNetwork::new(&[6, 8, 4], Activation::Sigmoid, 25.0, &mut rng)
            .expect("valid");
        for sample in 0..32 {
            let inputs: Vec<f64> = (0..6).map(|i| ((sample * 7 + i) % 11) as f64 / 5.0).collect();
            let outputs = net.feedforward(&inputs).expect("arity");
            assert_eq!(outputs.len(), 4);
            assert!(outputs.iter().all(|v| (0.0..=1.0).contains(v)));
        }
    }

    #[test]
    fn feedforward_matches_hand_computed_layer() {
        let mut net = NeuralNetwork::zeroed(&[2, 1], Activation::Relu).expect("valid");
        // weights [2, -1], bias 0.5
        net.import_genes(&[2.0, -1.0, 0.5]).expect("length");
        assert_eq!(net.feedforward(&[1.0, 1.0]).expect("arity"), vec![1.5]);
        assert_eq!(net.feedforward(&[0.0, 3.0]).expect("arity"), vec![0.0]);
        assert_eq!(
            net.feedforward(&[1.0]),
            Err(BrainError::ArityMismatch {
                expected: 2,
                actual: 1
            })
        );
    }

    #[test]
    fn scaled_sigmoid_is_bounded_by_amplitude() {
        let mut rng = SmallRng::seed_from_u64(3);
        let net = NeuralNetwork::new(
            &[3, 3],
            Activation::ScaledSigmoid { amplitude: 2.5 },
            4.0,
            &mut rng,
        )
        .expect("valid");
        let outputs = net.feedforward(&[1.0, -1.0, 0.5]).expect("arity");
        assert!(outputs.iter().all(|v| (0.0..=2.5).contains(v)));
    }
}
