//! Dense feed-forward network over a flat parameter blob.
//!
//! The network has no storage of its own: a [`NetworkShape`] describes the
//! layer sizes and every forward pass reads weights from a caller-provided
//! `&[f32]`. This keeps individuals of the genetic algorithm as plain vectors
//! that crossover and mutation can operate on element by element.
//!
//! # Parameter Layout
//!
//! Layers are stored back to back. For a layer with `fan_in` inputs and
//! `fan_out` outputs the blob holds `fan_in × fan_out` weights, row-major by
//! input (`w[i * fan_out + j]` connects input `i` to output `j`), followed by
//! `fan_out` biases.
//!
//! Hidden layers use ReLU; the output layer is linear.

use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

use crate::{observation::OBSERVATION_LEN, policy_evaluator::PolicyError};

/// Layer sizes of a network, input first and output last.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<usize>", into = "Vec<usize>")]
pub struct NetworkShape {
    layers: Vec<usize>,
}

impl NetworkShape {
    /// Hidden layer sizes of the default policy network.
    pub const DEFAULT_HIDDEN: [usize; 2] = [32, 16];

    /// Builds a shape from its input size, hidden layer sizes and output size.
    pub fn new(input: usize, hidden: &[usize], output: usize) -> Result<Self, PolicyError> {
        let layers: Vec<usize> = std::iter::once(input)
            .chain(hidden.iter().copied())
            .chain(std::iter::once(output))
            .collect();
        Self::try_from(layers)
    }

    /// Shape mapping an observation to one output per action.
    pub fn for_policy(hidden: &[usize]) -> Result<Self, PolicyError> {
        Self::new(OBSERVATION_LEN, hidden, rexolve_engine::Action::LEN)
    }

    #[must_use]
    pub fn layers(&self) -> &[usize] {
        &self.layers
    }

    #[must_use]
    pub fn input_len(&self) -> usize {
        self.layers[0]
    }

    #[must_use]
    pub fn output_len(&self) -> usize {
        self.layers[self.layers.len() - 1]
    }

    /// `(fan_in, fan_out)` of every dense layer.
    pub fn layer_dims(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.layers.windows(2).map(|w| (w[0], w[1]))
    }

    /// Length of a parameter blob for this shape.
    ///
    /// ```
    /// use rexolve_evaluator::network::NetworkShape;
    ///
    /// let shape = NetworkShape::new(7, &[32, 16], 3).unwrap();
    /// assert_eq!(shape.parameter_count(), 7 * 32 + 32 + 32 * 16 + 16 + 16 * 3 + 3);
    /// ```
    #[must_use]
    pub fn parameter_count(&self) -> usize {
        self.layer_dims()
            .map(|(fan_in, fan_out)| fan_in * fan_out + fan_out)
            .sum()
    }

    /// Draws a fresh parameter blob.
    ///
    /// Weights follow He-normal initialization, `N(0, sqrt(2 / fan_in))`;
    /// biases start at zero.
    #[expect(clippy::cast_precision_loss)]
    pub fn random_parameters<R>(&self, rng: &mut R) -> Vec<f32>
    where
        R: Rng + ?Sized,
    {
        let mut params = Vec::with_capacity(self.parameter_count());
        for (fan_in, fan_out) in self.layer_dims() {
            let std_dev = (2.0 / fan_in as f32).sqrt();
            params.extend((0..fan_in * fan_out).map(|_| {
                let z: f32 = rng.sample(StandardNormal);
                z * std_dev
            }));
            params.extend(std::iter::repeat_n(0.0, fan_out));
        }
        params
    }

    /// Runs one forward pass and returns the output layer activations.
    ///
    /// # Panics
    ///
    /// Panics if `params` or `input` do not match the shape.
    #[must_use]
    pub fn forward(&self, params: &[f32], input: &[f32]) -> Vec<f32> {
        assert_eq!(params.len(), self.parameter_count());
        assert_eq!(input.len(), self.input_len());

        let layer_count = self.layers.len() - 1;
        let mut x = input.to_vec();
        let mut offset = 0;
        for (layer, (fan_in, fan_out)) in self.layer_dims().enumerate() {
            let weights = &params[offset..offset + fan_in * fan_out];
            offset += fan_in * fan_out;
            let biases = &params[offset..offset + fan_out];
            offset += fan_out;

            let mut out = biases.to_vec();
            for (xi, row) in x.iter().zip(weights.chunks_exact(fan_out)) {
                for (o, w) in out.iter_mut().zip(row) {
                    *o += xi * w;
                }
            }
            if layer + 1 < layer_count {
                for v in &mut out {
                    *v = v.max(0.0);
                }
            }
            x = out;
        }
        x
    }
}

impl TryFrom<Vec<usize>> for NetworkShape {
    type Error = PolicyError;

    fn try_from(layers: Vec<usize>) -> Result<Self, Self::Error> {
        if layers.len() < 2 {
            return Err(PolicyError::InvalidShape {
                reason: format!("need at least an input and an output layer, got {layers:?}"),
            });
        }
        if layers.contains(&0) {
            return Err(PolicyError::InvalidShape {
                reason: format!("layer sizes must be positive, got {layers:?}"),
            });
        }
        Ok(Self { layers })
    }
}

impl From<NetworkShape> for Vec<usize> {
    fn from(shape: NetworkShape) -> Self {
        shape.layers
    }
}

/// Index of the largest value; ties resolve to the lowest index.
///
/// Returns `None` for an empty slice or when any value is NaN.
#[must_use]
pub fn argmax(values: &[f32]) -> Option<usize> {
    if values.iter().any(|v| v.is_nan()) {
        return None;
    }
    let mut best: Option<(usize, f32)> = None;
    for (i, &v) in values.iter().enumerate() {
        if best.is_none_or(|(_, b)| v > b) {
            best = Some((i, v));
        }
    }
    best.map(|(i, _)| i)
}
