//! Action selection from an episode state.
//!
//! A [`PolicyEvaluator`] maps the current [`EpisodeState`] to one [`Action`].
//! [`NetworkPolicyEvaluator`] is the trained implementation: it extracts the
//! [observation](crate::observation), runs the network and takes the argmax of
//! the outputs, with ties going to the lowest action index.

use std::fmt;

use rexolve_engine::{Action, EpisodeState};

use crate::{
    network::{NetworkShape, argmax},
    observation::{self, OBSERVATION_LEN},
};

#[derive(Debug, Clone, PartialEq, derive_more::Display, derive_more::Error)]
pub enum PolicyError {
    #[display("expected {expected} network parameters, got {actual}")]
    ParameterCountMismatch { expected: usize, actual: usize },
    #[display("invalid network shape: {reason}")]
    InvalidShape { reason: String },
    #[display("network produced a non-finite output")]
    NonFiniteOutput,
}

/// Chooses the runner's action each frame.
pub trait PolicyEvaluator: fmt::Debug + Send + Sync {
    fn choose_action(&self, state: &EpisodeState) -> Result<Action, PolicyError>;
}

impl<P> PolicyEvaluator for &P
where
    P: PolicyEvaluator + ?Sized,
{
    fn choose_action(&self, state: &EpisodeState) -> Result<Action, PolicyError> {
        (**self).choose_action(state)
    }
}

impl<P> PolicyEvaluator for Box<P>
where
    P: PolicyEvaluator + ?Sized,
{
    fn choose_action(&self, state: &EpisodeState) -> Result<Action, PolicyError> {
        (**self).choose_action(state)
    }
}

/// Policy backed by a dense network and its parameter blob.
#[derive(Debug, Clone)]
pub struct NetworkPolicyEvaluator {
    shape: NetworkShape,
    parameters: Vec<f32>,
}

impl NetworkPolicyEvaluator {
    /// Binds a parameter blob to a network shape.
    ///
    /// The shape must take an observation as input and produce one output per
    /// action, and the blob must have exactly
    /// [`parameter_count`](NetworkShape::parameter_count) elements.
    pub fn new(shape: NetworkShape, parameters: Vec<f32>) -> Result<Self, PolicyError> {
        if shape.input_len() != OBSERVATION_LEN || shape.output_len() != Action::LEN {
            return Err(PolicyError::InvalidShape {
                reason: format!(
                    "policy network must map {OBSERVATION_LEN} inputs to {} outputs, got {:?}",
                    Action::LEN,
                    shape.layers()
                ),
            });
        }
        let expected = shape.parameter_count();
        if parameters.len() != expected {
            return Err(PolicyError::ParameterCountMismatch {
                expected,
                actual: parameters.len(),
            });
        }
        Ok(Self { shape, parameters })
    }

    #[must_use]
    pub fn shape(&self) -> &NetworkShape {
        &self.shape
    }

    #[must_use]
    pub fn parameters(&self) -> &[f32] {
        &self.parameters
    }
}

impl PolicyEvaluator for NetworkPolicyEvaluator {
    fn choose_action(&self, state: &EpisodeState) -> Result<Action, PolicyError> {
        let input = observation::observe(state);
        let output = self.shape.forward(&self.parameters, &input);
        if output.iter().any(|v| !v.is_finite()) {
            return Err(PolicyError::NonFiniteOutput);
        }
        argmax(&output)
            .and_then(Action::from_index)
            .ok_or(PolicyError::NonFiniteOutput)
    }
}

/// Policy that always returns the same action.
///
/// Useful as a baseline when comparing trained models.
#[derive(Debug, Clone, Copy)]
pub struct ConstantPolicyEvaluator(pub Action);

impl PolicyEvaluator for ConstantPolicyEvaluator {
    fn choose_action(&self, _state: &EpisodeState) -> Result<Action, PolicyError> {
        Ok(self.0)
    }
}
