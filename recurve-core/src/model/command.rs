use crate::error::RecurveError;
use crate::model::vanilla::{Vanilla, VanillaWeights};
use crate::model::Recurrent;
use crate::optim::Optimizer;
use crate::tensor::Tensor;

/// Control commands understood by [`VanillaNet`]. A closed union: no
/// open-ended string dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Builds the per-time-step tree instances for the given unroll length,
    /// bound to the weights the net already holds. A no-op when the trees
    /// are already built at that length.
    InitNodes(usize),
    /// Resets hidden state; see [`Vanilla::clear_memory`].
    ClearMemory,
}

/// Command-dispatched variant of the vanilla model.
///
/// Purely an alternative control surface: once `InitNodes` has run, forward,
/// backward and training go through the identical engine and are exact
/// gradient equivalents of [`Vanilla`] for the same parameters and inputs.
#[derive(Debug)]
pub struct VanillaNet {
    input_size: usize,
    output_size: usize,
    hidden_size: usize,
    weights: VanillaWeights,
    net: Option<Vanilla>,
}

impl VanillaNet {
    pub fn new(
        input_size: usize,
        output_size: usize,
        hidden_size: usize,
        weights: VanillaWeights,
    ) -> Result<Self, RecurveError> {
        if weights.input_size() != input_size
            || weights.hidden_size() != hidden_size
            || weights.output_size() != output_size
        {
            return Err(RecurveError::ConfigurationError(format!(
                "weights sized for ({}, {}, {}) do not fit a ({}, {}, {}) net",
                weights.input_size(),
                weights.output_size(),
                weights.hidden_size(),
                input_size,
                output_size,
                hidden_size
            )));
        }
        Ok(VanillaNet {
            input_size,
            output_size,
            hidden_size,
            weights,
            net: None,
        })
    }

    /// Dispatches one control command.
    pub fn handle(&mut self, command: Command) -> Result<(), RecurveError> {
        match command {
            Command::InitNodes(seq_length) => {
                if self.net.as_ref().map(Vanilla::unroll_length) == Some(seq_length) {
                    return Ok(());
                }
                // Rebuilding binds fresh tree instances to the same shared
                // weights; trained values survive a re-init.
                self.net = Some(Vanilla::new(
                    self.input_size,
                    self.output_size,
                    self.hidden_size,
                    seq_length,
                    self.weights.clone(),
                )?);
                Ok(())
            }
            Command::ClearMemory => {
                if let Some(net) = self.net.as_mut() {
                    net.clear_memory();
                }
                Ok(())
            }
        }
    }

    pub fn weights(&self) -> &VanillaWeights {
        &self.weights
    }

    /// The built inner model, if `InitNodes` has run.
    pub fn net(&self) -> Option<&Vanilla> {
        self.net.as_ref()
    }

    fn net_mut(&mut self, operation: &str) -> Result<&mut Vanilla, RecurveError> {
        self.net.as_mut().ok_or_else(|| RecurveError::UninitializedState {
            operation: format!("{} before InitNodes", operation),
        })
    }
}

impl Recurrent for VanillaNet {
    fn forward(&mut self, input: &Tensor) -> Result<Tensor, RecurveError> {
        self.net_mut("VanillaNet::forward")?.forward(input)
    }

    fn backward(
        &mut self,
        grad: &Tensor,
        optimizer: &mut dyn Optimizer,
    ) -> Result<(), RecurveError> {
        self.net_mut("VanillaNet::backward")?.backward(grad, optimizer)
    }

    fn clear_memory(&mut self) {
        if let Some(net) = self.net.as_mut() {
            net.clear_memory();
        }
    }

    fn unroll_length(&self) -> usize {
        self.net.as_ref().map(Vanilla::unroll_length).unwrap_or(0)
    }
}
