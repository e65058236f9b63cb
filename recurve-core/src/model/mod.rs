//! Time-unrolled recurrent models built on the composition-tree engine.

pub mod command;
pub mod vanilla;

pub use command::{Command, VanillaNet};
pub use vanilla::{Vanilla, VanillaWeights};

use crate::error::RecurveError;
use crate::optim::Optimizer;
use crate::tensor::Tensor;

/// Common control surface over the recurrent model variants, as consumed by
/// the trainer.
pub trait Recurrent {
    /// Advances one time step: consumes an input vector, updates the hidden
    /// state, returns the unnormalized output scores.
    fn forward(&mut self, input: &Tensor) -> Result<Tensor, RecurveError>;

    /// Backward pass for the most recent not-yet-backwarded step; must be
    /// driven in strict reverse step order.
    fn backward(
        &mut self,
        grad: &Tensor,
        optimizer: &mut dyn Optimizer,
    ) -> Result<(), RecurveError>;

    /// Drops hidden state and any half-finished window bookkeeping.
    fn clear_memory(&mut self);

    /// Number of steps one training window can hold.
    fn unroll_length(&self) -> usize;
}

#[cfg(test)]
mod vanilla_test;
