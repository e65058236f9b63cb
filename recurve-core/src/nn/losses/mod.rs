//! Loss functions: scalar objective plus the gradient fed into backward.

pub mod cross_entropy;
pub mod nll;

pub use cross_entropy::CrossEntropyLoss;
pub use nll::NegativeLogLikelihoodLoss;

use crate::error::RecurveError;
use crate::tensor::Tensor;

/// A differentiable objective over one (output, target) pair.
pub trait Loss {
    /// Scalar loss value.
    fn loss(&self, output: &Tensor, target: &Tensor) -> Result<f64, RecurveError>;

    /// Gradient of the loss with respect to `output`.
    fn gradient(&self, output: &Tensor, target: &Tensor) -> Result<Tensor, RecurveError>;
}

pub(crate) fn check_pair(
    output: &Tensor,
    target: &Tensor,
    operation: &str,
) -> Result<(), RecurveError> {
    if output.shape() != target.shape() {
        return Err(RecurveError::ShapeMismatch {
            expected: output.shape().to_vec(),
            actual: target.shape().to_vec(),
            operation: operation.to_string(),
        });
    }
    Ok(())
}
