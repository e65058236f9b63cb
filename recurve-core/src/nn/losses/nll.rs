use crate::error::RecurveError;
use crate::nn::losses::{check_pair, Loss};
use crate::tensor::Tensor;

/// Negative log-likelihood over an already-normalized probability vector.
///
/// Meant to sit behind a trailing `Softmax` node; the composition is
/// gradient-equivalent to [`CrossEntropyLoss`] on the raw scores.
///
/// [`CrossEntropyLoss`]: crate::nn::losses::CrossEntropyLoss
#[derive(Debug, Default, Clone, Copy)]
pub struct NegativeLogLikelihoodLoss;

impl Loss for NegativeLogLikelihoodLoss {
    fn loss(&self, output: &Tensor, target: &Tensor) -> Result<f64, RecurveError> {
        check_pair(output, target, "NegativeLogLikelihoodLoss::loss")?;
        let mut total = 0.0;
        for (p, t) in output.data().iter().zip(target.data().iter()) {
            if *t != 0.0 {
                total -= t * p.ln();
            }
        }
        Ok(total)
    }

    fn gradient(&self, output: &Tensor, target: &Tensor) -> Result<Tensor, RecurveError> {
        check_pair(output, target, "NegativeLogLikelihoodLoss::gradient")?;
        Ok(Tensor::from_raw(
            output
                .data()
                .iter()
                .zip(target.data().iter())
                .map(|(p, t)| -t / p)
                .collect(),
            output.shape().to_vec(),
        ))
    }
}
