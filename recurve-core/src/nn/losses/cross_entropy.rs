use crate::error::RecurveError;
use crate::nn::losses::{check_pair, Loss};
use crate::tensor::Tensor;

/// Softmax cross-entropy over raw, unnormalized scores.
///
/// The gradient uses the fused softmax shortcut: for a target distribution
/// `t` summing to one, `dJ/dy = softmax(y) - t`, so no softmax Jacobian is
/// ever needed.
#[derive(Debug, Default, Clone, Copy)]
pub struct CrossEntropyLoss;

impl Loss for CrossEntropyLoss {
    fn loss(&self, output: &Tensor, target: &Tensor) -> Result<f64, RecurveError> {
        check_pair(output, target, "CrossEntropyLoss::loss")?;
        let probs = output.softmax()?;
        let mut total = 0.0;
        for (p, t) in probs.data().iter().zip(target.data().iter()) {
            if *t != 0.0 {
                total -= t * p.ln();
            }
        }
        Ok(total)
    }

    fn gradient(&self, output: &Tensor, target: &Tensor) -> Result<Tensor, RecurveError> {
        check_pair(output, target, "CrossEntropyLoss::gradient")?;
        output.softmax()?.sub(target)
    }
}
