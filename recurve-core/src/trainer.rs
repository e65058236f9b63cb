use crate::error::RecurveError;
use crate::model::Recurrent;
use crate::nn::losses::Loss;
use crate::optim::Optimizer;
use crate::tensor::Tensor;
use log::{debug, trace};

/// Drives windowed back-propagation through time over a recurrent model.
///
/// The window-boundary policy is explicit: by default hidden state carries
/// across consecutive windows within an epoch (the model does this on its
/// own when windows complete), and every epoch starts from cleared memory.
/// `reset_between_windows(true)` clears between the internal windows of
/// [`learn_throughtime`] as well.
///
/// [`learn_throughtime`]: Trainer::learn_throughtime
#[derive(Debug, Clone, Default)]
pub struct Trainer {
    reset_between_windows: bool,
}

impl Trainer {
    pub fn new() -> Self {
        Trainer {
            reset_between_windows: false,
        }
    }

    pub fn reset_between_windows(mut self, reset: bool) -> Self {
        self.reset_between_windows = reset;
        self
    }

    fn check_pairing(inputs: &[Tensor], targets: &[Tensor]) -> Result<(), RecurveError> {
        if inputs.len() != targets.len() {
            return Err(RecurveError::SequenceLengthMismatch {
                inputs: inputs.len(),
                targets: targets.len(),
            });
        }
        Ok(())
    }

    /// One truncated-BPTT pass over a single window of paired inputs and
    /// targets: forward every step, backward every step in reverse order
    /// (chaining hidden-state gradients), then a single optimizer update.
    ///
    /// Returns the summed window loss. The model must be at a window
    /// boundary when this is called (freshly built, cleared, or having just
    /// completed a window).
    pub fn learn_window(
        &self,
        model: &mut dyn Recurrent,
        inputs: &[Tensor],
        targets: &[Tensor],
        loss: &dyn Loss,
        optimizer: &mut dyn Optimizer,
    ) -> Result<f64, RecurveError> {
        Self::check_pairing(inputs, targets)?;
        if inputs.is_empty() {
            return Err(RecurveError::ConfigurationError(
                "cannot train on an empty window".to_string(),
            ));
        }
        if inputs.len() > model.unroll_length() {
            return Err(RecurveError::WindowOverflow {
                capacity: model.unroll_length(),
            });
        }

        let mut outputs = Vec::with_capacity(inputs.len());
        for input in inputs {
            outputs.push(model.forward(input)?);
        }

        let mut total_loss = 0.0;
        for t in (0..inputs.len()).rev() {
            total_loss += loss.loss(&outputs[t], &targets[t])?;
            let grad = loss.gradient(&outputs[t], &targets[t])?;
            model.backward(&grad, &mut *optimizer)?;
        }

        optimizer.update_model()?;
        trace!(
            "learn_window: {} steps, loss {}",
            inputs.len(),
            total_loss
        );
        Ok(total_loss)
    }

    /// Full back-propagation through time over a corpus: repeats windowed
    /// passes over successive slices (including a short final slice) for
    /// `epochs` epochs, re-using the model's weights throughout.
    ///
    /// `window` defaults to the model's unroll length. Returns the summed
    /// loss of the last epoch.
    pub fn learn_throughtime(
        &self,
        model: &mut dyn Recurrent,
        inputs: &[Tensor],
        targets: &[Tensor],
        loss: &dyn Loss,
        optimizer: &mut dyn Optimizer,
        epochs: usize,
        window: Option<usize>,
    ) -> Result<f64, RecurveError> {
        Self::check_pairing(inputs, targets)?;
        let window = window.unwrap_or_else(|| model.unroll_length());
        if window == 0 {
            return Err(RecurveError::ConfigurationError(
                "training window must be at least 1 step".to_string(),
            ));
        }
        if window > model.unroll_length() {
            return Err(RecurveError::WindowOverflow {
                capacity: model.unroll_length(),
            });
        }

        let mut last_epoch_loss = 0.0;
        for epoch in 0..epochs {
            model.clear_memory();
            let mut epoch_loss = 0.0;
            let mut at = 0;
            while at < inputs.len() {
                if self.reset_between_windows && at > 0 {
                    model.clear_memory();
                }
                let end = (at + window).min(inputs.len());
                epoch_loss += self.learn_window(
                    model,
                    &inputs[at..end],
                    &targets[at..end],
                    loss,
                    &mut *optimizer,
                )?;
                at = end;
            }
            debug!("learn_throughtime: epoch {} loss {}", epoch, epoch_loss);
            last_epoch_loss = epoch_loss;
        }
        Ok(last_epoch_loss)
    }
}
