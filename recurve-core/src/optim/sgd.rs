use crate::error::RecurveError;
use crate::nn::weight::SharedWeight;
use crate::optim::grad_clipping::clip_grad_value;
use crate::optim::optimizer::{Optimizer, WeightSet};
use log::debug;

/// Default elementwise gradient clip bound shared by the optimizers.
pub const DEFAULT_CLIP: f64 = 5.0;

/// Plain gradient descent: `value -= lr * grad`, after mandatory clipping.
#[derive(Debug)]
pub struct GradientDescent {
    learning_rate: f64,
    clip: f64,
    weights: WeightSet,
}

impl GradientDescent {
    pub fn new(learning_rate: f64) -> Self {
        GradientDescent {
            learning_rate,
            clip: DEFAULT_CLIP,
            weights: WeightSet::default(),
        }
    }

    pub fn with_clip(learning_rate: f64, clip: f64) -> Result<Self, RecurveError> {
        if clip < 0.0 {
            return Err(RecurveError::ConfigurationError(
                "clip must be non-negative".to_string(),
            ));
        }
        Ok(GradientDescent {
            learning_rate,
            clip,
            weights: WeightSet::default(),
        })
    }
}

impl Optimizer for GradientDescent {
    fn register(&mut self, weight: &SharedWeight) {
        self.weights.insert(weight);
    }

    fn update_model(&mut self) -> Result<(), RecurveError> {
        let weights = self.weights.drain();
        debug!("GradientDescent: update_model() over {} weights", weights.len());
        clip_grad_value(&weights, self.clip)?;
        for weight in weights {
            let step = weight.grad().scale(-self.learning_rate);
            weight.apply(&step)?;
            weight.reset_grad();
        }
        Ok(())
    }
}
