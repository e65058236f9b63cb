use crate::error::RecurveError;
use crate::nn::weight::SharedWeight;
use crate::optim::grad_clipping::clip_grad_value;
use crate::optim::optimizer::{Optimizer, WeightSet};
use crate::optim::sgd::DEFAULT_CLIP;
use crate::tensor::Tensor;
use log::debug;
use std::collections::HashMap;

const EPS: f64 = 1e-8;

/// AdaGrad with mandatory elementwise gradient clipping.
///
/// Per weight: `cache += grad^2; value -= lr * grad / sqrt(cache + 1e-8)`.
/// The cache is keyed by weight identity and survives across updates, so a
/// weight keeps its history no matter which backward pass registers it.
#[derive(Debug)]
pub struct AdaGrad {
    learning_rate: f64,
    clip: f64,
    weights: WeightSet,
    cache: HashMap<usize, Tensor>,
}

impl AdaGrad {
    pub fn new(learning_rate: f64) -> Self {
        AdaGrad {
            learning_rate,
            clip: DEFAULT_CLIP,
            weights: WeightSet::default(),
            cache: HashMap::new(),
        }
    }

    pub fn with_clip(learning_rate: f64, clip: f64) -> Result<Self, RecurveError> {
        if clip < 0.0 {
            return Err(RecurveError::ConfigurationError(
                "clip must be non-negative".to_string(),
            ));
        }
        Ok(AdaGrad {
            learning_rate,
            clip,
            weights: WeightSet::default(),
            cache: HashMap::new(),
        })
    }
}

impl Optimizer for AdaGrad {
    fn register(&mut self, weight: &SharedWeight) {
        self.weights.insert(weight);
    }

    fn update_model(&mut self) -> Result<(), RecurveError> {
        let weights = self.weights.drain();
        debug!("AdaGrad: update_model() over {} weights", weights.len());
        clip_grad_value(&weights, self.clip)?;
        for weight in weights {
            let grad = weight.grad();
            let cache = self
                .cache
                .entry(weight.id())
                .or_insert_with(|| grad.zeros_like());
            if cache.shape() != grad.shape() {
                return Err(RecurveError::ShapeMismatch {
                    expected: cache.shape().to_vec(),
                    actual: grad.shape().to_vec(),
                    operation: "AdaGrad::update_model".to_string(),
                });
            }
            cache.add_assign(&grad.mul(&grad)?)?;
            let step = Tensor::from_raw(
                grad.data()
                    .iter()
                    .zip(cache.data().iter())
                    .map(|(g, c)| -self.learning_rate * g / (c + EPS).sqrt())
                    .collect(),
                grad.shape().to_vec(),
            );
            weight.apply(&step)?;
            weight.reset_grad();
        }
        Ok(())
    }
}
