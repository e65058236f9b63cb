use crate::error::RecurveError;
use crate::nn::weight::SharedWeight;

/// Clips the accumulated gradient of each weight elementwise into
/// `[-clip_value, clip_value]`, in place.
///
/// This is the engine's only defense against exploding gradients; both
/// optimizers run it before every update.
pub fn clip_grad_value(
    weights: &[SharedWeight],
    clip_value: f64,
) -> Result<(), RecurveError> {
    if clip_value < 0.0 {
        return Err(RecurveError::ConfigurationError(
            "clip_value must be non-negative".to_string(),
        ));
    }
    for weight in weights {
        weight.clamp_grad(clip_value);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::Tensor;

    #[test]
    fn test_clips_elementwise() {
        let w = SharedWeight::new(Tensor::vector(vec![0.0, 0.0, 0.0]));
        w.accumulate(&Tensor::vector(vec![-80.0, 1.5, 600.0])).unwrap();
        clip_grad_value(std::slice::from_ref(&w), 5.0).unwrap();
        assert_eq!(w.grad().data(), &[-5.0, 1.5, 5.0]);
    }

    #[test]
    fn test_negative_bound_is_rejected() {
        let err = clip_grad_value(&[], -1.0).unwrap_err();
        assert!(matches!(err, RecurveError::ConfigurationError(_)));
    }
}
