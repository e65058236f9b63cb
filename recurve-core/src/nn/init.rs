use crate::tensor::Tensor;
use rand::Rng;
use rand_distr::StandardNormal;

/// Fills a tensor of the given shape with samples from a normal distribution
/// scaled by `std`.
pub fn randn(shape: &[usize], std: f64) -> Tensor {
    let numel: usize = shape.iter().product();
    let mut rng = rand::thread_rng();
    let data = (0..numel)
        .map(|_| {
            let z: f64 = rng.sample(StandardNormal);
            z * std
        })
        .collect();
    Tensor::from_raw(data, shape.to_vec())
}

/// Zero-filled tensor of the given shape.
pub fn zeros(shape: &[usize]) -> Tensor {
    Tensor::zeros(shape)
}
