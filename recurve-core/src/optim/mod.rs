//! Optimizers for training.
//!
//! Provides the [`Optimizer`] trait plus plain gradient descent and AdaGrad,
//! both with mandatory elementwise gradient clipping.

pub mod adagrad;
pub mod grad_clipping;
pub mod optimizer;
pub mod sgd;

pub use adagrad::AdaGrad;
pub use grad_clipping::clip_grad_value;
pub use optimizer::Optimizer;
pub use sgd::{GradientDescent, DEFAULT_CLIP};

#[cfg(test)]
mod sgd_test;
