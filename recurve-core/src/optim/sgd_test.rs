use crate::nn::weight::SharedWeight;
use crate::optim::{GradientDescent, Optimizer};
use crate::tensor::Tensor;

#[test]
fn test_basic_update() {
    let w = SharedWeight::new(Tensor::vector(vec![1.0, -1.0]));
    w.accumulate(&Tensor::vector(vec![0.5, -2.0])).unwrap();

    let mut opt = GradientDescent::new(0.1);
    opt.register(&w);
    opt.update_model().unwrap();

    assert_eq!(w.value().data(), &[1.0 - 0.1 * 0.5, -1.0 + 0.1 * 2.0]);
    assert_eq!(w.grad().data(), &[0.0, 0.0]);
}

#[test]
fn test_update_clips_first() {
    // Pre-clip magnitude 1e6 must act like exactly 5.0.
    let w = SharedWeight::new(Tensor::vector(vec![0.0]));
    w.accumulate(&Tensor::vector(vec![1e6])).unwrap();

    let mut opt = GradientDescent::with_clip(0.1, 5.0).unwrap();
    opt.register(&w);
    opt.update_model().unwrap();

    assert_eq!(w.value().data(), &[-0.5]);
}

#[test]
fn test_registrations_are_forgotten_after_update() {
    let w = SharedWeight::new(Tensor::vector(vec![1.0]));
    w.accumulate(&Tensor::vector(vec![1.0])).unwrap();

    let mut opt = GradientDescent::new(0.1);
    opt.register(&w);
    opt.update_model().unwrap();
    let after_first = w.value();

    // No registration since the last update: nothing moves.
    w.accumulate(&Tensor::vector(vec![1.0])).unwrap();
    opt.update_model().unwrap();
    assert_eq!(w.value(), after_first);
}

#[test]
fn test_duplicate_registration_updates_once() {
    let w = SharedWeight::new(Tensor::vector(vec![0.0]));
    w.accumulate(&Tensor::vector(vec![1.0])).unwrap();

    let mut opt = GradientDescent::new(0.1);
    opt.register(&w);
    opt.register(&w.clone());
    opt.update_model().unwrap();

    assert_eq!(w.value().data(), &[-0.1]);
}
