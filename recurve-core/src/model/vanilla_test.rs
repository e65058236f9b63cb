use crate::error::RecurveError;
use crate::model::{Command, Recurrent, Vanilla, VanillaNet, VanillaWeights};
use crate::nn::losses::{CrossEntropyLoss, Loss};
use crate::optim::{AdaGrad, GradientDescent};
use crate::tensor::Tensor;
use crate::trainer::Trainer;
use crate::utils::encoding::one_hot_seq;
use approx::assert_abs_diff_eq;

fn cycle_tokens(len: usize, vocab: usize) -> Vec<usize> {
    (0..len).map(|i| (i * 3 + i / 2) % vocab).collect()
}

/// Independent windowed-BPTT reference, kept deliberately close to the
/// textbook formulation: explicit per-step arrays, no composition trees.
struct ReferenceBptt {
    loss: f64,
    dwxh: Tensor,
    dwhh: Tensor,
    dwhy: Tensor,
    dbh: Tensor,
    dby: Tensor,
    hs: Vec<Tensor>,
    ys: Vec<Tensor>,
    /// Hidden gradient chained in from the future at each step.
    dh_future: Vec<Tensor>,
}

fn reference_bptt(
    weights: &VanillaWeights,
    inputs: &[Tensor],
    targets: &[Tensor],
    hprev: &Tensor,
) -> ReferenceBptt {
    let wxh = weights.wxh.value();
    let whh = weights.whh.value();
    let why = weights.why.value();
    let bh = weights.bh.value();
    let by = weights.by.value();
    let n = inputs.len();

    let mut hs = Vec::with_capacity(n);
    let mut ys = Vec::with_capacity(n);
    let mut ps = Vec::with_capacity(n);
    let mut loss = 0.0;
    let mut h = hprev.clone();
    for t in 0..n {
        h = wxh
            .matvec(&inputs[t])
            .unwrap()
            .add(&whh.matvec(&h).unwrap())
            .unwrap()
            .add(&bh)
            .unwrap()
            .tanh();
        hs.push(h.clone());
        let y = why.matvec(&h).unwrap().add(&by).unwrap();
        let p = y.softmax().unwrap();
        for (pi, ti) in p.data().iter().zip(targets[t].data().iter()) {
            if *ti != 0.0 {
                loss -= ti * pi.ln();
            }
        }
        ys.push(y);
        ps.push(p);
    }

    let mut dwxh = wxh.zeros_like();
    let mut dwhh = whh.zeros_like();
    let mut dwhy = why.zeros_like();
    let mut dbh = bh.zeros_like();
    let mut dby = by.zeros_like();
    let mut dh_next = hprev.zeros_like();
    let mut dh_future = vec![hprev.zeros_like(); n];
    for t in (0..n).rev() {
        let dy = ps[t].sub(&targets[t]).unwrap();
        dwhy.add_assign(&Tensor::outer(&dy, &hs[t]).unwrap()).unwrap();
        dby.add_assign(&dy).unwrap();
        dh_future[t] = dh_next.clone();
        let dh = why.matvec_t(&dy).unwrap().add(&dh_next).unwrap();
        let dh_raw = hs[t].map(|v| 1.0 - v * v).mul(&dh).unwrap();
        dbh.add_assign(&dh_raw).unwrap();
        dwxh.add_assign(&Tensor::outer(&dh_raw, &inputs[t]).unwrap())
            .unwrap();
        let h_before = if t == 0 { hprev.clone() } else { hs[t - 1].clone() };
        dwhh.add_assign(&Tensor::outer(&dh_raw, &h_before).unwrap())
            .unwrap();
        dh_next = whh.matvec_t(&dh_raw).unwrap();
    }

    ReferenceBptt {
        loss,
        dwxh,
        dwhh,
        dwhy,
        dbh,
        dby,
        hs,
        ys,
        dh_future,
    }
}

#[test]
fn test_forward_matches_closed_form_per_step() {
    let (vocab, hidden, seq) = (4, 6, 5);
    let weights = VanillaWeights::random(vocab, vocab, hidden);
    let mut model = Vanilla::new(vocab, vocab, hidden, seq, weights.clone()).unwrap();

    let inputs = one_hot_seq(&cycle_tokens(seq, vocab), vocab).unwrap();
    let mut h = Tensor::zeros(&[hidden]);
    for (t, x) in inputs.iter().enumerate() {
        assert_eq!(model.window_step(), t);
        h = weights
            .wxh
            .value()
            .matvec(x)
            .unwrap()
            .add(&weights.whh.value().matvec(&h).unwrap())
            .unwrap()
            .add(&weights.bh.value())
            .unwrap()
            .tanh();
        let expected_y = weights
            .why
            .value()
            .matvec(&h)
            .unwrap()
            .add(&weights.by.value())
            .unwrap();
        let y = model.forward(x).unwrap();
        assert_eq!(y, expected_y);
        assert_eq!(model.state(t as isize).unwrap(), h);
    }
}

#[test]
fn test_backward_matches_hand_rolled_bptt() {
    let (vocab, hidden, seq) = (3, 5, 4);
    let weights = VanillaWeights::random(vocab, vocab, hidden);
    let mut model = Vanilla::new(vocab, vocab, hidden, seq, weights.clone()).unwrap();

    let inputs = one_hot_seq(&cycle_tokens(seq, vocab), vocab).unwrap();
    let targets = one_hot_seq(&cycle_tokens(seq + 1, vocab)[1..], vocab).unwrap();
    let hprev = Tensor::zeros(&[hidden]);
    let reference = reference_bptt(&weights, &inputs, &targets, &hprev);

    let mut outputs = Vec::new();
    for x in &inputs {
        outputs.push(model.forward(x).unwrap());
    }
    for t in 0..seq {
        assert_eq!(&outputs[t], &reference.ys[t]);
        assert_eq!(model.state(t as isize).unwrap(), reference.hs[t]);
    }

    let mut sink = GradientDescent::new(0.1);
    let loss = CrossEntropyLoss;
    let mut total = 0.0;
    for t in (0..seq).rev() {
        total += loss.loss(&outputs[t], &targets[t]).unwrap();
        let grad = loss.gradient(&outputs[t], &targets[t]).unwrap();
        model.backward(&grad, &mut sink).unwrap();
    }
    assert_abs_diff_eq!(total, reference.loss, epsilon = 1e-12);

    // Accumulators hold the exact sums the reference computed, and the
    // chained hidden gradients match step by step.
    assert_eq!(weights.wxh.grad(), reference.dwxh);
    assert_eq!(weights.whh.grad(), reference.dwhh);
    assert_eq!(weights.why.grad(), reference.dwhy);
    assert_eq!(weights.bh.grad(), reference.dbh);
    assert_eq!(weights.by.grad(), reference.dby);
    for t in 0..seq {
        assert_eq!(model.djdh(t).unwrap(), reference.dh_future[t]);
    }
}

#[test]
fn test_gradients_accumulate_across_steps() {
    // Two steps contribute to the same accumulator; the result is their sum,
    // not the last write.
    let (vocab, hidden, seq) = (3, 4, 2);
    let weights = VanillaWeights::random(vocab, vocab, hidden);
    let mut model = Vanilla::new(vocab, vocab, hidden, seq, weights.clone()).unwrap();

    let inputs = one_hot_seq(&[0, 1], vocab).unwrap();
    let targets = one_hot_seq(&[1, 2], vocab).unwrap();
    let mut outputs = Vec::new();
    for x in &inputs {
        outputs.push(model.forward(x).unwrap());
    }
    let h0 = model.state(0).unwrap();
    let h1 = model.state(1).unwrap();

    let mut sink = GradientDescent::new(0.1);
    let loss = CrossEntropyLoss;
    let dy1 = loss.gradient(&outputs[1], &targets[1]).unwrap();
    model.backward(&dy1, &mut sink).unwrap();
    let dwhy_after_one = weights.why.grad();
    assert_eq!(dwhy_after_one, Tensor::outer(&dy1, &h1).unwrap());

    let dy0 = loss.gradient(&outputs[0], &targets[0]).unwrap();
    model.backward(&dy0, &mut sink).unwrap();
    let mut expected = dwhy_after_one;
    expected
        .add_assign(&Tensor::outer(&dy0, &h0).unwrap())
        .unwrap();
    assert_eq!(weights.why.grad(), expected);
}

#[test]
fn test_hidden_state_carries_into_next_window() {
    let (vocab, hidden, seq) = (3, 4, 3);
    let weights = VanillaWeights::random(vocab, vocab, hidden);
    let mut model = Vanilla::new(vocab, vocab, hidden, seq, weights.clone()).unwrap();

    let inputs = one_hot_seq(&cycle_tokens(seq, vocab), vocab).unwrap();
    let targets = one_hot_seq(&cycle_tokens(seq + 1, vocab)[1..], vocab).unwrap();
    let mut outputs = Vec::new();
    for x in &inputs {
        outputs.push(model.forward(x).unwrap());
    }
    let h_last = model.state(seq as isize - 1).unwrap();

    let mut sink = GradientDescent::new(0.1);
    let loss = CrossEntropyLoss;
    for t in (0..seq).rev() {
        let g = loss.gradient(&outputs[t], &targets[t]).unwrap();
        model.backward(&g, &mut sink).unwrap();
    }

    // The window closed: its last hidden state is the next initial state.
    assert_eq!(model.window_step(), 0);
    assert_eq!(model.state(-1).unwrap(), h_last);

    let x = &inputs[0];
    let expected = weights
        .wxh
        .value()
        .matvec(x)
        .unwrap()
        .add(&weights.whh.value().matvec(&h_last).unwrap())
        .unwrap()
        .add(&weights.bh.value())
        .unwrap()
        .tanh();
    model.forward(x).unwrap();
    assert_eq!(model.state(0).unwrap(), expected);
}

#[test]
fn test_clear_memory_prevents_state_leakage() {
    let (vocab, hidden, seq) = (3, 4, 4);
    let weights = VanillaWeights::random(vocab, vocab, hidden);
    let mut model = Vanilla::new(vocab, vocab, hidden, seq, weights.clone()).unwrap();

    let inputs = one_hot_seq(&cycle_tokens(3, vocab), vocab).unwrap();
    for x in &inputs {
        model.forward(x).unwrap();
    }
    model.clear_memory();
    assert_eq!(model.window_step(), 0);
    assert!(model.state(-1).is_none());
    assert!(model.state(0).is_none());

    // After clearing, the first step behaves like a fresh model.
    let mut fresh = Vanilla::new(vocab, vocab, hidden, seq, weights).unwrap();
    let y_cleared = model.forward(&inputs[0]).unwrap();
    let y_fresh = fresh.forward(&inputs[0]).unwrap();
    assert_eq!(y_cleared, y_fresh);
}

#[test]
fn test_inference_streams_past_the_unroll_length() {
    let (vocab, hidden, seq) = (3, 4, 3);
    let weights = VanillaWeights::random(vocab, vocab, hidden);
    let mut model = Vanilla::new(vocab, vocab, hidden, seq, weights.clone()).unwrap();

    let tokens = cycle_tokens(10, vocab);
    let inputs = one_hot_seq(&tokens, vocab).unwrap();
    let mut h = Tensor::zeros(&[hidden]);
    for x in &inputs {
        h = weights
            .wxh
            .value()
            .matvec(x)
            .unwrap()
            .add(&weights.whh.value().matvec(&h).unwrap())
            .unwrap()
            .add(&weights.bh.value())
            .unwrap()
            .tanh();
        let expected = weights
            .why
            .value()
            .matvec(&h)
            .unwrap()
            .add(&weights.by.value())
            .unwrap();
        // The hidden chain is unbroken even when the window rolls.
        assert_eq!(model.forward(x).unwrap(), expected);
    }
}

#[test]
fn test_out_of_order_calls_fail_loudly() {
    let (vocab, hidden, seq) = (3, 4, 3);
    let weights = VanillaWeights::random(vocab, vocab, hidden);
    let mut model = Vanilla::new(vocab, vocab, hidden, seq, weights).unwrap();
    let mut sink = GradientDescent::new(0.1);
    let grad = Tensor::vector(vec![0.1, -0.1, 0.0]);

    // Backward with no forward at all.
    let err = model.backward(&grad, &mut sink).unwrap_err();
    assert!(matches!(err, RecurveError::UninitializedState { .. }));

    // Forward in the middle of a backward sweep.
    let inputs = one_hot_seq(&[0, 1], vocab).unwrap();
    model.forward(&inputs[0]).unwrap();
    model.forward(&inputs[1]).unwrap();
    model.backward(&grad, &mut sink).unwrap();
    let err = model.forward(&inputs[0]).unwrap_err();
    assert!(matches!(err, RecurveError::UninitializedState { .. }));

    // One more backward than forwards.
    model.backward(&grad, &mut sink).unwrap();
    let err = model.backward(&grad, &mut sink).unwrap_err();
    assert!(matches!(err, RecurveError::UninitializedState { .. }));
}

#[test]
fn test_gradients_match_finite_differences() {
    let (vocab, hidden, seq) = (3, 4, 3);
    let weights = VanillaWeights::random(vocab, vocab, hidden);
    let inputs = one_hot_seq(&cycle_tokens(seq, vocab), vocab).unwrap();
    let targets = one_hot_seq(&cycle_tokens(seq + 1, vocab)[1..], vocab).unwrap();

    let window_loss = |weights: &VanillaWeights| -> f64 {
        let mut model = Vanilla::new(vocab, vocab, hidden, seq, weights.clone()).unwrap();
        let loss = CrossEntropyLoss;
        let mut total = 0.0;
        for (x, t) in inputs.iter().zip(targets.iter()) {
            let y = model.forward(x).unwrap();
            total += loss.loss(&y, t).unwrap();
        }
        total
    };

    // Analytical gradients from one full backward sweep.
    let mut model = Vanilla::new(vocab, vocab, hidden, seq, weights.clone()).unwrap();
    let loss = CrossEntropyLoss;
    let mut outputs = Vec::new();
    for x in &inputs {
        outputs.push(model.forward(x).unwrap());
    }
    let mut sink = GradientDescent::new(0.1);
    for t in (0..seq).rev() {
        let grad = loss.gradient(&outputs[t], &targets[t]).unwrap();
        model.backward(&grad, &mut sink).unwrap();
    }
    let analytical: Vec<Tensor> = weights.all().iter().map(|w| w.grad()).collect();

    // Central finite differences over every parameter element.
    let epsilon = 1e-6;
    for (w, analytical_grad) in weights.all().iter().zip(analytical.iter()) {
        let base = w.value();
        for i in 0..base.numel() {
            let mut plus = base.clone();
            plus.data_mut()[i] += epsilon;
            w.set_value(plus).unwrap();
            let loss_plus = window_loss(&weights);

            let mut minus = base.clone();
            minus.data_mut()[i] -= epsilon;
            w.set_value(minus).unwrap();
            let loss_minus = window_loss(&weights);

            w.set_value(base.clone()).unwrap();
            let numerical = (loss_plus - loss_minus) / (2.0 * epsilon);
            assert_abs_diff_eq!(analytical_grad.data()[i], numerical, epsilon = 1e-6);
        }
    }
}

#[test]
fn test_message_variant_is_an_exact_equivalent() {
    let (vocab, hidden, seq) = (4, 5, 4);
    let weights_a = VanillaWeights::random(vocab, vocab, hidden);
    let weights_b = weights_a.detach();

    let mut plain = Vanilla::new(vocab, vocab, hidden, seq, weights_a.clone()).unwrap();
    let mut net = VanillaNet::new(vocab, vocab, hidden, weights_b.clone()).unwrap();
    net.handle(Command::InitNodes(seq)).unwrap();

    let tokens = cycle_tokens(2 * seq + 1, vocab);
    let inputs = one_hot_seq(&tokens[..2 * seq], vocab).unwrap();
    let targets = one_hot_seq(&tokens[1..], vocab).unwrap();

    let trainer = Trainer::new();
    let loss = CrossEntropyLoss;
    let mut opt_a = AdaGrad::with_clip(0.1, 5.0).unwrap();
    let mut opt_b = AdaGrad::with_clip(0.1, 5.0).unwrap();
    for window in 0..2 {
        let span = window * seq..(window + 1) * seq;
        let la = trainer
            .learn_window(&mut plain, &inputs[span.clone()], &targets[span.clone()], &loss, &mut opt_a)
            .unwrap();
        let lb = trainer
            .learn_window(&mut net, &inputs[span.clone()], &targets[span], &loss, &mut opt_b)
            .unwrap();
        assert_eq!(la, lb);
    }

    for (a, b) in weights_a.all().iter().zip(weights_b.all().iter()) {
        assert_eq!(a.value(), b.value());
    }

    // Inference agrees as well.
    plain.clear_memory();
    net.handle(Command::ClearMemory).unwrap();
    let x = &inputs[0];
    assert_eq!(
        plain.forward(x).unwrap(),
        Recurrent::forward(&mut net, x).unwrap()
    );
}

#[test]
fn test_weights_save_load_round_trip() {
    let path = std::env::temp_dir().join("recurve_vanilla_weights.json");
    let weights = VanillaWeights::random(5, 5, 7);
    weights.save(&path).unwrap();
    let restored = VanillaWeights::load(&path).unwrap();
    for (a, b) in weights.all().iter().zip(restored.all().iter()) {
        assert_eq!(a.value(), b.value());
    }
    let _ = std::fs::remove_file(&path);
}

#[test]
fn test_two_models_can_share_one_parameter_set() {
    // Construction from shared handles: both instances observe one buffer.
    let (vocab, hidden, seq) = (3, 4, 2);
    let weights = VanillaWeights::random(vocab, vocab, hidden);
    let mut first = Vanilla::new(vocab, vocab, hidden, seq, weights.clone()).unwrap();
    let mut second = Vanilla::new(vocab, vocab, hidden, seq, weights.clone()).unwrap();

    let inputs = one_hot_seq(&[0, 1], vocab).unwrap();
    let targets = one_hot_seq(&[1, 2], vocab).unwrap();
    let trainer = Trainer::new();
    let mut opt = AdaGrad::with_clip(0.1, 5.0).unwrap();
    trainer
        .learn_window(&mut first, &inputs, &targets, &CrossEntropyLoss, &mut opt)
        .unwrap();

    // The update through `first` is visible through `second`.
    assert!(first.weights().wxh.ptr_eq(&second.weights().wxh));
    second.clear_memory();
    first.clear_memory();
    assert_eq!(
        first.forward(&inputs[0]).unwrap(),
        second.forward(&inputs[0]).unwrap()
    );
}
