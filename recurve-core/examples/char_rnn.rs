//! Character-level RNN demo: fits a tiny corpus with windowed BPTT and
//! AdaGrad, then greedily samples a continuation.
//!
//! Run with `RUST_LOG=debug` to watch the per-epoch losses.

use recurve_core::model::{Vanilla, VanillaWeights};
use recurve_core::nn::losses::CrossEntropyLoss;
use recurve_core::optim::AdaGrad;
use recurve_core::trainer::Trainer;
use recurve_core::utils::encoding::{one_hot, one_hot_seq};
use recurve_core::RecurveError;

const CORPUS: &str = "the rain in spain stays mainly in the plain. \
in hertford, hereford, and hampshire, hurricanes hardly ever happen. ";

fn main() -> Result<(), RecurveError> {
    env_logger::init();

    let chars: Vec<char> = CORPUS.chars().collect();
    let mut alphabet: Vec<char> = chars.clone();
    alphabet.sort_unstable();
    alphabet.dedup();
    let vocab = alphabet.len();
    println!("corpus has {} characters, {} unique", chars.len(), vocab);

    let tokens: Vec<usize> = chars
        .iter()
        .map(|ch| alphabet.iter().position(|c| c == ch).unwrap_or(0))
        .collect();
    let inputs = one_hot_seq(&tokens[..tokens.len() - 1], vocab)?;
    let targets = one_hot_seq(&tokens[1..], vocab)?;

    let hidden = 64;
    let window = 25;
    let weights = VanillaWeights::random(vocab, vocab, hidden);
    let mut model = Vanilla::new(vocab, vocab, hidden, window, weights)?;
    let trainer = Trainer::new();
    let mut optimizer = AdaGrad::with_clip(0.1, 5.0)?;

    for round in 0..10 {
        let loss = trainer.learn_throughtime(
            &mut model,
            &inputs,
            &targets,
            &CrossEntropyLoss,
            &mut optimizer,
            10,
            Some(window),
        )?;
        println!("round {:2}: epoch loss {:8.3}", round, loss);
    }

    model.clear_memory();
    let mut x = one_hot(tokens[0], vocab)?;
    let mut sampled = String::new();
    sampled.push(alphabet[tokens[0]]);
    for _ in 0..200 {
        let scores = model.forward(&x)?;
        let next = scores.softmax()?.argmax();
        sampled.push(alphabet[next]);
        x = one_hot(next, vocab)?;
    }
    println!("----\n{}\n----", sampled);
    Ok(())
}
