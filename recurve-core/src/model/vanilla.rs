use crate::error::RecurveError;
use crate::model::Recurrent;
use crate::nn::init;
use crate::nn::node::Node;
use crate::nn::tree::CompositionTree;
use crate::nn::weight::SharedWeight;
use crate::optim::Optimizer;
use crate::tensor::Tensor;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// The five trainable tensors of a vanilla recurrent cell.
///
/// Cloning shares the underlying buffers, which is how two model instances
/// can train the same parameters; use [`detach`] for an independent copy.
///
/// [`detach`]: VanillaWeights::detach
#[derive(Debug, Clone)]
pub struct VanillaWeights {
    pub wxh: SharedWeight,
    pub whh: SharedWeight,
    pub why: SharedWeight,
    pub bh: SharedWeight,
    pub by: SharedWeight,
}

#[derive(Serialize, Deserialize)]
struct VanillaWeightsState {
    wxh: Tensor,
    whh: Tensor,
    why: Tensor,
    bh: Tensor,
    by: Tensor,
}

fn expect_shape(
    actual: Vec<usize>,
    expected: &[usize],
    name: &str,
) -> Result<(), RecurveError> {
    if actual != expected {
        return Err(RecurveError::ShapeMismatch {
            expected: expected.to_vec(),
            actual,
            operation: format!("VanillaWeights ({})", name),
        });
    }
    Ok(())
}

impl VanillaWeights {
    /// Wraps existing shared handles, checking that the five shapes are
    /// mutually consistent: wxh [H,V], whh [H,H], why [O,H], bh [H], by [O].
    pub fn from_shared(
        wxh: SharedWeight,
        whh: SharedWeight,
        why: SharedWeight,
        bh: SharedWeight,
        by: SharedWeight,
    ) -> Result<Self, RecurveError> {
        let wxh_shape = wxh.shape();
        if wxh_shape.len() != 2 {
            return Err(RecurveError::DimensionMismatch {
                expected: 2,
                actual: wxh_shape.len(),
                operation: "VanillaWeights (wxh)".to_string(),
            });
        }
        let hidden = wxh_shape[0];
        expect_shape(whh.shape(), &[hidden, hidden], "whh")?;
        let why_shape = why.shape();
        if why_shape.len() != 2 {
            return Err(RecurveError::DimensionMismatch {
                expected: 2,
                actual: why_shape.len(),
                operation: "VanillaWeights (why)".to_string(),
            });
        }
        let output = why_shape[0];
        expect_shape(why.shape(), &[output, hidden], "why")?;
        expect_shape(bh.shape(), &[hidden], "bh")?;
        expect_shape(by.shape(), &[output], "by")?;
        Ok(VanillaWeights { wxh, whh, why, bh, by })
    }

    /// Takes ownership of five initial value tensors.
    pub fn from_tensors(
        wxh: Tensor,
        whh: Tensor,
        why: Tensor,
        bh: Tensor,
        by: Tensor,
    ) -> Result<Self, RecurveError> {
        Self::from_shared(
            SharedWeight::new(wxh),
            SharedWeight::new(whh),
            SharedWeight::new(why),
            SharedWeight::new(bh),
            SharedWeight::new(by),
        )
    }

    /// Small random weights (scaled normal) and zero biases.
    pub fn random(input_size: usize, output_size: usize, hidden_size: usize) -> Self {
        VanillaWeights {
            wxh: SharedWeight::new(init::randn(&[hidden_size, input_size], 0.01)),
            whh: SharedWeight::new(init::randn(&[hidden_size, hidden_size], 0.01)),
            why: SharedWeight::new(init::randn(&[output_size, hidden_size], 0.01)),
            bh: SharedWeight::new(init::zeros(&[hidden_size])),
            by: SharedWeight::new(init::zeros(&[output_size])),
        }
    }

    /// An independent value copy with fresh buffer identities.
    pub fn detach(&self) -> VanillaWeights {
        VanillaWeights {
            wxh: self.wxh.detach(),
            whh: self.whh.detach(),
            why: self.why.detach(),
            bh: self.bh.detach(),
            by: self.by.detach(),
        }
    }

    pub fn input_size(&self) -> usize {
        self.wxh.shape()[1]
    }

    pub fn hidden_size(&self) -> usize {
        self.wxh.shape()[0]
    }

    pub fn output_size(&self) -> usize {
        self.why.shape()[0]
    }

    /// The five handles in a fixed order (wxh, whh, why, bh, by).
    pub fn all(&self) -> [&SharedWeight; 5] {
        [&self.wxh, &self.whh, &self.why, &self.bh, &self.by]
    }

    /// Writes the full parameter state to `path` as JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), RecurveError> {
        let path = path.as_ref();
        let state = VanillaWeightsState {
            wxh: self.wxh.value(),
            whh: self.whh.value(),
            why: self.why.value(),
            bh: self.bh.value(),
            by: self.by.value(),
        };
        let json = serde_json::to_string(&state).map_err(|e| RecurveError::Serialization {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        fs::write(path, json).map_err(|e| RecurveError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }

    /// Restores a parameter state previously written by [`save`].
    ///
    /// [`save`]: VanillaWeights::save
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RecurveError> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|e| RecurveError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let state: VanillaWeightsState =
            serde_json::from_str(&json).map_err(|e| RecurveError::Serialization {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
        Self::from_tensors(state.wxh, state.whh, state.why, state.bh, state.by)
    }
}

/// A vanilla recurrent network unrolled over `seq_length` time steps.
///
/// Each step owns two [`CompositionTree`] instances, a state transition
/// `h_t = tanh(wxh.x_t + whh.h_(t-1) + bh)` and an output projection
/// `y_t = why.h_t + by`, all wired to the same five shared weights, so a
/// window's backward passes sum their gradient contributions into five
/// accumulators. Softmax and the loss stay outside the model.
#[derive(Debug)]
pub struct Vanilla {
    input_size: usize,
    output_size: usize,
    hidden_size: usize,
    seq_length: usize,
    weights: VanillaWeights,
    pub(crate) statenet: Vec<CompositionTree>,
    pub(crate) outputnet: Vec<CompositionTree>,
    /// Hidden history by time index; index -1 holds the window's initial
    /// state and is absent until a previous window supplies one.
    history: HashMap<isize, Tensor>,
    /// Per-step hidden gradient chained in from the future, for diagnostics.
    djdh: HashMap<usize, Tensor>,
    dh_next: Tensor,
    window_step: usize,
    back_cursor: usize,
}

impl Vanilla {
    pub fn new(
        input_size: usize,
        output_size: usize,
        hidden_size: usize,
        seq_length: usize,
        weights: VanillaWeights,
    ) -> Result<Self, RecurveError> {
        if seq_length == 0 {
            return Err(RecurveError::ConfigurationError(
                "seq_length must be at least 1".to_string(),
            ));
        }
        if weights.input_size() != input_size
            || weights.hidden_size() != hidden_size
            || weights.output_size() != output_size
        {
            return Err(RecurveError::ConfigurationError(format!(
                "weights sized for ({}, {}, {}) do not fit a ({}, {}, {}) model",
                weights.input_size(),
                weights.output_size(),
                weights.hidden_size(),
                input_size,
                output_size,
                hidden_size
            )));
        }
        let mut statenet = Vec::with_capacity(seq_length);
        let mut outputnet = Vec::with_capacity(seq_length);
        for _ in 0..seq_length {
            statenet.push(Self::build_state_tree(&weights)?);
            outputnet.push(Self::build_output_tree(&weights)?);
        }
        Ok(Vanilla {
            input_size,
            output_size,
            hidden_size,
            seq_length,
            weights,
            statenet,
            outputnet,
            history: HashMap::new(),
            djdh: HashMap::new(),
            dh_next: Tensor::zeros(&[hidden_size]),
            window_step: 0,
            back_cursor: 0,
        })
    }

    fn build_state_tree(weights: &VanillaWeights) -> Result<CompositionTree, RecurveError> {
        let sum = Node::sum(vec![
            CompositionTree::new(vec![Node::input(0), Node::matmul(weights.wxh.clone())], 2)?,
            CompositionTree::new(vec![Node::input(1), Node::matmul(weights.whh.clone())], 2)?,
        ]);
        CompositionTree::new(
            vec![sum, Node::bias_add(weights.bh.clone()), Node::tanh()],
            2,
        )
    }

    fn build_output_tree(weights: &VanillaWeights) -> Result<CompositionTree, RecurveError> {
        CompositionTree::new(
            vec![
                Node::input(0),
                Node::matmul(weights.why.clone()),
                Node::bias_add(weights.by.clone()),
            ],
            1,
        )
    }

    pub fn weights(&self) -> &VanillaWeights {
        &self.weights
    }

    pub fn input_size(&self) -> usize {
        self.input_size
    }

    pub fn output_size(&self) -> usize {
        self.output_size
    }

    pub fn hidden_size(&self) -> usize {
        self.hidden_size
    }

    pub fn unroll_length(&self) -> usize {
        self.seq_length
    }

    /// Number of forward steps taken in the current window.
    pub fn window_step(&self) -> usize {
        self.window_step
    }

    /// Hidden state at time index `t` within the current window (`-1` is the
    /// initial state carried in from the previous window, if any).
    pub fn state(&self, t: isize) -> Option<Tensor> {
        self.history.get(&t).cloned()
    }

    /// Hidden-state gradient chained into step `t` from the future, recorded
    /// by the most recent backward sweep.
    pub fn djdh(&self, t: usize) -> Option<Tensor> {
        self.djdh.get(&t).cloned()
    }

    // Carries the last hidden state into the next window's initial slot and
    // resets the per-window bookkeeping.
    fn roll_window(&mut self) {
        let last = self.history.get(&(self.window_step as isize - 1)).cloned();
        self.history.clear();
        if let Some(h) = last {
            self.history.insert(-1, h);
        }
        self.window_step = 0;
        self.back_cursor = 0;
        self.dh_next = Tensor::zeros(&[self.hidden_size]);
    }

    /// One forward time step. Returns the unnormalized scores `y_t`.
    ///
    /// When the window is already full, the model rolls it forward first,
    /// carrying the last hidden state, so pure inference can stream past the
    /// unroll length indefinitely.
    pub fn forward(&mut self, input: &Tensor) -> Result<Tensor, RecurveError> {
        if self.back_cursor != 0 {
            return Err(RecurveError::UninitializedState {
                operation: "Vanilla::forward during an unfinished backward pass".to_string(),
            });
        }
        if self.window_step == self.seq_length {
            self.roll_window();
        }
        if self.window_step == 0 {
            self.djdh.clear();
        }
        let t = self.window_step;
        let h_prev = self
            .history
            .get(&(t as isize - 1))
            .cloned()
            .unwrap_or_else(|| Tensor::zeros(&[self.hidden_size]));
        let h = self.statenet[t].forward(&[input.clone(), h_prev])?;
        self.history.insert(t as isize, h.clone());
        let scores = self.outputnet[t].forward(std::slice::from_ref(&h))?;
        self.window_step += 1;
        Ok(scores)
    }

    /// One backward time step, for the latest step not yet backwarded.
    ///
    /// `grad` is the loss gradient with respect to that step's scores. The
    /// hidden-state gradient is chained to the previous step; gradient
    /// contributions of every step land in the five shared accumulators.
    /// When the sweep reaches step 0 the window closes and the last hidden
    /// state carries over.
    pub fn backward(
        &mut self,
        grad: &Tensor,
        optimizer: &mut dyn Optimizer,
    ) -> Result<(), RecurveError> {
        if self.back_cursor >= self.window_step {
            return Err(RecurveError::UninitializedState {
                operation: "Vanilla::backward without a matching forward".to_string(),
            });
        }
        let t = self.window_step - 1 - self.back_cursor;
        let mut from_output = self.outputnet[t].backward(grad, &mut *optimizer)?;
        let dh_out = from_output.pop().ok_or_else(|| {
            RecurveError::InternalError("output tree returned no input gradient".to_string())
        })?;
        self.djdh.insert(t, self.dh_next.clone());
        let dh = dh_out.add(&self.dh_next)?;
        let mut slots = self.statenet[t].backward(&dh, optimizer)?;
        let dh_prev = slots.pop().ok_or_else(|| {
            RecurveError::InternalError("state tree returned no hidden gradient".to_string())
        })?;
        self.dh_next = dh_prev;
        self.back_cursor += 1;
        if self.back_cursor == self.window_step {
            self.roll_window();
        }
        Ok(())
    }

    /// Forgets hidden history and any half-finished window, so the next
    /// window starts from a zero initial state. Use between unrelated
    /// sequences to prevent state leaking across them.
    pub fn clear_memory(&mut self) {
        self.history.clear();
        self.djdh.clear();
        self.window_step = 0;
        self.back_cursor = 0;
        self.dh_next = Tensor::zeros(&[self.hidden_size]);
    }
}

impl Recurrent for Vanilla {
    fn forward(&mut self, input: &Tensor) -> Result<Tensor, RecurveError> {
        Vanilla::forward(self, input)
    }

    fn backward(
        &mut self,
        grad: &Tensor,
        optimizer: &mut dyn Optimizer,
    ) -> Result<(), RecurveError> {
        Vanilla::backward(self, grad, optimizer)
    }

    fn clear_memory(&mut self) {
        Vanilla::clear_memory(self)
    }

    fn unroll_length(&self) -> usize {
        self.seq_length
    }
}
