use crate::error::RecurveError;
use crate::nn::tree::CompositionTree;
use crate::nn::weight::SharedWeight;
use crate::optim::Optimizer;
use crate::tensor::Tensor;

/// The atomic unit of the forward/backward engine.
///
/// A node either consumes the outer input list (`Input`, `Sum`) or the
/// output of its predecessor in a [`CompositionTree`]. Nodes cache whatever
/// their backward pass needs during forward; backward consumes the cache, so
/// calling it twice, or before a forward, fails with
/// [`RecurveError::UninitializedState`].
#[derive(Debug)]
pub enum Node {
    /// Selects one slot of the outer input list and passes it through.
    Input { slot: usize },
    /// `weight . x`; the weight gradient is the outer product of the
    /// incoming gradient with the cached input.
    MatMul {
        weight: SharedWeight,
        cached_input: Option<Tensor>,
    },
    /// `x + weight`; the weight gradient is the incoming gradient itself.
    BiasAdd { weight: SharedWeight },
    /// Elementwise sum of sub-trees. Every child sees the full outer input
    /// list and may consume a different slot of it.
    Sum { children: Vec<CompositionTree> },
    Tanh { cached_output: Option<Tensor> },
    Softmax { cached_output: Option<Tensor> },
}

impl Node {
    pub fn input(slot: usize) -> Node {
        Node::Input { slot }
    }

    pub fn matmul(weight: SharedWeight) -> Node {
        Node::MatMul {
            weight,
            cached_input: None,
        }
    }

    pub fn bias_add(weight: SharedWeight) -> Node {
        Node::BiasAdd { weight }
    }

    pub fn sum(children: Vec<CompositionTree>) -> Node {
        Node::Sum { children }
    }

    pub fn tanh() -> Node {
        Node::Tanh {
            cached_output: None,
        }
    }

    pub fn softmax() -> Node {
        Node::Softmax {
            cached_output: None,
        }
    }

    /// True for the node kinds allowed at the head of a tree.
    pub(crate) fn is_entry(&self) -> bool {
        matches!(self, Node::Input { .. } | Node::Sum { .. })
    }

    fn single<'a>(inputs: &'a [Tensor], operation: &str) -> Result<&'a Tensor, RecurveError> {
        match inputs {
            [x] => Ok(x),
            _ => Err(RecurveError::ConfigurationError(format!(
                "{} expects exactly one input, got {}",
                operation,
                inputs.len()
            ))),
        }
    }

    pub(crate) fn forward(&mut self, inputs: &[Tensor]) -> Result<Tensor, RecurveError> {
        match self {
            Node::Input { slot } => inputs
                .get(*slot)
                .cloned()
                .ok_or(RecurveError::IndexOutOfBounds {
                    index: *slot,
                    size: inputs.len(),
                }),
            Node::MatMul {
                weight,
                cached_input,
            } => {
                let x = Self::single(inputs, "MatMul::forward")?;
                let y = weight.borrow().get().matvec(x)?;
                *cached_input = Some(x.clone());
                Ok(y)
            }
            Node::BiasAdd { weight } => {
                let x = Self::single(inputs, "BiasAdd::forward")?;
                x.add(weight.borrow().get())
            }
            Node::Sum { children } => {
                let mut iter = children.iter_mut();
                let first = iter.next().ok_or_else(|| {
                    RecurveError::ConfigurationError("Sum node with no children".to_string())
                })?;
                let mut total = first.forward(inputs)?;
                for child in iter {
                    let out = child.forward(inputs)?;
                    total = total.add(&out)?;
                }
                Ok(total)
            }
            Node::Tanh { cached_output } => {
                let x = Self::single(inputs, "Tanh::forward")?;
                let y = x.tanh();
                *cached_output = Some(y.clone());
                Ok(y)
            }
            Node::Softmax { cached_output } => {
                let x = Self::single(inputs, "Softmax::forward")?;
                let y = x.softmax()?;
                *cached_output = Some(y.clone());
                Ok(y)
            }
        }
    }

    /// Backward step for a node in chain position: returns the gradient with
    /// respect to the predecessor's output. Weight-owning nodes also add
    /// their local contribution into the shared accumulator and register the
    /// weight with the optimizer.
    pub(crate) fn backward_chain(
        &mut self,
        grad: &Tensor,
        optimizer: &mut dyn Optimizer,
    ) -> Result<Tensor, RecurveError> {
        match self {
            Node::MatMul {
                weight,
                cached_input,
            } => {
                let x = cached_input
                    .take()
                    .ok_or_else(|| RecurveError::UninitializedState {
                        operation: "MatMul::backward".to_string(),
                    })?;
                let dw = Tensor::outer(grad, &x)?;
                weight.accumulate(&dw)?;
                optimizer.register(weight);
                weight.borrow().get().matvec_t(grad)
            }
            Node::BiasAdd { weight } => {
                weight.accumulate(grad)?;
                optimizer.register(weight);
                Ok(grad.clone())
            }
            Node::Tanh { cached_output } => {
                let y = cached_output
                    .take()
                    .ok_or_else(|| RecurveError::UninitializedState {
                        operation: "Tanh::backward".to_string(),
                    })?;
                y.map(|v| 1.0 - v * v).mul(grad)
            }
            Node::Softmax { cached_output } => {
                let y = cached_output
                    .take()
                    .ok_or_else(|| RecurveError::UninitializedState {
                        operation: "Softmax::backward".to_string(),
                    })?;
                // Jacobian-vector product y * (g - <g, y>); no full Jacobian
                // is ever materialized.
                let shift = grad.dot(&y)?;
                y.mul(&grad.map(|g| g - shift))
            }
            Node::Input { .. } | Node::Sum { .. } => Err(RecurveError::ConfigurationError(
                "entry node found in chain position during backward".to_string(),
            )),
        }
    }

    /// Backward step for the entry node: distributes the gradient over the
    /// outer input slots. Slots nothing consumed stay `None`.
    pub(crate) fn backward_entry(
        &mut self,
        grad: &Tensor,
        optimizer: &mut dyn Optimizer,
        arity: usize,
    ) -> Result<Vec<Option<Tensor>>, RecurveError> {
        match self {
            Node::Input { slot } => {
                if *slot >= arity {
                    return Err(RecurveError::IndexOutOfBounds {
                        index: *slot,
                        size: arity,
                    });
                }
                let mut slots = vec![None; arity];
                slots[*slot] = Some(grad.clone());
                Ok(slots)
            }
            Node::Sum { children } => {
                // d(sum)/d(child) = 1: the same gradient is routed to every
                // child, and per-slot contributions add up.
                let mut merged: Vec<Option<Tensor>> = vec![None; arity];
                for child in children.iter_mut() {
                    let slots = child.backward_slots(grad, &mut *optimizer)?;
                    for (acc, slot) in merged.iter_mut().zip(slots.into_iter()) {
                        if let Some(s) = slot {
                            match acc {
                                Some(a) => a.add_assign(&s)?,
                                None => *acc = Some(s),
                            }
                        }
                    }
                }
                Ok(merged)
            }
            _ => Err(RecurveError::ConfigurationError(
                "chain node found in entry position during backward".to_string(),
            )),
        }
    }
}
