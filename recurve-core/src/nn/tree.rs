use crate::error::RecurveError;
use crate::nn::node::Node;
use crate::optim::Optimizer;
use crate::tensor::Tensor;

/// An ordered sequence of [`Node`]s implementing one differentiable function.
///
/// The first node is the entry point (an `Input` slot selector or a `Sum`
/// over sub-trees) and consumes the outer input list; every later node
/// consumes its predecessor's output. Forward evaluates the nodes in order,
/// backward walks them in strict reverse and returns the gradient for every
/// outer input slot.
#[derive(Debug)]
pub struct CompositionTree {
    nodes: Vec<Node>,
    arity: usize,
    forwarded: bool,
}

impl CompositionTree {
    /// Builds a tree over `arity` outer input slots.
    ///
    /// Fails when the node list is empty, the head node is not an entry
    /// kind, an entry kind appears mid-chain, an `Input` slot is out of
    /// range, or a `Sum` child was built for a different arity.
    pub fn new(nodes: Vec<Node>, arity: usize) -> Result<Self, RecurveError> {
        let entry = nodes.first().ok_or_else(|| {
            RecurveError::ConfigurationError("composition tree requires at least one node".to_string())
        })?;
        if !entry.is_entry() {
            return Err(RecurveError::ConfigurationError(
                "a composition tree must start with an Input or Sum node".to_string(),
            ));
        }
        match entry {
            Node::Input { slot } if *slot >= arity => {
                return Err(RecurveError::IndexOutOfBounds {
                    index: *slot,
                    size: arity,
                });
            }
            Node::Sum { children } => {
                for child in children {
                    if child.arity() != arity {
                        return Err(RecurveError::ConfigurationError(format!(
                            "Sum child built for arity {}, parent tree has arity {}",
                            child.arity(),
                            arity
                        )));
                    }
                }
            }
            _ => {}
        }
        if nodes.iter().skip(1).any(Node::is_entry) {
            return Err(RecurveError::ConfigurationError(
                "Input and Sum nodes are only valid at the head of a tree".to_string(),
            ));
        }
        Ok(CompositionTree {
            nodes,
            arity,
            forwarded: false,
        })
    }

    pub fn arity(&self) -> usize {
        self.arity
    }

    /// Evaluates the tree, caching whatever the backward pass will need.
    pub fn forward(&mut self, inputs: &[Tensor]) -> Result<Tensor, RecurveError> {
        if inputs.len() != self.arity {
            return Err(RecurveError::DimensionMismatch {
                expected: self.arity,
                actual: inputs.len(),
                operation: "CompositionTree::forward".to_string(),
            });
        }
        let mut iter = self.nodes.iter_mut();
        let entry = iter.next().ok_or_else(|| {
            RecurveError::InternalError("composition tree lost its entry node".to_string())
        })?;
        let mut value = entry.forward(inputs)?;
        for node in iter {
            value = node.forward(std::slice::from_ref(&value))?;
        }
        self.forwarded = true;
        Ok(value)
    }

    /// Propagates `grad` back through the tree, accumulating weight
    /// gradients along the way, and returns the gradient for each outer
    /// input slot.
    ///
    /// Must be called exactly once per [`forward`]; `grad` must have the
    /// shape of the forward output.
    ///
    /// [`forward`]: CompositionTree::forward
    pub fn backward(
        &mut self,
        grad: &Tensor,
        optimizer: &mut dyn Optimizer,
    ) -> Result<Vec<Tensor>, RecurveError> {
        let slots = self.backward_slots(grad, optimizer)?;
        slots
            .into_iter()
            .enumerate()
            .map(|(i, slot)| {
                slot.ok_or_else(|| {
                    RecurveError::InternalError(format!("input slot {} received no gradient", i))
                })
            })
            .collect()
    }

    pub(crate) fn backward_slots(
        &mut self,
        grad: &Tensor,
        optimizer: &mut dyn Optimizer,
    ) -> Result<Vec<Option<Tensor>>, RecurveError> {
        if !self.forwarded {
            return Err(RecurveError::UninitializedState {
                operation: "CompositionTree::backward".to_string(),
            });
        }
        self.forwarded = false;
        let (entry, chain) = match self.nodes.split_first_mut() {
            Some(split) => split,
            None => {
                return Err(RecurveError::InternalError(
                    "composition tree lost its entry node".to_string(),
                ))
            }
        };
        let mut g = grad.clone();
        for node in chain.iter_mut().rev() {
            g = node.backward_chain(&g, &mut *optimizer)?;
        }
        entry.backward_entry(&g, optimizer, self.arity)
    }
}
