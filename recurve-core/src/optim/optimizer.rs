use crate::error::RecurveError;
use crate::nn::weight::SharedWeight;
use std::collections::HashSet;

/// Update rule over a set of weights.
///
/// An optimizer holds no model-specific knowledge: backward passes hand it
/// the weights they touched via [`register`], and one [`update_model`] call
/// at the end of a training window clips the accumulated gradients, applies
/// the rule, zeroes the accumulators and forgets the registrations.
///
/// [`register`]: Optimizer::register
/// [`update_model`]: Optimizer::update_model
pub trait Optimizer {
    /// Remembers a weight for the next update. Registering the same buffer
    /// repeatedly is a no-op; the first registration order is kept so that
    /// updates are deterministic.
    fn register(&mut self, weight: &SharedWeight);

    /// Applies the update rule to every registered weight.
    fn update_model(&mut self) -> Result<(), RecurveError>;
}

/// Identity-deduplicated, order-preserving collection of weight handles.
#[derive(Debug, Default)]
pub(crate) struct WeightSet {
    order: Vec<SharedWeight>,
    seen: HashSet<usize>,
}

impl WeightSet {
    pub(crate) fn insert(&mut self, weight: &SharedWeight) {
        if self.seen.insert(weight.id()) {
            self.order.push(weight.clone());
        }
    }

    /// Takes the registered weights, leaving the set empty.
    pub(crate) fn drain(&mut self) -> Vec<SharedWeight> {
        self.seen.clear();
        std::mem::take(&mut self.order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::Tensor;

    #[test]
    fn test_weight_set_dedups_by_identity() {
        let w = SharedWeight::new(Tensor::vector(vec![1.0]));
        let same = w.clone();
        let other = w.detach();
        let mut set = WeightSet::default();
        set.insert(&w);
        set.insert(&same);
        set.insert(&other);
        let drained = set.drain();
        assert_eq!(drained.len(), 2);
        assert!(drained[0].ptr_eq(&w));
        assert!(drained[1].ptr_eq(&other));
        assert!(set.drain().is_empty());
    }
}
