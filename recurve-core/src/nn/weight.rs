use crate::error::RecurveError;
use crate::tensor::Tensor;
use std::cell::{Ref, RefCell};
use std::fmt;
use std::fs;
use std::path::Path;
use std::rc::Rc;

/// An owned trainable buffer: the parameter value plus its accumulated
/// gradient.
///
/// Invariant: the gradient always has the same shape as the value. Gradient
/// writes are additive; the only non-additive mutations are [`apply`] (the
/// optimizer update) and [`reset_grad`].
///
/// [`apply`]: WeightTensor::apply
/// [`reset_grad`]: WeightTensor::reset_grad
#[derive(Debug, Clone, PartialEq)]
pub struct WeightTensor {
    value: Tensor,
    grad: Tensor,
}

impl WeightTensor {
    pub fn new(value: Tensor) -> Self {
        let grad = value.zeros_like();
        WeightTensor { value, grad }
    }

    /// Current parameter value.
    pub fn get(&self) -> &Tensor {
        &self.value
    }

    /// Accumulated gradient.
    pub fn get_dw(&self) -> &Tensor {
        &self.grad
    }

    pub fn shape(&self) -> &[usize] {
        self.value.shape()
    }

    /// Adds `delta` into the gradient accumulator. Contributions from every
    /// holder of a shared handle sum here; nothing ever overwrites them.
    pub fn accumulate(&mut self, delta: &Tensor) -> Result<(), RecurveError> {
        if delta.shape() != self.grad.shape() {
            return Err(RecurveError::ShapeMismatch {
                expected: self.grad.shape().to_vec(),
                actual: delta.shape().to_vec(),
                operation: "WeightTensor::accumulate".to_string(),
            });
        }
        self.grad.add_assign(delta)
    }

    /// Zeroes the gradient accumulator.
    pub fn reset_grad(&mut self) {
        self.grad = self.value.zeros_like();
    }

    /// Applies an optimizer-supplied delta: `value += delta`.
    pub fn apply(&mut self, delta: &Tensor) -> Result<(), RecurveError> {
        if delta.shape() != self.value.shape() {
            return Err(RecurveError::ShapeMismatch {
                expected: self.value.shape().to_vec(),
                actual: delta.shape().to_vec(),
                operation: "WeightTensor::apply".to_string(),
            });
        }
        self.value.add_assign(delta)
    }

    /// Clamps the accumulated gradient elementwise into `[-bound, bound]`.
    pub fn clamp_grad(&mut self, bound: f64) {
        self.grad.clamp_(-bound, bound);
    }

    /// Replaces the value, keeping the gradient shape in sync.
    pub fn set_value(&mut self, value: Tensor) -> Result<(), RecurveError> {
        if value.shape() != self.value.shape() {
            return Err(RecurveError::ShapeMismatch {
                expected: self.value.shape().to_vec(),
                actual: value.shape().to_vec(),
                operation: "WeightTensor::set_value".to_string(),
            });
        }
        self.value = value;
        Ok(())
    }
}

/// A non-owning handle to one [`WeightTensor`].
///
/// Cloning the handle never copies the buffer: every clone observes the same
/// value and lands its gradient contributions in the same accumulator. This
/// is what lets one weight be wired into a tree instance per time step and
/// still receive a single summed gradient.
pub struct SharedWeight(Rc<RefCell<WeightTensor>>);

impl SharedWeight {
    pub fn new(value: Tensor) -> Self {
        SharedWeight(Rc::new(RefCell::new(WeightTensor::new(value))))
    }

    /// Stable identity of the underlying allocation, usable as a map key.
    pub fn id(&self) -> usize {
        Rc::as_ptr(&self.0) as usize
    }

    /// True when both handles target the same buffer.
    pub fn ptr_eq(&self, other: &SharedWeight) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Read access to the underlying weight. The `Ref` acts like a read
    /// lock; drop it promptly.
    pub fn borrow(&self) -> Ref<'_, WeightTensor> {
        self.0.borrow()
    }

    /// Clone of the current value.
    pub fn value(&self) -> Tensor {
        self.0.borrow().get().clone()
    }

    /// Clone of the accumulated gradient.
    pub fn grad(&self) -> Tensor {
        self.0.borrow().get_dw().clone()
    }

    pub fn shape(&self) -> Vec<usize> {
        self.0.borrow().shape().to_vec()
    }

    pub fn accumulate(&self, delta: &Tensor) -> Result<(), RecurveError> {
        self.0.borrow_mut().accumulate(delta)
    }

    pub fn reset_grad(&self) {
        self.0.borrow_mut().reset_grad();
    }

    pub fn apply(&self, delta: &Tensor) -> Result<(), RecurveError> {
        self.0.borrow_mut().apply(delta)
    }

    pub fn clamp_grad(&self, bound: f64) {
        self.0.borrow_mut().clamp_grad(bound);
    }

    pub fn set_value(&self, value: Tensor) -> Result<(), RecurveError> {
        self.0.borrow_mut().set_value(value)
    }

    /// A new handle over a copied buffer, detached from this one's identity.
    pub fn detach(&self) -> SharedWeight {
        SharedWeight::new(self.value())
    }

    /// Serializes the parameter value to `path` as JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), RecurveError> {
        let path = path.as_ref();
        let json = serde_json::to_string(self.0.borrow().get()).map_err(|e| {
            RecurveError::Serialization {
                path: path.display().to_string(),
                reason: e.to_string(),
            }
        })?;
        fs::write(path, json).map_err(|e| RecurveError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }

    /// Loads a parameter value previously written by [`save`].
    ///
    /// [`save`]: SharedWeight::save
    pub fn load(path: impl AsRef<Path>) -> Result<SharedWeight, RecurveError> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|e| RecurveError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let value: Tensor =
            serde_json::from_str(&json).map_err(|e| RecurveError::Serialization {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
        Ok(SharedWeight::new(value))
    }
}

impl Clone for SharedWeight {
    /// Clones the handle (bumps the `Rc` count); the buffer is shared.
    fn clone(&self) -> Self {
        SharedWeight(Rc::clone(&self.0))
    }
}

impl fmt::Debug for SharedWeight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SharedWeight({:?})", self.0.borrow())
    }
}
