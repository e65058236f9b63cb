use crate::error::RecurveError;
use serde::{Deserialize, Serialize};

/// Dense, owned `f64` buffer with a shape, the numeric primitive the engine
/// computes with.
///
/// Only rank-1 (vectors) and rank-2 (matrices) tensors are produced by the
/// built-in kernels; data is stored row-major. Every binary kernel checks
/// shapes and fails with [`RecurveError::ShapeMismatch`] instead of
/// broadcasting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tensor {
    data: Vec<f64>,
    shape: Vec<usize>,
}

impl Tensor {
    /// Creates a tensor from raw data and shape, checking that the data
    /// length matches the product of the shape dimensions.
    pub fn new(data: Vec<f64>, shape: Vec<usize>) -> Result<Self, RecurveError> {
        let expected_len: usize = shape.iter().product();
        if data.len() != expected_len {
            return Err(RecurveError::TensorCreation {
                data_len: data.len(),
                shape,
            });
        }
        Ok(Tensor { data, shape })
    }

    // Internal constructor for buffers whose length is correct by construction.
    pub(crate) fn from_raw(data: Vec<f64>, shape: Vec<usize>) -> Self {
        debug_assert_eq!(data.len(), shape.iter().product::<usize>());
        Tensor { data, shape }
    }

    /// Creates a rank-1 tensor from a plain vector.
    pub fn vector(data: Vec<f64>) -> Self {
        let len = data.len();
        Tensor::from_raw(data, vec![len])
    }

    /// Creates a `rows x cols` matrix from row-major data.
    pub fn matrix(rows: usize, cols: usize, data: Vec<f64>) -> Result<Self, RecurveError> {
        Tensor::new(data, vec![rows, cols])
    }

    /// Creates a zero-filled tensor of the given shape.
    pub fn zeros(shape: &[usize]) -> Self {
        let numel = shape.iter().product();
        Tensor::from_raw(vec![0.0; numel], shape.to_vec())
    }

    /// Creates a zero-filled tensor with the same shape as `self`.
    pub fn zeros_like(&self) -> Self {
        Tensor::from_raw(vec![0.0; self.data.len()], self.shape.clone())
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn numel(&self) -> usize {
        self.data.len()
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f64] {
        &mut self.data
    }

    fn rank1(&self, operation: &str) -> Result<usize, RecurveError> {
        if self.shape.len() != 1 {
            return Err(RecurveError::DimensionMismatch {
                expected: 1,
                actual: self.shape.len(),
                operation: operation.to_string(),
            });
        }
        Ok(self.shape[0])
    }

    fn rank2(&self, operation: &str) -> Result<(usize, usize), RecurveError> {
        if self.shape.len() != 2 {
            return Err(RecurveError::DimensionMismatch {
                expected: 2,
                actual: self.shape.len(),
                operation: operation.to_string(),
            });
        }
        Ok((self.shape[0], self.shape[1]))
    }

    fn zip_with(
        &self,
        other: &Tensor,
        operation: &str,
        f: impl Fn(f64, f64) -> f64,
    ) -> Result<Tensor, RecurveError> {
        if self.shape != other.shape {
            return Err(RecurveError::ShapeMismatch {
                expected: self.shape.clone(),
                actual: other.shape.clone(),
                operation: operation.to_string(),
            });
        }
        let data = self
            .data
            .iter()
            .zip(other.data.iter())
            .map(|(a, b)| f(*a, *b))
            .collect();
        Ok(Tensor::from_raw(data, self.shape.clone()))
    }

    /// Elementwise sum.
    pub fn add(&self, other: &Tensor) -> Result<Tensor, RecurveError> {
        self.zip_with(other, "add", |a, b| a + b)
    }

    /// Elementwise difference.
    pub fn sub(&self, other: &Tensor) -> Result<Tensor, RecurveError> {
        self.zip_with(other, "sub", |a, b| a - b)
    }

    /// Elementwise (Hadamard) product.
    pub fn mul(&self, other: &Tensor) -> Result<Tensor, RecurveError> {
        self.zip_with(other, "mul", |a, b| a * b)
    }

    /// In-place elementwise accumulation: `self += other`.
    pub fn add_assign(&mut self, other: &Tensor) -> Result<(), RecurveError> {
        if self.shape != other.shape {
            return Err(RecurveError::ShapeMismatch {
                expected: self.shape.clone(),
                actual: other.shape.clone(),
                operation: "add_assign".to_string(),
            });
        }
        for (a, b) in self.data.iter_mut().zip(other.data.iter()) {
            *a += *b;
        }
        Ok(())
    }

    /// Multiplies every element by `factor`.
    pub fn scale(&self, factor: f64) -> Tensor {
        self.map(|v| v * factor)
    }

    /// Applies `f` to every element, producing a new tensor.
    pub fn map(&self, f: impl Fn(f64) -> f64) -> Tensor {
        let data = self.data.iter().map(|v| f(*v)).collect();
        Tensor::from_raw(data, self.shape.clone())
    }

    /// Pointwise hyperbolic tangent.
    pub fn tanh(&self) -> Tensor {
        self.map(f64::tanh)
    }

    /// Inner product of two vectors of equal length.
    pub fn dot(&self, other: &Tensor) -> Result<f64, RecurveError> {
        let n = self.rank1("dot")?;
        if other.shape != [n] {
            return Err(RecurveError::ShapeMismatch {
                expected: vec![n],
                actual: other.shape.clone(),
                operation: "dot".to_string(),
            });
        }
        Ok(self
            .data
            .iter()
            .zip(other.data.iter())
            .map(|(a, b)| a * b)
            .sum())
    }

    /// Matrix-vector product `self . x` for `self: [m, n]`, `x: [n]`.
    pub fn matvec(&self, x: &Tensor) -> Result<Tensor, RecurveError> {
        let (m, n) = self.rank2("matvec")?;
        if x.shape != [n] {
            return Err(RecurveError::ShapeMismatch {
                expected: vec![n],
                actual: x.shape.clone(),
                operation: "matvec".to_string(),
            });
        }
        let mut out = vec![0.0; m];
        for (i, slot) in out.iter_mut().enumerate() {
            let row = &self.data[i * n..(i + 1) * n];
            let mut sum = 0.0;
            for (a, b) in row.iter().zip(x.data.iter()) {
                sum += a * b;
            }
            *slot = sum;
        }
        Ok(Tensor::from_raw(out, vec![m]))
    }

    /// Transposed matrix-vector product `self^T . g` for `self: [m, n]`, `g: [m]`.
    pub fn matvec_t(&self, g: &Tensor) -> Result<Tensor, RecurveError> {
        let (m, n) = self.rank2("matvec_t")?;
        if g.shape != [m] {
            return Err(RecurveError::ShapeMismatch {
                expected: vec![m],
                actual: g.shape.clone(),
                operation: "matvec_t".to_string(),
            });
        }
        let mut out = vec![0.0; n];
        for i in 0..m {
            let gi = g.data[i];
            let row = &self.data[i * n..(i + 1) * n];
            for (slot, a) in out.iter_mut().zip(row.iter()) {
                *slot += gi * a;
            }
        }
        Ok(Tensor::from_raw(out, vec![n]))
    }

    /// Outer product `g (x) x` for `g: [m]`, `x: [n]`, producing `[m, n]`.
    pub fn outer(g: &Tensor, x: &Tensor) -> Result<Tensor, RecurveError> {
        let m = g.rank1("outer")?;
        let n = x.rank1("outer")?;
        let mut out = Vec::with_capacity(m * n);
        for gi in g.data.iter() {
            for xj in x.data.iter() {
                out.push(gi * xj);
            }
        }
        Ok(Tensor::from_raw(out, vec![m, n]))
    }

    /// Numerically stable softmax of a vector (max-shifted before
    /// exponentiation).
    pub fn softmax(&self) -> Result<Tensor, RecurveError> {
        self.rank1("softmax")?;
        let max = self.data.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let exps: Vec<f64> = self.data.iter().map(|v| (v - max).exp()).collect();
        let total: f64 = exps.iter().sum();
        Ok(Tensor::from_raw(
            exps.into_iter().map(|v| v / total).collect(),
            self.shape.clone(),
        ))
    }

    /// Clamps every element into `[min, max]` in place.
    pub fn clamp_(&mut self, min: f64, max: f64) {
        for v in self.data.iter_mut() {
            *v = v.clamp(min, max);
        }
    }

    /// Index of the largest element (first occurrence wins on ties).
    pub fn argmax(&self) -> usize {
        let mut best = 0;
        for (i, v) in self.data.iter().enumerate() {
            if *v > self.data[best] {
                best = i;
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_creation_checks_length() {
        assert!(Tensor::new(vec![1.0, 2.0], vec![2]).is_ok());
        let err = Tensor::new(vec![1.0, 2.0, 3.0], vec![2]).unwrap_err();
        assert_eq!(
            err,
            RecurveError::TensorCreation {
                data_len: 3,
                shape: vec![2]
            }
        );
    }

    #[test]
    fn test_matvec() {
        let w = Tensor::matrix(2, 3, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        let x = Tensor::vector(vec![1.0, 0.0, -1.0]);
        let y = w.matvec(&x).unwrap();
        assert_eq!(y.data(), &[-2.0, -2.0]);
    }

    #[test]
    fn test_matvec_shape_mismatch() {
        let w = Tensor::matrix(2, 3, vec![0.0; 6]).unwrap();
        let x = Tensor::vector(vec![1.0, 2.0]);
        let err = w.matvec(&x).unwrap_err();
        assert!(matches!(err, RecurveError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_matvec_t_is_transpose() {
        let w = Tensor::matrix(2, 3, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        let g = Tensor::vector(vec![1.0, 10.0]);
        let out = w.matvec_t(&g).unwrap();
        // column sums weighted by g
        assert_eq!(out.data(), &[41.0, 52.0, 63.0]);
    }

    #[test]
    fn test_outer() {
        let g = Tensor::vector(vec![1.0, 2.0]);
        let x = Tensor::vector(vec![3.0, 4.0, 5.0]);
        let out = Tensor::outer(&g, &x).unwrap();
        assert_eq!(out.shape(), &[2, 3]);
        assert_eq!(out.data(), &[3.0, 4.0, 5.0, 6.0, 8.0, 10.0]);
    }

    #[test]
    fn test_softmax_is_stable_for_large_scores() {
        let y = Tensor::vector(vec![1000.0, 1000.0, 990.0]);
        let p = y.softmax().unwrap();
        let total: f64 = p.data().iter().sum();
        assert_abs_diff_eq!(total, 1.0, epsilon = 1e-12);
        assert!(p.data().iter().all(|v| v.is_finite()));
        assert_abs_diff_eq!(p.data()[0], p.data()[1], epsilon = 1e-12);
    }

    #[test]
    fn test_add_rejects_shape_mismatch() {
        let a = Tensor::vector(vec![1.0, 2.0]);
        let b = Tensor::vector(vec![1.0, 2.0, 3.0]);
        assert!(matches!(
            a.add(&b),
            Err(RecurveError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_clamp_and_argmax() {
        let mut t = Tensor::vector(vec![-7.0, 0.5, 9.0]);
        t.clamp_(-5.0, 5.0);
        assert_eq!(t.data(), &[-5.0, 0.5, 5.0]);
        assert_eq!(t.argmax(), 2);
    }
}
