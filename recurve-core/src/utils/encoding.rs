use crate::error::RecurveError;
use crate::tensor::Tensor;

/// 1-of-k encoding of a discrete token.
pub fn one_hot(index: usize, size: usize) -> Result<Tensor, RecurveError> {
    if index >= size {
        return Err(RecurveError::IndexOutOfBounds { index, size });
    }
    let mut data = vec![0.0; size];
    data[index] = 1.0;
    Ok(Tensor::vector(data))
}

/// 1-of-k encoding of a token sequence.
pub fn one_hot_seq(indices: &[usize], size: usize) -> Result<Vec<Tensor>, RecurveError> {
    indices.iter().map(|ix| one_hot(*ix, size)).collect()
}
