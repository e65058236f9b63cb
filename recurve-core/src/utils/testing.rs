use crate::tensor::Tensor;

/// Checks that a vector tensor matches expected data within a tolerance.
/// Panics with the offending index on mismatch.
pub fn check_vector_near(actual: &Tensor, expected: &[f64], tolerance: f64) {
    assert_eq!(
        actual.numel(),
        expected.len(),
        "Data length mismatch: {} vs {}",
        actual.numel(),
        expected.len()
    );
    for (i, (a, e)) in actual.data().iter().zip(expected.iter()).enumerate() {
        let diff = (a - e).abs();
        if diff > tolerance {
            panic!(
                "Data mismatch at index {}: actual={:?}, expected={:?}, diff={:?}, tolerance={:?}",
                i, a, e, diff, tolerance
            );
        }
    }
}
