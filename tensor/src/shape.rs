//! Pure functions over dimension and stride vectors.

use crate::error::{Result, TensorError};

/// Row-major strides for `dimensions` (outermost first).
pub fn get_strides(dimensions: &[usize]) -> Vec<usize> {
    let mut strides = vec![0; dimensions.len()];
    let mut stride = 1;
    for i in (0..dimensions.len()).rev() {
        strides[i] = stride;
        stride *= dimensions[i];
    }
    strides
}

/// Product of a signed dimension vector.
///
/// Shapes coming from model metadata are `i64`; any negative (dynamic) entry
/// is rejected rather than silently wrapped.
pub fn get_product(dimensions: &[i64]) -> Result<usize> {
    dimensions.iter().try_fold(1usize, |acc, &dim| {
        if dim < 0 {
            return Err(TensorError::NegativeDimension(dim));
        }
        Ok(acc * dim as usize)
    })
}

/// Element count for an unsigned dimension vector.
pub fn element_count(dimensions: &[usize]) -> usize {
    dimensions.iter().product()
}

/// Flat buffer offset of a multi-index: `sum(index[i] * stride[i])`.
pub fn get_index(strides: &[usize], index: &[usize]) -> usize {
    strides.iter().zip(index).map(|(s, i)| s * i).sum()
}

/// Bounds-checked variant of [`get_index`].
pub fn checked_index(dimensions: &[usize], strides: &[usize], index: &[usize]) -> Result<usize> {
    if index.len() != dimensions.len() || index.iter().zip(dimensions).any(|(i, d)| i >= d) {
        return Err(TensorError::IndexOutOfRange {
            index: index.to_vec(),
            dimensions: dimensions.to_vec(),
        });
    }
    Ok(get_index(strides, index))
}

/// Decompose a flat offset into per-axis coordinates, writing into `coords`.
pub fn unravel_index(mut offset: usize, strides: &[usize], coords: &mut [usize]) {
    for (coord, &stride) in coords.iter_mut().zip(strides) {
        *coord = offset / stride;
        offset %= stride;
    }
}

/// Convert signed model-metadata dimensions to `usize`.
pub fn to_dimensions(dimensions: &[i64]) -> Result<Vec<usize>> {
    dimensions
        .iter()
        .map(|&d| {
            if d < 0 {
                Err(TensorError::NegativeDimension(d))
            } else {
                Ok(d as usize)
            }
        })
        .collect()
}
