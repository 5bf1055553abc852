//! Owned, strided, N-dimensional dense tensor.

use crate::element::{NumericElement, TensorElement};
use crate::error::{Result, TensorError};
use crate::shape::{checked_index, element_count, get_index, get_strides, to_dimensions, unravel_index};
use crate::span::{ensure_len, ensure_same_dimensions, TensorSpan, TensorSpanMut, TensorView};

/// Dense row-major tensor.
///
/// Invariant: `buffer.len() == product(dimensions)` and `strides` is always
/// the row-major stride vector of `dimensions`.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor<T> {
    buffer: Vec<T>,
    dimensions: Vec<usize>,
    strides: Vec<usize>,
}

impl<T: TensorElement> Tensor<T> {
    /// Tensor filled with `T::default()`.
    pub fn new(dimensions: Vec<usize>) -> Self {
        Self::filled(dimensions, T::default())
    }

    pub fn filled(dimensions: Vec<usize>, value: T) -> Self {
        let buffer = vec![value; element_count(&dimensions)];
        Self::from_parts_unchecked(buffer, dimensions)
    }

    pub fn from_vec(buffer: Vec<T>, dimensions: Vec<usize>) -> Result<Self> {
        ensure_len(buffer.len(), &dimensions)?;
        Ok(Self::from_parts_unchecked(buffer, dimensions))
    }

    /// Build from model-metadata dimensions, rejecting negative entries.
    pub fn from_vec_i64(buffer: Vec<T>, dimensions: &[i64]) -> Result<Self> {
        Self::from_vec(buffer, to_dimensions(dimensions)?)
    }

    pub(crate) fn from_parts_unchecked(buffer: Vec<T>, dimensions: Vec<usize>) -> Self {
        let strides = get_strides(&dimensions);
        Self {
            buffer,
            dimensions,
            strides,
        }
    }

    pub fn dimensions(&self) -> &[usize] {
        &self.dimensions
    }

    pub fn dimensions_i64(&self) -> Vec<i64> {
        self.dimensions.iter().map(|&d| d as i64).collect()
    }

    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    pub fn rank(&self) -> usize {
        self.dimensions.len()
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.buffer
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.buffer
    }

    pub fn into_vec(self) -> Vec<T> {
        self.buffer
    }

    pub fn get(&self, index: &[usize]) -> Result<T> {
        let offset = checked_index(&self.dimensions, &self.strides, index)?;
        Ok(self.buffer[offset])
    }

    pub fn set(&mut self, index: &[usize], value: T) -> Result<()> {
        let offset = checked_index(&self.dimensions, &self.strides, index)?;
        self.buffer[offset] = value;
        Ok(())
    }

    pub fn as_span(&self) -> TensorSpan<'_, T> {
        TensorSpan::from_parts_unchecked(&self.buffer, self.dimensions.clone())
    }

    pub fn as_span_mut(&mut self) -> TensorSpanMut<'_, T> {
        let dimensions = self.dimensions.clone();
        TensorSpanMut::from_parts_unchecked(&mut self.buffer, dimensions)
    }

    /// Reinterpret the buffer under new dimensions without copying.
    pub fn reshape(&mut self, dimensions: Vec<usize>) -> Result<()> {
        if element_count(&dimensions) != self.len() {
            return Err(TensorError::Shape(format!(
                "cannot reshape {:?} ({} elements) to {:?}",
                self.dimensions,
                self.len(),
                dimensions
            )));
        }
        self.strides = get_strides(&dimensions);
        self.dimensions = dimensions;
        Ok(())
    }

    /// Reshape into a freshly allocated copy, leaving `self` untouched.
    pub fn reshape_to(&self, dimensions: Vec<usize>) -> Result<Self> {
        let mut copy = self.clone();
        copy.reshape(dimensions)?;
        Ok(copy)
    }

    pub fn into_reshaped(mut self, dimensions: Vec<usize>) -> Result<Self> {
        self.reshape(dimensions)?;
        Ok(self)
    }

    /// Reorder axes. `axes[j]` names the source axis that becomes axis `j`.
    ///
    /// Every element is moved through a full coordinate decomposition, so
    /// transposes take the same path as any other permutation.
    pub fn permute(&self, axes: &[usize]) -> Result<Self> {
        let rank = self.rank();
        let mut seen = vec![false; rank];
        if axes.len() != rank {
            return Err(TensorError::Shape(format!(
                "permutation {:?} does not match rank {}",
                axes, rank
            )));
        }
        for &axis in axes {
            if axis >= rank || seen[axis] {
                return Err(TensorError::Shape(format!(
                    "{:?} is not a permutation of {} axes",
                    axes, rank
                )));
            }
            seen[axis] = true;
        }

        let dimensions: Vec<usize> = axes.iter().map(|&a| self.dimensions[a]).collect();
        let strides = get_strides(&dimensions);
        let mut buffer = vec![T::default(); self.len()];
        let mut source = vec![0usize; rank];
        let mut target = vec![0usize; rank];
        for (offset, &value) in self.buffer.iter().enumerate() {
            unravel_index(offset, &self.strides, &mut source);
            for (slot, &axis) in target.iter_mut().zip(axes) {
                *slot = source[axis];
            }
            buffer[get_index(&strides, &target)] = value;
        }

        Ok(Self {
            buffer,
            dimensions,
            strides,
        })
    }

    /// Lazily split along axis 0 into `dimensions[0]` borrowed sub-tensors.
    ///
    /// Each item views a contiguous slice with the leading dimension collapsed
    /// to 1. Calling `split` again yields a fresh iterator over the same memory.
    pub fn split(&self, axis: usize) -> Result<Splits<'_, T>> {
        if axis != 0 {
            return Err(TensorError::NotSupported(format!(
                "split along axis {} (only axis 0 is supported)",
                axis
            )));
        }
        let count = match self.dimensions.first() {
            Some(&count) if count > 0 && !self.is_empty() => count,
            _ => {
                return Err(TensorError::Shape(format!(
                    "cannot split tensor with dimensions {:?}",
                    self.dimensions
                )))
            }
        };
        let mut dimensions = self.dimensions.clone();
        dimensions[0] = 1;
        Ok(Splits {
            chunks: self.buffer.chunks_exact(self.len() / count),
            dimensions,
        })
    }

    /// Mutable counterpart of [`split`](Self::split).
    pub fn split_mut(&mut self, axis: usize) -> Result<SplitsMut<'_, T>> {
        let dimensions = {
            let splits = self.split(axis)?;
            splits.dimensions
        };
        let chunk = element_count(&dimensions);
        Ok(SplitsMut {
            chunks: self.buffer.chunks_exact_mut(chunk),
            dimensions,
        })
    }

    /// Concatenate equally shaped tensors along axis 0, preserving order.
    pub fn join<I>(tensors: I, axis: usize) -> Result<Self>
    where
        I: IntoIterator,
        I::Item: TensorView<T>,
    {
        if axis != 0 {
            return Err(TensorError::NotSupported(format!(
                "join along axis {} (only axis 0 is supported)",
                axis
            )));
        }
        let mut buffer = Vec::new();
        let mut dimensions: Option<Vec<usize>> = None;
        for tensor in tensors {
            let dims = tensor.dimensions();
            if dims.is_empty() {
                return Err(TensorError::Shape("cannot join scalar tensors".to_string()));
            }
            match dimensions.as_mut() {
                None => dimensions = Some(dims.to_vec()),
                Some(joined) => {
                    if joined.len() != dims.len() || joined[1..] != dims[1..] {
                        return Err(TensorError::mismatch(joined, dims));
                    }
                    joined[0] += dims[0];
                }
            }
            buffer.extend_from_slice(tensor.as_slice());
        }
        let dimensions = dimensions
            .ok_or_else(|| TensorError::Shape("cannot join an empty sequence".to_string()))?;
        Ok(Self::from_parts_unchecked(buffer, dimensions))
    }

    /// Concatenate `other` after `self` along `axis` (0, 1 or 2).
    pub fn concatenate(&self, other: &impl TensorView<T>, axis: usize) -> Result<Self> {
        if axis > 2 {
            return Err(TensorError::NotSupported(format!(
                "concatenate along axis {} (axes 0-2 are supported)",
                axis
            )));
        }
        let right_dims = other.dimensions();
        let compatible = self.rank() == right_dims.len()
            && axis < self.rank()
            && self
                .dimensions
                .iter()
                .zip(right_dims)
                .enumerate()
                .all(|(i, (l, r))| i == axis || l == r);
        if !compatible {
            return Err(TensorError::mismatch(&self.dimensions, right_dims));
        }

        let mut dimensions = self.dimensions.clone();
        dimensions[axis] += right_dims[axis];

        if axis == 0 {
            let mut buffer = Vec::with_capacity(self.len() + other.as_slice().len());
            buffer.extend_from_slice(&self.buffer);
            buffer.extend_from_slice(other.as_slice());
            return Ok(Self::from_parts_unchecked(buffer, dimensions));
        }

        // Copy one contiguous block of each operand per outer index.
        let outer: usize = self.dimensions[..axis].iter().product();
        let left_block: usize = self.dimensions[axis..].iter().product();
        let right_block: usize = right_dims[axis..].iter().product();
        let right = other.as_slice();
        let mut buffer = Vec::with_capacity(self.len() + right.len());
        for o in 0..outer {
            buffer.extend_from_slice(&self.buffer[o * left_block..(o + 1) * left_block]);
            buffer.extend_from_slice(&right[o * right_block..(o + 1) * right_block]);
        }
        Ok(Self::from_parts_unchecked(buffer, dimensions))
    }

    /// Tile the whole tensor `count` times along axis 0.
    ///
    /// `count == 1` hands back `self` unchanged, not a copy. The result is the
    /// same allocation the caller passed in.
    pub fn repeat(self, count: usize, axis: usize) -> Result<Self> {
        if axis != 0 {
            return Err(TensorError::NotSupported(format!(
                "repeat along axis {} (only axis 0 is supported)",
                axis
            )));
        }
        if count == 0 || self.dimensions.is_empty() {
            return Err(TensorError::Shape(format!(
                "cannot repeat {:?} {} times",
                self.dimensions, count
            )));
        }
        if count == 1 {
            return Ok(self);
        }
        let mut buffer = Vec::with_capacity(self.len() * count);
        for _ in 0..count {
            buffer.extend_from_slice(&self.buffer);
        }
        let mut dimensions = self.dimensions;
        dimensions[0] *= count;
        Ok(Self::from_parts_unchecked(buffer, dimensions))
    }

    pub fn map<U: TensorElement>(&self, f: impl Fn(T) -> U) -> Tensor<U> {
        Tensor::from_parts_unchecked(
            self.buffer.iter().map(|&v| f(v)).collect(),
            self.dimensions.clone(),
        )
    }

    pub fn map_in_place(&mut self, f: impl Fn(T) -> T) {
        for v in self.buffer.iter_mut() {
            *v = f(*v);
        }
    }
}

/// Free-standing concatenate where an absent left operand means "start with a clone of right".
pub fn concatenate<T: TensorElement>(
    left: Option<&Tensor<T>>,
    right: &Tensor<T>,
    axis: usize,
) -> Result<Tensor<T>> {
    match left {
        Some(left) if !left.is_empty() => left.concatenate(right, axis),
        _ => Ok(right.clone()),
    }
}

impl<T> TensorView<T> for Tensor<T> {
    fn dimensions(&self) -> &[usize] {
        &self.dimensions
    }

    fn as_slice(&self) -> &[T] {
        &self.buffer
    }
}

/// Iterator returned by [`Tensor::split`].
#[derive(Debug, Clone)]
pub struct Splits<'a, T> {
    chunks: std::slice::ChunksExact<'a, T>,
    dimensions: Vec<usize>,
}

impl<'a, T: TensorElement> Iterator for Splits<'a, T> {
    type Item = TensorSpan<'a, T>;

    fn next(&mut self) -> Option<Self::Item> {
        let data = self.chunks.next()?;
        Some(TensorSpan::from_parts_unchecked(data, self.dimensions.clone()))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.chunks.size_hint()
    }
}

impl<T: TensorElement> ExactSizeIterator for Splits<'_, T> {}

/// Iterator returned by [`Tensor::split_mut`].
#[derive(Debug)]
pub struct SplitsMut<'a, T> {
    chunks: std::slice::ChunksExactMut<'a, T>,
    dimensions: Vec<usize>,
}

impl<'a, T: TensorElement> Iterator for SplitsMut<'a, T> {
    type Item = TensorSpanMut<'a, T>;

    fn next(&mut self) -> Option<Self::Item> {
        let data = self.chunks.next()?;
        Some(TensorSpanMut::from_parts_unchecked(data, self.dimensions.clone()))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.chunks.size_hint()
    }
}

impl<T: TensorElement> ExactSizeIterator for SplitsMut<'_, T> {}

impl<T: NumericElement> Tensor<T> {
    pub fn zeros(dimensions: Vec<usize>) -> Self {
        Self::filled(dimensions, T::zero())
    }

    pub fn ones(dimensions: Vec<usize>) -> Self {
        Self::filled(dimensions, T::one())
    }

    /// `self += other * factor`, the fused update every integrator uses.
    pub fn add_scaled_in_place(&mut self, other: &impl TensorView<T>, factor: T) -> Result<()> {
        ensure_same_dimensions(&self.dimensions, other.dimensions())?;
        for (a, &b) in self.buffer.iter_mut().zip(other.as_slice()) {
            *a = *a + b * factor;
        }
        Ok(())
    }

    /// Copy form of [`add_scaled_in_place`](Self::add_scaled_in_place).
    pub fn add_scaled(&self, other: &impl TensorView<T>, factor: T) -> Result<Self> {
        let mut result = self.clone();
        result.add_scaled_in_place(other, factor)?;
        Ok(result)
    }
}

macro_rules! elementwise_ops {
    ($($op:tt => $tensor_fn:ident, $tensor_in_place:ident, $scalar_fn:ident, $scalar_in_place:ident;)*) => {
        impl<T: NumericElement> Tensor<T> {
            $(
                pub fn $tensor_fn(&self, other: &impl TensorView<T>) -> Result<Self> {
                    let mut result = self.clone();
                    result.$tensor_in_place(other)?;
                    Ok(result)
                }

                pub fn $tensor_in_place(&mut self, other: &impl TensorView<T>) -> Result<()> {
                    ensure_same_dimensions(&self.dimensions, other.dimensions())?;
                    for (a, &b) in self.buffer.iter_mut().zip(other.as_slice()) {
                        *a = *a $op b;
                    }
                    Ok(())
                }

                pub fn $scalar_fn(&self, value: T) -> Self {
                    let mut result = self.clone();
                    result.$scalar_in_place(value);
                    result
                }

                pub fn $scalar_in_place(&mut self, value: T) {
                    for a in self.buffer.iter_mut() {
                        *a = *a $op value;
                    }
                }
            )*
        }
    };
}

elementwise_ops! {
    + => add_tensor, add_tensor_in_place, add_scalar, add_scalar_in_place;
    - => sub_tensor, sub_tensor_in_place, sub_scalar, sub_scalar_in_place;
    * => mul_tensor, mul_tensor_in_place, mul_scalar, mul_scalar_in_place;
    / => div_tensor, div_tensor_in_place, div_scalar, div_scalar_in_place;
}

impl Tensor<f32> {
    /// `[-1, 1]` -> `[0, 1]` via `x / 2 + 0.5`, clamped.
    pub fn normalize_zero_one(&mut self) {
        self.map_in_place(|x| (x / 2.0 + 0.5).clamp(0.0, 1.0));
    }

    /// `[0, 1]` -> `[-1, 1]` via `2x - 1`, clamped.
    pub fn normalize_one_one(&mut self) {
        self.map_in_place(|x| (x * 2.0 - 1.0).clamp(-1.0, 1.0));
    }

    /// Rescale so the buffer's min maps to 0 and max to 1.
    pub fn normalize_min_max_zero_one(&mut self) -> Result<()> {
        let (min, max) = self.checked_min_max()?;
        let range = max - min;
        self.map_in_place(|x| (x - min) / range);
        Ok(())
    }

    /// Rescale so the buffer's min maps to -1 and max to 1.
    pub fn normalize_min_max_one_one(&mut self) -> Result<()> {
        let (min, max) = self.checked_min_max()?;
        let range = max - min;
        self.map_in_place(|x| 2.0 * (x - min) / range - 1.0);
        Ok(())
    }

    pub fn min_max(&self) -> Option<(f32, f32)> {
        let first = *self.buffer.first()?;
        Some(
            self.buffer
                .iter()
                .fold((first, first), |(lo, hi), &v| (lo.min(v), hi.max(v))),
        )
    }

    fn checked_min_max(&self) -> Result<(f32, f32)> {
        match self.min_max() {
            Some((min, max)) if max > min => Ok((min, max)),
            Some((min, max)) => Err(TensorError::DegenerateRange { min, max }),
            None => Err(TensorError::Shape("cannot normalize an empty tensor".to_string())),
        }
    }

    pub fn sum(&self) -> f32 {
        self.buffer.iter().sum()
    }

    pub fn mean(&self) -> f32 {
        if self.is_empty() {
            return 0.0;
        }
        self.sum() / self.len() as f32
    }

    pub fn std_dev(&self) -> f32 {
        if self.is_empty() {
            return 0.0;
        }
        let mean = self.mean();
        let variance =
            self.buffer.iter().map(|&v| (v - mean) * (v - mean)).sum::<f32>() / self.len() as f32;
        variance.sqrt()
    }

    pub fn clamp_in_place(&mut self, min: f32, max: f32) {
        self.map_in_place(|x| x.clamp(min, max));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arange(dimensions: Vec<usize>) -> Tensor<f32> {
        let n = element_count(&dimensions);
        Tensor::from_vec((0..n).map(|v| v as f32).collect(), dimensions).unwrap()
    }

    #[test]
    fn test_reshape_preserves_count() {
        let mut t = arange(vec![2, 3, 4]);
        t.reshape(vec![6, 4]).unwrap();
        assert_eq!(t.dimensions(), &[6, 4]);
        assert_eq!(t.strides(), &[4, 1]);
        assert!(matches!(t.reshape(vec![5, 5]), Err(TensorError::Shape(_))));
        // Failed reshape leaves the tensor untouched
        assert_eq!(t.dimensions(), &[6, 4]);
    }

    #[test]
    fn test_permute_transpose() {
        let t = arange(vec![2, 3]);
        let p = t.permute(&[1, 0]).unwrap();
        assert_eq!(p.dimensions(), &[3, 2]);
        assert_eq!(p.as_slice(), &[0.0, 3.0, 1.0, 4.0, 2.0, 5.0]);
    }

    #[test]
    fn test_permute_nchw_to_nhwc() {
        let t = arange(vec![1, 2, 2, 2]);
        let p = t.permute(&[0, 2, 3, 1]).unwrap();
        assert_eq!(p.dimensions(), &[1, 2, 2, 2]);
        assert_eq!(p.get(&[0, 0, 1, 1]).unwrap(), t.get(&[0, 1, 0, 1]).unwrap());
    }

    #[test]
    fn test_permute_rejects_invalid_axes() {
        let t = arange(vec![2, 3]);
        assert!(t.permute(&[0, 0]).is_err());
        assert!(t.permute(&[0]).is_err());
        assert!(t.permute(&[0, 2]).is_err());
    }

    #[test]
    fn test_split_views_without_copy() {
        let t = arange(vec![3, 2]);
        let parts: Vec<_> = t.split(0).unwrap().collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[1].dimensions(), &[1, 2]);
        assert_eq!(parts[1].as_slice(), &[2.0, 3.0]);
        assert_eq!(parts[2].as_slice().as_ptr(), t.as_slice()[4..].as_ptr());
        // Restartable per call
        assert_eq!(t.split(0).unwrap().count(), 3);
        assert!(matches!(t.split(1), Err(TensorError::NotSupported(_))));
    }

    #[test]
    fn test_split_mut_writes_through() {
        let mut t = arange(vec![2, 2]);
        for mut frame in t.split_mut(0).unwrap() {
            frame.mul_scalar_in_place(10.0);
        }
        assert_eq!(t.as_slice(), &[0.0, 10.0, 20.0, 30.0]);
    }

    #[test]
    fn test_join_preserves_order() {
        let a = Tensor::from_vec(vec![1.0f32, 2.0], vec![1, 2]).unwrap();
        let b = Tensor::from_vec(vec![3.0f32, 4.0], vec![1, 2]).unwrap();
        let joined = Tensor::join([&a, &b], 0).unwrap();
        assert_eq!(joined.dimensions(), &[2, 2]);
        assert_eq!(joined.as_slice(), &[1.0, 2.0, 3.0, 4.0]);

        let bad = Tensor::from_vec(vec![1.0f32, 2.0, 3.0], vec![1, 3]).unwrap();
        assert!(Tensor::join([&a, &bad], 0).is_err());
        assert!(Tensor::<f32>::join(Vec::<&Tensor<f32>>::new(), 0).is_err());
    }

    #[test]
    fn test_concatenate_axis_0() {
        let a = arange(vec![1, 2]);
        let b = arange(vec![2, 2]);
        let c = a.concatenate(&b, 0).unwrap();
        assert_eq!(c.dimensions(), &[3, 2]);
        assert_eq!(c.as_slice(), &[0.0, 1.0, 0.0, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_concatenate_axis_1() {
        let a = arange(vec![2, 1]);
        let b = Tensor::from_vec(vec![10.0f32, 11.0, 12.0, 13.0], vec![2, 2]).unwrap();
        let c = a.concatenate(&b, 1).unwrap();
        assert_eq!(c.dimensions(), &[2, 3]);
        assert_eq!(c.as_slice(), &[0.0, 10.0, 11.0, 1.0, 12.0, 13.0]);
    }

    #[test]
    fn test_concatenate_axis_2() {
        let a = arange(vec![1, 2, 2]);
        let b = arange(vec![1, 2, 1]).add_scalar(100.0);
        let c = a.concatenate(&b, 2).unwrap();
        assert_eq!(c.dimensions(), &[1, 2, 3]);
        assert_eq!(c.as_slice(), &[0.0, 1.0, 100.0, 2.0, 3.0, 101.0]);
    }

    #[test]
    fn test_concatenate_rejects_bad_axis_and_shape() {
        let a = arange(vec![1, 1, 1, 2]);
        assert!(matches!(
            a.concatenate(&a, 3),
            Err(TensorError::NotSupported(_))
        ));
        let b = arange(vec![1, 2, 1, 2]);
        assert!(matches!(
            a.concatenate(&b, 0),
            Err(TensorError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_concatenate_absent_left_clones_right() {
        let right = arange(vec![2, 2]);
        assert_eq!(concatenate(None, &right, 1).unwrap(), right);
        let empty = Tensor::<f32>::new(vec![0]);
        assert_eq!(concatenate(Some(&empty), &right, 0).unwrap(), right);
    }

    #[test]
    fn test_repeat() {
        let t = arange(vec![1, 2]);
        let ptr = t.as_slice().as_ptr();
        let same = t.repeat(1, 0).unwrap();
        assert_eq!(same.as_slice().as_ptr(), ptr);

        let r = same.repeat(3, 0).unwrap();
        assert_eq!(r.dimensions(), &[3, 2]);
        assert_eq!(r.as_slice(), &[0.0, 1.0, 0.0, 1.0, 0.0, 1.0]);
        assert!(r.repeat(2, 1).is_err());
    }

    #[test]
    fn test_arithmetic_copy_and_in_place() {
        let a = arange(vec![2, 2]);
        let b = Tensor::<f32>::ones(vec![2, 2]);
        let sum = a.add_tensor(&b).unwrap();
        assert_eq!(sum.as_slice(), &[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(a.as_slice(), &[0.0, 1.0, 2.0, 3.0]);

        let mut c = sum.clone();
        c.mul_tensor_in_place(&sum).unwrap();
        assert_eq!(c.as_slice(), &[1.0, 4.0, 9.0, 16.0]);
        c.div_scalar_in_place(2.0);
        assert_eq!(c.as_slice(), &[0.5, 2.0, 4.5, 8.0]);
        assert!(c.sub_tensor(&Tensor::<f32>::ones(vec![4])).is_err());
    }

    #[test]
    fn test_integer_tensors() {
        let ids = Tensor::from_vec(vec![1i64, 2, 3], vec![1, 3]).unwrap();
        let doubled = ids.mul_scalar(2);
        assert_eq!(doubled.as_slice(), &[2, 4, 6]);
        let mask = Tensor::filled(vec![1, 3], true);
        assert_eq!(mask.repeat(2, 0).unwrap().dimensions(), &[2, 3]);
    }

    #[test]
    fn test_normalization() {
        let mut t = Tensor::from_vec(vec![-1.0f32, 0.0, 1.0, 3.0], vec![4]).unwrap();
        t.normalize_zero_one();
        assert_eq!(t.as_slice(), &[0.0, 0.5, 1.0, 1.0]);
        t.normalize_one_one();
        assert_eq!(t.as_slice(), &[-1.0, 0.0, 1.0, 1.0]);

        let mut m = Tensor::from_vec(vec![2.0f32, 4.0, 6.0], vec![3]).unwrap();
        m.normalize_min_max_zero_one().unwrap();
        assert_eq!(m.as_slice(), &[0.0, 0.5, 1.0]);

        let mut flat = Tensor::filled(vec![3], 5.0f32);
        assert!(matches!(
            flat.normalize_min_max_one_one(),
            Err(TensorError::DegenerateRange { .. })
        ));
    }
}
