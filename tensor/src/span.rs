//! Non-owning views over tensor memory.
//!
//! A span borrows a contiguous slice of some tensor's buffer together with the
//! dimensions that slice represents. It never outlives the owner and never
//! allocates; `to_tensor` is the only copying operation.

use crate::element::{NumericElement, TensorElement};
use crate::error::{Result, TensorError};
use crate::shape::{checked_index, element_count, get_strides};
use crate::tensor::Tensor;

/// Read access shared by owned tensors and spans.
pub trait TensorView<T> {
    fn dimensions(&self) -> &[usize];
    fn as_slice(&self) -> &[T];
}

impl<T, V: TensorView<T> + ?Sized> TensorView<T> for &V {
    fn dimensions(&self) -> &[usize] {
        (**self).dimensions()
    }

    fn as_slice(&self) -> &[T] {
        (**self).as_slice()
    }
}

/// Immutable view over a contiguous region of a tensor buffer.
#[derive(Debug, Clone)]
pub struct TensorSpan<'a, T> {
    data: &'a [T],
    dimensions: Vec<usize>,
}

impl<'a, T: TensorElement> TensorSpan<'a, T> {
    pub fn new(data: &'a [T], dimensions: Vec<usize>) -> Result<Self> {
        ensure_len(data.len(), &dimensions)?;
        Ok(Self { data, dimensions })
    }

    pub(crate) fn from_parts_unchecked(data: &'a [T], dimensions: Vec<usize>) -> Self {
        Self { data, dimensions }
    }

    pub fn dimensions(&self) -> &[usize] {
        &self.dimensions
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &'a [T] {
        self.data
    }

    pub fn get(&self, index: &[usize]) -> Result<T> {
        let strides = get_strides(&self.dimensions);
        let offset = checked_index(&self.dimensions, &strides, index)?;
        Ok(self.data[offset])
    }

    /// Copy the viewed memory into a new owned tensor.
    pub fn to_tensor(&self) -> Tensor<T> {
        Tensor::from_parts_unchecked(self.data.to_vec(), self.dimensions.clone())
    }
}

impl<T> TensorView<T> for TensorSpan<'_, T> {
    fn dimensions(&self) -> &[usize] {
        &self.dimensions
    }

    fn as_slice(&self) -> &[T] {
        self.data
    }
}

/// Mutable view; element-wise arithmetic writes straight into the owner's buffer.
#[derive(Debug)]
pub struct TensorSpanMut<'a, T> {
    data: &'a mut [T],
    dimensions: Vec<usize>,
}

impl<'a, T: TensorElement> TensorSpanMut<'a, T> {
    pub fn new(data: &'a mut [T], dimensions: Vec<usize>) -> Result<Self> {
        ensure_len(data.len(), &dimensions)?;
        Ok(Self { data, dimensions })
    }

    pub(crate) fn from_parts_unchecked(data: &'a mut [T], dimensions: Vec<usize>) -> Self {
        Self { data, dimensions }
    }

    pub fn dimensions(&self) -> &[usize] {
        &self.dimensions
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[T] {
        self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        self.data
    }

    pub fn to_tensor(&self) -> Tensor<T> {
        Tensor::from_parts_unchecked(self.data.to_vec(), self.dimensions.clone())
    }

    /// Overwrite the viewed memory with `source`, which must match in shape.
    pub fn copy_from(&mut self, source: &impl TensorView<T>) -> Result<()> {
        ensure_same_dimensions(&self.dimensions, source.dimensions())?;
        self.data.copy_from_slice(source.as_slice());
        Ok(())
    }

    pub fn fill(&mut self, value: T) {
        self.data.fill(value);
    }
}

impl<T> TensorView<T> for TensorSpanMut<'_, T> {
    fn dimensions(&self) -> &[usize] {
        &self.dimensions
    }

    fn as_slice(&self) -> &[T] {
        self.data
    }
}

macro_rules! span_in_place_ops {
    ($($op:tt => $tensor_fn:ident, $scalar_fn:ident;)*) => {
        impl<T: NumericElement> TensorSpanMut<'_, T> {
            $(
                pub fn $tensor_fn(&mut self, other: &impl TensorView<T>) -> Result<()> {
                    ensure_same_dimensions(&self.dimensions, other.dimensions())?;
                    for (a, &b) in self.data.iter_mut().zip(other.as_slice()) {
                        *a = *a $op b;
                    }
                    Ok(())
                }

                pub fn $scalar_fn(&mut self, value: T) {
                    for a in self.data.iter_mut() {
                        *a = *a $op value;
                    }
                }
            )*
        }
    };
}

span_in_place_ops! {
    + => add_tensor_in_place, add_scalar_in_place;
    - => sub_tensor_in_place, sub_scalar_in_place;
    * => mul_tensor_in_place, mul_scalar_in_place;
    / => div_tensor_in_place, div_scalar_in_place;
}

pub(crate) fn ensure_len(len: usize, dimensions: &[usize]) -> Result<()> {
    let expected = element_count(dimensions);
    if len != expected {
        return Err(TensorError::Shape(format!(
            "buffer holds {} elements but dimensions {:?} require {}",
            len, dimensions, expected
        )));
    }
    Ok(())
}

pub(crate) fn ensure_same_dimensions(expected: &[usize], actual: &[usize]) -> Result<()> {
    if expected != actual {
        return Err(TensorError::mismatch(expected, actual));
    }
    Ok(())
}
