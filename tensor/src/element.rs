//! Element type bounds for tensor buffers.

use num_traits::{Num, NumCast};
use std::fmt::Debug;

/// Any value that can live in a tensor buffer.
///
/// Structural operations (reshape, permute, split, join, concatenate, repeat)
/// only need this bound, so token and mask tensors share them with `f32`.
pub trait TensorElement: Copy + Default + PartialEq + Debug + Send + Sync + 'static {}

impl TensorElement for f32 {}
impl TensorElement for f64 {}
impl TensorElement for i32 {}
impl TensorElement for i64 {}
impl TensorElement for u8 {}
impl TensorElement for bool {}

/// Elements that support element-wise arithmetic.
pub trait NumericElement: TensorElement + Num + PartialOrd + NumCast {}

impl<T> NumericElement for T where T: TensorElement + Num + PartialOrd + NumCast {}
