//! TensorStack tensor engine
//!
//! Dense row-major tensors shared by every pipeline stage:
//! - `Tensor<T>` and `TensorSpan`/`TensorSpanMut` views with element-wise arithmetic
//! - Structural ops: reshape, permute, split, join, concatenate, repeat
//! - Image, video and audio wrappers with fixed axis meaning
//! - Quadrant tiling with overlap blending for memory-bounded inference
//! - Seeded Gaussian noise

pub mod element;
pub mod error;
pub mod image;
pub mod noise;
pub mod shape;
pub mod span;
pub mod tensor;
pub mod tiling;

pub use element::{NumericElement, TensorElement};
pub use error::{Result, TensorError};
pub use image::{AudioTensor, ImageTensor, VideoTensor};
pub use noise::{random_normal, seeded_rng};
pub use span::{TensorSpan, TensorSpanMut, TensorView};
pub use tensor::{concatenate, Splits, SplitsMut, Tensor};
pub use tiling::{
    run_tiled, should_tile, tile_depth, ImageTiles, TileLayout, TileMode, TileOptions, TileRegion, MAX_TILE_DEPTH,
};
