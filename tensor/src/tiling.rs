//! Overlapping quadrant tiling for memory-bounded image inference.
//!
//! An oversized `[batch, channels, height, width]` image is cut into up to four
//! tiles that share `overlap` pixels across each cut. After inference the
//! tiles are written back at their offsets, cross-fading linearly inside the
//! shared band so the seams disappear. Tiles that are still oversized are
//! tiled again; recursion stops at `min_tile_size` or `MAX_TILE_DEPTH`.
//!
//! Models whose output is an integer multiple of their input (upscalers) are
//! supported: recompose scales every offset by the observed factor.

use crate::error::{Result, TensorError};
use crate::tensor::Tensor;
use serde::{Deserialize, Serialize};

/// Hard recursion ceiling, independent of `min_tile_size`.
pub const MAX_TILE_DEPTH: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TileMode {
    #[default]
    None,
    Quadrant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TileOptions {
    pub mode: TileMode,
    pub max_tile_size: usize,
    pub overlap: usize,
    pub min_tile_size: usize,
}

impl Default for TileOptions {
    fn default() -> Self {
        Self {
            mode: TileMode::None,
            max_tile_size: 512,
            overlap: 16,
            min_tile_size: 64,
        }
    }
}

impl TileOptions {
    pub fn quadrant(max_tile_size: usize, overlap: usize) -> Self {
        Self {
            mode: TileMode::Quadrant,
            max_tile_size,
            overlap,
            ..Self::default()
        }
    }

    /// Reject geometries that would blend degenerately or never terminate.
    pub fn validate(&self) -> Result<()> {
        if self.max_tile_size == 0 {
            return Err(TensorError::InvalidTileConfiguration(
                "max_tile_size must be positive".to_string(),
            ));
        }
        if self.overlap * 2 >= self.max_tile_size {
            return Err(TensorError::InvalidTileConfiguration(format!(
                "overlap {} must be less than half of max_tile_size {}",
                self.overlap, self.max_tile_size
            )));
        }
        if self.min_tile_size <= self.overlap || self.min_tile_size > self.max_tile_size {
            return Err(TensorError::InvalidTileConfiguration(format!(
                "min_tile_size {} must be in ({}, {}]",
                self.min_tile_size, self.overlap, self.max_tile_size
            )));
        }
        Ok(())
    }

    pub fn should_tile(&self, width: usize, height: usize) -> bool {
        self.mode != TileMode::None && should_tile(width, height, self.max_tile_size, self.overlap)
    }
}

/// True iff either spatial dimension exceeds `max_tile_size + overlap`.
pub fn should_tile(width: usize, height: usize, max_tile_size: usize, overlap: usize) -> bool {
    let limit = max_tile_size + overlap;
    width > limit || height > limit
}

/// Source rectangle of one tile, in input pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileRegion {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

/// Everything needed to put processed tiles back together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileLayout {
    pub mode: TileMode,
    pub overlap: usize,
    pub width: usize,
    pub height: usize,
    pub split_x: usize,
    pub split_y: usize,
    /// Row-major: top-left, top-right, bottom-left, bottom-right.
    pub regions: Vec<TileRegion>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageTiles {
    pub layout: TileLayout,
    pub tiles: Vec<Tensor<f32>>,
}

impl ImageTiles {
    /// Cut `image` into tiles. Odd sizes give the trailing tile the remainder.
    pub fn decompose(image: &Tensor<f32>, mode: TileMode, overlap: usize) -> Result<Self> {
        let (_, _, height, width) = image_dimensions(image)?;
        let layout = match mode {
            TileMode::None => TileLayout {
                mode,
                overlap: 0,
                width,
                height,
                split_x: width,
                split_y: height,
                regions: vec![TileRegion {
                    x: 0,
                    y: 0,
                    width,
                    height,
                }],
            },
            TileMode::Quadrant => quadrant_layout(width, height, overlap)?,
        };
        let tiles = layout
            .regions
            .iter()
            .map(|region| crop(image, region))
            .collect();
        Ok(Self { layout, tiles })
    }

    pub fn recompose(&self) -> Result<Tensor<f32>> {
        recompose(&self.tiles, &self.layout)
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }
}

fn quadrant_layout(width: usize, height: usize, overlap: usize) -> Result<TileLayout> {
    if width < 2 || height < 2 {
        return Err(TensorError::InvalidTileConfiguration(format!(
            "cannot quadrant-split a {}x{} image",
            width, height
        )));
    }
    let split_x = width / 2;
    let split_y = height / 2;
    if overlap > split_x || overlap > split_y {
        return Err(TensorError::InvalidTileConfiguration(format!(
            "overlap {} exceeds half of {}x{}",
            overlap, width, height
        )));
    }

    let columns = [(0, split_x + overlap), (split_x - overlap, width - split_x + overlap)];
    let rows = [(0, split_y + overlap), (split_y - overlap, height - split_y + overlap)];
    let regions = rows
        .iter()
        .flat_map(|&(y, h)| {
            columns.iter().map(move |&(x, w)| TileRegion {
                x,
                y,
                width: w,
                height: h,
            })
        })
        .collect();

    Ok(TileLayout {
        mode: TileMode::Quadrant,
        overlap,
        width,
        height,
        split_x,
        split_y,
        regions,
    })
}

/// Blend processed tiles back into one image.
///
/// Tile `i` must have the shape of `layout.regions[i]` scaled by one common
/// integer factor; batch and channel counts may differ from the source image
/// but must agree across tiles.
pub fn recompose(tiles: &[Tensor<f32>], layout: &TileLayout) -> Result<Tensor<f32>> {
    if tiles.len() != layout.regions.len() || tiles.is_empty() {
        return Err(TensorError::Shape(format!(
            "expected {} tiles, got {}",
            layout.regions.len(),
            tiles.len()
        )));
    }

    let (batch, channels, first_h, _) = image_dimensions(&tiles[0])?;
    let first = layout.regions[0];
    if first_h % first.height != 0 || first_h < first.height {
        return Err(TensorError::Shape(format!(
            "tile height {} is not a multiple of region height {}",
            first_h, first.height
        )));
    }
    let scale = first_h / first.height;
    for (tile, region) in tiles.iter().zip(&layout.regions) {
        let expected = [batch, channels, region.height * scale, region.width * scale];
        if tile.dimensions() != expected {
            return Err(TensorError::mismatch(&expected, tile.dimensions()));
        }
    }

    let out_w = layout.width * scale;
    let out_h = layout.height * scale;
    let split_x = layout.split_x * scale;
    let split_y = layout.split_y * scale;
    let overlap = layout.overlap * scale;
    let planes = batch * channels;

    let mut output = vec![0.0f32; planes * out_h * out_w];
    let mut coverage = vec![0.0f32; out_h * out_w];

    for (index, (tile, region)) in tiles.iter().zip(&layout.regions).enumerate() {
        let trailing_column = index % 2 == 1;
        let trailing_row = index / 2 == 1;
        let (x0, y0) = (region.x * scale, region.y * scale);
        let (tw, th) = (region.width * scale, region.height * scale);

        let weights: Vec<f32> = (0..th)
            .flat_map(|ty| {
                let wy = axis_weight(y0 + ty, split_y, overlap, trailing_row);
                (0..tw).map(move |tx| wy * axis_weight(x0 + tx, split_x, overlap, trailing_column))
            })
            .collect();

        for ty in 0..th {
            let row = (y0 + ty) * out_w + x0;
            for tx in 0..tw {
                coverage[row + tx] += weights[ty * tw + tx];
            }
        }

        let data = tile.as_slice();
        for plane in 0..planes {
            for ty in 0..th {
                let src = (plane * th + ty) * tw;
                let dst = (plane * out_h + y0 + ty) * out_w + x0;
                for tx in 0..tw {
                    output[dst + tx] += data[src + tx] * weights[ty * tw + tx];
                }
            }
        }
    }

    for plane in output.chunks_exact_mut(out_h * out_w) {
        for (value, &weight) in plane.iter_mut().zip(&coverage) {
            if weight > 0.0 {
                *value /= weight;
            }
        }
    }

    Tensor::from_vec(output, vec![batch, channels, out_h, out_w])
}

/// Weight of a tile along one axis: 1 on its own side of the cut, a linear
/// ramp across `[split - overlap, split + overlap)`, 0 beyond.
fn axis_weight(position: usize, split: usize, overlap: usize, trailing: bool) -> f32 {
    let leading = if overlap == 0 {
        if position < split {
            1.0
        } else {
            0.0
        }
    } else {
        let start = split - overlap;
        let end = split + overlap;
        if position < start {
            1.0
        } else if position >= end {
            0.0
        } else {
            1.0 - ((position - start) as f32 + 0.5) / (2 * overlap) as f32
        }
    };
    if trailing {
        1.0 - leading
    } else {
        leading
    }
}

fn crop(image: &Tensor<f32>, region: &TileRegion) -> Tensor<f32> {
    let dims = image.dimensions();
    let (planes, height, width) = (dims[0] * dims[1], dims[2], dims[3]);
    let source = image.as_slice();
    let mut buffer = Vec::with_capacity(planes * region.width * region.height);
    for plane in 0..planes {
        for y in region.y..region.y + region.height {
            let start = (plane * height + y) * width + region.x;
            buffer.extend_from_slice(&source[start..start + region.width]);
        }
    }
    Tensor::from_parts_unchecked(buffer, vec![dims[0], dims[1], region.height, region.width])
}

fn image_dimensions(image: &Tensor<f32>) -> Result<(usize, usize, usize, usize)> {
    match *image.dimensions() {
        [b, c, h, w] => Ok((b, c, h, w)),
        _ => Err(TensorError::InvalidImage(format!(
            "tiling needs [batch, channels, height, width], got {:?}",
            image.dimensions()
        ))),
    }
}

/// Run `inference` over `image`, tiling recursively whenever `options` say so.
///
/// Tiles at one level are processed in order; `inference` sees every tile
/// exactly once and never sees an image the options consider oversized unless
/// the recursion floor was reached.
pub fn run_tiled<F, E>(
    image: Tensor<f32>,
    options: &TileOptions,
    mut inference: F,
) -> std::result::Result<Tensor<f32>, E>
where
    F: FnMut(Tensor<f32>) -> std::result::Result<Tensor<f32>, E>,
    E: From<TensorError>,
{
    options.validate()?;
    run_tiled_level(image, options, 0, &mut inference)
}

fn run_tiled_level<F, E>(
    image: Tensor<f32>,
    options: &TileOptions,
    depth: usize,
    inference: &mut F,
) -> std::result::Result<Tensor<f32>, E>
where
    F: FnMut(Tensor<f32>) -> std::result::Result<Tensor<f32>, E>,
    E: From<TensorError>,
{
    let (_, _, height, width) = image_dimensions(&image)?;
    if !options.should_tile(width, height) {
        return inference(image);
    }
    if !can_split(width, height, depth, options) {
        log::warn!(
            "Tile recursion floor reached at {}x{} (depth {}), running untiled",
            width,
            height,
            depth
        );
        return inference(image);
    }

    log::debug!("Tiling {}x{} image at depth {}", width, height, depth);
    let ImageTiles { layout, tiles } = ImageTiles::decompose(&image, options.mode, options.overlap)?;
    drop(image);

    let mut processed = Vec::with_capacity(tiles.len());
    for tile in tiles {
        processed.push(run_tiled_level(tile, options, depth + 1, inference)?);
    }
    Ok(recompose(&processed, &layout)?)
}

fn can_split(width: usize, height: usize, depth: usize, options: &TileOptions) -> bool {
    depth < MAX_TILE_DEPTH && width / 2 >= options.min_tile_size && height / 2 >= options.min_tile_size
}

/// Recursion depth `run_tiled` will reach for a `width` x `height` image.
pub fn tile_depth(width: usize, height: usize, options: &TileOptions) -> usize {
    let (mut w, mut h, mut depth) = (width, height, 0);
    while options.should_tile(w, h) && can_split(w, h, depth, options) {
        w = w - w / 2 + options.overlap;
        h = h - h / 2 + options.overlap;
        depth += 1;
    }
    depth
}
