//! Block-based adaptive-Gaussian-filtering noise estimator.
//!
//! Grounded on `examples/original_source/imagenoise/imagenoise.go` ("Block Based Noise Estimation
//! Using Adaptive Gaussian Filtering"): tile the image into 16x3 blocks, find the homogeneous
//! subset (those whose rounded stdev matches the rounded minimum stdev, with the half-up/
//! round-down tie-break from `utils.Round`), Gaussian-filter each homogeneous block with its own
//! stdev as sigma, and take the stdev of the per-pixel original-vs-filtered luminance deltas.
//! Per-block parallel reduction is grounded on the Go version's goroutine-per-block fan-out; here
//! it's `rayon::par_iter` instead of channels, per SPEC_FULL.md's ambient-stack note.
//!
//! Fixes one upstream bug: `diffsAndMeanDiff` in the Go source indexes its diff accumulator by
//! block index `b`, so for any block wider than one pixel only the last pixel's difference
//! survives. This implementation keeps one diff sample per pixel.

use rayon::prelude::*;

use crate::blur::{convolve_separable, gaussian_kernel, kernel_radius};
use crate::image::Image;
use crate::weights::{luminance, Pixel};

const BLOCK_WIDTH: usize = 16;
const BLOCK_HEIGHT: usize = 3;

struct Block {
    x0: usize,
    y0: usize,
}

fn block_origins(width: usize, height: usize) -> Vec<Block> {
    let trimmed_w = width - width % BLOCK_WIDTH;
    let trimmed_h = height - height % BLOCK_HEIGHT;
    let mut blocks = Vec::new();
    let mut y = 0;
    while y < height {
        let mut x = 0;
        while x < width {
            if x != trimmed_w && y != trimmed_h {
                blocks.push(Block { x0: x, y0: y });
            }
            x += BLOCK_WIDTH;
        }
        y += BLOCK_HEIGHT;
    }
    blocks
}

/// Rounds half-up (`x.5` rounds away from zero towards `+infinity`), matching `utils.Round`.
fn round_half_up(x: f64) -> i64 {
    let frac = x - x.floor();
    if frac >= 0.5 {
        (x + 1.0).floor() as i64
    } else {
        x.floor() as i64
    }
}

fn block_luminances(image: &dyn Image, block: &Block) -> Vec<f64> {
    let mut out = Vec::with_capacity(BLOCK_WIDTH * BLOCK_HEIGHT);
    for dy in 0..BLOCK_HEIGHT {
        for dx in 0..BLOCK_WIDTH {
            let px = Pixel::from_rgba(image.at(block.x0 + dx, block.y0 + dy));
            out.push(luminance(px));
        }
    }
    out
}

fn mean_and_stdev(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, variance.sqrt())
}

/// Estimates the standard deviation of the additive white Gaussian noise in `image`.
///
/// Returns `0.0` for images too small to contain a single 16x3 block, since the original
/// algorithm is undefined on them.
pub fn estimate_stdev(image: &dyn Image) -> f64 {
    let width = image.width();
    let height = image.height();
    if width < BLOCK_WIDTH || height < BLOCK_HEIGHT {
        return 0.0;
    }

    let origins = block_origins(width, height);
    if origins.is_empty() {
        return 0.0;
    }

    let luminances: Vec<Vec<f64>> =
        origins.par_iter().map(|b| block_luminances(image, b)).collect();

    let stdevs: Vec<f64> = luminances.par_iter().map(|vs| mean_and_stdev(vs).1).collect();
    let min_stdev = stdevs.iter().cloned().fold(f64::INFINITY, f64::min);

    // `utils.Round` rounds half-up; but if the minimum stdev's fractional part is itself exactly
    // at the floor/round boundary (i.e. `floor(min) == round(min)`), the Go source switches every
    // comparison to `floor` instead, so blocks just above the boundary don't get excluded.
    let min_floor = min_stdev.floor() as i64;
    let min_round = round_half_up(min_stdev);
    let round_fn: fn(f64) -> i64 = if min_floor == min_round { |x| x.floor() as i64 } else { round_half_up };
    let target = round_fn(min_stdev);

    let homogeneous: Vec<usize> =
        (0..origins.len()).filter(|&i| round_fn(stdevs[i]) == target).collect();

    // Every homogeneous block is filtered with the *global* minimum stdev as sigma, not its own
    // (`filterBlocks(blocks, minstdev)` in the Go source takes one sigma for the whole batch).
    let radius = kernel_radius(min_stdev, 5.0);
    let kernel = gaussian_kernel(min_stdev, radius);

    let diffs: Vec<f64> = homogeneous
        .par_iter()
        .flat_map_iter(|&i| {
            let original = &luminances[i];
            let filtered = convolve_separable(original, BLOCK_WIDTH, BLOCK_HEIGHT, &kernel);
            original
                .iter()
                .zip(filtered.iter())
                .map(|(&o, &f)| (o - f).abs())
                .collect::<Vec<_>>()
        })
        .collect();

    if diffs.is_empty() {
        return 0.0;
    }
    let mean = diffs.iter().sum::<f64>() / diffs.len() as f64;
    let n = diffs.len() as f64;
    let variance: f64 = diffs.par_iter().map(|d| (d - mean).powi(2) / n).sum();
    variance.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::RgbaImage;

    fn uniform_image(width: usize, height: usize, gray: u8) -> RgbaImage {
        let mut img = RgbaImage::new(width, height);
        for y in 0..height {
            for x in 0..width {
                img.set_rgb8(x, y, gray, gray, gray);
            }
        }
        img
    }

    #[test]
    fn tiny_image_estimates_zero() {
        // SPEC_FULL.md §8 scenario 6.
        let img = uniform_image(8, 2, 128);
        assert_eq!(estimate_stdev(&img), 0.0);
    }

    #[test]
    fn uniform_image_has_zero_noise() {
        // SPEC_FULL.md §8 scenario 7.
        let img = uniform_image(32, 6, 128);
        let sigma = estimate_stdev(&img);
        assert!(sigma.abs() < 1e-9, "expected ~0 noise on a flat image, got {sigma}");
    }

    #[test]
    fn round_half_up_matches_go_semantics() {
        assert_eq!(round_half_up(2.4), 2);
        assert_eq!(round_half_up(2.5), 3);
        assert_eq!(round_half_up(2.999), 3);
        assert_eq!(round_half_up(0.0), 0);
    }

    #[test]
    fn noisy_image_has_positive_estimate() {
        let mut img = uniform_image(32, 6, 128);
        for y in 0..6 {
            for x in 0..32 {
                let bump = if (x + y) % 2 == 0 { 40 } else { 0 };
                img.set_rgb8(x, y, 128u8.saturating_add(bump), 128, 128);
            }
        }
        let sigma = estimate_stdev(&img);
        assert!(sigma > 0.0);
    }
}
