//! Separable Gaussian blur: the crate's one implementation of the "external collaborator"
//! blur primitive (SPEC_FULL.md §4.F), shared between the segmenter's image smoothing and the
//! noise estimator's per-block filtering.
//!
//! Structurally grounded on the per-channel image-filtering shape in
//! `examples/other_examples/20e10179_RazrFalcon-resvg__src-backend_utils-filter.rs.rs` (blur each
//! channel independently, leave alpha alone), but implemented as an explicit truncated kernel
//! rather than resvg's IIR cascade, since `kernel_radius_factor` only has meaning for a finite
//! kernel.

use crate::image::RgbaImage;

/// Builds a normalized discrete Gaussian kernel of the given standard deviation and radius.
/// `radius == 0` degenerates to the identity kernel `[1.0]`.
pub(crate) fn gaussian_kernel(sigma: f64, radius: usize) -> Vec<f64> {
    if radius == 0 || sigma <= 0.0 {
        return vec![1.0];
    }
    let two_sigma_sq = 2.0 * sigma * sigma;
    let mut kernel = Vec::with_capacity(2 * radius + 1);
    for i in -(radius as isize)..=(radius as isize) {
        let x = i as f64;
        kernel.push((-x * x / two_sigma_sq).exp());
    }
    let sum: f64 = kernel.iter().sum();
    for v in &mut kernel {
        *v /= sum;
    }
    kernel
}

/// Kernel radius for a given sigma and radius multiplier, per SPEC_FULL.md §4.E/§4.D.
#[inline]
pub(crate) fn kernel_radius(sigma: f64, kernel_radius_factor: f64) -> usize {
    if sigma <= 0.0 {
        0
    } else {
        (sigma * kernel_radius_factor).ceil().max(0.0) as usize
    }
}

/// Separable convolution of a single-channel `f64` buffer with edge-clamping, used directly by
/// the noise estimator on per-block luminance data.
pub(crate) fn convolve_separable(src: &[f64], width: usize, height: usize, kernel: &[f64]) -> Vec<f64> {
    if kernel.len() == 1 {
        return src.to_vec();
    }
    let radius = (kernel.len() / 2) as isize;

    let mut horiz = vec![0.0f64; width * height];
    for y in 0..height {
        let row = y * width;
        for x in 0..width {
            let mut acc = 0.0;
            for (k, &w) in kernel.iter().enumerate() {
                let dx = k as isize - radius;
                let sx = (x as isize + dx).clamp(0, width as isize - 1) as usize;
                acc += src[row + sx] * w;
            }
            horiz[row + x] = acc;
        }
    }

    let mut out = vec![0.0f64; width * height];
    for y in 0..height {
        for x in 0..width {
            let mut acc = 0.0;
            for (k, &w) in kernel.iter().enumerate() {
                let dy = k as isize - radius;
                let sy = (y as isize + dy).clamp(0, height as isize - 1) as usize;
                acc += horiz[sy * width + x] * w;
            }
            out[y * width + x] = acc;
        }
    }
    out
}

/// Blurs `image` with a Gaussian of standard deviation `sigma`, using a kernel truncated at
/// `ceil(sigma * kernel_radius_factor)`. Alpha is passed through unchanged. `sigma <= 0.0` (or a
/// derived radius of zero) is the identity transform.
pub fn blur(image: &RgbaImage, sigma: f64, kernel_radius_factor: f64) -> RgbaImage {
    let width = image.width;
    let height = image.height;
    if width == 0 || height == 0 {
        return image.clone();
    }

    let radius = kernel_radius(sigma, kernel_radius_factor);
    let kernel = gaussian_kernel(sigma, radius);
    if kernel.len() == 1 {
        return image.clone();
    }

    let mut out = RgbaImage::new(width, height);
    for ch in 0..3 {
        let mut plane = vec![0.0f64; width * height];
        for y in 0..height {
            for x in 0..width {
                plane[y * width + x] = unsafe { image.get_unchecked(x, y, ch) } as f64;
            }
        }
        let blurred = convolve_separable(&plane, width, height, &kernel);
        for y in 0..height {
            for x in 0..width {
                let v = blurred[y * width + x].round().clamp(0.0, 255.0) as u8;
                unsafe {
                    *out.get_unchecked_mut(x, y, ch) = v;
                }
            }
        }
    }
    for y in 0..height {
        for x in 0..width {
            unsafe {
                *out.get_unchecked_mut(x, y, 3) = image.get_unchecked(x, y, 3);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_sigma_is_identity() {
        let mut img = RgbaImage::new(4, 4);
        img.set_rgb8(1, 2, 10, 20, 30);
        let blurred = blur(&img, 0.0, 4.0);
        assert_eq!(blurred, img);
    }

    #[test]
    fn constant_image_is_unchanged_by_blur() {
        let mut img = RgbaImage::new(6, 6);
        for y in 0..6 {
            for x in 0..6 {
                img.set_rgb8(x, y, 100, 150, 200);
            }
        }
        let blurred = blur(&img, 2.0, 4.0);
        for y in 0..6 {
            for x in 0..6 {
                assert_eq!(blurred.at(x, y).to_rgb8(), (100, 150, 200));
            }
        }
    }

    #[test]
    fn kernel_is_normalized() {
        let kernel = gaussian_kernel(2.0, 8);
        let sum: f64 = kernel.iter().sum();
        assert!((sum - 1.0).abs() < 1e-12);
    }

    #[test]
    fn blur_preserves_dimensions() {
        let img = RgbaImage::new(11, 7);
        let blurred = blur(&img, 1.5, 4.0);
        assert_eq!(blurred.width, 11);
        assert_eq!(blurred.height, 7);
    }
}
