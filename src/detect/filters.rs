//! Grayscale image filters used by the motion detector.
//!
//! Border handling follows the usual conventions for these operations:
//! Gaussian smoothing mirrors the image around its edge pixel
//! (`dcb|abcd|cba`), morphology ignores pixels outside the image.

use image::GrayImage;

/// Sigma derived from the kernel size when none is given:
/// `0.3 * ((ksize - 1) * 0.5 - 1) + 0.8`.
pub fn default_sigma(ksize: usize) -> f64 {
    0.3 * ((ksize as f64 - 1.0) * 0.5 - 1.0) + 0.8
}

fn gaussian_kernel(ksize: usize) -> Vec<f64> {
    let sigma = default_sigma(ksize);
    let center = (ksize / 2) as f64;
    let mut kernel: Vec<f64> = (0..ksize)
        .map(|i| {
            let x = i as f64 - center;
            (-(x * x) / (2.0 * sigma * sigma)).exp()
        })
        .collect();
    let sum: f64 = kernel.iter().sum();
    for k in kernel.iter_mut() {
        *k /= sum;
    }
    kernel
}

fn reflect_101(index: i64, len: i64) -> usize {
    if len == 1 {
        return 0;
    }
    let mut i = index;
    loop {
        if i < 0 {
            i = -i;
        } else if i >= len {
            i = 2 * len - 2 - i;
        } else {
            return i as usize;
        }
    }
}

/// Separable Gaussian blur with an odd `ksize` x `ksize` kernel.
pub fn gaussian_blur(src: &GrayImage, ksize: usize) -> GrayImage {
    let (width, height) = src.dimensions();
    let (w, h) = (width as i64, height as i64);
    let kernel = gaussian_kernel(ksize);
    let radius = (ksize / 2) as i64;
    let pixels = src.as_raw();

    let mut horizontal = vec![0f64; pixels.len()];
    for y in 0..h {
        let row = (y * w) as usize;
        for x in 0..w {
            let mut acc = 0.0;
            for (k, weight) in kernel.iter().enumerate() {
                let sx = reflect_101(x + k as i64 - radius, w);
                acc += weight * pixels[row + sx] as f64;
            }
            horizontal[row + x as usize] = acc;
        }
    }

    let mut out = GrayImage::new(width, height);
    let dst: &mut [u8] = &mut out;
    for y in 0..h {
        for x in 0..w {
            let mut acc = 0.0;
            for (k, weight) in kernel.iter().enumerate() {
                let sy = reflect_101(y + k as i64 - radius, h);
                acc += weight * horizontal[sy * width as usize + x as usize];
            }
            dst[(y * w + x) as usize] = acc.round().clamp(0.0, 255.0) as u8;
        }
    }
    out
}

/// Per-pixel `|a - b|`. Both images must have the same size.
pub fn abs_diff(a: &GrayImage, b: &GrayImage) -> GrayImage {
    let mut out = GrayImage::new(a.width(), a.height());
    for ((dst, &pa), &pb) in out.iter_mut().zip(a.iter()).zip(b.iter()) {
        *dst = pa.abs_diff(pb);
    }
    out
}

/// Binary threshold: 255 where `value > thresh`, else 0.
pub fn threshold(src: &GrayImage, thresh: u8) -> GrayImage {
    let mut out = GrayImage::new(src.width(), src.height());
    for (dst, &value) in out.iter_mut().zip(src.iter()) {
        *dst = if value > thresh { 255 } else { 0 };
    }
    out
}

/// Morphological closing (dilate, then erode) of a binary mask with a
/// `ksize` x `ksize` rectangle anchored at `(ksize / 2, ksize / 2)`.
pub fn close(mask: &GrayImage, ksize: usize) -> GrayImage {
    let dilated = rect_morph(mask, ksize, Morph::Dilate);
    rect_morph(&dilated, ksize, Morph::Erode)
}

#[derive(Clone, Copy)]
enum Morph {
    Dilate,
    Erode,
}

/// Rectangular morphology on a binary mask, done as a row pass and a column
/// pass over running counts of set pixels.
fn rect_morph(mask: &GrayImage, ksize: usize, op: Morph) -> GrayImage {
    let (width, height) = mask.dimensions();
    let (w, h) = (width as usize, height as usize);
    let anchor = ksize / 2;
    let set: Vec<bool> = mask.iter().map(|&v| v != 0).collect();

    let rows = morph_pass(&set, w, h, ksize, anchor, op, true);
    let cols = morph_pass(&rows, w, h, ksize, anchor, op, false);

    let mut out = GrayImage::new(width, height);
    for (dst, &on) in out.iter_mut().zip(cols.iter()) {
        *dst = if on { 255 } else { 0 };
    }
    out
}

fn morph_pass(
    set: &[bool],
    w: usize,
    h: usize,
    ksize: usize,
    anchor: usize,
    op: Morph,
    horizontal: bool,
) -> Vec<bool> {
    let (lines, len) = if horizontal { (h, w) } else { (w, h) };
    let index = |line: usize, pos: usize| {
        if horizontal {
            line * w + pos
        } else {
            pos * w + line
        }
    };

    let mut out = vec![false; set.len()];
    let mut prefix = vec![0usize; len + 1];
    for line in 0..lines {
        for pos in 0..len {
            prefix[pos + 1] = prefix[pos] + set[index(line, pos)] as usize;
        }
        for pos in 0..len {
            // Window [pos - anchor, pos - anchor + ksize) clipped to the line.
            let start = pos.saturating_sub(anchor);
            let end = (pos + ksize - anchor).min(len);
            let count = prefix[end] - prefix[start];
            out[index(line, pos)] = match op {
                Morph::Dilate => count > 0,
                Morph::Erode => count == end - start,
            };
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn sigma_for_21_tap_kernel() {
        assert!((default_sigma(21) - 3.5).abs() < 1e-9);
        let kernel = gaussian_kernel(21);
        assert_eq!(kernel.len(), 21);
        assert!((kernel.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert!(kernel[10] > kernel[9] && kernel[9] > kernel[0]);
    }

    #[test]
    fn blur_keeps_flat_images_flat() {
        let flat = GrayImage::from_pixel(30, 20, Luma([77]));
        assert_eq!(gaussian_blur(&flat, 21), flat);
    }

    #[test]
    fn blur_spreads_a_point() {
        let mut img = GrayImage::new(41, 41);
        img.put_pixel(20, 20, Luma([255]));
        let blurred = gaussian_blur(&img, 21);
        assert!(blurred.get_pixel(20, 20)[0] < 255);
        assert!(blurred.get_pixel(22, 20)[0] > 0);
        assert_eq!(blurred.get_pixel(0, 0)[0], 0);
    }

    #[test]
    fn diff_and_threshold() {
        let a = GrayImage::from_raw(4, 1, vec![10, 10, 10, 200]).unwrap();
        let b = GrayImage::from_raw(4, 1, vec![10, 15, 16, 0]).unwrap();
        let diff = abs_diff(&a, &b);
        assert_eq!(diff.as_raw(), &vec![0, 5, 6, 200]);
        assert_eq!(threshold(&diff, 5).as_raw(), &vec![0, 0, 255, 255]);
    }

    #[test]
    fn close_bridges_small_gaps() {
        let mut mask = GrayImage::new(60, 20);
        for x in (5..25).chain(30..50) {
            for y in 5..15 {
                mask.put_pixel(x, y, Luma([255]));
            }
        }
        let closed = close(&mask, 8);
        assert_eq!(closed.get_pixel(27, 10)[0], 255);
        assert_eq!(closed.get_pixel(55, 10)[0], 0);
        assert_eq!(closed.get_pixel(10, 10)[0], 255);
    }

    #[test]
    fn close_with_even_kernel_keeps_blob_area() {
        let mut mask = GrayImage::new(100, 100);
        for x in 40..60 {
            for y in 40..60 {
                mask.put_pixel(x, y, Luma([255]));
            }
        }
        let closed = close(&mask, 40);
        let set = closed.iter().filter(|&&v| v == 255).count();
        assert_eq!(set, 400);
        // The even-sized kernel's anchor shifts the result by one pixel.
        assert_eq!(closed.get_pixel(41, 41)[0], 255);
        assert_eq!(closed.get_pixel(60, 60)[0], 255);
        assert_eq!(closed.get_pixel(40, 40)[0], 0);
    }
}
