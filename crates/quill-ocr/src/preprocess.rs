//! Contrast and noise normalization applied before recognition.

use image::{DynamicImage, GrayImage, Luma};

/// Grayscale, binarize with Otsu's threshold, then remove speckle with a 3x3 median.
#[must_use]
pub fn normalize(image: &DynamicImage) -> GrayImage {
    let gray = image.to_luma8();
    let threshold = otsu_threshold(&gray);
    let binary = GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        if gray.get_pixel(x, y)[0] > threshold {
            Luma([255])
        } else {
            Luma([0])
        }
    });
    median_3x3(&binary)
}

/// Threshold maximizing between-class variance of the luminance histogram.
#[must_use]
pub fn otsu_threshold(image: &GrayImage) -> u8 {
    let mut histogram = [0u64; 256];
    for pixel in image.pixels() {
        histogram[usize::from(pixel[0])] += 1;
    }
    let total: u64 = histogram.iter().sum();
    if total == 0 {
        return 0;
    }
    #[allow(clippy::cast_precision_loss)]
    let total_f = total as f64;
    #[allow(clippy::cast_precision_loss)]
    let sum_all: f64 = histogram
        .iter()
        .enumerate()
        .map(|(v, &n)| v as f64 * n as f64)
        .sum();

    let mut best_threshold = 0u8;
    let mut best_variance = 0.0_f64;
    let mut weight_bg = 0.0_f64;
    let mut sum_bg = 0.0_f64;
    for (t, &count) in histogram.iter().enumerate() {
        #[allow(clippy::cast_precision_loss)]
        let count = count as f64;
        weight_bg += count;
        if weight_bg == 0.0 {
            continue;
        }
        let weight_fg = total_f - weight_bg;
        if weight_fg == 0.0 {
            break;
        }
        #[allow(clippy::cast_precision_loss)]
        {
            sum_bg += t as f64 * count;
        }
        let mean_bg = sum_bg / weight_bg;
        let mean_fg = (sum_all - sum_bg) / weight_fg;
        let variance = weight_bg * weight_fg * (mean_bg - mean_fg).powi(2);
        if variance > best_variance {
            best_variance = variance;
            best_threshold = u8::try_from(t).unwrap_or(u8::MAX);
        }
    }
    best_threshold
}

fn median_3x3(image: &GrayImage) -> GrayImage {
    let (width, height) = image.dimensions();
    GrayImage::from_fn(width, height, |x, y| {
        let mut window = [0u8; 9];
        let mut n = 0;
        for dy in -1i64..=1 {
            for dx in -1i64..=1 {
                let nx = i64::from(x) + dx;
                let ny = i64::from(y) + dy;
                if let (Ok(nx), Ok(ny)) = (u32::try_from(nx), u32::try_from(ny))
                    && nx < width
                    && ny < height
                {
                    window[n] = image.get_pixel(nx, ny)[0];
                    n += 1;
                }
            }
        }
        let window = &mut window[..n];
        window.sort_unstable();
        Luma([window[n / 2]])
    })
}

#[cfg(test)]
mod tests {
    use image::RgbImage;
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn uniform_white_stays_white() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(16, 16, image::Rgb([255; 3])));
        let out = normalize(&img);
        assert!(out.pixels().all(|p| p[0] == 255));
    }

    #[test]
    fn dark_block_survives_and_speckle_is_removed() {
        let mut img = GrayImage::from_pixel(40, 40, Luma([230]));
        for y in 10..20 {
            for x in 10..20 {
                img.put_pixel(x, y, Luma([20]));
            }
        }
        img.put_pixel(35, 35, Luma([20]));
        let out = normalize(&DynamicImage::ImageLuma8(img));
        assert_eq!(out.get_pixel(15, 15)[0], 0);
        assert_eq!(out.get_pixel(35, 35)[0], 255);
        assert_eq!(out.get_pixel(2, 2)[0], 255);
    }

    #[test]
    fn otsu_separates_bimodal_histogram() {
        let mut img = GrayImage::from_pixel(10, 10, Luma([200]));
        for x in 0..10 {
            img.put_pixel(x, 0, Luma([40]));
        }
        let t = otsu_threshold(&img);
        assert!((40..200).contains(&t), "threshold {t}");
    }

    proptest! {
        #[test]
        fn output_is_binary(pixels in proptest::collection::vec(any::<u8>(), 64)) {
            let img = GrayImage::from_raw(8, 8, pixels).unwrap();
            let out = normalize(&DynamicImage::ImageLuma8(img));
            prop_assert!(out.pixels().all(|p| p[0] == 0 || p[0] == 255));
            prop_assert_eq!(out.dimensions(), (8, 8));
        }
    }
}
