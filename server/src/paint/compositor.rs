//! Multi-pass mask compositing
//!
//! Painting one mask runs three passes over a float working copy of the
//! image, each reading the output of the previous one:
//!
//! 1. color fill: masked pixels move toward the target color by `opacity`
//! 2. texture: when `opacity > 0.3`, masked pixels are darkened by a random
//!    per-pixel factor in `[0.9, 1.0]`
//! 3. edge blend: masked pixels are mixed back toward the unpainted input,
//!    weighted by `0.2 * blur(mask)`
//!
//! The working copy is rounded back to 8 bits once, at the end.

use image::RgbImage;
use rand::Rng;

use crate::mask::{BinaryMask, MaskError};

use super::types::PaintColor;

/// Texture is only applied above this opacity
const TEXTURE_MIN_OPACITY: f32 = 0.3;

/// Scale applied to the blurred mask to get the edge blend weight
const EDGE_BLEND_STRENGTH: f32 = 0.2;

/// 3-tap Gaussian (sigma derived from the kernel size)
const EDGE_KERNEL: [f32; 3] = [0.25, 0.5, 0.25];

/// Paint one mask, returning a new image
pub fn paint_one(
    image: &RgbImage,
    mask: &BinaryMask,
    color: PaintColor,
    opacity: f32,
) -> Result<RgbImage, MaskError> {
    paint_one_with_rng(image, mask, color, opacity, &mut rand::rng())
}

/// [`paint_one`] with an explicit texture source
pub fn paint_one_with_rng<R: Rng + ?Sized>(
    image: &RgbImage,
    mask: &BinaryMask,
    color: PaintColor,
    opacity: f32,
    rng: &mut R,
) -> Result<RgbImage, MaskError> {
    check_dimensions(image, mask)?;

    let source = image.as_raw();
    let mut working: Vec<f32> = source.iter().map(|&v| v as f32).collect();
    let target = color.channels().map(|c| c as f32);

    // Color fill
    for i in masked_pixels(mask) {
        for c in 0..3 {
            let v = &mut working[i * 3 + c];
            *v = *v * (1.0 - opacity) + target[c] * opacity;
        }
    }

    // Texture
    if opacity > TEXTURE_MIN_OPACITY {
        for i in masked_pixels(mask) {
            let factor = (rng.random::<f32>() * 0.1 + 0.95).clamp(0.9, 1.0);
            for c in 0..3 {
                working[i * 3 + c] *= factor;
            }
        }
    }

    // Edge blend toward the unpainted input
    if !mask.is_empty() {
        let blurred = blur_mask(mask);
        for i in masked_pixels(mask) {
            let weight = blurred[i] * EDGE_BLEND_STRENGTH;
            for c in 0..3 {
                let v = &mut working[i * 3 + c];
                *v = *v * (1.0 - weight) + source[i * 3 + c] as f32 * weight;
            }
        }
    }

    let pixels = working
        .into_iter()
        .map(|v| v.round().clamp(0.0, 255.0) as u8)
        .collect();
    RgbImage::from_raw(image.width(), image.height(), pixels)
        .ok_or_else(|| MaskError::Encode("painted buffer has wrong length".to_string()))
}

/// Paint masks in order, each on top of the previous result
pub fn paint_many<'a, I>(image: &RgbImage, layers: I) -> Result<RgbImage, MaskError>
where
    I: IntoIterator<Item = (&'a BinaryMask, PaintColor, f32)>,
{
    paint_many_with_rng(image, layers, &mut rand::rng())
}

/// [`paint_many`] with an explicit texture source
pub fn paint_many_with_rng<'a, I, R>(
    image: &RgbImage,
    layers: I,
    rng: &mut R,
) -> Result<RgbImage, MaskError>
where
    I: IntoIterator<Item = (&'a BinaryMask, PaintColor, f32)>,
    R: Rng + ?Sized,
{
    let mut painted = image.clone();
    for (mask, color, opacity) in layers {
        painted = paint_one_with_rng(&painted, mask, color, opacity, rng)?;
    }
    Ok(painted)
}

fn check_dimensions(image: &RgbImage, mask: &BinaryMask) -> Result<(), MaskError> {
    if image.dimensions() != mask.dimensions() {
        return Err(MaskError::DimensionMismatch {
            left_width: image.width(),
            left_height: image.height(),
            right_width: mask.width(),
            right_height: mask.height(),
        });
    }
    Ok(())
}

fn masked_pixels(mask: &BinaryMask) -> impl Iterator<Item = usize> + '_ {
    mask.as_slice()
        .iter()
        .enumerate()
        .filter_map(|(i, &bit)| bit.then_some(i))
}

/// Reflect an out-of-range index back into `0..len`, excluding the edge
/// sample itself (`-1 -> 1`, `len -> len - 2`).
fn reflect(index: isize, len: usize) -> usize {
    if len == 1 {
        return 0;
    }
    let last = len as isize - 1;
    let reflected = if index < 0 {
        -index
    } else if index > last {
        2 * last - index
    } else {
        index
    };
    reflected as usize
}

/// Separable 3x3 Gaussian over the mask as 0/1 floats
fn blur_mask(mask: &BinaryMask) -> Vec<f32> {
    let (width, height) = (mask.width() as usize, mask.height() as usize);
    let field: Vec<f32> = mask
        .as_slice()
        .iter()
        .map(|&bit| if bit { 1.0 } else { 0.0 })
        .collect();

    let mut horizontal = vec![0.0f32; field.len()];
    for y in 0..height {
        let row = y * width;
        for x in 0..width {
            horizontal[row + x] = EDGE_KERNEL
                .iter()
                .enumerate()
                .map(|(k, w)| w * field[row + reflect(x as isize + k as isize - 1, width)])
                .sum();
        }
    }

    let mut blurred = vec![0.0f32; field.len()];
    for y in 0..height {
        for x in 0..width {
            blurred[y * width + x] = EDGE_KERNEL
                .iter()
                .enumerate()
                .map(|(k, w)| {
                    w * horizontal[reflect(y as isize + k as isize - 1, height) * width + x]
                })
                .sum();
        }
    }
    blurred
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    const RED: PaintColor = PaintColor([255, 0, 0]);
    const BLUE: PaintColor = PaintColor([0, 0, 255]);

    fn gradient(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x * 20) as u8, (y * 25) as u8, ((x + y) * 9) as u8])
        })
    }

    fn center_square(width: u32, height: u32) -> BinaryMask {
        BinaryMask::from_fn(width, height, |x, y| {
            (2..width - 2).contains(&x) && (2..height - 2).contains(&y)
        })
    }

    #[test]
    fn test_zero_opacity_is_identity() {
        let image = gradient(10, 8);
        let mask = center_square(10, 8);
        let painted = paint_one(&image, &mask, RED, 0.0).unwrap();
        assert_eq!(painted, image);
    }

    #[test]
    fn test_empty_mask_is_identity() {
        let image = gradient(6, 6);
        let painted = paint_one(&image, &BinaryMask::new(6, 6), RED, 0.9).unwrap();
        assert_eq!(painted, image);
    }

    #[test]
    fn test_pixels_outside_mask_untouched() {
        let image = gradient(10, 8);
        let mask = center_square(10, 8);
        let painted = paint_one(&image, &mask, RED, 0.8).unwrap();

        for (x, y, pixel) in painted.enumerate_pixels() {
            if !mask.get(x, y) {
                assert_eq!(pixel, image.get_pixel(x, y), "pixel ({x},{y}) changed");
            }
        }
    }

    #[test]
    fn test_input_is_not_mutated() {
        let image = gradient(8, 8);
        let before = image.clone();
        let _ = paint_one(&image, &center_square(8, 8), RED, 0.7).unwrap();
        assert_eq!(image, before);
    }

    #[test]
    fn test_low_opacity_is_deterministic() {
        // No texture pass at or below 0.3
        let image = gradient(10, 8);
        let mask = center_square(10, 8);
        let a = paint_one(&image, &mask, RED, 0.3).unwrap();
        let b = paint_one(&image, &mask, RED, 0.3).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_seeded_texture_is_reproducible() {
        let image = gradient(10, 8);
        let mask = center_square(10, 8);
        let a = paint_one_with_rng(&image, &mask, RED, 0.9, &mut ChaCha8Rng::seed_from_u64(7))
            .unwrap();
        let b = paint_one_with_rng(&image, &mask, RED, 0.9, &mut ChaCha8Rng::seed_from_u64(7))
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_full_mask_interior_value() {
        // Solid mask: blur is 1 everywhere, so weight is 0.2 toward the source.
        let image = RgbImage::from_pixel(5, 5, Rgb([100, 100, 100]));
        let mask = BinaryMask::from_fn(5, 5, |_, _| true);
        let painted = paint_one(&image, &mask, RED, 0.3).unwrap();

        // fill: 100*0.7 + 255*0.3 = 146.5; blend: 146.5*0.8 + 100*0.2 = 137.2
        // fill: 100*0.7 = 70;               blend: 70*0.8 + 100*0.2 = 76
        for pixel in painted.pixels() {
            assert_eq!(pixel.0, [137, 76, 76]);
        }
    }

    #[test]
    fn test_texture_only_darkens() {
        let image = RgbImage::from_pixel(6, 6, Rgb([100, 100, 100]));
        let mask = BinaryMask::from_fn(6, 6, |_, _| true);
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let painted = paint_one_with_rng(&image, &mask, RED, 0.7, &mut rng).unwrap();

        // Without texture the red channel would be
        // (100*0.3 + 255*0.7) * 0.8 + 100 * 0.2 = 186.8
        for pixel in painted.pixels() {
            let red = pixel.0[0] as f32;
            assert!(red <= 187.0, "red {red} brighter than untextured");
            assert!(red >= (208.5_f32 * 0.9 * 0.8 + 20.0).floor(), "red {red} too dark");
        }
    }

    #[test]
    fn test_edge_pixels_keep_more_paint() {
        // Pixels on the mask boundary have a lower blur value, so they are
        // pulled less toward the source than interior pixels.
        let image = RgbImage::from_pixel(9, 9, Rgb([0, 0, 0]));
        let mask = center_square(9, 9);
        let painted = paint_one(&image, &mask, RED, 0.2).unwrap();

        let interior = painted.get_pixel(4, 4).0[0];
        let corner = painted.get_pixel(2, 2).0[0];
        assert!(corner > interior, "corner {corner} <= interior {interior}");
    }

    #[test]
    fn test_dimension_mismatch_is_error() {
        let image = gradient(4, 4);
        let result = paint_one(&image, &BinaryMask::new(5, 4), RED, 0.5);
        assert!(matches!(result, Err(MaskError::DimensionMismatch { .. })));
    }

    #[test]
    fn test_paint_many_empty_is_identity() {
        let image = gradient(7, 5);
        let painted = paint_many(&image, std::iter::empty()).unwrap();
        assert_eq!(painted, image);
    }

    #[test]
    fn test_paint_many_later_mask_dominates_overlap() {
        let image = RgbImage::from_pixel(8, 8, Rgb([100, 100, 100]));
        let mask = BinaryMask::from_fn(8, 8, |_, _| true);
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        let painted = paint_many_with_rng(
            &image,
            [(&mask, RED, 0.7), (&mask, BLUE, 0.7)],
            &mut rng,
        )
        .unwrap();

        for pixel in painted.pixels() {
            let [r, g, b] = pixel.0;
            assert!(b > r && b > g, "blue does not dominate: {:?}", pixel.0);
        }
    }

    #[test]
    fn test_paint_many_compounds_sequentially() {
        let image = gradient(8, 8);
        let mask = center_square(8, 8);

        let once = paint_one(&image, &mask, RED, 0.2).unwrap();
        let twice_expected = paint_one(&once, &mask, BLUE, 0.2).unwrap();
        let twice = paint_many(&image, [(&mask, RED, 0.2), (&mask, BLUE, 0.2)]).unwrap();

        assert_eq!(twice, twice_expected);
    }

    #[test]
    fn test_blur_of_solid_mask_is_one() {
        let mask = BinaryMask::from_fn(4, 3, |_, _| true);
        assert!(blur_mask(&mask).iter().all(|&v| (v - 1.0).abs() < 1e-6));
    }

    #[test]
    fn test_blur_single_pixel() {
        let mask = BinaryMask::from_fn(5, 5, |x, y| x == 2 && y == 2);
        let blurred = blur_mask(&mask);
        assert!((blurred[12] - 0.25).abs() < 1e-6);
        assert!((blurred[7] - 0.125).abs() < 1e-6);
        assert!((blurred[6] - 0.0625).abs() < 1e-6);
        assert_eq!(blurred[0], 0.0);
    }

    #[test]
    fn test_reflect() {
        assert_eq!(reflect(-1, 5), 1);
        assert_eq!(reflect(5, 5), 3);
        assert_eq!(reflect(2, 5), 2);
        assert_eq!(reflect(-1, 1), 0);
    }
}
